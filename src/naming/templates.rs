//! Builtin and custom naming templates
//!
//! Builtin templates are defined in code. Custom templates are persisted in a
//! JSON file keyed by template kind:
//!
//! ```json
//! {"image": {"MY-KEY": {...}}, "destination": {}}
//! ```

use crate::core::error::{DownloadError, Result};
use crate::naming::template::NamingTemplate;
use crate::naming::tokens::{Case, TemplateType, Token};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Default custom templates file name
pub const TEMPLATES_FILE_NAME: &str = "naming-templates.json";

/// Key of the default image template
pub const DEFAULT_IMAGE_TEMPLATE: &str = "DATE-TIME";

/// Key of the default destination template
pub const DEFAULT_DESTINATION_TEMPLATE: &str = "YEAR-MONTH-DAY-SESSION";

/// Builtin image naming templates
pub fn builtin_image_templates() -> Vec<NamingTemplate> {
    vec![
        NamingTemplate::from_names(
            DEFAULT_IMAGE_TEMPLATE,
            "Date and time",
            &["Image date (YYYYMMDD)", "-", "Image date (HHMMSS)"],
        )
        .builtin(),
        NamingTemplate::from_names(
            "DATE-TIME-NUMBER",
            "Date, time and image number",
            &[
                "Image date (YYYYMMDD)",
                "-",
                "Image date (HHMMSS)",
                "-",
                "Image number (All digits)",
            ],
        )
        .builtin(),
        NamingTemplate::from_names("ORIGINAL", "Original name", &["Name (Original Case)"])
            .with_extension(Case::Original)
            .builtin(),
    ]
}

/// Builtin destination naming templates
pub fn builtin_destination_templates() -> Vec<NamingTemplate> {
    vec![
        NamingTemplate::from_names(
            DEFAULT_DESTINATION_TEMPLATE,
            "Year/Year-Month/Year-Month-Day-Session",
            &[
                "Image date (YYYY)",
                "/",
                "Image date (YYYY)",
                "-",
                "Image date (MM)",
                "/",
                "Image date (YYYY)",
                "-",
                "Image date (MM)",
                "-",
                "Image date (DD)",
                "-",
                "Session",
            ],
        )
        .builtin(),
        NamingTemplate::from_names(
            "YEAR-MONTH",
            "Year/Year-Month",
            &[
                "Image date (YYYY)",
                "/",
                "Image date (YYYY)",
                "-",
                "Image date (MM)",
            ],
        )
        .builtin(),
    ]
}

fn builtins(kind: TemplateType) -> Vec<NamingTemplate> {
    match kind {
        TemplateType::Image => builtin_image_templates(),
        TemplateType::Destination => builtin_destination_templates(),
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct TemplatesFile {
    #[serde(default)]
    image: BTreeMap<String, NamingTemplate>,
    #[serde(default)]
    destination: BTreeMap<String, NamingTemplate>,
}

/// Builtin templates plus the user's custom ones
#[derive(Debug)]
pub struct NamingTemplates {
    path: PathBuf,
    custom: TemplatesFile,
}

impl NamingTemplates {
    /// Load custom templates from `path`, degrading to none
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let custom = match read_templates(&path) {
            Ok(custom) => {
                let custom = TemplatesFile {
                    image: retain_usable(custom.image, TemplateType::Image),
                    destination: retain_usable(custom.destination, TemplateType::Destination),
                };
                debug!(
                    "Loaded {} custom image and {} destination templates",
                    custom.image.len(),
                    custom.destination.len()
                );
                custom
            }
            Err(e) => {
                if path.exists() {
                    warn!("Cannot load naming templates from {}: {}", path.display(), e);
                }
                TemplatesFile::default()
            }
        };
        Self { path, custom }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Persist the custom templates
    pub fn save(&self) -> Result<()> {
        write_templates(&self.path, &self.custom).map_err(|message| {
            DownloadError::TemplatesSave {
                path: self.path.clone(),
                message,
            }
        })?;
        info!("Naming templates saved to {}", self.path.display());
        Ok(())
    }

    fn custom(&self, kind: TemplateType) -> &BTreeMap<String, NamingTemplate> {
        match kind {
            TemplateType::Image => &self.custom.image,
            TemplateType::Destination => &self.custom.destination,
        }
    }

    fn custom_mut(&mut self, kind: TemplateType) -> &mut BTreeMap<String, NamingTemplate> {
        match kind {
            TemplateType::Image => &mut self.custom.image,
            TemplateType::Destination => &mut self.custom.destination,
        }
    }

    /// All templates of a kind: builtins first, then custom ones by key
    pub fn list(&self, kind: TemplateType) -> Vec<NamingTemplate> {
        let mut templates = builtins(kind);
        templates.extend(self.custom(kind).values().cloned());
        templates
    }

    pub fn get(&self, kind: TemplateType, key: &str) -> Option<NamingTemplate> {
        builtins(kind)
            .into_iter()
            .find(|t| t.key == key)
            .or_else(|| self.custom(kind).get(key).cloned())
    }

    /// Like [`get`](Self::get), failing on unknown keys
    pub fn require(&self, kind: TemplateType, key: &str) -> Result<NamingTemplate> {
        self.get(kind, key)
            .ok_or_else(|| DownloadError::UnknownTemplate(key.to_string()))
    }

    fn ensure_custom(&self, kind: TemplateType, key: &str) -> Result<()> {
        if builtins(kind).iter().any(|t| t.key == key) {
            return Err(DownloadError::BuiltinTemplate(key.to_string()));
        }
        if !self.custom(kind).contains_key(key) {
            return Err(DownloadError::UnknownTemplate(key.to_string()));
        }
        Ok(())
    }

    /// Add (or replace) a custom template
    pub fn add(&mut self, kind: TemplateType, mut template: NamingTemplate) -> Result<()> {
        if builtins(kind).iter().any(|t| t.key == template.key) {
            return Err(DownloadError::BuiltinTemplate(template.key));
        }
        template.validate(kind)?;
        template.is_builtin = false;
        debug!("Adding {:?} template {}", kind, template.key);
        self.custom_mut(kind).insert(template.key.clone(), template);
        Ok(())
    }

    pub fn rename(&mut self, kind: TemplateType, key: &str, name: &str) -> Result<()> {
        self.ensure_custom(kind, key)?;
        if let Some(template) = self.custom_mut(kind).get_mut(key) {
            template.name = name.to_string();
        }
        Ok(())
    }

    /// Replace the token list (and extension case) of a custom template
    pub fn redefine(
        &mut self,
        kind: TemplateType,
        key: &str,
        tokens: Vec<Arc<Token>>,
        extension: Case,
    ) -> Result<()> {
        self.ensure_custom(kind, key)?;
        let mut template = self.require(kind, key)?;
        template.template = tokens;
        template.extension = extension;
        template.validate(kind)?;
        self.custom_mut(kind).insert(key.to_string(), template);
        Ok(())
    }

    pub fn delete(&mut self, kind: TemplateType, key: &str) -> Result<NamingTemplate> {
        self.ensure_custom(kind, key)?;
        self.custom_mut(kind)
            .remove(key)
            .ok_or_else(|| DownloadError::UnknownTemplate(key.to_string()))
    }
}

/// Drop stored templates that could not have been added through
/// [`NamingTemplates::add`]
fn retain_usable(
    stored: BTreeMap<String, NamingTemplate>,
    kind: TemplateType,
) -> BTreeMap<String, NamingTemplate> {
    let builtin_keys: Vec<String> = builtins(kind).into_iter().map(|t| t.key).collect();
    stored
        .into_iter()
        .filter_map(|(key, mut template)| {
            if key != template.key {
                warn!("Skipping {:?} template stored as {:?} with key {:?}", kind, key, template.key);
                return None;
            }
            if builtin_keys.contains(&key) {
                warn!("Skipping {:?} template {:?}: shadows a builtin template", kind, key);
                return None;
            }
            if let Err(e) = template.validate(kind) {
                warn!("Skipping {:?} template {:?}: {}", kind, key, e);
                return None;
            }
            template.is_builtin = false;
            Some((key, template))
        })
        .collect()
}

fn read_templates(path: &Path) -> std::result::Result<TemplatesFile, String> {
    let file = File::open(path).map_err(|e| e.to_string())?;
    serde_json::from_reader(BufReader::new(file)).map_err(|e| e.to_string())
}

fn write_templates(path: &Path, templates: &TemplatesFile) -> std::result::Result<(), String> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(|e| e.to_string())?;
        }
    }
    let file = File::create(path).map_err(|e| e.to_string())?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, templates).map_err(|e| e.to_string())?;
    writer.flush().map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::naming::tokens::TokenTree;
    use tempfile::tempdir;

    fn custom_template() -> NamingTemplate {
        NamingTemplate::from_names(
            "MINE",
            "Mine",
            &["Session", "_", "Stored number (4 digits)"],
        )
    }

    #[test]
    fn test_builtins_are_valid() {
        for template in builtin_image_templates() {
            assert!(template.is_builtin);
            assert!(template.validate(TemplateType::Image).is_ok());
            assert!(template.template.iter().all(|t| !t.is_free_text() || t.name().len() == 1));
        }
        for template in builtin_destination_templates() {
            assert!(template.is_builtin);
            assert!(template.validate(TemplateType::Destination).is_ok());
        }
    }

    #[test]
    fn test_missing_file_gives_builtins_only() {
        let dir = tempdir().unwrap();
        let templates = NamingTemplates::load(dir.path().join("none.json"));
        assert_eq!(
            templates.list(TemplateType::Image).len(),
            builtin_image_templates().len()
        );
        assert!(templates.get(TemplateType::Image, DEFAULT_IMAGE_TEMPLATE).is_some());
        assert!(templates
            .get(TemplateType::Destination, DEFAULT_DESTINATION_TEMPLATE)
            .is_some());
    }

    #[test]
    fn test_add_save_reload() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(TEMPLATES_FILE_NAME);

        let mut templates = NamingTemplates::load(&path);
        templates.add(TemplateType::Image, custom_template()).unwrap();
        templates.save().unwrap();

        let reloaded = NamingTemplates::load(&path);
        let mine = reloaded.require(TemplateType::Image, "MINE").unwrap();
        assert_eq!(mine, custom_template());
        assert!(reloaded.get(TemplateType::Destination, "MINE").is_none());
    }

    #[test]
    fn test_add_rejects_invalid_and_builtin() {
        let dir = tempdir().unwrap();
        let mut templates = NamingTemplates::load(dir.path().join("t.json"));

        assert!(matches!(
            templates.add(TemplateType::Destination, custom_template()),
            Err(DownloadError::InvalidTemplate { .. })
        ));

        let shadow = NamingTemplate::from_names(DEFAULT_IMAGE_TEMPLATE, "Shadow", &["x"]);
        assert!(matches!(
            templates.add(TemplateType::Image, shadow),
            Err(DownloadError::BuiltinTemplate(_))
        ));
    }

    #[test]
    fn test_rename_redefine_delete() {
        let dir = tempdir().unwrap();
        let mut templates = NamingTemplates::load(dir.path().join("t.json"));
        templates.add(TemplateType::Image, custom_template()).unwrap();

        templates.rename(TemplateType::Image, "MINE", "Renamed").unwrap();
        assert_eq!(
            templates.require(TemplateType::Image, "MINE").unwrap().name,
            "Renamed"
        );

        let tree = TokenTree::builtin();
        templates
            .redefine(
                TemplateType::Image,
                "MINE",
                vec![tree.resolve("Name (UPPERCASE)")],
                Case::Upper,
            )
            .unwrap();
        let mine = templates.require(TemplateType::Image, "MINE").unwrap();
        assert_eq!(mine.as_text(), "<Name (UPPERCASE)>");
        assert_eq!(mine.extension, Case::Upper);

        assert!(matches!(
            templates.rename(TemplateType::Image, DEFAULT_IMAGE_TEMPLATE, "x"),
            Err(DownloadError::BuiltinTemplate(_))
        ));
        assert!(matches!(
            templates.delete(TemplateType::Image, "NOPE"),
            Err(DownloadError::UnknownTemplate(_))
        ));

        let removed = templates.delete(TemplateType::Image, "MINE").unwrap();
        assert_eq!(removed.key, "MINE");
        assert!(templates.get(TemplateType::Image, "MINE").is_none());
    }

    #[test]
    fn test_corrupt_file_degrades_to_empty() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("t.json");
        fs::write(&path, "{ not json").unwrap();
        let templates = NamingTemplates::load(&path);
        assert_eq!(
            templates.list(TemplateType::Destination).len(),
            builtin_destination_templates().len()
        );
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_save_failure_on_flush_is_reported() {
        let mut templates = NamingTemplates::load("/dev/full");
        templates.add(TemplateType::Image, custom_template()).unwrap();
        assert!(matches!(
            templates.save(),
            Err(DownloadError::TemplatesSave { .. })
        ));
    }

    #[test]
    fn test_load_skips_unusable_templates() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(TEMPLATES_FILE_NAME);

        let mut stored = TemplatesFile::default();
        let mut flagged = custom_template();
        flagged.is_builtin = true;
        stored.image.insert("MINE".to_string(), flagged);
        stored.image.insert("OTHER".to_string(), custom_template());
        stored.image.insert(
            DEFAULT_IMAGE_TEMPLATE.to_string(),
            NamingTemplate::from_names(DEFAULT_IMAGE_TEMPLATE, "Shadow", &["x"]),
        );
        // Sequence and extension tokens are not allowed in folder names
        stored.destination.insert(
            "FOLDERS".to_string(),
            NamingTemplate::from_names(
                "FOLDERS",
                "Folders",
                &["Stored number (3 digits)", "Extension (lowercase)"],
            ),
        );
        fs::write(&path, serde_json::to_string(&stored).unwrap()).unwrap();

        let templates = NamingTemplates::load(&path);
        let mine = templates.require(TemplateType::Image, "MINE").unwrap();
        assert!(!mine.is_builtin);
        assert!(templates.get(TemplateType::Image, "OTHER").is_none());
        assert_eq!(
            templates
                .require(TemplateType::Image, DEFAULT_IMAGE_TEMPLATE)
                .unwrap()
                .name,
            builtin_image_templates()[0].name
        );
        assert!(templates.get(TemplateType::Destination, "FOLDERS").is_none());
        assert_eq!(
            templates.list(TemplateType::Destination).len(),
            builtin_destination_templates().len()
        );
    }
}
