//! Naming templates: ordered token lists rendered into names and paths

use crate::core::error::{DownloadError, Result};
use crate::core::image::Image;
use crate::core::sequences::SequenceSnapshot;
use crate::naming::tokens::{Case, TemplateType, Token, TokenTree};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::ops::Range;
use std::sync::Arc;

/// A named, ordered sequence of tokens
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(into = "TemplateRecord", from = "TemplateRecord")]
pub struct NamingTemplate {
    /// Stable identifier
    pub key: String,
    /// Display name
    pub name: String,
    pub template: Vec<Arc<Token>>,
    /// Case of the extension appended to image names
    pub extension: Case,
    /// Builtin templates are not editable
    pub is_builtin: bool,
}

impl NamingTemplate {
    pub fn new(key: &str, name: &str, template: Vec<Arc<Token>>) -> Self {
        Self {
            key: key.to_string(),
            name: name.to_string(),
            template,
            extension: Case::Lower,
            is_builtin: false,
        }
    }

    /// Build a template from token names, unknown names becoming free text
    pub fn from_names(key: &str, name: &str, names: &[&str]) -> Self {
        let tree = TokenTree::builtin();
        Self::new(key, name, names.iter().map(|n| tree.resolve(n)).collect())
    }

    pub fn with_extension(mut self, extension: Case) -> Self {
        self.extension = extension;
        self
    }

    pub(crate) fn builtin(mut self) -> Self {
        self.is_builtin = true;
        self
    }

    /// Render the template for one image
    ///
    /// Image templates get the image extension appended with this template's
    /// case policy. Rendering is pure: the sequence values and the download
    /// time are inputs, never read from global state.
    pub fn format(
        &self,
        image: &Image,
        sequences: &SequenceSnapshot,
        download_time: NaiveDateTime,
        kind: TemplateType,
    ) -> String {
        let mut rendered: String = self
            .template
            .iter()
            .map(|token| token.format(image, sequences, download_time))
            .collect();
        if kind == TemplateType::Image {
            rendered.push_str(&self.extension.apply(&image.extension));
        }
        rendered
    }

    /// Editor text: field tokens as `<Name>`, free text verbatim
    pub fn as_text(&self) -> String {
        self.template.iter().map(|t| display_text(t)).collect()
    }

    /// Char ranges of each token within [`as_text`](Self::as_text)
    pub fn boundaries(&self) -> Vec<Range<usize>> {
        let mut start = 0;
        self.template
            .iter()
            .map(|token| {
                let len = display_text(token).chars().count();
                let range = start..start + len;
                start += len;
                range
            })
            .collect()
    }

    /// Reject tokens that are disallowed in a template of `kind`
    pub fn validate(&self, kind: TemplateType) -> Result<()> {
        match self.template.iter().find(|t| t.is_disallowed_in(kind)) {
            Some(token) => Err(DownloadError::InvalidTemplate {
                template: self.name.clone(),
                token: token.name().to_string(),
            }),
            None => Ok(()),
        }
    }
}

fn display_text(token: &Token) -> String {
    if token.is_free_text() {
        token.name().to_string()
    } else {
        format!("<{}>", token.name())
    }
}

// ============================================================================
// Persisted form
// ============================================================================

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum TokenRecord {
    Token {
        #[serde(rename = "__token__")]
        marker: bool,
        name: String,
    },
    Text(String),
}

#[derive(Serialize, Deserialize)]
struct CaseRecord {
    #[serde(rename = "__case__")]
    marker: bool,
    name: String,
}

impl Default for CaseRecord {
    fn default() -> Self {
        Self {
            marker: true,
            name: Case::default().name().to_string(),
        }
    }
}

#[derive(Serialize, Deserialize)]
struct TemplateRecord {
    key: String,
    name: String,
    #[serde(default)]
    template: Vec<TokenRecord>,
    #[serde(default)]
    extension: CaseRecord,
    #[serde(default, rename = "isBuiltin")]
    is_builtin: bool,
}

impl From<NamingTemplate> for TemplateRecord {
    fn from(template: NamingTemplate) -> Self {
        Self {
            key: template.key,
            name: template.name,
            template: template
                .template
                .iter()
                .map(|token| {
                    if token.is_free_text() {
                        TokenRecord::Text(token.name().to_string())
                    } else {
                        TokenRecord::Token {
                            marker: true,
                            name: token.name().to_string(),
                        }
                    }
                })
                .collect(),
            extension: CaseRecord {
                marker: true,
                name: template.extension.name().to_string(),
            },
            is_builtin: template.is_builtin,
        }
    }
}

impl From<TemplateRecord> for NamingTemplate {
    fn from(record: TemplateRecord) -> Self {
        let tree = TokenTree::builtin();
        Self {
            key: record.key,
            name: record.name,
            template: record
                .template
                .into_iter()
                .map(|token| match token {
                    TokenRecord::Token { name, .. } => tree.resolve(&name),
                    TokenRecord::Text(text) => Token::free_text(&text),
                })
                .collect(),
            extension: Case::from_name(&record.extension.name).unwrap_or_default(),
            is_builtin: record.is_builtin,
        }
    }
}
