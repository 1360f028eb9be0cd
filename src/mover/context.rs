//! Mover working context: destination, templates, images and sequences
//!
//! Previews and downloads render names through the same
//! [`NamingTemplate::format`] call with a snapshot of the sequences, so a
//! previewed name is exactly the name a download assigns to that image.

use crate::core::config::TransferMode;
use crate::core::error::Result;
use crate::core::image::{DownloadInfo, Image, ImageKey, ImageUpdate};
use crate::core::sequences::Sequences;
use crate::mover::transfer::{transfer, unique_name};
use crate::naming::{NamingTemplate, TemplateType};
use chrono::{Local, NaiveDateTime};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::{Component, Path, PathBuf};

/// One image written to its destination
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DownloadedImage {
    /// Source path (image key)
    pub key: ImageKey,
    pub download_time: NaiveDateTime,
    /// Full destination path, including the file name
    pub destination: PathBuf,
}

/// Terminal outcome of a download
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DownloadReport {
    pub message: String,
    pub cancelled: bool,
    /// Every image actually written, in download order
    pub images: Vec<DownloadedImage>,
}

/// Progress of a running download
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadProgress {
    /// Number of candidate images, sent first
    Selected(usize),
    /// Number of images processed so far
    Processed(usize),
}

/// Rendered name and folder for a sample image
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImagePreview {
    pub name: String,
    pub path: String,
}

fn local_now() -> NaiveDateTime {
    Local::now().naive_local()
}

/// Join a rendered folder under `root`, keeping only its normal components
/// so free text like a leading `/` or `..` cannot leave the destination
fn join_rendered(root: &Path, rendered: &str) -> PathBuf {
    let mut path = root.to_path_buf();
    path.extend(
        Path::new(rendered)
            .components()
            .filter(|c| matches!(c, Component::Normal(_))),
    );
    path
}

/// Working context of the mover
pub struct MoverContext {
    destination: Option<PathBuf>,
    image_template: Option<NamingTemplate>,
    destination_template: Option<NamingTemplate>,
    /// Images in first-seen order
    images: Vec<Image>,
    index: HashMap<ImageKey, usize>,
    sequences: Sequences,
    transfer: TransferMode,
    clock: fn() -> NaiveDateTime,
}

impl MoverContext {
    pub fn new(sequences: Sequences, transfer: TransferMode) -> Self {
        Self {
            destination: None,
            image_template: None,
            destination_template: None,
            images: Vec::new(),
            index: HashMap::new(),
            sequences,
            transfer,
            clock: local_now,
        }
    }

    /// Replace the source of "now"
    pub fn with_clock(mut self, clock: fn() -> NaiveDateTime) -> Self {
        self.clock = clock;
        self
    }

    pub fn set_destination(&mut self, destination: PathBuf) {
        debug!("Update context, Destination is {}...", destination.display());
        self.destination = Some(destination);
    }

    pub fn set_transfer_mode(&mut self, transfer: TransferMode) {
        debug!("Update context, Transfer mode is {:?}...", transfer);
        self.transfer = transfer;
    }

    pub fn set_image_template(&mut self, template: NamingTemplate) {
        debug!("Update context, Images naming template is {}...", template.name);
        self.image_template = Some(template);
    }

    pub fn set_destination_template(&mut self, template: NamingTemplate) {
        debug!(
            "Update context, Destination naming template is {}...",
            template.name
        );
        self.destination_template = Some(template);
    }

    pub fn clear_images(&mut self) {
        debug!("Clear images in context...");
        self.images.clear();
        self.index.clear();
    }

    /// Add images, replacing those with a known key in place
    pub fn add_images(&mut self, images: Vec<Image>) {
        debug!("Update context, adding {} images...", images.len());
        for image in images {
            match self.index.get(image.key()) {
                Some(&i) => self.images[i] = image,
                None => {
                    self.index.insert(image.key().to_string(), self.images.len());
                    self.images.push(image);
                }
            }
        }
    }

    pub fn set_images(&mut self, images: Vec<Image>) {
        self.clear_images();
        self.add_images(images);
    }

    /// Apply an update to the given images; unknown keys are skipped
    pub fn update_images(&mut self, keys: &[ImageKey], update: &ImageUpdate) {
        debug!("Update images info for {} images...", keys.len());
        for key in keys {
            match self.index.get(key) {
                Some(&i) => update.apply(&mut self.images[i]),
                None => warn!("Cannot update image info: {} is not found", key),
            }
        }
    }

    pub fn image(&self, key: &str) -> Option<&Image> {
        self.index.get(key).map(|&i| &self.images[i])
    }

    pub fn images_count(&self) -> usize {
        self.images.len()
    }

    /// Loaded and selected images, in working-set order
    pub fn candidates(&self) -> impl Iterator<Item = &Image> {
        self.images.iter().filter(|image| image.is_candidate())
    }

    pub fn sequences(&mut self) -> &mut Sequences {
        &mut self.sequences
    }

    fn folder_for(&self, relative: &str) -> PathBuf {
        match &self.destination {
            Some(destination) => join_rendered(destination, relative),
            None => PathBuf::from(relative),
        }
    }

    /// Name and folder `sample` would get, without touching the sequences
    pub fn image_preview(&mut self, sample: &Image) -> Option<ImagePreview> {
        let image_template = self.image_template.as_ref()?;
        let destination_template = self.destination_template.as_ref()?;
        let now = (self.clock)();
        let snapshot = self.sequences.snapshot();

        let name = image_template.format(sample, &snapshot, now, TemplateType::Image);
        let relative = destination_template.format(sample, &snapshot, now, TemplateType::Destination);
        Some(ImagePreview {
            name,
            path: self.folder_for(&relative).to_string_lossy().into_owned(),
        })
    }

    /// Distinct destination folders of the candidates, in first-seen order
    pub fn folders_preview(&mut self) -> Vec<String> {
        let Some(template) = self.destination_template.as_ref() else {
            return Vec::new();
        };
        let now = (self.clock)();
        let snapshot = self.sequences.snapshot();

        let mut seen = HashSet::new();
        let mut folders = Vec::new();
        for image in self.images.iter().filter(|image| image.is_candidate()) {
            let relative = template.format(image, &snapshot, now, TemplateType::Destination);
            let folder = self.folder_for(&relative).to_string_lossy().into_owned();
            if seen.insert(folder.clone()) {
                folders.push(folder);
            }
        }
        folders
    }

    /// Rename and transfer every candidate image
    ///
    /// `should_stop` is checked before each image, never during a copy.
    /// The sequences advance once per image actually written.
    pub fn download(
        &mut self,
        mut progress: impl FnMut(DownloadProgress),
        mut should_stop: impl FnMut() -> bool,
    ) -> DownloadReport {
        let (destination, image_template, destination_template) = match (
            &self.destination,
            &self.image_template,
            &self.destination_template,
        ) {
            (Some(d), Some(i), Some(t)) => (d.clone(), i.clone(), t.clone()),
            _ => {
                warn!("Cannot download: destination or naming templates not set");
                progress(DownloadProgress::Selected(0));
                return DownloadReport {
                    message: "Download completed! 0 images downloaded.".to_string(),
                    cancelled: false,
                    images: Vec::new(),
                };
            }
        };

        let candidates: Vec<Image> = self.candidates().cloned().collect();
        let total = candidates.len();
        info!("Downloading {} images...", total);
        progress(DownloadProgress::Selected(total));

        let download_time = (self.clock)();
        let mut downloaded = Vec::new();
        let mut cancelled = false;

        for (i, image) in candidates.iter().enumerate() {
            if should_stop() {
                info!("Stop downloading images, {} images remaining.", total - i);
                cancelled = true;
                break;
            }

            let snapshot = self.sequences.snapshot();
            let name = image_template.format(image, &snapshot, download_time, TemplateType::Image);
            let folder = join_rendered(
                &destination,
                &destination_template.format(image, &snapshot, download_time, TemplateType::Destination),
            );
            let target = folder.join(unique_name(&folder, &name));

            match transfer(&image.source_path(), &target, self.transfer) {
                Ok(target) => {
                    self.sequences.increment();
                    self.mark_downloaded(image.key(), &target, download_time);
                    downloaded.push(DownloadedImage {
                        key: image.key().to_string(),
                        download_time,
                        destination: target,
                    });
                }
                Err(e) => warn!("Cannot copy {} to {}: {}", image.name, target.display(), e),
            }
            progress(DownloadProgress::Processed(i + 1));
        }

        let count = downloaded.len();
        let message = if cancelled {
            format!("Download cancelled! {} / {} images downloaded.", count, total)
        } else {
            info!("{} images downloaded.", count);
            format!("Download completed! {} images downloaded.", count)
        };

        DownloadReport {
            message,
            cancelled,
            images: downloaded,
        }
    }

    /// Record a completed transfer on the working-set image and deselect it
    fn mark_downloaded(&mut self, key: &str, target: &Path, time: NaiveDateTime) {
        if let Some(&i) = self.index.get(key) {
            let image = &mut self.images[i];
            image.download_info = DownloadInfo::Marked {
                path: target.to_string_lossy().into_owned(),
                time,
            };
            image.is_selected = false;
        }
    }

    /// Persist the sequences if they changed
    pub fn save_sequences(&mut self) -> Result<()> {
        debug!("Save the Sequences state to persistent file...");
        self.sequences.save()
    }
}
