//! Image mover worker
//!
//! Holds the download context (destination, naming templates, working set
//! of images, sequences), answers preview requests and runs downloads.
//!
//! # Submodules
//!
//! - `context` - Working set, previews and the download loop
//! - `transfer` - Unique target names and copy/move of one file

pub mod context;
pub mod transfer;

pub use context::{DownloadProgress, DownloadReport, DownloadedImage, ImagePreview, MoverContext};

use crate::core::config::TransferMode;
use crate::core::image::{Image, ImageKey, ImageUpdate};
use crate::core::sequences::Sequences;
use crate::naming::NamingTemplate;
use crate::worker::{Context, Tagged, Worker, WorkerKind};
use log::{error, warn};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MoverCommand {
    SetDestination(PathBuf),
    SetTransferMode(TransferMode),
    SetImageTemplate(NamingTemplate),
    SetDestinationTemplate(NamingTemplate),
    /// Replace the working set
    SetImages(Vec<Image>),
    ClearImages,
    /// Add to the working set, replacing images with the same key
    AddImages(Vec<Image>),
    UpdateImagesInfo {
        keys: Vec<ImageKey>,
        update: ImageUpdate,
    },
    GetImagePreview(Image),
    GetFoldersPreview,
    Download,
    /// Interrupt a running download; ignored otherwise
    Cancel,
    SaveSequences,
}

impl Tagged for MoverCommand {
    fn tag(&self) -> &'static str {
        match self {
            MoverCommand::SetDestination(_) => "set_destination",
            MoverCommand::SetTransferMode(_) => "set_transfer_mode",
            MoverCommand::SetImageTemplate(_) => "set_image_template",
            MoverCommand::SetDestinationTemplate(_) => "set_destination_template",
            MoverCommand::SetImages(_) => "set_images",
            MoverCommand::ClearImages => "clear_images",
            MoverCommand::AddImages(_) => "add_images",
            MoverCommand::UpdateImagesInfo { .. } => "update_images_info",
            MoverCommand::GetImagePreview(_) => "get_image_preview",
            MoverCommand::GetFoldersPreview => "get_folders_preview",
            MoverCommand::Download => "download",
            MoverCommand::Cancel => "cancel",
            MoverCommand::SaveSequences => "save_sequences",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MoverEvent {
    ImagePreview(ImagePreview),
    FolderPreview(Vec<String>),
    SelectedImagesCount(usize),
    DownloadedImagesCount(usize),
    DownloadCompleted(DownloadReport),
    DownloadCancelled(DownloadReport),
    SequencesSaved,
    SequencesSaveFailed(String),
}

impl Tagged for MoverEvent {
    fn tag(&self) -> &'static str {
        match self {
            MoverEvent::ImagePreview(_) => "image_preview",
            MoverEvent::FolderPreview(_) => "folder_preview",
            MoverEvent::SelectedImagesCount(_) => "selected_images_count",
            MoverEvent::DownloadedImagesCount(_) => "downloaded_images_count",
            MoverEvent::DownloadCompleted(_) => "download_completed",
            MoverEvent::DownloadCancelled(_) => "download_cancelled",
            MoverEvent::SequencesSaved => "sequences_saved",
            MoverEvent::SequencesSaveFailed(_) => "sequences_save_failed",
        }
    }
}

/// Image mover worker
pub struct ImageMover {
    context: MoverContext,
}

impl ImageMover {
    pub fn new(sequences: Sequences, transfer: TransferMode) -> Self {
        Self {
            context: MoverContext::new(sequences, transfer),
        }
    }
}

impl Worker for ImageMover {
    const KIND: WorkerKind = WorkerKind::Mover;
    const NAME: &'static str = "ImageMover";
    type Command = MoverCommand;
    type Event = MoverEvent;

    fn handle(&mut self, command: MoverCommand, ctx: &mut Context<'_, MoverCommand, MoverEvent>) {
        match command {
            MoverCommand::SetDestination(path) => self.context.set_destination(path),
            MoverCommand::SetTransferMode(mode) => self.context.set_transfer_mode(mode),
            MoverCommand::SetImageTemplate(template) => self.context.set_image_template(template),
            MoverCommand::SetDestinationTemplate(template) => {
                self.context.set_destination_template(template)
            }
            MoverCommand::SetImages(images) => self.context.set_images(images),
            MoverCommand::ClearImages => self.context.clear_images(),
            MoverCommand::AddImages(images) => self.context.add_images(images),
            MoverCommand::UpdateImagesInfo { keys, update } => {
                self.context.update_images(&keys, &update)
            }
            MoverCommand::GetImagePreview(sample) => match self.context.image_preview(&sample) {
                Some(preview) => {
                    ctx.publish(MoverEvent::ImagePreview(preview));
                }
                None => warn!("Cannot preview {}: naming templates not set", sample.name),
            },
            MoverCommand::GetFoldersPreview => {
                let folders = self.context.folders_preview();
                ctx.publish(MoverEvent::FolderPreview(folders));
            }
            MoverCommand::Download => {
                let publisher = ctx.publisher().clone();
                let report = self.context.download(
                    |progress| {
                        publisher.publish(match progress {
                            DownloadProgress::Selected(n) => MoverEvent::SelectedImagesCount(n),
                            DownloadProgress::Processed(n) => MoverEvent::DownloadedImagesCount(n),
                        });
                    },
                    || ctx.interrupted(|c| matches!(c, MoverCommand::Cancel)),
                );
                ctx.publish(if report.cancelled {
                    MoverEvent::DownloadCancelled(report)
                } else {
                    MoverEvent::DownloadCompleted(report)
                });
            }
            MoverCommand::Cancel => {}
            MoverCommand::SaveSequences => match self.context.save_sequences() {
                Ok(()) => {
                    ctx.publish(MoverEvent::SequencesSaved);
                }
                Err(e) => {
                    error!("{}", e);
                    ctx.publish(MoverEvent::SequencesSaveFailed(e.to_string()));
                }
            },
        }
    }

    fn post_run(&mut self) {
        if let Err(e) = self.context.save_sequences() {
            error!("{}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::image::Datation;
    use crate::core::sequences::SEQUENCES_FILE_NAME;
    use crate::worker::{Hosting, Timing, WorkerProxy};
    use crossbeam_channel::{unbounded, Receiver};
    use std::fs;
    use std::time::Duration;
    use tempfile::tempdir;

    const TOPICS: [&str; 8] = [
        "image_preview",
        "folder_preview",
        "selected_images_count",
        "downloaded_images_count",
        "download_completed",
        "download_cancelled",
        "sequences_saved",
        "sequences_save_failed",
    ];

    fn subscribe_all(proxy: &WorkerProxy<ImageMover>) -> Receiver<MoverEvent> {
        let (tx, rx) = unbounded();
        for topic in TOPICS {
            let tx = tx.clone();
            proxy.subscribe(topic, move |event| {
                let _ = tx.send(event.clone());
            });
        }
        rx
    }

    fn next_event(rx: &Receiver<MoverEvent>) -> MoverEvent {
        rx.recv_timeout(Duration::from_secs(5)).unwrap()
    }

    fn wait_for_report(rx: &Receiver<MoverEvent>) -> DownloadReport {
        loop {
            match next_event(rx) {
                MoverEvent::DownloadCompleted(report) | MoverEvent::DownloadCancelled(report) => {
                    return report
                }
                _ => continue,
            }
        }
    }

    fn loaded_images(source: &std::path::Path, count: usize) -> Vec<Image> {
        (0..count)
            .map(|i| {
                let path = source.join(format!("DSC{:05}.JPG", i + 1));
                fs::write(&path, b"pixels").unwrap();
                let mut image = Image::from_path(&path);
                image.datetime = Some(Datation::new("2023", "07", "14", "10", "00", "00"));
                image
            })
            .collect()
    }

    fn start_mover(sequences_file: PathBuf) -> WorkerProxy<ImageMover> {
        WorkerProxy::start(&Hosting::Thread, Timing::default(), move || {
            ImageMover::new(Sequences::new(sequences_file), TransferMode::Copy)
        })
        .unwrap()
    }

    fn send_context(proxy: &WorkerProxy<ImageMover>, destination: PathBuf, images: Vec<Image>) {
        proxy.send(MoverCommand::SetDestination(destination));
        proxy.send(MoverCommand::SetImageTemplate(NamingTemplate::from_names(
            "NUM",
            "Number",
            &["Image date (YYYYMMDD)", "-", "Session number (2 digits)"],
        )));
        proxy.send(MoverCommand::SetDestinationTemplate(NamingTemplate::from_names(
            "Y",
            "Year",
            &["Image date (YYYY)"],
        )));
        proxy.send(MoverCommand::SetImages(images));
    }

    #[test]
    fn test_tags() {
        assert_eq!(MoverCommand::Download.tag(), "download");
        assert_eq!(MoverCommand::GetFoldersPreview.tag(), "get_folders_preview");
        assert_eq!(MoverEvent::SelectedImagesCount(1).tag(), "selected_images_count");
        assert_eq!(MoverEvent::FolderPreview(vec![]).tag(), "folder_preview");
    }

    #[test]
    fn test_mover_worker_download_over_thread() {
        let dir = tempdir().unwrap();
        let source = dir.path().join("card");
        fs::create_dir(&source).unwrap();
        let destination = dir.path().join("out");
        let sequences_file = dir.path().join(SEQUENCES_FILE_NAME);

        let mut proxy = start_mover(sequences_file.clone());
        let rx = subscribe_all(&proxy);

        let images = loaded_images(&source, 3);
        let sample = images[0].clone();
        send_context(&proxy, destination.clone(), images);

        proxy.send(MoverCommand::GetImagePreview(sample));
        let preview = match next_event(&rx) {
            MoverEvent::ImagePreview(preview) => preview,
            other => panic!("unexpected event: {:?}", other),
        };
        assert_eq!(preview.name, "20230714-01.jpg");

        proxy.send(MoverCommand::GetFoldersPreview);
        assert_eq!(
            next_event(&rx),
            MoverEvent::FolderPreview(vec![destination.join("2023").to_string_lossy().into_owned()])
        );

        proxy.send(MoverCommand::Download);
        assert_eq!(next_event(&rx), MoverEvent::SelectedImagesCount(3));
        let report = wait_for_report(&rx);
        assert_eq!(report.images.len(), 3);
        assert_eq!(report.images[0].destination, destination.join("2023").join(&preview.name));
        assert!(destination.join("2023").join("20230714-03.jpg").exists());

        proxy.send(MoverCommand::SaveSequences);
        assert_eq!(next_event(&rx), MoverEvent::SequencesSaved);
        proxy.stop();

        let mut reloaded = Sequences::new(&sequences_file);
        assert_eq!(reloaded.stored_number(), 4);
    }

    #[test]
    fn test_update_images_info_deselects() {
        let dir = tempdir().unwrap();
        let source = dir.path().join("card");
        fs::create_dir(&source).unwrap();
        let destination = dir.path().join("out");

        let mut proxy = start_mover(dir.path().join(SEQUENCES_FILE_NAME));
        let rx = subscribe_all(&proxy);

        let images = loaded_images(&source, 2);
        let first = images[0].key().to_string();
        send_context(&proxy, destination, images);
        proxy.send(MoverCommand::UpdateImagesInfo {
            keys: vec![first],
            update: ImageUpdate::Selected(false),
        });
        proxy.send(MoverCommand::Download);

        assert_eq!(next_event(&rx), MoverEvent::SelectedImagesCount(1));
        let report = wait_for_report(&rx);
        assert_eq!(report.message, "Download completed! 1 images downloaded.");
        proxy.stop();
    }

    #[test]
    fn test_cancel_outside_download_is_ignored() {
        let dir = tempdir().unwrap();
        let mut proxy = start_mover(dir.path().join(SEQUENCES_FILE_NAME));
        let rx = subscribe_all(&proxy);

        proxy.send(MoverCommand::Cancel);
        proxy.send(MoverCommand::GetFoldersPreview);
        assert_eq!(next_event(&rx), MoverEvent::FolderPreview(vec![]));
        proxy.stop();
    }
}
