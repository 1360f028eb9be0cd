//! Image scanner worker
//!
//! Walks a source folder (optionally recursively) on an interruptible thread
//! and publishes the image files it finds in fixed-size batches:
//!
//! - `images`: `{batch, images}`, one event per full batch plus the remainder
//! - `scan_complete`: `{count, stopped}`, once per scan, completed or aborted
//!
//! The stop flag is checked once per filesystem entry. On abort the partially
//! filled batch is dropped, so subscribers only ever see complete batches.

use crate::downloaded::{DownloadedStore, FileDownloaded, FileKey};
use crate::worker::{Context, Publisher, Tagged, Worker, WorkerKind};
use log::{debug, info, trace, warn};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use walkdir::WalkDir;

/// Image file extensions the scanner reports (compared case-insensitively)
pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "raf", "nef", "dng"];

/// Default number of images per batch
pub const DEFAULT_BATCH_SIZE: usize = 500;

/// How long an abort waits for the walking thread
const ABORT_TIMEOUT: Duration = Duration::from_millis(500);

/// Previously-downloaded store shared with the walking thread
pub type SharedStore = Arc<Mutex<dyn DownloadedStore>>;

/// Check if a path has an image extension
pub fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| IMAGE_EXTENSIONS.contains(&e.to_lowercase().as_str()))
        .unwrap_or(false)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ScannerCommand {
    /// Start scanning, aborting any scan in flight
    Scan {
        path: PathBuf,
        include_subdirs: bool,
    },
    /// Abort the current scan
    Abort,
}

impl Tagged for ScannerCommand {
    fn tag(&self) -> &'static str {
        match self {
            ScannerCommand::Scan { .. } => "scan",
            ScannerCommand::Abort => "abort",
        }
    }
}

/// An image file found by the scanner
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScannedImage {
    pub name: String,
    pub path: String,
    /// Match in the previously-downloaded store
    pub downloaded: Option<FileDownloaded>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ScannerEvent {
    Images {
        /// 1-based batch number
        batch: usize,
        images: Vec<ScannedImage>,
    },
    ScanComplete {
        /// Number of images published
        count: usize,
        stopped: bool,
    },
}

impl Tagged for ScannerEvent {
    fn tag(&self) -> &'static str {
        match self {
            ScannerEvent::Images { .. } => "images",
            ScannerEvent::ScanComplete { .. } => "scan_complete",
        }
    }
}

/// Result of one walk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanOutcome {
    /// Images published
    pub count: usize,
    /// Batches published
    pub batches: usize,
    /// The walk was interrupted
    pub stopped: bool,
}

/// Walk `root` and hand each batch to `emit`
///
/// `emit` returns `false` when its consumer is gone, which stops the walk
/// like an abort does.
pub fn scan_images(
    root: &Path,
    include_subdirs: bool,
    batch_size: usize,
    stop: &AtomicBool,
    store: Option<&SharedStore>,
    mut emit: impl FnMut(usize, Vec<ScannedImage>) -> bool,
) -> ScanOutcome {
    let batch_size = batch_size.max(1);
    let walker = WalkDir::new(root)
        .max_depth(if include_subdirs { usize::MAX } else { 1 })
        .sort_by_file_name();

    let mut outcome = ScanOutcome {
        count: 0,
        batches: 0,
        stopped: false,
    };
    let mut batch = Vec::with_capacity(batch_size);

    for entry in walker {
        if stop.load(Ordering::SeqCst) {
            info!("Stop scanning images for {}", root.display());
            outcome.stopped = true;
            batch.clear();
            break;
        }

        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                debug!("Skipping unreadable entry: {}", e);
                continue;
            }
        };
        if !entry.file_type().is_file() || !is_image(entry.path()) {
            continue;
        }

        let path = entry.path();
        batch.push(ScannedImage {
            name: entry.file_name().to_string_lossy().into_owned(),
            path: path.to_string_lossy().into_owned(),
            downloaded: store.and_then(|store| previously_downloaded(store, path)),
        });
        trace!("Found image: {}", path.display());

        if batch.len() == batch_size {
            outcome.batches += 1;
            outcome.count += batch.len();
            debug!("Sending images: batch#{}", outcome.batches);
            if !emit(outcome.batches, std::mem::take(&mut batch)) {
                outcome.stopped = true;
                break;
            }
        }
    }

    if !batch.is_empty() {
        outcome.batches += 1;
        outcome.count += batch.len();
        debug!("Sending remaining images: batch#{}", outcome.batches);
        emit(outcome.batches, batch);
    }

    outcome
}

fn previously_downloaded(store: &SharedStore, path: &Path) -> Option<FileDownloaded> {
    let key = FileKey::from_path(path).ok()?;
    let store = store.lock().unwrap_or_else(|e| e.into_inner());
    match store.lookup(&key) {
        Ok(found) => found,
        Err(e) => {
            warn!("Cannot check if {} was downloaded: {}", key.name, e);
            None
        }
    }
}

struct ScanHandler {
    label: String,
    stop: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

/// Scanner worker
pub struct ImageScanner {
    batch_size: usize,
    store: Option<SharedStore>,
    handler: Option<ScanHandler>,
}

impl ImageScanner {
    pub fn new(batch_size: usize) -> Self {
        Self {
            batch_size,
            store: None,
            handler: None,
        }
    }

    /// Look each found file up in a previously-downloaded store
    pub fn with_store(mut self, store: SharedStore) -> Self {
        self.store = Some(store);
        self
    }

    fn start_scan(&mut self, path: PathBuf, include_subdirs: bool, publisher: Publisher<ScannerEvent>) {
        self.abort();

        let label = if include_subdirs {
            format!("{} and its subfolders", path.display())
        } else {
            path.display().to_string()
        };
        let stop = Arc::new(AtomicBool::new(false));
        let batch_size = self.batch_size;
        let store = self.store.clone();

        let spawned = {
            let stop = Arc::clone(&stop);
            let label = label.clone();
            thread::Builder::new()
                .name("scan-handler".to_string())
                .spawn(move || {
                    info!("Scanning images for {}...", label);
                    let outcome = scan_images(
                        &path,
                        include_subdirs,
                        batch_size,
                        &stop,
                        store.as_ref(),
                        |batch, images| publisher.publish(ScannerEvent::Images { batch, images }),
                    );
                    if !outcome.stopped {
                        info!(
                            "{} images found and sent in {} batches",
                            outcome.count, outcome.batches
                        );
                    }
                    publisher.publish(ScannerEvent::ScanComplete {
                        count: outcome.count,
                        stopped: outcome.stopped,
                    });
                })
        };

        match spawned {
            Ok(handle) => self.handler = Some(ScanHandler { label, stop, handle }),
            Err(e) => warn!("Cannot start scanning {}: {}", label, e),
        }
    }

    fn abort(&mut self) {
        let Some(handler) = self.handler.take() else {
            return;
        };
        if handler.handle.is_finished() {
            let _ = handler.handle.join();
            return;
        }

        info!("Stopping {} scan handler...", handler.label);
        handler.stop.store(true, Ordering::SeqCst);
        let deadline = Instant::now() + ABORT_TIMEOUT;
        while !handler.handle.is_finished() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        if handler.handle.is_finished() {
            let _ = handler.handle.join();
            info!("{} scan handler stopped", handler.label);
        } else {
            warn!("Cannot join scan handler for {}", handler.label);
        }
    }
}

impl Worker for ImageScanner {
    const KIND: WorkerKind = WorkerKind::Scanner;
    const NAME: &'static str = "ImageScanner";
    type Command = ScannerCommand;
    type Event = ScannerEvent;

    fn handle(&mut self, command: ScannerCommand, ctx: &mut Context<'_, ScannerCommand, ScannerEvent>) {
        match command {
            ScannerCommand::Scan {
                path,
                include_subdirs,
            } => self.start_scan(path, include_subdirs, ctx.publisher().clone()),
            ScannerCommand::Abort => self.abort(),
        }
    }

    fn post_run(&mut self) {
        self.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::downloaded::{DownloadRecord, SqliteDownloadedStore};
    use crate::worker::{Hosting, Timing, WorkerProxy};
    use chrono::NaiveDate;
    use std::fs;
    use std::sync::atomic::AtomicUsize;
    use tempfile::{tempdir, TempDir};

    fn make_tree(images: usize) -> TempDir {
        let dir = tempdir().unwrap();
        for i in 0..images {
            fs::write(dir.path().join(format!("IMG_{:04}.JPG", i)), b"x").unwrap();
        }
        fs::write(dir.path().join("notes.txt"), b"x").unwrap();
        fs::write(dir.path().join("clip.MOV"), b"x").unwrap();
        let sub = dir.path().join("sub");
        fs::create_dir(&sub).unwrap();
        fs::write(sub.join("DSCF0001.raf"), b"x").unwrap();
        fs::write(sub.join("DSC_0001.NEF"), b"x").unwrap();
        dir
    }

    fn collect(
        root: &Path,
        include_subdirs: bool,
        batch_size: usize,
    ) -> (Vec<(usize, Vec<ScannedImage>)>, ScanOutcome) {
        let stop = AtomicBool::new(false);
        let mut batches = Vec::new();
        let outcome = scan_images(root, include_subdirs, batch_size, &stop, None, |n, images| {
            batches.push((n, images));
            true
        });
        (batches, outcome)
    }

    #[test]
    fn test_is_image() {
        assert!(is_image(Path::new("a.JPG")));
        assert!(is_image(Path::new("a.raf")));
        assert!(is_image(Path::new("/x/a.Nef")));
        assert!(is_image(Path::new("a.dng")));
        assert!(!is_image(Path::new("a.jpeg")));
        assert!(!is_image(Path::new("a.mov")));
        assert!(!is_image(Path::new("jpg")));
    }

    #[test]
    fn test_batches_cover_every_image_once() {
        let dir = make_tree(7);
        let (batches, outcome) = collect(dir.path(), true, 3);

        assert_eq!(outcome.count, 9);
        assert_eq!(outcome.batches, 3);
        assert!(!outcome.stopped);
        assert_eq!(
            batches.iter().map(|(n, _)| *n).collect::<Vec<_>>(),
            vec![1, 2, 3]
        );
        assert_eq!(
            batches.iter().map(|(_, b)| b.len()).collect::<Vec<_>>(),
            vec![3, 3, 3]
        );

        let mut paths: Vec<String> = batches
            .into_iter()
            .flat_map(|(_, b)| b.into_iter().map(|i| i.path))
            .collect();
        let total = paths.len();
        paths.sort();
        paths.dedup();
        assert_eq!(paths.len(), total);
    }

    #[test]
    fn test_remainder_batch_and_single_level() {
        let dir = make_tree(5);
        let (batches, outcome) = collect(dir.path(), false, 2);
        assert_eq!(outcome.count, 5);
        assert_eq!(
            batches.iter().map(|(_, b)| b.len()).collect::<Vec<_>>(),
            vec![2, 2, 1]
        );
        assert!(batches
            .iter()
            .flat_map(|(_, b)| b.iter())
            .all(|i| i.name.starts_with("IMG_")));
    }

    #[test]
    fn test_empty_and_missing_folders() {
        let dir = tempdir().unwrap();
        let (batches, outcome) = collect(dir.path(), true, 10);
        assert!(batches.is_empty());
        assert_eq!(outcome.count, 0);

        let (batches, outcome) = collect(&dir.path().join("missing"), true, 10);
        assert!(batches.is_empty());
        assert_eq!(outcome.batches, 0);
    }

    #[test]
    fn test_abort_after_full_batch() {
        let dir = make_tree(10);
        let stop = AtomicBool::new(false);
        let mut published = Vec::new();
        let outcome = scan_images(dir.path(), false, 4, &stop, None, |_, images| {
            published.push(images.len());
            // Raise the stop flag as soon as the first batch is out
            stop.store(true, Ordering::SeqCst);
            true
        });

        assert!(outcome.stopped);
        assert_eq!(published, vec![4]);
        assert_eq!(outcome.count, 4);
    }

    /// Store whose lookups raise the stop flag after `limit` calls
    struct StopAfterLookups {
        lookups: AtomicUsize,
        limit: usize,
        stop: Arc<AtomicBool>,
    }

    impl DownloadedStore for StopAfterLookups {
        fn lookup(&self, _key: &FileKey) -> crate::core::error::Result<Option<FileDownloaded>> {
            if self.lookups.fetch_add(1, Ordering::SeqCst) + 1 == self.limit {
                self.stop.store(true, Ordering::SeqCst);
            }
            Ok(None)
        }

        fn upsert_many(&mut self, records: &[DownloadRecord]) -> crate::core::error::Result<usize> {
            Ok(records.len())
        }
    }

    #[test]
    fn test_abort_discards_partial_batch() {
        let dir = make_tree(10);
        let stop = Arc::new(AtomicBool::new(false));
        // Second batch holds 2 of 4 images when the flag goes up
        let store: SharedStore = Arc::new(Mutex::new(StopAfterLookups {
            lookups: AtomicUsize::new(0),
            limit: 6,
            stop: Arc::clone(&stop),
        }));

        let mut published = Vec::new();
        let outcome = scan_images(dir.path(), false, 4, &stop, Some(&store), |_, images| {
            published.push(images);
            true
        });

        assert!(outcome.stopped);
        assert_eq!(outcome.batches, 1);
        assert_eq!(outcome.count, 4);
        assert_eq!(published.len(), 1);
        assert_eq!(
            published[0].iter().map(|i| i.name.as_str()).collect::<Vec<_>>(),
            vec!["IMG_0000.JPG", "IMG_0001.JPG", "IMG_0002.JPG", "IMG_0003.JPG"]
        );
    }

    #[test]
    fn test_consumer_gone_stops_walk() {
        let dir = make_tree(10);
        let stop = AtomicBool::new(false);
        let mut calls = 0;
        let outcome = scan_images(dir.path(), false, 2, &stop, None, |_, _| {
            calls += 1;
            false
        });
        assert!(outcome.stopped);
        assert_eq!(calls, 1);
    }

    #[test]
    fn test_previously_downloaded_lookup() {
        let dir = make_tree(2);
        let first = dir.path().join("IMG_0000.JPG");
        let mut sqlite = SqliteDownloadedStore::open_in_memory().unwrap();
        sqlite
            .upsert_many(&[DownloadRecord {
                key: FileKey::from_path(&first).unwrap(),
                download_name: "/photos/20240301.jpg".to_string(),
                download_datetime: NaiveDate::from_ymd_opt(2024, 3, 1)
                    .unwrap()
                    .and_hms_opt(9, 0, 0)
                    .unwrap(),
            }])
            .unwrap();
        let store: SharedStore = Arc::new(Mutex::new(sqlite));

        let stop = AtomicBool::new(false);
        let mut images = Vec::new();
        scan_images(dir.path(), false, 10, &stop, Some(&store), |_, batch| {
            images.extend(batch);
            true
        });

        assert_eq!(images.len(), 2);
        assert_eq!(
            images[0].downloaded.as_ref().map(|d| d.download_name.as_str()),
            Some("/photos/20240301.jpg")
        );
        assert_eq!(images[1].downloaded, None);
    }

    #[test]
    fn test_scanner_worker_over_thread_transport() {
        let dir = make_tree(5);
        let mut proxy =
            WorkerProxy::start(&Hosting::Thread, Timing::default(), || ImageScanner::new(2))
                .unwrap();

        let (tx, rx) = crossbeam_channel::unbounded();
        let images_tx = tx.clone();
        proxy.subscribe("images", move |event| {
            let _ = images_tx.send(event.clone());
        });
        proxy.subscribe("scan_complete", move |event| {
            let _ = tx.send(event.clone());
        });

        proxy.send(ScannerCommand::Scan {
            path: dir.path().to_path_buf(),
            include_subdirs: true,
        });

        let mut count = 0;
        loop {
            match rx.recv_timeout(Duration::from_secs(5)).unwrap() {
                ScannerEvent::Images { images, .. } => count += images.len(),
                ScannerEvent::ScanComplete { count: total, stopped } => {
                    assert!(!stopped);
                    assert_eq!(total, 7);
                    break;
                }
            }
        }
        assert_eq!(count, 7);
        proxy.stop();
    }
}
