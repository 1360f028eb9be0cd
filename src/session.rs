//! Download session: drives the scanner, EXIF loader and mover end to end
//!
//! One session runs the whole download flow:
//!
//! 1. scan the source and build the working set from the published batches
//! 2. request the capture date/time of every selected image
//! 3. push the context (destination, templates, images) to the mover
//! 4. download, then record the moved images in the previously-downloaded
//!    store and ask the mover to save the sequences
//!
//! Every worker event is funnelled into one channel read by the session
//! thread, so progress callbacks never run on a listener thread.

use crate::core::config::{Config, TransferMode};
use crate::core::error::{DownloadError, Result};
use crate::core::image::{Datation, DownloadInfo, Image, ImageKey};
use crate::core::sequences::Sequences;
use crate::downloaded::{DownloadRecord, FileKey, SqliteDownloadedStore};
use crate::exif::exiftool::ExifTool;
use crate::exif::{ExifCommand, ExifEvent, ExifLoader, MetadataReader};
use crate::mover::{DownloadReport, ImageMover, ImagePreview, MoverCommand, MoverEvent};
use crate::naming::{NamingTemplate, NamingTemplates, TemplateType};
use crate::scanner::{ImageScanner, ScannedImage, ScannerCommand, ScannerEvent, SharedStore};
use crate::worker::{Hosting, Timing, WorkerProxy};
use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use log::{debug, info, warn};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Longest silence tolerated from the workers before giving up
const IDLE_TIMEOUT: Duration = Duration::from_secs(60);

// ============================================================================
// Worker construction
// ============================================================================

/// Open the previously-downloaded store, or run without one
pub fn open_store(config: &Config) -> Option<SharedStore> {
    let path = config.storage.downloaded_db_path();
    if let Some(parent) = path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }
    match SqliteDownloadedStore::open(&path) {
        Ok(store) => {
            let store: SharedStore = Arc::new(Mutex::new(store));
            Some(store)
        }
        Err(e) => {
            warn!("Cannot open previously downloaded database: {}", e);
            None
        }
    }
}

pub fn build_scanner(config: &Config, store: Option<SharedStore>) -> ImageScanner {
    let scanner = ImageScanner::new(config.scanner.batch_size);
    match store {
        Some(store) => scanner.with_store(store),
        None => scanner,
    }
}

pub fn build_exif_loader(config: &Config) -> ExifLoader<ExifTool> {
    ExifLoader::new(ExifTool::new(config.exiftool.program.clone()))
}

pub fn build_mover(config: &Config) -> ImageMover {
    ImageMover::new(
        Sequences::new(config.storage.sequences_path()),
        config.download.transfer,
    )
}

pub fn timing(config: &Config) -> Timing {
    Timing {
        poll_interval: config.workers.poll_interval(),
        stop_timeout: config.workers.stop_timeout(),
    }
}

// ============================================================================
// Options and results
// ============================================================================

/// What to download and how to name it
#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub source: PathBuf,
    pub destination: PathBuf,
    pub include_subdirs: bool,
    pub transfer: TransferMode,
    pub image_template: NamingTemplate,
    pub destination_template: NamingTemplate,
    /// Session label applied to every image
    pub session: String,
    /// Deselect images found in the previously-downloaded store
    pub skip_previously_downloaded: bool,
}

impl SessionOptions {
    /// Options from the `[download]` section, templates looked up by key
    pub fn from_config(config: &Config, source: PathBuf, templates: &NamingTemplates) -> Result<Self> {
        let download = &config.download;
        Ok(Self {
            source,
            destination: download.destination.clone(),
            include_subdirs: download.include_subdirs,
            transfer: download.transfer,
            image_template: templates.require(TemplateType::Image, &download.image_template)?,
            destination_template: templates
                .require(TemplateType::Destination, &download.destination_template)?,
            session: download.session.clone(),
            skip_previously_downloaded: download.skip_previously_downloaded,
        })
    }
}

/// Progress callbacks, all invoked on the session thread
pub trait SessionProgress {
    fn scanned(&mut self, _found: usize) {}
    fn metadata_loaded(&mut self, _done: usize, _total: usize) {}
    fn download_started(&mut self, _total: usize) {}
    fn downloaded(&mut self, _done: usize) {}
}

impl SessionProgress for () {}

/// Outcome of a download session
#[derive(Debug, Clone)]
pub struct SessionSummary {
    /// Images found on the source
    pub scanned: usize,
    /// Images deselected because they were downloaded before
    pub skipped: usize,
    /// `None` when the session was cancelled before the download started
    pub report: Option<DownloadReport>,
    /// Rows written to the previously-downloaded store
    pub recorded: usize,
    pub sequences_saved: bool,
}

impl SessionSummary {
    pub fn message(&self) -> String {
        match &self.report {
            Some(report) => report.message.clone(),
            None => "Download cancelled! 0 images downloaded.".to_string(),
        }
    }
}

/// Names the next download would produce
#[derive(Debug, Clone, Default)]
pub struct PreviewSummary {
    pub scanned: usize,
    pub candidates: usize,
    /// Name and folder of the first candidate
    pub sample: Option<ImagePreview>,
    pub folders: Vec<String>,
}

// ============================================================================
// Session
// ============================================================================

#[derive(Debug)]
enum SessionEvent {
    Images(Vec<ScannedImage>),
    ScanComplete { count: usize, stopped: bool },
    Datetime { key: ImageKey, datetime: Datation },
    Mover(MoverEvent),
}

/// Working set built from a scan
struct WorkingSet {
    scanned: usize,
    skipped: usize,
    images: Vec<Image>,
}

impl WorkingSet {
    fn candidates(&self) -> impl Iterator<Item = &Image> {
        self.images.iter().filter(|image| image.is_candidate())
    }
}

/// Orchestrator of one scanner, one EXIF loader and one mover
pub struct DownloadSession<R: MetadataReader + 'static = ExifTool> {
    scanner: WorkerProxy<ImageScanner>,
    exif: WorkerProxy<ExifLoader<R>>,
    mover: WorkerProxy<ImageMover>,
    store: Option<SharedStore>,
    events: Receiver<SessionEvent>,
    cancel: Arc<AtomicBool>,
    poll_interval: Duration,
}

impl DownloadSession<ExifTool> {
    /// Start the three workers as configured
    ///
    /// `config_path` is forwarded to process-hosted workers.
    pub fn start(config: &Config, config_path: Option<&Path>, cancel: Arc<AtomicBool>) -> Result<Self> {
        let hosting = config.workers.to_hosting(config_path);
        let timing = timing(config);
        let store = open_store(config);
        info!("Starting workers ({:?})...", hosting);

        let scanner_store = store.clone();
        let scanner = WorkerProxy::start(&hosting, timing, || build_scanner(config, scanner_store))?;
        let exif = WorkerProxy::start(&hosting, timing, || build_exif_loader(config))?;
        let mover = WorkerProxy::start(&hosting, timing, || build_mover(config))?;
        Ok(Self::new(scanner, exif, mover, store, cancel, timing))
    }
}

impl<R: MetadataReader + 'static> DownloadSession<R> {
    /// Wrap already started workers
    pub fn new(
        scanner: WorkerProxy<ImageScanner>,
        exif: WorkerProxy<ExifLoader<R>>,
        mover: WorkerProxy<ImageMover>,
        store: Option<SharedStore>,
        cancel: Arc<AtomicBool>,
        timing: Timing,
    ) -> Self {
        let (tx, events) = unbounded();
        subscribe(&scanner, &exif, &mover, tx);
        Self {
            scanner,
            exif,
            mover,
            store,
            events,
            cancel,
            poll_interval: timing.poll_interval,
        }
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }

    /// Next event, `None` on a poll tick
    fn recv(&self, last_event: &mut Instant) -> Result<Option<SessionEvent>> {
        match self.events.recv_timeout(self.poll_interval) {
            Ok(event) => {
                *last_event = Instant::now();
                Ok(Some(event))
            }
            Err(RecvTimeoutError::Timeout) if last_event.elapsed() < IDLE_TIMEOUT => Ok(None),
            Err(RecvTimeoutError::Timeout) => Err(DownloadError::Worker(format!(
                "no answer from workers for {} s",
                IDLE_TIMEOUT.as_secs()
            ))),
            Err(RecvTimeoutError::Disconnected) => {
                Err(DownloadError::Worker("worker listeners are gone".to_string()))
            }
        }
    }

    /// Scan the source; `None` when cancelled
    fn scan(&mut self, options: &SessionOptions, progress: &mut impl SessionProgress) -> Result<Option<WorkingSet>> {
        info!("Scanning {}...", options.source.display());
        self.scanner.send(ScannerCommand::Scan {
            path: options.source.clone(),
            include_subdirs: options.include_subdirs,
        });

        let mut set = WorkingSet {
            scanned: 0,
            skipped: 0,
            images: Vec::new(),
        };
        let mut aborted = false;
        let mut last_event = Instant::now();
        loop {
            if !aborted && self.is_cancelled() {
                self.scanner.send(ScannerCommand::Abort);
                aborted = true;
            }
            match self.recv(&mut last_event)? {
                Some(SessionEvent::Images(batch)) => {
                    for scanned in batch {
                        let image = image_from_scan(scanned, options);
                        if !image.is_selected {
                            set.skipped += 1;
                        }
                        set.images.push(image);
                    }
                    set.scanned = set.images.len();
                    progress.scanned(set.scanned);
                }
                Some(SessionEvent::ScanComplete { count, stopped }) => {
                    debug!("Scan complete: {} images, stopped: {}", count, stopped);
                    if stopped || aborted {
                        return Ok(None);
                    }
                    return Ok(Some(set));
                }
                Some(other) => debug!("Ignoring {:?} while scanning", other),
                None => {}
            }
        }
    }

    /// Load the capture date/time of every selected image; `false` when cancelled
    fn load_datetimes(&mut self, set: &mut WorkingSet, progress: &mut impl SessionProgress) -> Result<bool> {
        let index: HashMap<ImageKey, usize> = set
            .images
            .iter()
            .enumerate()
            .filter(|(_, image)| image.is_selected)
            .map(|(i, image)| (image.key().to_string(), i))
            .collect();
        let total = index.len();
        info!("Loading date/time of {} images...", total);
        for key in index.keys() {
            self.exif.send(ExifCommand::LoadDatetime(key.clone()));
        }

        let mut done = 0;
        let mut last_event = Instant::now();
        progress.metadata_loaded(done, total);
        while done < total {
            if self.is_cancelled() {
                return Ok(false);
            }
            match self.recv(&mut last_event)? {
                Some(SessionEvent::Datetime { key, datetime }) => {
                    if let Some(&i) = index.get(&key) {
                        if set.images[i].datetime.is_none() {
                            done += 1;
                        }
                        set.images[i].datetime = Some(datetime);
                        progress.metadata_loaded(done, total);
                    }
                }
                Some(other) => debug!("Ignoring {:?} while loading metadata", other),
                None => {}
            }
        }
        Ok(true)
    }

    fn push_context(&self, options: &SessionOptions, set: &WorkingSet) {
        self.mover.send(MoverCommand::SetDestination(options.destination.clone()));
        self.mover.send(MoverCommand::SetTransferMode(options.transfer));
        self.mover
            .send(MoverCommand::SetImageTemplate(options.image_template.clone()));
        self.mover.send(MoverCommand::SetDestinationTemplate(
            options.destination_template.clone(),
        ));
        self.mover.send(MoverCommand::SetImages(set.images.clone()));
    }

    /// Scan, load metadata and prepare the mover
    fn prepare(&mut self, options: &SessionOptions, progress: &mut impl SessionProgress) -> Result<Option<WorkingSet>> {
        let Some(mut set) = self.scan(options, progress)? else {
            return Ok(None);
        };
        if !self.load_datetimes(&mut set, progress)? {
            return Ok(None);
        }
        self.push_context(options, &set);
        Ok(Some(set))
    }

    /// Run a full download
    pub fn download(&mut self, options: &SessionOptions, progress: &mut impl SessionProgress) -> Result<SessionSummary> {
        let Some(set) = self.prepare(options, progress)? else {
            info!("Download cancelled before it started");
            return Ok(SessionSummary {
                scanned: 0,
                skipped: 0,
                report: None,
                recorded: 0,
                sequences_saved: false,
            });
        };

        // Source identities are read before a move removes the files
        let keys: HashMap<ImageKey, FileKey> = set
            .candidates()
            .filter_map(|image| match FileKey::from_path(&image.source_path()) {
                Ok(key) => Some((image.key().to_string(), key)),
                Err(e) => {
                    warn!("Cannot read {}: {}", image.path, e);
                    None
                }
            })
            .collect();

        self.mover.send(MoverCommand::Download);
        let report = self.wait_for_report(progress)?;
        info!("{}", report.message);

        let recorded = self.record(&report, &keys);
        let sequences_saved = self.save_sequences()?;

        Ok(SessionSummary {
            scanned: set.scanned,
            skipped: set.skipped,
            report: Some(report),
            recorded,
            sequences_saved,
        })
    }

    fn wait_for_report(&mut self, progress: &mut impl SessionProgress) -> Result<DownloadReport> {
        let mut cancel_sent = false;
        let mut last_event = Instant::now();
        loop {
            if !cancel_sent && self.is_cancelled() {
                info!("Cancelling download...");
                self.mover.send(MoverCommand::Cancel);
                cancel_sent = true;
            }
            match self.recv(&mut last_event)? {
                Some(SessionEvent::Mover(MoverEvent::SelectedImagesCount(total))) => {
                    progress.download_started(total)
                }
                Some(SessionEvent::Mover(MoverEvent::DownloadedImagesCount(done))) => {
                    progress.downloaded(done)
                }
                Some(SessionEvent::Mover(MoverEvent::DownloadCompleted(report)))
                | Some(SessionEvent::Mover(MoverEvent::DownloadCancelled(report))) => {
                    return Ok(report)
                }
                Some(other) => debug!("Ignoring {:?} while downloading", other),
                None => {}
            }
        }
    }

    /// Record the moved images, once per terminal outcome
    fn record(&self, report: &DownloadReport, keys: &HashMap<ImageKey, FileKey>) -> usize {
        let Some(store) = &self.store else {
            return 0;
        };
        let records: Vec<DownloadRecord> = report
            .images
            .iter()
            .filter_map(|image| {
                keys.get(&image.key).map(|key| DownloadRecord {
                    key: key.clone(),
                    download_name: image.destination.to_string_lossy().into_owned(),
                    download_datetime: image.download_time,
                })
            })
            .collect();
        if records.is_empty() {
            return 0;
        }

        let mut store = store.lock().unwrap_or_else(|e| e.into_inner());
        match store.upsert_many(&records) {
            Ok(count) => count,
            Err(e) => {
                warn!("Cannot record downloaded images: {}", e);
                0
            }
        }
    }

    fn save_sequences(&mut self) -> Result<bool> {
        self.mover.send(MoverCommand::SaveSequences);
        let mut last_event = Instant::now();
        loop {
            match self.recv(&mut last_event)? {
                Some(SessionEvent::Mover(MoverEvent::SequencesSaved)) => return Ok(true),
                Some(SessionEvent::Mover(MoverEvent::SequencesSaveFailed(message))) => {
                    warn!("{}", message);
                    return Ok(false);
                }
                Some(other) => debug!("Ignoring {:?} while saving sequences", other),
                None => {}
            }
        }
    }

    /// Scan and render the names the next download would produce
    pub fn preview(&mut self, options: &SessionOptions, progress: &mut impl SessionProgress) -> Result<PreviewSummary> {
        let Some(set) = self.prepare(options, progress)? else {
            return Ok(PreviewSummary::default());
        };
        let sample = set.candidates().next().cloned();
        let candidates = set.candidates().count();

        self.mover.send(MoverCommand::GetFoldersPreview);
        if let Some(sample) = &sample {
            self.mover.send(MoverCommand::GetImagePreview(sample.clone()));
        }

        let mut summary = PreviewSummary {
            scanned: set.scanned,
            candidates,
            sample: None,
            folders: Vec::new(),
        };
        let mut folders_done = false;
        let mut last_event = Instant::now();
        while !folders_done || (sample.is_some() && summary.sample.is_none()) {
            match self.recv(&mut last_event)? {
                Some(SessionEvent::Mover(MoverEvent::FolderPreview(folders))) => {
                    summary.folders = folders;
                    folders_done = true;
                }
                Some(SessionEvent::Mover(MoverEvent::ImagePreview(preview))) => {
                    summary.sample = Some(preview)
                }
                Some(other) => debug!("Ignoring {:?} while previewing", other),
                None => {}
            }
        }
        Ok(summary)
    }

    /// Stop every worker
    pub fn stop(&mut self) {
        self.scanner.stop();
        self.exif.stop();
        self.mover.stop();
    }
}

fn subscribe<R: MetadataReader + 'static>(
    scanner: &WorkerProxy<ImageScanner>,
    exif: &WorkerProxy<ExifLoader<R>>,
    mover: &WorkerProxy<ImageMover>,
    tx: Sender<SessionEvent>,
) {
    let images_tx = tx.clone();
    scanner.subscribe("images", move |event| {
        if let ScannerEvent::Images { images, .. } = event {
            let _ = images_tx.send(SessionEvent::Images(images.clone()));
        }
    });
    let complete_tx = tx.clone();
    scanner.subscribe("scan_complete", move |event| {
        if let ScannerEvent::ScanComplete { count, stopped } = event {
            let _ = complete_tx.send(SessionEvent::ScanComplete {
                count: *count,
                stopped: *stopped,
            });
        }
    });

    let datetime_tx = tx.clone();
    exif.subscribe("datetime", move |event| {
        if let ExifEvent::Datetime { key, datetime } = event {
            let _ = datetime_tx.send(SessionEvent::Datetime {
                key: key.clone(),
                datetime: datetime.clone(),
            });
        }
    });

    for topic in [
        "image_preview",
        "folder_preview",
        "selected_images_count",
        "downloaded_images_count",
        "download_completed",
        "download_cancelled",
        "sequences_saved",
        "sequences_save_failed",
    ] {
        let tx = tx.clone();
        mover.subscribe(topic, move |event| {
            let _ = tx.send(SessionEvent::Mover(event.clone()));
        });
    }
}

fn image_from_scan(scanned: ScannedImage, options: &SessionOptions) -> Image {
    let mut image = Image::new(&scanned.name, &scanned.path);
    image.session = options.session.clone();
    if let Some(found) = scanned.downloaded {
        debug!("{} was downloaded before as {}", image.name, found.download_name);
        image.download_info = DownloadInfo::Matched {
            path: found.download_name,
            time: found.download_datetime,
        };
        if options.skip_previously_downloaded {
            image.is_selected = false;
        }
    }
    image
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::sequences::SEQUENCES_FILE_NAME;
    use crate::exif::Tags;
    use serde_json::{json, Value};
    use std::fs;
    use tempfile::{tempdir, TempDir};

    /// Reader giving every file the same capture date
    struct FixedDateReader;

    impl MetadataReader for FixedDateReader {
        fn read_tags(&mut self, _path: &Path, _tags: &[&str]) -> Result<Tags> {
            match json!({"EXIF:DateTimeOriginal": "2022:08:15 09:30:00"}) {
                Value::Object(map) => Ok(map),
                _ => Ok(Tags::new()),
            }
        }
    }

    struct Fixture {
        dir: TempDir,
        store: SharedStore,
    }

    impl Fixture {
        fn new(files: &[&str]) -> Self {
            let dir = tempdir().unwrap();
            let card = dir.path().join("card").join("DCIM");
            fs::create_dir_all(&card).unwrap();
            for name in files {
                fs::write(card.join(name), name.as_bytes()).unwrap();
            }
            let store: SharedStore = Arc::new(Mutex::new(
                SqliteDownloadedStore::open(&dir.path().join("downloaded.db")).unwrap(),
            ));
            Self { dir, store }
        }

        fn session(&self, cancel: Arc<AtomicBool>) -> DownloadSession<FixedDateReader> {
            let timing = Timing::default();
            let store = Arc::clone(&self.store);
            let sequences = self.dir.path().join(SEQUENCES_FILE_NAME);
            DownloadSession::new(
                WorkerProxy::start(&Hosting::Thread, timing, || {
                    ImageScanner::new(2).with_store(store)
                })
                .unwrap(),
                WorkerProxy::start(&Hosting::Thread, timing, || ExifLoader::new(FixedDateReader))
                    .unwrap(),
                WorkerProxy::start(&Hosting::Thread, timing, || {
                    ImageMover::new(Sequences::new(sequences), TransferMode::Copy)
                })
                .unwrap(),
                Some(Arc::clone(&self.store)),
                cancel,
                timing,
            )
        }

        fn options(&self) -> SessionOptions {
            SessionOptions {
                source: self.dir.path().join("card"),
                destination: self.dir.path().join("photos"),
                include_subdirs: true,
                transfer: TransferMode::Copy,
                image_template: NamingTemplate::from_names(
                    "T",
                    "Test",
                    &["Image date (YYYYMMDD)", "_", "Stored number (4 digits)"],
                ),
                destination_template: NamingTemplate::from_names(
                    "D",
                    "Dest",
                    &["Image date (YYYY)", "/", "Session"],
                ),
                session: "Trip".to_string(),
                skip_previously_downloaded: true,
            }
        }
    }

    #[derive(Default)]
    struct Recorder {
        scanned: usize,
        selected: usize,
        downloaded: Vec<usize>,
    }

    impl SessionProgress for Recorder {
        fn scanned(&mut self, found: usize) {
            self.scanned = found;
        }
        fn download_started(&mut self, total: usize) {
            self.selected = total;
        }
        fn downloaded(&mut self, done: usize) {
            self.downloaded.push(done);
        }
    }

    #[test]
    fn test_full_session_downloads_and_records() {
        let fixture = Fixture::new(&["A.JPG", "B.NEF", "C.jpg", "notes.txt"]);
        let mut session = fixture.session(Arc::new(AtomicBool::new(false)));
        let mut recorder = Recorder::default();

        let summary = session.download(&fixture.options(), &mut recorder).unwrap();
        session.stop();

        let report = summary.report.unwrap();
        assert_eq!(summary.scanned, 3);
        assert_eq!(report.message, "Download completed! 3 images downloaded.");
        assert_eq!(summary.recorded, 3);
        assert!(summary.sequences_saved);
        assert_eq!(recorder.scanned, 3);
        assert_eq!(recorder.selected, 3);
        assert_eq!(recorder.downloaded, vec![1, 2, 3]);

        let folder = fixture.dir.path().join("photos").join("2022").join("Trip");
        for name in ["20220815_0001.jpg", "20220815_0002.nef", "20220815_0003.jpg"] {
            assert!(folder.join(name).exists(), "missing {}", name);
        }
        let store = fixture.store.lock().unwrap();
        let key = FileKey::from_path(&fixture.dir.path().join("card/DCIM/A.JPG")).unwrap();
        assert!(store.lookup(&key).unwrap().is_some());
    }

    #[test]
    fn test_second_session_skips_previously_downloaded() {
        let fixture = Fixture::new(&["A.JPG", "B.JPG"]);
        let mut first = fixture.session(Arc::new(AtomicBool::new(false)));
        first.download(&fixture.options(), &mut ()).unwrap();
        first.stop();

        let mut second = fixture.session(Arc::new(AtomicBool::new(false)));
        let summary = second.download(&fixture.options(), &mut ()).unwrap();
        second.stop();

        assert_eq!(summary.scanned, 2);
        assert_eq!(summary.skipped, 2);
        assert_eq!(summary.report.unwrap().images.len(), 0);
        assert_eq!(summary.recorded, 0);
    }

    #[test]
    fn test_preview_does_not_consume_sequences() {
        let fixture = Fixture::new(&["A.JPG", "B.JPG"]);
        let mut session = fixture.session(Arc::new(AtomicBool::new(false)));

        let preview = session.preview(&fixture.options(), &mut ()).unwrap();
        assert_eq!(preview.candidates, 2);
        let sample = preview.sample.unwrap();
        assert_eq!(sample.name, "20220815_0001.jpg");
        assert_eq!(preview.folders.len(), 1);

        let summary = session.download(&fixture.options(), &mut ()).unwrap();
        session.stop();
        let first = &summary.report.unwrap().images[0];
        assert_eq!(first.destination.file_name().unwrap().to_string_lossy(), sample.name);
    }

    #[test]
    fn test_cancelled_before_start() {
        let fixture = Fixture::new(&["A.JPG"]);
        let mut session = fixture.session(Arc::new(AtomicBool::new(true)));
        let summary = session.download(&fixture.options(), &mut ()).unwrap();
        session.stop();

        assert!(summary.report.is_none());
        assert_eq!(summary.recorded, 0);
        assert!(!fixture.dir.path().join("photos").exists());
    }
}
