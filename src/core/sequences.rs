//! Sequence counters used by the "Sequences" naming tokens
//!
//! Three counters are kept:
//! - downloads today: number of images downloaded on the current calendar day,
//!   reset lazily the first time it is read on a new day
//! - stored number: lifetime counter, persisted across runs
//! - session number: starts at 1 on every run, never persisted
//!
//! Only the two durable counters are written to the sequences file, and only
//! when they changed since the last load or save:
//!
//! ```json
//! {"downloadsToday": ["2024-3-5", 7], "storedNumber": 42}
//! ```

use crate::core::error::{DownloadError, Result};
use chrono::{Datelike, Local, NaiveDate};
use log::{debug, info, warn};
use serde::de::{self, Deserializer};
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

/// Default sequences file name
pub const SEQUENCES_FILE_NAME: &str = "sequences.json";

fn local_today() -> NaiveDate {
    Local::now().date_naive()
}

/// Date-stamped count of today's downloads
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DownloadsToday {
    date: NaiveDate,
    count: u32,
}

impl DownloadsToday {
    pub fn new(date: NaiveDate, count: u32) -> Self {
        Self { date, count }
    }

    /// Count for `today`, resetting to 0 first if the stored date is stale
    pub fn get(&mut self, today: NaiveDate) -> u32 {
        if self.date < today {
            self.date = today;
            self.count = 0;
        }
        self.count
    }

    pub fn increment(&mut self, today: NaiveDate) {
        let count = self.get(today);
        self.count = count + 1;
    }

    pub fn date(&self) -> NaiveDate {
        self.date
    }
}

impl Serialize for DownloadsToday {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let date = format!("{}-{}-{}", self.date.year(), self.date.month(), self.date.day());
        (date, self.count).serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for DownloadsToday {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let (date, count) = <(String, u32)>::deserialize(deserializer)?;
        let mut parts = date.split('-').map(|p| p.parse::<u32>());
        let (year, month, day) = match (parts.next(), parts.next(), parts.next(), parts.next()) {
            (Some(Ok(y)), Some(Ok(m)), Some(Ok(d)), None) => (y, m, d),
            _ => return Err(de::Error::custom(format!("invalid date '{}'", date))),
        };
        let date = NaiveDate::from_ymd_opt(year as i32, month, day)
            .ok_or_else(|| de::Error::custom(format!("invalid date '{}'", date)))?;
        Ok(Self { date, count })
    }
}

/// The durable part of the sequences, as stored on disk
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredSequences {
    downloads_today: DownloadsToday,
    stored_number: u32,
}

impl StoredSequences {
    fn first_run(today: NaiveDate) -> Self {
        Self {
            downloads_today: DownloadsToday::new(today, 0),
            stored_number: 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Persistence {
    Clean,
    Dirty,
}

/// Values of the counters at one instant, used for rendering names
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SequenceSnapshot {
    pub downloads_today: u32,
    pub stored_number: u32,
    pub session_number: u32,
}

impl SequenceSnapshot {
    pub fn sequence_letter(&self) -> String {
        to_letters(self.session_number)
    }
}

impl Default for SequenceSnapshot {
    fn default() -> Self {
        Self {
            downloads_today: 0,
            stored_number: 1,
            session_number: 1,
        }
    }
}

/// Render a positive number in bijective base 26 (1 -> A, 26 -> Z, 27 -> AA)
pub fn to_letters(mut num: u32) -> String {
    let mut letters = Vec::new();
    while num > 0 {
        let (mut quotient, mut remainder) = (num / 26, num % 26);
        // remainder 0 is the 'Z' of the previous digit
        if remainder == 0 {
            quotient -= 1;
            remainder = 26;
        }
        letters.push(char::from(b'A' + (remainder - 1) as u8));
        num = quotient;
    }
    letters.iter().rev().collect()
}

/// Process-local sequence counters backed by a JSON file
pub struct Sequences {
    /// Path to the sequences file
    path: PathBuf,
    /// Durable counters, `None` until loaded
    stored: Option<StoredSequences>,
    /// Per-run counter
    session_number: u32,
    persistence: Persistence,
    clock: fn() -> NaiveDate,
}

impl Sequences {
    /// Create sequences stored in `path`; the file is read lazily
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            stored: None,
            session_number: 1,
            persistence: Persistence::Clean,
            clock: local_today,
        }
    }

    /// Replace the source of "today" (used to exercise day rollover)
    pub fn with_clock(mut self, clock: fn() -> NaiveDate) -> Self {
        self.clock = clock;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// (Re)load the durable counters, degrading to first-run defaults
    pub fn load(&mut self) {
        let today = (self.clock)();
        let stored = match read_sequences(&self.path) {
            Ok(stored) => {
                debug!(
                    "Loaded sequences from {}: stored number {}",
                    self.path.display(),
                    stored.stored_number
                );
                stored
            }
            Err(e) => {
                warn!("Cannot load persistent sequences number: {}", e);
                StoredSequences::first_run(today)
            }
        };
        self.stored = Some(stored);
        self.persistence = Persistence::Clean;
    }

    fn stored(&mut self) -> &mut StoredSequences {
        if self.stored.is_none() {
            self.load();
        }
        let today = (self.clock)();
        self.stored.get_or_insert_with(|| StoredSequences::first_run(today))
    }

    /// Downloads done today, after lazy day rollover
    pub fn downloads_today(&mut self) -> u32 {
        let today = (self.clock)();
        let stored = self.stored();
        let before = stored.downloads_today;
        let count = stored.downloads_today.get(today);
        if stored.downloads_today != before {
            self.persistence = Persistence::Dirty;
        }
        count
    }

    pub fn stored_number(&mut self) -> u32 {
        self.stored().stored_number
    }

    pub fn session_number(&self) -> u32 {
        self.session_number
    }

    pub fn sequence_letter(&self) -> String {
        to_letters(self.session_number)
    }

    /// Current values of all counters
    pub fn snapshot(&mut self) -> SequenceSnapshot {
        SequenceSnapshot {
            downloads_today: self.downloads_today(),
            stored_number: self.stored_number(),
            session_number: self.session_number,
        }
    }

    /// Advance all three counters by one
    pub fn increment(&mut self) {
        let today = (self.clock)();
        let stored = self.stored();
        stored.stored_number += 1;
        stored.downloads_today.increment(today);
        self.session_number += 1;
        self.persistence = Persistence::Dirty;
    }

    pub fn is_dirty(&self) -> bool {
        self.persistence == Persistence::Dirty
    }

    /// Write the durable counters if they changed since the last load/save
    pub fn save(&mut self) -> Result<()> {
        let stored = match (&self.stored, self.persistence) {
            (Some(stored), Persistence::Dirty) => stored.clone(),
            _ => {
                debug!("Sequences not modified, skipping save");
                return Ok(());
            }
        };

        write_sequences(&self.path, &stored).map_err(|message| DownloadError::SequencesSave {
            path: self.path.clone(),
            message,
        })?;

        info!("Downloader sequences correctly saved.");
        self.persistence = Persistence::Clean;
        Ok(())
    }
}

impl std::fmt::Display for Sequences {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.stored {
            Some(stored) => write!(
                f,
                "Today: {} on {}, Stored: {}, Session: {}, Letters: {}",
                stored.downloads_today.count,
                stored.downloads_today.date,
                stored.stored_number,
                self.session_number,
                self.sequence_letter()
            ),
            None => write!(
                f,
                "Not loaded, Session: {}, Letters: {}",
                self.session_number,
                self.sequence_letter()
            ),
        }
    }
}

fn read_sequences(path: &Path) -> std::result::Result<StoredSequences, String> {
    let file = File::open(path).map_err(|e| format!("{}: {}", path.display(), e))?;
    serde_json::from_reader(BufReader::new(file)).map_err(|e| format!("{}: {}", path.display(), e))
}

fn write_sequences(path: &Path, stored: &StoredSequences) -> std::result::Result<(), String> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| e.to_string())?;
    }
    let file = File::create(path).map_err(|e| e.to_string())?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, stored).map_err(|e| e.to_string())?;
    // Dropping the writer would swallow a failed flush
    writer.flush().map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn fixed_today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 5).unwrap()
    }

    #[test]
    fn test_sequence_letter_encoding() {
        assert_eq!(to_letters(1), "A");
        assert_eq!(to_letters(26), "Z");
        assert_eq!(to_letters(27), "AA");
        assert_eq!(to_letters(52), "AZ");
        assert_eq!(to_letters(53), "BA");
        assert_eq!(to_letters(702), "ZZ");
        assert_eq!(to_letters(703), "AAA");
        assert_eq!(to_letters(0), "");
    }

    #[test]
    fn test_downloads_today_rollover() {
        let today = fixed_today();
        let yesterday = today.pred_opt().unwrap();
        let mut downloads = DownloadsToday::new(yesterday, 7);

        assert_eq!(downloads.get(today), 0);
        assert_eq!(downloads.date(), today);

        downloads.increment(today);
        assert_eq!(downloads.get(today), 1);
    }

    #[test]
    fn test_downloads_today_json_format() {
        let downloads = DownloadsToday::new(fixed_today(), 7);
        let json = serde_json::to_string(&downloads).unwrap();
        assert_eq!(json, r#"["2024-3-5",7]"#);

        let parsed: DownloadsToday = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, downloads);
        assert!(serde_json::from_str::<DownloadsToday>(r#"["2024-13-5",7]"#).is_err());
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let mut sequences =
            Sequences::new(temp_dir.path().join("none.json")).with_clock(fixed_today);

        assert_eq!(sequences.downloads_today(), 0);
        assert_eq!(sequences.stored_number(), 1);
        assert_eq!(sequences.session_number(), 1);
        assert_eq!(sequences.sequence_letter(), "A");
        assert!(!sequences.is_dirty());
    }

    #[test]
    fn test_corrupt_file_gives_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join(SEQUENCES_FILE_NAME);
        fs::write(&path, b"{ not json").unwrap();

        let mut sequences = Sequences::new(&path).with_clock(fixed_today);
        assert_eq!(sequences.stored_number(), 1);
        assert_eq!(sequences.downloads_today(), 0);
    }

    #[test]
    fn test_increment_moves_all_counters() {
        let temp_dir = TempDir::new().unwrap();
        let mut sequences =
            Sequences::new(temp_dir.path().join(SEQUENCES_FILE_NAME)).with_clock(fixed_today);

        sequences.increment();
        sequences.increment();

        let snapshot = sequences.snapshot();
        assert_eq!(snapshot.downloads_today, 2);
        assert_eq!(snapshot.stored_number, 3);
        assert_eq!(snapshot.session_number, 3);
        assert_eq!(snapshot.sequence_letter(), "C");
        assert!(sequences.is_dirty());
    }

    #[test]
    fn test_save_is_dirty_gated_and_skips_session() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join(SEQUENCES_FILE_NAME);

        let mut sequences = Sequences::new(&path).with_clock(fixed_today);
        sequences.stored_number();
        sequences.save().unwrap();
        assert!(!path.exists(), "clean state must not be written");

        sequences.increment();
        sequences.save().unwrap();
        assert!(!sequences.is_dirty());

        let json: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(json["storedNumber"], 2);
        assert_eq!(json["downloadsToday"][0], "2024-3-5");
        assert_eq!(json["downloadsToday"][1], 1);
        assert!(json.get("sessionNumber").is_none());

        let mut reloaded = Sequences::new(&path).with_clock(fixed_today);
        assert_eq!(reloaded.stored_number(), 2);
        assert_eq!(reloaded.downloads_today(), 1);
        assert_eq!(reloaded.session_number(), 1);
    }

    #[test]
    fn test_rollover_on_read_after_reload() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join(SEQUENCES_FILE_NAME);
        fs::write(&path, r#"{"downloadsToday": ["2024-3-4", 7], "storedNumber": 12}"#).unwrap();

        let mut sequences = Sequences::new(&path).with_clock(fixed_today);
        assert_eq!(sequences.downloads_today(), 0);
        assert_eq!(sequences.stored_number(), 12);
        assert!(sequences.is_dirty());

        sequences.save().unwrap();
        let content = fs::read_to_string(&path).unwrap();
        assert!(content.contains("2024-3-5"));
    }

    #[test]
    fn test_save_failure_is_reported() {
        let temp_dir = TempDir::new().unwrap();
        // A directory where the file should be makes the write fail
        let path = temp_dir.path().join("blocked");
        fs::create_dir(&path).unwrap();

        let mut sequences = Sequences::new(&path).with_clock(fixed_today);
        sequences.increment();
        let err = sequences.save().unwrap_err();
        assert!(matches!(err, DownloadError::SequencesSave { .. }));
        assert!(sequences.is_dirty());
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_save_failure_on_flush_is_reported() {
        // Opening /dev/full succeeds, every write to it fails with ENOSPC
        let mut sequences = Sequences::new("/dev/full").with_clock(fixed_today);
        sequences.increment();

        let err = sequences.save().unwrap_err();
        assert!(matches!(err, DownloadError::SequencesSave { .. }));
        assert!(sequences.is_dirty());
    }
}
