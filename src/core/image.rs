//! Candidate image model
//!
//! An [`Image`] is created when the scanner discovers a file and is then
//! enriched by EXIF arrival, user selection and session edits. Images cross
//! worker boundaries by value, so everything here is serializable.

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Stable identifier of an image: its source path
pub type ImageKey = String;

/// EXIF capture date/time split into its textual fields
///
/// Kept as strings the way the metadata tool reports them, so a value that
/// does not form a valid calendar date still round-trips unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Datation {
    pub year: String,
    pub month: String,
    pub day: String,
    pub hour: String,
    pub minute: String,
    pub second: String,
}

impl Datation {
    /// Build a datation from its six fields
    pub fn new(year: &str, month: &str, day: &str, hour: &str, minute: &str, second: &str) -> Self {
        Self {
            year: year.to_string(),
            month: month.to_string(),
            day: day.to_string(),
            hour: hour.to_string(),
            minute: minute.to_string(),
            second: second.to_string(),
        }
    }

    /// The fallback used whenever a capture date is missing or unreadable
    pub fn epoch() -> Self {
        Self::new("1970", "01", "01", "00", "00", "00")
    }

    /// Parse an EXIF `"YYYY:MM:DD HH:MM:SS"` value
    ///
    /// Returns `None` when the value does not have that shape.
    pub fn parse_exif(value: &str) -> Option<Self> {
        let (date, time) = value.trim().split_once(' ')?;
        let date: Vec<&str> = date.split(':').collect();
        let time: Vec<&str> = time.trim().split(':').collect();
        if date.len() != 3 || time.len() != 3 {
            return None;
        }
        if date.iter().chain(time.iter()).any(|s| s.is_empty()) {
            return None;
        }
        Some(Self::new(date[0], date[1], date[2], time[0], time[1], time[2]))
    }

    /// Convert to a calendar date/time
    pub fn as_datetime(&self) -> Option<NaiveDateTime> {
        let year: i32 = self.year.parse().ok()?;
        let month: u32 = self.month.parse().ok()?;
        let day: u32 = self.day.parse().ok()?;
        let hour: u32 = self.hour.parse().ok()?;
        let minute: u32 = self.minute.parse().ok()?;
        let second: u32 = self.second.parse().ok()?;
        NaiveDate::from_ymd_opt(year, month, day)?.and_hms_opt(hour, minute, second)
    }
}

impl Default for Datation {
    fn default() -> Self {
        Self::epoch()
    }
}

/// Previously-downloaded status of an image
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub enum DownloadInfo {
    /// Never downloaded
    #[default]
    None,
    /// Found in the previously-downloaded store by (name, size, mtime)
    Matched {
        path: String,
        time: Option<NaiveDateTime>,
    },
    /// Marked by the user, or downloaded during this session
    Marked {
        path: String,
        time: NaiveDateTime,
    },
}

impl DownloadInfo {
    pub fn is_previously_downloaded(&self) -> bool {
        !matches!(self, DownloadInfo::None)
    }
}

/// A candidate image discovered on the source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Image {
    /// File name including extension
    pub name: String,
    /// Source path, also the image key
    pub path: String,
    /// Extension including the leading dot (may be empty)
    pub extension: String,
    /// File name without extension
    pub stem: String,
    /// Capture date/time; `None` until EXIF has been loaded
    pub datetime: Option<Datation>,
    /// User-assignable session label
    pub session: String,
    /// Whether the user selected the image for download
    pub is_selected: bool,
    /// Previously-downloaded status
    pub download_info: DownloadInfo,
}

impl Image {
    /// Create a selected, not yet loaded image
    pub fn new(name: &str, path: &str) -> Self {
        let as_path = Path::new(name);
        let stem = as_path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let extension = as_path
            .extension()
            .map(|e| format!(".{}", e.to_string_lossy()))
            .unwrap_or_default();

        Self {
            name: name.to_string(),
            path: path.to_string(),
            extension,
            stem,
            datetime: None,
            session: String::new(),
            is_selected: true,
            download_info: DownloadInfo::None,
        }
    }

    /// Create an image from a path on disk
    pub fn from_path(path: &Path) -> Self {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self::new(&name, &path.to_string_lossy())
    }

    pub fn key(&self) -> &str {
        &self.path
    }

    /// An image is loaded once its EXIF date/time has been received
    pub fn is_loaded(&self) -> bool {
        self.datetime.is_some()
    }

    /// Whether the image takes part in previews and downloads
    pub fn is_candidate(&self) -> bool {
        self.is_loaded() && self.is_selected
    }

    /// Capture date/time, or the epoch fallback
    pub fn capture_datetime(&self) -> NaiveDateTime {
        self.datetime
            .as_ref()
            .and_then(Datation::as_datetime)
            .or_else(|| Datation::epoch().as_datetime())
            .unwrap_or_default()
    }

    pub fn source_path(&self) -> PathBuf {
        PathBuf::from(&self.path)
    }
}

/// Per-image properties that can be updated after discovery
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ImageUpdate {
    Datetime(Datation),
    Selected(bool),
    Session(String),
}

impl ImageUpdate {
    pub fn apply(&self, image: &mut Image) {
        match self {
            ImageUpdate::Datetime(datetime) => image.datetime = Some(datetime.clone()),
            ImageUpdate::Selected(selected) => image.is_selected = *selected,
            ImageUpdate::Session(session) => image.session = session.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_image_new_splits_name() {
        let image = Image::new("IMG_0001.RAF", "/media/card/IMG_0001.RAF");
        assert_eq!(image.stem, "IMG_0001");
        assert_eq!(image.extension, ".RAF");
        assert_eq!(image.key(), "/media/card/IMG_0001.RAF");
        assert!(image.is_selected);
        assert!(!image.is_loaded());
        assert!(!image.is_candidate());
    }

    #[test]
    fn test_image_without_extension() {
        let image = Image::new("README", "/card/README");
        assert_eq!(image.stem, "README");
        assert_eq!(image.extension, "");
    }

    #[test]
    fn test_datation_parse_exif() {
        let datation = Datation::parse_exif("2021:12:23 21:05:30").unwrap();
        assert_eq!(datation, Datation::new("2021", "12", "23", "21", "05", "30"));
        let datetime = datation.as_datetime().unwrap();
        assert_eq!(datetime.to_string(), "2021-12-23 21:05:30");
    }

    #[test]
    fn test_datation_parse_exif_rejects_garbage() {
        assert!(Datation::parse_exif("").is_none());
        assert!(Datation::parse_exif("2021-12-23").is_none());
        assert!(Datation::parse_exif("2021:12 21:05:30").is_none());
        assert!(Datation::parse_exif("    :  :      :  :  ").is_none());
    }

    #[test]
    fn test_capture_datetime_falls_back_to_epoch() {
        let mut image = Image::new("a.jpg", "/a.jpg");
        assert_eq!(image.capture_datetime().to_string(), "1970-01-01 00:00:00");

        image.datetime = Some(Datation::new("0000", "00", "00", "00", "00", "00"));
        assert_eq!(image.capture_datetime().to_string(), "1970-01-01 00:00:00");
    }

    #[test]
    fn test_image_update_apply() {
        let mut image = Image::new("a.jpg", "/a.jpg");
        ImageUpdate::Session("Holidays".to_string()).apply(&mut image);
        ImageUpdate::Selected(false).apply(&mut image);
        ImageUpdate::Datetime(Datation::epoch()).apply(&mut image);

        assert_eq!(image.session, "Holidays");
        assert!(!image.is_selected);
        assert!(image.is_loaded());
        assert!(!image.is_candidate());
    }
}
