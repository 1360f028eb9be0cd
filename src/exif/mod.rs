//! EXIF extractor worker
//!
//! Answers three requests for an image key (its source path):
//!
//! - `LoadDatetime`: publishes `datetime`
//! - `LoadThumbnail`: publishes `thumbnail`
//! - `LoadAll`: publishes both
//!
//! Missing or unreadable metadata never fails a request: the capture date
//! falls back to 1970-01-01 00:00:00 and the thumbnail to an empty sentinel.
//!
//! # Submodules
//!
//! - `exiftool` - The external `exiftool` process driver

pub mod exiftool;

pub use self::exiftool::ExifTool;

use crate::core::error::Result;
use crate::core::image::{Datation, ImageKey};
use crate::worker::{Context, Publisher, Tagged, Worker, WorkerKind};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;

/// Tag values keyed by `GROUP:Tag`
pub type Tags = serde_json::Map<String, Value>;

const DATETIME_TAG: &str = "EXIF:DateTimeOriginal";
const THUMBNAIL_TAGS: [&str; 2] = ["EXIF:ThumbnailImage", "EXIF:ThumbnailTIFF"];
const EXIF_SIZE_TAGS: (&str, &str) = ("EXIF:ExifImageWidth", "EXIF:ExifImageHeight");
const IMAGE_SIZE_TAGS: (&str, &str) = ("EXIF:ImageWidth", "EXIF:ImageHeight");
const ORIENTATION_TAG: &str = "EXIF:Orientation";

/// Prefix of binary values in the tool's JSON output
const BASE64_PREFIX: &str = "base64:";

/// Source of per-file metadata tags
pub trait MetadataReader: Send {
    /// Prepare the reader (start an external tool)
    fn start(&mut self) -> Result<()> {
        Ok(())
    }

    fn read_tags(&mut self, path: &Path, tags: &[&str]) -> Result<Tags>;

    /// Release the reader's resources
    fn terminate(&mut self) {}
}

/// Embedded thumbnail of an image
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Thumbnail {
    /// Thumbnail bytes (JPEG or TIFF); `None` when the image has none
    #[serde(with = "base64_bytes")]
    pub data: Option<Vec<u8>>,
    /// Larger side over smaller side, rounded to 1 decimal; 0 when unknown
    pub aspect_ratio: f64,
    /// Rotation to apply: 0, 90 or -90
    pub orientation: i32,
}

impl Thumbnail {
    /// The "no thumbnail" sentinel
    pub fn none() -> Self {
        Self {
            data: None,
            aspect_ratio: 0.0,
            orientation: 0,
        }
    }
}

mod base64_bytes {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(data: &Option<Vec<u8>>, serializer: S) -> Result<S::Ok, S::Error> {
        match data {
            Some(bytes) => serializer.serialize_some(&STANDARD.encode(bytes)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Vec<u8>>, D::Error> {
        Option::<String>::deserialize(deserializer)?
            .map(|text| STANDARD.decode(text).map_err(serde::de::Error::custom))
            .transpose()
    }
}

/// Capture date of an image, or the epoch fallback
pub fn datetime_from_tags(tags: &Tags) -> Datation {
    tags.get(DATETIME_TAG)
        .and_then(Value::as_str)
        .and_then(Datation::parse_exif)
        .unwrap_or_else(Datation::epoch)
}

fn number(tags: &Tags, tag: &str) -> Option<f64> {
    tags.get(tag).and_then(Value::as_f64)
}

/// Larger side over smaller side rounded to 1 decimal, 0 when unknown
pub fn aspect_ratio(width: f64, height: f64) -> f64 {
    if width <= 0.0 || height <= 0.0 {
        return 0.0;
    }
    let ratio = width.max(height) / width.min(height);
    (ratio * 10.0).round() / 10.0
}

/// Rotation for a raw EXIF orientation code
pub fn rotation(orientation: i64) -> i32 {
    match orientation {
        6 => 90,
        8 => -90,
        _ => 0,
    }
}

/// Thumbnail of an image, or the sentinel when it has none
pub fn thumbnail_from_tags(tags: &Tags) -> Thumbnail {
    let encoded = THUMBNAIL_TAGS
        .iter()
        .find_map(|tag| tags.get(*tag).and_then(Value::as_str));

    let data = encoded.and_then(|text| {
        let text = text.strip_prefix(BASE64_PREFIX).unwrap_or(text);
        match STANDARD.decode(text) {
            Ok(bytes) if !bytes.is_empty() => Some(bytes),
            Ok(_) => None,
            Err(e) => {
                debug!("Undecodable thumbnail: {}", e);
                None
            }
        }
    });
    let Some(data) = data else {
        return Thumbnail::none();
    };

    let size = [EXIF_SIZE_TAGS, IMAGE_SIZE_TAGS]
        .iter()
        .find_map(|(w, h)| Some((number(tags, w)?, number(tags, h)?)));
    let orientation = tags
        .get(ORIENTATION_TAG)
        .and_then(Value::as_i64)
        .map(rotation)
        .unwrap_or(0);

    Thumbnail {
        data: Some(data),
        aspect_ratio: size.map(|(w, h)| aspect_ratio(w, h)).unwrap_or(0.0),
        orientation,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ExifCommand {
    LoadAll(ImageKey),
    LoadDatetime(ImageKey),
    LoadThumbnail(ImageKey),
}

impl Tagged for ExifCommand {
    fn tag(&self) -> &'static str {
        match self {
            ExifCommand::LoadAll(_) => "load_all",
            ExifCommand::LoadDatetime(_) => "load_datetime",
            ExifCommand::LoadThumbnail(_) => "load_thumbnail",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ExifEvent {
    Datetime { key: ImageKey, datetime: Datation },
    Thumbnail { key: ImageKey, thumbnail: Thumbnail },
}

impl Tagged for ExifEvent {
    fn tag(&self) -> &'static str {
        match self {
            ExifEvent::Datetime { .. } => "datetime",
            ExifEvent::Thumbnail { .. } => "thumbnail",
        }
    }
}

/// EXIF extractor worker
pub struct ExifLoader<R> {
    reader: R,
}

impl<R: MetadataReader> ExifLoader<R> {
    pub fn new(reader: R) -> Self {
        Self { reader }
    }

    fn read(&mut self, key: &str, tags: &[&str]) -> Tags {
        match self.reader.read_tags(Path::new(key), tags) {
            Ok(tags) => tags,
            Err(e) => {
                warn!("Cannot read metadata of {}: {}", key, e);
                Tags::new()
            }
        }
    }

    /// Run one command, returning the events it produces
    pub fn load(&mut self, command: &ExifCommand) -> Vec<ExifEvent> {
        match command {
            ExifCommand::LoadAll(key) => {
                debug!("Loading date and thumbnail from exif for {}...", key);
                let mut wanted = vec![DATETIME_TAG, ORIENTATION_TAG];
                wanted.extend(THUMBNAIL_TAGS);
                wanted.extend([EXIF_SIZE_TAGS.0, EXIF_SIZE_TAGS.1]);
                wanted.extend([IMAGE_SIZE_TAGS.0, IMAGE_SIZE_TAGS.1]);
                let tags = self.read(key, &wanted);
                vec![
                    ExifEvent::Datetime {
                        key: key.clone(),
                        datetime: datetime_from_tags(&tags),
                    },
                    ExifEvent::Thumbnail {
                        key: key.clone(),
                        thumbnail: thumbnail_from_tags(&tags),
                    },
                ]
            }
            ExifCommand::LoadDatetime(key) => {
                debug!("Loading date time from exif for {}...", key);
                let tags = self.read(key, &[DATETIME_TAG]);
                vec![ExifEvent::Datetime {
                    key: key.clone(),
                    datetime: datetime_from_tags(&tags),
                }]
            }
            ExifCommand::LoadThumbnail(key) => {
                debug!("Loading thumbnail from exif for {}...", key);
                let mut wanted = vec![ORIENTATION_TAG];
                wanted.extend(THUMBNAIL_TAGS);
                wanted.extend([EXIF_SIZE_TAGS.0, EXIF_SIZE_TAGS.1]);
                wanted.extend([IMAGE_SIZE_TAGS.0, IMAGE_SIZE_TAGS.1]);
                let tags = self.read(key, &wanted);
                vec![ExifEvent::Thumbnail {
                    key: key.clone(),
                    thumbnail: thumbnail_from_tags(&tags),
                }]
            }
        }
    }
}

impl<R: MetadataReader + 'static> Worker for ExifLoader<R> {
    const KIND: WorkerKind = WorkerKind::ExifLoader;
    const NAME: &'static str = "ExifLoader";
    type Command = ExifCommand;
    type Event = ExifEvent;

    fn pre_run(&mut self, _publisher: &Publisher<ExifEvent>) {
        if let Err(e) = self.reader.start() {
            warn!("{}", e);
        }
    }

    fn handle(&mut self, command: ExifCommand, ctx: &mut Context<'_, ExifCommand, ExifEvent>) {
        for event in self.load(&command) {
            if !ctx.publish(event) {
                break;
            }
        }
    }

    fn post_run(&mut self) {
        self.reader.terminate();
    }
}
