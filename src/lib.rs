//! Photo Download Tool Library
//!
//! Downloads images from removable media (or any folder) into a destination
//! tree, renaming each image and choosing its folder with naming templates
//! rendered from EXIF metadata, sequence counters and a session label.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//!
//! - [`core`] - Configuration, error handling, the image model and the
//!   persistent sequence counters
//! - [`naming`] - Token taxonomy, naming templates and template collections
//! - [`worker`] - Command-driven workers hosted on threads or child processes
//! - [`scanner`] - Image scanner worker
//! - [`exif`] - EXIF extractor worker backed by `exiftool`
//! - [`mover`] - Image mover worker: previews and downloads
//! - [`downloaded`] - Previously-downloaded images store
//! - [`session`] - Orchestration of one download across the three workers
//! - [`cli`] - Command-line interface (only used by the binary)
//!
//! # Example Usage
//!
//! ```rust,no_run
//! use photo_download_tool::core::config::Config;
//! use photo_download_tool::naming::NamingTemplates;
//! use photo_download_tool::session::{DownloadSession, SessionOptions};
//! use std::path::PathBuf;
//! use std::sync::atomic::AtomicBool;
//! use std::sync::Arc;
//!
//! fn main() -> anyhow::Result<()> {
//!     let config = Config::load_default()?;
//!     let templates = NamingTemplates::load(config.storage.templates_path());
//!     let options = SessionOptions::from_config(&config, PathBuf::from("/media/card"), &templates)?;
//!
//!     let cancel = Arc::new(AtomicBool::new(false));
//!     let mut session = DownloadSession::start(&config, None, cancel)?;
//!     let summary = session.download(&options, &mut ())?;
//!     session.stop();
//!
//!     println!("{}", summary.message());
//!     Ok(())
//! }
//! ```

pub mod cli;
pub mod core;
pub mod downloaded;
pub mod exif;
pub mod mover;
pub mod naming;
pub mod scanner;
pub mod session;
pub mod worker;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
