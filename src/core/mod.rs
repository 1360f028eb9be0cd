//! Core functionality module
//!
//! This module contains the shared building blocks of the download pipeline.
//!
//! # Submodules
//!
//! - `config` - Configuration loading, saving, and management
//! - `error` - Error types and result aliases
//! - `image` - Candidate image model
//! - `sequences` - Durable sequence counters

pub mod config;
pub mod error;
pub mod image;
pub mod sequences;
