//! Command-line argument definitions
//!
//! This module defines all CLI arguments and subcommands using clap.

use crate::worker::WorkerKind;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Download photos from a memory card, renaming them with naming templates
#[derive(Parser, Debug)]
#[command(name = "photo-downloader")]
#[command(version)]
#[command(about = "Download photos from a memory card or folder, renamed and sorted by naming templates", long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Commands,

    /// Path to configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Log level: error, warn, info, debug, trace (overrides config)
    #[arg(short, long, global = true)]
    pub log_level: Option<String>,
}

/// Source and naming options shared by `download` and `preview`
#[derive(clap::Args, Debug, Clone)]
pub struct SourceArgs {
    /// Folder to download images from (memory card mount point, DCIM, ...)
    pub source: PathBuf,

    /// Root destination folder (overrides config)
    #[arg(short, long)]
    pub destination: Option<PathBuf>,

    /// Key of the image naming template (overrides config)
    #[arg(long, value_name = "KEY")]
    pub image_template: Option<String>,

    /// Key of the destination naming template (overrides config)
    #[arg(long, value_name = "KEY")]
    pub destination_template: Option<String>,

    /// Session label for the "Session" token (overrides config)
    #[arg(short, long)]
    pub session: Option<String>,

    /// Scan subfolders of the source (overrides config)
    #[arg(long)]
    pub include_subdirs: Option<bool>,

    /// Also download images found in the previously-downloaded store
    #[arg(long)]
    pub include_downloaded: bool,

    /// Run workers as threads instead of child processes
    #[arg(long)]
    pub threads: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Scan the source, rename and transfer every selected image
    Download {
        #[command(flatten)]
        source: SourceArgs,

        /// Move images instead of copying them
        #[arg(long = "move")]
        move_files: bool,
    },

    /// Show the name and folders the next download would produce
    Preview {
        #[command(flatten)]
        source: SourceArgs,
    },

    /// List the naming tokens, grouped by family and genus
    Tokens {
        /// Only tokens allowed in this template type
        #[arg(short = 't', long, value_enum)]
        template_type: Option<TemplateKind>,
    },

    /// List and edit naming templates
    Templates {
        #[command(subcommand)]
        action: Option<TemplateCommands>,
    },

    /// Show or reset the sequence counters
    Sequences {
        /// Reset the stored number and today's downloads
        #[arg(long)]
        reset: bool,
    },

    /// Show or clear the previously-downloaded images database
    Downloaded {
        /// Forget every previously downloaded image
        #[arg(long)]
        reset: bool,
    },

    /// Generate a configuration file at a specific location
    GenerateConfig {
        /// Output path for the config file (defaults to standard location)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Show current configuration
    ShowConfig,

    /// Host one worker over stdin/stdout (used by the download session)
    #[command(hide = true)]
    Worker {
        #[arg(value_enum)]
        kind: WorkerKind,
    },
}

/// Template type selector
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemplateKind {
    Image,
    Destination,
}

#[derive(Subcommand, Debug)]
pub enum TemplateCommands {
    /// List builtin and custom templates
    List {
        #[arg(short = 't', long, value_enum)]
        template_type: Option<TemplateKind>,
    },

    /// Add a custom template from token names
    ///
    /// Each argument is a token name such as "Image date (YYYYMMDD)";
    /// anything else is kept as free text.
    Add {
        #[arg(value_enum)]
        template_type: TemplateKind,

        /// Stable key of the template
        key: String,

        /// Display name
        #[arg(short, long)]
        name: Option<String>,

        /// Extension case: "Original Case", "UPPERCASE" or "lowercase"
        #[arg(long, default_value = "lowercase")]
        extension: String,

        /// Token names and free text, in order
        #[arg(required = true)]
        tokens: Vec<String>,
    },

    /// Replace the tokens of a custom template
    Redefine {
        #[arg(value_enum)]
        template_type: TemplateKind,

        key: String,

        /// Extension case: "Original Case", "UPPERCASE" or "lowercase"
        #[arg(long, default_value = "lowercase")]
        extension: String,

        #[arg(required = true)]
        tokens: Vec<String>,
    },

    /// Rename a custom template
    Rename {
        #[arg(value_enum)]
        template_type: TemplateKind,
        key: String,
        name: String,
    },

    /// Delete a custom template
    Delete {
        #[arg(value_enum)]
        template_type: TemplateKind,
        key: String,
    },
}
