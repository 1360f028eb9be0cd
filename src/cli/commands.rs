//! Command handler implementations
//!
//! This module contains the implementation of all CLI commands.

use crate::cli::args::{SourceArgs, TemplateCommands, TemplateKind};
use crate::cli::progress::{print_header, print_info, print_success, print_warning, SessionDisplay};
use crate::cli::{Args, Commands};
use crate::core::config::{init_config, Config, HostingMode, TransferMode};
use crate::core::sequences::Sequences;
use crate::downloaded::SqliteDownloadedStore;
use crate::naming::{Case, NamingTemplate, NamingTemplates, TemplateType, TokenTree};
use crate::scanner::ImageScanner;
use crate::session::{self, DownloadSession, SessionOptions};
use crate::worker::{serve_stdio, WorkerKind};
use anyhow::{bail, Context, Result};
use log::info;
use std::fs;
use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

impl From<TemplateKind> for TemplateType {
    fn from(kind: TemplateKind) -> Self {
        match kind {
            TemplateKind::Image => TemplateType::Image,
            TemplateKind::Destination => TemplateType::Destination,
        }
    }
}

/// Run the appropriate command based on CLI arguments
pub fn run_command(args: &Args, config: &Config, shutdown_flag: Arc<AtomicBool>) -> Result<()> {
    match &args.command {
        Commands::Download { source, move_files } => {
            let mut config = apply_source_args(config, source);
            if *move_files {
                config.download.transfer = TransferMode::Move;
            }
            download(&config, args.config.clone(), source, shutdown_flag)?;
        }
        Commands::Preview { source } => {
            let config = apply_source_args(config, source);
            preview(&config, args.config.clone(), source, shutdown_flag)?;
        }
        Commands::Tokens { template_type } => {
            list_tokens(template_type.map(TemplateType::from));
        }
        Commands::Templates { action } => {
            handle_templates_command(config, action.as_ref())?;
        }
        Commands::Sequences { reset } => {
            handle_sequences_command(config, *reset)?;
        }
        Commands::Downloaded { reset } => {
            handle_downloaded_command(config, *reset)?;
        }
        Commands::GenerateConfig { output } => {
            generate_config_file(output.clone())?;
        }
        Commands::ShowConfig => {
            show_config(config);
        }
        Commands::Worker { kind } => {
            run_worker(config, *kind);
        }
    }

    Ok(())
}

/// Apply the command-line overrides of `download`/`preview` to the config
fn apply_source_args(config: &Config, source: &SourceArgs) -> Config {
    let mut config = config.clone();
    if let Some(ref destination) = source.destination {
        config.download.destination = destination.clone();
    }
    if let Some(ref key) = source.image_template {
        config.download.image_template = key.clone();
    }
    if let Some(ref key) = source.destination_template {
        config.download.destination_template = key.clone();
    }
    if let Some(ref session) = source.session {
        config.download.session = session.clone();
    }
    if let Some(include) = source.include_subdirs {
        config.download.include_subdirs = include;
    }
    if source.include_downloaded {
        config.download.skip_previously_downloaded = false;
    }
    if source.threads {
        config.workers.hosting = HostingMode::Thread;
    }
    config
}

fn session_options(config: &Config, source: &SourceArgs) -> Result<SessionOptions> {
    if !source.source.is_dir() {
        bail!("Source folder not found: {}", source.source.display());
    }
    if config.download.destination.as_os_str().is_empty() {
        bail!("No destination folder: use --destination or set [download] destination");
    }
    let templates = NamingTemplates::load(config.storage.templates_path());
    let options = SessionOptions::from_config(config, source.source.clone(), &templates)?;
    Ok(options)
}

/// Scan, rename and transfer images
pub fn download(
    config: &Config,
    config_path: Option<PathBuf>,
    source: &SourceArgs,
    shutdown_flag: Arc<AtomicBool>,
) -> Result<()> {
    let options = session_options(config, source)?;
    print_header("Photo Download");
    print_info(&format!("Source: {}", options.source.display()));
    print_info(&format!("Destination: {}", options.destination.display()));
    print_info(&format!(
        "Naming: {} / {}",
        options.destination_template.name, options.image_template.name
    ));
    println!();

    let mut session = DownloadSession::start(config, config_path.as_deref(), shutdown_flag)
        .context("Cannot start workers")?;
    let mut display = SessionDisplay::new();
    let result = session.download(&options, &mut display);
    session.stop();
    let summary = result?;

    display.finish(&summary.message());
    if summary.skipped > 0 {
        print_info(&format!(
            "{} of {} images skipped (previously downloaded)",
            summary.skipped, summary.scanned
        ));
    }
    if summary.report.is_some() && !summary.sequences_saved {
        print_warning("Sequences could not be saved: numbers may repeat on the next download");
    }
    Ok(())
}

/// Show what the next download would produce
pub fn preview(
    config: &Config,
    config_path: Option<PathBuf>,
    source: &SourceArgs,
    shutdown_flag: Arc<AtomicBool>,
) -> Result<()> {
    let options = session_options(config, source)?;
    let mut session = DownloadSession::start(config, config_path.as_deref(), shutdown_flag)
        .context("Cannot start workers")?;
    let mut display = SessionDisplay::new();
    let result = session.preview(&options, &mut display);
    session.stop();
    let preview = result?;

    display.finish(&format!(
        "{} images found, {} to download",
        preview.scanned, preview.candidates
    ));
    match preview.sample {
        Some(sample) => {
            print_info(&format!("Next name: {}", sample.name));
            print_info(&format!("In folder: {}", sample.path));
        }
        None => print_warning("No image to download"),
    }
    if !preview.folders.is_empty() {
        println!();
        println!("  Destination folders:");
        for folder in &preview.folders {
            println!("    {}", folder);
        }
    }
    Ok(())
}

/// Print the token tree
pub fn list_tokens(filter: Option<TemplateType>) {
    let tree = TokenTree::builtin();
    for family in tree.families() {
        if filter.is_some_and(|kind| family.family.is_disallowed_in(kind)) {
            continue;
        }
        println!("{}", family.family.name());
        for genus in &family.genera {
            if filter.is_some_and(|kind| genus.genus.is_disallowed_in(kind)) {
                continue;
            }
            println!("  {}", genus.genus.name());
            for token in &genus.tokens {
                println!("    {}", token.name());
            }
        }
    }
}

fn print_template(template: &NamingTemplate, kind: TemplateType) {
    let marker = if template.is_builtin { " (builtin)" } else { "" };
    println!("  {} - {}{}", template.key, template.name, marker);
    match kind {
        TemplateType::Image => println!(
            "      {}  [extension: {}]",
            template.as_text(),
            template.extension.name()
        ),
        TemplateType::Destination => println!("      {}", template.as_text()),
    }
}

fn parse_case(name: &str) -> Result<Case> {
    match Case::from_name(name) {
        Some(case) => Ok(case),
        None => bail!(
            "Unknown extension case '{}': use \"Original Case\", \"UPPERCASE\" or \"lowercase\"",
            name
        ),
    }
}

/// List and edit naming templates
pub fn handle_templates_command(config: &Config, action: Option<&TemplateCommands>) -> Result<()> {
    let mut templates = NamingTemplates::load(config.storage.templates_path());
    let tree = TokenTree::builtin();

    match action {
        None => list_templates(&templates, None),
        Some(TemplateCommands::List { template_type }) => {
            list_templates(&templates, template_type.map(TemplateType::from))
        }
        Some(TemplateCommands::Add {
            template_type,
            key,
            name,
            extension,
            tokens,
        }) => {
            let kind = TemplateType::from(*template_type);
            let template = NamingTemplate::new(
                key,
                name.as_deref().unwrap_or(key),
                tokens.iter().map(|t| tree.resolve(t)).collect(),
            )
            .with_extension(parse_case(extension)?);
            templates.add(kind, template)?;
            templates.save()?;
            print_success(&format!("Template {} added", key));
        }
        Some(TemplateCommands::Redefine {
            template_type,
            key,
            extension,
            tokens,
        }) => {
            templates.redefine(
                TemplateType::from(*template_type),
                key,
                tokens.iter().map(|t| tree.resolve(t)).collect(),
                parse_case(extension)?,
            )?;
            templates.save()?;
            print_success(&format!("Template {} redefined", key));
        }
        Some(TemplateCommands::Rename {
            template_type,
            key,
            name,
        }) => {
            templates.rename(TemplateType::from(*template_type), key, name)?;
            templates.save()?;
            print_success(&format!("Template {} renamed to {}", key, name));
        }
        Some(TemplateCommands::Delete { template_type, key }) => {
            templates.delete(TemplateType::from(*template_type), key)?;
            templates.save()?;
            print_success(&format!("Template {} deleted", key));
        }
    }
    Ok(())
}

fn list_templates(templates: &NamingTemplates, filter: Option<TemplateType>) {
    for (kind, title) in [
        (TemplateType::Image, "Image naming templates"),
        (TemplateType::Destination, "Destination naming templates"),
    ] {
        if filter.is_some_and(|f| f != kind) {
            continue;
        }
        println!("{}:", title);
        for template in templates.list(kind) {
            print_template(&template, kind);
        }
        println!();
    }
}

/// Show or reset the sequence counters
pub fn handle_sequences_command(config: &Config, reset: bool) -> Result<()> {
    let path = config.storage.sequences_path();
    if reset {
        if path.exists() {
            fs::remove_file(&path)
                .with_context(|| format!("Cannot remove {}", path.display()))?;
        }
        print_success("Sequences reset");
        return Ok(());
    }

    let mut sequences = Sequences::new(&path);
    sequences.load();
    println!("Sequences file: {}", path.display());
    println!("  Downloads today: {}", sequences.downloads_today());
    println!("  Stored number:   {}", sequences.stored_number());
    Ok(())
}

/// Show or clear the previously-downloaded images database
pub fn handle_downloaded_command(config: &Config, reset: bool) -> Result<()> {
    let path = config.storage.downloaded_db_path();
    let mut store = SqliteDownloadedStore::open(&path)
        .with_context(|| format!("Cannot open {}", path.display()))?;
    if reset {
        store.reset()?;
        print_success("Previously-downloaded images forgotten");
        return Ok(());
    }

    let location = store.path().unwrap_or(path.as_path());
    println!("Downloaded database: {}", location.display());
    println!("  Images recorded: {}", store.count()?);
    Ok(())
}

/// Write the commented default configuration
pub fn generate_config_file(output: Option<PathBuf>) -> Result<()> {
    let output_path = match output {
        Some(path) => {
            fs::write(&path, Config::generate_default_config())?;
            path
        }
        None => init_config()?,
    };

    info!("Configuration file: {}", output_path.display());
    info!("Edit this file to customize the download settings.");
    Ok(())
}

/// Show the current configuration settings
pub fn show_config(config: &Config) {
    let config_path = Config::get_active_config_path();
    info!("Configuration file: {}", config_path.display());
    if !config_path.exists() {
        info!("(Using default settings - no config file found)");
    }
    info!("");
    info!("Current Configuration:");
    info!("----------------------");
    info!("[download]");
    info!("  destination = \"{}\"", config.download.destination.display());
    info!("  include_subdirs = {}", config.download.include_subdirs);
    info!("  image_template = \"{}\"", config.download.image_template);
    info!(
        "  destination_template = \"{}\"",
        config.download.destination_template
    );
    info!("  session = \"{}\"", config.download.session);
    info!("  transfer = {:?}", config.download.transfer);
    info!(
        "  skip_previously_downloaded = {}",
        config.download.skip_previously_downloaded
    );
    info!("");
    info!("[scanner]");
    info!("  batch_size = {}", config.scanner.batch_size);
    info!("");
    info!("[workers]");
    info!("  hosting = {:?}", config.workers.hosting);
    info!("  poll_interval_ms = {}", config.workers.poll_interval_ms);
    info!("  stop_timeout_ms = {}", config.workers.stop_timeout_ms);
    info!("");
    info!("[exiftool]");
    info!("  program = \"{}\"", config.exiftool.program.display());
    info!("");
    info!("[storage]");
    info!(
        "  sequences_file = \"{}\"",
        config.storage.sequences_path().display()
    );
    info!(
        "  templates_file = \"{}\"",
        config.storage.templates_path().display()
    );
    info!(
        "  downloaded_db = \"{}\"",
        config.storage.downloaded_db_path().display()
    );
    info!("");
    info!("[logging]");
    info!("  level = \"{}\"", config.logging.level);
    info!("  log_to_file = {}", config.logging.log_to_file);
    info!("  log_file = \"{}\"", config.logging.log_file.display());
}

/// Host one worker over stdin/stdout until the orchestrator stops it
pub fn run_worker(config: &Config, kind: WorkerKind) {
    let poll = config.workers.poll_interval();
    info!("Hosting {} worker", kind.as_str());
    match kind {
        WorkerKind::Scanner => {
            let scanner: ImageScanner = session::build_scanner(config, session::open_store(config));
            serve_stdio(scanner, poll);
        }
        WorkerKind::ExifLoader => serve_stdio(session::build_exif_loader(config), poll),
        WorkerKind::Mover => serve_stdio(session::build_mover(config), poll),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    fn parse(argv: &[&str]) -> Args {
        Args::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_source_args_override_config() {
        let args = parse(&[
            "photo-downloader",
            "download",
            "/card",
            "-d",
            "/photos",
            "--image-template",
            "ORIGINAL",
            "--session",
            "Zoo",
            "--include-downloaded",
            "--threads",
            "--move",
        ]);
        let Commands::Download { source, move_files } = &args.command else {
            panic!("expected download");
        };
        assert!(*move_files);
        let config = apply_source_args(&Config::default(), source);
        assert_eq!(config.download.destination, PathBuf::from("/photos"));
        assert_eq!(config.download.image_template, "ORIGINAL");
        assert_eq!(config.download.session, "Zoo");
        assert!(!config.download.skip_previously_downloaded);
        assert_eq!(config.workers.hosting, HostingMode::Thread);
    }

    #[test]
    fn test_downloaded_reset_clears_records() {
        use crate::downloaded::{DownloadRecord, DownloadedStore, FileKey};

        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.storage.downloaded_db = dir.path().join("downloaded.db");
        let image = dir.path().join("IMG_0001.JPG");
        fs::write(&image, b"x").unwrap();

        {
            let mut store = SqliteDownloadedStore::open(&config.storage.downloaded_db).unwrap();
            store
                .upsert_many(&[DownloadRecord {
                    key: FileKey::from_path(&image).unwrap(),
                    download_name: "/photos/IMG_0001.jpg".to_string(),
                    download_datetime: chrono::NaiveDate::from_ymd_opt(2024, 3, 1)
                        .unwrap()
                        .and_hms_opt(9, 0, 0)
                        .unwrap(),
                }])
                .unwrap();
        }

        let args = parse(&["photo-downloader", "downloaded", "--reset"]);
        assert!(matches!(args.command, Commands::Downloaded { reset: true }));
        handle_downloaded_command(&config, false).unwrap();
        handle_downloaded_command(&config, true).unwrap();

        let store = SqliteDownloadedStore::open(&config.storage.downloaded_db).unwrap();
        assert_eq!(store.count().unwrap(), 0);
        assert_eq!(store.path(), Some(config.storage.downloaded_db.as_path()));
    }

    #[test]
    fn test_worker_command_is_parsed() {
        let args = parse(&["photo-downloader", "--config", "/tmp/c.toml", "worker", "exif-loader"]);
        assert_eq!(args.config, Some(PathBuf::from("/tmp/c.toml")));
        assert!(matches!(
            args.command,
            Commands::Worker {
                kind: WorkerKind::ExifLoader
            }
        ));
    }

    #[test]
    fn test_templates_add_and_delete() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.storage.templates_file = dir.path().join("templates.json");

        let add = TemplateCommands::Add {
            template_type: TemplateKind::Image,
            key: "MINE".to_string(),
            name: Some("Mine".to_string()),
            extension: "UPPERCASE".to_string(),
            tokens: vec!["Image date (YYYY)".to_string(), "-trip".to_string()],
        };
        handle_templates_command(&config, Some(&add)).unwrap();

        let templates = NamingTemplates::load(&config.storage.templates_file);
        let mine = templates.get(TemplateType::Image, "MINE").unwrap();
        assert_eq!(mine.extension, Case::Upper);
        assert_eq!(mine.as_text(), "<Image date (YYYY)>-trip");

        let delete = TemplateCommands::Delete {
            template_type: TemplateKind::Image,
            key: "MINE".to_string(),
        };
        handle_templates_command(&config, Some(&delete)).unwrap();
        let templates = NamingTemplates::load(&config.storage.templates_file);
        assert!(templates.get(TemplateType::Image, "MINE").is_none());
    }

    #[test]
    fn test_bad_extension_case_is_rejected() {
        assert!(parse_case("Title Case").is_err());
        assert_eq!(parse_case("Original Case").unwrap(), Case::Original);
    }

    #[test]
    fn test_missing_destination_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let args = parse(&["photo-downloader", "preview", dir.path().to_str().unwrap()]);
        let Commands::Preview { source } = &args.command else {
            panic!("expected preview");
        };
        let config = apply_source_args(&Config::default(), source);
        assert!(session_options(&config, source).is_err());
    }
}
