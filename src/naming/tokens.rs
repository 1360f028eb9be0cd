//! Token taxonomy for naming templates
//!
//! Tokens are organised in a three-level tree: Family -> Genus -> Token.
//! A genus is the semantic kind of a token ("Image date"), a token is a genus
//! with a concrete format ("Image date (YYYYMMDD)"). The tree is built once and
//! shared read-only; templates hold `Arc<Token>` references into it.

use crate::core::image::Image;
use crate::core::sequences::SequenceSnapshot;
use chrono::{Duration, NaiveDateTime};
use regex::Regex;
use std::collections::HashMap;
use std::fmt::Write;
use std::sync::{Arc, OnceLock};

/// What a template renders: an image file name or a destination folder path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TemplateType {
    Image,
    Destination,
}

/// Case transform applied to names and extensions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Case {
    Original,
    Upper,
    #[default]
    Lower,
}

impl Case {
    pub const ALL: [Case; 3] = [Case::Original, Case::Upper, Case::Lower];

    pub fn name(&self) -> &'static str {
        match self {
            Case::Original => "Original Case",
            Case::Upper => "UPPERCASE",
            Case::Lower => "lowercase",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|case| case.name() == name)
    }

    pub fn apply(&self, text: &str) -> String {
        match self {
            Case::Original => text.to_string(),
            Case::Upper => text.to_uppercase(),
            Case::Lower => text.to_lowercase(),
        }
    }
}

/// Counters read by the "Sequences" tokens
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Counter {
    DownloadsToday,
    StoredNumber,
    SessionNumber,
}

/// Which date a date-family token formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DateSource {
    /// The image's EXIF capture date
    Image,
    /// The day of the download
    Today,
    /// The day before the download
    Yesterday,
    /// The download date and time
    Download,
}

/// Editor grouping of genera
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Family {
    DateTime,
    Filename,
    Sequences,
    Session,
}

impl Family {
    pub const ALL: [Family; 4] = [
        Family::DateTime,
        Family::Filename,
        Family::Sequences,
        Family::Session,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Family::DateTime => "Date time",
            Family::Filename => "Filename",
            Family::Sequences => "Sequences",
            Family::Session => "Session",
        }
    }

    pub fn genera(&self) -> &'static [Genus] {
        match self {
            Family::DateTime => &[
                Genus::ImageDate,
                Genus::Today,
                Genus::Yesterday,
                Genus::DownloadTime,
            ],
            Family::Filename => &[Genus::Name, Genus::Extension, Genus::ImageNumber],
            Family::Sequences => &[
                Genus::DownloadsToday,
                Genus::StoredNumber,
                Genus::SessionNumber,
                Genus::SequenceLetter,
            ],
            Family::Session => &[Genus::Session],
        }
    }

    /// Sequence numbers make no sense as folder names
    pub fn is_disallowed_in(&self, kind: TemplateType) -> bool {
        matches!((self, kind), (Family::Sequences, TemplateType::Destination))
    }
}

/// Semantic kind of a token
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Genus {
    ImageDate,
    Today,
    Yesterday,
    DownloadTime,
    Name,
    Extension,
    ImageNumber,
    DownloadsToday,
    StoredNumber,
    SessionNumber,
    SequenceLetter,
    Session,
}

impl Genus {
    pub fn name(&self) -> &'static str {
        match self {
            Genus::ImageDate => "Image date",
            Genus::Today => "Today",
            Genus::Yesterday => "Yesterday",
            Genus::DownloadTime => "Download time",
            Genus::Name => "Name",
            Genus::Extension => "Extension",
            Genus::ImageNumber => "Image number",
            Genus::DownloadsToday => "Downloads today",
            Genus::StoredNumber => "Stored number",
            Genus::SessionNumber => "Session number",
            Genus::SequenceLetter => "Sequence letter",
            Genus::Session => "Session",
        }
    }

    pub fn family(&self) -> Family {
        match self {
            Genus::ImageDate | Genus::Today | Genus::Yesterday | Genus::DownloadTime => {
                Family::DateTime
            }
            Genus::Name | Genus::Extension | Genus::ImageNumber => Family::Filename,
            Genus::DownloadsToday
            | Genus::StoredNumber
            | Genus::SessionNumber
            | Genus::SequenceLetter => Family::Sequences,
            Genus::Session => Family::Session,
        }
    }

    pub fn is_disallowed_in(&self, kind: TemplateType) -> bool {
        self.family().is_disallowed_in(kind)
            || matches!((self, kind), (Genus::Extension, TemplateType::Destination))
    }
}

/// Date formats: (display name, strftime spec)
const DATE_FORMATS: &[(&str, &str)] = &[
    ("YYYYMMDD", "%Y%m%d"),
    ("YYYY-MM-DD", "%Y-%m-%d"),
    ("YYMMDD", "%y%m%d"),
    ("YY-MM-DD", "%y-%m-%d"),
    ("MMDDYYYY", "%m%d%Y"),
    ("MMDDYY", "%m%d%y"),
    ("MMDD", "%m%d"),
    ("DDMMYYYY", "%d%m%Y"),
    ("DDMMYY", "%d%m%y"),
    ("YYYY", "%Y"),
    ("YY", "%y"),
    ("MM", "%m"),
    ("DD", "%d"),
    ("Month", "%B"),
    ("Month abbreviated", "%b"),
    ("Weekday", "%A"),
    ("Weekday abbreviated", "%a"),
    ("Day of year", "%j"),
];

/// Time formats: (display name, strftime spec)
const TIME_FORMATS: &[(&str, &str)] = &[
    ("HHMMSS", "%H%M%S"),
    ("HHMM", "%H%M"),
    ("HH-MM-SS", "%H-%M-%S"),
    ("HH-MM", "%H-%M"),
    ("HH", "%H"),
    ("Minutes", "%M"),
    ("Seconds", "%S"),
];

const DIGIT_NAMES: [&str; 6] = [
    "1 digit",
    "2 digits",
    "3 digits",
    "4 digits",
    "5 digits",
    "6 digits",
];

fn trailing_digits() -> &'static Regex {
    static TRAILING_DIGITS: OnceLock<Regex> = OnceLock::new();
    TRAILING_DIGITS.get_or_init(|| Regex::new(r"[0-9]+$").expect("valid image number regex"))
}

/// How a token renders
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenKind {
    /// Literal text, rendered as the token name
    FreeText,
    Date {
        source: DateSource,
        spec: &'static str,
    },
    Name(Case),
    Extension(Case),
    /// All trailing digits of the stem (`None`) or the last N of them
    ImageNumber(Option<usize>),
    Sequence {
        counter: Counter,
        width: usize,
    },
    SequenceLetter(Case),
    Session,
}

/// Atomic naming unit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    name: String,
    /// Display name of the format, e.g. "YYYYMMDD"
    format_name: Option<&'static str>,
    kind: TokenKind,
}

impl Token {
    fn builtin(genus: Genus, format_name: &'static str, kind: TokenKind) -> Arc<Token> {
        Arc::new(Token {
            name: format!("{} ({})", genus.name(), format_name),
            format_name: Some(format_name),
            kind,
        })
    }

    /// A literal text token
    pub fn free_text(text: &str) -> Arc<Token> {
        Arc::new(Token {
            name: text.to_string(),
            format_name: None,
            kind: TokenKind::FreeText,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn format_name(&self) -> Option<&'static str> {
        self.format_name
    }

    pub fn kind(&self) -> &TokenKind {
        &self.kind
    }

    pub fn is_free_text(&self) -> bool {
        self.kind == TokenKind::FreeText
    }

    /// Genus of the token; free text has none
    pub fn genus(&self) -> Option<Genus> {
        Some(match &self.kind {
            TokenKind::FreeText => return None,
            TokenKind::Date { source, .. } => match source {
                DateSource::Image => Genus::ImageDate,
                DateSource::Today => Genus::Today,
                DateSource::Yesterday => Genus::Yesterday,
                DateSource::Download => Genus::DownloadTime,
            },
            TokenKind::Name(_) => Genus::Name,
            TokenKind::Extension(_) => Genus::Extension,
            TokenKind::ImageNumber(_) => Genus::ImageNumber,
            TokenKind::Sequence { counter, .. } => match counter {
                Counter::DownloadsToday => Genus::DownloadsToday,
                Counter::StoredNumber => Genus::StoredNumber,
                Counter::SessionNumber => Genus::SessionNumber,
            },
            TokenKind::SequenceLetter(_) => Genus::SequenceLetter,
            TokenKind::Session => Genus::Session,
        })
    }

    pub fn is_disallowed_in(&self, kind: TemplateType) -> bool {
        self.genus().is_some_and(|genus| genus.is_disallowed_in(kind))
    }

    /// Render the token for an image
    pub fn format(
        &self,
        image: &Image,
        sequences: &SequenceSnapshot,
        download_time: NaiveDateTime,
    ) -> String {
        match &self.kind {
            TokenKind::FreeText => self.name.clone(),
            TokenKind::Date { source, spec } => {
                let datetime = match source {
                    DateSource::Image => image.capture_datetime(),
                    DateSource::Today => download_time,
                    DateSource::Yesterday => download_time - Duration::days(1),
                    DateSource::Download => download_time,
                };
                let mut rendered = String::new();
                // Only builtin specs reach here, a formatting error leaves what was written
                let _ = write!(rendered, "{}", datetime.format(spec));
                rendered
            }
            TokenKind::Name(case) => case.apply(&image.stem),
            TokenKind::Extension(case) => case.apply(image.extension.trim_start_matches('.')),
            TokenKind::ImageNumber(last) => {
                let digits = trailing_digits()
                    .find(&image.stem)
                    .map(|m| m.as_str())
                    .unwrap_or("");
                match last {
                    Some(n) if digits.len() > *n => digits[digits.len() - n..].to_string(),
                    _ => digits.to_string(),
                }
            }
            TokenKind::Sequence { counter, width } => {
                let value = match counter {
                    Counter::DownloadsToday => sequences.downloads_today + 1,
                    Counter::StoredNumber => sequences.stored_number,
                    Counter::SessionNumber => sequences.session_number,
                };
                format!("{:0width$}", value, width = *width)
            }
            TokenKind::SequenceLetter(case) => case.apply(&sequences.sequence_letter()),
            TokenKind::Session => image.session.clone(),
        }
    }
}

/// Tokens of one genus
#[derive(Debug)]
pub struct GenusNode {
    pub genus: Genus,
    pub tokens: Vec<Arc<Token>>,
}

/// Genera of one family
#[derive(Debug)]
pub struct FamilyNode {
    pub family: Family,
    pub genera: Vec<GenusNode>,
}

/// The canonical token taxonomy
#[derive(Debug)]
pub struct TokenTree {
    families: Vec<FamilyNode>,
    by_name: HashMap<String, Arc<Token>>,
}

impl TokenTree {
    /// Build the full tree
    pub fn build() -> Self {
        let families: Vec<FamilyNode> = Family::ALL
            .iter()
            .map(|family| FamilyNode {
                family: *family,
                genera: family
                    .genera()
                    .iter()
                    .map(|genus| GenusNode {
                        genus: *genus,
                        tokens: tokens_of(*genus),
                    })
                    .collect(),
            })
            .collect();

        let by_name = families
            .iter()
            .flat_map(|f| f.genera.iter())
            .flat_map(|g| g.tokens.iter())
            .map(|t| (t.name.clone(), Arc::clone(t)))
            .collect();

        Self { families, by_name }
    }

    /// The process-wide tree, built on first use
    pub fn builtin() -> &'static TokenTree {
        static TREE: OnceLock<TokenTree> = OnceLock::new();
        TREE.get_or_init(TokenTree::build)
    }

    pub fn families(&self) -> &[FamilyNode] {
        &self.families
    }

    pub fn find(&self, name: &str) -> Option<Arc<Token>> {
        self.by_name.get(name).cloned()
    }

    /// Resolve a token name, degrading to free text when it is unknown
    pub fn resolve(&self, name: &str) -> Arc<Token> {
        self.find(name).unwrap_or_else(|| Token::free_text(name))
    }

    /// Families usable in a template of the given kind
    pub fn families_for(&self, kind: TemplateType) -> impl Iterator<Item = &FamilyNode> {
        self.families
            .iter()
            .filter(move |f| !f.family.is_disallowed_in(kind))
    }

    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }
}

fn date_tokens(genus: Genus, source: DateSource, with_time: bool) -> Vec<Arc<Token>> {
    let time_formats: &[(&str, &str)] = if with_time { TIME_FORMATS } else { &[] };
    DATE_FORMATS
        .iter()
        .chain(time_formats.iter())
        .map(|&(display, spec)| Token::builtin(genus, display, TokenKind::Date { source, spec }))
        .collect()
}

fn sequence_tokens(genus: Genus, counter: Counter) -> Vec<Arc<Token>> {
    DIGIT_NAMES
        .iter()
        .enumerate()
        .map(|(i, &display)| {
            Token::builtin(genus, display, TokenKind::Sequence { counter, width: i + 1 })
        })
        .collect()
}

fn tokens_of(genus: Genus) -> Vec<Arc<Token>> {
    match genus {
        Genus::ImageDate => date_tokens(genus, DateSource::Image, true),
        Genus::Today => date_tokens(genus, DateSource::Today, false),
        Genus::Yesterday => date_tokens(genus, DateSource::Yesterday, false),
        Genus::DownloadTime => date_tokens(genus, DateSource::Download, true),
        Genus::Name => Case::ALL
            .iter()
            .map(|case| Token::builtin(genus, case.name(), TokenKind::Name(*case)))
            .collect(),
        Genus::Extension => Case::ALL
            .iter()
            .map(|case| Token::builtin(genus, case.name(), TokenKind::Extension(*case)))
            .collect(),
        Genus::ImageNumber => {
            let mut tokens = vec![Token::builtin(
                genus,
                "All digits",
                TokenKind::ImageNumber(None),
            )];
            tokens.push(Token::builtin(
                genus,
                "Last digit",
                TokenKind::ImageNumber(Some(1)),
            ));
            for (display, n) in [("Last 2 digits", 2), ("Last 3 digits", 3), ("Last 4 digits", 4)] {
                tokens.push(Token::builtin(genus, display, TokenKind::ImageNumber(Some(n))));
            }
            tokens
        }
        Genus::DownloadsToday => sequence_tokens(genus, Counter::DownloadsToday),
        Genus::StoredNumber => sequence_tokens(genus, Counter::StoredNumber),
        Genus::SessionNumber => sequence_tokens(genus, Counter::SessionNumber),
        Genus::SequenceLetter => [Case::Upper, Case::Lower]
            .iter()
            .map(|case| Token::builtin(genus, case.name(), TokenKind::SequenceLetter(*case)))
            .collect(),
        Genus::Session => vec![Arc::new(Token {
            name: genus.name().to_string(),
            format_name: None,
            kind: TokenKind::Session,
        })],
    }
}
