//! Naming template engine
//!
//! Renders image file names and destination folder paths from ordered token
//! lists.
//!
//! # Submodules
//!
//! - `tokens` - Token taxonomy (family, genus, token) and token rendering
//! - `template` - A single naming template and its persisted form
//! - `templates` - Builtin and custom template collections

pub mod template;
pub mod templates;
pub mod tokens;

pub use template::NamingTemplate;
pub use templates::NamingTemplates;
pub use tokens::{Case, TemplateType, Token, TokenTree};
