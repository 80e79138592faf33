//! Reversible entity redaction.
//!
//! Sensitive values are replaced with stable `[CATEGORY_n]` placeholders.
//! The same value always gets the same placeholder within a session, and the
//! returned mapping turns placeholders back into the original values.
//!
//! ```no_run
//! use maskwell_core::{rules, PlaceholderCache, ProtectOptions, Redactor};
//!
//! # fn main() -> maskwell_core::Result<()> {
//! let redactor = Redactor::new(rules::builtin(None)?);
//! let mut cache = PlaceholderCache::new();
//! let protected = redactor.redact("mail bob@example.com", &ProtectOptions::default(), &mut cache)?;
//! assert_eq!(protected.text, "mail [EMAIL_1]");
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod collector;
pub mod config;
pub mod detector;
pub mod error;
pub mod locale;
pub mod localizer;
pub mod policy;
pub mod redactor;
pub mod resolver;
pub mod rules;
pub mod store;
pub mod translate;
pub mod types;

pub use cache::{MappingDocument, PlaceholderCache, Session, SharedCache};
pub use config::EngineConfig;
pub use detector::{
    Detector, EntityRecognizer, EntitySpan, HeuristicNameRecognizer, MemoizedRecognizer,
    ModelDetector, PatternDetector,
};
pub use error::{DetectorError, Error, Result, StoreError, TranslateError};
pub use locale::detect_locale;
pub use localizer::{LabelLocalizer, Localized, Translator};
pub use policy::{Localization, ProtectOptions, Rule, RuleRegistry};
pub use redactor::{restore, restore_text, Protected, Redactor, Stage};
pub use store::{FileStore, MappingStore, MemoryStore};
pub use translate::LibreTranslate;
pub use types::{Candidate, KeyNormalization, ReplacementMode, Span};
