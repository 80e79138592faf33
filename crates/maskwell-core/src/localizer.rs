//! Placeholder label localization.
//!
//! Rewrites `[EMAIL_1]` into `[COURRIEL_1]` (or whatever the translator
//! returns) after substitution. Every failure is soft: the base placeholder
//! stays in place.

use crate::error::TranslateError;
use crate::policy::Localization;
use crate::types::base_placeholders;
use async_trait::async_trait;
use futures::future::join_all;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::debug;

/// External translation capability
#[async_trait]
pub trait Translator: Send + Sync {
    async fn translate(
        &self,
        text: &str,
        source_locale: &str,
        target_locale: &str,
    ) -> Result<String, TranslateError>;
}

/// Localized text plus the localized → base placeholder aliases it introduced
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Localized {
    pub text: String,
    pub aliases: BTreeMap<String, String>,
}

#[derive(Clone)]
pub struct LabelLocalizer {
    translator: Arc<dyn Translator>,
}

impl LabelLocalizer {
    pub fn new(translator: Arc<dyn Translator>) -> Self {
        Self { translator }
    }

    /// Localize the placeholders in `text` that appear in `emitted`.
    ///
    /// Placeholder-shaped tokens outside `emitted` are user text and stay
    /// as written. Nothing happens without a concrete target locale.
    pub async fn localize(
        &self,
        text: &str,
        localization: &Localization,
        emitted: &BTreeSet<&str>,
    ) -> Localized {
        let Some(target) = localization.target_locale.as_deref() else {
            return unchanged(text);
        };
        let found: Vec<_> = base_placeholders(text)
            .into_iter()
            .filter(|((start, end), _, _)| emitted.contains(&text[*start..*end]))
            .collect();
        if found.is_empty() || localization.source_locale.eq_ignore_ascii_case(target) {
            return unchanged(text);
        }

        // One translation per distinct label, all in flight at once
        let labels: BTreeSet<&str> = found.iter().map(|(_, label, _)| *label).collect();
        let translated = join_all(labels.iter().map(|label| async move {
            let translated = self
                .translate_label(label, &localization.source_locale, target, localization.timeout)
                .await;
            (*label, translated)
        }))
        .await;
        let table = deconflict(&labels, translated.into_iter().collect());

        let mut out = String::with_capacity(text.len());
        let mut aliases = BTreeMap::new();
        let mut last = 0;
        for ((start, end), label, ordinal) in found {
            out.push_str(&text[last..start]);
            let base = &text[start..end];
            match table.get(label) {
                Some(localized_label) => {
                    let localized = format!("[{localized_label}_{ordinal}]");
                    out.push_str(&localized);
                    aliases.insert(localized, base.to_string());
                }
                None => out.push_str(base),
            }
            last = end;
        }
        out.push_str(&text[last..]);

        Localized { text: out, aliases }
    }

    async fn translate_label(
        &self,
        label: &str,
        source_locale: &str,
        target_locale: &str,
        limit: Duration,
    ) -> Option<String> {
        let phrase = label.to_lowercase().replace('_', " ");
        let call = self
            .translator
            .translate(&phrase, source_locale, target_locale);
        let result = match timeout(limit, call).await {
            Ok(result) => result,
            Err(_) => Err(TranslateError::Timeout(limit.as_millis())),
        };
        match result {
            Ok(translated) => sanitize_label(&translated),
            Err(e) => {
                debug!(label, error = %e, "label translation failed, keeping base placeholder");
                None
            }
        }
    }
}

fn unchanged(text: &str) -> Localized {
    Localized {
        text: text.to_string(),
        aliases: BTreeMap::new(),
    }
}

/// Upper-case, whitespace to `_`, and no brackets so the result is still a
/// single placeholder token.
fn sanitize_label(translated: &str) -> Option<String> {
    let label = translated
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("_")
        .replace(['[', ']'], "")
        .to_uppercase();
    (!label.is_empty()).then_some(label)
}

/// Keep a translation only if no other label ends up spelled the same way.
fn deconflict<'a>(
    labels: &BTreeSet<&'a str>,
    mut translated: HashMap<&'a str, Option<String>>,
) -> HashMap<&'a str, String> {
    loop {
        let mut spelled: HashMap<String, usize> = HashMap::new();
        for label in labels {
            let final_label = match translated.get(label) {
                Some(Some(t)) => t.clone(),
                _ => label.to_string(),
            };
            *spelled.entry(final_label).or_default() += 1;
        }

        let clashing: Vec<&'a str> = labels
            .iter()
            .copied()
            .filter(|label| match translated.get(label) {
                Some(Some(t)) => t != label && spelled.get(t).copied().unwrap_or(0) > 1,
                _ => false,
            })
            .collect();
        if clashing.is_empty() {
            break;
        }
        for label in clashing {
            translated.insert(label, None);
        }
    }

    translated
        .into_iter()
        .filter_map(|(label, t)| t.map(|t| (label, t)))
        .collect()
}
