use crate::{
    cache::{PlaceholderCache, SharedCache},
    collector::{allowlist_spans, collect, exclude_reserved},
    error::Result,
    localizer::LabelLocalizer,
    policy::{ProtectOptions, RuleRegistry},
    resolver::resolve,
    types::{normalize_shape, placeholder_tokens, Candidate, ReplacementMode},
};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

/// Engine stages, in order. Logged as they are entered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Idle,
    Collecting,
    Resolving,
    Rewriting,
    Localizing,
    Done,
}

/// Result of a protection run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Protected {
    pub text: String,
    /// placeholder → original value, for placeholders emitted by this run
    pub mapping: BTreeMap<String, String>,
    /// Replacements per category
    pub counts: BTreeMap<String, usize>,
}

/// Core redaction engine – orchestrates collection, resolution and rewrite
pub struct Redactor {
    registry: RuleRegistry,
    allowlist: Vec<String>,
    localizer: Option<LabelLocalizer>,
}

impl Redactor {
    pub fn new(registry: RuleRegistry) -> Self {
        Self {
            registry,
            allowlist: Vec::new(),
            localizer: None,
        }
    }

    /// Terms that are never redacted, even when a detector matches them
    pub fn with_allowlist<I, S>(mut self, terms: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowlist = terms.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_localizer(mut self, localizer: LabelLocalizer) -> Self {
        self.localizer = Some(localizer);
        self
    }

    pub fn registry(&self) -> &RuleRegistry {
        &self.registry
    }

    /// Collect and resolve. Never touches the cache.
    fn plan(&self, text: &str, options: &ProtectOptions) -> Result<Vec<Candidate>> {
        let rules = self.registry.select(options.categories.as_ref())?;

        debug!(stage = ?Stage::Collecting, rules = rules.len());
        let candidates = collect(text, &rules);
        let reserved = allowlist_spans(text, &self.allowlist);
        let candidates = exclude_reserved(text, candidates, &reserved);

        debug!(stage = ?Stage::Resolving, candidates = candidates.len());
        Ok(resolve(candidates))
    }

    /// Splice replacements into `text`.
    ///
    /// `accepted` is sorted by start descending. Placeholders are assigned
    /// in reading order so the first mention gets ordinal 1, then the text
    /// is rewritten right to left.
    fn rewrite(
        &self,
        text: &str,
        accepted: &[Candidate],
        cache: &mut PlaceholderCache,
    ) -> Protected {
        debug!(stage = ?Stage::Rewriting, accepted = accepted.len());

        let mut mapping = BTreeMap::new();
        let mut counts: BTreeMap<String, usize> = BTreeMap::new();
        let mut replacements = Vec::with_capacity(accepted.len());
        for found in accepted.iter().rev() {
            let Some(rule) = self.registry.get(&found.category) else {
                replacements.push(found.value.clone());
                continue;
            };
            let replacement = match rule.mode() {
                ReplacementMode::Placeholder => {
                    let key = rule.normalization().apply(&found.value);
                    let assigned = cache.placeholder_for(rule.category(), &key, &found.value);
                    let original = cache.restore(&assigned).unwrap_or(&found.value);
                    mapping.insert(assigned.clone(), original.to_string());
                    assigned
                }
                ReplacementMode::Normalize => normalize_shape(&found.value),
            };
            *counts.entry(found.category.clone()).or_default() += 1;
            replacements.push(replacement);
        }

        let mut out = text.to_string();
        for (found, replacement) in accepted.iter().zip(replacements.iter().rev()) {
            out.replace_range(found.start..found.end, replacement);
        }

        Protected {
            text: out,
            mapping,
            counts,
        }
    }

    /// Redact `text` without localization.
    pub fn redact(
        &self,
        text: &str,
        options: &ProtectOptions,
        cache: &mut PlaceholderCache,
    ) -> Result<Protected> {
        debug!(stage = ?Stage::Idle, bytes = text.len());
        if text.is_empty() {
            return Ok(Protected::default());
        }
        let accepted = self.plan(text, options)?;
        let protected = self.rewrite(text, &accepted, cache);
        debug!(stage = ?Stage::Done, replaced = accepted.len());
        Ok(protected)
    }

    /// Like [`Redactor::redact`] against a shared cache. The lock is held for
    /// the rewrite only.
    pub fn redact_shared(
        &self,
        text: &str,
        options: &ProtectOptions,
        cache: &SharedCache,
    ) -> Result<Protected> {
        if text.is_empty() {
            return Ok(Protected::default());
        }
        let accepted = self.plan(text, options)?;
        let mut guard = cache.lock();
        Ok(self.rewrite(text, &accepted, &mut guard))
    }

    /// Full pipeline, including label localization when the options ask for
    /// it and a localizer is attached.
    pub async fn protect(
        &self,
        text: &str,
        options: &ProtectOptions,
        cache: &mut PlaceholderCache,
    ) -> Result<Protected> {
        let protected = self.redact(text, options, cache)?;
        Ok(self.localize(text, protected, options).await)
    }

    pub async fn protect_shared(
        &self,
        text: &str,
        options: &ProtectOptions,
        cache: &SharedCache,
    ) -> Result<Protected> {
        let protected = self.redact_shared(text, options, cache)?;
        Ok(self.localize(text, protected, options).await)
    }

    /// Localize the placeholders this run emitted. `input` is the text as
    /// given, used to detect the target language when none is set.
    async fn localize(
        &self,
        input: &str,
        mut protected: Protected,
        options: &ProtectOptions,
    ) -> Protected {
        let Some(requested) = options.localization.as_ref() else {
            return protected;
        };
        let Some(localizer) = self.localizer.as_ref() else {
            debug!("localization requested but no localizer attached");
            return protected;
        };
        if protected.mapping.is_empty() {
            return protected;
        }
        let Some(localization) = requested.resolve(input) else {
            debug!("input language undetermined, keeping base placeholders");
            return protected;
        };

        debug!(stage = ?Stage::Localizing, target = ?localization.target_locale);
        let emitted: BTreeSet<&str> = protected.mapping.keys().map(String::as_str).collect();
        let localized = localizer
            .localize(&protected.text, &localization, &emitted)
            .await;
        for (alias, base) in localized.aliases {
            if let Some(original) = protected.mapping.get(&base).cloned() {
                protected.mapping.insert(alias, original);
            }
        }
        protected.text = localized.text;
        debug!(stage = ?Stage::Done);
        protected
    }
}

/// Original value behind `placeholder`, or the placeholder itself when the
/// mapping does not know it.
pub fn restore(placeholder: &str, mapping: &BTreeMap<String, String>) -> String {
    mapping
        .get(placeholder.trim())
        .cloned()
        .unwrap_or_else(|| placeholder.to_string())
}

/// Replace every known placeholder in `text` (e.g. consumer output).
/// Unknown placeholders are left as they are.
pub fn restore_text(text: &str, mapping: &BTreeMap<String, String>) -> String {
    let mut out = String::with_capacity(text.len());
    let mut last = 0;
    for token in placeholder_tokens(text) {
        out.push_str(&text[last..token.start()]);
        match mapping.get(token.as_str()) {
            Some(original) => out.push_str(original),
            None => out.push_str(token.as_str()),
        }
        last = token.end();
    }
    out.push_str(&text[last..]);
    out
}
