use crate::detector::Detector;
use crate::error::{Error, Result};
use crate::locale::detect_locale;
use crate::types::{KeyNormalization, ReplacementMode};
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Redaction rule – binds an entity category to its detectors and policy
#[derive(Clone)]
pub struct Rule {
    category: String,
    detectors: Vec<Arc<dyn Detector>>,
    /// Higher wins conflicts
    priority: i32,
    mode: ReplacementMode,
    normalization: KeyNormalization,
}

impl Rule {
    pub fn new(category: impl Into<String>, priority: i32) -> Self {
        Self {
            category: category.into(),
            detectors: Vec::new(),
            priority,
            mode: ReplacementMode::Placeholder,
            normalization: KeyNormalization::Exact,
        }
    }

    pub fn with_detector(mut self, detector: impl Detector + 'static) -> Self {
        self.detectors.push(Arc::new(detector));
        self
    }

    pub fn with_shared_detector(mut self, detector: Arc<dyn Detector>) -> Self {
        self.detectors.push(detector);
        self
    }

    pub fn with_mode(mut self, mode: ReplacementMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_normalization(mut self, normalization: KeyNormalization) -> Self {
        self.normalization = normalization;
        self
    }

    pub fn category(&self) -> &str {
        &self.category
    }

    pub fn detectors(&self) -> &[Arc<dyn Detector>] {
        &self.detectors
    }

    pub fn priority(&self) -> i32 {
        self.priority
    }

    pub fn mode(&self) -> ReplacementMode {
        self.mode
    }

    pub fn normalization(&self) -> KeyNormalization {
        self.normalization
    }
}

impl fmt::Debug for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let detectors: Vec<&str> = self.detectors.iter().map(|d| d.name()).collect();
        f.debug_struct("Rule")
            .field("category", &self.category)
            .field("detectors", &detectors)
            .field("priority", &self.priority)
            .field("mode", &self.mode)
            .field("normalization", &self.normalization)
            .finish()
    }
}

/// Ordered, duplicate-free collection of rules
#[derive(Debug, Clone, Default)]
pub struct RuleRegistry {
    rules: Vec<Rule>,
}

impl RuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a rule. Category names are lower-case identifiers and unique.
    pub fn register(&mut self, rule: Rule) -> Result<()> {
        if !is_valid_category(&rule.category) {
            return Err(Error::InvalidCategory(rule.category));
        }
        if self.get(&rule.category).is_some() {
            return Err(Error::DuplicateCategory(rule.category));
        }
        self.rules.push(rule);
        Ok(())
    }

    /// Rules in insertion order
    pub fn all(&self) -> &[Rule] {
        &self.rules
    }

    pub fn get(&self, category: &str) -> Option<&Rule> {
        self.rules.iter().find(|r| r.category == category)
    }

    pub fn categories(&self) -> impl Iterator<Item = &str> {
        self.rules.iter().map(|r| r.category.as_str())
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn set_priority(&mut self, category: &str, priority: i32) -> Result<()> {
        let rule = self
            .rules
            .iter_mut()
            .find(|r| r.category == category)
            .ok_or_else(|| Error::UnknownCategory(category.to_string()))?;
        rule.priority = priority;
        Ok(())
    }

    /// Drop every rule whose category is not in `keep`
    pub fn retain(&mut self, keep: &BTreeSet<String>) -> Result<()> {
        if let Some(unknown) = keep.iter().find(|c| self.get(c).is_none()) {
            return Err(Error::UnknownCategory(unknown.clone()));
        }
        self.rules.retain(|r| keep.contains(&r.category));
        Ok(())
    }

    /// Rules enabled by a category filter (`None` = all)
    pub fn select(&self, filter: Option<&BTreeSet<String>>) -> Result<Vec<&Rule>> {
        match filter {
            None => Ok(self.rules.iter().collect()),
            Some(categories) => {
                if let Some(unknown) = categories.iter().find(|c| self.get(c).is_none()) {
                    return Err(Error::UnknownCategory(unknown.clone()));
                }
                Ok(self
                    .rules
                    .iter()
                    .filter(|r| categories.contains(&r.category))
                    .collect())
            }
        }
    }
}

fn is_valid_category(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_lowercase())
        && chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
}

/// Placeholder label translation settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Localization {
    pub source_locale: String,
    /// `None` targets the language detected in the input
    pub target_locale: Option<String>,
    /// Upper bound for each translation call
    pub timeout: Duration,
}

impl Localization {
    pub fn new(target_locale: impl Into<String>) -> Self {
        Self::with_target(Some(target_locale.into()))
    }

    /// Translate into whatever language the input is written in
    pub fn auto() -> Self {
        Self::with_target(None)
    }

    fn with_target(target_locale: Option<String>) -> Self {
        Self {
            source_locale: "en".to_string(),
            target_locale,
            timeout: Duration::from_secs(2),
        }
    }

    pub fn with_source(mut self, source_locale: impl Into<String>) -> Self {
        self.source_locale = source_locale.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Settings with a concrete target for `input`. An explicit target always
    /// wins; otherwise the input's language is detected. `None` when it
    /// cannot be determined.
    pub fn resolve(&self, input: &str) -> Option<Localization> {
        let target = match &self.target_locale {
            Some(target) => target.clone(),
            None => detect_locale(input)?,
        };
        Some(Self {
            target_locale: Some(target),
            ..self.clone()
        })
    }
}

/// Per-call options for the redactor
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProtectOptions {
    /// Category filter; `None` runs every registered rule
    pub categories: Option<BTreeSet<String>>,
    /// Translate placeholder labels after rewriting
    pub localization: Option<Localization>,
}

impl ProtectOptions {
    pub fn builder() -> OptionsBuilder {
        OptionsBuilder::default()
    }

    pub fn localization_enabled(&self) -> bool {
        self.localization.is_some()
    }
}

/// Builder for ProtectOptions – enables fluent configuration
#[derive(Default)]
pub struct OptionsBuilder {
    options: ProtectOptions,
}

impl OptionsBuilder {
    pub fn only(mut self, category: &str) -> Self {
        self.options
            .categories
            .get_or_insert_with(BTreeSet::new)
            .insert(category.to_string());
        self
    }

    pub fn categories<I, S>(mut self, categories: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.options.categories = Some(categories.into_iter().map(Into::into).collect());
        self
    }

    pub fn localize(mut self, localization: Localization) -> Self {
        self.options.localization = Some(localization);
        self
    }

    pub fn build(self) -> ProtectOptions {
        self.options
    }
}
