//! TOML engine configuration.
//!
//! ```toml
//! categories = ["email", "phone", "name"]
//! allowlist = ["support@example.com"]
//!
//! [priorities]
//! phone = 120
//!
//! [[custom_rules]]
//! category = "employee_id"
//! patterns = ['\bEMP-\d{6}\b']
//! priority = 90
//!
//! [store]
//! dir = ".maskwell"
//!
//! [localization]
//! target_locale = "fr"    # omit to use the input's language
//! endpoint = "http://localhost:5000"
//! ```

use crate::detector::EntityRecognizer;
use crate::error::{Error, Result};
use crate::localizer::LabelLocalizer;
use crate::policy::{Localization, RuleRegistry};
use crate::redactor::Redactor;
use crate::rules;
use crate::translate::LibreTranslate;
use crate::types::{KeyNormalization, ReplacementMode};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Enabled categories; every registered rule when absent
    #[serde(default)]
    pub categories: Option<Vec<String>>,

    #[serde(default)]
    pub allowlist: Vec<String>,

    /// Priority overrides for registered categories
    #[serde(default)]
    pub priorities: BTreeMap<String, i32>,

    #[serde(default)]
    pub custom_rules: Vec<CustomRuleConfig>,

    #[serde(default)]
    pub store: StoreConfig,

    #[serde(default)]
    pub localization: Option<LocalizationConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomRuleConfig {
    pub category: String,
    pub patterns: Vec<String>,
    pub priority: i32,

    #[serde(default)]
    pub mode: ReplacementMode,

    #[serde(default)]
    pub normalization: KeyNormalization,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_store_dir")]
    pub dir: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            dir: default_store_dir(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocalizationConfig {
    #[serde(default = "default_source_locale")]
    pub source_locale: String,

    /// Detected from the input when absent
    #[serde(default)]
    pub target_locale: Option<String>,

    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// LibreTranslate-compatible endpoint
    #[serde(default)]
    pub endpoint: Option<String>,

    #[serde(default)]
    pub api_key: Option<String>,
}

impl LocalizationConfig {
    pub fn to_localization(&self) -> Localization {
        let localization = match &self.target_locale {
            Some(target) => Localization::new(target.clone()),
            None => Localization::auto(),
        };
        localization
            .with_source(self.source_locale.clone())
            .with_timeout(Duration::from_millis(self.timeout_ms))
    }

    /// HTTP localizer, when an endpoint is configured
    pub fn localizer(&self) -> Option<LabelLocalizer> {
        let endpoint = self.endpoint.as_deref()?;
        let mut translator = LibreTranslate::new(endpoint);
        if let Some(key) = &self.api_key {
            translator = translator.with_api_key(key.clone());
        }
        Some(LabelLocalizer::new(Arc::new(translator)))
    }
}

fn default_store_dir() -> PathBuf {
    PathBuf::from(".maskwell")
}

fn default_source_locale() -> String {
    "en".to_string()
}

fn default_timeout_ms() -> u64 {
    2000
}

impl EngineConfig {
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Config(format!("TOML parse error: {}", e)))
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("cannot read {}: {}", path.display(), e)))?;
        Self::from_toml_str(&content)
    }

    /// Built-in rules plus custom rules, with overrides and the category
    /// filter applied.
    pub fn build_registry(
        &self,
        recognizer: Option<Arc<dyn EntityRecognizer>>,
    ) -> Result<RuleRegistry> {
        let mut registry = rules::builtin(recognizer)?;

        for custom in &self.custom_rules {
            let patterns: Vec<&str> = custom.patterns.iter().map(String::as_str).collect();
            if patterns.is_empty() {
                return Err(Error::Config(format!(
                    "custom rule '{}' has no patterns",
                    custom.category
                )));
            }
            let rule = rules::pattern_rule(&custom.category, custom.priority, &patterns)?
                .with_mode(custom.mode)
                .with_normalization(custom.normalization);
            registry.register(rule)?;
        }

        for (category, &priority) in &self.priorities {
            registry.set_priority(category, priority)?;
        }

        if let Some(categories) = &self.categories {
            let keep: BTreeSet<String> = categories.iter().cloned().collect();
            registry.retain(&keep)?;
        }
        Ok(registry)
    }

    /// Engine with registry, allowlist and, when configured, an HTTP localizer
    pub fn build_redactor(
        &self,
        recognizer: Option<Arc<dyn EntityRecognizer>>,
    ) -> Result<Redactor> {
        let mut redactor =
            Redactor::new(self.build_registry(recognizer)?).with_allowlist(self.allowlist.clone());
        if let Some(localizer) = self.localization.as_ref().and_then(|l| l.localizer()) {
            redactor = redactor.with_localizer(localizer);
        }
        Ok(redactor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::PlaceholderCache;
    use crate::policy::ProtectOptions;
    use crate::rules::{EMAIL, PHONE};

    const SAMPLE: &str = r#"
categories = ["email", "phone", "employee_id"]
allowlist = ["support@example.com"]

[priorities]
phone = 120

[[custom_rules]]
category = "employee_id"
patterns = ['\bEMP-\d{6}\b']
priority = 90
normalization = "lowercase"

[store]
dir = "/var/lib/maskwell"

[localization]
target_locale = "fr"
timeout_ms = 500
"#;

    #[test]
    fn test_parse_full_config() {
        let config = EngineConfig::from_toml_str(SAMPLE).unwrap();
        assert_eq!(config.allowlist, vec!["support@example.com"]);
        assert_eq!(config.priorities[PHONE], 120);
        assert_eq!(config.custom_rules[0].mode, ReplacementMode::Placeholder);
        assert_eq!(config.custom_rules[0].normalization, KeyNormalization::Lowercase);
        assert_eq!(config.store.dir, PathBuf::from("/var/lib/maskwell"));

        let localization = config.localization.as_ref().unwrap();
        assert_eq!(localization.source_locale, "en");
        assert!(localization.localizer().is_none());
        let localization = localization.to_localization();
        assert_eq!(localization.target_locale.as_deref(), Some("fr"));
        assert_eq!(localization.timeout, Duration::from_millis(500));
    }

    #[test]
    fn test_localization_without_target_detects_it() {
        let config = EngineConfig::from_toml_str(
            r#"
[localization]
endpoint = "http://localhost:5000/"
"#,
        )
        .unwrap();
        let localization = config.localization.as_ref().unwrap();
        assert!(localization.localizer().is_some());
        assert_eq!(localization.to_localization().target_locale, None);
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = EngineConfig::from_toml_str("").unwrap();
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.store.dir, PathBuf::from(".maskwell"));
        let registry = config.build_registry(None).unwrap();
        assert_eq!(registry.len(), rules::builtin(None).unwrap().len());
    }

    #[test]
    fn test_build_registry_applies_config() {
        let config = EngineConfig::from_toml_str(SAMPLE).unwrap();
        let registry = config.build_registry(None).unwrap();
        let categories: BTreeSet<&str> = registry.categories().collect();
        assert_eq!(
            categories,
            [EMAIL, PHONE, "employee_id"].into_iter().collect()
        );
        assert_eq!(registry.get(PHONE).unwrap().priority(), 120);
    }

    #[test]
    fn test_build_redactor_uses_custom_rules_and_allowlist() {
        let config = EngineConfig::from_toml_str(SAMPLE).unwrap();
        let redactor = config.build_redactor(None).unwrap();
        let mut cache = PlaceholderCache::new();
        let protected = redactor
            .redact(
                "EMP-123456 wrote to support@example.com and ann@example.com",
                &ProtectOptions::default(),
                &mut cache,
            )
            .unwrap();
        assert_eq!(
            protected.text,
            "[EMPLOYEE_ID_1] wrote to support@example.com and [EMAIL_1]"
        );
    }

    #[test]
    fn test_config_errors() {
        assert!(matches!(
            EngineConfig::from_toml_str("categories = 3"),
            Err(Error::Config(_))
        ));

        let config = EngineConfig::from_toml_str(r#"categories = ["fax"]"#).unwrap();
        assert!(matches!(
            config.build_registry(None),
            Err(Error::UnknownCategory(c)) if c == "fax"
        ));

        let config = EngineConfig::from_toml_str(
            r#"
[[custom_rules]]
category = "email"
patterns = ["x"]
priority = 1
"#,
        )
        .unwrap();
        assert!(matches!(
            config.build_registry(None),
            Err(Error::DuplicateCategory(_))
        ));

        assert!(matches!(
            EngineConfig::load("/nonexistent/maskwell.toml"),
            Err(Error::Config(_))
        ));
    }
}
