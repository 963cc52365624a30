//! Domain terminology ("ubiquitous language") catalog
//!
//! A catalog is static lookup data supplied as TOML or JSON:
//!
//! ```toml
//! [terms]
//! Order = "A customer's purchase request"
//! Invoice = { description = "Bill sent after fulfilment" }
//! Ledger = { definition = "Append-only record of postings" }
//!
//! [modules.billing]
//! entities = ["Invoice", "Ledger"]
//! events = ["InvoicePaid"]
//! ```
//!
//! Raw entries are normalized into [`TermDefinition`] and [`ModuleTerms`]
//! when the catalog is loaded. A missing or unreadable catalog is empty.

use crate::error::ConfigError;
use regex::Regex;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, info, warn};

/// One catalog term with its normalized description
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TermDefinition {
    pub name: String,
    pub description: String,
}

/// Terms grouped under a bounded context / module
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModuleTerms {
    pub module: String,
    pub entities: Vec<String>,
    pub events: Vec<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawTerm {
    Text(String),
    Described { description: String },
    Defined { definition: String },
}

impl RawTerm {
    fn into_description(self) -> String {
        match self {
            RawTerm::Text(text) => text,
            RawTerm::Described { description } => description,
            RawTerm::Defined { definition } => definition,
        }
    }
}

#[derive(Deserialize, Default)]
struct RawModule {
    #[serde(default)]
    entities: Vec<String>,
    #[serde(default)]
    events: Vec<String>,
}

#[derive(Deserialize, Default)]
struct RawCatalog {
    #[serde(default)]
    terms: BTreeMap<String, RawTerm>,
    #[serde(default)]
    modules: BTreeMap<String, RawModule>,
}

/// Normalized catalog with precompiled whole-word matchers
#[derive(Debug, Default)]
pub struct TermCatalog {
    terms: Vec<TermDefinition>,
    modules: Vec<ModuleTerms>,
    matchers: Vec<(String, Regex)>,
}

impl TermCatalog {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Load a catalog, choosing the format by extension (`.json`, else TOML).
    /// Never fails: problems are logged and yield an empty catalog.
    pub fn load(path: &Path) -> Self {
        if !path.exists() {
            debug!("No terminology catalog at {}", path.display());
            return Self::empty();
        }

        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) => {
                warn!("Failed to read terminology catalog {}: {}", path.display(), e);
                return Self::empty();
            }
        };

        let is_json = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("json"));
        let parsed = if is_json {
            Self::from_json_str(&content)
        } else {
            Self::from_toml_str(&content)
        };

        match parsed {
            Ok(catalog) => {
                info!(
                    "Loaded terminology catalog: {} terms, {} modules",
                    catalog.terms.len(),
                    catalog.modules.len()
                );
                catalog
            }
            Err(e) => {
                warn!("Ignoring terminology catalog {}: {}", path.display(), e);
                Self::empty()
            }
        }
    }

    /// Load from the configured path, or empty when none is configured
    pub fn from_config(config: &crate::config::TerminologyConfig) -> Self {
        config
            .catalog_path
            .as_deref()
            .map(Self::load)
            .unwrap_or_default()
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let raw: RawCatalog = toml::from_str(content)
            .map_err(|e| ConfigError::ParseFailed(format!("Invalid terminology TOML: {}", e)))?;
        Ok(Self::from_raw(raw))
    }

    pub fn from_json_str(content: &str) -> Result<Self, ConfigError> {
        let raw: RawCatalog = serde_json::from_str(content)
            .map_err(|e| ConfigError::ParseFailed(format!("Invalid terminology JSON: {}", e)))?;
        Ok(Self::from_raw(raw))
    }

    fn from_raw(raw: RawCatalog) -> Self {
        let terms: Vec<TermDefinition> = raw
            .terms
            .into_iter()
            .map(|(name, term)| TermDefinition {
                name: name.trim().to_string(),
                description: term.into_description().trim().to_string(),
            })
            .filter(|t| !t.name.is_empty())
            .collect();

        let modules: Vec<ModuleTerms> = raw
            .modules
            .into_iter()
            .map(|(module, raw)| ModuleTerms {
                module,
                entities: raw.entities,
                events: raw.events,
            })
            .collect();

        let mut names: Vec<String> = terms.iter().map(|t| t.name.clone()).collect();
        for module in &modules {
            names.extend(module.entities.iter().cloned());
            names.extend(module.events.iter().cloned());
        }
        names.sort();
        names.dedup();

        let matchers = names
            .into_iter()
            .filter(|name| !name.trim().is_empty())
            .filter_map(|name| {
                let pattern = format!(r"(?i)\b{}\b", regex::escape(name.trim()));
                Regex::new(&pattern).ok().map(|re| (name, re))
            })
            .collect();

        Self {
            terms,
            modules,
            matchers,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.matchers.is_empty()
    }

    pub fn terms(&self) -> &[TermDefinition] {
        &self.terms
    }

    pub fn modules(&self) -> &[ModuleTerms] {
        &self.modules
    }

    pub fn describe(&self, name: &str) -> Option<&str> {
        self.terms
            .iter()
            .find(|t| t.name.eq_ignore_ascii_case(name))
            .map(|t| t.description.as_str())
    }

    /// Catalog names (terms, entities, events) that occur in `text` as whole
    /// words, case-insensitively, in catalog order
    pub fn tags_for(&self, text: &str) -> Vec<String> {
        self.matchers
            .iter()
            .filter(|(_, re)| re.is_match(text))
            .map(|(name, _)| name.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOML_CATALOG: &str = r#"
[terms]
Order = "A customer's purchase request"
Invoice = { description = "Bill sent after fulfilment" }
Ledger = { definition = "Append-only record of postings" }

[modules.billing]
entities = ["Invoice", "Ledger"]
events = ["InvoicePaid"]
"#;

    #[test]
    fn test_toml_entries_are_normalized() {
        let catalog = TermCatalog::from_toml_str(TOML_CATALOG).unwrap();

        assert_eq!(catalog.terms().len(), 3);
        assert_eq!(catalog.describe("order"), Some("A customer's purchase request"));
        assert_eq!(catalog.describe("Invoice"), Some("Bill sent after fulfilment"));
        assert_eq!(catalog.describe("Ledger"), Some("Append-only record of postings"));
        assert_eq!(
            catalog.modules(),
            &[ModuleTerms {
                module: "billing".to_string(),
                entities: vec!["Invoice".to_string(), "Ledger".to_string()],
                events: vec!["InvoicePaid".to_string()],
            }]
        );
    }

    #[test]
    fn test_json_catalog() {
        let catalog = TermCatalog::from_json_str(
            r#"{"terms": {"Shipment": {"description": "Goods in transit"}},
                "modules": {"logistics": {"events": ["ShipmentDispatched"]}}}"#,
        )
        .unwrap();

        assert_eq!(catalog.describe("shipment"), Some("Goods in transit"));
        assert_eq!(catalog.modules()[0].entities, Vec::<String>::new());
        assert_eq!(
            catalog.tags_for("emit(ShipmentDispatched { id })"),
            vec!["ShipmentDispatched"]
        );
    }

    #[test]
    fn test_tags_are_whole_word_and_case_insensitive() {
        let catalog = TermCatalog::from_toml_str(TOML_CATALOG).unwrap();

        let tags = catalog.tags_for("fn pay(invoice: &Invoice) -> InvoicePaid { order_total() }");
        assert_eq!(tags, vec!["Invoice", "InvoicePaid"]);
        assert!(catalog.tags_for("reorder the list").is_empty());
    }

    #[test]
    fn test_missing_and_broken_catalogs_are_empty() {
        let dir = tempfile::TempDir::new().unwrap();

        let missing = TermCatalog::load(&dir.path().join("missing.toml"));
        assert!(missing.is_empty());
        assert!(missing.tags_for("Invoice").is_empty());

        let broken = dir.path().join("broken.toml");
        std::fs::write(&broken, "[terms\nOrder = ").unwrap();
        assert!(TermCatalog::load(&broken).is_empty());

        let good = dir.path().join("terms.json");
        std::fs::write(&good, r#"{"terms": {"Order": "x"}}"#).unwrap();
        assert_eq!(TermCatalog::load(&good).terms().len(), 1);
    }

    #[test]
    fn test_from_config_without_path() {
        let catalog = TermCatalog::from_config(&crate::config::TerminologyConfig::default());
        assert!(catalog.is_empty());
    }
}
