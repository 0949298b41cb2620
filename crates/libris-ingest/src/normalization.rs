//! Editable normalization rule table, persisted as JSON.
//!
//! Three categories: `ligatures` and `punctuation` hold literal
//! substitutions, `ocr_artifacts` holds regex patterns. The file is
//! hand-edited and grows through the suggestion review step.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use regex::{NoExpand, Regex};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use libris_core::{Error, Result};

/// Rule category in the JSON file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleCategory {
    Ligatures,
    Punctuation,
    OcrArtifacts,
}

impl RuleCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ligatures => "ligatures",
            Self::Punctuation => "punctuation",
            Self::OcrArtifacts => "ocr_artifacts",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "ligatures" => Some(Self::Ligatures),
            "punctuation" => Some(Self::Punctuation),
            "ocr_artifacts" => Some(Self::OcrArtifacts),
            _ => None,
        }
    }
}

impl fmt::Display for RuleCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The on-disk shape of the rule table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleSet {
    #[serde(default)]
    pub ligatures: BTreeMap<String, String>,
    #[serde(default)]
    pub punctuation: BTreeMap<String, String>,
    #[serde(default)]
    pub ocr_artifacts: BTreeMap<String, String>,
}

impl RuleSet {
    /// Rules written when a missing table is created.
    pub fn default_rules() -> Self {
        let pairs = |items: &[(&str, &str)]| -> BTreeMap<String, String> {
            items
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect()
        };
        Self {
            ligatures: pairs(&[
                ("\u{FB01}", "fi"),
                ("\u{FB02}", "fl"),
                ("\u{FB00}", "ff"),
                ("\u{FB03}", "ffi"),
                ("\u{FB04}", "ffl"),
            ]),
            punctuation: pairs(&[
                ("\u{2013}", "-"),
                ("\u{2014}", "-"),
                ("\u{2018}", "'"),
                ("\u{2019}", "'"),
                ("\u{201C}", "\""),
                ("\u{201D}", "\""),
                ("\u{2026}", "..."),
            ]),
            ocr_artifacts: pairs(&[
                (r"\bfa9ade\b", "façade"),
                (r"\bmedireval\b", "mediaeval"),
                (r"\bsub- sequent\b", "subsequent"),
                (r"\bHermetic A rcanum\b", "Hermetic Arcanum"),
                (r"\bAutJuw\b", "Author"),
                (r"\bTableaz£ de l'inconstance\b", "Tableau de l'inconstance"),
                (r"\bPhysictZ RestituttZ\b", "Physica Restituta"),
            ]),
        }
    }

    pub fn category(&self, category: RuleCategory) -> &BTreeMap<String, String> {
        match category {
            RuleCategory::Ligatures => &self.ligatures,
            RuleCategory::Punctuation => &self.punctuation,
            RuleCategory::OcrArtifacts => &self.ocr_artifacts,
        }
    }

    fn category_mut(&mut self, category: RuleCategory) -> &mut BTreeMap<String, String> {
        match category {
            RuleCategory::Ligatures => &mut self.ligatures,
            RuleCategory::Punctuation => &mut self.punctuation,
            RuleCategory::OcrArtifacts => &mut self.ocr_artifacts,
        }
    }

    pub fn len(&self) -> usize {
        self.ligatures.len() + self.punctuation.len() + self.ocr_artifacts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A loaded rule table with its regex rules compiled.
///
/// Application order is fixed: ligatures, then punctuation, then OCR
/// artifacts. Literal keys are applied longest first (ties in key order);
/// regex rules in key order. Replacements are inserted literally.
#[derive(Debug, Clone)]
pub struct NormalizationTable {
    rules: RuleSet,
    literals: Vec<(String, String)>,
    patterns: Vec<(Regex, String)>,
}

impl NormalizationTable {
    /// Compile a rule set. Fails with `Error::Rule` on an invalid pattern.
    pub fn from_rules(rules: RuleSet) -> Result<Self> {
        let mut literals = Vec::new();
        for category in [&rules.ligatures, &rules.punctuation] {
            let mut entries: Vec<(String, String)> = category
                .iter()
                .filter(|(bad, _)| !bad.is_empty())
                .map(|(bad, good)| (bad.clone(), good.clone()))
                .collect();
            // BTreeMap iteration is already key-ordered; the stable sort keeps that for ties.
            entries.sort_by(|a, b| b.0.chars().count().cmp(&a.0.chars().count()));
            literals.extend(entries);
        }

        let patterns = rules
            .ocr_artifacts
            .iter()
            .map(|(pattern, good)| {
                Regex::new(pattern)
                    .map(|re| (re, good.clone()))
                    .map_err(|e| Error::Rule(format!("invalid pattern {pattern:?}: {e}")))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            rules,
            literals,
            patterns,
        })
    }

    /// The built-in default table.
    pub fn with_defaults() -> Self {
        // The default patterns are known-good.
        Self::from_rules(RuleSet::default_rules()).unwrap_or_else(|_| Self {
            rules: RuleSet::default(),
            literals: Vec::new(),
            patterns: Vec::new(),
        })
    }

    /// Load the table from `path`.
    ///
    /// A missing file yields `Ok(None)` unless `create_if_missing` is set,
    /// in which case the default table is written there first.
    pub fn load(path: &Path, create_if_missing: bool) -> Result<Option<Self>> {
        if !path.exists() {
            if !create_if_missing {
                warn!(
                    "Normalization map not found at {} (run `index --rebuild` to create it)",
                    path.display()
                );
                return Ok(None);
            }
            let table = Self::with_defaults();
            table.save(path)?;
            info!("Normalization map created at {}", path.display());
            return Ok(Some(table));
        }

        let raw = std::fs::read_to_string(path)?;
        let rules: RuleSet = serde_json::from_str(&raw)
            .map_err(|e| Error::Rule(format!("{}: {e}", path.display())))?;
        let table = Self::from_rules(rules)?;
        info!(
            "Normalization map loaded: {} ({} rules)",
            path.display(),
            table.len()
        );
        Ok(Some(table))
    }

    /// Write the table as pretty JSON, creating parent directories.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(&self.rules)?;
        std::fs::write(path, json)?;
        info!("Normalization map saved to {}", path.display());
        Ok(())
    }

    /// Add or replace a rule. Returns `false` when the identical rule
    /// was already present.
    pub fn add_rule(&mut self, category: RuleCategory, bad: &str, good: &str) -> Result<bool> {
        if self.rules.category(category).get(bad).map(String::as_str) == Some(good) {
            return Ok(false);
        }
        let mut rules = self.rules.clone();
        rules
            .category_mut(category)
            .insert(bad.to_string(), good.to_string());
        *self = Self::from_rules(rules)?;
        Ok(true)
    }

    /// Apply every rule to `text`.
    pub fn apply(&self, text: &str) -> String {
        let mut out = text.to_string();
        for (bad, good) in &self.literals {
            if out.contains(bad.as_str()) {
                out = out.replace(bad.as_str(), good);
            }
        }
        for (re, good) in &self.patterns {
            if re.is_match(&out) {
                out = re.replace_all(&out, NoExpand(good)).into_owned();
            }
        }
        out
    }

    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(rules: RuleSet) -> NormalizationTable {
        NormalizationTable::from_rules(rules).unwrap()
    }

    #[test]
    fn test_default_rules_apply() {
        let t = NormalizationTable::with_defaults();
        assert_eq!(t.apply("\u{FB01}ne \u{2014} \u{201C}ok\u{201D}\u{2026}"), "fine - \"ok\"...");
        assert_eq!(t.apply("a medireval fa9ade"), "a mediaeval façade");
        // Word boundaries hold.
        assert_eq!(t.apply("medirevalism"), "medirevalism");
    }

    #[test]
    fn test_longer_literal_wins() {
        let mut rules = RuleSet::default();
        rules.ligatures.insert("ab".into(), "X".into());
        rules.ligatures.insert("abc".into(), "Y".into());
        assert_eq!(table(rules).apply("abcab"), "YX");
    }

    #[test]
    fn test_categories_apply_in_order() {
        let mut rules = RuleSet::default();
        rules.ligatures.insert("q".into(), "\u{2014}".into());
        rules.punctuation.insert("\u{2014}".into(), "-".into());
        rules.ocr_artifacts.insert(r"a-b".into(), "ok".into());
        assert_eq!(table(rules).apply("aqb"), "ok");
    }

    #[test]
    fn test_replacement_is_literal() {
        let mut rules = RuleSet::default();
        rules.ocr_artifacts.insert(r"\bcost\b".into(), "$1 cost".into());
        assert_eq!(table(rules).apply("the cost"), "the $1 cost");
    }

    #[test]
    fn test_invalid_pattern_is_rule_error() {
        let mut rules = RuleSet::default();
        rules.ocr_artifacts.insert("(unclosed".into(), "x".into());
        assert!(matches!(
            NormalizationTable::from_rules(rules),
            Err(Error::Rule(_))
        ));
    }

    #[test]
    fn test_load_missing_without_create() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("normalization_map.json");
        assert!(NormalizationTable::load(&path, false).unwrap().is_none());
        assert!(!path.exists());
    }

    #[test]
    fn test_load_creates_default_and_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("db").join("normalization_map.json");

        let created = NormalizationTable::load(&path, true).unwrap().unwrap();
        assert!(path.exists());
        assert_eq!(created.rules(), &RuleSet::default_rules());

        let mut edited = created.clone();
        assert!(edited
            .add_rule(RuleCategory::OcrArtifacts, r"\bteh\b", "the")
            .unwrap());
        assert!(!edited
            .add_rule(RuleCategory::OcrArtifacts, r"\bteh\b", "the")
            .unwrap());
        edited.save(&path).unwrap();

        let reloaded = NormalizationTable::load(&path, false).unwrap().unwrap();
        assert_eq!(reloaded.len(), created.len() + 1);
        assert_eq!(reloaded.apply("teh end"), "the end");
    }

    #[test]
    fn test_unknown_json_categories_are_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("map.json");
        std::fs::write(&path, r#"{"punctuation": {"`": "'"}, "notes": {"a": "b"}}"#).unwrap();
        let t = NormalizationTable::load(&path, false).unwrap().unwrap();
        assert_eq!(t.apply("`x`"), "'x'");
        assert_eq!(t.len(), 1);
    }

    #[test]
    fn test_category_names() {
        for c in [
            RuleCategory::Ligatures,
            RuleCategory::Punctuation,
            RuleCategory::OcrArtifacts,
        ] {
            assert_eq!(RuleCategory::parse(c.as_str()), Some(c));
        }
        assert_eq!(RuleCategory::parse("other"), None);
    }
}
