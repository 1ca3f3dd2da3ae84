use std::collections::{HashMap, HashSet};
use std::io::Read;
use std::path::Path;

use blanket::blanket;
use serde::{Deserialize, Serialize};

use crate::utils::{normalize_hostname, open_file};

/// Apps allowed to reach a tracker hostname regardless of its blocklist entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExceptionRule {
    pub hostname: String,
    pub package_names: HashSet<String>,
}

impl ExceptionRule {
    pub fn new<H: Into<String>, I, S>(hostname: H, packages: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            hostname: hostname.into(),
            package_names: packages.into_iter().map(Into::into).collect(),
        }
    }

    #[inline]
    pub fn exempts(&self, package_id: &str) -> bool {
        self.package_names.contains(package_id)
    }
}

#[blanket(derive(Ref, Box, Arc))]
pub trait ExceptionRuleStore: Send + Sync {
    fn rule_for_hostname(&self, hostname: &str) -> Option<ExceptionRule>;
}

#[derive(Deserialize)]
struct RulesJson {
    #[serde(default)]
    rules: Vec<ExceptionRule>,
}

/// In memory [ExceptionRuleStore], loaded from
/// `{ "rules": [ { "hostname": "...", "packageNames": ["..."] } ] }`.
///
/// Rules for the same hostname are merged.
#[derive(Debug, Default, Clone)]
pub struct ExceptionRules {
    rules: HashMap<String, ExceptionRule>,
}

impl ExceptionRules {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_path(path: &Path) -> crate::Result<Self> {
        let f = open_file(path)?;
        Self::from_reader(f).map_err(|e| crate::Error::new_data(path, &e))
    }

    pub fn from_reader<R: Read>(reader: R) -> crate::Result<Self> {
        let parsed: RulesJson = serde_json::from_reader(reader)?;
        let mut rules = Self::new();
        for rule in parsed.rules {
            rules.add_rule(rule);
        }
        Ok(rules)
    }

    pub fn add_rule(&mut self, rule: ExceptionRule) {
        let key = normalize_hostname(&rule.hostname);
        match self.rules.get_mut(&key) {
            Some(existing) => existing.package_names.extend(rule.package_names),
            None => {
                self.rules.insert(
                    key.clone(),
                    ExceptionRule {
                        hostname: key,
                        package_names: rule.package_names,
                    },
                );
            }
        }
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

impl ExceptionRuleStore for ExceptionRules {
    fn rule_for_hostname(&self, hostname: &str) -> Option<ExceptionRule> {
        self.rules.get(&normalize_hostname(hostname)).cloned()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_rules_from_json() {
        let content = r#"{
  "rules": [
    { "hostname": "tracker.example.com", "packageNames": ["com.example.a"] },
    { "hostname": "Tracker.Example.com", "packageNames": ["com.example.b"] },
    { "hostname": "other.example.com", "packageNames": [] }
  ]
}"#;
        let rules = ExceptionRules::from_reader(content.as_bytes()).expect("valid rules");
        assert_eq!(rules.len(), 2);

        let rule = rules
            .rule_for_hostname("TRACKER.example.com")
            .expect("rule exists");
        assert!(rule.exempts("com.example.a"));
        assert!(rule.exempts("com.example.b"));
        assert!(!rule.exempts("com.example.c"));

        let other = rules
            .rule_for_hostname("other.example.com")
            .expect("rule exists");
        assert!(!other.exempts("com.example.a"));

        assert!(rules.rule_for_hostname("sub.tracker.example.com").is_none());
    }

    #[test]
    fn test_missing_rules_key() {
        let rules = ExceptionRules::from_reader("{}".as_bytes()).expect("valid rules");
        assert!(rules.is_empty());
    }
}
