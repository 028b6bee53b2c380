// 🏷️ Label Rules - Rules as Data
// Ordered keyword rules that map spreadsheet row labels onto aggregate fields

use crate::models::AggregateField;
use anyhow::{Context as AnyhowContext, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

// ============================================================================
// RULE DEFINITION
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeywordRule {
    /// Rule ID for tracking
    pub id: String,

    /// Every keyword must appear in the lowercased label
    pub keywords: Vec<String>,

    /// Field the row's values are written to
    pub field: AggregateField,

    /// Priority (higher = applied first, ties keep table order)
    #[serde(default)]
    pub priority: i32,
}

impl KeywordRule {
    pub fn new(id: &str, keywords: &[&str], field: AggregateField) -> Self {
        KeywordRule {
            id: id.to_string(),
            keywords: keywords.iter().map(|k| k.to_lowercase()).collect(),
            field,
            priority: 0,
        }
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Check if every keyword occurs in the label (case-insensitive)
    pub fn matches(&self, label: &str) -> bool {
        if self.keywords.is_empty() {
            return false;
        }

        let label_lower = label.to_lowercase();
        self.keywords
            .iter()
            .all(|keyword| label_lower.contains(&keyword.to_lowercase()))
    }
}

// ============================================================================
// RULE ENGINE
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "Vec<KeywordRule>", into = "Vec<KeywordRule>")]
pub struct RuleEngine {
    rules: Vec<KeywordRule>,
}

impl From<Vec<KeywordRule>> for RuleEngine {
    fn from(rules: Vec<KeywordRule>) -> Self {
        RuleEngine::from_rules(rules)
    }
}

impl From<RuleEngine> for Vec<KeywordRule> {
    fn from(engine: RuleEngine) -> Self {
        engine.rules
    }
}

impl RuleEngine {
    /// Create a new empty rule engine
    pub fn new() -> Self {
        RuleEngine { rules: Vec::new() }
    }

    /// Load rules from JSON file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read rules file: {:?}", path.as_ref()))?;

        let rules: Vec<KeywordRule> =
            serde_json::from_str(&content).context("Failed to parse rules JSON")?;

        Ok(RuleEngine::from_rules(rules))
    }

    /// Create engine from a list of rules
    pub fn from_rules(mut rules: Vec<KeywordRule>) -> Self {
        // Stable sort: equal priorities stay in table order
        rules.sort_by(|a, b| b.priority.cmp(&a.priority));
        RuleEngine { rules }
    }

    /// Add a single rule
    pub fn add_rule(&mut self, rule: KeywordRule) {
        self.rules.push(rule);
        self.rules.sort_by(|a, b| b.priority.cmp(&a.priority));
    }

    /// First rule matching the label, if any
    pub fn find(&self, label: &str) -> Option<&KeywordRule> {
        self.rules.iter().find(|rule| rule.matches(label))
    }

    /// Field of the first matching rule
    pub fn classify(&self, label: &str) -> Option<AggregateField> {
        self.find(label).map(|rule| rule.field)
    }

    /// Get number of rules loaded
    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }

    pub fn rules(&self) -> &[KeywordRule] {
        &self.rules
    }

    /// Sales-sheet metric rules
    pub fn sales_defaults() -> Self {
        RuleEngine::from_rules(vec![
            KeywordRule::new("mrr", &["mrr"], AggregateField::Revenue),
            KeywordRule::new("active_clients", &["active", "client"], AggregateField::ActiveClients),
            KeywordRule::new("new_clients", &["new", "client"], AggregateField::NewClients),
            KeywordRule::new("churned_clients", &["churn", "client"], AggregateField::ChurnedClients),
        ])
    }

    /// P&L / budget expense rules
    pub fn expense_defaults() -> Self {
        let table: [(&str, AggregateField); 13] = [
            ("staff", AggregateField::Salary),
            ("salary", AggregateField::Salary),
            ("payroll", AggregateField::Salary),
            ("marketing", AggregateField::Marketing),
            ("advertising", AggregateField::Marketing),
            ("infrastructure", AggregateField::Software),
            ("server", AggregateField::Software),
            ("hosting", AggregateField::Software),
            ("office", AggregateField::Office),
            ("rent", AggregateField::Office),
            ("legal", AggregateField::Other),
            ("travel", AggregateField::Other),
            ("other", AggregateField::Other),
        ];

        RuleEngine::from_rules(
            table
                .iter()
                .map(|&(keyword, field)| KeywordRule::new(keyword, &[keyword], field))
                .collect(),
        )
    }
}

// ============================================================================
// TESTS
// ============================================================================
