//! Axiom model and condition grammar.
//!
//! An axiom is a user-authored value statement with a condition-to-modifier
//! table. Conditions follow `if_<attribute> <op> <value>` with op in
//! `<, <=, >, >=, =`; a trailing `%` on the value reads as a fraction.
//! Unknown attributes evaluate to false and invalid expressions are ignored.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};

/// How an axiom is applied to nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AxiomApplication {
    /// Adds signed modifiers to a node's base score
    Scorer,
    /// Rejects a node when a condition matches with modifier -1
    Filter,
}

/// A user-supplied value statement with rule-based node scoring.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Axiom {
    #[serde(rename = "axiom_id")]
    pub id: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub priority: String,
    pub application: AxiomApplication,
    pub statement: String,
    /// Condition string -> score modifier; ordered for deterministic
    /// first-match evaluation
    #[serde(default)]
    pub weight_modifier: BTreeMap<String, f64>,
    #[serde(default)]
    pub enabled: bool,
}

impl Axiom {
    pub fn new(
        id: impl Into<String>,
        application: AxiomApplication,
        statement: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            category: String::new(),
            priority: String::new(),
            application,
            statement: statement.into(),
            weight_modifier: BTreeMap::new(),
            enabled: true,
        }
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = category.into();
        self
    }

    pub fn with_condition(mut self, condition: impl Into<String>, modifier: f64) -> Self {
        self.weight_modifier.insert(condition.into(), modifier);
        self
    }

    /// First matching condition's modifier against the node attributes, or 0.
    pub fn evaluate(&self, metadata: &HashMap<String, Value>) -> f64 {
        for (condition, modifier) in &self.weight_modifier {
            if check_condition(condition, metadata) {
                return *modifier;
            }
        }
        0.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CompareOp {
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
}

/// Evaluate one `if_<attr> <op> <value>` condition against node metadata.
fn check_condition(condition: &str, metadata: &HashMap<String, Value>) -> bool {
    let Some(rest) = condition.strip_prefix("if_") else {
        return false;
    };

    // Two-char operators first so "<=" is not split at "<"
    let ops: [(&str, CompareOp); 5] = [
        (">=", CompareOp::Ge),
        ("<=", CompareOp::Le),
        (">", CompareOp::Gt),
        ("<", CompareOp::Lt),
        ("=", CompareOp::Eq),
    ];

    for (symbol, op) in ops {
        if let Some((attr, value_str)) = rest.split_once(symbol) {
            // "==" parses as Eq with a leading "=" remnant
            let value_str = value_str.strip_prefix('=').unwrap_or(value_str);
            let attr = attr.trim();
            let value_str = value_str.trim();

            let Some(node_value) = metadata.get(attr).and_then(value_as_f64) else {
                return false;
            };

            let target = if let Some(pct) = value_str.strip_suffix('%') {
                match pct.trim().parse::<f64>() {
                    Ok(v) => v / 100.0,
                    Err(_) => return false,
                }
            } else {
                match value_str.parse::<f64>() {
                    Ok(v) => v,
                    Err(_) => return false,
                }
            };

            return match op {
                CompareOp::Lt => node_value < target,
                CompareOp::Le => node_value <= target,
                CompareOp::Gt => node_value > target,
                CompareOp::Ge => node_value >= target,
                CompareOp::Eq => (node_value - target).abs() < f64::EPSILON,
            };
        }
    }

    false
}

fn value_as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn metadata(key: &str, value: Value) -> HashMap<String, Value> {
        HashMap::from([(key.to_string(), value)])
    }

    #[test]
    fn test_condition_operators() {
        let m = metadata("roi_per_hour", json!(30));
        assert!(check_condition("if_roi_per_hour < 50", &m));
        assert!(check_condition("if_roi_per_hour <= 30", &m));
        assert!(!check_condition("if_roi_per_hour > 50", &m));
        assert!(check_condition("if_roi_per_hour >= 30", &m));
        assert!(check_condition("if_roi_per_hour = 30", &m));
        assert!(check_condition("if_roi_per_hour == 30", &m));
    }

    #[test]
    fn test_percent_suffix_reads_as_fraction() {
        let m = metadata("max_loss", json!(0.3));
        assert!(check_condition("if_max_loss > 20%", &m));
        assert!(!check_condition("if_max_loss > 40%", &m));
    }

    #[test]
    fn test_unknown_attribute_is_false() {
        let m = metadata("roi_per_hour", json!(30));
        assert!(!check_condition("if_unknown_attr < 50", &m));
    }

    #[test]
    fn test_invalid_expressions_are_ignored() {
        let m = metadata("roi_per_hour", json!(30));
        assert!(!check_condition("roi_per_hour < 50", &m));
        assert!(!check_condition("if_roi_per_hour < fifty", &m));
        assert!(!check_condition("if_roi_per_hour", &m));
    }

    #[test]
    fn test_evaluate_returns_first_match() {
        let axiom = Axiom::new("opportunity_cost", AxiomApplication::Scorer, "Value your time")
            .with_condition("if_roi_per_hour < 50", -0.5)
            .with_condition("if_roi_per_hour >= 100", 0.8);

        assert_eq!(axiom.evaluate(&metadata("roi_per_hour", json!(30))), -0.5);
        assert_eq!(axiom.evaluate(&metadata("roi_per_hour", json!(150))), 0.8);
        assert_eq!(axiom.evaluate(&metadata("roi_per_hour", json!(75))), 0.0);
    }

    #[test]
    fn test_axiom_json_format() {
        let json_str = r#"{
            "axiom_id": "opportunity_cost",
            "category": "economics",
            "priority": "critical",
            "application": "scorer",
            "statement": "Evaluate opportunities by opportunity cost",
            "weight_modifier": {
                "if_roi_per_hour < 50": -0.5,
                "if_roi_per_hour >= 100": 0.8
            },
            "enabled": true
        }"#;

        let axiom: Axiom = serde_json::from_str(json_str).unwrap();
        assert_eq!(axiom.id, "opportunity_cost");
        assert_eq!(axiom.application, AxiomApplication::Scorer);
        assert!(axiom.enabled);
        assert_eq!(axiom.weight_modifier.len(), 2);
    }
}
