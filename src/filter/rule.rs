//! Rule model
//!
//! A [`Rule`] is either a leaf condition (`field`, `op`, `value`) or a
//! composite AND/OR group of child rules. A [`FilterSet`] is the top-level
//! group sent with every list request.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Leaf comparison operators understood by the backend query engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operator {
    Eq,
    Neq,
    Gt,
    Gte,
    Lt,
    Lte,
    In,
    Nin,
    /// Case-sensitive contains
    Cs,
    /// Case-insensitive contains
    Cis,
    JsonEq,
    JsonNeq,
    JsonContains,
    JsonOverlaps,
}

impl Operator {
    /// Operators whose value is a list rather than one scalar
    pub fn is_array_shaped(self) -> bool {
        matches!(self, Self::In | Self::Nin | Self::JsonOverlaps)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Eq => "eq",
            Self::Neq => "neq",
            Self::Gt => "gt",
            Self::Gte => "gte",
            Self::Lt => "lt",
            Self::Lte => "lte",
            Self::In => "in",
            Self::Nin => "nin",
            Self::Cs => "cs",
            Self::Cis => "cis",
            Self::JsonEq => "json_eq",
            Self::JsonNeq => "json_neq",
            Self::JsonContains => "json_contains",
            Self::JsonOverlaps => "json_overlaps",
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Group combinator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogicOp {
    #[default]
    And,
    Or,
}

/// One leaf condition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    pub field: String,
    pub op: Operator,
    pub value: Value,
}

/// A composite AND/OR group
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RuleGroup {
    pub op: LogicOp,
    pub rules: Vec<Rule>,
}

/// The payload filter of a list request
pub type FilterSet = RuleGroup;

/// A leaf never carries `rules`; a group never carries `field`/`value`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Rule {
    Group(RuleGroup),
    Leaf(Condition),
}

impl Rule {
    pub fn leaf(field: impl Into<String>, op: Operator, value: impl Into<Value>) -> Self {
        Self::Leaf(Condition {
            field: field.into(),
            op,
            value: value.into(),
        })
    }

    pub fn and(rules: Vec<Rule>) -> Self {
        Self::Group(RuleGroup {
            op: LogicOp::And,
            rules,
        })
    }

    pub fn or(rules: Vec<Rule>) -> Self {
        Self::Group(RuleGroup {
            op: LogicOp::Or,
            rules,
        })
    }

    pub fn is_group(&self) -> bool {
        matches!(self, Self::Group(_))
    }

    /// Field of a leaf rule
    pub fn field(&self) -> Option<&str> {
        match self {
            Self::Leaf(c) => Some(&c.field),
            Self::Group(_) => None,
        }
    }

    /// Value of a leaf rule
    pub fn value(&self) -> Option<&Value> {
        match self {
            Self::Leaf(c) => Some(&c.value),
            Self::Group(_) => None,
        }
    }

    /// The single field this rule constrains.
    ///
    /// For a leaf this is its field. A group has a subject only when every
    /// leaf beneath it names the same field (e.g. a date range or an OR of
    /// alternatives for one field).
    pub fn subject(&self) -> Option<&str> {
        match self {
            Self::Leaf(c) => Some(&c.field),
            Self::Group(g) => {
                let mut subject = None;
                for rule in &g.rules {
                    let field = rule.subject()?;
                    match subject {
                        None => subject = Some(field),
                        Some(s) if s == field => {}
                        Some(_) => return None,
                    }
                }
                subject
            }
        }
    }

    /// Combine two rules for the same field into one OR group, flattening an
    /// existing OR group instead of nesting it.
    pub fn or_merge(self, other: Rule) -> Rule {
        match self {
            Self::Group(RuleGroup {
                op: LogicOp::Or,
                mut rules,
            }) => {
                rules.push(other);
                Rule::or(rules)
            }
            existing => Rule::or(vec![existing, other]),
        }
    }
}

impl From<Condition> for Rule {
    fn from(c: Condition) -> Self {
        Self::Leaf(c)
    }
}

impl RuleGroup {
    pub fn new(op: LogicOp, rules: Vec<Rule>) -> Self {
        Self { op, rules }
    }

    pub fn and(rules: Vec<Rule>) -> Self {
        Self::new(LogicOp::And, rules)
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Fold sibling leaves that share a field into one nested OR group.
    ///
    /// Servers that keep only the last rule per field would otherwise drop
    /// the earlier clauses. The merged group takes the position of the first
    /// occurrence; groups without a single subject are left in place.
    pub fn merge_duplicate_fields(self) -> Self {
        let mut by_field: IndexMap<String, Rule> = IndexMap::new();
        let mut slots: Vec<Slot> = Vec::with_capacity(self.rules.len());

        for rule in self.rules {
            match rule {
                Rule::Leaf(c) => {
                    let field = c.field.clone();
                    match by_field.shift_remove(&field) {
                        Some(existing) => {
                            by_field.insert(field, existing.or_merge(Rule::Leaf(c)));
                        }
                        None => {
                            slots.push(Slot::Field(field.clone()));
                            by_field.insert(field, Rule::Leaf(c));
                        }
                    }
                }
                group => slots.push(Slot::Rule(group)),
            }
        }

        let rules = slots
            .into_iter()
            .filter_map(|slot| match slot {
                Slot::Field(field) => by_field.shift_remove(&field),
                Slot::Rule(rule) => Some(rule),
            })
            .collect();

        Self { op: self.op, rules }
    }
}

enum Slot {
    Field(String),
    Rule(Rule),
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_leaf_serializes_flat() {
        let rule = Rule::leaf("name", Operator::Eq, "web");
        assert_eq!(
            serde_json::to_value(&rule).unwrap(),
            json!({"field": "name", "op": "eq", "value": "web"})
        );
    }

    #[test]
    fn test_group_round_trips_through_untagged() {
        let payload = json!({
            "op": "or",
            "rules": [
                {"field": "vendor", "op": "eq", "value": "tcloud"},
                {"field": "vendor", "op": "eq", "value": "aws"}
            ]
        });
        let rule: Rule = serde_json::from_value(payload.clone()).unwrap();
        assert!(rule.is_group());
        assert_eq!(rule.subject(), Some("vendor"));
        assert_eq!(serde_json::to_value(&rule).unwrap(), payload);
    }

    #[test]
    fn test_json_operator_names() {
        let rule: Rule = serde_json::from_value(json!({
            "field": "zones", "op": "json_contains", "value": "ap-guangzhou-1"
        }))
        .unwrap();
        assert!(matches!(rule, Rule::Leaf(Condition { op: Operator::JsonContains, .. })));
    }

    #[test]
    fn test_subject_of_mixed_group_is_none() {
        let rule = Rule::and(vec![
            Rule::leaf("a", Operator::Eq, 1),
            Rule::leaf("b", Operator::Eq, 2),
        ]);
        assert_eq!(rule.subject(), None);
        assert_eq!(Rule::and(vec![]).subject(), None);
    }

    #[test]
    fn test_or_merge_flattens() {
        let merged = Rule::leaf("v", Operator::Eq, "a")
            .or_merge(Rule::leaf("v", Operator::Eq, "b"))
            .or_merge(Rule::leaf("v", Operator::Eq, "c"));
        match merged {
            Rule::Group(g) => {
                assert_eq!(g.op, LogicOp::Or);
                assert_eq!(g.rules.len(), 3);
            }
            Rule::Leaf(_) => panic!("expected group"),
        }
    }

    #[test]
    fn test_merge_duplicate_fields_keeps_first_position() {
        let set = FilterSet::and(vec![
            Rule::leaf("a", Operator::Eq, 1),
            Rule::leaf("b", Operator::Eq, 2),
            Rule::leaf("a", Operator::Eq, 3),
        ])
        .merge_duplicate_fields();

        assert_eq!(set.rules.len(), 2);
        assert_eq!(set.rules[0].subject(), Some("a"));
        assert!(set.rules[0].is_group());
        assert_eq!(set.rules[1], Rule::leaf("b", Operator::Eq, 2));
    }
}
