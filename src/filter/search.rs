//! Search chips
//!
//! A search-select widget produces chips (`field: value` pairs). This module
//! turns them into rules and tracks which fields disappeared between two
//! searches so the composer can drop them.

use super::compiler::{coerce, is_empty_value};
use super::property::{PropertyRegistry, PropertyType};
use super::rule::{Operator, Rule};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChipValue {
    pub id: Value,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchChip {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub values: Vec<ChipValue>,
}

impl SearchChip {
    pub fn new(id: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            id: id.into(),
            name: None,
            values: vec![ChipValue {
                id: value.into(),
                name: None,
            }],
        }
    }

    /// Parse `field=value` (as typed on the command line)
    pub fn parse(input: &str) -> Option<Self> {
        let (field, value) = input.split_once('=')?;
        let field = field.trim();
        if field.is_empty() {
            return None;
        }
        Some(Self::new(field, value.trim()))
    }
}

/// Operator selection for chips
#[derive(Debug, Clone)]
pub struct SearchOptions {
    /// Search every text field with case-insensitive contains
    pub fuzzy: bool,
    /// Fields always searched with `cis`
    pub fuzzy_fields: HashSet<String>,
    /// JSON array columns, searched with `json_contains`
    pub json_array_fields: HashSet<String>,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            fuzzy: false,
            fuzzy_fields: HashSet::from(["name".to_string()]),
            json_array_fields: HashSet::from(["zones".to_string()]),
        }
    }
}

impl SearchOptions {
    fn resolve_op(&self, field: &str, properties: &PropertyRegistry) -> Operator {
        let property = properties.get(field);

        let is_json_array = self.json_array_fields.contains(field)
            || property.is_some_and(|p| p.kind == PropertyType::Array);
        if is_json_array {
            return Operator::JsonContains;
        }

        if self.fuzzy || self.fuzzy_fields.contains(field) {
            return Operator::Cis;
        }

        property
            .and_then(|p| p.explicit_op())
            .unwrap_or(Operator::Eq)
    }

    /// One rule per chip value; several values for one field are OR-merged
    /// later by the composer.
    pub fn to_rules(&self, chips: &[SearchChip], properties: &PropertyRegistry) -> Vec<Rule> {
        let mut rules = Vec::new();
        for chip in chips {
            let op = self.resolve_op(&chip.id, properties);
            let property = properties.get(&chip.id);
            for value in chip.values.iter().filter(|v| !is_empty_value(&v.id)) {
                let value = match property {
                    Some(p) => coerce(p, &value.id),
                    None => value.id.clone(),
                };
                let value = if op.is_array_shaped() && !value.is_array() {
                    Value::Array(vec![value])
                } else {
                    value
                };
                rules.push(Rule::leaf(chip.id.clone(), op, value));
            }
        }
        rules
    }
}

/// Result of one search change
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchUpdate {
    pub rules: Vec<Rule>,
    /// Fields present in the previous search and absent now
    pub difference_fields: Vec<String>,
}

/// Remembers the fields of the previous search
#[derive(Debug, Clone, Default)]
pub struct SearchState {
    previous_fields: Vec<String>,
}

impl SearchState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(
        &mut self,
        chips: &[SearchChip],
        options: &SearchOptions,
        properties: &PropertyRegistry,
    ) -> SearchUpdate {
        let fields: Vec<String> = chips.iter().map(|c| c.id.clone()).collect();

        let difference_fields = difference(&self.previous_fields, &fields);
        if !difference_fields.is_empty() {
            tracing::debug!("Search facets removed: {:?}", difference_fields);
        }
        self.previous_fields = fields;

        SearchUpdate {
            rules: options.to_rules(chips, properties),
            difference_fields,
        }
    }

    pub fn clear(&mut self) {
        self.previous_fields.clear();
    }
}

/// Items of `old` missing from `new`, first occurrence order, no repeats
fn difference(old: &[String], new: &[String]) -> Vec<String> {
    let current: HashSet<&String> = new.iter().collect();
    let mut seen = HashSet::new();
    old.iter()
        .filter(|f| !current.contains(f) && seen.insert(*f))
        .cloned()
        .collect()
}
