//! Filter Composer
//!
//! Merges newly entered rules into an existing (base) rule list:
//!
//! - new rules win over base rules for the same field
//! - several new rules for one field accumulate into an OR group, unless the
//!   field is configured as exclusive, in which case the last one wins
//! - a `DeleteOption` drops a field whose value is the "show all" sentinel
//! - `difference_fields` are always dropped (facets the user removed)

use super::rule::Rule;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{HashMap, HashSet};

/// Per-field tables mapping display values to the values the backend stores,
/// e.g. `vendor: {"Tencent Cloud": "tcloud"}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ValueAliases(HashMap<String, HashMap<String, Value>>);

impl ValueAliases {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, field: &str, display: impl Into<String>, canonical: impl Into<Value>) {
        self.0
            .entry(field.to_string())
            .or_default()
            .insert(display.into(), canonical.into());
    }

    /// Add a whole table for one field, replacing entries with the same display value
    pub fn extend(&mut self, field: &str, entries: impl IntoIterator<Item = (String, Value)>) {
        self.0.entry(field.to_string()).or_default().extend(entries);
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Canonical value for `value`; unmapped values pass through
    pub fn resolve(&self, field: &str, value: &Value) -> Value {
        let Some(table) = self.0.get(field) else {
            return value.clone();
        };
        match value {
            Value::String(s) => table.get(s).cloned().unwrap_or_else(|| value.clone()),
            Value::Array(items) => {
                Value::Array(items.iter().map(|v| self.resolve(field, v)).collect())
            }
            other => other.clone(),
        }
    }

    /// Resolve every leaf value in a rule tree
    pub fn apply(&self, rule: Rule) -> Rule {
        if self.is_empty() {
            return rule;
        }
        match rule {
            Rule::Leaf(mut c) => {
                c.value = self.resolve(&c.field, &c.value);
                Rule::Leaf(c)
            }
            Rule::Group(mut g) => {
                g.rules = g.rules.into_iter().map(|r| self.apply(r)).collect();
                Rule::Group(g)
            }
        }
    }
}

/// Drop the rule for `field` when its value equals `flag_value`
#[derive(Debug, Clone, PartialEq)]
pub struct DeleteOption {
    pub field: String,
    pub flag_value: Value,
}

impl DeleteOption {
    pub fn new(field: impl Into<String>, flag_value: impl Into<Value>) -> Self {
        Self {
            field: field.into(),
            flag_value: flag_value.into(),
        }
    }
}

/// Per-call composition options
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ComposeOptions {
    pub delete_option: Option<DeleteOption>,
    pub difference_fields: Vec<String>,
}

impl ComposeOptions {
    pub fn with_delete_option(mut self, option: DeleteOption) -> Self {
        self.delete_option = Some(option);
        self
    }

    pub fn with_difference_fields(mut self, fields: Vec<String>) -> Self {
        self.difference_fields = fields;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum Key {
    Field(String),
    /// A group spanning several fields; never merged
    Anonymous(usize),
}

/// Long-lived composition settings of one list view
#[derive(Debug, Clone, Default)]
pub struct FilterComposer {
    aliases: ValueAliases,
    exclusive_fields: HashSet<String>,
}

impl FilterComposer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_aliases(mut self, aliases: ValueAliases) -> Self {
        self.aliases = aliases;
        self
    }

    /// New rules for these fields replace each other instead of OR-accumulating
    pub fn with_exclusive_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.exclusive_fields = fields.into_iter().map(Into::into).collect();
        self
    }

    pub fn aliases(&self) -> &ValueAliases {
        &self.aliases
    }

    pub fn compose(&self, new_rules: &[Rule], base_rules: &[Rule], options: &ComposeOptions) -> Vec<Rule> {
        let mut merged: IndexMap<Key, Rule> = IndexMap::new();
        let mut anonymous = 0usize;

        for rule in new_rules {
            let rule = self.aliases.apply(rule.clone());
            let Some(field) = rule.subject().map(str::to_string) else {
                push_anonymous(&mut merged, &mut anonymous, rule);
                continue;
            };

            let key = Key::Field(field.clone());
            if self.exclusive_fields.contains(&field) {
                merged.insert(key, rule);
                continue;
            }
            match merged.get_mut(&key) {
                Some(existing) => or_merge_in_place(existing, rule),
                None => {
                    merged.insert(key, rule);
                }
            }
        }

        let new_fields: HashSet<Key> = merged.keys().cloned().collect();

        for rule in base_rules {
            match rule.subject() {
                Some(field) => {
                    let key = Key::Field(field.to_string());
                    if new_fields.contains(&key) {
                        continue;
                    }
                    // keep sibling fields unique even if the base list was not
                    match merged.get_mut(&key) {
                        Some(existing) => or_merge_in_place(existing, rule.clone()),
                        None => {
                            merged.insert(key, rule.clone());
                        }
                    }
                }
                None => push_anonymous(&mut merged, &mut anonymous, rule.clone()),
            }
        }

        if let Some(DeleteOption { field, flag_value }) = &options.delete_option {
            let key = Key::Field(field.clone());
            if merged.get(&key).and_then(Rule::value) == Some(flag_value) {
                tracing::debug!("Dropping '{}' rule: value is the delete flag", field);
                merged.shift_remove(&key);
            }
        }

        for field in &options.difference_fields {
            merged.shift_remove(&Key::Field(field.clone()));
        }

        merged.into_values().collect()
    }
}

fn or_merge_in_place(slot: &mut Rule, rule: Rule) {
    let existing = std::mem::replace(slot, Rule::and(Vec::new()));
    *slot = existing.or_merge(rule);
}

fn push_anonymous(merged: &mut IndexMap<Key, Rule>, counter: &mut usize, rule: Rule) {
    if merged.values().any(|existing| existing == &rule) {
        return;
    }
    merged.insert(Key::Anonymous(*counter), rule);
    *counter += 1;
}

/// Compose with no aliases and accumulate-only merging
pub fn compose(new_rules: &[Rule], base_rules: &[Rule], options: &ComposeOptions) -> Vec<Rule> {
    FilterComposer::default().compose(new_rules, base_rules, options)
}
