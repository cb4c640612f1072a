//! Property metadata
//!
//! A [`Property`] describes how one field is searched: its type, an optional
//! operator override, value formatting and an optional custom rule builder.
//! Properties are defined once per resource view, usually loaded from a YAML
//! or JSON file into a [`PropertyRegistry`].

use super::composer::ValueAliases;
use super::rule::{Operator, Rule};
use anyhow::{Context, Result};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

/// Custom compiler for one field: receives the raw user value and returns the
/// complete rule for it, or `None` to drop the field.
pub type FilterRulesFn = Arc<dyn Fn(&Value) -> Option<Rule> + Send + Sync>;

/// Value transformation applied before default compilation
pub type ConverterFn = Arc<dyn Fn(Value) -> Value + Send + Sync>;

/// One selectable value of an enum property
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnumOption {
    pub id: Value,
    pub name: String,
}

/// Field type, tagged by `type` in definition files
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PropertyType {
    String,
    Number,
    Bool,
    Enum {
        #[serde(default)]
        options: Vec<EnumOption>,
    },
    Array,
    Datetime,
    User,
    Business,
    Region,
    Account,
    /// Free-form JSON column; has no default operator
    Json,
}

/// How a field is compiled when no operator is given explicitly
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DefaultOp {
    Single(Operator),
    /// `[lower, upper]` becomes `AND(gte lower, lte upper)`
    Range,
}

impl PropertyType {
    pub fn default_op(&self) -> Option<DefaultOp> {
        let op = match self {
            Self::String | Self::Number | Self::Bool => Operator::Eq,
            Self::Enum { .. } | Self::Array => Operator::In,
            Self::User | Self::Business | Self::Region | Self::Account => Operator::In,
            Self::Datetime => return Some(DefaultOp::Range),
            Self::Json => return None,
        };
        Some(DefaultOp::Single(op))
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, Self::Number | Self::Business)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Number => "number",
            Self::Bool => "bool",
            Self::Enum { .. } => "enum",
            Self::Array => "array",
            Self::Datetime => "datetime",
            Self::User => "user",
            Self::Business => "business",
            Self::Region => "region",
            Self::Account => "account",
            Self::Json => "json",
        }
    }
}

/// Search options under `meta.search`
#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchMeta {
    #[serde(default)]
    pub op: Option<Operator>,
    /// chrono format string applied to datetime values
    #[serde(default)]
    pub format: Option<String>,
    /// Search for `""` instead of treating it as "no constraint"
    #[serde(default)]
    pub enable_empty: bool,
    #[serde(skip)]
    pub converter: Option<ConverterFn>,
    #[serde(skip)]
    pub filter_rules: Option<FilterRulesFn>,
}

impl fmt::Debug for SearchMeta {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SearchMeta")
            .field("op", &self.op)
            .field("format", &self.format)
            .field("enable_empty", &self.enable_empty)
            .field("converter", &self.converter.is_some())
            .field("filter_rules", &self.filter_rules.is_some())
            .finish()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PropertyMeta {
    #[serde(default)]
    pub search: Option<SearchMeta>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Property {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(flatten)]
    pub kind: PropertyType,
    #[serde(default)]
    pub op: Option<Operator>,
    #[serde(default)]
    pub meta: PropertyMeta,
}

impl Property {
    pub fn new(id: impl Into<String>, kind: PropertyType) -> Self {
        Self {
            id: id.into(),
            name: None,
            kind,
            op: None,
            meta: PropertyMeta::default(),
        }
    }

    fn search_mut(&mut self) -> &mut SearchMeta {
        self.meta.search.get_or_insert_with(SearchMeta::default)
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_op(mut self, op: Operator) -> Self {
        self.op = Some(op);
        self
    }

    pub fn with_format(mut self, format: impl Into<String>) -> Self {
        self.search_mut().format = Some(format.into());
        self
    }

    pub fn with_enable_empty(mut self) -> Self {
        self.search_mut().enable_empty = true;
        self
    }

    pub fn with_converter<F>(mut self, converter: F) -> Self
    where
        F: Fn(Value) -> Value + Send + Sync + 'static,
    {
        self.search_mut().converter = Some(Arc::new(converter));
        self
    }

    pub fn with_filter_rules<F>(mut self, filter_rules: F) -> Self
    where
        F: Fn(&Value) -> Option<Rule> + Send + Sync + 'static,
    {
        self.search_mut().filter_rules = Some(Arc::new(filter_rules));
        self
    }

    pub fn search(&self) -> Option<&SearchMeta> {
        self.meta.search.as_ref()
    }

    /// Operator chosen explicitly by the definition (`op`, then `meta.search.op`)
    pub fn explicit_op(&self) -> Option<Operator> {
        self.op.or_else(|| self.search().and_then(|s| s.op))
    }

    /// Operator used by default compilation; `None` means the field is not searchable
    pub fn effective_op(&self) -> Option<DefaultOp> {
        self.explicit_op()
            .map(DefaultOp::Single)
            .or_else(|| self.kind.default_op())
    }

    pub fn enable_empty(&self) -> bool {
        self.search().is_some_and(|s| s.enable_empty)
    }

    pub fn format(&self) -> Option<&str> {
        self.search().and_then(|s| s.format.as_deref())
    }

    pub fn filter_rules(&self) -> Option<&FilterRulesFn> {
        self.search().and_then(|s| s.filter_rules.as_ref())
    }

    pub fn converter(&self) -> Option<&ConverterFn> {
        self.search().and_then(|s| s.converter.as_ref())
    }
}

/// Root structure of a property definition file
#[derive(Debug, Clone, Default, Deserialize)]
struct PropertyFile {
    #[serde(default)]
    properties: Vec<Property>,
    #[serde(default)]
    aliases: ValueAliases,
}

/// Properties of one view, looked up by field id
#[derive(Debug, Clone, Default)]
pub struct PropertyRegistry {
    properties: IndexMap<String, Property>,
    aliases: ValueAliases,
}

impl PropertyRegistry {
    pub fn new(properties: impl IntoIterator<Item = Property>) -> Self {
        let mut registry = Self::default();
        for property in properties {
            registry.insert(property);
        }
        registry
    }

    /// Load definitions from a `.yaml`/`.yml` or `.json` file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read property file {}", path.display()))?;

        let is_json = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("json"));

        if is_json {
            Self::from_json_str(&content)
        } else {
            Self::from_yaml_str(&content)
        }
    }

    pub fn from_yaml_str(content: &str) -> Result<Self> {
        let file: PropertyFile =
            serde_yaml::from_str(content).context("Failed to parse property YAML")?;
        Ok(Self::from_file(file))
    }

    pub fn from_json_str(content: &str) -> Result<Self> {
        let file: PropertyFile =
            serde_json::from_str(content).context("Failed to parse property JSON")?;
        Ok(Self::from_file(file))
    }

    fn from_file(file: PropertyFile) -> Self {
        let mut registry = Self::new(file.properties);
        registry.aliases = file.aliases;
        tracing::debug!(
            "Loaded {} properties, {} alias tables",
            registry.properties.len(),
            registry.aliases.len()
        );
        registry
    }

    /// Insert or replace a property (later definitions win)
    pub fn insert(&mut self, property: Property) {
        self.properties.insert(property.id.clone(), property);
    }

    pub fn get(&self, id: &str) -> Option<&Property> {
        self.properties.get(id)
    }

    /// Mutable access, e.g. to attach a converter to a loaded definition
    pub fn get_mut(&mut self, id: &str) -> Option<&mut Property> {
        self.properties.get_mut(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Property> {
        self.properties.values()
    }

    pub fn len(&self) -> usize {
        self.properties.len()
    }

    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }

    pub fn aliases(&self) -> &ValueAliases {
        &self.aliases
    }

    pub fn aliases_mut(&mut self) -> &mut ValueAliases {
        &mut self.aliases
    }
}
