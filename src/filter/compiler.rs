//! Condition Compiler
//!
//! Turns a sparse `field -> user value` map (form input, search chips) into a
//! [`FilterSet`], using each field's [`Property`] to pick the operator and to
//! coerce values.

use super::property::{DefaultOp, Property, PropertyRegistry, PropertyType};
use super::rule::{FilterSet, Operator, Rule};
use crate::error::{ListError, ListResult};
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde_json::{Map, Number, Value};
use std::fmt::{self, Write};

/// What to do with a field that has no searchable property
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CompileMode {
    /// Skip the field and log a warning
    #[default]
    Permissive,
    /// Fail with [`ListError::Composition`]
    Strict,
}

/// `''`, `null`, `[]` and `{}` mean "no constraint", never "match nothing"
pub fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
        Value::Bool(_) | Value::Number(_) => false,
    }
}

pub struct ConditionCompiler<'a> {
    properties: &'a PropertyRegistry,
    mode: CompileMode,
}

impl<'a> ConditionCompiler<'a> {
    pub fn new(properties: &'a PropertyRegistry) -> Self {
        Self {
            properties,
            mode: CompileMode::default(),
        }
    }

    pub fn with_mode(mut self, mode: CompileMode) -> Self {
        self.mode = mode;
        self
    }

    /// Compile a condition map into an AND filter set
    pub fn compile(&self, condition: &Map<String, Value>) -> ListResult<FilterSet> {
        let mut rules = Vec::with_capacity(condition.len());

        for (field, value) in condition {
            let Some(property) = self.properties.get(field) else {
                self.not_searchable(field, "no property defined")?;
                continue;
            };

            if let Some(rule) = self.compile_field(property, value)? {
                rules.push(rule);
            }
        }

        Ok(FilterSet::and(rules).merge_duplicate_fields())
    }

    fn not_searchable(&self, field: &str, reason: &str) -> ListResult<()> {
        match self.mode {
            CompileMode::Strict => Err(ListError::Composition {
                field: field.to_string(),
            }),
            CompileMode::Permissive => {
                tracing::warn!("Skipping field '{}': {}", field, reason);
                Ok(())
            }
        }
    }

    fn compile_field(&self, property: &Property, value: &Value) -> ListResult<Option<Rule>> {
        let field = property.id.as_str();

        let searches_empty_string = property.enable_empty() && value == &Value::String(String::new());
        if is_empty_value(value) && !searches_empty_string {
            return Ok(None);
        }

        // Custom builders fully own the field
        if let Some(filter_rules) = property.filter_rules() {
            return Ok(filter_rules(value));
        }

        let value = match property.converter() {
            Some(convert) => convert(value.clone()),
            None => value.clone(),
        };

        let Some(op) = property.effective_op() else {
            self.not_searchable(field, "no operator for its type")?;
            return Ok(None);
        };

        let rule = match op {
            DefaultOp::Range => compile_range(property, &value),
            DefaultOp::Single(op) => compile_values(property, op, &value, searches_empty_string),
        };
        Ok(rule)
    }
}

/// Compile with default (permissive) settings
pub fn compile(condition: &Map<String, Value>, properties: &PropertyRegistry) -> FilterSet {
    // permissive mode never fails
    ConditionCompiler::new(properties)
        .compile(condition)
        .unwrap_or_default()
}

fn compile_range(property: &Property, value: &Value) -> Option<Rule> {
    let field = &property.id;

    let Value::Array(bounds) = value else {
        return Some(Rule::leaf(field, Operator::Eq, coerce(property, value)));
    };

    let mut rules = Vec::with_capacity(2);
    if let Some(lower) = bounds.first().filter(|v| !is_empty_value(v)) {
        rules.push(Rule::leaf(field, Operator::Gte, coerce(property, lower)));
    }
    if let Some(upper) = bounds.get(1).filter(|v| !is_empty_value(v)) {
        rules.push(Rule::leaf(field, Operator::Lte, coerce(property, upper)));
    }

    match rules.len() {
        0 => None,
        1 => rules.pop(),
        _ => Some(Rule::and(rules)),
    }
}

fn compile_values(property: &Property, op: Operator, value: &Value, keep_empty: bool) -> Option<Rule> {
    let field = &property.id;

    let mut values: Vec<Value> = match value {
        Value::Array(items) => items
            .iter()
            .filter(|v| keep_empty || !is_empty_value(v))
            .map(|v| coerce(property, v))
            .collect(),
        scalar => vec![coerce(property, scalar)],
    };

    if values.is_empty() {
        return None;
    }

    if op.is_array_shaped() {
        return Some(Rule::leaf(field, op, Value::Array(values)));
    }

    if values.len() == 1 {
        return values.pop().map(|v| Rule::leaf(field, op, v));
    }

    Some(Rule::or(
        values.into_iter().map(|v| Rule::leaf(field, op, v)).collect(),
    ))
}

/// Coerce one user value to the property's wire type
pub(crate) fn coerce(property: &Property, value: &Value) -> Value {
    match &property.kind {
        PropertyType::Enum { options } => {
            if let Value::String(s) = value {
                let is_id = options.iter().any(|o| o.id == *value);
                if !is_id {
                    if let Some(option) = options.iter().find(|o| &o.name == s) {
                        return option.id.clone();
                    }
                }
            }
            value.clone()
        }
        PropertyType::Datetime => match (property.format(), value) {
            (Some(format), Value::String(s)) => Value::String(format_datetime(s, format)),
            _ => value.clone(),
        },
        kind if kind.is_numeric() => match value {
            Value::String(s) => parse_number(s).unwrap_or_else(|| {
                tracing::debug!("'{}' is not numeric, keeping string for {}", s, property.id);
                value.clone()
            }),
            _ => value.clone(),
        },
        _ => value.clone(),
    }
}

fn parse_number(s: &str) -> Option<Value> {
    let s = s.trim();
    if let Ok(i) = s.parse::<i64>() {
        return Some(Value::from(i));
    }
    s.parse::<f64>()
        .ok()
        .and_then(Number::from_f64)
        .map(Value::Number)
}

/// Reformat an RFC 3339, `%Y-%m-%d %H:%M:%S` or `%Y-%m-%d` timestamp.
/// Unparseable input, or an invalid format string, passes the input through.
fn format_datetime(input: &str, format: &str) -> String {
    let rendered = if let Ok(dt) = DateTime::parse_from_rfc3339(input) {
        render(dt.format(format))
    } else if let Ok(dt) = NaiveDateTime::parse_from_str(input, "%Y-%m-%d %H:%M:%S") {
        render(dt.format(format))
    } else {
        NaiveDate::parse_from_str(input, "%Y-%m-%d")
            .ok()
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .and_then(|dt| render(dt.format(format)))
    };
    rendered.unwrap_or_else(|| input.to_string())
}

fn render(formatted: impl fmt::Display) -> Option<String> {
    let mut out = String::new();
    write!(out, "{formatted}").ok()?;
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::property::EnumOption;
    use crate::filter::rule::LogicOp;
    use serde_json::json;

    fn registry() -> PropertyRegistry {
        PropertyRegistry::new([
            Property::new("name", PropertyType::String),
            Property::new("status", PropertyType::Enum { options: vec![] }),
            Property::new("tags", PropertyType::Array),
            Property::new("port", PropertyType::Number),
            Property::new("created_at", PropertyType::Datetime),
            Property::new("vendor", PropertyType::String),
            Property::new("extension", PropertyType::Json),
        ])
    }

    fn cond(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("condition must be an object"),
        }
    }

    #[test]
    fn test_empty_status_is_skipped() {
        let set = compile(&cond(json!({"name": "web", "status": []})), &registry());
        assert_eq!(set.op, LogicOp::And);
        assert_eq!(set.rules, vec![Rule::leaf("name", Operator::Eq, "web")]);
    }

    #[test]
    fn test_array_with_in_stays_one_leaf() {
        let set = compile(&cond(json!({"tags": ["a", "b"]})), &registry());
        assert_eq!(set.rules, vec![Rule::leaf("tags", Operator::In, json!(["a", "b"]))]);
    }

    #[test]
    fn test_in_wraps_scalar() {
        let set = compile(&cond(json!({"status": "running"})), &registry());
        assert_eq!(set.rules, vec![Rule::leaf("status", Operator::In, json!(["running"]))]);
    }

    #[test]
    fn test_multi_value_eq_becomes_or_group() {
        let set = compile(&cond(json!({"vendor": ["tcloud", "aws"]})), &registry());
        assert_eq!(
            set.rules,
            vec![Rule::or(vec![
                Rule::leaf("vendor", Operator::Eq, "tcloud"),
                Rule::leaf("vendor", Operator::Eq, "aws"),
            ])]
        );
    }

    #[test]
    fn test_single_element_array_is_plain_leaf() {
        let set = compile(&cond(json!({"vendor": ["tcloud"]})), &registry());
        assert_eq!(set.rules, vec![Rule::leaf("vendor", Operator::Eq, "tcloud")]);
    }

    #[test]
    fn test_numeric_coercion() {
        let set = compile(&cond(json!({"port": "8080"})), &registry());
        assert_eq!(set.rules, vec![Rule::leaf("port", Operator::Eq, 8080)]);

        let set = compile(&cond(json!({"port": "8080.5"})), &registry());
        assert_eq!(set.rules, vec![Rule::leaf("port", Operator::Eq, 8080.5)]);

        let set = compile(&cond(json!({"port": "http"})), &registry());
        assert_eq!(set.rules, vec![Rule::leaf("port", Operator::Eq, "http")]);
    }

    #[test]
    fn test_datetime_range() {
        let set = compile(
            &cond(json!({"created_at": ["2024-01-01", "2024-02-01"]})),
            &registry(),
        );
        assert_eq!(
            set.rules,
            vec![Rule::and(vec![
                Rule::leaf("created_at", Operator::Gte, "2024-01-01"),
                Rule::leaf("created_at", Operator::Lte, "2024-02-01"),
            ])]
        );
    }

    #[test]
    fn test_datetime_range_both_empty_skipped() {
        let set = compile(&cond(json!({"created_at": ["", null]})), &registry());
        assert!(set.is_empty());
    }

    #[test]
    fn test_datetime_range_one_bound() {
        let set = compile(&cond(json!({"created_at": ["", "2024-02-01"]})), &registry());
        assert_eq!(
            set.rules,
            vec![Rule::leaf("created_at", Operator::Lte, "2024-02-01")]
        );
    }

    #[test]
    fn test_datetime_format() {
        let registry = PropertyRegistry::new([Property::new("created_at", PropertyType::Datetime)
            .with_format("%Y-%m-%d %H:%M:%S")]);
        let set = compile(
            &cond(json!({"created_at": ["2024-01-01T08:00:00Z", "2024-01-31"]})),
            &registry,
        );
        assert_eq!(
            set.rules,
            vec![Rule::and(vec![
                Rule::leaf("created_at", Operator::Gte, "2024-01-01 08:00:00"),
                Rule::leaf("created_at", Operator::Lte, "2024-01-31 00:00:00"),
            ])]
        );
    }

    #[test]
    fn test_invalid_datetime_format_passes_through() {
        assert_eq!(format_datetime("2024-01-01", "%Q"), "2024-01-01");
        assert_eq!(format_datetime("yesterday", "%Y"), "yesterday");
    }

    #[test]
    fn test_custom_filter_rules_bypass_defaults() {
        let registry = PropertyRegistry::new([Property::new("name", PropertyType::String)
            .with_filter_rules(|value| {
                let text = value.as_str()?;
                Some(Rule::or(
                    text.split_whitespace()
                        .map(|token| Rule::leaf("name", Operator::Cis, token))
                        .collect(),
                ))
            })]);

        let set = compile(&cond(json!({"name": "web prod"})), &registry);
        assert_eq!(
            set.rules,
            vec![Rule::or(vec![
                Rule::leaf("name", Operator::Cis, "web"),
                Rule::leaf("name", Operator::Cis, "prod"),
            ])]
        );
    }

    #[test]
    fn test_converter_runs_before_coercion() {
        let registry = PropertyRegistry::new([Property::new("port", PropertyType::Number)
            .with_converter(|v| match v {
                Value::String(s) => Value::String(s.trim_start_matches(':').to_string()),
                other => other,
            })]);
        let set = compile(&cond(json!({"port": ":443"})), &registry);
        assert_eq!(set.rules, vec![Rule::leaf("port", Operator::Eq, 443)]);
    }

    #[test]
    fn test_enum_option_name_maps_to_id() {
        let registry = PropertyRegistry::new([Property::new(
            "status",
            PropertyType::Enum {
                options: vec![EnumOption {
                    id: json!("running"),
                    name: "Running".to_string(),
                }],
            },
        )]);
        let set = compile(&cond(json!({"status": ["Running", "stopped"]})), &registry);
        assert_eq!(
            set.rules,
            vec![Rule::leaf("status", Operator::In, json!(["running", "stopped"]))]
        );
    }

    #[test]
    fn test_enable_empty_searches_empty_string() {
        let registry = PropertyRegistry::new([
            Property::new("memo", PropertyType::String).with_enable_empty()
        ]);
        let set = compile(&cond(json!({"memo": ""})), &registry);
        assert_eq!(set.rules, vec![Rule::leaf("memo", Operator::Eq, "")]);

        let set = compile(&cond(json!({"memo": null})), &registry);
        assert!(set.is_empty());
    }

    #[test]
    fn test_unknown_field_permissive_and_strict() {
        let registry = registry();
        let condition = cond(json!({"nope": "x", "name": "web"}));

        let set = ConditionCompiler::new(&registry).compile(&condition).unwrap();
        assert_eq!(set.rules.len(), 1);

        let err = ConditionCompiler::new(&registry)
            .with_mode(CompileMode::Strict)
            .compile(&condition)
            .unwrap_err();
        assert_eq!(err, ListError::Composition { field: "nope".to_string() });
    }

    #[test]
    fn test_json_without_op_is_not_searchable() {
        let registry = registry();
        let condition = cond(json!({"extension": {"k": "v"}}));
        assert!(compile(&condition, &registry).is_empty());

        let err = ConditionCompiler::new(&registry)
            .with_mode(CompileMode::Strict)
            .compile(&condition);
        assert!(err.is_err());
    }
}
