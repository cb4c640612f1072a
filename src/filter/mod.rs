//! Query filter construction
//!
//! Turns user input into the rule tree the backend applies. Nothing here
//! performs I/O.
//!
//! # Architecture
//!
//! - [`rule`] - the rule tree and operators
//! - [`property`] - per-field search metadata and its registry
//! - [`compiler`] - `field -> value` maps to rules
//! - [`composer`] - merging new rules into an existing rule list
//! - [`search`] - search-select chips to rules
//!
//! # Example
//!
//! ```ignore
//! use cloudlist::filter::{compile, compose, ComposeOptions, PropertyRegistry};
//! use serde_json::json;
//!
//! let registry = PropertyRegistry::load("properties/cvm.yaml".as_ref())?;
//! let condition = json!({"name": "web", "status": []});
//! let set = compile(condition.as_object().unwrap(), &registry);
//! let rules = compose(&set.rules, &[], &ComposeOptions::default());
//! ```

pub mod compiler;
pub mod composer;
pub mod property;
pub mod rule;
pub mod search;

pub use compiler::{compile, is_empty_value, CompileMode, ConditionCompiler};
pub use composer::{compose, ComposeOptions, DeleteOption, FilterComposer, ValueAliases};
pub use property::{
    ConverterFn, DefaultOp, EnumOption, FilterRulesFn, Property, PropertyRegistry, PropertyType,
    SearchMeta,
};
pub use rule::{Condition, FilterSet, LogicOp, Operator, Rule, RuleGroup};
pub use search::{ChipValue, SearchChip, SearchOptions, SearchState, SearchUpdate};
