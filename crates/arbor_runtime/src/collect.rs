//! Field collection.
//!
//! Flattens selection sets (fragments, inline fragments, `@skip`/`@include`)
//! into the ordered response-key → merged selections mapping one level of
//! execution works on.

use crate::context::ExecutionContext;
use crate::parameters::FieldMap;
use crate::query::{Directive, Field, FragmentMap, InputValue, Selection, SelectionSet};
use crate::schema::{ObjectDef, Schema};
use indexmap::IndexMap;
use rustc_hash::FxHashSet;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// Collects the fields selected on `object_type` from `selection_sets`.
///
/// Keys appear in the order of their first occurrence.
pub fn collect_fields<'q>(
    ctx: &ExecutionContext,
    object_type: &ObjectDef,
    selection_sets: impl IntoIterator<Item = &'q SelectionSet>,
) -> FieldMap {
    collect_fields_in(
        ctx.schema(),
        ctx.fragments(),
        ctx.variables(),
        object_type,
        selection_sets,
    )
}

/// Same as [`collect_fields`], outside of an execution context.
pub(crate) fn collect_fields_in<'q>(
    schema: &Schema,
    fragments: &FragmentMap,
    variables: &HashMap<String, Value>,
    object_type: &ObjectDef,
    selection_sets: impl IntoIterator<Item = &'q SelectionSet>,
) -> FieldMap {
    let mut collector = Collector {
        schema,
        fragments,
        variables,
        object_type,
        visited: FxHashSet::default(),
        groups: IndexMap::new(),
    };
    for selection_set in selection_sets {
        collector.collect(selection_set);
    }
    collector
        .groups
        .into_iter()
        .map(|(key, fields)| (key, Arc::from(fields)))
        .collect()
}

struct Collector<'a> {
    schema: &'a Schema,
    fragments: &'a FragmentMap,
    variables: &'a HashMap<String, Value>,
    object_type: &'a ObjectDef,
    visited: FxHashSet<&'a str>,
    groups: IndexMap<String, Vec<Field>>,
}

impl<'a> Collector<'a> {
    fn collect(&mut self, selection_set: &SelectionSet) {
        for selection in &selection_set.items {
            match selection {
                Selection::Field(field) => {
                    if !self.should_include(&field.directives) {
                        continue;
                    }
                    self.groups
                        .entry(field.response_key().to_string())
                        .or_default()
                        .push(field.clone());
                }
                Selection::FragmentSpread(spread) => {
                    if !self.should_include(&spread.directives) {
                        continue;
                    }
                    let fragments = self.fragments;
                    let Some(fragment) = fragments.get(&spread.name) else {
                        tracing::debug!(fragment = %spread.name, "unknown fragment spread skipped");
                        continue;
                    };
                    if !self.visited.insert(fragment.name.as_str()) {
                        continue;
                    }
                    if !self.applies(&fragment.type_condition) {
                        continue;
                    }
                    self.collect(&fragment.selection_set);
                }
                Selection::InlineFragment(inline) => {
                    if !self.should_include(&inline.directives) {
                        continue;
                    }
                    if let Some(condition) = &inline.type_condition {
                        if !self.applies(condition) {
                            continue;
                        }
                    }
                    self.collect(&inline.selection_set);
                }
            }
        }
    }

    fn applies(&self, type_condition: &str) -> bool {
        self.schema.is_possible_type(type_condition, self.object_type)
    }

    fn should_include(&self, directives: &[Directive]) -> bool {
        for directive in directives {
            let condition = directive
                .argument("if")
                .map(|value| self.condition(value))
                .unwrap_or(false);
            match directive.name.as_str() {
                "skip" if condition => return false,
                "include" if !condition => return false,
                _ => {}
            }
        }
        true
    }

    fn condition(&self, value: &InputValue) -> bool {
        match value {
            InputValue::Boolean(b) => *b,
            InputValue::Variable(name) => self
                .variables
                .get(name)
                .and_then(Value::as_bool)
                .unwrap_or(false),
            _ => false,
        }
    }
}
