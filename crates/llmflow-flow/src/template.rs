//! The `{{ name }}` substitution language named in `spec.md` §4.E.1.
//!
//! Deliberately narrower than the teacher's `minijinja`-based
//! `template::validate_template`/`resolve_params` (no `{% if %}`, no
//! partials): the spec's grammar is exactly one substitution form, so a
//! small regex-driven renderer replaces the general-purpose template
//! engine rather than restricting it after the fact.

use std::collections::HashMap;

use llmflow_core::ExecutionError;
use regex::Regex;
use serde_json::Value;

fn placeholder_pattern() -> Regex {
    Regex::new(r"\{\{\s*([A-Za-z_][A-Za-z0-9_]*)\s*\}\}").expect("static pattern is valid")
}

/// Renders `template`, substituting every `{{ name }}` with the matching
/// entry from `inputs`. String values substitute verbatim; every other
/// JSON value type is rendered via `serde_json::to_string`. A reference to
/// a name absent from `inputs` is a `ValidationError`-class failure
/// (`spec.md` §4.E.1).
pub fn render(template: &str, inputs: &HashMap<String, Value>) -> Result<String, ExecutionError> {
    let pattern = placeholder_pattern();
    let mut missing: Option<String> = None;

    let rendered = pattern.replace_all(template, |caps: &regex::Captures| {
        let name = &caps[1];
        match inputs.get(name) {
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
            None => {
                if missing.is_none() {
                    missing = Some(name.to_owned());
                }
                String::new()
            }
        }
    });

    match missing {
        Some(name) => Err(ExecutionError::UnboundTemplateVariable(name)),
        None => Ok(rendered.into_owned()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inputs(pairs: &[(&str, Value)]) -> HashMap<String, Value> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    #[test]
    fn substitutes_string_values_verbatim() {
        let rendered = render("Hello {{ name }}!", &inputs(&[("name", Value::String("world".into()))])).unwrap();
        assert_eq!(rendered, "Hello world!");
    }

    #[test]
    fn json_encodes_non_string_values() {
        let rendered = render("score={{ score }}", &inputs(&[("score", serde_json::json!(0.9))])).unwrap();
        assert_eq!(rendered, "score=0.9");
    }

    #[test]
    fn unbound_variable_is_an_error() {
        let err = render("Hi {{ missing }}", &inputs(&[])).unwrap_err();
        assert!(matches!(err, ExecutionError::UnboundTemplateVariable(name) if name == "missing"));
    }

    #[test]
    fn no_control_flow_is_supported_only_substitution() {
        let rendered = render("{{ a }}{{ b }}", &inputs(&[("a", Value::String("x".into())), ("b", Value::String("y".into()))])).unwrap();
        assert_eq!(rendered, "xy");
    }
}
