//! Rendering of typed variables into HCL `tfvars` text.
//!
//! A template is line oriented: every `key = <placeholder>` line names a
//! variable slot. Rendering keeps only the slots the caller supplied a value
//! for, in template order, with keys padded to the longest rendered key.

use std::collections::HashSet;
use std::path::Path;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Ordered variable name → value mapping.
pub type Variables = IndexMap<String, VarValue>;

/// A typed variable value.
///
/// Deserialization tries each shape in order, so JSON `"x"` is a string,
/// `3` an integer, arrays and objects recurse, and anything else (booleans,
/// floats, null) lands in `Unsupported`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum VarValue {
    String(String),
    Integer(i64),
    List(Vec<VarValue>),
    Map(IndexMap<String, VarValue>),
    Unsupported(serde_json::Value),
}

impl VarValue {
    /// Parse a value given on the command line: JSON first, raw string otherwise.
    pub fn parse_cli(raw: &str) -> Self {
        serde_json::from_str(raw).unwrap_or_else(|_| VarValue::String(raw.to_string()))
    }

    fn type_name(&self) -> &'static str {
        match self {
            VarValue::String(_) => "string",
            VarValue::Integer(_) => "integer",
            VarValue::List(_) => "list",
            VarValue::Map(_) => "map",
            VarValue::Unsupported(serde_json::Value::Bool(_)) => "bool",
            VarValue::Unsupported(serde_json::Value::Number(_)) => "number",
            VarValue::Unsupported(serde_json::Value::Null) => "null",
            VarValue::Unsupported(_) => "unknown",
        }
    }
}

impl From<&str> for VarValue {
    fn from(value: &str) -> Self {
        VarValue::String(value.to_string())
    }
}

impl From<i64> for VarValue {
    fn from(value: i64) -> Self {
        VarValue::Integer(value)
    }
}

/// Result of rendering a template.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RenderedTemplate {
    pub text: String,
    /// Keys written to `text`, in template order.
    pub rendered: Vec<String>,
    /// Keys with a value of an unsupported type.
    pub skipped: Vec<String>,
    /// Template keys with no value supplied.
    pub missing: Vec<String>,
}

/// Render `template` against `vars`.
///
/// Never fails: unsupported values are skipped with a warning and the rest
/// of the file still renders.
pub fn render_tfvars(template: &str, vars: &Variables) -> RenderedTemplate {
    let mut result = RenderedTemplate::default();
    let mut seen = HashSet::new();
    let mut lines: Vec<(String, String)> = Vec::new();

    for line in template.lines() {
        let parts: Vec<&str> = line.split('=').collect();
        if parts.len() != 2 {
            continue;
        }
        let key = parts[0].trim();
        if key.is_empty() || !seen.insert(key.to_string()) {
            continue;
        }

        let Some(value) = vars.get(key) else {
            result.missing.push(key.to_string());
            continue;
        };

        match literal(value, 0) {
            Some(lit) => lines.push((key.to_string(), lit)),
            None => {
                tracing::warn!(
                    key,
                    value_type = value.type_name(),
                    "Unsupported variable type; skipping"
                );
                result.skipped.push(key.to_string());
            }
        }
    }

    let width = lines
        .iter()
        .map(|(k, _)| k.chars().count())
        .max()
        .unwrap_or(0);

    for (key, lit) in lines {
        result.text.push_str(&format!("{key:<width$} = {lit}\n"));
        result.rendered.push(key);
    }

    result
}

/// Read a template from disk and render it.
pub fn render_tfvars_file(path: &Path, vars: &Variables) -> Result<RenderedTemplate, CoreError> {
    if !path.exists() {
        return Err(CoreError::TemplateNotFound(path.display().to_string()));
    }
    let template = std::fs::read_to_string(path)?;
    Ok(render_tfvars(&template, vars))
}

fn literal(value: &VarValue, depth: usize) -> Option<String> {
    match value {
        VarValue::String(s) => Some(quote(s)),
        VarValue::Integer(i) => Some(i.to_string()),
        VarValue::List(items) => {
            let rendered = items
                .iter()
                .map(inline_literal)
                .collect::<Option<Vec<_>>>()?;
            Some(format!("[{}]", rendered.join(", ")))
        }
        VarValue::Map(map) => block(map, depth),
        VarValue::Unsupported(_) => None,
    }
}

fn inline_literal(value: &VarValue) -> Option<String> {
    match value {
        VarValue::Map(map) => {
            if map.is_empty() {
                return Some("{}".into());
            }
            let entries = map
                .iter()
                .map(|(k, v)| inline_literal(v).map(|lit| format!("{k} = {lit}")))
                .collect::<Option<Vec<_>>>()?;
            Some(format!("{{ {} }}", entries.join(", ")))
        }
        other => literal(other, 0),
    }
}

fn block(map: &IndexMap<String, VarValue>, depth: usize) -> Option<String> {
    if map.is_empty() {
        return Some("{}".into());
    }
    let width = map.keys().map(|k| k.chars().count()).max().unwrap_or(0);
    let inner = "  ".repeat(depth + 1);
    let outer = "  ".repeat(depth);

    let mut out = vec!["{".to_string()];
    for (k, v) in map {
        let lit = literal(v, depth + 1)?;
        out.push(format!("{inner}{k:<width$} = {lit}"));
    }
    out.push(format!("{outer}}}"));
    Some(out.join("\n"))
}

/// Quote a string literal. Values that already start with a quote are kept.
fn quote(s: &str) -> String {
    if s.starts_with('"') {
        return s.to_string();
    }
    let escaped = s.replace('\\', "\\\\").replace('"', "\\\"");
    format!("\"{escaped}\"")
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEMPLATE: &str = "\
region          = <region>
instance_count  = <instance_count>
subnets         = <subnets>
tags            = <tags>
";

    fn vars(pairs: &[(&str, VarValue)]) -> Variables {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn renders_strings_and_integers_aligned() {
        let v = vars(&[
            ("region", "us-east-1".into()),
            ("instance_count", VarValue::Integer(3)),
        ]);
        let out = render_tfvars(TEMPLATE, &v);
        assert_eq!(
            out.text,
            "region         = \"us-east-1\"\ninstance_count = 3\n"
        );
        assert_eq!(out.rendered, vec!["region", "instance_count"]);
        assert_eq!(out.missing, vec!["subnets", "tags"]);
    }

    #[test]
    fn already_quoted_string_is_not_requoted() {
        let v = vars(&[("region", VarValue::String("\"x\"".into()))]);
        let out = render_tfvars(TEMPLATE, &v);
        assert_eq!(out.text, "region = \"x\"\n");
        assert!(!out.text.contains("\"\"x\"\""));
    }

    #[test]
    fn alignment_uses_rendered_keys_only() {
        // instance_count is supplied but unsupported, so it must not widen the column.
        let v = vars(&[
            ("region", "eu-west-1".into()),
            ("tags", VarValue::Map(IndexMap::new())),
            ("instance_count", VarValue::Unsupported(serde_json::json!(true))),
        ]);
        let out = render_tfvars(TEMPLATE, &v);
        assert_eq!(out.text, "region = \"eu-west-1\"\ntags   = {}\n");
        assert_eq!(out.skipped, vec!["instance_count"]);
    }

    #[test]
    fn mapping_keys_absent_from_template_never_appear() {
        let v = vars(&[("region", "us-east-1".into()), ("extra", "nope".into())]);
        let out = render_tfvars(TEMPLATE, &v);
        assert!(!out.text.contains("extra"));
        assert_eq!(out.rendered, vec!["region"]);
    }

    #[test]
    fn each_key_rendered_exactly_once() {
        let template = "region = <a>\nregion = <b>\n";
        let v = vars(&[("region", "us-east-1".into())]);
        let out = render_tfvars(template, &v);
        assert_eq!(out.text.matches("region").count(), 1);
    }

    #[test]
    fn renders_list_as_hcl_sequence() {
        let v = vars(&[(
            "subnets",
            VarValue::List(vec!["10.0.1.0/24".into(), "10.0.2.0/24".into()]),
        )]);
        let out = render_tfvars(TEMPLATE, &v);
        assert_eq!(out.text, "subnets = [\"10.0.1.0/24\", \"10.0.2.0/24\"]\n");
    }

    #[test]
    fn renders_map_as_aligned_block() {
        let mut tags = IndexMap::new();
        tags.insert("env".to_string(), VarValue::from("prod"));
        tags.insert("cost_center".to_string(), VarValue::Integer(42));
        let v = vars(&[("tags", VarValue::Map(tags))]);
        let out = render_tfvars(TEMPLATE, &v);
        assert_eq!(
            out.text,
            "tags = {\n  env         = \"prod\"\n  cost_center = 42\n}\n"
        );
    }

    #[test]
    fn nested_maps_indent_per_level() {
        let mut inner = IndexMap::new();
        inner.insert("a".to_string(), VarValue::Integer(1));
        let mut outer = IndexMap::new();
        outer.insert("nested".to_string(), VarValue::Map(inner));
        let out = render_tfvars(TEMPLATE, &vars(&[("tags", VarValue::Map(outer))]));
        assert_eq!(out.text, "tags = {\n  nested = {\n    a = 1\n  }\n}\n");
    }

    #[test]
    fn list_with_unsupported_item_is_skipped() {
        let v = vars(&[
            ("subnets", VarValue::List(vec![VarValue::Unsupported(serde_json::json!(1.5))])),
            ("region", "us-east-1".into()),
        ]);
        let out = render_tfvars(TEMPLATE, &v);
        assert_eq!(out.skipped, vec!["subnets"]);
        assert_eq!(out.text, "region = \"us-east-1\"\n");
    }

    #[test]
    fn lines_without_single_equals_are_ignored() {
        let template = "# comment\nregion = <r>\na = b = c\n\n";
        let v = vars(&[("region", "x".into()), ("a", "y".into())]);
        let out = render_tfvars(template, &v);
        assert_eq!(out.text, "region = \"x\"\n");
    }

    #[test]
    fn parse_cli_prefers_json() {
        assert_eq!(VarValue::parse_cli("3"), VarValue::Integer(3));
        assert_eq!(VarValue::parse_cli("plain"), VarValue::String("plain".into()));
        assert_eq!(VarValue::parse_cli("\"quoted\""), VarValue::String("quoted".into()));
        assert_eq!(
            VarValue::parse_cli("[\"a\", 1]"),
            VarValue::List(vec!["a".into(), VarValue::Integer(1)])
        );
        assert!(matches!(VarValue::parse_cli("{\"k\": \"v\"}"), VarValue::Map(_)));
        assert!(matches!(VarValue::parse_cli("true"), VarValue::Unsupported(_)));
    }

    #[test]
    fn escapes_embedded_quotes() {
        let v = vars(&[("region", VarValue::String("a\"b".into()))]);
        let out = render_tfvars(TEMPLATE, &v);
        assert_eq!(out.text, "region = \"a\\\"b\"\n");
    }

    #[test]
    fn render_file_reports_missing_template() {
        let tmp = tempfile::tempdir().unwrap();
        let err = render_tfvars_file(&tmp.path().join("nope.tpl"), &Variables::new()).unwrap_err();
        assert!(matches!(err, CoreError::TemplateNotFound(_)));
    }

    #[test]
    fn render_file_reads_template_from_disk() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("template.tfvars.tpl");
        std::fs::write(&path, TEMPLATE).unwrap();
        let v = vars(&[("instance_count", VarValue::Integer(2))]);
        let out = render_tfvars_file(&path, &v).unwrap();
        assert_eq!(out.text, "instance_count = 2\n");
    }
}
