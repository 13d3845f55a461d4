//! Compiled templates: literal string parts interleaved with placeholders,
//! resolved against a slice of already-evaluated expression values.

use crate::error::{EvaluationError, Reason};
use crate::value::TypedValue;

/// One piece of a compiled template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Part {
    /// A literal run of characters, copied verbatim.
    Literal(String),
    /// A placeholder whose value is supplied positionally by the caller of
    /// [`Template::resolve`].
    Placeholder,
}

/// A template string compiled into literal/placeholder parts.
///
/// When a template is exactly one placeholder and no literal text, the
/// compiler may skip `RESOLVE_TEMPLATE` entirely and push the inner
/// expression's value directly; [`Template::single_placeholder`] reports
/// when that shortcut applies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    source: String,
    parts: Vec<Part>,
    placeholder_count: usize,
}

impl Template {
    /// Builds a template from its literal/placeholder parts.
    pub fn new(source: impl Into<String>, parts: Vec<Part>) -> Self {
        let placeholder_count = parts.iter().filter(|p| matches!(p, Part::Placeholder)).count();
        Self {
            source: source.into(),
            parts,
            placeholder_count,
        }
    }

    /// The original template string, e.g. `"https://{bucket}.s3.{region}.amazonaws.com"`.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Total number of placeholders in this template.
    pub fn placeholder_count(&self) -> usize {
        self.placeholder_count
    }

    /// `true` iff this template is a single placeholder with no literal
    /// text around it, i.e. `resolve` would just echo its one input back.
    pub fn single_placeholder(&self) -> bool {
        self.parts.len() == 1 && self.placeholder_count == 1
    }

    /// Concatenates literal parts with `values`, which must supply exactly
    /// one entry per placeholder in source order.
    pub fn resolve(&self, values: &[TypedValue]) -> Result<String, EvaluationError> {
        if values.len() != self.placeholder_count {
            return Err(EvaluationError::new(Reason::TemplateArityMismatch, None));
        }
        let mut out = String::new();
        let mut values = values.iter();
        for part in &self.parts {
            match part {
                Part::Literal(text) => out.push_str(text),
                Part::Placeholder => {
                    let value = values.next().expect("count checked above");
                    push_value(&mut out, value);
                }
            }
        }
        Ok(out)
    }
}

fn push_value(out: &mut String, value: &TypedValue) {
    match value {
        TypedValue::String(s) => out.push_str(s),
        TypedValue::Int(i) => out.push_str(&i.to_string()),
        TypedValue::Bool(b) => out.push_str(&b.to_string()),
        TypedValue::Null => {}
        other => out.push_str(&format!("{other:?}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bucket_region_template() -> Template {
        Template::new(
            "https://{bucket}.s3.{region}.amazonaws.com",
            vec![
                Part::Literal("https://".into()),
                Part::Placeholder,
                Part::Literal(".s3.".into()),
                Part::Placeholder,
                Part::Literal(".amazonaws.com".into()),
            ],
        )
    }

    #[test]
    fn resolves_with_exact_placeholder_count() {
        let template = bucket_region_template();
        let out = template
            .resolve(&[TypedValue::from("b"), TypedValue::from("us-west-2")])
            .unwrap();
        assert_eq!(out, "https://b.s3.us-west-2.amazonaws.com");
    }

    #[test]
    fn arity_mismatch_is_an_error() {
        let template = bucket_region_template();
        assert!(template.resolve(&[TypedValue::from("only-one")]).is_err());
        assert!(template
            .resolve(&[TypedValue::from("a"), TypedValue::from("b"), TypedValue::from("c")])
            .is_err());
    }

    #[test]
    fn single_placeholder_template_echoes_its_value() {
        let template = Template::new("{x}", vec![Part::Placeholder]);
        assert!(template.single_placeholder());
        assert_eq!(template.resolve(&[TypedValue::from("v")]).unwrap(), "v");
    }
}
