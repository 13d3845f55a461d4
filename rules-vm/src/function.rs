//! Named functions resolved by index at load time: the standard library
//! (`stringEquals`, `booleanEquals`, `isValidHostLabel`, `parseURL`,
//! `uriEncode`) plus whatever an extension registers.

use crate::error::{EvaluationError, Reason};
use crate::uri;
use crate::value::TypedValue;

/// A named, fixed-arity function callable from `FN`/`FN0..FN3`.
pub trait Function: Send + Sync {
    /// The name the bytecode's function table references.
    fn name(&self) -> &str;
    /// Number of arguments this function takes.
    fn arity(&self) -> usize;
    /// Applies the function. `args` has exactly `arity()` entries, in
    /// source (call) order.
    fn apply(&self, args: &[TypedValue]) -> Result<TypedValue, EvaluationError>;
}

/// A function table: resolves names to implementations, in the order the
/// bytecode's function table lists them.
#[derive(Default)]
pub struct FunctionRegistry {
    functions: Vec<Box<dyn Function>>,
}

impl FunctionRegistry {
    /// A registry with only the standard functions from §4.6.
    pub fn with_standard_functions() -> Self {
        let mut registry = Self::default();
        registry.register(StringEquals);
        registry.register(BooleanEquals);
        registry.register(IsValidHostLabel);
        registry.register(ParseUrl);
        registry.register(UriEncode);
        registry
    }

    /// Adds (or, by name, replaces) a function.
    pub fn register(&mut self, function: impl Function + 'static) {
        if let Some(existing) = self.functions.iter_mut().find(|f| f.name() == function.name()) {
            *existing = Box::new(function);
        } else {
            self.functions.push(Box::new(function));
        }
    }

    /// Looks up a function by name, for resolving a bytecode function-table
    /// entry at load time.
    pub fn find(&self, name: &str) -> Option<usize> {
        self.functions.iter().position(|f| f.name() == name)
    }

    /// The function at a resolved index, for `FN`/`FN0..FN3` dispatch.
    pub fn get(&self, index: usize) -> Option<&dyn Function> {
        self.functions.get(index).map(|f| f.as_ref())
    }

    /// Removes and returns the function at `index`, shifting later entries
    /// down. Used by the loader to rebuild a registry ordered to match a
    /// program's function table.
    pub(crate) fn take(&mut self, index: usize) -> Option<Box<dyn Function>> {
        (index < self.functions.len()).then(|| self.functions.remove(index))
    }

    /// Appends an already-boxed function without a name-collision check,
    /// for the loader's reindexing pass.
    pub(crate) fn register_boxed(&mut self, function: Box<dyn Function>) {
        self.functions.push(function);
    }
}

struct StringEquals;
impl Function for StringEquals {
    fn name(&self) -> &str {
        "stringEquals"
    }
    fn arity(&self) -> usize {
        2
    }
    fn apply(&self, args: &[TypedValue]) -> Result<TypedValue, EvaluationError> {
        let (a, b) = (
            args[0].as_str().ok_or_else(type_mismatch)?,
            args[1].as_str().ok_or_else(type_mismatch)?,
        );
        Ok(TypedValue::from(a == b))
    }
}

struct BooleanEquals;
impl Function for BooleanEquals {
    fn name(&self) -> &str {
        "booleanEquals"
    }
    fn arity(&self) -> usize {
        2
    }
    fn apply(&self, args: &[TypedValue]) -> Result<TypedValue, EvaluationError> {
        let (a, b) = (
            args[0].as_bool().ok_or_else(type_mismatch)?,
            args[1].as_bool().ok_or_else(type_mismatch)?,
        );
        Ok(TypedValue::from(a == b))
    }
}

struct IsValidHostLabel;
impl Function for IsValidHostLabel {
    fn name(&self) -> &str {
        "isValidHostLabel"
    }
    fn arity(&self) -> usize {
        2
    }
    fn apply(&self, args: &[TypedValue]) -> Result<TypedValue, EvaluationError> {
        let label = args[0].as_str().ok_or_else(type_mismatch)?;
        let allow_dots = args[1].as_bool().ok_or_else(type_mismatch)?;
        Ok(TypedValue::from(uri::is_valid_host_label(label, allow_dots)))
    }
}

struct ParseUrl;
impl Function for ParseUrl {
    fn name(&self) -> &str {
        "parseURL"
    }
    fn arity(&self) -> usize {
        1
    }
    fn apply(&self, args: &[TypedValue]) -> Result<TypedValue, EvaluationError> {
        let input = args[0].as_str().ok_or_else(type_mismatch)?;
        Ok(match uri::parse_url(input) {
            Some(parsed) => TypedValue::Uri(parsed),
            None => TypedValue::Null,
        })
    }
}

struct UriEncode;
impl Function for UriEncode {
    fn name(&self) -> &str {
        "uriEncode"
    }
    fn arity(&self) -> usize {
        1
    }
    fn apply(&self, args: &[TypedValue]) -> Result<TypedValue, EvaluationError> {
        let input = args[0].as_str().ok_or_else(type_mismatch)?;
        Ok(TypedValue::from(uri::uri_encode(input)))
    }
}

fn type_mismatch() -> EvaluationError {
    EvaluationError::new(Reason::TypeMismatch, None)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_functions_are_all_resolvable_by_name() {
        let registry = FunctionRegistry::with_standard_functions();
        for name in [
            "stringEquals",
            "booleanEquals",
            "isValidHostLabel",
            "parseURL",
            "uriEncode",
        ] {
            assert!(registry.find(name).is_some(), "missing {name}");
        }
    }

    #[test]
    fn string_equals_compares_strings() {
        let registry = FunctionRegistry::with_standard_functions();
        let idx = registry.find("stringEquals").unwrap();
        let f = registry.get(idx).unwrap();
        let result = f
            .apply(&[TypedValue::from("a"), TypedValue::from("a")])
            .unwrap();
        assert_eq!(result, TypedValue::from(true));
    }

    #[test]
    fn custom_function_overrides_by_name() {
        struct AlwaysTrue;
        impl Function for AlwaysTrue {
            fn name(&self) -> &str {
                "stringEquals"
            }
            fn arity(&self) -> usize {
                2
            }
            fn apply(&self, _args: &[TypedValue]) -> Result<TypedValue, EvaluationError> {
                Ok(TypedValue::from(true))
            }
        }
        let mut registry = FunctionRegistry::with_standard_functions();
        registry.register(AlwaysTrue);
        let idx = registry.find("stringEquals").unwrap();
        let f = registry.get(idx).unwrap();
        let result = f
            .apply(&[TypedValue::from("a"), TypedValue::from("b")])
            .unwrap();
        assert_eq!(result, TypedValue::from(true));
    }
}
