//! §6's "configuration knobs" promoted to a real, documented type.

use crate::context::{BuiltinProviders, Context};
use crate::function::Function;

/// Tunable limits and host extension points for a [`crate::resolver::Resolver`].
///
/// All fields have defaults; callers only set what they need to override.
pub struct ResolverConfig<C: Context> {
    /// Maximum number of modeled errors tolerated before a resolution is
    /// abandoned. The VM itself raises at most one per resolution, but a
    /// host wrapping multiple attempts (e.g. retrying with a fallback
    /// program) can use this to bound total attempts.
    pub max_errors: usize,
    /// Upper bound on decoded constant/value nesting depth. Mirrors
    /// [`rules_asm::MAX_CONSTANT_DEPTH`] but is independently configurable
    /// so a host can tighten it further.
    pub max_nesting_depth: usize,
    /// Upper bound on operand stack depth during fragment execution.
    pub max_stack_depth: usize,
    /// Functions layered on top of the standard library, consulted before
    /// a program's function table is resolved at load time.
    pub custom_functions: Vec<Box<dyn Function>>,
    /// Builtin providers layered in at resolver construction.
    pub custom_builtin_providers: BuiltinProviders<C>,
}

impl<C: Context> Default for ResolverConfig<C> {
    fn default() -> Self {
        Self {
            max_errors: 1,
            max_nesting_depth: rules_asm::MAX_CONSTANT_DEPTH,
            max_stack_depth: 64,
            custom_functions: Vec::new(),
            custom_builtin_providers: BuiltinProviders::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Ctx;
    impl Context for Ctx {}

    #[test]
    fn defaults_match_spec_minimums() {
        let config = ResolverConfig::<Ctx>::default();
        assert_eq!(config.max_nesting_depth, 100);
        assert!(config.max_stack_depth >= 64);
        assert!(config.custom_functions.is_empty());
    }
}
