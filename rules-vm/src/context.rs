//! The two trait seams the surrounding host plugs into: builtin providers
//! (feed a register when the caller didn't supply a value) and extensions
//! (inspect or trim an endpoint before it's returned).

use std::collections::HashMap;

use crate::endpoint::EndpointBuilder;
use crate::value::TypedValue;

/// Opaque, host-defined context passed through to builtin providers and
/// extensions. The VM itself never inspects it.
pub trait Context {}

impl Context for () {}

/// A named value provider consulted when a register declares a builtin and
/// no caller-supplied parameter filled it. Returning `None` means "no value
/// available"; the filler leaves the register null unless it is required.
///
/// Implementations are expected to be synchronous and non-blocking (§5).
pub trait BuiltinProvider<C: Context>: Send + Sync {
    /// Produces this builtin's value for the given context, or `None`.
    fn provide(&self, context: &C) -> Option<TypedValue>;
}

impl<C: Context, F> BuiltinProvider<C> for F
where
    F: Fn(&C) -> Option<TypedValue> + Send + Sync,
{
    fn provide(&self, context: &C) -> Option<TypedValue> {
        self(context)
    }
}

/// A registry of builtin providers, keyed by the name a
/// [`crate::register::RegisterDefinition::builtin`] references.
#[derive(Default)]
pub struct BuiltinProviders<C: Context> {
    providers: HashMap<String, Box<dyn BuiltinProvider<C>>>,
}

impl<C: Context> BuiltinProviders<C> {
    /// An empty provider set.
    pub fn new() -> Self {
        Self {
            providers: HashMap::new(),
        }
    }

    /// Registers (or replaces) the provider for `name`.
    pub fn register(&mut self, name: impl Into<String>, provider: impl BuiltinProvider<C> + 'static) {
        self.providers.insert(name.into(), Box::new(provider));
    }

    /// Looks up and invokes the provider for `name`, if registered.
    pub fn provide(&self, name: &str, context: &C) -> Option<TypedValue> {
        self.providers.get(name)?.provide(context)
    }
}

/// Invoked after a result fragment produces an endpoint, before
/// `resolve` returns it. Extensions may inspect the context and trim or
/// augment the builder's properties/headers.
pub trait Extension<C: Context>: Send + Sync {
    /// Mutates `builder` in place.
    fn extend(&self, builder: &mut EndpointBuilder, context: &C);
}

impl<C: Context, F> Extension<C> for F
where
    F: Fn(&mut EndpointBuilder, &C) + Send + Sync,
{
    fn extend(&self, builder: &mut EndpointBuilder, context: &C) {
        self(builder, context)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Ctx;
    impl Context for Ctx {}

    #[test]
    fn provider_registry_invokes_named_provider() {
        let mut providers = BuiltinProviders::<Ctx>::new();
        providers.register("Region", |_: &Ctx| Some(TypedValue::from("us-east-1")));
        assert_eq!(
            providers.provide("Region", &Ctx),
            Some(TypedValue::from("us-east-1"))
        );
        assert_eq!(providers.provide("Missing", &Ctx), None);
    }
}
