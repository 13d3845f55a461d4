//! Orchestrates one resolution end to end: fill registers, drive the BDD,
//! execute the selected result fragment, hand the endpoint to registered
//! extensions.

use std::cell::RefCell;
use std::collections::HashMap;
use std::future::Ready;
use std::sync::Arc;

use crate::bdd;
use crate::bytecode::Bytecode;
use crate::config::ResolverConfig;
use crate::context::{Context, Extension};
use crate::endpoint::{Endpoint, EndpointBuilder};
use crate::error::{EvaluationError, LoadError, Reason, ResolveError};
use crate::function::FunctionRegistry;
use crate::interpreter::{self, Evaluator, Halt};
use crate::value::TypedValue;

/// A loaded program plus the host extension points needed to run it:
/// builtin providers, extensions, and the configured limits.
pub struct Resolver<C: Context> {
    bytecode: Bytecode,
    max_stack_depth: usize,
    max_errors: usize,
    builtin_providers: crate::context::BuiltinProviders<C>,
    extensions: Vec<Box<dyn Extension<C>>>,
}

impl<C: Context> Resolver<C> {
    /// Loads `bytes` against the standard function library plus any
    /// `config.custom_functions`, then builds a resolver ready to run.
    pub fn load(bytes: &[u8], config: ResolverConfig<C>) -> Result<Self, LoadError> {
        let mut functions = FunctionRegistry::with_standard_functions();
        for function in config.custom_functions {
            functions.register_boxed(function);
        }
        let bytecode = Bytecode::load(bytes, functions, config.max_nesting_depth)?;
        Ok(Self {
            bytecode,
            max_stack_depth: config.max_stack_depth,
            max_errors: config.max_errors,
            builtin_providers: config.custom_builtin_providers,
            extensions: Vec::new(),
        })
    }

    /// Registers a post-resolution extension, run in registration order
    /// after a result fragment produces an endpoint.
    pub fn register_extension(&mut self, extension: impl Extension<C> + 'static) {
        self.extensions.push(Box::new(extension));
    }

    /// The maximum number of modeled errors this resolver tolerates, per
    /// [`ResolverConfig::max_errors`].
    pub fn max_errors(&self) -> usize {
        self.max_errors
    }

    /// Runs one resolution: fill registers from `parameters` and the
    /// registered builtins, drive the BDD, execute the selected result.
    /// `Ok(None)` means no rule matched. Allocates a fresh [`Evaluator`]
    /// for this call; [`ThreadLocalResolver::resolve`] reuses one instead.
    #[tracing::instrument(name = "resolve", skip_all)]
    pub fn resolve(
        &self,
        parameters: &HashMap<String, TypedValue>,
        context: &C,
    ) -> Result<Option<Endpoint>, ResolveError> {
        let registers = self.fill_registers(parameters, context)?;
        let mut evaluator = Evaluator::new(registers, self.max_stack_depth);
        self.resolve_with(context, &mut evaluator)
    }

    /// An already-completed future wrapping [`Resolver::resolve`], matching
    /// §5's "the resolver returns a future, immediately completed, to match
    /// caller expectations" — there is no suspension point inside the VM.
    pub fn resolve_async(
        &self,
        parameters: &HashMap<String, TypedValue>,
        context: &C,
    ) -> Ready<Result<Option<Endpoint>, ResolveError>> {
        std::future::ready(self.resolve(parameters, context))
    }

    fn fill_registers(
        &self,
        parameters: &HashMap<String, TypedValue>,
        context: &C,
    ) -> Result<Vec<TypedValue>, ResolveError> {
        Ok(self
            .bytecode
            .filler()
            .fill(self.bytecode.register_model(), parameters, &self.builtin_providers, context)?)
    }

    /// Drives the BDD and executes the selected result fragment against an
    /// already-reset `evaluator`, whose registers must already hold the
    /// filled values for this resolution.
    fn resolve_with(&self, context: &C, evaluator: &mut Evaluator) -> Result<Option<Endpoint>, ResolveError> {
        let program = self.bytecode.program();
        let conditions = self.bytecode.conditions();

        let outcome = bdd::walk(self.bytecode.bdd_nodes(), self.bytecode.bdd_root(), |var_idx| {
            interpreter::eval_condition(program, evaluator, conditions, var_idx)
        })?;

        let result_index = match outcome {
            bdd::Outcome::NoMatch => {
                tracing::debug!("no rule matched");
                return Ok(None);
            }
            bdd::Outcome::Result(index) => index as usize,
        };
        tracing::debug!(result_index, "selected result fragment");
        let entry = *self
            .bytecode
            .results()
            .get(result_index)
            .ok_or_else(|| EvaluationError::new(Reason::MalformedBddRef, None))?;

        match interpreter::run(program, evaluator, entry)? {
            Halt::Error(message) => {
                tracing::warn!(%message, "result fragment raised a modeled error");
                Err(ResolveError::Modeled(message))
            }
            Halt::Endpoint { uri, properties, headers } => {
                let mut builder = EndpointBuilder::new(uri)
                    .with_properties(properties.unwrap_or_default())
                    .with_headers(headers.unwrap_or_default());
                for extension in &self.extensions {
                    extension.extend(&mut builder, context);
                }
                Ok(Some(builder.build()))
            }
            Halt::Value(_) => Err(EvaluationError::new(Reason::TypeMismatch, None).into()),
        }
    }
}

thread_local! {
    static EVALUATOR: RefCell<Evaluator> = RefCell::new(Evaluator::new(Vec::new(), 0));
}

/// Wraps a [`Resolver`] behind a per-thread [`Evaluator`], matching §5's
/// "amortize allocation by caching one evaluator per thread." The resolver
/// itself is safely shared by reference; each thread that calls
/// [`ThreadLocalResolver::resolve`] reuses its own `Evaluator` — its
/// operand stack and condition-memoization table keep their allocated
/// capacity across calls instead of being rebuilt from scratch.
pub struct ThreadLocalResolver<C: Context> {
    inner: Arc<Resolver<C>>,
}

impl<C: Context> ThreadLocalResolver<C> {
    /// Wraps a shared resolver.
    pub fn new(inner: Arc<Resolver<C>>) -> Self {
        Self { inner }
    }

    /// Runs a resolution against this thread's cached [`Evaluator`],
    /// resetting its registers and clearing (not reallocating) its stack
    /// and condition cache before driving the BDD.
    pub fn resolve(
        &self,
        parameters: &HashMap<String, TypedValue>,
        context: &C,
    ) -> Result<Option<Endpoint>, ResolveError> {
        let registers = self.inner.fill_registers(parameters, context)?;
        EVALUATOR.with(|cell| {
            let mut evaluator = cell.borrow_mut();
            evaluator.reset(registers, self.inner.max_stack_depth);
            self.inner.resolve_with(context, &mut evaluator)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Context;

    struct Ctx;
    impl Context for Ctx {}

    fn trivial_match_bytes() -> Vec<u8> {
        crate::test_support::trivial_match_bytes()
    }

    #[test]
    fn resolves_trivial_match_with_region_set() {
        let resolver = Resolver::<Ctx>::load(&trivial_match_bytes(), ResolverConfig::default()).unwrap();
        let mut params = HashMap::new();
        params.insert("region".to_owned(), TypedValue::from("us-east-1"));
        let endpoint = resolver.resolve(&params, &Ctx).unwrap().unwrap();
        assert_eq!(endpoint.uri, "https://svc.example/");
    }

    #[test]
    fn no_match_without_region() {
        let resolver = Resolver::<Ctx>::load(&trivial_match_bytes(), ResolverConfig::default()).unwrap();
        let outcome = resolver.resolve(&HashMap::new(), &Ctx).unwrap();
        assert_eq!(outcome, None);
    }

    #[test]
    fn thread_local_resolver_reuses_its_evaluator_across_calls() {
        let resolver = Arc::new(Resolver::<Ctx>::load(&trivial_match_bytes(), ResolverConfig::default()).unwrap());
        let local = ThreadLocalResolver::new(resolver);

        let outcome = local.resolve(&HashMap::new(), &Ctx).unwrap();
        assert_eq!(outcome, None);

        let mut params = HashMap::new();
        params.insert("region".to_owned(), TypedValue::from("us-east-1"));
        // A second call on the same thread must not see any state left
        // over from the first: the reused Evaluator's stack and
        // condition cache are cleared by `reset`, not just its registers.
        let endpoint = local.resolve(&params, &Ctx).unwrap().unwrap();
        assert_eq!(endpoint.uri, "https://svc.example/");
    }
}
