//! Populates a fresh register file from caller parameters, builtin
//! providers, and declared defaults — §4.4's bitmask (<64 registers) and
//! array (>=64) implementations, chosen once at [`crate::bytecode::Bytecode`]
//! load time based on register count.

use std::collections::HashMap;

use rules_asm::RegisterId;

use crate::context::{BuiltinProviders, Context};
use crate::error::ParameterError;
use crate::register::RegisterModel;
use crate::value::TypedValue;

const BITMASK_THRESHOLD: usize = 64;

/// Fills register files for one program. Picked once, not per resolution.
#[derive(Debug, Clone, Copy)]
pub enum RegisterFiller {
    /// Used when the program declares fewer than 64 registers.
    Bitmask,
    /// Used when the program declares 64 or more registers.
    Array,
}

impl RegisterFiller {
    /// Chooses the implementation for a register count, per §4.4.
    pub fn for_register_count(count: usize) -> Self {
        if count < BITMASK_THRESHOLD {
            RegisterFiller::Bitmask
        } else {
            RegisterFiller::Array
        }
    }

    /// Fills a fresh register file for one resolution.
    ///
    /// Order of operations, matching the invariants in §4.4 and §8:
    /// defaults are already in `model.template()`; caller parameters are
    /// applied first and win over builtins; builtins only fill registers
    /// that are still unset after that; the hard-required check runs last.
    pub fn fill<C: Context>(
        &self,
        model: &RegisterModel,
        parameters: &HashMap<String, TypedValue>,
        providers: &BuiltinProviders<C>,
        context: &C,
    ) -> Result<Vec<TypedValue>, ParameterError> {
        let mut registers = model.template().to_vec();
        let mut filled: Box<dyn FilledSet> = match self {
            RegisterFiller::Bitmask => Box::new(BitmaskSet::new(model)),
            RegisterFiller::Array => Box::new(ArraySet::new(model)),
        };

        for (name, value) in parameters {
            if let Some(reg) = model.index_of(name) {
                registers[reg.as_usize()] = value.clone();
                filled.mark(reg);
            }
        }

        for reg in model.builtin_indices() {
            if filled.is_set(*reg) {
                continue;
            }
            let name = model
                .builtin_name_of(*reg)
                .expect("builtin_indices only contains registers with a builtin");
            if let Some(value) = providers.provide(name, context) {
                registers[reg.as_usize()] = value;
                filled.mark(*reg);
            }
        }

        if let Some(missing) = model
            .hard_required_indices()
            .iter()
            .find(|reg| !filled.is_set(**reg))
        {
            return Err(ParameterError::MissingRequired(model.name_of(*missing).to_owned()));
        }

        Ok(registers)
    }
}

/// Tracks which registers have been filled so far. Two implementations
/// exist purely as a performance choice (§4.4): both obey the identical
/// fill/check semantics above.
trait FilledSet {
    fn mark(&mut self, reg: RegisterId);
    fn is_set(&self, reg: RegisterId) -> bool;
}

/// Packs up to 64 register slots into one word, matching §4.4's
/// trailing-zero-count driven bitmask algorithm. Registers with a
/// declared default start pre-filled, since a default already satisfies
/// the register even before parameters/builtins are consulted.
struct BitmaskSet {
    bits: u64,
}

impl BitmaskSet {
    fn new(model: &RegisterModel) -> Self {
        let mut bits = 0u64;
        for (idx, def) in model.defs().iter().enumerate() {
            if def.default.is_some() {
                bits |= 1 << idx;
            }
        }
        Self { bits }
    }
}

impl FilledSet for BitmaskSet {
    fn mark(&mut self, reg: RegisterId) {
        self.bits |= 1 << reg.as_usize();
    }

    fn is_set(&self, reg: RegisterId) -> bool {
        self.bits & (1 << reg.as_usize()) != 0
    }
}

/// `bool[N]` tracking, used once a program declares 64 or more registers
/// and no longer fits in one word.
struct ArraySet {
    slots: Vec<bool>,
}

impl ArraySet {
    fn new(model: &RegisterModel) -> Self {
        let mut slots = vec![false; model.len()];
        for (idx, def) in model.defs().iter().enumerate() {
            if def.default.is_some() {
                slots[idx] = true;
            }
        }
        Self { slots }
    }
}

impl FilledSet for ArraySet {
    fn mark(&mut self, reg: RegisterId) {
        self.slots[reg.as_usize()] = true;
    }

    fn is_set(&self, reg: RegisterId) -> bool {
        self.slots[reg.as_usize()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::register::RegisterDefinition;

    struct Ctx;
    impl Context for Ctx {}

    #[test]
    fn caller_value_wins_over_default_and_builtin() {
        let mut reg = RegisterDefinition::input("bucket");
        reg.default = Some(TypedValue::from("default-bucket"));
        let model = RegisterModel::new(vec![reg]).unwrap();
        let filler = RegisterFiller::for_register_count(model.len());
        let mut params = HashMap::new();
        params.insert("bucket".to_owned(), TypedValue::from("explicit-bucket"));
        let providers = BuiltinProviders::<Ctx>::new();
        let registers = filler.fill(&model, &params, &providers, &Ctx).unwrap();
        assert_eq!(registers[0], TypedValue::from("explicit-bucket"));
    }

    #[test]
    fn default_applies_when_unset_and_no_builtin() {
        let mut reg = RegisterDefinition::input("region");
        reg.default = Some(TypedValue::from("us-east-1"));
        let model = RegisterModel::new(vec![reg]).unwrap();
        let filler = RegisterFiller::for_register_count(model.len());
        let providers = BuiltinProviders::<Ctx>::new();
        let registers = filler
            .fill(&model, &HashMap::new(), &providers, &Ctx)
            .unwrap();
        assert_eq!(registers[0], TypedValue::from("us-east-1"));
    }

    #[test]
    fn missing_required_register_is_refused() {
        let reg = RegisterDefinition::required("bucket");
        let model = RegisterModel::new(vec![reg]).unwrap();
        let filler = RegisterFiller::for_register_count(model.len());
        let providers = BuiltinProviders::<Ctx>::new();
        let err = filler.fill(&model, &HashMap::new(), &providers, &Ctx).unwrap_err();
        assert_eq!(err, ParameterError::MissingRequired("bucket".into()));
    }

    #[test]
    fn builtin_fills_required_register_with_no_default() {
        let mut reg = RegisterDefinition::required("region");
        reg.builtin = Some("Region".into());
        let model = RegisterModel::new(vec![reg]).unwrap();
        let filler = RegisterFiller::for_register_count(model.len());
        let mut providers = BuiltinProviders::<Ctx>::new();
        providers.register("Region", |_: &Ctx| Some(TypedValue::from("eu-west-1")));
        let registers = filler
            .fill(&model, &HashMap::new(), &providers, &Ctx)
            .unwrap();
        assert_eq!(registers[0], TypedValue::from("eu-west-1"));
    }

    #[test]
    fn picks_array_filler_at_64_registers() {
        assert!(matches!(
            RegisterFiller::for_register_count(63),
            RegisterFiller::Bitmask
        ));
        assert!(matches!(
            RegisterFiller::for_register_count(64),
            RegisterFiller::Array
        ));
    }
}
