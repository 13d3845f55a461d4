//! Register definitions and the derived lookup structures computed once at
//! load time: the register template, builtin/required index sets, and the
//! input-name-to-index map.

use std::collections::HashMap;

use rules_asm::RegisterId;

use crate::value::TypedValue;

// `RegisterId::new` truncates an index to `u8`; `MAX_REGISTERS` must never
// exceed the range that fits, or a register count right at the limit would
// wrap instead of landing in `RegisterModelError::TooMany`.
static_assertions::const_assert!(rules_asm::MAX_REGISTERS <= 256);

/// One declared register, position in `Bytecode::register_defs` is its
/// index.
#[derive(Debug, Clone, PartialEq)]
pub struct RegisterDefinition {
    /// The register's declared name. Unique within a program.
    pub name: String,
    /// Whether resolution must fail if this register ends up null.
    pub required: bool,
    /// The value copied into this register if no caller-supplied parameter
    /// and no builtin fill it.
    pub default: Option<TypedValue>,
    /// The name of the builtin provider consulted if no caller-supplied
    /// parameter fills this register.
    pub builtin: Option<String>,
    /// `true` for registers with no caller-visible name binding: used only
    /// as VM scratch space, e.g. a register a `PARSE_URL` result is stashed
    /// into mid-condition.
    pub temp: bool,
}

impl RegisterDefinition {
    /// A plain named, non-required, non-temp register with no default or
    /// builtin — the common case for most input parameters.
    pub fn input(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            required: false,
            default: None,
            builtin: None,
            temp: false,
        }
    }

    /// A required input parameter with no default or builtin.
    pub fn required(name: impl Into<String>) -> Self {
        Self {
            required: true,
            ..Self::input(name)
        }
    }

    /// Registers declared `temp: true` never have a default or builtin;
    /// enforced at load time as a [`crate::error::LoadError`]-worthy
    /// invariant by [`RegisterModel::new`].
    pub fn is_well_formed(&self) -> bool {
        !self.temp || (self.default.is_none() && self.builtin.is_none())
    }
}

/// The register definitions plus every cache derived from them once, at
/// load time, and reused for every resolution.
#[derive(Debug, Clone)]
pub struct RegisterModel {
    defs: Vec<RegisterDefinition>,
    template: Vec<TypedValue>,
    builtin_indices: Vec<RegisterId>,
    hard_required_indices: Vec<RegisterId>,
    input_register_map: HashMap<String, RegisterId>,
}

/// A register model had more than one register sharing a name, a `temp`
/// register with a default or builtin, or more registers than
/// [`rules_asm::MAX_REGISTERS`] allows.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegisterModelError {
    /// See [`RegisterDefinition::is_well_formed`].
    #[error("register {0:?} is temp but declares a default or builtin")]
    MalformedTempRegister(String),
    /// A name appeared more than once across `defs`.
    #[error("duplicate register name: {0}")]
    DuplicateName(String),
    /// `defs.len()` exceeded [`rules_asm::MAX_REGISTERS`].
    #[error("register count {found} exceeds the limit of {limit}")]
    TooMany {
        /// The configured limit.
        limit: usize,
        /// The count actually declared.
        found: usize,
    },
}

impl RegisterModel {
    /// Validates `defs` and computes every derived cache in one pass.
    pub fn new(defs: Vec<RegisterDefinition>) -> Result<Self, RegisterModelError> {
        if defs.len() > rules_asm::MAX_REGISTERS {
            return Err(RegisterModelError::TooMany {
                limit: rules_asm::MAX_REGISTERS,
                found: defs.len(),
            });
        }

        let mut seen_names = std::collections::HashSet::with_capacity(defs.len());
        for def in &defs {
            if !def.is_well_formed() {
                return Err(RegisterModelError::MalformedTempRegister(def.name.clone()));
            }
            if !seen_names.insert(def.name.as_str()) {
                return Err(RegisterModelError::DuplicateName(def.name.clone()));
            }
        }

        let template: Vec<TypedValue> = defs
            .iter()
            .map(|def| def.default.clone().unwrap_or(TypedValue::Null))
            .collect();

        let mut builtin_indices = Vec::new();
        let mut hard_required_indices = Vec::new();
        let mut input_register_map = HashMap::new();

        for (idx, def) in defs.iter().enumerate() {
            let reg = RegisterId::new(idx as u8);
            if def.builtin.is_some() && def.default.is_none() {
                builtin_indices.push(reg);
            }
            if def.required && def.default.is_none() && def.builtin.is_none() && !def.temp {
                hard_required_indices.push(reg);
            }
            if !def.temp {
                input_register_map.insert(def.name.clone(), reg);
            }
        }

        Ok(Self {
            defs,
            template,
            builtin_indices,
            hard_required_indices,
            input_register_map,
        })
    }

    /// The declared register definitions, indexed the same as the register
    /// file itself.
    pub fn defs(&self) -> &[RegisterDefinition] {
        &self.defs
    }

    /// The number of registers this program declares.
    pub fn len(&self) -> usize {
        self.defs.len()
    }

    /// `true` iff this program declares no registers.
    pub fn is_empty(&self) -> bool {
        self.defs.is_empty()
    }

    /// The values to copy into a fresh register file before filling:
    /// declared defaults, or null where there is none.
    pub fn template(&self) -> &[TypedValue] {
        &self.template
    }

    /// Registers with a builtin provider and no default, in ascending
    /// index order.
    pub fn builtin_indices(&self) -> &[RegisterId] {
        &self.builtin_indices
    }

    /// Registers that are required, non-temp, and have neither a default
    /// nor a builtin — the ones the filler's final check must find filled.
    pub fn hard_required_indices(&self) -> &[RegisterId] {
        &self.hard_required_indices
    }

    /// Maps a declared parameter name to its register index. Only non-temp
    /// registers are reachable by name.
    pub fn index_of(&self, name: &str) -> Option<RegisterId> {
        self.input_register_map.get(name).copied()
    }

    /// The builtin name a register should be filled from, if any.
    pub fn builtin_name_of(&self, reg: RegisterId) -> Option<&str> {
        self.defs.get(reg.as_usize())?.builtin.as_deref()
    }

    /// The declared name of a register, used to build the "Missing
    /// required parameter: <name>" message.
    pub fn name_of(&self, reg: RegisterId) -> &str {
        &self.defs[reg.as_usize()].name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_duplicate_names() {
        let defs = vec![RegisterDefinition::input("a"), RegisterDefinition::input("a")];
        assert!(matches!(
            RegisterModel::new(defs),
            Err(RegisterModelError::DuplicateName(_))
        ));
    }

    #[test]
    fn rejects_malformed_temp_register() {
        let mut temp = RegisterDefinition::input("scratch");
        temp.temp = true;
        temp.default = Some(TypedValue::from(1i32));
        assert!(matches!(
            RegisterModel::new(vec![temp]),
            Err(RegisterModelError::MalformedTempRegister(_))
        ));
    }

    #[test]
    fn derives_hard_required_and_builtin_indices() {
        let mut with_builtin = RegisterDefinition::required("region");
        with_builtin.builtin = Some("Region".into());
        let defs = vec![RegisterDefinition::required("bucket"), with_builtin];
        let model = RegisterModel::new(defs).unwrap();
        assert_eq!(model.hard_required_indices(), &[RegisterId::new(0)]);
        assert_eq!(model.builtin_indices(), &[RegisterId::new(1)]);
    }

    #[test]
    fn template_copies_defaults() {
        let mut with_default = RegisterDefinition::input("x");
        with_default.default = Some(TypedValue::from(7i32));
        let model = RegisterModel::new(vec![with_default]).unwrap();
        assert_eq!(model.template(), &[TypedValue::from(7i32)]);
    }
}
