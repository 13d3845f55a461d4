//! The three structured error taxonomies from §7, plus the unified
//! [`ResolveError`] a caller actually matches on.

use std::fmt;

pub use rules_asm::EvalReason as Reason;

/// Failure to load a bytecode program. Aborts loading; the caller never
/// gets a partially-loaded [`crate::bytecode::Bytecode`].
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    /// The first four bytes were not `b"RULE"`.
    #[error("bad magic: expected {expected:#010x}, got {found:#010x}")]
    BadMagic {
        /// The magic this crate expects.
        expected: u32,
        /// The magic actually found.
        found: u32,
    },
    /// The header's version is newer than this crate supports.
    #[error("unsupported version {found:#06x}, max supported is {max:#06x}")]
    UnsupportedVersion {
        /// Highest version this crate understands.
        max: u16,
        /// Version found in the header.
        found: u16,
    },
    /// A read past the end of the input buffer.
    #[error("truncated bytecode: expected {needed} more byte(s) at offset {offset}")]
    Truncated {
        /// Offset the read started at.
        offset: usize,
        /// Bytes needed to satisfy the read.
        needed: usize,
    },
    /// A section offset pointed outside the file, or offsets were not
    /// monotonically non-decreasing.
    #[error("section offset out of range: {0}")]
    BadSectionOffset(u32),
    /// A condition or result offset did not land inside the code section.
    #[error("offset {0} falls outside the code section")]
    OffsetOutsideCodeSection(u32),
    /// A constant's tag byte did not match any of the six known tags.
    #[error("unknown constant tag {0:#04x}")]
    UnknownConstantTag(u8),
    /// Decoded constant nesting exceeded [`rules_asm::MAX_CONSTANT_DEPTH`].
    #[error("constant nesting depth {found} exceeds limit {limit}")]
    ConstantTooDeep {
        /// Configured limit.
        limit: usize,
        /// Depth actually encountered.
        found: usize,
    },
    /// A register name appeared more than once.
    #[error("duplicate register name: {0}")]
    DuplicateRegisterName(String),
    /// A `temp` register declared a default or builtin, which is malformed
    /// per §3's register invariants.
    #[error("register {0:?} is temp but declares a default or builtin")]
    MalformedTempRegister(String),
    /// More registers were declared than [`rules_asm::MAX_REGISTERS`] allows.
    #[error("register count {found} exceeds the limit of {limit}")]
    TooManyRegisters {
        /// Configured limit.
        limit: usize,
        /// Count actually declared.
        found: usize,
    },
    /// One or more function names in the function table could not be
    /// resolved against the host's function registry. All missing names
    /// are reported together so a single load failure is actionable.
    #[error("unresolved function name(s): {0:?}")]
    MissingFunctions(Vec<String>),
}

impl From<crate::register::RegisterModelError> for LoadError {
    fn from(error: crate::register::RegisterModelError) -> Self {
        use crate::register::RegisterModelError as R;
        match error {
            R::MalformedTempRegister(name) => LoadError::MalformedTempRegister(name),
            R::DuplicateName(name) => LoadError::DuplicateRegisterName(name),
            R::TooMany { limit, found } => LoadError::TooManyRegisters { limit, found },
        }
    }
}

/// Failure inside a single resolution's VM or BDD evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EvaluationError {
    /// Why evaluation failed.
    pub reason: Reason,
    /// The program counter active when the failure was raised, if the
    /// failure happened inside the stack VM rather than the BDD driver.
    pub pc: Option<usize>,
}

impl EvaluationError {
    /// Builds an evaluation error, optionally carrying the active `pc`.
    pub fn new(reason: Reason, pc: Option<usize>) -> Self {
        Self { reason, pc }
    }
}

impl fmt::Display for EvaluationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.pc {
            Some(pc) => write!(f, "{} at pc={pc}", self.reason),
            None => write!(f, "{}", self.reason),
        }
    }
}

impl std::error::Error for EvaluationError {}

/// Failure while filling the register file from parameters and builtins.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ParameterError {
    /// A required register had no caller-supplied value, no builtin value,
    /// and no default, after filling ran.
    #[error("Missing required parameter: {0}")]
    MissingRequired(String),
    /// A caller-supplied parameter's type didn't match what the register
    /// expects structurally (only enforced where the register model
    /// records an expectation; most registers accept any `TypedValue`).
    #[error("parameter {name} has the wrong type")]
    WrongType {
        /// The parameter's declared name.
        name: String,
    },
    /// A map-valued parameter had a non-string key.
    #[error("map parameter {0} contains a non-string key")]
    NonStringKey(String),
}

/// The error a caller of [`crate::resolver::Resolver::resolve`] matches on.
#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    /// See [`ParameterError`].
    #[error(transparent)]
    Parameter(#[from] ParameterError),
    /// See [`EvaluationError`].
    #[error(transparent)]
    Evaluation(#[from] EvaluationError),
    /// The result fragment executed `RETURN_ERROR` with this message.
    #[error("{0}")]
    Modeled(String),
}

impl ResolveError {
    /// The `{kind, message, pc}` shape described in §7, for callers that
    /// want a stable structured representation rather than a `Display`
    /// string (e.g. to serialize into a diagnostic log line).
    pub fn as_structured(&self) -> StructuredError {
        match self {
            ResolveError::Parameter(e) => StructuredError {
                kind: "ParameterError",
                message: e.to_string(),
                pc: None,
            },
            ResolveError::Evaluation(e) => StructuredError {
                kind: "EvaluationError",
                message: e.reason.to_string(),
                pc: e.pc,
            },
            ResolveError::Modeled(message) => StructuredError {
                kind: "Modeled",
                message: message.clone(),
                pc: None,
            },
        }
    }
}

/// The stable `{kind, message, pc}` shape from §7.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructuredError {
    /// The taxonomy this error belongs to.
    pub kind: &'static str,
    /// A human-readable description.
    pub message: String,
    /// The active program counter, when known.
    pub pc: Option<usize>,
}

impl fmt::Display for StructuredError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.pc {
            Some(pc) => write!(f, "[{}] {} (pc={pc})", self.kind, self.message),
            None => write!(f, "[{}] {}", self.kind, self.message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_required_message_matches_spec_wording() {
        let err = ParameterError::MissingRequired("bucket".into());
        assert_eq!(err.to_string(), "Missing required parameter: bucket");
    }

    #[test]
    fn structured_error_carries_pc_when_present() {
        let err: ResolveError =
            EvaluationError::new(Reason::StackUnderflow, Some(7)).into();
        let structured = err.as_structured();
        assert_eq!(structured.kind, "EvaluationError");
        assert_eq!(structured.pc, Some(7));
    }
}
