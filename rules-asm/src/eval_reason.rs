use core::fmt;

/// Why a single resolution's stack or BDD evaluation failed.
///
/// Kept separate from `rules_vm::error::EvaluationError` so the reason can be
/// cheaply `Copy`d into the richer error type alongside a `pc`, without this
/// crate depending on `rules-vm`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::EnumIter)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[non_exhaustive]
pub enum EvalReason {
    /// Popped an operand from an empty stack.
    StackUnderflow,
    /// Pushed past the configured maximum stack depth.
    StackOverflow,
    /// A byte at `pc` did not decode to any known opcode.
    UnknownOpcode,
    /// An operation required operands of a specific type and didn't get one,
    /// e.g. `STRING_EQUALS` on a non-string.
    TypeMismatch,
    /// A map literal had a non-string key, or attribute access indexed a
    /// list/map with the wrong kind of key.
    InvalidAccess,
    /// `RESOLVE_TEMPLATE` was handed a different number of values than the
    /// template declares placeholders for.
    TemplateArityMismatch,
    /// A registered function failed while being applied to its arguments.
    FunctionFailed,
    /// A BDD reference decoded as malformed: a complemented result terminal
    /// or a node index outside the table.
    MalformedBddRef,
    /// Decoded constant or register nesting exceeded the configured limit.
    NestingTooDeep,
}

impl fmt::Display for EvalReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::StackUnderflow => write!(f, "operand stack underflow"),
            Self::StackOverflow => write!(f, "operand stack overflow"),
            Self::UnknownOpcode => write!(f, "unknown opcode"),
            Self::TypeMismatch => write!(f, "operand type mismatch"),
            Self::InvalidAccess => write!(f, "invalid attribute or index access"),
            Self::TemplateArityMismatch => write!(f, "template placeholder arity mismatch"),
            Self::FunctionFailed => write!(f, "function application failed"),
            Self::MalformedBddRef => write!(f, "malformed BDD reference"),
            Self::NestingTooDeep => write!(f, "nesting depth limit exceeded"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for EvalReason {}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn every_variant_has_a_non_empty_message() {
        for reason in EvalReason::iter() {
            assert!(!reason.to_string().is_empty());
        }
    }
}
