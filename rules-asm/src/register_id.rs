use core::fmt;

/// Index of a register within a program's register file.
///
/// Backed by a `u8` so the register count invariant (`<= 256`) is provable
/// from the type alone once combined with [`crate::MAX_REGISTERS`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RegisterId(u8);

impl RegisterId {
    /// Wraps a raw byte as a register index.
    pub const fn new(index: u8) -> Self {
        Self(index)
    }

    /// Returns the raw byte value.
    pub const fn as_u8(self) -> u8 {
        self.0
    }

    /// Returns the register index as a `usize`, for vector indexing.
    pub const fn as_usize(self) -> usize {
        self.0 as usize
    }
}

impl From<u8> for RegisterId {
    fn from(value: u8) -> Self {
        Self(value)
    }
}

impl From<RegisterId> for usize {
    fn from(value: RegisterId) -> Self {
        value.as_usize()
    }
}

impl fmt::Display for RegisterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "r{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_u8() {
        let id = RegisterId::new(42);
        assert_eq!(id.as_u8(), 42);
        assert_eq!(id.as_usize(), 42usize);
    }
}
