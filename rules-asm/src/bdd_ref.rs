/// A signed BDD edge reference, as stored in a [`Node`](crate) `high`/`low`
/// field or as the program's root reference.
///
/// Encoding (see the file format in the crate-level docs of `rules-vm`):
/// - `+1` is the TRUE terminal, `-1` is the FALSE terminal.
/// - `r >= 2` addresses node `r - 1`.
/// - `r <= -2` is a complemented edge to node `|r| - 1`.
/// - `r >= 100_000_000` is a result terminal, result index `r - 100_000_000`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BddRef(i32);

/// Smallest raw value that denotes a result terminal rather than a node edge.
pub const RESULT_TERMINAL_BASE: i32 = 100_000_000;

/// The decoded shape of a [`BddRef`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decoded {
    /// A terminal truth value, after any complement on the edge leading here
    /// has already been applied.
    Terminal(bool),
    /// A result terminal: evaluation is done, emit `results[index]`.
    Result(u32),
    /// An internal node to descend into, and whether this edge complements
    /// the subtree's Boolean meaning.
    Node { index: u32, complemented: bool },
}

impl BddRef {
    /// Wraps a raw signed reference as read from the bytecode.
    pub const fn new(raw: i32) -> Self {
        Self(raw)
    }

    /// The raw signed value, as it appears on the wire.
    pub const fn raw(self) -> i32 {
        self.0
    }

    /// Decodes this reference into the three cases a BDD walk can land on.
    ///
    /// Complementing a result terminal is malformed; callers must reject
    /// `Err` before treating the reference as well-formed input.
    pub fn decode(self) -> Result<Decoded, MalformedRef> {
        let raw = self.0;
        if raw == 1 {
            return Ok(Decoded::Terminal(true));
        }
        if raw == -1 {
            return Ok(Decoded::Terminal(false));
        }
        if raw >= RESULT_TERMINAL_BASE {
            return Ok(Decoded::Result((raw - RESULT_TERMINAL_BASE) as u32));
        }
        if raw <= -RESULT_TERMINAL_BASE {
            return Err(MalformedRef::ComplementedResult(raw));
        }
        let magnitude = raw.unsigned_abs();
        if magnitude < 2 {
            return Err(MalformedRef::OutOfRange(raw));
        }
        Ok(Decoded::Node {
            index: magnitude - 2,
            complemented: raw < 0,
        })
    }
}

impl From<i32> for BddRef {
    fn from(raw: i32) -> Self {
        Self::new(raw)
    }
}

/// A reference that does not fit any of the documented encodings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MalformedRef {
    /// A result terminal was reached through a complemented edge.
    ComplementedResult(i32),
    /// The magnitude of the reference is too small to address a node.
    OutOfRange(i32),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_terminals() {
        assert_eq!(BddRef::new(1).decode().unwrap(), Decoded::Terminal(true));
        assert_eq!(BddRef::new(-1).decode().unwrap(), Decoded::Terminal(false));
    }

    #[test]
    fn decodes_result_terminal() {
        let r = BddRef::new(RESULT_TERMINAL_BASE + 3);
        assert_eq!(r.decode().unwrap(), Decoded::Result(3));
    }

    #[test]
    fn decodes_plain_and_complemented_nodes() {
        assert_eq!(
            BddRef::new(2).decode().unwrap(),
            Decoded::Node {
                index: 0,
                complemented: false
            }
        );
        assert_eq!(
            BddRef::new(-2).decode().unwrap(),
            Decoded::Node {
                index: 0,
                complemented: true
            }
        );
        assert_eq!(
            BddRef::new(5).decode().unwrap(),
            Decoded::Node {
                index: 3,
                complemented: false
            }
        );
    }

    #[test]
    fn rejects_complemented_result() {
        let r = BddRef::new(-(RESULT_TERMINAL_BASE + 1));
        assert!(matches!(r.decode(), Err(MalformedRef::ComplementedResult(_))));
    }
}
