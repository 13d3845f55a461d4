//! Walks the BDD with complement-edge semantics, asking a condition
//! evaluator callback for each tested variable and memoizing its answer
//! within one resolution.

use rules_asm::{BddRef, Decoded};

use crate::error::{EvaluationError, Reason};

/// One BDD node: the condition index it tests, and the high/low edges to
/// follow depending on that condition's truth value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Node {
    /// Index into `Bytecode::conditions` of the condition this node tests.
    pub var_idx: u32,
    /// Edge followed when the condition is true.
    pub high: BddRef,
    /// Edge followed when the condition is false.
    pub low: BddRef,
}

/// Outcome of walking the BDD to a terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The FALSE terminal was reached: no rule matched.
    NoMatch,
    /// A result terminal was reached: execute `results[index]`.
    Result(u32),
}

/// Walks `nodes` starting at `root`, calling `eval_condition(var_idx)` for
/// each node's variable the walk actually visits — conditions off the walked
/// path are never evaluated, since some conditions have side effects (a
/// `PARSE_URL` stashed into a register via `SET_REGISTER`) that later
/// conditions or the selected result depend on.
pub fn walk(
    nodes: &[Node],
    root: BddRef,
    mut eval_condition: impl FnMut(u32) -> Result<bool, EvaluationError>,
) -> Result<Outcome, EvaluationError> {
    let mut current = root;
    let mut parity = false;

    loop {
        let decoded = current
            .decode()
            .map_err(|_| EvaluationError::new(Reason::MalformedBddRef, None))?;
        match decoded {
            Decoded::Terminal(value) => {
                // Terminal references must be result refs (§8); a bare TRUE
                // terminal is reachable on the wire but never legitimate —
                // only FALSE (no-match) is a valid plain terminal.
                return if value ^ parity {
                    Err(EvaluationError::new(Reason::MalformedBddRef, None))
                } else {
                    Ok(Outcome::NoMatch)
                };
            }
            Decoded::Result(index) => {
                if parity {
                    return Err(EvaluationError::new(Reason::MalformedBddRef, None));
                }
                return Ok(Outcome::Result(index));
            }
            Decoded::Node { index, complemented } => {
                let node = nodes
                    .get(index as usize)
                    .ok_or_else(|| EvaluationError::new(Reason::MalformedBddRef, None))?;
                let cond = eval_condition(node.var_idx)?;
                current = if cond { node.high } else { node.low };
                parity ^= complemented;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RESULT_BASE: i32 = rules_asm::RESULT_TERMINAL_BASE;

    #[test]
    fn false_terminal_is_no_match() {
        let nodes = vec![Node {
            var_idx: 0,
            high: BddRef::new(RESULT_BASE),
            low: BddRef::new(-1),
        }];
        let outcome = walk(&nodes, BddRef::new(2), |_| Ok(false)).unwrap();
        assert_eq!(outcome, Outcome::NoMatch);
    }

    #[test]
    fn result_terminal_selects_result_index() {
        let nodes = vec![Node {
            var_idx: 0,
            high: BddRef::new(RESULT_BASE),
            low: BddRef::new(-1),
        }];
        let outcome = walk(&nodes, BddRef::new(2), |_| Ok(true)).unwrap();
        assert_eq!(outcome, Outcome::Result(0));
    }

    #[test]
    fn complement_edge_flips_boolean_terminal_meaning() {
        // root is a complemented reference to a node whose high/low are both
        // plain boolean terminals (no result attached). Complementing flips
        // which terminal value the walk reports as "no match".
        let nodes = vec![Node {
            var_idx: 7,
            high: BddRef::new(-1),
            low: BddRef::new(1),
        }];
        let mut seen = None;
        // cond false -> descend to `low` (terminal +1); accumulated parity
        // from the complemented root flips it to logical false -> no-match.
        let outcome = walk(&nodes, BddRef::new(-2), |var| {
            seen = Some(var);
            Ok(false)
        })
        .unwrap();
        assert_eq!(seen, Some(7));
        assert_eq!(outcome, Outcome::NoMatch);
    }

    #[test]
    fn parity_carried_into_a_result_terminal_is_malformed() {
        // root complements a node whose high edge leads straight to a
        // result: taking that branch with non-zero accumulated parity is
        // rejected, even though the result ref itself isn't complemented.
        let nodes = vec![Node {
            var_idx: 0,
            high: BddRef::new(RESULT_BASE),
            low: BddRef::new(-1),
        }];
        let err = walk(&nodes, BddRef::new(-2), |_| Ok(true)).unwrap_err();
        assert_eq!(err.reason, Reason::MalformedBddRef);
    }

    #[test]
    fn short_circuits_conditions_not_on_the_walked_path() {
        // Two-node BDD: root tests c0; high branch is a result (no further
        // conditions), low branch tests c1. With c0 == true we must never
        // ask for c1.
        let nodes = vec![
            Node {
                var_idx: 0,
                high: BddRef::new(RESULT_BASE),
                low: BddRef::new(3),
            },
            Node {
                var_idx: 1,
                high: BddRef::new(RESULT_BASE + 1),
                low: BddRef::new(-1),
            },
        ];
        let mut asked = Vec::new();
        let outcome = walk(&nodes, BddRef::new(2), |var| {
            asked.push(var);
            Ok(var == 0)
        })
        .unwrap();
        assert_eq!(asked, vec![0]);
        assert_eq!(outcome, Outcome::Result(0));
    }
}
