//! Wire-level vocabulary for the endpoint rules bytecode VM.
//!
//! This crate holds only the things both the codec and the interpreter in
//! `rules-vm` need to agree on: the opcode set, the reason an evaluation
//! failed, the encoding of BDD references, and a bounded register index.
//! It owns no interpreter logic.

#![warn(missing_docs)]
#![deny(unsafe_code)]

mod bdd_ref;
mod eval_reason;
mod opcode;
mod register_id;

pub use bdd_ref::{BddRef, Decoded, MalformedRef, RESULT_TERMINAL_BASE};
pub use eval_reason::EvalReason;
pub use opcode::Opcode;
pub use register_id::RegisterId;

/// Magic bytes at the start of every bytecode file: ASCII `"RULE"`.
pub const MAGIC: u32 = 0x5255_4C45;

/// Highest bytecode format version this crate understands.
pub const VERSION: u16 = 0x0101;

/// Upper bound on the number of registers a program may declare.
pub const MAX_REGISTERS: usize = 256;

/// Upper bound on decoded constant nesting depth.
pub const MAX_CONSTANT_DEPTH: usize = 100;
