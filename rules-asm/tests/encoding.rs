//! Exercises the wire-level vocabulary (`Opcode`, `BddRef`, `RegisterId`)
//! purely through its public API, parallel to how the teacher's own
//! instruction crate keeps an encoding round-trip suite separate from the
//! interpreter's tests.

use rules_asm::{BddRef, Decoded, MalformedRef, Opcode, RegisterId, RESULT_TERMINAL_BASE};
use strum::IntoEnumIterator;

#[test]
fn every_opcode_byte_round_trips() {
    for op in Opcode::iter() {
        let byte = op.as_byte();
        assert_eq!(Opcode::from_byte(byte), Some(op), "opcode {op:?} did not round-trip");
    }
}

#[test]
fn opcode_bytes_are_unique() {
    let bytes: Vec<u8> = Opcode::iter().map(Opcode::as_byte).collect();
    let mut sorted = bytes.clone();
    sorted.sort_unstable();
    sorted.dedup();
    assert_eq!(bytes.len(), sorted.len(), "two opcodes share a byte value");
}

#[test]
fn bdd_ref_terminal_encoding() {
    assert_eq!(BddRef::new(1).decode().unwrap(), Decoded::Terminal(true));
    assert_eq!(BddRef::new(-1).decode().unwrap(), Decoded::Terminal(false));
}

#[test]
fn bdd_ref_result_terminal_encoding() {
    let r = BddRef::new(RESULT_TERMINAL_BASE + 7);
    assert_eq!(r.decode().unwrap(), Decoded::Result(7));
}

#[test]
fn bdd_ref_node_and_complement_encoding() {
    assert_eq!(
        BddRef::new(2).decode().unwrap(),
        Decoded::Node { index: 0, complemented: false }
    );
    assert_eq!(
        BddRef::new(-2).decode().unwrap(),
        Decoded::Node { index: 0, complemented: true }
    );
}

#[test]
fn complemented_result_terminal_is_rejected() {
    let r = BddRef::new(-(RESULT_TERMINAL_BASE + 1));
    assert!(matches!(r.decode(), Err(MalformedRef::ComplementedResult(_))));
}

#[test]
fn register_id_round_trips_through_u8() {
    for raw in [0u8, 1, 127, 255] {
        let id = RegisterId::new(raw);
        assert_eq!(id.as_u8(), raw);
        assert_eq!(id.as_usize(), raw as usize);
    }
}
