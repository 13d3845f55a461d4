//! Hand-built bytecode fixtures for the end-to-end scenarios in spec.md
//! §8. Exists purely to make those scenarios testable without a checked-in
//! binary fixture; never used by production code.

use std::collections::HashMap;

use rules_asm::Opcode;

use crate::value::TypedValue;

/// Minimal big-endian byte assembler, parallel to (but independent of)
/// `crate::codec`'s production writer — kept separate so fixture-building
/// bugs can't mask codec bugs or vice versa.
#[derive(Default)]
struct Assembler {
    buf: Vec<u8>,
}

impl Assembler {
    fn u8(&mut self, v: u8) -> &mut Self {
        self.buf.push(v);
        self
    }
    fn u16(&mut self, v: u16) -> &mut Self {
        self.buf.extend_from_slice(&v.to_be_bytes());
        self
    }
    fn u32(&mut self, v: u32) -> &mut Self {
        self.buf.extend_from_slice(&v.to_be_bytes());
        self
    }
    fn i32(&mut self, v: i32) -> &mut Self {
        self.u32(v as u32)
    }
    fn string(&mut self, s: &str) -> &mut Self {
        self.u16(s.len() as u16);
        self.buf.extend_from_slice(s.as_bytes());
        self
    }
    fn len(&self) -> usize {
        self.buf.len()
    }
    fn patch_u32(&mut self, at: usize, v: u32) {
        self.buf[at..at + 4].copy_from_slice(&v.to_be_bytes());
    }
    fn constant_string(&mut self, s: &str) -> &mut Self {
        self.u8(1).string(s)
    }
}

struct Reservation(usize);

impl Assembler {
    fn reserve_u32(&mut self) -> Reservation {
        let at = self.len();
        self.u32(0);
        Reservation(at)
    }
}

/// Assembles a complete bytecode file from already-built sections. Every
/// fixture function below builds its `code`, register defs bytes, and
/// constant pool bytes independently, then calls this to stitch the
/// container together.
fn assemble(
    condition_count: u16,
    result_count: u16,
    register_count: u16,
    constant_count: u16,
    bdd_root: i32,
    condition_offsets_in_code: &[u32],
    result_offsets_in_code: &[u32],
    register_defs: &[u8],
    function_names: &[&str],
    bdd_nodes: &[(u32, i32, i32)],
    code: &[u8],
    constants: &[u8],
) -> Vec<u8> {
    let mut a = Assembler::default();
    a.u32(rules_asm::MAGIC);
    a.u16(rules_asm::VERSION);
    a.u16(condition_count);
    a.u16(result_count);
    a.u16(register_count);
    a.u16(constant_count);
    a.u16(function_names.len() as u16);
    a.u32(bdd_nodes.len() as u32);
    a.i32(bdd_root);
    let condition_table_offset_pos = a.reserve_u32();
    let result_table_offset_pos = a.reserve_u32();
    let function_table_offset_pos = a.reserve_u32();
    let constant_pool_offset_pos = a.reserve_u32();
    let bdd_table_offset_pos = a.reserve_u32();

    let condition_table_offset = a.len();
    let condition_positions: Vec<usize> = condition_offsets_in_code.iter().map(|_| a.reserve_u32().0).collect();

    let result_table_offset = a.len();
    let result_positions: Vec<usize> = result_offsets_in_code.iter().map(|_| a.reserve_u32().0).collect();

    a.buf.extend_from_slice(register_defs);

    let function_table_offset = a.len();
    for name in function_names {
        a.string(name);
    }

    let bdd_table_offset = a.len();
    for (var, high, low) in bdd_nodes {
        a.u32(*var).i32(*high).i32(*low);
    }

    let code_section_start = a.len();
    a.buf.extend_from_slice(code);

    let constant_pool_offset = a.len();
    a.buf.extend_from_slice(constants);

    a.patch_u32(condition_table_offset_pos.0, condition_table_offset as u32);
    a.patch_u32(result_table_offset_pos.0, result_table_offset as u32);
    a.patch_u32(function_table_offset_pos.0, function_table_offset as u32);
    a.patch_u32(constant_pool_offset_pos.0, constant_pool_offset as u32);
    a.patch_u32(bdd_table_offset_pos.0, bdd_table_offset as u32);
    for (pos, offset) in condition_positions.into_iter().zip(condition_offsets_in_code) {
        a.patch_u32(pos, code_section_start as u32 + offset);
    }
    for (pos, offset) in result_positions.into_iter().zip(result_offsets_in_code) {
        a.patch_u32(pos, code_section_start as u32 + offset);
    }

    a.buf
}

const RESULT_BASE: i32 = 100_000_000;

/// One input register `region` (not required), one condition
/// `isSet(region)`, one result returning a literal URL.
pub fn trivial_match_bytes() -> Vec<u8> {
    let mut code = Assembler::default();
    let condition_offset = code.len() as u32;
    code.u8(Opcode::TestRegisterIsSet.as_byte()).u8(0);
    code.u8(Opcode::ReturnValue.as_byte());
    let result_offset = code.len() as u32;
    code.u8(Opcode::LoadConst.as_byte()).u8(0);
    code.u8(Opcode::ReturnEndpoint.as_byte()).u8(0);

    let mut regs = Assembler::default();
    regs.string("region").u8(0).u8(0).u8(0).u8(0);

    let mut constants = Assembler::default();
    constants.constant_string("https://svc.example/");

    assemble(
        1,
        1,
        1,
        1,
        2,
        &[condition_offset],
        &[result_offset],
        &regs.buf,
        &[],
        &[(0, RESULT_BASE, -1)],
        &code.buf,
        &constants.buf,
    )
}

/// One required register `bucket` with no default/builtin: filling must
/// fail before any condition runs.
pub fn required_param_bytes() -> Vec<u8> {
    let mut code = Assembler::default();
    let condition_offset = code.len() as u32;
    code.u8(Opcode::TestRegisterIsSet.as_byte()).u8(0);
    code.u8(Opcode::ReturnValue.as_byte());
    let result_offset = code.len() as u32;
    code.u8(Opcode::LoadConst.as_byte()).u8(0);
    code.u8(Opcode::ReturnEndpoint.as_byte()).u8(0);

    let mut regs = Assembler::default();
    regs.string("bucket").u8(1).u8(0).u8(0).u8(0);

    let mut constants = Assembler::default();
    constants.constant_string("https://svc.example/");

    assemble(
        1,
        1,
        1,
        1,
        2,
        &[condition_offset],
        &[result_offset],
        &regs.buf,
        &[],
        &[(0, RESULT_BASE, -1)],
        &code.buf,
        &constants.buf,
    )
}

/// Two registers `bucket`, `region`; one unconditional result resolving
/// the template `"https://{bucket}.s3.{region}.amazonaws.com"`.
pub fn template_substitution_bytes() -> Vec<u8> {
    let mut code = Assembler::default();
    let condition_offset = code.len() as u32;
    code.u8(Opcode::LoadConst.as_byte()).u8(1); // push literal true
    code.u8(Opcode::ReturnValue.as_byte());
    let result_offset = code.len() as u32;
    code.u8(Opcode::LoadRegister.as_byte()).u8(0); // bucket
    code.u8(Opcode::LoadRegister.as_byte()).u8(1); // region
    code.u8(Opcode::ResolveTemplate.as_byte()).u16(0);
    code.u8(Opcode::ReturnEndpoint.as_byte()).u8(0);

    let mut regs = Assembler::default();
    regs.string("bucket").u8(0).u8(0).u8(0).u8(0);
    regs.string("region").u8(0).u8(0).u8(0).u8(0);

    let mut constants = Assembler::default();
    constants.constant_string("https://{bucket}.s3.{region}.amazonaws.com");
    constants.u8(3).u8(1); // bool true, used by the condition fragment

    assemble(
        1,
        1,
        2,
        2,
        2,
        &[condition_offset],
        &[result_offset],
        &regs.buf,
        &[],
        &[(0, RESULT_BASE, -1)],
        &code.buf,
        &constants.buf,
    )
}

/// Two conditions `c0 = isSet(useFips)`, `c1` (never touched when `c0` is
/// true). Root tests `c0`; the high branch is a result terminal with no
/// further conditions, the low branch tests `c1`.
pub fn short_circuit_bytes() -> Vec<u8> {
    let mut code = Assembler::default();
    let c0_offset = code.len() as u32;
    code.u8(Opcode::TestRegisterIsTrue.as_byte()).u8(0);
    code.u8(Opcode::ReturnValue.as_byte());
    let c1_offset = code.len() as u32;
    code.u8(Opcode::TestRegisterIsSet.as_byte()).u8(1);
    code.u8(Opcode::ReturnValue.as_byte());
    let fips_result_offset = code.len() as u32;
    code.u8(Opcode::LoadConst.as_byte()).u8(0);
    code.u8(Opcode::ReturnEndpoint.as_byte()).u8(0);
    let plain_result_offset = code.len() as u32;
    code.u8(Opcode::LoadConst.as_byte()).u8(1);
    code.u8(Opcode::ReturnEndpoint.as_byte()).u8(0);

    let mut regs = Assembler::default();
    regs.string("useFips").u8(0).u8(0).u8(0).u8(0);
    regs.string("endpoint").u8(0).u8(0).u8(0).u8(0);

    let mut constants = Assembler::default();
    constants.constant_string("https://fips.svc.example/");
    constants.constant_string("https://svc.example/");

    // node0 (root): var c0, high -> result0 (fips), low -> node1
    // node1: var c1, high -> result1 (plain), low -> FALSE
    let bdd_nodes = [(0u32, RESULT_BASE, 3i32), (1u32, RESULT_BASE + 1, -1i32)];

    assemble(
        2,
        2,
        2,
        2,
        2,
        &[c0_offset, c1_offset],
        &[fips_result_offset, plain_result_offset],
        &regs.buf,
        &[],
        &bdd_nodes,
        &code.buf,
        &constants.buf,
    )
}

/// One input register `input`, one temp register holding the `SUBSTRING`
/// result. The condition computes `SUBSTRING(0, 4, reverse=true)` on
/// `input`, stashes it in the temp register, and reports whether it was in
/// range; the matching result resolves a template from the temp register,
/// the other raises a modeled error.
pub fn substring_reverse_bytes() -> Vec<u8> {
    let mut code = Assembler::default();
    let condition_offset = code.len() as u32;
    code.u8(Opcode::LoadRegister.as_byte()).u8(0);
    code.u8(Opcode::Substring.as_byte()).u8(0).u8(4).u8(1);
    code.u8(Opcode::SetRegister.as_byte()).u8(1);
    code.u8(Opcode::IsSet.as_byte());
    code.u8(Opcode::ReturnValue.as_byte());
    let in_range_offset = code.len() as u32;
    code.u8(Opcode::LoadRegister.as_byte()).u8(1);
    code.u8(Opcode::ResolveTemplate.as_byte()).u16(0);
    code.u8(Opcode::ReturnEndpoint.as_byte()).u8(0);
    let out_of_range_offset = code.len() as u32;
    code.u8(Opcode::LoadConst.as_byte()).u8(1);
    code.u8(Opcode::ReturnError.as_byte());

    let mut regs = Assembler::default();
    regs.string("input").u8(0).u8(0).u8(0).u8(0);
    regs.string("__substr").u8(0).u8(1).u8(0).u8(0);

    let mut constants = Assembler::default();
    constants.constant_string("https://{0}/");
    constants.constant_string("substring out of range");

    assemble(
        1,
        2,
        2,
        2,
        2,
        &[condition_offset],
        &[in_range_offset, out_of_range_offset],
        &regs.buf,
        &[],
        &[(0, RESULT_BASE, RESULT_BASE + 1)],
        &code.buf,
        &constants.buf,
    )
}

/// One input register `input`, one temp register holding the `PARSE_URL`
/// result. The condition parses `input` and reports whether it succeeded
/// (fails when the string has a query component); the matching result
/// rebuilds the URL from the parsed URI's `scheme`/`authority`/`path`
/// fields, the other raises a modeled error.
pub fn parse_url_bytes() -> Vec<u8> {
    let mut code = Assembler::default();
    let condition_offset = code.len() as u32;
    code.u8(Opcode::LoadRegister.as_byte()).u8(0);
    code.u8(Opcode::ParseUrl.as_byte());
    code.u8(Opcode::SetRegister.as_byte()).u8(1);
    code.u8(Opcode::IsSet.as_byte());
    code.u8(Opcode::ReturnValue.as_byte());
    let parsed_offset = code.len() as u32;
    code.u8(Opcode::GetPropertyReg.as_byte()).u8(1).u16(0); // scheme
    code.u8(Opcode::GetPropertyReg.as_byte()).u8(1).u16(1); // authority
    code.u8(Opcode::GetPropertyReg.as_byte()).u8(1).u16(2); // path
    code.u8(Opcode::ResolveTemplate.as_byte()).u16(3);
    code.u8(Opcode::ReturnEndpoint.as_byte()).u8(0);
    let rejected_offset = code.len() as u32;
    code.u8(Opcode::LoadConst.as_byte()).u8(4);
    code.u8(Opcode::ReturnError.as_byte());

    let mut regs = Assembler::default();
    regs.string("input").u8(0).u8(0).u8(0).u8(0);
    regs.string("__parsed").u8(0).u8(1).u8(0).u8(0);

    let mut constants = Assembler::default();
    constants.constant_string("scheme");
    constants.constant_string("authority");
    constants.constant_string("path");
    constants.constant_string("{0}://{1}{2}");
    constants.constant_string("url has a query component");

    assemble(
        1,
        2,
        2,
        5,
        2,
        &[condition_offset],
        &[parsed_offset, rejected_offset],
        &regs.buf,
        &[],
        &[(0, RESULT_BASE, RESULT_BASE + 1)],
        &code.buf,
        &constants.buf,
    )
}

/// Parameters for the trivial-match and short-circuit fixtures, built as a
/// plain map for test call sites.
pub fn params(entries: &[(&str, TypedValue)]) -> HashMap<String, TypedValue> {
    entries.iter().cloned().map(|(k, v)| (k.to_owned(), v)).collect()
}
