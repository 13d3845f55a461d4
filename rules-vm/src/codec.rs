//! The binary bytecode container: header parsing, section layout, and the
//! tagged constant encoding, per §4.1/§6. All multi-byte integers are
//! big-endian; strings are length-prefixed UTF-8 with an unsigned-short
//! length.

use std::collections::HashMap;

use rules_asm::BddRef;

use crate::bdd::Node;
use crate::bytecode::{compile_template, Bytecode};
use crate::error::LoadError;
use crate::filler::RegisterFiller;
use crate::function::FunctionRegistry;
use crate::register::{RegisterDefinition, RegisterModel};
use crate::value::TypedValue;

const HEADER_LEN: usize = 44;

const TAG_NULL: u8 = 0;
const TAG_STRING: u8 = 1;
const TAG_INT: u8 = 2;
const TAG_BOOL: u8 = 3;
const TAG_LIST: u8 = 4;
const TAG_MAP: u8 = 5;

/// A cursor over a byte slice, tracking a read offset and rejecting reads
/// past the buffer end as a [`LoadError::Truncated`].
struct ByteReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn position(&self) -> usize {
        self.pos
    }

    fn seek(&mut self, pos: usize) -> Result<(), LoadError> {
        if pos > self.buf.len() {
            return Err(LoadError::Truncated { offset: pos, needed: 0 });
        }
        self.pos = pos;
        Ok(())
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], LoadError> {
        let end = self.pos.checked_add(n).ok_or(LoadError::Truncated { offset: self.pos, needed: n })?;
        if end > self.buf.len() {
            return Err(LoadError::Truncated {
                offset: self.pos,
                needed: end - self.buf.len(),
            });
        }
        let slice = &self.buf[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn read_u8(&mut self) -> Result<u8, LoadError> {
        Ok(self.take(1)?[0])
    }

    fn read_u16(&mut self) -> Result<u16, LoadError> {
        let bytes = self.take(2)?;
        Ok(u16::from_be_bytes([bytes[0], bytes[1]]))
    }

    fn read_u32(&mut self) -> Result<u32, LoadError> {
        let bytes = self.take(4)?;
        Ok(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    fn read_i32(&mut self) -> Result<i32, LoadError> {
        Ok(self.read_u32()? as i32)
    }

    fn read_string(&mut self) -> Result<String, LoadError> {
        let len = self.read_u16()? as usize;
        let bytes = self.take(len)?;
        String::from_utf8(bytes.to_vec()).map_err(|_| LoadError::Truncated {
            offset: self.pos - len,
            needed: 0,
        })
    }
}

struct ByteWriter {
    buf: Vec<u8>,
}

impl ByteWriter {
    fn new() -> Self {
        Self { buf: Vec::new() }
    }

    fn write_u8(&mut self, value: u8) {
        self.buf.push(value);
    }

    fn write_u16(&mut self, value: u16) {
        self.buf.extend_from_slice(&value.to_be_bytes());
    }

    fn write_u32(&mut self, value: u32) {
        self.buf.extend_from_slice(&value.to_be_bytes());
    }

    fn write_i32(&mut self, value: i32) {
        self.write_u32(value as u32);
    }

    fn write_string(&mut self, value: &str) {
        self.write_u16(value.len() as u16);
        self.buf.extend_from_slice(value.as_bytes());
    }

    fn patch_u32(&mut self, offset: usize, value: u32) {
        self.buf[offset..offset + 4].copy_from_slice(&value.to_be_bytes());
    }

    fn len(&self) -> usize {
        self.buf.len()
    }
}

fn read_constant(reader: &mut ByteReader<'_>, depth: usize, max_nesting_depth: usize) -> Result<TypedValue, LoadError> {
    if depth > max_nesting_depth {
        return Err(LoadError::ConstantTooDeep {
            limit: max_nesting_depth,
            found: depth,
        });
    }
    let tag = reader.read_u8()?;
    match tag {
        TAG_NULL => Ok(TypedValue::Null),
        TAG_STRING => Ok(TypedValue::String(reader.read_string()?)),
        TAG_INT => Ok(TypedValue::Int(reader.read_i32()?)),
        TAG_BOOL => Ok(TypedValue::Bool(reader.read_u8()? != 0)),
        TAG_LIST => {
            let count = reader.read_u16()? as usize;
            let mut items = Vec::with_capacity(count);
            for _ in 0..count {
                items.push(read_constant(reader, depth + 1, max_nesting_depth)?);
            }
            Ok(TypedValue::List(items))
        }
        TAG_MAP => {
            let count = reader.read_u16()? as usize;
            let mut entries = HashMap::with_capacity(count);
            for _ in 0..count {
                let key = reader.read_string()?;
                let value = read_constant(reader, depth + 1, max_nesting_depth)?;
                entries.insert(key, value);
            }
            Ok(TypedValue::Map(entries))
        }
        other => Err(LoadError::UnknownConstantTag(other)),
    }
}

fn write_constant(writer: &mut ByteWriter, value: &TypedValue) {
    match value {
        TypedValue::Null => writer.write_u8(TAG_NULL),
        TypedValue::String(s) => {
            writer.write_u8(TAG_STRING);
            writer.write_string(s);
        }
        TypedValue::Int(i) => {
            writer.write_u8(TAG_INT);
            writer.write_i32(*i);
        }
        TypedValue::Bool(b) => {
            writer.write_u8(TAG_BOOL);
            writer.write_u8(*b as u8);
        }
        TypedValue::List(items) => {
            writer.write_u8(TAG_LIST);
            writer.write_u16(items.len() as u16);
            for item in items {
                write_constant(writer, item);
            }
        }
        TypedValue::Map(entries) => {
            writer.write_u8(TAG_MAP);
            writer.write_u16(entries.len() as u16);
            for (key, value) in entries {
                writer.write_string(key);
                write_constant(writer, value);
            }
        }
        TypedValue::Uri(_) => {
            // URIs are never produced by the constant pool, only at
            // runtime by PARSE_URL; nothing reaches this arm from a
            // well-formed program.
            writer.write_u8(TAG_NULL);
        }
    }
}

/// Decodes a bytecode file against a host function registry, per §4.1/§6.
/// `max_nesting_depth` bounds decoded constant/value nesting; it is
/// clamped to [`rules_asm::MAX_CONSTANT_DEPTH`] so a caller can tighten
/// the limit but never loosen it past the wire format's own ceiling.
pub fn decode(bytes: &[u8], mut functions: FunctionRegistry, max_nesting_depth: usize) -> Result<Bytecode, LoadError> {
    let max_nesting_depth = max_nesting_depth.min(rules_asm::MAX_CONSTANT_DEPTH);
    if bytes.len() < HEADER_LEN {
        return Err(LoadError::Truncated {
            offset: bytes.len(),
            needed: HEADER_LEN - bytes.len(),
        });
    }

    let mut reader = ByteReader::new(bytes);
    let magic = reader.read_u32()?;
    if magic != rules_asm::MAGIC {
        return Err(LoadError::BadMagic {
            expected: rules_asm::MAGIC,
            found: magic,
        });
    }
    let version = reader.read_u16()?;
    if version > rules_asm::VERSION {
        return Err(LoadError::UnsupportedVersion {
            max: rules_asm::VERSION,
            found: version,
        });
    }

    let condition_count = reader.read_u16()? as usize;
    let result_count = reader.read_u16()? as usize;
    let register_count = reader.read_u16()? as usize;
    let constant_count = reader.read_u16()? as usize;
    let function_count = reader.read_u16()? as usize;
    let bdd_node_count = reader.read_u32()? as usize;
    let bdd_root = BddRef::new(reader.read_i32()?);

    let condition_table_offset = reader.read_u32()? as usize;
    let result_table_offset = reader.read_u32()? as usize;
    let function_table_offset = reader.read_u32()? as usize;
    let constant_pool_offset = reader.read_u32()? as usize;
    let bdd_table_offset = reader.read_u32()? as usize;

    let len = bytes.len();
    for offset in [
        condition_table_offset,
        result_table_offset,
        function_table_offset,
        bdd_table_offset,
        constant_pool_offset,
    ] {
        if offset > len {
            return Err(LoadError::BadSectionOffset(offset as u32));
        }
    }
    if !(condition_table_offset <= result_table_offset
        && result_table_offset <= function_table_offset
        && function_table_offset <= bdd_table_offset
        && bdd_table_offset <= constant_pool_offset)
    {
        return Err(LoadError::BadSectionOffset(bdd_table_offset as u32));
    }

    reader.seek(condition_table_offset)?;
    let mut condition_offsets = Vec::with_capacity(condition_count);
    for _ in 0..condition_count {
        condition_offsets.push(reader.read_u32()? as usize);
    }

    reader.seek(result_table_offset)?;
    let mut result_offsets = Vec::with_capacity(result_count);
    for _ in 0..result_count {
        result_offsets.push(reader.read_u32()? as usize);
    }

    let mut register_defs = Vec::with_capacity(register_count);
    for _ in 0..register_count {
        let name = reader.read_string()?;
        let required = reader.read_u8()? != 0;
        let temp = reader.read_u8()? != 0;
        let has_default = reader.read_u8()? != 0;
        let default = if has_default { Some(read_constant(&mut reader, 0, max_nesting_depth)?) } else { None };
        let has_builtin = reader.read_u8()? != 0;
        let builtin = if has_builtin { Some(reader.read_string()?) } else { None };
        register_defs.push(RegisterDefinition {
            name,
            required,
            default,
            builtin,
            temp,
        });
    }

    reader.seek(function_table_offset)?;
    let mut function_names = Vec::with_capacity(function_count);
    for _ in 0..function_count {
        function_names.push(reader.read_string()?);
    }

    let missing: Vec<String> = function_names
        .iter()
        .filter(|name| functions.find(name).is_none())
        .cloned()
        .collect();
    if !missing.is_empty() {
        return Err(LoadError::MissingFunctions(missing));
    }
    // Reindex the registry so function-table positions line up with FN
    // opcode operands: position i in `function_names` must resolve to
    // index i via `functions.get`.
    let reordered = {
        let mut ordered = FunctionRegistry::default();
        for name in &function_names {
            let idx = functions.find(name).expect("checked above");
            let implementation = functions
                .take(idx)
                .expect("index returned by find is always present");
            ordered.register_boxed(implementation);
        }
        ordered
    };
    functions = reordered;

    reader.seek(bdd_table_offset)?;
    let mut bdd_nodes = Vec::with_capacity(bdd_node_count);
    for _ in 0..bdd_node_count {
        let var_idx = reader.read_u32()?;
        let high = BddRef::new(reader.read_i32()?);
        let low = BddRef::new(reader.read_i32()?);
        bdd_nodes.push(Node { var_idx, high, low });
    }
    let code_section_start = reader.position();
    if code_section_start > constant_pool_offset {
        return Err(LoadError::BadSectionOffset(constant_pool_offset as u32));
    }
    let code = bytes[code_section_start..constant_pool_offset].to_vec();

    let rebase = |offset: usize| -> Result<usize, LoadError> {
        let rebased = offset
            .checked_sub(code_section_start)
            .ok_or(LoadError::OffsetOutsideCodeSection(offset as u32))?;
        if rebased >= code.len() {
            return Err(LoadError::OffsetOutsideCodeSection(offset as u32));
        }
        Ok(rebased)
    };
    let conditions: Vec<usize> = condition_offsets
        .into_iter()
        .map(rebase)
        .collect::<Result<_, _>>()?;
    let results: Vec<usize> = result_offsets.into_iter().map(rebase).collect::<Result<_, _>>()?;

    reader.seek(constant_pool_offset)?;
    let mut constants = Vec::with_capacity(constant_count);
    for _ in 0..constant_count {
        constants.push(read_constant(&mut reader, 0, max_nesting_depth)?);
    }
    for constant in &constants {
        if constant.nesting_depth() > max_nesting_depth {
            return Err(LoadError::ConstantTooDeep {
                limit: max_nesting_depth,
                found: constant.nesting_depth(),
            });
        }
    }

    let templates: Vec<Option<crate::template::Template>> = constants
        .iter()
        .map(|c| c.as_str().and_then(compile_template))
        .collect();

    let register_model = RegisterModel::new(register_defs)?;
    let filler = RegisterFiller::for_register_count(register_model.len());

    Ok(Bytecode {
        code,
        conditions,
        results,
        register_model,
        constants,
        templates,
        functions,
        function_names,
        bdd_nodes,
        bdd_root,
        filler,
    })
}

/// Re-encodes a loaded program to its bit-exact wire representation.
pub fn encode(bytecode: &Bytecode) -> Vec<u8> {
    let mut writer = ByteWriter::new();

    // Header, patched once section lengths are known.
    writer.write_u32(rules_asm::MAGIC);
    writer.write_u16(rules_asm::VERSION);
    writer.write_u16(bytecode.conditions.len() as u16);
    writer.write_u16(bytecode.results.len() as u16);
    writer.write_u16(bytecode.register_model.len() as u16);
    writer.write_u16(bytecode.constants.len() as u16);
    writer.write_u16(bytecode.function_names.len() as u16);
    writer.write_u32(bytecode.bdd_nodes.len() as u32);
    writer.write_i32(bytecode.bdd_root.raw());
    let condition_table_offset_pos = writer.len();
    writer.write_u32(0);
    let result_table_offset_pos = writer.len();
    writer.write_u32(0);
    let function_table_offset_pos = writer.len();
    writer.write_u32(0);
    let constant_pool_offset_pos = writer.len();
    writer.write_u32(0);
    let bdd_table_offset_pos = writer.len();
    writer.write_u32(0);
    debug_assert_eq!(writer.len(), HEADER_LEN);

    let condition_table_offset = writer.len();
    // Condition/result offsets on the wire are absolute file offsets into
    // the code section; rebase back from the code-relative offsets we
    // carry in memory once the code section's file position is known
    // below. Write placeholders now, patch after.
    let condition_offset_positions: Vec<usize> = (0..bytecode.conditions.len())
        .map(|_| {
            let pos = writer.len();
            writer.write_u32(0);
            pos
        })
        .collect();

    let result_table_offset = writer.len();
    let result_offset_positions: Vec<usize> = (0..bytecode.results.len())
        .map(|_| {
            let pos = writer.len();
            writer.write_u32(0);
            pos
        })
        .collect();

    for def in bytecode.register_model.defs() {
        writer.write_string(&def.name);
        writer.write_u8(def.required as u8);
        writer.write_u8(def.temp as u8);
        writer.write_u8(def.default.is_some() as u8);
        if let Some(default) = &def.default {
            write_constant(&mut writer, default);
        }
        writer.write_u8(def.builtin.is_some() as u8);
        if let Some(builtin) = &def.builtin {
            writer.write_string(builtin);
        }
    }

    let function_table_offset = writer.len();
    for name in &bytecode.function_names {
        writer.write_string(name);
    }

    let bdd_table_offset = writer.len();
    for node in &bytecode.bdd_nodes {
        writer.write_u32(node.var_idx);
        writer.write_i32(node.high.raw());
        writer.write_i32(node.low.raw());
    }

    let code_section_start = writer.len();
    writer.buf.extend_from_slice(&bytecode.code);

    let constant_pool_offset = writer.len();
    for constant in &bytecode.constants {
        write_constant(&mut writer, constant);
    }

    writer.patch_u32(condition_table_offset_pos, condition_table_offset as u32);
    writer.patch_u32(result_table_offset_pos, result_table_offset as u32);
    writer.patch_u32(function_table_offset_pos, function_table_offset as u32);
    writer.patch_u32(constant_pool_offset_pos, constant_pool_offset as u32);
    writer.patch_u32(bdd_table_offset_pos, bdd_table_offset as u32);

    for (pos, rebased) in condition_offset_positions.into_iter().zip(&bytecode.conditions) {
        writer.patch_u32(pos, (code_section_start + rebased) as u32);
    }
    for (pos, rebased) in result_offset_positions.into_iter().zip(&bytecode.results) {
        writer.patch_u32(pos, (code_section_start + rebased) as u32);
    }

    writer.buf
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::register::RegisterDefinition;

    use crate::test_support::trivial_match_bytes;

    #[test]
    fn decodes_trivial_match_program() {
        let bytes = trivial_match_bytes();
        let bytecode = Bytecode::load(&bytes, FunctionRegistry::with_standard_functions(), rules_asm::MAX_CONSTANT_DEPTH).unwrap();
        assert_eq!(bytecode.conditions().len(), 1);
        assert_eq!(bytecode.results().len(), 1);
        assert_eq!(bytecode.register_model().len(), 1);
    }

    #[test]
    fn round_trips_bit_for_bit() {
        let bytes = trivial_match_bytes();
        let bytecode = Bytecode::load(&bytes, FunctionRegistry::with_standard_functions(), rules_asm::MAX_CONSTANT_DEPTH).unwrap();
        let reencoded = bytecode.encode();
        assert_eq!(reencoded, bytes);
    }

    #[test]
    fn rejects_bad_magic() {
        let mut bytes = trivial_match_bytes();
        bytes[0] = 0;
        let err = Bytecode::load(&bytes, FunctionRegistry::with_standard_functions(), rules_asm::MAX_CONSTANT_DEPTH).unwrap_err();
        assert!(matches!(err, LoadError::BadMagic { .. }));
    }

    #[test]
    fn rejects_missing_function_names() {
        let mut bytes = trivial_match_bytes();
        // bump function count in the header without adding a name or
        // resizing any offset -- guaranteed to miss resolution.
        bytes[14..16].copy_from_slice(&1u16.to_be_bytes());
        let err = Bytecode::load(&bytes, FunctionRegistry::with_standard_functions(), rules_asm::MAX_CONSTANT_DEPTH);
        assert!(err.is_err());
    }

    #[test]
    fn duplicate_register_names_fail_to_load() {
        let defs = vec![RegisterDefinition::input("a"), RegisterDefinition::input("a")];
        assert!(RegisterModel::new(defs).is_err());
    }

    fn nested_list_bytes(depth: usize) -> Vec<u8> {
        // A chain of depth-1 lists around a single string leaf, so
        // `nesting_depth()` equals `depth`.
        let mut writer = ByteWriter::new();
        fn write(writer: &mut ByteWriter, remaining: usize) {
            if remaining == 0 {
                writer.write_u8(TAG_STRING);
                writer.write_string("leaf");
            } else {
                writer.write_u8(TAG_LIST);
                writer.write_u16(1);
                write(writer, remaining - 1);
            }
        }
        write(&mut writer, depth);
        writer.buf
    }

    #[test]
    fn a_tightened_max_nesting_depth_rejects_what_the_default_allows() {
        let bytes = nested_list_bytes(3);
        let mut reader = ByteReader::new(&bytes);
        assert!(read_constant(&mut reader, 0, rules_asm::MAX_CONSTANT_DEPTH).is_ok());

        let mut reader = ByteReader::new(&bytes);
        let err = read_constant(&mut reader, 0, 2).unwrap_err();
        assert!(matches!(err, LoadError::ConstantTooDeep { limit: 2, .. }));
    }

    #[test]
    fn decode_clamps_a_max_nesting_depth_above_the_wire_ceiling() {
        // A caller passing something above MAX_CONSTANT_DEPTH must not
        // loosen the format's own ceiling.
        let bytes = trivial_match_bytes();
        let bytecode = Bytecode::load(
            &bytes,
            FunctionRegistry::with_standard_functions(),
            rules_asm::MAX_CONSTANT_DEPTH + 50,
        )
        .unwrap();
        assert_eq!(bytecode.conditions().len(), 1);
    }
}
