/// The opcode set executed by the stack VM.
///
/// Each variant corresponds to one instruction in the code section. Operand
/// widths are documented per-variant; they are read directly from the byte
/// stream following the opcode byte, not packed into a fixed-width word.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::EnumIter)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum Opcode {
    /// Push constant pool entry `u8`.
    LoadConst = 0x00,
    /// Push constant pool entry `u16`.
    LoadConstW = 0x01,
    /// Push register `u8`'s value (may be null).
    LoadRegister = 0x02,
    /// Peek the top of stack, store into register `u8`. Does not pop.
    SetRegister = 0x03,

    /// Pop one value, push `true` iff it was null or boolean `false`.
    Not = 0x10,
    /// Pop one value, push `value != null`.
    IsSet = 0x11,
    /// Pop one value, push `value == true`.
    IsTrue = 0x12,
    /// Read register `u8` without perturbing the stack, push `value != null`.
    TestRegisterIsSet = 0x13,
    /// Read register `u8` without perturbing the stack, push `value == null`.
    TestRegisterNotSet = 0x14,
    /// Read register `u8` without perturbing the stack, push `value == true`.
    TestRegisterIsTrue = 0x15,
    /// Read register `u8` without perturbing the stack, push `value == false`.
    TestRegisterIsFalse = 0x16,

    /// Pop two values, push their structural equality.
    Equals = 0x20,
    /// Pop two strings, push their equality. Fails on type mismatch.
    StringEquals = 0x21,
    /// Pop two booleans, push their equality. Fails on type mismatch.
    BooleanEquals = 0x22,

    /// Pop 0 values, push an empty list.
    List0 = 0x30,
    /// Pop 1 value, push a one-element list.
    List1 = 0x31,
    /// Pop 2 values, push a two-element list, source order preserved.
    List2 = 0x32,
    /// Pop `u8` values, push a list, source order preserved.
    ListN = 0x33,
    /// Pop 0 entries, push an empty map.
    Map0 = 0x34,
    /// Pop 1 entry (value then key), push a one-entry map.
    Map1 = 0x35,
    /// Pop 2 entries, push a two-entry map.
    Map2 = 0x36,
    /// Pop 3 entries, push a three-entry map.
    Map3 = 0x37,
    /// Pop 4 entries, push a four-entry map.
    Map4 = 0x38,
    /// Pop `u8` entries (value then key, repeated), push a map.
    MapN = 0x39,

    /// Pop the placeholder count of the constant-pool template `u16` and
    /// push the resolved string.
    ResolveTemplate = 0x40,

    /// Pop 0 args, call function `u8`, push result.
    Fn0 = 0x50,
    /// Pop 1 arg, call function `u8`, push result.
    Fn1 = 0x51,
    /// Pop 2 args, call function `u8`, push result.
    Fn2 = 0x52,
    /// Pop 3 args, call function `u8`, push result.
    Fn3 = 0x53,
    /// Pop the registered arity of function `u8` args, call it, push result.
    Fn = 0x54,

    /// Pop an object, push the named property (`u16` constant-pool index),
    /// or null if absent.
    GetProperty = 0x60,
    /// Pop a list, push the element at index `u8`, or null if out of range.
    GetIndex = 0x61,
    /// Read register `u8` without popping it, push the named property
    /// (`u16` constant-pool index).
    GetPropertyReg = 0x62,
    /// Read register `u8` without popping it, push the element at index
    /// `u8`.
    GetIndexReg = 0x63,

    /// Pop a string, push the substring `[start, end)` (both `u8`), reversed
    /// if the `u8` reverse flag is non-zero. Out-of-range bounds yield null.
    Substring = 0x70,
    /// Pop a string, push whether it is a valid DNS host label.
    IsValidHostLabel = 0x71,
    /// Pop a string, push a parsed URI object, or null if it has a query.
    ParseUrl = 0x72,
    /// Pop a string, push its percent-encoded form.
    UriEncode = 0x73,

    /// Peek the top of stack; if truthy, jump `u16` bytes forward from the
    /// instruction after this one, leaving the value on the stack. If
    /// falsy, pop it and fall through.
    JtOrPop = 0x80,

    /// Pop one string, signal an error-terminal with that message.
    ReturnError = 0x90,
    /// Pop a URL, then (per the `u8` flag bits) a properties map and a
    /// headers map, and halt the fragment with a resolved endpoint.
    ReturnEndpoint = 0x91,
    /// Pop the top of stack and hand it back to the caller.
    ReturnValue = 0x92,
}

impl Opcode {
    /// Decodes a raw opcode byte, returning `None` for unassigned bytes.
    pub const fn from_byte(byte: u8) -> Option<Self> {
        use Opcode::*;
        Some(match byte {
            0x00 => LoadConst,
            0x01 => LoadConstW,
            0x02 => LoadRegister,
            0x03 => SetRegister,
            0x10 => Not,
            0x11 => IsSet,
            0x12 => IsTrue,
            0x13 => TestRegisterIsSet,
            0x14 => TestRegisterNotSet,
            0x15 => TestRegisterIsTrue,
            0x16 => TestRegisterIsFalse,
            0x20 => Equals,
            0x21 => StringEquals,
            0x22 => BooleanEquals,
            0x30 => List0,
            0x31 => List1,
            0x32 => List2,
            0x33 => ListN,
            0x34 => Map0,
            0x35 => Map1,
            0x36 => Map2,
            0x37 => Map3,
            0x38 => Map4,
            0x39 => MapN,
            0x40 => ResolveTemplate,
            0x50 => Fn0,
            0x51 => Fn1,
            0x52 => Fn2,
            0x53 => Fn3,
            0x54 => Fn,
            0x60 => GetProperty,
            0x61 => GetIndex,
            0x62 => GetPropertyReg,
            0x63 => GetIndexReg,
            0x70 => Substring,
            0x71 => IsValidHostLabel,
            0x72 => ParseUrl,
            0x73 => UriEncode,
            0x80 => JtOrPop,
            0x90 => ReturnError,
            0x91 => ReturnEndpoint,
            0x92 => ReturnValue,
            _ => return None,
        })
    }

    /// The raw wire byte for this opcode.
    pub const fn as_byte(self) -> u8 {
        self as u8
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn every_opcode_round_trips_through_its_byte() {
        for op in Opcode::iter() {
            assert_eq!(Opcode::from_byte(op.as_byte()), Some(op));
        }
    }

    #[test]
    fn unassigned_bytes_decode_to_none() {
        assert_eq!(Opcode::from_byte(0xff), None);
    }

    #[cfg(feature = "serde")]
    #[test]
    fn round_trips_through_serde_json() {
        let json = serde_json::to_string(&Opcode::JtOrPop).unwrap();
        let decoded: Opcode = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded, Opcode::JtOrPop);
    }
}
