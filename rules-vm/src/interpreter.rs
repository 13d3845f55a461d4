//! The stack VM: opcode dispatch over a program counter into a code
//! section, with an operand stack bounded by a configured depth.

use std::collections::HashMap;

use rules_asm::{Opcode, RegisterId};

use crate::error::{EvaluationError, Reason};
use crate::function::FunctionRegistry;
use crate::template::Template;
use crate::value::TypedValue;

/// Borrowed view of everything a fragment needs to run, without pulling in
/// [`crate::bytecode::Bytecode`] itself — keeps this module testable on
/// hand-built code slices.
#[derive(Clone, Copy)]
pub struct Program<'a> {
    /// The code section, with condition/result offsets already rebased
    /// relative to its start.
    pub code: &'a [u8],
    /// The constant pool, indexed by `LOAD_CONST`/`LOAD_CONST_W`/`GET_PROPERTY`/`RESOLVE_TEMPLATE`.
    pub constants: &'a [TypedValue],
    /// Compiled templates, index-aligned with `constants`: `Some` only at
    /// indices holding a string constant that contains placeholder syntax.
    pub templates: &'a [Option<Template>],
    /// Resolved function table.
    pub functions: &'a FunctionRegistry,
}

/// Per-resolution scratch state: registers, operand stack, and condition
/// memoization. Reset (by construction) at the start of each resolution;
/// never shared across threads.
pub struct Evaluator {
    registers: Vec<TypedValue>,
    stack: Vec<TypedValue>,
    max_stack_depth: usize,
    condition_cache: HashMap<u32, bool>,
}

impl Evaluator {
    /// Builds a fresh evaluator over an already-filled register vector.
    pub fn new(registers: Vec<TypedValue>, max_stack_depth: usize) -> Self {
        Self {
            registers,
            stack: Vec::new(),
            max_stack_depth,
            condition_cache: HashMap::new(),
        }
    }

    /// Rebuilds this evaluator for a new resolution: the register vector is
    /// replaced, while the stack and condition-memoization table are
    /// cleared in place rather than reallocated, so a caller holding one
    /// `Evaluator` per thread across many resolutions reuses their backing
    /// allocations instead of paying a fresh `Vec`/`HashMap` per call.
    pub fn reset(&mut self, registers: Vec<TypedValue>, max_stack_depth: usize) {
        self.registers = registers;
        self.max_stack_depth = max_stack_depth;
        self.stack.clear();
        self.condition_cache.clear();
    }

    /// The register vector, for inspection after a resolution completes.
    pub fn registers(&self) -> &[TypedValue] {
        &self.registers
    }

    fn push(&mut self, pc: usize, value: TypedValue) -> Result<(), EvaluationError> {
        if self.stack.len() >= self.max_stack_depth {
            return Err(EvaluationError::new(Reason::StackOverflow, Some(pc)));
        }
        self.stack.push(value);
        Ok(())
    }

    fn pop(&mut self, pc: usize) -> Result<TypedValue, EvaluationError> {
        self.stack
            .pop()
            .ok_or_else(|| EvaluationError::new(Reason::StackUnderflow, Some(pc)))
    }

    fn peek(&self, pc: usize) -> Result<&TypedValue, EvaluationError> {
        self.stack
            .last()
            .ok_or_else(|| EvaluationError::new(Reason::StackUnderflow, Some(pc)))
    }

    fn register(&self, reg: RegisterId) -> &TypedValue {
        self.registers.get(reg.as_usize()).unwrap_or(&TypedValue::Null)
    }

    fn set_register(&mut self, reg: RegisterId, value: TypedValue) {
        if let Some(slot) = self.registers.get_mut(reg.as_usize()) {
            *slot = value;
        }
    }
}

/// How a fragment ended.
#[derive(Debug, Clone, PartialEq)]
pub enum Halt {
    /// `RETURN_VALUE`: the value handed back to the BDD driver.
    Value(TypedValue),
    /// `RETURN_ENDPOINT`: the resolved URL plus optional properties/headers.
    Endpoint {
        /// The resolved URL.
        uri: String,
        /// Resolved properties, if `flags` requested them.
        properties: Option<HashMap<String, TypedValue>>,
        /// Resolved headers, if `flags` requested them.
        headers: Option<HashMap<String, Vec<String>>>,
    },
    /// `RETURN_ERROR`: the modeled error message.
    Error(String),
}

/// Runs the fragment starting at `entry` (an offset into `program.code`)
/// until a `RETURN_*` opcode halts it.
#[tracing::instrument(name = "fragment", skip(program, evaluator), fields(entry))]
pub fn run(program: Program<'_>, evaluator: &mut Evaluator, entry: usize) -> Result<Halt, EvaluationError> {
    let mut pc = entry;
    loop {
        let opcode_pc = pc;
        let byte = fetch_u8(program.code, &mut pc, opcode_pc)?;
        let opcode = Opcode::from_byte(byte)
            .ok_or_else(|| EvaluationError::new(Reason::UnknownOpcode, Some(opcode_pc)))?;
        tracing::trace!(pc = opcode_pc, ?opcode, "dispatch");

        match opcode {
            Opcode::LoadConst => {
                let idx = fetch_u8(program.code, &mut pc, opcode_pc)? as usize;
                let value = constant(program, idx, opcode_pc)?;
                evaluator.push(opcode_pc, value)?;
            }
            Opcode::LoadConstW => {
                let idx = fetch_u16(program.code, &mut pc, opcode_pc)? as usize;
                let value = constant(program, idx, opcode_pc)?;
                evaluator.push(opcode_pc, value)?;
            }
            Opcode::LoadRegister => {
                let reg = RegisterId::new(fetch_u8(program.code, &mut pc, opcode_pc)?);
                let value = evaluator.register(reg).clone();
                evaluator.push(opcode_pc, value)?;
            }
            Opcode::SetRegister => {
                let reg = RegisterId::new(fetch_u8(program.code, &mut pc, opcode_pc)?);
                let value = evaluator.peek(opcode_pc)?.clone();
                evaluator.set_register(reg, value);
            }

            Opcode::Not => {
                let value = evaluator.pop(opcode_pc)?;
                evaluator.push(opcode_pc, TypedValue::Bool(!value.is_truthy()))?;
            }
            Opcode::IsSet => {
                let value = evaluator.pop(opcode_pc)?;
                evaluator.push(opcode_pc, TypedValue::Bool(value.is_set()))?;
            }
            Opcode::IsTrue => {
                let value = evaluator.pop(opcode_pc)?;
                evaluator.push(opcode_pc, TypedValue::Bool(value == TypedValue::Bool(true)))?;
            }
            Opcode::TestRegisterIsSet => {
                let reg = RegisterId::new(fetch_u8(program.code, &mut pc, opcode_pc)?);
                let value = evaluator.register(reg).is_set();
                evaluator.push(opcode_pc, TypedValue::Bool(value))?;
            }
            Opcode::TestRegisterNotSet => {
                let reg = RegisterId::new(fetch_u8(program.code, &mut pc, opcode_pc)?);
                let value = !evaluator.register(reg).is_set();
                evaluator.push(opcode_pc, TypedValue::Bool(value))?;
            }
            Opcode::TestRegisterIsTrue => {
                let reg = RegisterId::new(fetch_u8(program.code, &mut pc, opcode_pc)?);
                let value = *evaluator.register(reg) == TypedValue::Bool(true);
                evaluator.push(opcode_pc, TypedValue::Bool(value))?;
            }
            Opcode::TestRegisterIsFalse => {
                let reg = RegisterId::new(fetch_u8(program.code, &mut pc, opcode_pc)?);
                let value = *evaluator.register(reg) == TypedValue::Bool(false);
                evaluator.push(opcode_pc, TypedValue::Bool(value))?;
            }

            Opcode::Equals => {
                let b = evaluator.pop(opcode_pc)?;
                let a = evaluator.pop(opcode_pc)?;
                evaluator.push(opcode_pc, TypedValue::Bool(a == b))?;
            }
            Opcode::StringEquals => {
                let b = evaluator.pop(opcode_pc)?;
                let a = evaluator.pop(opcode_pc)?;
                let (a, b) = (
                    a.as_str().ok_or_else(|| type_mismatch(opcode_pc))?.to_owned(),
                    b.as_str().ok_or_else(|| type_mismatch(opcode_pc))?.to_owned(),
                );
                evaluator.push(opcode_pc, TypedValue::Bool(a == b))?;
            }
            Opcode::BooleanEquals => {
                let b = evaluator.pop(opcode_pc)?;
                let a = evaluator.pop(opcode_pc)?;
                let (a, b) = (
                    a.as_bool().ok_or_else(|| type_mismatch(opcode_pc))?,
                    b.as_bool().ok_or_else(|| type_mismatch(opcode_pc))?,
                );
                evaluator.push(opcode_pc, TypedValue::Bool(a == b))?;
            }

            Opcode::List0 => evaluator.push(opcode_pc, TypedValue::List(Vec::new()))?,
            Opcode::List1 => {
                let list = pop_n_reversed(evaluator, opcode_pc, 1)?;
                evaluator.push(opcode_pc, TypedValue::List(list))?;
            }
            Opcode::List2 => {
                let list = pop_n_reversed(evaluator, opcode_pc, 2)?;
                evaluator.push(opcode_pc, TypedValue::List(list))?;
            }
            Opcode::ListN => {
                let n = fetch_u8(program.code, &mut pc, opcode_pc)? as usize;
                let list = pop_n_reversed(evaluator, opcode_pc, n)?;
                evaluator.push(opcode_pc, TypedValue::List(list))?;
            }
            Opcode::Map0 => evaluator.push(opcode_pc, TypedValue::Map(HashMap::new()))?,
            Opcode::Map1 => {
                let map = pop_n_entries(evaluator, opcode_pc, 1)?;
                evaluator.push(opcode_pc, TypedValue::Map(map))?;
            }
            Opcode::Map2 => {
                let map = pop_n_entries(evaluator, opcode_pc, 2)?;
                evaluator.push(opcode_pc, TypedValue::Map(map))?;
            }
            Opcode::Map3 => {
                let map = pop_n_entries(evaluator, opcode_pc, 3)?;
                evaluator.push(opcode_pc, TypedValue::Map(map))?;
            }
            Opcode::Map4 => {
                let map = pop_n_entries(evaluator, opcode_pc, 4)?;
                evaluator.push(opcode_pc, TypedValue::Map(map))?;
            }
            Opcode::MapN => {
                let n = fetch_u8(program.code, &mut pc, opcode_pc)? as usize;
                let map = pop_n_entries(evaluator, opcode_pc, n)?;
                evaluator.push(opcode_pc, TypedValue::Map(map))?;
            }

            Opcode::ResolveTemplate => {
                let idx = fetch_u16(program.code, &mut pc, opcode_pc)? as usize;
                let template = program
                    .templates
                    .get(idx)
                    .and_then(|t| t.as_ref())
                    .ok_or_else(|| EvaluationError::new(Reason::TemplateArityMismatch, Some(opcode_pc)))?;
                let args = pop_n_reversed(evaluator, opcode_pc, template.placeholder_count())?;
                let resolved = template.resolve(&args).map_err(|e| EvaluationError::new(e.reason, Some(opcode_pc)))?;
                evaluator.push(opcode_pc, TypedValue::from(resolved))?;
            }

            Opcode::Fn0 | Opcode::Fn1 | Opcode::Fn2 | Opcode::Fn3 | Opcode::Fn => {
                let func_idx = fetch_u8(program.code, &mut pc, opcode_pc)? as usize;
                let function = program
                    .functions
                    .get(func_idx)
                    .ok_or_else(|| EvaluationError::new(Reason::FunctionFailed, Some(opcode_pc)))?;
                let arity = match opcode {
                    Opcode::Fn0 => 0,
                    Opcode::Fn1 => 1,
                    Opcode::Fn2 => 2,
                    Opcode::Fn3 => 3,
                    Opcode::Fn => function.arity(),
                    _ => unreachable!(),
                };
                let args = pop_n_reversed(evaluator, opcode_pc, arity)?;
                let result = function
                    .apply(&args)
                    .map_err(|e| EvaluationError::new(e.reason, Some(opcode_pc)))?;
                evaluator.push(opcode_pc, result)?;
            }

            Opcode::GetProperty => {
                let const_idx = fetch_u16(program.code, &mut pc, opcode_pc)? as usize;
                let path = constant(program, const_idx, opcode_pc)?;
                let path = path.as_str().ok_or_else(|| type_mismatch(opcode_pc))?.to_owned();
                let object = evaluator.pop(opcode_pc)?;
                evaluator.push(opcode_pc, get_path(&object, &path))?;
            }
            Opcode::GetIndex => {
                let index = fetch_u8(program.code, &mut pc, opcode_pc)? as usize;
                let object = evaluator.pop(opcode_pc)?;
                let value = object.as_list().and_then(|l| l.get(index)).cloned().unwrap_or(TypedValue::Null);
                evaluator.push(opcode_pc, value)?;
            }
            Opcode::GetPropertyReg => {
                let reg = RegisterId::new(fetch_u8(program.code, &mut pc, opcode_pc)?);
                let const_idx = fetch_u16(program.code, &mut pc, opcode_pc)? as usize;
                let path = constant(program, const_idx, opcode_pc)?;
                let path = path.as_str().ok_or_else(|| type_mismatch(opcode_pc))?.to_owned();
                let value = get_path(evaluator.register(reg), &path);
                evaluator.push(opcode_pc, value)?;
            }
            Opcode::GetIndexReg => {
                let reg = RegisterId::new(fetch_u8(program.code, &mut pc, opcode_pc)?);
                let index = fetch_u8(program.code, &mut pc, opcode_pc)? as usize;
                let value = evaluator
                    .register(reg)
                    .as_list()
                    .and_then(|l| l.get(index))
                    .cloned()
                    .unwrap_or(TypedValue::Null);
                evaluator.push(opcode_pc, value)?;
            }

            Opcode::Substring => {
                let start = fetch_u8(program.code, &mut pc, opcode_pc)?;
                let end = fetch_u8(program.code, &mut pc, opcode_pc)?;
                let reverse = fetch_u8(program.code, &mut pc, opcode_pc)? != 0;
                let input = evaluator.pop(opcode_pc)?;
                let input = input.as_str().ok_or_else(|| type_mismatch(opcode_pc))?;
                let value = match crate::uri::substring(input, start, end, reverse) {
                    Some(s) => TypedValue::from(s),
                    None => TypedValue::Null,
                };
                evaluator.push(opcode_pc, value)?;
            }
            Opcode::IsValidHostLabel => {
                let input = evaluator.pop(opcode_pc)?;
                let input = input.as_str().ok_or_else(|| type_mismatch(opcode_pc))?;
                let value = TypedValue::Bool(crate::uri::is_valid_host_label(input, false));
                evaluator.push(opcode_pc, value)?;
            }
            Opcode::ParseUrl => {
                let input = evaluator.pop(opcode_pc)?;
                let input = input.as_str().ok_or_else(|| type_mismatch(opcode_pc))?;
                let value = match crate::uri::parse_url(input) {
                    Some(uri) => TypedValue::Uri(uri),
                    None => TypedValue::Null,
                };
                evaluator.push(opcode_pc, value)?;
            }
            Opcode::UriEncode => {
                let input = evaluator.pop(opcode_pc)?;
                let input = input.as_str().ok_or_else(|| type_mismatch(opcode_pc))?;
                let value = TypedValue::from(crate::uri::uri_encode(input));
                evaluator.push(opcode_pc, value)?;
            }

            Opcode::JtOrPop => {
                let offset = fetch_u16(program.code, &mut pc, opcode_pc)?;
                let truthy = evaluator.peek(opcode_pc)?.is_truthy();
                if truthy {
                    pc = pc
                        .checked_add(offset as usize)
                        .ok_or_else(|| EvaluationError::new(Reason::UnknownOpcode, Some(opcode_pc)))?;
                } else {
                    evaluator.pop(opcode_pc)?;
                }
            }

            Opcode::ReturnError => {
                let message = evaluator.pop(opcode_pc)?;
                let message = message.as_str().ok_or_else(|| type_mismatch(opcode_pc))?.to_owned();
                return Ok(Halt::Error(message));
            }
            Opcode::ReturnEndpoint => {
                let flags = fetch_u8(program.code, &mut pc, opcode_pc)?;
                let uri_value = evaluator.pop(opcode_pc)?;
                let uri = uri_value.as_str().ok_or_else(|| type_mismatch(opcode_pc))?.to_owned();
                let properties = if flags & 0b10 != 0 {
                    let popped = evaluator.pop(opcode_pc)?;
                    Some(popped.as_map().ok_or_else(|| type_mismatch(opcode_pc))?.clone())
                } else {
                    None
                };
                let headers = if flags & 0b01 != 0 {
                    let popped = evaluator.pop(opcode_pc)?;
                    Some(to_headers(&popped).ok_or_else(|| type_mismatch(opcode_pc))?)
                } else {
                    None
                };
                return Ok(Halt::Endpoint { uri, properties, headers });
            }
            Opcode::ReturnValue => {
                let value = evaluator.pop(opcode_pc)?;
                return Ok(Halt::Value(value));
            }
        }
    }
}

/// Runs the condition fragment at `conditions[var_idx]`, memoizing the
/// Boolean result for the rest of this resolution.
pub fn eval_condition(
    program: Program<'_>,
    evaluator: &mut Evaluator,
    conditions: &[usize],
    var_idx: u32,
) -> Result<bool, EvaluationError> {
    if let Some(cached) = evaluator.condition_cache.get(&var_idx) {
        return Ok(*cached);
    }
    let entry = *conditions
        .get(var_idx as usize)
        .ok_or_else(|| EvaluationError::new(Reason::MalformedBddRef, None))?;
    let result = match run(program, evaluator, entry)? {
        Halt::Value(value) => value.is_truthy(),
        _ => return Err(EvaluationError::new(Reason::TypeMismatch, None)),
    };
    evaluator.condition_cache.insert(var_idx, result);
    Ok(result)
}

fn constant(program: Program<'_>, idx: usize, pc: usize) -> Result<TypedValue, EvaluationError> {
    program
        .constants
        .get(idx)
        .cloned()
        .ok_or_else(|| EvaluationError::new(Reason::InvalidAccess, Some(pc)))
}

fn type_mismatch(pc: usize) -> EvaluationError {
    EvaluationError::new(Reason::TypeMismatch, Some(pc))
}

fn fetch_u8(code: &[u8], pc: &mut usize, opcode_pc: usize) -> Result<u8, EvaluationError> {
    let byte = *code
        .get(*pc)
        .ok_or_else(|| EvaluationError::new(Reason::UnknownOpcode, Some(opcode_pc)))?;
    *pc += 1;
    Ok(byte)
}

fn fetch_u16(code: &[u8], pc: &mut usize, opcode_pc: usize) -> Result<u16, EvaluationError> {
    let hi = fetch_u8(code, pc, opcode_pc)?;
    let lo = fetch_u8(code, pc, opcode_pc)?;
    Ok(u16::from_be_bytes([hi, lo]))
}

fn pop_n_reversed(evaluator: &mut Evaluator, pc: usize, n: usize) -> Result<Vec<TypedValue>, EvaluationError> {
    let mut values = Vec::with_capacity(n);
    for _ in 0..n {
        values.push(evaluator.pop(pc)?);
    }
    values.reverse();
    Ok(values)
}

fn pop_n_entries(evaluator: &mut Evaluator, pc: usize, n: usize) -> Result<HashMap<String, TypedValue>, EvaluationError> {
    let mut map = HashMap::with_capacity(n);
    for _ in 0..n {
        let value = evaluator.pop(pc)?;
        let key = evaluator.pop(pc)?;
        let key = key.as_str().ok_or_else(|| EvaluationError::new(Reason::InvalidAccess, Some(pc)))?.to_owned();
        map.insert(key, value);
    }
    Ok(map)
}

fn to_headers(value: &TypedValue) -> Option<HashMap<String, Vec<String>>> {
    let map = value.as_map()?;
    let mut headers = HashMap::with_capacity(map.len());
    for (key, value) in map {
        let list = value.as_list()?;
        let values: Option<Vec<String>> = list.iter().map(|v| v.as_str().map(str::to_owned)).collect();
        headers.insert(key.clone(), values?);
    }
    Some(headers)
}

enum Segment {
    Field(String),
    Index(usize),
}

fn parse_path(path: &str) -> Vec<Segment> {
    let mut segments = Vec::new();
    for part in path.split('.') {
        match part.find('[') {
            None => {
                if !part.is_empty() {
                    segments.push(Segment::Field(part.to_owned()));
                }
            }
            Some(bracket_idx) => {
                let field = &part[..bracket_idx];
                if !field.is_empty() {
                    segments.push(Segment::Field(field.to_owned()));
                }
                let mut remainder = &part[bracket_idx..];
                while let Some(stripped) = remainder.strip_prefix('[') {
                    match stripped.find(']') {
                        Some(close) => {
                            if let Ok(index) = stripped[..close].parse::<usize>() {
                                segments.push(Segment::Index(index));
                            }
                            remainder = &stripped[close + 1..];
                        }
                        None => break,
                    }
                }
            }
        }
    }
    segments
}

/// Walks a dotted/bracketed attribute path (`"a.b[2].c"`) against a value:
/// dotted segments are map lookups, bracketed integers are list lookups,
/// and a leading field name against a [`crate::uri::Uri`] reads its fixed
/// field set. Any missing or mistyped step yields `null`.
fn get_path(value: &TypedValue, path: &str) -> TypedValue {
    let mut current = value.clone();
    for segment in parse_path(path) {
        current = match (&segment, &current) {
            (Segment::Field(name), TypedValue::Map(map)) => map.get(name).cloned().unwrap_or(TypedValue::Null),
            (Segment::Field(name), TypedValue::Uri(uri)) => uri.field(name).unwrap_or(TypedValue::Null),
            (Segment::Index(index), TypedValue::List(list)) => list.get(*index).cloned().unwrap_or(TypedValue::Null),
            _ => TypedValue::Null,
        };
        if current == TypedValue::Null {
            break;
        }
    }
    current
}
