//! A loaded program: the immutable, shareable result of decoding a
//! bytecode file, plus every cache derived from it once at load time.

use rules_asm::BddRef;

use crate::bdd;
use crate::filler::RegisterFiller;
use crate::function::FunctionRegistry;
use crate::interpreter::Program;
use crate::register::RegisterModel;
use crate::template::{Part, Template};
use crate::value::TypedValue;

/// A fully decoded, immutable program. Cheap to share across threads by
/// reference: nothing here is mutated after [`Bytecode::load`] returns.
pub struct Bytecode {
    pub(crate) code: Vec<u8>,
    pub(crate) conditions: Vec<usize>,
    pub(crate) results: Vec<usize>,
    pub(crate) register_model: RegisterModel,
    pub(crate) constants: Vec<TypedValue>,
    pub(crate) templates: Vec<Option<Template>>,
    pub(crate) functions: FunctionRegistry,
    pub(crate) function_names: Vec<String>,
    pub(crate) bdd_nodes: Vec<bdd::Node>,
    pub(crate) bdd_root: BddRef,
    pub(crate) filler: RegisterFiller,
}

impl Bytecode {
    /// Decodes a bytecode file against a host function registry, enforcing
    /// `max_nesting_depth` on every decoded constant. See
    /// [`crate::codec::decode`] for the wire format and validation rules.
    pub fn load(bytes: &[u8], functions: FunctionRegistry, max_nesting_depth: usize) -> Result<Self, crate::error::LoadError> {
        crate::codec::decode(bytes, functions, max_nesting_depth)
    }

    /// Re-encodes this program to its bit-exact wire representation. Exists
    /// to make the `encode(decode(b)) == b` round-trip property checkable;
    /// production bytecode is produced out of process.
    pub fn encode(&self) -> Vec<u8> {
        crate::codec::encode(self)
    }

    /// The register model: definitions plus derived caches.
    pub fn register_model(&self) -> &RegisterModel {
        &self.register_model
    }

    /// The register filler variant chosen for this program's register
    /// count.
    pub fn filler(&self) -> RegisterFiller {
        self.filler
    }

    /// Rebased offsets into `code`, one per modeled condition.
    pub fn conditions(&self) -> &[usize] {
        &self.conditions
    }

    /// Rebased offsets into `code`, one per modeled result.
    pub fn results(&self) -> &[usize] {
        &self.results
    }

    /// The BDD node table.
    pub fn bdd_nodes(&self) -> &[bdd::Node] {
        &self.bdd_nodes
    }

    /// The BDD root reference.
    pub fn bdd_root(&self) -> BddRef {
        self.bdd_root
    }

    /// Names resolved against the host registry at load time, in function
    /// table order. Exposed for diagnostics; the VM dispatches by index.
    pub fn function_names(&self) -> &[String] {
        &self.function_names
    }

    /// A borrowed view suitable for [`crate::interpreter::run`].
    pub fn program(&self) -> Program<'_> {
        Program {
            code: &self.code,
            constants: &self.constants,
            templates: &self.templates,
            functions: &self.functions,
        }
    }
}

/// Compiles a string constant into a [`Template`] if it contains `{...}`
/// placeholder syntax, otherwise returns `None` — it's a plain string.
pub(crate) fn compile_template(source: &str) -> Option<Template> {
    let mut parts = Vec::new();
    let mut literal = String::new();
    let mut found_any = false;
    let mut cursor = 0;
    let bytes = source.as_bytes();

    while cursor < bytes.len() {
        if bytes[cursor] == b'{' {
            if let Some(end) = source[cursor..].find('}') {
                if !literal.is_empty() {
                    parts.push(Part::Literal(std::mem::take(&mut literal)));
                }
                parts.push(Part::Placeholder);
                found_any = true;
                cursor += end + 1;
                continue;
            }
        }
        let ch = source[cursor..].chars().next().expect("cursor inside a char boundary");
        literal.push(ch);
        cursor += ch.len_utf8();
    }
    if !literal.is_empty() {
        parts.push(Part::Literal(literal));
    }

    found_any.then(|| Template::new(source, parts))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compiles_multi_placeholder_template() {
        let template = compile_template("https://{bucket}.s3.{region}.amazonaws.com").unwrap();
        assert_eq!(template.placeholder_count(), 2);
    }

    #[test]
    fn plain_string_is_not_a_template() {
        assert!(compile_template("https://svc.example/").is_none());
    }

    #[test]
    fn single_placeholder_template_is_detected() {
        let template = compile_template("{x}").unwrap();
        assert!(template.single_placeholder());
    }
}
