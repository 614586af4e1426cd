//! Interface an architecture module implements.

use super::patterns::Grammar;
use crate::core::error::CodegenResult;
use crate::core::register::{RegClass, Register};
use crate::encoding::relocation::RelocKind;
use crate::encoding::syntax::{parse_instruction, RegisterNames};
use crate::encoding::{Instruction, InstructionDesc};
use object::{Architecture, Endianness};
use std::sync::Arc;

/// Everything the architecture-independent code generator needs to know about
/// one target. Implementations are immutable and shared across units.
pub trait Target: Send + Sync {
    fn name(&self) -> &str;

    fn grammar(&self) -> &Grammar;

    /// Every instruction class, in the order assembly text is matched against.
    fn instructions(&self) -> &[Arc<InstructionDesc>];

    fn register_names(&self) -> &dyn RegisterNames;

    /// Class fresh registers are allocated from.
    fn general_class(&self) -> RegClass;

    /// Register-to-register copy.
    fn make_move(&self, dst: Register, src: Register) -> CodegenResult<Instruction>;

    /// PC-relative load of the literal pool entry at `label`.
    fn load_literal(&self, dst: Register, label: &str) -> CodegenResult<Instruction>;

    /// Literal pool word for an integer constant.
    fn literal_word(&self, value: i64) -> CodegenResult<Vec<u8>>;

    /// Relocation for pool words holding a symbol address.
    fn address_relocation(&self) -> RelocKind;

    /// Byte alignment of the literal pool.
    fn pool_alignment(&self) -> usize {
        4
    }

    /// Object file architecture and byte order.
    fn object_format(&self) -> (Architecture, Endianness);

    /// Read one line of assembly.
    fn parse_instruction(&self, text: &str) -> CodegenResult<Instruction> {
        parse_instruction(text, self.instructions(), self.register_names())
    }
}
