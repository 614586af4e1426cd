//! 32-bit ARM (A32) target.
//!
//! - [`registers`] - core registers and their assembly names
//! - [`tokens`] - instruction word layouts
//! - [`instructions`] - instruction classes and typed constructors
//! - [`relocations`] - ELF relocation kinds
//! - [`patterns`] - selection grammar

pub mod instructions;
pub mod patterns;
pub mod registers;
pub mod relocations;
pub mod tokens;

pub use instructions::{derive_conditional, ArmInstructions, Condition};
pub use registers::{reg, ArmRegisterNames, GPR};

use crate::codegen::patterns::Grammar;
use crate::codegen::target::Target;
use crate::core::error::{CodegenError, CodegenResult};
use crate::core::register::{RegClass, Register};
use crate::encoding::relocation::RelocKind;
use crate::encoding::syntax::RegisterNames;
use crate::encoding::{Instruction, InstructionDesc};
use object::{Architecture, Endianness};
use std::sync::Arc;

/// Optional architecture features.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ArmOptions {
    /// Use `sdiv`/`udiv` instead of runtime division routines.
    pub hardware_divide: bool,
}

/// The ARM target: instruction table plus selection grammar.
pub struct Arm {
    options: ArmOptions,
    isa: Arc<ArmInstructions>,
    grammar: Grammar,
    names: ArmRegisterNames,
}

impl Arm {
    pub fn new(options: ArmOptions) -> CodegenResult<Self> {
        let isa = Arc::new(ArmInstructions::new()?);
        let grammar = patterns::grammar(&isa, &options)?;
        log::debug!(
            "arm target ready: {} instruction classes, {} rules, hardware divide {}",
            isa.all().len(),
            grammar.rules().len(),
            options.hardware_divide
        );
        Ok(Self {
            options,
            isa,
            grammar,
            names: ArmRegisterNames,
        })
    }

    pub fn options(&self) -> ArmOptions {
        self.options
    }

    pub fn isa(&self) -> &ArmInstructions {
        &self.isa
    }
}

impl std::fmt::Debug for Arm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Arm")
            .field("options", &self.options)
            .field("grammar", &self.grammar)
            .finish()
    }
}

impl Target for Arm {
    fn name(&self) -> &str {
        "arm"
    }

    fn grammar(&self) -> &Grammar {
        &self.grammar
    }

    fn instructions(&self) -> &[Arc<InstructionDesc>] {
        self.isa.all()
    }

    fn register_names(&self) -> &dyn RegisterNames {
        &self.names
    }

    fn general_class(&self) -> RegClass {
        GPR
    }

    fn make_move(&self, dst: Register, src: Register) -> CodegenResult<Instruction> {
        self.isa.mov_reg(dst, src)
    }

    fn load_literal(&self, dst: Register, label: &str) -> CodegenResult<Instruction> {
        self.isa.load_literal(dst, label)
    }

    fn literal_word(&self, value: i64) -> CodegenResult<Vec<u8>> {
        if !(i64::from(i32::MIN)..=i64::from(u32::MAX)).contains(&value) {
            return Err(CodegenError::EncodingRange {
                field: "literal".to_string(),
                value,
                constraint: "32-bit word".to_string(),
            });
        }
        Ok((value as u32).to_le_bytes().to_vec())
    }

    fn address_relocation(&self) -> RelocKind {
        relocations::ABS32
    }

    fn object_format(&self) -> (Architecture, Endianness) {
        (Architecture::Arm, Endianness::Little)
    }
}
