//! 32-bit ARM (A32) instruction word layouts.

use crate::core::error::CodegenResult;
use crate::encoding::token::{Endianness, TokenLayout};
use std::sync::Arc;

/// Every word layout used by the instruction table.
#[derive(Debug, Clone)]
pub struct ArmTokens {
    /// Data processing, register operand with immediate shift.
    pub dp_reg: Arc<TokenLayout>,
    /// Data processing, rotated 8-bit immediate.
    pub dp_imm: Arc<TokenLayout>,
    pub branch: Arc<TokenLayout>,
    pub blx: Arc<TokenLayout>,
    /// Push/pop of a register list.
    pub block: Arc<TokenLayout>,
    /// Load/store with 12-bit immediate offset.
    pub mem: Arc<TokenLayout>,
    /// Coprocessor register transfer (`mcr`/`mrc`).
    pub coproc: Arc<TokenLayout>,
    /// Condition field only; the rest is filled by explicit encoders.
    pub word: Arc<TokenLayout>,
}

impl ArmTokens {
    pub fn new() -> CodegenResult<Self> {
        let le = Endianness::Little;
        Ok(Self {
            dp_reg: TokenLayout::builder("dp_reg", 32, le)
                .field("cond", 28, 4)
                .field("opcode", 21, 7)
                .field("S", 20, 1)
                .field("Rn", 16, 4)
                .field("Rd", 12, 4)
                .field("shift_imm", 7, 5)
                .field("shift_typ", 5, 2)
                .field("b4", 4, 1)
                .field("Rm", 0, 4)
                .build()?,
            dp_imm: TokenLayout::builder("dp_imm", 32, le)
                .field("cond", 28, 4)
                .field("opcode", 21, 7)
                .field("s", 20, 1)
                .field("rn", 16, 4)
                .field("rd", 12, 4)
                .field("imm12", 0, 12)
                .build()?,
            branch: TokenLayout::builder("branch", 32, le)
                .field("cond", 28, 4)
                .field("opcode", 24, 4)
                .signed_field("imm24", 0, 24)
                .build()?,
            blx: TokenLayout::builder("blx", 32, le)
                .field("cond", 28, 4)
                .field("fixed", 4, 24)
                .field("Rm", 0, 4)
                .build()?,
            block: TokenLayout::builder("block", 32, le)
                .field("cond", 28, 4)
                .field("opcode", 16, 12)
                .field("reg_list", 0, 16)
                .build()?,
            mem: TokenLayout::builder("mem", 32, le)
                .field("cond", 28, 4)
                .field("op", 25, 3)
                .field("p", 24, 1)
                .field("u", 23, 1)
                .field("b", 22, 1)
                .field("w", 21, 1)
                .field("l", 20, 1)
                .field("rn", 16, 4)
                .field("rt", 12, 4)
                .field("imm12", 0, 12)
                .build()?,
            coproc: TokenLayout::builder("coproc", 32, le)
                .field("cond", 28, 4)
                .field("opcode", 24, 4)
                .field("opc1", 21, 3)
                .field("l", 20, 1)
                .field("crn", 16, 4)
                .field("rt", 12, 4)
                .field("coproc", 8, 4)
                .field("opc2", 5, 3)
                .field("b4", 4, 1)
                .field("crm", 0, 4)
                .build()?,
            word: TokenLayout::builder("word", 32, le).field("cond", 28, 4).build()?,
        })
    }
}
