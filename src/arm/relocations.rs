//! ARM relocation kinds.
//!
//! The r_type values are the ELF ARM ABI numbers; resolving them is the
//! linker's job.

use crate::encoding::relocation::RelocKind;
use object::elf;

/// 24-bit branch offset of `b` and `b<cond>`.
pub const IMM24: RelocKind = RelocKind {
    name: "imm24",
    elf_type: elf::R_ARM_JUMP24,
};

/// 24-bit offset of `bl`.
pub const CALL24: RelocKind = RelocKind {
    name: "call24",
    elf_type: elf::R_ARM_CALL,
};

/// 12-bit PC-relative offset of a literal load.
pub const LDR_IMM12: RelocKind = RelocKind {
    name: "ldr_imm12",
    elf_type: elf::R_ARM_PC13,
};

/// PC-relative address computed by `adr`.
pub const ADR_IMM12: RelocKind = RelocKind {
    name: "adr_imm12",
    elf_type: elf::R_ARM_ALU_PC_G0,
};

/// Absolute 32-bit address in a data word.
pub const ABS32: RelocKind = RelocKind {
    name: "abs32",
    elf_type: elf::R_ARM_ABS32,
};

pub const ALL: [RelocKind; 5] = [IMM24, CALL24, LDR_IMM12, ADR_IMM12, ABS32];
