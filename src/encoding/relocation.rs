//! Deferred symbolic fixups.
//!
//! Relocations are produced when a unit is assembled and consumed by an external
//! linker or object writer. Nothing in this crate ever resolves them.

use std::fmt;

/// Relocation kind declared by an architecture module.
///
/// Each architecture publishes a closed table of these as constants; `elf_type`
/// is the `r_type` written into ELF relocation entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RelocKind {
    pub name: &'static str,
    pub elf_type: u32,
}

impl fmt::Display for RelocKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// Relocation an instruction class requests for one of its label operands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelocationDecl {
    pub kind: RelocKind,
    pub operand: &'static str,
    pub addend: i64,
}

/// A fixup against the final, concatenated byte stream of a unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relocation {
    pub symbol: String,
    /// Byte offset of the referencing instruction (or pool word) in the stream.
    pub offset: u64,
    pub kind: RelocKind,
    pub addend: i64,
}

impl fmt::Display for Relocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#06x} {} {}", self.offset, self.kind, self.symbol)?;
        if self.addend != 0 {
            write!(f, "{:+}", self.addend)?;
        }
        Ok(())
    }
}
