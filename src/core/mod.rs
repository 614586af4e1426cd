// This module groups the target-independent infrastructure every other part of the
// crate builds on: the error type shared by encoding, selection and assembly, the
// register model (physical registers grouped in banks, virtual registers handed out
// during selection, and the assignment trait an external allocator implements), the
// per-unit code generation context that emitters write into, and the assembler that
// turns a finished unit into bytes, relocations and an ELF object.

//! Core code generation infrastructure.
//!
//! # Key Components
//!
//! ## Errors (`error`)
//! - One error enum for every fatal condition of a compilation unit
//!
//! ## Registers (`register`)
//! - Physical registers identified by bank and id
//! - Virtual registers allocated monotonically per unit
//! - `RegisterAssignment` for the result of register allocation
//!
//! ## Code Generation Context (`context`)
//! - Instruction stream, labels and literal pool of one unit
//! - Register moves and pool loads realized through the target
//!
//! ## Assembly (`assembler`)
//! - Two-pass encoding with relocation records at final offsets
//! - ELF relocatable output via the `object` crate

pub mod assembler;
pub mod context;
pub mod error;
pub mod register;

pub use assembler::{MachineCode, ObjectWriter, SymbolBinding, SymbolDef};
pub use context::{CodeGenContext, Literal, PoolEntry, Unit, UnitItem, UnitStats};
pub use error::{CodegenError, CodegenResult};
pub use register::{AsmReg, NoAssignment, RegBank, RegClass, RegId, Register, RegisterAssignment, VirtualReg};
