// isel is the machine-code generation core of a retargetable compiler: it turns an
// architecture-independent IR DAG into concrete machine instructions with bit-exact
// encodings and symbolic relocations for a linker to resolve. Architectures describe
// themselves declaratively (token layouts, instruction classes with syntax and field
// patterns, relocation kinds and a selection grammar) and the generic engine does the
// rest: cost-based tree-pattern selection with memoization of shared nodes, literal
// pool management, two-pass assembly and ELF object output.

//! isel - declarative instruction encoding and cost-based instruction selection.
//!
//! # Primary Usage
//!
//! ```ignore
//! use isel::arm::{Arm, ArmOptions, registers::GENERAL};
//! use isel::codegen::{select_function, Target};
//! use isel::core::NoAssignment;
//! use isel::ir::parser::parse_ir;
//! use bumpalo::Bump;
//!
//! let target = Arm::new(ArmOptions::default())?;
//! let arena = Bump::new();
//! let functions = parse_ir(text, &arena, target.register_names(), GENERAL)?;
//! let unit = select_function(&target, &functions[0])?;
//! let code = unit.assemble(&target, &NoAssignment)?;
//! ```
//!
//! # Architecture
//!
//! - [`core`] - errors, registers, code generation context, assembler
//! - [`encoding`] - token layouts, instruction classes, syntax, relocations
//! - [`ir`] - the IR DAG and its text format
//! - [`codegen`] - selection grammar and matcher
//! - [`arm`] - the 32-bit ARM target

pub mod arm;
pub mod codegen;
pub mod core;
pub mod encoding;
pub mod ir;

pub use crate::codegen::{select_function, Target};
pub use crate::core::{CodegenError, CodegenResult};
