//! Architecture description primitives: tokens, instructions, relocations.
//!
//! Everything in here is immutable once built. An architecture module
//! constructs its tables at startup and shares them behind `Arc`.

pub mod instruction;
pub mod relocation;
pub mod syntax;
pub mod token;
pub mod transform;

pub use instruction::{
    ConstructorDesc, ConstructorValue, EncodeFn, Encoder, FieldPattern, Instruction, InstructionDesc,
    OperandDecl, OperandKind, OperandValue, PatternValue, Usage,
};
pub use relocation::{RelocKind, Relocation, RelocationDecl};
pub use syntax::{parse_instruction, RegisterNames, Syntax, SyntaxItem};
pub use token::{BitField, Endianness, Token, TokenLayout};
pub use transform::Transform;
