//! Instruction selection.
//!
//! - [`patterns`] - tree shapes, rules and the grammar builder
//! - [`selector`] - the cost-based matcher
//! - [`target`] - what an architecture module provides

pub mod patterns;
pub mod selector;
pub mod target;

pub use patterns::{Emitter, Grammar, GrammarBuilder, NtValue, PatternRule, Predicate, RuleBuilder, Shape};
pub use selector::{select_function, Selection};
pub use target::Target;
