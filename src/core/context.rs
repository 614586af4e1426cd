// This module provides the code generation context that emitters write into while
// one unit (a function) is being selected. CodeGenContext is owned by exactly one
// selection run: it hands out fresh virtual registers numbered after those the IR
// already uses, records emitted instructions and placed labels in order, interns
// literal-pool constants so each distinct value is stored once, remembers external
// symbols referenced by calls, and expands the two pseudo-operations every target
// needs (register move and load-from-pool) through the Target trait. Statistics
// are kept alongside in UnitStats, similar to a compilation session. finish()
// freezes everything into a Unit, which the assembler turns into bytes.

//! Per-unit code generation state.

use super::error::CodegenResult;
use super::register::{RegClass, Register, VirtualReg};
use crate::codegen::target::Target;
use crate::encoding::Instruction;
use hashbrown::HashMap;
use std::collections::BTreeSet;
use std::fmt;

/// Constant stored in the literal pool.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Literal {
    Int(i64),
    /// Address of a symbol, fixed up by the linker.
    Address(String),
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::Int(value) => write!(f, "{}", value),
            Literal::Address(symbol) => f.write_str(symbol),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolEntry {
    pub label: String,
    pub literal: Literal,
}

/// One element of the emitted stream.
#[derive(Debug, Clone, PartialEq)]
pub enum UnitItem {
    Label(String),
    Instruction(Instruction),
}

/// Statistics for one unit.
#[derive(Debug, Default, Clone)]
pub struct UnitStats {
    /// Instructions emitted.
    pub instructions: usize,

    /// Fresh virtual registers handed out.
    pub registers_allocated: usize,

    /// Literal pool requests, including ones satisfied by an existing entry.
    pub literal_requests: usize,

    /// Rules applied during selection.
    pub rules_applied: usize,

    /// Sum of the size annotations of applied rules.
    pub estimated_size: u64,

    /// Sum of the cycle annotations of applied rules.
    pub estimated_cycles: u64,

    /// Count of each mnemonic emitted.
    pub mnemonic_counts: HashMap<String, usize>,
}

impl fmt::Display for UnitStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Unit Statistics:")?;
        writeln!(f, "  Instructions emitted: {}", self.instructions)?;
        writeln!(f, "  Registers allocated: {}", self.registers_allocated)?;
        writeln!(f, "  Literal requests: {}", self.literal_requests)?;
        writeln!(f, "  Rules applied: {}", self.rules_applied)?;
        writeln!(f, "  Estimated size: {} bytes", self.estimated_size)?;
        writeln!(f, "  Estimated cycles: {}", self.estimated_cycles)?;

        if !self.mnemonic_counts.is_empty() {
            writeln!(f, "  Instruction breakdown:")?;
            let mut sorted: Vec<_> = self.mnemonic_counts.iter().collect();
            sorted.sort_by(|a, b| b.1.cmp(a.1).then(a.0.cmp(b.0)));
            for (mnemonic, count) in sorted.into_iter().take(10) {
                writeln!(f, "    {}: {}", mnemonic, count)?;
            }
        }
        Ok(())
    }
}

/// Output of selection for one unit, ready to be assembled.
#[derive(Debug, Clone)]
pub struct Unit {
    pub name: String,
    pub items: Vec<UnitItem>,
    pub pool: Vec<PoolEntry>,
    /// Symbols referenced but defined elsewhere.
    pub externals: BTreeSet<String>,
    /// One past the highest virtual register index in use.
    pub vreg_count: u32,
    pub stats: UnitStats,
}

impl Unit {
    pub fn instructions(&self) -> impl Iterator<Item = &Instruction> {
        self.items.iter().filter_map(|item| match item {
            UnitItem::Instruction(ins) => Some(ins),
            UnitItem::Label(_) => None,
        })
    }

    /// Labels placed in the instruction stream, in order.
    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.items.iter().filter_map(|item| match item {
            UnitItem::Label(label) => Some(label.as_str()),
            UnitItem::Instruction(_) => None,
        })
    }

    /// Placed labels referenced by instructions, i.e. jump targets.
    pub fn jump_targets(&self) -> BTreeSet<&str> {
        let placed: BTreeSet<&str> = self.labels().collect();
        self.instructions()
            .filter_map(|ins| ins.relocation_target())
            .map(|(symbol, _)| symbol)
            .filter(|symbol| placed.contains(symbol))
            .collect()
    }
}

/// Code generation state for one unit.
pub struct CodeGenContext<'t> {
    target: &'t dyn Target,
    name: String,
    items: Vec<UnitItem>,
    pool: Vec<PoolEntry>,
    pool_index: HashMap<Literal, usize>,
    externals: BTreeSet<String>,
    next_vreg: u32,
    stats: UnitStats,
}

impl<'t> CodeGenContext<'t> {
    /// `first_vreg` is the first virtual register index not used by the IR.
    pub fn new(target: &'t dyn Target, name: &str, first_vreg: u32) -> Self {
        Self {
            target,
            name: name.to_string(),
            items: Vec::new(),
            pool: Vec::new(),
            pool_index: HashMap::new(),
            externals: BTreeSet::new(),
            next_vreg: first_vreg,
            stats: UnitStats::default(),
        }
    }

    pub fn target(&self) -> &'t dyn Target {
        self.target
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Fresh virtual register of `class`; never returned twice.
    pub fn new_register(&mut self, class: RegClass) -> Register {
        let reg = VirtualReg {
            bank: class.bank,
            index: self.next_vreg,
        };
        self.next_vreg += 1;
        self.stats.registers_allocated += 1;
        Register::Virtual(reg)
    }

    /// Append an instruction to the stream.
    pub fn emit(&mut self, instruction: Instruction) {
        log::trace!("emit {}", instruction.render(self.target.register_names()));
        self.stats.instructions += 1;
        *self
            .stats
            .mnemonic_counts
            .entry(instruction.mnemonic().to_string())
            .or_insert(0) += 1;
        self.items.push(UnitItem::Instruction(instruction));
    }

    pub fn place_label(&mut self, name: &str) {
        log::trace!("label {}", name);
        self.items.push(UnitItem::Label(name.to_string()));
    }

    /// Emit the target's register copy.
    pub fn move_register(&mut self, dst: Register, src: Register) -> CodegenResult<()> {
        let mov = self.target.make_move(dst, src)?;
        self.emit(mov);
        Ok(())
    }

    /// Label of the pool entry holding `literal`, adding one if needed.
    pub fn add_constant(&mut self, literal: Literal) -> String {
        self.stats.literal_requests += 1;
        if let Some(&index) = self.pool_index.get(&literal) {
            return self.pool[index].label.clone();
        }
        let label = format!("{}.lit{}", self.name, self.pool.len());
        log::trace!("pool {} = {}", label, literal);
        self.pool_index.insert(literal.clone(), self.pool.len());
        self.pool.push(PoolEntry {
            label: label.clone(),
            literal,
        });
        label
    }

    /// Expand the load-constant pseudo: pool entry plus a PC-relative load.
    pub fn load_constant(&mut self, dst: Register, literal: Literal) -> CodegenResult<()> {
        let label = self.add_constant(literal);
        let load = self.target.load_literal(dst, &label)?;
        self.emit(load);
        Ok(())
    }

    /// Record a symbol defined outside this unit.
    pub fn declare_external(&mut self, symbol: &str) {
        self.externals.insert(symbol.to_string());
    }

    pub fn items(&self) -> &[UnitItem] {
        &self.items
    }

    pub fn stats(&self) -> &UnitStats {
        &self.stats
    }

    pub(crate) fn record_rule(&mut self, size: u32, cycles: u32) {
        self.stats.rules_applied += 1;
        self.stats.estimated_size += u64::from(size);
        self.stats.estimated_cycles += u64::from(cycles);
    }

    pub fn finish(self) -> Unit {
        log::debug!(
            "unit {}: {} instructions, {} pool entries, {} registers",
            self.name,
            self.stats.instructions,
            self.pool.len(),
            self.next_vreg
        );
        if self.stats.literal_requests > self.pool.len() {
            log::trace!(
                "unit {}: {} literal requests shared existing entries",
                self.name,
                self.stats.literal_requests - self.pool.len()
            );
        }
        Unit {
            name: self.name,
            items: self.items,
            pool: self.pool,
            externals: self.externals,
            vreg_count: self.next_vreg,
            stats: self.stats,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arm::registers::{reg, R0, R1};
    use crate::arm::{Arm, ArmOptions, GPR};

    #[test]
    fn test_registers_are_never_reused() {
        let arm = Arm::new(ArmOptions::default()).unwrap();
        let mut ctx = CodeGenContext::new(&arm, "f", 3);
        let a = ctx.new_register(GPR);
        let b = ctx.new_register(GPR);
        assert_ne!(a, b);
        assert!(matches!(a, Register::Virtual(VirtualReg { index: 3, .. })));
        assert_eq!(ctx.finish().vreg_count, 5);
    }

    #[test]
    fn test_constant_pool_interning() {
        let arm = Arm::new(ArmOptions::default()).unwrap();
        let mut ctx = CodeGenContext::new(&arm, "f", 0);
        let first = ctx.add_constant(Literal::Int(1000));
        let again = ctx.add_constant(Literal::Int(1000));
        let other = ctx.add_constant(Literal::Address("g".to_string()));
        assert_eq!(first, "f.lit0");
        assert_eq!(first, again);
        assert_eq!(other, "f.lit1");

        ctx.load_constant(reg(R0), Literal::Int(1000)).unwrap();
        ctx.move_register(reg(R1), reg(R0)).unwrap();
        let unit = ctx.finish();
        assert_eq!(unit.pool.len(), 2);
        assert_eq!(unit.stats.literal_requests, 4);
        let rendered: Vec<String> = unit.instructions().map(|i| i.render(arm.register_names())).collect();
        assert_eq!(rendered, vec!["ldr r0, f.lit0", "mov r1, r0"]);
    }
}
