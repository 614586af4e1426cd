//! Physical and virtual registers.
//!
//! The selection engine never allocates physical registers itself. Emitters ask
//! the [`CodeGenContext`](super::context::CodeGenContext) for fresh
//! [`VirtualReg`]s and may name fixed [`AsmReg`]s directly (argument registers,
//! frame pointer). Mapping virtual to physical registers is the job of an
//! external allocator, which hands the result back through
//! [`RegisterAssignment`] when the unit is assembled.

use hashbrown::HashMap;
use std::fmt;

/// Type for register bank indices.
pub type RegBank = u8;

/// Type for register IDs within a bank.
pub type RegId = u8;

/// Combined physical register identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AsmReg {
    pub bank: RegBank,
    pub id: RegId,
}

impl AsmReg {
    pub const fn new(bank: RegBank, id: RegId) -> Self {
        Self { bank, id }
    }
}

/// A register class, identified by the bank its members live in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RegClass {
    pub name: &'static str,
    pub bank: RegBank,
}

impl RegClass {
    pub const fn new(name: &'static str, bank: RegBank) -> Self {
        Self { name, bank }
    }
}

/// A register handed out by the code generation context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VirtualReg {
    pub bank: RegBank,
    pub index: u32,
}

impl fmt::Display for VirtualReg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "%v{}", self.index)
    }
}

/// Register operand as seen by instructions: fixed or still virtual.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Register {
    Physical(AsmReg),
    Virtual(VirtualReg),
}

impl Register {
    pub fn bank(&self) -> RegBank {
        match self {
            Register::Physical(reg) => reg.bank,
            Register::Virtual(reg) => reg.bank,
        }
    }

    pub fn is_virtual(&self) -> bool {
        matches!(self, Register::Virtual(_))
    }

    /// Physical register, consulting `assignment` for virtual ones.
    pub fn resolve(&self, assignment: &dyn RegisterAssignment) -> Option<AsmReg> {
        match *self {
            Register::Physical(reg) => Some(reg),
            Register::Virtual(reg) => assignment.physical(reg),
        }
    }
}

impl From<AsmReg> for Register {
    fn from(reg: AsmReg) -> Self {
        Register::Physical(reg)
    }
}

impl From<VirtualReg> for Register {
    fn from(reg: VirtualReg) -> Self {
        Register::Virtual(reg)
    }
}

/// Result of register allocation, consumed when a unit is assembled.
pub trait RegisterAssignment {
    fn physical(&self, reg: VirtualReg) -> Option<AsmReg>;
}

/// Assignment for units that only reference physical registers.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoAssignment;

impl RegisterAssignment for NoAssignment {
    fn physical(&self, _reg: VirtualReg) -> Option<AsmReg> {
        None
    }
}

impl RegisterAssignment for HashMap<VirtualReg, AsmReg> {
    fn physical(&self, reg: VirtualReg) -> Option<AsmReg> {
        self.get(&reg).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_physical_and_virtual() {
        let fixed = Register::Physical(AsmReg::new(0, 3));
        let virt = Register::Virtual(VirtualReg { bank: 0, index: 7 });

        assert_eq!(fixed.resolve(&NoAssignment), Some(AsmReg::new(0, 3)));
        assert_eq!(virt.resolve(&NoAssignment), None);

        let mut map = HashMap::new();
        map.insert(VirtualReg { bank: 0, index: 7 }, AsmReg::new(0, 5));
        assert_eq!(virt.resolve(&map), Some(AsmReg::new(0, 5)));
        assert!(virt.is_virtual());
        assert_eq!(VirtualReg { bank: 0, index: 7 }.to_string(), "%v7");
    }
}
