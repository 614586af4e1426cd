//! ARM core registers.

use crate::core::register::{AsmReg, RegBank, RegClass, Register};
use crate::encoding::syntax::RegisterNames;

/// Bank of the sixteen core registers.
pub const GENERAL: RegBank = 0;

/// Coprocessor numbers `p0`..`p15`, as named by `mcr`/`mrc`.
pub const COPROC: RegBank = 1;

/// Coprocessor registers `c0`..`c15`.
pub const COREG: RegBank = 2;

/// Class fresh values are allocated from.
pub const GPR: RegClass = RegClass::new("gpr", GENERAL);

pub const R0: AsmReg = AsmReg::new(GENERAL, 0);
pub const R1: AsmReg = AsmReg::new(GENERAL, 1);
pub const R2: AsmReg = AsmReg::new(GENERAL, 2);
pub const R3: AsmReg = AsmReg::new(GENERAL, 3);
pub const R4: AsmReg = AsmReg::new(GENERAL, 4);
pub const R5: AsmReg = AsmReg::new(GENERAL, 5);
pub const R6: AsmReg = AsmReg::new(GENERAL, 6);
pub const R7: AsmReg = AsmReg::new(GENERAL, 7);
pub const R8: AsmReg = AsmReg::new(GENERAL, 8);
pub const R9: AsmReg = AsmReg::new(GENERAL, 9);
pub const R10: AsmReg = AsmReg::new(GENERAL, 10);
/// Frame pointer.
pub const R11: AsmReg = AsmReg::new(GENERAL, 11);
pub const R12: AsmReg = AsmReg::new(GENERAL, 12);
pub const SP: AsmReg = AsmReg::new(GENERAL, 13);
pub const LR: AsmReg = AsmReg::new(GENERAL, 14);
pub const PC: AsmReg = AsmReg::new(GENERAL, 15);

const NAMES: [&str; 16] = [
    "r0", "r1", "r2", "r3", "r4", "r5", "r6", "r7", "r8", "r9", "r10", "r11", "r12", "sp", "lr", "pc",
];

const COPROC_NAMES: [&str; 16] = [
    "p0", "p1", "p2", "p3", "p4", "p5", "p6", "p7", "p8", "p9", "p10", "p11", "p12", "p13", "p14", "p15",
];

const COREG_NAMES: [&str; 16] = [
    "c0", "c1", "c2", "c3", "c4", "c5", "c6", "c7", "c8", "c9", "c10", "c11", "c12", "c13", "c14", "c15",
];

/// Physical register as an operand value.
pub fn reg(asm: AsmReg) -> Register {
    Register::Physical(asm)
}

/// Coprocessor `p<n>`.
pub fn coproc(n: u8) -> Register {
    Register::Physical(AsmReg::new(COPROC, n))
}

/// Coprocessor register `c<n>`.
pub fn coreg(n: u8) -> Register {
    Register::Physical(AsmReg::new(COREG, n))
}

/// Register naming used for assembly text.
#[derive(Debug, Clone, Copy, Default)]
pub struct ArmRegisterNames;

impl RegisterNames for ArmRegisterNames {
    fn register_name(&self, reg: AsmReg) -> Option<&'static str> {
        let names = match reg.bank {
            GENERAL => &NAMES,
            COPROC => &COPROC_NAMES,
            COREG => &COREG_NAMES,
            _ => return None,
        };
        names.get(reg.id as usize).copied()
    }

    fn parse_register(&self, name: &str) -> Option<AsmReg> {
        let (bank, id) = match name {
            "fp" => (GENERAL, 11),
            "ip" => (GENERAL, 12),
            "r13" => (GENERAL, 13),
            "r14" => (GENERAL, 14),
            "r15" => (GENERAL, 15),
            _ => [(GENERAL, &NAMES), (COPROC, &COPROC_NAMES), (COREG, &COREG_NAMES)]
                .into_iter()
                .find_map(|(bank, names)| names.iter().position(|n| *n == name).map(|id| (bank, id)))?,
        };
        Some(AsmReg::new(bank, id as u8))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_names() {
        let names = ArmRegisterNames;
        assert_eq!(names.register_name(R11), Some("r11"));
        assert_eq!(names.register_name(SP), Some("sp"));
        assert_eq!(names.parse_register("pc"), Some(PC));
        assert_eq!(names.parse_register("fp"), Some(R11));
        assert_eq!(names.parse_register("r16"), None);
        assert_eq!(names.register_name(AsmReg::new(3, 0)), None);

        assert_eq!(names.parse_register("p15"), Some(AsmReg::new(COPROC, 15)));
        assert_eq!(names.parse_register("c7"), Some(AsmReg::new(COREG, 7)));
        assert_eq!(names.register_name(AsmReg::new(COREG, 10)), Some("c10"));
        assert_eq!(names.parse_register("c16"), None);
    }
}
