//! Relocations produced by assembling selected units.

use bumpalo::Bump;
use isel::arm::registers::{GENERAL, R3};
use isel::arm::relocations::{ABS32, CALL24, IMM24, LDR_IMM12};
use isel::arm::{Arm, ArmOptions};
use isel::core::{AsmReg, MachineCode, RegisterAssignment, VirtualReg};
use isel::ir::parser::parse_ir;
use isel::{select_function, Target};

/// Every virtual register in one physical register; enough to encode.
struct AllTo(AsmReg);

impl RegisterAssignment for AllTo {
    fn physical(&self, _reg: VirtualReg) -> Option<AsmReg> {
        Some(self.0)
    }
}

fn assemble(text: &str) -> MachineCode {
    let arm = Arm::new(ArmOptions::default()).unwrap();
    let arena = Bump::new();
    let functions = parse_ir(text, &arena, arm.register_names(), GENERAL).unwrap();
    let unit = select_function(&arm, &functions[0]).unwrap();
    unit.assemble(&arm, &AllTo(R3)).unwrap()
}

const JUMP: &str = "\
function f
block entry
  MOVI32 r0(CONSTI32 1)
  MOVI32 r1(CONSTI32 2)
  JMP @exit
block exit
  MOVI32 r2(ADDI32(REGI32 r0, REGI32 r1))
";

#[test]
fn test_branch_relocation_offset() {
    let _ = env_logger::builder().is_test(true).try_init();
    let code = assemble(JUMP);

    assert_eq!(code.code.len(), 28);
    assert_eq!(code.relocations.len(), 1);
    let reloc = &code.relocations[0];
    assert_eq!(reloc.offset, 16);
    assert_eq!(reloc.kind, IMM24);
    assert_eq!(reloc.symbol, "exit");
    assert_eq!(reloc.addend, 0);
    assert_eq!(code.symbol("exit").unwrap().offset, 20);
    // the branch field is left for the linker
    assert_eq!(&code.code[16..20], &[0x00, 0x00, 0x00, 0xea]);
}

#[test]
fn test_relocation_moves_with_code() {
    let shifted = JUMP.replace("block entry\n", "block entry\n  MOVI32 r3(CONSTI32 3)\n");
    let code = assemble(&shifted);
    assert_eq!(code.relocations.len(), 1);
    assert_eq!(code.relocations[0].offset, 24);
}

#[test]
fn test_pool_and_call_relocations() {
    let _ = env_logger::builder().is_test(true).try_init();
    let code = assemble(
        "\
function f
block entry
  MOVI32 r0(DIVI32(REGI32 r1, CONSTI32 100000))
  MOVI32 r1(LABEL @table)
",
    );
    let summary: Vec<_> = code
        .relocations
        .iter()
        .map(|r| (r.offset, r.kind, r.symbol.as_str()))
        .collect();
    // ldr, mov r1, mov r2, bl, mov, mov r0, ldr, mov r1 then the pool
    assert_eq!(
        summary,
        vec![
            (0, LDR_IMM12, "f.lit0"),
            (12, CALL24, "__sdiv"),
            (24, LDR_IMM12, "f.lit1"),
            (36, ABS32, "table"),
        ]
    );
    assert_eq!(&code.code[32..36], &100000u32.to_le_bytes());
    assert_eq!(&code.code[36..40], &[0; 4]);
}
