//! Test ARM instruction encodings against known machine words.
//!
//! Every expected value below is what a standard ARM assembler produces for
//! the same line, little-endian.

use isel::arm::registers::{reg, R0, R1, R2, R3, R11, SP};
use isel::arm::{derive_conditional, Arm, ArmOptions, Condition};
use isel::core::NoAssignment;
use isel::encoding::{Instruction, OperandValue};
use isel::Target;

fn word(ins: &Instruction) -> u32 {
    let bytes = ins.encode(&NoAssignment).unwrap();
    assert_eq!(bytes.len(), 4);
    u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}

fn encode_line(arm: &Arm, line: &str) -> u32 {
    word(&arm.parse_instruction(line).unwrap())
}

#[test]
fn test_register_move_word() {
    let _ = env_logger::builder().is_test(true).try_init();
    let arm = Arm::new(ArmOptions::default()).unwrap();

    let mov = arm.isa().mov_reg(reg(R0), reg(R1)).unwrap();
    let bits = word(&mov);
    assert_eq!(bits, 0xE1A0_0001);
    assert_eq!(bits >> 28, Condition::Al as u32);
    // shift amount and type
    assert_eq!((bits >> 5) & 0x7F, 0);
}

#[test]
fn test_known_words() {
    let _ = env_logger::builder().is_test(true).try_init();
    let arm = Arm::new(ArmOptions::default()).unwrap();

    let cases = [
        ("mov r0, r1, lsl 3", 0xE1A0_0181),
        ("mov r0, r1, asr 24", 0xE1A0_0C41),
        ("mov r2, 255", 0xE3A0_20FF),
        ("add r2, r3, 1000", 0xE283_2FFA),
        ("add r0, r1, r2", 0xE081_0002),
        ("sub r0, r1, r2", 0xE041_0002),
        ("and r0, r1, 255", 0xE201_00FF),
        ("orr r0, r1, r2", 0xE181_0002),
        ("eor r0, r1, r2", 0xE021_0002),
        ("rsb r0, r1, 0", 0xE261_0000),
        ("cmp r1, r2", 0xE151_0002),
        ("cmp r0, 10", 0xE350_000A),
        ("mul r0, r1, r2", 0xE000_0291),
        ("sdiv r0, r1, r2", 0xE710_F211),
        ("udiv r0, r1, r2", 0xE730_F211),
        ("mls r0, r1, r2, r3", 0xE060_3291),
        ("lsl r0, r1, r2", 0xE1A0_0211),
        ("lsr r0, r1, r2", 0xE1A0_0231),
        ("asr r0, r1, r2", 0xE1A0_0251),
        ("ldr r0, [r11, -8]", 0xE51B_0008),
        ("str r0, [sp, 4]", 0xE58D_0004),
        ("ldrb r1, [r2, 0]", 0xE5D2_1000),
        ("strb r1, [r2, -1]", 0xE542_1001),
        ("push {r4, lr}", 0xE92D_4010),
        ("pop {r4, pc}", 0xE8BD_8010),
        ("blx r3", 0xE12F_FF33),
        ("mcr p15, 0, r0, c7, c10, 4", 0xEE07_0F9A),
        ("mrc p15, 0, r0, c1, c0, 0", 0xEE11_0F10),
    ];
    for (line, expected) in cases {
        assert_eq!(encode_line(&arm, line), expected, "{}", line);
    }
}

#[test]
fn test_symbolic_operands_leave_fields_zero() {
    let arm = Arm::new(ArmOptions::default()).unwrap();
    assert_eq!(encode_line(&arm, "b exit"), 0xEA00_0000);
    assert_eq!(encode_line(&arm, "bl __sdiv"), 0xEB00_0000);
    assert_eq!(encode_line(&arm, "ldr r0, f.lit0"), 0xE51F_0000);
    assert_eq!(encode_line(&arm, "adr r1, table"), 0xE28F_1000);
}

#[test]
fn test_condition_variants_change_only_the_condition() {
    let _ = env_logger::builder().is_test(true).try_init();
    let arm = Arm::new(ArmOptions::default()).unwrap();
    let isa = arm.isa();
    let operands: Vec<OperandValue> = vec![reg(R0).into(), reg(R1).into(), reg(R2).into(), isa.no_shift().unwrap()];
    let base = word(&Instruction::new(&isa.add, operands.clone()).unwrap());

    for cond in [Condition::Eq, Condition::Ne, Condition::Ge, Condition::Lt, Condition::Hi, Condition::Ls] {
        let derived = derive_conditional(&isa.add, cond).unwrap();
        assert_eq!(derived.mnemonic(), format!("add{}", cond.suffix()));
        assert_eq!(derived.syntax().operand_names().collect::<Vec<_>>(), vec!["rd", "rn", "rm", "shift"]);
        let bits = word(&Instruction::new(&derived, operands.clone()).unwrap());
        assert_eq!(bits & 0x0FFF_FFFF, base & 0x0FFF_FFFF);
        assert_eq!(bits >> 28, cond as u32);
    }
}

#[test]
fn test_encoding_is_deterministic() {
    let arm = Arm::new(ArmOptions::default()).unwrap();
    let isa = arm.isa();
    let load = isa.mem(&isa.ldr, reg(R3), reg(SP), 124).unwrap();
    let first = load.encode(&NoAssignment).unwrap();
    for _ in 0..4 {
        assert_eq!(load.encode(&NoAssignment).unwrap(), first);
    }
    let again = isa.mem(&isa.ldr, reg(R3), reg(SP), 124).unwrap();
    assert_eq!(again.encode(&NoAssignment).unwrap(), first);
}

#[test]
fn test_range_errors() {
    let arm = Arm::new(ArmOptions::default()).unwrap();
    let isa = arm.isa();

    let err = isa.mem(&isa.str, reg(R0), reg(R11), 5000).unwrap_err();
    assert!(matches!(err, isel::CodegenError::EncodingRange { value: 5000, .. }));

    // 257 has no rotated 8-bit form
    let add = isa.alu_imm(&isa.add_imm, reg(R0), reg(R1), 257).unwrap();
    assert!(matches!(add.encode(&NoAssignment), Err(isel::CodegenError::EncodingRange { .. })));

    assert!(arm.parse_instruction("mov r0, r1, lsl 32").is_err());
    assert!(arm.parse_instruction("frob r0").is_err());
}
