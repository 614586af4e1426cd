//! Reading textual IR and selecting whole functions from it.

use bumpalo::Bump;
use isel::arm::registers::{GENERAL, R0};
use isel::arm::{Arm, ArmOptions};
use isel::core::Register;
use isel::ir::parser::parse_ir;
use isel::ir::IrValue;
use isel::{select_function, CodegenError, Target};

const TWO_FUNCTIONS: &str = "\
# two functions, each with its own virtual registers
function first
block entry
  let a = REGI32 %a
  MOVI32 r0(ADDI32(a, a))

function second
block entry
  MOVI32 r0(SUBI32(REGI32 %p, REGI32 %q))
  JMP @done
block done
  MOVI32 r1(CONSTI32 7)
";

#[test]
fn test_functions_are_independent() {
    let _ = env_logger::builder().is_test(true).try_init();
    let arm = Arm::new(ArmOptions::default()).unwrap();
    let arena = Bump::new();
    let functions = parse_ir(TWO_FUNCTIONS, &arena, arm.register_names(), GENERAL).unwrap();

    assert_eq!(functions.len(), 2);
    assert_eq!(functions[0].name, "first");
    assert_eq!(functions[0].vreg_count, 1);
    assert_eq!(functions[1].name, "second");
    assert_eq!(functions[1].vreg_count, 2);
    assert_eq!(functions[1].blocks.len(), 2);
    assert_eq!(functions[1].blocks[1].label, "done");

    let mov = functions[0].dag.view(functions[0].blocks[0].roots[0]);
    assert_eq!(mov.value(), IrValue::Reg(Register::Physical(R0)));
}

#[test]
fn test_whole_function_listing() {
    let arm = Arm::new(ArmOptions::default()).unwrap();
    let arena = Bump::new();
    let functions = parse_ir(TWO_FUNCTIONS, &arena, arm.register_names(), GENERAL).unwrap();

    let unit = select_function(&arm, &functions[1]).unwrap();
    let expected = "\
second:
entry:
    sub %v2, %v0, %v1
    mov r0, %v2
    b done
done:
    mov %v3, 7
    mov r1, %v3
";
    assert_eq!(unit.render(arm.register_names()), expected);
    assert_eq!(unit.stats.instructions, 5);
    assert_eq!(unit.jump_targets().into_iter().collect::<Vec<_>>(), vec!["done"]);
}

#[test]
fn test_errors_carry_line_numbers() {
    let arm = Arm::new(ArmOptions::default()).unwrap();
    let arena = Bump::new();

    let unknown_operator = "function f\nblock entry\n\n  MOVI32 r0(FROBI32 %x)\n";
    let err = parse_ir(unknown_operator, &arena, arm.register_names(), GENERAL).unwrap_err();
    assert!(matches!(err, CodegenError::ParseError { line: 4, .. }), "{:?}", err);

    let unknown_register = "function f\nblock entry\n  MOVI32 r16(CONSTI32 1)\n";
    let err = parse_ir(unknown_register, &arena, arm.register_names(), GENERAL).unwrap_err();
    assert!(matches!(err, CodegenError::ParseError { line: 3, .. }), "{:?}", err);

    let outside_block = "function f\n  MOVI32 r0(CONSTI32 1)\n";
    assert!(parse_ir(outside_block, &arena, arm.register_names(), GENERAL).is_err());
}
