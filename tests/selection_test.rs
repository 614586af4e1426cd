//! Instruction selection over textual IR: cost choices, shared nodes, typed
//! variants and failure reporting.

use bumpalo::Bump;
use isel::arm::registers::GENERAL;
use isel::arm::{Arm, ArmOptions};
use isel::codegen::{GrammarBuilder, NtValue, Selection};
use isel::core::Unit;
use isel::ir::parser::parse_ir;
use isel::ir::{IrDag, IrType, OpKind};
use isel::{select_function, CodegenError, CodegenResult, Target};

fn compile(arm: &Arm, text: &str) -> CodegenResult<Unit> {
    let arena = Bump::new();
    let functions = parse_ir(text, &arena, arm.register_names(), GENERAL)?;
    select_function(arm, &functions[0])
}

fn listing(arm: &Arm, unit: &Unit) -> Vec<String> {
    unit.instructions().map(|ins| ins.render(arm.register_names())).collect()
}

fn lines(arm: &Arm, text: &str) -> Vec<String> {
    let unit = compile(arm, text).unwrap();
    listing(arm, &unit)
}

#[test]
fn test_small_constant_folds_into_add() {
    let _ = env_logger::builder().is_test(true).try_init();
    let arm = Arm::new(ArmOptions::default()).unwrap();

    let text = "function f\nblock entry\n  MOVI32 r0(ADDI32(REGI32 %x, CONSTI32 200))\n";
    assert_eq!(lines(&arm, text), vec!["add %v1, %v0, 200", "mov r0, %v1"]);
}

#[test]
fn test_large_constant_goes_through_pool() {
    let _ = env_logger::builder().is_test(true).try_init();
    let arm = Arm::new(ArmOptions::default()).unwrap();

    let text = "function f\nblock entry\n  MOVI32 r0(ADDI32(REGI32 %x, CONSTI32 1000))\n";
    let unit = compile(&arm, text).unwrap();
    assert_eq!(listing(&arm, &unit), vec!["ldr %v1, f.lit0", "add %v2, %v0, %v1", "mov r0, %v2"]);
    assert_eq!(unit.pool.len(), 1);
    assert_eq!(unit.pool[0].label, "f.lit0");
}

#[test]
fn test_costs_reflect_constant_range() {
    let arm = Arm::new(ArmOptions::default()).unwrap();
    let arena = Bump::new();
    let text = "function f\nblock entry\n  MOVI32 r0(ADDI32(REGI32 %x, CONSTI32 200))\n  MOVI32 r1(ADDI32(REGI32 %x, CONSTI32 1000))\n";
    let functions = parse_ir(text, &arena, arm.register_names(), GENERAL).unwrap();
    let function = &functions[0];
    let roots = &function.blocks[0].roots;
    let near = function.dag.view(roots[0]).child(0).id();
    let far = function.dag.view(roots[1]).child(0).id();

    let mut selection = Selection::new(arm.grammar(), &function.dag);
    assert_eq!(selection.cost(near, "reg"), Some(4));
    assert_eq!(selection.cost(far, "reg"), Some(12));
    assert_eq!(selection.chosen_rule(near, "reg").unwrap().shape.to_string(), "ADDI32(reg, CONSTI32)");
    assert_eq!(selection.chosen_rule(far, "reg").unwrap().shape.to_string(), "ADDI32(reg, reg)");
    // the MOV adds its own size on top
    assert_eq!(selection.cost(roots[0], "stm"), Some(8));
}

#[test]
fn test_shared_node_is_emitted_once() {
    let _ = env_logger::builder().is_test(true).try_init();
    let arm = Arm::new(ArmOptions::default()).unwrap();

    let text = "\
function f
block entry
  let x = REGI32 %x
  let y = REGI32 %y
  let inner = ADDI32(x, y)
  MOVI32 r0(ADDI32(x, inner))
  MOVI32 r1(inner)
";
    let out = lines(&arm, text);
    assert_eq!(out, vec!["add %v2, %v0, %v1", "add %v3, %v0, %v2", "mov r0, %v3", "mov r1, %v2"]);
    assert_eq!(out.iter().filter(|l| l.as_str() == "add %v2, %v0, %v1").count(), 1);
}

#[test]
fn test_byte_subtraction_is_masked_into_fresh_register() {
    let _ = env_logger::builder().is_test(true).try_init();
    let arm = Arm::new(ArmOptions::default()).unwrap();

    let text = "function f\nblock entry\n  MOVI8 r0(SUBI8(REGI8 %a, REGI8 %b))\n";
    let unit = compile(&arm, text).unwrap();
    assert_eq!(listing(&arm, &unit), vec!["sub %v2, %v0, %v1", "and %v3, %v2, 255", "mov r0, %v3"]);

    let ins: Vec<_> = unit.instructions().collect();
    assert_ne!(ins[0].defs(), ins[1].defs());
    assert_eq!(ins[1].uses(), ins[0].defs());
}

#[test]
fn test_conditional_jump_picks_signedness() {
    let arm = Arm::new(ArmOptions::default()).unwrap();

    let signed = "function f\nblock entry\n  CJMPI32 [< yes no](REGI32 %a, REGI32 %b)\nblock yes\nblock no\n";
    assert_eq!(lines(&arm, signed), vec!["cmp %v0, %v1", "blt yes", "b no"]);

    let unsigned = "function f\nblock entry\n  CJMPU32 [>= yes no](REGU32 %a, REGU32 %b)\nblock yes\nblock no\n";
    assert_eq!(lines(&arm, unsigned), vec!["cmp %v0, %v1", "bhs yes", "b no"]);
}

#[test]
fn test_narrow_signed_compare_sign_extends() {
    let _ = env_logger::builder().is_test(true).try_init();
    let arm = Arm::new(ArmOptions::default()).unwrap();

    let ordered = "function f\nblock entry\n  CJMPI8 [< yes no](CONSTI8 -1, CONSTI8 1)\nblock yes\nblock no\n";
    assert_eq!(
        lines(&arm, ordered),
        vec![
            "mov %v0, 255",
            "mov %v1, 1",
            "mov %v2, %v0, lsl 24",
            "mov %v3, %v2, asr 24",
            "mov %v4, %v1, lsl 24",
            "mov %v5, %v4, asr 24",
            "cmp %v3, %v5",
            "blt yes",
            "b no",
        ]
    );

    let halfword = "function f\nblock entry\n  CJMPI16 [>= yes no](REGI16 %a, REGI16 %b)\nblock yes\nblock no\n";
    let out = lines(&arm, halfword);
    assert_eq!(out[0], "mov %v2, %v0, lsl 16");
    assert_eq!(out[1], "mov %v3, %v2, asr 16");
    assert_eq!(&out[4..], &["cmp %v3, %v5", "bge yes", "b no"]);

    // equality and unsigned order do not depend on the sign bits
    let equal = "function f\nblock entry\n  CJMPI8 [== yes no](REGI8 %a, REGI8 %b)\nblock yes\nblock no\n";
    assert_eq!(lines(&arm, equal), vec!["cmp %v0, %v1", "beq yes", "b no"]);
    let unsigned = "function f\nblock entry\n  CJMPU8 [< yes no](REGU8 %a, REGU8 %b)\nblock yes\nblock no\n";
    assert_eq!(lines(&arm, unsigned), vec!["cmp %v0, %v1", "blo yes", "b no"]);
}

#[test]
fn test_byte_constant_range() {
    let arm = Arm::new(ArmOptions::default()).unwrap();

    let lowest = "function f\nblock entry\n  MOVI8 r0(CONSTI8 -128)\n";
    assert_eq!(lines(&arm, lowest), vec!["mov %v0, 128", "mov r0, %v0"]);

    let too_big = "function f\nblock entry\n  MOVI8 r0(CONSTI8 1000)\n";
    match compile(&arm, too_big).unwrap_err() {
        CodegenError::NoApplicablePattern { operator, nonterminal } => {
            assert_eq!(operator, "MOVI8");
            assert_eq!(nonterminal, "stm");
        }
        other => panic!("unexpected error {:?}", other),
    }
    assert!(compile(&arm, "function f\nblock entry\n  MOVI8 r0(CONSTI8 -129)\n").is_err());
}

#[test]
fn test_frame_slots_address_through_fp() {
    let arm = Arm::new(ArmOptions::default()).unwrap();

    let text = "\
function f
block entry
  STRI32(FPRELU32 -8, REGI32 %x)
  MOVI32 r0(LDRI32(FPRELU32 -8))
";
    assert_eq!(lines(&arm, text), vec!["str %v0, [r11, -8]", "ldr %v1, [r11, -8]", "mov r0, %v1"]);
}

#[test]
fn test_division_calls_runtime_unless_hardware_divide() {
    let _ = env_logger::builder().is_test(true).try_init();
    let text = "function f\nblock entry\n  MOVI32 r0(DIVI32(REGI32 %a, REGI32 %b))\n";

    let soft = Arm::new(ArmOptions::default()).unwrap();
    let unit = compile(&soft, text).unwrap();
    assert_eq!(
        listing(&soft, &unit),
        vec!["mov r1, %v0", "mov r2, %v1", "bl __sdiv", "mov %v2, r0", "mov r0, %v2"]
    );
    assert!(unit.externals.contains("__sdiv"));

    let hard = Arm::new(ArmOptions { hardware_divide: true }).unwrap();
    let unit = compile(&hard, text).unwrap();
    assert_eq!(listing(&hard, &unit), vec!["sdiv %v2, %v0, %v1", "mov r0, %v2"]);
    assert!(unit.externals.is_empty());
}

#[test]
fn test_no_rule_for_operator() {
    let _ = env_logger::builder().is_test(true).try_init();
    let arm = Arm::new(ArmOptions::default()).unwrap();

    let err = compile(&arm, "function f\nblock entry\n  NEGI8(REGI8 %a)\n").unwrap_err();
    match err {
        CodegenError::NoApplicablePattern { operator, nonterminal } => {
            assert_eq!(operator, "NEGI8");
            assert_eq!(nonterminal, "stm");
        }
        other => panic!("unexpected error {:?}", other),
    }
}

#[test]
fn test_halfword_load_is_unimplemented() {
    let arm = Arm::new(ArmOptions::default()).unwrap();
    let err = compile(&arm, "function f\nblock entry\n  MOVI32 r0(LDRU16(FPRELU32 -8))\n").unwrap_err();
    assert!(matches!(err, CodegenError::UnimplementedEncoding { .. }), "{:?}", err);
}

#[test]
fn test_raising_a_cost_flips_the_choice() {
    let arena = Bump::new();
    let mut dag = IrDag::new(&arena);
    let x = dag.constant(IrType::I32, 3).unwrap();
    let y = dag.constant(IrType::I32, 4).unwrap();
    let mul = dag.binary(OpKind::Mul, IrType::I32, x, y).unwrap();

    let grammar = |mul_cost: u32| {
        let mut g = GrammarBuilder::new(&["stm", "reg"]);
        g.rule("stm", &["reg"]).cost(0).emit(|_, _, _| Ok(NtValue::None));
        g.rule("reg", &["CONSTI32"]).cost(1).emit(|_, _, _| Ok(NtValue::None));
        g.rule("reg", &["MULI32(reg, reg)"]).cost(mul_cost).emit(|_, _, _| Ok(NtValue::None));
        g.rule("reg", &["MULI32(CONSTI32, CONSTI32)"]).cost(5).emit(|_, _, _| Ok(NtValue::None));
        g.build().unwrap()
    };

    let cheap = grammar(2);
    let mut selection = Selection::new(&cheap, &dag);
    assert_eq!(selection.chosen_rule(mul, "reg").unwrap().shape.to_string(), "MULI32(reg, reg)");
    assert_eq!(selection.cost(mul, "stm"), Some(4));

    let dear = grammar(10);
    let mut selection = Selection::new(&dear, &dag);
    assert_eq!(selection.chosen_rule(mul, "reg").unwrap().shape.to_string(), "MULI32(CONSTI32, CONSTI32)");
    assert_eq!(selection.cost(mul, "reg"), Some(5));
}
