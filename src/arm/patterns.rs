// This module is the ARM selection grammar. Nonterminals are `stm` (the goal,
// statements), `reg` (a value in a register) and `mem` (a base register plus a
// signed 12-bit offset, the operand shape of ldr/str). Emitters are plain functions
// taking the instruction table as first argument; `lower` closes over a shared
// handle to the table so they can be registered on the grammar. Costs are the
// estimated bytes of the emitted code plus any extra cycles, which is what makes the
// immediate forms win over materialize-then-operate sequences whenever their
// predicates accept the constant. Division, remainder and bitwise inversion go
// through runtime routines unless the hardware-divide extension is enabled, in
// which case cheaper sdiv/udiv/mls rules are registered after the base set.

//! ARM instruction selection rules.

use super::instructions::ArmInstructions;
use super::registers::{reg, GPR, R0, R1, R11, R2};
use super::ArmOptions;
use crate::codegen::patterns::{Grammar, GrammarBuilder, NtValue};
use crate::core::context::{CodeGenContext, Literal};
use crate::core::error::{CodegenError, CodegenResult};
use crate::core::register::Register;
use crate::encoding::InstructionDesc;
use crate::ir::{CondOp, IrValue, NodeRef};
use std::sync::Arc;

type ArmEmitter = fn(&ArmInstructions, &mut CodeGenContext<'_>, &NodeRef<'_, '_>, &[NtValue]) -> CodegenResult<NtValue>;

fn lower(
    isa: &Arc<ArmInstructions>,
    emit: ArmEmitter,
) -> impl Fn(&mut CodeGenContext<'_>, &NodeRef<'_, '_>, &[NtValue]) -> CodegenResult<NtValue> + Send + Sync + 'static {
    let isa = Arc::clone(isa);
    move |ctx: &mut CodeGenContext<'_>, node: &NodeRef<'_, '_>, args: &[NtValue]| emit(&isa, ctx, node, args)
}

fn fresh(ctx: &mut CodeGenContext<'_>) -> Register {
    ctx.new_register(GPR)
}

fn constant(node: &NodeRef<'_, '_>) -> CodegenResult<i64> {
    node.constant()
        .ok_or_else(|| CodegenError::malformed(format!("{:?} carries no constant", node)))
}

fn frame_offset(node: &NodeRef<'_, '_>) -> CodegenResult<i64> {
    match node.value() {
        IrValue::FrameOffset(offset) => Ok(offset),
        _ => Err(CodegenError::malformed(format!("{:?} carries no frame offset", node))),
    }
}

fn child_const_in(node: &NodeRef<'_, '_>, index: usize, min: i64, max: i64) -> bool {
    node.child(index).constant().is_some_and(|c| (min..=max).contains(&c))
}

fn frame_offset_in(node: &NodeRef<'_, '_>, limit: i64) -> bool {
    frame_offset(node).is_ok_and(|offset| offset.unsigned_abs() <= limit.unsigned_abs())
}

// statements and addressing

fn to_statement(_: &ArmInstructions, _: &mut CodeGenContext<'_>, _: &NodeRef<'_, '_>, _: &[NtValue]) -> CodegenResult<NtValue> {
    Ok(NtValue::None)
}

fn reg_address(_: &ArmInstructions, _: &mut CodeGenContext<'_>, _: &NodeRef<'_, '_>, args: &[NtValue]) -> CodegenResult<NtValue> {
    Ok(NtValue::Mem {
        base: args[0].reg()?,
        offset: 0,
    })
}

fn offset_address(_: &ArmInstructions, _: &mut CodeGenContext<'_>, node: &NodeRef<'_, '_>, args: &[NtValue]) -> CodegenResult<NtValue> {
    Ok(NtValue::Mem {
        base: args[0].reg()?,
        offset: constant(&node.child(1))?,
    })
}

fn frame_slot(_: &ArmInstructions, _: &mut CodeGenContext<'_>, node: &NodeRef<'_, '_>, _: &[NtValue]) -> CodegenResult<NtValue> {
    Ok(NtValue::Mem {
        base: reg(R11),
        offset: frame_offset(node)?,
    })
}

fn store(isa: &ArmInstructions, desc: &Arc<InstructionDesc>, ctx: &mut CodeGenContext<'_>, args: &[NtValue]) -> CodegenResult<NtValue> {
    let (base, offset) = args[0].mem()?;
    ctx.emit(isa.mem(desc, args[1].reg()?, base, offset)?);
    Ok(NtValue::None)
}

fn store_word(isa: &ArmInstructions, ctx: &mut CodeGenContext<'_>, _: &NodeRef<'_, '_>, args: &[NtValue]) -> CodegenResult<NtValue> {
    store(isa, &isa.str, ctx, args)
}

fn store_byte(isa: &ArmInstructions, ctx: &mut CodeGenContext<'_>, _: &NodeRef<'_, '_>, args: &[NtValue]) -> CodegenResult<NtValue> {
    store(isa, &isa.strb, ctx, args)
}

fn jump(isa: &ArmInstructions, ctx: &mut CodeGenContext<'_>, node: &NodeRef<'_, '_>, _: &[NtValue]) -> CodegenResult<NtValue> {
    let IrValue::Label(target) = node.value() else {
        return Err(CodegenError::malformed(format!("{:?} has no target", node)));
    };
    ctx.emit(isa.branch(&isa.b, target)?);
    Ok(NtValue::None)
}

/// Compare, branch to `yes` on the condition, fall through to a jump to `no`.
fn conditional_jump(isa: &ArmInstructions, ctx: &mut CodeGenContext<'_>, node: &NodeRef<'_, '_>, args: &[NtValue]) -> CodegenResult<NtValue> {
    let IrValue::Cond { op, yes, no } = node.value() else {
        return Err(CodegenError::malformed(format!("{:?} has no condition", node)));
    };
    let signed = node.op().ty.is_some_and(|ty| ty.is_signed());
    let branch = match (op, signed) {
        (CondOp::Eq, _) => &isa.beq,
        (CondOp::Ne, _) => &isa.bne,
        (CondOp::Lt, true) => &isa.blt,
        (CondOp::Le, true) => &isa.ble,
        (CondOp::Gt, true) => &isa.bgt,
        (CondOp::Ge, true) => &isa.bge,
        (CondOp::Lt, false) => &isa.blo,
        (CondOp::Le, false) => &isa.bls,
        (CondOp::Gt, false) => &isa.bhi,
        (CondOp::Ge, false) => &isa.bhs,
    };
    let (mut lhs, mut rhs) = (args[0].reg()?, args[1].reg()?);
    // narrow values are held zero-extended; ordered signed compares need the sign
    let narrow = node.op().ty.map_or(32, |ty| ty.bits());
    if signed && narrow < 32 && !matches!(op, CondOp::Eq | CondOp::Ne) {
        lhs = sign_extend(isa, ctx, lhs, narrow)?;
        rhs = sign_extend(isa, ctx, rhs, narrow)?;
    }
    ctx.emit(isa.cmp_reg(lhs, rhs)?);
    ctx.emit(isa.branch(branch, yes)?);
    ctx.emit(isa.branch(&isa.b, no)?);
    Ok(NtValue::None)
}

// leaves and moves

fn register(_: &ArmInstructions, _: &mut CodeGenContext<'_>, node: &NodeRef<'_, '_>, _: &[NtValue]) -> CodegenResult<NtValue> {
    match node.value() {
        IrValue::Reg(reg) => Ok(NtValue::Reg(reg)),
        _ => Err(CodegenError::malformed(format!("{:?} names no register", node))),
    }
}

fn copy(_: &ArmInstructions, ctx: &mut CodeGenContext<'_>, node: &NodeRef<'_, '_>, args: &[NtValue]) -> CodegenResult<NtValue> {
    let IrValue::Reg(dst) = node.value() else {
        return Err(CodegenError::malformed(format!("{:?} names no destination", node)));
    };
    ctx.move_register(dst, args[0].reg()?)?;
    Ok(NtValue::Reg(dst))
}

fn same(_: &ArmInstructions, _: &mut CodeGenContext<'_>, _: &NodeRef<'_, '_>, args: &[NtValue]) -> CodegenResult<NtValue> {
    Ok(args[0])
}

/// Sign-extend the low `bits` of `src` into a fresh register.
fn sign_extend(isa: &ArmInstructions, ctx: &mut CodeGenContext<'_>, src: Register, bits: u32) -> CodegenResult<Register> {
    let amount = i64::from(32 - bits);
    let shifted = fresh(ctx);
    ctx.emit(isa.mov_shifted(shifted, src, isa.shift(&isa.shifts.lsl, amount)?)?);
    let d = fresh(ctx);
    ctx.emit(isa.mov_shifted(d, shifted, isa.shift(&isa.shifts.asr, amount)?)?);
    Ok(d)
}

fn sign_extend_byte(isa: &ArmInstructions, ctx: &mut CodeGenContext<'_>, _: &NodeRef<'_, '_>, args: &[NtValue]) -> CodegenResult<NtValue> {
    Ok(NtValue::Reg(sign_extend(isa, ctx, args[0].reg()?, 8)?))
}

fn truncate_byte(isa: &ArmInstructions, ctx: &mut CodeGenContext<'_>, _: &NodeRef<'_, '_>, args: &[NtValue]) -> CodegenResult<NtValue> {
    let d = fresh(ctx);
    ctx.emit(isa.alu_imm(&isa.and_imm, d, args[0].reg()?, 0xff)?);
    Ok(NtValue::Reg(d))
}

fn pooled_constant(_: &ArmInstructions, ctx: &mut CodeGenContext<'_>, node: &NodeRef<'_, '_>, _: &[NtValue]) -> CodegenResult<NtValue> {
    let d = fresh(ctx);
    ctx.load_constant(d, Literal::Int(constant(node)?))?;
    Ok(NtValue::Reg(d))
}

fn small_constant(isa: &ArmInstructions, ctx: &mut CodeGenContext<'_>, node: &NodeRef<'_, '_>, _: &[NtValue]) -> CodegenResult<NtValue> {
    let d = fresh(ctx);
    ctx.emit(isa.mov_imm(d, constant(node)?)?);
    Ok(NtValue::Reg(d))
}

fn byte_constant(isa: &ArmInstructions, ctx: &mut CodeGenContext<'_>, node: &NodeRef<'_, '_>, _: &[NtValue]) -> CodegenResult<NtValue> {
    let d = fresh(ctx);
    ctx.emit(isa.mov_imm(d, constant(node)? & 0xff)?);
    Ok(NtValue::Reg(d))
}

fn label_address(_: &ArmInstructions, ctx: &mut CodeGenContext<'_>, node: &NodeRef<'_, '_>, _: &[NtValue]) -> CodegenResult<NtValue> {
    let IrValue::Label(name) = node.value() else {
        return Err(CodegenError::malformed(format!("{:?} names no label", node)));
    };
    let d = fresh(ctx);
    ctx.load_constant(d, Literal::Address(name.to_string()))?;
    Ok(NtValue::Reg(d))
}

fn frame_address(isa: &ArmInstructions, ctx: &mut CodeGenContext<'_>, node: &NodeRef<'_, '_>, _: &[NtValue]) -> CodegenResult<NtValue> {
    let offset = frame_offset(node)?;
    let d = fresh(ctx);
    if offset >= 0 {
        ctx.emit(isa.alu_imm(&isa.add_imm, d, reg(R11), offset)?);
    } else {
        ctx.emit(isa.alu_imm(&isa.sub_imm, d, reg(R11), -offset)?);
    }
    Ok(NtValue::Reg(d))
}

fn far_frame_address(isa: &ArmInstructions, ctx: &mut CodeGenContext<'_>, node: &NodeRef<'_, '_>, _: &[NtValue]) -> CodegenResult<NtValue> {
    let offset = fresh(ctx);
    ctx.load_constant(offset, Literal::Int(frame_offset(node)?))?;
    let d = fresh(ctx);
    ctx.emit(isa.alu(&isa.add, d, reg(R11), offset)?);
    Ok(NtValue::Reg(d))
}

// arithmetic

fn binary(isa: &ArmInstructions, desc: &Arc<InstructionDesc>, ctx: &mut CodeGenContext<'_>, args: &[NtValue]) -> CodegenResult<NtValue> {
    let d = fresh(ctx);
    ctx.emit(isa.alu(desc, d, args[0].reg()?, args[1].reg()?)?);
    Ok(NtValue::Reg(d))
}

/// 32-bit operation followed by a mask into a second fresh register.
fn masked(isa: &ArmInstructions, desc: &Arc<InstructionDesc>, ctx: &mut CodeGenContext<'_>, args: &[NtValue]) -> CodegenResult<NtValue> {
    let wide = binary(isa, desc, ctx, args)?.reg()?;
    let d = fresh(ctx);
    ctx.emit(isa.alu_imm(&isa.and_imm, d, wide, 0xff)?);
    Ok(NtValue::Reg(d))
}

fn three(isa: &ArmInstructions, desc: &Arc<InstructionDesc>, ctx: &mut CodeGenContext<'_>, args: &[NtValue]) -> CodegenResult<NtValue> {
    let d = fresh(ctx);
    ctx.emit(isa.three(desc, d, args[0].reg()?, args[1].reg()?)?);
    Ok(NtValue::Reg(d))
}

fn add(isa: &ArmInstructions, ctx: &mut CodeGenContext<'_>, _: &NodeRef<'_, '_>, args: &[NtValue]) -> CodegenResult<NtValue> {
    binary(isa, &isa.add, ctx, args)
}

fn add_byte(isa: &ArmInstructions, ctx: &mut CodeGenContext<'_>, _: &NodeRef<'_, '_>, args: &[NtValue]) -> CodegenResult<NtValue> {
    masked(isa, &isa.add, ctx, args)
}

fn add_immediate(isa: &ArmInstructions, ctx: &mut CodeGenContext<'_>, node: &NodeRef<'_, '_>, args: &[NtValue]) -> CodegenResult<NtValue> {
    let d = fresh(ctx);
    ctx.emit(isa.alu_imm(&isa.add_imm, d, args[0].reg()?, constant(&node.child(1))?)?);
    Ok(NtValue::Reg(d))
}

fn add_immediate_left(isa: &ArmInstructions, ctx: &mut CodeGenContext<'_>, node: &NodeRef<'_, '_>, args: &[NtValue]) -> CodegenResult<NtValue> {
    let d = fresh(ctx);
    ctx.emit(isa.alu_imm(&isa.add_imm, d, args[0].reg()?, constant(&node.child(0))?)?);
    Ok(NtValue::Reg(d))
}

fn sub(isa: &ArmInstructions, ctx: &mut CodeGenContext<'_>, _: &NodeRef<'_, '_>, args: &[NtValue]) -> CodegenResult<NtValue> {
    binary(isa, &isa.sub, ctx, args)
}

fn sub_byte(isa: &ArmInstructions, ctx: &mut CodeGenContext<'_>, _: &NodeRef<'_, '_>, args: &[NtValue]) -> CodegenResult<NtValue> {
    masked(isa, &isa.sub, ctx, args)
}

fn sub_immediate(isa: &ArmInstructions, ctx: &mut CodeGenContext<'_>, node: &NodeRef<'_, '_>, args: &[NtValue]) -> CodegenResult<NtValue> {
    let d = fresh(ctx);
    ctx.emit(isa.alu_imm(&isa.sub_imm, d, args[0].reg()?, constant(&node.child(1))?)?);
    Ok(NtValue::Reg(d))
}

fn and(isa: &ArmInstructions, ctx: &mut CodeGenContext<'_>, _: &NodeRef<'_, '_>, args: &[NtValue]) -> CodegenResult<NtValue> {
    binary(isa, &isa.and, ctx, args)
}

fn or(isa: &ArmInstructions, ctx: &mut CodeGenContext<'_>, _: &NodeRef<'_, '_>, args: &[NtValue]) -> CodegenResult<NtValue> {
    binary(isa, &isa.orr, ctx, args)
}

fn xor(isa: &ArmInstructions, ctx: &mut CodeGenContext<'_>, _: &NodeRef<'_, '_>, args: &[NtValue]) -> CodegenResult<NtValue> {
    binary(isa, &isa.eor, ctx, args)
}

fn shift_left(isa: &ArmInstructions, ctx: &mut CodeGenContext<'_>, _: &NodeRef<'_, '_>, args: &[NtValue]) -> CodegenResult<NtValue> {
    three(isa, &isa.lsl, ctx, args)
}

fn shift_right_logical(isa: &ArmInstructions, ctx: &mut CodeGenContext<'_>, _: &NodeRef<'_, '_>, args: &[NtValue]) -> CodegenResult<NtValue> {
    three(isa, &isa.lsr, ctx, args)
}

fn shift_right_arithmetic(isa: &ArmInstructions, ctx: &mut CodeGenContext<'_>, _: &NodeRef<'_, '_>, args: &[NtValue]) -> CodegenResult<NtValue> {
    three(isa, &isa.asr, ctx, args)
}

fn multiply(isa: &ArmInstructions, ctx: &mut CodeGenContext<'_>, _: &NodeRef<'_, '_>, args: &[NtValue]) -> CodegenResult<NtValue> {
    three(isa, &isa.mul, ctx, args)
}

fn negate(isa: &ArmInstructions, ctx: &mut CodeGenContext<'_>, _: &NodeRef<'_, '_>, args: &[NtValue]) -> CodegenResult<NtValue> {
    let d = fresh(ctx);
    ctx.emit(isa.alu_imm(&isa.rsb_imm, d, args[0].reg()?, 0)?);
    Ok(NtValue::Reg(d))
}

// loads

fn load(isa: &ArmInstructions, desc: &Arc<InstructionDesc>, ctx: &mut CodeGenContext<'_>, address: NtValue) -> CodegenResult<Register> {
    let (base, offset) = address.mem()?;
    let d = fresh(ctx);
    ctx.emit(isa.mem(desc, d, base, offset)?);
    Ok(d)
}

fn load_word(isa: &ArmInstructions, ctx: &mut CodeGenContext<'_>, _: &NodeRef<'_, '_>, args: &[NtValue]) -> CodegenResult<NtValue> {
    Ok(NtValue::Reg(load(isa, &isa.ldr, ctx, args[0])?))
}

fn load_word_offset(isa: &ArmInstructions, ctx: &mut CodeGenContext<'_>, node: &NodeRef<'_, '_>, args: &[NtValue]) -> CodegenResult<NtValue> {
    let address = NtValue::Mem {
        base: args[0].reg()?,
        offset: constant(&node.child(0).child(1))?,
    };
    Ok(NtValue::Reg(load(isa, &isa.ldr, ctx, address)?))
}

fn load_byte(isa: &ArmInstructions, ctx: &mut CodeGenContext<'_>, _: &NodeRef<'_, '_>, args: &[NtValue]) -> CodegenResult<NtValue> {
    Ok(NtValue::Reg(load(isa, &isa.ldrb, ctx, args[0])?))
}

fn load_signed_byte(isa: &ArmInstructions, ctx: &mut CodeGenContext<'_>, _: &NodeRef<'_, '_>, args: &[NtValue]) -> CodegenResult<NtValue> {
    let byte = load(isa, &isa.ldrb, ctx, args[0])?;
    Ok(NtValue::Reg(sign_extend(isa, ctx, byte, 8)?))
}

fn load_halfword(_: &ArmInstructions, _: &mut CodeGenContext<'_>, node: &NodeRef<'_, '_>, _: &[NtValue]) -> CodegenResult<NtValue> {
    Err(CodegenError::unimplemented(format!("{} (halfword load)", node.op())))
}

// runtime calls

/// Marshal operands into r1, r2, call `routine`, copy r0 into a fresh register.
fn runtime_call(isa: &ArmInstructions, ctx: &mut CodeGenContext<'_>, routine: &str, args: &[NtValue]) -> CodegenResult<Register> {
    for (arg, fixed) in args.iter().zip([R1, R2]) {
        ctx.move_register(reg(fixed), arg.reg()?)?;
    }
    ctx.declare_external(routine);
    ctx.emit(isa.call(routine)?);
    let d = fresh(ctx);
    ctx.move_register(d, reg(R0))?;
    Ok(d)
}

fn divide_call(isa: &ArmInstructions, ctx: &mut CodeGenContext<'_>, _: &NodeRef<'_, '_>, args: &[NtValue]) -> CodegenResult<NtValue> {
    Ok(NtValue::Reg(runtime_call(isa, ctx, "__sdiv", args)?))
}

fn divide_unsigned_call(isa: &ArmInstructions, ctx: &mut CodeGenContext<'_>, _: &NodeRef<'_, '_>, args: &[NtValue]) -> CodegenResult<NtValue> {
    Ok(NtValue::Reg(runtime_call(isa, ctx, "__udiv", args)?))
}

/// `a - (a / b) * b`
fn remainder_of(isa: &ArmInstructions, ctx: &mut CodeGenContext<'_>, quotient: Register, args: &[NtValue]) -> CodegenResult<NtValue> {
    let d = fresh(ctx);
    ctx.emit(isa.mls(d, quotient, args[1].reg()?, args[0].reg()?)?);
    Ok(NtValue::Reg(d))
}

fn remainder_call(isa: &ArmInstructions, ctx: &mut CodeGenContext<'_>, _: &NodeRef<'_, '_>, args: &[NtValue]) -> CodegenResult<NtValue> {
    let quotient = runtime_call(isa, ctx, "__sdiv", args)?;
    remainder_of(isa, ctx, quotient, args)
}

fn invert_call(isa: &ArmInstructions, ctx: &mut CodeGenContext<'_>, _: &NodeRef<'_, '_>, args: &[NtValue]) -> CodegenResult<NtValue> {
    Ok(NtValue::Reg(runtime_call(isa, ctx, "__inv32", args)?))
}

fn divide(isa: &ArmInstructions, ctx: &mut CodeGenContext<'_>, _: &NodeRef<'_, '_>, args: &[NtValue]) -> CodegenResult<NtValue> {
    three(isa, &isa.sdiv, ctx, args)
}

fn divide_unsigned(isa: &ArmInstructions, ctx: &mut CodeGenContext<'_>, _: &NodeRef<'_, '_>, args: &[NtValue]) -> CodegenResult<NtValue> {
    three(isa, &isa.udiv, ctx, args)
}

fn remainder(isa: &ArmInstructions, ctx: &mut CodeGenContext<'_>, _: &NodeRef<'_, '_>, args: &[NtValue]) -> CodegenResult<NtValue> {
    let quotient = three(isa, &isa.sdiv, ctx, args)?.reg()?;
    remainder_of(isa, ctx, quotient, args)
}

/// Build the selection grammar for `options`.
pub fn grammar(isa: &Arc<ArmInstructions>, options: &ArmOptions) -> CodegenResult<Grammar> {
    let mut g = GrammarBuilder::new(&["stm", "reg", "mem"]);

    g.rule("stm", &["reg"]).cost(0).emit(lower(isa, to_statement));
    g.rule("mem", &["reg"]).cost(0).emit(lower(isa, reg_address));
    g.rule("mem", &["ADDI32(reg, CONSTI32)", "ADDU32(reg, CONSTU32)"])
        .cost(0)
        .when(|n| child_const_in(n, 1, -4095, 4095))
        .emit(lower(isa, offset_address));
    g.rule("mem", &["FPRELI32", "FPRELU32"])
        .cost(0)
        .when(|n| frame_offset_in(n, 4095))
        .emit(lower(isa, frame_slot));

    g.rule("stm", &["STRI32(mem, reg)", "STRU32(mem, reg)"])
        .size(4)
        .cycles(1)
        .emit(lower(isa, store_word));
    g.rule("stm", &["STRI8(mem, reg)", "STRU8(mem, reg)"])
        .size(4)
        .cycles(1)
        .emit(lower(isa, store_byte));
    g.rule("stm", &["JMP"]).size(4).emit(lower(isa, jump));
    g.rule(
        "stm",
        &["CJMPI32(reg, reg)", "CJMPU32(reg, reg)", "CJMPU16(reg, reg)", "CJMPU8(reg, reg)"],
    )
    .size(12)
    .emit(lower(isa, conditional_jump));
    g.rule("stm", &["CJMPI16(reg, reg)", "CJMPI8(reg, reg)"])
        .size(28)
        .emit(lower(isa, conditional_jump));

    g.rule("reg", &["MOVI32(reg)", "MOVU32(reg)", "MOVI8(reg)", "MOVU8(reg)"])
        .size(4)
        .emit(lower(isa, copy));
    g.rule("reg", &["REGI32", "REGU32", "REGI8", "REGU8"])
        .cost(0)
        .emit(lower(isa, register));
    g.rule(
        "reg",
        &["I32TOI32(reg)", "I32TOU32(reg)", "U32TOI32(reg)", "U32TOU32(reg)", "U8TOI32(reg)", "U8TOU32(reg)"],
    )
    .cost(0)
    .emit(lower(isa, same));
    g.rule("reg", &["I8TOI32(reg)", "I8TOU32(reg)"])
        .size(8)
        .emit(lower(isa, sign_extend_byte));
    g.rule("reg", &["I32TOI8(reg)", "I32TOU8(reg)", "U32TOI8(reg)", "U32TOU8(reg)"])
        .size(4)
        .emit(lower(isa, truncate_byte));

    g.rule("reg", &["CONSTI32", "CONSTU32"])
        .size(8)
        .emit(lower(isa, pooled_constant));
    g.rule("reg", &["CONSTI32", "CONSTU32"])
        .size(4)
        .when(|n| n.constant().is_some_and(|c| (0..256).contains(&c)))
        .emit(lower(isa, small_constant));
    g.rule("reg", &["CONSTI8", "CONSTU8"])
        .size(4)
        .when(|n| n.constant().is_some_and(|c| (-128..=255).contains(&c)))
        .emit(lower(isa, byte_constant));
    g.rule("reg", &["LABEL"]).size(8).emit(lower(isa, label_address));
    g.rule("reg", &["FPRELI32", "FPRELU32"])
        .size(4)
        .when(|n| frame_offset_in(n, 255))
        .emit(lower(isa, frame_address));
    g.rule("reg", &["FPRELI32", "FPRELU32"])
        .size(12)
        .cycles(2)
        .emit(lower(isa, far_frame_address));

    g.rule("reg", &["ADDI32(reg, reg)", "ADDU32(reg, reg)"])
        .size(4)
        .emit(lower(isa, add));
    g.rule("reg", &["ADDI32(reg, CONSTI32)", "ADDU32(reg, CONSTU32)"])
        .size(4)
        .when(|n| child_const_in(n, 1, 0, 255))
        .emit(lower(isa, add_immediate));
    g.rule("reg", &["ADDI32(CONSTI32, reg)", "ADDU32(CONSTU32, reg)"])
        .size(4)
        .when(|n| child_const_in(n, 0, 0, 255))
        .emit(lower(isa, add_immediate_left));
    g.rule("reg", &["ADDI8(reg, reg)", "ADDU8(reg, reg)"])
        .size(8)
        .emit(lower(isa, add_byte));
    g.rule("reg", &["SUBI32(reg, reg)", "SUBU32(reg, reg)"])
        .size(4)
        .emit(lower(isa, sub));
    g.rule("reg", &["SUBI32(reg, CONSTI32)", "SUBU32(reg, CONSTU32)"])
        .size(4)
        .when(|n| child_const_in(n, 1, 0, 255))
        .emit(lower(isa, sub_immediate));
    g.rule("reg", &["SUBI8(reg, reg)", "SUBU8(reg, reg)"])
        .size(8)
        .emit(lower(isa, sub_byte));

    g.rule("reg", &["LDRI32(mem)", "LDRU32(mem)"])
        .size(4)
        .cycles(2)
        .emit(lower(isa, load_word));
    g.rule("reg", &["LDRI32(ADDI32(reg, CONSTI32))"])
        .size(4)
        .cycles(2)
        .when(|n| child_const_in(&n.child(0), 1, -4095, 4095))
        .emit(lower(isa, load_word_offset));
    g.rule("reg", &["LDRU8(mem)"])
        .size(4)
        .cycles(2)
        .emit(lower(isa, load_byte));
    g.rule("reg", &["LDRI8(mem)"])
        .size(12)
        .cycles(2)
        .emit(lower(isa, load_signed_byte));
    g.rule("reg", &["LDRI16(mem)", "LDRU16(mem)"])
        .size(4)
        .cycles(2)
        .emit(lower(isa, load_halfword));

    g.rule(
        "reg",
        &["ANDI8(reg, reg)", "ANDU8(reg, reg)", "ANDI16(reg, reg)", "ANDU16(reg, reg)", "ANDI32(reg, reg)", "ANDU32(reg, reg)"],
    )
    .size(4)
    .emit(lower(isa, and));
    g.rule(
        "reg",
        &["ORI8(reg, reg)", "ORU8(reg, reg)", "ORI16(reg, reg)", "ORU16(reg, reg)", "ORI32(reg, reg)", "ORU32(reg, reg)"],
    )
    .size(4)
    .emit(lower(isa, or));
    g.rule(
        "reg",
        &["XORI8(reg, reg)", "XORU8(reg, reg)", "XORI16(reg, reg)", "XORU16(reg, reg)", "XORI32(reg, reg)", "XORU32(reg, reg)"],
    )
    .size(4)
    .emit(lower(isa, xor));

    g.rule("reg", &["SHLI32(reg, reg)", "SHLU32(reg, reg)"])
        .size(4)
        .emit(lower(isa, shift_left));
    g.rule("reg", &["SHRU32(reg, reg)"])
        .size(4)
        .emit(lower(isa, shift_right_logical));
    g.rule("reg", &["SHRI32(reg, reg)"])
        .size(4)
        .emit(lower(isa, shift_right_arithmetic));
    g.rule("reg", &["MULI32(reg, reg)", "MULU32(reg, reg)"])
        .size(4)
        .cycles(2)
        .emit(lower(isa, multiply));
    g.rule("reg", &["NEGI32(reg)"]).size(4).emit(lower(isa, negate));

    g.rule("reg", &["DIVI32(reg, reg)"])
        .size(16)
        .cycles(40)
        .emit(lower(isa, divide_call));
    g.rule("reg", &["DIVU32(reg, reg)"])
        .size(16)
        .cycles(40)
        .emit(lower(isa, divide_unsigned_call));
    g.rule("reg", &["REMI32(reg, reg)"])
        .size(20)
        .cycles(42)
        .emit(lower(isa, remainder_call));
    g.rule("reg", &["INVI32(reg)"])
        .size(12)
        .cycles(10)
        .emit(lower(isa, invert_call));

    if options.hardware_divide {
        g.rule("reg", &["DIVI32(reg, reg)"])
            .size(4)
            .cycles(10)
            .emit(lower(isa, divide));
        g.rule("reg", &["DIVU32(reg, reg)"])
            .size(4)
            .cycles(10)
            .emit(lower(isa, divide_unsigned));
        g.rule("reg", &["REMI32(reg, reg)"])
            .size(8)
            .cycles(12)
            .emit(lower(isa, remainder));
    }

    g.build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{IrDag, IrType, OpKind, Operator};
    use bumpalo::Bump;

    #[test]
    fn test_frame_offset_limits() {
        let arena = Bump::new();
        let mut dag = IrDag::new(&arena);
        let op = Operator::new(OpKind::FpRel, IrType::I32);
        let near = dag.add(op, &[], IrValue::FrameOffset(-255)).unwrap();
        let extreme = dag.add(op, &[], IrValue::FrameOffset(i64::MIN)).unwrap();

        assert!(frame_offset_in(&dag.view(near), 255));
        assert!(!frame_offset_in(&dag.view(near), 254));
        assert!(!frame_offset_in(&dag.view(extreme), 4095));
    }
}
