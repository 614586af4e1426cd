// This module is the ARM instruction table. Every class is built once from a
// declarative description: the token layout it occupies, its operands, its syntax
// template and a pattern dictionary. Families that differ only in opcode (the
// three-register and register-immediate ALU groups) come out of small table-driven
// builder functions, and condition-coded variants (beq, movls, subne, ...) are
// derived by value from their AL base with derive_conditional. Layouts that are not
// a plain field dictionary (multiply, divide, register shifts, signed load/store
// offsets) pair a partial dictionary with an explicit encoder that writes the
// remaining bits. ArmInstructions also offers typed constructors for the selection
// rules, so emitters never assemble operand vectors by hand.

//! ARM instruction classes.

use super::relocations::{ADR_IMM12, CALL24, IMM24, LDR_IMM12};
use super::tokens::ArmTokens;
use crate::arm::registers::{COPROC, COREG, GENERAL};
use crate::core::error::CodegenResult;
use crate::core::register::Register;
use crate::encoding::{
    ConstructorDesc, Encoder, Instruction, InstructionDesc, OperandDecl, OperandValue, Transform, Usage,
};
use std::sync::Arc;

/// Condition field values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Condition {
    Eq = 0,
    Ne = 1,
    Cs = 2,
    Cc = 3,
    Mi = 4,
    Pl = 5,
    Vs = 6,
    Vc = 7,
    Hi = 8,
    Ls = 9,
    Ge = 10,
    Lt = 11,
    Gt = 12,
    Le = 13,
    Al = 14,
}

impl Condition {
    pub fn code(self) -> i64 {
        self as i64
    }

    /// Mnemonic suffix; empty for AL.
    pub fn suffix(self) -> &'static str {
        match self {
            Condition::Eq => "eq",
            Condition::Ne => "ne",
            Condition::Cs => "cs",
            Condition::Cc => "cc",
            Condition::Mi => "mi",
            Condition::Pl => "pl",
            Condition::Vs => "vs",
            Condition::Vc => "vc",
            Condition::Hi => "hi",
            Condition::Ls => "ls",
            Condition::Ge => "ge",
            Condition::Lt => "lt",
            Condition::Gt => "gt",
            Condition::Le => "le",
            Condition::Al => "",
        }
    }
}

const AL: i64 = Condition::Al as i64;

/// Copy of `base` executing only under `cond`, with the condition appended
/// to its mnemonic.
pub fn derive_conditional(base: &InstructionDesc, cond: Condition) -> CodegenResult<Arc<InstructionDesc>> {
    base.derive_variant("cond", cond.code(), cond.suffix())
}

/// Shift applied to the register operand of data-processing instructions.
#[derive(Debug, Clone)]
pub struct Shifts {
    pub none: Arc<ConstructorDesc>,
    pub lsl: Arc<ConstructorDesc>,
    pub lsr: Arc<ConstructorDesc>,
    pub asr: Arc<ConstructorDesc>,
}

impl Shifts {
    fn new() -> CodegenResult<Self> {
        let shift = |name: &'static str, syntax: &'static str, typ: i64| {
            ConstructorDesc::builder(name)
                .operand(OperandDecl::immediate("n", 0, 31))
                .syntax(syntax)
                .set("shift_typ", typ)
                .bind("shift_imm", "n")
                .build()
        };
        Ok(Self {
            none: ConstructorDesc::builder("NoShift")
                .set("shift_typ", 0)
                .set("shift_imm", 0)
                .build()?,
            lsl: shift("ShiftLsl", ", lsl {n}", 0)?,
            lsr: shift("ShiftLsr", ", lsr {n}", 1)?,
            asr: shift("ShiftAsr", ", asr {n}", 2)?,
        })
    }

    fn all(&self) -> [Arc<ConstructorDesc>; 4] {
        [
            Arc::clone(&self.none),
            Arc::clone(&self.lsl),
            Arc::clone(&self.lsr),
            Arc::clone(&self.asr),
        ]
    }
}

fn set_regs(e: &mut Encoder<'_>, fields: &[(u32, &str)]) -> CodegenResult<()> {
    for (offset, operand) in fields {
        let num = e.reg(operand)?;
        e.token(0)?.set_bits(*offset, 4, num)?;
    }
    Ok(())
}

fn encode_mul(e: &mut Encoder<'_>) -> CodegenResult<()> {
    set_regs(e, &[(0, "rn"), (8, "rm"), (16, "rd")])?;
    e.token(0)?.set_bits(4, 4, 0b1001)
}

fn encode_divide(e: &mut Encoder<'_>, op: u64) -> CodegenResult<()> {
    set_regs(e, &[(0, "rn"), (8, "rm"), (16, "rd")])?;
    let word = e.token(0)?;
    word.set_bits(4, 4, 0b0001)?;
    word.set_bits(12, 4, 0b1111)?;
    word.set_bits(20, 8, op)
}

fn encode_sdiv(e: &mut Encoder<'_>) -> CodegenResult<()> {
    encode_divide(e, 0b0111_0001)
}

fn encode_udiv(e: &mut Encoder<'_>) -> CodegenResult<()> {
    encode_divide(e, 0b0111_0011)
}

fn encode_mls(e: &mut Encoder<'_>) -> CodegenResult<()> {
    set_regs(e, &[(0, "rn"), (8, "rm"), (12, "ra"), (16, "rd")])?;
    let word = e.token(0)?;
    word.set_bits(4, 4, 0b1001)?;
    word.set_bits(20, 8, 0b0000_0110)
}

fn encode_shift_register(e: &mut Encoder<'_>, op: u64) -> CodegenResult<()> {
    set_regs(e, &[(0, "rn"), (8, "rm"), (12, "rd")])?;
    let word = e.token(0)?;
    word.set_bits(4, 4, op)?;
    word.set_bits(21, 7, 0b1101)
}

fn encode_lsl(e: &mut Encoder<'_>) -> CodegenResult<()> {
    encode_shift_register(e, 0b0001)
}

fn encode_lsr(e: &mut Encoder<'_>) -> CodegenResult<()> {
    encode_shift_register(e, 0b0011)
}

fn encode_asr(e: &mut Encoder<'_>) -> CodegenResult<()> {
    encode_shift_register(e, 0b0101)
}

/// Up/down bit plus offset magnitude.
fn encode_offset(e: &mut Encoder<'_>) -> CodegenResult<()> {
    let offset = e.imm("offset")?;
    let word = e.token(0)?;
    word.set_field("u", i64::from(offset >= 0))?;
    word.set_field("imm12", offset.abs())
}

/// The ARM instruction table.
#[derive(Debug)]
pub struct ArmInstructions {
    pub tokens: ArmTokens,
    pub shifts: Shifts,

    pub mov_imm: Arc<InstructionDesc>,
    pub mov_reg: Arc<InstructionDesc>,
    pub movls: Arc<InstructionDesc>,
    pub cmp_imm: Arc<InstructionDesc>,
    pub cmp_reg: Arc<InstructionDesc>,
    pub mul: Arc<InstructionDesc>,
    pub sdiv: Arc<InstructionDesc>,
    pub udiv: Arc<InstructionDesc>,
    pub mls: Arc<InstructionDesc>,

    pub adc: Arc<InstructionDesc>,
    pub add: Arc<InstructionDesc>,
    pub and: Arc<InstructionDesc>,
    pub eor: Arc<InstructionDesc>,
    pub orr: Arc<InstructionDesc>,
    pub sub: Arc<InstructionDesc>,
    pub subcc: Arc<InstructionDesc>,
    pub subcs: Arc<InstructionDesc>,
    pub subne: Arc<InstructionDesc>,

    pub adc_imm: Arc<InstructionDesc>,
    pub add_imm: Arc<InstructionDesc>,
    pub and_imm: Arc<InstructionDesc>,
    pub eor_imm: Arc<InstructionDesc>,
    pub orr_imm: Arc<InstructionDesc>,
    pub rsb_imm: Arc<InstructionDesc>,
    pub rsc_imm: Arc<InstructionDesc>,
    pub sbc_imm: Arc<InstructionDesc>,
    pub sub_imm: Arc<InstructionDesc>,

    pub lsl: Arc<InstructionDesc>,
    pub lsr: Arc<InstructionDesc>,
    pub asr: Arc<InstructionDesc>,

    pub b: Arc<InstructionDesc>,
    pub beq: Arc<InstructionDesc>,
    pub bne: Arc<InstructionDesc>,
    pub bgt: Arc<InstructionDesc>,
    pub bge: Arc<InstructionDesc>,
    pub blt: Arc<InstructionDesc>,
    pub ble: Arc<InstructionDesc>,
    pub bhi: Arc<InstructionDesc>,
    pub bls: Arc<InstructionDesc>,
    pub bhs: Arc<InstructionDesc>,
    pub blo: Arc<InstructionDesc>,
    pub bl: Arc<InstructionDesc>,
    pub blx: Arc<InstructionDesc>,
    pub push: Arc<InstructionDesc>,
    pub pop: Arc<InstructionDesc>,

    pub ldr: Arc<InstructionDesc>,
    pub str: Arc<InstructionDesc>,
    pub ldrb: Arc<InstructionDesc>,
    pub strb: Arc<InstructionDesc>,
    pub ldr_literal: Arc<InstructionDesc>,
    pub adr: Arc<InstructionDesc>,

    pub mcr: Arc<InstructionDesc>,
    pub mrc: Arc<InstructionDesc>,

    all: Vec<Arc<InstructionDesc>>,
}

fn reg_w(name: &'static str) -> OperandDecl {
    OperandDecl::register(name, GENERAL, Usage::Write)
}

fn reg_r(name: &'static str) -> OperandDecl {
    OperandDecl::register(name, GENERAL, Usage::Read)
}

/// Any value an `ArmExpandImm` transform may accept.
fn imm32(name: &'static str) -> OperandDecl {
    OperandDecl::immediate(name, i64::from(i32::MIN), i64::from(u32::MAX))
}

impl ArmInstructions {
    pub fn new() -> CodegenResult<Self> {
        let t = ArmTokens::new()?;
        let shifts = Shifts::new()?;
        let shift_set = shifts.all();

        let regregreg = |syntax: &'static str, opcode: i64| {
            InstructionDesc::builder(syntax)
                .token(&t.dp_reg)
                .operand(reg_w("rd"))
                .operand(reg_r("rn"))
                .operand(reg_r("rm"))
                .operand(OperandDecl::constructor("shift", &shift_set))
                .set("cond", AL)
                .set("opcode", opcode)
                .set("S", 0)
                .bind("Rn", "rn")
                .bind("Rd", "rd")
                .set("b4", 0)
                .bind("Rm", "rm")
                .build()
        };
        let regregimm = |syntax: &'static str, opcode: i64| {
            InstructionDesc::builder(syntax)
                .token(&t.dp_imm)
                .operand(reg_w("rd"))
                .operand(reg_r("rn"))
                .operand(imm32("imm"))
                .set("cond", AL)
                .set("opcode", opcode)
                .set("s", 0)
                .bind("rn", "rn")
                .bind("rd", "rd")
                .bind_with("imm12", Transform::ArmExpandImm, "imm")
                .build()
        };
        let three = |syntax: &'static str, encoder: crate::encoding::EncodeFn| {
            InstructionDesc::builder(syntax)
                .token(&t.word)
                .operand(reg_w("rd"))
                .operand(reg_r("rn"))
                .operand(reg_r("rm"))
                .set("cond", AL)
                .encoder(encoder)
                .build()
        };
        let load_store = |syntax: &'static str, rt: OperandDecl, byte: i64, load: i64| {
            InstructionDesc::builder(syntax)
                .token(&t.mem)
                .operand(rt)
                .operand(reg_r("rn"))
                .operand(OperandDecl::immediate("offset", -4095, 4095))
                .set("cond", AL)
                .set("op", 0b010)
                .set("p", 1)
                .set("b", byte)
                .set("w", 0)
                .set("l", load)
                .bind("rn", "rn")
                .bind("rt", "rt")
                .encoder(encode_offset)
                .build()
        };
        let block = |syntax: &'static str, opcode: i64, usage: Usage| {
            InstructionDesc::builder(syntax)
                .token(&t.block)
                .operand(OperandDecl::reg_list("reg_list", GENERAL, usage))
                .set("cond", AL)
                .set("opcode", opcode)
                .bind_with("reg_list", Transform::RegisterMask, "reg_list")
                .build()
        };

        let transfer = |syntax: &'static str, rt: OperandDecl, load: i64| {
            InstructionDesc::builder(syntax)
                .token(&t.coproc)
                .operand(OperandDecl::register("coproc", COPROC, Usage::Read))
                .operand(OperandDecl::unsigned("opc1", 3))
                .operand(rt)
                .operand(OperandDecl::register("crn", COREG, Usage::Read))
                .operand(OperandDecl::register("crm", COREG, Usage::Read))
                .operand(OperandDecl::unsigned("opc2", 3))
                .set("cond", AL)
                .set("opcode", 0b1110)
                .bind("opc1", "opc1")
                .set("l", load)
                .bind("crn", "crn")
                .bind("rt", "rt")
                .bind("coproc", "coproc")
                .bind("opc2", "opc2")
                .set("b4", 1)
                .bind("crm", "crm")
                .build()
        };

        let mov_reg = InstructionDesc::builder("mov {rd}, {rm}{shift}")
            .token(&t.dp_reg)
            .operand(reg_w("rd"))
            .operand(reg_r("rm"))
            .operand(OperandDecl::constructor("shift", &shift_set))
            .set("cond", AL)
            .set("opcode", 0b0001101)
            .set("S", 0)
            .set("Rn", 0)
            .bind("Rd", "rd")
            .set("b4", 0)
            .bind("Rm", "rm")
            .build()?;
        let sub = regregreg("sub {rd}, {rn}, {rm}{shift}", 0b0000010)?;

        let b = InstructionDesc::builder("b {target}")
            .token(&t.branch)
            .operand(OperandDecl::label("target"))
            .set("cond", AL)
            .set("opcode", 0b1010)
            .set("imm24", 0)
            .relocation(IMM24, "target")
            .build()?;

        let mut table = Self {
            mov_imm: InstructionDesc::builder("mov {rd}, {imm}")
                .token(&t.dp_imm)
                .operand(reg_w("rd"))
                .operand(imm32("imm"))
                .set("cond", AL)
                .set("opcode", 0b0011101)
                .set("s", 0)
                .set("rn", 0)
                .bind("rd", "rd")
                .bind_with("imm12", Transform::ArmExpandImm, "imm")
                .build()?,
            movls: derive_conditional(&mov_reg, Condition::Ls)?,
            mov_reg,
            cmp_imm: InstructionDesc::builder("cmp {rn}, {imm}")
                .token(&t.dp_imm)
                .operand(reg_r("rn"))
                .operand(imm32("imm"))
                .set("cond", AL)
                .set("opcode", 0b0011010)
                .set("s", 1)
                .bind("rn", "rn")
                .set("rd", 0)
                .bind_with("imm12", Transform::ArmExpandImm, "imm")
                .build()?,
            cmp_reg: InstructionDesc::builder("cmp {rn}, {rm}{shift}")
                .token(&t.dp_reg)
                .operand(reg_r("rn"))
                .operand(reg_r("rm"))
                .operand(OperandDecl::constructor("shift", &shift_set))
                .set("cond", AL)
                .set("opcode", 0b0001010)
                .set("S", 1)
                .bind("Rn", "rn")
                .set("Rd", 0)
                .set("b4", 0)
                .bind("Rm", "rm")
                .build()?,
            mul: three("mul {rd}, {rn}, {rm}", encode_mul)?,
            sdiv: three("sdiv {rd}, {rn}, {rm}", encode_sdiv)?,
            udiv: three("udiv {rd}, {rn}, {rm}", encode_udiv)?,
            mls: InstructionDesc::builder("mls {rd}, {rn}, {rm}, {ra}")
                .token(&t.word)
                .operand(reg_w("rd"))
                .operand(reg_r("rn"))
                .operand(reg_r("rm"))
                .operand(reg_r("ra"))
                .set("cond", AL)
                .encoder(encode_mls)
                .build()?,

            adc: regregreg("adc {rd}, {rn}, {rm}{shift}", 0b0000101)?,
            add: regregreg("add {rd}, {rn}, {rm}{shift}", 0b0000100)?,
            and: regregreg("and {rd}, {rn}, {rm}{shift}", 0b0000000)?,
            eor: regregreg("eor {rd}, {rn}, {rm}{shift}", 0b0000001)?,
            orr: regregreg("orr {rd}, {rn}, {rm}{shift}", 0b0001100)?,
            subcc: derive_conditional(&sub, Condition::Cc)?,
            subcs: derive_conditional(&sub, Condition::Cs)?,
            subne: derive_conditional(&sub, Condition::Ne)?,
            sub,

            adc_imm: regregimm("adc {rd}, {rn}, {imm}", 0b0010101)?,
            add_imm: regregimm("add {rd}, {rn}, {imm}", 0b0010100)?,
            and_imm: regregimm("and {rd}, {rn}, {imm}", 0b0010000)?,
            eor_imm: regregimm("eor {rd}, {rn}, {imm}", 0b0010001)?,
            orr_imm: regregimm("orr {rd}, {rn}, {imm}", 0b0011100)?,
            rsb_imm: regregimm("rsb {rd}, {rn}, {imm}", 0b0010011)?,
            rsc_imm: regregimm("rsc {rd}, {rn}, {imm}", 0b0010111)?,
            sbc_imm: regregimm("sbc {rd}, {rn}, {imm}", 0b0010110)?,
            sub_imm: regregimm("sub {rd}, {rn}, {imm}", 0b0010010)?,

            lsl: three("lsl {rd}, {rn}, {rm}", encode_lsl)?,
            lsr: three("lsr {rd}, {rn}, {rm}", encode_lsr)?,
            asr: three("asr {rd}, {rn}, {rm}", encode_asr)?,

            beq: derive_conditional(&b, Condition::Eq)?,
            bne: derive_conditional(&b, Condition::Ne)?,
            bgt: derive_conditional(&b, Condition::Gt)?,
            bge: derive_conditional(&b, Condition::Ge)?,
            blt: derive_conditional(&b, Condition::Lt)?,
            ble: derive_conditional(&b, Condition::Le)?,
            bhi: derive_conditional(&b, Condition::Hi)?,
            bls: derive_conditional(&b, Condition::Ls)?,
            // hs and lo are the unsigned spellings of cs and cc
            bhs: b.derive_variant("cond", Condition::Cs.code(), "hs")?,
            blo: b.derive_variant("cond", Condition::Cc.code(), "lo")?,
            b,
            bl: InstructionDesc::builder("bl {target}")
                .token(&t.branch)
                .operand(OperandDecl::label("target"))
                .set("cond", AL)
                .set("opcode", 0b1011)
                .set("imm24", 0)
                .relocation(CALL24, "target")
                .build()?,
            blx: InstructionDesc::builder("blx {rm}")
                .token(&t.blx)
                .operand(reg_r("rm"))
                .set("cond", AL)
                .set("fixed", 0x12fff3)
                .bind("Rm", "rm")
                .build()?,
            push: block("push {reg_list}", 0b1001_0010_1101, Usage::Read)?,
            pop: block("pop {reg_list}", 0b1000_1011_1101, Usage::Write)?,

            ldr: load_store("ldr {rt}, [{rn}, {offset}]", reg_w("rt"), 0, 1)?,
            str: load_store("str {rt}, [{rn}, {offset}]", reg_r("rt"), 0, 0)?,
            ldrb: load_store("ldrb {rt}, [{rn}, {offset}]", reg_w("rt"), 1, 1)?,
            strb: load_store("strb {rt}, [{rn}, {offset}]", reg_r("rt"), 1, 0)?,
            ldr_literal: InstructionDesc::builder("ldr {rt}, {label}")
                .token(&t.mem)
                .operand(reg_w("rt"))
                .operand(OperandDecl::label("label"))
                .set("cond", AL)
                .set("op", 0b010)
                .set("p", 1)
                .set("u", 0)
                .set("b", 0)
                .set("w", 0)
                .set("l", 1)
                .set("rn", 15)
                .bind("rt", "rt")
                .set("imm12", 0)
                .relocation(LDR_IMM12, "label")
                .build()?,
            adr: InstructionDesc::builder("adr {rd}, {label}")
                .token(&t.dp_imm)
                .operand(reg_w("rd"))
                .operand(OperandDecl::label("label"))
                .set("cond", AL)
                .set("opcode", 0b0010100)
                .set("s", 0)
                .set("rn", 15)
                .bind("rd", "rd")
                .set("imm12", 0)
                .relocation(ADR_IMM12, "label")
                .build()?,

            mcr: transfer("mcr {coproc}, {opc1}, {rt}, {crn}, {crm}, {opc2}", reg_r("rt"), 0)?,
            mrc: transfer("mrc {coproc}, {opc1}, {rt}, {crn}, {crm}, {opc2}", reg_w("rt"), 1)?,

            tokens: t.clone(),
            shifts: shifts.clone(),
            all: Vec::new(),
        };
        table.all = vec![
            Arc::clone(&table.mov_imm),
            Arc::clone(&table.mov_reg),
            Arc::clone(&table.movls),
            Arc::clone(&table.cmp_imm),
            Arc::clone(&table.cmp_reg),
            Arc::clone(&table.mul),
            Arc::clone(&table.sdiv),
            Arc::clone(&table.udiv),
            Arc::clone(&table.mls),
            Arc::clone(&table.adc),
            Arc::clone(&table.add),
            Arc::clone(&table.and),
            Arc::clone(&table.eor),
            Arc::clone(&table.orr),
            Arc::clone(&table.sub),
            Arc::clone(&table.subcc),
            Arc::clone(&table.subcs),
            Arc::clone(&table.subne),
            Arc::clone(&table.adc_imm),
            Arc::clone(&table.add_imm),
            Arc::clone(&table.and_imm),
            Arc::clone(&table.eor_imm),
            Arc::clone(&table.orr_imm),
            Arc::clone(&table.rsb_imm),
            Arc::clone(&table.rsc_imm),
            Arc::clone(&table.sbc_imm),
            Arc::clone(&table.sub_imm),
            Arc::clone(&table.lsl),
            Arc::clone(&table.lsr),
            Arc::clone(&table.asr),
            Arc::clone(&table.b),
            Arc::clone(&table.beq),
            Arc::clone(&table.bne),
            Arc::clone(&table.bgt),
            Arc::clone(&table.bge),
            Arc::clone(&table.blt),
            Arc::clone(&table.ble),
            Arc::clone(&table.bhi),
            Arc::clone(&table.bls),
            Arc::clone(&table.bhs),
            Arc::clone(&table.blo),
            Arc::clone(&table.bl),
            Arc::clone(&table.blx),
            Arc::clone(&table.push),
            Arc::clone(&table.pop),
            Arc::clone(&table.ldr),
            Arc::clone(&table.str),
            Arc::clone(&table.ldrb),
            Arc::clone(&table.strb),
            Arc::clone(&table.ldr_literal),
            Arc::clone(&table.adr),
            Arc::clone(&table.mcr),
            Arc::clone(&table.mrc),
        ];
        log::debug!("arm instruction table: {} classes", table.all.len());
        Ok(table)
    }

    /// Every class, in parsing order.
    pub fn all(&self) -> &[Arc<InstructionDesc>] {
        &self.all
    }

    pub fn no_shift(&self) -> CodegenResult<OperandValue> {
        Ok(self.shifts.none.instance(Vec::new())?.into())
    }

    /// Shift constructor `kind` by `n` bits.
    pub fn shift(&self, kind: &Arc<ConstructorDesc>, n: i64) -> CodegenResult<OperandValue> {
        Ok(kind.instance(vec![OperandValue::Imm(n)])?.into())
    }

    pub fn mov_reg(&self, rd: Register, rm: Register) -> CodegenResult<Instruction> {
        Instruction::new(&self.mov_reg, vec![rd.into(), rm.into(), self.no_shift()?])
    }

    pub fn mov_shifted(&self, rd: Register, rm: Register, shift: OperandValue) -> CodegenResult<Instruction> {
        Instruction::new(&self.mov_reg, vec![rd.into(), rm.into(), shift])
    }

    pub fn mov_imm(&self, rd: Register, imm: i64) -> CodegenResult<Instruction> {
        Instruction::new(&self.mov_imm, vec![rd.into(), imm.into()])
    }

    pub fn cmp_reg(&self, rn: Register, rm: Register) -> CodegenResult<Instruction> {
        Instruction::new(&self.cmp_reg, vec![rn.into(), rm.into(), self.no_shift()?])
    }

    /// Three-register data-processing form without shift.
    pub fn alu(&self, desc: &Arc<InstructionDesc>, rd: Register, rn: Register, rm: Register) -> CodegenResult<Instruction> {
        Instruction::new(desc, vec![rd.into(), rn.into(), rm.into(), self.no_shift()?])
    }

    pub fn alu_imm(&self, desc: &Arc<InstructionDesc>, rd: Register, rn: Register, imm: i64) -> CodegenResult<Instruction> {
        Instruction::new(desc, vec![rd.into(), rn.into(), imm.into()])
    }

    /// `mul`, `sdiv`, `udiv` and the register shifts.
    pub fn three(&self, desc: &Arc<InstructionDesc>, rd: Register, rn: Register, rm: Register) -> CodegenResult<Instruction> {
        Instruction::new(desc, vec![rd.into(), rn.into(), rm.into()])
    }

    /// `rd = ra - rn * rm`
    pub fn mls(&self, rd: Register, rn: Register, rm: Register, ra: Register) -> CodegenResult<Instruction> {
        Instruction::new(&self.mls, vec![rd.into(), rn.into(), rm.into(), ra.into()])
    }

    pub fn branch(&self, desc: &Arc<InstructionDesc>, target: &str) -> CodegenResult<Instruction> {
        Instruction::new(desc, vec![OperandValue::Label(target.to_string())])
    }

    pub fn call(&self, target: &str) -> CodegenResult<Instruction> {
        self.branch(&self.bl, target)
    }

    /// `ldr`, `str`, `ldrb` or `strb` with an immediate offset.
    pub fn mem(&self, desc: &Arc<InstructionDesc>, rt: Register, rn: Register, offset: i64) -> CodegenResult<Instruction> {
        Instruction::new(desc, vec![rt.into(), rn.into(), offset.into()])
    }

    pub fn load_literal(&self, rt: Register, label: &str) -> CodegenResult<Instruction> {
        Instruction::new(&self.ldr_literal, vec![rt.into(), OperandValue::Label(label.to_string())])
    }

    pub fn push(&self, regs: &[Register]) -> CodegenResult<Instruction> {
        Instruction::new(&self.push, vec![OperandValue::RegList(regs.to_vec())])
    }

    pub fn pop(&self, regs: &[Register]) -> CodegenResult<Instruction> {
        Instruction::new(&self.pop, vec![OperandValue::RegList(regs.to_vec())])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arm::registers::{reg, LR, R0, R1, R11, R2, R3, R4};
    use crate::core::register::NoAssignment;

    fn word(ins: &Instruction) -> u32 {
        let bytes = ins.encode(&NoAssignment).unwrap();
        u32::from_le_bytes(bytes.try_into().unwrap())
    }

    #[test]
    fn test_data_processing_words() {
        let isa = ArmInstructions::new().unwrap();
        assert_eq!(word(&isa.mov_reg(reg(R0), reg(R1)).unwrap()), 0xE1A0_0001);
        assert_eq!(word(&isa.cmp_reg(reg(R1), reg(R2)).unwrap()), 0xE151_0002);
        assert_eq!(word(&isa.alu_imm(&isa.add_imm, reg(R2), reg(R3), 1000).unwrap()), 0xE283_2FFA);
        assert_eq!(word(&isa.mov_imm(reg(R0), 255).unwrap()), 0xE3A0_00FF);

        let shifted = isa.mov_shifted(reg(R0), reg(R1), isa.shift(&isa.shifts.lsl, 3).unwrap()).unwrap();
        assert_eq!(word(&shifted), 0xE1A0_0181);
    }

    #[test]
    fn test_explicit_encoders() {
        let isa = ArmInstructions::new().unwrap();
        assert_eq!(word(&isa.three(&isa.mul, reg(R0), reg(R1), reg(R2)).unwrap()), 0xE000_0291);
        assert_eq!(word(&isa.three(&isa.sdiv, reg(R0), reg(R1), reg(R2)).unwrap()), 0xE710_F211);
        assert_eq!(word(&isa.three(&isa.lsl, reg(R0), reg(R1), reg(R2)).unwrap()), 0xE1A0_0211);
        assert_eq!(word(&isa.mem(&isa.ldr, reg(R0), reg(R11), -8).unwrap()), 0xE51B_0008);
        assert_eq!(word(&isa.mem(&isa.str, reg(R0), reg(R11), 4).unwrap()), 0xE58B_0004);
    }

    #[test]
    fn test_coprocessor_transfers() {
        use crate::arm::registers::{coproc, coreg};
        let isa = ArmInstructions::new().unwrap();
        let operands = |rt| {
            vec![
                coproc(15).into(),
                OperandValue::Imm(0),
                reg(rt).into(),
                coreg(7).into(),
                coreg(5).into(),
                OperandValue::Imm(0),
            ]
        };
        let mcr = Instruction::new(&isa.mcr, operands(R0)).unwrap();
        assert_eq!(word(&mcr), 0xEE07_0F15);
        assert_eq!(mcr.uses(), vec![coproc(15), reg(R0), coreg(7), coreg(5)]);
        assert!(mcr.defs().is_empty());

        let mrc = Instruction::new(&isa.mrc, operands(R1)).unwrap();
        assert_eq!(word(&mrc), 0xEE17_1F15);
        assert_eq!(mrc.defs(), vec![reg(R1)]);

        // opc1 is three bits wide
        let mut bad = operands(R0);
        bad[1] = OperandValue::Imm(8);
        assert!(Instruction::new(&isa.mcr, bad).is_err());
        // a core register is not a coprocessor register
        let mut bad = operands(R0);
        bad[3] = reg(R2).into();
        assert!(Instruction::new(&isa.mcr, bad).is_err());
    }

    #[test]
    fn test_branches_and_lists() {
        let isa = ArmInstructions::new().unwrap();
        assert_eq!(word(&isa.branch(&isa.b, "x").unwrap()), 0xEA00_0000);
        assert_eq!(word(&isa.branch(&isa.beq, "x").unwrap()), 0x0A00_0000);
        assert_eq!(word(&isa.call("f").unwrap()), 0xEB00_0000);
        assert_eq!(word(&Instruction::new(&isa.blx, vec![reg(R3).into()]).unwrap()), 0xE12F_FF33);
        assert_eq!(word(&isa.push(&[reg(R4), reg(LR)]).unwrap()), 0xE92D_4010);
        assert_eq!(word(&isa.pop(&[reg(R4), reg(LR)]).unwrap()), 0xE8BD_4010);
    }

    #[test]
    fn test_conditional_variants_differ_only_in_condition() {
        let isa = ArmInstructions::new().unwrap();
        let base = word(&isa.alu(&isa.sub, reg(R0), reg(R1), reg(R2)).unwrap());
        for (desc, cond) in [(&isa.subcc, Condition::Cc), (&isa.subcs, Condition::Cs), (&isa.subne, Condition::Ne)] {
            let derived = word(&isa.alu(desc, reg(R0), reg(R1), reg(R2)).unwrap());
            assert_eq!(derived & 0x0FFF_FFFF, base & 0x0FFF_FFFF);
            assert_eq!(derived >> 28, cond.code() as u32);
        }
        assert_eq!(isa.movls.mnemonic(), "movls");
        assert_eq!(isa.bhs.mnemonic(), "bhs");
        assert_eq!(word(&Instruction::new(&isa.movls, isa.mov_reg(reg(R0), reg(R1)).unwrap().operands().to_vec()).unwrap()), 0x91A0_0001);
    }

    #[test]
    fn test_out_of_range_operands() {
        let isa = ArmInstructions::new().unwrap();
        assert!(isa.mem(&isa.ldr, reg(R0), reg(R1), 4096).is_err());
        let unencodable = isa.alu_imm(&isa.add_imm, reg(R0), reg(R1), 0x101).unwrap();
        assert!(unencodable.encode(&NoAssignment).is_err());
        assert!(isa.shift(&isa.shifts.lsl, 32).is_err());
    }
}
