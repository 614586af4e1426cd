// This module is the declarative instruction model. An architecture describes each
// instruction class once, as an immutable InstructionDesc: the tokens it occupies,
// its typed operands, a syntax template, and either a static pattern dictionary
// (field -> constant / operand / transformed operand) or an explicit encoder for
// layouts that are not a simple dictionary. Constructors are reusable operand
// fragments (shift modes) contributing both syntax and field values. Descriptors
// are validated when built: unknown or doubly-assigned fields, operands missing
// from the syntax, and incomplete dictionary encodings are all registration
// errors. Variants are derived by value (derive_variant) rather than by any form
// of inheritance, so derived classes share nothing mutable with their base.
// Instruction is a validated instance; encode() is a pure function of its
// operand values and the register assignment.

//! Instruction classes, operands and constructors.

use super::relocation::{RelocKind, RelocationDecl};
use super::syntax::{render_items, RegisterNames, Syntax};
use super::token::{encode_all, BitField, Token, TokenLayout};
use super::transform::Transform;
use crate::core::error::{CodegenError, CodegenResult};
use crate::core::register::{AsmReg, RegBank, Register, RegisterAssignment};
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

/// How an instruction touches a register operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Usage {
    None,
    Read,
    Write,
    ReadWrite,
}

impl Usage {
    pub fn reads(self) -> bool {
        matches!(self, Usage::Read | Usage::ReadWrite)
    }

    pub fn writes(self) -> bool {
        matches!(self, Usage::Write | Usage::ReadWrite)
    }
}

/// Operand type.
#[derive(Debug, Clone)]
pub enum OperandKind {
    Register(RegBank),
    /// Integer with an inclusive legal range.
    Immediate { min: i64, max: i64 },
    /// Symbol or label name.
    Label,
    RegList(RegBank),
    /// One of a closed set of constructors.
    Constructor(Arc<[Arc<ConstructorDesc>]>),
}

/// A named operand slot.
#[derive(Debug, Clone)]
pub struct OperandDecl {
    pub name: &'static str,
    pub kind: OperandKind,
    pub usage: Usage,
}

impl OperandDecl {
    pub fn register(name: &'static str, bank: RegBank, usage: Usage) -> Self {
        Self { name, kind: OperandKind::Register(bank), usage }
    }

    pub fn immediate(name: &'static str, min: i64, max: i64) -> Self {
        Self { name, kind: OperandKind::Immediate { min, max }, usage: Usage::None }
    }

    /// Immediate accepting any `bits`-bit unsigned value.
    pub fn unsigned(name: &'static str, bits: u32) -> Self {
        let max = if bits >= 63 { i64::MAX } else { (1i64 << bits) - 1 };
        Self::immediate(name, 0, max)
    }

    pub fn label(name: &'static str) -> Self {
        Self { name, kind: OperandKind::Label, usage: Usage::None }
    }

    pub fn reg_list(name: &'static str, bank: RegBank, usage: Usage) -> Self {
        Self { name, kind: OperandKind::RegList(bank), usage }
    }

    pub fn constructor(name: &'static str, set: &[Arc<ConstructorDesc>]) -> Self {
        Self { name, kind: OperandKind::Constructor(set.into()), usage: Usage::None }
    }

    fn check(&self, owner: &str, value: &OperandValue) -> CodegenResult<()> {
        let invalid = |reason: String| CodegenError::InvalidOperand {
            instruction: owner.to_string(),
            reason,
        };
        match (&self.kind, value) {
            (OperandKind::Register(bank), OperandValue::Reg(reg)) => {
                if reg.bank() != *bank {
                    return Err(invalid(format!("`{}` expects a bank {} register", self.name, bank)));
                }
            }
            (OperandKind::Immediate { min, max }, OperandValue::Imm(imm)) => {
                if imm < min || imm > max {
                    return Err(CodegenError::EncodingRange {
                        field: format!("{}.{}", owner, self.name),
                        value: *imm,
                        constraint: format!("{}..={}", min, max),
                    });
                }
            }
            (OperandKind::Label, OperandValue::Label(_)) => {}
            (OperandKind::RegList(bank), OperandValue::RegList(list)) => {
                if list.is_empty() || list.iter().any(|r| r.bank() != *bank) {
                    return Err(invalid(format!("`{}` expects a non-empty bank {} list", self.name, bank)));
                }
            }
            (OperandKind::Constructor(set), OperandValue::Constructor(cons)) => {
                if !set.iter().any(|alt| Arc::ptr_eq(alt, &cons.desc)) {
                    return Err(invalid(format!("`{}` does not accept `{}`", self.name, cons.desc.name)));
                }
                cons.desc.check_operands(&cons.operands)?;
            }
            (_, value) => {
                return Err(invalid(format!("`{}` cannot take {}", self.name, value.kind_name())));
            }
        }
        Ok(())
    }
}

/// Concrete operand value.
#[derive(Debug, Clone, PartialEq)]
pub enum OperandValue {
    Reg(Register),
    Imm(i64),
    Label(String),
    RegList(Vec<Register>),
    Constructor(ConstructorValue),
}

impl OperandValue {
    fn kind_name(&self) -> &'static str {
        match self {
            OperandValue::Reg(_) => "a register",
            OperandValue::Imm(_) => "an immediate",
            OperandValue::Label(_) => "a label",
            OperandValue::RegList(_) => "a register list",
            OperandValue::Constructor(_) => "a constructor",
        }
    }
}

impl From<Register> for OperandValue {
    fn from(reg: Register) -> Self {
        OperandValue::Reg(reg)
    }
}

impl From<i64> for OperandValue {
    fn from(imm: i64) -> Self {
        OperandValue::Imm(imm)
    }
}

impl From<ConstructorValue> for OperandValue {
    fn from(cons: ConstructorValue) -> Self {
        OperandValue::Constructor(cons)
    }
}

/// Right-hand side of a pattern dictionary entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatternValue {
    Const(i64),
    Operand(&'static str),
    Transformed(Transform, &'static str),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldPattern {
    pub field: &'static str,
    pub value: PatternValue,
}

fn resolve_operand(
    owner: &str,
    decls: &[OperandDecl],
    values: &[OperandValue],
    name: &str,
) -> CodegenResult<usize> {
    decls.iter().position(|d| d.name == name).filter(|&i| i < values.len()).ok_or_else(|| {
        CodegenError::InvalidOperand {
            instruction: owner.to_string(),
            reason: format!("no operand `{}`", name),
        }
    })
}

fn operand_number(owner: &str, value: &OperandValue, regs: &dyn RegisterAssignment) -> CodegenResult<i64> {
    match value {
        OperandValue::Imm(imm) => Ok(*imm),
        OperandValue::Reg(reg) => reg
            .resolve(regs)
            .map(|phys| i64::from(phys.id))
            .ok_or_else(|| CodegenError::UnassignedRegister {
                register: format!("{:?}", reg),
            }),
        other => Err(CodegenError::InvalidOperand {
            instruction: owner.to_string(),
            reason: format!("{} has no numeric encoding", other.kind_name()),
        }),
    }
}

fn apply_patterns(
    owner: &str,
    tokens: &mut [Token],
    patterns: &[FieldPattern],
    decls: &[OperandDecl],
    values: &[OperandValue],
    regs: &dyn RegisterAssignment,
) -> CodegenResult<()> {
    for pattern in patterns {
        let value = match pattern.value {
            PatternValue::Const(value) => value,
            PatternValue::Operand(name) => {
                let idx = resolve_operand(owner, decls, values, name)?;
                operand_number(owner, &values[idx], regs)?
            }
            PatternValue::Transformed(transform, name) => {
                let idx = resolve_operand(owner, decls, values, name)?;
                transform.apply(name, &values[idx], regs)?
            }
        };
        let token = tokens
            .iter_mut()
            .find(|t| t.layout().field(pattern.field).is_some())
            .ok_or_else(|| CodegenError::malformed(format!("`{}` has no field `{}`", owner, pattern.field)))?;
        token.set_field(pattern.field, value)?;
    }
    Ok(())
}

fn check_operand_count(owner: &str, decls: &[OperandDecl], values: &[OperandValue]) -> CodegenResult<()> {
    if decls.len() != values.len() {
        return Err(CodegenError::InvalidOperand {
            instruction: owner.to_string(),
            reason: format!("expected {} operands, got {}", decls.len(), values.len()),
        });
    }
    decls.iter().zip(values).try_for_each(|(decl, value)| decl.check(owner, value))
}

fn check_syntax_covers_operands(owner: &str, syntax: &Syntax, operands: &[OperandDecl]) -> CodegenResult<()> {
    let referenced: Vec<&str> = syntax.operand_names().collect();
    for name in &referenced {
        if !operands.iter().any(|d| d.name == *name) {
            return Err(CodegenError::malformed(format!("`{}` syntax names unknown operand `{}`", owner, name)));
        }
    }
    for decl in operands {
        if referenced.iter().filter(|n| **n == decl.name).count() != 1 {
            return Err(CodegenError::malformed(format!(
                "`{}` syntax must reference operand `{}` exactly once",
                owner, decl.name
            )));
        }
    }
    Ok(())
}

fn check_pattern_operands(owner: &str, patterns: &[FieldPattern], operands: &[OperandDecl]) -> CodegenResult<()> {
    for pattern in patterns {
        let (name, transform) = match pattern.value {
            PatternValue::Const(_) => continue,
            PatternValue::Operand(name) => (name, None),
            PatternValue::Transformed(t, name) => (name, Some(t)),
        };
        let decl = operands.iter().find(|d| d.name == name).ok_or_else(|| {
            CodegenError::malformed(format!("`{}` field `{}` refers to unknown operand `{}`", owner, pattern.field, name))
        })?;
        let compatible = matches!(
            (transform, &decl.kind),
            (None, OperandKind::Register(_))
                | (None, OperandKind::Immediate { .. })
                | (Some(Transform::ArmExpandImm), OperandKind::Immediate { .. })
                | (Some(Transform::RegisterMask), OperandKind::RegList(_))
        );
        if !compatible {
            return Err(CodegenError::malformed(format!(
                "`{}` field `{}` cannot encode operand `{}` of kind {:?}",
                owner, pattern.field, name, decl.kind
            )));
        }
    }
    Ok(())
}

/// Reusable operand fragment such as a shift mode.
#[derive(Debug)]
pub struct ConstructorDesc {
    name: &'static str,
    operands: Vec<OperandDecl>,
    syntax: Syntax,
    patterns: Vec<FieldPattern>,
}

impl ConstructorDesc {
    pub fn builder(name: &'static str) -> ConstructorBuilder {
        ConstructorBuilder {
            name,
            operands: Vec::new(),
            syntax: "",
            patterns: Vec::new(),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn operands(&self) -> &[OperandDecl] {
        &self.operands
    }

    pub fn syntax(&self) -> &Syntax {
        &self.syntax
    }

    pub fn patterns(&self) -> &[FieldPattern] {
        &self.patterns
    }

    fn check_operands(&self, values: &[OperandValue]) -> CodegenResult<()> {
        check_operand_count(self.name, &self.operands, values)
    }

    /// Instance of this constructor; `self` must be the `Arc` stored in the
    /// operand's constructor set.
    pub fn instance(self: &Arc<Self>, operands: Vec<OperandValue>) -> CodegenResult<ConstructorValue> {
        self.check_operands(&operands)?;
        Ok(ConstructorValue {
            desc: Arc::clone(self),
            operands,
        })
    }
}

pub struct ConstructorBuilder {
    name: &'static str,
    operands: Vec<OperandDecl>,
    syntax: &'static str,
    patterns: Vec<FieldPattern>,
}

impl ConstructorBuilder {
    pub fn operand(mut self, decl: OperandDecl) -> Self {
        self.operands.push(decl);
        self
    }

    pub fn syntax(mut self, template: &'static str) -> Self {
        self.syntax = template;
        self
    }

    pub fn set(mut self, field: &'static str, value: i64) -> Self {
        self.patterns.push(FieldPattern { field, value: PatternValue::Const(value) });
        self
    }

    pub fn bind(mut self, field: &'static str, operand: &'static str) -> Self {
        self.patterns.push(FieldPattern { field, value: PatternValue::Operand(operand) });
        self
    }

    pub fn build(self) -> CodegenResult<Arc<ConstructorDesc>> {
        let syntax = Syntax::parse(self.syntax)?;
        if !syntax.mnemonic().is_empty() {
            return Err(CodegenError::malformed(format!(
                "constructor `{}` syntax must start with punctuation or an operand",
                self.name
            )));
        }
        check_syntax_covers_operands(self.name, &syntax, &self.operands)?;
        check_pattern_operands(self.name, &self.patterns, &self.operands)?;
        if self.operands.iter().any(|d| matches!(d.kind, OperandKind::Constructor(_))) {
            return Err(CodegenError::malformed(format!("constructor `{}` nests constructors", self.name)));
        }
        Ok(Arc::new(ConstructorDesc {
            name: self.name,
            operands: self.operands,
            syntax,
            patterns: self.patterns,
        }))
    }
}

/// Chosen constructor plus its own operand values.
#[derive(Debug, Clone)]
pub struct ConstructorValue {
    pub desc: Arc<ConstructorDesc>,
    pub operands: Vec<OperandValue>,
}

impl PartialEq for ConstructorValue {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.desc, &other.desc) && self.operands == other.operands
    }
}

/// Explicit encoding procedure, run after the pattern dictionary is applied.
pub type EncodeFn = fn(&mut Encoder<'_>) -> CodegenResult<()>;

/// State handed to an [`EncodeFn`].
pub struct Encoder<'a> {
    instruction: &'a Instruction,
    regs: &'a dyn RegisterAssignment,
    tokens: Vec<Token>,
}

impl Encoder<'_> {
    pub fn token(&mut self, index: usize) -> CodegenResult<&mut Token> {
        let mnemonic = self.instruction.mnemonic().to_string();
        self.tokens
            .get_mut(index)
            .ok_or_else(|| CodegenError::malformed(format!("`{}` has no token {}", mnemonic, index)))
    }

    /// Physical number of a register operand.
    pub fn reg(&self, name: &str) -> CodegenResult<u64> {
        let value = self.operand(name)?;
        match value {
            OperandValue::Reg(_) => operand_number(self.instruction.mnemonic(), value, self.regs).map(|n| n as u64),
            other => Err(CodegenError::InvalidOperand {
                instruction: self.instruction.mnemonic().to_string(),
                reason: format!("`{}` is {}, not a register", name, other.kind_name()),
            }),
        }
    }

    pub fn imm(&self, name: &str) -> CodegenResult<i64> {
        match self.operand(name)? {
            OperandValue::Imm(imm) => Ok(*imm),
            other => Err(CodegenError::InvalidOperand {
                instruction: self.instruction.mnemonic().to_string(),
                reason: format!("`{}` is {}, not an immediate", name, other.kind_name()),
            }),
        }
    }

    pub fn operand(&self, name: &str) -> CodegenResult<&OperandValue> {
        self.instruction.operand(name).ok_or_else(|| CodegenError::InvalidOperand {
            instruction: self.instruction.mnemonic().to_string(),
            reason: format!("no operand `{}`", name),
        })
    }
}

/// Immutable description of one instruction class.
#[derive(Clone)]
pub struct InstructionDesc {
    syntax: Syntax,
    tokens: Vec<Arc<TokenLayout>>,
    operands: Vec<OperandDecl>,
    patterns: Vec<FieldPattern>,
    encoder: Option<EncodeFn>,
    relocation: Option<RelocationDecl>,
}

impl fmt::Debug for InstructionDesc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InstructionDesc")
            .field("syntax", &self.syntax)
            .field("tokens", &self.tokens.iter().map(|t| t.name()).collect::<Vec<_>>())
            .field("operands", &self.operands)
            .field("patterns", &self.patterns)
            .field("encoder", &self.encoder.is_some())
            .field("relocation", &self.relocation)
            .finish()
    }
}

impl InstructionDesc {
    pub fn builder(syntax: &'static str) -> InstructionBuilder {
        InstructionBuilder {
            syntax,
            tokens: Vec::new(),
            operands: Vec::new(),
            patterns: Vec::new(),
            encoder: None,
            relocation: None,
        }
    }

    pub fn mnemonic(&self) -> &str {
        self.syntax.mnemonic()
    }

    pub fn syntax(&self) -> &Syntax {
        &self.syntax
    }

    pub fn tokens(&self) -> &[Arc<TokenLayout>] {
        &self.tokens
    }

    pub fn operands(&self) -> &[OperandDecl] {
        &self.operands
    }

    pub fn patterns(&self) -> &[FieldPattern] {
        &self.patterns
    }

    pub fn relocation(&self) -> Option<&RelocationDecl> {
        self.relocation.as_ref()
    }

    pub fn has_encoder(&self) -> bool {
        self.encoder.is_some()
    }

    /// Encoded size in bytes.
    pub fn size(&self) -> usize {
        self.tokens.iter().map(|t| t.size()).sum()
    }

    /// Value-level derivation: same operands, syntax shape and encoding, with
    /// the constant assigned to `field` replaced and `suffix` appended to the
    /// mnemonic.
    pub fn derive_variant(&self, field: &str, value: i64, suffix: &str) -> CodegenResult<Arc<InstructionDesc>> {
        let mut derived = self.clone();
        let entry = derived
            .patterns
            .iter_mut()
            .find(|p| p.field == field && matches!(p.value, PatternValue::Const(_)))
            .ok_or_else(|| {
                CodegenError::malformed(format!("`{}` has no constant field `{}` to override", self.mnemonic(), field))
            })?;
        entry.value = PatternValue::Const(value);
        derived.syntax = self.syntax.with_mnemonic(format!("{}{}", self.mnemonic(), suffix));
        derived.validate()?;
        Ok(Arc::new(derived))
    }

    fn find_field(&self, field: &str) -> CodegenResult<&BitField> {
        let mut found = self.tokens.iter().filter_map(|t| t.field(field));
        match (found.next(), found.next()) {
            (Some(bit_field), None) => Ok(bit_field),
            (None, _) => Err(CodegenError::malformed(format!("`{}` has no field `{}`", self.mnemonic(), field))),
            (Some(_), Some(_)) => Err(CodegenError::malformed(format!(
                "field `{}` of `{}` is ambiguous across tokens",
                field,
                self.mnemonic()
            ))),
        }
    }

    fn validate(&self) -> CodegenResult<()> {
        let owner = self.mnemonic();
        if owner.is_empty() {
            return Err(CodegenError::malformed("instruction syntax has no mnemonic"));
        }
        if self.tokens.is_empty() {
            return Err(CodegenError::malformed(format!("`{}` declares no tokens", owner)));
        }
        check_syntax_covers_operands(owner, &self.syntax, &self.operands)?;
        check_pattern_operands(owner, &self.patterns, &self.operands)?;

        let mut assigned = BTreeSet::new();
        for pattern in &self.patterns {
            let field = self.find_field(pattern.field)?;
            if !assigned.insert(pattern.field) {
                return Err(CodegenError::malformed(format!("`{}` assigns field `{}` twice", owner, pattern.field)));
            }
            if let PatternValue::Const(value) = pattern.value {
                field.pack(value)?;
            }
        }

        // Each constructor alternative must slot into the remaining fields.
        let mut completions = vec![assigned];
        for decl in &self.operands {
            let OperandKind::Constructor(set) = &decl.kind else {
                continue;
            };
            if set.is_empty() {
                return Err(CodegenError::malformed(format!("`{}` operand `{}` has no alternatives", owner, decl.name)));
            }
            let mut next = Vec::new();
            for base in &completions {
                for alternative in set.iter() {
                    let mut fields = base.clone();
                    for pattern in alternative.patterns() {
                        let field = self.find_field(pattern.field)?;
                        if !fields.insert(pattern.field) {
                            return Err(CodegenError::malformed(format!(
                                "`{}` constructor `{}` reassigns field `{}`",
                                owner,
                                alternative.name(),
                                pattern.field
                            )));
                        }
                        if let PatternValue::Const(value) = pattern.value {
                            field.pack(value)?;
                        }
                    }
                    next.push(fields);
                }
            }
            completions = next;
        }

        if self.encoder.is_none() {
            for fields in &completions {
                for layout in &self.tokens {
                    if let Some(missing) = layout.fields().iter().find(|f| !fields.contains(f.name)) {
                        return Err(CodegenError::malformed(format!(
                            "`{}` leaves field `{}` of token `{}` undefined",
                            owner,
                            missing.name,
                            layout.name()
                        )));
                    }
                }
            }
        }

        if let Some(reloc) = &self.relocation {
            let decl = self.operands.iter().find(|d| d.name == reloc.operand);
            if !matches!(decl, Some(OperandDecl { kind: OperandKind::Label, .. })) {
                return Err(CodegenError::malformed(format!(
                    "`{}` relocation must refer to a label operand, not `{}`",
                    owner, reloc.operand
                )));
            }
        }
        Ok(())
    }
}

pub struct InstructionBuilder {
    syntax: &'static str,
    tokens: Vec<Arc<TokenLayout>>,
    operands: Vec<OperandDecl>,
    patterns: Vec<FieldPattern>,
    encoder: Option<EncodeFn>,
    relocation: Option<RelocationDecl>,
}

impl InstructionBuilder {
    pub fn token(mut self, layout: &Arc<TokenLayout>) -> Self {
        self.tokens.push(Arc::clone(layout));
        self
    }

    pub fn operand(mut self, decl: OperandDecl) -> Self {
        self.operands.push(decl);
        self
    }

    /// Field set to a constant.
    pub fn set(mut self, field: &'static str, value: i64) -> Self {
        self.patterns.push(FieldPattern { field, value: PatternValue::Const(value) });
        self
    }

    /// Field taken from a register or immediate operand.
    pub fn bind(mut self, field: &'static str, operand: &'static str) -> Self {
        self.patterns.push(FieldPattern { field, value: PatternValue::Operand(operand) });
        self
    }

    /// Field taken from an operand passed through `transform`.
    pub fn bind_with(mut self, field: &'static str, transform: Transform, operand: &'static str) -> Self {
        self.patterns.push(FieldPattern {
            field,
            value: PatternValue::Transformed(transform, operand),
        });
        self
    }

    pub fn encoder(mut self, encoder: EncodeFn) -> Self {
        self.encoder = Some(encoder);
        self
    }

    pub fn relocation(mut self, kind: RelocKind, operand: &'static str) -> Self {
        self.relocation = Some(RelocationDecl { kind, operand, addend: 0 });
        self
    }

    pub fn build(self) -> CodegenResult<Arc<InstructionDesc>> {
        let desc = InstructionDesc {
            syntax: Syntax::parse(self.syntax)?,
            tokens: self.tokens,
            operands: self.operands,
            patterns: self.patterns,
            encoder: self.encoder,
            relocation: self.relocation,
        };
        desc.validate()?;
        Ok(Arc::new(desc))
    }
}

/// A validated instance of an instruction class.
#[derive(Debug, Clone)]
pub struct Instruction {
    desc: Arc<InstructionDesc>,
    operands: Vec<OperandValue>,
}

impl PartialEq for Instruction {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.desc, &other.desc) && self.operands == other.operands
    }
}

impl Instruction {
    /// Operands are given in declaration order.
    pub fn new(desc: &Arc<InstructionDesc>, operands: Vec<OperandValue>) -> CodegenResult<Self> {
        check_operand_count(desc.mnemonic(), &desc.operands, &operands)?;
        Ok(Self {
            desc: Arc::clone(desc),
            operands,
        })
    }

    pub fn desc(&self) -> &Arc<InstructionDesc> {
        &self.desc
    }

    pub fn mnemonic(&self) -> &str {
        self.desc.mnemonic()
    }

    pub fn operands(&self) -> &[OperandValue] {
        &self.operands
    }

    pub fn operand(&self, name: &str) -> Option<&OperandValue> {
        let idx = self.desc.operands.iter().position(|d| d.name == name)?;
        self.operands.get(idx)
    }

    pub fn size(&self) -> usize {
        self.desc.size()
    }

    fn registers_with(&self, pred: impl Fn(Usage) -> bool) -> Vec<Register> {
        let mut regs = Vec::new();
        for (decl, value) in self.desc.operands.iter().zip(&self.operands) {
            if !pred(decl.usage) {
                continue;
            }
            match value {
                OperandValue::Reg(reg) => regs.push(*reg),
                OperandValue::RegList(list) => regs.extend(list.iter().copied()),
                _ => {}
            }
        }
        regs
    }

    /// Registers read by this instruction.
    pub fn uses(&self) -> Vec<Register> {
        self.registers_with(Usage::reads)
    }

    /// Registers written by this instruction.
    pub fn defs(&self) -> Vec<Register> {
        self.registers_with(Usage::writes)
    }

    /// Symbol this instruction needs a relocation against, if any.
    pub fn relocation_target(&self) -> Option<(&str, &RelocationDecl)> {
        let decl = self.desc.relocation.as_ref()?;
        match self.operand(decl.operand)? {
            OperandValue::Label(symbol) => Some((symbol.as_str(), decl)),
            _ => None,
        }
    }

    /// Bytes of this instance. Deterministic in the operand values and `regs`.
    pub fn encode(&self, regs: &dyn RegisterAssignment) -> CodegenResult<Vec<u8>> {
        let owner = self.mnemonic();
        let mut tokens: Vec<Token> = self.desc.tokens.iter().cloned().map(Token::new).collect();
        apply_patterns(owner, &mut tokens, &self.desc.patterns, &self.desc.operands, &self.operands, regs)?;

        for value in &self.operands {
            if let OperandValue::Constructor(cons) = value {
                apply_patterns(owner, &mut tokens, cons.desc.patterns(), cons.desc.operands(), &cons.operands, regs)?;
            }
        }

        if let Some(encoder) = self.desc.encoder {
            let mut state = Encoder {
                instruction: self,
                regs,
                tokens,
            };
            encoder(&mut state)?;
            tokens = state.tokens;
        }

        Ok(encode_all(&tokens))
    }

    /// Assembly text according to the class's syntax template.
    pub fn render(&self, names: &dyn RegisterNames) -> String {
        let mut out = self.mnemonic().to_string();
        render_items(&mut out, self.desc.syntax.items(), &self.desc.operands, &self.operands, names);
        out
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        struct Numbered;
        impl RegisterNames for Numbered {
            fn register_name(&self, _reg: AsmReg) -> Option<&'static str> {
                None
            }
            fn parse_register(&self, _name: &str) -> Option<AsmReg> {
                None
            }
        }
        f.write_str(&self.render(&Numbered))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::register::NoAssignment;
    use crate::encoding::token::Endianness;

    fn layout() -> Arc<TokenLayout> {
        TokenLayout::builder("t", 16, Endianness::Little)
            .field("op", 12, 4)
            .field("rd", 8, 4)
            .field("imm", 0, 8)
            .build()
            .unwrap()
    }

    fn load_imm() -> Arc<InstructionDesc> {
        InstructionDesc::builder("li {rd}, {imm}")
            .token(&layout())
            .operand(OperandDecl::register("rd", 0, Usage::Write))
            .operand(OperandDecl::unsigned("imm", 8))
            .set("op", 0x3)
            .bind("rd", "rd")
            .bind("imm", "imm")
            .build()
            .unwrap()
    }

    #[test]
    fn test_dictionary_encoding() {
        let desc = load_imm();
        let ins = Instruction::new(
            &desc,
            vec![Register::Physical(AsmReg::new(0, 2)).into(), OperandValue::Imm(0x7F)],
        )
        .unwrap();
        assert_eq!(ins.encode(&NoAssignment).unwrap(), vec![0x7F, 0x32]);
        assert_eq!(ins.to_string(), "li $0:2, 127");
        assert_eq!(ins.defs(), vec![Register::Physical(AsmReg::new(0, 2))]);
        assert!(ins.uses().is_empty());
    }

    #[test]
    fn test_construction_checks_operands() {
        let desc = load_imm();
        let reg = OperandValue::Reg(Register::Physical(AsmReg::new(0, 1)));
        assert!(matches!(
            Instruction::new(&desc, vec![reg.clone(), OperandValue::Imm(256)]),
            Err(CodegenError::EncodingRange { value: 256, .. })
        ));
        assert!(matches!(
            Instruction::new(&desc, vec![OperandValue::Imm(1), reg.clone()]),
            Err(CodegenError::InvalidOperand { .. })
        ));
        assert!(Instruction::new(&desc, vec![reg]).is_err());
    }

    #[test]
    fn test_incomplete_dictionary_rejected() {
        let result = InstructionDesc::builder("nop")
            .token(&layout())
            .set("op", 0)
            .build();
        assert!(matches!(result, Err(CodegenError::MalformedRegistration { .. })));
    }

    #[test]
    fn test_double_assignment_rejected() {
        let result = InstructionDesc::builder("bad {rd}")
            .token(&layout())
            .operand(OperandDecl::register("rd", 0, Usage::Write))
            .set("op", 0)
            .bind("rd", "rd")
            .set("rd", 1)
            .set("imm", 0)
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn test_derived_variant_overrides_one_field() {
        let base = load_imm();
        let derived = base.derive_variant("op", 0x9, "x").unwrap();
        assert_eq!(derived.mnemonic(), "lix");
        assert_eq!(base.mnemonic(), "li");

        let regs = vec![Register::Physical(AsmReg::new(0, 4)).into(), OperandValue::Imm(1)];
        let a = Instruction::new(&base, regs.clone()).unwrap().encode(&NoAssignment).unwrap();
        let b = Instruction::new(&derived, regs).unwrap().encode(&NoAssignment).unwrap();
        assert_eq!(a[0], b[0]);
        assert_eq!(a[1] & 0x0F, b[1] & 0x0F);
        assert_eq!(b[1] >> 4, 0x9);
        assert!(base.derive_variant("rd", 1, "y").is_err());
    }

    #[test]
    fn test_unassigned_virtual_register() {
        let desc = load_imm();
        let virt = Register::Virtual(crate::core::register::VirtualReg { bank: 0, index: 3 });
        let ins = Instruction::new(&desc, vec![virt.into(), OperandValue::Imm(0)]).unwrap();
        assert!(matches!(
            ins.encode(&NoAssignment),
            Err(CodegenError::UnassignedRegister { .. })
        ));
        assert_eq!(ins.to_string(), "li %v3, 0");
    }

    #[test]
    fn test_unsigned_ranges() {
        let max = |bits| match OperandDecl::unsigned("x", bits).kind {
            OperandKind::Immediate { min: 0, max } => max,
            other => panic!("unexpected kind {:?}", other),
        };
        assert_eq!(max(3), 7);
        assert_eq!(max(32), 0xffff_ffff);
        assert_eq!(max(64), i64::MAX);
    }
}
