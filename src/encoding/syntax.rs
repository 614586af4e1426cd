//! Syntax templates for assembly text.
//!
//! A template such as `"add {rd}, {rn}, {rm}{shift}"` is split into a mnemonic and
//! a sequence of literal text and operand references. The same template drives
//! rendering ([`Instruction::render`](super::Instruction::render)) and parsing
//! ([`parse_instruction`]), so a rendered instruction always reads back to the
//! same operand values.

use super::instruction::{
    ConstructorValue, Instruction, InstructionDesc, OperandDecl, OperandKind, OperandValue,
};
use crate::core::error::{CodegenError, CodegenResult};
use crate::core::register::{AsmReg, Register, VirtualReg};
use std::sync::Arc;

/// Register naming, provided by the architecture.
pub trait RegisterNames {
    fn register_name(&self, reg: AsmReg) -> Option<&'static str>;
    fn parse_register(&self, name: &str) -> Option<AsmReg>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyntaxItem {
    Text(String),
    Operand(&'static str),
}

/// Parsed syntax template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Syntax {
    mnemonic: String,
    items: Vec<SyntaxItem>,
}

impl Syntax {
    /// Parse a template. Operand references are written `{name}`; everything
    /// before the first space or operand reference is the mnemonic.
    pub fn parse(template: &'static str) -> CodegenResult<Self> {
        let split = template
            .find(|c: char| c == ' ' || c == '{' || c == ',')
            .unwrap_or(template.len());
        let mnemonic = template[..split].to_string();
        let mut items = Vec::new();
        let mut rest = &template[split..];

        while !rest.is_empty() {
            match rest.find('{') {
                Some(0) => {
                    let end = rest.find('}').ok_or_else(|| {
                        CodegenError::malformed(format!("unterminated operand in `{}`", template))
                    })?;
                    let name = &rest[1..end];
                    if name.is_empty() || !name.chars().all(|c| c.is_alphanumeric() || c == '_') {
                        return Err(CodegenError::malformed(format!(
                            "bad operand reference `{{{}}}` in `{}`",
                            name, template
                        )));
                    }
                    items.push(SyntaxItem::Operand(name));
                    rest = &rest[end + 1..];
                }
                Some(pos) => {
                    items.push(SyntaxItem::Text(rest[..pos].to_string()));
                    rest = &rest[pos..];
                }
                None => {
                    items.push(SyntaxItem::Text(rest.to_string()));
                    rest = "";
                }
            }
        }

        Ok(Self { mnemonic, items })
    }

    pub fn mnemonic(&self) -> &str {
        &self.mnemonic
    }

    pub fn items(&self) -> &[SyntaxItem] {
        &self.items
    }

    pub fn operand_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.items.iter().filter_map(|item| match item {
            SyntaxItem::Operand(name) => Some(*name),
            SyntaxItem::Text(_) => None,
        })
    }

    pub(crate) fn with_mnemonic(&self, mnemonic: String) -> Self {
        Self {
            mnemonic,
            items: self.items.clone(),
        }
    }
}

pub(crate) fn render_register(reg: &Register, names: &dyn RegisterNames) -> String {
    match reg {
        Register::Physical(phys) => names
            .register_name(*phys)
            .map(str::to_string)
            .unwrap_or_else(|| format!("${}:{}", phys.bank, phys.id)),
        Register::Virtual(virt) => virt.to_string(),
    }
}

pub(crate) fn render_items(
    out: &mut String,
    items: &[SyntaxItem],
    decls: &[OperandDecl],
    values: &[OperandValue],
    names: &dyn RegisterNames,
) {
    for item in items {
        match item {
            SyntaxItem::Text(text) => out.push_str(text),
            SyntaxItem::Operand(name) => {
                let Some(idx) = decls.iter().position(|d| d.name == *name) else {
                    continue;
                };
                match &values[idx] {
                    OperandValue::Reg(reg) => out.push_str(&render_register(reg, names)),
                    OperandValue::Imm(imm) => out.push_str(&imm.to_string()),
                    OperandValue::Label(label) => out.push_str(label),
                    OperandValue::RegList(list) => {
                        let regs: Vec<String> = list.iter().map(|r| render_register(r, names)).collect();
                        out.push('{');
                        out.push_str(&regs.join(", "));
                        out.push('}');
                    }
                    OperandValue::Constructor(cons) => {
                        render_items(out, cons.desc.syntax().items(), cons.desc.operands(), &cons.operands, names)
                    }
                }
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Lexeme {
    Word(String),
    Number(i64),
    Punct(char),
}

fn lex(text: &str) -> Option<Vec<Lexeme>> {
    let mut out = Vec::new();
    let chars: Vec<char> = text.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        let ch = chars[i];
        if ch.is_whitespace() {
            i += 1;
        } else if ch.is_ascii_digit() || (ch == '-' && chars.get(i + 1).is_some_and(|c| c.is_ascii_digit())) {
            let start = i;
            i += 1;
            while i < chars.len() && chars[i].is_ascii_alphanumeric() {
                i += 1;
            }
            let literal: String = chars[start..i].iter().collect();
            out.push(Lexeme::Number(parse_int(&literal)?));
        } else if ch.is_alphabetic() || ch == '_' || ch == '.' || ch == '%' || ch == '$' {
            let start = i;
            i += 1;
            while i < chars.len() && (chars[i].is_alphanumeric() || matches!(chars[i], '_' | '.' | ':' | '$')) {
                i += 1;
            }
            out.push(Lexeme::Word(chars[start..i].iter().collect()));
        } else {
            out.push(Lexeme::Punct(ch));
            i += 1;
        }
    }
    Some(out)
}

/// Parse a decimal or `0x`-prefixed integer, optionally negative.
pub fn parse_int(text: &str) -> Option<i64> {
    let (negative, digits) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text),
    };
    let value = match digits.strip_prefix("0x").or_else(|| digits.strip_prefix("0X")) {
        Some(hex) => i64::from_str_radix(hex, 16).ok()?,
        None => digits.parse::<i64>().ok()?,
    };
    Some(if negative { -value } else { value })
}

type Bindings = Vec<OperandValue>;

struct Matcher<'n> {
    names: &'n dyn RegisterNames,
}

impl Matcher<'_> {
    /// All ways `items` can consume a prefix of `input[pos..]`.
    fn match_items(
        &self,
        items: &[SyntaxItem],
        decls: &[OperandDecl],
        input: &[Lexeme],
        pos: usize,
        bound: Vec<Option<OperandValue>>,
    ) -> Vec<(usize, Vec<Option<OperandValue>>)> {
        let Some((first, rest)) = items.split_first() else {
            return vec![(pos, bound)];
        };

        match first {
            SyntaxItem::Text(text) => {
                let Some(expected) = lex(text) else {
                    return Vec::new();
                };
                let end = pos + expected.len();
                if end <= input.len() && input[pos..end] == expected[..] {
                    self.match_items(rest, decls, input, end, bound)
                } else {
                    Vec::new()
                }
            }
            SyntaxItem::Operand(name) => {
                let Some(idx) = decls.iter().position(|d| d.name == *name) else {
                    return Vec::new();
                };
                let mut results = Vec::new();
                for (next, value) in self.match_operand(&decls[idx], input, pos) {
                    let mut bound = bound.clone();
                    bound[idx] = Some(value);
                    results.extend(self.match_items(rest, decls, input, next, bound));
                }
                results
            }
        }
    }

    fn match_register(&self, input: &[Lexeme], pos: usize, bank: u8) -> Option<Register> {
        let Lexeme::Word(word) = input.get(pos)? else {
            return None;
        };
        if let Some(index) = word.strip_prefix("%v") {
            let index = index.parse().ok()?;
            return Some(Register::Virtual(VirtualReg { bank, index }));
        }
        let reg = self.names.parse_register(word)?;
        (reg.bank == bank).then_some(Register::Physical(reg))
    }

    fn match_operand(&self, decl: &OperandDecl, input: &[Lexeme], pos: usize) -> Vec<(usize, OperandValue)> {
        match &decl.kind {
            OperandKind::Register(bank) => self
                .match_register(input, pos, *bank)
                .map(|reg| vec![(pos + 1, OperandValue::Reg(reg))])
                .unwrap_or_default(),
            OperandKind::Immediate { .. } => match input.get(pos) {
                Some(Lexeme::Number(n)) => vec![(pos + 1, OperandValue::Imm(*n))],
                _ => Vec::new(),
            },
            OperandKind::Label => match input.get(pos) {
                Some(Lexeme::Word(w)) => vec![(pos + 1, OperandValue::Label(w.clone()))],
                _ => Vec::new(),
            },
            OperandKind::RegList(bank) => {
                if input.get(pos) != Some(&Lexeme::Punct('{')) {
                    return Vec::new();
                }
                let mut regs = Vec::new();
                let mut at = pos + 1;
                loop {
                    match self.match_register(input, at, *bank) {
                        Some(reg) => regs.push(reg),
                        None => return Vec::new(),
                    }
                    at += 1;
                    match input.get(at) {
                        Some(Lexeme::Punct(',')) => at += 1,
                        Some(Lexeme::Punct('}')) => return vec![(at + 1, OperandValue::RegList(regs))],
                        _ => return Vec::new(),
                    }
                }
            }
            OperandKind::Constructor(set) => {
                let mut results = Vec::new();
                for alternative in set.iter() {
                    let empty = vec![None; alternative.operands().len()];
                    for (next, bound) in
                        self.match_items(alternative.syntax().items(), alternative.operands(), input, pos, empty)
                    {
                        if let Some(operands) = bound.into_iter().collect::<Option<Bindings>>() {
                            results.push((
                                next,
                                OperandValue::Constructor(ConstructorValue {
                                    desc: Arc::clone(alternative),
                                    operands,
                                }),
                            ));
                        }
                    }
                }
                results
            }
        }
    }
}

/// Parse one line of assembly against a set of instruction classes.
///
/// The first class (in slice order) whose template consumes the whole line and
/// whose operand values pass validation wins.
pub fn parse_instruction(
    text: &str,
    classes: &[Arc<InstructionDesc>],
    names: &dyn RegisterNames,
) -> CodegenResult<Instruction> {
    let not_parsed = || CodegenError::InvalidOperand {
        instruction: text.trim().to_string(),
        reason: "does not match any instruction syntax".to_string(),
    };
    let input = lex(text).ok_or_else(not_parsed)?;
    let Some(Lexeme::Word(mnemonic)) = input.first() else {
        return Err(not_parsed());
    };

    let matcher = Matcher { names };
    for desc in classes.iter().filter(|d| d.mnemonic() == mnemonic) {
        let empty = vec![None; desc.operands().len()];
        for (end, bound) in matcher.match_items(desc.syntax().items(), desc.operands(), &input, 1, empty) {
            if end != input.len() {
                continue;
            }
            let Some(operands) = bound.into_iter().collect::<Option<Bindings>>() else {
                continue;
            };
            if let Ok(instruction) = Instruction::new(desc, operands) {
                return Ok(instruction);
            }
        }
    }
    Err(not_parsed())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_template_split() {
        let syntax = Syntax::parse("add {rd}, {rn}, {rm}{shift}").unwrap();
        assert_eq!(syntax.mnemonic(), "add");
        assert_eq!(
            syntax.operand_names().collect::<Vec<_>>(),
            vec!["rd", "rn", "rm", "shift"]
        );
        assert_eq!(syntax.items()[0], SyntaxItem::Text(" ".to_string()));
    }

    #[test]
    fn test_constructor_template_has_no_mnemonic() {
        let syntax = Syntax::parse(", lsl {n}").unwrap();
        assert_eq!(syntax.mnemonic(), "");
        assert_eq!(syntax.items().len(), 2);

        let empty = Syntax::parse("").unwrap();
        assert!(empty.items().is_empty());
    }

    #[test]
    fn test_unterminated_operand() {
        assert!(Syntax::parse("mov {rd").is_err());
        assert!(Syntax::parse("mov {rd, {rm}").is_err());
        assert!(Syntax::parse("mov {}").is_err());
    }

    #[test]
    fn test_lex_numbers_and_words() {
        let lexemes = lex("ldr r0, [r11, -8]").unwrap();
        assert_eq!(lexemes[0], Lexeme::Word("ldr".to_string()));
        assert!(lexemes.contains(&Lexeme::Number(-8)));
        assert_eq!(parse_int("0x1F"), Some(31));
        assert_eq!(parse_int("-0x10"), Some(-16));
        assert_eq!(parse_int("12a"), None);
    }
}
