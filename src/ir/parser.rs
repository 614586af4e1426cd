//! Textual IR reader.
//!
//! ```text
//! function main
//! block entry
//!   let sum = ADDI32(REGI32 %x, CONSTI32 200)
//!   STRI32(FPRELU32 -8, sum)
//!   CJMPI32 [< then exit](sum, CONSTI32 0)
//! block then
//!   MOVI32 r0(sum)
//!   JMP @exit
//! ```
//!
//! A node is an operator, an optional leaf value and an optional parenthesized
//! child list. `let` binds a node to a name so later expressions can share it;
//! every other statement line is a root of the current block. Leaf values are
//! integers, registers (`%name` for virtual, architecture names for physical),
//! `@label`, and `[cmp yes no]` for conditional jumps. `#` starts a comment.

use super::{CondOp, IrBlock, IrFunction, IrValue, NodeId, OpKind, Operator};
use crate::core::error::{CodegenError, CodegenResult};
use crate::core::register::{RegBank, Register, VirtualReg};
use crate::encoding::syntax::{parse_int, RegisterNames};
use bumpalo::Bump;
use hashbrown::HashMap;

/// Parse every function in `text`. Physical register names are resolved
/// through `names`; virtual registers live in `bank`.
pub fn parse_ir<'arena>(
    text: &str,
    arena: &'arena Bump,
    names: &dyn RegisterNames,
    bank: RegBank,
) -> CodegenResult<Vec<IrFunction<'arena>>> {
    let mut parser = Parser {
        arena,
        names,
        bank,
        functions: Vec::new(),
        values: HashMap::new(),
        vregs: HashMap::new(),
    };
    for (index, line) in text.lines().enumerate() {
        let line = line.split('#').next().unwrap_or("");
        if line.trim().is_empty() {
            continue;
        }
        parser.parse_line(line).map_err(|message| CodegenError::ParseError {
            line: index + 1,
            message,
        })?;
    }
    Ok(parser.functions)
}

struct Parser<'arena, 'n> {
    arena: &'arena Bump,
    names: &'n dyn RegisterNames,
    bank: RegBank,
    functions: Vec<IrFunction<'arena>>,

    // Per-function maps
    values: HashMap<String, NodeId>,
    vregs: HashMap<String, u32>,
}

struct Cursor<'t> {
    text: &'t str,
    pos: usize,
}

impl<'t> Cursor<'t> {
    fn skip_whitespace(&mut self) {
        let rest = &self.text[self.pos..];
        self.pos += rest.len() - rest.trim_start().len();
    }

    fn is_eof(&mut self) -> bool {
        self.skip_whitespace();
        self.pos >= self.text.len()
    }

    fn peek(&mut self) -> Option<char> {
        self.skip_whitespace();
        self.text[self.pos..].chars().next()
    }

    fn eat(&mut self, ch: char) -> bool {
        if self.peek() == Some(ch) {
            self.pos += ch.len_utf8();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, ch: char) -> Result<(), String> {
        if self.eat(ch) {
            Ok(())
        } else {
            Err(format!("expected `{}` at column {}", ch, self.pos + 1))
        }
    }

    /// Next run of characters that are not whitespace or punctuation.
    fn word(&mut self) -> Result<&'t str, String> {
        self.skip_whitespace();
        let rest = &self.text[self.pos..];
        let len = rest
            .find(|c: char| c.is_whitespace() || matches!(c, '(' | ')' | ',' | '[' | ']' | '='))
            .unwrap_or(rest.len());
        if len == 0 {
            return Err(format!("expected a word at column {}", self.pos + 1));
        }
        self.pos += len;
        Ok(&rest[..len])
    }

    fn comparison(&mut self) -> &'t str {
        self.skip_whitespace();
        let rest = &self.text[self.pos..];
        let len = rest.find(|c: char| !matches!(c, '<' | '>' | '=' | '!')).unwrap_or(rest.len());
        self.pos += len;
        &rest[..len]
    }
}

impl<'arena> Parser<'arena, '_> {
    fn current(&mut self) -> Result<&mut IrFunction<'arena>, String> {
        self.functions
            .last_mut()
            .ok_or_else(|| "statement outside of a function".to_string())
    }

    fn parse_line(&mut self, line: &str) -> Result<(), String> {
        let mut cursor = Cursor { text: line, pos: 0 };
        let head = cursor.word()?;
        match head {
            "function" => {
                let name = cursor.word()?;
                self.values.clear();
                self.vregs.clear();
                self.functions.push(IrFunction::new(self.arena, name));
            }
            "block" => {
                let name = cursor.word()?;
                self.current()?.block(name);
            }
            "let" => {
                let name = cursor.word()?;
                cursor.expect('=')?;
                let node = self.parse_expr(&mut cursor)?;
                self.values.insert(name.to_string(), node);
            }
            _ => {
                cursor.pos = 0;
                let node = self.parse_expr(&mut cursor)?;
                let function = self.current()?;
                let block: &mut IrBlock<'arena> = function
                    .blocks
                    .last_mut()
                    .ok_or_else(|| "statement outside of a block".to_string())?;
                block.roots.push(node);
            }
        }
        if !cursor.is_eof() {
            return Err(format!("trailing input `{}`", &line[cursor.pos..]));
        }
        Ok(())
    }

    fn parse_expr(&mut self, cursor: &mut Cursor<'_>) -> Result<NodeId, String> {
        let head = cursor.word()?;
        if head.starts_with(|c: char| c.is_ascii_lowercase()) {
            return self
                .values
                .get(head)
                .copied()
                .ok_or_else(|| format!("undefined value `{}`", head));
        }

        let op: Operator = head.parse()?;
        let value = match op.kind {
            OpKind::Const => IrValue::Const(self.parse_number(cursor)?),
            OpKind::FpRel => IrValue::FrameOffset(self.parse_number(cursor)?),
            OpKind::Reg | OpKind::Mov => IrValue::Reg(self.parse_register(cursor)?),
            OpKind::Label | OpKind::Jmp => IrValue::Label(self.parse_label(cursor)?),
            OpKind::CJmp => self.parse_condition(cursor)?,
            _ => IrValue::None,
        };

        let mut children = Vec::new();
        if cursor.eat('(') {
            loop {
                children.push(self.parse_expr(cursor)?);
                if cursor.eat(')') {
                    break;
                }
                cursor.expect(',')?;
            }
        }

        self.current()?
            .dag
            .add(op, &children, value)
            .map_err(|err| err.to_string())
    }

    fn parse_number(&mut self, cursor: &mut Cursor<'_>) -> Result<i64, String> {
        let word = cursor.word()?;
        parse_int(word).ok_or_else(|| format!("expected an integer, found `{}`", word))
    }

    fn parse_register(&mut self, cursor: &mut Cursor<'_>) -> Result<Register, String> {
        let word = cursor.word()?;
        if let Some(name) = word.strip_prefix('%') {
            let next = self.vregs.len() as u32;
            let index = *self.vregs.entry(name.to_string()).or_insert(next);
            let bank = self.bank;
            let function = self.current()?;
            function.vreg_count = function.vreg_count.max(index + 1);
            return Ok(Register::Virtual(VirtualReg { bank, index }));
        }
        self.names
            .parse_register(word)
            .map(Register::Physical)
            .ok_or_else(|| format!("unknown register `{}`", word))
    }

    fn parse_label(&mut self, cursor: &mut Cursor<'_>) -> Result<&'arena str, String> {
        let word = cursor.word()?;
        let name = word
            .strip_prefix('@')
            .ok_or_else(|| format!("expected `@label`, found `{}`", word))?;
        Ok(self.arena.alloc_str(name))
    }

    fn parse_condition(&mut self, cursor: &mut Cursor<'_>) -> Result<IrValue<'arena>, String> {
        cursor.expect('[')?;
        let symbol = cursor.comparison();
        let op = CondOp::from_symbol(symbol).ok_or_else(|| format!("unknown comparison `{}`", symbol))?;
        let yes = self.arena.alloc_str(cursor.word()?);
        let no = self.arena.alloc_str(cursor.word()?);
        cursor.expect(']')?;
        Ok(IrValue::Cond { op, yes, no })
    }
}
