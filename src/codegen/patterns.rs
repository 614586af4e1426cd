// This module defines the rule registry of the selection engine. A PatternRule says
// "a node matching this tree shape can be produced as nonterminal N at this cost",
// optionally guarded by a predicate over the matched node, and carries the emitter
// that constructs instructions once the rule has been chosen. Shapes are written the
// way the rules are usually read: operators in upper case, nonterminal leaves in lower
// case, e.g. "LDRI32(ADDI32(reg, CONSTI32))". A shape that is just a nonterminal is a
// chain rule (mem <- reg). Rules are registered on a GrammarBuilder, which checks
// that every nonterminal is declared and that no rule is an exact, unguarded duplicate
// of an earlier one, and then freezes into an immutable Grammar indexed by root
// operator. Declaration order is preserved because it breaks cost ties.

//! Pattern rules and the grammar that holds them.

use crate::core::context::CodeGenContext;
use crate::core::error::{CodegenError, CodegenResult};
use crate::core::register::Register;
use crate::ir::{NodeId, NodeRef, Operator};
use hashbrown::HashMap;
use std::fmt;
use std::sync::Arc;

/// Result of reducing a node to a nonterminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NtValue {
    /// Value held in a register.
    Reg(Register),
    /// Addressable memory location.
    Mem { base: Register, offset: i64 },
    /// Statement; no value.
    None,
}

impl NtValue {
    pub fn reg(&self) -> CodegenResult<Register> {
        match self {
            NtValue::Reg(reg) => Ok(*reg),
            other => Err(CodegenError::UnexpectedResult {
                nonterminal: "reg".to_string(),
                found: format!("{:?}", other),
            }),
        }
    }

    pub fn mem(&self) -> CodegenResult<(Register, i64)> {
        match self {
            NtValue::Mem { base, offset } => Ok((*base, *offset)),
            other => Err(CodegenError::UnexpectedResult {
                nonterminal: "mem".to_string(),
                found: format!("{:?}", other),
            }),
        }
    }
}

/// Tree shape a rule matches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Shape {
    Nonterminal(&'static str),
    Node { op: Operator, children: Vec<Shape> },
}

impl Shape {
    pub fn parse(text: &'static str) -> CodegenResult<Shape> {
        let mut pos = 0;
        let shape = Self::parse_at(text, &mut pos)?;
        if pos != text.len() {
            return Err(CodegenError::malformed(format!("trailing input in pattern `{}`", text)));
        }
        Ok(shape)
    }

    fn parse_at(text: &'static str, pos: &mut usize) -> CodegenResult<Shape> {
        let skip = |pos: &mut usize| {
            while text[*pos..].starts_with(' ') {
                *pos += 1;
            }
        };
        skip(pos);
        let rest = &text[*pos..];
        let len = rest.find(|c: char| !(c.is_ascii_alphanumeric() || c == '_')).unwrap_or(rest.len());
        if len == 0 {
            return Err(CodegenError::malformed(format!("expected a name at {} in `{}`", pos, text)));
        }
        let name = &rest[..len];
        *pos += len;

        if name.starts_with(|c: char| c.is_ascii_lowercase()) {
            return Ok(Shape::Nonterminal(name));
        }
        let op: Operator = name.parse().map_err(CodegenError::malformed)?;
        let mut children = Vec::new();
        skip(pos);
        if text[*pos..].starts_with('(') {
            *pos += 1;
            loop {
                children.push(Self::parse_at(text, pos)?);
                skip(pos);
                if text[*pos..].starts_with(')') {
                    *pos += 1;
                    break;
                }
                if !text[*pos..].starts_with(',') {
                    return Err(CodegenError::malformed(format!("expected `,` or `)` in `{}`", text)));
                }
                *pos += 1;
            }
        }
        if children.len() != op.kind.arity() {
            return Err(CodegenError::malformed(format!(
                "`{}` takes {} children in `{}`",
                op,
                op.kind.arity(),
                text
            )));
        }
        Ok(Shape::Node { op, children })
    }

    pub fn root(&self) -> Option<Operator> {
        match self {
            Shape::Node { op, .. } => Some(*op),
            Shape::Nonterminal(_) => None,
        }
    }

    fn collect_nonterminals(&self, out: &mut Vec<&'static str>) {
        match self {
            Shape::Nonterminal(nt) => out.push(*nt),
            Shape::Node { children, .. } => children.iter().for_each(|c| c.collect_nonterminals(out)),
        }
    }

    /// Nonterminal leaves, left to right.
    pub fn nonterminals(&self) -> Vec<&'static str> {
        let mut out = Vec::new();
        self.collect_nonterminals(&mut out);
        out
    }

    /// Match against `node`, appending `(node, nonterminal)` for every leaf.
    pub fn matches(&self, node: NodeRef<'_, '_>, leaves: &mut Vec<(NodeId, &'static str)>) -> bool {
        match self {
            Shape::Nonterminal(nt) => {
                leaves.push((node.id(), *nt));
                true
            }
            Shape::Node { op, children } => {
                *op == node.op()
                    && children.len() == node.arity()
                    && children.iter().enumerate().all(|(i, c)| c.matches(node.child(i), leaves))
            }
        }
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Shape::Nonterminal(nt) => f.write_str(nt),
            Shape::Node { op, children } => {
                write!(f, "{}", op)?;
                if !children.is_empty() {
                    f.write_str("(")?;
                    for (i, child) in children.iter().enumerate() {
                        if i > 0 {
                            f.write_str(", ")?;
                        }
                        write!(f, "{}", child)?;
                    }
                    f.write_str(")")?;
                }
                Ok(())
            }
        }
    }
}

pub type Predicate = Arc<dyn Fn(&NodeRef<'_, '_>) -> bool + Send + Sync>;

/// Emitter receives the matched node and the values of the shape's nonterminal
/// leaves in left-to-right order.
pub type Emitter =
    Arc<dyn Fn(&mut CodeGenContext<'_>, &NodeRef<'_, '_>, &[NtValue]) -> CodegenResult<NtValue> + Send + Sync>;

pub struct PatternRule {
    pub nonterminal: &'static str,
    pub shape: Shape,
    pub cost: u32,
    /// Estimated code size in bytes.
    pub size: u32,
    pub cycles: u32,
    pub predicate: Option<Predicate>,
    pub emitter: Emitter,
}

impl PatternRule {
    pub fn is_chain(&self) -> bool {
        matches!(self.shape, Shape::Nonterminal(_))
    }

    pub fn applies(&self, node: &NodeRef<'_, '_>) -> bool {
        self.predicate.as_ref().is_none_or(|pred| pred(node))
    }
}

impl fmt::Display for PatternRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} <- {}", self.nonterminal, self.shape)
    }
}

impl fmt::Debug for PatternRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PatternRule({} cost={}", self, self.cost)?;
        if self.predicate.is_some() {
            f.write_str(" guarded")?;
        }
        f.write_str(")")
    }
}

/// Immutable rule set handed to the selector.
pub struct Grammar {
    goal: &'static str,
    nonterminals: Vec<&'static str>,
    rules: Vec<PatternRule>,
    by_root: HashMap<Operator, Vec<usize>>,
    chains: Vec<usize>,
}

impl Grammar {
    /// Nonterminal statement roots are reduced to.
    pub fn goal(&self) -> &'static str {
        self.goal
    }

    pub fn nonterminals(&self) -> &[&'static str] {
        &self.nonterminals
    }

    pub fn rules(&self) -> &[PatternRule] {
        &self.rules
    }

    pub fn rule(&self, index: usize) -> &PatternRule {
        &self.rules[index]
    }

    /// Indices of non-chain rules rooted at `op`, in declaration order.
    pub fn rules_for(&self, op: Operator) -> &[usize] {
        self.by_root.get(&op).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Indices of chain rules, in declaration order.
    pub fn chain_rules(&self) -> &[usize] {
        &self.chains
    }
}

impl fmt::Debug for Grammar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Grammar")
            .field("goal", &self.goal)
            .field("nonterminals", &self.nonterminals)
            .field("rules", &self.rules.len())
            .finish()
    }
}

/// Collects rules; [`build`](GrammarBuilder::build) validates and freezes them.
pub struct GrammarBuilder {
    nonterminals: Vec<&'static str>,
    rules: Vec<PatternRule>,
    errors: Vec<String>,
}

impl GrammarBuilder {
    /// The first nonterminal is the goal statements are reduced to.
    pub fn new(nonterminals: &[&'static str]) -> Self {
        Self {
            nonterminals: nonterminals.to_vec(),
            rules: Vec::new(),
            errors: Vec::new(),
        }
    }

    /// Start a rule producing `nonterminal` for each of `shapes`.
    pub fn rule(&mut self, nonterminal: &'static str, shapes: &[&'static str]) -> RuleBuilder<'_> {
        RuleBuilder {
            grammar: self,
            nonterminal,
            shapes: shapes.to_vec(),
            cost: None,
            size: 0,
            cycles: 0,
            predicate: None,
        }
    }

    fn push(&mut self, rule: PatternRule) {
        let duplicate = self.rules.iter().any(|r| {
            r.nonterminal == rule.nonterminal
                && r.shape == rule.shape
                && r.predicate.is_none()
                && rule.predicate.is_none()
                && r.cost <= rule.cost
        });
        if duplicate {
            self.errors.push(format!("rule `{}` is shadowed by an earlier identical rule", rule));
            return;
        }
        self.rules.push(rule);
    }

    pub fn build(self) -> CodegenResult<Grammar> {
        if let Some(error) = self.errors.into_iter().next() {
            return Err(CodegenError::malformed(error));
        }
        let goal = *self
            .nonterminals
            .first()
            .ok_or_else(|| CodegenError::malformed("grammar declares no nonterminals"))?;

        let mut by_root: HashMap<Operator, Vec<usize>> = HashMap::new();
        let mut chains = Vec::new();
        for (index, rule) in self.rules.iter().enumerate() {
            let mut used = rule.shape.nonterminals();
            used.push(rule.nonterminal);
            if let Some(unknown) = used.iter().find(|nt| !self.nonterminals.contains(nt)) {
                return Err(CodegenError::malformed(format!(
                    "rule `{}` uses undeclared nonterminal `{}`",
                    rule, unknown
                )));
            }
            match rule.shape.root() {
                Some(op) => by_root.entry(op).or_default().push(index),
                None if rule.shape == Shape::Nonterminal(rule.nonterminal) => {
                    return Err(CodegenError::malformed(format!("chain rule `{}` derives itself", rule)));
                }
                None => chains.push(index),
            }
        }

        log::debug!(
            "grammar built: {} rules over {} operators, {} chain rules",
            self.rules.len(),
            by_root.len(),
            chains.len()
        );
        Ok(Grammar {
            goal,
            nonterminals: self.nonterminals,
            rules: self.rules,
            by_root,
            chains,
        })
    }
}

/// In-progress rule registration.
pub struct RuleBuilder<'g> {
    grammar: &'g mut GrammarBuilder,
    nonterminal: &'static str,
    shapes: Vec<&'static str>,
    cost: Option<u32>,
    size: u32,
    cycles: u32,
    predicate: Option<Predicate>,
}

impl RuleBuilder<'_> {
    /// Declared cost. Defaults to `size + cycles`.
    pub fn cost(mut self, cost: u32) -> Self {
        self.cost = Some(cost);
        self
    }

    pub fn size(mut self, size: u32) -> Self {
        self.size = size;
        self
    }

    pub fn cycles(mut self, cycles: u32) -> Self {
        self.cycles = cycles;
        self
    }

    /// Applicability condition evaluated on the node the shape is rooted at.
    pub fn when(mut self, predicate: impl Fn(&NodeRef<'_, '_>) -> bool + Send + Sync + 'static) -> Self {
        self.predicate = Some(Arc::new(predicate));
        self
    }

    pub fn emit(
        self,
        emitter: impl Fn(&mut CodeGenContext<'_>, &NodeRef<'_, '_>, &[NtValue]) -> CodegenResult<NtValue>
            + Send
            + Sync
            + 'static,
    ) {
        let emitter: Emitter = Arc::new(emitter);
        let cost = self.cost.unwrap_or(self.size + self.cycles);
        for text in self.shapes {
            match Shape::parse(text) {
                Ok(shape) => self.grammar.push(PatternRule {
                    nonterminal: self.nonterminal,
                    shape,
                    cost,
                    size: self.size,
                    cycles: self.cycles,
                    predicate: self.predicate.clone(),
                    emitter: Arc::clone(&emitter),
                }),
                Err(err) => self.grammar.errors.push(err.to_string()),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{IrType, OpKind};

    #[test]
    fn test_shape_parse_and_display() {
        let shape = Shape::parse("LDRI32(ADDI32(reg, CONSTI32))").unwrap();
        assert_eq!(shape.to_string(), "LDRI32(ADDI32(reg, CONSTI32))");
        assert_eq!(shape.nonterminals(), vec!["reg"]);
        assert_eq!(shape.root(), Some(Operator::new(OpKind::Ldr, IrType::I32)));
        assert_eq!(Shape::parse("reg").unwrap(), Shape::Nonterminal("reg"));

        assert!(Shape::parse("ADDI32(reg)").is_err());
        assert!(Shape::parse("ADDI32(reg, reg").is_err());
        assert!(Shape::parse("NOPE(reg)").is_err());
    }

    #[test]
    fn test_builder_rejects_bad_rules() {
        let mut g = GrammarBuilder::new(&["stm", "reg"]);
        g.rule("reg", &["ADDI32(reg, reg)"]).cost(1).emit(|_, _, _| Ok(NtValue::None));
        g.rule("reg", &["ADDI32(reg, reg)"]).cost(3).emit(|_, _, _| Ok(NtValue::None));
        assert!(matches!(g.build(), Err(CodegenError::MalformedRegistration { .. })));

        let mut g = GrammarBuilder::new(&["stm", "reg"]);
        g.rule("reg", &["LDRI32(mem)"]).emit(|_, _, _| Ok(NtValue::None));
        assert!(g.build().is_err());

        let mut g = GrammarBuilder::new(&["stm", "reg"]);
        g.rule("stm", &["reg"]).cost(0).emit(|_, _, args| Ok(args[0]));
        g.rule("reg", &["ADDI32(reg, reg)", "ADDU32(reg, reg)"]).size(4).emit(|_, _, _| Ok(NtValue::None));
        let grammar = g.build().unwrap();
        assert_eq!(grammar.goal(), "stm");
        assert_eq!(grammar.chain_rules(), &[0]);
        assert_eq!(grammar.rules_for(Operator::new(OpKind::Add, IrType::U32)), &[2]);
        assert_eq!(grammar.rule(1).cost, 4);
    }
}
