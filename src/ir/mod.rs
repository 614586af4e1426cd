// This module defines the architecture-independent IR consumed by the selection engine.
// A function is a list of blocks; each block owns an ordered list of root nodes taken
// from one per-function DAG. Nodes carry a typed operator (ADDI32, LDRU8, I32TOI8, ...),
// an ordered list of child node ids and an optional leaf value. The DAG is append-only
// and children must already exist when a node is added, so every DAG is acyclic by
// construction and a shared subexpression is simply a node id referenced twice.
// Child slices and label names live in a bumpalo arena borrowed for the lifetime of
// the function, which keeps IrNode Copy and lets the parser and front ends build
// graphs without per-node allocations.

//! Architecture-independent IR DAG.

pub mod parser;

use crate::core::error::{CodegenError, CodegenResult};
use crate::core::register::Register;
use bumpalo::Bump;
use std::fmt;
use std::str::FromStr;

/// Value types the IR distinguishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IrType {
    I8,
    U8,
    I16,
    U16,
    I32,
    U32,
}

impl IrType {
    const ALL: [IrType; 6] = [IrType::I16, IrType::U16, IrType::I32, IrType::U32, IrType::I8, IrType::U8];

    pub fn name(self) -> &'static str {
        match self {
            IrType::I8 => "I8",
            IrType::U8 => "U8",
            IrType::I16 => "I16",
            IrType::U16 => "U16",
            IrType::I32 => "I32",
            IrType::U32 => "U32",
        }
    }

    pub fn bits(self) -> u32 {
        match self {
            IrType::I8 | IrType::U8 => 8,
            IrType::I16 | IrType::U16 => 16,
            IrType::I32 | IrType::U32 => 32,
        }
    }

    pub fn is_signed(self) -> bool {
        matches!(self, IrType::I8 | IrType::I16 | IrType::I32)
    }

    fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|ty| ty.name() == name)
    }
}

impl fmt::Display for IrType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Operation performed by a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpKind {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    And,
    Or,
    Xor,
    Shl,
    Shr,
    Neg,
    Inv,
    Const,
    Reg,
    Mov,
    Ldr,
    Str,
    FpRel,
    Label,
    Jmp,
    CJmp,
    /// Conversion from the given type to the operator's type.
    Convert(IrType),
}

impl OpKind {
    const NAMED: [(OpKind, &'static str); 21] = [
        (OpKind::Add, "ADD"),
        (OpKind::Sub, "SUB"),
        (OpKind::Mul, "MUL"),
        (OpKind::Div, "DIV"),
        (OpKind::Rem, "REM"),
        (OpKind::And, "AND"),
        (OpKind::Or, "OR"),
        (OpKind::Xor, "XOR"),
        (OpKind::Shl, "SHL"),
        (OpKind::Shr, "SHR"),
        (OpKind::Neg, "NEG"),
        (OpKind::Inv, "INV"),
        (OpKind::Const, "CONST"),
        (OpKind::Reg, "REG"),
        (OpKind::Mov, "MOV"),
        (OpKind::Ldr, "LDR"),
        (OpKind::Str, "STR"),
        (OpKind::FpRel, "FPREL"),
        (OpKind::Label, "LABEL"),
        (OpKind::Jmp, "JMP"),
        (OpKind::CJmp, "CJMP"),
    ];

    fn name(self) -> &'static str {
        Self::NAMED
            .iter()
            .find(|(kind, _)| *kind == self)
            .map(|(_, name)| *name)
            .unwrap_or("TO")
    }

    /// Number of children a node of this kind takes.
    pub fn arity(self) -> usize {
        match self {
            OpKind::Const | OpKind::Reg | OpKind::FpRel | OpKind::Label | OpKind::Jmp => 0,
            OpKind::Neg | OpKind::Inv | OpKind::Mov | OpKind::Ldr | OpKind::Convert(_) => 1,
            OpKind::Add
            | OpKind::Sub
            | OpKind::Mul
            | OpKind::Div
            | OpKind::Rem
            | OpKind::And
            | OpKind::Or
            | OpKind::Xor
            | OpKind::Shl
            | OpKind::Shr
            | OpKind::Str
            | OpKind::CJmp => 2,
        }
    }

    /// Untyped operators carry no type suffix.
    pub fn is_typed(self) -> bool {
        !matches!(self, OpKind::Jmp | OpKind::Label)
    }
}

/// Typed operator, written `ADDI32`, `LDRU8`, `I32TOI8`, `JMP`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Operator {
    pub kind: OpKind,
    pub ty: Option<IrType>,
}

impl Operator {
    pub const fn new(kind: OpKind, ty: IrType) -> Self {
        Self { kind, ty: Some(ty) }
    }

    pub const fn untyped(kind: OpKind) -> Self {
        Self { kind, ty: None }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.kind, self.ty) {
            (OpKind::Convert(from), Some(to)) => write!(f, "{}TO{}", from, to),
            (kind, Some(ty)) => write!(f, "{}{}", kind.name(), ty),
            (kind, None) => f.write_str(kind.name()),
        }
    }
}

impl FromStr for Operator {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Some((from, to)) = s.split_once("TO") {
            if let (Some(from), Some(to)) = (IrType::from_name(from), IrType::from_name(to)) {
                return Ok(Operator::new(OpKind::Convert(from), to));
            }
        }
        for (kind, name) in OpKind::NAMED {
            let Some(suffix) = s.strip_prefix(name) else {
                continue;
            };
            if !kind.is_typed() && suffix.is_empty() {
                return Ok(Operator::untyped(kind));
            }
            if let Some(ty) = IrType::from_name(suffix).filter(|_| kind.is_typed()) {
                return Ok(Operator::new(kind, ty));
            }
        }
        Err(format!("unknown operator `{}`", s))
    }
}

/// Comparison of a conditional jump.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CondOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CondOp {
    pub fn symbol(self) -> &'static str {
        match self {
            CondOp::Eq => "==",
            CondOp::Ne => "!=",
            CondOp::Lt => "<",
            CondOp::Le => "<=",
            CondOp::Gt => ">",
            CondOp::Ge => ">=",
        }
    }

    pub fn from_symbol(symbol: &str) -> Option<Self> {
        [CondOp::Eq, CondOp::Ne, CondOp::Lt, CondOp::Le, CondOp::Gt, CondOp::Ge]
            .into_iter()
            .find(|op| op.symbol() == symbol)
    }
}

/// Leaf payload of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IrValue<'arena> {
    None,
    Const(i64),
    /// Register read by REG, or destination of MOV.
    Reg(Register),
    /// Offset from the frame pointer.
    FrameOffset(i64),
    Label(&'arena str),
    Cond {
        op: CondOp,
        yes: &'arena str,
        no: &'arena str,
    },
}

pub type NodeId = u32;

#[derive(Debug, Clone, Copy)]
pub struct IrNode<'arena> {
    pub op: Operator,
    pub children: &'arena [NodeId],
    pub value: IrValue<'arena>,
}

/// Append-only expression DAG of one function.
#[derive(Debug)]
pub struct IrDag<'arena> {
    arena: &'arena Bump,
    nodes: Vec<IrNode<'arena>>,
}

impl<'arena> IrDag<'arena> {
    pub fn new(arena: &'arena Bump) -> Self {
        Self {
            arena,
            nodes: Vec::new(),
        }
    }

    pub fn arena(&self) -> &'arena Bump {
        self.arena
    }

    /// Copy a string into the arena.
    pub fn intern(&self, s: &str) -> &'arena str {
        self.arena.alloc_str(s)
    }

    /// Add a node. Children must already be part of this DAG.
    pub fn add(&mut self, op: Operator, children: &[NodeId], value: IrValue<'arena>) -> CodegenResult<NodeId> {
        let invalid = |message: String| CodegenError::InvalidOperand {
            instruction: op.to_string(),
            reason: message,
        };
        if op.kind.is_typed() != op.ty.is_some() {
            return Err(invalid("operator type suffix mismatch".to_string()));
        }
        if children.len() != op.kind.arity() {
            return Err(invalid(format!(
                "expected {} children, got {}",
                op.kind.arity(),
                children.len()
            )));
        }
        if let Some(bad) = children.iter().find(|&&c| c as usize >= self.nodes.len()) {
            return Err(invalid(format!("child {} does not exist yet", bad)));
        }
        let value_ok = match op.kind {
            OpKind::Const => matches!(value, IrValue::Const(_)),
            OpKind::Reg | OpKind::Mov => matches!(value, IrValue::Reg(_)),
            OpKind::FpRel => matches!(value, IrValue::FrameOffset(_)),
            OpKind::Label | OpKind::Jmp => matches!(value, IrValue::Label(_)),
            OpKind::CJmp => matches!(value, IrValue::Cond { .. }),
            _ => matches!(value, IrValue::None),
        };
        if !value_ok {
            return Err(invalid(format!("unexpected leaf value {:?}", value)));
        }

        let id = self.nodes.len() as NodeId;
        self.nodes.push(IrNode {
            op,
            children: self.arena.alloc_slice_copy(children),
            value,
        });
        Ok(id)
    }

    pub fn constant(&mut self, ty: IrType, value: i64) -> CodegenResult<NodeId> {
        self.add(Operator::new(OpKind::Const, ty), &[], IrValue::Const(value))
    }

    pub fn register(&mut self, ty: IrType, reg: Register) -> CodegenResult<NodeId> {
        self.add(Operator::new(OpKind::Reg, ty), &[], IrValue::Reg(reg))
    }

    pub fn unary(&mut self, kind: OpKind, ty: IrType, operand: NodeId) -> CodegenResult<NodeId> {
        self.add(Operator::new(kind, ty), &[operand], IrValue::None)
    }

    pub fn binary(&mut self, kind: OpKind, ty: IrType, lhs: NodeId, rhs: NodeId) -> CodegenResult<NodeId> {
        self.add(Operator::new(kind, ty), &[lhs, rhs], IrValue::None)
    }

    pub fn jump(&mut self, target: &str) -> CodegenResult<NodeId> {
        let target = self.intern(target);
        self.add(Operator::untyped(OpKind::Jmp), &[], IrValue::Label(target))
    }

    pub fn node(&self, id: NodeId) -> &IrNode<'arena> {
        &self.nodes[id as usize]
    }

    pub fn view(&self, id: NodeId) -> NodeRef<'_, 'arena> {
        NodeRef { dag: self, id }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

/// A node together with the DAG it lives in; what predicates and emitters see.
#[derive(Clone, Copy)]
pub struct NodeRef<'d, 'arena> {
    dag: &'d IrDag<'arena>,
    id: NodeId,
}

impl<'d, 'arena> NodeRef<'d, 'arena> {
    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn op(&self) -> Operator {
        self.dag.node(self.id).op
    }

    pub fn value(&self) -> IrValue<'arena> {
        self.dag.node(self.id).value
    }

    pub fn arity(&self) -> usize {
        self.dag.node(self.id).children.len()
    }

    /// The `index`th child. Panics if out of range; shapes guarantee arity.
    pub fn child(&self, index: usize) -> NodeRef<'d, 'arena> {
        NodeRef {
            dag: self.dag,
            id: self.dag.node(self.id).children[index],
        }
    }

    /// Constant payload, if this is a CONST node.
    pub fn constant(&self) -> Option<i64> {
        match self.value() {
            IrValue::Const(value) => Some(value),
            _ => None,
        }
    }
}

impl fmt::Debug for NodeRef<'_, '_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{} {}", self.id, self.op())
    }
}

#[derive(Debug, Clone)]
pub struct IrBlock<'arena> {
    pub label: &'arena str,
    /// Statement roots, selected in order.
    pub roots: Vec<NodeId>,
}

#[derive(Debug)]
pub struct IrFunction<'arena> {
    pub name: &'arena str,
    pub dag: IrDag<'arena>,
    pub blocks: Vec<IrBlock<'arena>>,
    /// Virtual registers already used by the IR; fresh ones are numbered after these.
    pub vreg_count: u32,
}

impl<'arena> IrFunction<'arena> {
    pub fn new(arena: &'arena Bump, name: &str) -> Self {
        Self {
            name: arena.alloc_str(name),
            dag: IrDag::new(arena),
            blocks: Vec::new(),
            vreg_count: 0,
        }
    }

    /// Start a new block; subsequent roots go into it.
    pub fn block(&mut self, label: &str) -> &mut IrBlock<'arena> {
        let label = self.dag.intern(label);
        self.blocks.push(IrBlock {
            label,
            roots: Vec::new(),
        });
        let last = self.blocks.len() - 1;
        &mut self.blocks[last]
    }
}
