// This module implements the cost-based tree-pattern matcher. Selection of a
// statement root runs in two phases. Labeling walks every not-yet-labeled node
// reachable from the root in ascending node id order, which puts children before
// parents because the DAG only ever points to older nodes, and records for each
// nonterminal the cheapest way to produce it: a base rule rooted at the node's
// operator whose shape and predicate match, costing its declared cost plus the cost
// of its nonterminal leaves, then chain rules relaxed until nothing improves.
// Candidates are compared on (cost, declaration index) so ties go to the rule
// registered first. Reduction then walks the chosen rules top down, reduces leaves
// before calling the emitter, and memoizes each (node, nonterminal) result for the
// rest of the function, so a node shared by several parents is emitted exactly once.
// A nonterminal with no label fails the unit with NoApplicablePattern.

//! Instruction selection over an IR DAG.

use super::patterns::{Grammar, NtValue, PatternRule, Shape};
use super::target::Target;
use crate::core::context::{CodeGenContext, Unit};
use crate::core::error::{CodegenError, CodegenResult};
use crate::ir::{IrDag, IrFunction, NodeId};
use hashbrown::{HashMap, HashSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Choice {
    cost: u32,
    rule: usize,
}

type NodeLabels = HashMap<&'static str, Choice>;

/// Keep `candidate` if it beats the current entry for `nt`.
fn consider(table: &mut NodeLabels, nt: &'static str, candidate: Choice) -> bool {
    match table.get(nt) {
        Some(best) if (best.cost, best.rule) <= (candidate.cost, candidate.rule) => false,
        _ => {
            table.insert(nt, candidate);
            true
        }
    }
}

/// Selection state for one function's DAG.
pub struct Selection<'g, 'd, 'arena> {
    grammar: &'g Grammar,
    dag: &'d IrDag<'arena>,
    labels: HashMap<NodeId, NodeLabels>,
    values: HashMap<(NodeId, &'static str), NtValue>,
}

impl<'g, 'd, 'arena> Selection<'g, 'd, 'arena> {
    pub fn new(grammar: &'g Grammar, dag: &'d IrDag<'arena>) -> Self {
        Self {
            grammar,
            dag,
            labels: HashMap::new(),
            values: HashMap::new(),
        }
    }

    /// Reduce `node` to `nonterminal`, emitting into `ctx`.
    pub fn select(&mut self, ctx: &mut CodeGenContext<'_>, node: NodeId, nonterminal: &'static str) -> CodegenResult<NtValue> {
        self.label(node);
        self.reduce(ctx, node, nonterminal)
    }

    /// Cheapest cost of producing `nonterminal` from `node`.
    pub fn cost(&mut self, node: NodeId, nonterminal: &str) -> Option<u32> {
        self.label(node);
        self.labels.get(&node)?.get(nonterminal).map(|label| label.cost)
    }

    /// Rule the selector would apply for `node` as `nonterminal`.
    pub fn chosen_rule(&mut self, node: NodeId, nonterminal: &str) -> Option<&'g PatternRule> {
        self.label(node);
        let grammar = self.grammar;
        let label = self.labels.get(&node)?.get(nonterminal)?;
        Some(grammar.rule(label.rule))
    }

    fn label(&mut self, root: NodeId) {
        if self.labels.contains_key(&root) {
            return;
        }
        let dag = self.dag;
        let mut pending = vec![root];
        let mut seen = HashSet::new();
        let mut order = Vec::new();
        while let Some(id) = pending.pop() {
            if self.labels.contains_key(&id) || !seen.insert(id) {
                continue;
            }
            order.push(id);
            pending.extend_from_slice(dag.node(id).children);
        }
        order.sort_unstable();
        for id in order {
            let table = self.label_node(id);
            self.labels.insert(id, table);
        }
    }

    fn label_node(&self, id: NodeId) -> NodeLabels {
        let node = self.dag.view(id);
        let mut table = NodeLabels::new();
        let mut leaves = Vec::new();

        for &index in self.grammar.rules_for(node.op()) {
            let rule = self.grammar.rule(index);
            leaves.clear();
            if !rule.shape.matches(node, &mut leaves) || !rule.applies(&node) {
                continue;
            }
            let leaf_cost = leaves.iter().try_fold(0u32, |acc, (leaf, nt)| {
                let label = self.labels.get(leaf)?.get(nt)?;
                Some(acc.saturating_add(label.cost))
            });
            if let Some(leaf_cost) = leaf_cost {
                let candidate = Choice {
                    cost: rule.cost.saturating_add(leaf_cost),
                    rule: index,
                };
                consider(&mut table, rule.nonterminal, candidate);
            }
        }

        // relax chain rules; a pass without change is the fixpoint
        let chains = self.grammar.chain_rules();
        for _ in 0..=chains.len() {
            let mut changed = false;
            for &index in chains {
                let rule = self.grammar.rule(index);
                let Shape::Nonterminal(from) = rule.shape else {
                    continue;
                };
                let Some(source) = table.get(from).copied() else {
                    continue;
                };
                if !rule.applies(&node) {
                    continue;
                }
                let candidate = Choice {
                    cost: source.cost.saturating_add(rule.cost),
                    rule: index,
                };
                changed |= consider(&mut table, rule.nonterminal, candidate);
            }
            if !changed {
                break;
            }
        }

        log::trace!("labeled {:?}: {} nonterminals", node, table.len());
        table
    }

    fn reduce(&mut self, ctx: &mut CodeGenContext<'_>, id: NodeId, nonterminal: &'static str) -> CodegenResult<NtValue> {
        if let Some(value) = self.values.get(&(id, nonterminal)) {
            log::trace!("memo hit #{} as {}", id, nonterminal);
            return Ok(*value);
        }
        let dag = self.dag;
        let grammar = self.grammar;
        let node = dag.view(id);
        let label = self
            .labels
            .get(&id)
            .and_then(|table| table.get(nonterminal))
            .copied()
            .ok_or_else(|| CodegenError::NoApplicablePattern {
                operator: node.op().to_string(),
                nonterminal: nonterminal.to_string(),
            })?;
        let rule = grammar.rule(label.rule);

        let mut leaves = Vec::new();
        rule.shape.matches(node, &mut leaves);
        let mut args = Vec::with_capacity(leaves.len());
        for (leaf, leaf_nt) in leaves {
            args.push(self.reduce(ctx, leaf, leaf_nt)?);
        }

        log::trace!("{:?} as {}: {} (cost {})", node, nonterminal, rule, label.cost);
        let value = (rule.emitter)(ctx, &node, &args)?;
        ctx.record_rule(rule.size, rule.cycles);
        self.values.insert((id, nonterminal), value);
        Ok(value)
    }
}

/// Select every block of `function` into a fresh unit.
pub fn select_function(target: &dyn Target, function: &IrFunction<'_>) -> CodegenResult<Unit> {
    let grammar = target.grammar();
    let mut ctx = CodeGenContext::new(target, function.name, function.vreg_count);
    let mut selection = Selection::new(grammar, &function.dag);
    for block in &function.blocks {
        ctx.place_label(block.label);
        for &root in &block.roots {
            selection.select(&mut ctx, root, grammar.goal())?;
        }
    }
    log::debug!(
        "selected {} for {}: {} blocks, {} nodes, {} rules applied",
        function.name,
        target.name(),
        function.blocks.len(),
        function.dag.len(),
        ctx.stats().rules_applied
    );
    Ok(ctx.finish())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codegen::patterns::GrammarBuilder;
    use crate::ir::{IrType, OpKind};
    use bumpalo::Bump;

    fn grammar(add_imm_cost: u32) -> Grammar {
        let mut g = GrammarBuilder::new(&["stm", "reg"]);
        g.rule("stm", &["reg"]).cost(0).emit(|_, _, _| Ok(NtValue::None));
        g.rule("reg", &["CONSTI32"]).cost(8).emit(|_, _, _| Ok(NtValue::None));
        g.rule("reg", &["ADDI32(reg, reg)"]).cost(4).emit(|_, _, _| Ok(NtValue::None));
        g.rule("reg", &["ADDI32(reg, CONSTI32)"])
            .cost(add_imm_cost)
            .when(|n| n.child(1).constant().is_some_and(|c| (0..=255).contains(&c)))
            .emit(|_, _, _| Ok(NtValue::None));
        g.build().unwrap()
    }

    #[test]
    fn test_lowest_cost_wins_and_ties_go_to_first_rule() {
        let arena = Bump::new();
        let mut dag = IrDag::new(&arena);
        let c = dag.constant(IrType::I32, 1).unwrap();
        let x = dag.constant(IrType::I32, 7).unwrap();
        let add = dag.binary(OpKind::Add, IrType::I32, x, c).unwrap();

        let g = grammar(4);
        let mut sel = Selection::new(&g, &dag);
        assert_eq!(sel.cost(add, "reg"), Some(12));
        assert_eq!(sel.chosen_rule(add, "reg").unwrap().shape.to_string(), "ADDI32(reg, CONSTI32)");
        assert_eq!(sel.cost(add, "stm"), Some(12));

        // equal cost: ADDI32(reg, reg) is declared earlier
        let g = grammar(12);
        let mut sel = Selection::new(&g, &dag);
        assert_eq!(sel.chosen_rule(add, "reg").unwrap().shape.to_string(), "ADDI32(reg, reg)");
    }

    #[test]
    fn test_missing_rule_is_reported() {
        let arena = Bump::new();
        let mut dag = IrDag::new(&arena);
        let c = dag.constant(IrType::I32, 1).unwrap();
        let neg = dag.unary(OpKind::Neg, IrType::I32, c).unwrap();

        let g = grammar(4);
        let mut sel = Selection::new(&g, &dag);
        assert_eq!(sel.cost(neg, "reg"), None);
        assert_eq!(sel.cost(c, "reg"), Some(8));
    }
}
