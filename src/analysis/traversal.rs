//! Ordered block traversals.
//!
//! One iterator type covers every traversal the passes need; the kind set is
//! closed and small, so a [`TraversalKind`] enum matched inside the iterator
//! replaces an open-ended family of iterator types.
//!
//! The iterator owns a snapshot of the order, so the caller may freely
//! mutate block contents while iterating. It is restartable via
//! [`DataflowIterator::reset`], but a snapshot taken before the
//! order-defining block lists change does not see the change.
//!
//! # Repeating traversal
//!
//! [`TraversalKind::LoopRepeatingTopological`] implements the fixed-point
//! driving discipline without embedding termination policy here: the caller
//! reports through the `changed` argument of [`DataflowIterator::next`]
//! whether the previously returned block changed, and the iterator restarts
//! the innermost dirty loop interval once it reaches the interval's end.
//! Non-repeating kinds ignore the flag. Termination is the caller's
//! obligation (monotone facts); the driver adds a defensive cap in debug
//! builds.

use strum::{Display, EnumCount};

use crate::{
    analysis::dominator_children,
    mir::{BasicBlock, BlockId, MirMethod},
    Result,
};

/// The closed set of traversal kinds.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, EnumCount)]
#[strum(serialize_all = "kebab-case")]
pub enum TraversalKind {
    /// Every non-hidden block in table order.
    AllNodes,
    /// DFS preorder.
    PreOrder,
    /// DFS postorder.
    PostOrder,
    /// Reverse postorder.
    ReversePostOrder,
    /// Postorder over the dominator tree.
    DominatorPostOrder,
    /// Topological order with contiguous loop intervals.
    Topological,
    /// Topological order, restarting a loop interval while blocks inside it
    /// report changes.
    LoopRepeatingTopological,
}

#[derive(Debug, Clone, Copy)]
struct LoopScope {
    head: usize,
    end: usize,
    dirty: bool,
}

/// A lazy, finite sequence of block ids in one of the [`TraversalKind`]
/// orders.
#[derive(Debug)]
pub struct DataflowIterator {
    kind: TraversalKind,
    order: Vec<BlockId>,
    loop_ends: Vec<Option<usize>>,
    position: usize,
    scopes: Vec<LoopScope>,
}

impl DataflowIterator {
    /// Creates an iterator over `method` in the given order.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvariantViolation`](crate::Error::InvariantViolation)
    /// if the order the kind depends on (DFS, dominators, topological) has
    /// not been computed yet.
    pub fn new(method: &MirMethod, kind: TraversalKind) -> Result<Self> {
        let (order, loop_ends) = match kind {
            TraversalKind::AllNodes => (
                method
                    .blocks()
                    .filter(|b| !b.is_hidden())
                    .map(BasicBlock::id)
                    .collect(),
                Vec::new(),
            ),
            TraversalKind::PreOrder => (method.dfs_order()?.preorder().to_vec(), Vec::new()),
            TraversalKind::PostOrder => (method.dfs_order()?.postorder().to_vec(), Vec::new()),
            TraversalKind::ReversePostOrder => {
                (method.dfs_order()?.reverse_postorder(), Vec::new())
            }
            TraversalKind::DominatorPostOrder => (dominator_postorder(method)?, Vec::new()),
            TraversalKind::Topological | TraversalKind::LoopRepeatingTopological => {
                let topo = method.topological_order()?;
                let ends = if kind == TraversalKind::LoopRepeatingTopological {
                    (0..topo.len()).map(|i| topo.loop_end(i)).collect()
                } else {
                    Vec::new()
                };
                (topo.order().to_vec(), ends)
            }
        };
        Ok(Self {
            kind,
            order,
            loop_ends,
            position: 0,
            scopes: Vec::new(),
        })
    }

    /// Returns the traversal kind.
    #[must_use]
    pub const fn kind(&self) -> TraversalKind {
        self.kind
    }

    /// Restarts the traversal from the beginning.
    pub fn reset(&mut self) {
        self.position = 0;
        self.scopes.clear();
    }

    /// Returns the next block id.
    ///
    /// `changed` reports whether the block returned by the previous call
    /// changed; only the repeating kind consults it. When a loop interval
    /// finishes with a change recorded inside it, iteration resumes at the
    /// interval head with the dirty mark cleared.
    pub fn next(&mut self, changed: bool) -> Option<BlockId> {
        if changed {
            for scope in &mut self.scopes {
                scope.dirty = true;
            }
        }

        if self.kind == TraversalKind::LoopRepeatingTopological {
            // Leave or restart finished loop intervals, innermost first.
            while let Some(scope) = self.scopes.last_mut() {
                if self.position < scope.end {
                    break;
                }
                if scope.dirty {
                    scope.dirty = false;
                    self.position = scope.head;
                    break;
                }
                self.scopes.pop();
            }
        }

        if self.position >= self.order.len() {
            return None;
        }

        if self.kind == TraversalKind::LoopRepeatingTopological {
            if let Some(end) = self.loop_ends.get(self.position).copied().flatten() {
                let head = self.position;
                let already_open = self
                    .scopes
                    .last()
                    .map(|s| s.head == head)
                    .unwrap_or(false);
                if !already_open {
                    self.scopes.push(LoopScope {
                        head,
                        end,
                        dirty: false,
                    });
                }
            }
        }

        let block = self.order[self.position];
        self.position += 1;
        Some(block)
    }
}

/// Computes postorder over the dominator tree with an explicit stack.
fn dominator_postorder(method: &MirMethod) -> Result<Vec<BlockId>> {
    method.dfs_order()?;
    let entry = method.entry();
    for block in method.blocks().filter(|b| !b.is_hidden()) {
        if block.id() != entry && block.immediate_dominator().is_none() {
            return Err(crate::Error::invariant(
                block.id(),
                "dominator traversal requested before dominator computation",
            ));
        }
    }
    let mut out = Vec::new();
    let mut stack: Vec<(BlockId, Vec<BlockId>)> = vec![(entry, dominator_children(method, entry))];
    loop {
        let child = match stack.last_mut() {
            Some((_, children)) => children.pop(),
            None => break,
        };
        match child {
            Some(child) => {
                let grand = dominator_children(method, child);
                stack.push((child, grand));
            }
            None => {
                if let Some((block, _)) = stack.pop() {
                    out.push(block);
                }
            }
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        analysis::{compute_dominators, compute_topological_order, DfsOrder},
        mir::{Instruction, MethodBuilder, VarId},
    };

    fn looped_method() -> (MirMethod, BlockId, BlockId, BlockId) {
        let mut b = MethodBuilder::new(1);
        let header = b.code_block();
        let body = b.code_block();
        let tail = b.code_block();
        b.set_fall_through(b.entry(), header);
        b.push(header, Instruction::if_zero(VarId::new(0)));
        b.set_fall_through(header, body);
        b.set_taken(header, tail);
        b.push(body, Instruction::goto());
        b.set_fall_through(body, header);
        b.push(tail, Instruction::ret(None));
        b.set_fall_through(tail, b.exit());
        let mut method = b.finish().unwrap();
        DfsOrder::compute(&mut method);
        compute_dominators(&mut method).unwrap();
        compute_topological_order(&mut method).unwrap();
        (method, header, body, tail)
    }

    fn drain(iter: &mut DataflowIterator) -> Vec<BlockId> {
        let mut out = Vec::new();
        while let Some(b) = iter.next(false) {
            out.push(b);
        }
        out
    }

    #[test]
    fn test_all_nodes_filters_hidden() {
        let mut b = MethodBuilder::new(1);
        let body = b.code_block();
        let orphan = b.code_block();
        b.set_fall_through(b.entry(), body);
        b.push(body, Instruction::ret(None));
        b.set_fall_through(body, b.exit());
        b.push(orphan, Instruction::goto());
        b.set_fall_through(orphan, body);
        let mut method = b.finish().unwrap();
        DfsOrder::compute(&mut method);

        let mut iter = DataflowIterator::new(&method, TraversalKind::AllNodes).unwrap();
        let seen = drain(&mut iter);
        assert!(!seen.contains(&orphan));
        assert_eq!(seen.len(), 3);
    }

    #[test]
    fn test_orders_require_analysis() {
        let mut b = MethodBuilder::new(1);
        let body = b.code_block();
        b.set_fall_through(b.entry(), body);
        b.push(body, Instruction::ret(None));
        b.set_fall_through(body, b.exit());
        let method = b.finish().unwrap();

        assert!(DataflowIterator::new(&method, TraversalKind::PreOrder).is_err());
        assert!(DataflowIterator::new(&method, TraversalKind::Topological).is_err());
        assert!(DataflowIterator::new(&method, TraversalKind::AllNodes).is_ok());
    }

    #[test]
    fn test_reverse_postorder_starts_at_entry() {
        let (method, ..) = looped_method();
        let mut iter = DataflowIterator::new(&method, TraversalKind::ReversePostOrder).unwrap();
        assert_eq!(iter.next(false), Some(method.entry()));
    }

    #[test]
    fn test_dominator_postorder_ends_at_entry() {
        let (method, ..) = looped_method();
        let mut iter = DataflowIterator::new(&method, TraversalKind::DominatorPostOrder).unwrap();
        let seen = drain(&mut iter);
        assert_eq!(*seen.last().unwrap(), method.entry());
        assert_eq!(seen.len(), 5);
    }

    #[test]
    fn test_loop_repeating_restarts_dirty_interval() {
        let (method, header, body, _tail) = looped_method();
        let mut iter =
            DataflowIterator::new(&method, TraversalKind::LoopRepeatingTopological).unwrap();

        let mut seen = Vec::new();
        let mut reported = false;
        while let Some(block) = iter.next(reported) {
            seen.push(block);
            // Report one change inside the loop body on the first pass.
            reported = block == body && seen.iter().filter(|&&b| b == body).count() == 1;
        }

        // The loop interval [header, body] runs twice, the rest once.
        assert_eq!(seen.iter().filter(|&&b| b == header).count(), 2);
        assert_eq!(seen.iter().filter(|&&b| b == body).count(), 2);
        assert_eq!(seen.iter().filter(|&&b| b == method.entry()).count(), 1);
    }

    #[test]
    fn test_non_repeating_ignores_changed() {
        let (method, ..) = looped_method();
        let mut iter = DataflowIterator::new(&method, TraversalKind::Topological).unwrap();
        let mut count = 0;
        while iter.next(true).is_some() {
            count += 1;
        }
        assert_eq!(count, 5);
    }

    #[test]
    fn test_reset() {
        let (method, ..) = looped_method();
        let mut iter = DataflowIterator::new(&method, TraversalKind::PreOrder).unwrap();
        let first = drain(&mut iter);
        assert!(iter.next(false).is_none());
        iter.reset();
        let second = drain(&mut iter);
        assert_eq!(first, second);
    }
}
