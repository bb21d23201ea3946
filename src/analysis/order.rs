//! DFS block ordering and reachability.
//!
//! Computes preorder and postorder sequences over the reachable part of the
//! graph with an explicit-stack walk (no recursion, so arbitrarily deep
//! methods cannot overflow the stack). Blocks the walk never reaches are
//! marked hidden, their outgoing edges are removed, and they are excluded
//! from every later analysis.

use fixedbitset::FixedBitSet;

use crate::mir::{BlockId, MirMethod};

/// The DFS orderings of one method's reachable blocks.
#[derive(Debug, Clone)]
pub struct DfsOrder {
    preorder: Vec<BlockId>,
    postorder: Vec<BlockId>,
    /// Postorder position per block-table index; `None` for hidden blocks.
    postorder_index: Vec<Option<u32>>,
}

impl DfsOrder {
    /// Computes the DFS orderings for `method`, marking unreached blocks
    /// hidden and storing the result on the method.
    pub fn compute(method: &mut MirMethod) {
        let block_count = method.block_count();
        let entry = method.entry();

        let mut visited = FixedBitSet::with_capacity(block_count);
        let mut preorder = Vec::with_capacity(block_count);
        let mut postorder = Vec::with_capacity(block_count);

        // Each frame holds the block and the successors not yet descended
        // into; the block's postorder slot is claimed when the list drains.
        let mut stack: Vec<(BlockId, Vec<BlockId>)> = Vec::new();

        visited.insert(entry.index());
        preorder.push(entry);
        let entry_succs: Vec<BlockId> = method
            .block(entry)
            .map(|b| b.successors().collect())
            .unwrap_or_default();
        stack.push((entry, entry_succs));

        loop {
            let next = match stack.last_mut() {
                Some((_, succs)) => succs.pop(),
                None => break,
            };
            match next {
                Some(next) if !visited.contains(next.index()) => {
                    visited.insert(next.index());
                    preorder.push(next);
                    let next_succs: Vec<BlockId> = method
                        .block(next)
                        .map(|b| b.successors().collect())
                        .unwrap_or_default();
                    stack.push((next, next_succs));
                }
                Some(_) => {}
                None => {
                    if let Some((block, _)) = stack.pop() {
                        postorder.push(block);
                    }
                }
            }
        }

        let mut postorder_index = vec![None; block_count];
        for (idx, &block) in postorder.iter().enumerate() {
            postorder_index[block.index()] = Some(u32::try_from(idx).unwrap_or(u32::MAX));
        }

        // Hide unreached blocks and detach their edges so they contribute
        // nothing to later analyses.
        let hidden: Vec<BlockId> = method
            .blocks()
            .map(crate::mir::BasicBlock::id)
            .filter(|b| !visited.contains(b.index()))
            .collect();
        for &id in &hidden {
            if let Some(block) = method.block_mut(id) {
                block.set_hidden(true);
                block.set_fall_through(None);
                block.set_taken(None);
            }
        }
        for block in method.blocks_mut() {
            if !block.is_hidden() {
                block.retain_predecessors(|p| visited.contains(p.index()));
            }
        }

        method.dfs = Some(Self {
            preorder,
            postorder,
            postorder_index,
        });
    }

    /// Returns the DFS preorder sequence.
    #[must_use]
    pub fn preorder(&self) -> &[BlockId] {
        &self.preorder
    }

    /// Returns the DFS postorder sequence.
    #[must_use]
    pub fn postorder(&self) -> &[BlockId] {
        &self.postorder
    }

    /// Returns the reverse-postorder sequence as an owned list.
    #[must_use]
    pub fn reverse_postorder(&self) -> Vec<BlockId> {
        self.postorder.iter().rev().copied().collect()
    }

    /// Returns a block's postorder position, or `None` if it is hidden.
    #[must_use]
    pub fn postorder_index(&self, block: BlockId) -> Option<usize> {
        self.postorder_index
            .get(block.index())
            .copied()
            .flatten()
            .map(|i| i as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mir::{Instruction, MethodBuilder, VarId};

    fn diamond() -> MirMethod {
        let mut b = MethodBuilder::new(2);
        let top = b.code_block();
        let left = b.code_block();
        let right = b.code_block();
        let bottom = b.code_block();
        b.set_fall_through(b.entry(), top);
        b.push(top, Instruction::if_zero(VarId::new(0)));
        b.set_fall_through(top, left);
        b.set_taken(top, right);
        b.push(left, Instruction::goto());
        b.set_fall_through(left, bottom);
        b.push(right, Instruction::goto());
        b.set_fall_through(right, bottom);
        b.push(bottom, Instruction::ret(None));
        b.set_fall_through(bottom, b.exit());
        b.finish().unwrap()
    }

    #[test]
    fn test_preorder_starts_at_entry() {
        let mut method = diamond();
        DfsOrder::compute(&mut method);
        let dfs = method.dfs_order().unwrap();
        assert_eq!(dfs.preorder()[0], method.entry());
        assert_eq!(dfs.preorder().len(), 6);
    }

    #[test]
    fn test_postorder_ends_at_entry() {
        let mut method = diamond();
        DfsOrder::compute(&mut method);
        let dfs = method.dfs_order().unwrap();
        assert_eq!(*dfs.postorder().last().unwrap(), method.entry());
        let rpo = dfs.reverse_postorder();
        assert_eq!(rpo[0], method.entry());
    }

    #[test]
    fn test_unreached_block_hidden() {
        let mut b = MethodBuilder::new(1);
        let body = b.code_block();
        let orphan = b.code_block();
        b.set_fall_through(b.entry(), body);
        b.push(body, Instruction::ret(None));
        b.set_fall_through(body, b.exit());
        // The orphan points at the body but nothing reaches it.
        b.push(orphan, Instruction::goto());
        b.set_fall_through(orphan, body);
        let mut method = b.finish().unwrap();

        DfsOrder::compute(&mut method);

        assert!(method.block(orphan).unwrap().is_hidden());
        let dfs = method.dfs_order().unwrap();
        assert_eq!(dfs.postorder_index(orphan), None);
        // The orphan's edge no longer appears among the body's predecessors.
        assert!(!method.block(body).unwrap().predecessors().contains(&orphan));
    }

    #[test]
    fn test_postorder_respects_dominance_direction() {
        let mut method = diamond();
        DfsOrder::compute(&mut method);
        let dfs = method.dfs_order().unwrap();
        // Entry finishes last, so it has the highest postorder index.
        let entry_idx = dfs.postorder_index(method.entry()).unwrap();
        for block in method.blocks().filter(|b| !b.is_hidden()) {
            assert!(dfs.postorder_index(block.id()).unwrap() <= entry_idx);
        }
    }
}
