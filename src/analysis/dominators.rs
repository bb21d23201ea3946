//! Dominator and dominance-frontier computation.
//!
//! # Theory
//!
//! A block `d` **dominates** a block `n` if every path from the entry to `n`
//! passes through `d`. The **immediate dominator** of `n` is the unique
//! closest strict dominator; making each block's immediate dominator its
//! parent yields the dominator tree, rooted at the entry.
//!
//! # Algorithm
//!
//! Immediate dominators are computed iteratively over reverse postorder:
//! every block starts unknown except the entry (which dominates itself), and
//! each pass intersects the dominator chains of the already-processed
//! predecessors by walking immediate-dominator links to a common ancestor,
//! comparing positions by postorder index. Each block's value can only move
//! up the tree, so the iteration is monotone and bounded by the block count.
//!
//! Dominance frontiers are then built in two parts: the local part (a CFG
//! successor not immediately dominated by the block joins its frontier) and
//! the propagated part (walking the dominator tree in postorder, a frontier
//! member of an immediately dominated child that the block does not strictly
//! dominate joins the block's frontier as well).
//!
//! Results are written in place: each block's dominator bit-set, immediate
//! dominator, and frontier bit-set.

use fixedbitset::FixedBitSet;

use crate::{
    mir::{BlockId, MirMethod},
    Error, Result,
};

/// Iteration cap for the dominator fixed point in debug builds. The
/// algorithm is bounded by the block count; exceeding the cap means the
/// monotonicity invariant was broken.
#[cfg(debug_assertions)]
const MAX_DOMINATOR_PASSES: usize = 4;

/// Computes immediate dominators, dominator bit-sets, and dominance
/// frontiers for every reachable block.
///
/// Requires the DFS ordering; hidden blocks get no dominator and no
/// frontier.
///
/// # Errors
///
/// Returns [`Error::InvariantViolation`] if the DFS ordering is missing, and
/// [`Error::FixedPointDiverged`] if the iteration fails to settle within the
/// debug-build cap.
pub fn compute_dominators(method: &mut MirMethod) -> Result<()> {
    let dfs = method.dfs_order()?;
    let rpo = dfs.reverse_postorder();
    let postorder_index: Vec<Option<usize>> = (0..method.block_count())
        .map(|i| dfs.postorder_index(BlockId::new(u32::try_from(i).unwrap_or(u32::MAX))))
        .collect();

    let entry = method.entry();
    let block_count = method.block_count();

    // Immediate dominators, entry mapped to itself while iterating.
    let mut idom: Vec<Option<BlockId>> = vec![None; block_count];
    idom[entry.index()] = Some(entry);

    let preds: Vec<Vec<BlockId>> = (0..block_count)
        .map(|i| {
            method
                .block(BlockId::new(u32::try_from(i).unwrap_or(u32::MAX)))
                .map(|b| b.predecessors().to_vec())
                .unwrap_or_default()
        })
        .collect();

    let intersect = |idom: &[Option<BlockId>], mut a: BlockId, mut b: BlockId| -> BlockId {
        // Walk the chains toward the entry; lower postorder index means
        // deeper in the tree.
        loop {
            let pa = postorder_index[a.index()].unwrap_or(0);
            let pb = postorder_index[b.index()].unwrap_or(0);
            if pa == pb {
                return a;
            }
            if pa < pb {
                a = idom[a.index()].unwrap_or(a);
            } else {
                b = idom[b.index()].unwrap_or(b);
            }
        }
    };

    let mut changed = true;
    let mut passes = 0usize;
    while changed {
        changed = false;
        passes += 1;
        #[cfg(debug_assertions)]
        if passes > block_count.max(MAX_DOMINATOR_PASSES) {
            return Err(Error::FixedPointDiverged { passes });
        }
        for &block in rpo.iter().skip(1) {
            let mut new_idom: Option<BlockId> = None;
            for &pred in &preds[block.index()] {
                if idom[pred.index()].is_none() {
                    continue;
                }
                new_idom = Some(match new_idom {
                    None => pred,
                    Some(current) => intersect(&idom, pred, current),
                });
            }
            if new_idom.is_some() && idom[block.index()] != new_idom {
                idom[block.index()] = new_idom;
                changed = true;
            }
        }
    }
    let _ = passes;

    for &block in &rpo {
        if idom[block.index()].is_none() {
            return Err(Error::invariant(
                block,
                "reachable block has no immediate dominator",
            ));
        }
    }

    // Publish immediate dominators; the entry's is exposed as None.
    for &block in &rpo {
        let value = if block == entry {
            None
        } else {
            idom[block.index()]
        };
        if let Some(b) = method.block_mut(block) {
            b.idom = value;
        }
    }

    // Dominator bit-sets: dom(b) = dom(idom(b)) ∪ {b}, filled in reverse
    // postorder so the parent set is always complete first.
    for &block in &rpo {
        let mut set = if block == entry {
            FixedBitSet::with_capacity(block_count)
        } else {
            let parent = idom[block.index()].unwrap_or(entry);
            method
                .block(parent)
                .map(|b| b.dominators.clone())
                .unwrap_or_else(|| FixedBitSet::with_capacity(block_count))
        };
        if set.len() < block_count {
            set.grow(block_count);
        }
        set.insert(block.index());
        if let Some(b) = method.block_mut(block) {
            b.dominators = set;
        }
    }

    compute_dominance_frontiers(method, &rpo)?;
    Ok(())
}

/// Builds the two-part dominance frontiers. Blocks must already carry their
/// immediate dominators and dominator bit-sets.
fn compute_dominance_frontiers(method: &mut MirMethod, rpo: &[BlockId]) -> Result<()> {
    let block_count = method.block_count();
    let mut frontiers: Vec<FixedBitSet> = (0..block_count)
        .map(|_| FixedBitSet::with_capacity(block_count))
        .collect();

    // Local part: successors not immediately dominated by this block.
    for &block in rpo {
        let succs: Vec<BlockId> = method
            .block(block)
            .map(|b| b.successors().collect())
            .unwrap_or_default();
        for succ in succs {
            let succ_idom = method.block(succ).and_then(|b| b.immediate_dominator());
            if succ_idom != Some(block) {
                frontiers[block.index()].insert(succ.index());
            }
        }
    }

    // Propagated part: walk the dominator tree in postorder (children have
    // lower postorder indices than their parents, so plain CFG postorder
    // visits children first).
    let postorder: Vec<BlockId> = rpo.iter().rev().copied().collect();
    for &block in &postorder {
        let children: Vec<BlockId> = postorder
            .iter()
            .copied()
            .filter(|c| {
                method
                    .block(*c)
                    .and_then(|b| b.immediate_dominator())
                    .map(|i| i == block)
                    .unwrap_or(false)
            })
            .collect();
        for child in children {
            let child_frontier = frontiers[child.index()].clone();
            for member in child_frontier.ones() {
                if !strictly_dominates_index(method, block, member) {
                    frontiers[block.index()].insert(member);
                }
            }
        }
    }

    for &block in rpo {
        let frontier = std::mem::take(&mut frontiers[block.index()]);
        method
            .block_mut(block)
            .ok_or_else(|| Error::invariant(block, "block vanished during frontier computation"))?
            .dominance_frontier = frontier;
    }
    Ok(())
}

fn strictly_dominates_index(method: &MirMethod, a: BlockId, b_index: usize) -> bool {
    if a.index() == b_index {
        return false;
    }
    method
        .block(BlockId::new(u32::try_from(b_index).unwrap_or(u32::MAX)))
        .map(|b| b.dominators.contains(a.index()))
        .unwrap_or(false)
}

/// Returns `true` if `a` dominates `b` (a block dominates itself).
///
/// Requires [`compute_dominators`] to have run.
#[must_use]
pub fn dominates(method: &MirMethod, a: BlockId, b: BlockId) -> bool {
    method
        .block(b)
        .map(|block| block.dominators.contains(a.index()))
        .unwrap_or(false)
}

/// Returns the dominator-tree children of `block`.
#[must_use]
pub fn dominator_children(method: &MirMethod, block: BlockId) -> Vec<BlockId> {
    method
        .blocks()
        .filter(|b| !b.is_hidden() && b.id() != block)
        .filter(|b| b.immediate_dominator() == Some(block))
        .map(crate::mir::BasicBlock::id)
        .collect()
}
