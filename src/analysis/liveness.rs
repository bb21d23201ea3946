//! Source-variable liveness.
//!
//! A backward dataflow computing, per block, which virtual registers are
//! live on entry. SSA construction uses this to prune phis: a phi is placed
//! at a join only if the variable is live into that block. Omitting a dead
//! phi is always safe; this is a precision prerequisite, not a correctness
//! one.
//!
//! The solver is the usual worklist iteration: `live_in = gen ∪ (live_out −
//! kill)` with `live_out` the union over successors, seeded in postorder so
//! most blocks settle in one pass.

use fixedbitset::FixedBitSet;

use crate::{
    mir::{BlockId, MirMethod},
    Result,
};

/// Per-block live-in sets over source virtual registers.
#[derive(Debug)]
pub struct Liveness {
    live_in: Vec<FixedBitSet>,
}

impl Liveness {
    /// Computes liveness for all reachable blocks. Requires the DFS
    /// ordering (for the iteration seed).
    pub fn compute(method: &MirMethod) -> Result<Self> {
        let block_count = method.block_count();
        let num_vregs = method.num_vregs() as usize;

        let mut gen_sets: Vec<FixedBitSet> = Vec::with_capacity(block_count);
        let mut kill_sets: Vec<FixedBitSet> = Vec::with_capacity(block_count);
        for i in 0..block_count {
            let mut gen = FixedBitSet::with_capacity(num_vregs);
            let mut kill = FixedBitSet::with_capacity(num_vregs);
            if let Some(block) = method.block(BlockId::new(u32::try_from(i).unwrap_or(u32::MAX))) {
                for instr in block.instructions() {
                    for var in instr.uses() {
                        if var.index() >= num_vregs {
                            return Err(crate::Error::unsupported(format!(
                                "instruction reads {var} outside the declared register range"
                            )));
                        }
                        if !kill.contains(var.index()) {
                            gen.insert(var.index());
                        }
                    }
                    if let Some(def) = instr.def() {
                        if def.index() >= num_vregs {
                            return Err(crate::Error::unsupported(format!(
                                "instruction defines {def} outside the declared register range"
                            )));
                        }
                        kill.insert(def.index());
                    }
                }
            }
            gen_sets.push(gen);
            kill_sets.push(kill);
        }

        let mut live_in: Vec<FixedBitSet> = (0..block_count)
            .map(|_| FixedBitSet::with_capacity(num_vregs))
            .collect();

        let postorder = method.dfs_order()?.postorder().to_vec();
        let mut changed = true;
        while changed {
            changed = false;
            for &block_id in &postorder {
                let block = match method.block(block_id) {
                    Some(b) if !b.is_hidden() => b,
                    _ => continue,
                };
                let mut live_out = FixedBitSet::with_capacity(num_vregs);
                for succ in block.successors() {
                    live_out.union_with(&live_in[succ.index()]);
                }
                live_out.difference_with(&kill_sets[block_id.index()]);
                live_out.union_with(&gen_sets[block_id.index()]);
                if live_out != live_in[block_id.index()] {
                    live_in[block_id.index()] = live_out;
                    changed = true;
                }
            }
        }

        Ok(Self { live_in })
    }

    /// Returns `true` if `var` is live on entry to `block`.
    #[must_use]
    pub fn is_live_in(&self, block: BlockId, var: crate::mir::VarId) -> bool {
        self.live_in
            .get(block.index())
            .map(|set| set.contains(var.index()))
            .unwrap_or(false)
    }
}
