//! SSA construction (Cytron et al.).
//!
//! This module implements the classic SSA construction algorithm from:
//!
//! > Cytron et al., "Efficiently Computing Static Single Assignment Form and
//! > the Control Dependence Graph", ACM TOPLAS 1991
//!
//! # Algorithm Overview
//!
//! 1. **Phi placement**: For each source variable, the iterated dominance
//!    frontier of its definition blocks receives a phi - pruned to blocks
//!    where the variable is live in, since a dead phi is safe to omit.
//! 2. **Renaming**: A dominator-tree preorder walk maintains one
//!    current-name stack per variable. The walk uses an explicit stack with
//!    scoped checkpoint/restore around each child, so sibling subtrees never
//!    observe each other's renames and deep methods cannot overflow the call
//!    stack.
//! 3. **Phi operands**: Filled in a second pass from each predecessor's
//!    exit-time name for the variable.
//!
//! Hidden blocks are not renamed and receive no phis.
//!
//! # Usage
//!
//! ```rust
//! use miropt::analysis::SsaBuilder;
//! use miropt::mir::{Instruction, MethodBuilder, VarId};
//!
//! let mut b = MethodBuilder::new(1);
//! let body = b.code_block();
//! b.set_fall_through(b.entry(), body);
//! b.push(body, Instruction::konst(VarId::new(0), 7));
//! b.push(body, Instruction::ret(Some(VarId::new(0))));
//! b.set_fall_through(body, b.exit());
//! let mut method = b.finish()?;
//!
//! SsaBuilder::build(&mut method)?;
//! assert!(method.value_count() > 0);
//! # Ok::<(), miropt::Error>(())
//! ```

use std::collections::HashSet;

use crate::{
    analysis::{
        compute_dominators, compute_topological_order, dominator_children, DfsOrder, Liveness,
    },
    mir::{BlockId, DefSite, Instruction, MirMethod, Opcode, SsaValue, SsaValueId, VarId},
    Error, Result,
};

/// Builder running the full SSA pipeline on one method.
#[derive(Debug)]
pub struct SsaBuilder;

/// One step of the explicit dominator-tree walk.
enum WalkStep {
    Enter(BlockId),
    /// Scope checkpoint: pop one name per listed entry when the subtree is
    /// left, so siblings never observe this subtree's renames.
    Restore(Vec<VarId>),
}

impl SsaBuilder {
    /// Runs DFS ordering, dominators, the topological order, phi placement,
    /// and renaming on `method`.
    ///
    /// # Errors
    ///
    /// - [`Error::InvariantViolation`] for malformed graphs.
    /// - [`Error::UnsupportedMethod`] when an instruction references a
    ///   virtual register outside the declared range; the caller should mark
    ///   the method for the unoptimized fallback path.
    pub fn build(method: &mut MirMethod) -> Result<()> {
        method.verify()?;
        DfsOrder::compute(method);
        compute_dominators(method)?;
        compute_topological_order(method)?;

        let liveness = Liveness::compute(method)?;
        Self::place_phis(method, &liveness)?;
        Self::rename(method)?;
        method.verify()
    }

    /// Places phis at the iterated dominance frontier of each variable's
    /// definition blocks.
    fn place_phis(method: &mut MirMethod, liveness: &Liveness) -> Result<()> {
        let num_vregs = method.num_vregs();
        let entry = method.entry();

        // Definition blocks per variable. Every variable has an implicit
        // definition at entry (its initial version).
        let mut def_blocks: Vec<HashSet<BlockId>> = vec![HashSet::new(); num_vregs as usize];
        for set in &mut def_blocks {
            set.insert(entry);
        }
        for block in method.blocks().filter(|b| !b.is_hidden()) {
            for instr in block.instructions() {
                if let Some(def) = instr.def() {
                    if def.index() >= num_vregs as usize {
                        return Err(Error::unsupported(format!(
                            "instruction defines {def} outside the declared register range"
                        )));
                    }
                    def_blocks[def.index()].insert(block.id());
                }
            }
        }

        for vreg in 0..num_vregs {
            let var = VarId::new(vreg);
            let mut phi_blocks: HashSet<BlockId> = HashSet::new();
            let mut worklist: Vec<BlockId> = def_blocks[var.index()].iter().copied().collect();

            // Iterated dominance frontier.
            while let Some(block) = worklist.pop() {
                let frontier = match method.block(block) {
                    Some(b) => b.dominance_frontier().clone(),
                    None => continue,
                };
                for member in frontier.ones() {
                    let member_id = BlockId::new(u32::try_from(member).unwrap_or(u32::MAX));
                    if phi_blocks.insert(member_id) {
                        worklist.push(member_id);
                    }
                }
            }

            let mut placed: Vec<BlockId> = phi_blocks
                .into_iter()
                .filter(|&b| liveness.is_live_in(b, var))
                .collect();
            placed.sort_by_key(|b| b.index());
            for block_id in placed {
                let block = method
                    .block_mut(block_id)
                    .ok_or_else(|| Error::invariant(block_id, "phi target out of range"))?;
                let pred_count = block.predecessors().len();
                let phi = Instruction::new(Opcode::Phi, vec![var; pred_count], Some(var));
                block.instructions_mut().insert(0, phi);
            }
        }
        Ok(())
    }

    /// Renames variables along the dominator tree and fills phi operands
    /// from predecessor exit-time names.
    fn rename(method: &mut MirMethod) -> Result<()> {
        let num_vregs = method.num_vregs() as usize;
        let entry = method.entry();
        let block_count = method.block_count();

        // Current-name stack and next version per variable.
        let mut names: Vec<Vec<SsaValueId>> = vec![Vec::new(); num_vregs];
        let mut next_version: Vec<u32> = vec![1; num_vregs];
        for vreg in 0..num_vregs {
            let var = VarId::new(u16::try_from(vreg).unwrap_or(u16::MAX));
            let id = SsaValueId::new(u32::try_from(method.value_count()).unwrap_or(u32::MAX));
            method.add_value(SsaValue::new(id, var, 0, DefSite::Entry));
            names[vreg].push(id);
        }

        // Exit-time names per block for the phi-operand pass.
        let mut exit_names: Vec<Option<Vec<SsaValueId>>> = vec![None; block_count];

        let mut walk = vec![WalkStep::Enter(entry)];
        while let Some(step) = walk.pop() {
            match step {
                WalkStep::Enter(block_id) => {
                    let pushed =
                        Self::rename_block(method, block_id, &mut names, &mut next_version)?;
                    let mut snapshot = Vec::with_capacity(names.len());
                    for stack in &names {
                        let name = stack
                            .last()
                            .copied()
                            .ok_or_else(|| Error::invariant(block_id, "empty name stack"))?;
                        snapshot.push(name);
                    }
                    exit_names[block_id.index()] = Some(snapshot);

                    walk.push(WalkStep::Restore(pushed));
                    let mut children = dominator_children(method, block_id);
                    children.sort_by_key(|b| b.index());
                    for child in children.into_iter().rev() {
                        walk.push(WalkStep::Enter(child));
                    }
                }
                WalkStep::Restore(pushed) => {
                    for var in pushed {
                        names[var.index()].pop();
                    }
                }
            }
        }

        // Second pass: phi operands read each predecessor's exit-time name.
        let block_ids: Vec<BlockId> = method
            .blocks()
            .filter(|b| !b.is_hidden())
            .map(crate::mir::BasicBlock::id)
            .collect();
        for block_id in block_ids {
            let preds: Vec<BlockId> = method
                .block(block_id)
                .map(|b| b.predecessors().to_vec())
                .unwrap_or_default();
            let phi_count = method
                .block(block_id)
                .map(|b| {
                    b.instructions()
                        .iter()
                        .take_while(|i| matches!(i.opcode(), Opcode::Phi))
                        .count()
                })
                .unwrap_or(0);
            for phi_index in 0..phi_count {
                let var = method
                    .block(block_id)
                    .and_then(|b| b.instructions().get(phi_index))
                    .and_then(Instruction::def)
                    .ok_or_else(|| Error::invariant(block_id, "phi without a defined variable"))?;
                let mut operands = Vec::with_capacity(preds.len());
                for &pred in &preds {
                    let name = exit_names[pred.index()]
                        .as_ref()
                        .and_then(|n| n.get(var.index()).copied())
                        .ok_or_else(|| {
                            Error::invariant(
                                block_id,
                                format!("predecessor {pred} has no exit-time name for {var}"),
                            )
                        })?;
                    operands.push(name);
                }
                let block = method
                    .block_mut(block_id)
                    .ok_or_else(|| Error::invariant(block_id, "block vanished during renaming"))?;
                if let Some(phi) = block.instructions_mut().get_mut(phi_index) {
                    phi.set_ssa_uses(operands);
                }
            }
        }
        Ok(())
    }

    /// Renames one block's instructions; returns the variables whose name
    /// stacks grew, in push order, for the scope restore.
    fn rename_block(
        method: &mut MirMethod,
        block_id: BlockId,
        names: &mut [Vec<SsaValueId>],
        next_version: &mut [u32],
    ) -> Result<Vec<VarId>> {
        let mut pushed = Vec::new();
        let instr_count = method
            .block(block_id)
            .map(|b| b.instructions().len())
            .unwrap_or(0);

        for idx in 0..instr_count {
            let (opcode_is_phi, uses, def) = {
                let instr = method
                    .block(block_id)
                    .and_then(|b| b.instructions().get(idx))
                    .ok_or_else(|| Error::invariant(block_id, "instruction index out of range"))?;
                (
                    matches!(instr.opcode(), Opcode::Phi),
                    instr.uses().to_vec(),
                    instr.def(),
                )
            };

            if !opcode_is_phi {
                let mut ssa_uses = Vec::with_capacity(uses.len());
                for var in &uses {
                    if var.index() >= names.len() {
                        return Err(Error::unsupported(format!(
                            "instruction reads {var} outside the declared register range"
                        )));
                    }
                    let name = names[var.index()]
                        .last()
                        .copied()
                        .ok_or_else(|| Error::invariant(block_id, "empty name stack"))?;
                    ssa_uses.push(name);
                }
                if let Some(block) = method.block_mut(block_id) {
                    if let Some(instr) = block.instructions_mut().get_mut(idx) {
                        instr.set_ssa_uses(ssa_uses);
                    }
                }
            }

            if let Some(var) = def {
                if var.index() >= names.len() {
                    return Err(Error::unsupported(format!(
                        "instruction defines {var} outside the declared register range"
                    )));
                }
                let version = next_version[var.index()];
                next_version[var.index()] += 1;
                let id = SsaValueId::new(u32::try_from(method.value_count()).unwrap_or(u32::MAX));
                method.add_value(SsaValue::new(
                    id,
                    var,
                    version,
                    DefSite::Instruction(block_id, idx),
                ));
                names[var.index()].push(id);
                pushed.push(var);
                if let Some(block) = method.block_mut(block_id) {
                    if let Some(instr) = block.instructions_mut().get_mut(idx) {
                        instr.set_ssa_def(id);
                    }
                }
            }
        }
        Ok(pushed)
    }
}
