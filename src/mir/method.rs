//! The per-method compilation unit: block table, SSA value table, and
//! resolution tables.
//!
//! A [`MirMethod`] owns everything the middle-end derives for one method and
//! is discarded wholesale at the end of that method's compile; no state
//! crosses methods. Upstream lowering creates the blocks and instructions
//! (through [`MethodBuilder`](crate::mir::MethodBuilder)); this subsystem
//! mutates them in place (dominator fields, SSA ids, optimization flags).

use std::fmt;

use bitflags::bitflags;

use crate::{
    analysis::{DfsOrder, TopologicalOrder},
    mir::{BasicBlock, BlockId, BlockKind, Opcode, ResolutionTables, SsaValue, SsaValueId},
    Error, Result,
};

bitflags! {
    /// Per-method state flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct MethodFlags: u8 {
        /// The method was marked for the unoptimized fallback path.
        ///
        /// Set when analysis hits an unsupported input shape. The generated
        /// code is slower; compilation itself still succeeds.
        const REQUIRES_FALLBACK = 1 << 0;
    }
}

/// One method's control-flow graph and derived state.
#[derive(Debug)]
pub struct MirMethod {
    blocks: Vec<BasicBlock>,
    entry: BlockId,
    exit: BlockId,
    num_vregs: u16,
    values: Vec<SsaValue>,
    tables: ResolutionTables,
    flags: MethodFlags,
    pub(crate) dfs: Option<DfsOrder>,
    pub(crate) topological: Option<TopologicalOrder>,
}

impl MirMethod {
    pub(crate) fn from_parts(
        blocks: Vec<BasicBlock>,
        entry: BlockId,
        exit: BlockId,
        num_vregs: u16,
        tables: ResolutionTables,
    ) -> Self {
        Self {
            blocks,
            entry,
            exit,
            num_vregs,
            values: Vec::new(),
            tables,
            flags: MethodFlags::empty(),
            dfs: None,
            topological: None,
        }
    }

    /// Returns the entry block id.
    #[must_use]
    pub const fn entry(&self) -> BlockId {
        self.entry
    }

    /// Returns the exit block id.
    #[must_use]
    pub const fn exit(&self) -> BlockId {
        self.exit
    }

    /// Returns the number of blocks in the table, hidden blocks included.
    #[must_use]
    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    /// Returns the number of source virtual registers.
    #[must_use]
    pub const fn num_vregs(&self) -> u16 {
        self.num_vregs
    }

    /// Returns a block by id.
    #[must_use]
    pub fn block(&self, id: BlockId) -> Option<&BasicBlock> {
        self.blocks.get(id.index())
    }

    /// Returns a block by id for mutation.
    pub fn block_mut(&mut self, id: BlockId) -> Option<&mut BasicBlock> {
        self.blocks.get_mut(id.index())
    }

    /// Iterates over all blocks in table order.
    pub fn blocks(&self) -> impl Iterator<Item = &BasicBlock> {
        self.blocks.iter()
    }

    pub(crate) fn blocks_mut(&mut self) -> &mut [BasicBlock] {
        &mut self.blocks
    }

    /// Returns the field/method resolution tables.
    #[must_use]
    pub const fn tables(&self) -> &ResolutionTables {
        &self.tables
    }

    /// Returns an SSA value by id.
    #[must_use]
    pub fn value(&self, id: SsaValueId) -> Option<&SsaValue> {
        self.values.get(id.index())
    }

    /// Returns the number of SSA values. Zero until SSA construction runs.
    #[must_use]
    pub fn value_count(&self) -> usize {
        self.values.len()
    }

    /// Iterates over all SSA values.
    pub fn values(&self) -> impl Iterator<Item = &SsaValue> {
        self.values.iter()
    }

    pub(crate) fn add_value(&mut self, value: SsaValue) -> SsaValueId {
        let id = value.id();
        debug_assert_eq!(id.index(), self.values.len());
        self.values.push(value);
        id
    }

    /// Returns the method state flags.
    #[must_use]
    pub const fn flags(&self) -> MethodFlags {
        self.flags
    }

    /// Marks the method for the unoptimized fallback path.
    pub fn mark_fallback(&mut self) {
        self.flags |= MethodFlags::REQUIRES_FALLBACK;
    }

    /// Returns `true` if the method must take the unoptimized fallback path.
    #[must_use]
    pub const fn requires_fallback(&self) -> bool {
        self.flags.contains(MethodFlags::REQUIRES_FALLBACK)
    }

    /// Returns the DFS ordering, or an error if it has not been computed.
    pub fn dfs_order(&self) -> Result<&DfsOrder> {
        self.dfs
            .as_ref()
            .ok_or_else(|| Error::invariant(None, "DFS ordering requested before computation"))
    }

    /// Returns the topological ordering, or an error if it has not been
    /// computed.
    pub fn topological_order(&self) -> Result<&TopologicalOrder> {
        self.topological.as_ref().ok_or_else(|| {
            Error::invariant(None, "topological ordering requested before computation")
        })
    }

    /// Checks the structural invariants of the graph.
    ///
    /// Verified properties:
    ///
    /// - entry and exit blocks exist, have the right kinds, and the entry has
    ///   no predecessors while the exit has no successors;
    /// - every successor edge has a matching predecessor entry and vice
    ///   versa;
    /// - every edge target is inside the block table;
    /// - every phi instruction sits at the head of its block and, once
    ///   renamed, carries exactly one SSA operand per predecessor.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvariantViolation`] identifying the offending block.
    /// Violations are fatal for the method: value numbering on a malformed
    /// graph would silently corrupt its results.
    pub fn verify(&self) -> Result<()> {
        let entry = self
            .block(self.entry)
            .ok_or_else(|| Error::invariant(self.entry, "entry block missing from table"))?;
        if entry.kind() != BlockKind::Entry {
            return Err(Error::invariant(self.entry, "entry block has wrong kind"));
        }
        if !entry.predecessors().is_empty() {
            return Err(Error::invariant(self.entry, "entry block has predecessors"));
        }
        let exit = self
            .block(self.exit)
            .ok_or_else(|| Error::invariant(self.exit, "exit block missing from table"))?;
        if exit.kind() != BlockKind::Exit {
            return Err(Error::invariant(self.exit, "exit block has wrong kind"));
        }
        if exit.successors().next().is_some() {
            return Err(Error::invariant(self.exit, "exit block has successors"));
        }

        for block in &self.blocks {
            for succ in block.successors() {
                let target = self.block(succ).ok_or_else(|| {
                    Error::invariant(block.id(), format!("successor {succ} out of range"))
                })?;
                if !target.predecessors().contains(&block.id()) {
                    return Err(Error::invariant(
                        block.id(),
                        format!("edge to {succ} has no matching predecessor entry"),
                    ));
                }
            }
            for &pred in block.predecessors() {
                let source = self.block(pred).ok_or_else(|| {
                    Error::invariant(block.id(), format!("predecessor {pred} out of range"))
                })?;
                if !source.successors().any(|s| s == block.id()) {
                    return Err(Error::invariant(
                        block.id(),
                        format!("predecessor {pred} has no matching successor edge"),
                    ));
                }
            }

            let mut in_phis = true;
            for instr in block.instructions() {
                let is_phi = matches!(instr.opcode(), Opcode::Phi);
                if is_phi {
                    if !in_phis {
                        return Err(Error::invariant(
                            block.id(),
                            "phi instruction after non-phi instruction",
                        ));
                    }
                    if !instr.ssa_uses().is_empty()
                        && instr.ssa_uses().len() != block.predecessors().len()
                    {
                        return Err(Error::invariant(
                            block.id(),
                            format!(
                                "phi has {} operands for {} predecessors",
                                instr.ssa_uses().len(),
                                block.predecessors().len()
                            ),
                        ));
                    }
                } else {
                    in_phis = false;
                }
            }
        }
        Ok(())
    }
}

impl fmt::Display for MirMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for block in &self.blocks {
            if block.is_hidden() {
                continue;
            }
            write!(f, "{block}")?;
        }
        Ok(())
    }
}
