//! Basic blocks of the method control-flow graph.
//!
//! Blocks live in one owned, growable table per method compilation; every
//! edge (predecessor, successor, immediate dominator) is a [`BlockId`]
//! resolved through the owning [`MirMethod`](crate::mir::MirMethod), never a
//! pointer. This keeps the cyclic graph free of lifetime ambiguity while
//! preserving O(1) access.
//!
//! Dominator state (dominator bit-set, immediate dominator, dominance
//! frontier) is stored on the block and written in place by the analyses in
//! [`crate::analysis`].

use std::fmt;

use fixedbitset::FixedBitSet;

use crate::mir::Instruction;

/// Index of a basic block in the method's block table.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockId(u32);

impl BlockId {
    /// Creates a new block id.
    #[must_use]
    pub const fn new(index: u32) -> Self {
        Self(index)
    }

    /// Returns the underlying index into the block table.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Debug for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "B{}", self.0)
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "B{}", self.0)
    }
}

/// The role of a block in the graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockKind {
    /// Placeholder for a removed block; carries nothing.
    Null,
    /// The unique synthetic entry block.
    Entry,
    /// The unique synthetic exit block.
    Exit,
    /// An ordinary code block.
    Code,
}

/// One basic block: edges, analysis state, and the ordered instruction list.
///
/// Successor edges distinguish the fall-through edge, the taken edge of a
/// conditional branch, and any additional switch/catch targets. Predecessors
/// are maintained as the mirror of all successor edges; the two directions
/// are kept mutually consistent by construction and checked by
/// [`MirMethod::verify`](crate::mir::MirMethod::verify).
#[derive(Debug, Clone)]
pub struct BasicBlock {
    id: BlockId,
    kind: BlockKind,
    predecessors: Vec<BlockId>,
    fall_through: Option<BlockId>,
    taken: Option<BlockId>,
    extra_targets: Vec<BlockId>,
    hidden: bool,
    catch_entry: bool,
    /// Blocks dominating this one (self included). Empty until computed.
    pub(crate) dominators: FixedBitSet,
    /// Immediate dominator; `None` for the entry block and for blocks not yet
    /// processed.
    pub(crate) idom: Option<BlockId>,
    /// Dominance frontier. Empty until computed.
    pub(crate) dominance_frontier: FixedBitSet,
    instructions: Vec<Instruction>,
}

impl BasicBlock {
    /// Creates a new block of the given kind.
    #[must_use]
    pub fn new(id: BlockId, kind: BlockKind) -> Self {
        Self {
            id,
            kind,
            predecessors: Vec::new(),
            fall_through: None,
            taken: None,
            extra_targets: Vec::new(),
            hidden: false,
            catch_entry: false,
            dominators: FixedBitSet::new(),
            idom: None,
            dominance_frontier: FixedBitSet::new(),
            instructions: Vec::new(),
        }
    }

    /// Returns the block id.
    #[must_use]
    pub const fn id(&self) -> BlockId {
        self.id
    }

    /// Returns the block kind.
    #[must_use]
    pub const fn kind(&self) -> BlockKind {
        self.kind
    }

    /// Returns the predecessor ids.
    #[must_use]
    pub fn predecessors(&self) -> &[BlockId] {
        &self.predecessors
    }

    /// Returns the fall-through successor.
    #[must_use]
    pub const fn fall_through(&self) -> Option<BlockId> {
        self.fall_through
    }

    /// Returns the taken successor of a conditional branch.
    #[must_use]
    pub const fn taken(&self) -> Option<BlockId> {
        self.taken
    }

    /// Returns additional switch/catch targets.
    #[must_use]
    pub fn extra_targets(&self) -> &[BlockId] {
        &self.extra_targets
    }

    /// Iterates over all successor ids in edge order.
    pub fn successors(&self) -> impl Iterator<Item = BlockId> + '_ {
        self.fall_through
            .into_iter()
            .chain(self.taken)
            .chain(self.extra_targets.iter().copied())
    }

    /// Returns `true` if the block was unreached by the DFS ordering and is
    /// excluded from all further analysis.
    #[must_use]
    pub const fn is_hidden(&self) -> bool {
        self.hidden
    }

    /// Returns `true` if the block is the entry of a catch handler.
    #[must_use]
    pub const fn is_catch_entry(&self) -> bool {
        self.catch_entry
    }

    /// Returns the immediate dominator, or `None` for the entry block.
    ///
    /// Also `None` for hidden blocks and before dominator computation.
    #[must_use]
    pub const fn immediate_dominator(&self) -> Option<BlockId> {
        self.idom
    }

    /// Returns the dominator bit-set (self included). Empty until computed.
    #[must_use]
    pub const fn dominators(&self) -> &FixedBitSet {
        &self.dominators
    }

    /// Returns the dominance frontier bit-set. Empty until computed.
    #[must_use]
    pub const fn dominance_frontier(&self) -> &FixedBitSet {
        &self.dominance_frontier
    }

    /// Returns the ordered instruction list.
    #[must_use]
    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    /// Returns the ordered instruction list for mutation.
    pub fn instructions_mut(&mut self) -> &mut Vec<Instruction> {
        &mut self.instructions
    }

    /// Returns the terminating instruction, if the block has one.
    #[must_use]
    pub fn terminator(&self) -> Option<&Instruction> {
        self.instructions.last().filter(|i| i.opcode().is_terminator())
    }

    /// Appends an instruction.
    pub fn push(&mut self, instruction: Instruction) {
        self.instructions.push(instruction);
    }

    pub(crate) fn set_fall_through(&mut self, target: Option<BlockId>) {
        self.fall_through = target;
    }

    pub(crate) fn set_taken(&mut self, target: Option<BlockId>) {
        self.taken = target;
    }

    pub(crate) fn add_extra_target(&mut self, target: BlockId) {
        self.extra_targets.push(target);
    }

    pub(crate) fn add_predecessor(&mut self, pred: BlockId) {
        self.predecessors.push(pred);
    }

    pub(crate) fn retain_predecessors<F: FnMut(BlockId) -> bool>(&mut self, mut keep: F) {
        self.predecessors.retain(|&p| keep(p));
    }

    pub(crate) fn set_hidden(&mut self, hidden: bool) {
        self.hidden = hidden;
    }

    pub(crate) fn set_catch_entry(&mut self) {
        self.catch_entry = true;
    }
}

impl fmt::Display for BasicBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:", self.id)?;
        if self.catch_entry {
            write!(f, " (catch)")?;
        }
        if self.hidden {
            write!(f, " (hidden)")?;
        }
        writeln!(f)?;
        for instr in &self.instructions {
            writeln!(f, "  {instr}")?;
        }
        Ok(())
    }
}
