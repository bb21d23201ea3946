//! Construction surface for the bytecode-lowering collaborator.
//!
//! [`MethodBuilder`] assembles the initial CFG: blocks, successor edges, the
//! per-block instruction lists, and the field/method resolution tables.
//! Predecessor lists are derived from the successor edges when the builder
//! finishes, so the two edge directions are mutually consistent by
//! construction; [`MirMethod::verify`] is still run as a final gate.
//!
//! # Examples
//!
//! ```rust
//! use miropt::mir::{Instruction, MethodBuilder, VarId};
//!
//! let mut b = MethodBuilder::new(2);
//! let body = b.code_block();
//! b.set_fall_through(b.entry(), body);
//! b.push(body, Instruction::konst(VarId::new(0), 42));
//! b.push(body, Instruction::ret(Some(VarId::new(0))));
//! b.set_fall_through(body, b.exit());
//!
//! let method = b.finish()?;
//! assert_eq!(method.block_count(), 3);
//! # Ok::<(), miropt::Error>(())
//! ```

use crate::{
    mir::{
        BasicBlock, BlockId, BlockKind, ClassId, FieldDesc, FieldId, Instruction, MethodDesc,
        MethodId, MirMethod, ResolutionTables,
    },
    Result,
};

/// Builder for the initial control-flow graph of one method.
#[derive(Debug)]
pub struct MethodBuilder {
    blocks: Vec<BasicBlock>,
    entry: BlockId,
    exit: BlockId,
    num_vregs: u16,
    tables: ResolutionTables,
}

impl MethodBuilder {
    /// Creates a builder with synthetic entry and exit blocks.
    ///
    /// `num_vregs` is the number of source virtual registers the lowered
    /// instructions reference.
    #[must_use]
    pub fn new(num_vregs: u16) -> Self {
        let entry = BlockId::new(0);
        let exit = BlockId::new(1);
        Self {
            blocks: vec![
                BasicBlock::new(entry, BlockKind::Entry),
                BasicBlock::new(exit, BlockKind::Exit),
            ],
            entry,
            exit,
            num_vregs,
            tables: ResolutionTables::new(),
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

    /// Appends a new code block and returns its id.
    pub fn code_block(&mut self) -> BlockId {
        let id = BlockId::new(u32::try_from(self.blocks.len()).unwrap_or(u32::MAX));
        self.blocks.push(BasicBlock::new(id, BlockKind::Code));
        id
    }

    /// Appends a new catch-handler entry block and returns its id.
    pub fn catch_block(&mut self) -> BlockId {
        let id = self.code_block();
        self.blocks[id.index()].set_catch_entry();
        id
    }

    /// Sets the fall-through successor of `from`.
    pub fn set_fall_through(&mut self, from: BlockId, to: BlockId) {
        self.blocks[from.index()].set_fall_through(Some(to));
    }

    /// Sets the taken successor of `from` (the target of its conditional
    /// branch).
    pub fn set_taken(&mut self, from: BlockId, to: BlockId) {
        self.blocks[from.index()].set_taken(Some(to));
    }

    /// Adds an extra switch/catch target edge from `from`.
    pub fn add_extra_target(&mut self, from: BlockId, to: BlockId) {
        self.blocks[from.index()].add_extra_target(to);
    }

    /// Appends an instruction to a block.
    pub fn push(&mut self, block: BlockId, instruction: Instruction) {
        self.blocks[block.index()].push(instruction);
    }

    /// Registers a class identity.
    pub fn class(&mut self) -> ClassId {
        self.tables.add_class()
    }

    /// Registers a resolved instance field of `class`.
    pub fn instance_field(&mut self, class: ClassId, is_volatile: bool) -> FieldId {
        self.tables.add_field(FieldDesc {
            class: Some(class),
            resolved: true,
            is_static: false,
            is_volatile,
        })
    }

    /// Registers a resolved static field of `class`.
    pub fn static_field(&mut self, class: ClassId, is_volatile: bool) -> FieldId {
        self.tables.add_field(FieldDesc {
            class: Some(class),
            resolved: true,
            is_static: true,
            is_volatile,
        })
    }

    /// Registers a field reference that failed resolution.
    pub fn unresolved_field(&mut self, is_static: bool) -> FieldId {
        self.tables.add_field(FieldDesc {
            class: None,
            resolved: false,
            is_static,
            is_volatile: false,
        })
    }

    /// Registers a resolved static method of `class`.
    pub fn static_method(&mut self, class: ClassId) -> MethodId {
        self.tables.add_method(MethodDesc {
            class: Some(class),
            resolved: true,
            is_static: true,
        })
    }

    /// Registers a resolved virtual method of `class`.
    pub fn virtual_method(&mut self, class: ClassId) -> MethodId {
        self.tables.add_method(MethodDesc {
            class: Some(class),
            resolved: true,
            is_static: false,
        })
    }

    /// Registers a method reference that failed resolution.
    pub fn unresolved_method(&mut self, is_static: bool) -> MethodId {
        self.tables.add_method(MethodDesc {
            class: None,
            resolved: false,
            is_static,
        })
    }

    /// Derives predecessor lists, verifies the graph, and hands over the
    /// method.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvariantViolation`](crate::Error::InvariantViolation)
    /// if the assembled graph is malformed.
    pub fn finish(mut self) -> Result<MirMethod> {
        let edges: Vec<(BlockId, BlockId)> = self
            .blocks
            .iter()
            .flat_map(|block| {
                let from = block.id();
                block.successors().map(move |to| (from, to)).collect::<Vec<_>>()
            })
            .collect();
        for (from, to) in edges {
            if let Some(target) = self.blocks.get_mut(to.index()) {
                target.add_predecessor(from);
            }
        }

        let method =
            MirMethod::from_parts(self.blocks, self.entry, self.exit, self.num_vregs, self.tables);
        method.verify()?;
        Ok(method)
    }
}
