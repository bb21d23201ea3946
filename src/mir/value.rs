//! SSA value representation and identifiers.
//!
//! A source variable (virtual register) is assigned many times in the incoming
//! method; SSA construction splits it into versions, each defined exactly once.
//! An [`SsaValue`] is one such version: the pair of a source variable and a
//! version number, plus the site of its single definition.
//!
//! # Design Rationale
//!
//! SSA values are identified by a simple index ([`SsaValueId`]) into the value
//! table owned by the method. The id encodes no semantic information; all
//! metadata lives in [`SsaValue`]. This keeps every cross-reference in the
//! graph a plain integer resolved through the owning table.

use std::fmt;

/// A source virtual register, as numbered by the bytecode-lowering collaborator.
///
/// Virtual registers are the pre-SSA variables: the same register may be
/// assigned in many blocks. SSA construction introduces one [`SsaValue`] per
/// assignment (and per placed phi).
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VarId(u16);

impl VarId {
    /// Creates a new virtual-register identifier.
    #[must_use]
    pub const fn new(index: u16) -> Self {
        Self(index)
    }

    /// Returns the underlying register index.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Debug for VarId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "r{}", self.0)
    }
}

impl fmt::Display for VarId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "r{}", self.0)
    }
}

/// Unique identifier for an SSA value.
///
/// A lightweight handle into the value table of a
/// [`MirMethod`](crate::mir::MirMethod), providing O(1) access to value
/// metadata. Unique within a single method, not globally.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SsaValueId(u32);

impl SsaValueId {
    /// Creates a new SSA value identifier.
    #[must_use]
    pub const fn new(index: u32) -> Self {
        Self(index)
    }

    /// Returns the underlying index into the value table.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Debug for SsaValueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

impl fmt::Display for SsaValueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// Definition site of an SSA value.
///
/// Every SSA value is defined exactly once: either by a specific instruction
/// (phis included, since phis are ordinary instructions at the head of their
/// block) or implicitly at method entry (the initial version of every
/// register).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DefSite {
    /// Defined implicitly at method entry (version 0 of a register).
    Entry,
    /// Defined by the instruction at `(block, instruction index)`.
    Instruction(crate::mir::BlockId, usize),
}

impl DefSite {
    /// Returns the defining block, or `None` for entry definitions.
    #[must_use]
    pub fn block(&self) -> Option<crate::mir::BlockId> {
        match self {
            Self::Entry => None,
            Self::Instruction(block, _) => Some(*block),
        }
    }
}

/// One SSA version of a source variable.
///
/// The pair `(variable, version)` is unique within a method. Version 0 is the
/// value the register holds on method entry; later versions are minted by
/// renaming, one per assignment or placed phi.
#[derive(Debug, Clone)]
pub struct SsaValue {
    id: SsaValueId,
    var: VarId,
    version: u32,
    def: DefSite,
}

impl SsaValue {
    /// Creates a new SSA value.
    #[must_use]
    pub const fn new(id: SsaValueId, var: VarId, version: u32, def: DefSite) -> Self {
        Self {
            id,
            var,
            version,
            def,
        }
    }

    /// Returns the value's unique identifier.
    #[must_use]
    pub const fn id(&self) -> SsaValueId {
        self.id
    }

    /// Returns the source variable this value is a version of.
    #[must_use]
    pub const fn var(&self) -> VarId {
        self.var
    }

    /// Returns the SSA version number.
    #[must_use]
    pub const fn version(&self) -> u32 {
        self.version
    }

    /// Returns the single definition site.
    #[must_use]
    pub const fn def(&self) -> DefSite {
        self.def
    }
}

impl fmt::Display for SsaValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.var, self.version)
    }
}
