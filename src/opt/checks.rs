//! Check-elimination consumers.
//!
//! Three narrow, monotonic, idempotent units that read global
//! value-numbering facts and decide whether a runtime check is redundant:
//!
//! - **Null checks** - redundant when the dereferenced reference's value
//!   number is known non-null from a dominating check or a
//!   non-null-producing definition on every path.
//! - **Range checks** - redundant when the `(array, index)` value-number
//!   pair was bounds-checked by a dominating access on every path.
//! - **Class-init checks** - redundant when the declaring class is known
//!   initialized on every path (the fact is shared across all static
//!   fields of the class).
//!
//! The elimination phase of [`GlobalValueNumbering`] consults these units
//! per instruction and sets the corresponding skip bits; each is also
//! wrapped as a [`MirPass`] for the pass-scheduling collaborator. Setting a
//! bit never invalidates any other fact, so re-running on a stable state
//! changes nothing.

use crate::{
    mir::{ClassId, MirMethod},
    opt::{
        gvn::{GlobalValueNumbering, LvnState, ValueNumber},
        EventLog, MirPass, PassResult,
    },
    Result,
};

/// Null-check elimination predicate.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullCheckElimination;

impl NullCheckElimination {
    /// Returns `true` if `reference` is proven non-null in `state`.
    #[must_use]
    pub fn is_redundant(&self, state: &LvnState, reference: ValueNumber) -> bool {
        state.is_null_checked(reference)
    }
}

/// Range-check elimination predicate.
#[derive(Debug, Clone, Copy, Default)]
pub struct RangeCheckElimination;

impl RangeCheckElimination {
    /// Returns `true` if the `(array, index)` pair was already
    /// bounds-checked in `state`.
    #[must_use]
    pub fn is_redundant(&self, state: &LvnState, array: ValueNumber, index: ValueNumber) -> bool {
        state.is_range_checked(array, index)
    }
}

/// Class-initialization-check elimination predicate.
#[derive(Debug, Clone, Copy, Default)]
pub struct ClassInitCheckElimination;

impl ClassInitCheckElimination {
    /// Returns `true` if `class` is known initialized in `state`.
    #[must_use]
    pub fn is_redundant(&self, state: &LvnState, class: ClassId) -> bool {
        state.is_clinit_checked(class)
    }
}

/// The consumer set the elimination phase applies.
///
/// Each kind can be toggled so the narrow single-purpose passes below can
/// share the same driver.
#[derive(Debug, Clone, Copy)]
pub struct CheckEliminator {
    /// Apply null-check elimination.
    pub null: bool,
    /// Apply range-check elimination.
    pub range: bool,
    /// Apply class-init-check elimination.
    pub clinit: bool,
}

impl CheckEliminator {
    /// All three consumers enabled.
    #[must_use]
    pub const fn all() -> Self {
        Self {
            null: true,
            range: true,
            clinit: true,
        }
    }

    /// Only null-check elimination.
    #[must_use]
    pub const fn null_only() -> Self {
        Self {
            null: true,
            range: false,
            clinit: false,
        }
    }

    /// Only range-check elimination.
    #[must_use]
    pub const fn range_only() -> Self {
        Self {
            null: false,
            range: true,
            clinit: false,
        }
    }

    /// Only class-init-check elimination.
    #[must_use]
    pub const fn clinit_only() -> Self {
        Self {
            null: false,
            range: false,
            clinit: true,
        }
    }

    pub(crate) fn null_redundant(&self, state: &LvnState, reference: ValueNumber) -> bool {
        self.null && NullCheckElimination.is_redundant(state, reference)
    }

    pub(crate) fn range_redundant(
        &self,
        state: &LvnState,
        array: ValueNumber,
        index: ValueNumber,
    ) -> bool {
        self.range && RangeCheckElimination.is_redundant(state, array, index)
    }

    pub(crate) fn clinit_redundant(&self, state: &LvnState, class: ClassId) -> bool {
        self.clinit && ClassInitCheckElimination.is_redundant(state, class)
    }
}

macro_rules! check_pass {
    ($name:ident, $eliminator:expr, $pass_name:literal, $description:literal, $doc:literal) => {
        #[doc = $doc]
        ///
        /// Runs both value-numbering phases on the method; see the module
        /// documentation for the underlying facts.
        #[derive(Debug, Clone, Copy, Default)]
        pub struct $name;

        impl MirPass for $name {
            fn name(&self) -> &'static str {
                $pass_name
            }

            fn description(&self) -> &'static str {
                $description
            }

            fn run(&self, method: &mut MirMethod, events: &mut EventLog) -> Result<PassResult> {
                let mut gvn = GlobalValueNumbering::number(method, events)?;
                gvn.apply(method, $eliminator, events)
            }
        }
    };
}

check_pass!(
    NullCheckEliminationPass,
    CheckEliminator::null_only(),
    "null-check-elimination",
    "Skips null checks proven redundant by value numbering",
    "Null-check elimination as a standalone pass."
);
check_pass!(
    RangeCheckEliminationPass,
    CheckEliminator::range_only(),
    "range-check-elimination",
    "Skips array-bounds checks proven redundant by value numbering",
    "Range-check elimination as a standalone pass."
);
check_pass!(
    ClassInitCheckEliminationPass,
    CheckEliminator::clinit_only(),
    "class-init-check-elimination",
    "Skips class-initialization checks proven redundant by value numbering",
    "Class-initialization-check elimination as a standalone pass."
);
check_pass!(
    CheckEliminationPass,
    CheckEliminator::all(),
    "check-elimination",
    "Skips null, bounds, and class-init checks proven redundant by value numbering",
    "All three check-elimination consumers in one value-numbering run."
);
