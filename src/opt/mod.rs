//! Optimization passes over SSA form.
//!
//! The centerpiece is global value numbering
//! ([`gvn::GlobalValueNumbering`]): a fixed-point, alias-aware abstract
//! interpreter whose facts drive the three check-elimination consumers
//! ([`CheckEliminationPass`] and its single-purpose variants). Passes
//! implement [`MirPass`] and report explicit [`PassResult`]s; diagnostics go
//! through the [`EventLog`].

mod checks;
mod events;
mod pass;

pub mod gvn;

pub use checks::{
    CheckEliminationPass, CheckEliminator, ClassInitCheckElimination,
    ClassInitCheckEliminationPass, NullCheckElimination, NullCheckEliminationPass,
    RangeCheckElimination, RangeCheckEliminationPass,
};
pub use events::{Event, EventKind, EventLog};
pub use pass::{run_passes, MirPass, PassResult};
