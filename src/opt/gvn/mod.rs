//! Value numbering: the hash-consing table, the per-block abstract
//! interpreter, and the global fixed-point driver.
//!
//! See [`GlobalValueNumbering`] for the two-phase entry points and
//! [`LvnState`] for the fact lattice merged across the graph.

mod global;
mod local;
mod table;

pub use global::GlobalValueNumbering;
pub use local::LvnState;
pub use table::{ValueNumber, ValueTable};
