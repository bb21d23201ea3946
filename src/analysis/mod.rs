//! Graph analyses over the method IR.
//!
//! The analyses build on each other in a fixed sequence:
//!
//! 1. [`DfsOrder::compute`] - DFS preorder/postorder, hidden-block marking
//! 2. [`compute_dominators`] - immediate dominators, dominator bit-sets,
//!    dominance frontiers (written in place on the blocks)
//! 3. [`compute_topological_order`] / [`find_loops`] - natural loops and the
//!    loop-nested topological order
//! 4. [`Liveness::compute`] - per-block live-in registers
//! 5. [`SsaBuilder::build`] - phi placement and renaming (runs 1–4 itself)
//!
//! [`DataflowIterator`] serves ordered block sequences over the computed
//! orders to the optimization passes.

mod dominators;
mod liveness;
mod loops;
mod order;
mod ssa;
mod traversal;

pub use dominators::{compute_dominators, dominates, dominator_children};
pub use liveness::Liveness;
pub use loops::{compute_topological_order, find_loops, NaturalLoop, TopologicalOrder};
pub use order::DfsOrder;
pub use ssa::SsaBuilder;
pub use traversal::{DataflowIterator, TraversalKind};
