// Copyright 2025 Johann Kempter
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
// SPDX-License-Identifier: Apache-2.0

#![doc(html_no_source)]
#![deny(missing_docs)]
#![allow(dead_code)]

//! # miropt
//!
//! The optimizing middle-end of a bytecode method compiler: SSA construction
//! over a method's control-flow graph and global value numbering (GVN)
//! driving redundant-check elimination - null checks, array-bounds checks,
//! and class-initialization checks.
//!
//! ## Features
//!
//! - **Id-table graphs** - Blocks and edges are plain indices into one owned
//!   table per method; no pointers, no lifetime puzzles
//! - **Full SSA pipeline** - Non-recursive DFS ordering, iterative
//!   dominators, dominance frontiers, pruned phi placement, renaming
//! - **Alias-aware value numbering** - A two-category memory model
//!   separating provably unaliased fresh allocations from everything else
//! - **Provable termination** - Monotone, lattice-bounded fixed points with
//!   defensive iteration caps in debug builds
//! - **Method-granular fallback** - Unsupported input shapes degrade one
//!   method to the unoptimized path instead of failing the build
//!
//! ## Quick Start
//!
//! ```rust
//! use miropt::analysis::SsaBuilder;
//! use miropt::mir::{Instruction, MethodBuilder, VarId};
//! use miropt::opt::{run_passes, CheckEliminationPass, EventLog};
//!
//! // Lowering hands us a CFG: one block storing into a fresh object.
//! let mut b = MethodBuilder::new(3);
//! let class = b.class();
//! let field = b.instance_field(class, false);
//! let body = b.code_block();
//! b.set_fall_through(b.entry(), body);
//! b.push(body, Instruction::new_instance(VarId::new(0), class));
//! b.push(body, Instruction::konst(VarId::new(1), 7));
//! b.push(body, Instruction::iput(VarId::new(1), VarId::new(0), field));
//! b.push(body, Instruction::iget(VarId::new(2), VarId::new(0), field));
//! b.push(body, Instruction::ret(Some(VarId::new(2))));
//! b.set_fall_through(body, b.exit());
//! let mut method = b.finish()?;
//!
//! // Build SSA form, then let value numbering elide redundant checks.
//! SsaBuilder::build(&mut method)?;
//! let mut events = EventLog::new();
//! run_passes(&mut method, &[&CheckEliminationPass], &mut events)?;
//! # Ok::<(), miropt::Error>(())
//! ```
//!
//! ## Architecture
//!
//! - [`mir`] - The method IR: blocks, instructions, SSA values, resolution
//!   tables, and the [`mir::MethodBuilder`] lowering surface
//! - [`analysis`] - DFS orders, dominators, loops, liveness, traversals,
//!   and [`analysis::SsaBuilder`]
//! - [`opt`] - Value numbering ([`opt::gvn`]), the check-elimination
//!   consumers, the [`opt::MirPass`] interface, and the [`opt::EventLog`]
//! - [`Error`] and [`Result`] - Error handling with a hard split between
//!   fatal invariant violations and method-granular fallback
//!
//! All state is scoped to one method's compilation and freed with its
//! [`mir::MirMethod`]; nothing is shared across methods.

pub mod analysis;
pub mod mir;
pub mod opt;

mod error;

pub use error::Error;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, Error>;

/// Convenient re-exports of the most commonly used types.
pub mod prelude {
    //! One-line import for the common surface:
    //!
    //! ```rust
    //! use miropt::prelude::*;
    //! ```

    pub use crate::analysis::{DataflowIterator, SsaBuilder, TraversalKind};
    pub use crate::mir::{
        BasicBlock, BlockId, Instruction, InstructionFlags, MethodBuilder, MirMethod, Opcode,
        SsaValueId, VarId,
    };
    pub use crate::opt::{
        gvn::GlobalValueNumbering, run_passes, CheckEliminationPass, CheckEliminator, EventKind,
        EventLog, MirPass, PassResult,
    };
    pub use crate::{Error, Result};
}
