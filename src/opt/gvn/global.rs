//! Global value numbering: the fixed-point driver.
//!
//! One LVN exit state is owned per block. Preparing a block merges the exit
//! states of its already-processed predecessors - a fact survives only if
//! every contributing predecessor holds it with an equal value number, and
//! edges not yet processed contribute nothing (absent, not
//! unknown-but-eventually-consistent). Finishing a block commits its new
//! exit state and reports whether anything differs from the previous visit.
//!
//! Traversal is the loop-repeating topological order: a change inside a
//! loop restarts that loop's interval, not the whole method. Termination is
//! guaranteed because exit states form a lattice bounded below by "no
//! facts" and every merge is monotonically information-losing; what this
//! driver specifically avoids is merging *all* locations ever touched by
//! *any* predecessor, which can orbit forever when an address depends on a
//! phi fed by itself.
//!
//! # Two-phase contract
//!
//! [`GlobalValueNumbering::number`] runs read-only to the fixed point,
//! assigning every instruction a value number.
//! [`GlobalValueNumbering::apply`] then runs once, non-repeating, with
//! mutation enabled: it re-derives the same numbers (bit-identical, checked)
//! while setting skip-flag bits wherever a fact is already established on
//! every path. Divergence between the phases is an internal-invariant
//! violation, never silently truncated - truncation would yield unsafe
//! "already checked" facts.

use std::collections::HashMap;

use crate::{
    analysis::{DataflowIterator, TraversalKind},
    mir::{BlockId, InstructionFlags, MirMethod, Opcode, SsaValueId},
    opt::{
        checks::CheckEliminator,
        gvn::{
            local::{Lvn, LvnState, MergeInputs},
            table::{InstrUid, ValueNumber, ValueTable},
        },
        EventKind, EventLog, PassResult,
    },
    Error, Result,
};

/// Defensive visit cap per block for the debug-build divergence check.
#[cfg(debug_assertions)]
const MAX_VISITS_PER_BLOCK: usize = 64;

/// The per-method global value numbering state and result.
///
/// After [`number`](Self::number), every SSA value has a number and every
/// number has a representative instruction; both maps are part of the
/// external interface for downstream consumers (dead-code elimination,
/// constant folding).
#[derive(Debug)]
pub struct GlobalValueNumbering {
    table: ValueTable,
    values: HashMap<SsaValueId, ValueNumber>,
    representatives: HashMap<ValueNumber, InstrUid>,
    entry_states: Vec<Option<LvnState>>,
    exit_states: Vec<Option<LvnState>>,
}

impl GlobalValueNumbering {
    /// Phase 1: runs the read-only numbering to a fixed point.
    ///
    /// Requires SSA form (see [`SsaBuilder`](crate::analysis::SsaBuilder)).
    ///
    /// # Errors
    ///
    /// - [`Error::InvariantViolation`] if SSA construction has not run or
    ///   the graph is malformed.
    /// - [`Error::FixedPointDiverged`] if the debug-build visit cap is hit,
    ///   which means the monotone-merge invariant was broken.
    pub fn number(method: &MirMethod, events: &mut EventLog) -> Result<Self> {
        for block in method.blocks().filter(|b| !b.is_hidden()) {
            for instr in block.instructions() {
                if !instr.uses().is_empty() && instr.ssa_uses().is_empty() {
                    return Err(Error::invariant(
                        block.id(),
                        "value numbering requested before SSA construction",
                    ));
                }
            }
        }

        let mut gvn = Self {
            table: ValueTable::new(),
            values: HashMap::new(),
            representatives: HashMap::new(),
            entry_states: vec![None; method.block_count()],
            exit_states: vec![None; method.block_count()],
        };

        // The initial version of every register is an opaque incoming value.
        for value in method.values() {
            if value.def() == crate::mir::DefSite::Entry {
                let vn = gvn.table.initial(value.id().index());
                gvn.values.insert(value.id(), vn);
            }
        }

        let mut iterator =
            DataflowIterator::new(method, TraversalKind::LoopRepeatingTopological)?;
        let mut visits = 0usize;
        let mut changed = false;
        while let Some(block_id) = iterator.next(changed) {
            visits += 1;
            #[cfg(debug_assertions)]
            if visits > MAX_VISITS_PER_BLOCK * method.block_count().max(1) {
                return Err(Error::FixedPointDiverged { passes: visits });
            }

            let (entry_state, merge) = gvn.prepare_basic_block(method, block_id)?;
            let outcome = Lvn::new(
                method,
                &mut gvn.table,
                &mut gvn.values,
                &mut gvn.representatives,
                entry_state.clone(),
            )
            .run(block_id, &merge, None)?;
            changed = gvn.finish_basic_block(block_id, entry_state, outcome.state)
                || outcome.changed;
        }

        events
            .record(EventKind::FixedPointPass)
            .message(format!("converged after {visits} block visits"));
        Ok(gvn)
    }

    /// Phase 2: one non-repeating mutating pass setting skip-flag bits.
    ///
    /// Re-derives every value number and checks it is bit-identical to
    /// phase 1. Idempotent: applying again on the stable state reports
    /// [`PassResult::Unchanged`].
    ///
    /// # Errors
    ///
    /// [`Error::FixedPointDiverged`] if the re-derivation disagrees with
    /// phase 1.
    pub fn apply(
        &mut self,
        method: &mut MirMethod,
        eliminator: CheckEliminator,
        events: &mut EventLog,
    ) -> Result<PassResult> {
        let mut iterator = DataflowIterator::new(method, TraversalKind::Topological)?;
        let mut any_changed = false;

        while let Some(block_id) = iterator.next(false) {
            let (entry_state, merge) = self.prepare_basic_block(method, block_id)?;
            if self.entry_states[block_id.index()].as_ref() != Some(&entry_state) {
                return Err(Error::FixedPointDiverged { passes: 1 });
            }
            let outcome = Lvn::new(
                method,
                &mut self.table,
                &mut self.values,
                &mut self.representatives,
                entry_state,
            )
            .run(block_id, &merge, Some(&eliminator))?;
            if outcome.changed
                || self.exit_states[block_id.index()].as_ref() != Some(&outcome.state)
            {
                return Err(Error::FixedPointDiverged { passes: 1 });
            }

            for (idx, flags) in outcome.flags {
                let block = method
                    .block_mut(block_id)
                    .ok_or_else(|| Error::invariant(block_id, "block missing from table"))?;
                let instr = block
                    .instructions_mut()
                    .get_mut(idx)
                    .ok_or_else(|| Error::invariant(block_id, "instruction index out of range"))?;
                let gained = flags - instr.flags();
                if gained.is_empty() {
                    continue;
                }
                instr.set_flags(flags);
                any_changed = true;
                if gained.contains(InstructionFlags::SKIP_NULL_CHECK) {
                    events
                        .record(EventKind::NullCheckEliminated)
                        .block(block_id)
                        .instruction(idx);
                }
                if gained.contains(InstructionFlags::SKIP_RANGE_CHECK) {
                    events
                        .record(EventKind::RangeCheckEliminated)
                        .block(block_id)
                        .instruction(idx);
                }
                if gained.contains(InstructionFlags::SKIP_CLINIT_CHECK) {
                    events
                        .record(EventKind::ClassInitCheckEliminated)
                        .block(block_id)
                        .instruction(idx);
                }
            }
        }

        Ok(if any_changed {
            PassResult::Changed
        } else {
            PassResult::Unchanged
        })
    }

    /// Builds the merged entry state for `block` from the already-processed
    /// predecessors, along with the contributing inputs for phi handling.
    fn prepare_basic_block(
        &self,
        method: &MirMethod,
        block_id: BlockId,
    ) -> Result<(LvnState, MergeInputs)> {
        let block = method
            .block(block_id)
            .ok_or_else(|| Error::invariant(block_id, "block missing from table"))?;
        let catch_entry = block.is_catch_entry();

        let mut merge = MergeInputs::default();
        for (pred_index, &pred) in block.predecessors().iter().enumerate() {
            // Catch handlers can be entered before any instruction of the
            // throwing block completed, so they merge predecessor entry
            // states; normal edges merge exit states.
            let source = if catch_entry {
                self.entry_states[pred.index()].as_ref()
            } else {
                self.exit_states[pred.index()].as_ref()
            };
            let Some(source) = source else {
                continue; // Not yet processed: contributes nothing.
            };
            let mut state = source.clone();
            if !catch_entry {
                self.refine_branch_edge(method, pred, block_id, &mut state);
            }
            merge.inputs.push((pred_index, state));
        }

        let mut merged = match merge.inputs.split_first() {
            None => LvnState::default(),
            Some(((_, first), rest)) => {
                let mut state = first.clone();
                for (_, other) in rest {
                    state.meet(other);
                }
                state
            }
        };
        if catch_entry {
            merged.prune_for_catch();
        }
        Ok((merged, merge))
    }

    /// Commits the states for `block` and reports whether the exit state
    /// differs from the previous visit.
    fn finish_basic_block(
        &mut self,
        block_id: BlockId,
        entry_state: LvnState,
        exit_state: LvnState,
    ) -> bool {
        let changed = self.exit_states[block_id.index()].as_ref() != Some(&exit_state);
        self.entry_states[block_id.index()] = Some(entry_state);
        self.exit_states[block_id.index()] = Some(exit_state);
        changed
    }

    /// A conditional branch proves its tested value non-zero along one
    /// edge; a reference compared against zero is null-checked there.
    fn refine_branch_edge(
        &self,
        method: &MirMethod,
        pred: BlockId,
        succ: BlockId,
        state: &mut LvnState,
    ) {
        let Some(block) = method.block(pred) else {
            return;
        };
        let Some(terminator) = block.terminator() else {
            return;
        };
        let non_zero_on_taken = match terminator.opcode() {
            Opcode::IfNonZero => true,
            Opcode::IfZero => false,
            _ => return,
        };
        let to_taken = block.taken() == Some(succ);
        let to_fall_through = block.fall_through() == Some(succ);
        if to_taken == to_fall_through {
            return; // Both edges or neither: no refinement.
        }
        let non_zero_edge = (non_zero_on_taken && to_taken)
            || (!non_zero_on_taken && to_fall_through);
        if !non_zero_edge {
            return;
        }
        if let Some(tested) = terminator.ssa_uses().first() {
            if let Some(&vn) = self.values.get(tested) {
                state.insert_null_checked(vn);
            }
        }
    }

    /// Returns the value number assigned to an SSA value.
    #[must_use]
    pub fn value_number(&self, value: SsaValueId) -> Option<ValueNumber> {
        self.values.get(&value).copied()
    }

    /// Returns the representative instruction of a value number: the first
    /// instruction, in processing order, whose definition received it.
    #[must_use]
    pub fn representative(&self, vn: ValueNumber) -> Option<(BlockId, usize)> {
        self.representatives.get(&vn).copied()
    }

    /// Returns the merged facts on entry to `block`.
    #[must_use]
    pub fn entry_state(&self, block: BlockId) -> Option<&LvnState> {
        self.entry_states.get(block.index()).and_then(Option::as_ref)
    }

    /// Returns the facts at the exit of `block`.
    #[must_use]
    pub fn exit_state(&self, block: BlockId) -> Option<&LvnState> {
        self.exit_states.get(block.index()).and_then(Option::as_ref)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        analysis::SsaBuilder,
        mir::{Instruction, MethodBuilder, VarId},
    };

    fn optimize(method: &mut MirMethod) -> (GlobalValueNumbering, EventLog) {
        SsaBuilder::build(method).unwrap();
        let mut events = EventLog::new();
        let mut gvn = GlobalValueNumbering::number(method, &mut events).unwrap();
        gvn.apply(method, CheckEliminator::all(), &mut events).unwrap();
        (gvn, events)
    }

    fn vn_of(gvn: &GlobalValueNumbering, method: &MirMethod, block: BlockId, idx: usize) -> ValueNumber {
        let def = method.block(block).unwrap().instructions()[idx]
            .ssa_def()
            .expect("instruction has a def");
        gvn.value_number(def).expect("def was numbered")
    }

    fn flags_of(method: &MirMethod, block: BlockId, idx: usize) -> InstructionFlags {
        method.block(block).unwrap().instructions()[idx].flags()
    }

    #[test]
    fn test_redundant_load_same_object() {
        // r0.f read twice in a row: same number, second null check skipped.
        let mut b = MethodBuilder::new(3);
        let class = b.class();
        let field = b.instance_field(class, false);
        let body = b.code_block();
        b.set_fall_through(b.entry(), body);
        b.push(body, Instruction::iget(VarId::new(1), VarId::new(0), field));
        b.push(body, Instruction::iget(VarId::new(2), VarId::new(0), field));
        b.push(body, Instruction::ret(Some(VarId::new(2))));
        b.set_fall_through(body, b.exit());
        let mut method = b.finish().unwrap();

        let (gvn, events) = optimize(&mut method);

        assert_eq!(
            vn_of(&gvn, &method, body, 0),
            vn_of(&gvn, &method, body, 1)
        );
        assert!(flags_of(&method, body, 0).is_empty());
        assert!(flags_of(&method, body, 1).contains(InstructionFlags::SKIP_NULL_CHECK));
        assert_eq!(events.count(EventKind::NullCheckEliminated), 1);
    }

    #[test]
    fn test_diamond_partial_store_not_merged() {
        // IGET in TOP; CONST 1000 + IPUT in LEFT only; IGET in BOTTOM.
        // vn(TOP read) != vn(BOTTOM read) and vn(1000) != vn(BOTTOM read):
        // only one predecessor wrote, so nothing is provable at the join.
        let mut b = MethodBuilder::new(4);
        let class = b.class();
        let field = b.instance_field(class, false);
        let top = b.code_block();
        let left = b.code_block();
        let right = b.code_block();
        let bottom = b.code_block();
        b.set_fall_through(b.entry(), top);
        b.push(top, Instruction::iget(VarId::new(1), VarId::new(0), field));
        b.push(top, Instruction::if_zero(VarId::new(2)));
        b.set_fall_through(top, left);
        b.set_taken(top, right);
        b.push(left, Instruction::konst(VarId::new(3), 1000));
        b.push(left, Instruction::iput(VarId::new(3), VarId::new(0), field));
        b.push(left, Instruction::goto());
        b.set_fall_through(left, bottom);
        b.push(right, Instruction::goto());
        b.set_fall_through(right, bottom);
        b.push(bottom, Instruction::iget(VarId::new(1), VarId::new(0), field));
        b.push(bottom, Instruction::ret(Some(VarId::new(1))));
        b.set_fall_through(bottom, b.exit());
        let mut method = b.finish().unwrap();

        let (gvn, _) = optimize(&mut method);

        let top_read = vn_of(&gvn, &method, top, 0);
        let constant = vn_of(&gvn, &method, left, 0);
        let bottom_read = vn_of(&gvn, &method, bottom, 0);
        assert_ne!(top_read, bottom_read);
        assert_ne!(constant, bottom_read);
        // The null check at the join is still redundant: both paths
        // dereferenced r0.
        assert!(flags_of(&method, bottom, 0).contains(InstructionFlags::SKIP_NULL_CHECK));
    }

    #[test]
    fn test_store_merged_when_both_paths_write_same_value() {
        // Both arms store the same constant: the join read folds to it.
        let mut b = MethodBuilder::new(4);
        let class = b.class();
        let field = b.instance_field(class, false);
        let top = b.code_block();
        let left = b.code_block();
        let right = b.code_block();
        let bottom = b.code_block();
        b.set_fall_through(b.entry(), top);
        b.push(top, Instruction::if_zero(VarId::new(2)));
        b.set_fall_through(top, left);
        b.set_taken(top, right);
        b.push(left, Instruction::konst(VarId::new(3), 7));
        b.push(left, Instruction::iput(VarId::new(3), VarId::new(0), field));
        b.push(left, Instruction::goto());
        b.set_fall_through(left, bottom);
        b.push(right, Instruction::konst(VarId::new(3), 7));
        b.push(right, Instruction::iput(VarId::new(3), VarId::new(0), field));
        b.push(right, Instruction::goto());
        b.set_fall_through(right, bottom);
        b.push(bottom, Instruction::iget(VarId::new(1), VarId::new(0), field));
        b.push(bottom, Instruction::ret(Some(VarId::new(1))));
        b.set_fall_through(bottom, b.exit());
        let mut method = b.finish().unwrap();

        let (gvn, _) = optimize(&mut method);

        let constant = vn_of(&gvn, &method, left, 0);
        let join_read = vn_of(&gvn, &method, bottom, 0);
        assert_eq!(constant, join_read);
    }

    #[test]
    fn test_twin_allocations_stay_distinct() {
        // Two syntactically identical fresh allocations: distinct numbers,
        // and reads through one never equal reads through the other.
        let mut b = MethodBuilder::new(4);
        let class = b.class();
        let field = b.instance_field(class, false);
        let body = b.code_block();
        b.set_fall_through(b.entry(), body);
        b.push(body, Instruction::new_instance(VarId::new(0), class));
        b.push(body, Instruction::new_instance(VarId::new(1), class));
        b.push(body, Instruction::iget(VarId::new(2), VarId::new(0), field));
        b.push(body, Instruction::iget(VarId::new(3), VarId::new(1), field));
        b.push(body, Instruction::ret(None));
        b.set_fall_through(body, b.exit());
        let mut method = b.finish().unwrap();

        let (gvn, _) = optimize(&mut method);

        assert_ne!(
            vn_of(&gvn, &method, body, 0),
            vn_of(&gvn, &method, body, 1)
        );
        assert_ne!(
            vn_of(&gvn, &method, body, 2),
            vn_of(&gvn, &method, body, 3)
        );
        // Fresh allocations are known non-null, so their dereferences skip
        // the check; clinit was established by the first allocation.
        assert!(flags_of(&method, body, 2).contains(InstructionFlags::SKIP_NULL_CHECK));
        assert!(flags_of(&method, body, 3).contains(InstructionFlags::SKIP_NULL_CHECK));
        assert!(flags_of(&method, body, 1).contains(InstructionFlags::SKIP_CLINIT_CHECK));
    }

    #[test]
    fn test_loop_converges_and_apply_is_idempotent() {
        // A loop-carried field read: the fixed point terminates, phase 2
        // reproduces phase 1 exactly, and re-applying changes nothing.
        let mut b = MethodBuilder::new(4);
        let class = b.class();
        let field = b.instance_field(class, false);
        let header = b.code_block();
        let body = b.code_block();
        let tail = b.code_block();
        b.set_fall_through(b.entry(), header);
        b.push(header, Instruction::iget(VarId::new(1), VarId::new(0), field));
        b.push(header, Instruction::if_zero(VarId::new(1)));
        b.set_fall_through(header, body);
        b.set_taken(header, tail);
        b.push(body, Instruction::konst(VarId::new(2), 1));
        b.push(body, Instruction::iput(VarId::new(2), VarId::new(0), field));
        b.push(body, Instruction::goto());
        b.set_fall_through(body, header);
        b.push(tail, Instruction::ret(Some(VarId::new(1))));
        b.set_fall_through(tail, b.exit());
        let mut method = b.finish().unwrap();

        SsaBuilder::build(&mut method).unwrap();
        let mut events = EventLog::new();
        let mut gvn = GlobalValueNumbering::number(&mut method, &mut events).unwrap();

        let first = gvn
            .apply(&mut method, CheckEliminator::all(), &mut events)
            .unwrap();
        assert_eq!(first, PassResult::Changed);
        let second = gvn
            .apply(&mut method, CheckEliminator::all(), &mut events)
            .unwrap();
        assert_eq!(second, PassResult::Unchanged);
        // The loop-side null check is elided on the second dereference.
        assert!(flags_of(&method, body, 1).contains(InstructionFlags::SKIP_NULL_CHECK));
    }

    #[test]
    fn test_same_value_store_preserves_knowledge() {
        // Storing a value-number-equal value through another aliasing
        // reference keeps the first reference's fact alive.
        let mut b = MethodBuilder::new(5);
        let class = b.class();
        let field = b.instance_field(class, false);
        let body = b.code_block();
        b.set_fall_through(b.entry(), body);
        b.push(body, Instruction::konst(VarId::new(2), 5));
        b.push(body, Instruction::iput(VarId::new(2), VarId::new(0), field));
        b.push(body, Instruction::iput(VarId::new(2), VarId::new(1), field));
        b.push(body, Instruction::iget(VarId::new(3), VarId::new(0), field));
        b.push(body, Instruction::ret(Some(VarId::new(3))));
        b.set_fall_through(body, b.exit());
        let mut method = b.finish().unwrap();

        let (gvn, _) = optimize(&mut method);

        let constant = vn_of(&gvn, &method, body, 0);
        let reread = vn_of(&gvn, &method, body, 3);
        assert_eq!(constant, reread);
    }

    #[test]
    fn test_different_value_store_clobbers_other_bases() {
        // A store of a different value through a possibly-equal reference
        // kills the first reference's fact.
        let mut b = MethodBuilder::new(5);
        let class = b.class();
        let field = b.instance_field(class, false);
        let body = b.code_block();
        b.set_fall_through(b.entry(), body);
        b.push(body, Instruction::konst(VarId::new(2), 5));
        b.push(body, Instruction::konst(VarId::new(4), 6));
        b.push(body, Instruction::iput(VarId::new(2), VarId::new(0), field));
        b.push(body, Instruction::iput(VarId::new(4), VarId::new(1), field));
        b.push(body, Instruction::iget(VarId::new(3), VarId::new(0), field));
        b.push(body, Instruction::ret(Some(VarId::new(3))));
        b.set_fall_through(body, b.exit());
        let mut method = b.finish().unwrap();

        let (gvn, _) = optimize(&mut method);

        let five = vn_of(&gvn, &method, body, 0);
        let six = vn_of(&gvn, &method, body, 1);
        let reread = vn_of(&gvn, &method, body, 4);
        assert_ne!(reread, five);
        assert_ne!(reread, six);
    }

    #[test]
    fn test_range_check_pair_elision() {
        let mut b = MethodBuilder::new(6);
        let body = b.code_block();
        b.set_fall_through(b.entry(), body);
        b.push(body, Instruction::konst(VarId::new(1), 0));
        b.push(body, Instruction::konst(VarId::new(2), 1));
        b.push(body, Instruction::aget(VarId::new(3), VarId::new(0), VarId::new(1)));
        b.push(body, Instruction::aget(VarId::new(4), VarId::new(0), VarId::new(1)));
        b.push(body, Instruction::aget(VarId::new(5), VarId::new(0), VarId::new(2)));
        b.push(body, Instruction::ret(None));
        b.set_fall_through(body, b.exit());
        let mut method = b.finish().unwrap();

        let (gvn, events) = optimize(&mut method);

        // Same (array, index) pair: both checks skipped; the reads agree.
        assert!(flags_of(&method, body, 2).is_empty());
        assert!(flags_of(&method, body, 3)
            .contains(InstructionFlags::SKIP_NULL_CHECK | InstructionFlags::SKIP_RANGE_CHECK));
        assert_eq!(
            vn_of(&gvn, &method, body, 2),
            vn_of(&gvn, &method, body, 3)
        );
        // A different index skips only the null check.
        let third = flags_of(&method, body, 4);
        assert!(third.contains(InstructionFlags::SKIP_NULL_CHECK));
        assert!(!third.contains(InstructionFlags::SKIP_RANGE_CHECK));
        assert_eq!(events.count(EventKind::RangeCheckEliminated), 1);
    }

    #[test]
    fn test_clinit_fact_shared_across_static_fields() {
        let mut b = MethodBuilder::new(2);
        let class = b.class();
        let first = b.static_field(class, false);
        let second = b.static_field(class, false);
        let body = b.code_block();
        b.set_fall_through(b.entry(), body);
        b.push(body, Instruction::sget(VarId::new(0), first));
        b.push(body, Instruction::sget(VarId::new(1), second));
        b.push(body, Instruction::ret(None));
        b.set_fall_through(body, b.exit());
        let mut method = b.finish().unwrap();

        let (_, events) = optimize(&mut method);

        assert!(flags_of(&method, body, 0).is_empty());
        assert!(flags_of(&method, body, 1).contains(InstructionFlags::SKIP_CLINIT_CHECK));
        assert_eq!(events.count(EventKind::ClassInitCheckEliminated), 1);
    }

    #[test]
    fn test_opaque_call_clobbers_field_knowledge() {
        let mut b = MethodBuilder::new(4);
        let class = b.class();
        let field = b.instance_field(class, false);
        let callee = b.static_method(class);
        let body = b.code_block();
        b.set_fall_through(b.entry(), body);
        b.push(body, Instruction::iget(VarId::new(1), VarId::new(0), field));
        b.push(body, Instruction::invoke_static(None, callee, vec![]));
        b.push(body, Instruction::iget(VarId::new(2), VarId::new(0), field));
        b.push(body, Instruction::ret(None));
        b.set_fall_through(body, b.exit());
        let mut method = b.finish().unwrap();

        let (gvn, _) = optimize(&mut method);

        // The call may write r0.f: the re-read gets a fresh number, but the
        // null check survives the call.
        assert_ne!(
            vn_of(&gvn, &method, body, 0),
            vn_of(&gvn, &method, body, 2)
        );
        assert!(flags_of(&method, body, 2).contains(InstructionFlags::SKIP_NULL_CHECK));
    }

    #[test]
    fn test_fresh_allocation_survives_call_unless_escaped() {
        let mut b = MethodBuilder::new(4);
        let class = b.class();
        let field = b.instance_field(class, false);
        let callee = b.static_method(class);
        let body = b.code_block();
        b.set_fall_through(b.entry(), body);
        b.push(body, Instruction::new_instance(VarId::new(0), class));
        b.push(body, Instruction::konst(VarId::new(1), 3));
        b.push(body, Instruction::iput(VarId::new(1), VarId::new(0), field));
        b.push(body, Instruction::invoke_static(None, callee, vec![]));
        b.push(body, Instruction::iget(VarId::new(2), VarId::new(0), field));
        b.push(body, Instruction::ret(Some(VarId::new(2))));
        b.set_fall_through(body, b.exit());
        let mut method = b.finish().unwrap();

        let (gvn, _) = optimize(&mut method);

        // The callee cannot reach the unescaped fresh object, so the stored
        // constant is still known after the call.
        assert_eq!(
            vn_of(&gvn, &method, body, 1),
            vn_of(&gvn, &method, body, 4)
        );
    }

    #[test]
    fn test_escaped_allocation_loses_knowledge_at_call() {
        let mut b = MethodBuilder::new(4);
        let class = b.class();
        let field = b.instance_field(class, false);
        let callee = b.static_method(class);
        let body = b.code_block();
        b.set_fall_through(b.entry(), body);
        b.push(body, Instruction::new_instance(VarId::new(0), class));
        b.push(body, Instruction::konst(VarId::new(1), 3));
        b.push(body, Instruction::iput(VarId::new(1), VarId::new(0), field));
        // Passing the object to the callee escapes it...
        b.push(body, Instruction::invoke_static(None, callee, vec![VarId::new(0)]));
        b.push(body, Instruction::iget(VarId::new(2), VarId::new(0), field));
        b.push(body, Instruction::ret(Some(VarId::new(2))));
        b.set_fall_through(body, b.exit());
        let mut method = b.finish().unwrap();

        let (gvn, _) = optimize(&mut method);

        // ...so the callee may have overwritten the field.
        assert_ne!(
            vn_of(&gvn, &method, body, 1),
            vn_of(&gvn, &method, body, 4)
        );
    }

    #[test]
    fn test_unresolved_field_is_conservative_sink() {
        let mut b = MethodBuilder::new(4);
        let class = b.class();
        let tracked = b.instance_field(class, false);
        let unresolved = b.unresolved_field(false);
        let body = b.code_block();
        b.set_fall_through(b.entry(), body);
        b.push(body, Instruction::konst(VarId::new(2), 9));
        b.push(body, Instruction::iput(VarId::new(2), VarId::new(0), tracked));
        // An unresolved store can hit any location.
        b.push(body, Instruction::iput(VarId::new(2), VarId::new(1), unresolved));
        b.push(body, Instruction::iget(VarId::new(3), VarId::new(0), tracked));
        b.push(body, Instruction::ret(None));
        b.set_fall_through(body, b.exit());
        let mut method = b.finish().unwrap();

        let (gvn, _) = optimize(&mut method);

        assert_ne!(
            vn_of(&gvn, &method, body, 0),
            vn_of(&gvn, &method, body, 3)
        );
    }

    #[test]
    fn test_volatile_field_not_tracked() {
        let mut b = MethodBuilder::new(3);
        let class = b.class();
        let field = b.instance_field(class, true);
        let body = b.code_block();
        b.set_fall_through(b.entry(), body);
        b.push(body, Instruction::iget(VarId::new(1), VarId::new(0), field));
        b.push(body, Instruction::iget(VarId::new(2), VarId::new(0), field));
        b.push(body, Instruction::ret(None));
        b.set_fall_through(body, b.exit());
        let mut method = b.finish().unwrap();

        let (gvn, _) = optimize(&mut method);

        // Volatile reads may observe different values.
        assert_ne!(
            vn_of(&gvn, &method, body, 0),
            vn_of(&gvn, &method, body, 1)
        );
        // The dereference itself still proves non-nullness.
        assert!(flags_of(&method, body, 1).contains(InstructionFlags::SKIP_NULL_CHECK));
    }

    #[test]
    fn test_numbering_requires_ssa() {
        let mut b = MethodBuilder::new(2);
        let body = b.code_block();
        b.set_fall_through(b.entry(), body);
        b.push(body, Instruction::mov(VarId::new(1), VarId::new(0)));
        b.push(body, Instruction::ret(None));
        b.set_fall_through(body, b.exit());
        let method = b.finish().unwrap();

        let mut events = EventLog::new();
        assert!(GlobalValueNumbering::number(&method, &mut events).is_err());
    }

    #[test]
    fn test_representative_points_at_first_definition() {
        let mut b = MethodBuilder::new(4);
        let body = b.code_block();
        b.set_fall_through(b.entry(), body);
        b.push(body, Instruction::konst(VarId::new(1), 2));
        b.push(body, Instruction::konst(VarId::new(2), 2));
        b.push(
            body,
            Instruction::binary(crate::mir::BinaryOp::Add, VarId::new(3), VarId::new(1), VarId::new(2)),
        );
        b.push(body, Instruction::ret(Some(VarId::new(3))));
        b.set_fall_through(body, b.exit());
        let mut method = b.finish().unwrap();

        let (gvn, _) = optimize(&mut method);

        // Both constants share a number whose representative is the first.
        let vn = vn_of(&gvn, &method, body, 0);
        assert_eq!(vn, vn_of(&gvn, &method, body, 1));
        assert_eq!(gvn.representative(vn), Some((body, 0)));
    }
}
