//! Local value numbering: the per-block abstract interpreter.
//!
//! One [`Lvn`] run walks a block's instruction list once, assigning a value
//! number to every definition and updating the flow-sensitive fact state
//! ([`LvnState`]). Pure operations hash-cons through the shared
//! [`ValueTable`]; memory operations go through the two-category aliasing
//! model.
//!
//! # Memory model
//!
//! References fall into two disjoint categories:
//!
//! - **Non-aliasing** - provably unreachable through any other tracked
//!   reference: a fresh allocation that has not escaped. Field and element
//!   accesses are modeled exactly per `(reference, key)` with zero
//!   interference from other locations.
//! - **Aliasing** - everything else. A store through one aliasing reference
//!   invalidates same-key knowledge on every base not provably distinct,
//!   except entries whose known value equals the stored value number (the
//!   "stores the same value" case). Array elements are provably distinct
//!   only when both indices are known, unequal constants.
//!
//! A reference escapes - permanently joining the aliasing category - when
//! passed to an opaque call or stored into memory (any field, element, or
//! static; an unresolved store included). Unresolved fields and methods are
//! conservative sinks: they yield no equalities, and unresolved or opaque
//! writes clobber all aliasing knowledge. Volatile fields are excluded from
//! tracking entirely.

use std::collections::{HashMap, HashSet};

use crate::{
    mir::{
        BlockId, ClassId, FieldId, Instruction, InstructionFlags, MirMethod, Opcode, SsaValueId,
    },
    opt::{
        checks::CheckEliminator,
        gvn::table::{InstrUid, ValueNumber, ValueTable},
    },
    Error, Result,
};

/// Key of a tracked memory location relative to a base reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum LocationKey {
    /// A resolved, non-volatile instance field.
    Field(FieldId),
    /// An array element, keyed by the index value number.
    Element(ValueNumber),
}

/// Flow-sensitive facts at one program point.
///
/// Value numbers of SSA definitions are global (one definition per value);
/// everything here can differ between paths and is merged at joins by
/// intersection - a fact survives only if every contributing predecessor
/// holds it with an equal value number.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LvnState {
    /// References currently in the non-aliasing category.
    non_aliasing: HashSet<ValueNumber>,
    /// References that were non-aliasing and escaped; they never return.
    escaped: HashSet<ValueNumber>,
    /// Exact per-location knowledge for non-aliasing bases.
    na_memory: HashMap<(ValueNumber, LocationKey), ValueNumber>,
    /// Per-location knowledge for aliasing bases.
    al_memory: HashMap<(ValueNumber, LocationKey), ValueNumber>,
    /// Known static field values, keyed by field reference.
    static_memory: HashMap<FieldId, ValueNumber>,
    /// References proven non-null.
    null_checked: HashSet<ValueNumber>,
    /// `(array, index)` pairs already bounds-checked.
    range_checked: HashSet<(ValueNumber, ValueNumber)>,
    /// Classes known initialized.
    clinit_checked: HashSet<ClassId>,
}

impl LvnState {
    /// Returns `true` if `reference` is proven non-null here.
    #[must_use]
    pub fn is_null_checked(&self, reference: ValueNumber) -> bool {
        self.null_checked.contains(&reference)
    }

    /// Returns `true` if the `(array, index)` pair was bounds-checked here.
    #[must_use]
    pub fn is_range_checked(&self, array: ValueNumber, index: ValueNumber) -> bool {
        self.range_checked.contains(&(array, index))
    }

    /// Returns `true` if `class` is known initialized here.
    #[must_use]
    pub fn is_clinit_checked(&self, class: ClassId) -> bool {
        self.clinit_checked.contains(&class)
    }

    /// Returns `true` if `reference` is currently in the non-aliasing
    /// category.
    #[must_use]
    pub fn is_non_aliasing(&self, reference: ValueNumber) -> bool {
        self.non_aliasing.contains(&reference)
    }

    pub(crate) fn insert_null_checked(&mut self, reference: ValueNumber) {
        self.null_checked.insert(reference);
    }

    /// Intersects this state with another contributing predecessor.
    ///
    /// Monotonically information-losing: every kept fact is held by both
    /// sides (map entries additionally require equal value numbers). Escape
    /// is the exception - escaped on any path means escaped.
    pub(crate) fn meet(&mut self, other: &LvnState) {
        self.non_aliasing.retain(|vn| other.non_aliasing.contains(vn));
        self.escaped.extend(other.escaped.iter().copied());
        self.na_memory
            .retain(|key, value| other.na_memory.get(key) == Some(value));
        self.al_memory
            .retain(|key, value| other.al_memory.get(key) == Some(value));
        self.static_memory
            .retain(|key, value| other.static_memory.get(key) == Some(value));
        self.null_checked.retain(|vn| other.null_checked.contains(vn));
        self.range_checked
            .retain(|pair| other.range_checked.contains(pair));
        self.clinit_checked
            .retain(|class| other.clinit_checked.contains(class));
        // A reference non-aliasing on one path and escaped on the other is
        // not trackable.
        let escaped = &self.escaped;
        self.non_aliasing.retain(|vn| !escaped.contains(vn));
    }

    /// Conservative pruning for catch-handler entries.
    ///
    /// The exception edge may leave the throwing block before any of its
    /// stores completed, so no memory fact survives; what remains are facts
    /// independent of escaping calls and partial execution: non-nullness,
    /// bounds-checked pairs, and class initialization.
    pub(crate) fn prune_for_catch(&mut self) {
        self.non_aliasing.clear();
        self.na_memory.clear();
        self.al_memory.clear();
        self.static_memory.clear();
    }

    fn escape(&mut self, reference: ValueNumber) {
        if self.non_aliasing.remove(&reference) {
            self.escaped.insert(reference);
            // Knowledge recorded so far stays valid at the escape point; it
            // migrates to the aliasing map and dies with the next clobber.
            let migrated: Vec<((ValueNumber, LocationKey), ValueNumber)> = self
                .na_memory
                .iter()
                .filter(|((base, _), _)| *base == reference)
                .map(|(k, v)| (*k, *v))
                .collect();
            for (key, value) in migrated {
                self.na_memory.remove(&key);
                self.al_memory.insert(key, value);
            }
        }
    }

    /// Clobber for unknown-target writes (unresolved stores) and opaque
    /// calls: all aliasing and static knowledge dies; non-escaped
    /// non-aliasing references are unreachable from the outside and keep
    /// their facts.
    fn clobber_aliasing(&mut self) {
        self.al_memory.clear();
        self.static_memory.clear();
    }
}

/// Contributing predecessors for one block's merge: the index into the
/// block's predecessor list plus that predecessor's (possibly
/// branch-refined) state.
#[derive(Debug, Default)]
pub(crate) struct MergeInputs {
    pub(crate) inputs: Vec<(usize, LvnState)>,
}

/// Outcome of one block run.
#[derive(Debug)]
pub(crate) struct LvnOutcome {
    /// The exit state.
    pub(crate) state: LvnState,
    /// Whether any value-number assignment changed.
    pub(crate) changed: bool,
    /// Skip flags the elimination phase should set, per instruction index.
    pub(crate) flags: Vec<(usize, InstructionFlags)>,
}

/// The per-block abstract interpreter.
pub(crate) struct Lvn<'a> {
    method: &'a MirMethod,
    table: &'a mut ValueTable,
    values: &'a mut HashMap<SsaValueId, ValueNumber>,
    representatives: &'a mut HashMap<ValueNumber, InstrUid>,
    state: LvnState,
    changed: bool,
    flags: Vec<(usize, InstructionFlags)>,
}

impl<'a> Lvn<'a> {
    pub(crate) fn new(
        method: &'a MirMethod,
        table: &'a mut ValueTable,
        values: &'a mut HashMap<SsaValueId, ValueNumber>,
        representatives: &'a mut HashMap<ValueNumber, InstrUid>,
        entry_state: LvnState,
    ) -> Self {
        Self {
            method,
            table,
            values,
            representatives,
            state: entry_state,
            changed: false,
            flags: Vec::new(),
        }
    }

    /// Interprets the block once. `eliminator` is present only in the
    /// elimination phase; the numbering phase runs read-only.
    pub(crate) fn run(
        mut self,
        block_id: BlockId,
        merge: &MergeInputs,
        eliminator: Option<&CheckEliminator>,
    ) -> Result<LvnOutcome> {
        let block = self
            .method
            .block(block_id)
            .ok_or_else(|| Error::invariant(block_id, "block missing from table"))?;

        for (idx, instr) in block.instructions().iter().enumerate() {
            self.interpret(block_id, idx, instr, merge, eliminator)?;
        }

        Ok(LvnOutcome {
            state: self.state,
            changed: self.changed,
            flags: self.flags,
        })
    }

    fn use_vn(&self, block: BlockId, instr: &Instruction, index: usize) -> Result<ValueNumber> {
        let ssa = instr.ssa_uses().get(index).copied().ok_or_else(|| {
            Error::invariant(block, format!("missing SSA operand {index} on {instr}"))
        })?;
        self.values.get(&ssa).copied().ok_or_else(|| {
            Error::invariant(block, format!("operand {ssa} used before it was numbered"))
        })
    }

    fn define(&mut self, block: BlockId, instr: &Instruction, idx: usize, vn: ValueNumber) {
        self.representatives.entry(vn).or_insert((block, idx));
        if let Some(def) = instr.ssa_def() {
            let previous = self.values.insert(def, vn);
            if previous != Some(vn) {
                self.changed = true;
            }
        }
    }

    fn field_desc(&self, block: BlockId, field: FieldId) -> Result<crate::mir::FieldDesc> {
        self.method
            .tables()
            .field(field)
            .copied()
            .ok_or_else(|| Error::invariant(block, format!("unregistered field reference {field}")))
    }

    fn emit_flags(&mut self, idx: usize, flags: InstructionFlags) {
        if !flags.is_empty() {
            self.flags.push((idx, flags));
        }
    }

    /// Store through `base` at `key`: removes knowledge the store may
    /// shadow, preserving same-value entries, then records the new value.
    ///
    /// Two element slots are provably distinct only when both indices are
    /// known, unequal constants; two distinct non-aliasing bases are always
    /// distinct; an aliasing base is distinct from nothing aliasing.
    fn store(&mut self, base: ValueNumber, key: LocationKey, value: ValueNumber) {
        let table = &*self.table;
        let distinct_indices = |a: ValueNumber, b: ValueNumber| -> bool {
            match (table.constant_of(a), table.constant_of(b)) {
                (Some(x), Some(y)) => x != y,
                _ => false,
            }
        };

        if self.state.non_aliasing.contains(&base) {
            // Other non-aliasing bases never interfere; only same-base
            // elements with unknown indices are at risk.
            if let LocationKey::Element(index) = key {
                self.state.na_memory.retain(|(b, k), v| {
                    if *b != base {
                        return true;
                    }
                    match k {
                        LocationKey::Element(other) if *other != index => {
                            *v == value || distinct_indices(*other, index)
                        }
                        _ => true,
                    }
                });
            }
            self.state.na_memory.insert((base, key), value);
        } else {
            match key {
                LocationKey::Field(field) => {
                    self.state.al_memory.retain(|(b, k), v| match k {
                        LocationKey::Field(f) if *f == field && *b != base => *v == value,
                        _ => true,
                    });
                }
                LocationKey::Element(index) => {
                    self.state.al_memory.retain(|(_, k), v| match k {
                        LocationKey::Element(other) if *other != index => {
                            *v == value || distinct_indices(*other, index)
                        }
                        // Same index under any base: possibly the same
                        // array, so only a same-value entry survives.
                        LocationKey::Element(_) => *v == value,
                        LocationKey::Field(_) => true,
                    });
                }
            }
            self.state.al_memory.insert((base, key), value);
        }
    }

    /// Load through `base` at `key`: a known value, or a fresh number
    /// memoized per load site and recorded so later same-key loads agree.
    fn load(&mut self, base: ValueNumber, key: LocationKey, site: InstrUid) -> ValueNumber {
        let map = if self.state.non_aliasing.contains(&base) {
            &mut self.state.na_memory
        } else {
            &mut self.state.al_memory
        };
        if let Some(&vn) = map.get(&(base, key)) {
            return vn;
        }
        let vn = self.table.unknown(site);
        if self.state.non_aliasing.contains(&base) {
            self.state.na_memory.insert((base, key), vn);
        } else {
            self.state.al_memory.insert((base, key), vn);
        }
        vn
    }

    fn interpret(
        &mut self,
        block_id: BlockId,
        idx: usize,
        instr: &Instruction,
        merge: &MergeInputs,
        eliminator: Option<&CheckEliminator>,
    ) -> Result<()> {
        let site: InstrUid = (block_id, idx);
        match *instr.opcode() {
            Opcode::Const { value } => {
                let vn = self.table.constant(value);
                self.define(block_id, instr, idx, vn);
            }
            Opcode::Move => {
                let vn = self.use_vn(block_id, instr, 0)?;
                self.define(block_id, instr, idx, vn);
            }
            Opcode::Unary { op } => {
                let operand = self.use_vn(block_id, instr, 0)?;
                let vn = self.table.unary(op, operand);
                self.define(block_id, instr, idx, vn);
            }
            Opcode::Binary { op } => {
                let lhs = self.use_vn(block_id, instr, 0)?;
                let rhs = self.use_vn(block_id, instr, 1)?;
                let vn = self.table.binary(op, lhs, rhs);
                self.define(block_id, instr, idx, vn);
            }
            Opcode::Phi => {
                self.interpret_phi(block_id, idx, instr, merge)?;
            }
            Opcode::NewInstance { class } => {
                let vn = self.table.unknown(site);
                if let Some(el) = eliminator {
                    if el.clinit_redundant(&self.state, class) {
                        self.emit_flags(idx, InstructionFlags::SKIP_CLINIT_CHECK);
                    }
                }
                self.state.clinit_checked.insert(class);
                self.state.non_aliasing.insert(vn);
                self.state.null_checked.insert(vn);
                self.define(block_id, instr, idx, vn);
            }
            Opcode::NewArray => {
                let length = self.use_vn(block_id, instr, 0)?;
                let vn = self.table.unknown(site);
                self.table.bind_array_length(vn, length);
                self.state.non_aliasing.insert(vn);
                self.state.null_checked.insert(vn);
                self.define(block_id, instr, idx, vn);
            }
            Opcode::ArrayLength => {
                let array = self.use_vn(block_id, instr, 0)?;
                self.null_check(idx, array, eliminator);
                let vn = self.table.array_length(array);
                self.define(block_id, instr, idx, vn);
            }
            Opcode::ArrayGet => {
                let array = self.use_vn(block_id, instr, 0)?;
                let index = self.use_vn(block_id, instr, 1)?;
                let mut flags = InstructionFlags::empty();
                if let Some(el) = eliminator {
                    if el.null_redundant(&self.state, array) {
                        flags |= InstructionFlags::SKIP_NULL_CHECK;
                    }
                    if el.range_redundant(&self.state, array, index) {
                        flags |= InstructionFlags::SKIP_RANGE_CHECK;
                    }
                }
                self.emit_flags(idx, flags);
                self.state.null_checked.insert(array);
                self.state.range_checked.insert((array, index));
                let vn = self.load(array, LocationKey::Element(index), site);
                self.define(block_id, instr, idx, vn);
            }
            Opcode::ArrayPut => {
                let value = self.use_vn(block_id, instr, 0)?;
                let array = self.use_vn(block_id, instr, 1)?;
                let index = self.use_vn(block_id, instr, 2)?;
                let mut flags = InstructionFlags::empty();
                if let Some(el) = eliminator {
                    if el.null_redundant(&self.state, array) {
                        flags |= InstructionFlags::SKIP_NULL_CHECK;
                    }
                    if el.range_redundant(&self.state, array, index) {
                        flags |= InstructionFlags::SKIP_RANGE_CHECK;
                    }
                }
                self.emit_flags(idx, flags);
                self.state.null_checked.insert(array);
                self.state.range_checked.insert((array, index));
                self.state.escape(value);
                self.store(array, LocationKey::Element(index), value);
            }
            Opcode::InstanceGet { field } => {
                let object = self.use_vn(block_id, instr, 0)?;
                self.null_check(idx, object, eliminator);
                let desc = self.field_desc(block_id, field)?;
                let vn = if desc.is_tracked() && !desc.is_static {
                    self.load(object, LocationKey::Field(field), site)
                } else {
                    // Conservative sink: no equality for unresolved or
                    // volatile fields.
                    self.table.unknown(site)
                };
                self.define(block_id, instr, idx, vn);
            }
            Opcode::InstancePut { field } => {
                let value = self.use_vn(block_id, instr, 0)?;
                let object = self.use_vn(block_id, instr, 1)?;
                self.null_check(idx, object, eliminator);
                self.state.escape(value);
                let desc = self.field_desc(block_id, field)?;
                if !desc.resolved {
                    // Unknown-target write.
                    self.state.clobber_aliasing();
                } else if desc.is_tracked() && !desc.is_static {
                    self.store(object, LocationKey::Field(field), value);
                }
            }
            Opcode::StaticGet { field } => {
                let desc = self.field_desc(block_id, field)?;
                self.clinit_check(idx, desc.class, eliminator);
                let vn = if desc.is_tracked() && desc.is_static {
                    if let Some(&known) = self.state.static_memory.get(&field) {
                        known
                    } else {
                        let vn = self.table.unknown(site);
                        self.state.static_memory.insert(field, vn);
                        vn
                    }
                } else {
                    self.table.unknown(site)
                };
                self.define(block_id, instr, idx, vn);
            }
            Opcode::StaticPut { field } => {
                let value = self.use_vn(block_id, instr, 0)?;
                let desc = self.field_desc(block_id, field)?;
                self.clinit_check(idx, desc.class, eliminator);
                self.state.escape(value);
                if !desc.resolved {
                    self.state.clobber_aliasing();
                } else if desc.is_tracked() && desc.is_static {
                    self.state.static_memory.insert(field, value);
                }
            }
            Opcode::InvokeStatic { method } => {
                let desc = self
                    .method
                    .tables()
                    .method(method)
                    .copied()
                    .ok_or_else(|| {
                        Error::invariant(block_id, format!("unregistered method reference {method}"))
                    })?;
                if desc.resolved {
                    self.clinit_check(idx, desc.class, eliminator);
                }
                self.opaque_call(block_id, instr)?;
                let vn = self.table.unknown(site);
                self.define(block_id, instr, idx, vn);
            }
            Opcode::InvokeVirtual { .. } => {
                let receiver = self.use_vn(block_id, instr, 0)?;
                self.null_check(idx, receiver, eliminator);
                self.opaque_call(block_id, instr)?;
                let vn = self.table.unknown(site);
                self.define(block_id, instr, idx, vn);
            }
            Opcode::IfZero
            | Opcode::IfNonZero
            | Opcode::Goto
            | Opcode::Return
            | Opcode::Throw => {
                // Control transfer; branch outcomes refine successor edges
                // during the merge, not here.
            }
        }
        Ok(())
    }

    /// Null-check bookkeeping shared by every dereferencing opcode: emit the
    /// skip flag if the fact is already established, then establish it (the
    /// dereference would have thrown otherwise).
    fn null_check(&mut self, idx: usize, reference: ValueNumber, eliminator: Option<&CheckEliminator>) {
        if let Some(el) = eliminator {
            if el.null_redundant(&self.state, reference) {
                self.emit_flags(idx, InstructionFlags::SKIP_NULL_CHECK);
            }
        }
        self.state.null_checked.insert(reference);
    }

    fn clinit_check(
        &mut self,
        idx: usize,
        class: Option<ClassId>,
        eliminator: Option<&CheckEliminator>,
    ) {
        let Some(class) = class else { return };
        if let Some(el) = eliminator {
            if el.clinit_redundant(&self.state, class) {
                self.emit_flags(idx, InstructionFlags::SKIP_CLINIT_CHECK);
            }
        }
        self.state.clinit_checked.insert(class);
    }

    /// Every argument escapes; all aliasing and static knowledge dies.
    fn opaque_call(&mut self, block_id: BlockId, instr: &Instruction) -> Result<()> {
        for i in 0..instr.ssa_uses().len() {
            let vn = self.use_vn(block_id, instr, i)?;
            self.state.escape(vn);
        }
        self.state.clobber_aliasing();
        Ok(())
    }

    fn interpret_phi(
        &mut self,
        block_id: BlockId,
        idx: usize,
        instr: &Instruction,
        merge: &MergeInputs,
    ) -> Result<()> {
        if merge.inputs.is_empty() {
            return Err(Error::invariant(
                block_id,
                "phi evaluated with no contributing predecessors",
            ));
        }
        let mut incoming = Vec::with_capacity(merge.inputs.len());
        let mut all_null_checked = true;
        for (pred_index, pred_state) in &merge.inputs {
            let ssa = instr.ssa_uses().get(*pred_index).copied().ok_or_else(|| {
                Error::invariant(
                    block_id,
                    format!(
                        "phi has no operand for predecessor index {pred_index}"
                    ),
                )
            })?;
            let vn = self.values.get(&ssa).copied().ok_or_else(|| {
                Error::invariant(block_id, format!("phi operand {ssa} not yet numbered"))
            })?;
            all_null_checked &= pred_state.is_null_checked(vn);
            incoming.push(vn);
        }
        let vn = self.table.phi(block_id, &incoming);
        if all_null_checked {
            // Every path delivers a proven non-null value, so the merged
            // value is non-null.
            self.state.null_checked.insert(vn);
        }
        self.define(block_id, instr, idx, vn);
        Ok(())
    }
}
