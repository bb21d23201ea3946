//! MIR instructions: opcodes, use/def arrays, and optimization flags.
//!
//! An instruction carries its opcode, the source virtual registers it reads
//! and writes, and - once SSA construction has run - the SSA value ids for
//! those uses and the def. The optimization-flags bitmask is the output
//! surface of check elimination: the code-generation collaborator reads the
//! skip bits to omit the corresponding runtime checks.
//!
//! Phi nodes are ordinary instructions ([`Opcode::Phi`]) placed at the head
//! of their block; their SSA operand list is ordered to match the block's
//! predecessor list.

use std::fmt;

use bitflags::bitflags;
use strum::{Display, EnumCount};

use crate::mir::{ClassId, FieldId, MethodId, SsaValueId, VarId};

/// Binary arithmetic/logic operators.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash, EnumCount)]
#[strum(serialize_all = "lowercase")]
pub enum BinaryOp {
    /// Addition.
    Add,
    /// Subtraction.
    Sub,
    /// Multiplication.
    Mul,
    /// Division.
    Div,
    /// Remainder.
    Rem,
    /// Bitwise and.
    And,
    /// Bitwise or.
    Or,
    /// Bitwise exclusive or.
    Xor,
    /// Left shift.
    Shl,
    /// Arithmetic right shift.
    Shr,
}

impl BinaryOp {
    /// Returns `true` if swapping the operands leaves the result unchanged.
    #[must_use]
    pub const fn is_commutative(self) -> bool {
        matches!(
            self,
            Self::Add | Self::Mul | Self::And | Self::Or | Self::Xor
        )
    }
}

/// Unary operators.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash, EnumCount)]
#[strum(serialize_all = "lowercase")]
pub enum UnaryOp {
    /// Arithmetic negation.
    Neg,
    /// Bitwise complement.
    Not,
}

/// The closed opcode set of the method IR.
///
/// Static payload (constants, field/method references) lives on the variant;
/// dynamic operands live in the instruction's use/def arrays. The operand
/// shapes are:
///
/// | Opcode | Uses | Def |
/// |---|---|---|
/// | `Const` | - | value |
/// | `Move` | src | dst |
/// | `Unary`/`Binary` | operands | result |
/// | `Phi` | one per predecessor | merged value |
/// | `NewInstance` | - | reference |
/// | `NewArray` | length | reference |
/// | `ArrayLength` | array | length |
/// | `ArrayGet` | array, index | element |
/// | `ArrayPut` | value, array, index | - |
/// | `InstanceGet` | object | field value |
/// | `InstancePut` | value, object | - |
/// | `StaticGet` | - | field value |
/// | `StaticPut` | value | - |
/// | `InvokeStatic` | arguments | return value (optional) |
/// | `InvokeVirtual` | receiver, arguments | return value (optional) |
/// | `IfZero`/`IfNonZero` | tested value | - |
/// | `Goto` | - | - |
/// | `Return` | value (optional) | - |
/// | `Throw` | exception | - |
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq)]
#[strum(serialize_all = "kebab-case")]
pub enum Opcode {
    /// Load an integer constant.
    Const {
        /// The constant value.
        value: i64,
    },
    /// Register-to-register copy.
    Move,
    /// Unary arithmetic.
    Unary {
        /// The operator.
        op: UnaryOp,
    },
    /// Binary arithmetic.
    Binary {
        /// The operator.
        op: BinaryOp,
    },
    /// SSA merge at a control-flow join. Placed only by SSA construction.
    Phi,
    /// Allocate a fresh instance of a class.
    NewInstance {
        /// The instantiated class.
        class: ClassId,
    },
    /// Allocate a fresh array.
    NewArray,
    /// Read an array's length.
    ArrayLength,
    /// Read an array element.
    ArrayGet,
    /// Write an array element.
    ArrayPut,
    /// Read an instance field.
    InstanceGet {
        /// The accessed field reference.
        field: FieldId,
    },
    /// Write an instance field.
    InstancePut {
        /// The accessed field reference.
        field: FieldId,
    },
    /// Read a static field.
    StaticGet {
        /// The accessed field reference.
        field: FieldId,
    },
    /// Write a static field.
    StaticPut {
        /// The accessed field reference.
        field: FieldId,
    },
    /// Call a static method. Opaque to the analysis.
    InvokeStatic {
        /// The called method reference.
        method: MethodId,
    },
    /// Call a virtual method through a receiver. Opaque to the analysis.
    InvokeVirtual {
        /// The called method reference.
        method: MethodId,
    },
    /// Branch to the taken successor when the tested value is zero.
    IfZero,
    /// Branch to the taken successor when the tested value is non-zero.
    IfNonZero,
    /// Unconditional branch to the fall-through successor.
    Goto,
    /// Return from the method.
    Return,
    /// Throw an exception.
    Throw,
}

impl Opcode {
    /// Returns `true` for opcodes whose result is a pure function of the
    /// operand values (safe to value-number structurally).
    #[must_use]
    pub const fn is_pure(&self) -> bool {
        matches!(
            self,
            Self::Const { .. } | Self::Move | Self::Unary { .. } | Self::Binary { .. }
        )
    }

    /// Returns the use-array index of the reference this opcode dereferences,
    /// if it performs an implicit null check.
    #[must_use]
    pub const fn null_checked_use(&self) -> Option<usize> {
        match self {
            Self::ArrayLength | Self::ArrayGet | Self::InstanceGet { .. } => Some(0),
            Self::InvokeVirtual { .. } => Some(0),
            Self::ArrayPut | Self::InstancePut { .. } => Some(1),
            _ => None,
        }
    }

    /// Returns the use-array indices of `(array, index)` if this opcode
    /// performs an implicit bounds check.
    #[must_use]
    pub const fn range_checked_uses(&self) -> Option<(usize, usize)> {
        match self {
            Self::ArrayGet => Some((0, 1)),
            Self::ArrayPut => Some((1, 2)),
            _ => None,
        }
    }

    /// Returns `true` for opcodes that can transfer control to a catch
    /// handler.
    #[must_use]
    pub const fn can_throw(&self) -> bool {
        matches!(
            self,
            Self::NewInstance { .. }
                | Self::NewArray
                | Self::ArrayLength
                | Self::ArrayGet
                | Self::ArrayPut
                | Self::InstanceGet { .. }
                | Self::InstancePut { .. }
                | Self::StaticGet { .. }
                | Self::StaticPut { .. }
                | Self::InvokeStatic { .. }
                | Self::InvokeVirtual { .. }
                | Self::Throw
        )
    }

    /// Returns `true` for block terminators.
    #[must_use]
    pub const fn is_terminator(&self) -> bool {
        matches!(
            self,
            Self::IfZero | Self::IfNonZero | Self::Goto | Self::Return | Self::Throw
        )
    }
}

bitflags! {
    /// Per-instruction optimization flags, mutated by check elimination and
    /// read by the code-generation collaborator.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct InstructionFlags: u8 {
        /// The implicit null check may be omitted.
        const SKIP_NULL_CHECK = 1 << 0;
        /// The implicit array-bounds check may be omitted.
        const SKIP_RANGE_CHECK = 1 << 1;
        /// The implicit class-initialization check may be omitted.
        const SKIP_CLINIT_CHECK = 1 << 2;
    }
}

/// One MIR instruction.
///
/// Created by the lowering collaborator with virtual-register operands; SSA
/// construction fills in the SSA use/def ids. The flags bitmask starts empty
/// and is only ever extended (check elimination is monotonic).
#[derive(Debug, Clone)]
pub struct Instruction {
    opcode: Opcode,
    uses: Vec<VarId>,
    def: Option<VarId>,
    ssa_uses: Vec<SsaValueId>,
    ssa_def: Option<SsaValueId>,
    flags: InstructionFlags,
}

impl Instruction {
    /// Creates a new instruction from raw parts.
    #[must_use]
    pub fn new(opcode: Opcode, uses: Vec<VarId>, def: Option<VarId>) -> Self {
        Self {
            opcode,
            uses,
            def,
            ssa_uses: Vec::new(),
            ssa_def: None,
            flags: InstructionFlags::empty(),
        }
    }

    /// Returns the opcode.
    #[must_use]
    pub const fn opcode(&self) -> &Opcode {
        &self.opcode
    }

    /// Returns the virtual registers this instruction reads.
    #[must_use]
    pub fn uses(&self) -> &[VarId] {
        &self.uses
    }

    /// Returns the virtual register this instruction writes, if any.
    #[must_use]
    pub const fn def(&self) -> Option<VarId> {
        self.def
    }

    /// Returns the SSA values this instruction reads.
    ///
    /// Empty until SSA construction has run.
    #[must_use]
    pub fn ssa_uses(&self) -> &[SsaValueId] {
        &self.ssa_uses
    }

    /// Returns the SSA value this instruction defines, if any.
    #[must_use]
    pub const fn ssa_def(&self) -> Option<SsaValueId> {
        self.ssa_def
    }

    /// Returns the optimization flags.
    #[must_use]
    pub const fn flags(&self) -> InstructionFlags {
        self.flags
    }

    /// Sets optimization flag bits. Bits are never cleared.
    pub fn set_flags(&mut self, flags: InstructionFlags) {
        self.flags |= flags;
    }

    /// Replaces the SSA use array. Called by SSA construction.
    pub(crate) fn set_ssa_uses(&mut self, uses: Vec<SsaValueId>) {
        self.ssa_uses = uses;
    }

    /// Sets the SSA def. Called by SSA construction.
    pub(crate) fn set_ssa_def(&mut self, def: SsaValueId) {
        self.ssa_def = Some(def);
    }

    // Lowering-surface constructors. These fix the operand shapes documented
    // on [`Opcode`] so the builder cannot produce malformed arrays.

    /// `dst = constant`
    #[must_use]
    pub fn konst(dst: VarId, value: i64) -> Self {
        Self::new(Opcode::Const { value }, vec![], Some(dst))
    }

    /// `dst = src`
    #[must_use]
    pub fn mov(dst: VarId, src: VarId) -> Self {
        Self::new(Opcode::Move, vec![src], Some(dst))
    }

    /// `dst = op src`
    #[must_use]
    pub fn unary(op: UnaryOp, dst: VarId, src: VarId) -> Self {
        Self::new(Opcode::Unary { op }, vec![src], Some(dst))
    }

    /// `dst = lhs op rhs`
    #[must_use]
    pub fn binary(op: BinaryOp, dst: VarId, lhs: VarId, rhs: VarId) -> Self {
        Self::new(Opcode::Binary { op }, vec![lhs, rhs], Some(dst))
    }

    /// `dst = new class`
    #[must_use]
    pub fn new_instance(dst: VarId, class: ClassId) -> Self {
        Self::new(Opcode::NewInstance { class }, vec![], Some(dst))
    }

    /// `dst = new [length]`
    #[must_use]
    pub fn new_array(dst: VarId, length: VarId) -> Self {
        Self::new(Opcode::NewArray, vec![length], Some(dst))
    }

    /// `dst = array.length`
    #[must_use]
    pub fn array_length(dst: VarId, array: VarId) -> Self {
        Self::new(Opcode::ArrayLength, vec![array], Some(dst))
    }

    /// `dst = array[index]`
    #[must_use]
    pub fn aget(dst: VarId, array: VarId, index: VarId) -> Self {
        Self::new(Opcode::ArrayGet, vec![array, index], Some(dst))
    }

    /// `array[index] = value`
    #[must_use]
    pub fn aput(value: VarId, array: VarId, index: VarId) -> Self {
        Self::new(Opcode::ArrayPut, vec![value, array, index], None)
    }

    /// `dst = object.field`
    #[must_use]
    pub fn iget(dst: VarId, object: VarId, field: FieldId) -> Self {
        Self::new(Opcode::InstanceGet { field }, vec![object], Some(dst))
    }

    /// `object.field = value`
    #[must_use]
    pub fn iput(value: VarId, object: VarId, field: FieldId) -> Self {
        Self::new(Opcode::InstancePut { field }, vec![value, object], None)
    }

    /// `dst = Class.field`
    #[must_use]
    pub fn sget(dst: VarId, field: FieldId) -> Self {
        Self::new(Opcode::StaticGet { field }, vec![], Some(dst))
    }

    /// `Class.field = value`
    #[must_use]
    pub fn sput(value: VarId, field: FieldId) -> Self {
        Self::new(Opcode::StaticPut { field }, vec![value], None)
    }

    /// `dst? = method(args...)`
    #[must_use]
    pub fn invoke_static(dst: Option<VarId>, method: MethodId, args: Vec<VarId>) -> Self {
        Self::new(Opcode::InvokeStatic { method }, args, dst)
    }

    /// `dst? = receiver.method(args...)` - `receiver` is use 0.
    #[must_use]
    pub fn invoke_virtual(
        dst: Option<VarId>,
        method: MethodId,
        receiver: VarId,
        mut args: Vec<VarId>,
    ) -> Self {
        args.insert(0, receiver);
        Self::new(Opcode::InvokeVirtual { method }, args, dst)
    }

    /// Branch to the taken successor when `test == 0`.
    #[must_use]
    pub fn if_zero(test: VarId) -> Self {
        Self::new(Opcode::IfZero, vec![test], None)
    }

    /// Branch to the taken successor when `test != 0`.
    #[must_use]
    pub fn if_non_zero(test: VarId) -> Self {
        Self::new(Opcode::IfNonZero, vec![test], None)
    }

    /// Unconditional branch.
    #[must_use]
    pub fn goto() -> Self {
        Self::new(Opcode::Goto, vec![], None)
    }

    /// Return, optionally with a value.
    #[must_use]
    pub fn ret(value: Option<VarId>) -> Self {
        Self::new(Opcode::Return, value.into_iter().collect(), None)
    }

    /// Throw an exception.
    #[must_use]
    pub fn throw(exception: VarId) -> Self {
        Self::new(Opcode::Throw, vec![exception], None)
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(def) = self.ssa_def {
            write!(f, "{def} = ")?;
        } else if let Some(def) = self.def {
            write!(f, "{def} = ")?;
        }
        match &self.opcode {
            Opcode::Const { value } => write!(f, "const {value}")?,
            Opcode::Unary { op } => write!(f, "{op}")?,
            Opcode::Binary { op } => write!(f, "{op}")?,
            other => write!(f, "{other}")?,
        }
        let operands: Vec<String> = if self.ssa_uses.is_empty() {
            self.uses.iter().map(ToString::to_string).collect()
        } else {
            self.ssa_uses.iter().map(ToString::to_string).collect()
        };
        if !operands.is_empty() {
            write!(f, " {}", operands.join(", "))?;
        }
        if !self.flags.is_empty() {
            write!(f, " [{:?}]", self.flags)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_commutativity() {
        assert!(BinaryOp::Add.is_commutative());
        assert!(BinaryOp::Xor.is_commutative());
        assert!(!BinaryOp::Sub.is_commutative());
        assert!(!BinaryOp::Shl.is_commutative());
    }

    #[test]
    fn test_check_positions() {
        let field = FieldId::new(0);
        let iget = Instruction::iget(VarId::new(1), VarId::new(0), field);
        assert_eq!(iget.opcode().null_checked_use(), Some(0));
        assert_eq!(iget.opcode().range_checked_uses(), None);

        let aput = Instruction::aput(VarId::new(2), VarId::new(0), VarId::new(1));
        assert_eq!(aput.opcode().null_checked_use(), Some(1));
        assert_eq!(aput.opcode().range_checked_uses(), Some((1, 2)));
    }

    #[test]
    fn test_flags_monotonic() {
        let mut instr = Instruction::iget(VarId::new(1), VarId::new(0), FieldId::new(0));
        assert!(instr.flags().is_empty());
        instr.set_flags(InstructionFlags::SKIP_NULL_CHECK);
        instr.set_flags(InstructionFlags::SKIP_RANGE_CHECK);
        assert!(instr.flags().contains(InstructionFlags::SKIP_NULL_CHECK));
        assert!(instr.flags().contains(InstructionFlags::SKIP_RANGE_CHECK));
    }

    #[test]
    fn test_invoke_virtual_receiver_first() {
        let instr = Instruction::invoke_virtual(
            None,
            MethodId::new(0),
            VarId::new(9),
            vec![VarId::new(1), VarId::new(2)],
        );
        assert_eq!(instr.uses()[0], VarId::new(9));
        assert_eq!(instr.uses().len(), 3);
    }

    #[test]
    fn test_display() {
        let instr = Instruction::binary(BinaryOp::Add, VarId::new(2), VarId::new(0), VarId::new(1));
        assert_eq!(format!("{instr}"), "r2 = add r0, r1");
    }

    #[test]
    fn test_terminators() {
        assert!(Opcode::Goto.is_terminator());
        assert!(Opcode::Return.is_terminator());
        assert!(!Opcode::Move.is_terminator());
    }
}
