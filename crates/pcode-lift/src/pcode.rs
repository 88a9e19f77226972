//! P-code opcodes and the single p-code operation record the core lowers.

use smallvec::SmallVec;

use crate::varnode::Varnode;

/// A p-code opcode. Groupings mirror the lowering tables in `OpLowerer`
/// (unary, binary integer, binary boolean, binary float, special,
/// variadic, user-defined).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(non_camel_case_types)]
pub enum Opcode {
    // Unary
    Copy,
    Cast,
    BoolNegate,
    IntZext,
    IntSext,
    Int2Comp,
    IntNegate,
    Popcount,
    FloatNeg,
    FloatAbs,
    FloatSqrt,
    FloatCeil,
    FloatFloor,
    FloatRound,
    FloatNan,
    FloatInt2Float,
    FloatFloat2Float,
    FloatTrunc,
    Branch,
    Call,
    BranchInd,
    CallInd,
    Return,

    // Binary integer
    IntAnd,
    IntOr,
    IntXor,
    IntAdd,
    IntSub,
    IntMult,
    IntDiv,
    IntSdiv,
    IntRem,
    IntSrem,
    IntLeft,
    IntRight,
    IntSright,
    IntEqual,
    IntNotequal,
    IntLess,
    IntSless,
    IntLessequal,
    IntSlessequal,
    IntCarry,
    IntScarry,
    IntSborrow,

    // Binary boolean
    BoolAnd,
    BoolOr,
    BoolXor,

    // Binary float
    FloatEqual,
    FloatNotequal,
    FloatLess,
    FloatLessequal,
    FloatAdd,
    FloatSub,
    FloatMult,
    FloatDiv,

    // Special
    Cbranch,
    Load,
    Store,
    Piece,
    Subpiece,
    Ptradd,
    Ptrsub,

    // Variadic
    Multiequal,
    Cpoolref,
    New,
    Indirect,

    // User-defined
    CallOther,
}

impl Opcode {
    /// Whether this opcode operates on floating-point values. Used by
    /// `InstructionLifter` to short-circuit an instruction whose p-code
    /// contains any floating-point op.
    pub fn is_float(self) -> bool {
        matches!(
            self,
            Opcode::FloatNeg
                | Opcode::FloatAbs
                | Opcode::FloatSqrt
                | Opcode::FloatCeil
                | Opcode::FloatFloor
                | Opcode::FloatRound
                | Opcode::FloatNan
                | Opcode::FloatInt2Float
                | Opcode::FloatFloat2Float
                | Opcode::FloatTrunc
                | Opcode::FloatEqual
                | Opcode::FloatNotequal
                | Opcode::FloatLess
                | Opcode::FloatLessequal
                | Opcode::FloatAdd
                | Opcode::FloatSub
                | Opcode::FloatMult
                | Opcode::FloatDiv
        )
    }
}

/// A decoded p-code operation: an opcode, an optional output varnode, the
/// ordered input varnodes, and the op's sequence index within the
/// instruction.
#[derive(Debug, Clone)]
pub struct PcodeOp {
    pub seq: u32,
    pub opcode: Opcode,
    pub output: Option<Varnode>,
    pub inputs: SmallVec<[Varnode; 4]>,
}

impl PcodeOp {
    pub fn new(
        seq: u32,
        opcode: Opcode,
        output: Option<Varnode>,
        inputs: impl Into<SmallVec<[Varnode; 4]>>,
    ) -> Self {
        Self {
            seq,
            opcode,
            output,
            inputs: inputs.into(),
        }
    }
}
