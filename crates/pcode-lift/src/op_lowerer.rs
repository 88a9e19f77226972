//! Opcode-by-opcode emission into the current IR insertion point. This is
//! the bulk of the core: each p-code opcode class gets its own small
//! lowering function, built on the per-operator match arms in
//! `llvm_frontend/function_builder.rs::translate_operator` and its
//! `call_unary_intrinsic`/`call_intrinsic_with_bool`/`call_ternary_intrinsic`
//! helpers, generalized from a WASM operand stack to varnode-addressed
//! `ValueLocation`s.

use inkwell::FloatPredicate;
use inkwell::IntPredicate;
use inkwell::builder::Builder;
use inkwell::context::Context;
use inkwell::intrinsics::Intrinsic;
use inkwell::module::Module;
use inkwell::types::BasicTypeEnum;
use inkwell::values::{BasicMetadataValueEnum, BasicValueEnum, FloatValue, FunctionValue, IntValue, PointerValue};

use crate::cfg_emitter::CfgEmitter;
use crate::claim_context::ClaimContext;
use crate::error::{LiftError, Result};
use crate::host::{Decoder, HostArchitecture, IntrinsicsTable};
use crate::pcode::{Opcode, PcodeOp};
use crate::unique_arena::UniqueArena;
use crate::value_location::ValueLocation;
use crate::varnode::{AddressSpace, Varnode};
use crate::varnode_resolver::VarnodeResolver;

/// Everything one p-code op's lowering needs. Built fresh per instruction
/// lift by `InstructionLifter`, borrowed mutably for the lifetime of a
/// single `lower` call.
pub struct LowerContext<'ctx, 'a> {
    pub context: &'ctx Context,
    pub module: &'a Module<'ctx>,
    pub builder: &'a Builder<'ctx>,
    pub state_ptr: PointerValue<'ctx>,
    pub function: FunctionValue<'ctx>,
    pub pc: u64,
    pub arch: &'a dyn HostArchitecture<'ctx>,
    pub decoder: &'a dyn Decoder,
    pub intrinsics: &'a dyn IntrinsicsTable<'ctx>,
    pub unique: &'a mut UniqueArena<'ctx>,
    pub claims: &'a mut ClaimContext<'ctx>,
    pub cfg: &'a mut CfgEmitter<'ctx>,
}

impl<'ctx, 'a> LowerContext<'ctx, 'a> {
    fn resolve(&mut self, varnode: Varnode) -> Result<ValueLocation<'ctx>> {
        VarnodeResolver::resolve(
            self.context,
            self.builder,
            self.state_ptr,
            self.cfg.memory_slot(),
            self.arch,
            self.decoder,
            self.unique,
            self.claims,
            self.intrinsics,
            varnode,
        )
    }

    fn read_int(&mut self, varnode: Varnode) -> Result<IntValue<'ctx>> {
        let ty = self.context.custom_width_int_type(varnode.bits());
        let location = self.resolve(varnode)?;
        let value = location.read(self.builder, BasicTypeEnum::IntType(ty), self.intrinsics)?;
        int_value(value)
    }

    fn read_int_at(&mut self, varnode: Varnode, width_bits: u32) -> Result<IntValue<'ctx>> {
        let ty = self.context.custom_width_int_type(width_bits);
        let location = self.resolve(varnode)?;
        let value = location.read(self.builder, BasicTypeEnum::IntType(ty), self.intrinsics)?;
        int_value(value)
    }

    fn read_f32(&mut self, varnode: Varnode) -> Result<FloatValue<'ctx>> {
        let ty = self.context.f32_type();
        let location = self.resolve(varnode)?;
        let value = location.read(self.builder, BasicTypeEnum::FloatType(ty), self.intrinsics)?;
        match value {
            BasicValueEnum::FloatValue(f) => Ok(f),
            _ => Err(LiftError::internal("expected a float value")),
        }
    }

    fn word_bits(&self) -> u32 {
        self.arch.word_width_bits()
    }

    /// Read `addr` at word width, producing a synthetic memory location at
    /// that runtime offset (used by LOAD/STORE, which address memory
    /// through a computed value rather than a literal claim-resolved
    /// offset).
    fn memory_at(&mut self, addr: Varnode) -> Result<ValueLocation<'ctx>> {
        let offset = self.read_int_at(addr, self.word_bits())?;
        Ok(ValueLocation::Memory {
            memory_slot: self.cfg.memory_slot(),
            memory_type: self.arch.memory_value_type(self.context),
            offset,
        })
    }

    fn write_output(&mut self, output: Option<Varnode>, value: BasicValueEnum<'ctx>) -> Result<()> {
        let output = output.ok_or_else(|| LiftError::internal("op requires an output varnode"))?;
        let location = self.resolve(output)?;
        location.write(self.builder, value, self.intrinsics)
    }

    fn write_int_output(&mut self, output: Option<Varnode>, value: IntValue<'ctx>, signed: bool) -> Result<()> {
        let output = output.ok_or_else(|| LiftError::internal("op requires an output varnode"))?;
        let normalized = normalize_int(self.builder, self.context, value, output.bits(), signed)?;
        self.write_output(Some(output), normalized.into())
    }

    fn write_bool_output(&mut self, output: Option<Varnode>, cond: IntValue<'ctx>) -> Result<()> {
        let i8_type = self.context.i8_type();
        let byte = self.builder.build_int_z_extend(cond, i8_type, "bool8")?;
        self.write_int_output(output, byte, false)
    }
}

fn int_value(value: BasicValueEnum<'_>) -> Result<IntValue<'_>> {
    match value {
        BasicValueEnum::IntValue(v) => Ok(v),
        _ => Err(LiftError::internal("expected an integer value")),
    }
}

/// Zero-/sign-extend or truncate `value` to `target_bits`.
fn normalize_int<'ctx>(
    builder: &Builder<'ctx>,
    context: &'ctx Context,
    value: IntValue<'ctx>,
    target_bits: u32,
    signed: bool,
) -> Result<IntValue<'ctx>> {
    let current_bits = value.get_type().get_bit_width();
    if current_bits == target_bits {
        return Ok(value);
    }
    let target_type = context.custom_width_int_type(target_bits);
    if target_bits > current_bits {
        if signed {
            Ok(builder.build_int_s_extend(value, target_type, "normalize_sext")?)
        } else {
            Ok(builder.build_int_z_extend(value, target_type, "normalize_zext")?)
        }
    } else {
        Ok(builder.build_int_truncate(value, target_type, "normalize_trunc")?)
    }
}

fn call_intrinsic<'ctx>(
    module: &Module<'ctx>,
    builder: &Builder<'ctx>,
    name: &str,
    operand_types: &[BasicTypeEnum<'ctx>],
    args: &[BasicMetadataValueEnum<'ctx>],
) -> Result<BasicValueEnum<'ctx>> {
    let intrinsic = Intrinsic::find(name)
        .ok_or_else(|| LiftError::internal(format!("intrinsic {name} not found")))?;
    let fn_val = intrinsic
        .get_declaration(module, operand_types)
        .ok_or_else(|| LiftError::internal(format!("{name} declaration failed")))?;
    let call = builder.build_call(fn_val, args, "intrinsic")?;
    call.try_as_basic_value()
        .basic()
        .ok_or_else(|| LiftError::internal(format!("{name} returned void")))
}

fn checked_overflow_bit<'ctx>(
    cx: &mut LowerContext<'ctx, '_>,
    name: &str,
    a: IntValue<'ctx>,
    b: IntValue<'ctx>,
) -> Result<IntValue<'ctx>> {
    let struct_val = call_intrinsic(
        cx.module,
        cx.builder,
        name,
        &[a.get_type().into()],
        &[a.into(), b.into()],
    )?
    .into_struct_value();
    let overflow = cx
        .builder
        .build_extract_value(struct_val, 1, "overflow")?;
    int_value(overflow)
}

/// Lower one decoded p-code op. Returns `Ok(())` with IR emitted, or an
/// error whose `status()` the caller folds into the instruction's sticky
/// `LiftStatus`.
pub fn lower(cx: &mut LowerContext<'_, '_>, op: &PcodeOp) -> Result<()> {
    match op.opcode {
        Opcode::Copy => lower_copy_cast(cx, op),
        Opcode::Cast => lower_copy_cast(cx, op),
        Opcode::BoolNegate => lower_bool_negate(cx, op),
        Opcode::IntZext => lower_ext(cx, op, false),
        Opcode::IntSext => lower_ext(cx, op, true),
        Opcode::Int2Comp => lower_int_unary(cx, op, |b, v, n| b.build_int_neg(v, n)),
        Opcode::IntNegate => lower_int_unary(cx, op, |b, v, n| b.build_not(v, n)),
        Opcode::Popcount => lower_popcount(cx, op),
        Opcode::FloatNeg => lower_float_neg(cx, op),
        Opcode::FloatAbs => lower_float_unary_intrinsic(cx, op, "llvm.fabs"),
        Opcode::FloatSqrt => lower_float_unary_intrinsic(cx, op, "llvm.sqrt"),
        Opcode::FloatCeil => lower_float_unary_intrinsic(cx, op, "llvm.ceil"),
        Opcode::FloatFloor => lower_float_unary_intrinsic(cx, op, "llvm.floor"),
        Opcode::FloatRound => lower_float_unary_intrinsic(cx, op, "llvm.round"),
        Opcode::FloatNan => lower_float_nan(cx, op),
        Opcode::FloatInt2Float => lower_float_int2float(cx, op),
        Opcode::FloatFloat2Float => lower_float_float2float(cx, op),
        Opcode::FloatTrunc => lower_float_trunc(cx, op),
        Opcode::Branch | Opcode::Call => lower_direct_branch(cx, op),
        Opcode::BranchInd | Opcode::CallInd | Opcode::Return => lower_indirect_branch(cx, op),

        Opcode::IntAnd => lower_int_binop(cx, op, false, |b, l, r, n| b.build_and(l, r, n)),
        Opcode::IntOr => lower_int_binop(cx, op, false, |b, l, r, n| b.build_or(l, r, n)),
        Opcode::IntXor => lower_int_binop(cx, op, false, |b, l, r, n| b.build_xor(l, r, n)),
        Opcode::IntAdd => lower_int_binop(cx, op, false, |b, l, r, n| b.build_int_add(l, r, n)),
        Opcode::IntSub => lower_int_binop(cx, op, false, |b, l, r, n| b.build_int_sub(l, r, n)),
        Opcode::IntMult => lower_int_binop(cx, op, false, |b, l, r, n| b.build_int_mul(l, r, n)),
        Opcode::IntDiv => lower_int_binop(cx, op, false, |b, l, r, n| b.build_int_unsigned_div(l, r, n)),
        Opcode::IntSdiv => lower_int_binop(cx, op, true, |b, l, r, n| b.build_int_signed_div(l, r, n)),
        Opcode::IntRem => lower_int_binop(cx, op, false, |b, l, r, n| b.build_int_unsigned_rem(l, r, n)),
        Opcode::IntSrem => lower_int_binop(cx, op, true, |b, l, r, n| b.build_int_signed_rem(l, r, n)),
        Opcode::IntLeft => lower_shift(cx, op, |b, l, r, n| b.build_left_shift(l, r, n)),
        Opcode::IntRight => lower_shift(cx, op, |b, l, r, n| b.build_right_shift(l, r, false, n)),
        Opcode::IntSright => lower_shift(cx, op, |b, l, r, n| b.build_right_shift(l, r, true, n)),

        Opcode::IntEqual => lower_int_cmp(cx, op, IntPredicate::EQ),
        Opcode::IntNotequal => lower_int_cmp(cx, op, IntPredicate::NE),
        Opcode::IntLess => lower_int_cmp(cx, op, IntPredicate::ULT),
        Opcode::IntSless => lower_int_cmp(cx, op, IntPredicate::SLT),
        Opcode::IntLessequal => lower_int_cmp(cx, op, IntPredicate::ULE),
        Opcode::IntSlessequal => lower_int_cmp(cx, op, IntPredicate::SLE),

        Opcode::IntCarry => lower_overflow(cx, op, "llvm.uadd.with.overflow"),
        Opcode::IntScarry => lower_overflow(cx, op, "llvm.sadd.with.overflow"),
        Opcode::IntSborrow => lower_overflow(cx, op, "llvm.ssub.with.overflow"),

        Opcode::BoolAnd => lower_bool_binop(cx, op, |b, l, r, n| b.build_and(l, r, n)),
        Opcode::BoolOr => lower_bool_binop(cx, op, |b, l, r, n| b.build_or(l, r, n)),
        Opcode::BoolXor => lower_bool_binop(cx, op, |b, l, r, n| b.build_xor(l, r, n)),

        Opcode::FloatEqual => lower_float_cmp(cx, op, FloatPredicate::OEQ),
        Opcode::FloatNotequal => lower_float_cmp(cx, op, FloatPredicate::ONE),
        Opcode::FloatLess => lower_float_cmp(cx, op, FloatPredicate::OLT),
        Opcode::FloatLessequal => lower_float_cmp(cx, op, FloatPredicate::OLE),
        Opcode::FloatAdd => lower_float_binop(cx, op, |b, l, r, n| b.build_float_add(l, r, n)),
        Opcode::FloatSub => lower_float_binop(cx, op, |b, l, r, n| b.build_float_sub(l, r, n)),
        Opcode::FloatMult => lower_float_binop(cx, op, |b, l, r, n| b.build_float_mul(l, r, n)),
        Opcode::FloatDiv => lower_float_binop(cx, op, |b, l, r, n| b.build_float_div(l, r, n)),

        Opcode::Cbranch => lower_cbranch(cx, op),
        Opcode::Load => lower_load(cx, op),
        Opcode::Store => lower_store(cx, op),
        Opcode::Piece => lower_piece(cx, op),
        Opcode::Subpiece => lower_subpiece(cx, op),
        Opcode::Ptradd => lower_ptradd(cx, op),
        Opcode::Ptrsub => lower_ptrsub(cx, op),

        Opcode::Multiequal => lower_multiequal(cx, op),
        Opcode::Cpoolref | Opcode::New | Opcode::Indirect => Err(LiftError::unsupported(
            "CPOOLREF/NEW/INDIRECT originate only from higher-level bytecodes",
        )),

        Opcode::CallOther => lower_callother(cx, op),
    }
}

fn input(op: &PcodeOp, index: usize) -> Result<Varnode> {
    op.inputs
        .get(index)
        .copied()
        .ok_or_else(|| LiftError::internal(format!("missing input #{index}")))
}

fn lower_copy_cast(cx: &mut LowerContext<'_, '_>, op: &PcodeOp) -> Result<()> {
    let src = input(op, 0)?;
    let value = cx.read_int(src)?;
    cx.write_int_output(op.output, value, false)
}

fn lower_bool_negate(cx: &mut LowerContext<'_, '_>, op: &PcodeOp) -> Result<()> {
    let src = input(op, 0)?;
    let value = cx.read_int_at(src, 8)?;
    let zero = value.get_type().const_zero();
    let cond = cx.builder.build_int_compare(IntPredicate::EQ, value, zero, "bneg")?;
    cx.write_bool_output(op.output, cond)
}

fn lower_ext(cx: &mut LowerContext<'_, '_>, op: &PcodeOp, signed: bool) -> Result<()> {
    let src = input(op, 0)?;
    let value = cx.read_int(src)?;
    cx.write_int_output(op.output, value, signed)
}

fn lower_int_unary(
    cx: &mut LowerContext<'_, '_>,
    op: &PcodeOp,
    f: impl Fn(&Builder<'_>, IntValue<'_>, &str) -> std::result::Result<IntValue<'_>, inkwell::builder::BuilderError>,
) -> Result<()> {
    let src = input(op, 0)?;
    let value = cx.read_int(src)?;
    let result = f(cx.builder, value, "int_unary")?;
    cx.write_int_output(op.output, result, false)
}

fn lower_popcount(cx: &mut LowerContext<'_, '_>, op: &PcodeOp) -> Result<()> {
    let src = input(op, 0)?;
    let value = cx.read_int(src)?;
    let result = call_intrinsic(
        cx.module,
        cx.builder,
        "llvm.ctpop",
        &[value.get_type().into()],
        &[value.into()],
    )?;
    cx.write_int_output(op.output, int_value(result)?, false)
}

fn lower_float_neg(cx: &mut LowerContext<'_, '_>, op: &PcodeOp) -> Result<()> {
    let src = input(op, 0)?;
    let value = cx.read_f32(src)?;
    let result = cx.builder.build_float_neg(value, "fneg")?;
    cx.write_output(op.output, result.into())
}

fn lower_float_unary_intrinsic(cx: &mut LowerContext<'_, '_>, op: &PcodeOp, name: &str) -> Result<()> {
    let src = input(op, 0)?;
    let value = cx.read_f32(src)?;
    let result = call_intrinsic(
        cx.module,
        cx.builder,
        name,
        &[value.get_type().into()],
        &[value.into()],
    )?;
    cx.write_output(op.output, result)
}

fn lower_float_nan(cx: &mut LowerContext<'_, '_>, op: &PcodeOp) -> Result<()> {
    let src = input(op, 0)?;
    let value = cx.read_f32(src)?;
    let cond = cx
        .builder
        .build_float_compare(FloatPredicate::UNE, value, value, "isnan")?;
    cx.write_bool_output(op.output, cond)
}

fn lower_float_int2float(cx: &mut LowerContext<'_, '_>, op: &PcodeOp) -> Result<()> {
    let src = input(op, 0)?;
    let value = cx.read_int(src)?;
    let f32_type = cx.context.f32_type();
    let result = cx.builder.build_signed_int_to_float(value, f32_type, "i2f")?;
    cx.write_output(op.output, result.into())
}

fn lower_float_float2float(cx: &mut LowerContext<'_, '_>, op: &PcodeOp) -> Result<()> {
    let src = input(op, 0)?;
    let value = cx.read_f32(src)?;
    cx.write_output(op.output, value.into())
}

fn lower_float_trunc(cx: &mut LowerContext<'_, '_>, op: &PcodeOp) -> Result<()> {
    let src = input(op, 0)?;
    let value = cx.read_f32(src)?;
    let output = op
        .output
        .ok_or_else(|| LiftError::internal("FLOAT_TRUNC requires an output varnode"))?;
    let int_type = cx.context.custom_width_int_type(output.bits());
    let result = cx.builder.build_float_to_signed_int(value, int_type, "ftrunc")?;
    cx.write_output(op.output, result.into())
}

/// Direct branch/call target resolution. A constant-space
/// target with no active claim is out of scope (it denotes an intra-op
/// relative offset, not a real address); a constant-space target with a
/// recorded claim resolves to the claimed location's value.
fn lower_direct_branch(cx: &mut LowerContext<'_, '_>, op: &PcodeOp) -> Result<()> {
    let target = input(op, 0)?;
    if target.space == AddressSpace::Const && !cx.claims.has_claim(target.offset) {
        return Err(LiftError::unsupported(
            "direct branch/call target is an unclaimed constant (intra-instruction control flow)",
        ));
    }
    let word_bits = cx.word_bits();
    let target_value = cx
        .claims
        .resolve_offset(cx.builder, cx.context, target, word_bits, cx.intrinsics)?;
    cx.cfg.redirect_control_flow(cx.context, cx.builder, target_value)
}

fn lower_indirect_branch(cx: &mut LowerContext<'_, '_>, op: &PcodeOp) -> Result<()> {
    let target = input(op, 0)?;
    let word_bits = cx.word_bits();
    let value = cx.read_int_at(target, word_bits)?;
    cx.cfg.redirect_control_flow(cx.context, cx.builder, value)
}

fn lower_int_binop(
    cx: &mut LowerContext<'_, '_>,
    op: &PcodeOp,
    signed: bool,
    f: impl Fn(&Builder<'_>, IntValue<'_>, IntValue<'_>, &str) -> std::result::Result<IntValue<'_>, inkwell::builder::BuilderError>,
) -> Result<()> {
    let lhs_vn = input(op, 0)?;
    let rhs_vn = input(op, 1)?;
    let lhs = cx.read_int(lhs_vn)?;
    let rhs = cx.read_int(rhs_vn)?;
    let result = f(cx.builder, lhs, rhs, "int_binop")?;
    cx.write_int_output(op.output, result, signed)
}

fn lower_shift(
    cx: &mut LowerContext<'_, '_>,
    op: &PcodeOp,
    f: impl Fn(&Builder<'_>, IntValue<'_>, IntValue<'_>, &str) -> std::result::Result<IntValue<'_>, inkwell::builder::BuilderError>,
) -> Result<()> {
    let lhs_vn = input(op, 0)?;
    let rhs_vn = input(op, 1)?;
    let lhs = cx.read_int(lhs_vn)?;
    let rhs_raw = cx.read_int(rhs_vn)?;
    let rhs = normalize_int(cx.builder, cx.context, rhs_raw, lhs_vn.bits(), false)?;
    let result = f(cx.builder, lhs, rhs, "shift")?;
    cx.write_int_output(op.output, result, false)
}

fn lower_int_cmp(cx: &mut LowerContext<'_, '_>, op: &PcodeOp, predicate: IntPredicate) -> Result<()> {
    let lhs_vn = input(op, 0)?;
    let rhs_vn = input(op, 1)?;
    let lhs = cx.read_int(lhs_vn)?;
    let rhs = cx.read_int(rhs_vn)?;
    let cond = cx.builder.build_int_compare(predicate, lhs, rhs, "int_cmp")?;
    cx.write_bool_output(op.output, cond)
}

fn lower_overflow(cx: &mut LowerContext<'_, '_>, op: &PcodeOp, intrinsic_name: &str) -> Result<()> {
    let lhs_vn = input(op, 0)?;
    let rhs_vn = input(op, 1)?;
    let lhs = cx.read_int(lhs_vn)?;
    let rhs = cx.read_int(rhs_vn)?;
    let overflow = checked_overflow_bit(cx, intrinsic_name, lhs, rhs)?;
    cx.write_bool_output(op.output, overflow)
}

fn lower_bool_binop(
    cx: &mut LowerContext<'_, '_>,
    op: &PcodeOp,
    f: impl Fn(&Builder<'_>, IntValue<'_>, IntValue<'_>, &str) -> std::result::Result<IntValue<'_>, inkwell::builder::BuilderError>,
) -> Result<()> {
    let lhs_vn = input(op, 0)?;
    let rhs_vn = input(op, 1)?;
    let lhs = cx.read_int_at(lhs_vn, 8)?;
    let rhs = cx.read_int_at(rhs_vn, 8)?;
    let result = f(cx.builder, lhs, rhs, "bool_binop")?;
    cx.write_int_output(op.output, result, false)
}

fn lower_float_cmp(cx: &mut LowerContext<'_, '_>, op: &PcodeOp, predicate: FloatPredicate) -> Result<()> {
    let lhs_vn = input(op, 0)?;
    let rhs_vn = input(op, 1)?;
    let lhs = cx.read_f32(lhs_vn)?;
    let rhs = cx.read_f32(rhs_vn)?;
    let cond = cx.builder.build_float_compare(predicate, lhs, rhs, "float_cmp")?;
    cx.write_bool_output(op.output, cond)
}

fn lower_float_binop(
    cx: &mut LowerContext<'_, '_>,
    op: &PcodeOp,
    f: impl Fn(&Builder<'_>, FloatValue<'_>, FloatValue<'_>, &str) -> std::result::Result<FloatValue<'_>, inkwell::builder::BuilderError>,
) -> Result<()> {
    let lhs_vn = input(op, 0)?;
    let rhs_vn = input(op, 1)?;
    let lhs = cx.read_f32(lhs_vn)?;
    let rhs = cx.read_f32(rhs_vn)?;
    let result = f(cx.builder, lhs, rhs, "float_binop")?;
    cx.write_output(op.output, result.into())
}

/// CBRANCH: read cur_pc → select(cond, target, cur_pc) → store next-PC →
/// split block → conditional terminator. Order matters: the select must
/// read the pre-split condition before the block is split.
fn lower_cbranch(cx: &mut LowerContext<'_, '_>, op: &PcodeOp) -> Result<()> {
    let target_vn = input(op, 0)?;
    let cond_vn = input(op, 1)?;

    if target_vn.space == AddressSpace::Const {
        return Err(LiftError::unsupported("CBRANCH target in constant space"));
    }

    let cond_bits = cond_vn.bits();
    let cond_value = cx.read_int_at(cond_vn, cond_bits)?;
    let zero = cond_value.get_type().const_zero();
    let cond_i1 = cx
        .builder
        .build_int_compare(IntPredicate::NE, cond_value, zero, "cbranch_cond")?;

    let word_bits = cx.word_bits();
    let target_value =
        cx.claims
            .resolve_offset(cx.builder, cx.context, target_vn, cond_bits, cx.intrinsics)?;
    let target_value = normalize_int(cx.builder, cx.context, target_value, word_bits, false)?;
    let current_pc = cx.context.custom_width_int_type(word_bits).const_int(cx.pc, false);

    let next_pc = cx
        .builder
        .build_select(cond_i1, target_value, current_pc, "next_pc")?;
    let next_pc = int_value(next_pc)?;
    let next_pc_ref = cx.cfg.next_pc_ref();
    cx.builder.build_store(next_pc_ref, next_pc)?;

    cx.cfg
        .terminate_with_condition(cx.context, cx.builder, cond_i1)
}

fn lower_load(cx: &mut LowerContext<'_, '_>, op: &PcodeOp) -> Result<()> {
    let addr_vn = input(op, 1)?;
    let output = op
        .output
        .ok_or_else(|| LiftError::internal("LOAD requires an output varnode"))?;
    let memory = cx.memory_at(addr_vn)?;
    let output_type = cx.context.custom_width_int_type(output.bits());
    let value = memory.read(cx.builder, BasicTypeEnum::IntType(output_type), cx.intrinsics)?;
    cx.write_output(Some(output), value)
}

fn lower_store(cx: &mut LowerContext<'_, '_>, op: &PcodeOp) -> Result<()> {
    let addr_vn = input(op, 1)?;
    let value_vn = input(op, 2)?;
    let value = cx.read_int(value_vn)?;
    let memory = cx.memory_at(addr_vn)?;
    memory.write(cx.builder, value.into(), cx.intrinsics)
}

fn lower_piece(cx: &mut LowerContext<'_, '_>, op: &PcodeOp) -> Result<()> {
    let hi_vn = input(op, 0)?;
    let lo_vn = input(op, 1)?;
    let output = op
        .output
        .ok_or_else(|| LiftError::internal("PIECE requires an output varnode"))?;
    let hi = cx.read_int(hi_vn)?;
    let lo = cx.read_int(lo_vn)?;
    let output_bits = output.bits();
    let hi_ext = normalize_int(cx.builder, cx.context, hi, output_bits, false)?;
    let lo_ext = normalize_int(cx.builder, cx.context, lo, output_bits, false)?;
    let output_type = cx.context.custom_width_int_type(output_bits);
    let shift_amount = output_type.const_int(u64::from(lo_vn.size) * 8, false);
    let shifted = cx.builder.build_left_shift(hi_ext, shift_amount, "piece_shift")?;
    let result = cx.builder.build_or(shifted, lo_ext, "piece_or")?;
    cx.write_output(Some(output), result.into())
}

fn lower_subpiece(cx: &mut LowerContext<'_, '_>, op: &PcodeOp) -> Result<()> {
    let src_vn = input(op, 0)?;
    let byte_offset_vn = input(op, 1)?;
    if byte_offset_vn.space != AddressSpace::Const {
        return Err(LiftError::internal("SUBPIECE's second input must be constant"));
    }
    let byte_offset = u8::try_from(byte_offset_vn.offset).unwrap_or(u8::MAX);
    let new_size = src_vn
        .size
        .checked_sub(byte_offset)
        .ok_or_else(|| LiftError::invalid("SUBPIECE byte offset exceeds source size"))?;
    let src = cx.read_int(src_vn)?;
    let shifted = if byte_offset == 0 {
        src
    } else {
        let shift_amount = src.get_type().const_int(u64::from(byte_offset) * 8, false);
        cx.builder.build_right_shift(src, shift_amount, false, "subpiece_shift")?
    };
    let truncated = normalize_int(cx.builder, cx.context, shifted, u32::from(new_size) * 8, false)?;
    cx.write_int_output(op.output, truncated, false)
}

fn lower_ptradd(cx: &mut LowerContext<'_, '_>, op: &PcodeOp) -> Result<()> {
    let base_vn = input(op, 0)?;
    let index_vn = input(op, 1)?;
    let elem_size_vn = input(op, 2)?;
    let word_bits = cx.word_bits();
    let base = cx.read_int_at(base_vn, word_bits)?;
    let index = cx.read_int_at(index_vn, word_bits)?;
    let elem_size = cx
        .context
        .custom_width_int_type(word_bits)
        .const_int(elem_size_vn.offset, false);
    let scaled = cx.builder.build_int_mul(index, elem_size, "ptradd_scale")?;
    let result = cx.builder.build_int_add(base, scaled, "ptradd")?;
    cx.write_int_output(op.output, result, false)
}

fn lower_ptrsub(cx: &mut LowerContext<'_, '_>, op: &PcodeOp) -> Result<()> {
    let base_vn = input(op, 0)?;
    let offset_vn = input(op, 1)?;
    let word_bits = cx.word_bits();
    let base = cx.read_int_at(base_vn, word_bits)?;
    let offset = cx.read_int_at(offset_vn, word_bits)?;
    let result = cx.builder.build_int_add(base, offset, "ptrsub")?;
    cx.write_int_output(op.output, result, false)
}

/// MULTIEQUAL degraded case: all incoming values are attributed to the
/// block active when this op itself is lowered, since the core has no
/// record of which block last wrote each input.
fn lower_multiequal(cx: &mut LowerContext<'_, '_>, op: &PcodeOp) -> Result<()> {
    let output = op
        .output
        .ok_or_else(|| LiftError::internal("MULTIEQUAL requires an output varnode"))?;
    let output_type = cx.context.custom_width_int_type(output.bits());
    let phi = cx.builder.build_phi(output_type, "multiequal")?;
    let current_block = cx.cfg.current_block();
    for i in 0..op.inputs.len() {
        let input_vn = input(op, i)?;
        let value = cx.read_int_at(input_vn, output.bits())?;
        phi.add_incoming(&[(&value, current_block)]);
    }
    let result = phi.as_basic_value();
    cx.write_output(Some(output), result)
}

fn lower_callother(cx: &mut LowerContext<'_, '_>, op: &PcodeOp) -> Result<()> {
    let selector = input(op, 0)?;
    let names = cx.decoder.user_op_names();
    let index = usize::try_from(selector.offset)
        .map_err(|_| LiftError::unsupported("CALLOTHER selector out of range"))?;
    let name = names
        .get(index)
        .ok_or_else(|| LiftError::unsupported("CALLOTHER selector out of range"))?;

    if name == "claim_eq" && op.inputs.len() == 3 {
        let constant_vn = input(op, 1)?;
        let value_vn = input(op, 2)?;
        let location = cx.resolve(value_vn)?;
        return cx.claims.add_claim(constant_vn, location);
    }

    Err(LiftError::unsupported(format!(
        "CALLOTHER user-op {name} has no lowering"
    )))
}
