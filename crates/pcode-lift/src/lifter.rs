//! The orchestrator: creates the IR function, drives p-code iteration, and
//! finalizes it. Grounded on `translate_function`
//! (`llvm_frontend/function_builder.rs`) — entry block creation, alloca
//! setup, then a per-operator dispatch loop — generalized from one WASM
//! function body to one decoded instruction's p-code sequence.

use inkwell::attributes::{Attribute, AttributeLoc};
use inkwell::context::Context;
use inkwell::module::{Linkage, Module};
use inkwell::values::FunctionValue;

use crate::cfg_emitter::CfgEmitter;
use crate::claim_context::ClaimContext;
use crate::error::{LiftError, LiftStatus, StatusTracker};
use crate::host::{BranchTakenDescriptor, Decoder, HostArchitecture, IntrinsicsTable};
use crate::op_lowerer::{self, LowerContext};
use crate::unique_arena::UniqueArena;

/// Orchestrates a single instruction's lift. Holds the external
/// collaborators for the lifetime of the driver's session; all
/// per-instruction scratch is local to [`InstructionLifter::lift`].
pub struct InstructionLifter<'a, 'ctx> {
    decoder: &'a mut dyn Decoder,
    arch: &'a dyn HostArchitecture<'ctx>,
    intrinsics: &'a dyn IntrinsicsTable<'ctx>,
}

impl<'a, 'ctx> InstructionLifter<'a, 'ctx> {
    pub fn new(
        decoder: &'a mut dyn Decoder,
        arch: &'a dyn HostArchitecture<'ctx>,
        intrinsics: &'a dyn IntrinsicsTable<'ctx>,
    ) -> Self {
        Self {
            decoder,
            arch,
            intrinsics,
        }
    }

    /// Lift the instruction at `pc` backed by `bytes` into a fresh function
    /// in `module`. Returns the final sticky status and the emitted
    /// function (always produced, even when the status is not `Lifted`,
    /// so a driver policy may choose to keep partial IR or discard it).
    pub fn lift(
        &mut self,
        context: &'ctx Context,
        module: &Module<'ctx>,
        pc: u64,
        bytes: &[u8],
        branch_taken: Option<BranchTakenDescriptor>,
    ) -> (LiftStatus, Option<FunctionValue<'ctx>>) {
        let span = tracing::debug_span!("lift_instruction", pc = %format_args!("{pc:#x}"));
        let _enter = span.enter();

        self.decoder.reset();

        let ops = match self.decoder.decode(pc, bytes) {
            Ok(ops) => ops,
            Err(err) => return (err.status(), None),
        };

        if ops.iter().any(|op| op.opcode.is_float()) {
            tracing::debug!("instruction contains a floating-point opcode, short-circuiting");
            return (LiftStatus::Unsupported, None);
        }

        let name = format!("sleigh_remill_instruction_function_{pc:x}");
        let state_ptr_type = self.arch.state_pointer_type(context);
        let memory_ptr_type = self.arch.memory_pointer_type(context);
        let fn_type = memory_ptr_type.fn_type(
            &[
                state_ptr_type.into(),
                memory_ptr_type.into(),
                state_ptr_type.into(),
                state_ptr_type.into(),
            ],
            false,
        );
        let function = module.add_function(&name, fn_type, Some(Linkage::Internal));

        let builder = context.create_builder();
        let builder = &builder;

        let entry_block = context.append_basic_block(function, "entry");
        builder.position_at_end(entry_block);

        let state_ptr = function
            .get_nth_param(0)
            .expect("function has 4 params")
            .into_pointer_value();
        let memory_ptr = function
            .get_nth_param(1)
            .expect("function has 4 params")
            .into_pointer_value();
        let branch_taken_ref = function
            .get_nth_param(2)
            .expect("function has 4 params")
            .into_pointer_value();
        let next_pc_ref = function
            .get_nth_param(3)
            .expect("function has 4 params")
            .into_pointer_value();

        let memory_slot = match builder.build_alloca(memory_ptr_type, "MEMORY") {
            Ok(slot) => slot,
            Err(err) => {
                tracing::warn!(error = %err, "failed to allocate MEMORY slot");
                return (LiftStatus::LifterError, Some(function));
            }
        };
        if let Err(err) = builder.build_store(memory_slot, memory_ptr) {
            tracing::warn!(error = %err, "failed to store initial memory pointer");
            return (LiftStatus::LifterError, Some(function));
        }

        let mut cfg = CfgEmitter::new(
            function,
            entry_block,
            branch_taken_ref,
            next_pc_ref,
            memory_slot,
            memory_ptr_type,
        );

        let mut unique = UniqueArena::new(context);
        let mut claims = ClaimContext::new();
        let mut status = StatusTracker::new();

        for (i, op) in ops.iter().enumerate() {
            if let Some(descriptor) = branch_taken {
                if descriptor.pcode_index as usize == i {
                    let mut lower_cx = LowerContext {
                        context,
                        module,
                        builder,
                        state_ptr,
                        function,
                        pc,
                        arch: self.arch,
                        decoder: self.decoder,
                        intrinsics: self.intrinsics,
                        unique: &mut unique,
                        claims: &mut claims,
                        cfg: &mut cfg,
                    };
                    match emit_branch_taken(&mut lower_cx, descriptor) {
                        Ok(()) => {}
                        Err(err) => {
                            tracing::warn!(error = %err, "branch-taken side effect failed");
                            status.record_err(&err);
                        }
                    }
                }
            }

            let mut lower_cx = LowerContext {
                context,
                module,
                builder,
                state_ptr,
                function,
                pc,
                arch: self.arch,
                decoder: self.decoder,
                intrinsics: self.intrinsics,
                unique: &mut unique,
                claims: &mut claims,
                cfg: &mut cfg,
            };

            let is_claim_op = is_claim_eq_op(op, self.decoder);
            let succeeded = match op_lowerer::lower(&mut lower_cx, op) {
                Ok(()) => {
                    status.record(LiftStatus::Lifted);
                    true
                }
                Err(err) => {
                    tracing::debug!(seq = op.seq, opcode = ?op.opcode, error = %err, "op lowering failed");
                    status.record_err(&err);
                    false
                }
            };
            // A claim set by this op must survive into the immediately
            // following op's lowering; anything else clears it so it
            // cannot leak past that one op.
            if !(is_claim_op && succeeded) {
                claims.clear();
            }
        }

        if let Err(err) = cfg.finalize(builder) {
            status.record_err(&err);
        }

        set_always_inline(context, function);

        (status.finish(), Some(function))
    }
}

/// Whether `op` is exactly the `claim_eq` user-op. A successful lowering of
/// such an op is the one case that must NOT clear [`ClaimContext`]
/// afterwards — claims survive for exactly the op immediately following
/// them, then are gone regardless of whether that op consumed them.
fn is_claim_eq_op(op: &crate::pcode::PcodeOp, decoder: &dyn Decoder) -> bool {
    if op.opcode != crate::pcode::Opcode::CallOther || op.inputs.len() != 3 {
        return false;
    }
    let Some(selector) = op.inputs.first() else {
        return false;
    };
    let Ok(index) = usize::try_from(selector.offset) else {
        return false;
    };
    decoder
        .user_op_names()
        .get(index)
        .is_some_and(|name| name == "claim_eq")
}

/// Read the branch-taken varnode as an integer and store it (narrowed or
/// widened to i8) into the branch-taken cell. Orthogonal to, and emitted
/// before, this p-code index's own CBRANCH lowering.
fn emit_branch_taken(
    cx: &mut LowerContext<'_, '_>,
    descriptor: BranchTakenDescriptor,
) -> crate::error::Result<()> {
    let value = read_branch_taken_value(cx, descriptor)?;
    cx.cfg.write_branch_taken(cx.builder, value)
}

fn read_branch_taken_value<'ctx>(
    cx: &mut LowerContext<'ctx, '_>,
    descriptor: BranchTakenDescriptor,
) -> crate::error::Result<inkwell::values::IntValue<'ctx>> {
    use crate::varnode_resolver::VarnodeResolver;
    let location = VarnodeResolver::resolve(
        cx.context,
        cx.builder,
        cx.state_ptr,
        cx.cfg.memory_slot(),
        cx.arch,
        cx.decoder,
        cx.unique,
        cx.claims,
        cx.intrinsics,
        descriptor.varnode,
    )?;
    let ty = cx.context.custom_width_int_type(descriptor.varnode.bits());
    let value = location.read(cx.builder, inkwell::types::BasicTypeEnum::IntType(ty), cx.intrinsics)?;
    match value {
        inkwell::values::BasicValueEnum::IntValue(v) => Ok(v),
        _ => Err(LiftError::internal("branch-taken varnode did not resolve to an integer")),
    }
}

fn set_always_inline<'ctx>(context: &'ctx Context, function: FunctionValue<'ctx>) {
    let kind_id = Attribute::get_named_enum_kind_id("alwaysinline");
    let attr = context.create_enum_attribute(kind_id, 0);
    function.add_attribute(AttributeLoc::Function, attr);
}
