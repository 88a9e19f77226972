//! The exit block, branch-taken/next-PC side channels, and block-splitting
//! machinery. Grounded on the single-exit-block function shape in
//! `llvm_frontend/function_builder.rs` (every WASM function there funnels
//! control flow through one return block), generalized to an externally
//! supplied next-PC/branch-taken pair instead of a WASM return value.
//!
//! The exit block itself is materialized lazily, on first use by a
//! control-flow op: an instruction whose p-code never branches returns
//! straight out of its one and only block, with no separate exit block or
//! funneling jump to it.

use inkwell::basic_block::BasicBlock;
use inkwell::builder::Builder;
use inkwell::context::Context;
use inkwell::types::PointerType;
use inkwell::values::{FunctionValue, IntValue, PointerValue};

use crate::error::Result;

pub struct CfgEmitter<'ctx> {
    function: FunctionValue<'ctx>,
    exit_block: Option<BasicBlock<'ctx>>,
    branch_taken_ref: PointerValue<'ctx>,
    next_pc_ref: PointerValue<'ctx>,
    memory_slot: PointerValue<'ctx>,
    memory_pointer_type: PointerType<'ctx>,
    current_block: BasicBlock<'ctx>,
}

impl<'ctx> CfgEmitter<'ctx> {
    pub fn new(
        function: FunctionValue<'ctx>,
        entry_block: BasicBlock<'ctx>,
        branch_taken_ref: PointerValue<'ctx>,
        next_pc_ref: PointerValue<'ctx>,
        memory_slot: PointerValue<'ctx>,
        memory_pointer_type: PointerType<'ctx>,
    ) -> Self {
        Self {
            function,
            exit_block: None,
            branch_taken_ref,
            next_pc_ref,
            memory_slot,
            memory_pointer_type,
            current_block: entry_block,
        }
    }

    pub fn current_block(&self) -> BasicBlock<'ctx> {
        self.current_block
    }

    /// The exit block, creating it (and its body — load the current memory
    /// pointer out of `memory_slot`, return it) on first reference. The
    /// builder's insertion point is restored to wherever it was before the
    /// call.
    fn exit_block(&mut self, context: &'ctx Context, builder: &Builder<'ctx>) -> Result<BasicBlock<'ctx>> {
        if let Some(block) = self.exit_block {
            return Ok(block);
        }
        let resume = builder.get_insert_block();
        let block = context.append_basic_block(self.function, "exit");
        builder.position_at_end(block);
        let memory = builder.build_load(self.memory_pointer_type, self.memory_slot, "exit_memory")?;
        builder.build_return(Some(&memory))?;
        if let Some(resume) = resume {
            builder.position_at_end(resume);
        }
        self.exit_block = Some(block);
        Ok(block)
    }

    /// Write `flag` (truncated/extended to i8) into the branch-taken cell.
    pub fn write_branch_taken(&self, builder: &Builder<'ctx>, flag: IntValue<'ctx>) -> Result<()> {
        let i8_type = flag.get_type().get_context().i8_type();
        let width = flag.get_type().get_bit_width();
        let narrowed = match width.cmp(&8) {
            std::cmp::Ordering::Equal => flag,
            std::cmp::Ordering::Greater => builder.build_int_truncate(flag, i8_type, "bt_trunc")?,
            std::cmp::Ordering::Less => builder.build_int_z_extend(flag, i8_type, "bt_zext")?,
        };
        builder.build_store(self.branch_taken_ref, narrowed)?;
        Ok(())
    }

    /// Store `target_value` into the next-PC cell; branch to the (lazily
    /// created) exit block if the current block lacks a terminator.
    pub fn redirect_control_flow(
        &mut self,
        context: &'ctx Context,
        builder: &Builder<'ctx>,
        target_value: IntValue<'ctx>,
    ) -> Result<()> {
        builder.build_store(self.next_pc_ref, target_value)?;
        if self.current_block.get_terminator().is_none() {
            let exit = self.exit_block(context, builder)?;
            builder.build_unconditional_branch(exit)?;
        }
        Ok(())
    }

    /// Split the current block: emit a conditional branch on `cond` to the
    /// exit block (true) or a new continuation block (false), which becomes
    /// the new current block.
    pub fn terminate_with_condition(
        &mut self,
        context: &'ctx Context,
        builder: &Builder<'ctx>,
        cond: IntValue<'ctx>,
    ) -> Result<()> {
        let exit = self.exit_block(context, builder)?;
        let continuation = context.append_basic_block(self.function, "continuation");
        builder.build_conditional_branch(cond, exit, continuation)?;
        builder.position_at_end(continuation);
        self.current_block = continuation;
        Ok(())
    }

    /// Terminate the current block if it isn't already: branch to the exit
    /// block if one was ever created (some op along the way branched), or
    /// return directly out of this block otherwise — keeping a
    /// control-flow-free instruction down to a single block with a single
    /// terminator. Called once, at the end of an instruction lift.
    pub fn finalize(&mut self, builder: &Builder<'ctx>) -> Result<()> {
        if self.current_block.get_terminator().is_some() {
            return Ok(());
        }
        match self.exit_block {
            Some(exit) => {
                builder.build_unconditional_branch(exit)?;
            }
            None => {
                let memory = builder.build_load(self.memory_pointer_type, self.memory_slot, "exit_memory")?;
                builder.build_return(Some(&memory))?;
            }
        }
        Ok(())
    }

    pub fn memory_slot(&self) -> PointerValue<'ctx> {
        self.memory_slot
    }

    pub fn next_pc_ref(&self) -> PointerValue<'ctx> {
        self.next_pc_ref
    }
}
