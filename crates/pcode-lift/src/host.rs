//! The external collaborators this core consumes, modeled as traits so it
//! has no concrete dependency on any one disassembler or architecture
//! description. Test code implements these with small mocks; a real
//! driver backs them with a SLEIGH binding and a register file layout.

use inkwell::AddressSpace as LlvmAddressSpace;
use inkwell::builder::Builder;
use inkwell::context::Context;
use inkwell::types::{BasicTypeEnum, IntType, PointerType};
use inkwell::values::{BasicValueEnum, IntValue, PointerValue};
use std::collections::HashMap;

use crate::error::Result;
use crate::pcode::PcodeOp;
use crate::varnode::AddressSpace;

/// Consumed from the decoder: turns instruction bytes into p-code, and
/// answers naming questions the core needs while resolving varnodes.
pub trait Decoder {
    /// Decode the instruction at `pc` backed by `bytes`, returning its
    /// p-code ops in program order.
    fn decode(&mut self, pc: u64, bytes: &[u8]) -> Result<Vec<PcodeOp>>;

    /// The canonical register name for a `(space, offset, size)` triple, or
    /// `None` if the decoder does not recognize it as a register.
    fn register_name(&self, space: AddressSpace, offset: u64, size: u8) -> Option<String>;

    /// The ordered list of user-op names a `CALLOTHER`'s first input
    /// indexes into.
    fn user_op_names(&self) -> &[String];

    /// Reset any internal decode context. Called at the start of every
    /// instruction lift.
    fn reset(&mut self);
}

/// Consumed from the host architecture: register-file layout and the
/// handful of IR types the emitted function's signature needs.
pub trait HostArchitecture<'ctx> {
    /// Whether the host state recognizes a register of this canonical name.
    fn has_register(&self, name: &str) -> bool;

    /// The address (and declared width, in bits) of a known register
    /// within the host state, as a pointer into `state_ptr`.
    fn load_register_address(
        &self,
        builder: &Builder<'ctx>,
        state_ptr: PointerValue<'ctx>,
        name: &str,
    ) -> Option<(PointerValue<'ctx>, u32)>;

    /// Architecture-specific aliases, e.g. mapping a decoder's register
    /// name to the host state's canonical name for it.
    fn state_register_remappings(&self) -> &HashMap<String, String>;

    /// The host's natural pointer-sized integer width, in bits.
    fn word_width_bits(&self) -> u32;

    fn word_type(&self, context: &'ctx Context) -> IntType<'ctx> {
        context.custom_width_int_type(self.word_width_bits())
    }

    fn state_pointer_type(&self, context: &'ctx Context) -> PointerType<'ctx> {
        context.ptr_type(LlvmAddressSpace::default())
    }

    fn memory_pointer_type(&self, context: &'ctx Context) -> PointerType<'ctx> {
        context.ptr_type(LlvmAddressSpace::default())
    }

    /// The type the memory-pointer cell itself stores (what gets loaded out
    /// of / stored into the `MEMORY` scratch slot between intrinsic calls).
    fn memory_value_type(&self, context: &'ctx Context) -> BasicTypeEnum<'ctx>;
}

/// Consumed from the intrinsics table: the external memory-read/write
/// primitives `ValueLocation::Memory` calls through.
pub trait IntrinsicsTable<'ctx> {
    fn load_from_memory(
        &self,
        builder: &Builder<'ctx>,
        value_type: BasicTypeEnum<'ctx>,
        memory: BasicValueEnum<'ctx>,
        index: IntValue<'ctx>,
    ) -> Result<BasicValueEnum<'ctx>>;

    fn store_to_memory(
        &self,
        builder: &Builder<'ctx>,
        value: BasicValueEnum<'ctx>,
        memory: BasicValueEnum<'ctx>,
        index: IntValue<'ctx>,
    ) -> Result<BasicValueEnum<'ctx>>;
}

/// Identifies the p-code index at which the lifter should write the
/// branch-taken side channel, and which varnode holds that flag's value.
#[derive(Debug, Clone, Copy)]
pub struct BranchTakenDescriptor {
    pub pcode_index: u32,
    pub varnode: crate::varnode::Varnode,
}
