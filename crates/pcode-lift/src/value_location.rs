//! The abstract read/write site backing a varnode. Generalizes the "one
//! alloca slot per local" pattern (`llvm_frontend/function_builder.rs::locals`)
//! to the four backing stores p-code varnodes can resolve to.

use inkwell::builder::Builder;
use inkwell::context::Context;
use inkwell::types::BasicTypeEnum;
use inkwell::values::{BasicValueEnum, IntValue, PointerValue};

use crate::error::{LiftError, Result};
use crate::host::IntrinsicsTable;

/// A read/write site for a varnode's value.
#[derive(Clone, Copy)]
pub enum ValueLocation<'ctx> {
    /// A stable pointer into host state, at a fixed declared width.
    Register {
        ptr: PointerValue<'ctx>,
        width_bits: u32,
    },
    /// A reference to the memory-pointer cell plus a byte offset; the
    /// width read/written is decided at each call site (the output
    /// varnode's width), not fixed on construction.
    Memory {
        memory_slot: PointerValue<'ctx>,
        memory_type: BasicTypeEnum<'ctx>,
        offset: IntValue<'ctx>,
    },
    /// An already-materialized IR value: either a literal constant, or a
    /// `claim_eq` substitution that was resolved to some other location's
    /// current value at resolve time.
    Constant(BasicValueEnum<'ctx>),
    /// A pointer into `UniqueArena`, at a fixed declared width.
    Scratch {
        ptr: PointerValue<'ctx>,
        width_bits: u32,
    },
}

impl<'ctx> ValueLocation<'ctx> {
    /// Read this location's current value at `requested`. Fails only for
    /// `Constant` when `requested` does not match the value's declared
    /// type (every other variant reads at its own fixed/derived width).
    pub fn read(
        &self,
        builder: &Builder<'ctx>,
        requested: BasicTypeEnum<'ctx>,
        intrinsics: &dyn IntrinsicsTable<'ctx>,
    ) -> Result<BasicValueEnum<'ctx>> {
        match *self {
            ValueLocation::Register { ptr, .. } | ValueLocation::Scratch { ptr, .. } => {
                Ok(builder.build_load(requested, ptr, "loc_read")?)
            }
            ValueLocation::Memory {
                memory_slot,
                memory_type,
                offset,
            } => {
                let memory = builder.build_load(memory_type, memory_slot, "mem_cur")?;
                intrinsics.load_from_memory(builder, requested, memory, offset)
            }
            ValueLocation::Constant(value) => {
                if value.get_type() == requested {
                    Ok(value)
                } else {
                    Err(LiftError::unsupported(
                        "constant read at a type incompatible with its declared type",
                    ))
                }
            }
        }
    }

    /// Write `value` to this location. `Constant` always fails.
    pub fn write(
        &self,
        builder: &Builder<'ctx>,
        value: BasicValueEnum<'ctx>,
        intrinsics: &dyn IntrinsicsTable<'ctx>,
    ) -> Result<()> {
        match *self {
            ValueLocation::Register { ptr, .. } | ValueLocation::Scratch { ptr, .. } => {
                builder.build_store(ptr, value)?;
                Ok(())
            }
            ValueLocation::Memory {
                memory_slot,
                memory_type,
                offset,
            } => {
                let memory = builder.build_load(memory_type, memory_slot, "mem_cur")?;
                let new_memory = intrinsics.store_to_memory(builder, value, memory, offset)?;
                builder.build_store(memory_slot, new_memory)?;
                Ok(())
            }
            ValueLocation::Constant(_) => Err(LiftError::unsupported("cannot write to a constant")),
        }
    }

    /// The declared width of this location in bits, where meaningful
    /// (`Memory` has none of its own — its width is decided per access).
    pub fn width_bits(&self, context: &'ctx Context) -> Option<u32> {
        match *self {
            ValueLocation::Register { width_bits, .. }
            | ValueLocation::Scratch { width_bits, .. } => Some(width_bits),
            ValueLocation::Memory { .. } => None,
            ValueLocation::Constant(value) => int_bit_width(value, context),
        }
    }
}

fn int_bit_width<'ctx>(value: BasicValueEnum<'ctx>, _context: &'ctx Context) -> Option<u32> {
    match value {
        BasicValueEnum::IntValue(v) => Some(v.get_type().get_bit_width()),
        _ => None,
    }
}
