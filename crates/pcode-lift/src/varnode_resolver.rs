//! Address-space dispatch from a `Varnode` to a `ValueLocation`. Grounded
//! on the `LocalGet`/`GlobalGet` resolution in `translate_operator`
//! (`llvm_frontend/function_builder.rs`), generalized from two WASM
//! storage kinds to p-code's four address spaces.

use inkwell::builder::Builder;
use inkwell::context::Context;
use inkwell::values::PointerValue;

use crate::claim_context::ClaimContext;
use crate::error::{LiftError, Result};
use crate::host::{Decoder, HostArchitecture, IntrinsicsTable};
use crate::unique_arena::UniqueArena;
use crate::value_location::ValueLocation;
use crate::varnode::{AddressSpace, Varnode};

pub struct VarnodeResolver;

impl VarnodeResolver {
    /// Resolve `varnode` to the `ValueLocation` that backs it. Any address
    /// space outside `{ram, register, const, unique}` is fatal: the core
    /// does not attempt recovery.
    #[allow(clippy::too_many_arguments)]
    pub fn resolve<'ctx>(
        context: &'ctx Context,
        builder: &Builder<'ctx>,
        state_ptr: PointerValue<'ctx>,
        memory_slot: PointerValue<'ctx>,
        arch: &dyn HostArchitecture<'ctx>,
        decoder: &dyn Decoder,
        unique: &mut UniqueArena<'ctx>,
        claims: &mut ClaimContext<'ctx>,
        intrinsics: &dyn IntrinsicsTable<'ctx>,
        varnode: Varnode,
    ) -> Result<ValueLocation<'ctx>> {
        match varnode.space {
            AddressSpace::Ram => {
                let word_bits = arch.word_width_bits();
                let offset = claims.resolve_offset(builder, context, varnode, word_bits, intrinsics)?;
                Ok(ValueLocation::Memory {
                    memory_slot,
                    memory_type: arch.memory_value_type(context),
                    offset,
                })
            }
            AddressSpace::Register => {
                let raw_name = decoder
                    .register_name(varnode.space, varnode.offset, varnode.size)
                    .unwrap_or_default();
                let canonical = arch
                    .state_register_remappings()
                    .get(&raw_name)
                    .cloned()
                    .unwrap_or(raw_name);

                if arch.has_register(&canonical) {
                    let (ptr, width_bits) = arch
                        .load_register_address(builder, state_ptr, &canonical)
                        .ok_or_else(|| {
                            LiftError::internal(format!(
                                "host claims to recognize register {canonical} but would not address it"
                            ))
                        })?;
                    Ok(ValueLocation::Register { ptr, width_bits })
                } else {
                    let width_bits = varnode.bits();
                    let ptr = unique.unknown_register(builder, &canonical, width_bits)?;
                    Ok(ValueLocation::Scratch { ptr, width_bits })
                }
            }
            AddressSpace::Const => {
                let width_bits = varnode.bits();
                let value =
                    claims.resolve_offset(builder, context, varnode, width_bits, intrinsics)?;
                Ok(ValueLocation::Constant(value.into()))
            }
            AddressSpace::Unique => {
                let width_bits = varnode.bits();
                let ptr = unique.cell(builder, varnode.offset, width_bits)?;
                Ok(ValueLocation::Scratch { ptr, width_bits })
            }
            AddressSpace::Other => {
                panic!(
                    "varnode resolution requested for an unsupported address space at offset {:#x}; \
                     this indicates a decoder/architecture mismatch, not runtime data",
                    varnode.offset
                );
            }
        }
    }
}
