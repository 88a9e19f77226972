//! Per-instruction scratch allocation for SLEIGH's "unique" space, and the
//! fallback home for register-space varnodes the host architecture does
//! not recognize. Grounded on the alloca-per-local-slot pattern in
//! `translate_function`, keyed here by varnode offset / register name
//! instead of by local index.

use std::collections::HashMap;

use inkwell::builder::Builder;
use inkwell::context::Context;
use inkwell::values::PointerValue;

use crate::error::Result;

/// Lazily allocates one scratch cell per unique-space offset (or unknown
/// register name), for the duration of a single instruction lift.
pub struct UniqueArena<'ctx> {
    context: &'ctx Context,
    cells: HashMap<u64, (PointerValue<'ctx>, u32)>,
    unknown_registers: HashMap<String, (PointerValue<'ctx>, u32)>,
}

impl<'ctx> UniqueArena<'ctx> {
    pub fn new(context: &'ctx Context) -> Self {
        Self {
            context,
            cells: HashMap::new(),
            unknown_registers: HashMap::new(),
        }
    }

    /// Clear all scratch cells. Called once per instruction lift, before
    /// lowering that instruction's p-code.
    pub fn clear(&mut self) {
        self.cells.clear();
        self.unknown_registers.clear();
    }

    /// The scratch cell backing a unique-space offset, allocating it (at
    /// `width_bits`) on first reference. Later references ignore the
    /// requested width — the first allocation's width is sticky, per the
    /// data-model invariant.
    pub fn cell(
        &mut self,
        builder: &Builder<'ctx>,
        offset: u64,
        width_bits: u32,
    ) -> Result<PointerValue<'ctx>> {
        if let Some((ptr, _)) = self.cells.get(&offset) {
            return Ok(*ptr);
        }
        let ty = self.context.custom_width_int_type(width_bits);
        let name = format!("unique_{offset:x}:{}", width_bits / 8);
        let ptr = builder.build_alloca(ty, &name)?;
        self.cells.insert(offset, (ptr, width_bits));
        Ok(ptr)
    }

    /// The scratch cell backing an unrecognized register name, allocating
    /// it on first reference.
    pub fn unknown_register(
        &mut self,
        builder: &Builder<'ctx>,
        name: &str,
        width_bits: u32,
    ) -> Result<PointerValue<'ctx>> {
        if let Some((ptr, _)) = self.unknown_registers.get(name) {
            return Ok(*ptr);
        }
        let ty = self.context.custom_width_int_type(width_bits);
        let alloca_name = format!("unknown_reg_{name}");
        let ptr = builder.build_alloca(ty, &alloca_name)?;
        self.unknown_registers
            .insert(name.to_string(), (ptr, width_bits));
        Ok(ptr)
    }
}
