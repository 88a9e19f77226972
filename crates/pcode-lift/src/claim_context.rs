//! The `claim_eq` constant-substitution table. SLEIGH architecture
//! descriptions emit a `claim_eq` user-op to tell the lifter "this constant
//! really equals this other computed value"; recording and consuming that
//! claim is what lets `BRANCH`/`CBRANCH` targets reconstruct precisely
//! without post-hoc pattern matching.

use std::collections::{HashMap, HashSet};

use inkwell::builder::Builder;
use inkwell::context::Context;
use inkwell::types::BasicTypeEnum;
use inkwell::values::IntValue;

use crate::error::{LiftError, Result};
use crate::host::IntrinsicsTable;
use crate::value_location::ValueLocation;
use crate::varnode::{AddressSpace, Varnode};

pub struct ClaimContext<'ctx> {
    claims: HashMap<u64, ValueLocation<'ctx>>,
    consumed: HashSet<u64>,
}

impl<'ctx> ClaimContext<'ctx> {
    pub fn new() -> Self {
        Self {
            claims: HashMap::new(),
            consumed: HashSet::new(),
        }
    }

    /// Record `constant_varnode.offset -> location`. `location` is the
    /// already-resolved `ValueLocation` for the claim's value varnode (the
    /// caller, `OpLowerer`'s `CALLOTHER` handling, resolves it via
    /// `VarnodeResolver` before calling this).
    pub fn add_claim(&mut self, constant_varnode: Varnode, location: ValueLocation<'ctx>) -> Result<()> {
        if constant_varnode.space != AddressSpace::Const {
            return Err(LiftError::internal(
                "claim_eq's first input must be in constant space",
            ));
        }
        self.claims.insert(constant_varnode.offset, location);
        Ok(())
    }

    /// Discard all pending substitutions. Called whenever a p-code op is
    /// about to be lowered that is not itself a successful `claim_eq`.
    pub fn clear(&mut self) {
        self.claims.clear();
        self.consumed.clear();
    }

    /// Whether `offset` currently has a recorded substitution. Direct
    /// `BRANCH`/`CALL` lowering uses this to distinguish a claimed constant
    /// (a real target smuggled through constant space) from a bare p-code
    /// relative offset, which is out of scope.
    pub fn has_claim(&self, offset: u64) -> bool {
        self.claims.contains_key(&offset)
    }

    /// Resolve `varnode`'s offset through any recorded claim, or fall back
    /// to the literal constant `varnode.offset` at `expected_width_bits`.
    pub fn resolve_offset(
        &mut self,
        builder: &Builder<'ctx>,
        context: &'ctx Context,
        varnode: Varnode,
        expected_width_bits: u32,
        intrinsics: &dyn IntrinsicsTable<'ctx>,
    ) -> Result<IntValue<'ctx>> {
        let ty = context.custom_width_int_type(expected_width_bits);
        if let Some(location) = self.claims.get(&varnode.offset).copied() {
            if self.consumed.contains(&varnode.offset) {
                tracing::debug!(
                    offset = varnode.offset,
                    "claim_eq substitution re-resolved after being consumed"
                );
            }
            self.consumed.insert(varnode.offset);
            let value = location.read(builder, BasicTypeEnum::IntType(ty), intrinsics)?;
            return match value {
                inkwell::values::BasicValueEnum::IntValue(iv) => Ok(iv),
                _ => Err(LiftError::internal(
                    "claimed location did not resolve to an integer value",
                )),
            };
        }
        Ok(ty.const_int(varnode.offset, false))
    }
}

impl Default for ClaimContext<'_> {
    fn default() -> Self {
        Self::new()
    }
}
