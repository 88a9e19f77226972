//! Shared mock collaborators for exercising `InstructionLifter` end to end.
//! A toy architecture: 32-bit word, registers named `r0`, `r1`, ... backed
//! by one alloca each (allocated lazily, on first reference, mirroring
//! `UniqueArena`'s own lazy-allocation shape), and memory modeled as a flat
//! byte space addressed through `inttoptr`.

use std::cell::RefCell;
use std::collections::HashMap;

use inkwell::AddressSpace as LlvmAddressSpace;
use inkwell::basic_block::BasicBlock;
use inkwell::builder::Builder;
use inkwell::context::Context;
use inkwell::types::BasicTypeEnum;
use inkwell::values::{BasicValueEnum, InstructionOpcode, InstructionValue, IntValue, Operand, PointerValue};

use pcode_lift::{AddressSpace, Decoder, HostArchitecture, IntrinsicsTable, Opcode, PcodeOp, Result, Varnode};

/// Count instructions of `opcode` in `block`.
pub fn count_opcode(block: BasicBlock<'_>, opcode: InstructionOpcode) -> usize {
    block.get_instructions().filter(|i| i.get_opcode() == opcode).count()
}

pub fn operand_value<'ctx>(instr: InstructionValue<'ctx>, i: u32) -> Option<BasicValueEnum<'ctx>> {
    instr.get_operand(i).and_then(Operand::value)
}

pub fn operand_block<'ctx>(instr: InstructionValue<'ctx>, i: u32) -> Option<BasicBlock<'ctx>> {
    instr.get_operand(i).and_then(Operand::block)
}

/// The single `icmp` instruction in `block`, and its predicate.
pub fn icmp_predicate(block: BasicBlock<'_>) -> Option<inkwell::IntPredicate> {
    block
        .get_instructions()
        .find(|i| i.get_opcode() == InstructionOpcode::ICmp)
        .and_then(|i| i.get_icmp_predicate())
}

pub const WORD_BITS: u32 = 32;

/// A register varnode named `r{index}` at `size` bytes.
pub fn reg(index: u64, size: u8) -> Varnode {
    Varnode::new(AddressSpace::Register, index, size)
}

pub fn unique(offset: u64, size: u8) -> Varnode {
    Varnode::new(AddressSpace::Unique, offset, size)
}

/// A decoder that ignores `pc`/`bytes` and always returns the same scripted
/// p-code sequence — the core under test never inspects raw bytes itself.
pub struct ScriptedDecoder {
    ops: Vec<PcodeOp>,
    user_ops: Vec<String>,
    decode_calls: RefCell<u32>,
}

impl ScriptedDecoder {
    pub fn new(ops: Vec<PcodeOp>) -> Self {
        Self {
            ops,
            user_ops: vec!["claim_eq".to_string()],
            decode_calls: RefCell::new(0),
        }
    }

    pub fn decode_call_count(&self) -> u32 {
        *self.decode_calls.borrow()
    }
}

impl Decoder for ScriptedDecoder {
    fn decode(&mut self, _pc: u64, _bytes: &[u8]) -> Result<Vec<PcodeOp>> {
        *self.decode_calls.borrow_mut() += 1;
        Ok(self.ops.clone())
    }

    fn register_name(&self, space: AddressSpace, offset: u64, _size: u8) -> Option<String> {
        match space {
            AddressSpace::Register => Some(format!("r{offset}")),
            _ => None,
        }
    }

    fn user_op_names(&self) -> &[String] {
        &self.user_ops
    }

    fn reset(&mut self) {}
}

/// A decoder that always fails, for the `Invalid` status path.
pub struct FailingDecoder;

impl Decoder for FailingDecoder {
    fn decode(&mut self, _pc: u64, _bytes: &[u8]) -> Result<Vec<PcodeOp>> {
        Err(pcode_lift::LiftError::invalid("no instruction at this address"))
    }

    fn register_name(&self, _space: AddressSpace, _offset: u64, _size: u8) -> Option<String> {
        None
    }

    fn user_op_names(&self) -> &[String] {
        &[]
    }

    fn reset(&mut self) {}
}

/// A trivial instruction body: one opcode, no inputs/output, for tests that
/// only care about decode-time behavior.
pub fn nop_ops() -> Vec<PcodeOp> {
    vec![PcodeOp::new(0, Opcode::Copy, Some(reg(0, 4)), vec![reg(0, 4)])]
}

pub struct MockArchitecture<'ctx> {
    context: &'ctx Context,
    known: Vec<String>,
    registers: RefCell<HashMap<String, (PointerValue<'ctx>, u32)>>,
    remappings: HashMap<String, String>,
}

impl<'ctx> MockArchitecture<'ctx> {
    pub fn new(context: &'ctx Context, known_registers: &[&str]) -> Self {
        Self {
            context,
            known: known_registers.iter().map(|s| (*s).to_string()).collect(),
            registers: RefCell::new(HashMap::new()),
            remappings: HashMap::new(),
        }
    }
}

impl<'ctx> HostArchitecture<'ctx> for MockArchitecture<'ctx> {
    fn has_register(&self, name: &str) -> bool {
        self.known.iter().any(|known| known == name)
    }

    fn load_register_address(
        &self,
        builder: &Builder<'ctx>,
        _state_ptr: PointerValue<'ctx>,
        name: &str,
    ) -> Option<(PointerValue<'ctx>, u32)> {
        if !self.has_register(name) {
            return None;
        }
        if let Some(entry) = self.registers.borrow().get(name).copied() {
            return Some(entry);
        }
        let ty = self.context.custom_width_int_type(WORD_BITS);
        let ptr = builder.build_alloca(ty, name).ok()?;
        self.registers
            .borrow_mut()
            .insert(name.to_string(), (ptr, WORD_BITS));
        Some((ptr, WORD_BITS))
    }

    fn state_register_remappings(&self) -> &HashMap<String, String> {
        &self.remappings
    }

    fn word_width_bits(&self) -> u32 {
        WORD_BITS
    }

    fn memory_value_type(&self, context: &'ctx Context) -> BasicTypeEnum<'ctx> {
        // Must match `memory_pointer_type`'s type: the MEMORY slot is
        // always allocated (and the function's memory-pointer parameter
        // always typed) as an opaque pointer, never as this method's
        // return value in isolation, so the two have to agree or the
        // slot's load/store types mismatch its alloca type.
        context.ptr_type(LlvmAddressSpace::default()).into()
    }
}

/// Models memory as a flat byte space: the memory "handle" is an opaque
/// pointer carrying a base address, read/write go through `ptrtoint` /
/// `inttoptr` at `base + index` rather than `getelementptr` (this crate
/// denies `unsafe_code`, and indexed GEP is an unsafe builder call).
pub struct FlatMemoryIntrinsics<'ctx> {
    context: &'ctx Context,
}

impl<'ctx> FlatMemoryIntrinsics<'ctx> {
    pub fn new(context: &'ctx Context) -> Self {
        Self { context }
    }

    fn address(
        &self,
        builder: &Builder<'ctx>,
        memory: BasicValueEnum<'ctx>,
        index: IntValue<'ctx>,
    ) -> Result<PointerValue<'ctx>> {
        let addr_type = self.context.i64_type();
        let base_ptr = memory.into_pointer_value();
        let base = builder.build_ptr_to_int(base_ptr, addr_type, "mem_base")?;
        let index_width = index.get_type().get_bit_width();
        let index = match index_width.cmp(&64) {
            std::cmp::Ordering::Less => builder.build_int_z_extend(index, addr_type, "mem_index_zext")?,
            std::cmp::Ordering::Equal => index,
            std::cmp::Ordering::Greater => builder.build_int_truncate(index, addr_type, "mem_index_trunc")?,
        };
        let addr = builder.build_int_add(base, index, "mem_addr")?;
        let ptr_type = self.context.ptr_type(LlvmAddressSpace::default());
        Ok(builder.build_int_to_ptr(addr, ptr_type, "mem_ptr")?)
    }
}

impl<'ctx> IntrinsicsTable<'ctx> for FlatMemoryIntrinsics<'ctx> {
    fn load_from_memory(
        &self,
        builder: &Builder<'ctx>,
        value_type: BasicTypeEnum<'ctx>,
        memory: BasicValueEnum<'ctx>,
        index: IntValue<'ctx>,
    ) -> Result<BasicValueEnum<'ctx>> {
        let ptr = self.address(builder, memory, index)?;
        Ok(builder.build_load(value_type, ptr, "mem_load")?)
    }

    fn store_to_memory(
        &self,
        builder: &Builder<'ctx>,
        value: BasicValueEnum<'ctx>,
        memory: BasicValueEnum<'ctx>,
        index: IntValue<'ctx>,
    ) -> Result<BasicValueEnum<'ctx>> {
        let ptr = self.address(builder, memory, index)?;
        builder.build_store(ptr, value)?;
        Ok(memory)
    }
}
