//! Cross-cutting invariants: error/status mapping, the float short-circuit,
//! unsupported-opcode handling, claim-clearing semantics, idempotence, and
//! width-identity edge cases that must not emit a redundant instruction.

mod support;

use inkwell::IntPredicate;
use inkwell::context::Context;
use inkwell::values::InstructionOpcode;

use pcode_lift::{AddressSpace, InstructionLifter, LiftStatus, Opcode, PcodeOp, Varnode};

use support::{
    FailingDecoder, FlatMemoryIntrinsics, MockArchitecture, ScriptedDecoder, count_opcode, icmp_predicate, nop_ops,
    reg,
};

/// A decoder that cannot decode at all maps to `Invalid`, with no function
/// emitted — there is nothing to attach partial IR to.
#[test]
fn decode_failure_yields_invalid_status_and_no_function() {
    let context = Context::create();
    let module = context.create_module("decode_failure");
    let mut decoder = FailingDecoder;
    let arch = MockArchitecture::new(&context, &[]);
    let intrinsics = FlatMemoryIntrinsics::new(&context);
    let mut lifter = InstructionLifter::new(&mut decoder, &arch, &intrinsics);

    let (status, function) = lifter.lift(&context, &module, 0x1000, &[], None);

    assert_eq!(status, LiftStatus::Invalid);
    assert!(function.is_none());
}

/// Any floating-point opcode anywhere in the p-code short-circuits the
/// whole instruction before a function is even created.
#[test]
fn floating_point_opcode_short_circuits_before_function_creation() {
    let context = Context::create();
    let module = context.create_module("float_short_circuit");
    let ops = vec![
        PcodeOp::new(0, Opcode::Copy, Some(reg(1, 4)), vec![reg(0, 4)]),
        PcodeOp::new(1, Opcode::FloatAbs, Some(reg(2, 4)), vec![reg(1, 4)]),
    ];
    let mut decoder = ScriptedDecoder::new(ops);
    let arch = MockArchitecture::new(&context, &["r0", "r1", "r2"]);
    let intrinsics = FlatMemoryIntrinsics::new(&context);
    let mut lifter = InstructionLifter::new(&mut decoder, &arch, &intrinsics);

    let (status, function) = lifter.lift(&context, &module, 0x1000, &[0x01], None);

    assert_eq!(status, LiftStatus::Unsupported);
    assert!(function.is_none(), "short-circuit happens before the function is added to the module");
    assert_eq!(module.get_functions().count(), 0);
}

/// CPOOLREF/NEW/INDIRECT are unsupported, but unlike the float
/// short-circuit this is discovered mid-lowering, after the function
/// already exists: the caller still gets `Some(function)` back.
#[test]
fn variadic_placeholder_opcodes_are_unsupported_but_still_emit_a_function() {
    let context = Context::create();
    let module = context.create_module("variadic");
    let ops = vec![PcodeOp::new(0, Opcode::Cpoolref, Some(reg(1, 4)), vec![reg(0, 4)])];
    let mut decoder = ScriptedDecoder::new(ops);
    let arch = MockArchitecture::new(&context, &["r0", "r1"]);
    let intrinsics = FlatMemoryIntrinsics::new(&context);
    let mut lifter = InstructionLifter::new(&mut decoder, &arch, &intrinsics);

    let (status, function) = lifter.lift(&context, &module, 0x1000, &[0x01], None);

    assert_eq!(status, LiftStatus::Unsupported);
    assert!(function.is_some(), "the function shell is always produced once decode succeeds");
}

/// A fatal address space (`Other`) is a decoder/architecture mismatch, not
/// recoverable runtime data: it panics rather than returning a `Result`.
#[test]
fn resolving_an_other_space_varnode_panics() {
    let context = Context::create();
    let module = context.create_module("other_space");
    let bogus = Varnode::new(AddressSpace::Other, 0, 4);
    let ops = vec![PcodeOp::new(0, Opcode::Copy, Some(reg(0, 4)), vec![bogus])];
    let mut decoder = ScriptedDecoder::new(ops);
    let arch = MockArchitecture::new(&context, &["r0"]);
    let intrinsics = FlatMemoryIntrinsics::new(&context);

    let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        let mut lifter = InstructionLifter::new(&mut decoder, &arch, &intrinsics);
        lifter.lift(&context, &module, 0x1000, &[0x01], None)
    }));

    assert!(result.is_err(), "an Other-space varnode must panic, not degrade gracefully");
}

/// A claim set by `claim_eq` survives into exactly the op immediately
/// following it; an unrelated op interposed between the claim and its
/// would-be consumer clears it first, so the branch sees an ordinary
/// unclaimed constant and is rejected.
#[test]
fn a_claim_does_not_survive_past_the_op_immediately_following_it() {
    let context = Context::create();
    let module = context.create_module("claim_expiry");
    let claimed_constant = Varnode::constant(0xBEEF, 4);
    let ops = vec![
        PcodeOp::new(
            0,
            Opcode::CallOther,
            None,
            vec![Varnode::constant(0, 4), claimed_constant, reg(1, 4)],
        ),
        PcodeOp::new(1, Opcode::Copy, Some(reg(1, 4)), vec![reg(1, 4)]),
        PcodeOp::new(2, Opcode::Branch, None, vec![claimed_constant]),
    ];
    let mut decoder = ScriptedDecoder::new(ops);
    let arch = MockArchitecture::new(&context, &["r1"]);
    let intrinsics = FlatMemoryIntrinsics::new(&context);
    let mut lifter = InstructionLifter::new(&mut decoder, &arch, &intrinsics);

    let (status, _function) = lifter.lift(&context, &module, 0x1000, &[0x01], None);

    assert_eq!(
        status, LiftStatus::Unsupported,
        "the interposed COPY consumes the claim window, leaving BRANCH with a bare constant"
    );
}

/// Lifting the same `(pc, bytes)` twice, into two independent modules,
/// produces structurally identical IR: same block count, same per-block
/// opcode histogram.
#[test]
fn lifting_the_same_instruction_twice_is_idempotent() {
    fn lift_once() -> (LiftStatus, Vec<usize>) {
        let context = Context::create();
        let module = context.create_module("idempotence");
        let ops = vec![PcodeOp::new(
            0,
            Opcode::IntAdd,
            Some(reg(2, 4)),
            vec![reg(0, 4), reg(1, 4)],
        )];
        let mut decoder = ScriptedDecoder::new(ops);
        let arch = MockArchitecture::new(&context, &["r0", "r1", "r2"]);
        let intrinsics = FlatMemoryIntrinsics::new(&context);
        let mut lifter = InstructionLifter::new(&mut decoder, &arch, &intrinsics);

        let (status, function) = lifter.lift(&context, &module, 0x9000, &[0x01], None);
        let function = function.expect("function always emitted");
        let shape = function
            .get_basic_blocks()
            .iter()
            .map(|block| block.get_instructions().count())
            .collect();
        (status, shape)
    }

    let (status_a, shape_a) = lift_once();
    let (status_b, shape_b) = lift_once();
    assert_eq!(status_a, status_b);
    assert_eq!(shape_a, shape_b);
}

/// INT_ZEXT/INT_SEXT at equal input/output width is an identity: no
/// extend instruction is emitted, only the load/store pair.
#[test]
fn zext_at_equal_width_emits_no_extend_instruction() {
    let context = Context::create();
    let module = context.create_module("zext_identity");
    let ops = vec![PcodeOp::new(0, Opcode::IntZext, Some(reg(1, 4)), vec![reg(0, 4)])];
    let mut decoder = ScriptedDecoder::new(ops);
    let arch = MockArchitecture::new(&context, &["r0", "r1"]);
    let intrinsics = FlatMemoryIntrinsics::new(&context);
    let mut lifter = InstructionLifter::new(&mut decoder, &arch, &intrinsics);

    let (status, function) = lifter.lift(&context, &module, 0x1000, &[0x01], None);

    assert_eq!(status, LiftStatus::Lifted);
    let entry = function.expect("function always emitted").get_basic_blocks()[0];
    assert_eq!(count_opcode(entry, InstructionOpcode::ZExt), 0);
    assert_eq!(count_opcode(entry, InstructionOpcode::SExt), 0);
    assert_eq!(count_opcode(entry, InstructionOpcode::Load), 2, "register read + final memory load");
}

/// SUBPIECE at `byte_offset = 0` with an output the same size as the
/// source is an identity truncate: no `trunc` instruction is emitted.
#[test]
fn subpiece_identity_case_emits_no_truncate() {
    let context = Context::create();
    let module = context.create_module("subpiece_identity");
    let ops = vec![PcodeOp::new(
        0,
        Opcode::Subpiece,
        Some(reg(1, 4)),
        vec![reg(0, 4), Varnode::constant(0, 4)],
    )];
    let mut decoder = ScriptedDecoder::new(ops);
    let arch = MockArchitecture::new(&context, &["r0", "r1"]);
    let intrinsics = FlatMemoryIntrinsics::new(&context);
    let mut lifter = InstructionLifter::new(&mut decoder, &arch, &intrinsics);

    let (status, function) = lifter.lift(&context, &module, 0x1000, &[0x01], None);

    assert_eq!(status, LiftStatus::Lifted);
    let entry = function.expect("function always emitted").get_basic_blocks()[0];
    assert_eq!(count_opcode(entry, InstructionOpcode::Trunc), 0);
}

/// SUBPIECE at a nonzero byte offset must shift the source right before
/// truncating, not just narrow the low bits — the slice starts at that
/// offset, it isn't always the bottom of the source.
#[test]
fn subpiece_nonzero_offset_shifts_before_truncating() {
    let context = Context::create();
    let module = context.create_module("subpiece_shifted");
    let ops = vec![PcodeOp::new(
        0,
        Opcode::Subpiece,
        Some(reg(1, 1)),
        vec![reg(0, 4), Varnode::constant(1, 4)],
    )];
    let mut decoder = ScriptedDecoder::new(ops);
    let arch = MockArchitecture::new(&context, &["r0", "r1"]);
    let intrinsics = FlatMemoryIntrinsics::new(&context);
    let mut lifter = InstructionLifter::new(&mut decoder, &arch, &intrinsics);

    let (status, function) = lifter.lift(&context, &module, 0x1000, &[0x01], None);

    assert_eq!(status, LiftStatus::Lifted);
    let entry = function.expect("function always emitted").get_basic_blocks()[0];
    let shr = entry
        .get_instructions()
        .find(|i| i.get_opcode() == InstructionOpcode::LShr)
        .expect("nonzero byte offset lowers through a logical shift right");
    let amount = support::operand_value(shr, 1)
        .expect("shr has a shift-amount operand")
        .into_int_value();
    assert_eq!(
        amount.get_zero_extended_constant(),
        Some(8),
        "byte offset 1 shifts right by 8 bits before truncating to the 1-byte output"
    );
    assert_eq!(count_opcode(entry, InstructionOpcode::Trunc), 1);
}

/// Every integer comparison writes its i1 result zero-extended to an i8
/// boolean output, regardless of which predicate produced it.
#[test]
fn int_equal_result_is_zero_extended_to_i8() {
    let context = Context::create();
    let module = context.create_module("int_equal");
    let ops = vec![PcodeOp::new(
        0,
        Opcode::IntEqual,
        Some(reg(2, 1)),
        vec![reg(0, 4), reg(1, 4)],
    )];
    let mut decoder = ScriptedDecoder::new(ops);
    let arch = MockArchitecture::new(&context, &["r0", "r1", "r2"]);
    let intrinsics = FlatMemoryIntrinsics::new(&context);
    let mut lifter = InstructionLifter::new(&mut decoder, &arch, &intrinsics);

    let (status, function) = lifter.lift(&context, &module, 0x1000, &[0x01], None);

    assert_eq!(status, LiftStatus::Lifted);
    let entry = function.expect("function always emitted").get_basic_blocks()[0];
    assert_eq!(count_opcode(entry, InstructionOpcode::ICmp), 1);
    assert_eq!(count_opcode(entry, InstructionOpcode::ZExt), 1, "i1 -> i8 bool widening");
}

/// INT_LESSEQUAL and INT_SLESSEQUAL are swapped relative to their names in
/// the reference encoding: INT_LESSEQUAL must compile to the *unsigned*
/// predicate, INT_SLESSEQUAL to the *signed* one.
#[test]
fn lessequal_and_slessequal_use_the_corrected_predicates() {
    fn cmp_predicate(opcode: Opcode) -> IntPredicate {
        let context = Context::create();
        let module = context.create_module("lessequal");
        let ops = vec![PcodeOp::new(0, opcode, Some(reg(2, 1)), vec![reg(0, 4), reg(1, 4)])];
        let mut decoder = ScriptedDecoder::new(ops);
        let arch = MockArchitecture::new(&context, &["r0", "r1", "r2"]);
        let intrinsics = FlatMemoryIntrinsics::new(&context);
        let mut lifter = InstructionLifter::new(&mut decoder, &arch, &intrinsics);

        let (status, function) = lifter.lift(&context, &module, 0x1000, &[0x01], None);
        assert_eq!(status, LiftStatus::Lifted);
        let entry = function.expect("function always emitted").get_basic_blocks()[0];
        icmp_predicate(entry).expect("comparison lowers through icmp")
    }

    assert_eq!(cmp_predicate(Opcode::IntLessequal), IntPredicate::ULE);
    assert_eq!(cmp_predicate(Opcode::IntSlessequal), IntPredicate::SLE);
}

/// One `lift` call decodes exactly once, even across two separate calls
/// on the same `InstructionLifter` — there is no hidden retry or
/// speculative re-decode.
#[test]
fn lift_decodes_exactly_once_per_call() {
    let context = Context::create();
    let module = context.create_module("decode_once");
    let mut decoder = ScriptedDecoder::new(nop_ops());
    let arch = MockArchitecture::new(&context, &["r0"]);
    let intrinsics = FlatMemoryIntrinsics::new(&context);
    let mut lifter = InstructionLifter::new(&mut decoder, &arch, &intrinsics);

    let (status, function) = lifter.lift(&context, &module, 0x1000, &[0x01], None);
    assert_eq!(status, LiftStatus::Lifted);
    assert!(function.is_some());
    let (status, function) = lifter.lift(&context, &module, 0x1004, &[0x01], None);
    assert_eq!(status, LiftStatus::Lifted);
    assert!(function.is_some());

    drop(lifter);
    assert_eq!(decoder.decode_call_count(), 2);
}
