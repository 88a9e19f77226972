#![allow(
    clippy::cast_possible_truncation,
    clippy::cast_possible_wrap,
    clippy::cast_sign_loss,
    clippy::too_many_lines,
    clippy::missing_errors_doc
)]

mod cfg_emitter;
mod claim_context;
mod error;
mod host;
mod lifter;
mod op_lowerer;
mod pcode;
mod unique_arena;
mod value_location;
mod varnode;
mod varnode_resolver;

pub use error::{LiftError, LiftStatus, Result, StatusTracker};
pub use host::{BranchTakenDescriptor, Decoder, HostArchitecture, IntrinsicsTable};
pub use lifter::InstructionLifter;
pub use pcode::{Opcode, PcodeOp};
pub use value_location::ValueLocation;
pub use varnode::{AddressSpace, Varnode};
