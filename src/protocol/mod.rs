//! Wire protocol: framing, inbound validation, outbound shapes (§4.1, §4.2, §6).

pub mod envelope;
pub mod frame;
pub mod validation;

pub use envelope::Outbound;
pub use frame::{Frame, FrameCodec, FrameError, MAX_FRAME_BYTES};
pub use validation::{MessageValidator, ValidationError};
