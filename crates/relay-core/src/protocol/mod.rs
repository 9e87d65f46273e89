//! Protocol module containing the frame model, reassembly, close payloads and
//! the broadcast text format.

pub mod accumulator;
pub mod broadcast;
pub mod close;
pub mod error;
pub mod frame;

pub use accumulator::{AssembledMessage, FrameAccumulator, DEFAULT_MAX_MESSAGE_SIZE};
pub use broadcast::{decode_text, format_broadcast};
pub use close::CloseStatus;
pub use error::ProtocolError;
pub use frame::{Frame, MessageKind};
