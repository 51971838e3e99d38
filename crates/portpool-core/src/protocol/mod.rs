//! Protocol module containing the message model, the frame codec, and the
//! raw-mode tagging format.

pub mod codec;
pub mod messages;
pub mod session_id;
pub mod tagging;

pub use codec::{decode_body, encode_frame, read_frame, write_frame, FrameError};
pub use messages::*;
pub use session_id::{SessionCounter, SessionId};
pub use tagging::{SessionTag, TagError, TaggedChunk};
