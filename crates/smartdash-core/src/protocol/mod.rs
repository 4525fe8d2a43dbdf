//! Protocol module containing the envelope types, the JSON codec, and the
//! request-id counter.

pub mod codec;
pub mod messages;
pub mod sequence;

pub use codec::{decode_frame, encode_batch, encode_envelope, DecodedFrame, ProtocolError};
pub use messages::*;
pub use sequence::SequenceCounter;
