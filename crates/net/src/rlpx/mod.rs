//! The RLPx session layer: ECIES handshake and framed, MAC-chained
//! transport.

mod ecies;
pub use ecies::{ecies_decrypt, ecies_encrypt};

mod handshake;
pub use handshake::{
    InitiatorHandshake, ResponderHandshake, SessionSecrets, ACK_PACKET_LEN, AUTH_PACKET_LEN,
};

mod frame;
pub use frame::{FrameCodec, FrameDecoder, FrameEncoder, HEADER_WIRE_LEN, MAC_LEN};
