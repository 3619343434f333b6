//! # radius-proto
//!
//! Serialization, deserialization and cryptographic validation of RADIUS
//! ([RFC2865]/[RFC2866]) packets: header framing, ordered attribute lists,
//! request/response authenticators, the Message-Authenticator attribute
//! ([RFC2869]) and password hiding.
//!
//! This crate is transport-agnostic; moving packets over UDP, TCP or TLS is
//! the job of a client or server built on top of it.
//!
//! [RFC2865]: https://www.rfc-editor.org/rfc/rfc2865
//! [RFC2866]: https://www.rfc-editor.org/rfc/rfc2866
//! [RFC2869]: https://www.rfc-editor.org/rfc/rfc2869

#![warn(missing_docs)]

pub mod attribute;
pub mod dictionary;

mod codec;
mod error;
mod hide;
mod packet;

pub use attribute::Attribute;
pub use codec::{EncodedRequest, PacketCodec, AUTHENTICATOR_LEN, HEADER_LEN, MAX_PACKET_LEN};
pub use dictionary::{Dictionary, StandardDictionary, ValueCodec};
pub use error::{DecodeError, EncodeError};
pub use packet::{Packet, PacketCode, ReceivedFields};
