use thiserror::Error;

use crate::packet::PacketCode;

/// An error raised while serializing a packet to its wire form.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EncodeError {
    /// The packet code is not one a client may send as a request.
    #[error("packet code {0:?} is not a request code")]
    NotARequest(PacketCode),

    /// The packet code is not one a server may send as a response.
    #[error("packet code {0:?} is not a response code")]
    NotAResponse(PacketCode),

    /// An attribute value does not fit in the single-octet attribute length.
    #[error("attribute value of {0} bytes exceeds the 253 byte attribute maximum")]
    OversizedAttribute(usize),

    /// The serialized packet would exceed the protocol maximum.
    #[error("encoded packet of {0} bytes exceeds the 4096 byte maximum")]
    PacketTooLong(usize),

    /// A hidden attribute (e.g. User-Password) requires a shared secret.
    #[error("hiding a password attribute requires a non-empty shared secret")]
    MissingSecret,

    /// A password longer than the hiding scheme supports.
    #[error("password of {0} bytes exceeds the 128 byte maximum")]
    PasswordTooLong(usize),

    /// A Tunnel-Password value without the leading tag and salt octets.
    #[error("tunnel password value is missing its tag and salt octets")]
    MissingTunnelSalt,
}

/// An error raised while parsing or validating a received packet.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// Fewer bytes on the wire than the declared or minimum packet length.
    #[error("packet truncated: {actual} bytes on the wire, {expected} expected")]
    UnexpectedEnd {
        /// The number of bytes required by the header.
        expected: usize,
        /// The number of bytes actually available.
        actual: usize,
    },

    /// The length field is outside `[20, 4096]`.
    #[error("declared packet length {0} is outside the valid range of 20..=4096")]
    InvalidLength(u16),

    /// A code octet that maps to no known packet type.
    #[error("unknown packet code {0}")]
    InvalidCode(u8),

    /// An attribute header declares a length below its own 2-byte header.
    #[error("attribute at offset {0} declares a length below the 2 byte minimum")]
    InvalidAttributeLength(usize),

    /// An attribute declares more bytes than remain in the packet.
    #[error("attribute at offset {0} overruns the end of the packet")]
    AttributeOverrun(usize),

    /// The response authenticator does not validate against the request.
    #[error("response authenticator does not match the originating request")]
    AuthenticatorMismatch,

    /// The Message-Authenticator attribute failed HMAC validation.
    #[error("message authenticator does not match the packet contents")]
    MessageAuthenticatorMismatch,

    /// A Message-Authenticator attribute whose value is not 16 bytes long.
    #[error("message authenticator value has {0} bytes where 16 were expected")]
    BadMessageAuthenticatorLength(usize),

    /// A hidden password value that is not a whole number of cipher blocks.
    #[error("hidden password value of {0} bytes is not a positive multiple of 16")]
    BadHiddenValueLength(usize),

    /// A typed accessor found a value of the wrong size.
    #[error("attribute value has {actual} bytes where {expected} were expected")]
    WrongValueLength {
        /// The value length the codec requires.
        expected: usize,
        /// The length actually present.
        actual: usize,
    },

    /// A text attribute holding bytes that are not valid UTF-8.
    #[error("attribute value is not valid UTF-8")]
    BadText,

    /// A Vendor-Specific attribute shorter than its 4-byte vendor id.
    #[error("vendor-specific attribute is shorter than its 4 byte vendor id")]
    VendorIdTruncated,
}
