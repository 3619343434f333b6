//! The RADIUS packet value type.

use getset::CopyGetters;
use num_enum::{TryFromPrimitive, TryFromPrimitiveError};

use crate::attribute::{types, Attribute};
use crate::DecodeError;

/// The message type carried in the first octet of a packet.
#[repr(u8)]
#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash, TryFromPrimitive)]
pub enum PacketCode {
    /// Access-Request (1).
    AccessRequest = 1,
    /// Access-Accept (2).
    AccessAccept = 2,
    /// Access-Reject (3).
    AccessReject = 3,
    /// Accounting-Request (4).
    AccountingRequest = 4,
    /// Accounting-Response (5).
    AccountingResponse = 5,
    /// Access-Challenge (11).
    AccessChallenge = 11,
    /// Status-Server (12), used as the keep-alive probe on stream transports.
    StatusServer = 12,
    /// Status-Client (13).
    StatusClient = 13,
    /// Disconnect-Request (40).
    DisconnectRequest = 40,
    /// Disconnect-ACK (41).
    DisconnectAck = 41,
    /// Disconnect-NAK (42).
    DisconnectNak = 42,
    /// CoA-Request (43).
    CoaRequest = 43,
    /// CoA-ACK (44).
    CoaAck = 44,
    /// CoA-NAK (45).
    CoaNak = 45,
}

#[doc(hidden)]
impl From<TryFromPrimitiveError<PacketCode>> for DecodeError {
    fn from(value: TryFromPrimitiveError<PacketCode>) -> Self {
        Self::InvalidCode(value.number)
    }
}

impl PacketCode {
    /// Whether a client may send this code as a request.
    pub fn is_request(self) -> bool {
        matches!(
            self,
            Self::AccessRequest
                | Self::AccountingRequest
                | Self::StatusServer
                | Self::StatusClient
                | Self::DisconnectRequest
                | Self::CoaRequest
        )
    }

    /// Whether the request authenticator for this code is an MD5 digest of
    /// the packet rather than random bytes supplied by the caller.
    ///
    /// Only Access-Request carries a random authenticator; every other
    /// request code computes it over the zero-authenticator packet
    /// (RFC 2866 section 3, RFC 5176 section 2.3).
    pub fn computes_request_authenticator(self) -> bool {
        self.is_request() && self != Self::AccessRequest
    }
}

/// The identifier and authenticator exactly as they appeared on the wire.
///
/// Populated on every decoded packet; a proxy or test server needs the raw
/// request authenticator to build its response, and callers may want the
/// response authenticator for auditing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, CopyGetters)]
#[getset(get_copy = "pub")]
pub struct ReceivedFields {
    /// The identifier octet as received.
    identifier: u8,
    /// The 16-byte authenticator field as received.
    authenticator: [u8; 16],
}

impl ReceivedFields {
    pub(crate) fn new(identifier: u8, authenticator: [u8; 16]) -> Self {
        Self {
            identifier,
            authenticator,
        }
    }
}

/// A RADIUS protocol data unit.
///
/// Packets are immutable values: requests are assembled with the `with_*`
/// builder methods and consumed by the codec; responses are produced by the
/// codec and only read from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    code: PacketCode,
    identifier: u8,
    attributes: Vec<Attribute>,
    received: Option<ReceivedFields>,
}

impl Packet {
    /// Starts a packet with the given code, no attributes, and identifier 0.
    ///
    /// Request identifiers are normally assigned by the client, not by the
    /// caller; see [`with_identifier`](Self::with_identifier).
    pub fn new(code: PacketCode) -> Self {
        Self {
            code,
            identifier: 0,
            attributes: Vec::new(),
            received: None,
        }
    }

    /// Sets the identifier octet.
    pub fn with_identifier(mut self, identifier: u8) -> Self {
        self.identifier = identifier;
        self
    }

    /// Appends one attribute. Order is preserved on the wire.
    pub fn with_attribute(mut self, attribute: Attribute) -> Self {
        self.attributes.push(attribute);
        self
    }

    /// Appends a list of attributes.
    pub fn with_attributes(mut self, attributes: impl IntoIterator<Item = Attribute>) -> Self {
        self.attributes.extend(attributes);
        self
    }

    /// Appends a zeroed Message-Authenticator placeholder for the codec to
    /// fill in at encode time.
    ///
    /// Mandatory on RadSec; harmless elsewhere.
    pub fn with_message_authenticator(self) -> Self {
        // a zero-length check keeps this idempotent for callers that add it
        // before handing the packet to the client
        if self.attribute(types::MESSAGE_AUTHENTICATOR).is_some() {
            return self;
        }

        // 16 bytes always fit, so the constructor cannot fail
        let placeholder = Attribute::new(types::MESSAGE_AUTHENTICATOR, vec![0u8; 16])
            .expect("16 byte placeholder is within the attribute size limit");
        self.with_attribute(placeholder)
    }

    pub(crate) fn from_wire(
        code: PacketCode,
        identifier: u8,
        attributes: Vec<Attribute>,
        received: ReceivedFields,
    ) -> Self {
        Self {
            code,
            identifier,
            attributes,
            received: Some(received),
        }
    }

    /// The packet code.
    pub fn code(&self) -> PacketCode {
        self.code
    }

    /// The identifier octet.
    pub fn identifier(&self) -> u8 {
        self.identifier
    }

    /// All attributes, in wire order.
    pub fn attributes(&self) -> &[Attribute] {
        &self.attributes
    }

    /// The first attribute with the given type code, if any.
    pub fn attribute(&self, type_code: u8) -> Option<&Attribute> {
        self.attributes
            .iter()
            .find(|attribute| attribute.type_code() == type_code)
    }

    /// Every attribute with the given type code, in wire order.
    pub fn attributes_of(&self, type_code: u8) -> impl Iterator<Item = &Attribute> {
        self.attributes
            .iter()
            .filter(move |attribute| attribute.type_code() == type_code)
    }

    /// The wire fields observed when this packet was decoded; `None` for
    /// locally constructed packets.
    pub fn received(&self) -> Option<&ReceivedFields> {
        self.received.as_ref()
    }
}
