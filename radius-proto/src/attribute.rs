//! Attribute-value pairs and their wire codec.

use std::net::{Ipv4Addr, Ipv6Addr};

use byteorder::{ByteOrder, NetworkEndian};

use crate::{DecodeError, EncodeError};


/// Attribute type codes assigned by RFC 2865/2866/2868/2869.
pub mod types {
    /// User-Name (1).
    pub const USER_NAME: u8 = 1;
    /// User-Password (2), hidden on the wire.
    pub const USER_PASSWORD: u8 = 2;
    /// CHAP-Password (3).
    pub const CHAP_PASSWORD: u8 = 3;
    /// NAS-IP-Address (4).
    pub const NAS_IP_ADDRESS: u8 = 4;
    /// NAS-Port (5).
    pub const NAS_PORT: u8 = 5;
    /// Service-Type (6).
    pub const SERVICE_TYPE: u8 = 6;
    /// Framed-IP-Address (8).
    pub const FRAMED_IP_ADDRESS: u8 = 8;
    /// Reply-Message (18).
    pub const REPLY_MESSAGE: u8 = 18;
    /// State (24).
    pub const STATE: u8 = 24;
    /// Class (25).
    pub const CLASS: u8 = 25;
    /// Vendor-Specific (26).
    pub const VENDOR_SPECIFIC: u8 = 26;
    /// Session-Timeout (27).
    pub const SESSION_TIMEOUT: u8 = 27;
    /// Called-Station-Id (30).
    pub const CALLED_STATION_ID: u8 = 30;
    /// Calling-Station-Id (31).
    pub const CALLING_STATION_ID: u8 = 31;
    /// NAS-Identifier (32).
    pub const NAS_IDENTIFIER: u8 = 32;
    /// Proxy-State (33).
    pub const PROXY_STATE: u8 = 33;
    /// Acct-Status-Type (40).
    pub const ACCT_STATUS_TYPE: u8 = 40;
    /// Acct-Session-Id (44).
    pub const ACCT_SESSION_ID: u8 = 44;
    /// Event-Timestamp (55).
    pub const EVENT_TIMESTAMP: u8 = 55;
    /// CHAP-Challenge (60).
    pub const CHAP_CHALLENGE: u8 = 60;
    /// NAS-Port-Type (61).
    pub const NAS_PORT_TYPE: u8 = 61;
    /// Tunnel-Password (69), salted and hidden on the wire.
    pub const TUNNEL_PASSWORD: u8 = 69;
    /// Connect-Info (77).
    pub const CONNECT_INFO: u8 = 77;
    /// Message-Authenticator (80), HMAC-MD5 over the whole packet.
    pub const MESSAGE_AUTHENTICATOR: u8 = 80;
    /// NAS-IPv6-Address (95).
    pub const NAS_IPV6_ADDRESS: u8 = 95;
    /// Framed-Interface-Id (96).
    pub const FRAMED_INTERFACE_ID: u8 = 96;
}

/// The largest value that fits the single-octet attribute length, which
/// covers the 2-byte type/length header.
pub const MAX_VALUE_LEN: usize = 253;

/// A single attribute-value pair.
///
/// The value is held in the form the caller constructed it in: plaintext for
/// password attributes (the codec hides them on encode), raw bytes for
/// everything else. Attribute order within a packet is significant and
/// preserved end to end.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    type_code: u8,
    value: Vec<u8>,
}

impl Attribute {
    /// Builds an attribute from a type code and a raw value.
    ///
    /// Zero-length values are legal; values over [`MAX_VALUE_LEN`] bytes are
    /// rejected here rather than at encode time.
    pub fn new(type_code: u8, value: impl Into<Vec<u8>>) -> Result<Self, EncodeError> {
        let value = value.into();
        if value.len() > MAX_VALUE_LEN {
            return Err(EncodeError::OversizedAttribute(value.len()));
        }

        Ok(Self { type_code, value })
    }

    /// Builds a text attribute.
    pub fn text(type_code: u8, value: &str) -> Result<Self, EncodeError> {
        Self::new(type_code, value.as_bytes())
    }

    /// Builds a 32-bit integer attribute.
    pub fn integer(type_code: u8, value: u32) -> Self {
        // 4 bytes always fit, so the length check cannot fail
        Self {
            type_code,
            value: value.to_be_bytes().to_vec(),
        }
    }

    /// Builds an IPv4 address attribute.
    pub fn ipv4(type_code: u8, address: Ipv4Addr) -> Self {
        Self {
            type_code,
            value: address.octets().to_vec(),
        }
    }

    /// Builds an IPv6 address attribute.
    pub fn ipv6(type_code: u8, address: Ipv6Addr) -> Self {
        Self {
            type_code,
            value: address.octets().to_vec(),
        }
    }

    /// Builds a Vendor-Specific (type 26) attribute from a vendor id and its
    /// sub-attributes.
    pub fn vendor(vendor_id: u32, sub_attributes: &[Attribute]) -> Result<Self, EncodeError> {
        let mut value = vendor_id.to_be_bytes().to_vec();
        serialize_attributes(sub_attributes, &mut value)?;

        Self::new(types::VENDOR_SPECIFIC, value)
    }

    /// Builds a Tunnel-Password attribute from its tag, salt and plaintext.
    ///
    /// The salt's most significant bit must be set on the wire (RFC 2868
    /// section 3.5), which is enforced here. The plaintext is hidden by the
    /// codec at encode time.
    pub fn tunnel_password(tag: u8, salt: [u8; 2], password: &[u8]) -> Result<Self, EncodeError> {
        if password.len() > 128 {
            return Err(EncodeError::PasswordTooLong(password.len()));
        }

        let mut value = Vec::with_capacity(3 + password.len());
        value.push(tag);
        value.push(salt[0] | 0x80);
        value.push(salt[1]);
        value.extend_from_slice(password);

        Self::new(types::TUNNEL_PASSWORD, value)
    }

    /// The attribute type code.
    pub fn type_code(&self) -> u8 {
        self.type_code
    }

    /// The attribute value as raw bytes.
    pub fn value(&self) -> &[u8] {
        &self.value
    }

    pub(crate) fn replace_value(&mut self, value: Vec<u8>) {
        self.value = value;
    }

    /// Interprets the value as UTF-8 text.
    pub fn as_text(&self) -> Result<&str, DecodeError> {
        std::str::from_utf8(&self.value).map_err(|_| DecodeError::BadText)
    }

    /// Interprets the value as a 32-bit network-order integer.
    pub fn as_integer(&self) -> Result<u32, DecodeError> {
        if self.value.len() != 4 {
            return Err(DecodeError::WrongValueLength {
                expected: 4,
                actual: self.value.len(),
            });
        }

        Ok(NetworkEndian::read_u32(&self.value))
    }

    /// Interprets the value as an IPv4 address.
    pub fn as_ipv4(&self) -> Result<Ipv4Addr, DecodeError> {
        let octets: [u8; 4] =
            self.value
                .as_slice()
                .try_into()
                .map_err(|_| DecodeError::WrongValueLength {
                    expected: 4,
                    actual: self.value.len(),
                })?;

        Ok(Ipv4Addr::from(octets))
    }

    /// Interprets the value as an IPv6 address.
    pub fn as_ipv6(&self) -> Result<Ipv6Addr, DecodeError> {
        let octets: [u8; 16] =
            self.value
                .as_slice()
                .try_into()
                .map_err(|_| DecodeError::WrongValueLength {
                    expected: 16,
                    actual: self.value.len(),
                })?;

        Ok(Ipv6Addr::from(octets))
    }

    /// Splits a Vendor-Specific value into its vendor id and sub-attributes.
    pub fn vendor_parts(&self) -> Result<(u32, Vec<Attribute>), DecodeError> {
        if self.value.len() < 4 {
            return Err(DecodeError::VendorIdTruncated);
        }

        let vendor_id = NetworkEndian::read_u32(&self.value[..4]);
        let sub_attributes = parse_attributes(&self.value[4..])?;

        Ok((vendor_id, sub_attributes))
    }

    /// The size of this attribute on the wire, including its 2-byte header.
    pub fn wire_size(&self) -> usize {
        2 + self.value.len()
    }
}

/// Appends an attribute list in wire form, preserving order.
pub(crate) fn serialize_attributes(
    attributes: &[Attribute],
    out: &mut Vec<u8>,
) -> Result<(), EncodeError> {
    for attribute in attributes {
        if attribute.value.len() > MAX_VALUE_LEN {
            return Err(EncodeError::OversizedAttribute(attribute.value.len()));
        }

        out.push(attribute.type_code);
        out.push(attribute.wire_size() as u8);
        out.extend_from_slice(&attribute.value);
    }

    Ok(())
}

/// Parses a wire attribute list, preserving order and keeping repeated
/// attributes.
///
/// An attribute whose declared length exceeds the remaining bytes is an
/// error, never silently truncated.
pub(crate) fn parse_attributes(bytes: &[u8]) -> Result<Vec<Attribute>, DecodeError> {
    let mut attributes = Vec::new();
    let mut offset = 0;

    while offset < bytes.len() {
        if offset + 2 > bytes.len() {
            return Err(DecodeError::AttributeOverrun(offset));
        }

        let type_code = bytes[offset];
        let declared = bytes[offset + 1] as usize;
        if declared < 2 {
            return Err(DecodeError::InvalidAttributeLength(offset));
        }
        if offset + declared > bytes.len() {
            return Err(DecodeError::AttributeOverrun(offset));
        }

        attributes.push(Attribute {
            type_code,
            value: bytes[offset + 2..offset + declared].to_vec(),
        });

        offset += declared;
    }

    Ok(attributes)
}
