//! The attribute dictionary seam.
//!
//! The codec consults a [`Dictionary`] to pick the value codec for each
//! attribute it touches. Dictionaries are read-only after construction and
//! freely shareable; loading them (from FreeRADIUS-style dictionary files or
//! anywhere else) is a concern of the caller, not of this crate.

use crate::attribute::types;

/// How an attribute value is interpreted on the wire.
///
/// The codec only acts on the variants that change the bytes it emits or
/// accepts (`UserPassword`, `TunnelPassword`, `VendorSpecific`); the rest
/// inform typed access by callers.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueCodec {
    /// Opaque byte string. The fallback for unknown attribute types.
    Bytes,
    /// UTF-8 text.
    Text,
    /// 32-bit unsigned integer, network byte order.
    Integer,
    /// 32-bit timestamp, seconds since the Unix epoch.
    Time,
    /// IPv4 address, 4 bytes.
    Ipv4,
    /// IPv6 address, 16 bytes.
    Ipv6,
    /// IPv6 interface identifier, 8 bytes.
    InterfaceId,
    /// Vendor-specific container (type 26): vendor id plus sub-attributes.
    VendorSpecific,
    /// User-Password obfuscation (RFC 2865 section 5.2).
    UserPassword,
    /// Tunnel-Password obfuscation (RFC 2868 section 3.5).
    TunnelPassword,
}

/// A read-only attribute metadata lookup.
pub trait Dictionary: Send + Sync {
    /// Returns the value codec for a top-level attribute type.
    ///
    /// Implementations fall back to [`ValueCodec::Bytes`] for codes they do
    /// not know.
    fn attribute_codec(&self, type_code: u8) -> ValueCodec;

    /// Returns the value codec for a vendor-specific sub-attribute.
    fn vendor_attribute_codec(&self, vendor_id: u32, subtype: u8) -> ValueCodec {
        let _ = (vendor_id, subtype);
        ValueCodec::Bytes
    }
}

/// The standard RFC 2865/2866/2869 attribute table.
///
/// Covers the attributes every RADIUS deployment uses; anything outside the
/// table is treated as opaque bytes. Vendor sub-attributes are always opaque.
#[derive(Debug, Clone, Copy, Default)]
pub struct StandardDictionary;

impl Dictionary for StandardDictionary {
    fn attribute_codec(&self, type_code: u8) -> ValueCodec {
        match type_code {
            types::USER_NAME => ValueCodec::Text,
            types::USER_PASSWORD => ValueCodec::UserPassword,
            types::CHAP_PASSWORD => ValueCodec::Bytes,
            types::NAS_IP_ADDRESS => ValueCodec::Ipv4,
            types::NAS_PORT => ValueCodec::Integer,
            types::SERVICE_TYPE => ValueCodec::Integer,
            7 => ValueCodec::Integer,  // Framed-Protocol
            types::FRAMED_IP_ADDRESS => ValueCodec::Ipv4,
            9 => ValueCodec::Ipv4,     // Framed-IP-Netmask
            10 => ValueCodec::Integer, // Framed-Routing
            11 => ValueCodec::Text,    // Filter-Id
            12 => ValueCodec::Integer, // Framed-MTU
            13 => ValueCodec::Integer, // Framed-Compression
            14 => ValueCodec::Ipv4,    // Login-IP-Host
            15 => ValueCodec::Integer, // Login-Service
            16 => ValueCodec::Integer, // Login-TCP-Port
            types::REPLY_MESSAGE => ValueCodec::Text,
            19 => ValueCodec::Text, // Callback-Number
            20 => ValueCodec::Text, // Callback-Id
            22 => ValueCodec::Text, // Framed-Route
            23 => ValueCodec::Integer, // Framed-IPX-Network
            types::STATE => ValueCodec::Bytes,
            types::CLASS => ValueCodec::Bytes,
            types::VENDOR_SPECIFIC => ValueCodec::VendorSpecific,
            types::SESSION_TIMEOUT => ValueCodec::Integer,
            28 => ValueCodec::Integer, // Idle-Timeout
            29 => ValueCodec::Integer, // Termination-Action
            types::CALLED_STATION_ID => ValueCodec::Text,
            types::CALLING_STATION_ID => ValueCodec::Text,
            types::NAS_IDENTIFIER => ValueCodec::Text,
            types::PROXY_STATE => ValueCodec::Bytes,
            34 => ValueCodec::Text,  // Login-LAT-Service
            35 => ValueCodec::Text,  // Login-LAT-Node
            36 => ValueCodec::Bytes, // Login-LAT-Group
            types::ACCT_STATUS_TYPE => ValueCodec::Integer,
            41 => ValueCodec::Integer, // Acct-Delay-Time
            42 => ValueCodec::Integer, // Acct-Input-Octets
            43 => ValueCodec::Integer, // Acct-Output-Octets
            types::ACCT_SESSION_ID => ValueCodec::Text,
            45 => ValueCodec::Integer, // Acct-Authentic
            46 => ValueCodec::Integer, // Acct-Session-Time
            49 => ValueCodec::Integer, // Acct-Terminate-Cause
            types::EVENT_TIMESTAMP => ValueCodec::Time,
            types::CHAP_CHALLENGE => ValueCodec::Bytes,
            types::NAS_PORT_TYPE => ValueCodec::Integer,
            62 => ValueCodec::Integer, // Port-Limit
            types::TUNNEL_PASSWORD => ValueCodec::TunnelPassword,
            types::CONNECT_INFO => ValueCodec::Text,
            types::MESSAGE_AUTHENTICATOR => ValueCodec::Bytes,
            types::NAS_IPV6_ADDRESS => ValueCodec::Ipv6,
            types::FRAMED_INTERFACE_ID => ValueCodec::InterfaceId,
            _ => ValueCodec::Bytes,
        }
    }
}
