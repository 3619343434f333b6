//! Wire-level encoding and decoding of packets, including authenticator
//! computation and validation.

use std::sync::Arc;

use byteorder::{ByteOrder, NetworkEndian};
use getset::{CopyGetters, Getters};
use hmac::{Hmac, Mac};
use md5::{Digest, Md5};

use crate::attribute::{self, types, Attribute};
use crate::dictionary::{Dictionary, ValueCodec};
use crate::hide;
use crate::packet::{Packet, PacketCode, ReceivedFields};
use crate::{DecodeError, EncodeError};

#[cfg(test)]
mod tests;

/// Size of the fixed packet header: code, identifier, length, authenticator.
pub const HEADER_LEN: usize = 20;

/// Largest packet either side may emit (RFC 2865 section 3).
pub const MAX_PACKET_LEN: usize = 4096;

/// Size of the authenticator field.
pub const AUTHENTICATOR_LEN: usize = 16;

type HmacMd5 = Hmac<Md5>;

/// A request serialized to its wire form.
///
/// Carries the effective request authenticator alongside the bytes: for
/// Access-Request that is the random value the caller supplied, for the
/// accounting-style codes it is the digest the codec computed. The caller
/// needs it to validate the eventual response.
#[derive(Debug, Clone, PartialEq, Eq, Getters, CopyGetters)]
pub struct EncodedRequest {
    /// The full wire form, header included.
    #[getset(get = "pub")]
    bytes: Vec<u8>,

    /// The request authenticator as it appears in (or was used for) the
    /// encoded packet.
    #[getset(get_copy = "pub")]
    authenticator: [u8; 16],

    /// The identifier octet of the encoded packet.
    #[getset(get_copy = "pub")]
    identifier: u8,
}

impl EncodedRequest {
    /// Consumes the value, returning the wire bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}

/// Bidirectional converter between [`Packet`] values and wire bytes.
///
/// The codec is cheap to clone; the dictionary behind it is shared.
#[derive(Clone)]
pub struct PacketCodec {
    dictionary: Arc<dyn Dictionary>,
}

impl PacketCodec {
    /// Builds a codec around the given attribute dictionary.
    pub fn new(dictionary: Arc<dyn Dictionary>) -> Self {
        Self { dictionary }
    }

    /// Serializes a request packet.
    ///
    /// `request_authenticator` must come from a cryptographically secure
    /// random source. It lands in the authenticator field verbatim for
    /// Access-Request; the accounting-style codes ignore it and compute the
    /// authenticator over the packet instead (RFC 2866 section 3). A zeroed
    /// Message-Authenticator attribute, if present, is filled in here.
    pub fn encode_request(
        &self,
        packet: &Packet,
        secret: &[u8],
        request_authenticator: [u8; 16],
    ) -> Result<EncodedRequest, EncodeError> {
        if !packet.code().is_request() {
            return Err(EncodeError::NotARequest(packet.code()));
        }

        // accounting-style codes hash the packet with a zeroed authenticator
        // field, so both the field and the hiding input start as zeros
        let initial = if packet.code().computes_request_authenticator() {
            [0u8; 16]
        } else {
            request_authenticator
        };

        let mut bytes = self.serialize(
            packet.code(),
            packet.identifier(),
            &initial,
            packet.attributes(),
            secret,
        )?;

        // HMAC runs while the authenticator field still holds its pre-digest
        // value (the random authenticator, or zeros), matching what a server
        // reconstructs during validation
        fill_message_authenticator(&mut bytes, secret);

        let authenticator = if packet.code().computes_request_authenticator() {
            let digest = md5_with_secret(&bytes, secret);
            bytes[4..HEADER_LEN].copy_from_slice(&digest);
            digest
        } else {
            request_authenticator
        };

        Ok(EncodedRequest {
            bytes,
            authenticator,
            identifier: packet.identifier(),
        })
    }

    /// Parses and validates a response to a previously encoded request.
    ///
    /// `request_authenticator` is the effective authenticator of the request
    /// this response answers (see [`EncodedRequest::authenticator`]); the
    /// response authenticator is recomputed against it and a mismatch is a
    /// decode error, as is a failed Message-Authenticator check.
    pub fn decode_response(
        &self,
        bytes: &[u8],
        secret: &[u8],
        request_authenticator: &[u8; 16],
    ) -> Result<Packet, DecodeError> {
        let (code, identifier, authenticator, bytes) = split_packet(bytes)?;
        let mut attributes = attribute::parse_attributes(&bytes[HEADER_LEN..])?;

        // response authenticator: MD5 over the packet with the request
        // authenticator substituted into the authenticator field
        let expected = {
            let mut hasher = Md5::new();
            hasher.update(&bytes[..4]);
            hasher.update(request_authenticator);
            hasher.update(&bytes[HEADER_LEN..]);
            hasher.update(secret);
            hasher.finalize()
        };
        if expected[..] != authenticator {
            return Err(DecodeError::AuthenticatorMismatch);
        }

        validate_message_authenticator(bytes, request_authenticator, secret)?;

        self.reveal_attributes(&mut attributes, secret, request_authenticator)?;

        Ok(Packet::from_wire(
            code,
            identifier,
            attributes,
            ReceivedFields::new(identifier, authenticator),
        ))
    }

    /// Parses a request as a server would.
    ///
    /// For the accounting-style codes the request authenticator digest is
    /// recomputed and checked; Access-Request authenticators are random and
    /// carried through unchecked. Any present Message-Authenticator is
    /// validated. The returned packet keeps its received fields so a
    /// response can be built against them.
    pub fn decode_request(&self, bytes: &[u8], secret: &[u8]) -> Result<Packet, DecodeError> {
        let (code, identifier, authenticator, bytes) = split_packet(bytes)?;
        let mut attributes = attribute::parse_attributes(&bytes[HEADER_LEN..])?;

        // zeros stand in for the authenticator field wherever the digest was
        // computed over a zeroed field
        let pre_digest_authenticator = if code.computes_request_authenticator() {
            [0u8; 16]
        } else {
            authenticator
        };

        if code.computes_request_authenticator() {
            let mut hasher = Md5::new();
            hasher.update(&bytes[..4]);
            hasher.update(pre_digest_authenticator);
            hasher.update(&bytes[HEADER_LEN..]);
            hasher.update(secret);
            if hasher.finalize()[..] != authenticator {
                return Err(DecodeError::AuthenticatorMismatch);
            }
        }

        validate_message_authenticator(bytes, &pre_digest_authenticator, secret)?;

        self.reveal_attributes(&mut attributes, secret, &pre_digest_authenticator)?;

        Ok(Packet::from_wire(
            code,
            identifier,
            attributes,
            ReceivedFields::new(identifier, authenticator),
        ))
    }

    /// Serializes a response to a previously received request.
    ///
    /// The identifier and authenticator of the originating request bind the
    /// response to it: the identifier is echoed and the response
    /// authenticator digest covers the request authenticator.
    pub fn encode_response(
        &self,
        packet: &Packet,
        secret: &[u8],
        request_identifier: u8,
        request_authenticator: &[u8; 16],
    ) -> Result<Vec<u8>, EncodeError> {
        if packet.code().is_request() {
            return Err(EncodeError::NotAResponse(packet.code()));
        }

        let mut bytes = self.serialize(
            packet.code(),
            request_identifier,
            request_authenticator,
            packet.attributes(),
            secret,
        )?;

        // HMAC first (request authenticator still in the field), then the
        // response authenticator digest over the completed packet
        fill_message_authenticator(&mut bytes, secret);

        let digest = md5_with_secret(&bytes, secret);
        bytes[4..HEADER_LEN].copy_from_slice(&digest);

        Ok(bytes)
    }

    /// Writes header and attributes, hiding password values as the
    /// dictionary directs. The authenticator field is filled with
    /// `authenticator`, which is also the hiding input.
    fn serialize(
        &self,
        code: PacketCode,
        identifier: u8,
        authenticator: &[u8; 16],
        attributes: &[Attribute],
        secret: &[u8],
    ) -> Result<Vec<u8>, EncodeError> {
        let mut bytes = Vec::with_capacity(HEADER_LEN);
        bytes.push(code as u8);
        bytes.push(identifier);
        bytes.extend_from_slice(&[0, 0]);
        bytes.extend_from_slice(authenticator);

        for attr in attributes {
            let value = self.wire_value(attr, secret, authenticator)?;
            if value.len() > attribute::MAX_VALUE_LEN {
                return Err(EncodeError::OversizedAttribute(value.len()));
            }

            bytes.push(attr.type_code());
            bytes.push((2 + value.len()) as u8);
            bytes.extend_from_slice(&value);
        }

        let total = bytes.len();
        if total > MAX_PACKET_LEN {
            return Err(EncodeError::PacketTooLong(total));
        }
        NetworkEndian::write_u16(&mut bytes[2..4], total as u16);

        Ok(bytes)
    }

    fn wire_value(
        &self,
        attribute: &Attribute,
        secret: &[u8],
        authenticator: &[u8; 16],
    ) -> Result<Vec<u8>, EncodeError> {
        match self.dictionary.attribute_codec(attribute.type_code()) {
            ValueCodec::UserPassword => {
                hide::hide_user_password(secret, authenticator, attribute.value())
            }
            ValueCodec::TunnelPassword => {
                let value = attribute.value();
                if value.len() < 3 {
                    return Err(EncodeError::MissingTunnelSalt);
                }

                let salt = [value[1], value[2]];
                let mut hidden = value[..3].to_vec();
                hidden.extend(hide::hide_tunnel_password(
                    secret,
                    authenticator,
                    &salt,
                    &value[3..],
                )?);
                Ok(hidden)
            }
            _ => Ok(attribute.value().to_vec()),
        }
    }

    /// Undoes password hiding after parsing, so decoded packets hold the
    /// same plaintext values a sender constructed them with.
    fn reveal_attributes(
        &self,
        attributes: &mut [Attribute],
        secret: &[u8],
        authenticator: &[u8; 16],
    ) -> Result<(), DecodeError> {
        for attribute in attributes {
            match self.dictionary.attribute_codec(attribute.type_code()) {
                ValueCodec::UserPassword => {
                    let plain =
                        hide::reveal_user_password(secret, authenticator, attribute.value())?;
                    attribute.replace_value(plain);
                }
                ValueCodec::TunnelPassword => {
                    let value = attribute.value();
                    if value.len() < 3 {
                        return Err(DecodeError::BadHiddenValueLength(value.len()));
                    }

                    let salt = [value[1], value[2]];
                    let plain =
                        hide::reveal_tunnel_password(secret, authenticator, &salt, &value[3..])?;

                    let mut revealed = value[..3].to_vec();
                    revealed.extend(plain);
                    attribute.replace_value(revealed);
                }
                _ => {}
            }
        }

        Ok(())
    }
}

/// Checks the header, bounds the packet to its declared length, and splits
/// out the fixed fields. Bytes beyond the declared length are ignored, as
/// RFC 2865 directs for datagram padding.
fn split_packet(bytes: &[u8]) -> Result<(PacketCode, u8, [u8; 16], &[u8]), DecodeError> {
    if bytes.len() < HEADER_LEN {
        return Err(DecodeError::UnexpectedEnd {
            expected: HEADER_LEN,
            actual: bytes.len(),
        });
    }

    let declared = NetworkEndian::read_u16(&bytes[2..4]);
    if (declared as usize) < HEADER_LEN || declared as usize > MAX_PACKET_LEN {
        return Err(DecodeError::InvalidLength(declared));
    }
    if bytes.len() < declared as usize {
        return Err(DecodeError::UnexpectedEnd {
            expected: declared as usize,
            actual: bytes.len(),
        });
    }

    let code = PacketCode::try_from(bytes[0])?;
    let identifier = bytes[1];

    let mut authenticator = [0u8; 16];
    authenticator.copy_from_slice(&bytes[4..HEADER_LEN]);

    Ok((code, identifier, authenticator, &bytes[..declared as usize]))
}

/// MD5 over the packet bytes followed by the shared secret, the digest shape
/// shared by the response authenticator and the accounting-style request
/// authenticator.
fn md5_with_secret(bytes: &[u8], secret: &[u8]) -> [u8; 16] {
    let mut hasher = Md5::new();
    hasher.update(bytes);
    hasher.update(secret);
    hasher.finalize().into()
}

/// Locates the value of the first Message-Authenticator attribute, returning
/// its offset and length relative to the attribute region.
fn find_message_authenticator(attrs: &[u8]) -> Option<(usize, usize)> {
    let mut offset = 0;
    while offset + 2 <= attrs.len() {
        let declared = attrs[offset + 1] as usize;
        if declared < 2 || offset + declared > attrs.len() {
            return None;
        }
        if attrs[offset] == types::MESSAGE_AUTHENTICATOR {
            return Some((offset + 2, declared - 2));
        }
        offset += declared;
    }

    None
}

/// Overwrites a zeroed Message-Authenticator value with the HMAC-MD5 of the
/// packet as currently serialized. No-op when the attribute is absent.
fn fill_message_authenticator(bytes: &mut [u8], secret: &[u8]) {
    let Some((offset, len)) = find_message_authenticator(&bytes[HEADER_LEN..]) else {
        return;
    };
    if len != AUTHENTICATOR_LEN {
        return;
    }
    let value_start = HEADER_LEN + offset;

    let mut mac = HmacMd5::new_from_slice(secret).expect("HMAC-MD5 accepts keys of any length");
    mac.update(&bytes[..value_start]);
    mac.update(&[0u8; AUTHENTICATOR_LEN]);
    mac.update(&bytes[value_start + AUTHENTICATOR_LEN..]);

    let tag = mac.finalize().into_bytes();
    bytes[value_start..value_start + AUTHENTICATOR_LEN].copy_from_slice(&tag);
}

/// Validates the Message-Authenticator attribute, if present, with
/// `authenticator` substituted into the authenticator field (responses are
/// authenticated against the request authenticator, RFC 2869 section 5.14).
fn validate_message_authenticator(
    bytes: &[u8],
    authenticator: &[u8; 16],
    secret: &[u8],
) -> Result<(), DecodeError> {
    let attrs = &bytes[HEADER_LEN..];
    let Some((offset, len)) = find_message_authenticator(attrs) else {
        return Ok(());
    };
    if len != AUTHENTICATOR_LEN {
        return Err(DecodeError::BadMessageAuthenticatorLength(len));
    }

    let mut mac = HmacMd5::new_from_slice(secret).expect("HMAC-MD5 accepts keys of any length");
    mac.update(&bytes[..4]);
    mac.update(authenticator);
    mac.update(&attrs[..offset]);
    mac.update(&[0u8; AUTHENTICATOR_LEN]);
    mac.update(&attrs[offset + AUTHENTICATOR_LEN..]);

    mac.verify_slice(&attrs[offset..offset + AUTHENTICATOR_LEN])
        .map_err(|_| DecodeError::MessageAuthenticatorMismatch)
}
