use super::*;

use crate::dictionary::StandardDictionary;

const SECRET: &[u8] = b"sec";
const REQUEST_AUTHENTICATOR: [u8; 16] = [
    0x5A, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08, 0x09, 0x0A, 0x0B, 0x0C, 0x0D, 0x0E,
    0x0F,
];

fn codec() -> PacketCodec {
    PacketCodec::new(Arc::new(StandardDictionary))
}

fn access_request() -> Packet {
    Packet::new(PacketCode::AccessRequest)
        .with_identifier(0x01)
        .with_attribute(Attribute::text(types::USER_NAME, "alice").unwrap())
        .with_attribute(Attribute::text(types::USER_PASSWORD, "hunter2").unwrap())
}

#[test]
fn access_request_round_trips_through_a_server() {
    let request = access_request();
    let encoded = codec()
        .encode_request(&request, SECRET, REQUEST_AUTHENTICATOR)
        .expect("request should encode");

    assert_eq!(encoded.identifier(), 0x01);
    assert_eq!(encoded.authenticator(), REQUEST_AUTHENTICATOR);

    let decoded = codec()
        .decode_request(encoded.bytes(), SECRET)
        .expect("encoded request should decode");

    assert_eq!(decoded.code(), request.code());
    assert_eq!(decoded.identifier(), request.identifier());
    // the password comes back as the plaintext the caller supplied
    assert_eq!(decoded.attributes(), request.attributes());
    assert_eq!(
        decoded.received().unwrap().authenticator(),
        REQUEST_AUTHENTICATOR
    );
}

#[test]
fn decoded_request_reencodes_byte_for_byte() {
    let request = access_request()
        .with_attribute(Attribute::tunnel_password(1, [0x13, 0x57], b"tnlpw").unwrap());
    let encoded = codec()
        .encode_request(&request, SECRET, REQUEST_AUTHENTICATOR)
        .unwrap();

    let decoded = codec().decode_request(encoded.bytes(), SECRET).unwrap();
    let reencoded = codec()
        .encode_request(&decoded, SECRET, decoded.received().unwrap().authenticator())
        .unwrap();

    assert_eq!(reencoded.bytes(), encoded.bytes());
}

#[test]
fn accounting_request_authenticator_is_computed_and_validated() {
    let request = Packet::new(PacketCode::AccountingRequest)
        .with_identifier(0x42)
        .with_attribute(Attribute::integer(types::ACCT_STATUS_TYPE, 1))
        .with_attribute(Attribute::text(types::ACCT_SESSION_ID, "0001").unwrap());

    let encoded = codec()
        .encode_request(&request, SECRET, REQUEST_AUTHENTICATOR)
        .unwrap();

    // the supplied random bytes are replaced by the packet digest
    assert_ne!(encoded.authenticator(), REQUEST_AUTHENTICATOR);
    assert_eq!(&encoded.bytes()[4..20], encoded.authenticator());

    codec()
        .decode_request(encoded.bytes(), SECRET)
        .expect("computed authenticator should validate");

    // any payload change invalidates the digest
    let mut tampered = encoded.bytes().clone();
    let last = tampered.len() - 1;
    tampered[last] ^= 0x01;
    assert_eq!(
        codec().decode_request(&tampered, SECRET),
        Err(DecodeError::AuthenticatorMismatch)
    );
}

#[test]
fn response_round_trips_and_echoes_the_identifier() {
    let reply = Packet::new(PacketCode::AccessAccept)
        .with_attribute(Attribute::text(types::REPLY_MESSAGE, "welcome").unwrap());

    let bytes = codec()
        .encode_response(&reply, SECRET, 0x01, &REQUEST_AUTHENTICATOR)
        .expect("response should encode");

    let decoded = codec()
        .decode_response(&bytes, SECRET, &REQUEST_AUTHENTICATOR)
        .expect("response should decode against its request authenticator");

    assert_eq!(decoded.code(), PacketCode::AccessAccept);
    assert_eq!(decoded.identifier(), 0x01);
    assert_eq!(decoded.attributes(), reply.attributes());
    assert_eq!(decoded.received().unwrap().identifier(), 0x01);
}

#[test]
fn response_authenticator_matches_the_rfc_digest() {
    let reply = Packet::new(PacketCode::AccessReject);
    let bytes = codec()
        .encode_response(&reply, SECRET, 0x07, &REQUEST_AUTHENTICATOR)
        .unwrap();

    // MD5(code + id + length + request authenticator + attributes + secret)
    let mut hasher = Md5::new();
    hasher.update(&bytes[..4]);
    hasher.update(REQUEST_AUTHENTICATOR);
    hasher.update(&bytes[20..]);
    hasher.update(SECRET);

    assert_eq!(hasher.finalize()[..], bytes[4..20]);
}

#[test]
fn tampered_response_authenticator_is_rejected() {
    let reply = Packet::new(PacketCode::AccessAccept);
    let mut bytes = codec()
        .encode_response(&reply, SECRET, 0x01, &REQUEST_AUTHENTICATOR)
        .unwrap();

    bytes[4] ^= 0x80;

    assert_eq!(
        codec().decode_response(&bytes, SECRET, &REQUEST_AUTHENTICATOR),
        Err(DecodeError::AuthenticatorMismatch)
    );
}

#[test]
fn response_does_not_validate_against_a_different_request() {
    let reply = Packet::new(PacketCode::AccessAccept);
    let bytes = codec()
        .encode_response(&reply, SECRET, 0x01, &REQUEST_AUTHENTICATOR)
        .unwrap();

    let other_authenticator = [0xFF; 16];
    assert_eq!(
        codec().decode_response(&bytes, SECRET, &other_authenticator),
        Err(DecodeError::AuthenticatorMismatch)
    );
}

#[test]
fn header_only_packet_encodes_and_decodes() {
    let request = Packet::new(PacketCode::AccessRequest).with_identifier(9);
    let encoded = codec()
        .encode_request(&request, SECRET, REQUEST_AUTHENTICATOR)
        .unwrap();

    assert_eq!(encoded.bytes().len(), HEADER_LEN);

    let decoded = codec().decode_request(encoded.bytes(), SECRET).unwrap();
    assert_eq!(decoded.identifier(), 9);
    assert!(decoded.attributes().is_empty());
}

#[test]
fn packet_length_boundary_is_enforced() {
    // 16 Class attributes: 15 full ones and one sized to land exactly on the
    // 4096 byte maximum (20 + 15 * 255 + 251)
    let mut at_limit = Packet::new(PacketCode::AccessRequest);
    for _ in 0..15 {
        at_limit = at_limit.with_attribute(Attribute::new(types::CLASS, vec![0u8; 253]).unwrap());
    }
    let at_limit = at_limit.with_attribute(Attribute::new(types::CLASS, vec![0u8; 249]).unwrap());

    let encoded = codec()
        .encode_request(&at_limit, SECRET, REQUEST_AUTHENTICATOR)
        .expect("packet of exactly 4096 bytes should encode");
    assert_eq!(encoded.bytes().len(), MAX_PACKET_LEN);
    codec()
        .decode_request(encoded.bytes(), SECRET)
        .expect("packet of exactly 4096 bytes should decode");

    // the same shape one byte larger (20 + 15 * 255 + 252 = 4097)
    let mut over_limit = Packet::new(PacketCode::AccessRequest);
    for _ in 0..15 {
        over_limit =
            over_limit.with_attribute(Attribute::new(types::CLASS, vec![0u8; 253]).unwrap());
    }
    let over_limit =
        over_limit.with_attribute(Attribute::new(types::CLASS, vec![0u8; 250]).unwrap());
    assert_eq!(
        codec().encode_request(&over_limit, SECRET, REQUEST_AUTHENTICATOR),
        Err(EncodeError::PacketTooLong(MAX_PACKET_LEN + 1))
    );
}

#[test]
fn empty_attribute_value_survives_a_full_round_trip() {
    let request = Packet::new(PacketCode::AccessRequest)
        .with_identifier(3)
        .with_attribute(Attribute::new(types::STATE, vec![]).unwrap());

    let encoded = codec()
        .encode_request(&request, SECRET, REQUEST_AUTHENTICATOR)
        .unwrap();
    let decoded = codec().decode_request(encoded.bytes(), SECRET).unwrap();

    assert_eq!(decoded.attribute(types::STATE).unwrap().value(), b"");
}

#[test]
fn message_authenticator_is_filled_and_validated() {
    let request = access_request().with_message_authenticator();
    let encoded = codec()
        .encode_request(&request, SECRET, REQUEST_AUTHENTICATOR)
        .unwrap();

    let decoded = codec()
        .decode_request(encoded.bytes(), SECRET)
        .expect("valid message authenticator should pass");
    assert_ne!(
        decoded.attribute(types::MESSAGE_AUTHENTICATOR).unwrap().value(),
        &[0u8; 16],
        "placeholder should have been filled"
    );

    // flip one bit inside the HMAC value
    let mut tampered = encoded.bytes().clone();
    let last = tampered.len() - 1;
    tampered[last] ^= 0x01;
    assert_eq!(
        codec().decode_request(&tampered, SECRET),
        Err(DecodeError::MessageAuthenticatorMismatch)
    );
}

#[test]
fn message_authenticator_on_responses_uses_the_request_authenticator() {
    let reply = Packet::new(PacketCode::AccessAccept).with_message_authenticator();
    let bytes = codec()
        .encode_response(&reply, SECRET, 0x01, &REQUEST_AUTHENTICATOR)
        .unwrap();

    codec()
        .decode_response(&bytes, SECRET, &REQUEST_AUTHENTICATOR)
        .expect("response message authenticator should validate");
}

#[test]
fn datagram_padding_beyond_declared_length_is_ignored() {
    let encoded = codec()
        .encode_request(&access_request(), SECRET, REQUEST_AUTHENTICATOR)
        .unwrap();

    let mut padded = encoded.bytes().clone();
    padded.extend_from_slice(&[0u8; 4]);

    let decoded = codec().decode_request(&padded, SECRET).unwrap();
    assert_eq!(decoded.attributes(), access_request().attributes());
}

#[test]
fn truncated_and_malformed_headers_are_rejected() {
    assert_eq!(
        codec().decode_request(&[0u8; 10], SECRET),
        Err(DecodeError::UnexpectedEnd {
            expected: HEADER_LEN,
            actual: 10
        })
    );

    // declared length below the header size
    let mut short = vec![1u8, 0, 0, 19];
    short.extend_from_slice(&[0u8; 16]);
    assert_eq!(
        codec().decode_request(&short, SECRET),
        Err(DecodeError::InvalidLength(19))
    );

    // declared length larger than the bytes on the wire
    let mut hungry = vec![1u8, 0, 0, 30];
    hungry.extend_from_slice(&[0u8; 16]);
    assert_eq!(
        codec().decode_request(&hungry, SECRET),
        Err(DecodeError::UnexpectedEnd {
            expected: 30,
            actual: 20
        })
    );

    // unassigned packet code
    let mut unknown = vec![99u8, 0, 0, 20];
    unknown.extend_from_slice(&[0u8; 16]);
    assert_eq!(
        codec().decode_request(&unknown, SECRET),
        Err(DecodeError::InvalidCode(99))
    );
}

#[test]
fn attribute_overrunning_the_packet_is_rejected() {
    // header + one attribute claiming more bytes than the packet holds
    let mut bytes = vec![1u8, 0, 0, 23];
    bytes.extend_from_slice(&[0u8; 16]);
    bytes.extend_from_slice(&[types::USER_NAME, 10, b'x']);

    assert_eq!(
        codec().decode_request(&bytes, SECRET),
        Err(DecodeError::AttributeOverrun(0))
    );
}

#[test]
fn encoding_a_response_code_as_a_request_is_rejected() {
    let backwards = Packet::new(PacketCode::AccessAccept);
    assert_eq!(
        codec().encode_request(&backwards, SECRET, REQUEST_AUTHENTICATOR),
        Err(EncodeError::NotARequest(PacketCode::AccessAccept))
    );

    let backwards = Packet::new(PacketCode::AccessRequest);
    assert_eq!(
        codec().encode_response(&backwards, SECRET, 0, &REQUEST_AUTHENTICATOR),
        Err(EncodeError::NotAResponse(PacketCode::AccessRequest))
    );
}

#[test]
fn coa_and_disconnect_requests_use_computed_authenticators() {
    for code in [PacketCode::CoaRequest, PacketCode::DisconnectRequest] {
        let request = Packet::new(code)
            .with_identifier(0x21)
            .with_attribute(Attribute::text(types::USER_NAME, "alice").unwrap());

        let encoded = codec()
            .encode_request(&request, SECRET, REQUEST_AUTHENTICATOR)
            .unwrap();
        assert_ne!(encoded.authenticator(), REQUEST_AUTHENTICATOR);

        let decoded = codec().decode_request(encoded.bytes(), SECRET).unwrap();
        assert_eq!(decoded.code(), code);
        assert_eq!(decoded.attributes(), request.attributes());
    }
}

#[test]
fn vendor_specific_attribute_survives_a_packet_round_trip() {
    let subs = vec![
        Attribute::integer(1, 9),
        Attribute::text(2, "cisco-ish").unwrap(),
    ];
    let request = Packet::new(PacketCode::AccessRequest)
        .with_identifier(0x05)
        .with_attribute(Attribute::vendor(9, &subs).unwrap());

    let encoded = codec()
        .encode_request(&request, SECRET, REQUEST_AUTHENTICATOR)
        .unwrap();
    let decoded = codec().decode_request(encoded.bytes(), SECRET).unwrap();

    let (vendor_id, parsed) = decoded
        .attribute(types::VENDOR_SPECIFIC)
        .unwrap()
        .vendor_parts()
        .unwrap();
    assert_eq!(vendor_id, 9);
    assert_eq!(parsed, subs);
}

#[test]
fn repeated_attributes_keep_their_wire_order() {
    let request = Packet::new(PacketCode::AccessRequest)
        .with_attribute(Attribute::new(types::PROXY_STATE, b"first".to_vec()).unwrap())
        .with_attribute(Attribute::text(types::USER_NAME, "bob").unwrap())
        .with_attribute(Attribute::new(types::PROXY_STATE, b"second".to_vec()).unwrap());

    let encoded = codec()
        .encode_request(&request, SECRET, REQUEST_AUTHENTICATOR)
        .unwrap();
    let decoded = codec().decode_request(encoded.bytes(), SECRET).unwrap();

    let states: Vec<&[u8]> = decoded
        .attributes_of(types::PROXY_STATE)
        .map(|attribute| attribute.value())
        .collect();
    assert_eq!(states, [b"first".as_slice(), b"second".as_slice()]);
    assert_eq!(decoded.attributes(), request.attributes());
}

#[test]
fn status_server_probe_encodes_with_computed_authenticator() {
    let probe = Packet::new(PacketCode::StatusServer)
        .with_identifier(0x10)
        .with_message_authenticator();

    let encoded = codec()
        .encode_request(&probe, SECRET, REQUEST_AUTHENTICATOR)
        .unwrap();
    assert_ne!(encoded.authenticator(), REQUEST_AUTHENTICATOR);

    codec()
        .decode_request(encoded.bytes(), SECRET)
        .expect("status probe should validate end to end");
}
