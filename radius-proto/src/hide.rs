//! Password hiding (RFC 2865 section 5.2, RFC 2868 section 3.5).
//!
//! Both schemes chain MD5 over the shared secret: each 16-byte plaintext
//! block is XORed with a pad derived from the secret and either the request
//! authenticator (first block) or the previous ciphertext block. Hiding is
//! deterministic for a given secret and authenticator, so a decoded packet
//! re-encodes to the same bytes.

use std::iter::zip;

use md5::{Digest, Md5};

use crate::{DecodeError, EncodeError};

/// MD5 output size, which is also the hiding block size.
const BLOCK_SIZE: usize = 16;

/// The longest password either scheme can carry.
const MAX_PASSWORD_LEN: usize = 128;

/// Hides a User-Password value.
///
/// The plaintext is NUL-padded up to a whole number of blocks (an empty
/// password still occupies one block).
pub(crate) fn hide_user_password(
    secret: &[u8],
    authenticator: &[u8; 16],
    password: &[u8],
) -> Result<Vec<u8>, EncodeError> {
    if secret.is_empty() {
        return Err(EncodeError::MissingSecret);
    }
    if password.len() > MAX_PASSWORD_LEN {
        return Err(EncodeError::PasswordTooLong(password.len()));
    }

    let mut buffer = pad_to_blocks(password);
    hide_in_place(secret, authenticator, &mut buffer);

    Ok(buffer)
}

/// Recovers a User-Password value, trimming the NUL padding.
pub(crate) fn reveal_user_password(
    secret: &[u8],
    authenticator: &[u8; 16],
    hidden: &[u8],
) -> Result<Vec<u8>, DecodeError> {
    let mut buffer = reveal_to_buffer(secret, authenticator, hidden)?;

    let trimmed = buffer.iter().rposition(|&b| b != 0).map_or(0, |i| i + 1);
    buffer.truncate(trimmed);

    Ok(buffer)
}

/// Hides a Tunnel-Password string.
///
/// The plaintext is prefixed with its own length octet before padding, and
/// the salt joins the authenticator in the first pad block.
pub(crate) fn hide_tunnel_password(
    secret: &[u8],
    authenticator: &[u8; 16],
    salt: &[u8; 2],
    password: &[u8],
) -> Result<Vec<u8>, EncodeError> {
    if secret.is_empty() {
        return Err(EncodeError::MissingSecret);
    }
    if password.len() > MAX_PASSWORD_LEN {
        return Err(EncodeError::PasswordTooLong(password.len()));
    }

    let mut plaintext = Vec::with_capacity(1 + password.len());
    plaintext.push(password.len() as u8);
    plaintext.extend_from_slice(password);

    let mut buffer = pad_to_blocks(&plaintext);

    let mut seed = [0u8; 18];
    seed[..16].copy_from_slice(authenticator);
    seed[16..].copy_from_slice(salt);
    hide_in_place(secret, &seed, &mut buffer);

    Ok(buffer)
}

/// Recovers a Tunnel-Password string via its embedded length octet.
pub(crate) fn reveal_tunnel_password(
    secret: &[u8],
    authenticator: &[u8; 16],
    salt: &[u8; 2],
    hidden: &[u8],
) -> Result<Vec<u8>, DecodeError> {
    let mut seed = [0u8; 18];
    seed[..16].copy_from_slice(authenticator);
    seed[16..].copy_from_slice(salt);

    let buffer = reveal_to_buffer(secret, &seed, hidden)?;

    // first octet is the plaintext length; the remainder is padding
    let declared = buffer[0] as usize;
    if declared > buffer.len() - 1 {
        return Err(DecodeError::BadHiddenValueLength(hidden.len()));
    }

    Ok(buffer[1..1 + declared].to_vec())
}

fn pad_to_blocks(plaintext: &[u8]) -> Vec<u8> {
    let blocks = plaintext.len().div_ceil(BLOCK_SIZE).max(1);
    let mut buffer = vec![0u8; blocks * BLOCK_SIZE];
    buffer[..plaintext.len()].copy_from_slice(plaintext);
    buffer
}

/// XORs each block with its pad; the first pad hashes the seed, later pads
/// hash the preceding ciphertext block.
fn hide_in_place(secret: &[u8], seed: &[u8], buffer: &mut [u8]) {
    let mut prefix_hasher = Md5::new();
    prefix_hasher.update(secret);

    let mut pad = [0u8; BLOCK_SIZE];
    let mut previous: Option<[u8; BLOCK_SIZE]> = None;

    for chunk in buffer.chunks_mut(BLOCK_SIZE) {
        let mut hasher = prefix_hasher.clone();
        match previous {
            None => hasher.update(seed),
            Some(cipher) => hasher.update(cipher),
        }
        hasher.finalize_into((&mut pad).into());

        xor_slices(chunk, &pad);

        let mut cipher = [0u8; BLOCK_SIZE];
        cipher.copy_from_slice(chunk);
        previous = Some(cipher);
    }
}

fn reveal_to_buffer(secret: &[u8], seed: &[u8], hidden: &[u8]) -> Result<Vec<u8>, DecodeError> {
    if hidden.is_empty() || hidden.len() % BLOCK_SIZE != 0 {
        return Err(DecodeError::BadHiddenValueLength(hidden.len()));
    }

    let mut prefix_hasher = Md5::new();
    prefix_hasher.update(secret);

    let mut buffer = hidden.to_vec();
    let mut pad = [0u8; BLOCK_SIZE];
    let mut previous: Option<[u8; BLOCK_SIZE]> = None;

    for chunk in buffer.chunks_mut(BLOCK_SIZE) {
        // the pad for the next block hashes this block's ciphertext, so
        // capture it before XORing in place
        let mut cipher = [0u8; BLOCK_SIZE];
        cipher.copy_from_slice(chunk);

        let mut hasher = prefix_hasher.clone();
        match previous {
            None => hasher.update(seed),
            Some(prior) => hasher.update(prior),
        }
        hasher.finalize_into((&mut pad).into());

        xor_slices(chunk, &pad);
        previous = Some(cipher);
    }

    Ok(buffer)
}

fn xor_slices(output: &mut [u8], pad: &[u8]) {
    for (out, pad) in zip(output, pad) {
        *out ^= pad;
    }
}
