// Copyright (C) Microsoft Corporation. All rights reserved.

#![warn(missing_docs)]
#![forbid(unsafe_code)]

//! RFC 8017 padding and encoding schemes for a raw RSA primitive.
//!
//! Signature encodings - EMSA-PKCS1-v1_5 and EMSA-PSS
//! Encryption encodings - EME-PKCS1-v1_5 and EME-OAEP
//!
//! The hardware this crate serves exposes bare modular exponentiation only,
//! so every byte of the standards-mandated block layouts is produced and
//! checked here. Hash and random-number generation are injected by the
//! caller; this crate holds no state and talks to no device.
//!
//! All encoders write into a caller-supplied block of exactly the key size.
//! If an encoder fails after it has started writing, the block is zeroed
//! before the error is returned.

mod mgf1;
mod oaep;
mod pkcs1v15;
mod pss;

pub use mgf1::mask_xor;
pub use oaep::{decode_oaep, encode_oaep};
pub use pkcs1v15::{decode_enc_pkcs1v15, encode_enc_pkcs1v15, encode_pkcs1v15, verify_pkcs1v15};
pub use pss::{encode_pss, verify_pss};

use thiserror::Error;

/// Digest algorithm used internally by the padding schemes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DigestKind {
    /// SHA1
    Sha1,

    /// SHA256
    Sha256,

    /// SHA384
    Sha384,

    /// SHA512
    Sha512,
}

impl DigestKind {
    /// Digest output length in bytes.
    pub fn hash_len(self) -> usize {
        match self {
            DigestKind::Sha1 => 20,
            DigestKind::Sha256 => 32,
            DigestKind::Sha384 => 48,
            DigestKind::Sha512 => 64,
        }
    }

    // DigestInfo prefixes from RFC 8017 Section 9.2 notes.
    pub(crate) fn digest_info_prefix(self) -> &'static [u8] {
        const SHA1_PREFIX: [u8; 15] = [
            0x30, 0x21, 0x30, 0x09, 0x06, 0x05, 0x2b, 0x0e, 0x03, 0x02, 0x1a, 0x05, 0x00, 0x04,
            0x14,
        ];
        const SHA256_PREFIX: [u8; 19] = [
            0x30, 0x31, 0x30, 0x0d, 0x06, 0x09, 0x60, 0x86, 0x48, 0x01, 0x65, 0x03, 0x04, 0x02,
            0x01, 0x05, 0x00, 0x04, 0x20,
        ];
        const SHA384_PREFIX: [u8; 19] = [
            0x30, 0x41, 0x30, 0x0d, 0x06, 0x09, 0x60, 0x86, 0x48, 0x01, 0x65, 0x03, 0x04, 0x02,
            0x02, 0x05, 0x00, 0x04, 0x30,
        ];
        const SHA512_PREFIX: [u8; 19] = [
            0x30, 0x51, 0x30, 0x0d, 0x06, 0x09, 0x60, 0x86, 0x48, 0x01, 0x65, 0x03, 0x04, 0x02,
            0x03, 0x05, 0x00, 0x04, 0x40,
        ];

        match self {
            DigestKind::Sha1 => &SHA1_PREFIX,
            DigestKind::Sha256 => &SHA256_PREFIX,
            DigestKind::Sha384 => &SHA384_PREFIX,
            DigestKind::Sha512 => &SHA512_PREFIX,
        }
    }
}

/// Requested PSS salt length.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SaltLen {
    /// Sign side: the largest standard salt that fits (the hash length when
    /// the key allows it). Verify side: accept whatever salt length the
    /// block encodes.
    Any,

    /// Exactly this many salt bytes.
    Exact(usize),
}

/// Error type enum for the padding functions.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum PaddingError {
    /// Malformed or undersized input, detected before any write.
    #[error("invalid parameter")]
    InvalidArgument,

    /// The injected RNG refused to produce bytes.
    #[error("RNG failure")]
    RngFailure,

    /// Generic terminal verification/decode failure. Deliberately carries no
    /// detail of which check failed.
    #[error("verification failed")]
    VerificationFailed,
}

/// Result type for the padding functions.
pub type PaddingResult<T> = Result<T, PaddingError>;

pub(crate) fn zero_leftmost_x_bits(v: &mut [u8], x: usize) {
    let x_bytes = x / 8;
    let x_bits = x % 8;

    let mut idx = 0;
    while idx < x_bytes && idx < v.len() {
        v[idx] = 0;
        idx += 1;
    }

    if idx < v.len() && x_bits != 0 {
        v[idx] &= 0xff >> x_bits;
    }
}

pub(crate) fn leftmost_x_bits_are_zero(v: &[u8], x: usize) -> bool {
    let x_bytes = x / 8;
    let x_bits = x % 8;

    for &byte in v.iter().take(x_bytes) {
        if byte != 0 {
            return false;
        }
    }

    if x_bits > 0 {
        let last_byte = v.get(x_bytes).unwrap_or(&0);
        let mask = !((1u8 << (8 - x_bits)) - 1);
        if last_byte & mask != 0 {
            return false;
        }
    }

    true
}

#[cfg(test)]
pub(crate) mod test_utils {
    use sha2::Digest;

    pub fn sha256(data: &[u8]) -> Vec<u8> {
        sha2::Sha256::digest(data).to_vec()
    }

    /// Deterministic byte source for tests: an incrementing counter stream.
    pub fn counter_rng() -> impl FnMut(&mut [u8]) -> Result<(), ()> {
        let mut state = 0u8;
        move |buf: &mut [u8]| {
            for b in buf.iter_mut() {
                state = state.wrapping_add(1);
                *b = state;
            }
            Ok(())
        }
    }

    /// RNG double that always fails.
    pub fn broken_rng() -> impl FnMut(&mut [u8]) -> Result<(), ()> {
        |_buf: &mut [u8]| Err(())
    }
}
