// Copyright (C) Microsoft Corporation. All rights reserved.

#![warn(missing_docs)]
#![forbid(unsafe_code)]

//! Opaque key encapsulation over the hardware blob primitive.
//!
//! Private key material handed back to the caller in opaque form never
//! exists in the clear outside the accelerator: it is wrapped by the
//! hardware's authenticated "blob" operation, keyed by a freshly drawn
//! 16-byte modifier. The encapsulated layout is
//!
//! ```text
//! modifier (16) || blob (raw_len + 32)
//! ```
//!
//! for a fixed overhead of 48 bytes (modifier, MAC, randomization - 16
//! each). Decapsulation reports exactly one failure cause, regardless of
//! whether the MAC or a length check tripped.

use thiserror::Error;
use zeroize::Zeroize;

/// Length of the random modifier that keys one encapsulation.
pub const MODIFIER_SIZE: usize = 16;

/// Bytes the blob primitive adds beyond the plaintext (MAC + randomization).
pub const BLOB_OVERHEAD: usize = 32;

/// Total fixed overhead of an encapsulated key.
pub const ENCAP_OVERHEAD: usize = MODIFIER_SIZE + BLOB_OVERHEAD;

/// Blob wrapping flavor, selecting the key-encryption-key mode the hardware
/// applies.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BlobMode {
    /// ECB-wrapped key-encryption key.
    Ecb,

    /// CCM-wrapped key-encryption key.
    Ccm,
}

/// Failure inside the blob primitive. Carries no cause by contract.
#[derive(Error, Debug, PartialEq, Eq)]
#[error("blob primitive failure")]
pub struct BlobError;

/// The hardware confidentiality primitive this crate delegates to.
///
/// Implementations wrap `plaintext.len() + BLOB_OVERHEAD` bytes into
/// `blob_out` and invert that in `blob_decapsulate`, authenticating with a
/// key derived from the device secret and `modifier`.
pub trait BlobProvider {
    /// Wraps `plaintext` into `blob_out` under `modifier`.
    fn blob_encapsulate(
        &mut self,
        mode: BlobMode,
        modifier: &[u8; MODIFIER_SIZE],
        plaintext: &[u8],
        blob_out: &mut [u8],
    ) -> Result<(), BlobError>;

    /// Unwraps `blob` into `plaintext_out`, verifying its MAC.
    fn blob_decapsulate(
        &mut self,
        mode: BlobMode,
        modifier: &[u8; MODIFIER_SIZE],
        blob: &[u8],
        plaintext_out: &mut [u8],
    ) -> Result<(), BlobError>;
}

/// Error type enum for the encapsulation functions.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum OpaqueKeyError {
    /// Malformed input, detected before the hardware is involved.
    #[error("invalid parameter")]
    InvalidArgument,

    /// Output buffer cannot hold the result.
    #[error("buffer too small")]
    BufferTooSmall,

    /// The injected RNG refused to produce the modifier.
    #[error("RNG failure")]
    RngFailure,

    /// Opaque terminal failure. MAC mismatch and blob length mismatch are
    /// deliberately indistinguishable.
    #[error("decapsulation failed")]
    DecapsulationFailed,
}

/// Result type for the encapsulation functions.
pub type OpaqueKeyResult<T> = Result<T, OpaqueKeyError>;

/// Total encapsulated size for a raw key of `raw_len` bytes.
pub const fn encapsulated_len(raw_len: usize) -> usize {
    raw_len + ENCAP_OVERHEAD
}

/// Wraps `raw_key` into `out` and returns the encapsulated length.
///
/// A fresh modifier is drawn from `rng` and written as the first 16 bytes of
/// `out`; the blob primitive fills the rest.
///
/// # Errors
///
/// `OpaqueKeyError::InvalidArgument` for an empty key,
/// `OpaqueKeyError::BufferTooSmall` if `out` cannot hold
/// `raw_key.len() + 48` bytes, `OpaqueKeyError::RngFailure` if the modifier
/// cannot be drawn.
pub fn encapsulate<E: BlobProvider>(
    env: &mut E,
    mode: BlobMode,
    raw_key: &[u8],
    rng: &mut impl FnMut(&mut [u8]) -> Result<(), ()>,
    out: &mut [u8],
) -> OpaqueKeyResult<usize> {
    let mut modifier = [0u8; MODIFIER_SIZE];
    if rng(&mut modifier).is_err() {
        return Err(OpaqueKeyError::RngFailure);
    }

    let result = encapsulate_with_modifier(env, mode, &modifier, raw_key, out);
    modifier.zeroize();
    result
}

/// Wraps `raw_key` into `out` under a caller-drawn modifier.
///
/// This is the entry point for callers that already hold the hardware and
/// draw the modifier from its TRNG themselves; [`encapsulate`] is the
/// convenience wrapper that draws it from an injected RNG.
///
/// # Errors
///
/// `OpaqueKeyError::InvalidArgument` for an empty key or a blob failure,
/// `OpaqueKeyError::BufferTooSmall` if `out` cannot hold
/// `raw_key.len() + 48` bytes.
pub fn encapsulate_with_modifier<E: BlobProvider>(
    env: &mut E,
    mode: BlobMode,
    modifier: &[u8; MODIFIER_SIZE],
    raw_key: &[u8],
    out: &mut [u8],
) -> OpaqueKeyResult<usize> {
    if raw_key.is_empty() {
        return Err(OpaqueKeyError::InvalidArgument);
    }

    let total = encapsulated_len(raw_key.len());
    if out.len() < total {
        tracing::error!(
            needed = total,
            have = out.len(),
            "opaque_key: output buffer cannot hold encapsulated key"
        );
        return Err(OpaqueKeyError::BufferTooSmall);
    }

    let (modifier_out, blob_out) = out[..total].split_at_mut(MODIFIER_SIZE);
    modifier_out.copy_from_slice(modifier);

    if env.blob_encapsulate(mode, modifier, raw_key, blob_out).is_err() {
        out[..total].zeroize();
        return Err(OpaqueKeyError::InvalidArgument);
    }

    Ok(total)
}

/// Unwraps an encapsulated key into `key_out` and returns the raw length.
///
/// # Errors
///
/// `OpaqueKeyError::BufferTooSmall` if `key_out` cannot hold the raw key
/// (checked before any unwrapping); every other failure - truncated input,
/// blob length mismatch, MAC mismatch - is the single opaque
/// `OpaqueKeyError::DecapsulationFailed`.
pub fn decapsulate<E: BlobProvider>(
    env: &mut E,
    mode: BlobMode,
    encapsulated: &[u8],
    key_out: &mut [u8],
) -> OpaqueKeyResult<usize> {
    if encapsulated.len() <= ENCAP_OVERHEAD {
        return Err(OpaqueKeyError::DecapsulationFailed);
    }
    let raw_len = encapsulated.len() - ENCAP_OVERHEAD;

    if key_out.len() < raw_len {
        return Err(OpaqueKeyError::BufferTooSmall);
    }

    let mut modifier = [0u8; MODIFIER_SIZE];
    modifier.copy_from_slice(&encapsulated[..MODIFIER_SIZE]);

    let result = env.blob_decapsulate(
        mode,
        &modifier,
        &encapsulated[MODIFIER_SIZE..],
        &mut key_out[..raw_len],
    );
    modifier.zeroize();

    if result.is_err() {
        key_out[..raw_len].zeroize();
        return Err(OpaqueKeyError::DecapsulationFailed);
    }

    Ok(raw_len)
}
