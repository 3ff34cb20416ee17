// Copyright (C) Microsoft Corporation. All rights reserved.

#![warn(missing_docs)]
#![forbid(unsafe_code)]

//! Key material marshalling between portable DER encodings and the raw
//! big-endian component buffers the accelerator consumes.
//!
//! Supported structures:
//! - **RSA public keys**: X.509 `SubjectPublicKeyInfo` (SPKI) wrapping a
//!   PKCS#1 `RSAPublicKey`.
//! - **RSA private keys**: a PKCS#8 `PrivateKeyInfo` wrapper carrying a
//!   PKCS#1 `RSAPrivateKey`.
//! - **ECC public keys**: SPKI with the uncompressed point convention
//!   (`0x04 || X || Y`), curves P-256 / P-384 / P-521.
//! - **ECC private keys**: PKCS#8 wrapping an RFC 5915 `ECPrivateKey`.
//!
//! The raw side is what the hardware understands: flat big-endian modulus /
//! exponent / scalar / point buffers, zero-padded to the key size. RSA prime
//! generation and prime recovery live here as well; both are key-management
//! concerns, not padding concerns.
//!
//! Buffers holding private material are wrapped in [`zeroize::Zeroizing`],
//! so they are cleared on every exit path, including early error returns.

mod ecc;
mod primes;
mod rsa;

pub use ecc::{
    ecc_keypair_from_raw, ecc_keypair_to_raw, ecc_public_from_raw, ecc_public_to_raw, EccCurve,
};
pub use primes::{generate_primes, recover_primes};
pub use rsa::{
    rsa_keypair_from_raw, rsa_keypair_to_raw, rsa_public_from_raw, rsa_public_to_raw,
    DEFAULT_PUBLIC_EXPONENT,
};

use thiserror::Error;
use zeroize::Zeroizing;

/// Error type enum for the marshalling functions.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum KeyCodecError {
    /// Component lengths or values that cannot describe a key.
    #[error("invalid key parameter")]
    InvalidArgument,

    /// Failed to parse the ASN.1 structure.
    #[error("ASN.1 decode error")]
    Asn1Decode,

    /// Failed to build the ASN.1 structure.
    #[error("ASN.1 encode error")]
    Asn1Encode,

    /// Output buffer too small for the encoded key.
    #[error("buffer too small")]
    BufferTooSmall,

    /// The curve OID is not one of the supported NIST curves.
    #[error("unsupported curve")]
    UnsupportedCurve,

    /// The injected RNG refused to produce bytes.
    #[error("RNG failure")]
    RngFailure,

    /// Prime generation or recovery did not converge.
    #[error("prime generation failed")]
    PrimeGeneration,
}

/// Result type for the marshalling functions.
pub type KeyCodecResult<T> = Result<T, KeyCodecError>;

/// Raw RSA public key components, big-endian, padded to the key size.
pub struct RawRsaPublicKey {
    /// Modulus `n`, exactly the key size in bytes.
    pub modulus: Vec<u8>,

    /// Public exponent `e`, 4 bytes.
    pub exponent: [u8; 4],
}

/// Raw RSA private key components as the accelerator consumes them.
///
/// The CRT parameters are not carried; the hardware works from `n` and `d`
/// alone, and the portable export derives the CRT form when it needs it.
pub struct RawRsaKeyPair {
    /// Modulus `n`, exactly the key size in bytes.
    pub modulus: Vec<u8>,

    /// Private exponent `d`, zeroed on drop.
    pub priv_exp: Zeroizing<Vec<u8>>,
}

/// Raw ECC public key: curve plus uncompressed point `0x04 || X || Y`.
pub struct RawEccPublicKey {
    /// The curve the point lives on.
    pub curve: EccCurve,

    /// Uncompressed point, `1 + 2 * point_size` bytes.
    pub point: Vec<u8>,
}

/// Raw ECC keypair: private scalar plus uncompressed public point.
pub struct RawEccKeyPair {
    /// The curve the key lives on.
    pub curve: EccCurve,

    /// Private scalar, `point_size` bytes, zeroed on drop.
    pub scalar: Zeroizing<Vec<u8>>,

    /// Uncompressed public point, `1 + 2 * point_size` bytes.
    pub point: Vec<u8>,
}

/// Freshly generated RSA prime pair, `P > Q`, each half the key size.
///
/// Ephemeral by design: the caller feeds these to the hardware keypair
/// operation and drops them immediately; dropping zeroes the buffers.
#[derive(Debug)]
pub struct RsaPrimes {
    /// Larger prime, big-endian.
    pub p: Zeroizing<Vec<u8>>,

    /// Smaller prime, big-endian.
    pub q: Zeroizing<Vec<u8>>,
}

/// Left-pads `bytes` with zeros to exactly `len` bytes.
///
/// Fails if the value does not fit, which would silently truncate a key
/// component otherwise.
pub(crate) fn pad_to(bytes: &[u8], len: usize) -> KeyCodecResult<Vec<u8>> {
    let bytes = bytes
        .iter()
        .position(|&b| b != 0)
        .map_or(&bytes[bytes.len()..], |pos| &bytes[pos..]);

    if bytes.len() > len {
        return Err(KeyCodecError::InvalidArgument);
    }

    let mut out = vec![0u8; len];
    out[len - bytes.len()..].copy_from_slice(bytes);
    Ok(out)
}

/// Copies a DER blob into the caller's buffer using the size-query pattern:
/// `None` reports the required size, `Some` writes and reports the length.
pub(crate) fn write_der(der: &[u8], out: Option<&mut [u8]>) -> KeyCodecResult<usize> {
    if let Some(out) = out {
        if out.len() < der.len() {
            return Err(KeyCodecError::BufferTooSmall);
        }
        out[..der.len()].copy_from_slice(der);
    }
    Ok(der.len())
}
