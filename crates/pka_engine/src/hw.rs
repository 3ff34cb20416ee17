// Copyright (C) Microsoft Corporation. All rights reserved.

//! Collaborator contracts for the raw accelerator primitives.
//!
//! These traits are the narrow seams between the standards logic and the
//! device. Nothing behind them is standards-aware: `modexp` is plain
//! `base^exp mod n`, the ECDSA operations take bare scalars and points, and
//! the blob primitive (see [`opaque_key::BlobProvider`]) wraps whatever
//! bytes it is given.

use key_codec::{EccCurve, RawRsaKeyPair};
use rsa_padding::DigestKind;
use thiserror::Error;
use zeroize::Zeroizing;

/// Failure inside a raw primitive. Carries no cause by contract; retry
/// policy belongs to the job-submission layer below these traits.
#[derive(Error, Debug, PartialEq, Eq)]
#[error("hardware primitive failure")]
pub struct HwError;

/// Raw RSA operations.
pub trait RsaAccel {
    /// `base^exponent mod modulus`, all big-endian; the result is exactly
    /// `modulus.len()` bytes. Used for both directions of every RSA scheme.
    fn modexp(&mut self, base: &[u8], modulus: &[u8], exponent: &[u8])
        -> Result<Vec<u8>, HwError>;

    /// Builds the keypair from host-supplied primes: returns the modulus
    /// `p*q` and the private exponent for `pub_exp`.
    fn rsa_keygen(
        &mut self,
        p: &[u8],
        q: &[u8],
        pub_exp: &[u8; 4],
    ) -> Result<RawRsaKeyPair, HwError>;
}

/// Raw ECDSA operations.
pub trait EccAccel {
    /// Signs `digest` with the bare scalar; returns `r || s`, each component
    /// the curve's field size.
    fn ecdsa_sign(
        &mut self,
        curve: EccCurve,
        scalar: &[u8],
        digest: &[u8],
    ) -> Result<Vec<u8>, HwError>;

    /// Verifies `signature` (`r || s`) over `digest` against the bare point
    /// coordinates `X || Y` (no tag byte).
    fn ecdsa_verify(
        &mut self,
        curve: EccCurve,
        point_xy: &[u8],
        digest: &[u8],
        signature: &[u8],
    ) -> Result<bool, HwError>;

    /// Draws a fresh keypair; returns the scalar and the point coordinates
    /// `X || Y` (no tag byte).
    fn ecc_keygen(&mut self, curve: EccCurve) -> Result<(Zeroizing<Vec<u8>>, Vec<u8>), HwError>;
}

/// The hash engine.
pub trait HashAccel {
    /// One-shot digest. Total for every supported `DigestKind`; a device
    /// whose hash engine can fail must resolve that below this seam.
    fn digest(&mut self, kind: DigestKind, data: &[u8]) -> Vec<u8>;
}

/// The true random number generator.
pub trait TrngAccel {
    /// Fills `buf` with entropy.
    fn fill_random(&mut self, buf: &mut [u8]) -> Result<(), HwError>;
}

/// Everything a [`crate::Device`] needs from one piece of hardware.
pub trait PkaHardware:
    RsaAccel + EccAccel + HashAccel + TrngAccel + opaque_key::BlobProvider
{
}

impl<T> PkaHardware for T where
    T: RsaAccel + EccAccel + HashAccel + TrngAccel + opaque_key::BlobProvider
{
}
