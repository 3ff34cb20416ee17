// Copyright (C) Microsoft Corporation. All rights reserved.

#![warn(missing_docs)]
#![forbid(unsafe_code)]

//! Orchestrator for the raw public-key accelerator.
//!
//! The accelerator knows nothing about standards: it exposes bare modular
//! exponentiation, bare ECDSA point operations, a hash engine, a TRNG and an
//! authenticated key-blob primitive. This crate composes those raw
//! operations with the padding schemes (`rsa_padding`), the key marshaller
//! (`key_codec`) and the opaque-key wrapper (`opaque_key`) into the usual
//! sign / verify / encrypt / decrypt / generate entry points.
//!
//! # Hardware access
//!
//! A [`Device`] owns the hardware behind one mutex. The lock is held only
//! across individual raw-primitive calls; the comparatively slow padding and
//! marshalling work always runs outside the critical section. There are no
//! process-wide globals: callers construct a `Device` once and pass it by
//! reference.
//!
//! # Key protection
//!
//! Every operation takes a [`KeyProtection`] selector. `Transparent` keys
//! travel as portable DER; `Opaque` private keys carry their secret half
//! wrapped by the hardware blob primitive, so the secret never exists in the
//! clear outside the accelerator.

mod algo;
mod device;
mod ecc_ops;
mod hw;
mod keys;
mod rsa_ops;

pub use algo::{KeyProtection, RsaCryptScheme, RsaSignScheme};
pub use device::Device;
pub use hw::{EccAccel, HashAccel, HwError, PkaHardware, RsaAccel, TrngAccel};
pub use keys::{ecc_opaque_key_len, rsa_opaque_key_len};

pub use key_codec::{EccCurve, RawEccKeyPair, RawRsaKeyPair};
pub use opaque_key::{BlobError, BlobMode, BlobProvider, MODIFIER_SIZE};
pub use rsa_padding::{DigestKind, SaltLen};

use key_codec::KeyCodecError;
use opaque_key::OpaqueKeyError;
use rsa_padding::PaddingError;
use thiserror::Error;

/// Error type enum for engine operations.
///
/// Terminal failures (`VerificationFailed`, `DecapsulationFailed`) keep the
/// collapsed, cause-free character they have in the leaf crates.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum EngineError {
    /// Malformed or undersized input, caught before any hardware call.
    #[error("invalid argument")]
    InvalidArgument,

    /// Output buffer too small, caught before any write.
    #[error("buffer too small")]
    BufferTooSmall,

    /// Scratch allocation failed.
    #[error("insufficient memory")]
    InsufficientMemory,

    /// Internal invariant violation.
    #[error("bad state")]
    BadState,

    /// Algorithm, curve or key size outside the compiled support set.
    #[error("not supported")]
    NotSupported,

    /// The TRNG refused to produce bytes.
    #[error("RNG failure")]
    RngFailure,

    /// Generic signature/padding verification failure.
    #[error("verification failed")]
    VerificationFailed,

    /// Generic opaque-key unwrap failure.
    #[error("decapsulation failed")]
    DecapsulationFailed,

    /// The raw primitive reported a failure.
    #[error("hardware failure")]
    Hardware,
}

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

impl From<PaddingError> for EngineError {
    fn from(err: PaddingError) -> Self {
        match err {
            PaddingError::InvalidArgument => EngineError::InvalidArgument,
            PaddingError::RngFailure => EngineError::RngFailure,
            PaddingError::VerificationFailed => EngineError::VerificationFailed,
        }
    }
}

impl From<KeyCodecError> for EngineError {
    fn from(err: KeyCodecError) -> Self {
        match err {
            KeyCodecError::InvalidArgument
            | KeyCodecError::Asn1Decode
            | KeyCodecError::Asn1Encode => EngineError::InvalidArgument,
            KeyCodecError::BufferTooSmall => EngineError::BufferTooSmall,
            KeyCodecError::UnsupportedCurve => EngineError::NotSupported,
            KeyCodecError::RngFailure => EngineError::RngFailure,
            KeyCodecError::PrimeGeneration => EngineError::BadState,
        }
    }
}

impl From<OpaqueKeyError> for EngineError {
    fn from(err: OpaqueKeyError) -> Self {
        match err {
            OpaqueKeyError::InvalidArgument => EngineError::InvalidArgument,
            OpaqueKeyError::BufferTooSmall => EngineError::BufferTooSmall,
            OpaqueKeyError::RngFailure => EngineError::RngFailure,
            OpaqueKeyError::DecapsulationFailed => EngineError::DecapsulationFailed,
        }
    }
}

impl From<HwError> for EngineError {
    fn from(_: HwError) -> Self {
        EngineError::Hardware
    }
}
