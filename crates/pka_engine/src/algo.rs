// Copyright (C) Microsoft Corporation. All rights reserved.

//! Scheme and key-protection selectors.
//!
//! Small closed enums, matched explicitly at each entry point. Unknown
//! algorithm identifiers from foreign APIs must be resolved to these types
//! at the boundary; anything that does not map is `NotSupported` there.

use opaque_key::BlobMode;
use rsa_padding::{DigestKind, SaltLen};

/// RSA signature scheme parameters.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RsaSignScheme {
    /// PKCS#1 v1.5. `digest: None` signs caller-formatted raw data, without
    /// a DigestInfo prefix.
    Pkcs1v15 {
        /// Digest algorithm the input was hashed with, or `None` for raw.
        digest: Option<DigestKind>,
    },

    /// PSS with MGF1 over the same digest algorithm.
    Pss {
        /// Digest algorithm for the message hash and MGF1.
        digest: DigestKind,

        /// Requested salt length.
        salt_len: SaltLen,
    },
}

impl RsaSignScheme {
    /// The digest algorithm message-level operations hash with, if any.
    pub(crate) fn digest_kind(self) -> Option<DigestKind> {
        match self {
            RsaSignScheme::Pkcs1v15 { digest } => digest,
            RsaSignScheme::Pss { digest, .. } => Some(digest),
        }
    }
}

/// RSA encryption scheme parameters.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RsaCryptScheme<'a> {
    /// PKCS#1 v1.5 block type 2.
    Pkcs1v15,

    /// OAEP with MGF1 over the same digest algorithm.
    Oaep {
        /// Digest algorithm for the label hash and MGF1.
        digest: DigestKind,

        /// Label bound to the ciphertext; `None` means the empty label.
        label: Option<&'a [u8]>,
    },
}

impl RsaCryptScheme<'_> {
    /// Largest plaintext the scheme can carry in a `key_bytes` block.
    pub(crate) fn max_plaintext_len(&self, key_bytes: usize) -> Option<usize> {
        match self {
            RsaCryptScheme::Pkcs1v15 => key_bytes.checked_sub(11),
            RsaCryptScheme::Oaep { digest, .. } => {
                key_bytes.checked_sub(2 * digest.hash_len() + 2)
            }
        }
    }
}

/// How private key material travels through the API.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KeyProtection {
    /// Portable DER; the secret half is visible to the host.
    Transparent,

    /// The secret half is wrapped by the hardware blob primitive and never
    /// exists in the clear outside the accelerator.
    Opaque(BlobMode),
}
