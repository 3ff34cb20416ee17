// Copyright (C) Microsoft Corporation. All rights reserved.

//! ECDSA entry points: sign, verify, generate.
//!
//! The curve arithmetic itself is entirely the accelerator's; this layer
//! only marshals keys, enforces lengths, and moves the bare scalar/point
//! buffers in and out of the raw operations.

use key_codec::{
    ecc_keypair_from_raw, ecc_keypair_to_raw, ecc_public_from_raw, ecc_public_to_raw, EccCurve,
    RawEccKeyPair, RawEccPublicKey,
};
use opaque_key::MODIFIER_SIZE;
use rsa_padding::DigestKind;
use zeroize::{Zeroize, Zeroizing};

use crate::algo::KeyProtection;
use crate::hw::PkaHardware;
use crate::keys::{ecc_opaque_key_len, parse_ecc_opaque};
use crate::{Device, EngineError, EngineResult};

fn check_digest(curve: EccCurve, digest: &[u8]) -> EngineResult<()> {
    if digest.is_empty() || digest.len() > curve.point_size() {
        tracing::error!(
            digest_len = digest.len(),
            "ecdsa: digest does not fit the curve order"
        );
        return Err(EngineError::InvalidArgument);
    }
    Ok(())
}

impl<H: PkaHardware> Device<H> {
    /// Signs `digest` with the bare scalar; the signature is `r || s`, twice
    /// the curve's field size.
    ///
    /// `signature: None` is a size query and returns that length.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` for digests longer than the field size or key
    /// buffers the selected protection cannot parse,
    /// `DecapsulationFailed` if an opaque scalar does not unwrap.
    pub fn ecdsa_sign(
        &self,
        curve: EccCurve,
        protection: KeyProtection,
        key_buffer: &[u8],
        digest: &[u8],
        signature: Option<&mut [u8]>,
    ) -> EngineResult<usize> {
        let sig_len = 2 * curve.point_size();
        let signature = match signature {
            None => return Ok(sig_len),
            Some(buf) => buf,
        };
        if signature.len() < sig_len {
            return Err(EngineError::BufferTooSmall);
        }
        check_digest(curve, digest)?;

        let scalar = match protection {
            KeyProtection::Transparent => {
                let pair = ecc_keypair_to_raw(key_buffer)?;
                if pair.curve != curve {
                    return Err(EngineError::InvalidArgument);
                }
                pair.scalar
            }
            KeyProtection::Opaque(mode) => {
                let view = parse_ecc_opaque(key_buffer, curve)?;
                self.unwrap_ecc_scalar(mode, curve, &view)?
            }
        };

        let sig = self.hw.lock().ecdsa_sign(curve, &scalar, digest)?;
        if sig.len() != sig_len {
            return Err(EngineError::BadState);
        }

        signature[..sig_len].copy_from_slice(&sig);
        Ok(sig_len)
    }

    /// Verifies an `r || s` signature over `digest`.
    ///
    /// Transparent verification takes an SPKI public key; opaque
    /// verification reads the clear point prefix of the opaque buffer.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` for shape mismatches, `VerificationFailed` when
    /// the accelerator rejects the signature.
    pub fn ecdsa_verify(
        &self,
        curve: EccCurve,
        protection: KeyProtection,
        key_buffer: &[u8],
        digest: &[u8],
        signature: &[u8],
    ) -> EngineResult<()> {
        if signature.len() != 2 * curve.point_size() {
            return Err(EngineError::InvalidArgument);
        }
        check_digest(curve, digest)?;

        let point = match protection {
            KeyProtection::Transparent => {
                let key = ecc_public_to_raw(key_buffer)?;
                if key.curve != curve {
                    return Err(EngineError::InvalidArgument);
                }
                key.point
            }
            KeyProtection::Opaque(_) => parse_ecc_opaque(key_buffer, curve)?.point.to_vec(),
        };

        let accepted = self
            .hw
            .lock()
            .ecdsa_verify(curve, &point[1..], digest, signature)?;
        if !accepted {
            return Err(EngineError::VerificationFailed);
        }
        Ok(())
    }

    /// Hashes `message` on the accelerator and signs the digest.
    ///
    /// # Errors
    ///
    /// As [`Device::ecdsa_sign`]; digests longer than the curve's field
    /// size are rejected rather than truncated.
    pub fn ecdsa_sign_message(
        &self,
        curve: EccCurve,
        digest_kind: DigestKind,
        protection: KeyProtection,
        key_buffer: &[u8],
        message: &[u8],
        signature: Option<&mut [u8]>,
    ) -> EngineResult<usize> {
        let digest = Zeroizing::new(self.hw.lock().digest(digest_kind, message));
        self.ecdsa_sign(curve, protection, key_buffer, &digest, signature)
    }

    /// Hashes `message` on the accelerator and verifies the signature over
    /// the digest.
    ///
    /// # Errors
    ///
    /// As [`Device::ecdsa_verify`].
    pub fn ecdsa_verify_message(
        &self,
        curve: EccCurve,
        digest_kind: DigestKind,
        protection: KeyProtection,
        key_buffer: &[u8],
        message: &[u8],
        signature: &[u8],
    ) -> EngineResult<()> {
        let digest = Zeroizing::new(self.hw.lock().digest(digest_kind, message));
        self.ecdsa_verify(curve, protection, key_buffer, &digest, signature)
    }

    /// Generates a fresh keypair on the accelerator and writes it to
    /// `key_out` in the requested protection form; returns the written
    /// length.
    ///
    /// # Errors
    ///
    /// `BufferTooSmall` if `key_out` cannot hold the encoded result,
    /// `BadState` if the accelerator returns malformed components.
    pub fn ecc_generate_keypair(
        &self,
        curve: EccCurve,
        protection: KeyProtection,
        key_out: &mut [u8],
    ) -> EngineResult<usize> {
        let point_size = curve.point_size();

        match protection {
            KeyProtection::Transparent => {
                let (scalar, xy) = self.hw.lock().ecc_keygen(curve)?;
                if scalar.len() != point_size || xy.len() != 2 * point_size {
                    return Err(EngineError::BadState);
                }

                let mut point = Vec::with_capacity(1 + xy.len());
                point.push(0x04);
                point.extend_from_slice(&xy);

                let pair = RawEccKeyPair {
                    curve,
                    scalar,
                    point,
                };
                Ok(ecc_keypair_from_raw(&pair, Some(key_out))?)
            }
            KeyProtection::Opaque(mode) => {
                let total = ecc_opaque_key_len(curve);
                if key_out.len() < total {
                    return Err(EngineError::BufferTooSmall);
                }

                let mut hw = self.hw.lock();
                let (scalar, xy) = hw.ecc_keygen(curve)?;
                if scalar.len() != point_size || xy.len() != 2 * point_size {
                    return Err(EngineError::BadState);
                }

                key_out[0] = 0x04;
                key_out[1..1 + 2 * point_size].copy_from_slice(&xy);

                let mut modifier = [0u8; MODIFIER_SIZE];
                if hw.fill_random(&mut modifier).is_err() {
                    key_out[..total].zeroize();
                    return Err(EngineError::RngFailure);
                }
                let wrapped = opaque_key::encapsulate_with_modifier(
                    &mut *hw,
                    mode,
                    &modifier,
                    &scalar,
                    &mut key_out[1 + 2 * point_size..total],
                );
                modifier.zeroize();

                if let Err(err) = wrapped {
                    key_out[..total].zeroize();
                    return Err(err.into());
                }
                Ok(total)
            }
        }
    }

    /// Extracts the public half of a private key buffer as DER SPKI.
    ///
    /// `out` follows the size-query pattern: `None` reports the required
    /// size.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` for a buffer the selected protection cannot parse,
    /// `BufferTooSmall` for an undersized output buffer.
    pub fn ecc_public_key(
        &self,
        curve: EccCurve,
        protection: KeyProtection,
        key_buffer: &[u8],
        out: Option<&mut [u8]>,
    ) -> EngineResult<usize> {
        let point = match protection {
            KeyProtection::Transparent => {
                let pair = ecc_keypair_to_raw(key_buffer)?;
                if pair.curve != curve {
                    return Err(EngineError::InvalidArgument);
                }
                pair.point
            }
            KeyProtection::Opaque(_) => parse_ecc_opaque(key_buffer, curve)?.point.to_vec(),
        };

        let key = RawEccPublicKey { curve, point };
        Ok(ecc_public_from_raw(&key, out)?)
    }
}
