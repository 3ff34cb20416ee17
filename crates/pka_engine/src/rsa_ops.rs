// Copyright (C) Microsoft Corporation. All rights reserved.

//! RSA entry points: sign, verify, encrypt, decrypt, generate.
//!
//! Operation order is the same everywhere: validate lengths, run the
//! padding/marshalling work, and take the hardware lock only around the raw
//! `modexp`/keygen call. Private key material recovered from an opaque
//! buffer lives in `Zeroizing` scratch and is cleared on every exit path.

use key_codec::{
    generate_primes, rsa_keypair_from_raw, rsa_keypair_to_raw, rsa_public_from_raw,
    rsa_public_to_raw, RawRsaKeyPair, DEFAULT_PUBLIC_EXPONENT,
};
use opaque_key::MODIFIER_SIZE;
use zeroize::{Zeroize, Zeroizing};

use crate::algo::{KeyProtection, RsaCryptScheme, RsaSignScheme};
use crate::hw::PkaHardware;
use crate::keys::{
    parse_rsa_opaque, rsa_opaque_key_len, rsa_opaque_payload_offset, write_rsa_opaque_header,
};
use crate::{Device, EngineError, EngineResult};

const RSA_EXP_BYTES: [u8; 4] = DEFAULT_PUBLIC_EXPONENT.to_be_bytes();

fn check_key_bits(key_bits: usize) -> EngineResult<usize> {
    // The accelerator handles 1024-bit granularity only.
    if key_bits == 0 || key_bits % 1024 != 0 {
        tracing::error!(key_bits, "rsa: unsupported key size");
        return Err(EngineError::NotSupported);
    }
    Ok(key_bits / 8)
}

impl<H: PkaHardware> Device<H> {
    fn load_rsa_private(
        &self,
        protection: KeyProtection,
        key_buffer: &[u8],
        key_bytes: usize,
    ) -> EngineResult<RawRsaKeyPair> {
        match protection {
            KeyProtection::Transparent => Ok(rsa_keypair_to_raw(key_buffer, key_bytes)?),
            KeyProtection::Opaque(mode) => {
                let view = parse_rsa_opaque(key_buffer, key_bytes)?;
                let priv_exp = self.unwrap_rsa_priv_exp(mode, &view)?;
                Ok(RawRsaKeyPair {
                    modulus: view.modulus.to_vec(),
                    priv_exp,
                })
            }
        }
    }

    fn load_rsa_public(
        &self,
        protection: KeyProtection,
        key_buffer: &[u8],
        key_bytes: usize,
    ) -> EngineResult<(Vec<u8>, [u8; 4])> {
        match protection {
            KeyProtection::Transparent => {
                let key = rsa_public_to_raw(key_buffer, key_bytes)?;
                Ok((key.modulus, key.exponent))
            }
            KeyProtection::Opaque(_) => {
                // The modulus prefix of an opaque buffer is in the clear;
                // public operations never need the wrapped half.
                if key_buffer.len() < key_bytes {
                    return Err(EngineError::InvalidArgument);
                }
                Ok((key_buffer[..key_bytes].to_vec(), RSA_EXP_BYTES))
            }
        }
    }

    /// Signs a digest (or caller-formatted raw data for
    /// `Pkcs1v15 { digest: None }`).
    ///
    /// `signature: None` is a size query and returns the key size without
    /// touching the hardware.
    ///
    /// # Errors
    ///
    /// `NotSupported` for key sizes outside 1024-bit granularity,
    /// `BufferTooSmall` for an undersized signature buffer, plus whatever
    /// the padding and key layers report.
    pub fn rsa_sign(
        &self,
        scheme: RsaSignScheme,
        protection: KeyProtection,
        key_buffer: &[u8],
        key_bits: usize,
        digest: &[u8],
        signature: Option<&mut [u8]>,
    ) -> EngineResult<usize> {
        let key_bytes = check_key_bits(key_bits)?;
        let signature = match signature {
            None => return Ok(key_bytes),
            Some(buf) => buf,
        };
        if signature.len() < key_bytes {
            return Err(EngineError::BufferTooSmall);
        }

        let mut em = Zeroizing::new(vec![0u8; key_bytes]);
        match scheme {
            RsaSignScheme::Pkcs1v15 { digest: kind } => {
                rsa_padding::encode_pkcs1v15(kind, digest, &mut em)?;
            }
            RsaSignScheme::Pss {
                digest: kind,
                salt_len,
            } => {
                let mut hash = self.hw_hash(kind);
                let mut rng = self.hw_rng();
                rsa_padding::encode_pss(
                    kind, key_bits, digest, salt_len, &mut em, &mut hash, &mut rng,
                )?;
            }
        }

        let key = self.load_rsa_private(protection, key_buffer, key_bytes)?;
        let sig = self.hw.lock().modexp(&em, &key.modulus, &key.priv_exp)?;
        if sig.len() != key_bytes {
            return Err(EngineError::BadState);
        }

        signature[..key_bytes].copy_from_slice(&sig);
        Ok(key_bytes)
    }

    /// Verifies a signature over a digest.
    ///
    /// Transparent verification takes an SPKI public key; opaque
    /// verification reads the clear modulus prefix of the opaque buffer and
    /// uses the default public exponent.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` for shape mismatches caught before the hardware
    /// call; every padding-level rejection is the generic
    /// `VerificationFailed`.
    pub fn rsa_verify(
        &self,
        scheme: RsaSignScheme,
        protection: KeyProtection,
        key_buffer: &[u8],
        key_bits: usize,
        digest: &[u8],
        signature: &[u8],
    ) -> EngineResult<()> {
        let key_bytes = check_key_bits(key_bits)?;
        if signature.len() != key_bytes {
            return Err(EngineError::InvalidArgument);
        }

        let (modulus, exponent) = self.load_rsa_public(protection, key_buffer, key_bytes)?;
        let mut em =
            Zeroizing::new(self.hw.lock().modexp(signature, &modulus, &exponent)?);
        if em.len() != key_bytes {
            return Err(EngineError::BadState);
        }

        match scheme {
            RsaSignScheme::Pkcs1v15 { digest: kind } => {
                rsa_padding::verify_pkcs1v15(kind, digest, &em)?;
            }
            RsaSignScheme::Pss {
                digest: kind,
                salt_len,
            } => {
                let mut hash = self.hw_hash(kind);
                rsa_padding::verify_pss(kind, key_bits, digest, salt_len, &mut em, &mut hash)?;
            }
        }

        Ok(())
    }

    /// Hashes `message` on the accelerator and signs the digest.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` for schemes without a digest algorithm (raw
    /// PKCS#1 v1.5), plus everything [`Device::rsa_sign`] reports.
    pub fn rsa_sign_message(
        &self,
        scheme: RsaSignScheme,
        protection: KeyProtection,
        key_buffer: &[u8],
        key_bits: usize,
        message: &[u8],
        signature: Option<&mut [u8]>,
    ) -> EngineResult<usize> {
        let kind = scheme.digest_kind().ok_or(EngineError::InvalidArgument)?;
        let digest = Zeroizing::new(self.hw.lock().digest(kind, message));
        self.rsa_sign(scheme, protection, key_buffer, key_bits, &digest, signature)
    }

    /// Hashes `message` on the accelerator and verifies the signature over
    /// the digest.
    ///
    /// # Errors
    ///
    /// As [`Device::rsa_verify`].
    pub fn rsa_verify_message(
        &self,
        scheme: RsaSignScheme,
        protection: KeyProtection,
        key_buffer: &[u8],
        key_bits: usize,
        message: &[u8],
        signature: &[u8],
    ) -> EngineResult<()> {
        let kind = scheme.digest_kind().ok_or(EngineError::InvalidArgument)?;
        let digest = Zeroizing::new(self.hw.lock().digest(kind, message));
        self.rsa_verify(scheme, protection, key_buffer, key_bits, &digest, signature)
    }

    /// Encrypts `plaintext` under the public key.
    ///
    /// `ciphertext: None` is a size query and returns the key size.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` if `plaintext` exceeds the scheme's capacity for
    /// the key size, `BufferTooSmall` for an undersized output buffer.
    pub fn rsa_encrypt(
        &self,
        scheme: RsaCryptScheme<'_>,
        protection: KeyProtection,
        key_buffer: &[u8],
        key_bits: usize,
        plaintext: &[u8],
        ciphertext: Option<&mut [u8]>,
    ) -> EngineResult<usize> {
        let key_bytes = check_key_bits(key_bits)?;
        let ciphertext = match ciphertext {
            None => return Ok(key_bytes),
            Some(buf) => buf,
        };
        if ciphertext.len() < key_bytes {
            return Err(EngineError::BufferTooSmall);
        }

        let max_len = scheme
            .max_plaintext_len(key_bytes)
            .ok_or(EngineError::InvalidArgument)?;
        if plaintext.len() > max_len {
            tracing::error!(
                plaintext_len = plaintext.len(),
                max_len,
                "rsa: plaintext too long for key"
            );
            return Err(EngineError::InvalidArgument);
        }

        let mut em = Zeroizing::new(vec![0u8; key_bytes]);
        match scheme {
            RsaCryptScheme::Pkcs1v15 => {
                let mut rng = self.hw_rng();
                rsa_padding::encode_enc_pkcs1v15(plaintext, &mut em, &mut rng)?;
            }
            RsaCryptScheme::Oaep { digest, label } => {
                let mut hash = self.hw_hash(digest);
                let mut rng = self.hw_rng();
                rsa_padding::encode_oaep(digest, plaintext, label, &mut em, &mut hash, &mut rng)?;
            }
        }

        let (modulus, exponent) = self.load_rsa_public(protection, key_buffer, key_bytes)?;
        let ct = self.hw.lock().modexp(&em, &modulus, &exponent)?;
        if ct.len() != key_bytes {
            return Err(EngineError::BadState);
        }

        ciphertext[..key_bytes].copy_from_slice(&ct);
        Ok(key_bytes)
    }

    /// Decrypts a ciphertext block under the private key.
    ///
    /// `plaintext: None` is a size query and returns the scheme's maximum
    /// plaintext length for the key; the actual message may be shorter. The
    /// provided buffer must hold that maximum, so the buffer check cannot
    /// leak the padded length.
    ///
    /// # Errors
    ///
    /// `InvalidArgument`/`BufferTooSmall` for shape mismatches caught
    /// before the hardware call; every padding-level rejection is the
    /// generic `VerificationFailed`.
    pub fn rsa_decrypt(
        &self,
        scheme: RsaCryptScheme<'_>,
        protection: KeyProtection,
        key_buffer: &[u8],
        key_bits: usize,
        ciphertext: &[u8],
        plaintext: Option<&mut [u8]>,
    ) -> EngineResult<usize> {
        let key_bytes = check_key_bits(key_bits)?;
        let max_len = scheme
            .max_plaintext_len(key_bytes)
            .ok_or(EngineError::InvalidArgument)?;

        let plaintext = match plaintext {
            None => return Ok(max_len),
            Some(buf) => buf,
        };
        if plaintext.len() < max_len {
            return Err(EngineError::BufferTooSmall);
        }
        if ciphertext.len() != key_bytes {
            return Err(EngineError::InvalidArgument);
        }

        let key = self.load_rsa_private(protection, key_buffer, key_bytes)?;
        let mut em = Zeroizing::new(
            self.hw
                .lock()
                .modexp(ciphertext, &key.modulus, &key.priv_exp)?,
        );
        if em.len() != key_bytes {
            return Err(EngineError::BadState);
        }

        let written = match scheme {
            RsaCryptScheme::Pkcs1v15 => rsa_padding::decode_enc_pkcs1v15(&em, plaintext)?,
            RsaCryptScheme::Oaep { digest, label } => {
                let mut hash = self.hw_hash(digest);
                rsa_padding::decode_oaep(digest, &mut em, label, plaintext, &mut hash)?
            }
        };

        Ok(written)
    }

    /// Generates a fresh keypair and writes it to `key_out` in the
    /// requested protection form; returns the written length.
    ///
    /// Primes are generated on the host from accelerator entropy, handed to
    /// the hardware keypair operation, and dropped (zeroed) immediately
    /// after.
    ///
    /// # Errors
    ///
    /// `NotSupported` for key sizes outside 1024-bit granularity,
    /// `BufferTooSmall` if `key_out` cannot hold the encoded result.
    pub fn rsa_generate_keypair(
        &self,
        key_bits: usize,
        protection: KeyProtection,
        key_out: &mut [u8],
    ) -> EngineResult<usize> {
        let key_bytes = check_key_bits(key_bits)?;

        let primes = {
            let mut rng = self.hw_rng();
            generate_primes(key_bits, &mut rng)?
        };

        let pair = self
            .hw
            .lock()
            .rsa_keygen(&primes.p, &primes.q, &RSA_EXP_BYTES)?;
        drop(primes);

        if pair.modulus.len() != key_bytes
            || pair.priv_exp.is_empty()
            || pair.priv_exp.len() > key_bytes
        {
            return Err(EngineError::BadState);
        }

        match protection {
            KeyProtection::Transparent => {
                let mut rng = self.hw_rng();
                Ok(rsa_keypair_from_raw(
                    &pair.modulus,
                    &pair.priv_exp,
                    DEFAULT_PUBLIC_EXPONENT,
                    &mut rng,
                    Some(key_out),
                )?)
            }
            KeyProtection::Opaque(mode) => {
                let priv_len = pair.priv_exp.len();
                let total = rsa_opaque_key_len(key_bytes, priv_len);
                if key_out.len() < total {
                    return Err(EngineError::BufferTooSmall);
                }

                write_rsa_opaque_header(key_out, &pair.modulus, priv_len);
                let offset = rsa_opaque_payload_offset(key_bytes);

                let mut hw = self.hw.lock();
                let mut modifier = [0u8; MODIFIER_SIZE];
                if hw.fill_random(&mut modifier).is_err() {
                    key_out[..total].zeroize();
                    return Err(EngineError::RngFailure);
                }
                let wrapped = opaque_key::encapsulate_with_modifier(
                    &mut *hw,
                    mode,
                    &modifier,
                    &pair.priv_exp,
                    &mut key_out[offset..total],
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
    pub fn rsa_public_key(
        &self,
        protection: KeyProtection,
        key_buffer: &[u8],
        key_bits: usize,
        out: Option<&mut [u8]>,
    ) -> EngineResult<usize> {
        let key_bytes = check_key_bits(key_bits)?;

        let modulus = match protection {
            KeyProtection::Transparent => {
                rsa_keypair_to_raw(key_buffer, key_bytes)?.modulus
            }
            KeyProtection::Opaque(_) => {
                if key_buffer.len() < key_bytes {
                    return Err(EngineError::InvalidArgument);
                }
                key_buffer[..key_bytes].to_vec()
            }
        };

        Ok(rsa_public_from_raw(&modulus, DEFAULT_PUBLIC_EXPONENT, out)?)
    }
}
