// Copyright (C) Microsoft Corporation. All rights reserved.

//! EMSA-PSS encoding and verification (RFC 8017 Sections 9.1.1 and 9.1.2).
//!
//! The encoding operates over `emBits = modulusBits - 1`, one bit less than
//! the key, so the encoded integer always stays below the modulus. The block
//! handed to the raw primitive is the full key size; when `emBits` rounds to
//! one byte fewer than the key, the leading block byte is forced to zero,
//! and within the encoded message the leading `8 * emLen - emBits` bits are
//! forced to zero. That one formula covers byte-aligned and non-aligned
//! modulus sizes alike.

use zeroize::Zeroize;

use crate::{
    leftmost_x_bits_are_zero, mgf1, zero_leftmost_x_bits, DigestKind, PaddingError, PaddingResult,
    SaltLen,
};

// The smallest modulus the schemes are defined over (128 bits, as the
// original driver enforces).
const MIN_MODULUS_BITS: usize = 128;

struct PssGeometry {
    // bytes of the block that are not part of the encoded message (0 or 1)
    offset: usize,
    // encoded message length in bytes
    em_len: usize,
    // forced-zero bits at the start of the encoded message
    n_zero_bits: usize,
}

fn geometry(modulus_bits: usize, block_len: usize) -> PaddingResult<PssGeometry> {
    if modulus_bits < MIN_MODULUS_BITS || block_len != modulus_bits.div_ceil(8) {
        return Err(PaddingError::InvalidArgument);
    }

    let em_bits = modulus_bits - 1;
    let em_len = em_bits.div_ceil(8);
    Ok(PssGeometry {
        offset: block_len - em_len,
        em_len,
        n_zero_bits: 8 * em_len - em_bits,
    })
}

fn resolve_salt_len(salt_len: SaltLen, em_len: usize, h_len: usize) -> PaddingResult<usize> {
    match salt_len {
        SaltLen::Exact(s_len) => {
            if s_len > em_len || s_len + h_len + 2 > em_len {
                tracing::error!(em_len, h_len, s_len, "pss: salt does not fit the key");
                return Err(PaddingError::InvalidArgument);
            }
            Ok(s_len)
        }
        SaltLen::Any => {
            // Prefer the hash length (FIPS 186-4 Section 5.5 (e)); fall back
            // to the largest salt that fits, down to hLen - 2.
            if em_len >= 2 * h_len + 2 {
                Ok(h_len)
            } else if em_len >= 2 * h_len {
                Ok(em_len - h_len - 2)
            } else {
                tracing::error!(em_len, h_len, "pss: key too small for any salt");
                Err(PaddingError::InvalidArgument)
            }
        }
    }
}

fn hash_mprime(
    digest: &[u8],
    salt: &[u8],
    hash: &mut impl FnMut(&[u8]) -> Vec<u8>,
) -> Vec<u8> {
    // M' = 0x00 x 8 || mHash || salt
    let mut m_prime = Vec::with_capacity(8 + digest.len() + salt.len());
    m_prime.extend_from_slice(&[0u8; 8]);
    m_prime.extend_from_slice(digest);
    m_prime.extend_from_slice(salt);
    hash(&m_prime)
}

/// Builds the EMSA-PSS block `maskedDB || H || 0xbc` into `em`, which must
/// be exactly the key size for `modulus_bits`.
///
/// The salt is drawn from `rng`; `SaltLen::Any` resolves to the hash length
/// when the key allows it, otherwise to the largest salt that fits.
///
/// # Errors
///
/// `PaddingError::InvalidArgument` if the digest length does not match the
/// algorithm, the block size does not match `modulus_bits`, or the resolved
/// salt cannot fit. `PaddingError::RngFailure` if the RNG fails; `em` is
/// zeroed before that error is returned.
pub fn encode_pss(
    digest_kind: DigestKind,
    modulus_bits: usize,
    digest: &[u8],
    salt_len: SaltLen,
    em: &mut [u8],
    hash: &mut impl FnMut(&[u8]) -> Vec<u8>,
    rng: &mut impl FnMut(&mut [u8]) -> Result<(), ()>,
) -> PaddingResult<()> {
    let h_len = digest_kind.hash_len();
    if digest.len() != h_len {
        tracing::error!(
            digest_len = digest.len(),
            "pss: digest length does not match algorithm"
        );
        return Err(PaddingError::InvalidArgument);
    }

    let geo = geometry(modulus_bits, em.len())?;
    let s_len = resolve_salt_len(salt_len, geo.em_len, h_len)?;

    em.fill(0);
    let sub = &mut em[geo.offset..];
    let db_len = geo.em_len - h_len - 1;

    // DB = PS || 0x01 || salt
    sub[db_len - s_len - 1] = 0x01;
    if rng(&mut sub[db_len - s_len..db_len]).is_err() {
        sub.zeroize();
        return Err(PaddingError::RngFailure);
    }

    let h = hash_mprime(digest, &sub[db_len - s_len..db_len], hash);

    mgf1::mask_xor(&mut sub[..db_len], &h, hash)?;
    zero_leftmost_x_bits(sub, geo.n_zero_bits);

    sub[db_len..geo.em_len - 1].copy_from_slice(&h);
    sub[geo.em_len - 1] = 0xbc;

    Ok(())
}

/// Checks a recovered EMSA-PSS block against `digest`.
///
/// `em` is the full key-size block returned by the raw primitive; it is
/// consumed destructively (unmasked in place) and zeroed before return.
/// `SaltLen::Exact` additionally requires the recovered salt to have that
/// length; `SaltLen::Any` accepts whatever the block encodes.
///
/// # Errors
///
/// `PaddingError::InvalidArgument` if the digest length does not match the
/// algorithm or the block size does not match `modulus_bits`. Every
/// structural or comparison failure is the single generic
/// `PaddingError::VerificationFailed`.
pub fn verify_pss(
    digest_kind: DigestKind,
    modulus_bits: usize,
    digest: &[u8],
    salt_len: SaltLen,
    em: &mut [u8],
    hash: &mut impl FnMut(&[u8]) -> Vec<u8>,
) -> PaddingResult<()> {
    let h_len = digest_kind.hash_len();
    if digest.len() != h_len {
        return Err(PaddingError::InvalidArgument);
    }

    let geo = geometry(modulus_bits, em.len())?;
    let result = verify_pss_inner(digest, salt_len, em, hash, &geo, h_len);
    em.zeroize();
    result
}

fn verify_pss_inner(
    digest: &[u8],
    salt_len: SaltLen,
    em: &mut [u8],
    hash: &mut impl FnMut(&[u8]) -> Vec<u8>,
    geo: &PssGeometry,
    h_len: usize,
) -> PaddingResult<()> {
    if geo.em_len < h_len + 2 {
        return Err(PaddingError::VerificationFailed);
    }

    if em[em.len() - 1] != 0xbc {
        return Err(PaddingError::VerificationFailed);
    }

    if em[..geo.offset].iter().any(|&b| b != 0) {
        return Err(PaddingError::VerificationFailed);
    }

    let sub = &mut em[geo.offset..];
    let db_len = geo.em_len - h_len - 1;

    if !leftmost_x_bits_are_zero(sub, geo.n_zero_bits) {
        return Err(PaddingError::VerificationFailed);
    }

    let h = sub[db_len..geo.em_len - 1].to_vec();
    mgf1::mask_xor(&mut sub[..db_len], &h, hash)?;
    zero_leftmost_x_bits(sub, geo.n_zero_bits);

    let db = &sub[..db_len];
    let delim = match db.iter().position(|&b| b != 0) {
        Some(idx) if db[idx] == 0x01 => idx,
        _ => return Err(PaddingError::VerificationFailed),
    };
    let salt = &db[delim + 1..];

    if let SaltLen::Exact(expected) = salt_len {
        if salt.len() != expected {
            return Err(PaddingError::VerificationFailed);
        }
    }

    let h_prime = hash_mprime(digest, salt, hash);
    if h_prime != h {
        return Err(PaddingError::VerificationFailed);
    }

    Ok(())
}
