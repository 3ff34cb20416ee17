// Copyright (C) Microsoft Corporation. All rights reserved.

//! PKCS#1 v1.5 block formats (RFC 8017 Sections 9.2 and 7.2).
//!
//! Signature side: EMSA-PKCS1-v1_5 encode plus re-encode-and-compare
//! verification. There is deliberately no parse path on verify; lax parsing
//! is what enables the Bleichenbacher forgery family.
//!
//! Encryption side: EME-PKCS1-v1_5 (block type 2) encode/decode. Decode
//! evaluates every structural check before reporting, and reports all
//! defects as one generic failure.

use zeroize::Zeroize;

use crate::{DigestKind, PaddingError, PaddingResult};

/// Builds the EMSA-PKCS1-v1_5 block `0x00 || 0x01 || PS || 0x00 || T` into
/// `em`, which must be exactly the key size.
///
/// `digest_kind` selects the DER DigestInfo prefix for `T`; `None` signs the
/// raw `digest` bytes without a prefix. The block always carries at least
/// 8 bytes of `0xff` padding; a key too small for that fails before anything
/// is written.
///
/// # Errors
///
/// `PaddingError::InvalidArgument` if the digest length does not match the
/// algorithm, or `em` cannot hold `T` plus the minimum padding.
pub fn encode_pkcs1v15(
    digest_kind: Option<DigestKind>,
    digest: &[u8],
    em: &mut [u8],
) -> PaddingResult<()> {
    let em_len = em.len();

    let prefix: &[u8] = match digest_kind {
        Some(kind) => {
            if digest.len() != kind.hash_len() {
                tracing::error!(
                    digest_len = digest.len(),
                    "pkcs1v15: digest length does not match algorithm"
                );
                return Err(PaddingError::InvalidArgument);
            }
            kind.digest_info_prefix()
        }
        None => &[],
    };

    let t_len = prefix
        .len()
        .checked_add(digest.len())
        .ok_or(PaddingError::InvalidArgument)?;

    // 3 fixed bytes plus the 8-byte padding floor; the floor is what blocks
    // the low-exponent forgery variants.
    if em_len < t_len + 11 {
        tracing::error!(em_len, t_len, "pkcs1v15: intended encoded message too short");
        return Err(PaddingError::InvalidArgument);
    }
    let ps_len = em_len - t_len - 3;

    em[0] = 0x00;
    em[1] = 0x01;
    em[2..2 + ps_len].fill(0xff);
    em[2 + ps_len] = 0x00;
    em[em_len - t_len..em_len - digest.len()].copy_from_slice(prefix);
    em[em_len - digest.len()..].copy_from_slice(digest);

    Ok(())
}

/// Checks a recovered signature block against the expected encoding of
/// `digest`.
///
/// The expected block is rebuilt with [`encode_pkcs1v15`] and compared for
/// exact byte equality; no independent parse of `em` exists.
///
/// # Errors
///
/// `PaddingError::InvalidArgument` for inputs the encoder rejects,
/// `PaddingError::VerificationFailed` on any mismatch.
pub fn verify_pkcs1v15(
    digest_kind: Option<DigestKind>,
    digest: &[u8],
    em: &[u8],
) -> PaddingResult<()> {
    let mut expected = vec![0u8; em.len()];
    encode_pkcs1v15(digest_kind, digest, &mut expected)?;

    if em != expected.as_slice() {
        return Err(PaddingError::VerificationFailed);
    }

    Ok(())
}

/// Builds the EME-PKCS1-v1_5 block `0x00 || 0x02 || PS || 0x00 || M` into
/// `em`, where `PS` is at least 8 non-zero random bytes.
///
/// # Errors
///
/// `PaddingError::InvalidArgument` if `msg` exceeds `em.len() - 11`;
/// `PaddingError::RngFailure` if the RNG fails, in which case `em` is zeroed
/// before returning.
pub fn encode_enc_pkcs1v15(
    msg: &[u8],
    em: &mut [u8],
    rng: &mut impl FnMut(&mut [u8]) -> Result<(), ()>,
) -> PaddingResult<()> {
    let em_len = em.len();

    if em_len < 11 || msg.len() > em_len - 11 {
        tracing::error!(
            em_len,
            msg_len = msg.len(),
            "pkcs1v15: message too long for key"
        );
        return Err(PaddingError::InvalidArgument);
    }
    let ps_len = em_len - msg.len() - 3;

    em[0] = 0x00;
    em[1] = 0x02;

    let filled: Result<(), ()> = {
        let (ps, tail) = em[2..].split_at_mut(ps_len);
        rng(ps).and_then(|()| {
            // PS must not contain zero bytes; redraw any that came up zero.
            let mut byte = [0u8; 1];
            for b in ps.iter_mut() {
                while *b == 0 {
                    rng(&mut byte)?;
                    *b = byte[0];
                }
            }
            tail[0] = 0x00;
            tail[1..].copy_from_slice(msg);
            Ok(())
        })
    };

    if filled.is_err() {
        em.zeroize();
        return Err(PaddingError::RngFailure);
    }

    Ok(())
}

/// Recovers the message from an EME-PKCS1-v1_5 block.
///
/// `out` must be able to hold the largest possible message
/// (`em.len() - 11`); that is checked before the block is inspected so the
/// error cannot act as a padding oracle. The block is scanned in full and
/// all structural defects collapse into one generic failure.
///
/// # Errors
///
/// `PaddingError::InvalidArgument` for an undersized `out` or block;
/// `PaddingError::VerificationFailed` for any padding defect.
pub fn decode_enc_pkcs1v15(em: &[u8], out: &mut [u8]) -> PaddingResult<usize> {
    let em_len = em.len();

    if em_len < 11 {
        return Err(PaddingError::InvalidArgument);
    }
    if out.len() < em_len - 11 {
        return Err(PaddingError::InvalidArgument);
    }

    // Locate the PS delimiter without stopping at the first defect.
    let mut first_zero = 0usize;
    let mut zero_seen = false;
    for (idx, &b) in em.iter().enumerate().skip(2) {
        if b == 0 && !zero_seen {
            first_zero = idx;
            zero_seen = true;
        }
    }

    let header_ok = em[0] == 0x00 && em[1] == 0x02;
    let ps_ok = zero_seen && first_zero >= 10;

    if !(header_ok && ps_ok) {
        return Err(PaddingError::VerificationFailed);
    }

    let msg = &em[first_zero + 1..];
    out[..msg.len()].copy_from_slice(msg);
    Ok(msg.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{broken_rng, counter_rng};

    const SHA256_PREFIX_LEN: usize = 19;

    #[test]
    fn sha256_block_layout_is_exact() {
        // RSA-2048 block for a SHA-256 digest of 32 bytes of 0x11:
        // 0x00 0x01, 202 bytes of 0xff, 0x00, 19-byte DigestInfo, digest.
        let digest = [0x11u8; 32];
        let mut em = vec![0u8; 256];
        encode_pkcs1v15(Some(DigestKind::Sha256), &digest, &mut em).unwrap();

        assert_eq!(em[0], 0x00);
        assert_eq!(em[1], 0x01);
        assert!(em[2..204].iter().all(|&b| b == 0xff));
        assert_eq!(em[2..204].len(), 202);
        assert_eq!(em[204], 0x00);
        assert_eq!(
            &em[205..205 + SHA256_PREFIX_LEN],
            DigestKind::Sha256.digest_info_prefix()
        );
        assert_eq!(&em[224..], &digest);
    }

    #[test]
    fn encoding_is_deterministic() {
        let digest = [0xabu8; 32];
        let mut a = vec![0u8; 128];
        let mut b = vec![0u8; 128];
        encode_pkcs1v15(Some(DigestKind::Sha256), &digest, &mut a).unwrap();
        encode_pkcs1v15(Some(DigestKind::Sha256), &digest, &mut b).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn minimum_padding_is_enforced() {
        let digest = [0x42u8; 32];
        // t_len = 19 + 32 = 51; the smallest workable block is 62 bytes.
        let mut em = vec![0u8; 61];
        assert_eq!(
            encode_pkcs1v15(Some(DigestKind::Sha256), &digest, &mut em),
            Err(PaddingError::InvalidArgument)
        );

        let mut em = vec![0u8; 62];
        encode_pkcs1v15(Some(DigestKind::Sha256), &digest, &mut em).unwrap();
        assert!(em[2..10].iter().all(|&b| b == 0xff));
    }

    #[test]
    fn raw_mode_skips_digest_info() {
        let data = [0x5au8; 24];
        let mut em = vec![0u8; 64];
        encode_pkcs1v15(None, &data, &mut em).unwrap();

        assert_eq!(em[0], 0x00);
        assert_eq!(em[1], 0x01);
        assert_eq!(em[64 - 24 - 1], 0x00);
        assert_eq!(&em[64 - 24..], &data);
    }

    #[test]
    fn digest_length_must_match_algorithm() {
        let mut em = vec![0u8; 256];
        assert_eq!(
            encode_pkcs1v15(Some(DigestKind::Sha256), &[0u8; 20], &mut em),
            Err(PaddingError::InvalidArgument)
        );
    }

    #[test]
    fn verify_accepts_and_rejects() {
        let digest = [0x33u8; 48];
        let mut em = vec![0u8; 256];
        encode_pkcs1v15(Some(DigestKind::Sha384), &digest, &mut em).unwrap();

        verify_pkcs1v15(Some(DigestKind::Sha384), &digest, &em).unwrap();

        for idx in [0usize, 1, 5, 200, 255] {
            let mut bad = em.clone();
            bad[idx] ^= 0x01;
            assert_eq!(
                verify_pkcs1v15(Some(DigestKind::Sha384), &digest, &bad),
                Err(PaddingError::VerificationFailed)
            );
        }
    }

    #[test]
    fn enc_roundtrip() {
        let msg = b"session key material";
        let mut em = vec![0u8; 128];
        encode_enc_pkcs1v15(msg, &mut em, &mut counter_rng()).unwrap();

        assert_eq!(em[0], 0x00);
        assert_eq!(em[1], 0x02);
        let ps_len = 128 - msg.len() - 3;
        assert!(em[2..2 + ps_len].iter().all(|&b| b != 0));
        assert_eq!(em[2 + ps_len], 0x00);

        let mut out = vec![0u8; 128 - 11];
        let n = decode_enc_pkcs1v15(&em, &mut out).unwrap();
        assert_eq!(&out[..n], msg);
    }

    #[test]
    fn enc_message_too_long_writes_nothing() {
        let msg = [0u8; 54];
        let mut em = vec![0xaau8; 64];
        assert_eq!(
            encode_enc_pkcs1v15(&msg, &mut em, &mut counter_rng()),
            Err(PaddingError::InvalidArgument)
        );
        assert!(em.iter().all(|&b| b == 0xaa));
    }

    #[test]
    fn enc_rng_failure_zeroes_the_block() {
        let mut em = vec![0xaau8; 64];
        assert_eq!(
            encode_enc_pkcs1v15(b"msg", &mut em, &mut broken_rng()),
            Err(PaddingError::RngFailure)
        );
        assert!(em.iter().all(|&b| b == 0));
    }

    #[test]
    fn enc_decode_rejects_structural_defects() {
        let msg = b"abc";
        let mut em = vec![0u8; 64];
        encode_enc_pkcs1v15(msg, &mut em, &mut counter_rng()).unwrap();
        let mut out = vec![0u8; 53];

        let mut bad = em.clone();
        bad[0] = 0x01;
        assert_eq!(
            decode_enc_pkcs1v15(&bad, &mut out),
            Err(PaddingError::VerificationFailed)
        );

        let mut bad = em.clone();
        bad[1] = 0x01;
        assert_eq!(
            decode_enc_pkcs1v15(&bad, &mut out),
            Err(PaddingError::VerificationFailed)
        );

        // A zero inside the first 8 padding bytes shortens PS below the floor.
        let mut bad = em.clone();
        bad[4] = 0x00;
        assert_eq!(
            decode_enc_pkcs1v15(&bad, &mut out),
            Err(PaddingError::VerificationFailed)
        );

        // No delimiter at all.
        let mut bad = em.clone();
        for b in bad.iter_mut().skip(2) {
            if *b == 0 {
                *b = 0x7f;
            }
        }
        assert_eq!(
            decode_enc_pkcs1v15(&bad, &mut out),
            Err(PaddingError::VerificationFailed)
        );
    }
}
