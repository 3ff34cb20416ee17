// Copyright (C) Microsoft Corporation. All rights reserved.

//! EME-OAEP encoding and decoding (RFC 8017 Section 7.1).
//!
//! Decode-side note: RFC 8017 7.1.2 requires that an opponent cannot
//! distinguish the individual rejection causes. All structural checks are
//! evaluated before any of them is reported, and they collapse into one
//! generic failure. The delimiter scan itself is not constant-time; that
//! residual risk is recorded in DESIGN.md.

use zeroize::{Zeroize, Zeroizing};

use crate::{mgf1, DigestKind, PaddingError, PaddingResult};

fn hash_label(
    label: Option<&[u8]>,
    hash: &mut impl FnMut(&[u8]) -> Vec<u8>,
) -> Vec<u8> {
    hash(label.unwrap_or(b""))
}

/// Builds the EME-OAEP block `0x00 || maskedSeed || maskedDB` into `em`,
/// which must be exactly the key size.
///
/// `DB = lHash || PS || 0x01 || msg` is masked with `MGF1(seed)`, then the
/// seed is masked with `MGF1(maskedDB)`. `label` defaults to the empty
/// string.
///
/// # Errors
///
/// `PaddingError::InvalidArgument` if the key cannot hold
/// `msg.len() + 2 * hLen + 2` bytes (nothing is written in that case);
/// `PaddingError::RngFailure` if the seed cannot be drawn, in which case
/// `em` is zeroed before returning.
pub fn encode_oaep(
    digest_kind: DigestKind,
    msg: &[u8],
    label: Option<&[u8]>,
    em: &mut [u8],
    hash: &mut impl FnMut(&[u8]) -> Vec<u8>,
    rng: &mut impl FnMut(&mut [u8]) -> Result<(), ()>,
) -> PaddingResult<()> {
    let key_size = em.len();
    let h_len = digest_kind.hash_len();

    // The first comparison also guards the length arithmetic below.
    if key_size < 2 * h_len + 2 || msg.len() > key_size - 2 * h_len - 2 {
        tracing::error!(
            key_size,
            msg_len = msg.len(),
            "oaep: message too long for key"
        );
        return Err(PaddingError::InvalidArgument);
    }

    let mut seed = Zeroizing::new(vec![0u8; h_len]);
    if rng(&mut seed).is_err() {
        em.zeroize();
        return Err(PaddingError::RngFailure);
    }

    let l_hash = hash_label(label, hash);

    em.fill(0);
    let db = &mut em[1 + h_len..];
    let db_len = db.len();
    db[..h_len].copy_from_slice(&l_hash);
    db[db_len - msg.len() - 1] = 0x01;
    db[db_len - msg.len()..].copy_from_slice(msg);

    // maskedDB = DB xor MGF1(seed), maskedSeed = seed xor MGF1(maskedDB)
    mgf1::mask_xor(db, &seed, hash)?;
    mgf1::mask_xor(&mut seed, &em[1 + h_len..], hash)?;
    em[1..1 + h_len].copy_from_slice(&seed);

    Ok(())
}

/// Recovers the message from an EME-OAEP block.
///
/// `em` is the full key-size block returned by the raw primitive; it is
/// unmasked in place and zeroed before return, success or failure, because
/// it holds the plaintext once unmasked. `out` must be able to hold the
/// largest possible message (`em.len() - 2 * hLen - 2`); that is checked
/// before the block is inspected.
///
/// # Errors
///
/// `PaddingError::InvalidArgument` for an undersized block or `out`. Every
/// structural defect (leading byte, label hash, missing delimiter) is the
/// single generic `PaddingError::VerificationFailed`.
pub fn decode_oaep(
    digest_kind: DigestKind,
    em: &mut [u8],
    label: Option<&[u8]>,
    out: &mut [u8],
    hash: &mut impl FnMut(&[u8]) -> Vec<u8>,
) -> PaddingResult<usize> {
    let key_size = em.len();
    let h_len = digest_kind.hash_len();

    if key_size < 2 * h_len + 2 {
        em.zeroize();
        return Err(PaddingError::InvalidArgument);
    }
    if out.len() < key_size - 2 * h_len - 2 {
        em.zeroize();
        return Err(PaddingError::InvalidArgument);
    }

    let l_hash = hash_label(label, hash);

    let result = decode_oaep_inner(em, h_len, &l_hash, out, hash);
    em.zeroize();
    result
}

fn decode_oaep_inner(
    em: &mut [u8],
    h_len: usize,
    l_hash: &[u8],
    out: &mut [u8],
    hash: &mut impl FnMut(&[u8]) -> Vec<u8>,
) -> PaddingResult<usize> {
    let (head, db) = em.split_at_mut(1 + h_len);

    // seed = maskedSeed xor MGF1(maskedDB), DB = maskedDB xor MGF1(seed)
    mgf1::mask_xor(&mut head[1..], db, hash)?;
    mgf1::mask_xor(db, &head[1..], hash)?;

    // Evaluate all structural checks before reporting any of them.
    let leading_byte_ok = head[0] == 0x00;
    let label_ok = &db[..h_len] == l_hash;

    let mut delim = 0usize;
    let mut delim_found = false;
    for (idx, &b) in db.iter().enumerate().skip(h_len) {
        if b != 0 && !delim_found {
            delim = idx;
            delim_found = true;
        }
    }
    let delim_ok = delim_found && db[delim] == 0x01;

    if !(leading_byte_ok && label_ok && delim_ok) {
        return Err(PaddingError::VerificationFailed);
    }

    let msg = &db[delim + 1..];
    out[..msg.len()].copy_from_slice(msg);
    Ok(msg.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{broken_rng, counter_rng, sha256};

    fn hash_fn() -> impl FnMut(&[u8]) -> Vec<u8> {
        |data: &[u8]| sha256(data)
    }

    const KEY_SIZE: usize = 128;
    const MAX_MSG: usize = KEY_SIZE - 2 * 32 - 2;

    fn encode_block(msg: &[u8], label: Option<&[u8]>) -> Vec<u8> {
        let mut em = vec![0u8; KEY_SIZE];
        encode_oaep(
            DigestKind::Sha256,
            msg,
            label,
            &mut em,
            &mut hash_fn(),
            &mut counter_rng(),
        )
        .unwrap();
        em
    }

    fn decode_block(em: &[u8], label: Option<&[u8]>) -> PaddingResult<Vec<u8>> {
        let mut em = em.to_vec();
        let mut out = vec![0u8; MAX_MSG];
        let n = decode_oaep(DigestKind::Sha256, &mut em, label, &mut out, &mut hash_fn())?;
        out.truncate(n);
        Ok(out)
    }

    #[test]
    fn roundtrip_all_message_lengths() {
        for msg_len in [0usize, 1, 17, MAX_MSG - 1, MAX_MSG] {
            let msg: Vec<u8> = (0..msg_len as u8).collect();
            let em = encode_block(&msg, None);
            assert_eq!(em[0], 0x00);
            assert_eq!(decode_block(&em, None).unwrap(), msg);
        }
    }

    #[test]
    fn roundtrip_with_label() {
        let msg = b"labelled plaintext";
        let em = encode_block(msg, Some(b"context label"));
        assert_eq!(decode_block(&em, Some(b"context label")).unwrap(), msg);
    }

    #[test]
    fn wrong_label_is_rejected() {
        let em = encode_block(b"data", Some(b"label-a"));
        assert_eq!(
            decode_block(&em, Some(b"label-b")),
            Err(PaddingError::VerificationFailed)
        );
        assert_eq!(
            decode_block(&em, None),
            Err(PaddingError::VerificationFailed)
        );
    }

    #[test]
    fn message_too_long_writes_nothing() {
        let msg = [0x5au8; MAX_MSG + 1];
        let mut em = vec![0xaau8; KEY_SIZE];
        assert_eq!(
            encode_oaep(
                DigestKind::Sha256,
                &msg,
                None,
                &mut em,
                &mut hash_fn(),
                &mut counter_rng(),
            ),
            Err(PaddingError::InvalidArgument)
        );
        assert!(em.iter().all(|&b| b == 0xaa));
    }

    #[test]
    fn every_single_byte_corruption_is_rejected() {
        let msg = b"tamper target";
        let em = encode_block(msg, None);
        for idx in 0..em.len() {
            let mut bad = em.clone();
            bad[idx] ^= 0x01;
            assert_eq!(
                decode_block(&bad, None),
                Err(PaddingError::VerificationFailed),
                "corruption at byte {idx} was accepted"
            );
        }
    }

    #[test]
    fn rng_failure_zeroes_the_block() {
        let mut em = vec![0xaau8; KEY_SIZE];
        assert_eq!(
            encode_oaep(
                DigestKind::Sha256,
                b"msg",
                None,
                &mut em,
                &mut hash_fn(),
                &mut broken_rng(),
            ),
            Err(PaddingError::RngFailure)
        );
        assert!(em.iter().all(|&b| b == 0));
    }

    #[test]
    fn decode_consumes_the_block() {
        let em = encode_block(b"secret", None);
        let mut em_buf = em.clone();
        let mut out = vec![0u8; MAX_MSG];
        decode_oaep(
            DigestKind::Sha256,
            &mut em_buf,
            None,
            &mut out,
            &mut hash_fn(),
        )
        .unwrap();
        assert!(em_buf.iter().all(|&b| b == 0));
    }

    #[test]
    fn undersized_key_is_rejected() {
        let mut em = vec![0u8; 2 * 32 + 1];
        let mut out = vec![0u8; 16];
        assert_eq!(
            decode_oaep(DigestKind::Sha256, &mut em, None, &mut out, &mut hash_fn()),
            Err(PaddingError::InvalidArgument)
        );
    }
}
