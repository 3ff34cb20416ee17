// Copyright (C) Microsoft Corporation. All rights reserved.

//! MGF1 mask generation function (RFC 8017 Appendix B.2.1).

use crate::{PaddingError, PaddingResult};

/// XORs the MGF1 output stream for `seed` into `dst`.
///
/// For successive 4-byte big-endian counter values starting at zero, the
/// stream is `Hash(seed || counter)`; exactly `dst.len()` stream bytes are
/// consumed. XOR-in-place is the only primitive the padding schemes need: a
/// plain mask is obtained by XORing into a zeroed buffer, and unmasking is
/// the same operation as masking.
///
/// # Errors
///
/// `PaddingError::InvalidArgument` if the injected hash produces no output,
/// or if `dst` is longer than the 2^32 blocks MGF1 is defined for.
pub fn mask_xor(
    dst: &mut [u8],
    seed: &[u8],
    hash: &mut impl FnMut(&[u8]) -> Vec<u8>,
) -> PaddingResult<()> {
    let mut counter: u32 = 0;
    let mut done = 0usize;

    let mut block = Vec::with_capacity(seed.len() + 4);

    while done < dst.len() {
        block.clear();
        block.extend_from_slice(seed);
        block.extend_from_slice(&counter.to_be_bytes());
        let stream = hash(&block);
        if stream.is_empty() {
            return Err(PaddingError::InvalidArgument);
        }

        for (d, &s) in dst[done..].iter_mut().zip(stream.iter()) {
            *d ^= s;
            done += 1;
        }

        counter = counter.checked_add(1).ok_or(PaddingError::InvalidArgument)?;
    }

    Ok(())
}
