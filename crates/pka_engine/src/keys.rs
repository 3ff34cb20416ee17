// Copyright (C) Microsoft Corporation. All rights reserved.

//! Opaque key-buffer layouts.
//!
//! Opaque private keys keep their public half in the clear (operations on
//! the public half never need the hardware secret) and carry the wrapped
//! private half behind it:
//!
//! ```text
//! RSA: modulus (k) || priv_exp_len (8, LE) || encapsulated (priv_exp_len + 48)
//! ECC: point (1 + 2w) || encapsulated (w + 48)
//! ```

use key_codec::EccCurve;
use opaque_key::encapsulated_len;
use zeroize::Zeroizing;

use crate::hw::PkaHardware;
use crate::{Device, EngineError, EngineResult};

const LEN_FIELD: usize = 8;

/// Total size of an opaque RSA private key buffer whose private exponent is
/// `priv_exp_len` bytes.
pub const fn rsa_opaque_key_len(key_bytes: usize, priv_exp_len: usize) -> usize {
    key_bytes + LEN_FIELD + encapsulated_len(priv_exp_len)
}

/// Total size of an opaque ECC private key buffer for `curve`.
pub const fn ecc_opaque_key_len(curve: EccCurve) -> usize {
    curve.uncompressed_point_size() + encapsulated_len(curve.point_size())
}

/// Borrowed view of an opaque RSA key buffer.
pub(crate) struct RsaOpaqueView<'a> {
    pub modulus: &'a [u8],
    pub encapsulated: &'a [u8],
    pub priv_exp_len: usize,
}

pub(crate) fn parse_rsa_opaque(buffer: &[u8], key_bytes: usize) -> EngineResult<RsaOpaqueView<'_>> {
    if buffer.len() < key_bytes + LEN_FIELD {
        return Err(EngineError::InvalidArgument);
    }

    let (modulus, rest) = buffer.split_at(key_bytes);
    let (len_field, encapsulated) = rest.split_at(LEN_FIELD);

    let priv_exp_len = u64::from_le_bytes(len_field.try_into().expect("8-byte field")) as usize;
    if priv_exp_len == 0
        || priv_exp_len > key_bytes
        || encapsulated.len() != encapsulated_len(priv_exp_len)
    {
        return Err(EngineError::InvalidArgument);
    }

    Ok(RsaOpaqueView {
        modulus,
        encapsulated,
        priv_exp_len,
    })
}

pub(crate) fn write_rsa_opaque_header(out: &mut [u8], modulus: &[u8], priv_exp_len: usize) {
    out[..modulus.len()].copy_from_slice(modulus);
    out[modulus.len()..modulus.len() + LEN_FIELD]
        .copy_from_slice(&(priv_exp_len as u64).to_le_bytes());
}

pub(crate) const fn rsa_opaque_payload_offset(key_bytes: usize) -> usize {
    key_bytes + LEN_FIELD
}

/// Borrowed view of an opaque ECC key buffer.
pub(crate) struct EccOpaqueView<'a> {
    pub point: &'a [u8],
    pub encapsulated: &'a [u8],
}

pub(crate) fn parse_ecc_opaque(buffer: &[u8], curve: EccCurve) -> EngineResult<EccOpaqueView<'_>> {
    let point_len = curve.uncompressed_point_size();
    if buffer.len() < point_len || buffer[0] != 0x04 {
        return Err(EngineError::InvalidArgument);
    }

    let (point, encapsulated) = buffer.split_at(point_len);
    if !encapsulated.is_empty() && encapsulated.len() != encapsulated_len(curve.point_size()) {
        return Err(EngineError::InvalidArgument);
    }

    Ok(EccOpaqueView {
        point,
        encapsulated,
    })
}

impl<H: PkaHardware> Device<H> {
    /// Unwraps the private exponent of an opaque RSA key.
    pub(crate) fn unwrap_rsa_priv_exp(
        &self,
        mode: opaque_key::BlobMode,
        view: &RsaOpaqueView<'_>,
    ) -> EngineResult<Zeroizing<Vec<u8>>> {
        let mut priv_exp = Zeroizing::new(vec![0u8; view.priv_exp_len]);
        let written = opaque_key::decapsulate(
            &mut *self.hw.lock(),
            mode,
            view.encapsulated,
            &mut priv_exp,
        )?;
        if written != view.priv_exp_len {
            return Err(EngineError::BadState);
        }
        Ok(priv_exp)
    }

    /// Unwraps the scalar of an opaque ECC key.
    pub(crate) fn unwrap_ecc_scalar(
        &self,
        mode: opaque_key::BlobMode,
        curve: EccCurve,
        view: &EccOpaqueView<'_>,
    ) -> EngineResult<Zeroizing<Vec<u8>>> {
        let scalar_len = curve.point_size();
        if view.encapsulated.is_empty() {
            return Err(EngineError::InvalidArgument);
        }

        let mut scalar = Zeroizing::new(vec![0u8; scalar_len]);
        let written =
            opaque_key::decapsulate(&mut *self.hw.lock(), mode, view.encapsulated, &mut scalar)?;
        if written != scalar_len {
            return Err(EngineError::BadState);
        }
        Ok(scalar)
    }
}
