// Copyright (C) Microsoft Corporation. All rights reserved.

//! Software stand-in for the accelerator, used by the integration tests.
//!
//! RSA is mathematically real (num-bigint modexp over real keys), so every
//! padded block round-trips exactly as it would through the device. The
//! ECDSA and blob primitives are deterministic fakes: good enough to
//! exercise the orchestration, key layouts and failure paths, with no claim
//! of curve arithmetic fidelity.

use key_codec::{EccCurve, RawRsaKeyPair};
use num_bigint::{BigInt, BigUint};
use num_integer::Integer;
use num_traits::{Euclid, One, Zero};
use opaque_key::{BlobError, BlobMode, BlobProvider, BLOB_OVERHEAD, MODIFIER_SIZE};
use pka_engine::{DigestKind, EccAccel, HashAccel, HwError, RsaAccel, TrngAccel};
use sha2::{Digest, Sha256, Sha384, Sha512};
use zeroize::Zeroizing;

pub struct SoftPka {
    rng_state: u64,
    blob_nonce: u8,
}

const BLOB_SECRET: &[u8; 16] = b"soft-pka-secret!";

impl SoftPka {
    pub fn new() -> Self {
        Self {
            rng_state: 0x0123456789abcdef,
            blob_nonce: 0,
        }
    }

    fn keystream(mode: BlobMode, modifier: &[u8], nonce: &[u8], len: usize) -> Vec<u8> {
        let mut stream = Vec::with_capacity(len + 32);
        let mut counter = 0u32;
        while stream.len() < len {
            let mut h = Sha256::new();
            h.update(BLOB_SECRET);
            h.update([mode_marker(mode)]);
            h.update(modifier);
            h.update(nonce);
            h.update(counter.to_be_bytes());
            stream.extend_from_slice(&h.finalize());
            counter += 1;
        }
        stream.truncate(len);
        stream
    }

    fn blob_tag(mode: BlobMode, modifier: &[u8], nonce: &[u8], ct: &[u8]) -> [u8; 16] {
        let mut h = Sha256::new();
        h.update(BLOB_SECRET);
        h.update([mode_marker(mode).wrapping_add(1)]);
        h.update(modifier);
        h.update(nonce);
        h.update(ct);
        let digest = h.finalize();
        let mut tag = [0u8; 16];
        tag.copy_from_slice(&digest[..16]);
        tag
    }
}

fn mode_marker(mode: BlobMode) -> u8 {
    match mode {
        BlobMode::Ecb => 0xe0,
        BlobMode::Ccm => 0xc0,
    }
}

fn to_fixed_be(x: &BigUint, len: usize) -> Vec<u8> {
    let bytes = x.to_bytes_be();
    assert!(bytes.len() <= len, "value does not fit the field");
    let mut out = vec![0u8; len];
    out[len - bytes.len()..].copy_from_slice(&bytes);
    out
}

fn modinv(a: &BigUint, m: &BigUint) -> Option<BigUint> {
    let (a, m) = (BigInt::from(a % m), BigInt::from(m.clone()));
    let g = a.extended_gcd(&m);
    g.gcd
        .is_one()
        .then(|| g.x.rem_euclid(&m).to_biguint().expect("non-negative"))
}

fn curve_marker(curve: EccCurve) -> u8 {
    match curve {
        EccCurve::P256 => 1,
        EccCurve::P384 => 2,
        EccCurve::P521 => 3,
    }
}

/// Hash-expands `parts` into `len` deterministic bytes.
fn expand(domain: &[u8], parts: &[&[u8]], len: usize) -> Vec<u8> {
    let mut out = Vec::with_capacity(len + 32);
    let mut counter = 0u32;
    while out.len() < len {
        let mut h = Sha256::new();
        h.update(domain);
        for part in parts {
            h.update((part.len() as u32).to_be_bytes());
            h.update(part);
        }
        h.update(counter.to_be_bytes());
        out.extend_from_slice(&h.finalize());
        counter += 1;
    }
    out.truncate(len);
    out
}

fn derive_point_xy(curve: EccCurve, scalar: &[u8]) -> Vec<u8> {
    expand(
        b"soft-pka-point",
        &[&[curve_marker(curve)], scalar],
        2 * curve.point_size(),
    )
}

impl RsaAccel for SoftPka {
    fn modexp(
        &mut self,
        base: &[u8],
        modulus: &[u8],
        exponent: &[u8],
    ) -> Result<Vec<u8>, HwError> {
        let n = BigUint::from_bytes_be(modulus);
        if n.is_zero() {
            return Err(HwError);
        }
        let b = BigUint::from_bytes_be(base);
        let e = BigUint::from_bytes_be(exponent);
        Ok(to_fixed_be(&b.modpow(&e, &n), modulus.len()))
    }

    fn rsa_keygen(
        &mut self,
        p: &[u8],
        q: &[u8],
        pub_exp: &[u8; 4],
    ) -> Result<RawRsaKeyPair, HwError> {
        let key_bytes = p.len() + q.len();
        let p = BigUint::from_bytes_be(p);
        let q = BigUint::from_bytes_be(q);
        let e = BigUint::from_bytes_be(pub_exp);

        let n = &p * &q;
        let phi = (&p - 1u32) * (&q - 1u32);
        let d = modinv(&e, &phi).ok_or(HwError)?;

        Ok(RawRsaKeyPair {
            modulus: to_fixed_be(&n, key_bytes),
            priv_exp: Zeroizing::new(to_fixed_be(&d, key_bytes)),
        })
    }
}

impl EccAccel for SoftPka {
    fn ecdsa_sign(
        &mut self,
        curve: EccCurve,
        scalar: &[u8],
        digest: &[u8],
    ) -> Result<Vec<u8>, HwError> {
        if scalar.len() != curve.point_size() {
            return Err(HwError);
        }
        let xy = derive_point_xy(curve, scalar);
        Ok(expand(
            b"soft-pka-sig",
            &[&[curve_marker(curve)], &xy, digest],
            2 * curve.point_size(),
        ))
    }

    fn ecdsa_verify(
        &mut self,
        curve: EccCurve,
        point_xy: &[u8],
        digest: &[u8],
        signature: &[u8],
    ) -> Result<bool, HwError> {
        if point_xy.len() != 2 * curve.point_size() {
            return Err(HwError);
        }
        let expected = expand(
            b"soft-pka-sig",
            &[&[curve_marker(curve)], point_xy, digest],
            2 * curve.point_size(),
        );
        Ok(signature == expected)
    }

    fn ecc_keygen(
        &mut self,
        curve: EccCurve,
    ) -> Result<(Zeroizing<Vec<u8>>, Vec<u8>), HwError> {
        let mut scalar = Zeroizing::new(vec![0u8; curve.point_size()]);
        self.fill_random(&mut scalar)?;
        let xy = derive_point_xy(curve, &scalar);
        Ok((scalar, xy))
    }
}

impl HashAccel for SoftPka {
    fn digest(&mut self, kind: DigestKind, data: &[u8]) -> Vec<u8> {
        match kind {
            DigestKind::Sha1 => unimplemented!("SHA-1 is not exercised by these tests"),
            DigestKind::Sha256 => Sha256::digest(data).to_vec(),
            DigestKind::Sha384 => Sha384::digest(data).to_vec(),
            DigestKind::Sha512 => Sha512::digest(data).to_vec(),
        }
    }
}

impl TrngAccel for SoftPka {
    fn fill_random(&mut self, buf: &mut [u8]) -> Result<(), HwError> {
        for b in buf.iter_mut() {
            self.rng_state ^= self.rng_state << 13;
            self.rng_state ^= self.rng_state >> 7;
            self.rng_state ^= self.rng_state << 17;
            *b = self.rng_state as u8;
        }
        Ok(())
    }
}

impl BlobProvider for SoftPka {
    fn blob_encapsulate(
        &mut self,
        mode: BlobMode,
        modifier: &[u8; MODIFIER_SIZE],
        plaintext: &[u8],
        blob_out: &mut [u8],
    ) -> Result<(), BlobError> {
        if blob_out.len() != plaintext.len() + BLOB_OVERHEAD {
            return Err(BlobError);
        }

        self.blob_nonce = self.blob_nonce.wrapping_add(1);
        let nonce = [self.blob_nonce; 16];

        let (ct, rest) = blob_out.split_at_mut(plaintext.len());
        let stream = Self::keystream(mode, modifier, &nonce, plaintext.len());
        for ((c, &p), &s) in ct.iter_mut().zip(plaintext).zip(&stream) {
            *c = p ^ s;
        }

        let tag = Self::blob_tag(mode, modifier, &nonce, ct);
        rest[..16].copy_from_slice(&tag);
        rest[16..].copy_from_slice(&nonce);
        Ok(())
    }

    fn blob_decapsulate(
        &mut self,
        mode: BlobMode,
        modifier: &[u8; MODIFIER_SIZE],
        blob: &[u8],
        plaintext_out: &mut [u8],
    ) -> Result<(), BlobError> {
        if blob.len() != plaintext_out.len() + BLOB_OVERHEAD {
            return Err(BlobError);
        }

        let pt_len = blob.len() - BLOB_OVERHEAD;
        let (ct, rest) = blob.split_at(pt_len);
        let (tag, nonce) = rest.split_at(16);

        if Self::blob_tag(mode, modifier, nonce, ct) != tag {
            return Err(BlobError);
        }

        let stream = Self::keystream(mode, modifier, nonce, pt_len);
        for ((p, &c), &s) in plaintext_out.iter_mut().zip(ct).zip(&stream) {
            *p = c ^ s;
        }
        Ok(())
    }
}
