// Copyright (C) Microsoft Corporation. All rights reserved.

//! RSA key marshalling between DER and raw component buffers.
//!
//! Portable forms:
//! - Public: X.509 `SubjectPublicKeyInfo` carrying a PKCS#1 `RSAPublicKey`.
//! - Private: PKCS#8 `PrivateKeyInfo` carrying a PKCS#1 `RSAPrivateKey`.
//!
//! The raw form is the pair the accelerator consumes: the modulus and one
//! exponent, big-endian, padded to the key size. The raw private form has no
//! CRT components, so the private export first recovers `(p, q)` from
//! `(n, e, d)` and derives the CRT set from there.

use num_bigint::BigUint;
use num_traits::One;
use zeroize::Zeroizing;

use crate::primes::{modinv, recover_primes, to_fixed_be};
use crate::{pad_to, write_der, KeyCodecError, KeyCodecResult, RawRsaKeyPair, RawRsaPublicKey};

/// Public exponent used when the raw side does not carry one.
pub const DEFAULT_PUBLIC_EXPONENT: u32 = 65537;

/// Object Identifier for rsaEncryption.
///
/// OID: 1.2.840.113549.1.1.1
const OID_RSA_ENCRYPTION: asn1::ObjectIdentifier = asn1::oid!(1, 2, 840, 113549, 1, 1, 1);

/// X.509 `AlgorithmIdentifier` for RSA keys.
///
/// RFC 3279 commonly uses a DER NULL for `parameters`, but some encoders
/// omit it; both forms are accepted on decode, and NULL is emitted on encode
/// for deterministic output.
#[derive(asn1::Asn1Read, asn1::Asn1Write)]
struct AlgorithmIdentifier {
    algorithm: asn1::ObjectIdentifier,
    parameters: Option<asn1::Null>,
}

/// ```text
/// SubjectPublicKeyInfo ::= SEQUENCE {
///   algorithm            AlgorithmIdentifier,
///   subjectPublicKey     BIT STRING
/// }
/// ```
#[derive(asn1::Asn1Read, asn1::Asn1Write)]
struct SubjectPublicKeyInfo<'a> {
    algorithm: AlgorithmIdentifier,
    subject_public_key: asn1::BitString<'a>,
}

/// ```text
/// RSAPublicKey ::= SEQUENCE {
///   modulus           INTEGER,  -- n
///   publicExponent    INTEGER   -- e
/// }
/// ```
#[derive(asn1::Asn1Read, asn1::Asn1Write)]
struct RsaPublicKey {
    modulus: asn1::OwnedBigInt,
    public_exponent: asn1::OwnedBigInt,
}

/// ```text
/// PrivateKeyInfo ::= SEQUENCE {
///   version         Version,
///   algorithm       AlgorithmIdentifier,
///   privateKey      OCTET STRING,
///   attributes      [0] Attributes OPTIONAL
/// }
/// ```
#[derive(asn1::Asn1Read, asn1::Asn1Write)]
struct RsaPrivateKeyInfo<'a> {
    version: u8,
    algorithm: AlgorithmIdentifier,
    private_key: &'a [u8],
    #[implicit(0)]
    attributes: Option<asn1::SetOf<'a, asn1::Tlv<'a>>>,
}

/// PKCS#1 `RSAPrivateKey` (RFC 8017 Appendix A.1.2), two-prime form only.
#[derive(asn1::Asn1Read, asn1::Asn1Write)]
struct RsaPrivateKey {
    version: u8,
    modulus: asn1::OwnedBigInt,
    public_exponent: asn1::OwnedBigInt,
    private_exponent: asn1::OwnedBigInt,
    prime1: asn1::OwnedBigInt,
    prime2: asn1::OwnedBigInt,
    exponent1: asn1::OwnedBigInt,
    exponent2: asn1::OwnedBigInt,
    coefficient: asn1::OwnedBigInt,
}

/// DER INTEGER content for a big-endian component: leading zeros stripped,
/// one zero byte re-added when the high bit would flip the sign.
fn component_to_asn1(bytes: &[u8]) -> KeyCodecResult<asn1::OwnedBigInt> {
    let bytes = bytes
        .iter()
        .position(|&b| b != 0)
        .map_or(&bytes[bytes.len()..], |pos| &bytes[pos..]);

    let needs_padding = bytes.first().is_some_and(|&b| b & 0x80 == 0x80);

    let mut vec = Vec::with_capacity(bytes.len() + needs_padding as usize);
    if needs_padding {
        vec.push(0);
    }
    vec.extend_from_slice(bytes);

    asn1::OwnedBigInt::new(vec).ok_or(KeyCodecError::Asn1Encode)
}

/// Raw bytes of a DER INTEGER with the sign-padding byte removed.
fn component_from_asn1(value: &asn1::OwnedBigInt) -> Vec<u8> {
    let bytes = value.as_bytes();
    if !bytes.is_empty() && bytes[0] == 0 {
        bytes[1..].to_vec()
    } else {
        bytes.to_vec()
    }
}

/// Parses an SPKI-encoded RSA public key into raw components.
///
/// The modulus is padded to `key_bytes`; the exponent must fit the 4-byte
/// field the accelerator takes.
///
/// # Errors
///
/// `KeyCodecError::Asn1Decode` on malformed DER,
/// `KeyCodecError::InvalidArgument` on a wrong OID or components that do not
/// fit the declared key size.
pub fn rsa_public_to_raw(der: &[u8], key_bytes: usize) -> KeyCodecResult<RawRsaPublicKey> {
    let spki: SubjectPublicKeyInfo<'_> =
        asn1::parse_single(der).map_err(|_| KeyCodecError::Asn1Decode)?;
    if spki.algorithm.algorithm != OID_RSA_ENCRYPTION {
        return Err(KeyCodecError::InvalidArgument);
    }

    let public_key: RsaPublicKey = asn1::parse_single(spki.subject_public_key.as_bytes())
        .map_err(|_| KeyCodecError::Asn1Decode)?;

    Ok(RawRsaPublicKey {
        modulus: pad_to(&component_from_asn1(&public_key.modulus), key_bytes)?,
        exponent: pad_to(&component_from_asn1(&public_key.public_exponent), 4)?
            .try_into()
            .map_err(|_| KeyCodecError::InvalidArgument)?,
    })
}

/// Parses a PKCS#8-encoded RSA private key into the raw `(n, d)` pair.
///
/// The CRT components in the encoding are ignored; the accelerator works
/// from the private exponent alone.
///
/// # Errors
///
/// `KeyCodecError::Asn1Decode` on malformed DER,
/// `KeyCodecError::InvalidArgument` on a wrong OID or oversized components.
pub fn rsa_keypair_to_raw(der: &[u8], key_bytes: usize) -> KeyCodecResult<RawRsaKeyPair> {
    let key_info: RsaPrivateKeyInfo<'_> =
        asn1::parse_single(der).map_err(|_| KeyCodecError::Asn1Decode)?;
    if key_info.algorithm.algorithm != OID_RSA_ENCRYPTION {
        return Err(KeyCodecError::InvalidArgument);
    }

    let key: RsaPrivateKey =
        asn1::parse_single(key_info.private_key).map_err(|_| KeyCodecError::Asn1Decode)?;

    let priv_exp = Zeroizing::new(component_from_asn1(&key.private_exponent));

    Ok(RawRsaKeyPair {
        modulus: pad_to(&component_from_asn1(&key.modulus), key_bytes)?,
        priv_exp: Zeroizing::new(pad_to(&priv_exp, key_bytes)?),
    })
}

/// Encodes raw public components as DER SPKI.
///
/// `out` follows the size-query pattern: `None` reports the required size.
///
/// # Errors
///
/// `KeyCodecError::Asn1Encode` if encoding fails,
/// `KeyCodecError::BufferTooSmall` if `out` cannot hold the result.
pub fn rsa_public_from_raw(
    modulus: &[u8],
    exponent: u32,
    out: Option<&mut [u8]>,
) -> KeyCodecResult<usize> {
    let public_key = RsaPublicKey {
        modulus: component_to_asn1(modulus)?,
        public_exponent: component_to_asn1(&exponent.to_be_bytes())?,
    };
    let pub_key_der = asn1::write_single(&public_key).map_err(|_| KeyCodecError::Asn1Encode)?;

    let spki = SubjectPublicKeyInfo {
        algorithm: AlgorithmIdentifier {
            algorithm: OID_RSA_ENCRYPTION,
            parameters: Some(()),
        },
        subject_public_key: asn1::BitString::new(&pub_key_der, 0)
            .ok_or(KeyCodecError::Asn1Encode)?,
    };

    let der = asn1::write_single(&spki).map_err(|_| KeyCodecError::Asn1Encode)?;
    write_der(&der, out)
}

/// Encodes a raw `(n, d)` keypair as PKCS#8.
///
/// PKCS#1 `RSAPrivateKey` requires the CRT components, which the raw form
/// does not carry; `(p, q)` are recovered from `(n, e, d)` first and the CRT
/// set is derived from them. The injected RNG drives the recovery.
///
/// # Errors
///
/// `KeyCodecError::InvalidArgument` for components that cannot describe a
/// key, `KeyCodecError::PrimeGeneration` if recovery does not converge,
/// `KeyCodecError::BufferTooSmall` if `out` cannot hold the result.
pub fn rsa_keypair_from_raw(
    modulus: &[u8],
    priv_exp: &[u8],
    exponent: u32,
    rng: &mut impl FnMut(&mut [u8]) -> Result<(), ()>,
    out: Option<&mut [u8]>,
) -> KeyCodecResult<usize> {
    let n = BigUint::from_bytes_be(modulus);
    let d = BigUint::from_bytes_be(priv_exp);
    let e = BigUint::from(exponent);

    if n.bits() < 2 || d.bits() < 2 {
        return Err(KeyCodecError::InvalidArgument);
    }

    let (p, q) = recover_primes(&n, &e, &d, rng)?;

    let one = BigUint::one();
    let dp = &d % (&p - &one);
    let dq = &d % (&q - &one);
    let qinv = modinv(&q, &p).ok_or(KeyCodecError::InvalidArgument)?;

    let component_len = modulus.len();
    let half_len = component_len.div_ceil(2);

    let d_bytes = Zeroizing::new(to_fixed_be(&d, component_len)?);
    let p_bytes = Zeroizing::new(to_fixed_be(&p, half_len)?);
    let q_bytes = Zeroizing::new(to_fixed_be(&q, half_len)?);
    let dp_bytes = Zeroizing::new(to_fixed_be(&dp, half_len)?);
    let dq_bytes = Zeroizing::new(to_fixed_be(&dq, half_len)?);
    let qinv_bytes = Zeroizing::new(to_fixed_be(&qinv, half_len)?);

    let private_key = RsaPrivateKey {
        version: 0,
        modulus: component_to_asn1(modulus)?,
        public_exponent: component_to_asn1(&exponent.to_be_bytes())?,
        private_exponent: component_to_asn1(&d_bytes)?,
        prime1: component_to_asn1(&p_bytes)?,
        prime2: component_to_asn1(&q_bytes)?,
        exponent1: component_to_asn1(&dp_bytes)?,
        exponent2: component_to_asn1(&dq_bytes)?,
        coefficient: component_to_asn1(&qinv_bytes)?,
    };
    let private_key_der =
        asn1::write_single(&private_key).map_err(|_| KeyCodecError::Asn1Encode)?;

    let key_info = RsaPrivateKeyInfo {
        version: 0,
        algorithm: AlgorithmIdentifier {
            algorithm: OID_RSA_ENCRYPTION,
            parameters: Some(()),
        },
        private_key: &private_key_der,
        attributes: None,
    };

    let der = asn1::write_single(&key_info).map_err(|_| KeyCodecError::Asn1Encode)?;
    write_der(&der, out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generate_primes;

    fn test_rng() -> impl FnMut(&mut [u8]) -> Result<(), ()> {
        let mut state = 0x243f6a8885a308d3u64;
        move |buf: &mut [u8]| {
            for b in buf.iter_mut() {
                state ^= state << 13;
                state ^= state >> 7;
                state ^= state << 17;
                *b = state as u8;
            }
            Ok(())
        }
    }

    /// Builds a well-formed raw RSA keypair from generated primes.
    fn build_keypair(modulus_bits: usize) -> (Vec<u8>, Vec<u8>) {
        let mut rng = test_rng();
        let primes = generate_primes(modulus_bits, &mut rng).unwrap();
        let p = BigUint::from_bytes_be(&primes.p);
        let q = BigUint::from_bytes_be(&primes.q);

        let n = &p * &q;
        let phi = (&p - 1u32) * (&q - 1u32);
        let d = modinv(&BigUint::from(DEFAULT_PUBLIC_EXPONENT), &phi).unwrap();

        let key_bytes = modulus_bits / 8;
        (
            to_fixed_be(&n, key_bytes).unwrap(),
            to_fixed_be(&d, key_bytes).unwrap(),
        )
    }

    #[test]
    fn public_key_roundtrip() {
        let (modulus, _) = build_keypair(512);

        let len = rsa_public_from_raw(&modulus, DEFAULT_PUBLIC_EXPONENT, None).unwrap();
        let mut der = vec![0u8; len];
        rsa_public_from_raw(&modulus, DEFAULT_PUBLIC_EXPONENT, Some(&mut der)).unwrap();

        let raw = rsa_public_to_raw(&der, modulus.len()).unwrap();
        assert_eq!(raw.modulus, modulus);
        assert_eq!(raw.exponent, [0x00, 0x01, 0x00, 0x01]);
    }

    #[test]
    fn keypair_roundtrip() {
        let (modulus, priv_exp) = build_keypair(512);
        let mut rng = test_rng();

        let len = rsa_keypair_from_raw(
            &modulus,
            &priv_exp,
            DEFAULT_PUBLIC_EXPONENT,
            &mut rng,
            None,
        )
        .unwrap();
        let mut der = vec![0u8; len];
        rsa_keypair_from_raw(
            &modulus,
            &priv_exp,
            DEFAULT_PUBLIC_EXPONENT,
            &mut rng,
            Some(&mut der),
        )
        .unwrap();

        let raw = rsa_keypair_to_raw(&der, modulus.len()).unwrap();
        assert_eq!(raw.modulus, modulus);
        assert_eq!(*raw.priv_exp, priv_exp);
    }

    #[test]
    fn keypair_roundtrip_rsa2048() {
        let (modulus, priv_exp) = build_keypair(2048);
        let mut rng = test_rng();

        let len = rsa_keypair_from_raw(
            &modulus,
            &priv_exp,
            DEFAULT_PUBLIC_EXPONENT,
            &mut rng,
            None,
        )
        .unwrap();
        let mut der = vec![0u8; len];
        rsa_keypair_from_raw(
            &modulus,
            &priv_exp,
            DEFAULT_PUBLIC_EXPONENT,
            &mut rng,
            Some(&mut der),
        )
        .unwrap();

        let raw = rsa_keypair_to_raw(&der, modulus.len()).unwrap();
        assert_eq!(raw.modulus, modulus);
        assert_eq!(*raw.priv_exp, priv_exp);
    }

    #[test]
    fn exported_crt_components_are_consistent() {
        let (modulus, priv_exp) = build_keypair(512);
        let mut rng = test_rng();

        let len = rsa_keypair_from_raw(
            &modulus,
            &priv_exp,
            DEFAULT_PUBLIC_EXPONENT,
            &mut rng,
            None,
        )
        .unwrap();
        let mut der = vec![0u8; len];
        rsa_keypair_from_raw(
            &modulus,
            &priv_exp,
            DEFAULT_PUBLIC_EXPONENT,
            &mut rng,
            Some(&mut der),
        )
        .unwrap();

        let key_info: RsaPrivateKeyInfo<'_> = asn1::parse_single(&der).unwrap();
        let key: RsaPrivateKey = asn1::parse_single(key_info.private_key).unwrap();

        let p = BigUint::from_bytes_be(&component_from_asn1(&key.prime1));
        let q = BigUint::from_bytes_be(&component_from_asn1(&key.prime2));
        let n = BigUint::from_bytes_be(&modulus);
        assert_eq!(&p * &q, n);
        assert!(p > q);

        let d = BigUint::from_bytes_be(&priv_exp);
        let dp = BigUint::from_bytes_be(&component_from_asn1(&key.exponent1));
        let qinv = BigUint::from_bytes_be(&component_from_asn1(&key.coefficient));
        assert_eq!(dp, &d % (&p - 1u32));
        assert!(((&qinv * &q) % &p).is_one());
    }

    #[test]
    fn undersized_output_buffer_is_reported() {
        let (modulus, _) = build_keypair(512);
        let len = rsa_public_from_raw(&modulus, DEFAULT_PUBLIC_EXPONENT, None).unwrap();
        let mut der = vec![0u8; len - 1];
        assert_eq!(
            rsa_public_from_raw(&modulus, DEFAULT_PUBLIC_EXPONENT, Some(&mut der)),
            Err(KeyCodecError::BufferTooSmall)
        );
    }

    #[test]
    fn garbage_der_is_rejected() {
        assert!(rsa_public_to_raw(&[0x30, 0x03, 0x01, 0x01, 0x00], 64).is_err());
        assert!(rsa_keypair_to_raw(&[0xff; 12], 64).is_err());
    }
}
