// Copyright (C) Microsoft Corporation. All rights reserved.

//! ECC key marshalling between DER and raw scalar/point buffers.
//!
//! Portable forms follow RFC 5480 (SPKI public keys) and RFC 5915 wrapped in
//! PKCS#8 (private keys). The raw form uses the uncompressed point
//! convention throughout: a `0x04` tag byte followed by the X and Y
//! coordinates, each padded to the curve's field size.
//!
//! A portable private key must carry its public point. Deriving the point
//! from the scalar is a curve multiplication, which belongs to the raw
//! hardware primitive, not to this marshaller.

use zeroize::Zeroizing;

use crate::{write_der, KeyCodecError, KeyCodecResult, RawEccKeyPair, RawEccPublicKey};

/// Object Identifier for the NIST P-256 (secp256r1) curve.
///
/// OID: 1.2.840.10045.3.1.7
const OID_P256: asn1::ObjectIdentifier = asn1::oid!(1, 2, 840, 10045, 3, 1, 7);

/// Object Identifier for the NIST P-384 (secp384r1) curve.
///
/// OID: 1.3.132.0.34
const OID_P384: asn1::ObjectIdentifier = asn1::oid!(1, 3, 132, 0, 34);

/// Object Identifier for the NIST P-521 (secp521r1) curve.
///
/// OID: 1.3.132.0.35
const OID_P521: asn1::ObjectIdentifier = asn1::oid!(1, 3, 132, 0, 35);

/// Object Identifier for EC Public Key algorithm.
///
/// OID: 1.2.840.10045.2.1
const OID_EC_PUBLIC_KEY: asn1::ObjectIdentifier = asn1::oid!(1, 2, 840, 10045, 2, 1);

/// Supported NIST curves.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EccCurve {
    /// NIST P-256 (secp256r1)
    P256,

    /// NIST P-384 (secp384r1)
    P384,

    /// NIST P-521 (secp521r1)
    P521,
}

impl EccCurve {
    /// Field element size in bytes (the scalar size as well).
    pub const fn point_size(self) -> usize {
        match self {
            EccCurve::P256 => 32,
            EccCurve::P384 => 48,
            EccCurve::P521 => 66,
        }
    }

    /// Size of the uncompressed public point, tag byte included.
    pub const fn uncompressed_point_size(self) -> usize {
        1 + 2 * self.point_size()
    }
}

impl From<EccCurve> for asn1::ObjectIdentifier {
    fn from(curve: EccCurve) -> Self {
        match curve {
            EccCurve::P256 => OID_P256,
            EccCurve::P384 => OID_P384,
            EccCurve::P521 => OID_P521,
        }
    }
}

impl TryFrom<asn1::ObjectIdentifier> for EccCurve {
    type Error = KeyCodecError;

    fn try_from(oid: asn1::ObjectIdentifier) -> Result<Self, Self::Error> {
        match oid {
            OID_P256 => Ok(EccCurve::P256),
            OID_P384 => Ok(EccCurve::P384),
            OID_P521 => Ok(EccCurve::P521),
            _ => Err(KeyCodecError::UnsupportedCurve),
        }
    }
}

/// `AlgorithmIdentifier` in its EC shape: the parameters field is the named
/// curve OID.
#[derive(asn1::Asn1Read, asn1::Asn1Write)]
struct EcAlgorithmIdentifier {
    algorithm: asn1::ObjectIdentifier,
    parameters: asn1::ObjectIdentifier,
}

#[derive(asn1::Asn1Read, asn1::Asn1Write)]
struct SubjectPublicKeyInfo<'a> {
    algorithm: EcAlgorithmIdentifier,
    subject_public_key: asn1::BitString<'a>,
}

/// RFC 5915 `ECPrivateKey`.
///
/// ```text
/// ECPrivateKey ::= SEQUENCE {
///   version        INTEGER { ecPrivkeyVer1(1) } (ecPrivkeyVer1),
///   privateKey     OCTET STRING,
///   parameters [0] ECParameters {{ NamedCurve }} OPTIONAL,
///   publicKey  [1] BIT STRING OPTIONAL
/// }
/// ```
#[derive(asn1::Asn1Read, asn1::Asn1Write)]
struct EcPrivateKey<'a> {
    version: u8,
    priv_key: &'a [u8],
    #[explicit(0)]
    parameters: Option<asn1::ObjectIdentifier>,
    #[explicit(1)]
    pub_key: Option<asn1::BitString<'a>>,
}

#[derive(asn1::Asn1Read, asn1::Asn1Write)]
struct EcPrivateKeyInfo<'a> {
    version: u8,
    algo_id: EcAlgorithmIdentifier,
    priv_key: &'a [u8],
    #[implicit(0)]
    attrs: Option<asn1::ObjectIdentifier>,
}

fn check_point(curve: EccCurve, point: &[u8]) -> KeyCodecResult<()> {
    if point.len() != curve.uncompressed_point_size() || point[0] != 0x04 {
        return Err(KeyCodecError::InvalidArgument);
    }
    Ok(())
}

/// Parses an SPKI-encoded ECC public key into the raw uncompressed point.
///
/// # Errors
///
/// `KeyCodecError::Asn1Decode` on malformed DER,
/// `KeyCodecError::UnsupportedCurve` for a curve outside the supported set,
/// `KeyCodecError::InvalidArgument` for a point that is not in uncompressed
/// form or has the wrong length.
pub fn ecc_public_to_raw(der: &[u8]) -> KeyCodecResult<RawEccPublicKey> {
    let spki: SubjectPublicKeyInfo<'_> =
        asn1::parse_single(der).map_err(|_| KeyCodecError::Asn1Decode)?;
    if spki.algorithm.algorithm != OID_EC_PUBLIC_KEY {
        return Err(KeyCodecError::InvalidArgument);
    }

    let curve = EccCurve::try_from(spki.algorithm.parameters)?;
    let point = spki.subject_public_key.as_bytes().to_vec();
    check_point(curve, &point)?;

    Ok(RawEccPublicKey { curve, point })
}

/// Parses a PKCS#8-encoded ECC private key into raw scalar and point.
///
/// # Errors
///
/// As [`ecc_public_to_raw`], plus `KeyCodecError::InvalidArgument` when the
/// encoding carries no public point (this marshaller cannot derive it).
pub fn ecc_keypair_to_raw(der: &[u8]) -> KeyCodecResult<RawEccKeyPair> {
    let key_info: EcPrivateKeyInfo<'_> =
        asn1::parse_single(der).map_err(|_| KeyCodecError::Asn1Decode)?;
    if key_info.algo_id.algorithm != OID_EC_PUBLIC_KEY {
        return Err(KeyCodecError::InvalidArgument);
    }
    let curve = EccCurve::try_from(key_info.algo_id.parameters)?;

    let key: EcPrivateKey<'_> =
        asn1::parse_single(key_info.priv_key).map_err(|_| KeyCodecError::Asn1Decode)?;

    let scalar = Zeroizing::new(key.priv_key.to_vec());
    if scalar.len() != curve.point_size() {
        return Err(KeyCodecError::InvalidArgument);
    }

    let point = match key.pub_key {
        Some(bits) => bits.as_bytes().to_vec(),
        None => {
            tracing::error!("ecc: private encoding carries no public point");
            return Err(KeyCodecError::InvalidArgument);
        }
    };
    check_point(curve, &point)?;

    Ok(RawEccKeyPair {
        curve,
        scalar,
        point,
    })
}

/// Encodes a raw ECC public key as DER SPKI.
///
/// `out` follows the size-query pattern: `None` reports the required size.
///
/// # Errors
///
/// `KeyCodecError::InvalidArgument` for a malformed point,
/// `KeyCodecError::Asn1Encode` / `KeyCodecError::BufferTooSmall` on output.
pub fn ecc_public_from_raw(
    key: &RawEccPublicKey,
    out: Option<&mut [u8]>,
) -> KeyCodecResult<usize> {
    check_point(key.curve, &key.point)?;

    let spki = SubjectPublicKeyInfo {
        algorithm: EcAlgorithmIdentifier {
            algorithm: OID_EC_PUBLIC_KEY,
            parameters: key.curve.into(),
        },
        subject_public_key: asn1::BitString::new(&key.point, 0)
            .ok_or(KeyCodecError::Asn1Encode)?,
    };

    let der = asn1::write_single(&spki).map_err(|_| KeyCodecError::Asn1Encode)?;
    write_der(&der, out)
}

/// Encodes a raw ECC keypair as PKCS#8-wrapped RFC 5915.
///
/// `out` follows the size-query pattern: `None` reports the required size.
///
/// # Errors
///
/// `KeyCodecError::InvalidArgument` for a malformed scalar or point,
/// `KeyCodecError::Asn1Encode` / `KeyCodecError::BufferTooSmall` on output.
pub fn ecc_keypair_from_raw(key: &RawEccKeyPair, out: Option<&mut [u8]>) -> KeyCodecResult<usize> {
    if key.scalar.len() != key.curve.point_size() {
        return Err(KeyCodecError::InvalidArgument);
    }
    check_point(key.curve, &key.point)?;

    let ec_key = EcPrivateKey {
        version: 1,
        priv_key: &key.scalar,
        parameters: None,
        pub_key: Some(asn1::BitString::new(&key.point, 0).ok_or(KeyCodecError::Asn1Encode)?),
    };
    let ec_key_der = asn1::write_single(&ec_key).map_err(|_| KeyCodecError::Asn1Encode)?;

    let key_info = EcPrivateKeyInfo {
        version: 0,
        algo_id: EcAlgorithmIdentifier {
            algorithm: OID_EC_PUBLIC_KEY,
            parameters: key.curve.into(),
        },
        priv_key: &ec_key_der,
        attrs: None,
    };

    let der = asn1::write_single(&key_info).map_err(|_| KeyCodecError::Asn1Encode)?;
    write_der(&der, out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn synthetic_keypair(curve: EccCurve) -> RawEccKeyPair {
        let w = curve.point_size();
        let scalar: Vec<u8> = (0..w).map(|i| (i as u8).wrapping_mul(7).wrapping_add(3)).collect();
        let mut point = vec![0x04u8];
        point.extend((0..w).map(|i| (i as u8).wrapping_add(0x10)));
        point.extend((0..w).map(|i| (i as u8).wrapping_add(0x80)));
        RawEccKeyPair {
            curve,
            scalar: Zeroizing::new(scalar),
            point,
        }
    }

    #[test]
    fn public_key_roundtrip() {
        for curve in [EccCurve::P256, EccCurve::P384, EccCurve::P521] {
            let pair = synthetic_keypair(curve);
            let public = RawEccPublicKey {
                curve,
                point: pair.point.clone(),
            };

            let len = ecc_public_from_raw(&public, None).unwrap();
            let mut der = vec![0u8; len];
            ecc_public_from_raw(&public, Some(&mut der)).unwrap();

            let raw = ecc_public_to_raw(&der).unwrap();
            assert_eq!(raw.curve, curve);
            assert_eq!(raw.point, pair.point);
        }
    }

    #[test]
    fn keypair_roundtrip() {
        for curve in [EccCurve::P256, EccCurve::P384, EccCurve::P521] {
            let pair = synthetic_keypair(curve);

            let len = ecc_keypair_from_raw(&pair, None).unwrap();
            let mut der = vec![0u8; len];
            ecc_keypair_from_raw(&pair, Some(&mut der)).unwrap();

            let raw = ecc_keypair_to_raw(&der).unwrap();
            assert_eq!(raw.curve, curve);
            assert_eq!(*raw.scalar, *pair.scalar);
            assert_eq!(raw.point, pair.point);
        }
    }

    #[test]
    fn compressed_points_are_rejected() {
        let mut pair = synthetic_keypair(EccCurve::P256);
        pair.point[0] = 0x02;
        assert_eq!(
            ecc_keypair_from_raw(&pair, None),
            Err(KeyCodecError::InvalidArgument)
        );
    }

    #[test]
    fn truncated_point_is_rejected() {
        let mut pair = synthetic_keypair(EccCurve::P256);
        pair.point.pop();
        assert_eq!(
            ecc_keypair_from_raw(&pair, None),
            Err(KeyCodecError::InvalidArgument)
        );
    }

    #[test]
    fn scalar_length_must_match_curve() {
        let mut pair = synthetic_keypair(EccCurve::P256);
        pair.scalar = Zeroizing::new(vec![0u8; 31]);
        assert_eq!(
            ecc_keypair_from_raw(&pair, None),
            Err(KeyCodecError::InvalidArgument)
        );
    }

    #[test]
    fn garbage_der_is_rejected() {
        assert!(ecc_public_to_raw(&[0x30, 0x02, 0x05, 0x00]).is_err());
        assert!(ecc_keypair_to_raw(&[0u8; 7]).is_err());
    }

    #[test]
    fn undersized_output_buffer_is_reported() {
        let pair = synthetic_keypair(EccCurve::P256);
        let len = ecc_keypair_from_raw(&pair, None).unwrap();
        let mut der = vec![0u8; len - 1];
        assert_eq!(
            ecc_keypair_from_raw(&pair, Some(&mut der)),
            Err(KeyCodecError::BufferTooSmall)
        );
    }
}
