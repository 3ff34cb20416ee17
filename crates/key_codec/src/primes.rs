// Copyright (C) Microsoft Corporation. All rights reserved.

//! RSA prime generation and recovery.
//!
//! The accelerator builds the keypair (`n`, `d`) in hardware but expects the
//! host to supply the primes, so generation lives here. Recovery goes the
//! other way: the raw keypair carries only `n` and `d`, and the portable
//! PKCS#8 export needs the CRT components, so `(p, q)` are recovered from
//! `(n, e, d)` on demand.

use num_bigint::{BigInt, BigUint};
use num_integer::Integer;
use num_traits::{Euclid, One, ToPrimitive, Zero};
use zeroize::Zeroizing;

use crate::{pad_to, KeyCodecError, KeyCodecResult, RsaPrimes};

const SMALL_PRIMES: [u8; 15] = [3, 5, 7, 11, 13, 17, 19, 23, 29, 31, 37, 41, 43, 47, 53];
const SMALL_PRIMES_PRODUCT: u64 = 16294579238595022365;

// Redraw ceiling; a working RNG finds a prime orders of magnitude sooner.
const MAX_CANDIDATES: usize = 10_000;

fn mr_rounds(bits: usize) -> usize {
    // FIPS 186-4 table C.2 territory; the small-prime sieve runs first.
    if bits >= 1024 {
        4
    } else if bits >= 512 {
        8
    } else {
        16
    }
}

fn fill_random(
    buf: &mut [u8],
    rng: &mut impl FnMut(&mut [u8]) -> Result<(), ()>,
) -> KeyCodecResult<()> {
    rng(buf).map_err(|()| KeyCodecError::RngFailure)
}

/// Uniform random value in `[0, bound)`.
fn gen_below(
    bound: &BigUint,
    rng: &mut impl FnMut(&mut [u8]) -> Result<(), ()>,
) -> KeyCodecResult<BigUint> {
    let len = ((bound.bits() as usize) + 7) / 8;
    let mut buf = Zeroizing::new(vec![0u8; len]);
    loop {
        fill_random(&mut buf, rng)?;
        let candidate = BigUint::from_bytes_be(&buf);
        if &candidate < bound {
            return Ok(candidate);
        }
    }
}

/// Miller-Rabin probable-prime test with random bases.
fn is_probably_prime(
    n: &BigUint,
    rounds: usize,
    rng: &mut impl FnMut(&mut [u8]) -> Result<(), ()>,
) -> KeyCodecResult<bool> {
    let one = BigUint::one();
    let two = BigUint::from(2u32);
    let n_m1 = n - &one;
    let s = n_m1.trailing_zeros().unwrap_or(0);
    let r = &n_m1 >> s;

    'next_round: for _ in 0..rounds {
        let a = loop {
            let a = gen_below(n, rng)?;
            if a >= two && a < n_m1 {
                break a;
            }
        };

        let mut y = a.modpow(&r, n);
        if y.is_one() || y == n_m1 {
            continue;
        }

        for _ in 1..s {
            y = y.modpow(&two, n);
            if y == n_m1 {
                continue 'next_round;
            }
            if y.is_one() {
                return Ok(false);
            }
        }

        return Ok(false);
    }

    Ok(true)
}

/// Draws a probable prime of exactly `bits` bits.
///
/// Candidates get the top two bits set (so a product of two of them has
/// exactly the doubled bit length) and are stepped past the small-prime
/// sieve before the Miller-Rabin rounds run.
fn gen_prime(
    bits: usize,
    rng: &mut impl FnMut(&mut [u8]) -> Result<(), ()>,
) -> KeyCodecResult<BigUint> {
    if bits < 64 {
        return Err(KeyCodecError::InvalidArgument);
    }

    let byte_len = (bits + 7) / 8;
    let top_bits = if bits % 8 == 0 { 8 } else { bits % 8 };
    let rounds = mr_rounds(bits);

    let mut buf = Zeroizing::new(vec![0u8; byte_len]);
    for _ in 0..MAX_CANDIDATES {
        fill_random(&mut buf, rng)?;

        // Trim to the exact bit length, then pin the top two bits and force
        // the candidate odd.
        if top_bits != 8 {
            buf[0] &= (1u8 << top_bits) - 1;
        }
        if top_bits >= 2 {
            buf[0] |= 3 << (top_bits - 2);
        } else {
            buf[0] |= 1;
            buf[1] |= 0x80;
        }
        buf[byte_len - 1] |= 1;

        let mut candidate = BigUint::from_bytes_be(&buf);

        // Step the candidate past multiples of the small primes; the
        // Miller-Rabin rounds still validate whatever survives.
        let residue = (&candidate % SMALL_PRIMES_PRODUCT)
            .to_u64()
            .ok_or(KeyCodecError::PrimeGeneration)?;

        'next_delta: for delta in (0u64..1 << 20).step_by(2) {
            let shifted = match residue.checked_add(delta) {
                Some(m) => m,
                None => break,
            };
            for &prime in SMALL_PRIMES.iter() {
                if shifted % (prime as u64) == 0 {
                    continue 'next_delta;
                }
            }

            candidate += delta;
            break;
        }

        if candidate.bits() as usize != bits {
            continue;
        }

        if is_probably_prime(&candidate, rounds, rng)? {
            return Ok(candidate);
        }
    }

    Err(KeyCodecError::PrimeGeneration)
}

/// Generates the prime pair for an RSA modulus of `modulus_bits` bits.
///
/// Both primes are `modulus_bits / 2` bits with the top two bits set, so the
/// product has exactly `modulus_bits` bits. The pair satisfies the
/// FIPS 186-4 Section B.3.3 minimum |P-Q| distance and is normalized to
/// `P > Q`.
///
/// # Errors
///
/// `KeyCodecError::InvalidArgument` for unsupported sizes,
/// `KeyCodecError::RngFailure` if the RNG fails,
/// `KeyCodecError::PrimeGeneration` if no pair is found within the redraw
/// ceiling.
pub fn generate_primes(
    modulus_bits: usize,
    rng: &mut impl FnMut(&mut [u8]) -> Result<(), ()>,
) -> KeyCodecResult<RsaPrimes> {
    if modulus_bits < 128 || modulus_bits % 16 != 0 {
        tracing::error!(modulus_bits, "primes: unsupported modulus size");
        return Err(KeyCodecError::InvalidArgument);
    }

    let half_bits = modulus_bits / 2;
    let prime_len = half_bits / 8;

    for _ in 0..MAX_CANDIDATES {
        let mut p = gen_prime(half_bits, rng)?;
        let mut q = gen_prime(half_bits, rng)?;

        if p == q {
            continue;
        }

        // FIPS 186-4 B.3.3 step 5.4: |P - Q| must exceed 2^(half - 100).
        let distance = if p > q { &p - &q } else { &q - &p };
        if modulus_bits >= 200 && distance.bits() as usize <= half_bits - 99 {
            continue;
        }

        if p < q {
            core::mem::swap(&mut p, &mut q);
        }

        return Ok(RsaPrimes {
            p: Zeroizing::new(to_fixed_be(&p, prime_len)?),
            q: Zeroizing::new(to_fixed_be(&q, prime_len)?),
        });
    }

    Err(KeyCodecError::PrimeGeneration)
}

/// Recovers `(p, q)` from `(n, e, d)`, `p > q`.
///
/// Probabilistic factoring from the key equation `e*d - 1 = k * lcm(p-1,
/// q-1)`; converges in a handful of iterations for well-formed keys.
///
/// # Errors
///
/// `KeyCodecError::InvalidArgument` if the components cannot describe an RSA
/// key, `KeyCodecError::PrimeGeneration` if factoring does not converge.
pub fn recover_primes(
    n: &BigUint,
    e: &BigUint,
    d: &BigUint,
    rng: &mut impl FnMut(&mut [u8]) -> Result<(), ()>,
) -> KeyCodecResult<(BigUint, BigUint)> {
    const ITER_LIMIT: usize = 100;
    let one = BigUint::one();

    // Decompose e*d - 1 into r * 2^t with r odd.
    let mut r = (e * d) - &one;
    if r.is_odd() || r.is_zero() {
        return Err(KeyCodecError::InvalidArgument);
    }
    let t = r.trailing_zeros().unwrap_or(0);
    r >>= t;

    let n_m1 = n - &one;
    let two = BigUint::from(2u32);

    for _ in 0..ITER_LIMIT {
        let g = loop {
            let g = gen_below(n, rng)?;
            if g >= two {
                break g;
            }
        };

        // A shared factor found by chance already factors n.
        let shared = n.gcd(&g);
        if !shared.is_one() && &shared != n {
            return Ok(order_factors(n, &shared));
        }

        let mut g = g.modpow(&r, n);
        if g.is_one() || g == n_m1 {
            continue;
        }

        let mut count = BigUint::one();
        let limit = BigUint::from(t);
        while count < limit {
            let g_next = g.modpow(&two, n);
            if g_next.is_one() {
                // g^2 = 1 (mod n) with g != +-1, so gcd(g - 1, n) splits n.
                let p = n.gcd(&(&g - &one));
                if p.is_one() || &p == n {
                    break;
                }
                return Ok(order_factors(n, &p));
            }
            if g_next == n_m1 {
                break;
            }
            g = g_next;
            count += &one;
        }
    }

    Err(KeyCodecError::PrimeGeneration)
}

fn order_factors(n: &BigUint, factor: &BigUint) -> (BigUint, BigUint) {
    let other = n / factor;
    if factor > &other {
        (factor.clone(), other)
    } else {
        (other, factor.clone())
    }
}

/// Modular inverse of `a` mod `m`, when it exists.
pub(crate) fn modinv(a: &BigUint, m: &BigUint) -> Option<BigUint> {
    let (a, m) = (BigInt::from(a % m), BigInt::from(m.clone()));
    let g = a.extended_gcd(&m);
    g.gcd
        .is_one()
        .then(|| g.x.rem_euclid(&m).to_biguint().expect("non-negative"))
}

/// Big-endian bytes of `x`, left-padded to exactly `len`.
pub(crate) fn to_fixed_be(x: &BigUint, len: usize) -> KeyCodecResult<Vec<u8>> {
    pad_to(&x.to_bytes_be(), len)
}
