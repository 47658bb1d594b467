//! Recovers message hashes from power sums
//!
//! After the exponential DC-net round, the server holds `p_k = Σ_i m_i^k` for `k = 1..=n`. The
//! messages `m_i` are exactly the roots of the monic polynomial whose coefficients follow from
//! Newton's identities, so recovery boils down to factoring that polynomial over [`Fp`].
//!
//! Factoring is done by:
//! 1. extracting the product of distinct linear factors `gcd(f, x^P - x)`
//! 2. splitting it with Cantor–Zassenhaus (random `gcd(g, (x + a)^((P-1)/2) - 1)`)
//! 3. recovering multiplicities by repeated deflation of `f`
//!
//! The randomness used for splitting comes from a fixed seed, so [`solve`] is deterministic.

use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;
use thiserror::Error;

use crate::field::{Fp, P};

pub use self::poly::Poly;

mod poly;

/// Hard upper bound on number of power sums the solver accepts
pub const MAX_POWER_SUMS: usize = 1000;

/// Max number of random shifts tried to split a single factor
const MAX_SPLIT_ATTEMPTS: usize = 128;

/// Seed of the splitting randomness
const SPLIT_SEED: u64 = 0x6469_6365_6d69_78;

/// Finds the multiset of field elements whose power sums are given
///
/// `power_sums[k]` is expected to be `Σ m_i^(k+1)`. On success, returns exactly
/// `power_sums.len()` roots sorted in ascending order; equal messages show up as repeated roots.
/// If the vector does not correspond to any multiset of that size (e.g. someone contributed more
/// messages than announced, or submitted garbage), an error is returned.
pub fn solve(power_sums: &[Fp]) -> Result<Vec<Fp>, SolveError> {
    let n = power_sums.len();
    if n == 0 {
        return Err(SolveError::Empty);
    }
    if n > MAX_POWER_SUMS {
        return Err(SolveError::TooManyPowerSums {
            n,
            limit: MAX_POWER_SUMS,
        });
    }

    let f = newton_polynomial(power_sums);
    let distinct = distinct_roots(&f)?;

    let mut roots = Vec::with_capacity(n);
    let mut rest = f;
    for root in distinct {
        loop {
            let (quotient, remainder) = rest.deflate(root);
            if !remainder.is_zero() {
                break;
            }
            rest = quotient;
            roots.push(root);
        }
    }

    if roots.len() != n {
        return Err(SolveError::DoesNotSplit {
            found: roots.len(),
            expected: n,
        });
    }
    roots.sort_unstable();
    Ok(roots)
}

/// Builds the monic polynomial `x^n + c_1 x^(n-1) + ... + c_n` from its power sums
///
/// `c_k = -(p_k + Σ_{j=1}^{k-1} c_j p_{k-j}) / k`
fn newton_polynomial(power_sums: &[Fp]) -> Poly {
    let n = power_sums.len();
    let mut c = Vec::with_capacity(n + 1);
    c.push(Fp::ONE);
    for k in 1..=n {
        let mut acc = power_sums[k - 1];
        for j in 1..k {
            acc += c[j] * power_sums[k - j - 1];
        }
        // k <= MAX_POWER_SUMS < P, the inverse always exists
        let k_inv = Fp::from_u64(k as u64).inv().unwrap_or(Fp::ZERO);
        c.push(-(acc * k_inv));
    }
    // c is in descending order of degree
    c.reverse();
    Poly::new(c)
}

/// Returns distinct roots of `f` lying in the field
fn distinct_roots(f: &Poly) -> Result<Vec<Fp>, SolveError> {
    let x = Poly::x();
    let frobenius = x.pow_mod(P, f);
    let g = f.gcd(&frobenius.sub(&x));

    let mut rng = ChaCha20Rng::seed_from_u64(SPLIT_SEED);
    let mut roots = vec![];
    let mut pending = vec![g];

    while let Some(g) = pending.pop() {
        match g.degree() {
            None | Some(0) => continue,
            Some(1) => {
                // g is monic: x + c
                roots.push(-g.coeffs()[0]);
                continue;
            }
            Some(_) => (),
        }

        let (a, b) = split(&g, &mut rng)?;
        pending.push(a);
        pending.push(b);
    }
    Ok(roots)
}

/// Splits a product of distinct linear factors into two non-trivial factors
fn split(g: &Poly, rng: &mut ChaCha20Rng) -> Result<(Poly, Poly), SolveError> {
    use rand::Rng;

    let degree = g.degree().unwrap_or(0);
    for _ in 0..MAX_SPLIT_ATTEMPTS {
        let shift = Fp::from_u64(rng.gen());
        let h = Poly::new(vec![shift, Fp::ONE])
            .pow_mod((P - 1) / 2, g)
            .sub(&Poly::constant(Fp::ONE));
        let d = g.gcd(&h);
        match d.degree() {
            Some(k) if k > 0 && k < degree => {
                let (quotient, _) = g.div_rem(&d);
                return Ok((d, quotient));
            }
            _ => continue,
        }
    }
    Err(SolveError::SplitFailed { degree })
}

/// Power sums solving error
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SolveError {
    #[error("no power sums given")]
    Empty,
    #[error("too many power sums: {n} (limit {limit})")]
    TooManyPowerSums { n: usize, limit: usize },
    #[error("polynomial does not split into linear factors: found {found} roots out of {expected}")]
    DoesNotSplit { found: usize, expected: usize },
    #[error("couldn't split factor of degree {degree}")]
    SplitFailed { degree: usize },
}

/// Computes `p_k = Σ_i m_i^k` for `k = 1..=count`
pub fn power_sums(messages: &[Fp], count: usize) -> Vec<Fp> {
    let mut sums = vec![Fp::ZERO; count];
    for m in messages {
        let mut power = Fp::ONE;
        for sum in sums.iter_mut() {
            power *= *m;
            *sum += power;
        }
    }
    sums
}
