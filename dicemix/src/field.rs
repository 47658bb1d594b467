//! Arithmetic in the prime field of order `P = 2^61 - 1`
//!
//! Exponential DC-net vectors, message hashes and polynomial coefficients all live in this
//! field. The modulus is a Mersenne prime, so reduction is a shift and an add.

use std::fmt;
use std::ops::{Add, AddAssign, Mul, MulAssign, Neg, Sub, SubAssign};

/// Field modulus, `2^61 - 1`
pub const P: u64 = (1 << 61) - 1;

/// Element of the field `Z/PZ`
///
/// The inner value is always in canonical form, i.e. `< P`.
#[derive(Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Fp(u64);

impl Fp {
    /// Additive identity
    pub const ZERO: Fp = Fp(0);
    /// Multiplicative identity
    pub const ONE: Fp = Fp(1);

    /// Reduces an arbitrary `u64` into the field
    pub fn from_u64(value: u64) -> Self {
        Fp(reduce(reduce_once(value)))
    }

    /// Canonical representative, always `< P`
    pub fn value(self) -> u64 {
        self.0
    }

    /// Raises the element to power `exp` by square-and-multiply
    pub fn pow(self, mut exp: u64) -> Self {
        let mut base = self;
        let mut acc = Fp::ONE;
        while exp > 0 {
            if exp & 1 == 1 {
                acc *= base;
            }
            base *= base;
            exp >>= 1;
        }
        acc
    }

    /// Multiplicative inverse, `None` for zero
    pub fn inv(self) -> Option<Self> {
        if self == Fp::ZERO {
            None
        } else {
            Some(self.pow(P - 2))
        }
    }

    /// Checks whether the element is zero
    pub fn is_zero(self) -> bool {
        self.0 == 0
    }
}

/// Folds bits above 61 back into the low part. Output may still be `>= P` if input was large.
fn reduce_once(value: u64) -> u64 {
    let folded = (value & P) + (value >> 61);
    if folded == P {
        0
    } else {
        folded
    }
}

/// Second folding step, after which the value is canonical
fn reduce(value: u64) -> u64 {
    let value = reduce_once(value);
    assert!(value < P, "value is not reduced: {value}");
    value
}

impl From<Fp> for u64 {
    fn from(element: Fp) -> u64 {
        element.0
    }
}

impl fmt::Debug for Fp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fp({})", self.0)
    }
}

impl fmt::Display for Fp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl Add for Fp {
    type Output = Fp;
    fn add(self, rhs: Fp) -> Fp {
        // both operands are < 2^61, the sum can't overflow
        Fp(reduce(reduce_once(self.0 + rhs.0)))
    }
}

impl Sub for Fp {
    type Output = Fp;
    fn sub(self, rhs: Fp) -> Fp {
        if rhs.0 > self.0 {
            Fp(P - rhs.0 + self.0)
        } else {
            Fp(self.0 - rhs.0)
        }
    }
}

impl Mul for Fp {
    type Output = Fp;
    fn mul(self, rhs: Fp) -> Fp {
        let product = u128::from(self.0) * u128::from(rhs.0);
        let hi = (product >> 64) as u64;
        let lo = product as u64;
        // product < 2^122, so `product >> 61` fits into 61 bits
        let high_bits = (hi << 3) | (lo >> 61);
        Fp(reduce(reduce_once((lo & P) + high_bits)))
    }
}

impl Neg for Fp {
    type Output = Fp;
    fn neg(self) -> Fp {
        Fp(reduce(P - self.0))
    }
}

impl AddAssign for Fp {
    fn add_assign(&mut self, rhs: Fp) {
        *self = *self + rhs
    }
}

impl SubAssign for Fp {
    fn sub_assign(&mut self, rhs: Fp) {
        *self = *self - rhs
    }
}

impl MulAssign for Fp {
    fn mul_assign(&mut self, rhs: Fp) {
        *self = *self * rhs
    }
}

impl std::iter::Sum for Fp {
    fn sum<I: Iterator<Item = Fp>>(iter: I) -> Fp {
        iter.fold(Fp::ZERO, Add::add)
    }
}

#[cfg(test)]
mod tests {
    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha20Rng;

    use super::{Fp, P};

    fn fp(value: u64) -> Fp {
        Fp::from_u64(value)
    }

    #[test]
    fn addition() {
        let cases = [
            (7, 5, 12),
            (P - 2, 5, 3),
            (
                2193980333835211996,
                621408416523297271,
                509545741144815316,
            ),
            (u64::MAX, u64::MAX, 14),
            (2305843009213693950, 3, 2),
            (2305843009213693950, 1, 0),
        ];
        for (a, b, expected) in cases {
            assert_eq!(fp(a) + fp(b), fp(expected), "{a} + {b}");
        }
    }

    #[test]
    fn subtraction() {
        let cases = [(7, 5, 2), (4, 8, P - 4), (u64::MAX, u64::MAX, 0), (P, 5, P - 5)];
        for (a, b, expected) in cases {
            assert_eq!(fp(a) - fp(b), fp(expected), "{a} - {b}");
        }
    }

    #[test]
    fn multiplication() {
        let cases = [
            (4, 3, 12),
            (
                2239513929391938494,
                1021644029483981869,
                619009326837417152,
            ),
            (2305843009213693950, 5, 2305843009213693946),
        ];
        for (a, b, expected) in cases {
            assert_eq!(fp(a) * fp(b), fp(expected), "{a} * {b}");
        }
    }

    #[test]
    fn negation() {
        let cases = [(4, P - 4), (P, 0), (P - 1, 1), (P + 5, P - 5)];
        for (a, expected) in cases {
            assert_eq!(-fp(a), fp(expected), "-{a}");
        }
    }

    #[test]
    fn reduction_is_canonical() {
        for value in [0, 1, P - 1, P, P + 1, u64::MAX, u64::MAX - 1, 1 << 63] {
            let element = fp(value);
            assert!(element.value() < P);
            assert_eq!(element.value(), value % P);
        }
    }

    #[test]
    fn field_axioms_hold_on_random_elements() {
        let mut rng = ChaCha20Rng::seed_from_u64(0xd1ce);
        for _ in 0..1000 {
            let a = fp(rng.gen());
            let b = fp(rng.gen());
            let c = fp(rng.gen());

            assert_eq!(a + b, b + a);
            assert_eq!(a * b, b * a);
            assert_eq!((a + b) + c, a + (b + c));
            assert_eq!((a * b) * c, a * (b * c));
            assert_eq!(a * (b + c), a * b + a * c);
            assert_eq!(a - b, a + (-b));
            assert_eq!(a + (-a), Fp::ZERO);
            if let Some(inv) = a.inv() {
                assert_eq!(a * inv, Fp::ONE);
            }

            let expected = (u128::from(a.value()) * u128::from(b.value()) % u128::from(P)) as u64;
            assert_eq!((a * b).value(), expected);
        }
    }

    #[test]
    fn zero_has_no_inverse() {
        assert_eq!(Fp::ZERO.inv(), None);
        assert_eq!(Fp::ONE.inv(), Some(Fp::ONE));
    }
}
