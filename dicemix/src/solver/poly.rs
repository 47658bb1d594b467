use crate::field::Fp;

/// Dense univariate polynomial over [`Fp`]
///
/// Coefficients are stored in ascending order of degree without trailing zeroes, so the zero
/// polynomial has no coefficients at all.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Poly {
    coeffs: Vec<Fp>,
}

impl Poly {
    /// Constructs a polynomial from coefficients given in ascending order of degree
    pub fn new(coeffs: Vec<Fp>) -> Self {
        let mut poly = Self { coeffs };
        poly.trim();
        poly
    }

    pub fn zero() -> Self {
        Self { coeffs: vec![] }
    }

    pub fn constant(c: Fp) -> Self {
        Self::new(vec![c])
    }

    /// Monomial `x`
    pub fn x() -> Self {
        Self::new(vec![Fp::ZERO, Fp::ONE])
    }

    /// `x - root`
    pub fn linear(root: Fp) -> Self {
        Self::new(vec![-root, Fp::ONE])
    }

    pub fn coeffs(&self) -> &[Fp] {
        &self.coeffs
    }

    /// Degree of the polynomial, `None` for the zero polynomial
    pub fn degree(&self) -> Option<usize> {
        self.coeffs.len().checked_sub(1)
    }

    pub fn is_zero(&self) -> bool {
        self.coeffs.is_empty()
    }

    fn trim(&mut self) {
        while self.coeffs.last().map_or(false, |c| c.is_zero()) {
            self.coeffs.pop();
        }
    }

    fn lead_inverse(&self) -> Fp {
        // leading coefficient is non-zero after trimming
        self.coeffs
            .last()
            .and_then(|lead| lead.inv())
            .unwrap_or_else(|| panic!("zero polynomial has no leading coefficient"))
    }

    /// Scales the polynomial so that its leading coefficient is one
    pub fn monic(&self) -> Self {
        if self.is_zero() {
            return Self::zero();
        }
        let inv = self.lead_inverse();
        Self::new(self.coeffs.iter().map(|c| *c * inv).collect())
    }

    pub fn add(&self, other: &Poly) -> Self {
        let len = self.coeffs.len().max(other.coeffs.len());
        Self::new(
            (0..len)
                .map(|i| self.coeff(i) + other.coeff(i))
                .collect(),
        )
    }

    pub fn sub(&self, other: &Poly) -> Self {
        let len = self.coeffs.len().max(other.coeffs.len());
        Self::new(
            (0..len)
                .map(|i| self.coeff(i) - other.coeff(i))
                .collect(),
        )
    }

    fn coeff(&self, i: usize) -> Fp {
        self.coeffs.get(i).copied().unwrap_or(Fp::ZERO)
    }

    pub fn mul(&self, other: &Poly) -> Self {
        if self.is_zero() || other.is_zero() {
            return Self::zero();
        }
        let mut out = vec![Fp::ZERO; self.coeffs.len() + other.coeffs.len() - 1];
        for (i, a) in self.coeffs.iter().enumerate() {
            if a.is_zero() {
                continue;
            }
            for (j, b) in other.coeffs.iter().enumerate() {
                out[i + j] += *a * *b;
            }
        }
        Self::new(out)
    }

    /// Euclidean division, returns `(quotient, remainder)`
    ///
    /// ## Panics
    /// Panics if `divisor` is the zero polynomial
    pub fn div_rem(&self, divisor: &Poly) -> (Poly, Poly) {
        let d = divisor
            .degree()
            .unwrap_or_else(|| panic!("division by zero polynomial"));
        if self.coeffs.len() <= d {
            return (Self::zero(), self.clone());
        }
        let lead_inv = divisor.lead_inverse();
        let mut rem = self.coeffs.clone();
        let mut quot = vec![Fp::ZERO; rem.len() - d];
        for i in (0..quot.len()).rev() {
            let c = rem[i + d] * lead_inv;
            quot[i] = c;
            if c.is_zero() {
                continue;
            }
            for (j, dc) in divisor.coeffs.iter().enumerate() {
                rem[i + j] -= c * *dc;
            }
        }
        rem.truncate(d);
        (Self::new(quot), Self::new(rem))
    }

    pub fn rem(&self, divisor: &Poly) -> Self {
        self.div_rem(divisor).1
    }

    /// Monic greatest common divisor
    pub fn gcd(&self, other: &Poly) -> Self {
        let mut a = self.clone();
        let mut b = other.clone();
        while !b.is_zero() {
            let r = a.rem(&b);
            a = b;
            b = r;
        }
        a.monic()
    }

    /// Computes `self^exp mod modulus`
    pub fn pow_mod(&self, mut exp: u64, modulus: &Poly) -> Self {
        let mut base = self.rem(modulus);
        let mut acc = Self::constant(Fp::ONE).rem(modulus);
        while exp > 0 {
            if exp & 1 == 1 {
                acc = acc.mul(&base).rem(modulus);
            }
            exp >>= 1;
            if exp > 0 {
                base = base.mul(&base).rem(modulus);
            }
        }
        acc
    }

    /// Divides the polynomial by `x - root` using synthetic division
    ///
    /// Returns the quotient and the remainder, which equals the polynomial evaluated at `root`.
    pub fn deflate(&self, root: Fp) -> (Poly, Fp) {
        let n = self.coeffs.len();
        if n == 0 {
            return (Self::zero(), Fp::ZERO);
        }
        let mut quot = vec![Fp::ZERO; n - 1];
        let mut carry = Fp::ZERO;
        for i in (1..n).rev() {
            carry = self.coeffs[i] + carry * root;
            quot[i - 1] = carry;
        }
        (Self::new(quot), self.coeffs[0] + carry * root)
    }

    /// Evaluates the polynomial at `x` (Horner's scheme)
    pub fn eval(&self, x: Fp) -> Fp {
        self.coeffs
            .iter()
            .rev()
            .fold(Fp::ZERO, |acc, c| acc * x + *c)
    }
}

#[cfg(test)]
mod tests {
    use super::Poly;
    use crate::field::Fp;

    fn poly(coeffs: &[u64]) -> Poly {
        Poly::new(coeffs.iter().copied().map(Fp::from_u64).collect())
    }

    #[test]
    fn trailing_zeroes_are_trimmed() {
        assert_eq!(poly(&[1, 2, 0, 0]), poly(&[1, 2]));
        assert!(poly(&[0, 0]).is_zero());
        assert_eq!(poly(&[0]).degree(), None);
        assert_eq!(poly(&[5, 0, 3]).degree(), Some(2));
    }

    #[test]
    fn division_reconstructs_dividend() {
        let a = poly(&[3, 0, 7, 1, 9, 4]);
        let b = poly(&[2, 5, 1]);
        let (q, r) = a.div_rem(&b);
        assert!(r.degree() < b.degree());
        assert_eq!(q.mul(&b).add(&r), a);
    }

    #[test]
    fn gcd_of_products_finds_common_factor() {
        let common = Poly::linear(Fp::from_u64(11)).mul(&Poly::linear(Fp::from_u64(42)));
        let a = common.mul(&Poly::linear(Fp::from_u64(7)));
        let b = common.mul(&poly(&[1, 1, 1]));
        assert_eq!(a.gcd(&b), common);
    }

    #[test]
    fn deflation_by_root_leaves_no_remainder() {
        let f = Poly::linear(Fp::from_u64(3)).mul(&poly(&[4, 0, 1]));
        let (q, r) = f.deflate(Fp::from_u64(3));
        assert_eq!(r, Fp::ZERO);
        assert_eq!(q, poly(&[4, 0, 1]));

        let (_, r) = f.deflate(Fp::from_u64(5));
        assert_eq!(r, f.eval(Fp::from_u64(5)));
    }

    #[test]
    fn pow_mod_matches_repeated_multiplication() {
        let modulus = poly(&[1, 3, 0, 2, 1]);
        let base = poly(&[6, 1]);
        let mut expected = Poly::constant(Fp::ONE);
        for _ in 0..13 {
            expected = expected.mul(&base).rem(&modulus);
        }
        assert_eq!(base.pow_mod(13, &modulus), expected);
    }
}
