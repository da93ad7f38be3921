use num_complex::Complex64;
use std::fmt::Debug;
use std::ops::{Add, Mul, Neg, Sub};

/// Value type the nodal assembly and elimination run over.
///
/// Implemented for concrete phasors (`Complex64`) and for symbolic
/// expressions whose impedances are substituted later
/// ([`crate::expr::Expr`]).
pub trait Field:
    Clone
    + PartialEq
    + Debug
    + 'static
    + Add<Output = Self>
    + Sub<Output = Self>
    + Mul<Output = Self>
    + Neg<Output = Self>
{
    /// Whether elimination should pick the largest pivot in each column.
    /// When `false` the diagonal is kept unless it is zero.
    const PARTIAL_PIVOTING: bool;

    fn zero() -> Self;

    fn one() -> Self;

    /// Multiplicative inverse. `None` when the value is exactly zero.
    ///
    /// An infinite value (open circuit) inverts to zero.
    fn invert(&self) -> Option<Self>;

    /// Magnitude used to rank pivots and to detect singular ones.
    fn magnitude(&self) -> f64;
}

impl Field for Complex64 {
    const PARTIAL_PIVOTING: bool = true;

    fn zero() -> Self {
        Complex64::new(0.0, 0.0)
    }

    fn one() -> Self {
        Complex64::new(1.0, 0.0)
    }

    fn invert(&self) -> Option<Self> {
        if self.is_nan() || (self.re == 0.0 && self.im == 0.0) {
            None
        } else if self.is_infinite() {
            Some(Complex64::new(0.0, 0.0))
        } else {
            Some(self.inv())
        }
    }

    fn magnitude(&self) -> f64 {
        self.norm()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_complex_invert() {
        let z = Complex64::new(3.0, 4.0);
        let y = z.invert().unwrap();
        let product = z * y;
        assert!((product.re - 1.0).abs() < 1e-12);
        assert!(product.im.abs() < 1e-12);
    }

    #[test]
    fn test_zero_has_no_inverse() {
        assert!(<Complex64 as Field>::zero().invert().is_none());
    }

    #[test]
    fn test_open_circuit_inverts_to_zero() {
        let open = Complex64::new(f64::INFINITY, 0.0);
        assert_eq!(open.invert(), Some(Complex64::new(0.0, 0.0)));
    }
}
