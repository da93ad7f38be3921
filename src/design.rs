//! Low-pass prototype coefficients and their conversion to physical values.
//!
//! All functions are pure: the same `(n, ripple)` always produces the same
//! numbers and nothing is cached between calls.

use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

use crate::error::{FilterError, Result};

/// Decibels per neper; turns a ripple in dB into a natural-log ripple factor.
const DB_PER_NEPER: f64 = 8.68589;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum FilterFamily {
    Butterworth,
    Chebyshev { ripple_db: f64 },
}

impl FilterFamily {
    /// Normalized g-values of this family's prototype.
    pub fn prototype(&self, n: usize) -> Result<Vec<f64>> {
        match *self {
            FilterFamily::Butterworth => butterworth(n),
            FilterFamily::Chebyshev { ripple_db } => chebyshev(n, ripple_db),
        }
    }

    /// Cutoff adjustment `w` for this family (1 for Butterworth).
    pub fn cutoff_adjustment(&self, n: usize) -> Result<f64> {
        match *self {
            FilterFamily::Butterworth => Ok(1.0),
            FilterFamily::Chebyshev { ripple_db } => cutoff_adjustment(ripple_db, n),
        }
    }
}

fn check_order(n: usize) -> Result<()> {
    if n == 0 {
        return Err(FilterError::UnsupportedOrder {
            order: n,
            reason: "a prototype needs at least one element".to_string(),
        });
    }
    Ok(())
}

fn check_ripple(ripple_db: f64) -> Result<()> {
    if !(ripple_db.is_finite() && ripple_db > 0.0) {
        return Err(FilterError::DomainError(format!(
            "passband ripple must be a positive number of dB, got {}",
            ripple_db
        )));
    }
    Ok(())
}

/// `B = (1/2n)·ln((e^d + 1)/(e^d − 1))` with `d = ripple/8.68589`.
fn chebyshev_beta(n: usize, ripple_db: f64) -> f64 {
    let d = ripple_db / DB_PER_NEPER;
    (1.0 / (2.0 * n as f64)) * ((d.exp() + 1.0) / (d.exp() - 1.0)).ln()
}

/// Butterworth g-values: `g_k = 2·sin((2k−1)π/2n)`.
pub fn butterworth(n: usize) -> Result<Vec<f64>> {
    check_order(n)?;
    let n_f = n as f64;
    Ok((1..=n)
        .map(|k| 2.0 * ((2.0 * k as f64 - 1.0) * PI / (2.0 * n_f)).sin())
        .collect())
}

/// Carried state of the Chebyshev recurrence: `(a_{k-1}, b_{k-1}, g_{k-1})`.
#[derive(Debug, Clone, Copy)]
struct Recurrence {
    a: f64,
    b: f64,
    g: f64,
}

/// Chebyshev g-values for a ripple (dB) defined at the ripple band edge.
pub fn chebyshev(n: usize, ripple_db: f64) -> Result<Vec<f64>> {
    check_order(n)?;
    check_ripple(ripple_db)?;

    let n_f = n as f64;
    let big_n = chebyshev_beta(n, ripple_db).sinh();
    let a = |k: usize| ((2.0 * k as f64 - 1.0) * PI / (2.0 * n_f)).sin();
    let b = |k: usize| big_n.powi(2) + (k as f64 * PI / n_f).sin().powi(2);

    let seed = Recurrence {
        a: a(1),
        b: b(1),
        g: 2.0 * a(1) / big_n,
    };

    let mut g = Vec::with_capacity(n);
    g.push(seed.g);
    (2..=n).fold(seed, |prev, k| {
        let a_k = a(k);
        let g_k = 4.0 * prev.a * a_k / (prev.b * prev.g);
        g.push(g_k);
        Recurrence {
            a: a_k,
            b: b(k),
            g: g_k,
        }
    });
    Ok(g)
}

/// Chebyshev g-values rescaled so the −3 dB point falls at unit frequency.
pub fn chebyshev_adjusted_3db(n: usize, ripple_db: f64) -> Result<Vec<f64>> {
    let w = cutoff_adjustment(ripple_db, n)?;
    Ok(chebyshev(n, ripple_db)?.into_iter().map(|g| g * w).collect())
}

/// Factor converting the maximal-ripple cutoff to the −3 dB cutoff.
///
/// Only defined for ripples up to 10·log10(2) ≈ 3.01 dB.
pub fn cutoff_adjustment(ripple_db: f64, n: usize) -> Result<f64> {
    check_order(n)?;
    let e_squared = 10f64.powf(ripple_db / 10.0) - 1.0;
    if !(e_squared.is_finite() && e_squared > 0.0) {
        return Err(FilterError::DomainError(format!(
            "ripple of {} dB gives a non-positive ripple factor",
            ripple_db
        )));
    }
    let e = e_squared.sqrt();
    let radicand = 1.0 / (e * e) - 1.0;
    if radicand < 0.0 {
        return Err(FilterError::DomainError(format!(
            "ripple of {} dB exceeds 3.01 dB, 1/e^2 - 1 = {:.4} < 0",
            ripple_db, radicand
        )));
    }
    let y = (1.0 / n as f64) * (1.0 / e + radicand.sqrt()).ln();
    Ok(y.cosh())
}

/// Coupling coefficients `k_i = (1/w)/sqrt(g_i·g_{i+1})`, one per adjacent pair.
pub fn coupling_coefficients(w: f64, g: &[f64]) -> Result<Vec<f64>> {
    if !(w.is_finite() && w > 0.0) {
        return Err(FilterError::DomainError(format!(
            "cutoff adjustment must be positive, got {}",
            w
        )));
    }
    if let Some(bad) = g.iter().find(|&&value| !(value.is_finite() && value > 0.0)) {
        return Err(FilterError::DomainError(format!(
            "g-values must be positive, got {}",
            bad
        )));
    }
    Ok(g.windows(2)
        .map(|pair| (1.0 / w) * (1.0 / (pair[0] * pair[1]).sqrt()))
        .collect())
}

/// Chebyshev couplings, with `w` derived from the ripple and `g.len()`.
pub fn coupling_coefficients_chebyshev(ripple_db: f64, g: &[f64]) -> Result<Vec<f64>> {
    let w = cutoff_adjustment(ripple_db, g.len())?;
    coupling_coefficients(w, g)
}

/// Normalized end-section figure `q` for the first and last resonator.
///
/// Even-order Chebyshev end matching is asymmetric and not supported.
pub fn end_section_coefficient(family: FilterFamily, g: &[f64]) -> Result<f64> {
    let n = g.len();
    check_order(n)?;
    match family {
        FilterFamily::Butterworth => Ok(g[0]),
        FilterFamily::Chebyshev { ripple_db } => {
            if n % 2 == 0 {
                return Err(FilterError::UnsupportedOrder {
                    order: n,
                    reason: "even-order Chebyshev end sections are asymmetric".to_string(),
                });
            }
            let w = cutoff_adjustment(ripple_db, n)?;
            Ok(g[0] * w)
        }
    }
}

/// [`end_section_coefficient`] divided by a normalized source-resistance ratio.
pub fn end_section_coefficient_with_source(
    family: FilterFamily,
    g: &[f64],
    source_ratio: f64,
) -> Result<f64> {
    if !(source_ratio.is_finite() && source_ratio > 0.0) {
        return Err(FilterError::DomainError(format!(
            "source resistance ratio must be positive, got {}",
            source_ratio
        )));
    }
    Ok(end_section_coefficient(family, g)? / source_ratio)
}

/// Normalized `(source, load)` resistances of a Chebyshev prototype.
pub fn source_load_resistances(n: usize, ripple_db: f64) -> Result<(f64, f64)> {
    check_order(n)?;
    check_ripple(ripple_db)?;
    if n % 2 == 0 {
        let b0 = 2.0 * n as f64 * chebyshev_beta(n, ripple_db);
        Ok(((b0 / 4.0).tanh().powi(2), 1.0))
    } else {
        Ok((1.0, 1.0))
    }
}

/// Farads for prototype value `g` at cutoff `fc_hz` and impedance `r0`.
pub fn denormalize_c(g: f64, fc_hz: f64, r0: f64) -> f64 {
    g / (r0 * 2.0 * PI * fc_hz)
}

/// Henries for prototype value `g` at cutoff `fc_hz` and impedance `r0`.
pub fn denormalize_l(g: f64, fc_hz: f64, r0: f64) -> f64 {
    g * r0 / (2.0 * PI * fc_hz)
}

pub fn normalize_c(farads: f64, fc_hz: f64, r0: f64) -> f64 {
    farads * r0 * 2.0 * PI * fc_hz
}

pub fn normalize_l(henries: f64, fc_hz: f64, r0: f64) -> f64 {
    henries * 2.0 * PI * fc_hz / r0
}

/// Everything derived from `(family, n)` in one place
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedFilterSpec {
    pub family: FilterFamily,
    pub order: usize,
    /// Prototype element values `g_1..g_n`
    pub g: Vec<f64>,
    /// Coupling coefficients `k_12..k_(n-1)n`
    pub k: Vec<f64>,
    /// End-section coefficient; `None` for even-order Chebyshev
    pub q: Option<f64>,
    /// Cutoff adjustment (1 for Butterworth)
    pub w: f64,
    pub source_resistance: f64,
    pub load_resistance: f64,
}

impl NormalizedFilterSpec {
    pub fn new(family: FilterFamily, n: usize) -> Result<Self> {
        let g = family.prototype(n)?;
        let w = family.cutoff_adjustment(n)?;
        let k = coupling_coefficients(w, &g)?;
        let q = match end_section_coefficient(family, &g) {
            Ok(q) => Some(q),
            Err(FilterError::UnsupportedOrder { .. }) => None,
            Err(e) => return Err(e),
        };
        let (source_resistance, load_resistance) = match family {
            FilterFamily::Butterworth => (1.0, 1.0),
            FilterFamily::Chebyshev { ripple_db } => source_load_resistances(n, ripple_db)?,
        };

        Ok(NormalizedFilterSpec {
            family,
            order: n,
            g,
            k,
            q,
            w,
            source_resistance,
            load_resistance,
        })
    }

    pub fn butterworth(n: usize) -> Result<Self> {
        Self::new(FilterFamily::Butterworth, n)
    }

    pub fn chebyshev(n: usize, ripple_db: f64) -> Result<Self> {
        Self::new(FilterFamily::Chebyshev { ripple_db }, n)
    }

    /// The end-section coefficient, or the reason there is none.
    pub fn end_section(&self) -> Result<f64> {
        end_section_coefficient(self.family, &self.g)
    }

    /// Prototype values scaled so the −3 dB point sits at unit frequency.
    pub fn g_3db(&self) -> Vec<f64> {
        self.g.iter().map(|g| g * self.w).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn assert_list_close(expected: &[f64], actual: &[f64], epsilon: f64) {
        assert_eq!(expected.len(), actual.len());
        for (e, a) in expected.iter().zip(actual) {
            assert_abs_diff_eq!(e, a, epsilon = epsilon);
        }
    }

    #[test]
    fn test_butterworth_reference_values() {
        // ARRL Handbook 2016, 11.12
        let g = butterworth(4).unwrap();
        assert_list_close(&[0.7654, 1.848, 1.848, 0.7654], &g, 5e-4);
    }

    #[test]
    fn test_butterworth_is_palindromic() {
        for n in 1..=12 {
            let g = butterworth(n).unwrap();
            for k in 0..n {
                assert_abs_diff_eq!(g[k], g[n - 1 - k], epsilon = 1e-12);
            }
        }
    }

    #[test]
    fn test_chebyshev_reference_values() {
        let g2 = chebyshev(2, 0.1).unwrap();
        assert_list_close(&[0.8430, 0.6220], &g2, 5e-4);

        let g3 = chebyshev(3, 0.1).unwrap();
        assert_list_close(&[1.0316, 1.1474, 1.0316], &g3, 5e-4);
    }

    #[test]
    fn test_order_zero_is_rejected() {
        assert!(matches!(
            butterworth(0),
            Err(FilterError::UnsupportedOrder { order: 0, .. })
        ));
        assert!(matches!(
            chebyshev(0, 0.1),
            Err(FilterError::UnsupportedOrder { order: 0, .. })
        ));
    }

    #[test]
    fn test_chebyshev_rejects_bad_ripple() {
        assert!(matches!(chebyshev(3, 0.0), Err(FilterError::DomainError(_))));
        assert!(matches!(chebyshev(3, -1.0), Err(FilterError::DomainError(_))));
        assert!(matches!(chebyshev(3, f64::NAN), Err(FilterError::DomainError(_))));
    }

    #[test]
    fn test_cutoff_adjustment() {
        assert_abs_diff_eq!(cutoff_adjustment(0.1, 5).unwrap(), 1.1347, epsilon = 5e-5);
    }

    #[test]
    fn test_cutoff_adjustment_domain() {
        assert!(matches!(cutoff_adjustment(3.5, 5), Err(FilterError::DomainError(_))));
        assert!(matches!(cutoff_adjustment(0.0, 5), Err(FilterError::DomainError(_))));
        assert!(cutoff_adjustment(3.0, 5).unwrap().is_finite());
    }

    #[test]
    fn test_chebyshev_coupling_and_end_section() {
        // Hayward, "Designing Narrow-Bandwidth Ladder Filters", p. 41
        let g = chebyshev(5, 0.1).unwrap();
        let k = coupling_coefficients_chebyshev(0.1, &g).unwrap();
        assert_eq!(k.len(), 4);
        assert_abs_diff_eq!(k[0], 0.7028, epsilon = 5e-5);

        let family = FilterFamily::Chebyshev { ripple_db: 0.1 };
        assert_abs_diff_eq!(end_section_coefficient(family, &g).unwrap(), 1.3013, epsilon = 5e-5);
    }

    #[test]
    fn test_butterworth_coupling_and_end_section() {
        let g = butterworth(4).unwrap();
        let k = coupling_coefficients(1.0, &g).unwrap();
        assert_list_close(&[0.841, 0.541, 0.841], &k, 5e-4);
        assert_abs_diff_eq!(
            end_section_coefficient(FilterFamily::Butterworth, &g).unwrap(),
            0.7654,
            epsilon = 5e-5
        );
    }

    #[test]
    fn test_even_chebyshev_end_section_unsupported() {
        let family = FilterFamily::Chebyshev { ripple_db: 0.5 };
        for n in [2, 4, 6, 8] {
            let g = chebyshev(n, 0.5).unwrap();
            assert!(matches!(
                end_section_coefficient(family, &g),
                Err(FilterError::UnsupportedOrder { order, .. }) if order == n
            ));
        }
    }

    #[test]
    fn test_end_section_with_source_ratio() {
        let g = butterworth(3).unwrap();
        let q = end_section_coefficient(FilterFamily::Butterworth, &g).unwrap();
        let scaled =
            end_section_coefficient_with_source(FilterFamily::Butterworth, &g, 2.0).unwrap();
        assert_abs_diff_eq!(scaled, q / 2.0, epsilon = 1e-12);
        assert!(end_section_coefficient_with_source(FilterFamily::Butterworth, &g, 0.0).is_err());
    }

    #[test]
    fn test_coupling_rejects_bad_inputs() {
        assert!(coupling_coefficients(0.0, &[1.0, 1.0]).is_err());
        assert!(coupling_coefficients(1.0, &[1.0, -1.0]).is_err());
        assert!(coupling_coefficients(1.0, &[2.0]).unwrap().is_empty());
    }

    #[test]
    fn test_source_load_resistances() {
        assert_eq!(source_load_resistances(3, 0.1).unwrap(), (1.0, 1.0));

        let (rs, rl) = source_load_resistances(4, 0.1).unwrap();
        assert_eq!(rl, 1.0);
        assert!(rs > 0.0 && rs < 1.0);
        // tanh^2(B0/4) with B0 = ln coth(d/2)
        let d: f64 = 0.1 / 8.68589;
        let b0 = ((d.exp() + 1.0) / (d.exp() - 1.0)).ln();
        assert_abs_diff_eq!(rs, (b0 / 4.0).tanh().powi(2), epsilon = 1e-12);
    }

    #[test]
    fn test_denormalize_round_trip() {
        for &g in &[0.3, 0.7654, 1.0, 1.848, 2.5] {
            for &(fc, r0) in &[(1.0e3, 50.0), (7.0e6, 200.0), (1.0, 1.0)] {
                let c = denormalize_c(g, fc, r0);
                let l = denormalize_l(g, fc, r0);
                assert_abs_diff_eq!(normalize_c(c, fc, r0), g, epsilon = 1e-12);
                assert_abs_diff_eq!(normalize_l(l, fc, r0), g, epsilon = 1e-12);
            }
        }
    }

    #[test]
    fn test_denormalize_known_values() {
        // g = 1 at 1 MHz / 50 ohm
        assert_abs_diff_eq!(denormalize_c(1.0, 1.0e6, 50.0), 3.1831e-9, epsilon = 1e-13);
        assert_abs_diff_eq!(denormalize_l(1.0, 1.0e6, 50.0), 7.9577e-6, epsilon = 1e-10);
    }

    #[test]
    fn test_normalized_spec_bundles_everything() {
        let spec = NormalizedFilterSpec::butterworth(4).unwrap();
        assert_eq!(spec.order, 4);
        assert_eq!(spec.w, 1.0);
        assert_eq!(spec.k.len(), 3);
        assert_abs_diff_eq!(spec.q.unwrap(), 0.7654, epsilon = 5e-5);
        assert_eq!((spec.source_resistance, spec.load_resistance), (1.0, 1.0));

        let even = NormalizedFilterSpec::chebyshev(4, 0.1).unwrap();
        assert!(even.q.is_none());
        assert!(even.end_section().is_err());
        assert!(even.source_resistance < 1.0);

        let odd = NormalizedFilterSpec::chebyshev(5, 0.1).unwrap();
        assert_abs_diff_eq!(odd.q.unwrap(), 1.3013, epsilon = 5e-5);
        assert_abs_diff_eq!(odd.g_3db()[0], odd.g[0] * odd.w, epsilon = 1e-12);
    }

    #[test]
    fn test_chebyshev_adjusted_scales_by_w() {
        let plain = chebyshev(5, 0.1).unwrap();
        let adjusted = chebyshev_adjusted_3db(5, 0.1).unwrap();
        let w = cutoff_adjustment(0.1, 5).unwrap();
        for (p, a) in plain.iter().zip(&adjusted) {
            assert_abs_diff_eq!(p * w, *a, epsilon = 1e-12);
        }
    }
}
