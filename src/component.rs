use std::collections::HashMap;

use num_complex::Complex64;
use serde::{Deserialize, Serialize};

use crate::field::Field;

/// Physical two-terminal part whose impedance depends on frequency
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Element {
    Resistor(f64),
    Inductor(f64),
    /// Inductor with unloaded quality factor `q`, modelled as the series
    /// resistance `ωL/Q`
    LossyInductor { henries: f64, q: f64 },
    Capacitor(f64),
    /// Frequency-independent complex impedance
    Fixed(Complex64),
    Series(Vec<Element>),
    Parallel(Vec<Element>),
}

impl Element {
    /// Quartz crystal: motional `esr + jωLm + 1/(jωCm)`, optionally shunted
    /// by the holder capacitance `cp`.
    pub fn crystal(motional_l: f64, motional_c: f64, esr: f64, holder_c: Option<f64>) -> Self {
        let motional = Element::Series(vec![
            Element::Resistor(esr),
            Element::Inductor(motional_l),
            Element::Capacitor(motional_c),
        ]);
        match holder_c {
            Some(cp) => Element::Parallel(vec![motional, Element::Capacitor(cp)]),
            None => motional,
        }
    }

    /// Impedance at angular frequency `omega` (rad/s).
    ///
    /// A capacitor at `omega = 0` is an open circuit (infinite impedance).
    pub fn impedance(&self, omega: f64) -> Complex64 {
        match self {
            Element::Resistor(r) => Complex64::new(*r, 0.0),
            Element::Inductor(l) => Complex64::new(0.0, omega * l),
            Element::LossyInductor { henries, q } => {
                Complex64::new(omega.abs() * henries / q, omega * henries)
            }
            Element::Capacitor(c) => {
                if omega == 0.0 || *c == 0.0 {
                    Complex64::new(f64::INFINITY, 0.0)
                } else {
                    Complex64::new(0.0, -1.0 / (omega * c))
                }
            }
            Element::Fixed(z) => *z,
            Element::Series(parts) => {
                let mut total = Complex64::new(0.0, 0.0);
                for part in parts {
                    let z = part.impedance(omega);
                    if z.is_infinite() {
                        return Complex64::new(f64::INFINITY, 0.0);
                    }
                    total += z;
                }
                total
            }
            Element::Parallel(parts) => {
                let mut admittance = Complex64::new(0.0, 0.0);
                for part in parts {
                    match part.impedance(omega).invert() {
                        Some(y) => admittance += y,
                        // a shorted branch shorts the whole group
                        None => return Complex64::new(0.0, 0.0),
                    }
                }
                admittance
                    .invert()
                    .unwrap_or_else(|| Complex64::new(f64::INFINITY, 0.0))
            }
        }
    }

    /// One-letter kind used in netlists and reports
    pub fn kind(&self) -> &'static str {
        match self {
            Element::Resistor(_) => "R",
            Element::Inductor(_) | Element::LossyInductor { .. } => "L",
            Element::Capacitor(_) => "C",
            Element::Fixed(_) => "Z",
            Element::Series(_) => "S",
            Element::Parallel(_) => "P",
        }
    }
}

/// Element models keyed by the impedance symbol they resolve
pub type Bindings = HashMap<String, Element>;

/// Every binding's impedance at `omega`
pub fn impedances_at(bindings: &Bindings, omega: f64) -> HashMap<String, Complex64> {
    bindings
        .iter()
        .map(|(name, element)| (name.clone(), element.impedance(omega)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_basic_impedances() {
        let omega = 2.0 * std::f64::consts::PI * 1.0e6;
        assert_eq!(Element::Resistor(50.0).impedance(omega), Complex64::new(50.0, 0.0));

        let zl = Element::Inductor(1.0e-6).impedance(omega);
        assert_relative_eq!(zl.im, omega * 1.0e-6);
        assert_eq!(zl.re, 0.0);

        let zc = Element::Capacitor(1.0e-9).impedance(omega);
        assert_relative_eq!(zc.im, -1.0 / (omega * 1.0e-9));
    }

    #[test]
    fn test_capacitor_is_open_at_dc() {
        assert!(Element::Capacitor(1.0e-9).impedance(0.0).is_infinite());
        let series = Element::Series(vec![Element::Resistor(10.0), Element::Capacitor(1.0e-9)]);
        assert!(series.impedance(0.0).is_infinite());
    }

    #[test]
    fn test_parallel_combination() {
        let pair = Element::Parallel(vec![Element::Resistor(100.0), Element::Resistor(100.0)]);
        assert_relative_eq!(pair.impedance(1.0).re, 50.0, epsilon = 1e-12);

        // an open branch does not load the other one
        let with_open = Element::Parallel(vec![Element::Resistor(75.0), Element::Capacitor(1.0e-12)]);
        assert_relative_eq!(with_open.impedance(0.0).re, 75.0, epsilon = 1e-12);

        let shorted = Element::Parallel(vec![Element::Resistor(75.0), Element::Inductor(1.0e-6)]);
        assert_eq!(shorted.impedance(0.0), Complex64::new(0.0, 0.0));
    }

    #[test]
    fn test_crystal_series_resonance() {
        let (lm, cm, esr) = (0.098, 0.010339e-12, 10.0);
        let crystal = Element::crystal(lm, cm, esr, None);
        let omega0 = 1.0 / (lm * cm).sqrt();
        let z = crystal.impedance(omega0);
        assert_relative_eq!(z.re, esr, epsilon = 1e-9);
        assert!(z.im.abs() < 1e-3);

        let with_holder = Element::crystal(lm, cm, esr, Some(4.0e-12));
        assert_eq!(with_holder.kind(), "P");
        assert!(with_holder.impedance(omega0).re > 0.0);
    }

    #[test]
    fn test_lossy_inductor() {
        // 6.98 uH with Qu = 200 at 5 MHz
        let omega = 2.0 * std::f64::consts::PI * 5.0e6;
        let coil = Element::LossyInductor { henries: 6.98e-6, q: 200.0 };
        let z = coil.impedance(omega);
        assert_relative_eq!(z.im, omega * 6.98e-6, epsilon = 1e-12);
        assert_relative_eq!(z.im / z.re, 200.0, epsilon = 1e-9);
        assert_eq!(coil.kind(), "L");

        // shorted at DC, lossless as Q grows without bound
        assert_eq!(coil.impedance(0.0), Complex64::new(0.0, 0.0));
        let ideal = Element::LossyInductor { henries: 6.98e-6, q: f64::INFINITY };
        assert_eq!(ideal.impedance(omega), Element::Inductor(6.98e-6).impedance(omega));

        // the loss resistance limits a parallel tank at resonance to Q·ωL
        let c = 1.0 / (omega * omega * 6.98e-6);
        let tank = Element::Parallel(vec![coil, Element::Capacitor(c)]);
        let z = tank.impedance(omega);
        assert_relative_eq!(z.re, 200.0 * omega * 6.98e-6, max_relative = 1e-9);
        assert_relative_eq!(z.im, -omega * 6.98e-6, max_relative = 1e-6);
    }

    #[test]
    fn test_impedances_at() {
        let mut bindings = Bindings::new();
        bindings.insert("rs".to_string(), Element::Resistor(50.0));
        bindings.insert("l1".to_string(), Element::Inductor(1.0));
        let values = impedances_at(&bindings, 2.0);
        assert_eq!(values["rs"], Complex64::new(50.0, 0.0));
        assert_eq!(values["l1"], Complex64::new(0.0, 2.0));
    }
}
