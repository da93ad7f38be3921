//! Doubly-terminated low-pass LC ladders built from prototype g-values.

use colored::*;
use serde::{Deserialize, Serialize};

use crate::component::{Bindings, Element};
use crate::design::{denormalize_c, denormalize_l, FilterFamily, NormalizedFilterSpec};
use crate::error::{FilterError, Result};
use crate::topology::{Impedance, Topology, GROUND};

pub const INPUT_NODE: &str = "vin";

/// Which kind of element sits next to the source resistor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LadderStart {
    /// `g_1` is a capacitor to ground (minimum inductor count for odd n)
    ShuntFirst,
    /// `g_1` is a series inductor
    SeriesFirst,
}

/// One physical part of the ladder
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LadderElement {
    pub name: String,
    pub start: String,
    pub end: String,
    pub element: Element,
    /// Normalized value this part was scaled from
    pub normalized: f64,
}

impl LadderElement {
    /// Ohms, henries or farads; `None` for composite parts.
    pub fn value(&self) -> Option<f64> {
        match self.element {
            Element::Resistor(v) | Element::Inductor(v) | Element::Capacitor(v) => Some(v),
            Element::LossyInductor { henries, .. } => Some(henries),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LowPassLadder {
    pub cutoff_hz: f64,
    pub impedance: f64,
    pub start: LadderStart,
    /// Source, reactive parts in order, then load
    pub elements: Vec<LadderElement>,
    pub output: String,
}

impl LowPassLadder {
    /// Denormalize `g` into alternating shunt capacitors and series
    /// inductors between a source of `terminations.0 · r0` and a load of
    /// `terminations.1 · r0`.
    pub fn design(
        g: &[f64],
        terminations: (f64, f64),
        cutoff_hz: f64,
        r0: f64,
        start: LadderStart,
    ) -> Result<Self> {
        if g.is_empty() {
            return Err(FilterError::UnsupportedOrder {
                order: 0,
                reason: "a ladder needs at least one reactive element".to_string(),
            });
        }
        if !(cutoff_hz > 0.0 && cutoff_hz.is_finite()) {
            return Err(FilterError::InvalidArgument(format!(
                "cutoff frequency must be positive, got {}",
                cutoff_hz
            )));
        }
        if !(r0 > 0.0 && r0.is_finite()) {
            return Err(FilterError::InvalidArgument(format!(
                "reference impedance must be positive, got {}",
                r0
            )));
        }

        let mut elements = Vec::with_capacity(g.len() + 2);
        let mut node = "v1".to_string();
        let mut next_node = 2;
        elements.push(LadderElement {
            name: "rs".to_string(),
            start: INPUT_NODE.to_string(),
            end: node.clone(),
            element: Element::Resistor(terminations.0 * r0),
            normalized: terminations.0,
        });

        let mut shunt = start == LadderStart::ShuntFirst;
        for (i, &gk) in g.iter().enumerate() {
            let index = i + 1;
            if shunt {
                elements.push(LadderElement {
                    name: format!("c{}", index),
                    start: node.clone(),
                    end: GROUND.to_string(),
                    element: Element::Capacitor(denormalize_c(gk, cutoff_hz, r0)),
                    normalized: gk,
                });
            } else {
                let end = format!("v{}", next_node);
                next_node += 1;
                elements.push(LadderElement {
                    name: format!("l{}", index),
                    start: node.clone(),
                    end: end.clone(),
                    element: Element::Inductor(denormalize_l(gk, cutoff_hz, r0)),
                    normalized: gk,
                });
                node = end;
            }
            shunt = !shunt;
        }

        elements.push(LadderElement {
            name: "rl".to_string(),
            start: node.clone(),
            end: GROUND.to_string(),
            element: Element::Resistor(terminations.1 * r0),
            normalized: terminations.1,
        });

        Ok(LowPassLadder {
            cutoff_hz,
            impedance: r0,
            start,
            elements,
            output: node,
        })
    }

    /// Ladder whose −3 dB point lands on `cutoff_hz`.
    ///
    /// Chebyshev prototypes are rescaled by their cutoff adjustment first;
    /// their ripple band then ends below `cutoff_hz`.
    pub fn from_spec(
        spec: &NormalizedFilterSpec,
        cutoff_hz: f64,
        r0: f64,
        start: LadderStart,
    ) -> Result<Self> {
        let g = match spec.family {
            FilterFamily::Butterworth => spec.g.clone(),
            FilterFamily::Chebyshev { .. } => spec.g_3db(),
        };
        Self::design(&g, terminations(spec, start), cutoff_hz, r0, start)
    }

    pub fn source_resistance(&self) -> f64 {
        self.elements[0].normalized * self.impedance
    }

    pub fn load_resistance(&self) -> f64 {
        self.elements[self.elements.len() - 1].normalized * self.impedance
    }

    pub fn order(&self) -> usize {
        self.elements.len() - 2
    }

    /// Symbolic network plus the element behind every symbol.
    ///
    /// Returns the topology, its bindings and the output node name.
    pub fn to_network(&self) -> Result<(Topology, Bindings, String)> {
        let mut topology = Topology::new();
        topology.create_node(INPUT_NODE);
        let mut bindings = Bindings::new();
        for part in &self.elements {
            topology.add_edge(&part.start, &part.end, Impedance::symbol(part.name.clone()));
            bindings.insert(part.name.clone(), part.element.clone());
        }
        topology.mark_input(INPUT_NODE)?;
        Ok((topology, bindings, self.output.clone()))
    }

    pub fn print_summary(&self) {
        println!(
            "\n{} (order {}, fc = {:.4e} Hz, R0 = {} Ω)",
            "Low-pass ladder".bold(),
            self.order(),
            self.cutoff_hz,
            self.impedance
        );
        println!("  {:<6} {:<6} {:<6} {:>10} {:>14}", "name", "from", "to", "g", "value");
        for part in &self.elements {
            println!(
                "  {:<6} {:<6} {:<6} {:>10.5} {:>14.6e}",
                part.name,
                part.start,
                part.end,
                part.normalized,
                part.value().unwrap_or(f64::NAN)
            );
        }
    }
}

/// Normalized `(source, load)` for the prototype's g-values laid out from
/// `start`, with the source at unit resistance.
///
/// The prototype's resistance ratio only holds when the load faces a
/// series inductor; a ladder ending in a shunt capacitor needs the
/// reciprocal ratio.
fn terminations(spec: &NormalizedFilterSpec, start: LadderStart) -> (f64, f64) {
    let ratio = spec.source_resistance / spec.load_resistance;
    let last_is_shunt = (spec.order % 2 == 1) == (start == LadderStart::ShuntFirst);
    if last_is_shunt {
        (1.0, 1.0 / ratio)
    } else {
        (1.0, ratio)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::response::{sweep, to_db, to_db_terminated};
    use crate::transfer::SymbolicTransfer;
    use approx::assert_abs_diff_eq;

    /// Butterworth n=3 at 1 MHz, 50 Ω
    fn unit_ladder(start: LadderStart) -> LowPassLadder {
        LowPassLadder::design(&[1.0, 2.0, 1.0], (1.0, 1.0), 1.0e6, 50.0, start).unwrap()
    }

    fn db_at(ladder: &LowPassLadder, freqs: &[f64]) -> Vec<f64> {
        let (topology, bindings, output) = ladder.to_network().unwrap();
        let h = SymbolicTransfer::from_topology(&topology, &output, &bindings).unwrap();
        to_db(&sweep(&h, freqs).unwrap())
    }

    #[test]
    fn test_shunt_first_layout() {
        let ladder = unit_ladder(LadderStart::ShuntFirst);
        let names: Vec<&str> = ladder.elements.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["rs", "c1", "l2", "c3", "rl"]);
        assert_eq!(ladder.output, "v2");
        assert_eq!(ladder.order(), 3);
        assert_eq!(ladder.elements[1].end, GROUND);
        assert_eq!(ladder.elements[2].start, "v1");
        assert_eq!(ladder.elements[2].end, "v2");
    }

    #[test]
    fn test_series_first_layout() {
        let ladder = unit_ladder(LadderStart::SeriesFirst);
        let names: Vec<&str> = ladder.elements.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["rs", "l1", "c2", "l3", "rl"]);
        assert_eq!(ladder.output, "v3");
    }

    #[test]
    fn test_denormalized_values() {
        let fc = 1.0e6;
        let ladder = unit_ladder(LadderStart::ShuntFirst);
        let w = 2.0 * std::f64::consts::PI * fc;
        assert_abs_diff_eq!(ladder.elements[1].value().unwrap(), 1.0 / (50.0 * w), epsilon = 1e-18);
        assert_abs_diff_eq!(ladder.elements[2].value().unwrap(), 2.0 * 50.0 / w, epsilon = 1e-15);
        assert_eq!(ladder.elements[0].value(), Some(50.0));
        assert_eq!(ladder.elements[4].value(), Some(50.0));

        let composite = LadderElement {
            name: "x1".to_string(),
            start: "v1".to_string(),
            end: GROUND.to_string(),
            element: Element::crystal(0.098, 0.010339e-12, 10.0, None),
            normalized: 1.0,
        };
        assert_eq!(composite.value(), None);
    }

    #[test]
    fn test_butterworth_is_3db_down_at_cutoff() {
        let spec = NormalizedFilterSpec::butterworth(3).unwrap();
        for start in [LadderStart::ShuntFirst, LadderStart::SeriesFirst] {
            let ladder = LowPassLadder::from_spec(&spec, 1.0e6, 50.0, start).unwrap();
            let db = db_at(&ladder, &[1.0e3, 1.0e6, 1.0e7]);
            assert_abs_diff_eq!(db[0], 0.0, epsilon = 1e-6);
            assert_abs_diff_eq!(db[1], -3.0103, epsilon = 1e-3);
            assert_abs_diff_eq!(db[2], -60.0, epsilon = 0.01);
        }
    }

    #[test]
    fn test_chebyshev_is_3db_down_at_cutoff() {
        let spec = NormalizedFilterSpec::chebyshev(3, 0.1).unwrap();
        let ladder = LowPassLadder::from_spec(&spec, 1.0e6, 50.0, LadderStart::ShuntFirst).unwrap();
        let db = db_at(&ladder, &[1.0e3, 1.0e6]);
        assert_abs_diff_eq!(db[0], 0.0, epsilon = 1e-4);
        assert_abs_diff_eq!(db[1], -3.0103, epsilon = 1e-3);

        // ripple band ends at fc / w
        let edge = 1.0e6 / spec.w;
        let passband: Vec<f64> = (1..50).map(|i| edge * i as f64 / 50.0).collect();
        for value in db_at(&ladder, &passband) {
            assert!(value > -0.1 - 1e-3, "ripple exceeded: {}", value);
            assert!(value < 1e-9);
        }
    }

    #[test]
    fn test_even_order_chebyshev_holds_ripple() {
        let ripple = 0.5;
        let spec = NormalizedFilterSpec::chebyshev(4, ripple).unwrap();
        let fc = 1.0e6;
        let edge = fc / spec.w;
        let passband: Vec<f64> = (1..200).map(|i| edge * i as f64 / 200.0).collect();

        for start in [LadderStart::ShuntFirst, LadderStart::SeriesFirst] {
            let ladder = LowPassLadder::from_spec(&spec, fc, 50.0, start).unwrap();
            assert_eq!(ladder.source_resistance(), 50.0);
            assert!(ladder.load_resistance() != 50.0);

            let (topology, bindings, output) = ladder.to_network().unwrap();
            let h = SymbolicTransfer::from_topology(&topology, &output, &bindings).unwrap();
            let response = sweep(&h, &passband).unwrap();
            let db = to_db_terminated(&response, ladder.source_resistance(), ladder.load_resistance());
            let lowest = db.iter().cloned().fold(f64::INFINITY, f64::min);
            let highest = db.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
            assert!(lowest > -ripple - 1e-3, "{:?}: ripple exceeded: {}", start, lowest);
            assert!(highest < 1e-6, "{:?}: gain above 0 dB: {}", start, highest);
            // equiripple: the response touches both bounds
            assert!(lowest < -ripple + 1e-2);
            assert!(highest > -1e-2);
        }

        let shunt = LowPassLadder::from_spec(&spec, fc, 50.0, LadderStart::ShuntFirst).unwrap();
        let series = LowPassLadder::from_spec(&spec, fc, 50.0, LadderStart::SeriesFirst).unwrap();
        assert_abs_diff_eq!(
            shunt.load_resistance() * series.load_resistance(),
            50.0 * 50.0,
            epsilon = 1e-9
        );
    }

    #[test]
    fn test_invalid_arguments() {
        assert!(matches!(
            LowPassLadder::design(&[], (1.0, 1.0), 1.0e6, 50.0, LadderStart::ShuntFirst),
            Err(FilterError::UnsupportedOrder { .. })
        ));
        assert!(matches!(
            LowPassLadder::design(&[1.0], (1.0, 1.0), 0.0, 50.0, LadderStart::ShuntFirst),
            Err(FilterError::InvalidArgument(_))
        ));
        assert!(matches!(
            LowPassLadder::design(&[1.0], (1.0, 1.0), 1.0e6, -1.0, LadderStart::ShuntFirst),
            Err(FilterError::InvalidArgument(_))
        ));
    }
}
