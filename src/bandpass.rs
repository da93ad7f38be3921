//! Narrow-band coupled-resonator filters: LC tanks, series LC meshes and
//! series crystals, coupled by capacitors and matched to the system
//! impedance with an end capacitor.
//!
//! Every section is sized from the low-pass prototype's coupling
//! coefficients `k` and end-section coefficient `q`, then retuned so the
//! capacitance the couplers and end loading add to each loop is backed out.

use colored::*;
use log::debug;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

use crate::component::{Bindings, Element};
use crate::design::NormalizedFilterSpec;
use crate::error::{FilterError, Result};
use crate::ladder::INPUT_NODE;
use crate::topology::{Impedance, Topology, GROUND};

pub const OUTPUT_NODE: &str = "vout";

/// Retuning tolerance: a mesh this close to the target needs no capacitor.
const TUNING_EPSILON: f64 = 1e-12;

/// How each resonator sits in the ladder
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Resonator {
    /// Parallel LC tanks to ground, coupled by series capacitors
    Shunt,
    /// Series LC meshes, coupled by capacitors to ground
    Series,
    /// Series quartz crystals, coupled by capacitors to ground.
    ///
    /// `motional_c` defaults to the capacitance resonating the motional
    /// inductance at the center frequency.
    Crystal {
        motional_c: Option<f64>,
        holder_c: Option<f64>,
    },
}

/// Physical requirements of a coupled-resonator bandpass
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BandpassSpec {
    pub center_hz: f64,
    pub bandwidth_hz: f64,
    /// Resonator (or motional) inductance in henries
    pub inductance: f64,
    /// Unloaded Q of the resonators; `f64::INFINITY` for lossless parts
    pub unloaded_q: f64,
    /// System impedance matched through an end capacitor. `None` terminates
    /// both ports in the end resistance itself.
    pub source_resistance: Option<f64>,
    pub resonator: Resonator,
}

/// Loaded filter Q, `fc / bw`.
pub fn filter_q(center_hz: f64, bandwidth_hz: f64) -> Result<f64> {
    if !(center_hz > 0.0 && center_hz.is_finite()) {
        return Err(FilterError::InvalidArgument(format!(
            "center frequency must be positive, got {}",
            center_hz
        )));
    }
    if !(bandwidth_hz > 0.0 && bandwidth_hz < center_hz) {
        return Err(FilterError::InvalidArgument(format!(
            "bandwidth must lie in (0, {}), got {}",
            center_hz, bandwidth_hz
        )));
    }
    Ok(center_hz / bandwidth_hz)
}

/// Denormalized end Q, `1 / (1/(q·Qf) − 1/Qu)`.
///
/// Resonator losses already load the end section, so the termination only
/// supplies the rest. Fails when `Qu` alone loads it more than `q·Qf`.
pub fn end_q(q: f64, filter_q: f64, unloaded_q: f64) -> Result<f64> {
    if !(unloaded_q > 0.0) {
        return Err(FilterError::DomainError(format!(
            "unloaded Q must be positive, got {}",
            unloaded_q
        )));
    }
    let inverse = 1.0 / (q * filter_q) - 1.0 / unloaded_q;
    if !(inverse > 0.0) {
        return Err(FilterError::DomainError(format!(
            "unloaded Q {} is too low for a loaded end Q of {}",
            unloaded_q,
            q * filter_q
        )));
    }
    Ok(1.0 / inverse)
}

/// Passband loss estimate in dB, `20·log10(q0 / (q0 − q))` with the
/// normalized resonator Q `q0 = Qu / Qf`.
pub fn insertion_loss_db(normalized_q0: f64, q: f64) -> Result<f64> {
    if !(normalized_q0 > q) {
        return Err(FilterError::DomainError(format!(
            "normalized resonator Q {} must exceed the end-section coefficient {}",
            normalized_q0, q
        )));
    }
    Ok(20.0 * (normalized_q0 / (normalized_q0 - q)).log10())
}

/// Capacitance resonating `henries` at `hz`.
pub fn resonant_capacitance(henries: f64, hz: f64) -> f64 {
    let w = 2.0 * PI * hz;
    1.0 / (w * w * henries)
}

fn resonant_frequency(henries: f64, farads: f64) -> f64 {
    1.0 / (2.0 * PI * (henries * farads).sqrt())
}

/// Synthesized coupled-resonator bandpass
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoupledResonatorFilter {
    pub resonator: Resonator,
    pub order: usize,
    pub center_hz: f64,
    pub bandwidth_hz: f64,
    /// Prototype end-section coefficient
    pub q: f64,
    pub filter_q: f64,
    pub end_q: f64,
    pub inductance: f64,
    pub unloaded_q: f64,
    /// Capacitance resonating `inductance` at the center frequency, or the
    /// crystal's motional capacitance
    pub resonant_c: f64,
    /// Parallel (`Rpe`, tanks) or series (`Rse`, meshes) end resistance
    pub end_resistance: f64,
    /// Resistance seen at both ports
    pub termination: f64,
    pub end_capacitor: Option<f64>,
    /// `C12, C23, ...`
    pub coupling_capacitors: Vec<f64>,
    /// Retuned capacitor of each resonator. For crystals this is the extra
    /// series capacitor; `None` when the mesh is already on frequency.
    pub tuning_capacitors: Vec<Option<f64>>,
    /// Frequency every loop is tuned to
    pub mesh_hz: f64,
}

impl CoupledResonatorFilter {
    pub fn design(prototype: &NormalizedFilterSpec, spec: &BandpassSpec) -> Result<Self> {
        let order = prototype.order;
        if order < 2 {
            return Err(FilterError::UnsupportedOrder {
                order,
                reason: "a coupled-resonator filter needs at least two resonators".to_string(),
            });
        }
        if !(spec.inductance > 0.0 && spec.inductance.is_finite()) {
            return Err(FilterError::InvalidArgument(format!(
                "resonator inductance must be positive, got {}",
                spec.inductance
            )));
        }
        if let Some(rs) = spec.source_resistance {
            if !(rs > 0.0 && rs.is_finite()) {
                return Err(FilterError::InvalidArgument(format!(
                    "source resistance must be positive, got {}",
                    rs
                )));
            }
        }

        let q = prototype.end_section()?;
        let qf = filter_q(spec.center_hz, spec.bandwidth_hz)?;
        let qe = end_q(q, qf, spec.unloaded_q)?;
        let wc = 2.0 * PI * spec.center_hz;
        let l = spec.inductance;
        debug!(
            "{:?} bandpass, n = {}: Qf = {:.4}, Qe = {:.4}",
            spec.resonator, order, qf, qe
        );

        let mut filter = CoupledResonatorFilter {
            resonator: spec.resonator,
            order,
            center_hz: spec.center_hz,
            bandwidth_hz: spec.bandwidth_hz,
            q,
            filter_q: qf,
            end_q: qe,
            inductance: l,
            unloaded_q: spec.unloaded_q,
            resonant_c: resonant_capacitance(l, spec.center_hz),
            end_resistance: 0.0,
            termination: 0.0,
            end_capacitor: None,
            coupling_capacitors: Vec::new(),
            tuning_capacitors: Vec::new(),
            mesh_hz: spec.center_hz,
        };

        match spec.resonator {
            Resonator::Shunt => filter.design_tanks(&prototype.k, spec.source_resistance, wc)?,
            Resonator::Series => filter.design_meshes(&prototype.k, spec.source_resistance, wc)?,
            Resonator::Crystal { motional_c, .. } => {
                if let Some(cm) = motional_c {
                    if !(cm > 0.0) {
                        return Err(FilterError::InvalidArgument(format!(
                            "motional capacitance must be positive, got {}",
                            cm
                        )));
                    }
                    filter.resonant_c = cm;
                }
                filter.design_crystals(&prototype.k, spec.source_resistance, wc)?
            }
        }
        Ok(filter)
    }

    /// Tanks: `Ck = C0·k/Qf`, `Rpe = Qe·ωL`, series end capacitor
    /// `Ce = 1/(ω·sqrt(Rpe·Rs − Rs²))`.
    fn design_tanks(&mut self, k: &[f64], source: Option<f64>, wc: f64) -> Result<()> {
        let c0 = self.resonant_c;
        self.coupling_capacitors = k.iter().map(|k| c0 * k / self.filter_q).collect();
        self.end_resistance = self.end_q * wc * self.inductance;

        // shunt capacitance the source and end capacitor add to the end tank
        let end_shunt = match source {
            Some(rs) => {
                if !(self.end_resistance > rs) {
                    return Err(FilterError::DomainError(format!(
                        "end resistance {:.4} must exceed the source resistance {}",
                        self.end_resistance, rs
                    )));
                }
                let ce = 1.0 / (wc * (self.end_resistance * rs - rs * rs).sqrt());
                self.end_capacitor = Some(ce);
                self.termination = rs;
                ce / ((rs * wc * ce).powi(2) + 1.0)
            }
            None => {
                self.termination = self.end_resistance;
                0.0
            }
        };

        let mut tuning = Vec::with_capacity(self.order);
        for i in 0..self.order {
            let left = if i == 0 { end_shunt } else { self.coupling_capacitors[i - 1] };
            let right = if i + 1 == self.order {
                end_shunt
            } else {
                self.coupling_capacitors[i]
            };
            let c = c0 - left - right;
            if !(c > 0.0) {
                return Err(FilterError::DomainError(format!(
                    "resonator {} has no capacitance left after coupling ({:.4e} F)",
                    i + 1,
                    c
                )));
            }
            tuning.push(Some(c));
        }
        self.tuning_capacitors = tuning;
        Ok(())
    }

    /// Elastance (1/C) the end loading adds to the first and last mesh.
    ///
    /// With a source, `Ce` sits across the port and `Rs ‖ Ce` is seen by
    /// the mesh as `Rse` in series with `Ce_series`.
    fn end_elastance(&mut self, source: Option<f64>, wc: f64) -> Result<f64> {
        self.end_resistance = wc * self.inductance / self.end_q;
        match source {
            Some(rs) => {
                let rse = self.end_resistance;
                if !(rs > rse) {
                    return Err(FilterError::DomainError(format!(
                        "source resistance {} must exceed the end resistance {:.4}",
                        rs, rse
                    )));
                }
                let ce = ((rs - rse) / (rse * wc * wc * rs * rs)).sqrt();
                self.end_capacitor = Some(ce);
                self.termination = rs;
                let ce_series = (ce * ce * wc * wc * rs * rs + 1.0) / (ce * wc * wc * rs * rs);
                Ok(1.0 / ce_series)
            }
            None => {
                self.termination = self.end_resistance;
                Ok(0.0)
            }
        }
    }

    /// Elastance of every mesh's couplers and end loading, resonator excluded.
    fn mesh_elastances(&self, end: f64) -> Vec<f64> {
        (0..self.order)
            .map(|i| {
                let left = if i == 0 { end } else { 1.0 / self.coupling_capacitors[i - 1] };
                let right = if i + 1 == self.order {
                    end
                } else {
                    1.0 / self.coupling_capacitors[i]
                };
                left + right
            })
            .collect()
    }

    /// Series meshes: `Ck = C0·Qf/k`, `Rse = ωL/Qe`, each resonator
    /// capacitor retuned so its whole loop resonates at the center.
    fn design_meshes(&mut self, k: &[f64], source: Option<f64>, wc: f64) -> Result<()> {
        let c0 = self.resonant_c;
        self.coupling_capacitors = k.iter().map(|k| c0 * self.filter_q / k).collect();
        let end = self.end_elastance(source, wc)?;

        let mut tuning = Vec::with_capacity(self.order);
        for (i, added) in self.mesh_elastances(end).into_iter().enumerate() {
            let remaining = 1.0 / c0 - added;
            if !(remaining > 0.0) {
                return Err(FilterError::DomainError(format!(
                    "mesh {} is already above the center frequency without its resonator",
                    i + 1
                )));
            }
            tuning.push(Some(1.0 / remaining));
        }
        self.tuning_capacitors = tuning;
        Ok(())
    }

    /// Crystals: `Ck = Cm·Qf/k`, `Rse = ωLm/Qe`. The motional capacitance
    /// is fixed, so every mesh is pulled up to the highest mesh frequency
    /// with an extra series capacitor.
    fn design_crystals(&mut self, k: &[f64], source: Option<f64>, wc: f64) -> Result<()> {
        let cm = self.resonant_c;
        self.coupling_capacitors = k.iter().map(|k| cm * self.filter_q / k).collect();
        let end = self.end_elastance(source, wc)?;

        let meshes: Vec<f64> = self
            .mesh_elastances(end)
            .into_iter()
            .map(|added| added + 1.0 / cm)
            .collect();
        let target = meshes.iter().cloned().fold(0.0, f64::max);
        self.tuning_capacitors = meshes
            .iter()
            .map(|&mesh| {
                let missing = target - mesh;
                if missing <= target * TUNING_EPSILON {
                    None
                } else {
                    Some(1.0 / missing)
                }
            })
            .collect();
        self.mesh_hz = resonant_frequency(self.inductance, 1.0 / target);
        debug!(
            "crystal meshes tuned to {:.3} Hz ({:+.3} Hz from center)",
            self.mesh_hz,
            self.mesh_hz - self.center_hz
        );
        Ok(())
    }

    /// Equivalent series resistance of one crystal at the center frequency.
    pub fn crystal_esr(&self) -> f64 {
        2.0 * PI * self.center_hz * self.inductance / self.unloaded_q
    }

    /// Resonator Q normalized to the filter Q, `Qu / Qf`.
    pub fn normalized_q0(&self) -> f64 {
        self.unloaded_q / self.filter_q
    }

    fn resonator_element(&self, index: usize) -> Element {
        let tuning = self.tuning_capacitors[index];
        match self.resonator {
            Resonator::Shunt => Element::LossyInductor {
                henries: self.inductance,
                q: self.unloaded_q,
            },
            Resonator::Series => Element::Series(vec![
                Element::LossyInductor {
                    henries: self.inductance,
                    q: self.unloaded_q,
                },
                Element::Capacitor(tuning.unwrap_or(f64::INFINITY)),
            ]),
            Resonator::Crystal { holder_c, .. } => {
                let crystal =
                    Element::crystal(self.inductance, self.resonant_c, self.crystal_esr(), holder_c);
                match tuning {
                    Some(c) => Element::Series(vec![crystal, Element::Capacitor(c)]),
                    None => crystal,
                }
            }
        }
    }

    /// Symbolic network plus the element behind every symbol.
    ///
    /// Returns the topology, its bindings and the output node name. Both
    /// ports are terminated in `termination`.
    pub fn to_network(&self) -> Result<(Topology, Bindings, String)> {
        let mut topology = Topology::new();
        let mut bindings = Bindings::new();
        let mut add = |name: String, a: &str, b: &str, element: Element| {
            topology.add_edge(a, b, Impedance::symbol(name.clone()));
            bindings.insert(name, element);
        };
        let n = self.order;
        let rs = Element::Resistor(self.termination);

        let output = match self.resonator {
            Resonator::Shunt => {
                let tank = |i: usize| format!("v{}", i);
                match self.end_capacitor {
                    Some(ce) => {
                        add("rs".into(), INPUT_NODE, "va", rs.clone());
                        add("ce1".into(), "va", &tank(1), Element::Capacitor(ce));
                    }
                    None => add("rs".into(), INPUT_NODE, &tank(1), rs.clone()),
                }
                for i in 1..=n {
                    add(format!("l{}", i), &tank(i), GROUND, self.resonator_element(i - 1));
                    let c = self.tuning_capacitors[i - 1].unwrap_or(0.0);
                    add(format!("c{}", i), &tank(i), GROUND, Element::Capacitor(c));
                    if i < n {
                        let ck = Element::Capacitor(self.coupling_capacitors[i - 1]);
                        add(format!("ck{}{}", i, i + 1), &tank(i), &tank(i + 1), ck);
                    }
                }
                let output = match self.end_capacitor {
                    Some(ce) => {
                        add("ce2".into(), &tank(n), OUTPUT_NODE, Element::Capacitor(ce));
                        OUTPUT_NODE.to_string()
                    }
                    None => tank(n),
                };
                add("rl".into(), &output, GROUND, rs);
                output
            }
            Resonator::Series | Resonator::Crystal { .. } => {
                let node = |i: usize| match i {
                    0 => "vs".to_string(),
                    i if i == n => OUTPUT_NODE.to_string(),
                    i => format!("v{}", i),
                };
                add("rs".into(), INPUT_NODE, &node(0), rs.clone());
                if let Some(ce) = self.end_capacitor {
                    add("ce1".into(), &node(0), GROUND, Element::Capacitor(ce));
                }
                for i in 1..=n {
                    add(format!("x{}", i), &node(i - 1), &node(i), self.resonator_element(i - 1));
                    if i < n {
                        let ck = Element::Capacitor(self.coupling_capacitors[i - 1]);
                        add(format!("ck{}{}", i, i + 1), &node(i), GROUND, ck);
                    }
                }
                if let Some(ce) = self.end_capacitor {
                    add("ce2".into(), OUTPUT_NODE, GROUND, Element::Capacitor(ce));
                }
                add("rl".into(), OUTPUT_NODE, GROUND, rs);
                OUTPUT_NODE.to_string()
            }
        };

        topology.mark_input(INPUT_NODE)?;
        Ok((topology, bindings, output))
    }

    pub fn print_summary(&self) {
        let kind = match self.resonator {
            Resonator::Shunt => "LC tank",
            Resonator::Series => "series LC",
            Resonator::Crystal { .. } => "crystal",
        };
        println!(
            "\n{} ({} resonators, fc = {:.6e} Hz, bw = {:.4e} Hz)",
            format!("Coupled {} bandpass", kind).bold(),
            self.order,
            self.center_hz,
            self.bandwidth_hz
        );
        println!("  Qf            {:>14.6}", self.filter_q);
        println!("  Qe            {:>14.6}", self.end_q);
        println!("  L             {:>14.6e}", self.inductance);
        println!("  C0 / Cm       {:>14.6e}", self.resonant_c);
        println!("  End R         {:>14.6}", self.end_resistance);
        println!("  Termination   {:>14.6}", self.termination);
        if let Some(ce) = self.end_capacitor {
            println!("  Ce            {:>14.6e}", ce);
        }
        for (i, ck) in self.coupling_capacitors.iter().enumerate() {
            println!("  C{}{:<11} {:>14.6e}", i + 1, i + 2, ck);
        }
        for (i, c) in self.tuning_capacitors.iter().enumerate() {
            match c {
                Some(c) => println!("  Tune {:<8} {:>14.6e}", i + 1, c),
                None => println!("  Tune {:<8} {:>14}", i + 1, "none"),
            }
        }
        if let Resonator::Crystal { .. } = self.resonator {
            println!("  Mesh f        {:>14.6}", self.mesh_hz);
        }
        if let Ok(il) = insertion_loss_db(self.normalized_q0(), self.q) {
            println!("  Est. loss dB  {:>14.4}", il);
        }
    }
}
