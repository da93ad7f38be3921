//! Frequency sweeps and passband post-processing.

use std::f64::consts::TAU;

use log::warn;
use num_complex::Complex64;
use serde::{Deserialize, Serialize};

use crate::error::{FilterError, Result};
use crate::transfer::TransferFunction;

/// Drop from the peak that delimits the passband
pub const PASSBAND_DROP_DB: f64 = 3.0;

/// Generates `n` linearly spaced samples in [start, stop].
pub fn linspace(start: f64, stop: f64, n: usize) -> Vec<f64> {
    match n {
        0 => Vec::new(),
        1 => vec![start],
        _ => {
            let step = (stop - start) / (n as f64 - 1.0);
            (0..n).map(|i| start + step * i as f64).collect()
        }
    }
}

/// Generates `n` logarithmically spaced samples in [start, stop].
pub fn logspace(start: f64, stop: f64, n: usize) -> Result<Vec<f64>> {
    if !(start > 0.0 && stop > 0.0) {
        return Err(FilterError::InvalidArgument(format!(
            "logarithmic grid needs positive bounds, got {} .. {}",
            start, stop
        )));
    }
    Ok(linspace(start.log10(), stop.log10(), n)
        .into_iter()
        .map(|exponent| 10f64.powf(exponent))
        .collect())
}

/// Evaluate `h` at every frequency in Hz (ω = 2πf).
pub fn sweep<H>(h: &H, frequencies_hz: &[f64]) -> Result<Vec<Complex64>>
where
    H: TransferFunction + ?Sized,
{
    frequencies_hz
        .iter()
        .map(|&f| h.evaluate(TAU * f))
        .collect()
}

/// Available-power gain in dB, `10·log10(4|H|²)`.
///
/// The factor 4 makes a matched, lossless network read 0 dB. A zero
/// response is `-inf`.
pub fn to_db(values: &[Complex64]) -> Vec<f64> {
    to_db_terminated(values, 1.0, 1.0)
}

/// Transducer gain in dB between a source of `source_ohms` and a load of
/// `load_ohms`: `10·log10(4·(Rs/Rl)·|H|²)`.
pub fn to_db_terminated(values: &[Complex64], source_ohms: f64, load_ohms: f64) -> Vec<f64> {
    let scale = 4.0 * source_ohms / load_ohms;
    values
        .iter()
        .map(|v| {
            let power = scale * v.norm_sqr();
            if power == 0.0 {
                f64::NEG_INFINITY
            } else {
                10.0 * power.log10()
            }
        })
        .collect()
}

pub fn phase_deg(values: &[Complex64]) -> Vec<f64> {
    values.iter().map(|v| v.arg().to_degrees()).collect()
}

/// Raw result of walking a dB trace: the peak and the two crossings,
/// as `(index, frequency)`, when they exist.
#[derive(Debug, Clone, PartialEq)]
pub struct PassbandScan {
    pub peak_db: f64,
    pub entry: Option<(usize, f64)>,
    pub exit: Option<(usize, f64)>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PassbandEdges {
    pub min_freq: f64,
    pub max_freq: f64,
    pub center: f64,
    pub bandwidth: f64,
    pub entry_index: usize,
    pub exit_index: usize,
}

/// Find the peak and the first rise above / next fall below `peak - 3 dB`.
///
/// `None` for an empty or mismatched trace, or one without a finite peak.
pub fn scan_passband(db: &[f64], frequencies: &[f64]) -> Option<PassbandScan> {
    if db.len() != frequencies.len() {
        warn!(
            "dB trace has {} samples but {} frequencies",
            db.len(),
            frequencies.len()
        );
        return None;
    }
    let peak_db = db
        .iter()
        .copied()
        .filter(|v| !v.is_nan())
        .fold(f64::NEG_INFINITY, f64::max);
    if !peak_db.is_finite() {
        return None;
    }

    let entry = db
        .iter()
        .position(|&v| v - peak_db > -PASSBAND_DROP_DB)
        .map(|i| (i, frequencies[i]));
    let exit = entry.and_then(|(start, _)| {
        (start + 1..db.len())
            .find(|&i| db[i] - peak_db < -PASSBAND_DROP_DB)
            .map(|i| (i, frequencies[i]))
    });

    Some(PassbandScan {
        peak_db,
        entry,
        exit,
    })
}

/// Passband edges of a dB trace, or `None` when either crossing is missing.
pub fn find_passband_edges(db: &[f64], frequencies: &[f64]) -> Option<PassbandEdges> {
    let scan = scan_passband(db, frequencies)?;
    let ((entry_index, min_freq), (exit_index, max_freq)) = match (scan.entry, scan.exit) {
        (Some(entry), Some(exit)) => (entry, exit),
        _ => {
            warn!("response does not cross the -{} dB line on both sides", PASSBAND_DROP_DB);
            return None;
        }
    };
    Some(PassbandEdges {
        min_freq,
        max_freq,
        center: (min_freq + max_freq) / 2.0,
        bandwidth: max_freq - min_freq,
        entry_index,
        exit_index,
    })
}
