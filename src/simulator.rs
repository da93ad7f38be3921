use std::collections::HashSet;
use std::time::Instant;

use anyhow::{anyhow, Result};
use colored::*;
use log::{debug, info, warn};
use num_complex::Complex64;
use serde::{Deserialize, Serialize};

use crate::cli::OutputFormat;
use crate::component::Bindings;
use crate::parser::{AcSweep, Netlist, NetlistParser, SweepType};
use crate::response::{find_passband_edges, phase_deg, sweep, to_db, PassbandEdges};
use crate::solver::{LinearSolver, SolverConfig};
use crate::topology::{Impedance, Topology};
use crate::transfer::{NumericTransfer, SymbolicTransfer};

/// How the network is solved across a sweep
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SolveMode {
    /// Eliminate once with symbolic impedances, then evaluate per frequency
    Symbolic,
    /// Assemble and solve the concrete system at every frequency
    Numeric,
}

/// Simulation results container
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationResult {
    pub title: String,
    pub output: String,
    pub mode: SolveMode,
    pub frequencies: Vec<f64>,
    pub response: Vec<Complex64>,
    pub magnitude_db: Vec<f64>,
    pub phase_deg: Vec<f64>,
    pub passband: Option<PassbandEdges>,
    pub total_time: f64,
}

impl SimulationResult {
    /// Index and value of the highest dB sample
    pub fn peak(&self) -> Option<(usize, f64)> {
        self.magnitude_db
            .iter()
            .copied()
            .enumerate()
            .filter(|(_, db)| !db.is_nan())
            .fold(None, |best, (i, db)| match best {
                Some((_, best_db)) if best_db >= db => best,
                _ => Some((i, db)),
            })
    }
}

#[derive(Debug, Clone)]
pub struct SimulatorConfig {
    pub solver_config: SolverConfig,
    pub mode: SolveMode,
    /// Used when neither the caller nor the netlist names a sweep
    pub default_sweep: AcSweep,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        SimulatorConfig {
            solver_config: SolverConfig::default(),
            mode: SolveMode::Symbolic,
            default_sweep: AcSweep {
                sweep_type: SweepType::Dec,
                points: 50,
                fstart: 1.0e3,
                fstop: 1.0e9,
            },
        }
    }
}

/// A network ready to sweep
#[derive(Debug, Clone)]
pub struct LoadedNetwork {
    pub title: String,
    pub topology: Topology,
    pub bindings: Bindings,
    pub output: String,
    pub sweep: Option<AcSweep>,
}

/// Main simulator engine
pub struct Simulator {
    network: Option<LoadedNetwork>,
    solver: LinearSolver,
    results: Option<SimulationResult>,
    config: SimulatorConfig,
}

impl Simulator {
    /// Create a new simulator with default configuration
    pub fn new() -> Self {
        Self::with_config(SimulatorConfig::default())
    }

    /// Create a new simulator with custom configuration
    pub fn with_config(config: SimulatorConfig) -> Self {
        let solver = LinearSolver::with_config(config.solver_config.clone());
        Simulator {
            network: None,
            solver,
            results: None,
            config,
        }
    }

    pub fn config(&self) -> &SimulatorConfig {
        &self.config
    }

    /// Load a netlist from file
    pub fn load_netlist(&mut self, filename: &str) -> Result<()> {
        info!("Loading netlist from: {}", filename);

        let parser = NetlistParser::new();
        let netlist = parser.parse_file(filename)?;

        self.load_netlist_from_parsed(netlist)
    }

    /// Build the topology and bindings of a parsed netlist
    pub fn load_netlist_from_parsed(&mut self, netlist: Netlist) -> Result<()> {
        if netlist.elements.is_empty() {
            return Err(anyhow!("Netlist '{}' has no elements", netlist.title));
        }

        let mut topology = Topology::new();
        let mut bindings = Bindings::new();
        let mut seen = HashSet::new();

        for element in &netlist.elements {
            if !seen.insert(element.name.clone()) {
                return Err(anyhow!("Duplicate element name: {}", element.name));
            }
            topology.add_edge(
                &element.nodes.0,
                &element.nodes.1,
                Impedance::symbol(element.name.clone()),
            );
            bindings.insert(element.name.clone(), element.to_element());
        }

        let inputs = if netlist.inputs.is_empty() {
            if topology.ordinal("vin").is_none() {
                return Err(anyhow!("No .input directive and no node named 'vin'"));
            }
            info!("No .input directive, driving node 'vin'");
            vec!["vin".to_string()]
        } else {
            netlist.inputs.clone()
        };
        for input in &inputs {
            topology.mark_input(input)?;
        }

        let output = match netlist.output {
            Some(output) => output,
            None if topology.ordinal("vout").is_some() => "vout".to_string(),
            None => return Err(anyhow!("No .output directive and no node named 'vout'")),
        };
        if topology.ordinal(&output).is_none() {
            return Err(anyhow!("Output node '{}' is not connected to anything", output));
        }

        if netlist.analyses.len() > 1 {
            warn!("Netlist has {} .ac lines, using the last one", netlist.analyses.len());
        }

        info!("Loaded circuit: {}", netlist.title);
        topology.print_summary();

        self.load_network(LoadedNetwork {
            title: netlist.title,
            topology,
            bindings,
            output,
            sweep: netlist.analyses.last().cloned(),
        });
        Ok(())
    }

    /// Use an already-built network (e.g. a synthesized ladder)
    pub fn load_network(&mut self, network: LoadedNetwork) {
        self.network = Some(network);
        self.results = None;
    }

    pub fn network(&self) -> Option<&LoadedNetwork> {
        self.network.as_ref()
    }

    /// Run an AC sweep of the output potential.
    ///
    /// The grid is `sweep_override` if given, else the netlist's `.ac` line, else the
    /// configured default.
    pub fn run_ac_sweep(&mut self, sweep_override: Option<&AcSweep>) -> Result<()> {
        let start_time = Instant::now();
        let network = self
            .network
            .as_ref()
            .ok_or_else(|| anyhow!("No circuit loaded"))?;

        let grid = sweep_override
            .or(network.sweep.as_ref())
            .unwrap_or(&self.config.default_sweep);
        let frequencies = grid.frequencies()?;
        info!(
            "Starting AC sweep: {} points from {:.4e} Hz to {:.4e} Hz ({:?} mode)",
            frequencies.len(),
            grid.fstart,
            grid.fstop,
            self.config.mode
        );

        let response = match self.config.mode {
            SolveMode::Symbolic => {
                let h = SymbolicTransfer::with_solver(
                    &network.topology,
                    &network.output,
                    &network.bindings,
                    self.solver.clone(),
                )?;
                debug!("compiled transfer function into {} tape entries", h.tape().len());
                sweep(&h, &frequencies)?
            }
            SolveMode::Numeric => {
                let h = NumericTransfer::new(&network.topology, &network.output, &network.bindings)?
                    .with_solver(LinearSolver::with_config(self.config.solver_config.clone()));
                sweep(&h, &frequencies)?
            }
        };

        let magnitude_db = to_db(&response);
        let passband = find_passband_edges(&magnitude_db, &frequencies);
        if passband.is_none() {
            warn!("No complete -3 dB passband inside the sweep");
        }

        self.results = Some(SimulationResult {
            title: network.title.clone(),
            output: network.output.clone(),
            mode: self.config.mode,
            phase_deg: phase_deg(&response),
            frequencies,
            response,
            magnitude_db,
            passband,
            total_time: start_time.elapsed().as_secs_f64(),
        });

        info!(
            "AC sweep completed in {:.3}ms",
            start_time.elapsed().as_secs_f64() * 1000.0
        );
        Ok(())
    }

    /// Get simulation results
    pub fn get_results(&self) -> Option<&SimulationResult> {
        self.results.as_ref()
    }

    /// Export simulation results to file
    pub fn export_results(&self, filename: &str, format: OutputFormat) -> Result<()> {
        let results = self
            .results
            .as_ref()
            .ok_or_else(|| anyhow!("No simulation results available"))?;

        match format {
            OutputFormat::Csv => self.export_csv(results, filename),
            OutputFormat::Json => self.export_json(results, filename),
        }
    }

    /// Export results to CSV format
    fn export_csv(&self, results: &SimulationResult, filename: &str) -> Result<()> {
        use csv::Writer;
        use std::fs::File;

        let file = File::create(filename)?;
        let mut writer = Writer::from_writer(file);

        writer.write_record([
            "frequency".to_string(),
            format!("re(V({}))", results.output),
            format!("im(V({}))", results.output),
            "magnitude_db".to_string(),
            "phase_deg".to_string(),
        ])?;

        for (i, &frequency) in results.frequencies.iter().enumerate() {
            let value = results.response[i];
            writer.write_record([
                frequency.to_string(),
                value.re.to_string(),
                value.im.to_string(),
                results.magnitude_db[i].to_string(),
                results.phase_deg[i].to_string(),
            ])?;
        }

        writer.flush()?;
        info!("Results exported to CSV: {}", filename);
        Ok(())
    }

    /// Export results to JSON format
    fn export_json(&self, results: &SimulationResult, filename: &str) -> Result<()> {
        use std::fs::File;

        let file = File::create(filename)?;
        serde_json::to_writer_pretty(file, results)?;

        info!("Results exported to JSON: {}", filename);
        Ok(())
    }

    /// Print simulation summary
    pub fn print_summary(&self) {
        let Some(results) = &self.results else {
            println!("No simulation results available");
            return;
        };

        println!("\n{}", "=== AC Sweep Summary ===".bold());
        println!("Circuit: {}", results.title);
        println!("Output node: {}", results.output);
        println!("Solve mode: {:?}", results.mode);
        println!("Total simulation time: {:.3}ms", results.total_time * 1000.0);
        println!("Number of frequency points: {}", results.frequencies.len());

        if let Some((index, db)) = results.peak() {
            println!(
                "Peak response: {:.3} dB at {:.6e} Hz",
                db, results.frequencies[index]
            );
        }

        match &results.passband {
            Some(edges) => {
                println!("\n{}", "Passband (-3 dB):".green());
                println!("  Lower edge: {:.6e} Hz", edges.min_freq);
                println!("  Upper edge: {:.6e} Hz", edges.max_freq);
                println!("  Center:     {:.6e} Hz", edges.center);
                println!("  Bandwidth:  {:.6e} Hz", edges.bandwidth);
            }
            None => println!("\n{}", "No complete -3 dB passband in sweep".yellow()),
        }
    }
}

impl Default for Simulator {
    fn default() -> Self {
        Self::new()
    }
}
