use colored::*;
use log::{error, info, warn};
use std::path::Path;

use ladder_sim::bandpass::{BandpassSpec, CoupledResonatorFilter};
use ladder_sim::cli::{create_cli, BandpassArgs, CliArgs, CliCommand, DesignArgs, SimulateArgs};
use ladder_sim::design::{FilterFamily, NormalizedFilterSpec};
use ladder_sim::ladder::LowPassLadder;
use ladder_sim::parser::{AcSweep, SweepType};
use ladder_sim::simulator::{LoadedNetwork, Simulator, SimulatorConfig};

fn main() {
    let matches = create_cli().get_matches();

    let default_level = match matches.get_count("verbose") {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .init();

    let result = CliArgs::from_matches(&matches).and_then(|args| match args.command {
        CliCommand::Design(design) => run_design(&design),
        CliCommand::Bandpass(bandpass) => run_bandpass(&bandpass),
        CliCommand::Simulate(simulate) => run_simulation(&simulate),
    });

    if let Err(e) = result {
        error!("{}", format!("Error: {:#}", e).red());
        std::process::exit(1);
    }
}

fn run_design(args: &DesignArgs) -> anyhow::Result<()> {
    info!("{}", "Starting ladderSim design".green().bold());

    let spec = NormalizedFilterSpec::new(args.family, args.order)?;
    print_prototype(&spec);

    let ladder = LowPassLadder::from_spec(&spec, args.cutoff_hz, args.r0, args.start)?;
    ladder.print_summary();

    if !args.sweep {
        return Ok(());
    }

    let (topology, bindings, output) = ladder.to_network()?;
    let mut simulator = Simulator::new();
    simulator.load_network(LoadedNetwork {
        title: format!("{:?} low-pass, n = {}", args.family, args.order),
        topology,
        bindings,
        output,
        sweep: Some(AcSweep {
            sweep_type: SweepType::Dec,
            points: 50,
            fstart: args.cutoff_hz / 100.0,
            fstop: args.cutoff_hz * 100.0,
        }),
    });
    simulator.run_ac_sweep(None)?;
    finish(&simulator, args.output_file.as_deref(), args.output_format)
}

fn run_bandpass(args: &BandpassArgs) -> anyhow::Result<()> {
    info!("{}", "Starting ladderSim bandpass design".green().bold());

    let spec = NormalizedFilterSpec::new(args.family, args.order)?;
    print_prototype(&spec);

    let filter = CoupledResonatorFilter::design(
        &spec,
        &BandpassSpec {
            center_hz: args.center_hz,
            bandwidth_hz: args.bandwidth_hz,
            inductance: args.inductance,
            unloaded_q: args.unloaded_q,
            source_resistance: args.source_resistance,
            resonator: args.resonator,
        },
    )?;
    filter.print_summary();

    if !args.sweep {
        return Ok(());
    }

    let (topology, bindings, output) = filter.to_network()?;
    let mut simulator = Simulator::new();
    simulator.load_network(LoadedNetwork {
        title: format!("{:?} bandpass, n = {}", args.resonator, args.order),
        topology,
        bindings,
        output,
        sweep: Some(AcSweep {
            sweep_type: SweepType::Lin,
            points: 401,
            fstart: filter.mesh_hz - 2.0 * args.bandwidth_hz,
            fstop: filter.mesh_hz + 2.0 * args.bandwidth_hz,
        }),
    });
    simulator.run_ac_sweep(None)?;
    finish(&simulator, args.output_file.as_deref(), args.output_format)
}

fn run_simulation(args: &SimulateArgs) -> anyhow::Result<()> {
    info!("{}", "Starting ladderSim simulation".green().bold());
    info!("Input file: {}", args.input_file.bright_blue());

    // Validate input file exists
    if !Path::new(&args.input_file).exists() {
        return Err(anyhow::anyhow!("Input file '{}' not found", args.input_file));
    }

    let mut simulator = Simulator::with_config(SimulatorConfig {
        mode: args.mode,
        ..SimulatorConfig::default()
    });
    simulator.load_netlist(&args.input_file)?;
    simulator.run_ac_sweep(None)?;
    finish(&simulator, args.output_file.as_deref(), args.output_format)
}

fn finish(
    simulator: &Simulator,
    output_file: Option<&str>,
    format: ladder_sim::cli::OutputFormat,
) -> anyhow::Result<()> {
    simulator.print_summary();
    if let Some(output_file) = output_file {
        simulator.export_results(output_file, format)?;
        println!("Results exported to: {}", output_file.bright_green());
    }
    info!("{}", "Simulation completed successfully!".green().bold());
    Ok(())
}

fn print_prototype(spec: &NormalizedFilterSpec) {
    let family = match spec.family {
        FilterFamily::Butterworth => "Butterworth".to_string(),
        FilterFamily::Chebyshev { ripple_db } => format!("Chebyshev {} dB", ripple_db),
    };
    println!("\n{} {} (n = {})", "Prototype:".bold(), family, spec.order);

    for (i, g) in spec.g.iter().enumerate() {
        println!("  g{:<3} {:>10.6}", i + 1, g);
    }
    for (i, k) in spec.k.iter().enumerate() {
        println!("  k{}{:<2} {:>10.6}", i + 1, i + 2, k);
    }
    match spec.q {
        Some(q) => println!("  q    {:>10.6}", q),
        None => warn!("No end-section coefficient for an even-order Chebyshev prototype"),
    }
    println!("  w    {:>10.6}", spec.w);
    println!(
        "  Rs   {:>10.6}\n  Rl   {:>10.6}",
        spec.source_resistance, spec.load_resistance
    );
}
