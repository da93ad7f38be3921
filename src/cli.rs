use anyhow::{anyhow, Result};
use clap::{Arg, ArgAction, ArgMatches, Command};

use crate::bandpass::Resonator;
use crate::design::FilterFamily;
use crate::ladder::LadderStart;
use crate::parser::parse_value_with_unit;
use crate::simulator::SolveMode;

#[derive(Debug, Clone)]
pub struct CliArgs {
    pub command: CliCommand,
    pub verbose_level: u8,
}

#[derive(Debug, Clone)]
pub enum CliCommand {
    Design(DesignArgs),
    Bandpass(BandpassArgs),
    Simulate(SimulateArgs),
}

/// `design`: prototype tables and the synthesized ladder
#[derive(Debug, Clone)]
pub struct DesignArgs {
    pub family: FilterFamily,
    pub order: usize,
    pub cutoff_hz: f64,
    pub r0: f64,
    pub start: LadderStart,
    pub sweep: bool,
    pub output_file: Option<String>,
    pub output_format: OutputFormat,
}

/// `bandpass`: coupled-resonator synthesis
#[derive(Debug, Clone)]
pub struct BandpassArgs {
    pub family: FilterFamily,
    pub order: usize,
    pub center_hz: f64,
    pub bandwidth_hz: f64,
    pub inductance: f64,
    pub unloaded_q: f64,
    pub source_resistance: Option<f64>,
    pub resonator: Resonator,
    pub sweep: bool,
    pub output_file: Option<String>,
    pub output_format: OutputFormat,
}

/// `simulate`: sweep a netlist
#[derive(Debug, Clone)]
pub struct SimulateArgs {
    pub input_file: String,
    pub output_file: Option<String>,
    pub output_format: OutputFormat,
    pub mode: SolveMode,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Csv,
    Json,
}

/// Command-line definition shared by the binary and its tests
pub fn create_cli() -> Command {
    Command::new("ladderSim")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Passive ladder filter synthesis and nodal AC analysis")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .global(true)
                .action(ArgAction::Count)
                .help("Increase verbosity level"),
        )
        .subcommand(
            Command::new("design")
                .about("Print prototype coefficients and synthesize a low-pass ladder")
                .args(prototype_args("3", "Number of reactive elements"))
                .arg(
                    Arg::new("fc")
                        .long("fc")
                        .value_name("FREQ")
                        .default_value("1MHz")
                        .help("-3 dB cutoff frequency"),
                )
                .arg(
                    Arg::new("r0")
                        .long("r0")
                        .value_name("OHMS")
                        .default_value("50")
                        .help("Reference (termination) impedance"),
                )
                .arg(
                    Arg::new("start")
                        .long("start")
                        .value_name("KIND")
                        .default_value("shunt")
                        .help("First ladder element: shunt or series"),
                )
                .arg(sweep_arg())
                .arg(output_arg())
                .arg(format_arg()),
        )
        .subcommand(
            Command::new("bandpass")
                .about("Synthesize a coupled-resonator or crystal bandpass")
                .args(prototype_args("4", "Number of resonators"))
                .arg(
                    Arg::new("resonator")
                        .long("resonator")
                        .value_name("KIND")
                        .default_value("shunt")
                        .value_parser(["shunt", "series", "crystal"])
                        .help("Resonator arrangement"),
                )
                .arg(
                    Arg::new("fc")
                        .long("fc")
                        .value_name("FREQ")
                        .required(true)
                        .help("Center frequency"),
                )
                .arg(
                    Arg::new("bw")
                        .long("bw")
                        .value_name("FREQ")
                        .required(true)
                        .help("-3 dB bandwidth"),
                )
                .arg(
                    Arg::new("inductance")
                        .short('l')
                        .long("inductance")
                        .value_name("HENRIES")
                        .required(true)
                        .help("Resonator inductance, or crystal motional inductance"),
                )
                .arg(
                    Arg::new("qu")
                        .long("qu")
                        .value_name("Q")
                        .help("Unloaded resonator Q (lossless when omitted)"),
                )
                .arg(
                    Arg::new("rs")
                        .long("rs")
                        .value_name("OHMS")
                        .help("System impedance to match with end capacitors"),
                )
                .arg(
                    Arg::new("cm")
                        .long("cm")
                        .value_name("FARADS")
                        .help("Measured crystal motional capacitance"),
                )
                .arg(
                    Arg::new("cp")
                        .long("cp")
                        .value_name("FARADS")
                        .help("Crystal holder capacitance"),
                )
                .arg(sweep_arg())
                .arg(output_arg())
                .arg(format_arg()),
        )
        .subcommand(
            Command::new("simulate")
                .about("Sweep a netlist and report its passband")
                .arg(
                    Arg::new("input")
                        .help("Input netlist file")
                        .required(true)
                        .index(1),
                )
                .arg(output_arg())
                .arg(format_arg())
                .arg(
                    Arg::new("mode")
                        .long("mode")
                        .value_name("MODE")
                        .default_value("symbolic")
                        .value_parser(["symbolic", "numeric"])
                        .help("Solve once symbolically or per frequency"),
                ),
        )
}

fn prototype_args(default_order: &'static str, order_help: &'static str) -> [Arg; 3] {
    [
        Arg::new("family")
            .long("family")
            .value_name("FAMILY")
            .default_value("butterworth")
            .help("Filter family: butterworth or chebyshev"),
        Arg::new("order")
            .short('n')
            .long("order")
            .value_name("N")
            .default_value(default_order)
            .help(order_help),
        Arg::new("ripple")
            .long("ripple")
            .value_name("DB")
            .default_value("0.1")
            .help("Chebyshev passband ripple in dB"),
    ]
}

fn sweep_arg() -> Arg {
    Arg::new("sweep")
        .long("sweep")
        .action(ArgAction::SetTrue)
        .help("Sweep the synthesized filter")
}

fn output_arg() -> Arg {
    Arg::new("output")
        .short('o')
        .long("output")
        .value_name("FILE")
        .help("Output file for simulation results")
}

fn format_arg() -> Arg {
    Arg::new("format")
        .short('f')
        .long("format")
        .value_name("FORMAT")
        .default_value("csv")
        .value_parser(["csv", "json"])
        .help("Output format")
}

impl CliArgs {
    pub fn from_matches(matches: &ArgMatches) -> Result<Self> {
        let verbose_level = matches.get_count("verbose");

        let command = match matches.subcommand() {
            Some(("design", sub)) => CliCommand::Design(DesignArgs::from_matches(sub)?),
            Some(("bandpass", sub)) => CliCommand::Bandpass(BandpassArgs::from_matches(sub)?),
            Some(("simulate", sub)) => CliCommand::Simulate(SimulateArgs::from_matches(sub)?),
            Some((other, _)) => return Err(anyhow!("Unknown command: {}", other)),
            None => return Err(anyhow!("A command is required (design, bandpass or simulate)")),
        };

        Ok(CliArgs {
            command,
            verbose_level,
        })
    }
}

/// Family and order shared by `design` and `bandpass`
fn prototype(matches: &ArgMatches) -> Result<(FilterFamily, usize)> {
    let family = match string_arg(matches, "family")?.as_str() {
        "butterworth" => FilterFamily::Butterworth,
        "chebyshev" => {
            let ripple_db: f64 = string_arg(matches, "ripple")?
                .parse()
                .map_err(|e| anyhow!("Invalid ripple: {}", e))?;
            if ripple_db <= 0.0 {
                return Err(anyhow!("Ripple must be positive"));
            }
            FilterFamily::Chebyshev { ripple_db }
        }
        other => return Err(anyhow!("Invalid filter family: {}", other)),
    };

    let order: usize = string_arg(matches, "order")?
        .parse()
        .map_err(|e| anyhow!("Invalid order: {}", e))?;
    if order == 0 {
        return Err(anyhow!("Order must be at least 1"));
    }
    Ok((family, order))
}

impl DesignArgs {
    fn from_matches(matches: &ArgMatches) -> Result<Self> {
        let (family, order) = prototype(matches)?;

        let cutoff_hz = parse_frequency_value(&string_arg(matches, "fc")?)?;
        let r0 = parse_value_with_unit(&string_arg(matches, "r0")?)?;
        if r0 <= 0.0 {
            return Err(anyhow!("Reference impedance must be positive"));
        }

        let start = match string_arg(matches, "start")?.as_str() {
            "shunt" => LadderStart::ShuntFirst,
            "series" => LadderStart::SeriesFirst,
            other => return Err(anyhow!("Invalid ladder start: {}", other)),
        };

        Ok(DesignArgs {
            family,
            order,
            cutoff_hz,
            r0,
            start,
            sweep: matches.get_flag("sweep"),
            output_file: matches.get_one::<String>("output").cloned(),
            output_format: output_format(matches)?,
        })
    }
}

impl BandpassArgs {
    fn from_matches(matches: &ArgMatches) -> Result<Self> {
        let (family, order) = prototype(matches)?;
        if order < 2 {
            return Err(anyhow!("A bandpass needs at least two resonators"));
        }

        let center_hz = parse_frequency_value(&string_arg(matches, "fc")?)?;
        let bandwidth_hz = parse_frequency_value(&string_arg(matches, "bw")?)?;
        let inductance = parse_value_with_unit(&string_arg(matches, "inductance")?)?;
        let optional = |id: &str| -> Result<Option<f64>> {
            matches
                .get_one::<String>(id)
                .map(|value| parse_value_with_unit(value))
                .transpose()
        };
        let unloaded_q = optional("qu")?.unwrap_or(f64::INFINITY);

        let resonator = match string_arg(matches, "resonator")?.as_str() {
            "shunt" => Resonator::Shunt,
            "series" => Resonator::Series,
            "crystal" => Resonator::Crystal {
                motional_c: optional("cm")?,
                holder_c: optional("cp")?,
            },
            other => return Err(anyhow!("Invalid resonator: {}", other)),
        };

        Ok(BandpassArgs {
            family,
            order,
            center_hz,
            bandwidth_hz,
            inductance,
            unloaded_q,
            source_resistance: optional("rs")?,
            resonator,
            sweep: matches.get_flag("sweep"),
            output_file: matches.get_one::<String>("output").cloned(),
            output_format: output_format(matches)?,
        })
    }
}

impl SimulateArgs {
    fn from_matches(matches: &ArgMatches) -> Result<Self> {
        let input_file = matches
            .get_one::<String>("input")
            .ok_or_else(|| anyhow!("Input file is required"))?
            .clone();

        let mode = match string_arg(matches, "mode")?.as_str() {
            "symbolic" => SolveMode::Symbolic,
            "numeric" => SolveMode::Numeric,
            other => return Err(anyhow!("Invalid solve mode: {}", other)),
        };

        Ok(SimulateArgs {
            input_file,
            output_file: matches.get_one::<String>("output").cloned(),
            output_format: output_format(matches)?,
            mode,
        })
    }
}

fn string_arg(matches: &ArgMatches, id: &str) -> Result<String> {
    matches
        .get_one::<String>(id)
        .cloned()
        .ok_or_else(|| anyhow!("Missing argument: {}", id))
}

fn output_format(matches: &ArgMatches) -> Result<OutputFormat> {
    match string_arg(matches, "format")?.as_str() {
        "csv" => Ok(OutputFormat::Csv),
        "json" => Ok(OutputFormat::Json),
        _ => Err(anyhow!("Invalid output format")),
    }
}

/// Parse frequency with unit (e.g., "7.05MHz", "455k", "1.2G")
///
/// Unlike netlist values, `m`/`M` here always means mega.
pub fn parse_frequency_value(value: &str) -> Result<f64> {
    let value = value.trim().to_lowercase();
    let value = value.strip_suffix("hz").unwrap_or(value.as_str());

    let (num_str, multiplier) = if let Some(num_str) = value.strip_suffix("meg") {
        (num_str, 1e6)
    } else if let Some(num_str) = value.strip_suffix('g') {
        (num_str, 1e9)
    } else if let Some(num_str) = value.strip_suffix('m') {
        (num_str, 1e6)
    } else if let Some(num_str) = value.strip_suffix('k') {
        (num_str, 1e3)
    } else {
        (value, 1.0)
    };

    let frequency = num_str
        .trim()
        .parse::<f64>()
        .map_err(|e| anyhow!("Invalid frequency '{}': {}", value, e))?
        * multiplier;
    if !(frequency > 0.0 && frequency.is_finite()) {
        return Err(anyhow!("Frequency must be positive, got '{}'", value));
    }
    Ok(frequency)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_frequency_value() {
        assert_eq!(parse_frequency_value("455k").unwrap(), 455e3);
        assert_eq!(parse_frequency_value("7.05MHz").unwrap(), 7.05e6);
        assert_eq!(parse_frequency_value("10meg").unwrap(), 10e6);
        assert_eq!(parse_frequency_value("1.5G").unwrap(), 1.5e9);
        assert_eq!(parse_frequency_value("1000 Hz").unwrap(), 1000.0);
        assert_eq!(parse_frequency_value("50").unwrap(), 50.0);
        assert!(parse_frequency_value("-5k").is_err());
        assert!(parse_frequency_value("fast").is_err());
    }

    #[test]
    fn test_design_args() {
        let matches = create_cli()
            .try_get_matches_from([
                "test", "-vv", "design", "--family", "chebyshev", "--order", "5", "--ripple",
                "0.5", "--fc", "7.1MHz", "--start", "series", "--sweep",
            ])
            .unwrap();
        let args = CliArgs::from_matches(&matches).unwrap();
        assert_eq!(args.verbose_level, 2);
        match args.command {
            CliCommand::Design(design) => {
                assert_eq!(design.family, FilterFamily::Chebyshev { ripple_db: 0.5 });
                assert_eq!(design.order, 5);
                assert_eq!(design.cutoff_hz, 7.1e6);
                assert_eq!(design.r0, 50.0);
                assert_eq!(design.start, LadderStart::SeriesFirst);
                assert!(design.sweep);
                assert_eq!(design.output_format, OutputFormat::Csv);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_simulate_args() {
        let matches = create_cli()
            .try_get_matches_from([
                "test", "simulate", "filter.cir", "-o", "out.json", "-f", "json", "--mode",
                "numeric",
            ])
            .unwrap();
        let args = CliArgs::from_matches(&matches).unwrap();
        match args.command {
            CliCommand::Simulate(simulate) => {
                assert_eq!(simulate.input_file, "filter.cir");
                assert_eq!(simulate.output_file.as_deref(), Some("out.json"));
                assert_eq!(simulate.output_format, OutputFormat::Json);
                assert_eq!(simulate.mode, SolveMode::Numeric);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_bandpass_args() {
        let matches = create_cli()
            .try_get_matches_from([
                "test", "bandpass", "--resonator", "crystal", "--fc", "5MHz", "--bw", "1k",
                "-l", "100m", "--qu", "100k", "--rs", "1k", "--cp", "4p",
            ])
            .unwrap();
        let args = CliArgs::from_matches(&matches).unwrap();
        match args.command {
            CliCommand::Bandpass(bandpass) => {
                assert_eq!(bandpass.family, FilterFamily::Butterworth);
                assert_eq!(bandpass.order, 4);
                assert_eq!(bandpass.center_hz, 5.0e6);
                assert_eq!(bandpass.bandwidth_hz, 1.0e3);
                assert!((bandpass.inductance - 0.1).abs() < 1e-15);
                assert_eq!(bandpass.unloaded_q, 1.0e5);
                assert_eq!(bandpass.source_resistance, Some(1000.0));
                match bandpass.resonator {
                    Resonator::Crystal { motional_c, holder_c } => {
                        assert_eq!(motional_c, None);
                        assert!((holder_c.unwrap() - 4.0e-12).abs() < 1e-24);
                    }
                    other => panic!("unexpected resonator {:?}", other),
                }
            }
            other => panic!("unexpected command {:?}", other),
        }

        let lossless = create_cli()
            .try_get_matches_from(["test", "bandpass", "--fc", "5M", "--bw", "200k", "-l", "6u"])
            .unwrap();
        match CliArgs::from_matches(&lossless).unwrap().command {
            CliCommand::Bandpass(bandpass) => {
                assert_eq!(bandpass.unloaded_q, f64::INFINITY);
                assert_eq!(bandpass.source_resistance, None);
                assert_eq!(bandpass.resonator, Resonator::Shunt);
            }
            other => panic!("unexpected command {:?}", other),
        }

        let single = create_cli()
            .try_get_matches_from(["test", "bandpass", "-n", "1", "--fc", "5M", "--bw", "1k", "-l", "1u"])
            .unwrap();
        assert!(CliArgs::from_matches(&single).is_err());
        assert!(create_cli()
            .try_get_matches_from(["test", "bandpass", "--fc", "5M"])
            .is_err());
    }

    #[test]
    fn test_invalid_design_args() {
        for argv in [
            vec!["test", "design", "--order", "0"],
            vec!["test", "design", "--family", "elliptic"],
            vec!["test", "design", "--family", "chebyshev", "--ripple=-1"],
            vec!["test", "design", "--r0", "0"],
        ] {
            let matches = create_cli().try_get_matches_from(argv).unwrap();
            assert!(CliArgs::from_matches(&matches).is_err());
        }

        assert!(create_cli().try_get_matches_from(["test"]).is_err());
    }
}
