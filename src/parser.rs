use anyhow::{anyhow, Context, Result};
use lazy_static::lazy_static;
use log::{debug, warn};
use nom::{
    branch::alt,
    bytes::complete::{tag_no_case, take_while, take_while1},
    character::complete::{one_of, space0, space1},
    combinator::{all_consuming, map, opt, recognize, value},
    sequence::{pair, preceded, terminated, tuple},
    IResult,
};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fs;

use crate::component::Element;
use crate::response::{linspace, logspace};
use crate::topology::GROUND;

lazy_static! {
    static ref VALUE_PATTERN: Regex =
        Regex::new(r"^([+-]?(?:[0-9]+\.?[0-9]*|\.[0-9]+)(?:[eE][+-]?[0-9]+)?)([a-zA-Z]*)$").unwrap();
    static ref GROUND_PATTERN: Regex = Regex::new(r"(?i)^(0|gnd|ground)$").unwrap();
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ElementKind {
    Resistor,
    Inductor,
    Capacitor,
}

/// One `R`/`L`/`C` line; inductors may carry an unloaded `q=<value>`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetlistElement {
    pub name: String,
    pub kind: ElementKind,
    pub nodes: (String, String),
    pub value: f64,
    #[serde(default)]
    pub q: Option<f64>,
}

impl NetlistElement {
    pub fn to_element(&self) -> Element {
        match self.kind {
            ElementKind::Resistor => Element::Resistor(self.value),
            ElementKind::Inductor => match self.q {
                Some(q) => Element::LossyInductor {
                    henries: self.value,
                    q,
                },
                None => Element::Inductor(self.value),
            },
            ElementKind::Capacitor => Element::Capacitor(self.value),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SweepType {
    Lin,
    /// `points` per decade
    Dec,
}

/// `.ac lin|dec <points> <fstart> <fstop>`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AcSweep {
    pub sweep_type: SweepType,
    pub points: usize,
    pub fstart: f64,
    pub fstop: f64,
}

impl AcSweep {
    pub fn frequencies(&self) -> Result<Vec<f64>> {
        if self.points == 0 {
            return Err(anyhow!("AC sweep needs at least one point"));
        }
        if !(self.fstart > 0.0 && self.fstop >= self.fstart) {
            return Err(anyhow!(
                "AC sweep needs 0 < fstart <= fstop, got {} .. {}",
                self.fstart,
                self.fstop
            ));
        }
        match self.sweep_type {
            SweepType::Lin => Ok(linspace(self.fstart, self.fstop, self.points)),
            SweepType::Dec => {
                let decades = (self.fstop / self.fstart).log10();
                let count = (decades * self.points as f64).round() as usize + 1;
                Ok(logspace(self.fstart, self.fstop, count)?)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Netlist {
    pub title: String,
    pub elements: Vec<NetlistElement>,
    pub inputs: Vec<String>,
    pub output: Option<String>,
    pub analyses: Vec<AcSweep>,
}

#[derive(Debug, Clone, PartialEq)]
enum Directive {
    Input(String),
    Output(String),
    Ac(AcSweep),
    End,
}

pub struct NetlistParser;

impl Default for NetlistParser {
    fn default() -> Self {
        Self::new()
    }
}

impl NetlistParser {
    pub fn new() -> Self {
        NetlistParser
    }

    pub fn parse_file(&self, filename: &str) -> Result<Netlist> {
        let content = fs::read_to_string(filename)
            .with_context(|| format!("Failed to read file '{}'", filename))?;
        self.parse_netlist(&content)
    }

    pub fn parse_netlist(&self, content: &str) -> Result<Netlist> {
        let mut netlist = Netlist::default();
        let mut has_title = false;

        for (line_number, line) in self.preprocess_lines(content) {
            if !has_title && !line.starts_with('.') {
                netlist.title = line;
                has_title = true;
                continue;
            }
            has_title = true;

            if line.starts_with('.') {
                match parse_directive(&line)
                    .with_context(|| format!("line {}: '{}'", line_number, line))?
                {
                    Some(Directive::Input(node)) => netlist.inputs.push(node),
                    Some(Directive::Output(node)) => netlist.output = Some(node),
                    Some(Directive::Ac(sweep)) => netlist.analyses.push(sweep),
                    Some(Directive::End) => break,
                    None => warn!("line {}: ignoring unsupported directive '{}'", line_number, line),
                }
                continue;
            }

            let element = parse_element_line(&line)
                .with_context(|| format!("line {}: '{}'", line_number, line))?;
            debug!("parsed element {} ({:?})", element.name, element.kind);
            netlist.elements.push(element);
        }

        Ok(netlist)
    }

    /// Join `+` continuations and drop comments and blank lines,
    /// keeping the 1-based number of each line's first physical line.
    fn preprocess_lines(&self, content: &str) -> Vec<(usize, String)> {
        let mut processed_lines: Vec<(usize, String)> = Vec::new();

        for (index, raw) in content.lines().enumerate() {
            let line = match raw.find(';') {
                Some(position) => &raw[..position],
                None => raw,
            }
            .trim();

            if line.is_empty() || line.starts_with('*') {
                continue;
            }

            if let Some(rest) = line.strip_prefix('+') {
                if let Some((_, current)) = processed_lines.last_mut() {
                    current.push(' ');
                    current.push_str(rest.trim());
                    continue;
                }
            }
            processed_lines.push((index + 1, line.to_string()));
        }

        processed_lines
    }
}

/// Canonical node name; every spelling of ground maps to [`GROUND`].
pub fn normalize_node(name: &str) -> String {
    if GROUND_PATTERN.is_match(name) {
        GROUND.to_string()
    } else {
        name.to_lowercase()
    }
}

/// Parse a number with an optional SPICE scale suffix (`f p n u m k meg g t`).
///
/// Letters after the scale factor are units and are ignored (`10pF`, `4.7uH`).
pub fn parse_value_with_unit(value_str: &str) -> Result<f64> {
    let captures = VALUE_PATTERN
        .captures(value_str.trim())
        .ok_or_else(|| anyhow!("Invalid value: '{}'", value_str))?;
    let number: f64 = captures[1].parse()?;
    let suffix = captures[2].to_lowercase();

    let multiplier = if suffix.starts_with("meg") {
        1e6
    } else {
        match suffix.chars().next() {
            Some('f') => 1e-15,
            Some('p') => 1e-12,
            Some('n') => 1e-9,
            Some('u') => 1e-6,
            Some('m') => 1e-3,
            Some('k') => 1e3,
            Some('g') => 1e9,
            Some('t') => 1e12,
            _ => 1.0,
        }
    };

    let value = number * multiplier;
    if !value.is_finite() {
        return Err(anyhow!("Value out of range: '{}'", value_str));
    }
    Ok(value)
}

fn token(input: &str) -> IResult<&str, &str> {
    take_while1(|c: char| !c.is_whitespace())(input)
}

fn element_name(input: &str) -> IResult<&str, &str> {
    recognize(pair(
        one_of("RLCrlc"),
        take_while(|c: char| c.is_alphanumeric() || c == '_'),
    ))(input)
}

fn element_fields(input: &str) -> IResult<&str, (&str, &str, &str, &str, Option<&str>)> {
    all_consuming(terminated(
        tuple((
            element_name,
            preceded(space1, token),
            preceded(space1, token),
            preceded(space1, token),
            opt(preceded(pair(space1, tag_no_case("q=")), token)),
        )),
        space0,
    ))(input)
}

fn parse_element_line(line: &str) -> Result<NetlistElement> {
    let (_, (name, node_a, node_b, value_str, q_str)) = element_fields(line)
        .map_err(|_| anyhow!("expected '<R|L|C><name> <node> <node> <value> [q=<value>]'"))?;

    let kind = match name.chars().next().map(|c| c.to_ascii_uppercase()) {
        Some('R') => ElementKind::Resistor,
        Some('L') => ElementKind::Inductor,
        Some('C') => ElementKind::Capacitor,
        _ => return Err(anyhow!("Unknown element type: {}", name)),
    };
    let value = parse_value_with_unit(value_str)?;
    if value < 0.0 {
        return Err(anyhow!("{} has a negative value", name));
    }
    let q = match q_str {
        Some(_) if kind != ElementKind::Inductor => {
            return Err(anyhow!("{}: only inductors take a quality factor", name))
        }
        Some(q_str) => {
            let q = parse_value_with_unit(q_str)?;
            if q <= 0.0 {
                return Err(anyhow!("{} needs a positive quality factor", name));
            }
            Some(q)
        }
        None => None,
    };

    Ok(NetlistElement {
        name: name.to_lowercase(),
        kind,
        nodes: (normalize_node(node_a), normalize_node(node_b)),
        value,
        q,
    })
}

fn sweep_type(input: &str) -> IResult<&str, SweepType> {
    alt((
        value(SweepType::Lin, tag_no_case("lin")),
        value(SweepType::Dec, tag_no_case("dec")),
    ))(input)
}

fn ac_fields(input: &str) -> IResult<&str, (SweepType, &str, &str, &str)> {
    preceded(
        tag_no_case(".ac"),
        tuple((
            preceded(space1, sweep_type),
            preceded(space1, token),
            preceded(space1, token),
            preceded(space1, token),
        )),
    )(input)
}

fn node_directive(input: &str) -> IResult<&str, Directive> {
    alt((
        map(preceded(pair(tag_no_case(".input"), space1), token), |node| {
            Directive::Input(normalize_node(node))
        }),
        map(preceded(pair(tag_no_case(".output"), space1), token), |node| {
            Directive::Output(normalize_node(node))
        }),
    ))(input)
}

fn parse_directive(line: &str) -> Result<Option<Directive>> {
    let keyword = line
        .split_whitespace()
        .next()
        .unwrap_or_default()
        .to_lowercase();

    match keyword.as_str() {
        ".end" => Ok(Some(Directive::End)),
        ".input" | ".output" => {
            let (_, directive) = all_consuming(terminated(node_directive, space0))(line)
                .map_err(|_| anyhow!("expected '{} <node>'", keyword))?;
            Ok(Some(directive))
        }
        ".ac" => {
            let (_, (sweep_type, points, fstart, fstop)) =
                all_consuming(terminated(ac_fields, space0))(line)
                    .map_err(|_| anyhow!("expected '.ac lin|dec <points> <fstart> <fstop>'"))?;
            let points = points
                .parse::<usize>()
                .with_context(|| format!("invalid point count '{}'", points))?;
            Ok(Some(Directive::Ac(AcSweep {
                sweep_type,
                points,
                fstart: parse_value_with_unit(fstart)?,
                fstop: parse_value_with_unit(fstop)?,
            })))
        }
        _ => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LOWPASS: &str = "\
Third order Butterworth
* source and load
Rs vin v1 50
C1 v1 0 3.183n ; shunt
L2 v1 v2
+ 15.92u
C3 v2 GND 3.183nF
RL v2 0 50
.input vin
.output v2
.ac dec 10 100k 10meg
.end
R9 a b 1
";

    #[test]
    fn test_parse_netlist() {
        let netlist = NetlistParser::new().parse_netlist(LOWPASS).unwrap();
        assert_eq!(netlist.title, "Third order Butterworth");
        assert_eq!(netlist.elements.len(), 5);
        assert_eq!(netlist.inputs, vec!["vin".to_string()]);
        assert_eq!(netlist.output.as_deref(), Some("v2"));

        let l2 = &netlist.elements[2];
        assert_eq!(l2.name, "l2");
        assert_eq!(l2.kind, ElementKind::Inductor);
        assert_eq!(l2.nodes, ("v1".to_string(), "v2".to_string()));
        assert!((l2.value - 15.92e-6).abs() < 1e-15);

        assert_eq!(netlist.elements[1].nodes.1, GROUND);
        assert_eq!(netlist.elements[3].nodes.1, GROUND);

        let sweep = &netlist.analyses[0];
        assert_eq!(sweep.sweep_type, SweepType::Dec);
        assert_eq!(sweep.points, 10);
        assert_eq!(sweep.fstart, 100e3);
        assert_eq!(sweep.fstop, 10e6);
    }

    #[test]
    fn test_inductor_quality_factor() {
        let parser = NetlistParser::new();
        let netlist = parser
            .parse_netlist("dtc\nL2 vb 0 6.98u Q=200\nL5 vc 0 6.98u\n")
            .unwrap();
        assert_eq!(netlist.elements[0].q, Some(200.0));
        match netlist.elements[0].to_element() {
            Element::LossyInductor { henries, q } => {
                assert!((henries - 6.98e-6).abs() < 1e-18);
                assert_eq!(q, 200.0);
            }
            other => panic!("expected a lossy inductor, got {:?}", other),
        }
        assert!(matches!(netlist.elements[1].to_element(), Element::Inductor(_)));

        assert!(parser.parse_netlist("t\nC1 a 0 1n q=50\n").is_err());
        assert!(parser.parse_netlist("t\nL1 a 0 1u q=0\n").is_err());
        assert!(parser.parse_netlist("t\nL1 a 0 1u 200\n").is_err());
    }

    #[test]
    fn test_preprocess_lines() {
        let parser = NetlistParser::new();
        let lines = parser.preprocess_lines("Title\n\n* comment\nR1 a b\n+ 1k ; note\n.end");
        assert_eq!(
            lines,
            vec![
                (1, "Title".to_string()),
                (4, "R1 a b 1k".to_string()),
                (6, ".end".to_string()),
            ]
        );
    }

    #[test]
    fn test_parse_value_with_unit() {
        assert_eq!(parse_value_with_unit("1k").unwrap(), 1000.0);
        assert_eq!(parse_value_with_unit("1.5meg").unwrap(), 1.5e6);
        assert_eq!(parse_value_with_unit("10m").unwrap(), 10e-3);
        assert_eq!(parse_value_with_unit("1u").unwrap(), 1e-6);
        assert_eq!(parse_value_with_unit("47").unwrap(), 47.0);
        assert_eq!(parse_value_with_unit("2.2e3").unwrap(), 2200.0);
        assert!((parse_value_with_unit("10pF").unwrap() - 10e-12).abs() < 1e-24);
        assert!((parse_value_with_unit("4.7uH").unwrap() - 4.7e-6).abs() < 1e-18);
        assert!(parse_value_with_unit("abc").is_err());
        assert!(parse_value_with_unit("").is_err());
    }

    #[test]
    fn test_ground_aliases() {
        assert_eq!(normalize_node("0"), GROUND);
        assert_eq!(normalize_node("GND"), GROUND);
        assert_eq!(normalize_node("Ground"), GROUND);
        assert_eq!(normalize_node("Vout"), "vout");
    }

    #[test]
    fn test_malformed_lines() {
        let parser = NetlistParser::new();
        assert!(parser.parse_netlist("t\nR1 a b\n").is_err());
        assert!(parser.parse_netlist("t\nQ1 a b 1\n").is_err());
        assert!(parser.parse_netlist("t\nR1 a b -5\n").is_err());
        assert!(parser.parse_netlist("t\n.ac log 10 1 10\n").is_err());
        assert!(parser.parse_netlist("t\n.input\n").is_err());

        // unknown directives are skipped
        let netlist = parser.parse_netlist("t\n.options foo\nR1 a 0 1\n").unwrap();
        assert_eq!(netlist.elements.len(), 1);
    }

    #[test]
    fn test_ac_frequencies() {
        let lin = AcSweep {
            sweep_type: SweepType::Lin,
            points: 5,
            fstart: 1.0,
            fstop: 5.0,
        };
        assert_eq!(lin.frequencies().unwrap(), vec![1.0, 2.0, 3.0, 4.0, 5.0]);

        let dec = AcSweep {
            sweep_type: SweepType::Dec,
            points: 10,
            fstart: 1.0e3,
            fstop: 1.0e5,
        };
        let freqs = dec.frequencies().unwrap();
        assert_eq!(freqs.len(), 21);
        assert!((freqs[10] - 1.0e4).abs() < 1e-6);

        let empty = AcSweep { points: 0, ..dec.clone() };
        assert!(empty.frequencies().is_err());
        let backwards = AcSweep {
            fstart: 1.0e5,
            fstop: 1.0e3,
            ..dec
        };
        assert!(backwards.frequencies().is_err());
    }
}
