use std::collections::HashMap;
use std::fmt;

use log::debug;
use num_complex::Complex64;
use serde::{Deserialize, Serialize};

use crate::error::{FilterError, Result};

/// Name of the ground node every topology starts with.
pub const GROUND: &str = "gnd";

/// Represents a node in the network
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub name: String,
    /// Dense index, also the node's row/column in the linear system
    pub ordinal: usize,
    pub is_input: bool,
    pub is_ground: bool,
}

impl Node {
    fn new(name: String, ordinal: usize) -> Self {
        Node {
            name,
            ordinal,
            is_input: false,
            is_ground: false,
        }
    }
}

/// Branch impedance: either known now, or named and substituted later
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Impedance {
    Concrete(Complex64),
    Symbolic(String),
}

impl Impedance {
    pub fn resistance(ohms: f64) -> Self {
        Impedance::Concrete(Complex64::new(ohms, 0.0))
    }

    pub fn symbol(name: impl Into<String>) -> Self {
        Impedance::Symbolic(name.into())
    }
}

impl fmt::Display for Impedance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Impedance::Concrete(z) => write!(f, "{} ohm", z),
            Impedance::Symbolic(name) => write!(f, "{}", name),
        }
    }
}

/// Two-terminal branch between node ordinals
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    pub start: usize,
    pub end: usize,
    pub impedance: Impedance,
}

impl Edge {
    /// The endpoint opposite `ordinal`, if the edge touches it.
    pub fn other_end(&self, ordinal: usize) -> Option<usize> {
        if self.start == ordinal {
            Some(self.end)
        } else if self.end == ordinal {
            Some(self.start)
        } else {
            None
        }
    }
}

/// Node arena plus edge list describing a single-input linear network
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Topology {
    nodes: Vec<Node>,
    edges: Vec<Edge>,
    node_map: HashMap<String, usize>,
}

impl Topology {
    pub fn new() -> Self {
        let mut topology = Topology {
            nodes: Vec::new(),
            edges: Vec::new(),
            node_map: HashMap::new(),
        };
        let ground = topology.create_node(GROUND);
        topology.nodes[ground].is_ground = true;
        topology
    }

    /// Return the ordinal of `name`, creating the node if needed
    pub fn create_node(&mut self, name: &str) -> usize {
        if let Some(&existing) = self.node_map.get(name) {
            return existing;
        }

        let ordinal = self.nodes.len();
        self.nodes.push(Node::new(name.to_string(), ordinal));
        self.node_map.insert(name.to_string(), ordinal);
        debug!("created node '{}' with ordinal {}", name, ordinal);
        ordinal
    }

    /// Connect two nodes, creating either endpoint on first use.
    /// Returns the index of the new edge.
    pub fn add_edge(&mut self, node_a: &str, node_b: &str, impedance: Impedance) -> usize {
        let start = self.create_node(node_a);
        let end = self.create_node(node_b);
        self.edges.push(Edge {
            start,
            end,
            impedance,
        });
        self.edges.len() - 1
    }

    /// Drive `name` with the unit source
    pub fn mark_input(&mut self, name: &str) -> Result<()> {
        let ordinal = self
            .ordinal(name)
            .ok_or_else(|| FilterError::UnknownNode(name.to_string()))?;
        let node = &mut self.nodes[ordinal];
        if node.is_ground {
            return Err(FilterError::InvalidTopology(
                "the ground node cannot be the input".to_string(),
            ));
        }
        node.is_input = true;
        Ok(())
    }

    pub fn ordinal(&self, name: &str) -> Option<usize> {
        self.node_map.get(name).copied()
    }

    pub fn node(&self, name: &str) -> Option<&Node> {
        self.ordinal(name).map(|ordinal| &self.nodes[ordinal])
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn ground(&self) -> &Node {
        &self.nodes[0]
    }

    pub fn inputs(&self) -> impl Iterator<Item = &Node> {
        self.nodes.iter().filter(|node| node.is_input)
    }

    /// Node names in ordinal order
    pub fn names(&self) -> Vec<String> {
        self.nodes.iter().map(|node| node.name.clone()).collect()
    }

    /// Every edge touching `ordinal`, paired with its far endpoint
    pub fn incident_edges(&self, ordinal: usize) -> impl Iterator<Item = (&Edge, usize)> {
        self.edges
            .iter()
            .filter_map(move |edge| edge.other_end(ordinal).map(|other| (edge, other)))
    }

    /// Names of all symbolic impedances, in first-use order, without repeats
    pub fn symbols(&self) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        for edge in &self.edges {
            if let Impedance::Symbolic(name) = &edge.impedance {
                if !names.contains(name) {
                    names.push(name.clone());
                }
            }
        }
        names
    }

    /// Print topology summary
    pub fn print_summary(&self) {
        println!("Nodes: {}", self.nodes.len());
        println!("Edges: {}", self.edges.len());
        for node in &self.nodes {
            let role = if node.is_ground {
                " (ground)"
            } else if node.is_input {
                " (input)"
            } else {
                ""
            };
            println!("  [{}] {}{}", node.ordinal, node.name, role);
        }
        for edge in &self.edges {
            println!(
                "  {} -- {} : {}",
                self.nodes[edge.start].name, self.nodes[edge.end].name, edge.impedance
            );
        }
    }
}

impl Default for Topology {
    fn default() -> Self {
        Self::new()
    }
}
