pub mod bandpass;
pub mod cli;
pub mod component;
pub mod design;
pub mod error;
pub mod expr;
pub mod field;
pub mod ladder;
pub mod nodal;
pub mod parser;
pub mod response;
pub mod simulator;
pub mod solver;
pub mod topology;
pub mod transfer;

// Re-export commonly used types
pub use bandpass::{BandpassSpec, CoupledResonatorFilter, Resonator};
pub use component::{Bindings, Element};
pub use design::{FilterFamily, NormalizedFilterSpec};
pub use error::{FilterError, Result};
pub use ladder::{LadderStart, LowPassLadder};
pub use nodal::{LinearSystem, Solution};
pub use parser::NetlistParser;
pub use response::{find_passband_edges, sweep, to_db, PassbandEdges};
pub use simulator::{SimulationResult, Simulator};
pub use topology::{Impedance, Topology, GROUND};
pub use transfer::{NumericTransfer, SymbolicTransfer, TransferFunction};

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");
