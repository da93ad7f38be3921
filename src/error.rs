use thiserror::Error;

/// Errors produced by the topology, solver, coefficient and response code.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FilterError {
    /// A node name was referenced before it was created.
    #[error("unknown node '{0}'")]
    UnknownNode(String),

    /// Elimination hit a non-invertible pivot, or an admittance could not be formed.
    #[error("singular system: {0}")]
    SingularSystem(String),

    #[error("unsupported filter order {order}: {reason}")]
    UnsupportedOrder { order: usize, reason: String },

    /// A closed-form formula was handed arguments outside its domain.
    #[error("domain error: {0}")]
    DomainError(String),

    #[error("no value bound for impedance symbol '{0}'")]
    UnboundSymbol(String),

    #[error("invalid topology: {0}")]
    InvalidTopology(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

pub type Result<T> = std::result::Result<T, FilterError>;
