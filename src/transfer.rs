//! Transfer functions `H(ω)` of a solved network.
//!
//! [`SymbolicTransfer`] solves once and evaluates a compiled expression per
//! frequency; [`NumericTransfer`] re-assembles and solves the concrete
//! system at every frequency. Both only borrow or own immutable data, so a
//! sweep never mutates the topology or the solved expression.

use log::debug;
use num_complex::Complex64;

use crate::component::{impedances_at, Bindings, Element};
use crate::error::{FilterError, Result};
use crate::expr::{Expr, Tape};
use crate::solver::LinearSolver;
use crate::topology::Topology;

/// A network response as a function of angular frequency (rad/s)
pub trait TransferFunction {
    fn evaluate(&self, omega: f64) -> Result<Complex64>;
}

impl<F> TransferFunction for F
where
    F: Fn(f64) -> Result<Complex64>,
{
    fn evaluate(&self, omega: f64) -> Result<Complex64> {
        self(omega)
    }
}

/// Output potential compiled from a symbolic solution, with the element
/// model behind every symbol it uses
#[derive(Debug, Clone)]
pub struct SymbolicTransfer {
    tape: Tape,
    elements: Vec<Element>,
    fallback: Option<ConcreteNetwork>,
}

/// Network kept alongside a compiled tape so a frequency where the tape
/// divides by zero can still be solved with pivoting
#[derive(Debug, Clone)]
struct ConcreteNetwork {
    topology: Topology,
    bindings: Bindings,
    output: usize,
    solver: LinearSolver,
}

impl SymbolicTransfer {
    /// Compile `output` without a network to fall back on: a frequency at
    /// which the expression is singular is reported as an error.
    pub fn new(output: &Expr, bindings: &Bindings) -> Result<Self> {
        let tape = Tape::compile(std::slice::from_ref(output));
        let elements = tape
            .symbols()
            .iter()
            .map(|name| {
                bindings
                    .get(name)
                    .cloned()
                    .ok_or_else(|| FilterError::UnboundSymbol(name.clone()))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(SymbolicTransfer {
            tape,
            elements,
            fallback: None,
        })
    }

    /// Solve `topology` symbolically and compile the potential of `output`.
    pub fn from_topology(topology: &Topology, output: &str, bindings: &Bindings) -> Result<Self> {
        Self::with_solver(topology, output, bindings, LinearSolver::new())
    }

    /// Like [`SymbolicTransfer::from_topology`], with `solver` used for the
    /// symbolic elimination and for concrete solves at frequencies where
    /// the compiled expression is singular.
    pub fn with_solver(
        topology: &Topology,
        output: &str,
        bindings: &Bindings,
        solver: LinearSolver,
    ) -> Result<Self> {
        let ordinal = topology
            .ordinal(output)
            .ok_or_else(|| FilterError::UnknownNode(output.to_string()))?;
        let solution = topology.build_linear_system()?.solve(&solver)?;
        let mut transfer = Self::new(&solution.values[ordinal], bindings)?;
        transfer.fallback = Some(ConcreteNetwork {
            topology: topology.clone(),
            bindings: bindings.clone(),
            output: ordinal,
            solver,
        });
        Ok(transfer)
    }

    pub fn tape(&self) -> &Tape {
        &self.tape
    }
}

impl TransferFunction for SymbolicTransfer {
    fn evaluate(&self, omega: f64) -> Result<Complex64> {
        let inputs: Vec<Complex64> = self
            .elements
            .iter()
            .map(|element| element.impedance(omega))
            .collect();
        match (self.tape.evaluate(&inputs), &self.fallback) {
            (Ok(outputs), _) => Ok(outputs[0]),
            (Err(FilterError::SingularSystem(reason)), Some(network)) => {
                debug!("{} at omega = {:.6e}; solving the concrete system", reason, omega);
                solve_concrete(
                    &network.topology,
                    &network.bindings,
                    network.output,
                    &network.solver,
                    omega,
                )
            }
            (Err(e), _) => Err(e),
        }
    }
}

/// Output potential obtained by a fresh concrete solve at each frequency
pub struct NumericTransfer<'a> {
    topology: &'a Topology,
    bindings: &'a Bindings,
    output: usize,
    solver: LinearSolver,
}

impl<'a> NumericTransfer<'a> {
    pub fn new(topology: &'a Topology, output: &str, bindings: &'a Bindings) -> Result<Self> {
        let output = topology
            .ordinal(output)
            .ok_or_else(|| FilterError::UnknownNode(output.to_string()))?;
        Ok(NumericTransfer {
            topology,
            bindings,
            output,
            solver: LinearSolver::new(),
        })
    }

    pub fn with_solver(mut self, solver: LinearSolver) -> Self {
        self.solver = solver;
        self
    }
}

impl TransferFunction for NumericTransfer<'_> {
    fn evaluate(&self, omega: f64) -> Result<Complex64> {
        solve_concrete(self.topology, self.bindings, self.output, &self.solver, omega)
    }
}

fn solve_concrete(
    topology: &Topology,
    bindings: &Bindings,
    output: usize,
    solver: &LinearSolver,
    omega: f64,
) -> Result<Complex64> {
    let values = impedances_at(bindings, omega);
    let solution = topology.build_numeric_system(&values)?.solve(solver)?;
    Ok(solution.values[output])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topology::{Impedance, GROUND};
    use approx::assert_relative_eq;

    /// vin -rs- v1 -l1- vout, c1 and rl from vout to ground
    fn lc_section() -> (Topology, Bindings) {
        let mut topology = Topology::new();
        topology.add_edge("vin", "v1", Impedance::symbol("rs"));
        topology.add_edge("v1", "vout", Impedance::symbol("l1"));
        topology.add_edge("vout", GROUND, Impedance::symbol("c1"));
        topology.add_edge("vout", GROUND, Impedance::symbol("rl"));
        topology.mark_input("vin").unwrap();

        let mut bindings = Bindings::new();
        bindings.insert("rs".to_string(), Element::Resistor(50.0));
        bindings.insert("l1".to_string(), Element::Inductor(10.0e-6));
        bindings.insert("c1".to_string(), Element::Capacitor(4.0e-9));
        bindings.insert("rl".to_string(), Element::Resistor(150.0));
        (topology, bindings)
    }

    /// rl || c1 over rs + l1 + (rl || c1)
    fn closed_form(omega: f64) -> Complex64 {
        let zl = Complex64::new(0.0, omega * 10.0e-6);
        let zc = Complex64::new(0.0, -1.0 / (omega * 4.0e-9));
        let rl = Complex64::new(150.0, 0.0);
        let zp = rl * zc / (rl + zc);
        zp / (Complex64::new(50.0, 0.0) + zl + zp)
    }

    #[test]
    fn test_matches_closed_form() {
        let (topology, bindings) = lc_section();
        let symbolic = SymbolicTransfer::from_topology(&topology, "vout", &bindings).unwrap();
        let numeric = NumericTransfer::new(&topology, "vout", &bindings).unwrap();
        for omega in [1.0e2, 1.0e5, 5.0e6, 3.0e7] {
            let expected = closed_form(omega);
            let a = symbolic.evaluate(omega).unwrap();
            let b = numeric.evaluate(omega).unwrap();
            assert!((a - expected).norm() < 1e-9 * expected.norm());
            assert!((b - expected).norm() < 1e-9 * expected.norm());
        }
    }

    #[test]
    fn test_dc_is_resistive_divider() {
        let (topology, bindings) = lc_section();
        let symbolic = SymbolicTransfer::from_topology(&topology, "vout", &bindings).unwrap();
        let numeric = NumericTransfer::new(&topology, "vout", &bindings).unwrap();
        // the inductor is a short and the capacitor an open circuit
        for h in [symbolic.evaluate(0.0).unwrap(), numeric.evaluate(0.0).unwrap()] {
            assert_relative_eq!(h.re, 150.0 / 200.0, epsilon = 1e-12);
            assert_relative_eq!(h.im, 0.0, epsilon = 1e-12);
        }
        let v = symbolic.evaluate(10.0).unwrap();
        assert_relative_eq!(v.norm(), 150.0 / 200.0, epsilon = 1e-6);
    }

    /// vin -c1- a -c2- b, l1 from a and r1 from b to ground: at ω = 1 the
    /// admittances on `a` sum to zero
    fn cancelling_node() -> (Topology, Bindings) {
        let mut topology = Topology::new();
        topology.add_edge("vin", "a", Impedance::symbol("c1"));
        topology.add_edge("a", GROUND, Impedance::symbol("l1"));
        topology.add_edge("a", "b", Impedance::symbol("c2"));
        topology.add_edge("b", GROUND, Impedance::symbol("r1"));
        topology.mark_input("vin").unwrap();

        let mut bindings = Bindings::new();
        bindings.insert("c1".to_string(), Element::Capacitor(0.5));
        bindings.insert("l1".to_string(), Element::Inductor(1.0));
        bindings.insert("c2".to_string(), Element::Capacitor(0.5));
        bindings.insert("r1".to_string(), Element::Resistor(1.0));
        (topology, bindings)
    }

    #[test]
    fn test_cancelling_diagonal_solves_concretely() {
        let (topology, bindings) = cancelling_node();
        let symbolic = SymbolicTransfer::from_topology(&topology, "b", &bindings).unwrap();
        let numeric = NumericTransfer::new(&topology, "b", &bindings).unwrap();

        let expected = numeric.evaluate(1.0).unwrap();
        assert_relative_eq!(expected.re, -1.0, epsilon = 1e-12);
        assert_relative_eq!(expected.im, 0.0, epsilon = 1e-12);

        let h = symbolic.evaluate(1.0).unwrap();
        assert!((h - expected).norm() < 1e-12);

        for omega in [0.5, 0.9, 0.999, 1.0, 1.001, 1.1, 2.0] {
            let a = symbolic.evaluate(omega).unwrap();
            let b = numeric.evaluate(omega).unwrap();
            assert!((a - b).norm() < 1e-9 * (1.0 + b.norm()));
        }
    }

    #[test]
    fn test_bare_tape_reports_singular_frequency() {
        let (topology, bindings) = cancelling_node();
        let solution = topology.solve().unwrap();
        let h = SymbolicTransfer::new(solution.potential("b").unwrap(), &bindings).unwrap();
        assert!(matches!(h.evaluate(1.0), Err(FilterError::SingularSystem(_))));
    }

    #[test]
    fn test_high_frequency_rolls_off() {
        let (topology, bindings) = lc_section();
        let h = SymbolicTransfer::from_topology(&topology, "vout", &bindings).unwrap();
        let mut previous = f64::INFINITY;
        for omega in [1.0e8, 1.0e9, 1.0e10, 1.0e11] {
            let magnitude = h.evaluate(omega).unwrap().norm();
            assert!(magnitude < previous);
            previous = magnitude;
        }
        assert!(previous < 1.0e-6);
    }

    #[test]
    fn test_symbolic_and_numeric_agree() {
        let (topology, bindings) = lc_section();
        let symbolic = SymbolicTransfer::from_topology(&topology, "vout", &bindings).unwrap();
        let numeric = NumericTransfer::new(&topology, "vout", &bindings).unwrap();
        for omega in [1.0e4, 1.0e6, 5.0e6, 2.0e7, 1.0e8] {
            let a = symbolic.evaluate(omega).unwrap();
            let b = numeric.evaluate(omega).unwrap();
            assert!((a - b).norm() < 1e-9 * (1.0 + b.norm()));
        }
    }

    #[test]
    fn test_missing_binding() {
        let (topology, mut bindings) = lc_section();
        bindings.remove("c1");
        assert_eq!(
            SymbolicTransfer::from_topology(&topology, "vout", &bindings).unwrap_err(),
            FilterError::UnboundSymbol("c1".to_string())
        );
        let numeric = NumericTransfer::new(&topology, "vout", &bindings).unwrap();
        assert!(matches!(
            numeric.evaluate(1.0),
            Err(FilterError::UnboundSymbol(_))
        ));
    }

    #[test]
    fn test_unknown_output() {
        let (topology, bindings) = lc_section();
        assert!(matches!(
            NumericTransfer::new(&topology, "nope", &bindings),
            Err(FilterError::UnknownNode(_))
        ));
        assert!(matches!(
            SymbolicTransfer::from_topology(&topology, "nope", &bindings),
            Err(FilterError::UnknownNode(_))
        ));
    }

    #[test]
    fn test_closure_transfer() {
        let h = |omega: f64| -> Result<Complex64> { Ok(Complex64::new(1.0 / (1.0 + omega), 0.0)) };
        assert_relative_eq!(h.evaluate(1.0).unwrap().re, 0.5);
    }
}
