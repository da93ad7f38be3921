use std::collections::HashMap;

use log::{debug, warn};
use nalgebra::{DMatrix, DVector};
use num_complex::Complex64;

use crate::error::{FilterError, Result};
use crate::expr::Expr;
use crate::field::Field;
use crate::solver::LinearSolver;
use crate::topology::{Edge, Impedance, Node, Topology};

/// Nodal system representation: [A][x] = [b]
/// where x holds one potential per node, in ordinal order
#[derive(Debug, Clone)]
pub struct LinearSystem<T: Field> {
    /// System matrix A
    pub matrix: DMatrix<T>,
    /// Right-hand side vector b
    pub rhs: DVector<T>,
    /// Node name for each row/column
    pub names: Vec<String>,
}

/// Node potentials parallel to `names`
#[derive(Debug, Clone)]
pub struct Solution<T: Field> {
    pub values: Vec<T>,
    pub names: Vec<String>,
}

impl<T: Field> LinearSystem<T> {
    pub fn size(&self) -> usize {
        self.names.len()
    }

    pub fn solve(&self, solver: &LinearSolver) -> Result<Solution<T>> {
        let (values, stats) = solver.solve(&self.matrix, &self.rhs)?;
        debug!(
            "solved {}x{} nodal system in {:.3}ms: {} row swaps, smallest pivot {:.3e}",
            self.size(),
            self.size(),
            stats.solve_time * 1000.0,
            stats.row_swaps,
            stats.smallest_pivot
        );
        Ok(Solution {
            values: values.iter().cloned().collect(),
            names: self.names.clone(),
        })
    }
}

impl<T: Field> Solution<T> {
    pub fn index_of(&self, name: &str) -> Result<usize> {
        self.names
            .iter()
            .position(|candidate| candidate == name)
            .ok_or_else(|| FilterError::UnknownNode(name.to_string()))
    }

    /// Potential of the named node
    pub fn potential(&self, name: &str) -> Result<&T> {
        let index = self.index_of(name)?;
        Ok(&self.values[index])
    }
}

impl Topology {
    /// Assemble the KCL system with every impedance kept symbolic
    /// (concrete impedances become constants).
    pub fn build_linear_system(&self) -> Result<LinearSystem<Expr>> {
        self.assemble(|edge| match &edge.impedance {
            Impedance::Concrete(z) => Ok(Expr::constant(*z)),
            Impedance::Symbolic(name) => Ok(Expr::symbol(name.clone())),
        })
    }

    /// Assemble the KCL system with every symbolic impedance resolved from `values`.
    pub fn build_numeric_system(
        &self,
        values: &HashMap<String, Complex64>,
    ) -> Result<LinearSystem<Complex64>> {
        self.assemble(|edge| match &edge.impedance {
            Impedance::Concrete(z) => Ok(*z),
            Impedance::Symbolic(name) => values
                .get(name)
                .copied()
                .ok_or_else(|| FilterError::UnboundSymbol(name.clone())),
        })
    }

    /// Build and solve the symbolic system.
    pub fn solve(&self) -> Result<Solution<Expr>> {
        self.build_linear_system()?.solve(&LinearSolver::new())
    }

    /// Build and solve with concrete values for every symbol.
    pub fn solve_numeric(&self, values: &HashMap<String, Complex64>) -> Result<Solution<Complex64>> {
        self.build_numeric_system(values)?
            .solve(&LinearSolver::new())
    }

    fn assemble<T, F>(&self, impedance_of: F) -> Result<LinearSystem<T>>
    where
        T: Field,
        F: Fn(&Edge) -> Result<T>,
    {
        let size = self.node_count();
        let mut matrix = DMatrix::from_element(size, size, T::zero());
        let mut rhs = DVector::from_element(size, T::zero());

        if self.inputs().next().is_none() {
            warn!("network has no input node; every potential will be zero");
        }

        // Admittances are formed once per edge so both endpoint rows share them.
        // `None` marks a short: its endpoints are merged instead of stamped.
        let mut shorts = ShortedNodes::new(size);
        let mut admittances: Vec<Option<T>> = Vec::with_capacity(self.edges().len());
        for edge in self.edges() {
            let z = impedance_of(edge)?;
            match z.invert() {
                Some(y) => admittances.push(Some(y)),
                None if z.magnitude() == 0.0 => {
                    shorts.union(edge.start, edge.end);
                    admittances.push(None);
                }
                None => {
                    return Err(FilterError::SingularSystem(format!(
                        "impedance between '{}' and '{}' is not a number",
                        self.nodes()[edge.start].name,
                        self.nodes()[edge.end].name
                    )))
                }
            }
        }
        let representative = self.representatives(&mut shorts)?;

        for node in self.nodes() {
            let i = node.ordinal;
            let r = representative[i];
            if r != i {
                debug!("node '{}' is shorted to '{}'", node.name, self.nodes()[r].name);
                matrix[(i, i)] = T::one();
                matrix[(i, r)] = -T::one();
            } else if node.is_input {
                matrix[(i, i)] = T::one();
                rhs[i] = T::one();
            } else if node.is_ground {
                matrix[(i, i)] = T::one();
            } else {
                for (edge, y) in self.edges().iter().zip(&admittances) {
                    let y = match y {
                        Some(y) => y,
                        None => continue,
                    };
                    let (a, b) = (representative[edge.start], representative[edge.end]);
                    let j = if a == i {
                        b
                    } else if b == i {
                        a
                    } else {
                        continue;
                    };
                    if j == i {
                        continue;
                    }
                    matrix[(i, i)] = matrix[(i, i)].clone() + y.clone();
                    matrix[(i, j)] = matrix[(i, j)].clone() - y.clone();
                }
            }
        }

        Ok(LinearSystem {
            matrix,
            rhs,
            names: self.names(),
        })
    }

    /// Row owner of every node: itself, or the node its short class is
    /// reduced to (ground first, then an input, then the lowest ordinal).
    fn representatives(&self, shorts: &mut ShortedNodes) -> Result<Vec<usize>> {
        let rank = |node: &Node| {
            if node.is_ground {
                2
            } else if node.is_input {
                1
            } else {
                0
            }
        };

        let mut chosen: Vec<Option<usize>> = vec![None; self.node_count()];
        for node in self.nodes() {
            let root = shorts.find(node.ordinal);
            match chosen[root] {
                Some(current) if rank(&self.nodes()[current]) >= rank(node) => {}
                _ => chosen[root] = Some(node.ordinal),
            }
        }

        self.nodes()
            .iter()
            .map(|node| {
                let root = shorts.find(node.ordinal);
                let representative = chosen[root].unwrap_or(node.ordinal);
                if node.is_input && self.nodes()[representative].is_ground {
                    return Err(FilterError::SingularSystem(format!(
                        "input '{}' is shorted to ground",
                        node.name
                    )));
                }
                Ok(representative)
            })
            .collect()
    }
}

/// Union-find over node ordinals joined by zero impedances
struct ShortedNodes {
    parent: Vec<usize>,
}

impl ShortedNodes {
    fn new(size: usize) -> Self {
        ShortedNodes {
            parent: (0..size).collect(),
        }
    }

    fn find(&mut self, ordinal: usize) -> usize {
        let mut root = ordinal;
        while self.parent[root] != root {
            root = self.parent[root];
        }
        let mut node = ordinal;
        while self.parent[node] != root {
            let next = self.parent[node];
            self.parent[node] = root;
            node = next;
        }
        root
    }

    fn union(&mut self, a: usize, b: usize) {
        let (a, b) = (self.find(a), self.find(b));
        if a != b {
            self.parent[a.max(b)] = a.min(b);
        }
    }
}
