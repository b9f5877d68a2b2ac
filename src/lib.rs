//! A branch-and-bound SAT engine that mixes unit propagation with closure over
//! binary implications, probes literals for forced values before branching, and
//! escalates through a table of increasingly patient search strategies.

pub mod avl;
pub mod formula;
pub mod matrix;
pub mod strategy;
pub mod trail;

mod solver;

#[cfg(test)]
mod brute_force;

#[derive(PartialEq, Eq, Clone, Copy, Debug)]
pub enum SatResult {
    /// A satisfying assignment was found; read it back with [`Solver::get_value`].
    Solved,
    /// The clauses are unsatisfiable.
    Absurd,
    /// Every strategy ran out of backtracks. Nothing is known either way.
    GaveUp,
}

#[derive(PartialEq, Eq, Clone, Copy, Debug)]
pub enum Value {
    True,
    False,
    Unknown,
}

pub use formula::{Clause, Formula, Literal, Variable};
pub use solver::{Solver, SolverStats};
