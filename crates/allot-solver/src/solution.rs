use std::fmt;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

use crate::model::VarId;

/// Outcome of a solve call. These are results, not errors: branch on the
/// status before reading values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SolutionStatus {
    /// An optimal solution was found and proven
    Optimal,
    /// A feasible solution was found, but the search stopped before proving optimality
    Feasible,
    /// The problem has no feasible assignment
    Infeasible,
    /// The objective is unbounded in the optimization direction
    Unbounded,
    /// The search stopped before finding any feasible assignment
    Unknown,
}

impl SolutionStatus {
    /// True if the solution carries an assignment.
    pub fn has_assignment(self) -> bool {
        matches!(self, SolutionStatus::Optimal | SolutionStatus::Feasible)
    }
}

impl fmt::Display for SolutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SolutionStatus::Optimal => "OPTIMAL",
            SolutionStatus::Feasible => "FEASIBLE",
            SolutionStatus::Infeasible => "INFEASIBLE",
            SolutionStatus::Unbounded => "UNBOUNDED",
            SolutionStatus::Unknown => "UNKNOWN",
        })
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SolutionError {
    #[error("No assignment available: solve finished with status {0}")]
    NoAssignment(SolutionStatus),
    #[error("Variable {0} does not belong to the solved model")]
    UnknownVariable(VarId),
}

/// Counters collected during one search.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SearchStats {
    /// Search nodes entered
    pub nodes: u64,
    /// Nodes cut off by the objective bound
    pub pruned: u64,
    /// Nodes proven infeasible by propagation or the relaxation
    pub infeasible: u64,
    /// Improving solutions installed
    pub incumbents: u64,
    /// Simplex pivots over all relaxations
    pub lp_iterations: u64,
    /// Wall-clock time of the solve
    pub elapsed: Duration,
}

/// The immutable result of solving a [`crate::Model`].
#[derive(Debug, Clone, Serialize)]
pub struct Solution {
    pub(crate) status: SolutionStatus,
    pub(crate) values: Vec<i64>,
    pub(crate) objective_value: Option<i64>,
    pub(crate) best_bound: Option<i64>,
    pub(crate) stats: SearchStats,
}

impl Solution {
    pub(crate) fn without_assignment(status: SolutionStatus, stats: SearchStats) -> Self {
        Self {
            status,
            values: Vec::new(),
            objective_value: None,
            best_bound: None,
            stats,
        }
    }

    pub fn status(&self) -> SolutionStatus {
        self.status
    }

    pub fn is_optimal(&self) -> bool {
        self.status == SolutionStatus::Optimal
    }

    /// True when an assignment is available.
    pub fn is_success(&self) -> bool {
        self.status.has_assignment()
    }

    /// Objective at the returned assignment; `None` unless the status is
    /// optimal or feasible.
    pub fn objective_value(&self) -> Option<i64> {
        self.objective_value
    }

    /// Best proven bound on the objective in the model's direction: a lower
    /// bound when minimizing, an upper bound when maximizing.
    pub fn best_bound(&self) -> Option<i64> {
        self.best_bound
    }

    /// Absolute distance between the objective and the best proven bound.
    /// Zero for optimal solutions.
    pub fn gap(&self) -> Option<u64> {
        match (self.objective_value, self.best_bound) {
            (Some(objective), Some(bound)) => Some(objective.abs_diff(bound)),
            _ => None,
        }
    }

    pub fn value(&self, var: VarId) -> Result<i64, SolutionError> {
        if !self.status.has_assignment() {
            return Err(SolutionError::NoAssignment(self.status));
        }
        self.values
            .get(var.index())
            .copied()
            .ok_or(SolutionError::UnknownVariable(var))
    }

    /// Values of all variables in declaration order.
    pub fn values(&self) -> Result<&[i64], SolutionError> {
        if !self.status.has_assignment() {
            return Err(SolutionError::NoAssignment(self.status));
        }
        Ok(&self.values)
    }

    pub fn stats(&self) -> &SearchStats {
        &self.stats
    }
}
