mod config;
mod domain;
mod incumbent;
mod model;
mod search;
mod simplex;
mod solution;
mod store;

pub use config::{ConfigError, SolveConfig};
pub use model::{Comparator, Constraint, Direction, LinearExpr, Model, ModelError, Objective, VarId, Variable};
pub use search::Solver;
pub use simplex::{LpStatus, Simplex};
pub use solution::{SearchStats, Solution, SolutionError, SolutionStatus};
