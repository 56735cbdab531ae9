//! Transportation problems: ship goods from capacitated sources to sinks with
//! exact demands at minimum total cost.
//!
//! Problems are compiled into an [`allot_solver::Model`] and solved by the
//! branch-and-bound engine, or routed directly as a minimum cost flow.

mod flow;
mod plan;
mod problem;

pub use plan::{Flow, FlowPlan, TransportOutcome};
pub use problem::{Lane, Sink, Source, TransportError, TransportModel, TransportProblem};
