use std::collections::{HashMap, HashSet};
use std::path::Path;

use allot_solver::{
    Comparator, ConfigError, LinearExpr, Model, ModelError, Solution, SolutionError, SolveConfig, Solver,
    VarId,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::plan::{FlowPlan, TransportOutcome};

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Duplicate source: {0}")]
    DuplicateSource(String),
    #[error("Duplicate sink: {0}")]
    DuplicateSink(String),
    #[error("Unknown source: {0}")]
    UnknownSource(String),
    #[error("Unknown sink: {0}")]
    UnknownSink(String),
    #[error("Negative capacity {value} for source {name}")]
    NegativeCapacity { name: String, value: i64 },
    #[error("Negative demand {value} for sink {name}")]
    NegativeDemand { name: String, value: i64 },
    #[error("Negative lane capacity {value} from {source_name} to {sink_name}")]
    NegativeLaneCapacity {
        source_name: String,
        sink_name: String,
        value: i64,
    },
    #[error("Model error: {0}")]
    Model(#[from] ModelError),
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

/// A supplier with finite capacity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Source {
    pub name: String,
    pub capacity: i64,
}

/// A consumer that must receive exactly its demand.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sink {
    pub name: String,
    pub demand: i64,
}

/// Per-pair overrides. Pairs without an entry use the problem's default cost.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lane {
    pub source: String,
    pub sink: String,
    /// Cost per unit; `None` keeps the default cost
    #[serde(default)]
    pub cost: Option<i64>,
    /// Upper limit on this lane's flow
    #[serde(default)]
    pub capacity: Option<i64>,
    /// No flow may use this pair
    #[serde(default)]
    pub forbidden: bool,
}

/// A transportation problem: ship from sources to sinks at minimum total cost.
///
/// ```
/// use allot_transport::TransportProblem;
/// use allot_solver::SolveConfig;
///
/// let mut problem = TransportProblem::new();
/// problem.add_source("Battery", 100).unwrap();
/// problem.add_source("Solar", 150).unwrap();
/// problem.add_sink("Thrusters", 80).unwrap();
/// problem.set_cost("Battery", "Thrusters", 10).unwrap();
/// problem.set_cost("Solar", "Thrusters", 2).unwrap();
///
/// let outcome = problem.solve(&SolveConfig::default()).unwrap();
/// assert_eq!(outcome.plan.unwrap().total_cost, 160);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TransportProblem {
    pub sources: Vec<Source>,
    pub sinks: Vec<Sink>,
    /// Cost per unit for pairs without an override
    pub default_cost: i64,
    /// Limit applied to every lane in addition to per-lane limits
    pub lane_capacity: Option<i64>,
    pub lanes: Vec<Lane>,
}

/// A lane after defaults and limits were applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Route {
    pub source: usize,
    pub sink: usize,
    pub cost: i64,
    pub capacity: i64,
}

impl TransportProblem {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_json_str(s: &str) -> Result<Self, TransportError> {
        let problem: Self = serde_json::from_str(s)?;
        problem.validate()?;
        Ok(problem)
    }

    pub fn from_toml_str(s: &str) -> Result<Self, TransportError> {
        let problem: Self = toml::from_str(s)?;
        problem.validate()?;
        Ok(problem)
    }

    /// Loads a problem from a `.json` or `.toml` file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, TransportError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Self::from_json_str(&contents),
            _ => Self::from_toml_str(&contents),
        }
    }

    pub fn with_default_cost(mut self, cost: i64) -> Self {
        self.default_cost = cost;
        self
    }

    pub fn with_lane_capacity(mut self, capacity: i64) -> Self {
        self.lane_capacity = Some(capacity);
        self
    }

    pub fn add_source(&mut self, name: impl Into<String>, capacity: i64) -> Result<usize, TransportError> {
        let name = name.into();
        if self.sources.iter().any(|s| s.name == name) {
            return Err(TransportError::DuplicateSource(name));
        }
        if capacity < 0 {
            return Err(TransportError::NegativeCapacity { name, value: capacity });
        }
        self.sources.push(Source { name, capacity });
        Ok(self.sources.len() - 1)
    }

    pub fn add_sink(&mut self, name: impl Into<String>, demand: i64) -> Result<usize, TransportError> {
        let name = name.into();
        if self.sinks.iter().any(|s| s.name == name) {
            return Err(TransportError::DuplicateSink(name));
        }
        if demand < 0 {
            return Err(TransportError::NegativeDemand { name, value: demand });
        }
        self.sinks.push(Sink { name, demand });
        Ok(self.sinks.len() - 1)
    }

    /// Sets the per-unit cost of shipping from `source` to `sink`.
    pub fn set_cost(&mut self, source: &str, sink: &str, cost: i64) -> Result<(), TransportError> {
        self.lane_mut(source, sink)?.cost = Some(cost);
        Ok(())
    }

    pub fn set_lane_capacity(&mut self, source: &str, sink: &str, capacity: i64) -> Result<(), TransportError> {
        if capacity < 0 {
            return Err(TransportError::NegativeLaneCapacity {
                source_name: source.to_string(),
                sink_name: sink.to_string(),
                value: capacity,
            });
        }
        self.lane_mut(source, sink)?.capacity = Some(capacity);
        Ok(())
    }

    /// Disallows any flow from `source` to `sink`.
    pub fn forbid(&mut self, source: &str, sink: &str) -> Result<(), TransportError> {
        self.lane_mut(source, sink)?.forbidden = true;
        Ok(())
    }

    fn lane_mut(&mut self, source: &str, sink: &str) -> Result<&mut Lane, TransportError> {
        if !self.sources.iter().any(|s| s.name == source) {
            return Err(TransportError::UnknownSource(source.to_string()));
        }
        if !self.sinks.iter().any(|s| s.name == sink) {
            return Err(TransportError::UnknownSink(sink.to_string()));
        }
        let index = match self.lanes.iter().position(|l| l.source == source && l.sink == sink) {
            Some(index) => index,
            None => {
                self.lanes.push(Lane {
                    source: source.to_string(),
                    sink: sink.to_string(),
                    cost: None,
                    capacity: None,
                    forbidden: false,
                });
                self.lanes.len() - 1
            }
        };
        Ok(&mut self.lanes[index])
    }

    pub fn total_supply(&self) -> i128 {
        self.sources.iter().map(|s| s.capacity as i128).sum()
    }

    pub fn total_demand(&self) -> i128 {
        self.sinks.iter().map(|s| s.demand as i128).sum()
    }

    /// Checks names, signs and lane references. Problems built through the
    /// `add_*` methods are always valid; deserialized ones may not be.
    pub fn validate(&self) -> Result<(), TransportError> {
        let mut seen = HashSet::new();
        for source in &self.sources {
            if !seen.insert(source.name.as_str()) {
                return Err(TransportError::DuplicateSource(source.name.clone()));
            }
            if source.capacity < 0 {
                return Err(TransportError::NegativeCapacity {
                    name: source.name.clone(),
                    value: source.capacity,
                });
            }
        }
        seen.clear();
        for sink in &self.sinks {
            if !seen.insert(sink.name.as_str()) {
                return Err(TransportError::DuplicateSink(sink.name.clone()));
            }
            if sink.demand < 0 {
                return Err(TransportError::NegativeDemand {
                    name: sink.name.clone(),
                    value: sink.demand,
                });
            }
        }
        self.routes().map(|_| ())
    }

    /// Every allowed source-sink pair with its effective cost and capacity,
    /// in source-major order.
    pub(crate) fn routes(&self) -> Result<Vec<Route>, TransportError> {
        let source_index: HashMap<&str, usize> =
            self.sources.iter().enumerate().map(|(i, s)| (s.name.as_str(), i)).collect();
        let sink_index: HashMap<&str, usize> =
            self.sinks.iter().enumerate().map(|(i, s)| (s.name.as_str(), i)).collect();

        let mut overrides: HashMap<(usize, usize), &Lane> = HashMap::new();
        for lane in &self.lanes {
            let source = *source_index
                .get(lane.source.as_str())
                .ok_or_else(|| TransportError::UnknownSource(lane.source.clone()))?;
            let sink = *sink_index
                .get(lane.sink.as_str())
                .ok_or_else(|| TransportError::UnknownSink(lane.sink.clone()))?;
            if let Some(value) = lane.capacity.filter(|&c| c < 0) {
                return Err(TransportError::NegativeLaneCapacity {
                    source_name: lane.source.clone(),
                    sink_name: lane.sink.clone(),
                    value,
                });
            }
            overrides.insert((source, sink), lane);
        }
        if let Some(value) = self.lane_capacity.filter(|&c| c < 0) {
            return Err(TransportError::NegativeLaneCapacity {
                source_name: "*".to_string(),
                sink_name: "*".to_string(),
                value,
            });
        }

        let mut routes = Vec::new();
        for (i, source) in self.sources.iter().enumerate() {
            for (j, sink) in self.sinks.iter().enumerate() {
                let lane = overrides.get(&(i, j));
                if lane.is_some_and(|l| l.forbidden) {
                    continue;
                }
                let mut capacity = source.capacity.min(sink.demand);
                if let Some(limit) = self.lane_capacity {
                    capacity = capacity.min(limit);
                }
                if let Some(limit) = lane.and_then(|l| l.capacity) {
                    capacity = capacity.min(limit);
                }
                routes.push(Route {
                    source: i,
                    sink: j,
                    cost: lane.and_then(|l| l.cost).unwrap_or(self.default_cost),
                    capacity,
                });
            }
        }
        Ok(routes)
    }

    /// Builds the integer program: one flow variable per allowed pair, supply
    /// rows `sum <= capacity`, demand rows `sum = demand`, minimum total cost.
    pub fn to_model(&self) -> Result<TransportModel, TransportError> {
        self.validate()?;
        let routes = self.routes()?;

        let mut model = Model::new();
        let mut lanes = Vec::with_capacity(routes.len());
        for route in &routes {
            let name = format!("flow_{}_{}", self.sources[route.source].name, self.sinks[route.sink].name);
            let var = model.add_named_variable(name, 0, route.capacity)?;
            lanes.push((*route, var));
        }

        for (i, source) in self.sources.iter().enumerate() {
            let expr = LinearExpr::sum(lanes.iter().filter(|(a, _)| a.source == i).map(|&(_, v)| v));
            model.add_constraint(expr, Comparator::Le, source.capacity)?;
        }
        for (j, sink) in self.sinks.iter().enumerate() {
            let expr = LinearExpr::sum(lanes.iter().filter(|(a, _)| a.sink == j).map(|&(_, v)| v));
            model.add_constraint(expr, Comparator::Eq, sink.demand)?;
        }
        model.minimize(lanes.iter().map(|&(a, v)| (v, a.cost)).collect())?;

        debug!(
            event = "transport_model",
            sources = self.sources.len(),
            sinks = self.sinks.len(),
            lanes = lanes.len(),
        );
        Ok(TransportModel {
            model,
            lanes,
            source_names: self.sources.iter().map(|s| s.name.clone()).collect(),
            sink_names: self.sinks.iter().map(|s| s.name.clone()).collect(),
        })
    }

    /// Solves with the branch-and-bound engine.
    pub fn solve(&self, config: &SolveConfig) -> Result<TransportOutcome, TransportError> {
        let transport = self.to_model()?;
        let solver = Solver::new(config.clone())?;
        let solution = solver.solve(&transport.model);
        let plan = transport.read(&solution).ok();
        Ok(TransportOutcome {
            status: solution.status(),
            plan,
        })
    }
}

/// The integer program of a [`TransportProblem`] plus the mapping back to lanes.
#[derive(Debug, Clone)]
pub struct TransportModel {
    pub model: Model,
    pub(crate) lanes: Vec<(Route, VarId)>,
    source_names: Vec<String>,
    sink_names: Vec<String>,
}

impl TransportModel {
    /// Flow variable of a pair, if the pair is allowed.
    pub fn flow_var(&self, source: &str, sink: &str) -> Option<VarId> {
        self.lanes.iter().find_map(|(route, var)| {
            (self.source_names[route.source] == source && self.sink_names[route.sink] == sink).then_some(*var)
        })
    }

    /// Reads the flow plan out of a solution of [`TransportModel::model`].
    pub fn read(&self, solution: &Solution) -> Result<FlowPlan, SolutionError> {
        let mut amounts = Vec::with_capacity(self.lanes.len());
        for &(route, var) in &self.lanes {
            amounts.push((route, solution.value(var)?));
        }
        Ok(FlowPlan::from_amounts(amounts, &self.source_names, &self.sink_names))
    }
}
