//! Successive shortest paths over the residual network.
//!
//! The transportation polytope is integral, so this combinatorial solver and
//! the branch-and-bound engine must agree on the optimum.

use allot_solver::SolutionStatus;
use tracing::debug;

use crate::plan::{FlowPlan, TransportOutcome};
use crate::problem::{TransportError, TransportProblem};

#[derive(Debug, Clone)]
struct Edge {
    to: usize,
    residual: i64,
    cost: i64,
    rev: usize,
}

struct Network {
    adj: Vec<Vec<Edge>>,
}

impl Network {
    fn new(nodes: usize) -> Self {
        Self {
            adj: vec![Vec::new(); nodes],
        }
    }

    /// Adds `from -> to` and its zero-capacity reverse. Returns the position of
    /// the forward edge in `adj[from]`.
    fn add_edge(&mut self, from: usize, to: usize, capacity: i64, cost: i64) -> usize {
        let forward = self.adj[from].len();
        let backward = self.adj[to].len();
        self.adj[from].push(Edge {
            to,
            residual: capacity,
            cost,
            rev: backward,
        });
        self.adj[to].push(Edge {
            to: from,
            residual: 0,
            cost: -cost,
            rev: forward,
        });
        forward
    }

    /// Bellman-Ford from `source`. Returns the predecessor edge of every
    /// reachable node as `(node, edge index)`.
    fn shortest_paths(&self, source: usize) -> Vec<Option<(usize, usize)>> {
        let n = self.adj.len();
        let mut dist = vec![i128::MAX; n];
        let mut pred = vec![None; n];
        dist[source] = 0;

        for _ in 0..n {
            let mut changed = false;
            for u in 0..n {
                if dist[u] == i128::MAX {
                    continue;
                }
                for (i, e) in self.adj[u].iter().enumerate() {
                    if e.residual <= 0 {
                        continue;
                    }
                    let candidate = dist[u] + e.cost as i128;
                    if candidate < dist[e.to] {
                        dist[e.to] = candidate;
                        pred[e.to] = Some((u, i));
                        changed = true;
                    }
                }
            }
            if !changed {
                break;
            }
        }
        pred
    }

    fn flow_on(&self, from: usize, edge: usize) -> i64 {
        let e = &self.adj[from][edge];
        self.adj[e.to][e.rev].residual
    }
}

impl TransportProblem {
    /// Solves the problem as a minimum cost flow instead of an integer program.
    ///
    /// Reports `Optimal` with a plan or `Infeasible` when the demand cannot be
    /// routed.
    pub fn min_cost_flow(&self) -> Result<TransportOutcome, TransportError> {
        self.validate()?;
        let routes = self.routes()?;
        let m = self.sources.len();
        let n = self.sinks.len();
        let source = 0;
        let sink = m + n + 1;

        let mut net = Network::new(m + n + 2);
        for (i, s) in self.sources.iter().enumerate() {
            net.add_edge(source, 1 + i, s.capacity, 0);
        }
        for (j, t) in self.sinks.iter().enumerate() {
            net.add_edge(1 + m + j, sink, t.demand, 0);
        }
        let handles: Vec<usize> = routes
            .iter()
            .map(|r| net.add_edge(1 + r.source, 1 + m + r.sink, r.capacity, r.cost))
            .collect();

        let required = self.total_demand();
        let mut shipped = 0i128;
        let mut augmentations = 0usize;
        while shipped < required {
            let pred = net.shortest_paths(source);
            if pred[sink].is_none() {
                break;
            }

            let mut bottleneck = i64::try_from(required - shipped).unwrap_or(i64::MAX);
            let mut node = sink;
            while let Some((from, edge)) = pred[node] {
                bottleneck = bottleneck.min(net.adj[from][edge].residual);
                node = from;
            }

            let mut node = sink;
            while let Some((from, edge)) = pred[node] {
                let rev = net.adj[from][edge].rev;
                net.adj[from][edge].residual -= bottleneck;
                net.adj[node][rev].residual += bottleneck;
                node = from;
            }
            shipped += bottleneck as i128;
            augmentations += 1;
        }

        debug!(
            event = "min_cost_flow",
            shipped = %shipped,
            required = %required,
            augmentations,
        );

        if shipped < required {
            return Ok(TransportOutcome {
                status: SolutionStatus::Infeasible,
                plan: None,
            });
        }

        let amounts = routes
            .iter()
            .zip(&handles)
            .map(|(route, &edge)| (*route, net.flow_on(1 + route.source, edge)));
        let source_names: Vec<String> = self.sources.iter().map(|s| s.name.clone()).collect();
        let sink_names: Vec<String> = self.sinks.iter().map(|s| s.name.clone()).collect();
        Ok(TransportOutcome {
            status: SolutionStatus::Optimal,
            plan: Some(FlowPlan::from_amounts(amounts, &source_names, &sink_names)),
        })
    }
}
