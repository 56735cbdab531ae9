use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Instant;

use tracing::{debug, info, trace};

use crate::config::{ConfigError, SolveConfig};
use crate::domain::{Domains, Interval};
use crate::incumbent::SharedIncumbent;
use crate::model::{Direction, Model, saturate};
use crate::simplex::{LpStatus, Relaxation, Simplex};
use crate::solution::{SearchStats, Solution, SolutionStatus};
use crate::store::ConstraintStore;

/// Values closer than this to an integer count as integral.
const INTEGRALITY_TOLERANCE: f64 = 1e-6;

/// Relative slack applied to relaxation bounds before rounding them up.
const BOUND_TOLERANCE: f64 = 1e-9;

/// Branchings on a variable with an infinite domain allowed along one path.
const UNBOUNDED_SPLIT_LIMIT: usize = 64;

/// Exact branch-and-bound solver for integer linear programs.
///
/// A `Solver` only carries configuration. Every call to [`Solver::solve`]
/// builds a fresh search over a read-only model, so one solver can serve
/// several threads and several models.
///
/// ```
/// use allot_solver::{Comparator, LinearExpr, Model, SolutionStatus, SolveConfig, Solver};
///
/// let mut model = Model::new();
/// let x = model.add_variable(0, 10).unwrap();
/// let y = model.add_variable(0, 10).unwrap();
/// model.add_constraint(LinearExpr::sum([x, y]), Comparator::Ge, 7).unwrap();
/// model.minimize(LinearExpr::term(x, 3).with_term(y, 2)).unwrap();
///
/// let solution = Solver::new(SolveConfig::default()).unwrap().solve(&model);
/// assert_eq!(solution.status(), SolutionStatus::Optimal);
/// assert_eq!(solution.objective_value(), Some(14));
/// ```
#[derive(Debug)]
pub struct Solver {
    config: SolveConfig,
    simplex: Simplex,
    interrupt: Option<Arc<AtomicBool>>,
    pool: Option<rayon::ThreadPool>,
}

impl Solver {
    pub fn new(config: SolveConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let pool = if config.threads > 1 {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(config.threads)
                .thread_name(|i| format!("allot-worker-{i}"))
                .build()
                .map_err(|e| ConfigError::ThreadPool(e.to_string()))?;
            Some(pool)
        } else {
            None
        };
        Ok(Self {
            config,
            simplex: Simplex::default(),
            interrupt: None,
            pool,
        })
    }

    /// Stops the search at the next node boundary once `flag` becomes true.
    pub fn with_interrupt(mut self, flag: Arc<AtomicBool>) -> Self {
        self.interrupt = Some(flag);
        self
    }

    /// Replaces the simplex used for node relaxations.
    pub fn with_simplex(mut self, simplex: Simplex) -> Self {
        self.simplex = simplex;
        self
    }

    pub fn config(&self) -> &SolveConfig {
        &self.config
    }

    /// Solves `model`, blocking until the search is exhausted or a limit is hit.
    pub fn solve(&self, model: &Model) -> Solution {
        let start = Instant::now();
        info!(
            event = "solve_start",
            variables = model.num_variables(),
            constraints = model.num_constraints(),
            threads = self.config.threads,
        );

        let search = Search::new(self, model, start);
        match &self.pool {
            Some(pool) => pool.install(|| search.run()),
            None => search.run(),
        }
        let solution = search.finish(start);

        info!(
            event = "solve_end",
            status = %solution.status(),
            objective = ?solution.objective_value(),
            nodes = solution.stats().nodes,
            duration_ms = solution.stats().elapsed.as_millis() as u64,
        );
        solution
    }
}

/// One open node: its domains and the rows to propagate first.
struct Node {
    domains: Domains,
    seeds: Vec<usize>,
    depth: usize,
    /// Branchings on infinite domains between the root and this node
    unbounded_splits: usize,
}

#[derive(Debug, Clone, Copy)]
struct Path {
    depth: usize,
    unbounded_splits: usize,
}

/// State of a single solve call. Shared by reference between workers; all
/// mutable state is atomic or behind the incumbent's mutex.
struct Search<'a> {
    model: &'a Model,
    store: ConstraintStore,
    simplex: &'a Simplex,
    /// Objective coefficients in the minimization sense
    costs: Vec<i128>,
    constant: i128,
    /// `1` when minimizing, `-1` when maximizing
    sign: i128,
    incumbent: SharedIncumbent,
    root_bound: OnceLock<i64>,
    deadline: Option<Instant>,
    node_limit: Option<u64>,
    interrupt: Option<&'a AtomicBool>,
    parallel_depth: usize,
    stopped: AtomicBool,
    unbounded: AtomicBool,
    /// Some subtree was abandoned at the unbounded split limit
    incomplete: AtomicBool,
    nodes: AtomicU64,
    pruned: AtomicU64,
    infeasible: AtomicU64,
    incumbents: AtomicU64,
    lp_iterations: AtomicU64,
}

impl<'a> Search<'a> {
    fn new(solver: &'a Solver, model: &'a Model, start: Instant) -> Self {
        let sign: i128 = match model.objective().direction {
            Direction::Minimize => 1,
            Direction::Maximize => -1,
        };
        let mut merged = vec![0i128; model.num_variables()];
        for &(var, coeff) in &model.objective().expr.terms {
            merged[var.index()] += coeff as i128;
        }
        let costs = merged.into_iter().map(|c| sign * c).collect();
        let constant = sign * model.objective().expr.constant as i128;

        let parallel_depth = if solver.pool.is_some() {
            solver.config.threads.next_power_of_two().trailing_zeros() as usize + 4
        } else {
            0
        };

        Self {
            model,
            store: ConstraintStore::new(model),
            simplex: &solver.simplex,
            costs,
            constant,
            sign,
            incumbent: SharedIncumbent::new(),
            root_bound: OnceLock::new(),
            deadline: solver.config.time_limit().and_then(|limit| start.checked_add(limit)),
            node_limit: solver.config.node_limit,
            interrupt: solver.interrupt.as_deref(),
            parallel_depth,
            stopped: AtomicBool::new(false),
            unbounded: AtomicBool::new(false),
            incomplete: AtomicBool::new(false),
            nodes: AtomicU64::new(0),
            pruned: AtomicU64::new(0),
            infeasible: AtomicU64::new(0),
            incumbents: AtomicU64::new(0),
            lp_iterations: AtomicU64::new(0),
        }
    }

    fn run(&self) {
        if self.store.is_trivially_infeasible() {
            debug!(event = "trivially_infeasible");
            return;
        }
        let root = Node {
            domains: Domains::from_model(self.model),
            seeds: (0..self.store.num_rows()).collect(),
            depth: 0,
            unbounded_splits: 0,
        };
        self.explore(root);
    }

    /// Forks the children of shallow nodes onto the worker pool; deeper
    /// subtrees are searched depth-first on the current worker.
    fn explore(&self, node: Node) {
        if node.depth < self.parallel_depth {
            let mut children = self.process(node);
            match (children.pop(), children.pop()) {
                (Some(right), Some(left)) => {
                    rayon::join(|| self.explore(left), || self.explore(right));
                }
                (Some(only), None) => self.explore(only),
                _ => {}
            }
            return;
        }

        let mut stack = vec![node];
        while let Some(node) = stack.pop() {
            // Children come down branch first; push in reverse so it is popped first
            stack.extend(self.process(node).into_iter().rev());
        }
    }

    /// Evaluates one node. Returns its children, down branch first; empty for leaves.
    fn process(&self, node: Node) -> Vec<Node> {
        if self.should_stop() {
            return Vec::new();
        }
        let count = self.nodes.fetch_add(1, Ordering::Relaxed);
        if self.node_limit.is_some_and(|limit| count >= limit) {
            self.stopped.store(true, Ordering::Relaxed);
            return Vec::new();
        }

        let Node {
            mut domains,
            seeds,
            depth,
            unbounded_splits,
        } = node;

        if let Err(conflict) = domains.propagate(&self.store, seeds) {
            trace!(event = "node_infeasible", depth, row = conflict.row);
            self.infeasible.fetch_add(1, Ordering::Relaxed);
            return Vec::new();
        }

        if let Some(values) = domains.fixed_values() {
            if self.store.is_satisfied(&values) {
                self.offer(&values, depth);
            } else {
                self.infeasible.fetch_add(1, Ordering::Relaxed);
            }
            return Vec::new();
        }

        let relaxation = self.simplex.relax(&self.store, &self.costs, self.constant, &domains);
        let path = Path {
            depth,
            unbounded_splits,
        };
        self.lp_iterations
            .fetch_add(relaxation.iterations as u64, Ordering::Relaxed);

        match relaxation.status {
            LpStatus::Infeasible => {
                trace!(event = "node_infeasible", depth);
                self.infeasible.fetch_add(1, Ordering::Relaxed);
                Vec::new()
            }
            LpStatus::Unbounded => {
                debug!(event = "relaxation_unbounded", depth);
                self.unbounded.store(true, Ordering::Relaxed);
                Vec::new()
            }
            LpStatus::IterationLimit => {
                debug!(event = "relaxation_iteration_limit", depth);
                self.split_first_unfixed(domains, path)
            }
            LpStatus::Optimal => self.branch(domains, relaxation, path),
        }
    }

    fn branch(&self, domains: Domains, relaxation: Relaxation, path: Path) -> Vec<Node> {
        let depth = path.depth;
        let bound = integer_bound(relaxation.bound, relaxation.magnitude);
        if depth == 0 {
            let _ = self.root_bound.set(bound);
            debug!(event = "root_relaxation", bound = relaxation.bound, iterations = relaxation.iterations);
        }

        let upper = self.incumbent.upper_bound();
        if upper != i64::MAX && bound >= upper {
            trace!(event = "node_pruned", depth, bound, incumbent = upper);
            self.pruned.fetch_add(1, Ordering::Relaxed);
            return Vec::new();
        }

        if let Some(values) = self.round_integral(&relaxation.values, &domains) {
            self.offer(&values, depth);
            // Closed only if the slackened bound proves nothing better exists below
            if self.min_objective(&values) <= bound {
                return Vec::new();
            }
        }

        let fractional = relaxation
            .values
            .iter()
            .enumerate()
            .position(|(var, &v)| !domains.get(var).is_fixed() && (v - v.round()).abs() > INTEGRALITY_TOLERANCE);
        match fractional {
            Some(var) => {
                trace!(event = "branch", depth, var, value = relaxation.values[var]);
                let at = split_point(domains.get(var), Some(relaxation.values[var]));
                self.split(domains, var, at, path)
            }
            None => self.split_first_unfixed(domains, path),
        }
    }

    /// Splits the lowest-index unfixed domain near its middle.
    fn split_first_unfixed(&self, domains: Domains, path: Path) -> Vec<Node> {
        let Some(var) = domains.first_unfixed() else {
            return Vec::new();
        };
        let at = split_point(domains.get(var), None);
        self.split(domains, var, at, path)
    }

    /// Children `x[var] <= at` and `x[var] >= at + 1`, down branch first.
    ///
    /// Splitting an infinite domain does not shrink the search space, so
    /// such splits are counted per path. Past [`UNBOUNDED_SPLIT_LIMIT`] the
    /// node is abandoned and the solve can no longer prove optimality or
    /// infeasibility.
    fn split(&self, domains: Domains, var: usize, at: i64, path: Path) -> Vec<Node> {
        let interval = domains.get(var);
        let mut unbounded_splits = path.unbounded_splits;
        if interval.lo.is_none() || interval.hi.is_none() {
            if unbounded_splits >= UNBOUNDED_SPLIT_LIMIT {
                debug!(event = "unbounded_split_limit", depth = path.depth, var);
                self.incomplete.store(true, Ordering::Relaxed);
                return Vec::new();
            }
            unbounded_splits += 1;
        }

        let seeds = self.store.rows_of(var);
        let mut left = domains.clone();
        let mut right = domains;
        let mut children = Vec::with_capacity(2);
        if left.tighten_upper(var, at).is_ok() {
            children.push(left);
        }
        if at < i64::MAX && right.tighten_lower(var, at + 1).is_ok() {
            children.push(right);
        }
        children
            .into_iter()
            .map(|domains| Node {
                domains,
                seeds: seeds.to_vec(),
                depth: path.depth + 1,
                unbounded_splits,
            })
            .collect()
    }

    fn round_integral(&self, values: &[f64], domains: &Domains) -> Option<Vec<i64>> {
        let rounded: Vec<i64> = values
            .iter()
            .map(|&v| {
                let r = v.round();
                ((v - r).abs() <= INTEGRALITY_TOLERANCE && r.abs() < 9.0e18).then_some(r as i64)
            })
            .collect::<Option<_>>()?;
        let within = rounded
            .iter()
            .zip(domains.intervals())
            .all(|(&v, interval)| interval.contains(v));
        (within && self.store.is_satisfied(&rounded)).then_some(rounded)
    }

    fn min_objective(&self, values: &[i64]) -> i64 {
        saturate(self.sign * self.model.objective().expr.evaluate(values))
    }

    fn offer(&self, values: &[i64], depth: usize) {
        let objective = self.min_objective(values);
        if self.incumbent.try_install(objective, values) {
            self.incumbents.fetch_add(1, Ordering::Relaxed);
            debug!(
                event = "incumbent",
                objective = saturate(self.sign * objective as i128),
                depth,
                nodes = self.nodes.load(Ordering::Relaxed),
            );
        }
    }

    fn should_stop(&self) -> bool {
        if self.stopped.load(Ordering::Relaxed) || self.unbounded.load(Ordering::Relaxed) {
            return true;
        }
        let interrupted = self.interrupt.is_some_and(|flag| flag.load(Ordering::Relaxed));
        let timed_out = self.deadline.is_some_and(|deadline| Instant::now() >= deadline);
        if interrupted || timed_out {
            debug!(event = "search_stopped", interrupted, timed_out);
            self.stopped.store(true, Ordering::Relaxed);
            return true;
        }
        false
    }

    fn finish(self, start: Instant) -> Solution {
        let nodes = self.nodes.load(Ordering::Relaxed);
        let stats = SearchStats {
            nodes: self.node_limit.map_or(nodes, |limit| nodes.min(limit)),
            pruned: self.pruned.load(Ordering::Relaxed),
            infeasible: self.infeasible.load(Ordering::Relaxed),
            incumbents: self.incumbents.load(Ordering::Relaxed),
            lp_iterations: self.lp_iterations.load(Ordering::Relaxed),
            elapsed: start.elapsed(),
        };

        if self.unbounded.load(Ordering::Relaxed) {
            return Solution::without_assignment(SolutionStatus::Unbounded, stats);
        }
        let stopped = self.stopped.load(Ordering::Relaxed) || self.incomplete.load(Ordering::Relaxed);
        let root_bound = self.root_bound.get().copied();
        let model = self.model;
        let sign = self.sign;

        let Some(best) = self.incumbent.into_inner() else {
            let status = if stopped {
                SolutionStatus::Unknown
            } else {
                SolutionStatus::Infeasible
            };
            return Solution::without_assignment(status, stats);
        };

        let (status, bound) = if stopped {
            (SolutionStatus::Feasible, root_bound.map(|b| b.min(best.objective)))
        } else {
            (SolutionStatus::Optimal, Some(best.objective))
        };

        Solution {
            status,
            objective_value: Some(model.objective_value(&best.values)),
            best_bound: bound.map(|b| saturate(sign * b as i128)),
            values: best.values,
            stats,
        }
    }
}

/// Smallest integer objective compatible with a relaxation value, after
/// allowing for floating-point error proportional to `magnitude`.
fn integer_bound(relaxed: f64, magnitude: f64) -> i64 {
    let slack = INTEGRALITY_TOLERANCE + BOUND_TOLERANCE * (1.0 + relaxed.abs() + magnitude);
    let bound = (relaxed - slack).ceil();
    if bound.is_nan() {
        i64::MIN
    } else {
        bound.clamp(i64::MIN as f64, i64::MAX as f64) as i64
    }
}

/// Where to split an unfixed domain: `floor(hint)` when that leaves both
/// sides non-empty, otherwise near the middle of the domain.
fn split_point(interval: Interval, hint: Option<f64>) -> i64 {
    let hint = hint
        .filter(|h| h.is_finite())
        .map(|h| saturate(h.floor() as i128));
    match (interval.lo, interval.hi) {
        (Some(lo), Some(hi)) => hint
            .filter(|&h| h >= lo && h < hi)
            .unwrap_or_else(|| (lo as i128 + (hi as i128 - lo as i128) / 2) as i64),
        (Some(lo), None) => hint.map_or(lo, |h| h.max(lo)),
        (None, Some(hi)) => hint.map_or(hi.saturating_sub(1), |h| h.min(hi.saturating_sub(1))),
        (None, None) => hint.unwrap_or(0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Comparator, LinearExpr, VarId};
    use proptest::prelude::*;

    fn init_tracing() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    }

    fn solve(model: &Model) -> Solution {
        init_tracing();
        Solver::new(SolveConfig::default()).unwrap().solve(model)
    }

    /// Two sources with capacities {100, 150}, three sinks demanding
    /// {80, 50, 40}; returns the model and the flow variables [source][sink].
    fn power_allocation(costs: [[i64; 3]; 2], demands: [i64; 3]) -> (Model, Vec<Vec<VarId>>) {
        let capacities = [100, 150];
        let mut model = Model::new();
        let flow: Vec<Vec<VarId>> = (0..2)
            .map(|s| {
                (0..3)
                    .map(|t| model.add_named_variable(format!("flow_{s}_{t}"), 0, 200).unwrap())
                    .collect()
            })
            .collect();
        for (s, &capacity) in capacities.iter().enumerate() {
            model
                .add_constraint(LinearExpr::sum(flow[s].iter().copied()), Comparator::Le, capacity)
                .unwrap();
        }
        for (t, &demand) in demands.iter().enumerate() {
            model
                .add_constraint(LinearExpr::sum([flow[0][t], flow[1][t]]), Comparator::Eq, demand)
                .unwrap();
        }
        let objective = (0..2)
            .flat_map(|s| (0..3).map(move |t| (s, t)))
            .map(|(s, t)| (flow[s][t], costs[s][t]))
            .collect();
        model.minimize(objective).unwrap();
        (model, flow)
    }

    #[test]
    fn test_power_allocation_priced_pairs() {
        let (model, flow) = power_allocation([[10, 0, 0], [2, 0, 0]], [80, 50, 40]);
        let solution = solve(&model);

        assert_eq!(solution.status(), SolutionStatus::Optimal);
        assert_eq!(solution.objective_value(), Some(160));
        assert_eq!(solution.value(flow[1][0]), Ok(80));
        assert!(model.is_feasible(solution.values().unwrap()));
        assert_eq!(solution.gap(), Some(0));
    }

    #[test]
    fn test_power_allocation_uniform_weight() {
        let (model, flow) = power_allocation([[5; 3]; 2], [80, 50, 40]);
        let solution = solve(&model);

        assert_eq!(solution.status(), SolutionStatus::Optimal);
        assert_eq!(solution.objective_value(), Some(850));
        for (t, demand) in [80, 50, 40].into_iter().enumerate() {
            let served = solution.value(flow[0][t]).unwrap() + solution.value(flow[1][t]).unwrap();
            assert_eq!(served, demand);
        }
        for (s, capacity) in [100, 150].into_iter().enumerate() {
            let used: i64 = flow[s].iter().map(|&v| solution.value(v).unwrap()).sum();
            assert!(used <= capacity);
        }
    }

    #[test]
    fn test_demand_exceeds_supply() {
        let (model, flow) = power_allocation([[1; 3]; 2], [150, 100, 50]);
        let solution = solve(&model);

        assert_eq!(solution.status(), SolutionStatus::Infeasible);
        assert_eq!(solution.objective_value(), None);
        assert!(solution.value(flow[0][0]).is_err());
    }

    #[test]
    fn test_no_objective() {
        let (mut model, _) = power_allocation([[0; 3]; 2], [80, 50, 40]);
        model.minimize(LinearExpr::new()).unwrap();
        let solution = solve(&model);

        assert_eq!(solution.status(), SolutionStatus::Optimal);
        assert_eq!(solution.objective_value(), Some(0));
        assert!(model.is_feasible(solution.values().unwrap()));
    }

    #[test]
    fn test_knapsack_needs_branching() {
        // maximize 5a + 4b + 3c subject to 2a + 3b + c <= 5, 4a + b + 2c <= 11,
        // 3a + 4b + 2c <= 8, all in [0, 3]
        let mut model = Model::new();
        let a = model.add_variable(0, 3).unwrap();
        let b = model.add_variable(0, 3).unwrap();
        let c = model.add_variable(0, 3).unwrap();
        let rows = [([2, 3, 1], 5), ([4, 1, 2], 11), ([3, 4, 2], 8)];
        for (coeffs, rhs) in rows {
            let expr = LinearExpr::term(a, coeffs[0])
                .with_term(b, coeffs[1])
                .with_term(c, coeffs[2]);
            model.add_constraint(expr, Comparator::Le, rhs).unwrap();
        }
        model
            .maximize(LinearExpr::term(a, 5).with_term(b, 4).with_term(c, 3))
            .unwrap();

        let solution = solve(&model);
        assert_eq!(solution.status(), SolutionStatus::Optimal);
        assert_eq!(solution.objective_value(), Some(brute_force(&model).unwrap()));
    }

    #[test]
    fn test_odd_parity_is_infeasible() {
        // 2x + 2y = 7 has no integer solution but a feasible relaxation
        let mut model = Model::new();
        let x = model.add_variable(0, 10).unwrap();
        let y = model.add_variable(0, 10).unwrap();
        model
            .add_constraint(LinearExpr::term(x, 2).with_term(y, 2), Comparator::Eq, 7)
            .unwrap();
        model.minimize(LinearExpr::term(x, 1)).unwrap();

        assert_eq!(solve(&model).status(), SolutionStatus::Infeasible);
    }

    #[test]
    fn test_unbounded() {
        let mut model = Model::new();
        let x = model.add_variable_with_bounds(Some(0), None).unwrap();
        let y = model.add_variable(0, 5).unwrap();
        model
            .add_constraint(LinearExpr::term(x, 1).with_term(y, -1), Comparator::Ge, 1)
            .unwrap();
        model.maximize(LinearExpr::sum([x, y])).unwrap();

        let solution = solve(&model);
        assert_eq!(solution.status(), SolutionStatus::Unbounded);
        assert!(solution.value(x).is_err());
    }

    #[test]
    fn test_unbounded_domain_bounded_objective() {
        // x free, minimize x subject to x >= -4
        let mut model = Model::new();
        let x = model.add_variable_with_bounds(None, None).unwrap();
        model
            .add_constraint(LinearExpr::term(x, 1), Comparator::Ge, -4)
            .unwrap();
        model.minimize(LinearExpr::term(x, 1).with_constant(10)).unwrap();

        let solution = solve(&model);
        assert_eq!(solution.status(), SolutionStatus::Optimal);
        assert_eq!(solution.value(x), Ok(-4));
        assert_eq!(solution.objective_value(), Some(6));
    }

    #[test]
    fn test_trivially_infeasible_constant_constraint() {
        let mut model = Model::new();
        model.add_variable(0, 1).unwrap();
        model
            .add_constraint(LinearExpr::new().with_constant(3), Comparator::Le, 2)
            .unwrap();
        assert_eq!(solve(&model).status(), SolutionStatus::Infeasible);
    }

    #[test]
    fn test_empty_model() {
        let mut model = Model::new();
        model.minimize(LinearExpr::new().with_constant(7)).unwrap();
        let solution = solve(&model);
        assert_eq!(solution.status(), SolutionStatus::Optimal);
        assert_eq!(solution.objective_value(), Some(7));
        assert_eq!(solution.values().unwrap(), &[] as &[i64]);
    }

    #[test]
    fn test_node_limit_zero_is_unknown() {
        let (model, flow) = power_allocation([[10, 0, 0], [2, 0, 0]], [80, 50, 40]);
        let solver = Solver::new(SolveConfig::new().with_node_limit(0)).unwrap();
        let solution = solver.solve(&model);

        assert_eq!(solution.status(), SolutionStatus::Unknown);
        assert_eq!(solution.objective_value(), None);
        assert!(matches!(
            solution.value(flow[0][0]),
            Err(crate::SolutionError::NoAssignment(SolutionStatus::Unknown))
        ));
        assert_eq!(solution.stats().nodes, 0);
    }

    #[test]
    fn test_zero_time_limit_is_unknown() {
        let (model, _) = power_allocation([[1; 3]; 2], [80, 50, 40]);
        let solver = Solver::new(SolveConfig::new().with_time_limit_seconds(0.0)).unwrap();
        assert_eq!(solver.solve(&model).status(), SolutionStatus::Unknown);
    }

    #[test]
    fn test_interrupt_before_solve() {
        let (model, _) = power_allocation([[1; 3]; 2], [80, 50, 40]);
        let flag = Arc::new(AtomicBool::new(true));
        let solver = Solver::new(SolveConfig::default()).unwrap().with_interrupt(flag);
        assert_eq!(solver.solve(&model).status(), SolutionStatus::Unknown);
    }

    #[test]
    fn test_node_limit_keeps_incumbent() {
        // Many equivalent optima force a long search; the first leaf is kept.
        let mut model = Model::new();
        let vars: Vec<VarId> = (0..8).map(|_| model.add_variable(0, 1).unwrap()).collect();
        let weights = [7, 5, 9, 4, 6, 8, 3, 5];
        let expr: LinearExpr = vars.iter().zip(weights).map(|(&v, w)| (v, 2 * w)).collect();
        model.add_constraint(expr.clone(), Comparator::Le, 33).unwrap();
        model.maximize(expr).unwrap();

        let full = solve(&model);
        assert_eq!(full.status(), SolutionStatus::Optimal);
        assert_eq!(full.objective_value(), Some(32));

        let limited = Solver::new(SolveConfig::new().with_node_limit(6))
            .unwrap()
            .solve(&model);
        assert_eq!(limited.status(), SolutionStatus::Feasible);
        assert!(model.is_feasible(limited.values().unwrap()));
        assert_eq!(limited.objective_value(), Some(32));
        assert_eq!(limited.best_bound(), Some(33));
        assert_eq!(limited.gap(), Some(1));
        assert!(limited.stats().nodes <= 6);
    }

    #[test]
    fn test_large_costs_are_not_rounded_away() {
        // 2^54 and 2^54 - 1 are the same f64
        let mut model = Model::new();
        let x = model.add_variable(0, 1).unwrap();
        let y = model.add_variable(0, 1).unwrap();
        model
            .add_constraint(LinearExpr::sum([x, y]), Comparator::Ge, 1)
            .unwrap();
        let big = 1i64 << 54;
        model
            .minimize(LinearExpr::term(x, big).with_term(y, big - 1))
            .unwrap();

        let solution = solve(&model);
        assert_eq!(solution.status(), SolutionStatus::Optimal);
        assert_eq!(solution.objective_value(), Some(big - 1));
        assert_eq!(solution.values().unwrap(), &[0, 1]);
    }

    #[test]
    fn test_free_parity_terminates() {
        // 2x - 2y = 1 over free integers: the relaxation stays feasible forever
        let mut model = Model::new();
        let x = model.add_variable_with_bounds(None, None).unwrap();
        let y = model.add_variable_with_bounds(None, None).unwrap();
        model
            .add_constraint(LinearExpr::term(x, 2).with_term(y, -2), Comparator::Eq, 1)
            .unwrap();
        model
            .add_constraint(LinearExpr::term(x, 1), Comparator::Ge, 0)
            .unwrap();

        let solution = solve(&model);
        assert_eq!(solution.status(), SolutionStatus::Unknown);
        assert!(solution.value(x).is_err());
        assert!(solution.stats().nodes < 10_000);
    }

    #[test]
    fn test_parallel_matches_sequential() {
        let (model, _) = power_allocation([[10, 3, 7], [2, 6, 1]], [80, 50, 40]);
        let sequential = solve(&model);
        let parallel = Solver::new(SolveConfig::new().with_threads(4))
            .unwrap()
            .solve(&model);

        assert_eq!(parallel.status(), SolutionStatus::Optimal);
        assert_eq!(parallel.objective_value(), sequential.objective_value());
        assert!(model.is_feasible(parallel.values().unwrap()));
    }

    #[test]
    fn test_concurrent_solves_are_independent() {
        let (model, _) = power_allocation([[10, 0, 0], [2, 0, 0]], [80, 50, 40]);
        let solver = Solver::new(SolveConfig::default()).unwrap();
        std::thread::scope(|scope| {
            let handles: Vec<_> = (0..4).map(|_| scope.spawn(|| solver.solve(&model))).collect();
            for handle in handles {
                assert_eq!(handle.join().unwrap().objective_value(), Some(160));
            }
        });
    }

    #[test]
    fn test_split_point() {
        assert_eq!(split_point(Interval::new(0, 10), None), 5);
        assert_eq!(split_point(Interval::new(0, 10), Some(7.5)), 7);
        assert_eq!(split_point(Interval::new(0, 10), Some(10.0)), 5);
        assert_eq!(split_point(Interval { lo: Some(3), hi: None }, None), 3);
        assert_eq!(split_point(Interval { lo: None, hi: Some(3) }, None), 2);
        assert_eq!(split_point(Interval { lo: None, hi: None }, Some(-2.5)), -3);
    }

    #[test]
    fn test_integer_bound() {
        assert_eq!(integer_bound(4.0, 4.0), 4);
        assert_eq!(integer_bound(4.0000000001, 4.0), 4);
        assert_eq!(integer_bound(4.2, 4.2), 5);
        assert_eq!(integer_bound(-4.2, 4.2), -4);
        assert_eq!(integer_bound(f64::NEG_INFINITY, f64::INFINITY), i64::MIN);
        // f64 cannot tell 2^54 - 1 from 2^54; the bound must stay below both
        let large = (1i64 << 54) as f64;
        assert!(integer_bound(large, large) < (1i64 << 54) - 1);
    }

    /// Exhaustive optimum over the (finite) box of the model.
    fn brute_force(model: &Model) -> Option<i64> {
        let bounds: Vec<(i64, i64)> = model
            .variables()
            .iter()
            .map(|v| (v.lower.unwrap(), v.upper.unwrap()))
            .collect();
        let maximize = model.objective().direction == Direction::Maximize;
        let mut values: Vec<i64> = bounds.iter().map(|b| b.0).collect();
        let mut best: Option<i64> = None;
        loop {
            if model.is_feasible(&values) {
                let objective = model.objective_value(&values);
                best = Some(match best {
                    None => objective,
                    Some(b) if maximize => b.max(objective),
                    Some(b) => b.min(objective),
                });
            }
            let mut k = 0;
            loop {
                if k == values.len() {
                    return best;
                }
                if values[k] < bounds[k].1 {
                    values[k] += 1;
                    break;
                }
                values[k] = bounds[k].0;
                k += 1;
            }
        }
    }

    fn small_model() -> impl Strategy<Value = Model> {
        let variables = prop::collection::vec((-3i64..=2, 0i64..=4), 1..=4);
        variables.prop_flat_map(|bounds| {
            let n = bounds.len();
            let constraint = (
                prop::collection::vec(-3i64..=3, n),
                prop_oneof![Just(Comparator::Le), Just(Comparator::Ge), Just(Comparator::Eq)],
                -6i64..=6,
            );
            (
                Just(bounds),
                prop::collection::vec(constraint, 0..=3),
                prop::collection::vec(-5i64..=5, n),
                any::<bool>(),
            )
                .prop_map(|(bounds, constraints, objective, maximize)| {
                    let mut model = Model::new();
                    let vars: Vec<VarId> = bounds
                        .iter()
                        .map(|&(lo, width)| model.add_variable(lo, lo + width).unwrap())
                        .collect();
                    for (coeffs, op, rhs) in constraints {
                        let expr = vars.iter().copied().zip(coeffs).collect();
                        model.add_constraint(expr, op, rhs).unwrap();
                    }
                    let expr: LinearExpr = vars.iter().copied().zip(objective).collect();
                    let direction = if maximize {
                        Direction::Maximize
                    } else {
                        Direction::Minimize
                    };
                    model.set_objective(expr, direction).unwrap();
                    model
                })
        })
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(200))]

        #[test]
        fn optimum_matches_brute_force(model in small_model()) {
            let solution = Solver::new(SolveConfig::default()).unwrap().solve(&model);
            match brute_force(&model) {
                Some(best) => {
                    prop_assert_eq!(solution.status(), SolutionStatus::Optimal);
                    prop_assert_eq!(solution.objective_value(), Some(best));
                    let values = solution.values().unwrap();
                    prop_assert!(model.is_feasible(values));
                    prop_assert_eq!(model.objective_value(values), best);
                }
                None => prop_assert_eq!(solution.status(), SolutionStatus::Infeasible),
            }
        }

        #[test]
        fn solving_twice_is_idempotent(model in small_model()) {
            let solver = Solver::new(SolveConfig::default()).unwrap();
            let first = solver.solve(&model);
            let second = solver.solve(&model);
            prop_assert_eq!(first.status(), second.status());
            prop_assert_eq!(first.objective_value(), second.objective_value());
        }
    }
}
