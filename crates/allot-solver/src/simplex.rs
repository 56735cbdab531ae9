use crate::domain::Domains;
use crate::store::{ConstraintStore, Sense};

/// Comparison of a relaxation row after the right-hand side was made non-negative.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LpOp {
    Le,
    Ge,
    Eq,
}

/// A continuous LP in standard form: minimize `c.x` subject to rows, `x >= 0`.
#[derive(Debug, Clone)]
pub(crate) struct LpProblem {
    pub n_cols: usize,
    /// Cost of each column (minimized)
    pub costs: Vec<f64>,
    pub rows: Vec<LpRow>,
}

#[derive(Debug, Clone)]
pub(crate) struct LpRow {
    pub coefficients: Vec<f64>,
    pub op: LpOp,
    pub rhs: f64,
}

impl LpProblem {
    fn new(n_cols: usize) -> Self {
        Self {
            n_cols,
            costs: vec![0.0; n_cols],
            rows: Vec::new(),
        }
    }

    /// Adds a row, flipping it if needed so that the right-hand side is non-negative.
    fn push_row(&mut self, mut coefficients: Vec<f64>, mut op: LpOp, mut rhs: f64) {
        if rhs < 0.0 {
            rhs = -rhs;
            coefficients.iter_mut().for_each(|c| *c = -*c);
            op = match op {
                LpOp::Le => LpOp::Ge,
                LpOp::Ge => LpOp::Le,
                LpOp::Eq => LpOp::Eq,
            };
        }
        self.rows.push(LpRow {
            coefficients,
            op,
            rhs,
        });
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LpStatus {
    Optimal,
    Infeasible,
    Unbounded,
    /// Pivot budget exhausted before optimality was proven
    IterationLimit,
}

#[derive(Debug, Clone)]
pub(crate) struct LpSolution {
    pub status: LpStatus,
    /// Column values (meaningful when optimal)
    pub values: Vec<f64>,
    pub iterations: usize,
}

/// Two-phase primal simplex on a dense tableau.
///
/// Entering and leaving variables are chosen with Bland's rule, so degenerate
/// problems (transportation problems are highly degenerate) cannot cycle.
#[derive(Debug, Clone)]
pub struct Simplex {
    /// Maximum pivots per solve
    max_iterations: usize,
    /// Tolerance for floating point comparisons
    tolerance: f64,
}

impl Default for Simplex {
    fn default() -> Self {
        Self {
            max_iterations: 50_000,
            tolerance: 1e-9,
        }
    }
}

impl Simplex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_iterations(mut self, max: usize) -> Self {
        self.max_iterations = max;
        self
    }

    pub fn with_tolerance(mut self, tol: f64) -> Self {
        self.tolerance = tol;
        self
    }

    pub(crate) fn solve(&self, problem: &LpProblem) -> LpSolution {
        let mut tableau = Tableau::build(problem);
        let mut iterations = 0;

        if tableau.n_artificial > 0 {
            match self.phase1(&mut tableau, &mut iterations) {
                SimplexResult::Optimal => {}
                SimplexResult::IterationLimit => return LpSolution::empty(LpStatus::IterationLimit, iterations),
                // Phase 1 is bounded below by zero; anything else means no feasible point
                SimplexResult::Unbounded | SimplexResult::Infeasible => {
                    return LpSolution::empty(LpStatus::Infeasible, iterations);
                }
            }
        }

        tableau.load_objective(&problem.costs, self.tolerance);
        let status = match self.phase2(&mut tableau, &mut iterations) {
            SimplexResult::Optimal => LpStatus::Optimal,
            SimplexResult::Unbounded => LpStatus::Unbounded,
            SimplexResult::IterationLimit => LpStatus::IterationLimit,
            SimplexResult::Infeasible => LpStatus::Infeasible,
        };
        if status != LpStatus::Optimal {
            return LpSolution::empty(status, iterations);
        }

        LpSolution {
            status,
            values: tableau.column_values(problem.n_cols),
            iterations,
        }
    }

    fn phase1(&self, tableau: &mut Tableau, iterations: &mut usize) -> SimplexResult {
        // Maximize -sum(artificials); the objective row holds reduced profits.
        let obj_row = tableau.obj_row();
        let n_cols = tableau.n_cols();
        let art_start = tableau.art_start();

        tableau.data[obj_row].iter_mut().for_each(|v| *v = 0.0);
        for j in art_start..art_start + tableau.n_artificial {
            tableau.data[obj_row][j] = -1.0;
        }
        for i in 0..obj_row {
            if tableau.basic_vars[i] >= art_start {
                for j in 0..n_cols {
                    tableau.data[obj_row][j] += tableau.data[i][j];
                }
            }
        }

        match self.iterate(tableau, n_cols - 1, iterations) {
            SimplexResult::Optimal => {}
            other => return other,
        }

        let rhs_col = n_cols - 1;
        for i in 0..obj_row {
            if tableau.basic_vars[i] >= art_start && tableau.data[i][rhs_col] > self.tolerance * 1e3 {
                return SimplexResult::Infeasible;
            }
        }

        // Drive zero-level artificials out of the basis where a structural
        // column can replace them; rows where none can are redundant.
        for i in 0..obj_row {
            if tableau.basic_vars[i] >= art_start {
                let candidate = (0..art_start)
                    .map(|j| (j, tableau.data[i][j].abs()))
                    .max_by(|a, b| a.1.total_cmp(&b.1));
                if let Some((j, magnitude)) = candidate {
                    if magnitude > 1e-7 {
                        tableau.pivot(i, j);
                    }
                }
            }
        }

        SimplexResult::Optimal
    }

    fn phase2(&self, tableau: &mut Tableau, iterations: &mut usize) -> SimplexResult {
        // Artificial columns never re-enter
        let exclude_from = tableau.art_start();
        self.iterate(tableau, exclude_from, iterations)
    }

    fn iterate(&self, tableau: &mut Tableau, col_limit: usize, iterations: &mut usize) -> SimplexResult {
        loop {
            let Some(pivot_col) = self.find_pivot_column(tableau, col_limit) else {
                return SimplexResult::Optimal;
            };
            let Some(pivot_row) = self.find_pivot_row(tableau, pivot_col) else {
                return SimplexResult::Unbounded;
            };
            if *iterations >= self.max_iterations {
                return SimplexResult::IterationLimit;
            }
            *iterations += 1;
            tableau.pivot(pivot_row, pivot_col);
        }
    }

    /// Bland's rule: the lowest-index column with a positive reduced profit.
    fn find_pivot_column(&self, tableau: &Tableau, col_limit: usize) -> Option<usize> {
        let obj_row = tableau.obj_row();
        (0..col_limit).find(|&j| tableau.data[obj_row][j] > self.tolerance)
    }

    /// Minimum ratio test, ties broken by the lowest basic variable index.
    fn find_pivot_row(&self, tableau: &Tableau, col: usize) -> Option<usize> {
        let rhs_col = tableau.n_cols() - 1;
        let mut best: Option<(usize, f64)> = None;

        for i in 0..tableau.obj_row() {
            let val = tableau.data[i][col];
            if val <= self.tolerance {
                continue;
            }
            let ratio = tableau.data[i][rhs_col].max(0.0) / val;
            best = match best {
                None => Some((i, ratio)),
                Some((row, min)) => {
                    if ratio < min - self.tolerance
                        || ((ratio - min).abs() <= self.tolerance
                            && tableau.basic_vars[i] < tableau.basic_vars[row])
                    {
                        Some((i, ratio))
                    } else {
                        Some((row, min))
                    }
                }
            };
        }

        best.map(|(row, _)| row)
    }
}

struct Tableau {
    /// Constraint rows followed by the objective row; last column is the RHS
    data: Vec<Vec<f64>>,
    basic_vars: Vec<usize>,
    n_vars: usize,
    n_slack: usize,
    n_artificial: usize,
}

enum SimplexResult {
    Optimal,
    Unbounded,
    Infeasible,
    IterationLimit,
}

impl Tableau {
    fn build(problem: &LpProblem) -> Self {
        let n_vars = problem.n_cols;
        let n_constraints = problem.rows.len();

        let mut n_slack = 0;
        let mut n_artificial = 0;
        for row in &problem.rows {
            match row.op {
                LpOp::Le => n_slack += 1,
                LpOp::Ge => {
                    n_slack += 1; // surplus
                    n_artificial += 1;
                }
                LpOp::Eq => n_artificial += 1,
            }
        }

        let total_cols = n_vars + n_slack + n_artificial + 1; // +1 for RHS
        let mut tableau = Tableau {
            data: vec![vec![0.0; total_cols]; n_constraints + 1],
            basic_vars: vec![0; n_constraints],
            n_vars,
            n_slack,
            n_artificial,
        };

        let mut slack_idx = n_vars;
        let mut artificial_idx = n_vars + n_slack;
        for (i, row) in problem.rows.iter().enumerate() {
            tableau.data[i][..n_vars].copy_from_slice(&row.coefficients);
            tableau.data[i][total_cols - 1] = row.rhs;

            match row.op {
                LpOp::Le => {
                    tableau.data[i][slack_idx] = 1.0;
                    tableau.basic_vars[i] = slack_idx;
                    slack_idx += 1;
                }
                LpOp::Ge => {
                    tableau.data[i][slack_idx] = -1.0;
                    slack_idx += 1;
                    tableau.data[i][artificial_idx] = 1.0;
                    tableau.basic_vars[i] = artificial_idx;
                    artificial_idx += 1;
                }
                LpOp::Eq => {
                    tableau.data[i][artificial_idx] = 1.0;
                    tableau.basic_vars[i] = artificial_idx;
                    artificial_idx += 1;
                }
            }
        }

        tableau
    }

    fn obj_row(&self) -> usize {
        self.data.len() - 1
    }

    fn n_cols(&self) -> usize {
        self.data[0].len()
    }

    fn art_start(&self) -> usize {
        self.n_vars + self.n_slack
    }

    /// Installs the phase 2 objective (minimize `costs`, stored as maximize
    /// `-costs`) and prices out the current basis.
    fn load_objective(&mut self, costs: &[f64], tolerance: f64) {
        let obj_row = self.obj_row();
        let n_cols = self.n_cols();

        self.data[obj_row].iter_mut().for_each(|v| *v = 0.0);
        for (j, &c) in costs.iter().enumerate() {
            self.data[obj_row][j] = -c;
        }
        for i in 0..obj_row {
            let basic = self.basic_vars[i];
            let ratio = self.data[obj_row][basic];
            if ratio.abs() > tolerance {
                for j in 0..n_cols {
                    self.data[obj_row][j] -= ratio * self.data[i][j];
                }
            }
        }
    }

    fn pivot(&mut self, row: usize, col: usize) {
        let n_cols = self.n_cols();
        self.basic_vars[row] = col;

        let pivot_val = self.data[row][col];
        for j in 0..n_cols {
            self.data[row][j] /= pivot_val;
        }

        let pivot_row = self.data[row].clone();
        for (i, data_row) in self.data.iter_mut().enumerate() {
            if i == row {
                continue;
            }
            let factor = data_row[col];
            if factor != 0.0 {
                for (cell, &p) in data_row.iter_mut().zip(&pivot_row) {
                    *cell -= factor * p;
                }
            }
        }
    }

    fn column_values(&self, n_cols: usize) -> Vec<f64> {
        let rhs_col = self.n_cols() - 1;
        let mut values = vec![0.0; n_cols];
        for (i, &basic) in self.basic_vars.iter().enumerate() {
            if basic < n_cols {
                values[basic] = self.data[i][rhs_col].max(0.0);
            }
        }
        values
    }
}

impl LpSolution {
    fn empty(status: LpStatus, iterations: usize) -> Self {
        Self {
            status,
            values: Vec::new(),
            iterations,
        }
    }
}

/// How a model variable is expressed through non-negative LP columns.
#[derive(Debug, Clone, Copy)]
enum Column {
    Fixed(i64),
    /// `x = lo + y`
    Shifted { col: usize, lo: i64 },
    /// `x = hi - y`
    Mirrored { col: usize, hi: i64 },
    /// `x = p - n`
    Free { pos: usize, neg: usize },
}

/// Outcome of the continuous relaxation at one search node.
#[derive(Debug, Clone)]
pub(crate) struct Relaxation {
    pub status: LpStatus,
    /// Value of each model variable (meaningful when optimal)
    pub values: Vec<f64>,
    /// Relaxed objective in the minimization sense
    pub bound: f64,
    /// `|constant| + sum(|c_j * x_j|)`, the scale of the rounding error in `bound`
    pub magnitude: f64,
    pub iterations: usize,
}

impl Simplex {
    /// Solves the relaxation of `store` over the current `domains`, minimizing
    /// `costs . x + constant`.
    pub(crate) fn relax(
        &self,
        store: &ConstraintStore,
        costs: &[i128],
        constant: i128,
        domains: &Domains,
    ) -> Relaxation {
        let mut columns = Vec::with_capacity(domains.len());
        let mut n_cols = 0;
        for interval in domains.intervals() {
            let column = match (interval.lo, interval.hi) {
                (Some(lo), Some(hi)) if lo == hi => Column::Fixed(lo),
                (Some(lo), _) => {
                    n_cols += 1;
                    Column::Shifted { col: n_cols - 1, lo }
                }
                (None, Some(hi)) => {
                    n_cols += 1;
                    Column::Mirrored { col: n_cols - 1, hi }
                }
                (None, None) => {
                    n_cols += 2;
                    Column::Free {
                        pos: n_cols - 2,
                        neg: n_cols - 1,
                    }
                }
            };
            columns.push(column);
        }

        let mut problem = LpProblem::new(n_cols);
        let mut offset = constant as f64;
        for (j, &c) in costs.iter().enumerate() {
            offset += spread(columns[j], c as f64, &mut problem.costs);
        }

        for row in store.rows() {
            let mut coefficients = vec![0.0; n_cols];
            let mut rhs = row.rhs as f64;
            for &(j, a) in &row.terms {
                rhs -= spread(columns[j], a as f64, &mut coefficients);
            }
            let op = match row.sense {
                Sense::Le => LpOp::Le,
                Sense::Eq => LpOp::Eq,
            };
            problem.push_row(coefficients, op, rhs);
        }

        for (j, interval) in domains.intervals().iter().enumerate() {
            if let (Column::Shifted { col, lo }, Some(hi)) = (columns[j], interval.hi) {
                let mut coefficients = vec![0.0; n_cols];
                coefficients[col] = 1.0;
                problem.push_row(coefficients, LpOp::Le, (hi as f64) - (lo as f64));
            }
        }

        let lp = self.solve(&problem);
        if lp.status != LpStatus::Optimal {
            return Relaxation {
                status: lp.status,
                values: Vec::new(),
                bound: f64::NEG_INFINITY,
                magnitude: f64::INFINITY,
                iterations: lp.iterations,
            };
        }

        let values: Vec<f64> = columns
            .iter()
            .map(|&column| match column {
                Column::Fixed(v) => v as f64,
                Column::Shifted { col, lo } => lo as f64 + lp.values[col],
                Column::Mirrored { col, hi } => hi as f64 - lp.values[col],
                Column::Free { pos, neg } => lp.values[pos] - lp.values[neg],
            })
            .collect();
        let mut bound = constant as f64;
        let mut magnitude = (constant as f64).abs();
        for (&c, &x) in costs.iter().zip(&values) {
            let term = c as f64 * x;
            bound += term;
            magnitude += term.abs();
        }

        Relaxation {
            status: LpStatus::Optimal,
            values,
            bound,
            magnitude,
            iterations: lp.iterations,
        }
    }
}

/// Adds `coeff * x` expressed in columns to `target`; returns the constant part.
fn spread(column: Column, coeff: f64, target: &mut [f64]) -> f64 {
    match column {
        Column::Fixed(v) => coeff * v as f64,
        Column::Shifted { col, lo } => {
            target[col] += coeff;
            coeff * lo as f64
        }
        Column::Mirrored { col, hi } => {
            target[col] -= coeff;
            coeff * hi as f64
        }
        Column::Free { pos, neg } => {
            target[pos] += coeff;
            target[neg] -= coeff;
            0.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Comparator, LinearExpr, Model};

    fn lp(n_cols: usize, costs: Vec<f64>, rows: Vec<(Vec<f64>, LpOp, f64)>) -> LpProblem {
        let mut problem = LpProblem::new(n_cols);
        problem.costs = costs;
        for (coefficients, op, rhs) in rows {
            problem.push_row(coefficients, op, rhs);
        }
        problem
    }

    #[test]
    fn test_simple_maximization() {
        // Maximize: 3x + 2y  (minimize -3x - 2y)
        // Subject to:
        //   x + y <= 4
        //   x <= 3
        //   y <= 3
        // Optimal: x=3, y=1, obj=11
        let problem = lp(
            2,
            vec![-3.0, -2.0],
            vec![
                (vec![1.0, 1.0], LpOp::Le, 4.0),
                (vec![1.0, 0.0], LpOp::Le, 3.0),
                (vec![0.0, 1.0], LpOp::Le, 3.0),
            ],
        );

        let solution = Simplex::new().solve(&problem);

        assert_eq!(solution.status, LpStatus::Optimal);
        assert!((solution.values[0] - 3.0).abs() < 1e-6, "x = {} (expected 3)", solution.values[0]);
        assert!((solution.values[1] - 1.0).abs() < 1e-6, "y = {} (expected 1)", solution.values[1]);
    }

    #[test]
    fn test_minimization_with_ge() {
        // Minimize: 2x + 3y
        // Subject to:
        //   x + y >= 4
        //   x <= 3
        //   y <= 3
        // Optimal: x=3, y=1, obj=9
        let problem = lp(
            2,
            vec![2.0, 3.0],
            vec![
                (vec![1.0, 1.0], LpOp::Ge, 4.0),
                (vec![1.0, 0.0], LpOp::Le, 3.0),
                (vec![0.0, 1.0], LpOp::Le, 3.0),
            ],
        );

        let solution = Simplex::new().solve(&problem);

        assert_eq!(solution.status, LpStatus::Optimal);
        assert!((solution.values[0] - 3.0).abs() < 1e-6, "x = {} (expected 3)", solution.values[0]);
        assert!((solution.values[1] - 1.0).abs() < 1e-6, "y = {} (expected 1)", solution.values[1]);
    }

    #[test]
    fn test_infeasible() {
        // x >= 5, x <= 3
        let problem = lp(
            1,
            vec![1.0],
            vec![(vec![1.0], LpOp::Ge, 5.0), (vec![1.0], LpOp::Le, 3.0)],
        );
        assert_eq!(Simplex::new().solve(&problem).status, LpStatus::Infeasible);
    }

    #[test]
    fn test_unbounded() {
        // Minimize -x subject to x - y <= 1
        let problem = lp(2, vec![-1.0, 0.0], vec![(vec![1.0, -1.0], LpOp::Le, 1.0)]);
        assert_eq!(Simplex::new().solve(&problem).status, LpStatus::Unbounded);
    }

    #[test]
    fn test_negative_rhs_is_flipped() {
        // -x <= -2  ->  x >= 2; minimize x
        let problem = lp(1, vec![1.0], vec![(vec![-1.0], LpOp::Le, -2.0)]);
        let solution = Simplex::new().solve(&problem);
        assert_eq!(solution.status, LpStatus::Optimal);
        assert!((solution.values[0] - 2.0).abs() < 1e-6);
    }

    #[test]
    fn test_iteration_limit() {
        let problem = lp(
            2,
            vec![-1.0, -1.0],
            vec![(vec![1.0, 0.0], LpOp::Le, 1.0), (vec![0.0, 1.0], LpOp::Le, 1.0)],
        );
        let solution = Simplex::new().with_max_iterations(1).solve(&problem);
        assert_eq!(solution.status, LpStatus::IterationLimit);
    }

    #[test]
    fn test_redundant_equalities() {
        // x + y = 2 stated twice; minimize x
        let problem = lp(
            2,
            vec![1.0, 0.0],
            vec![
                (vec![1.0, 1.0], LpOp::Eq, 2.0),
                (vec![2.0, 2.0], LpOp::Eq, 4.0),
            ],
        );
        let solution = Simplex::new().solve(&problem);
        assert_eq!(solution.status, LpStatus::Optimal);
        assert!(solution.values[0].abs() < 1e-6);
        assert!((solution.values[1] - 2.0).abs() < 1e-6);
    }

    #[test]
    fn test_relaxation_with_bounds() {
        // minimize x - y, x in [-5, 5], y in [2, 4], x + y >= 1
        let mut model = Model::new();
        let x = model.add_variable(-5, 5).unwrap();
        let y = model.add_variable(2, 4).unwrap();
        model
            .add_constraint(LinearExpr::sum([x, y]), Comparator::Ge, 1)
            .unwrap();
        let store = ConstraintStore::new(&model);
        let domains = Domains::from_model(&model);

        let relaxation = Simplex::new().relax(&store, &[1, -1], 0, &domains);
        assert_eq!(relaxation.status, LpStatus::Optimal);
        // y = 4, x = -3
        assert!((relaxation.values[0] + 3.0).abs() < 1e-6);
        assert!((relaxation.values[1] - 4.0).abs() < 1e-6);
        assert!((relaxation.bound + 7.0).abs() < 1e-6);
    }

    #[test]
    fn test_relaxation_mirrored_and_free() {
        // maximize x (minimize -x), x <= 7 with no lower bound, z free, x + z = 3, z >= -10
        let mut model = Model::new();
        let x = model.add_variable_with_bounds(None, Some(7)).unwrap();
        let z = model.add_variable_with_bounds(None, None).unwrap();
        model
            .add_constraint(LinearExpr::sum([x, z]), Comparator::Eq, 3)
            .unwrap();
        model
            .add_constraint(LinearExpr::term(z, 1), Comparator::Ge, -10)
            .unwrap();
        let store = ConstraintStore::new(&model);
        let domains = Domains::from_model(&model);

        let relaxation = Simplex::new().relax(&store, &[-1, 0], 0, &domains);
        assert_eq!(relaxation.status, LpStatus::Optimal);
        assert!((relaxation.values[0] - 7.0).abs() < 1e-6);
        assert!((relaxation.values[1] + 4.0).abs() < 1e-6);
    }

    #[test]
    fn test_relaxation_unbounded() {
        let mut model = Model::new();
        model.add_variable_with_bounds(Some(0), None).unwrap();
        let store = ConstraintStore::new(&model);
        let domains = Domains::from_model(&model);
        let relaxation = Simplex::new().relax(&store, &[-1], 0, &domains);
        assert_eq!(relaxation.status, LpStatus::Unbounded);
    }
}
