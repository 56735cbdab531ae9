use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised while building a model. These indicate a caller bug; a model
/// that produced one should be discarded.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ModelError {
    #[error("Invalid domain: lower bound {lower} exceeds upper bound {upper}")]
    InvalidDomain { lower: i64, upper: i64 },
    #[error("Unknown variable x{index} (model has {count} variables)")]
    UnknownVariable { index: usize, count: usize },
}

/// Handle to a variable owned by a [`Model`]. Handles are declaration indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct VarId(pub(crate) usize);

impl VarId {
    /// Declaration index of the variable.
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for VarId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "x{}", self.0)
    }
}

/// An integer variable with inclusive bounds. `None` means unbounded on that side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Variable {
    /// Name for diagnostics
    pub name: String,
    pub lower: Option<i64>,
    pub upper: Option<i64>,
}

impl Variable {
    pub fn contains(&self, value: i64) -> bool {
        self.lower.is_none_or(|lo| value >= lo) && self.upper.is_none_or(|hi| value <= hi)
    }
}

/// A linear expression `sum(coeff * var) + constant`.
///
/// A variable may appear in several terms; the coefficients are summed when the
/// expression is evaluated or normalized.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinearExpr {
    pub terms: Vec<(VarId, i64)>,
    pub constant: i64,
}

impl LinearExpr {
    pub fn new() -> Self {
        Self::default()
    }

    /// Expression consisting of a single term.
    pub fn term(var: VarId, coeff: i64) -> Self {
        Self {
            terms: vec![(var, coeff)],
            constant: 0,
        }
    }

    /// Sum of the given variables, each with coefficient 1.
    pub fn sum<I: IntoIterator<Item = VarId>>(vars: I) -> Self {
        vars.into_iter().map(|v| (v, 1)).collect()
    }

    pub fn add_term(&mut self, var: VarId, coeff: i64) -> &mut Self {
        self.terms.push((var, coeff));
        self
    }

    pub fn with_term(mut self, var: VarId, coeff: i64) -> Self {
        self.terms.push((var, coeff));
        self
    }

    pub fn with_constant(mut self, constant: i64) -> Self {
        self.constant = constant;
        self
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    /// Exact value of the expression for a full assignment.
    pub fn evaluate(&self, values: &[i64]) -> i128 {
        self.terms
            .iter()
            .map(|&(v, c)| c as i128 * values[v.0] as i128)
            .sum::<i128>()
            + self.constant as i128
    }
}

impl FromIterator<(VarId, i64)> for LinearExpr {
    fn from_iter<I: IntoIterator<Item = (VarId, i64)>>(iter: I) -> Self {
        Self {
            terms: iter.into_iter().collect(),
            constant: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Comparator {
    /// Less than or equal (<=)
    Le,
    /// Greater than or equal (>=)
    Ge,
    /// Equal (=)
    Eq,
}

impl Comparator {
    pub fn holds(self, lhs: i128, rhs: i128) -> bool {
        match self {
            Comparator::Le => lhs <= rhs,
            Comparator::Ge => lhs >= rhs,
            Comparator::Eq => lhs == rhs,
        }
    }
}

impl fmt::Display for Comparator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Comparator::Le => "<=",
            Comparator::Ge => ">=",
            Comparator::Eq => "=",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Constraint {
    pub expr: LinearExpr,
    pub op: Comparator,
    pub rhs: i64,
}

impl Constraint {
    pub fn is_satisfied(&self, values: &[i64]) -> bool {
        self.op.holds(self.expr.evaluate(values), self.rhs as i128)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    #[default]
    Minimize,
    Maximize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Objective {
    pub expr: LinearExpr,
    pub direction: Direction,
}

/// An integer linear program: variables, constraints and at most one objective.
///
/// The model performs no solving; hand it to a [`crate::Solver`].
#[derive(Debug, Clone, Default)]
pub struct Model {
    variables: Vec<Variable>,
    constraints: Vec<Constraint>,
    objective: Objective,
}

impl Model {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an integer variable with domain `[lower, upper]`.
    pub fn add_variable(&mut self, lower: i64, upper: i64) -> Result<VarId, ModelError> {
        self.add_variable_with_bounds(Some(lower), Some(upper))
    }

    pub fn add_named_variable(
        &mut self,
        name: impl Into<String>,
        lower: i64,
        upper: i64,
    ) -> Result<VarId, ModelError> {
        let id = self.add_variable(lower, upper)?;
        self.variables[id.0].name = name.into();
        Ok(id)
    }

    /// Adds a variable that may be unbounded on either side.
    pub fn add_variable_with_bounds(
        &mut self,
        lower: Option<i64>,
        upper: Option<i64>,
    ) -> Result<VarId, ModelError> {
        if let (Some(lower), Some(upper)) = (lower, upper) {
            if lower > upper {
                return Err(ModelError::InvalidDomain { lower, upper });
            }
        }
        let id = VarId(self.variables.len());
        self.variables.push(Variable {
            name: id.to_string(),
            lower,
            upper,
        });
        Ok(id)
    }

    pub fn add_constraint(
        &mut self,
        expr: LinearExpr,
        op: Comparator,
        rhs: i64,
    ) -> Result<(), ModelError> {
        self.check_references(&expr)?;
        self.constraints.push(Constraint { expr, op, rhs });
        Ok(())
    }

    /// Sets the objective, replacing any previous one.
    pub fn set_objective(&mut self, expr: LinearExpr, direction: Direction) -> Result<(), ModelError> {
        self.check_references(&expr)?;
        self.objective = Objective { expr, direction };
        Ok(())
    }

    pub fn minimize(&mut self, expr: LinearExpr) -> Result<(), ModelError> {
        self.set_objective(expr, Direction::Minimize)
    }

    pub fn maximize(&mut self, expr: LinearExpr) -> Result<(), ModelError> {
        self.set_objective(expr, Direction::Maximize)
    }

    fn check_references(&self, expr: &LinearExpr) -> Result<(), ModelError> {
        let count = self.variables.len();
        match expr.terms.iter().find(|(v, _)| v.0 >= count) {
            Some(&(v, _)) => Err(ModelError::UnknownVariable { index: v.0, count }),
            None => Ok(()),
        }
    }

    pub fn variables(&self) -> &[Variable] {
        &self.variables
    }

    pub fn variable(&self, var: VarId) -> Option<&Variable> {
        self.variables.get(var.0)
    }

    pub fn constraints(&self) -> &[Constraint] {
        &self.constraints
    }

    pub fn objective(&self) -> &Objective {
        &self.objective
    }

    pub fn num_variables(&self) -> usize {
        self.variables.len()
    }

    pub fn num_constraints(&self) -> usize {
        self.constraints.len()
    }

    /// Objective value of a full assignment, saturated to the `i64` range.
    pub fn objective_value(&self, values: &[i64]) -> i64 {
        saturate(self.objective.expr.evaluate(values))
    }

    /// Checks bounds and every constraint exactly.
    pub fn is_feasible(&self, values: &[i64]) -> bool {
        values.len() == self.variables.len()
            && self
                .variables
                .iter()
                .zip(values)
                .all(|(var, &value)| var.contains(value))
            && self.constraints.iter().all(|c| c.is_satisfied(values))
    }
}

pub(crate) fn saturate(value: i128) -> i64 {
    value.clamp(i64::MIN as i128, i64::MAX as i128) as i64
}
