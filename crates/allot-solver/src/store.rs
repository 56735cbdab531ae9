use std::collections::BTreeMap;

use crate::model::{Comparator, Model};

/// Sense of a normalized row. `>=` rows are negated into `<=`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sense {
    Le,
    Eq,
}

/// A constraint in canonical form: `sum(coeff * x[var]) (<= | =) rhs`.
///
/// Terms are merged per variable, sorted by variable index, and never carry a
/// zero coefficient. Constants of the source expression live in `rhs`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Row {
    pub terms: Vec<(usize, i128)>,
    pub sense: Sense,
    pub rhs: i128,
}

impl Row {
    /// Exact left-hand side; `None` if it leaves the `i128` range.
    pub fn activity(&self, values: &[i64]) -> Option<i128> {
        self.terms
            .iter()
            .try_fold(0i128, |acc, &(j, a)| acc.checked_add(a.checked_mul(values[j] as i128)?))
    }

    pub fn is_satisfied(&self, values: &[i64]) -> bool {
        let Some(lhs) = self.activity(values) else {
            return false;
        };
        match self.sense {
            Sense::Le => lhs <= self.rhs,
            Sense::Eq => lhs == self.rhs,
        }
    }
}

/// Normalized constraints of a model plus, for each variable, the rows it
/// appears in.
#[derive(Debug, Clone)]
pub struct ConstraintStore {
    rows: Vec<Row>,
    occurrences: Vec<Vec<usize>>,
    trivially_infeasible: bool,
}

impl ConstraintStore {
    pub fn new(model: &Model) -> Self {
        let mut rows = Vec::with_capacity(model.num_constraints());
        let mut occurrences = vec![Vec::new(); model.num_variables()];
        let mut trivially_infeasible = false;

        for constraint in model.constraints() {
            let mut merged: BTreeMap<usize, i128> = BTreeMap::new();
            for &(var, coeff) in &constraint.expr.terms {
                *merged.entry(var.index()).or_default() += coeff as i128;
            }
            let sign: i128 = if constraint.op == Comparator::Ge { -1 } else { 1 };
            let terms: Vec<(usize, i128)> = merged
                .into_iter()
                .filter(|&(_, a)| a != 0)
                .map(|(j, a)| (j, sign * a))
                .collect();
            let rhs = sign * (constraint.rhs as i128 - constraint.expr.constant as i128);
            let sense = match constraint.op {
                Comparator::Eq => Sense::Eq,
                Comparator::Le | Comparator::Ge => Sense::Le,
            };

            if terms.is_empty() {
                let holds = match sense {
                    Sense::Le => 0 <= rhs,
                    Sense::Eq => rhs == 0,
                };
                trivially_infeasible |= !holds;
                continue;
            }

            let row = rows.len();
            for &(j, _) in &terms {
                occurrences[j].push(row);
            }
            rows.push(Row { terms, sense, rhs });
        }

        Self {
            rows,
            occurrences,
            trivially_infeasible,
        }
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn row(&self, index: usize) -> &Row {
        &self.rows[index]
    }

    /// Rows that mention variable `var`.
    pub fn rows_of(&self, var: usize) -> &[usize] {
        &self.occurrences[var]
    }

    pub fn num_rows(&self) -> usize {
        self.rows.len()
    }

    /// True if some constraint without variables is violated.
    pub fn is_trivially_infeasible(&self) -> bool {
        self.trivially_infeasible
    }

    pub fn is_satisfied(&self, values: &[i64]) -> bool {
        !self.trivially_infeasible && self.rows.iter().all(|r| r.is_satisfied(values))
    }
}
