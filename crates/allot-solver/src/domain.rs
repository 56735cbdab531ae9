use std::collections::VecDeque;

use crate::model::Model;
use crate::store::{ConstraintStore, Sense};

/// Inclusive integer interval; `None` is an infinite end.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Interval {
    pub lo: Option<i64>,
    pub hi: Option<i64>,
}

impl Interval {
    #[cfg(test)]
    pub fn new(lo: i64, hi: i64) -> Self {
        Self {
            lo: Some(lo),
            hi: Some(hi),
        }
    }

    pub fn fixed_value(&self) -> Option<i64> {
        match (self.lo, self.hi) {
            (Some(lo), Some(hi)) if lo == hi => Some(lo),
            _ => None,
        }
    }

    pub fn is_fixed(&self) -> bool {
        self.fixed_value().is_some()
    }

    pub fn contains(&self, value: i64) -> bool {
        self.lo.is_none_or(|lo| value >= lo) && self.hi.is_none_or(|hi| value <= hi)
    }
}

/// A domain became empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EmptyDomain;

/// Row index whose bounds could not be satisfied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Conflict {
    pub row: usize,
}

/// Current domains of all variables at one search node.
///
/// Every node of the search tree owns its own copy; domains only ever shrink
/// along a branch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Domains {
    intervals: Vec<Interval>,
}

impl Domains {
    pub fn from_model(model: &Model) -> Self {
        Self {
            intervals: model
                .variables()
                .iter()
                .map(|v| Interval {
                    lo: v.lower,
                    hi: v.upper,
                })
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.intervals.len()
    }

    pub fn get(&self, var: usize) -> Interval {
        self.intervals[var]
    }

    pub fn intervals(&self) -> &[Interval] {
        &self.intervals
    }

    /// Values of all variables if every domain is a single point.
    pub fn fixed_values(&self) -> Option<Vec<i64>> {
        self.intervals.iter().map(Interval::fixed_value).collect()
    }

    /// Lowest-index variable whose domain is not a single point.
    pub fn first_unfixed(&self) -> Option<usize> {
        self.intervals.iter().position(|i| !i.is_fixed())
    }

    /// Lowers the upper bound of `var`. Returns `Ok(true)` if the domain changed
    /// and `Err(EmptyDomain)` if it became empty.
    pub fn tighten_upper(&mut self, var: usize, hi: i64) -> Result<bool, EmptyDomain> {
        let interval = &mut self.intervals[var];
        if interval.lo.is_some_and(|lo| hi < lo) {
            return Err(EmptyDomain);
        }
        if interval.hi.is_some_and(|cur| cur <= hi) {
            return Ok(false);
        }
        interval.hi = Some(hi);
        Ok(true)
    }

    /// Raises the lower bound of `var`. See [`Domains::tighten_upper`].
    pub fn tighten_lower(&mut self, var: usize, lo: i64) -> Result<bool, EmptyDomain> {
        let interval = &mut self.intervals[var];
        if interval.hi.is_some_and(|hi| lo > hi) {
            return Err(EmptyDomain);
        }
        if interval.lo.is_some_and(|cur| cur >= lo) {
            return Ok(false);
        }
        interval.lo = Some(lo);
        Ok(true)
    }

    /// Bound propagation to a fixpoint, starting from `seeds` and re-queueing
    /// the rows of every variable whose domain shrinks.
    ///
    /// The number of row visits is capped; stopping early keeps the domains
    /// sound, only less tight.
    pub fn propagate<I>(&mut self, store: &ConstraintStore, seeds: I) -> Result<(), Conflict>
    where
        I: IntoIterator<Item = usize>,
    {
        let mut queued = vec![false; store.num_rows()];
        let mut queue = VecDeque::new();
        for row in seeds {
            if !queued[row] {
                queued[row] = true;
                queue.push_back(row);
            }
        }

        let mut budget = 64 * (store.num_rows() + 1);
        let mut changed = Vec::new();
        while let Some(row) = queue.pop_front() {
            queued[row] = false;
            if budget == 0 {
                break;
            }
            budget -= 1;

            changed.clear();
            self.propagate_row(store, row, 1, &mut changed)
                .map_err(|_| Conflict { row })?;
            if store.row(row).sense == Sense::Eq {
                self.propagate_row(store, row, -1, &mut changed)
                    .map_err(|_| Conflict { row })?;
            }

            for &var in &changed {
                for &other in store.rows_of(var) {
                    if other != row && !queued[other] {
                        queued[other] = true;
                        queue.push_back(other);
                    }
                }
            }
        }
        Ok(())
    }

    /// Tightens domains from `sign * row <= sign * rhs`. Activity sums that
    /// leave the `i128` range are skipped.
    fn propagate_row(
        &mut self,
        store: &ConstraintStore,
        row: usize,
        sign: i128,
        changed: &mut Vec<usize>,
    ) -> Result<(), EmptyDomain> {
        let row = store.row(row);
        let rhs = sign * row.rhs;

        // Minimum activity over finite contributions, plus the number of
        // terms whose minimum is unbounded below.
        let mut min_activity: i128 = 0;
        let mut unbounded = 0usize;
        let mut last_unbounded = 0usize;
        for &(j, a) in &row.terms {
            match self.min_contribution(j, sign * a) {
                Some(m) => match min_activity.checked_add(m) {
                    Some(total) => min_activity = total,
                    None => return Ok(()),
                },
                None => {
                    unbounded += 1;
                    last_unbounded = j;
                }
            }
        }

        if unbounded == 0 && min_activity > rhs {
            return Err(EmptyDomain);
        }
        if unbounded > 1 {
            return Ok(());
        }

        for &(j, a) in &row.terms {
            let a = sign * a;
            let residual = if unbounded == 1 {
                if j != last_unbounded {
                    continue;
                }
                rhs.checked_sub(min_activity)
            } else {
                match self.min_contribution(j, a) {
                    Some(m) => min_activity.checked_sub(m).and_then(|rest| rhs.checked_sub(rest)),
                    None => continue,
                }
            };
            let Some(residual) = residual else {
                continue;
            };

            // a * x <= residual
            let did_change = if a > 0 {
                match narrow(div_floor(residual, a)) {
                    Narrowed::Value(hi) => self.tighten_upper(j, hi)?,
                    Narrowed::BelowRange => return Err(EmptyDomain),
                    Narrowed::AboveRange => false,
                }
            } else {
                match narrow(div_ceil(residual, a)) {
                    Narrowed::Value(lo) => self.tighten_lower(j, lo)?,
                    Narrowed::AboveRange => return Err(EmptyDomain),
                    Narrowed::BelowRange => false,
                }
            };
            if did_change {
                changed.push(j);
            }
        }
        Ok(())
    }

    /// Smallest value of `coeff * x[var]`; `None` when unbounded below or
    /// outside the `i128` range.
    fn min_contribution(&self, var: usize, coeff: i128) -> Option<i128> {
        let interval = self.intervals[var];
        let end = if coeff > 0 { interval.lo } else { interval.hi };
        end.and_then(|v| coeff.checked_mul(v as i128))
    }
}

enum Narrowed {
    Value(i64),
    BelowRange,
    AboveRange,
}

fn narrow(value: i128) -> Narrowed {
    if value < i64::MIN as i128 {
        Narrowed::BelowRange
    } else if value > i64::MAX as i128 {
        Narrowed::AboveRange
    } else {
        Narrowed::Value(value as i64)
    }
}

fn div_floor(n: i128, d: i128) -> i128 {
    let q = n / d;
    if n % d != 0 && ((n < 0) != (d < 0)) { q - 1 } else { q }
}

fn div_ceil(n: i128, d: i128) -> i128 {
    let q = n / d;
    if n % d != 0 && ((n < 0) == (d < 0)) { q + 1 } else { q }
}
