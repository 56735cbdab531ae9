use std::sync::Mutex;
use std::sync::atomic::{AtomicI64, Ordering};

/// Best assignment found so far, shared by all search workers.
///
/// The objective is kept in the minimization sense. An atomic copy serves as
/// the pruning bound and can be read without locking; the mutex-guarded
/// assignment is the source of truth and is only replaced by a strictly
/// better one.
#[derive(Debug)]
pub struct SharedIncumbent {
    /// `i64::MAX` until the first assignment is installed
    upper_bound: AtomicI64,
    solution: Mutex<Option<Incumbent>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Incumbent {
    pub objective: i64,
    pub values: Vec<i64>,
}

impl Default for SharedIncumbent {
    fn default() -> Self {
        Self::new()
    }
}

impl SharedIncumbent {
    pub fn new() -> Self {
        Self {
            upper_bound: AtomicI64::new(i64::MAX),
            solution: Mutex::new(None),
        }
    }

    /// Objective of the current incumbent, or `i64::MAX` if there is none.
    #[inline]
    pub fn upper_bound(&self) -> i64 {
        self.upper_bound.load(Ordering::Acquire)
    }

    /// Installs the candidate if it strictly improves on the incumbent.
    pub fn try_install(&self, objective: i64, values: &[i64]) -> bool {
        // Cheap rejection before taking the lock
        if objective > self.upper_bound() {
            return false;
        }

        let mut guard = self.solution.lock().unwrap_or_else(|e| e.into_inner());
        if guard.as_ref().is_some_and(|inc| objective >= inc.objective) {
            return false;
        }
        *guard = Some(Incumbent {
            objective,
            values: values.to_vec(),
        });
        self.upper_bound.store(objective, Ordering::Release);
        true
    }

    pub fn into_inner(self) -> Option<Incumbent> {
        self.solution.into_inner().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_strict_improvement_only() {
        let incumbent = SharedIncumbent::new();
        assert_eq!(incumbent.upper_bound(), i64::MAX);

        assert!(incumbent.try_install(10, &[1, 2]));
        assert!(!incumbent.try_install(10, &[3, 4]));
        assert!(!incumbent.try_install(12, &[5, 6]));
        assert!(incumbent.try_install(7, &[0, 1]));

        assert_eq!(incumbent.upper_bound(), 7);
        assert_eq!(
            incumbent.into_inner(),
            Some(Incumbent {
                objective: 7,
                values: vec![0, 1]
            })
        );
    }

    #[test]
    fn test_max_objective_can_be_installed() {
        let incumbent = SharedIncumbent::new();
        assert!(incumbent.try_install(i64::MAX, &[]));
        assert!(!incumbent.try_install(i64::MAX, &[1]));
        assert_eq!(incumbent.into_inner().map(|i| i.values), Some(vec![]));
    }

    #[test]
    fn test_concurrent_installs_keep_minimum() {
        let incumbent = Arc::new(SharedIncumbent::new());
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let incumbent = Arc::clone(&incumbent);
                thread::spawn(move || {
                    for k in (0..100).rev() {
                        incumbent.try_install(k * 8 + t, &[t]);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(incumbent.upper_bound(), 0);
        let best = Arc::try_unwrap(incumbent).unwrap().into_inner().unwrap();
        assert_eq!(best.objective, 0);
        assert_eq!(best.values, vec![0]);
    }
}
