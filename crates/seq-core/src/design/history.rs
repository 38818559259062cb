//! Validated analysis history.
//!
//! A [`History`] holds the information times, statistics and working-clock
//! costs of every analysis performed so far, with the origin `(0, 0)` stored
//! at index 0. All engines recompute their state from a `History`; nothing is
//! carried between calls.

use serde::Serialize;
use seq_common::{Error, Result};

/// One analysis of a [`History`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Analysis {
    /// 1-based analysis number.
    pub index: usize,
    pub time: f64,
    pub stat: f64,
    /// Working-clock time (equals `time` unless costs were supplied).
    pub cost: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct History {
    times: Vec<f64>,
    stats: Vec<f64>,
    costs: Vec<f64>,
}

impl History {
    /// History with no analyses yet, for planning before the first look.
    pub fn origin() -> Self {
        Self {
            times: vec![0.0],
            stats: vec![0.0],
            costs: vec![0.0],
        }
    }

    /// Validate times and statistics. Costs default to the times.
    pub fn new(times: &[f64], stats: &[f64]) -> Result<Self> {
        Self::with_costs(times, stats, None)
    }

    /// Validate times, statistics and an optional working clock.
    ///
    /// A leading `(0, 0)` pair is accepted and dropped. Times and costs must be
    /// finite, positive and strictly increasing; statistics must be finite.
    pub fn with_costs(times: &[f64], stats: &[f64], costs: Option<&[f64]>) -> Result<Self> {
        if times.len() != stats.len() {
            return Err(Error::LengthMismatch {
                left: "times",
                left_len: times.len(),
                right: "stats",
                right_len: stats.len(),
            });
        }
        if let Some(costs) = costs {
            if costs.len() != times.len() {
                return Err(Error::LengthMismatch {
                    left: "times",
                    left_len: times.len(),
                    right: "costs",
                    right_len: costs.len(),
                });
            }
        }

        let skip = usize::from(times.first() == Some(&0.0));
        if skip == 1 {
            if stats[0] != 0.0 {
                return Err(Error::InvalidSchedule(format!(
                    "an analysis at time 0 must have statistic 0 (got {})",
                    stats[0]
                )));
            }
            if let Some(costs) = costs {
                if costs[0] != 0.0 {
                    return Err(Error::InvalidSchedule(format!(
                        "an analysis at time 0 must have cost 0 (got {})",
                        costs[0]
                    )));
                }
            }
        }

        let mut history = Self::origin();
        for i in skip..times.len() {
            let cost = costs.map_or(times[i], |c| c[i]);
            history.push(times[i], stats[i], cost)?;
        }
        Ok(history)
    }

    /// Append one analysis after validating it against the last one.
    pub fn push(&mut self, time: f64, stat: f64, cost: f64) -> Result<()> {
        let index = self.analyses() + 1;
        if !time.is_finite() || time <= self.last_time() {
            return Err(Error::InvalidSchedule(format!(
                "time {time} at analysis {index} must be finite and exceed {}",
                self.last_time()
            )));
        }
        if !stat.is_finite() {
            return Err(Error::invalid(
                "stats",
                format!("statistic at analysis {index} is not finite"),
            ));
        }
        if !cost.is_finite() || cost <= self.last_cost() {
            return Err(Error::InvalidSchedule(format!(
                "cost {cost} at analysis {index} must be finite and exceed {}",
                self.last_cost()
            )));
        }
        self.times.push(time);
        self.stats.push(stat);
        self.costs.push(cost);
        Ok(())
    }

    /// Number of analyses, excluding the origin.
    pub fn analyses(&self) -> usize {
        self.times.len() - 1
    }

    pub fn is_empty(&self) -> bool {
        self.analyses() == 0
    }

    pub fn last_time(&self) -> f64 {
        self.times[self.times.len() - 1]
    }

    pub fn last_stat(&self) -> f64 {
        self.stats[self.stats.len() - 1]
    }

    pub fn last_cost(&self) -> f64 {
        self.costs[self.costs.len() - 1]
    }

    /// Analyses in order, excluding the origin.
    pub fn iter(&self) -> impl Iterator<Item = Analysis> + '_ {
        (1..self.times.len()).map(move |i| Analysis {
            index: i,
            time: self.times[i],
            stat: self.stats[i],
            cost: self.costs[i],
        })
    }

    /// The first `n` analyses.
    pub fn truncated(&self, n: usize) -> Self {
        let end = (n + 1).min(self.times.len());
        Self {
            times: self.times[..end].to_vec(),
            stats: self.stats[..end].to_vec(),
            costs: self.costs[..end].to_vec(),
        }
    }

    /// The path re-centered at drift `theta`: `x_j - theta * t_j`.
    pub fn shifted(&self, theta: f64) -> Self {
        Self {
            times: self.times.clone(),
            stats: self
                .times
                .iter()
                .zip(&self.stats)
                .map(|(t, x)| x - theta * t)
                .collect(),
            costs: self.costs.clone(),
        }
    }

    pub fn times(&self) -> &[f64] {
        &self.times[1..]
    }

    pub fn stats(&self) -> &[f64] {
        &self.stats[1..]
    }

    pub fn costs(&self) -> &[f64] {
        &self.costs[1..]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prepends_origin_and_drops_explicit_zero() {
        let h = History::new(&[0.0, 1.0, 2.5], &[0.0, 0.4, 1.1]).unwrap();
        assert_eq!(h.analyses(), 2);
        assert_eq!(h.times(), &[1.0, 2.5]);
        assert_eq!(h.costs(), &[1.0, 2.5]);
        let first = h.iter().next().unwrap();
        assert_eq!(first.index, 1);
        assert_eq!(first.stat, 0.4);
    }

    #[test]
    fn rejects_non_increasing_times() {
        let err = History::new(&[1.0, 1.0], &[0.1, 0.2]).unwrap_err();
        assert_eq!(err.code(), 11);
        let err = History::new(&[2.0, 1.0], &[0.1, 0.2]).unwrap_err();
        assert!(matches!(err, Error::InvalidSchedule(_)));
        let err = History::new(&[-1.0], &[0.1]).unwrap_err();
        assert!(matches!(err, Error::InvalidSchedule(_)));
    }

    #[test]
    fn rejects_nonzero_origin_statistic() {
        assert!(History::new(&[0.0, 1.0], &[0.3, 0.2]).is_err());
    }

    #[test]
    fn rejects_length_mismatch_and_nan() {
        assert!(matches!(
            History::new(&[1.0, 2.0], &[0.1]).unwrap_err(),
            Error::LengthMismatch { .. }
        ));
        assert!(matches!(
            History::with_costs(&[1.0], &[0.1], Some(&[1.0, 2.0])).unwrap_err(),
            Error::LengthMismatch { right: "costs", .. }
        ));
        assert!(History::new(&[1.0], &[f64::NAN]).is_err());
        assert!(History::new(&[f64::INFINITY], &[0.0]).is_err());
    }

    #[test]
    fn costs_must_increase() {
        assert!(History::with_costs(&[1.0, 2.0], &[0.0, 0.0], Some(&[1.0, 1.0])).is_err());
        let h = History::with_costs(&[1.0, 2.0], &[0.0, 0.0], Some(&[0.5, 3.0])).unwrap();
        assert_eq!(h.last_cost(), 3.0);
    }

    #[test]
    fn shift_and_truncate() {
        let h = History::new(&[1.0, 2.0, 4.0], &[1.0, 3.0, 2.0]).unwrap();
        let s = h.shifted(0.5);
        assert_eq!(s.stats(), &[0.5, 2.0, 0.0]);
        let t = h.truncated(2);
        assert_eq!(t.analyses(), 2);
        assert_eq!(t.last_time(), 2.0);
    }

    #[test]
    fn origin_is_empty() {
        let h = History::origin();
        assert!(h.is_empty());
        assert_eq!(h.last_time(), 0.0);
        assert_eq!(h.iter().count(), 0);
    }
}
