//! # One-cycle schedule
//!
//! Learning rate warms up from `lr_max / div` to `lr_max`, then anneals to
//! `lr_max / final_div`, both with cosine curves. Momentum (Adam's β1)
//! moves the opposite way.

use std::f64::consts::PI;

#[derive(Debug, Clone, PartialEq)]
pub struct OneCycleSchedule {
    pub lr_max: f64,
    pub total_steps: usize,
    pub pct_start: f64,
    pub div: f64,
    pub final_div: f64,
    pub moms: (f64, f64),
}

impl OneCycleSchedule {
    pub fn new(lr_max: f64, total_steps: usize) -> Self {
        Self {
            lr_max,
            total_steps,
            pct_start: 0.3,
            div: 25.0,
            final_div: 25.0 * 1e4,
            moms: (0.95, 0.85),
        }
    }

    fn warmup_steps(&self) -> usize {
        ((self.total_steps as f64) * self.pct_start).round() as usize
    }

    /// Learning rate and β1 at `step` (0-based).
    pub fn at(&self, step: usize) -> (f64, f64) {
        let warmup = self.warmup_steps();
        let lr_start = self.lr_max / self.div;
        let lr_end = self.lr_max / self.final_div;
        let (mom_hi, mom_lo) = self.moms;

        if step < warmup {
            let pct = step as f64 / warmup as f64;
            (cos_anneal(lr_start, self.lr_max, pct), cos_anneal(mom_hi, mom_lo, pct))
        } else {
            let remaining = self.total_steps.saturating_sub(warmup).max(1);
            let pct = ((step - warmup) as f64 / remaining as f64).min(1.0);
            (cos_anneal(self.lr_max, lr_end, pct), cos_anneal(mom_lo, mom_hi, pct))
        }
    }
}

/// Cosine interpolation from `start` (pct = 0) to `end` (pct = 1).
fn cos_anneal(start: f64, end: f64, pct: f64) -> f64 {
    let cos_out = (PI * pct).cos() + 1.0;
    end + (start - end) / 2.0 * cos_out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_low_peaks_and_ends_lower() {
        let sched = OneCycleSchedule::new(1e-2, 100);
        let (lr0, mom0) = sched.at(0);
        assert!((lr0 - 1e-2 / 25.0).abs() < 1e-12);
        assert!((mom0 - 0.95).abs() < 1e-12);

        let (lr_peak, mom_peak) = sched.at(30);
        assert!((lr_peak - 1e-2).abs() < 1e-12);
        assert!((mom_peak - 0.85).abs() < 1e-12);

        let (lr_end, _) = sched.at(100);
        assert!(lr_end < lr0);
        assert!((lr_end - 1e-2 / 25e4).abs() < 1e-12);
    }

    #[test]
    fn monotone_phases() {
        let sched = OneCycleSchedule::new(1.0, 50);
        let lrs: Vec<f64> = (0..50).map(|s| sched.at(s).0).collect();
        let peak = sched.warmup_steps();
        assert!(lrs[..peak].windows(2).all(|w| w[0] <= w[1]));
        assert!(lrs[peak..].windows(2).all(|w| w[0] >= w[1]));
    }

    #[test]
    fn single_step_schedule() {
        let sched = OneCycleSchedule::new(0.1, 1);
        let (lr, _) = sched.at(0);
        assert!(lr.is_finite());
        assert!(lr > 0.0);
    }
}
