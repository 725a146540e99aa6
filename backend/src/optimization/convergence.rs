//! Convergence detection for the policy optimizer loop (§4.14).
//!
//! Two detectors are provided: [`SimpleConvergenceDetector`] (a stability
//! window plus a hard iteration cap) and [`BootstrapConvergenceDetector`],
//! which requires three criteria — coefficient of variation, Mann-Kendall
//! trend, and regret — to all hold before declaring convergence. Floating
//! point arithmetic is confined to this module; callers only ever see the
//! boolean/enum verdicts.

use std::collections::HashMap;

/// Simple convergence detector: stability window or a hard iteration cap.
#[derive(Debug, Clone)]
pub struct SimpleConvergenceDetector {
    stability_threshold: f64,
    stability_window: usize,
    max_iterations: usize,
    improvement_threshold: f64,

    history: Vec<f64>,
    consecutive_stable: usize,
    best_metric: Option<f64>,
    converged_by_stability: bool,
    converged_by_max_iter: bool,
}

impl SimpleConvergenceDetector {
    pub fn new(
        stability_threshold: f64,
        stability_window: usize,
        max_iterations: usize,
        improvement_threshold: f64,
    ) -> Self {
        Self {
            stability_threshold,
            stability_window,
            max_iterations,
            improvement_threshold,
            history: Vec::new(),
            consecutive_stable: 0,
            best_metric: None,
            converged_by_stability: false,
            converged_by_max_iter: false,
        }
    }

    pub fn is_converged(&self) -> bool {
        self.converged_by_stability || self.converged_by_max_iter
    }

    pub fn current_iteration(&self) -> usize {
        self.history.len()
    }

    pub fn metric_history(&self) -> &[f64] {
        &self.history
    }

    pub fn best_metric(&self) -> Option<f64> {
        self.best_metric
    }

    pub fn convergence_reason(&self) -> String {
        if self.converged_by_stability {
            format!(
                "Stability achieved ({} consecutive stable iterations)",
                self.stability_window
            )
        } else if self.converged_by_max_iter {
            format!("Max iterations reached ({})", self.max_iterations)
        } else {
            "Not converged".to_string()
        }
    }

    pub fn record_metric(&mut self, metric: f64) {
        if self.best_metric.map_or(true, |b| metric < b) {
            self.best_metric = Some(metric);
        }

        if let Some(&prev) = self.history.last() {
            if Self::is_stable_change(prev, metric, self.stability_threshold) {
                self.consecutive_stable += 1;
            } else {
                self.consecutive_stable = 0;
            }
        }

        self.history.push(metric);

        if self.consecutive_stable >= self.stability_window {
            self.converged_by_stability = true;
        }
        if self.history.len() >= self.max_iterations {
            self.converged_by_max_iter = true;
        }
    }

    fn is_stable_change(prev: f64, current: f64, threshold: f64) -> bool {
        if prev == 0.0 {
            return current.abs() < threshold;
        }
        (current - prev).abs() / prev.abs() <= threshold
    }

    pub fn should_accept_improvement(&self, new_metric: f64) -> bool {
        let Some(best) = self.best_metric else {
            return true;
        };
        if new_metric >= best {
            return false;
        }
        let improvement = (best - new_metric) / best.abs();
        improvement >= self.improvement_threshold
    }

    pub fn reset(&mut self) {
        self.history.clear();
        self.consecutive_stable = 0;
        self.best_metric = None;
        self.converged_by_stability = false;
        self.converged_by_max_iter = false;
    }
}

/// Result of a Mann-Kendall trend test over a window of metric values.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MannKendallResult {
    pub s: i64,
    pub var_s: f64,
    pub z: f64,
    pub p_value: f64,
    pub has_trend: bool,
}

fn sign(x: f64) -> i64 {
    if x > 0.0 {
        1
    } else if x < 0.0 {
        -1
    } else {
        0
    }
}

/// Group sizes (> 1) of values that repeat, for the Mann-Kendall tie
/// correction. Bit-pattern keyed since `f64` has no `Eq`/`Hash`.
fn count_ties(values: &[f64]) -> Vec<usize> {
    let mut counts: HashMap<u64, usize> = HashMap::new();
    for v in values {
        *counts.entry(v.to_bits()).or_insert(0) += 1;
    }
    counts.into_values().filter(|&c| c > 1).collect()
}

fn normal_cdf(z: f64) -> f64 {
    0.5 * (1.0 + libm_erf(z / std::f64::consts::SQRT_2))
}

/// Abramowitz & Stegun 7.1.26 rational approximation of `erf`, accurate to
/// ~1.5e-7 — `std` has no `erf` and this crate does not carry `libm`/`statrs`
/// purely for a two-line normal CDF.
fn libm_erf(x: f64) -> f64 {
    let sign = if x < 0.0 { -1.0 } else { 1.0 };
    let x = x.abs();

    const A1: f64 = 0.254_829_592;
    const A2: f64 = -0.284_496_736;
    const A3: f64 = 1.421_413_741;
    const A4: f64 = -1.453_152_027;
    const A5: f64 = 1.061_405_429;
    const P: f64 = 0.327_591_1;

    let t = 1.0 / (1.0 + P * x);
    let poly = ((((A5 * t + A4) * t + A3) * t + A2) * t + A1) * t;
    sign * (1.0 - poly * (-x * x).exp())
}

/// Non-parametric test for a monotonic trend in a chronological series.
/// Robust for small samples; doesn't assume a distribution.
pub fn mann_kendall_test(values: &[f64], alpha: f64) -> MannKendallResult {
    let n = values.len();
    if n < 2 {
        return MannKendallResult {
            s: 0,
            var_s: 0.0,
            z: 0.0,
            p_value: 1.0,
            has_trend: false,
        };
    }

    let mut s: i64 = 0;
    for i in 0..n - 1 {
        for j in i + 1..n {
            s += sign(values[j] - values[i]);
        }
    }

    if n < 4 {
        let max_s = (n * (n - 1) / 2) as i64;
        let has_trend = max_s > 0 && s.unsigned_abs() as f64 >= 0.75 * max_s as f64;
        return MannKendallResult {
            s,
            var_s: 0.0,
            z: 0.0,
            p_value: if has_trend { 0.0 } else { 1.0 },
            has_trend,
        };
    }

    let n_f = n as f64;
    let var_s_base = n_f * (n_f - 1.0) * (2.0 * n_f + 5.0);
    let tie_correction: f64 = count_ties(values)
        .into_iter()
        .map(|t| {
            let t = t as f64;
            t * (t - 1.0) * (2.0 * t + 5.0)
        })
        .sum();
    let var_s = (var_s_base - tie_correction) / 18.0;

    if var_s <= 0.0 {
        return MannKendallResult {
            s,
            var_s: 0.0,
            z: 0.0,
            p_value: 1.0,
            has_trend: false,
        };
    }

    let z = if s > 0 {
        (s as f64 - 1.0) / var_s.sqrt()
    } else if s < 0 {
        (s as f64 + 1.0) / var_s.sqrt()
    } else {
        0.0
    };

    let p_value = 2.0 * (1.0 - normal_cdf(z.abs()));

    MannKendallResult {
        s,
        var_s,
        z,
        p_value,
        has_trend: p_value < alpha,
    }
}

/// Detailed diagnostics behind a [`BootstrapConvergenceDetector`] verdict.
#[derive(Debug, Clone)]
pub struct ConvergenceDiagnostics {
    pub cv: f64,
    pub cv_satisfied: bool,
    pub trend_statistic: i64,
    pub trend_p_value: f64,
    pub trend_satisfied: bool,
    pub current_cost: f64,
    pub best_cost: f64,
    pub regret: f64,
    pub regret_satisfied: bool,
    pub iteration: usize,
    pub window_values: Vec<f64>,
}

/// Convergence detector for bootstrap-evaluated optimization: all three of
/// CV, trend, and regret must hold before the sample-mean cost is deemed
/// stable enough to stop.
#[derive(Debug, Clone)]
pub struct BootstrapConvergenceDetector {
    cv_threshold: f64,
    window_size: usize,
    regret_threshold: f64,
    max_iterations: usize,
    trend_alpha: f64,

    history: Vec<f64>,
    best_metric: Option<f64>,
    converged_by_criteria: bool,
    converged_by_max_iter: bool,
}

impl BootstrapConvergenceDetector {
    pub fn new(
        cv_threshold: f64,
        window_size: usize,
        regret_threshold: f64,
        max_iterations: usize,
        trend_alpha: f64,
    ) -> Self {
        Self {
            cv_threshold,
            window_size,
            regret_threshold,
            max_iterations,
            trend_alpha,
            history: Vec::new(),
            best_metric: None,
            converged_by_criteria: false,
            converged_by_max_iter: false,
        }
    }

    /// Defaults matching the reference detector: 3% CV, a 5-iteration
    /// window, 10% regret tolerance, 25 iterations, alpha = 0.05.
    pub fn with_defaults() -> Self {
        Self::new(0.03, 5, 0.10, 25, 0.05)
    }

    pub fn is_converged(&self) -> bool {
        self.converged_by_criteria || self.converged_by_max_iter
    }

    pub fn current_iteration(&self) -> usize {
        self.history.len()
    }

    pub fn metric_history(&self) -> &[f64] {
        &self.history
    }

    pub fn best_metric(&self) -> Option<f64> {
        self.best_metric
    }

    pub fn convergence_reason(&self) -> String {
        if self.converged_by_criteria {
            "All convergence criteria satisfied (CV, trend, regret)".to_string()
        } else if self.converged_by_max_iter {
            format!("Max iterations reached ({})", self.max_iterations)
        } else {
            "Not converged".to_string()
        }
    }

    pub fn convergence_diagnostics(&self) -> ConvergenceDiagnostics {
        let window = self.window();
        let cv = self.compute_cv(&window);
        let mk_result = if window.len() >= 2 {
            Some(mann_kendall_test(&window, self.trend_alpha))
        } else {
            None
        };
        let regret = self.compute_regret();

        ConvergenceDiagnostics {
            cv,
            cv_satisfied: cv < self.cv_threshold,
            trend_statistic: mk_result.map(|r| r.s).unwrap_or(0),
            trend_p_value: mk_result.map(|r| r.p_value).unwrap_or(1.0),
            trend_satisfied: mk_result.map(|r| !r.has_trend).unwrap_or(true),
            current_cost: self.history.last().copied().unwrap_or(0.0),
            best_cost: self.best_metric.unwrap_or(0.0),
            regret,
            regret_satisfied: regret <= self.regret_threshold,
            iteration: self.history.len(),
            window_values: window,
        }
    }

    pub fn record_metric(&mut self, metric: f64) {
        if self.best_metric.map_or(true, |b| metric < b) {
            self.best_metric = Some(metric);
        }
        self.history.push(metric);

        if self.history.len() >= self.max_iterations {
            self.converged_by_max_iter = true;
            return;
        }
        if self.history.len() < self.window_size {
            return;
        }
        if self.check_all_criteria() {
            self.converged_by_criteria = true;
        }
    }

    fn window(&self) -> Vec<f64> {
        if self.history.is_empty() {
            return Vec::new();
        }
        let start = self.history.len().saturating_sub(self.window_size);
        self.history[start..].to_vec()
    }

    fn compute_cv(&self, window: &[f64]) -> f64 {
        if window.len() < 2 {
            return f64::INFINITY;
        }
        let mean = window.iter().sum::<f64>() / window.len() as f64;
        if mean == 0.0 {
            return if window.iter().all(|&v| v == 0.0) {
                0.0
            } else {
                f64::INFINITY
            };
        }
        let variance =
            window.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / window.len() as f64;
        variance.sqrt() / mean.abs()
    }

    fn compute_regret(&self) -> f64 {
        let (Some(&current), Some(best)) = (self.history.last(), self.best_metric) else {
            return 0.0;
        };
        if best == 0.0 {
            return if current == 0.0 { 0.0 } else { f64::INFINITY };
        }
        (current - best) / best.abs()
    }

    fn check_all_criteria(&self) -> bool {
        let window = self.window();

        let cv = self.compute_cv(&window);
        if cv >= self.cv_threshold {
            return false;
        }

        if mann_kendall_test(&window, self.trend_alpha).has_trend {
            return false;
        }

        self.compute_regret() <= self.regret_threshold
    }

    /// Bootstrap mode is more permissive than the stability detector: any
    /// improvement over the best seen is accepted, since the three-criteria
    /// check is what decides when to stop.
    pub fn should_accept_improvement(&self, new_metric: f64) -> bool {
        self.best_metric.map_or(true, |b| new_metric < b)
    }

    pub fn reset(&mut self) {
        self.history.clear();
        self.best_metric = None;
        self.converged_by_criteria = false;
        self.converged_by_max_iter = false;
    }
}
