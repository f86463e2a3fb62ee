//! Group comparison
//!
//! Compares participant-level metrics between the clinical and the typical group
//! with Welch's two-sample t-test (unequal variances).

use crate::config::PipelineConfig;
use crate::types::{Metric, ParticipantId, ParticipantSummary};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::f64::consts::PI;

/// Group membership of one participant, as listed in the participant metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParticipantClass {
    #[serde(rename = "ParticipantID")]
    pub participant: ParticipantId,
    #[serde(rename = "Class")]
    pub class: String,
}

/// Result of Welch's t-test
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WelchTest {
    pub t_statistic: f64,
    pub degrees_of_freedom: f64,
    /// Two-tailed p-value
    pub p_value: f64,
}

/// Comparison of one metric between the two groups
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricComparison {
    pub metric: Metric,
    pub clinical_mean: Option<f64>,
    pub typical_mean: Option<f64>,
    pub clinical_n: usize,
    pub typical_n: usize,
    /// `None` when either group is too small or has no spread
    pub test: Option<WelchTest>,
    /// `***`, `**`, `*` or empty
    pub significance: String,
}

impl MetricComparison {
    pub fn p_value(&self) -> Option<f64> {
        self.test.map(|t| t.p_value)
    }

    pub fn is_significant(&self) -> bool {
        !self.significance.is_empty()
    }
}

/// Two-group comparison over all metrics
pub struct GroupComparison;

impl GroupComparison {
    /// Compare every metric between the clinical and typical groups.
    ///
    /// Participants without a class, or with a class matching neither label,
    /// are ignored. Missing metric values are dropped per metric.
    pub fn compare(
        summaries: &[ParticipantSummary],
        classes: &[ParticipantClass],
        config: &PipelineConfig,
    ) -> Vec<MetricComparison> {
        let class_of: HashMap<ParticipantId, &str> = classes
            .iter()
            .map(|c| (c.participant, c.class.trim()))
            .collect();

        Metric::ALL
            .iter()
            .map(|&metric| {
                let mut clinical = Vec::new();
                let mut typical = Vec::new();
                for summary in summaries {
                    let Some(value) = metric.value_of(summary) else {
                        continue;
                    };
                    match class_of.get(&summary.participant) {
                        Some(&class) if class == config.clinical_label => clinical.push(value),
                        Some(&class) if class == config.typical_label => typical.push(value),
                        _ => {}
                    }
                }

                let test = welch_t_test(&clinical, &typical);
                let significance = test
                    .map(|t| significance_stars(t.p_value, &config.significance_levels))
                    .unwrap_or("")
                    .to_string();

                MetricComparison {
                    metric,
                    clinical_mean: mean(&clinical),
                    typical_mean: mean(&typical),
                    clinical_n: clinical.len(),
                    typical_n: typical.len(),
                    test,
                    significance,
                }
            })
            .collect()
    }
}

/// Stars for a p-value given descending thresholds `[*, **, ***]`
pub fn significance_stars(p_value: f64, levels: &[f64; 3]) -> &'static str {
    if p_value < levels[2] {
        "***"
    } else if p_value < levels[1] {
        "**"
    } else if p_value < levels[0] {
        "*"
    } else {
        ""
    }
}

/// Welch's t-test; needs at least two values per group and non-zero spread
pub fn welch_t_test(a: &[f64], b: &[f64]) -> Option<WelchTest> {
    if a.len() < 2 || b.len() < 2 {
        return None;
    }
    let (n1, n2) = (a.len() as f64, b.len() as f64);
    let (m1, m2) = (mean(a)?, mean(b)?);
    let se1 = sample_variance(a, m1) / n1;
    let se2 = sample_variance(b, m2) / n2;
    let se = se1 + se2;
    if se <= 0.0 {
        return None;
    }

    let t_statistic = (m1 - m2) / se.sqrt();
    let degrees_of_freedom = se.powi(2) / (se1.powi(2) / (n1 - 1.0) + se2.powi(2) / (n2 - 1.0));
    let p_value = student_t_two_tailed(t_statistic, degrees_of_freedom);

    Some(WelchTest {
        t_statistic,
        degrees_of_freedom,
        p_value,
    })
}

/// P(|T| >= |t|) for Student's t with `df` degrees of freedom
pub fn student_t_two_tailed(t: f64, df: f64) -> f64 {
    let x = df / (df + t * t);
    regularized_incomplete_beta(x, df / 2.0, 0.5).clamp(0.0, 1.0)
}

fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

fn sample_variance(values: &[f64], mean: f64) -> f64 {
    values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (values.len() as f64 - 1.0)
}

/// Regularized incomplete beta function I_x(a, b)
fn regularized_incomplete_beta(x: f64, a: f64, b: f64) -> f64 {
    if x <= 0.0 {
        return 0.0;
    }
    if x >= 1.0 {
        return 1.0;
    }

    let ln_front = ln_gamma(a + b) - ln_gamma(a) - ln_gamma(b) + a * x.ln() + b * (1.0 - x).ln();
    let front = ln_front.exp();

    // The continued fraction converges fast only below the mean; use symmetry above it
    if x < (a + 1.0) / (a + b + 2.0) {
        front * beta_continued_fraction(x, a, b) / a
    } else {
        1.0 - front * beta_continued_fraction(1.0 - x, b, a) / b
    }
}

/// Lentz evaluation of the incomplete beta continued fraction
fn beta_continued_fraction(x: f64, a: f64, b: f64) -> f64 {
    const MAX_ITERATIONS: usize = 300;
    const EPSILON: f64 = 3.0e-14;
    const TINY: f64 = 1.0e-300;

    let guard = |v: f64| if v.abs() < TINY { TINY } else { v };

    let qab = a + b;
    let qap = a + 1.0;
    let qam = a - 1.0;
    let mut c = 1.0;
    let mut d = 1.0 / guard(1.0 - qab * x / qap);
    let mut h = d;

    for m in 1..=MAX_ITERATIONS {
        let m = m as f64;
        let m2 = 2.0 * m;

        let even = m * (b - m) * x / ((qam + m2) * (a + m2));
        d = 1.0 / guard(1.0 + even * d);
        c = guard(1.0 + even / c);
        h *= d * c;

        let odd = -(a + m) * (qab + m) * x / ((a + m2) * (qap + m2));
        d = 1.0 / guard(1.0 + odd * d);
        c = guard(1.0 + odd / c);
        let delta = d * c;
        h *= delta;

        if (delta - 1.0).abs() < EPSILON {
            break;
        }
    }
    h
}

/// Lanczos approximation (g = 7) of ln Γ(x)
#[allow(clippy::excessive_precision)]
fn ln_gamma(x: f64) -> f64 {
    const G: f64 = 7.0;
    const COEFFICIENTS: [f64; 9] = [
        0.999_999_999_999_809_93,
        676.520_368_121_885_1,
        -1_259.139_216_722_402_8,
        771.323_428_777_653_13,
        -176.615_029_162_140_59,
        12.507_343_278_686_905,
        -0.138_571_095_265_720_12,
        9.984_369_578_019_571_6e-6,
        1.505_632_735_149_311_6e-7,
    ];

    if x < 0.5 {
        // Reflection formula
        return (PI / (PI * x).sin()).ln() - ln_gamma(1.0 - x);
    }

    let x = x - 1.0;
    let t = x + G + 0.5;
    let series = COEFFICIENTS
        .iter()
        .enumerate()
        .skip(1)
        .fold(COEFFICIENTS[0], |acc, (i, c)| acc + c / (x + i as f64));

    0.5 * (2.0 * PI).ln() + (x + 0.5) * t.ln() - t + series.ln()
}
