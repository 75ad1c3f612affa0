//! One-tailed two-sample t-test against historical statistics.

use crate::models::FieldStatistics;

/// Added to the t-statistic denominator so identical constant samples do not
/// divide by zero.
pub const T_TEST_EPSILON: f64 = 1e-4;

const LANCZOS_G: f64 = 7.0;
const LANCZOS_COEFFICIENTS: [f64; 9] = [
    0.999_999_999_999_809_9,
    676.520_368_121_885_1,
    -1_259.139_216_722_402_8,
    771.323_428_777_653_1,
    -176.615_029_162_140_6,
    12.507_343_278_686_905,
    -0.138_571_095_265_720_12,
    9.984_369_578_019_572e-6,
    1.505_632_735_149_311_6e-7,
];

const BETA_CF_MAX_ITERATIONS: usize = 10_000;
const BETA_CF_EPSILON: f64 = 1e-15;
const BETA_CF_FLOOR: f64 = 1e-300;

/// p-value of `x` (historical) against `y` (batch), or `None` when the
/// statistic is undefined.
///
/// Pooled standard deviation over `n1 + n2 - 2`, t-statistic scaled by
/// `sqrt(2 / (n1 + n2))`, degrees of freedom `2 (n1 + n2) - 2`, and
/// `p = 1 - T_cdf(t, df)`. The degrees of freedom intentionally differ from
/// the textbook `n1 + n2 - 2` so results stay comparable with the persisted
/// history. A missing standard deviation counts as NaN.
pub fn t_test(x: &FieldStatistics, y: &FieldStatistics) -> Option<f64> {
    let n1 = x.sample_count as f64;
    let n2 = y.sample_count as f64;
    let std1 = x.std.unwrap_or(f64::NAN);
    let std2 = y.std.unwrap_or(f64::NAN);

    let pooled = (((n1 - 1.0) * std1.powi(2) + (n2 - 1.0) * std2.powi(2)) / (n1 + n2 - 2.0)).sqrt();
    let t = (x.mean - y.mean) / (pooled * (2.0 / (n1 + n2)).sqrt() + T_TEST_EPSILON);
    let df = 2.0 * (n1 + n2) - 2.0;

    if t.is_nan() {
        return None;
    }
    let p = 1.0 - student_t_cdf(t, df);
    if p.is_nan() {
        None
    } else {
        Some(p)
    }
}

/// CDF of Student's t distribution with `df` degrees of freedom.
pub fn student_t_cdf(t: f64, df: f64) -> f64 {
    if t.is_nan() || df.is_nan() || df <= 0.0 {
        return f64::NAN;
    }
    if t == f64::INFINITY {
        return 1.0;
    }
    if t == f64::NEG_INFINITY {
        return 0.0;
    }
    let x = df / (df + t * t);
    let tail = 0.5 * regularized_incomplete_beta(df / 2.0, 0.5, x);
    if t > 0.0 {
        1.0 - tail
    } else {
        tail
    }
}

/// Natural log of the gamma function (Lanczos approximation).
pub fn ln_gamma(x: f64) -> f64 {
    if x < 0.5 {
        // Reflection formula.
        let pi = std::f64::consts::PI;
        return (pi / (pi * x).sin()).ln() - ln_gamma(1.0 - x);
    }
    let x = x - 1.0;
    let mut a = LANCZOS_COEFFICIENTS[0];
    let t = x + LANCZOS_G + 0.5;
    for (i, coefficient) in LANCZOS_COEFFICIENTS.iter().enumerate().skip(1) {
        a += coefficient / (x + i as f64);
    }
    0.5 * (2.0 * std::f64::consts::PI).ln() + (x + 0.5) * t.ln() - t + a.ln()
}

/// Regularized incomplete beta function `I_x(a, b)`.
pub fn regularized_incomplete_beta(a: f64, b: f64, x: f64) -> f64 {
    if x <= 0.0 {
        return 0.0;
    }
    if x >= 1.0 {
        return 1.0;
    }
    let ln_front = ln_gamma(a + b) - ln_gamma(a) - ln_gamma(b) + a * x.ln() + b * (1.0 - x).ln();
    let front = ln_front.exp();
    // The continued fraction converges quickly only below the mean of the
    // distribution; use the symmetry I_x(a, b) = 1 - I_{1-x}(b, a) above it.
    if x < (a + 1.0) / (a + b + 2.0) {
        front * beta_continued_fraction(a, b, x) / a
    } else {
        1.0 - front * beta_continued_fraction(b, a, 1.0 - x) / b
    }
}

/// Modified Lentz evaluation of the incomplete beta continued fraction.
fn beta_continued_fraction(a: f64, b: f64, x: f64) -> f64 {
    let qab = a + b;
    let qap = a + 1.0;
    let qam = a - 1.0;

    let floor = |v: f64| if v.abs() < BETA_CF_FLOOR { BETA_CF_FLOOR } else { v };

    let mut c = 1.0;
    let mut d = 1.0 / floor(1.0 - qab * x / qap);
    let mut h = d;

    for m in 1..=BETA_CF_MAX_ITERATIONS {
        let m = m as f64;
        let m2 = 2.0 * m;

        let aa = m * (b - m) * x / ((qam + m2) * (a + m2));
        d = 1.0 / floor(1.0 + aa * d);
        c = floor(1.0 + aa / c);
        h *= d * c;

        let aa = -(a + m) * (qab + m) * x / ((a + m2) * (qap + m2));
        d = 1.0 / floor(1.0 + aa * d);
        c = floor(1.0 + aa / c);
        let delta = d * c;
        h *= delta;

        if (delta - 1.0).abs() < BETA_CF_EPSILON {
            break;
        }
    }
    h
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn moments(sample_count: u64, std: Option<f64>, mean: f64) -> FieldStatistics {
        FieldStatistics {
            mean,
            std,
            min: mean,
            max: mean,
            missing_rate: 0.0,
            sample_count,
            samples_total_count: sample_count,
            sum: mean * sample_count as f64,
            sum_of_squares: 0.0,
        }
    }

    fn assert_close(actual: f64, expected: f64, tolerance: f64) {
        assert!(
            (actual - expected).abs() < tolerance,
            "expected {expected}, got {actual}"
        );
    }

    #[test]
    fn test_ln_gamma_known_values() {
        assert_close(ln_gamma(1.0), 0.0, 1e-12);
        assert_close(ln_gamma(2.0), 0.0, 1e-12);
        assert_close(ln_gamma(5.0), 24.0_f64.ln(), 1e-12);
        assert_close(ln_gamma(0.5), std::f64::consts::PI.sqrt().ln(), 1e-12);
    }

    #[test]
    fn test_student_t_cdf_known_values() {
        assert_close(student_t_cdf(0.0, 10.0), 0.5, 1e-12);
        // df = 1 is the Cauchy distribution: F(1) = 3/4.
        assert_close(student_t_cdf(1.0, 1.0), 0.75, 1e-10);
        assert_close(student_t_cdf(-1.0, 1.0), 0.25, 1e-10);
        // Two-sided 95% critical value for df = 10.
        assert_close(student_t_cdf(2.228_138_85, 10.0), 0.975, 1e-6);
        // One-sided 95% critical value for df = 30.
        assert_close(student_t_cdf(1.697_260_89, 30.0), 0.95, 1e-6);
        assert_close(student_t_cdf(-2.228_138_85, 10.0), 0.025, 1e-6);
    }

    #[test]
    fn test_student_t_cdf_large_df_approaches_normal() {
        assert_close(student_t_cdf(1.959_963_98, 1.0e4), 0.975, 1e-4);
    }

    #[test]
    fn test_student_t_cdf_is_monotone() {
        let mut previous = 0.0;
        for step in -40..=40 {
            let value = student_t_cdf(step as f64 * 0.25, 7.0);
            assert!(value >= previous);
            previous = value;
        }
    }

    #[test]
    fn test_t_test_identical_samples_is_half() {
        let x = moments(10, Some(2.0), 5.0);
        let p = t_test(&x, &x).unwrap();
        assert_close(p, 0.5, 1e-12);
    }

    #[test]
    fn test_t_test_zero_std_equal_means() {
        // Pooled std is zero, the epsilon keeps t = 0.
        let x = moments(4, Some(0.0), 3.0);
        let p = t_test(&x, &x).unwrap();
        assert_close(p, 0.5, 1e-12);
    }

    #[test]
    fn test_t_test_is_one_tailed() {
        let historical_high = moments(50, Some(1.0), 10.0);
        let batch_low = moments(50, Some(1.0), 5.0);
        // Historical mean far above the batch mean: p close to 0, fails.
        let p = t_test(&historical_high, &batch_low).unwrap();
        assert!(p < 1e-6);
        // Reversed direction: p close to 1, passes.
        let p = t_test(&batch_low, &historical_high).unwrap();
        assert!(p > 1.0 - 1e-6);
    }

    #[test]
    fn test_t_test_uses_doubled_degrees_of_freedom() {
        let x = moments(3, Some(1.0), 2.0);
        let y = moments(3, Some(1.0), 1.0);
        // s = 1, t = 1 / (sqrt(2 / 6) + 1e-4), df = 2 * 6 - 2 = 10.
        let t = 1.0 / ((2.0_f64 / 6.0).sqrt() + T_TEST_EPSILON);
        let expected = 1.0 - student_t_cdf(t, 10.0);
        assert_close(t_test(&x, &y).unwrap(), expected, 1e-15);
        assert!((expected - (1.0 - student_t_cdf(t, 4.0))).abs() > 1e-3);
    }

    #[test]
    fn test_t_test_missing_std_is_undefined() {
        let x = moments(1, None, 2.0);
        let y = moments(5, Some(1.0), 1.0);
        assert_eq!(t_test(&x, &y), None);
    }
}
