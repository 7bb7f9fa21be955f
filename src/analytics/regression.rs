//! Ordinary least squares over a re-indexed daily price series.
//!
//! The series is indexed x = 0..k-1 oldest to newest; extrapolating past
//! k-1 yields the day-ahead trend prices.

/// A fitted linear trend `y = intercept + slope * x`.
#[derive(Debug, Clone, Copy)]
pub struct LinearTrend {
    pub slope: f64,
    pub intercept: f64,
    /// Coefficient of determination. NaN for degenerate fits (fewer than two
    /// points, or a constant series); the confidence scorer maps NaN to a
    /// neutral default, it is never propagated further.
    pub r_squared: f64,
    pub points: usize,
}

impl LinearTrend {
    /// Fit over `values` indexed oldest to newest (x = 0, 1, ..).
    pub fn fit(values: &[f64]) -> Self {
        let n = values.len();
        if n < 2 {
            return Self {
                slope: 0.0,
                intercept: values.first().copied().unwrap_or(0.0),
                r_squared: f64::NAN,
                points: n,
            };
        }

        let nf = n as f64;
        let x_mean = (nf - 1.0) / 2.0;
        let y_mean = values.iter().sum::<f64>() / nf;

        let ss_tot: f64 = values.iter().map(|&y| (y - y_mean).powi(2)).sum();
        // Constant series: rounding noise in ss_tot stays far below this
        // threshold while any real variation clears it.
        if ss_tot <= f64::EPSILON * nf * y_mean.abs().max(1.0) {
            return Self {
                slope: 0.0,
                intercept: y_mean,
                r_squared: f64::NAN,
                points: n,
            };
        }

        let mut sxx = 0.0;
        let mut sxy = 0.0;
        for (i, &y) in values.iter().enumerate() {
            let dx = i as f64 - x_mean;
            sxx += dx * dx;
            sxy += dx * (y - y_mean);
        }

        let slope = sxy / sxx;
        let intercept = y_mean - slope * x_mean;

        let ss_res: f64 = values
            .iter()
            .enumerate()
            .map(|(i, &y)| (y - (intercept + slope * i as f64)).powi(2))
            .sum();

        Self {
            slope,
            intercept,
            r_squared: 1.0 - ss_res / ss_tot,
            points: n,
        }
    }

    /// Extrapolate at position `x`. Unclamped; callers clamp prices at zero.
    #[inline]
    pub fn predict(&self, x: f64) -> f64 {
        self.intercept + self.slope * x
    }

    pub fn is_degenerate(&self) -> bool {
        self.r_squared.is_nan()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fits_a_perfect_line() {
        let values: Vec<f64> = (0..5).map(|x| 2.0 * x as f64 + 1.0).collect();
        let trend = LinearTrend::fit(&values);
        assert!((trend.slope - 2.0).abs() < 1e-12);
        assert!((trend.intercept - 1.0).abs() < 1e-12);
        assert!((trend.r_squared - 1.0).abs() < 1e-12);
        assert_eq!(trend.points, 5);
        assert!((trend.predict(10.0) - 21.0).abs() < 1e-12);
    }

    #[test]
    fn fits_a_noisy_series() {
        // Hand-checked: slope 0.6, intercept 1.1, r² 0.9.
        let trend = LinearTrend::fit(&[1.0, 2.0, 2.0, 3.0]);
        assert!((trend.slope - 0.6).abs() < 1e-12);
        assert!((trend.intercept - 1.1).abs() < 1e-12);
        assert!((trend.r_squared - 0.9).abs() < 1e-12);
    }

    #[test]
    fn constant_series_is_degenerate() {
        let trend = LinearTrend::fit(&[42.0; 20]);
        assert_eq!(trend.slope, 0.0);
        assert!((trend.intercept - 42.0).abs() < 1e-9);
        assert!(trend.r_squared.is_nan());
        assert!(trend.is_degenerate());
    }

    #[test]
    fn short_series_is_degenerate() {
        let single = LinearTrend::fit(&[7.5]);
        assert_eq!(single.slope, 0.0);
        assert!((single.intercept - 7.5).abs() < 1e-12);
        assert!(single.r_squared.is_nan());

        let empty = LinearTrend::fit(&[]);
        assert_eq!(empty.points, 0);
        assert_eq!(empty.slope, 0.0);
        assert!(empty.r_squared.is_nan());
    }

    #[test]
    fn sawtooth_series_fits_flat() {
        let values = [
            100.0, 101.0, 99.0, 102.0, 98.0, 103.0, 97.0, 104.0, 96.0, 105.0,
            95.0, 106.0, 94.0, 107.0,
        ];
        let trend = LinearTrend::fit(&values);
        // slope 7/65, intercept 99.8 exactly
        assert!((trend.slope - 7.0 / 65.0).abs() < 1e-12);
        assert!((trend.intercept - 99.8).abs() < 1e-9);
        assert!(trend.r_squared > 0.0 && trend.r_squared < 0.05);
        // First day past the window
        assert!((trend.predict(14.0) - (99.8 + 98.0 / 65.0)).abs() < 1e-9);
    }
}
