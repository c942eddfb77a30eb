//! Least-squares trend over a series of measurements.

use serde::Serialize;

/// Relative slope (per step, as a fraction of the mean) treated as flat.
const STABLE_FRACTION: f64 = 0.01;

/// Direction of a fitted trend line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendDirection {
    /// Values grow over time.
    Increasing,
    /// Values shrink over time.
    Decreasing,
    /// No meaningful change.
    Stable,
}

/// Slope of the fitted line and its interpretation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Trend {
    /// Change per step of the fitted line.
    pub slope: f64,
    /// Direction derived from the slope.
    pub direction: TrendDirection,
}

/// Fits `y = a + b·x` with `x = 0, 1, 2, ...` and classifies the slope.
///
/// Returns `None` for fewer than two samples.
#[must_use]
#[expect(
    clippy::float_arithmetic,
    clippy::cast_precision_loss,
    reason = "regression over millisecond durations tolerates f64 rounding"
)]
pub fn linear_trend(samples: &[u64]) -> Option<Trend> {
    if samples.len() < 2 {
        return None;
    }

    let count = samples.len() as f64;
    let (sum_x, sum_y, sum_xy, sum_xx) = samples.iter().enumerate().fold(
        (0.0_f64, 0.0_f64, 0.0_f64, 0.0_f64),
        |(sx, sy, sxy, sxx), (index, value)| {
            let x = index as f64;
            let y = *value as f64;
            (sx + x, sy + y, sxy + x * y, sxx + x * x)
        },
    );

    let denominator = count * sum_xx - sum_x * sum_x;
    if denominator == 0.0 {
        return None;
    }
    let slope = (count * sum_xy - sum_x * sum_y) / denominator;
    let mean = sum_y / count;

    let direction = if slope.abs() <= mean.abs() * STABLE_FRACTION {
        TrendDirection::Stable
    } else if slope > 0.0 {
        TrendDirection::Increasing
    } else {
        TrendDirection::Decreasing
    };

    Some(Trend { slope, direction })
}
