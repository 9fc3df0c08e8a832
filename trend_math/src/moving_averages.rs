//! Trailing moving average
//!
//! Unlike a classic SMA the window shrinks near the start of the series, so the
//! output has one value per input and no leading gaps.

use crate::{round_to, MathError, Result};

/// Trailing average of `values[max(0, i - window + 1)..=i]` for every index, rounded to 2 decimals
pub fn moving_average(values: &[f64], window: usize) -> Result<Vec<f64>> {
    if window == 0 {
        return Err(MathError::InvalidInput(
            "Window must be greater than zero".to_string(),
        ));
    }

    let mut averages = Vec::with_capacity(values.len());
    let mut sum = 0.0;

    for (i, &value) in values.iter().enumerate() {
        sum += value;

        // Drop the value that slid out of the window
        if i >= window {
            sum -= values[i - window];
        }

        let len = (i + 1).min(window);
        averages.push(round_to(sum / len as f64, 2));
    }

    Ok(averages)
}
