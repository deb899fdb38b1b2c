//! Gradient-boosted tree classifier with integer inference
//!
//! Encoded features are floats; before they reach a tree they are converted
//! to fixed-point `i64` at [`SCALE`] (1e6). Thresholds, leaf values, tree
//! weights and the bias all live at that scale, so traversal and summation
//! are pure integer operations and reproduce exactly across platforms. Only
//! the final logistic link runs in floating point.

pub mod model;
pub mod tree;

pub use model::{contribution, Model, ModelError, SCALE};
pub use tree::{Node, Tree};

/// Convert a float to fixed-point at [`SCALE`], rounding half away from zero.
pub fn to_fixed(value: f64) -> i64 {
    let scaled = (value * SCALE as f64).round();
    if scaled.is_nan() {
        0
    } else {
        // `as` saturates at the i64 bounds
        scaled as i64
    }
}

/// Logistic function
pub fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_fixed() {
        assert_eq!(to_fixed(1.0), SCALE);
        assert_eq!(to_fixed(29.85), 29_850_000);
        assert_eq!(to_fixed(-0.5), -500_000);
        assert_eq!(to_fixed(f64::NAN), 0);
    }

    #[test]
    fn test_sigmoid_symmetry() {
        assert!((sigmoid(0.0) - 0.5).abs() < 1e-12);
        assert!((sigmoid(3.0) + sigmoid(-3.0) - 1.0).abs() < 1e-12);
    }
}
