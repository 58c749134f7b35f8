//! The cubic spline smoothing kernel in three dimensions.

use crate::prelude::Float;

const COEFF_1: Float = 8.0 / std::f64::consts::PI;
const COEFF_2: Float = 48.0 / std::f64::consts::PI;

/// W(r, h) for the cubic spline.
pub fn kernel(r: Float, h: Float) -> Float {
    let u = r / h;
    let hinv3 = 1.0 / (h * h * h);
    if u < 0.5 {
        COEFF_1 * hinv3 * (1.0 - 6.0 * u * u + 6.0 * u * u * u)
    } else if u < 1.0 {
        let t = 1.0 - u;
        COEFF_1 * hinv3 * 2.0 * t * t * t
    } else {
        0.0
    }
}

/// dW/dr for the cubic spline.
pub fn kernel_derivative(r: Float, h: Float) -> Float {
    let u = r / h;
    let hinv4 = 1.0 / (h * h * h * h);
    if u < 0.5 {
        COEFF_2 * hinv4 * u * (3.0 * u - 2.0)
    } else if u < 1.0 {
        let t = 1.0 - u;
        -COEFF_2 * hinv4 * t * t
    } else {
        0.0
    }
}

/// dW/dh at fixed r.
pub fn kernel_dh(r: Float, h: Float) -> Float {
    // W = h^-3 f(r/h), so dW/dh = -(3 W + r dW/dr) / h
    -(3.0 * kernel(r, h) + r * kernel_derivative(r, h)) / h
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kernel_is_normalized() {
        // integrate 4 pi r^2 W(r, h) dr
        let h = 1.7;
        let n = 10000;
        let dr = h / n as Float;
        let mut sum = 0.0;
        for i in 0..n {
            let r = (i as Float + 0.5) * dr;
            sum += 4.0 * std::f64::consts::PI * r * r * kernel(r, h) * dr;
        }
        assert!((sum - 1.0).abs() < 1e-4, "{}", sum);
    }

    #[test]
    fn kernel_has_compact_support() {
        assert_eq!(kernel(1.01, 1.0), 0.0);
        assert_eq!(kernel_derivative(1.01, 1.0), 0.0);
        assert!(kernel(0.99, 1.0) > 0.0);
    }

    #[test]
    fn derivative_matches_finite_difference() {
        let h = 1.3;
        for r in [0.1, 0.3, 0.6, 0.9] {
            let eps = 1e-7;
            let fd = (kernel(r + eps, h) - kernel(r - eps, h)) / (2.0 * eps);
            assert!((fd - kernel_derivative(r, h)).abs() < 1e-4);
            let fdh = (kernel(r, h + eps) - kernel(r, h - eps)) / (2.0 * eps);
            assert!((fdh - kernel_dh(r, h)).abs() < 1e-3);
        }
    }
}
