//! Finite-difference Hessians and asymptotic standard errors.
//!
//! For a maximized log-likelihood `ℓ(θ)`, the asymptotic covariance of the
//! estimate is `(-H)^{-1}` where `H` is the Hessian of `ℓ` at `θ̂`. `H` comes from
//! `finitediff` (central differences of central-difference gradients) and is
//! inverted with nalgebra.
//!
//! `finitediff` moves every coordinate by the same fixed amount. Differencing
//! happens in coordinates `u` with `θ = θ̂ + c ⊙ u`, where `c` maps that fixed
//! amount onto a step proportional to each `|θ_i|`.

use finitediff::FiniteDiff;
use nalgebra::DMatrix;

/// Relative step for the finite differences.
const REL_STEP: f64 = 1e-4;
/// Absolute floor for the step so parameters near zero still move.
const MIN_STEP: f64 = 1e-6;

fn step_for(x: f64) -> f64 {
    (REL_STEP * x.abs()).max(MIN_STEP)
}

/// Hessian of `f` at `theta`.
///
/// Tries central differences first and falls back to forward differences on `f`
/// itself. Returns `None` if `f(theta)` or every estimate is non-finite.
pub fn numerical_hessian<F>(f: F, theta: &[f64]) -> Option<DMatrix<f64>>
where
    F: Fn(&[f64]) -> f64,
{
    let k = theta.len();
    if !f(theta).is_finite() {
        return None;
    }
    let unit = f64::EPSILON.sqrt();
    let c: Vec<f64> = theta.iter().map(|&x| step_for(x) / unit).collect();

    let at = |u: &Vec<f64>| -> Vec<f64> {
        theta
            .iter()
            .zip(&c)
            .zip(u)
            .map(|((t, ci), ui)| t + ci * ui)
            .collect()
    };
    let value = |u: &Vec<f64>| f(at(u).as_slice());
    let gradient = |u: &Vec<f64>| u.central_diff(&value);

    let origin = vec![0.0_f64; k];
    let h_u = to_matrix(&origin.central_hessian(&gradient), k)
        .or_else(|| to_matrix(&origin.forward_hessian_nograd(&value), k))?;

    let h = DMatrix::from_fn(k, k, |i, j| h_u[(i, j)] / (c[i] * c[j]));
    Some((&h + h.transpose()) * 0.5)
}

fn to_matrix(rows: &[Vec<f64>], k: usize) -> Option<DMatrix<f64>> {
    if rows.len() != k || rows.iter().any(|r| r.len() != k) {
        return None;
    }
    let m = DMatrix::from_fn(k, k, |i, j| rows[i][j]);
    m.iter().all(|v| v.is_finite()).then_some(m)
}

/// Asymptotic covariance `(-H)^{-1}` for a log-likelihood maximized at `theta`.
///
/// Returns `None` when the Hessian cannot be inverted or the diagonal is not
/// strictly positive.
pub fn covariance<F>(loglik: F, theta: &[f64]) -> Option<DMatrix<f64>>
where
    F: Fn(&[f64]) -> f64,
{
    let h = numerical_hessian(loglik, theta)?;
    let cov = (-h).try_inverse()?;
    cov.diagonal()
        .iter()
        .all(|v| v.is_finite() && *v > 0.0)
        .then_some(cov)
}

/// Standard errors `sqrt(diag((-H)^{-1}))`.
pub fn standard_errors<F>(loglik: F, theta: &[f64]) -> Option<Vec<f64>>
where
    F: Fn(&[f64]) -> f64,
{
    let cov = covariance(loglik, theta)?;
    Some(cov.diagonal().iter().map(|v| v.sqrt()).collect())
}

/// Delta method: standard errors of `g(θ)` given `cov(θ)` and the Jacobian of `g`.
pub fn delta_standard_errors(cov: &DMatrix<f64>, jacobian: &DMatrix<f64>) -> Option<Vec<f64>> {
    if jacobian.ncols() != cov.nrows() || !cov.is_square() {
        return None;
    }
    let mapped = jacobian * cov * jacobian.transpose();
    mapped
        .diagonal()
        .iter()
        .map(|v| (v.is_finite() && *v >= 0.0).then(|| v.sqrt()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hessian_of_quadratic_is_exact() {
        // f(x, y) = -(2x^2 + xy + 3y^2)
        let f = |t: &[f64]| -(2.0 * t[0] * t[0] + t[0] * t[1] + 3.0 * t[1] * t[1]);
        let h = numerical_hessian(f, &[0.3, -0.2]).unwrap();
        assert!((h[(0, 0)] + 4.0).abs() < 1e-4);
        assert!((h[(0, 1)] + 1.0).abs() < 1e-4);
        assert!((h[(1, 1)] + 6.0).abs() < 1e-4);
        assert_eq!(h[(0, 1)], h[(1, 0)]);
    }

    #[test]
    fn hessian_handles_parameters_of_different_magnitude() {
        // curvature -2e6 in a tiny intercept, -2 in a unit-sized coefficient
        let f = |t: &[f64]| -1e6 * (t[0] - 1e-3).powi(2) - (t[1] - 0.9).powi(2);
        let h = numerical_hessian(f, &[1e-3, 0.9]).unwrap();
        assert!((h[(0, 0)] / -2e6 - 1.0).abs() < 1e-3, "h00={}", h[(0, 0)]);
        assert!((h[(1, 1)] + 2.0).abs() < 1e-3, "h11={}", h[(1, 1)]);
    }

    #[test]
    fn standard_errors_of_gaussian_mean() {
        // ℓ(μ) = -Σ (x_i - μ)^2 / 2 with unit variance => se(μ) = 1/sqrt(n).
        let xs: Vec<f64> = (0..100).map(|i| (i as f64) * 0.01).collect();
        let ll = |t: &[f64]| -xs.iter().map(|x| (x - t[0]).powi(2)).sum::<f64>() / 2.0;
        let se = standard_errors(ll, &[0.495]).unwrap();
        assert!((se[0] - 0.1).abs() < 1e-4, "se={}", se[0]);
    }

    #[test]
    fn flat_likelihood_has_no_standard_errors() {
        let se = standard_errors(|_t: &[f64]| 1.0, &[0.0, 1.0]);
        assert!(se.is_none());
    }

    #[test]
    fn delta_method_picks_up_covariance() {
        // g(a, b) = a - 2b with var(a) = 1, var(b) = 0.25, cov(a, b) = 0.2
        let cov = DMatrix::from_row_slice(2, 2, &[1.0, 0.2, 0.2, 0.25]);
        let jac = DMatrix::from_row_slice(2, 2, &[1.0, -2.0, 0.0, 1.0]);
        let se = delta_standard_errors(&cov, &jac).unwrap();
        // 1 + 4 * 0.25 - 4 * 0.2 = 1.2
        assert!((se[0] - 1.2f64.sqrt()).abs() < 1e-12);
        assert!((se[1] - 0.5).abs() < 1e-12);
    }
}
