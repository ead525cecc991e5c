//! Gaussian-process surrogate used to rank offspring by expected improvement.

use crate::error::{Result, SynrouteError};
use crate::types::Fingerprint;
use log::debug;

const MAX_JITTER_TRIES: usize = 6;

/// Exact GP regression with an RBF kernel and a zero prior mean.
pub struct GaussianProcess {
    train: Vec<Vec<f64>>,
    /// Lower Cholesky factor of K + noise * I.
    chol: Vec<Vec<f64>>,
    /// (K + noise * I)^-1 y
    alpha: Vec<f64>,
    length_scale: f64,
}

impl GaussianProcess {
    pub fn fit(
        history: &[(Fingerprint, f64)],
        length_scale: f64,
        noise: f64,
        max_history: usize,
    ) -> Result<Self> {
        let start = history.len().saturating_sub(max_history.max(1));
        let recent = &history[start..];
        if recent.is_empty() {
            return Err(SynrouteError::Validation(
                "Cannot fit a surrogate without history".to_string(),
            ));
        }
        let train: Vec<Vec<f64>> = recent.iter().map(|(fp, _)| fp.to_f64()).collect();
        let y: Vec<f64> = recent.iter().map(|(_, f)| *f).collect();

        let n = train.len();
        let mut kernel = vec![vec![0.0; n]; n];
        for i in 0..n {
            for j in 0..=i {
                let k = rbf(&train[i], &train[j], length_scale);
                kernel[i][j] = k;
                kernel[j][i] = k;
            }
        }

        let mut jitter = noise.max(1e-10);
        let mut chol = None;
        for _ in 0..MAX_JITTER_TRIES {
            let mut shifted = kernel.clone();
            for (i, row) in shifted.iter_mut().enumerate() {
                row[i] += jitter;
            }
            if let Some(l) = cholesky(&shifted) {
                chol = Some(l);
                break;
            }
            debug!("Surrogate kernel not positive definite, jitter {} -> {}", jitter, jitter * 10.0);
            jitter *= 10.0;
        }
        let chol = chol.ok_or_else(|| {
            SynrouteError::Validation("Surrogate kernel matrix is not positive definite".to_string())
        })?;
        let alpha = solve_upper_t(&chol, &solve_lower(&chol, &y));

        Ok(Self {
            train,
            chol,
            alpha,
            length_scale,
        })
    }

    /// Posterior mean and standard deviation at `x`.
    pub fn predict(&self, x: &Fingerprint) -> (f64, f64) {
        let x = x.to_f64();
        let k_star: Vec<f64> = self.train.iter().map(|t| rbf(t, &x, self.length_scale)).collect();
        let mean = dot(&k_star, &self.alpha);
        let v = solve_lower(&self.chol, &k_star);
        let var = (1.0 - dot(&v, &v)).max(1e-12);
        (mean, var.sqrt())
    }

    pub fn expected_improvement(&self, x: &Fingerprint, best: f64) -> f64 {
        let (mean, std) = self.predict(x);
        expected_improvement(mean, std, best)
    }
}

pub fn expected_improvement(mean: f64, std: f64, best: f64) -> f64 {
    if std <= 0.0 {
        return (mean - best).max(0.0);
    }
    let z = (mean - best) / std;
    (mean - best) * normal_cdf(z) + std * normal_pdf(z)
}

fn rbf(a: &[f64], b: &[f64], length_scale: f64) -> f64 {
    let sq: f64 = a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum();
    (-sq / (2.0 * length_scale * length_scale)).exp()
}

fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

fn cholesky(a: &[Vec<f64>]) -> Option<Vec<Vec<f64>>> {
    let n = a.len();
    let mut l = vec![vec![0.0; n]; n];
    for i in 0..n {
        for j in 0..=i {
            let s: f64 = (0..j).map(|k| l[i][k] * l[j][k]).sum();
            if i == j {
                let d = a[i][i] - s;
                if d <= 0.0 || !d.is_finite() {
                    return None;
                }
                l[i][j] = d.sqrt();
            } else {
                l[i][j] = (a[i][j] - s) / l[j][j];
            }
        }
    }
    Some(l)
}

// L x = b
fn solve_lower(l: &[Vec<f64>], b: &[f64]) -> Vec<f64> {
    let mut x = vec![0.0; b.len()];
    for i in 0..b.len() {
        let s: f64 = (0..i).map(|k| l[i][k] * x[k]).sum();
        x[i] = (b[i] - s) / l[i][i];
    }
    x
}

// L^T x = b
fn solve_upper_t(l: &[Vec<f64>], b: &[f64]) -> Vec<f64> {
    let n = b.len();
    let mut x = vec![0.0; n];
    for i in (0..n).rev() {
        let s: f64 = (i + 1..n).map(|k| l[k][i] * x[k]).sum();
        x[i] = (b[i] - s) / l[i][i];
    }
    x
}

fn normal_pdf(z: f64) -> f64 {
    (-0.5 * z * z).exp() / (2.0 * std::f64::consts::PI).sqrt()
}

fn normal_cdf(z: f64) -> f64 {
    0.5 * (1.0 + erf(z / std::f64::consts::SQRT_2))
}

// Abramowitz & Stegun 7.1.26, |error| < 1.5e-7.
fn erf(x: f64) -> f64 {
    let sign = if x < 0.0 { -1.0 } else { 1.0 };
    let x = x.abs();
    let t = 1.0 / (1.0 + 0.327_591_1 * x);
    let poly = t
        * (0.254_829_592
            + t * (-0.284_496_736 + t * (1.421_413_741 + t * (-1.453_152_027 + t * 1.061_405_429))));
    sign * (1.0 - poly * (-x * x).exp())
}
