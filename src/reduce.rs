//! Principal component analysis for projecting embeddings to 3D.
//!
//! The centred data matrix is eigen-decomposed through whichever of its two
//! symmetric products is smaller: the Gram matrix `Xc·Xcᵀ` (rows × rows) when
//! there are fewer rows than dimensions, which is the usual case for a handful
//! of texts with 768 to 1536 dimensions, or the scatter matrix `Xcᵀ·Xc`
//! otherwise. Both give the same scores. The eigen-solver is the cyclic
//! Jacobi method, which is deterministic for a given input.

use ndarray::{Array1, Array2, Axis};
use serde::Serialize;

use crate::error::PipelineError;

/// Number of output coordinates per row.
pub const TARGET_RANK: usize = 3;

const MAX_SWEEPS: usize = 100;

/// One 3D point per input row, in input order.
pub type ReducedMatrix = Vec<[f64; TARGET_RANK]>;

#[derive(Debug, thiserror::Error)]
pub enum ReduceError {
    #[error("need at least {required} rows, got {rows}")]
    InsufficientSamples { rows: usize, required: usize },

    #[error("{0}")]
    Shape(String),
}

impl From<ReduceError> for PipelineError {
    fn from(err: ReduceError) -> Self {
        match err {
            ReduceError::InsufficientSamples { rows, required } => {
                PipelineError::InsufficientSamples { rows, required }
            }
            ReduceError::Shape(msg) => PipelineError::Shape(msg),
        }
    }
}

/// The 3D projection of a batch plus how much variance each axis explains.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Projection {
    pub coordinates: ReducedMatrix,
    pub explained_variance_ratio: [f64; TARGET_RANK],
}

/// Scores and variance ratios for the top `components` principal components.
#[derive(Debug, Clone)]
pub struct PcaOutput {
    /// `rows × components`, columns ordered by descending variance.
    pub scores: Array2<f64>,
    pub explained_variance_ratio: Vec<f64>,
}

/// PCA with a fixed number of components.
///
/// Component signs are fixed so that the largest-magnitude score in each
/// column is positive, so identical input always yields identical output.
#[derive(Debug, Clone, Copy)]
pub struct Pca {
    components: usize,
}

impl Default for Pca {
    fn default() -> Self {
        Self::new(TARGET_RANK)
    }
}

impl Pca {
    pub fn new(components: usize) -> Self {
        Self { components }
    }

    /// Fit on `data` (rows × dims) and return the projected rows.
    pub fn fit_transform(&self, data: &Array2<f64>) -> Result<PcaOutput, ReduceError> {
        let (rows, dims) = data.dim();
        let k = self.components;

        if rows < k {
            return Err(ReduceError::InsufficientSamples { rows, required: k });
        }
        if dims < k {
            return Err(ReduceError::Shape(format!(
                "embeddings have {dims} dimensions, need at least {k}"
            )));
        }
        if data.iter().any(|v| !v.is_finite()) {
            return Err(ReduceError::Shape("embeddings contain non-finite values".into()));
        }

        let centered = center(data);
        let (eigenvalues, mut scores) = if rows <= dims {
            scores_via_gram(&centered, k)
        } else {
            scores_via_scatter(&centered, k)
        };

        fix_signs(&mut scores);

        let total: f64 = eigenvalues.iter().map(|v| v.max(0.0)).sum();
        let explained_variance_ratio = eigenvalues
            .iter()
            .take(k)
            .map(|v| if total > 0.0 { v.max(0.0) / total } else { 0.0 })
            .collect();

        Ok(PcaOutput {
            scores,
            explained_variance_ratio,
        })
    }
}

/// Project an embedding matrix to 3D.
///
/// Fails with [`ReduceError::Shape`] on ragged rows, fewer than three
/// dimensions or non-finite values, and with
/// [`ReduceError::InsufficientSamples`] below three rows.
pub fn reduce(matrix: &[Vec<f32>]) -> Result<Projection, ReduceError> {
    let data = to_array(matrix)?;
    let output = Pca::default().fit_transform(&data)?;

    let coordinates = output
        .scores
        .rows()
        .into_iter()
        .map(|row| [row[0], row[1], row[2]])
        .collect();

    let mut explained_variance_ratio = [0.0; TARGET_RANK];
    for (slot, ratio) in explained_variance_ratio
        .iter_mut()
        .zip(&output.explained_variance_ratio)
    {
        *slot = *ratio;
    }

    Ok(Projection {
        coordinates,
        explained_variance_ratio,
    })
}

/// Copy a row-major `f32` matrix into an `f64` array, checking it is rectangular.
fn to_array(matrix: &[Vec<f32>]) -> Result<Array2<f64>, ReduceError> {
    let rows = matrix.len();
    let dims = matrix.first().map_or(0, Vec::len);

    if let Some((row, bad)) = matrix.iter().enumerate().find(|(_, r)| r.len() != dims) {
        return Err(ReduceError::Shape(format!(
            "row {row} has {} dimensions, expected {dims}",
            bad.len()
        )));
    }

    let flat: Vec<f64> = matrix.iter().flatten().map(|&v| f64::from(v)).collect();
    Array2::from_shape_vec((rows, dims), flat).map_err(|e| ReduceError::Shape(e.to_string()))
}

fn center(data: &Array2<f64>) -> Array2<f64> {
    let mean = data
        .mean_axis(Axis(0))
        .unwrap_or_else(|| Array1::zeros(data.ncols()));
    data - &mean
}

/// Eigen-decompose `Xc·Xcᵀ`; the scores of component `j` are `uⱼ·√λⱼ`.
/// Returns all eigenvalues (descending) and the first `k` score columns.
fn scores_via_gram(centered: &Array2<f64>, k: usize) -> (Vec<f64>, Array2<f64>) {
    let gram = centered.dot(&centered.t());
    let (eigenvalues, eigenvectors) = symmetric_eigen(gram);

    let mut scores = Array2::zeros((centered.nrows(), k));
    for j in 0..k {
        let scale = eigenvalues[j].max(0.0).sqrt();
        let column = eigenvectors.column(j).mapv(|u| u * scale);
        scores.column_mut(j).assign(&column);
    }
    (eigenvalues, scores)
}

/// Eigen-decompose `Xcᵀ·Xc`; the scores are `Xc·V[:, ..k]`.
fn scores_via_scatter(centered: &Array2<f64>, k: usize) -> (Vec<f64>, Array2<f64>) {
    let scatter = centered.t().dot(centered);
    let (eigenvalues, eigenvectors) = symmetric_eigen(scatter);
    let basis = eigenvectors.slice(ndarray::s![.., ..k]).to_owned();
    (eigenvalues, centered.dot(&basis))
}

/// Flip each column so its largest-magnitude entry is positive.
fn fix_signs(scores: &mut Array2<f64>) {
    for mut column in scores.columns_mut() {
        let pivot = column
            .iter()
            .copied()
            .fold(0.0_f64, |best, v| if v.abs() > best.abs() { v } else { best });
        if pivot < 0.0 {
            column.mapv_inplace(|v| -v);
        }
    }
}

/// Cyclic Jacobi eigen-decomposition of a symmetric matrix.
///
/// Returns eigenvalues in descending order and the matching unit eigenvectors
/// as columns. Equal eigenvalues keep their diagonal order.
fn symmetric_eigen(mut a: Array2<f64>) -> (Vec<f64>, Array2<f64>) {
    let n = a.nrows();
    let mut v = Array2::<f64>::eye(n);

    let total: f64 = a.iter().map(|x| x * x).sum();
    let tolerance = f64::EPSILON * f64::EPSILON * total;

    for _ in 0..MAX_SWEEPS {
        let mut off_diagonal = 0.0;
        for p in 0..n {
            for q in (p + 1)..n {
                off_diagonal += a[[p, q]] * a[[p, q]];
            }
        }
        if off_diagonal <= tolerance {
            break;
        }

        for p in 0..n {
            for q in (p + 1)..n {
                let apq = a[[p, q]];
                if apq == 0.0 {
                    continue;
                }

                let theta = (a[[q, q]] - a[[p, p]]) / (2.0 * apq);
                let t = theta.signum() / (theta.abs() + (theta * theta + 1.0).sqrt());
                let c = 1.0 / (t * t + 1.0).sqrt();
                let s = t * c;

                for k in 0..n {
                    let akp = a[[k, p]];
                    let akq = a[[k, q]];
                    a[[k, p]] = c * akp - s * akq;
                    a[[k, q]] = s * akp + c * akq;
                }
                for k in 0..n {
                    let apk = a[[p, k]];
                    let aqk = a[[q, k]];
                    a[[p, k]] = c * apk - s * aqk;
                    a[[q, k]] = s * apk + c * aqk;
                }
                for k in 0..n {
                    let vkp = v[[k, p]];
                    let vkq = v[[k, q]];
                    v[[k, p]] = c * vkp - s * vkq;
                    v[[k, q]] = s * vkp + c * vkq;
                }
            }
        }
    }

    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&i, &j| a[[j, j]].total_cmp(&a[[i, i]]));

    let eigenvalues = order.iter().map(|&i| a[[i, i]]).collect();
    let mut eigenvectors = Array2::zeros((n, n));
    for (dst, &src) in order.iter().enumerate() {
        eigenvectors.column_mut(dst).assign(&v.column(src));
    }
    (eigenvalues, eigenvectors)
}
