use ndarray::Array2;

/// Keeps sqrt well-defined next to clipped zero eigenvalues.
const EIGVAL_EPS: f64 = 1e-12;

/// Classical (metric) multidimensional scaling.
///
/// Double-centers the squared distance matrix, `B = -1/2 * J * D^2 * J` with
/// `J = I - (1/n) * ones`, eigendecomposes B, and scales the top `out_dim`
/// eigenvectors by the square root of their eigenvalues. Negative eigenvalues
/// are clipped to zero: cosine and Hamming distances are not exactly
/// Euclidean, so small negative spectrum is expected input, not a defect.
///
/// The embedding is unique only up to rotation and reflection. A degenerate
/// all-zero distance matrix coalesces every level onto one point.
pub fn classical_mds(distances: &Array2<f64>, out_dim: usize) -> Array2<f64> {
    let n = distances.nrows();
    let out_dim = out_dim.min(n);
    if n == 0 || out_dim == 0 {
        return Array2::zeros((n, 0));
    }

    // Double-centering without materializing J: b_ij =
    // -1/2 (d2_ij - row_mean_i - col_mean_j + grand_mean).
    let squared = distances.mapv(|d| d * d);
    let row_means: Vec<f64> = (0..n).map(|i| squared.row(i).mean().unwrap_or(0.0)).collect();
    let col_means: Vec<f64> = (0..n).map(|j| squared.column(j).mean().unwrap_or(0.0)).collect();
    let grand_mean = row_means.iter().sum::<f64>() / n as f64;

    let mut b = Array2::zeros((n, n));
    for i in 0..n {
        for j in 0..n {
            b[[i, j]] = -0.5 * (squared[[i, j]] - row_means[i] - col_means[j] + grand_mean);
        }
    }

    let (eigenvalues, eigenvectors) = symmetric_eigen(&b);

    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| eigenvalues[b].total_cmp(&eigenvalues[a]));

    let mut coordinates = Array2::zeros((n, out_dim));
    for (axis, &idx) in order.iter().take(out_dim).enumerate() {
        let clipped = eigenvalues[idx].max(0.0);
        let scale = (clipped + EIGVAL_EPS).sqrt();
        for i in 0..n {
            coordinates[[i, axis]] = eigenvectors[[i, idx]] * scale;
        }
    }

    coordinates
}

/// Eigendecomposition of a symmetric matrix by cyclic Jacobi rotations.
/// Returns unsorted eigenvalues and the matching eigenvector columns.
pub(crate) fn symmetric_eigen(matrix: &Array2<f64>) -> (Vec<f64>, Array2<f64>) {
    let n = matrix.nrows();
    let mut a = matrix.clone();
    let mut v: Array2<f64> = Array2::eye(n);

    let tolerance = 1e-14 * off_diagonal_norm(&a).max(1.0);
    const MAX_SWEEPS: usize = 64;

    for _sweep in 0..MAX_SWEEPS {
        if off_diagonal_norm(&a) <= tolerance {
            break;
        }

        for p in 0..n {
            for q in (p + 1)..n {
                let apq = a[[p, q]];
                if apq.abs() <= f64::MIN_POSITIVE {
                    continue;
                }

                let theta = 0.5 * (2.0 * apq).atan2(a[[q, q]] - a[[p, p]]);
                let c = theta.cos();
                let s = theta.sin();

                let app = a[[p, p]];
                let aqq = a[[q, q]];

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
                a[[p, p]] = c * c * app - 2.0 * c * s * apq + s * s * aqq;
                a[[q, q]] = s * s * app + 2.0 * c * s * apq + c * c * aqq;
                a[[p, q]] = 0.0;
                a[[q, p]] = 0.0;

                for k in 0..n {
                    let vkp = v[[k, p]];
                    let vkq = v[[k, q]];
                    v[[k, p]] = c * vkp - s * vkq;
                    v[[k, q]] = s * vkp + c * vkq;
                }
            }
        }
    }

    let eigenvalues = (0..n).map(|i| a[[i, i]]).collect();
    (eigenvalues, v)
}

fn off_diagonal_norm(a: &Array2<f64>) -> f64 {
    let n = a.nrows();
    let mut sum = 0.0;
    for i in 0..n {
        for j in 0..n {
            if i != j {
                sum += a[[i, j]] * a[[i, j]];
            }
        }
    }
    sum.sqrt()
}

#[cfg(test)]
mod tests {
    use ndarray::array;

    use super::*;

    fn embedded_distance(coords: &Array2<f64>, i: usize, j: usize) -> f64 {
        (0..coords.ncols())
            .map(|axis| (coords[[i, axis]] - coords[[j, axis]]).powi(2))
            .sum::<f64>()
            .sqrt()
    }

    #[test]
    fn symmetric_eigen_recovers_known_spectrum() {
        let matrix = array![[2.0, 1.0], [1.0, 2.0]];
        let (mut eigenvalues, eigenvectors) = symmetric_eigen(&matrix);
        eigenvalues.sort_by(f64::total_cmp);
        assert!((eigenvalues[0] - 1.0).abs() < 1e-10);
        assert!((eigenvalues[1] - 3.0).abs() < 1e-10);

        // Columns stay orthonormal.
        let dot = eigenvectors[[0, 0]] * eigenvectors[[0, 1]]
            + eigenvectors[[1, 0]] * eigenvectors[[1, 1]];
        assert!(dot.abs() < 1e-10);
    }

    #[test]
    fn degenerate_all_zero_distances_coalesce_without_raising() {
        let distances = Array2::zeros((3, 3));
        let coords = classical_mds(&distances, 2);
        assert_eq!(coords.dim(), (3, 2));
        for value in coords.iter() {
            assert!(value.is_finite());
            assert!(value.abs() < 1e-3);
        }
        // Every level lands on (numerically) the same point.
        assert!(embedded_distance(&coords, 0, 1) < 1e-3);
        assert!(embedded_distance(&coords, 1, 2) < 1e-3);
    }

    #[test]
    fn collinear_configuration_is_recovered_up_to_isometry() {
        // Three points on a line at 0, 1, 2.
        let distances = array![[0.0, 1.0, 2.0], [1.0, 0.0, 1.0], [2.0, 1.0, 0.0]];
        let coords = classical_mds(&distances, 2);

        for i in 0..3 {
            for j in 0..3 {
                let recovered = embedded_distance(&coords, i, j);
                assert!(
                    (recovered - distances[[i, j]]).abs() < 1e-6,
                    "distance ({i},{j}) drifted: {recovered}"
                );
            }
        }
    }

    #[test]
    fn out_dim_is_capped_at_point_count() {
        let distances = array![[0.0, 1.0], [1.0, 0.0]];
        let coords = classical_mds(&distances, 5);
        assert_eq!(coords.dim(), (2, 2));
    }
}
