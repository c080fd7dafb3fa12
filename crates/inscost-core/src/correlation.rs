//! Pearson correlation between the numeric columns of the flattened view.

use serde::{Deserialize, Serialize};

use crate::store::FlatRow;

/// Columns of the matrix, in order.
pub const COLUMNS: [&str; 3] = ["bmi", "children", "charges"];

/// Symmetric 3×3 matrix over [`COLUMNS`]. A cell is `None` when either
/// column has no variance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Correlations {
  pub rows:   usize,
  pub matrix: [[Option<f64>; 3]; 3],
}

/// Correlate `bmi`, `children` and `charges` across `rows`. `None` with fewer
/// than two rows.
pub fn correlations(rows: &[FlatRow]) -> Option<Correlations> {
  if rows.len() < 2 {
    return None;
  }

  let columns: [Vec<f64>; 3] = [
    rows.iter().map(|r| r.bmi).collect(),
    rows.iter().map(|r| r.children as f64).collect(),
    rows.iter().map(|r| r.charges).collect(),
  ];

  let mut matrix = [[None; 3]; 3];
  for (i, a) in columns.iter().enumerate() {
    for (j, b) in columns.iter().enumerate() {
      matrix[i][j] = pearson(a, b);
    }
  }
  Some(Correlations { rows: rows.len(), matrix })
}

fn pearson(a: &[f64], b: &[f64]) -> Option<f64> {
  let n = a.len() as f64;
  let mean_a = a.iter().sum::<f64>() / n;
  let mean_b = b.iter().sum::<f64>() / n;

  let (mut cov, mut var_a, mut var_b) = (0.0, 0.0, 0.0);
  for (x, y) in a.iter().zip(b) {
    let (dx, dy) = (x - mean_a, y - mean_b);
    cov += dx * dy;
    var_a += dx * dx;
    var_b += dy * dy;
  }

  if var_a == 0.0 || var_b == 0.0 {
    return None;
  }
  Some((cov / (var_a.sqrt() * var_b.sqrt())).clamp(-1.0, 1.0))
}
