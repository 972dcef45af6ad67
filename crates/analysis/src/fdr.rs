//! Benjamini-Hochberg false discovery rate correction

use serde::{Deserialize, Serialize};

use crate::errors::{AnalysisError, Result};

/// Outcome of a Benjamini-Hochberg correction
///
/// `adjusted` and `rejected` are aligned with the input order so callers can
/// map entries back to metric names.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FdrCorrection {
    /// Step-up adjusted p-values, in input order
    pub adjusted: Vec<f64>,
    /// Rejection decision per hypothesis, in input order
    pub rejected: Vec<bool>,
    /// Number of rejected hypotheses
    pub n_significant: usize,
    /// Target FDR level
    pub alpha: f64,
}

/// Apply the Benjamini-Hochberg step-up procedure
///
/// Sorts ascending, finds the largest rank k with p_(k) <= (k/m) * alpha,
/// rejects ranks 1..=k, and reports monotone adjusted p-values clipped to 1.
pub fn benjamini_hochberg(p_values: &[f64], alpha: f64) -> Result<FdrCorrection> {
    if alpha <= 0.0 || alpha >= 1.0 {
        return Err(AnalysisError::InvalidParameter(format!(
            "alpha must be in (0, 1), got {alpha}"
        )));
    }
    for (i, p) in p_values.iter().enumerate() {
        if !p.is_finite() || !(0.0..=1.0).contains(p) {
            return Err(AnalysisError::InvalidParameter(format!(
                "p-value at index {i} is not in [0, 1]: {p}"
            )));
        }
    }

    let m = p_values.len();
    if m == 0 {
        return Ok(FdrCorrection {
            adjusted: vec![],
            rejected: vec![],
            n_significant: 0,
            alpha,
        });
    }

    // Sort indices ascending by p-value
    let mut order: Vec<usize> = (0..m).collect();
    order.sort_by(|&a, &b| p_values[a].total_cmp(&p_values[b]));

    // Step-up adjusted values: running minimum from the largest rank down
    let mut adjusted_sorted = vec![0.0f64; m];
    let mut running_min = 1.0f64;
    for rank in (0..m).rev() {
        let raw = p_values[order[rank]] * m as f64 / (rank + 1) as f64;
        running_min = running_min.min(raw).min(1.0);
        adjusted_sorted[rank] = running_min;
    }

    // Largest rank whose raw p-value clears the BH boundary
    let mut cutoff_rank = None;
    for rank in (0..m).rev() {
        if p_values[order[rank]] <= (rank + 1) as f64 / m as f64 * alpha {
            cutoff_rank = Some(rank);
            break;
        }
    }

    let mut adjusted = vec![0.0f64; m];
    let mut rejected = vec![false; m];
    for (rank, &original_index) in order.iter().enumerate() {
        adjusted[original_index] = adjusted_sorted[rank];
        rejected[original_index] = matches!(cutoff_rank, Some(k) if rank <= k);
    }

    let n_significant = rejected.iter().filter(|r| **r).count();

    Ok(FdrCorrection {
        adjusted,
        rejected,
        n_significant,
        alpha,
    })
}
