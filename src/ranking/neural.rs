//! Fixed-weight feed-forward scoring head.
//!
//! An 8-feature input goes through one 8x6 dense layer with ReLU, a
//! 6x1 output layer, and a tempered sigmoid. The weights are hand-set
//! constants, not learned, and never change at runtime; shapes are
//! verified once at startup.

use anyhow::{bail, Result};

/// Number of input features (see `features.rs` for their order).
pub const INPUT_DIM: usize = 8;

/// Hidden layer width.
pub const HIDDEN_DIM: usize = 6;

/// Sigmoid temperature applied to the output.
const OUTPUT_TEMPERATURE: f64 = 3.2;

/// Hidden layer weights, one row per input feature.
pub const HIDDEN_WEIGHTS: [[f64; HIDDEN_DIM]; INPUT_DIM] = [
    // text rank
    [1.6, 0.4, 0.0, 0.3, 0.7, 0.2],
    // embedding similarity
    [0.7, 2.2, -0.4, 0.9, 0.5, 0.1],
    // language
    [0.4, 1.8, -0.5, 0.8, 0.3, -0.2],
    // artist
    [0.5, 2.0, -0.3, 1.1, 0.4, 0.0],
    // popularity
    [0.8, 0.4, 0.0, 0.2, 1.3, -0.3],
    // interaction
    [0.3, 1.5, -0.8, 1.7, 0.2, 0.1],
    // skip risk
    [-0.2, -1.0, 2.1, -0.6, 0.0, 0.5],
    // query intent
    [1.7, 0.8, 0.0, 0.2, 0.6, 0.4],
];

pub const HIDDEN_BIAS: [f64; HIDDEN_DIM] = [0.15, 0.25, 0.10, 0.20, 0.30, 0.35];

pub const OUTPUT_WEIGHTS: [f64; HIDDEN_DIM] = [1.9, 2.6, -1.7, 1.5, 1.2, -0.9];

pub const OUTPUT_BIAS: f64 = -24.0;

fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

/// Score a feature vector. Output is always in (0, 1).
pub fn forward(features: &[f64; INPUT_DIM]) -> f64 {
    let mut hidden = [0.0; HIDDEN_DIM];
    for (j, slot) in hidden.iter_mut().enumerate() {
        let mut sum = HIDDEN_BIAS[j];
        for (i, feature) in features.iter().enumerate() {
            sum += HIDDEN_WEIGHTS[i][j] * feature;
        }
        *slot = sum.max(0.0);
    }

    let mut output = OUTPUT_BIAS;
    for (j, h) in hidden.iter().enumerate() {
        output += OUTPUT_WEIGHTS[j] * h;
    }
    sigmoid(output / OUTPUT_TEMPERATURE)
}

/// Reject mismatched weight tables at startup instead of mis-scoring
/// silently at request time.
pub fn verify_weights() -> Result<()> {
    if HIDDEN_WEIGHTS.len() != INPUT_DIM {
        bail!(
            "hidden weight matrix has {} rows, expected {}",
            HIDDEN_WEIGHTS.len(),
            INPUT_DIM
        );
    }
    for (i, row) in HIDDEN_WEIGHTS.iter().enumerate() {
        if row.len() != HIDDEN_DIM {
            bail!("hidden weight row {} has {} columns, expected {}", i, row.len(), HIDDEN_DIM);
        }
        if row.iter().any(|w| !w.is_finite()) {
            bail!("hidden weight row {} contains a non-finite value", i);
        }
    }
    if HIDDEN_BIAS.len() != HIDDEN_DIM || OUTPUT_WEIGHTS.len() != HIDDEN_DIM {
        bail!("bias or output vector length does not match hidden width {HIDDEN_DIM}");
    }
    if !OUTPUT_BIAS.is_finite()
        || HIDDEN_BIAS.iter().any(|w| !w.is_finite())
        || OUTPUT_WEIGHTS.iter().any(|w| !w.is_finite())
    {
        bail!("weight tables contain a non-finite value");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_weights_verify() {
        verify_weights().unwrap();
    }

    #[test]
    fn test_output_in_unit_interval() {
        let zero = [0.0; INPUT_DIM];
        let ones = [1.0; INPUT_DIM];
        for features in [zero, ones] {
            let score = forward(&features);
            assert!(score > 0.0 && score < 1.0, "score {score} out of range");
        }
    }

    #[test]
    fn test_forward_is_deterministic() {
        let features = [0.5, 0.6, 1.0, 0.9, 0.45, 0.8, 0.1, 0.3];
        assert_eq!(forward(&features), forward(&features));
    }

    #[test]
    fn test_personalized_vector_scores_higher() {
        // Same ordering the blend relies on: a candidate loaded with
        // preference signal beats a candidate with only a text prior.
        let text_only = [1.0, 0.5, 0.25, 0.1, 0.45, 0.35, 0.2, 0.0];
        let personalized = [0.0, 0.75, 1.0, 0.9, 0.45, 0.85, 0.0, 0.0];
        assert!(forward(&personalized) > forward(&text_only) + 0.4);
    }

    #[test]
    fn test_skip_risk_pushes_score_down() {
        let safe = [0.5, 0.5, 0.5, 0.5, 0.5, 0.5, 0.0, 0.5];
        let mut risky = safe;
        risky[6] = 1.0;
        assert!(forward(&risky) < forward(&safe));
    }
}
