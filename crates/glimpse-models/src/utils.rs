use crate::error::ModelError;

/// Index of the largest score.
///
/// Ties resolve to the lowest index. Fails on an empty slice and on any NaN or
/// infinite score.
pub fn argmax(scores: &[f32]) -> Result<usize, ModelError> {
    let mut best: Option<usize> = None;
    for (index, &score) in scores.iter().enumerate() {
        if !score.is_finite() {
            return Err(ModelError::NonFiniteScores);
        }
        match best {
            Some(best_index) if scores[best_index] >= score => {}
            _ => best = Some(index),
        }
    }
    best.ok_or(ModelError::EmptyScores)
}

/// Numerically stable softmax over a score vector.
pub fn softmax(scores: &[f32]) -> Vec<f32> {
    let max = scores.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exps = scores.iter().map(|s| (s - max).exp()).collect::<Vec<_>>();
    let sum: f32 = exps.iter().sum();
    exps.into_iter().map(|e| e / sum).collect()
}
