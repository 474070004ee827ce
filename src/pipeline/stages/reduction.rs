//! Search-index reduction.
//!
//! Compresses a tensor vector to a quarter of its length by averaging groups
//! of four consecutive components. A trailing partial group averages over the
//! components it actually has. Pure and deterministic.

const GROUP: usize = 4;

pub fn reduce(vector: &[f32]) -> Vec<f32> {
    vector
        .chunks(GROUP)
        .map(|group| group.iter().sum::<f32>() / group.len() as f32)
        .collect()
}
