use burn::prelude::*;
use burn::tensor::TensorData;

use crate::observation::{Observation, ALLEGIANCE_CATEGORIES};

/// Reorder a row-major (y, x) screen into x-major (x, y) order.
///
/// Screen coordinates arrive y-major; downstream consumers address cells in
/// (x, y) order, so index `x * rows + y` of the result holds the category at
/// screen position (y, x).
pub fn transpose_to_xy(obs: &Observation) -> Vec<u8> {
    let (rows, cols) = (obs.rows(), obs.cols());
    let mut out = vec![0u8; rows * cols];
    for y in 0..rows {
        for x in 0..cols {
            out[x * rows + y] = obs.get(y, x);
        }
    }
    out
}

/// Expand an x-major categorical grid into binary indicator planes.
///
/// Output is channel-major, `[5, cols, rows]` flattened: index
/// `category * cols * rows + x * rows + y`. Categories outside `0..=4` light
/// no plane, matching the original network's one-hot semantics.
pub fn one_hot_planes(xy: &[u8], cols: usize, rows: usize) -> Vec<f32> {
    let plane = cols * rows;
    let mut out = vec![0.0f32; ALLEGIANCE_CATEGORIES * plane];
    for (i, &category) in xy.iter().enumerate() {
        if (category as usize) < ALLEGIANCE_CATEGORIES {
            out[category as usize * plane + i] = 1.0;
        }
    }
    out
}

/// Encode a batch of observations as a [batch, 5, cols, rows] tensor.
///
/// The batch must be non-empty and uniformly shaped; the estimator validates
/// shapes before calling.
pub fn encode_batch<B: Backend>(observations: &[Observation], device: &B::Device) -> Tensor<B, 4> {
    let batch_size = observations.len();
    let (rows, cols) = (observations[0].rows(), observations[0].cols());
    let mut flat = Vec::with_capacity(batch_size * ALLEGIANCE_CATEGORIES * rows * cols);
    for obs in observations {
        flat.extend_from_slice(&one_hot_planes(&transpose_to_xy(obs), cols, rows));
    }
    Tensor::<B, 1>::from_data(TensorData::from(flat.as_slice()), device).reshape([
        batch_size as i32,
        ALLEGIANCE_CATEGORIES as i32,
        cols as i32,
        rows as i32,
    ])
}
