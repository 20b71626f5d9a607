use burn::prelude::*;
use burn::tensor::TensorData;

/// Build the [batch, cells] action-weight tensor from per-sample vectors.
pub fn action_mask<B: Backend>(actions: &[Vec<f32>], device: &B::Device) -> Tensor<B, 2> {
    let batch_size = actions.len();
    let cells = actions[0].len();
    let mut flat = Vec::with_capacity(batch_size * cells);
    for action in actions {
        flat.extend_from_slice(action);
    }
    Tensor::<B, 1>::from_data(TensorData::from(flat.as_slice()), device)
        .reshape([batch_size as i32, cells as i32])
}

/// Q-value of each sample's chosen action: the inner product of the flattened
/// output with the action vector, shape [batch, 1].
///
/// A one-hot action selects a single cell; any other distribution yields the
/// corresponding weighted sum.
pub fn selected_q<B: Backend>(flat: Tensor<B, 2>, actions: Tensor<B, 2>) -> Tensor<B, 2> {
    (flat * actions).sum_dim(1)
}

/// Mean squared temporal-difference error of the selected Q-values against
/// the supplied targets.
pub fn td_loss<B: Backend>(
    flat: Tensor<B, 2>,
    actions: &[Vec<f32>],
    targets: &[f32],
    device: &B::Device,
) -> Tensor<B, 1> {
    let batch_size = targets.len();
    let mask = action_mask(actions, device);
    let q_taken = selected_q(flat, mask);
    let target_tensor = Tensor::<B, 1>::from_data(TensorData::from(targets), device)
        .reshape([batch_size as i32, 1]);

    let diff = q_taken - target_tensor;
    (diff.clone() * diff).mean()
}

/// Extract the single value of a fully reduced tensor.
pub fn scalar<B: Backend>(t: Tensor<B, 1>) -> f32 {
    t.into_data().to_vec::<f32>().expect("f32 tensor data extraction")[0]
}

/// Batch-wide max and mean Q-value over the full flattened output. Telemetry
/// only; plays no part in training.
pub fn batch_q_stats<B: Backend>(flat: &Tensor<B, 2>) -> (f32, f32) {
    let max_q = scalar(flat.clone().max());
    let mean_q = scalar(flat.clone().mean());
    (max_q, mean_q)
}
