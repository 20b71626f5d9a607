pub mod encoding;
mod estimator;
pub mod loss;
mod model;

pub use estimator::MovementValueEstimator;
pub use model::{MovementQNetwork, MovementQNetworkConfig, CONV_FILTERS, CONV_KERNEL};
