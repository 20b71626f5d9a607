use burn::nn::conv::{Conv2d, Conv2dConfig};
use burn::nn::{PaddingConfig2d, Relu};
use burn::prelude::*;

use crate::observation::ALLEGIANCE_CATEGORIES;

/// Output channels of the spatial convolution.
pub const CONV_FILTERS: usize = 16;
/// Kernel size of the spatial convolution.
pub const CONV_KERNEL: usize = 5;

/// Q-network over a player-relative feature screen.
///
/// ```text
/// Input:   [batch, 5, W, H]   one-hot allegiance planes, (x, y) axis order
/// Embed:   5 -> 1 channels, 1x1 kernel   (learned category embedding)
/// Conv:    1 -> 16 channels, 5x5 kernel, same padding
/// ReLU
/// Output:  16 -> 1 channels, 1x1 kernel  =>  [batch, 1, W, H]
/// Flatten: [batch, W*H]  (one Q-value per screen cell, x-major)
/// ```
///
/// The layers are size-agnostic: the spatial dimensions are fixed by whoever
/// feeds the network, not by the weights.
#[derive(Module, Debug)]
pub struct MovementQNetwork<B: Backend> {
    embed: Conv2d<B>,
    conv1: Conv2d<B>,
    output: Conv2d<B>,
    relu: Relu,
}

#[derive(Config, Debug)]
pub struct MovementQNetworkConfig {}

impl MovementQNetworkConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> MovementQNetwork<B> {
        MovementQNetwork {
            embed: Conv2dConfig::new([ALLEGIANCE_CATEGORIES, 1], [1, 1]).init(device),
            conv1: Conv2dConfig::new([1, CONV_FILTERS], [CONV_KERNEL, CONV_KERNEL])
                .with_padding(PaddingConfig2d::Same)
                .init(device),
            output: Conv2dConfig::new([CONV_FILTERS, 1], [1, 1]).init(device),
            relu: Relu::new(),
        }
    }
}

impl<B: Backend> MovementQNetwork<B> {
    /// Forward pass: input [batch, 5, W, H] -> output [batch, W*H] Q-values.
    pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 2> {
        let [batch_size, _, width, height] = input.dims();

        let x = self.embed.forward(input);
        let x = self.relu.forward(self.conv1.forward(x));
        let x = self.output.forward(x);
        x.reshape([batch_size as i32, (width * height) as i32])
    }
}
