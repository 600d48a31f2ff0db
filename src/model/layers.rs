//! Building blocks shared by the convolutional architectures

use burn::{
    config::Config,
    module::Module,
    nn::{
        conv::{Conv1d, Conv1dConfig},
        BatchNorm, BatchNormConfig, Linear, LinearConfig, PaddingConfig1d, Relu,
    },
    tensor::{activation::sigmoid, backend::Backend, Tensor},
};

/// Conv1d ("same" padding, no bias) -> BatchNorm -> optional ReLU
#[derive(Module, Debug)]
pub struct ConvBlock<B: Backend> {
    pub conv: Conv1d<B>,
    pub bn: BatchNorm<B, 1>,
    pub relu: Option<Relu>,
}

impl<B: Backend> ConvBlock<B> {
    /// Create a block with a ReLU activation
    pub fn new(in_channels: usize, out_channels: usize, kernel_size: usize, device: &B::Device) -> Self {
        Self::build(in_channels, out_channels, kernel_size, true, device)
    }

    /// Create a block without activation
    pub fn linear(in_channels: usize, out_channels: usize, kernel_size: usize, device: &B::Device) -> Self {
        Self::build(in_channels, out_channels, kernel_size, false, device)
    }

    fn build(
        in_channels: usize,
        out_channels: usize,
        kernel_size: usize,
        with_relu: bool,
        device: &B::Device,
    ) -> Self {
        let conv = Conv1dConfig::new(in_channels, out_channels, kernel_size)
            .with_padding(PaddingConfig1d::Same)
            .with_bias(false)
            .init(device);

        Self {
            conv,
            bn: BatchNormConfig::new(out_channels).init(device),
            relu: with_relu.then(Relu::new),
        }
    }

    pub fn forward(&self, x: Tensor<B, 3>) -> Tensor<B, 3> {
        let x = self.conv.forward(x);
        let x = self.bn.forward(x);

        match &self.relu {
            Some(relu) => relu.forward(x),
            None => x,
        }
    }
}

/// Configuration for [`SqueezeExcite`]
#[derive(Config, Debug)]
pub struct SqueezeExciteConfig {
    /// Number of channels of the recalibrated feature map
    pub channels: usize,

    /// Bottleneck reduction ratio
    #[config(default = "16")]
    pub reduction: usize,
}

/// Squeeze-and-excitation block
///
/// Global average pool over time, a two-layer bottleneck MLP and a sigmoid
/// gate that rescales every channel of the input.
#[derive(Module, Debug)]
pub struct SqueezeExcite<B: Backend> {
    pub squeeze: Linear<B>,
    pub excite: Linear<B>,
    pub relu: Relu,
}

impl SqueezeExciteConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> SqueezeExcite<B> {
        let hidden = (self.channels / self.reduction.max(1)).max(1);

        SqueezeExcite {
            squeeze: LinearConfig::new(self.channels, hidden)
                .with_bias(false)
                .init(device),
            excite: LinearConfig::new(hidden, self.channels)
                .with_bias(false)
                .init(device),
            relu: Relu::new(),
        }
    }
}

impl<B: Backend> SqueezeExcite<B> {
    pub fn forward(&self, x: Tensor<B, 3>) -> Tensor<B, 3> {
        let [batch, channels, _] = x.dims();

        let weights = global_average_pool(x.clone());
        let weights = self.relu.forward(self.squeeze.forward(weights));
        let weights = sigmoid(self.excite.forward(weights));

        x * weights.reshape([batch, channels, 1])
    }
}

/// Residual shortcut: BatchNorm when the channel counts match,
/// otherwise a 1x1 convolution block without activation
#[derive(Module, Debug)]
pub struct Shortcut<B: Backend> {
    pub bn: Option<BatchNorm<B, 1>>,
    pub projection: Option<ConvBlock<B>>,
}

impl<B: Backend> Shortcut<B> {
    pub fn new(in_channels: usize, out_channels: usize, device: &B::Device) -> Self {
        if in_channels == out_channels {
            Self {
                bn: Some(BatchNormConfig::new(in_channels).init(device)),
                projection: None,
            }
        } else {
            Self {
                bn: None,
                projection: Some(ConvBlock::linear(in_channels, out_channels, 1, device)),
            }
        }
    }

    pub fn forward(&self, x: Tensor<B, 3>) -> Tensor<B, 3> {
        match (&self.bn, &self.projection) {
            (Some(bn), _) => bn.forward(x),
            (None, Some(projection)) => projection.forward(x),
            (None, None) => x,
        }
    }
}

/// Global average pooling over time: `[b, c, l] -> [b, c]`
pub fn global_average_pool<B: Backend>(x: Tensor<B, 3>) -> Tensor<B, 2> {
    let [batch, channels, _] = x.dims();
    x.mean_dim(2).reshape([batch, channels])
}

/// Zero-pad the time axis of `[b, c, l]` with `left` and `right` steps
pub fn pad_time<B: Backend>(x: Tensor<B, 3>, left: usize, right: usize) -> Tensor<B, 3> {
    if left == 0 && right == 0 {
        return x;
    }

    let [batch, channels, _] = x.dims();
    let device = x.device();
    let mut parts: Vec<Tensor<B, 3>> = Vec::with_capacity(3);
    if left > 0 {
        parts.push(Tensor::zeros([batch, channels, left], &device));
    }
    parts.push(x);
    if right > 0 {
        parts.push(Tensor::zeros([batch, channels, right], &device));
    }

    Tensor::cat(parts, 2)
}
