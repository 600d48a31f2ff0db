//! Residual network for time-series classification
//!
//! Three residual blocks of three convolutions each (kernel sizes 7, 5, 3).
//! The last convolution of a block has no activation; the shortcut is added
//! before the block's ReLU.

use burn::{
    config::Config,
    module::Module,
    nn::{Linear, LinearConfig, Relu},
    tensor::{backend::Backend, Tensor},
};

use super::layers::{global_average_pool, ConvBlock, Shortcut};
use super::{ClassifierOutput, TimeSeriesClassifier};

/// Configuration for [`ResNet`]
#[derive(Config, Debug)]
pub struct ResNetConfig {
    /// Number of input channels
    pub in_channels: usize,

    /// Number of output classes
    pub num_classes: usize,

    /// Filters of the first block; the others use twice as many
    #[config(default = "64")]
    pub base_filters: usize,

    /// Kernel sizes of the three convolutions inside every block
    #[config(default = "[7, 5, 3]")]
    pub kernel_sizes: [usize; 3],
}

/// One residual block
#[derive(Module, Debug)]
pub struct ResBlock<B: Backend> {
    pub conv1: ConvBlock<B>,
    pub conv2: ConvBlock<B>,
    pub conv3: ConvBlock<B>,
    pub shortcut: Shortcut<B>,
    pub relu: Relu,
}

impl<B: Backend> ResBlock<B> {
    pub fn new(in_channels: usize, out_channels: usize, kernel_sizes: [usize; 3], device: &B::Device) -> Self {
        let [k1, k2, k3] = kernel_sizes;

        Self {
            conv1: ConvBlock::new(in_channels, out_channels, k1, device),
            conv2: ConvBlock::new(out_channels, out_channels, k2, device),
            conv3: ConvBlock::linear(out_channels, out_channels, k3, device),
            shortcut: Shortcut::new(in_channels, out_channels, device),
            relu: Relu::new(),
        }
    }

    pub fn forward(&self, x: Tensor<B, 3>) -> Tensor<B, 3> {
        let residual = self.shortcut.forward(x.clone());

        let x = self.conv1.forward(x);
        let x = self.conv2.forward(x);
        let x = self.conv3.forward(x);

        self.relu.forward(x + residual)
    }
}

/// ResNet classifier
#[derive(Module, Debug)]
pub struct ResNet<B: Backend> {
    pub block1: ResBlock<B>,
    pub block2: ResBlock<B>,
    pub block3: ResBlock<B>,
    pub fc: Linear<B>,

    num_classes: usize,
    embedding_dim: usize,
}

impl ResNetConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> ResNet<B> {
        let nf = self.base_filters;

        ResNet {
            block1: ResBlock::new(self.in_channels, nf, self.kernel_sizes, device),
            block2: ResBlock::new(nf, nf * 2, self.kernel_sizes, device),
            block3: ResBlock::new(nf * 2, nf * 2, self.kernel_sizes, device),
            fc: LinearConfig::new(nf * 2, self.num_classes).init(device),
            num_classes: self.num_classes,
            embedding_dim: nf * 2,
        }
    }
}

impl<B: Backend> ResNet<B> {
    pub fn forward(&self, x: Tensor<B, 3>) -> ClassifierOutput<B> {
        let x = self.block1.forward(x);
        let x = self.block2.forward(x);
        let x = self.block3.forward(x);

        let embeddings = global_average_pool(x);
        let logits = self.fc.forward(embeddings.clone());

        ClassifierOutput { logits, embeddings }
    }
}

impl<B: Backend> TimeSeriesClassifier<B> for ResNet<B> {
    fn forward(&self, x: Tensor<B, 3>) -> ClassifierOutput<B> {
        ResNet::forward(self, x)
    }

    fn embedding_dim(&self) -> usize {
        self.embedding_dim
    }

    fn num_classes(&self) -> usize {
        self.num_classes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;

    type TestBackend = NdArray;

    #[test]
    fn test_resnet_forward_shapes() {
        let device = Default::default();
        let model = ResNetConfig::new(3, 7).init::<TestBackend>(&device);

        let x = Tensor::<TestBackend, 3>::ones([2, 3, 32], &device);
        let output = model.forward(x);

        assert_eq!(output.logits.dims(), [2, 7]);
        assert_eq!(output.embeddings.dims(), [2, 128]);
    }

    #[test]
    fn test_shortcut_kinds() {
        let device = Default::default();
        let model = ResNetConfig::new(3, 2).init::<TestBackend>(&device);

        // Channel change needs a projection, equal widths only normalize
        assert!(model.block1.shortcut.projection.is_some());
        assert!(model.block2.shortcut.projection.is_some());
        assert!(model.block3.shortcut.bn.is_some());
    }

    #[test]
    fn test_block_outputs_are_non_negative() {
        let device = Default::default();
        let block = ResBlock::<TestBackend>::new(2, 4, [7, 5, 3], &device);

        let x = Tensor::<TestBackend, 3>::random(
            [2, 2, 16],
            burn::tensor::Distribution::Normal(0.0, 1.0),
            &device,
        );
        let min = block.forward(x).min().into_scalar();
        assert!(min >= 0.0);
    }
}
