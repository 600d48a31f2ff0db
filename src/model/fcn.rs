//! Fully Convolutional Network for time-series classification
//!
//! Three convolution blocks, global average pooling over time and a linear
//! classifier. The pooled features are the embedding.

use burn::{
    config::Config,
    module::Module,
    nn::{Linear, LinearConfig},
    tensor::{backend::Backend, Tensor},
};

use super::layers::{global_average_pool, ConvBlock};
use super::{ClassifierOutput, TimeSeriesClassifier};

/// Configuration for [`Fcn`]
#[derive(Config, Debug)]
pub struct FcnConfig {
    /// Number of input channels
    pub in_channels: usize,

    /// Number of output classes
    pub num_classes: usize,

    /// Filters of the three convolution blocks
    #[config(default = "[128, 256, 128]")]
    pub filters: [usize; 3],

    /// Kernel sizes of the three convolution blocks
    #[config(default = "[7, 5, 3]")]
    pub kernel_sizes: [usize; 3],
}

/// FCN classifier
#[derive(Module, Debug)]
pub struct Fcn<B: Backend> {
    pub conv1: ConvBlock<B>,
    pub conv2: ConvBlock<B>,
    pub conv3: ConvBlock<B>,
    pub fc: Linear<B>,

    num_classes: usize,
    embedding_dim: usize,
}

impl FcnConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> Fcn<B> {
        let [f1, f2, f3] = self.filters;
        let [k1, k2, k3] = self.kernel_sizes;

        Fcn {
            conv1: ConvBlock::new(self.in_channels, f1, k1, device),
            conv2: ConvBlock::new(f1, f2, k2, device),
            conv3: ConvBlock::new(f2, f3, k3, device),
            fc: LinearConfig::new(f3, self.num_classes).init(device),
            num_classes: self.num_classes,
            embedding_dim: f3,
        }
    }
}

impl<B: Backend> Fcn<B> {
    pub fn forward(&self, x: Tensor<B, 3>) -> ClassifierOutput<B> {
        let x = self.conv1.forward(x);
        let x = self.conv2.forward(x);
        let x = self.conv3.forward(x);

        let embeddings = global_average_pool(x);
        let logits = self.fc.forward(embeddings.clone());

        ClassifierOutput { logits, embeddings }
    }
}

impl<B: Backend> TimeSeriesClassifier<B> for Fcn<B> {
    fn forward(&self, x: Tensor<B, 3>) -> ClassifierOutput<B> {
        Fcn::forward(self, x)
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
    fn test_fcn_forward_shapes() {
        let device = Default::default();
        let model = FcnConfig::new(6, 5).init::<TestBackend>(&device);

        let x = Tensor::<TestBackend, 3>::zeros([3, 6, 40], &device);
        let output = model.forward(x);

        assert_eq!(output.logits.dims(), [3, 5]);
        assert_eq!(output.embeddings.dims(), [3, 128]);
        assert_eq!(TimeSeriesClassifier::<TestBackend>::embedding_dim(&model), 128);
    }

    #[test]
    fn test_fcn_custom_filters() {
        let device = Default::default();
        let model = FcnConfig::new(1, 2)
            .with_filters([8, 16, 4])
            .init::<TestBackend>(&device);

        let x = Tensor::<TestBackend, 3>::zeros([1, 1, 9], &device);
        assert_eq!(model.forward(x).embeddings.dims(), [1, 4]);
    }
}
