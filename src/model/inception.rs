//! InceptionTime classifier
//!
//! Six inception modules with a residual connection every three modules.
//! Each module runs an optional 1x1 bottleneck followed by three parallel
//! convolutions of decreasing kernel size, plus a max-pool branch; the four
//! branches are concatenated, batch-normalized and rectified.

use burn::{
    config::Config,
    module::Module,
    nn::{
        conv::{Conv1d, Conv1dConfig},
        pool::{MaxPool1d, MaxPool1dConfig},
        BatchNorm, BatchNormConfig, Linear, LinearConfig, PaddingConfig1d, Relu,
    },
    tensor::{backend::Backend, Tensor},
};

use super::layers::{global_average_pool, Shortcut};
use super::{ClassifierOutput, TimeSeriesClassifier};

/// Configuration for [`InceptionTime`]
#[derive(Config, Debug)]
pub struct InceptionTimeConfig {
    /// Number of input channels
    pub in_channels: usize,

    /// Number of output classes
    pub num_classes: usize,

    /// Filters per branch; a module outputs four times as many channels
    #[config(default = "32")]
    pub filters: usize,

    /// Largest kernel size; the branches use `ks`, `ks / 2` and `ks / 4`
    /// rounded down to odd values
    #[config(default = "40")]
    pub kernel_size: usize,

    /// Number of inception modules
    #[config(default = "6")]
    pub depth: usize,

    /// Add a shortcut every three modules
    #[config(default = "true")]
    pub residual: bool,
}

/// Odd kernel sizes of the three convolution branches
pub fn branch_kernel_sizes(kernel_size: usize) -> [usize; 3] {
    [1, 2, 4].map(|div| {
        let k = (kernel_size / div).max(1);
        if k % 2 == 0 {
            k - 1
        } else {
            k
        }
    })
}

/// A single inception module
#[derive(Module, Debug)]
pub struct InceptionModule<B: Backend> {
    pub bottleneck: Option<Conv1d<B>>,
    pub convs: Vec<Conv1d<B>>,
    pub maxpool: MaxPool1d,
    pub maxpool_conv: Conv1d<B>,
    pub bn: BatchNorm<B, 1>,
    pub relu: Relu,
}

impl<B: Backend> InceptionModule<B> {
    pub fn new(in_channels: usize, filters: usize, kernel_size: usize, device: &B::Device) -> Self {
        // A single input channel gains nothing from a bottleneck
        let bottleneck = (in_channels > 1).then(|| {
            Conv1dConfig::new(in_channels, filters, 1)
                .with_bias(false)
                .init(device)
        });
        let branch_in = if bottleneck.is_some() {
            filters
        } else {
            in_channels
        };

        let convs = branch_kernel_sizes(kernel_size)
            .into_iter()
            .map(|k| {
                Conv1dConfig::new(branch_in, filters, k)
                    .with_padding(PaddingConfig1d::Same)
                    .with_bias(false)
                    .init(device)
            })
            .collect();

        Self {
            bottleneck,
            convs,
            maxpool: MaxPool1dConfig::new(3)
                .with_stride(1)
                .with_padding(PaddingConfig1d::Explicit(1))
                .init(),
            maxpool_conv: Conv1dConfig::new(in_channels, filters, 1)
                .with_bias(false)
                .init(device),
            bn: BatchNormConfig::new(filters * 4).init(device),
            relu: Relu::new(),
        }
    }

    pub fn forward(&self, x: Tensor<B, 3>) -> Tensor<B, 3> {
        let input = x.clone();
        let x = match &self.bottleneck {
            Some(bottleneck) => bottleneck.forward(x),
            None => x,
        };

        let mut branches: Vec<Tensor<B, 3>> = self
            .convs
            .iter()
            .map(|conv| conv.forward(x.clone()))
            .collect();
        branches.push(self.maxpool_conv.forward(self.maxpool.forward(input)));

        let x = Tensor::cat(branches, 1);
        self.relu.forward(self.bn.forward(x))
    }
}

/// InceptionTime classifier
#[derive(Module, Debug)]
pub struct InceptionTime<B: Backend> {
    pub modules: Vec<InceptionModule<B>>,
    pub shortcuts: Vec<Shortcut<B>>,
    pub relu: Relu,
    pub fc: Linear<B>,

    num_classes: usize,
    embedding_dim: usize,
}

impl InceptionTimeConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> InceptionTime<B> {
        let width = self.filters * 4;

        let modules = (0..self.depth)
            .map(|d| {
                let in_channels = if d == 0 { self.in_channels } else { width };
                InceptionModule::new(in_channels, self.filters, self.kernel_size, device)
            })
            .collect();

        let shortcuts = if self.residual {
            (0..self.depth / 3)
                .map(|i| {
                    let in_channels = if i == 0 { self.in_channels } else { width };
                    Shortcut::new(in_channels, width, device)
                })
                .collect()
        } else {
            Vec::new()
        };

        InceptionTime {
            modules,
            shortcuts,
            relu: Relu::new(),
            fc: LinearConfig::new(width, self.num_classes).init(device),
            num_classes: self.num_classes,
            embedding_dim: width,
        }
    }
}

impl<B: Backend> InceptionTime<B> {
    pub fn forward(&self, x: Tensor<B, 3>) -> ClassifierOutput<B> {
        let mut residual = x.clone();
        let mut x = x;

        for (d, module) in self.modules.iter().enumerate() {
            x = module.forward(x);

            if d % 3 == 2 {
                if let Some(shortcut) = self.shortcuts.get(d / 3) {
                    x = self.relu.forward(x + shortcut.forward(residual));
                    residual = x.clone();
                }
            }
        }

        let embeddings = global_average_pool(x);
        let logits = self.fc.forward(embeddings.clone());

        ClassifierOutput { logits, embeddings }
    }
}

impl<B: Backend> TimeSeriesClassifier<B> for InceptionTime<B> {
    fn forward(&self, x: Tensor<B, 3>) -> ClassifierOutput<B> {
        InceptionTime::forward(self, x)
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
    fn test_branch_kernel_sizes() {
        assert_eq!(branch_kernel_sizes(40), [39, 19, 9]);
        assert_eq!(branch_kernel_sizes(9), [9, 3, 1]);
    }

    #[test]
    fn test_module_output_width() {
        let device = Default::default();
        let module = InceptionModule::<TestBackend>::new(3, 8, 40, &device);
        assert!(module.bottleneck.is_some());

        let x = Tensor::<TestBackend, 3>::ones([2, 3, 50], &device);
        assert_eq!(module.forward(x).dims(), [2, 32, 50]);
    }

    #[test]
    fn test_univariate_module_skips_bottleneck() {
        let device = Default::default();
        let module = InceptionModule::<TestBackend>::new(1, 8, 40, &device);
        assert!(module.bottleneck.is_none());

        let x = Tensor::<TestBackend, 3>::ones([1, 1, 12], &device);
        assert_eq!(module.forward(x).dims(), [1, 32, 12]);
    }

    #[test]
    fn test_inception_time_forward_shapes() {
        let device = Default::default();
        let model = InceptionTimeConfig::new(4, 3).init::<TestBackend>(&device);
        assert_eq!(model.modules.len(), 6);
        assert_eq!(model.shortcuts.len(), 2);

        let x = Tensor::<TestBackend, 3>::ones([2, 4, 30], &device);
        let output = model.forward(x);
        assert_eq!(output.logits.dims(), [2, 3]);
        assert_eq!(output.embeddings.dims(), [2, 128]);
    }
}
