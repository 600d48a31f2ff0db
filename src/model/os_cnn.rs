//! Omni-Scale CNN
//!
//! Every layer runs one convolution per prime kernel size in parallel and
//! concatenates the results, so the network covers all receptive fields up
//! to the largest prime. Output channel counts are derived from a parameter
//! budget per layer by [`generate_layer_parameter_list`].

use burn::{
    config::Config,
    module::Module,
    nn::{
        conv::{Conv1d, Conv1dConfig},
        BatchNorm, BatchNormConfig, Linear, LinearConfig, Relu,
    },
    tensor::{backend::Backend, Tensor},
};
use serde::{Deserialize, Serialize};

use super::layers::{global_average_pool, pad_time};
use super::{ClassifierOutput, TimeSeriesClassifier};
use crate::utils::error::{Result as TscResult, TscError};

/// One parallel convolution inside an OS-CNN layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayerParameter {
    pub in_channels: usize,
    pub out_channels: usize,
    pub kernel_size: usize,
}

impl LayerParameter {
    fn new(in_channels: usize, out_channels: usize, kernel_size: usize) -> Self {
        Self {
            in_channels,
            out_channels,
            kernel_size,
        }
    }
}

/// Values in `start..=end` without a divisor in `2..value`
///
/// 1 counts as prime so that the kernel-size-1 path is always present.
pub fn primes_in_range(start: usize, end: usize) -> Vec<usize> {
    (start..=end)
        .filter(|&value| (2..value).all(|n| value % n != 0))
        .collect()
}

fn out_channels_for_budget(budget: usize, in_channels: usize, primes: &[usize]) -> TscResult<usize> {
    let kernel_sum: usize = primes.iter().sum();
    let out = budget / (in_channels * kernel_sum).max(1);

    if out == 0 {
        return Err(TscError::Model(format!(
            "parameter budget {} is too small for {} input channels and kernels {:?}",
            budget, in_channels, primes
        )));
    }
    Ok(out)
}

/// Plan the layers of an OS-CNN
///
/// One layer per entry of `budgets`, each holding one convolution per prime
/// kernel size in `start..=end`, followed by a final layer with the two
/// kernel sizes `start` and `start + 1`.
pub fn generate_layer_parameter_list(
    start: usize,
    end: usize,
    budgets: &[usize],
    in_channels: usize,
) -> TscResult<Vec<Vec<LayerParameter>>> {
    let primes = primes_in_range(start, end);
    if primes.is_empty() {
        return Err(TscError::Model(format!(
            "no prime kernel sizes between {} and {}",
            start, end
        )));
    }

    let mut layers = Vec::with_capacity(budgets.len() + 1);
    let mut in_ch = in_channels;
    for &budget in budgets {
        let out = out_channels_for_budget(budget, in_ch, &primes)?;
        layers.push(
            primes
                .iter()
                .map(|&k| LayerParameter::new(in_ch, out, k))
                .collect(),
        );
        in_ch = primes.len() * out;
    }

    let first_budget = budgets
        .first()
        .ok_or_else(|| TscError::Model("at least one parameter budget is required".to_string()))?;
    let first_out = primes.len() * out_channels_for_budget(*first_budget, in_channels, &primes)?;
    layers.push(vec![
        LayerParameter::new(in_ch, first_out, start),
        LayerParameter::new(in_ch, first_out, start + 1),
    ]);

    Ok(layers)
}

/// Zero padding `(left, right)` keeping the length of a kernel-`k` convolution
///
/// Matches centering every kernel inside the largest kernel of its layer.
pub fn same_padding(kernel_size: usize) -> (usize, usize) {
    let k = kernel_size.max(1);
    ((k - 1) / 2, k / 2)
}

/// Configuration for [`OsCnn`]
#[derive(Config, Debug)]
pub struct OsCnnConfig {
    /// Number of input channels
    pub in_channels: usize,

    /// Number of output classes
    pub num_classes: usize,

    /// Length of the input series
    pub series_length: usize,

    /// Smallest kernel size
    #[config(default = "1")]
    pub start_kernel_size: usize,

    /// Upper bound on the receptive field
    #[config(default = "89")]
    pub max_kernel_size: usize,
}

impl OsCnnConfig {
    /// Parameter budget of each prime layer
    pub fn budgets(&self) -> Vec<usize> {
        vec![8 * 128 * self.in_channels, 5 * 128 * 256 + 2 * 256 * 128]
    }

    /// Largest kernel size considered for this series length
    pub fn receptive_field(&self) -> usize {
        (self.series_length / 4).min(self.max_kernel_size)
    }

    pub fn layer_plan(&self) -> TscResult<Vec<Vec<LayerParameter>>> {
        generate_layer_parameter_list(
            self.start_kernel_size,
            self.receptive_field(),
            &self.budgets(),
            self.in_channels,
        )
    }

    pub fn init<B: Backend>(&self, device: &B::Device) -> TscResult<OsCnn<B>> {
        let plan = self.layer_plan()?;

        let layers: Vec<OsCnnLayer<B>> = plan
            .iter()
            .map(|params| OsCnnLayer::new(params, device))
            .collect();
        let embedding_dim: usize = plan
            .last()
            .map(|last| last.iter().map(|p| p.out_channels).sum())
            .unwrap_or_default();

        Ok(OsCnn {
            layers,
            fc: LinearConfig::new(embedding_dim, self.num_classes).init(device),
            num_classes: self.num_classes,
            embedding_dim,
        })
    }
}

/// Parallel convolutions of one OS-CNN layer
#[derive(Module, Debug)]
pub struct OsCnnLayer<B: Backend> {
    pub convs: Vec<Conv1d<B>>,
    pub bn: BatchNorm<B, 1>,
    pub relu: Relu,
    kernel_sizes: Vec<usize>,
}

impl<B: Backend> OsCnnLayer<B> {
    pub fn new(params: &[LayerParameter], device: &B::Device) -> Self {
        let convs = params
            .iter()
            .map(|p| Conv1dConfig::new(p.in_channels, p.out_channels, p.kernel_size).init(device))
            .collect();
        let out_channels = params.iter().map(|p| p.out_channels).sum();

        Self {
            convs,
            bn: BatchNormConfig::new(out_channels).init(device),
            relu: Relu::new(),
            kernel_sizes: params.iter().map(|p| p.kernel_size).collect(),
        }
    }

    pub fn forward(&self, x: Tensor<B, 3>) -> Tensor<B, 3> {
        let outputs: Vec<Tensor<B, 3>> = self
            .convs
            .iter()
            .zip(&self.kernel_sizes)
            .map(|(conv, &k)| {
                let (left, right) = same_padding(k);
                conv.forward(pad_time(x.clone(), left, right))
            })
            .collect();

        let x = Tensor::cat(outputs, 1);
        self.relu.forward(self.bn.forward(x))
    }
}

/// OS-CNN classifier
#[derive(Module, Debug)]
pub struct OsCnn<B: Backend> {
    pub layers: Vec<OsCnnLayer<B>>,
    pub fc: Linear<B>,

    num_classes: usize,
    embedding_dim: usize,
}

impl<B: Backend> OsCnn<B> {
    pub fn forward(&self, x: Tensor<B, 3>) -> ClassifierOutput<B> {
        let x = self.layers.iter().fold(x, |x, layer| layer.forward(x));

        let embeddings = global_average_pool(x);
        let logits = self.fc.forward(embeddings.clone());

        ClassifierOutput { logits, embeddings }
    }
}

impl<B: Backend> TimeSeriesClassifier<B> for OsCnn<B> {
    fn forward(&self, x: Tensor<B, 3>) -> ClassifierOutput<B> {
        OsCnn::forward(self, x)
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

    /// Active window of a kernel-`k` mask centered in a kernel of size `largest`
    fn mask_window(largest: usize, k: usize) -> (usize, usize) {
        let right = (largest - 1).div_ceil(2) - (k - 1).div_ceil(2);
        let left = largest - k - right;
        (left, right)
    }

    #[test]
    fn test_primes_include_one() {
        assert_eq!(primes_in_range(1, 12), vec![1, 2, 3, 5, 7, 11]);
        assert_eq!(primes_in_range(4, 4), Vec::<usize>::new());
    }

    #[test]
    fn test_layer_plan() {
        let plan = generate_layer_parameter_list(1, 5, &[8 * 128, 5 * 128 * 256 + 2 * 256 * 128], 1).unwrap();
        // primes [1, 2, 3, 5], sum 11
        assert_eq!(plan.len(), 3);

        let first_out = 1024 / 11;
        assert_eq!(plan[0].len(), 4);
        assert!(plan[0].iter().all(|p| p.in_channels == 1 && p.out_channels == first_out));
        assert_eq!(
            plan[0].iter().map(|p| p.kernel_size).collect::<Vec<_>>(),
            vec![1, 2, 3, 5]
        );

        let second_in = 4 * first_out;
        let second_out = 229_376 / (second_in * 11);
        assert!(plan[1].iter().all(|p| p.in_channels == second_in && p.out_channels == second_out));

        assert_eq!(
            plan[2],
            vec![
                LayerParameter::new(4 * second_out, 4 * first_out, 1),
                LayerParameter::new(4 * second_out, 4 * first_out, 2),
            ]
        );
    }

    #[test]
    fn test_empty_prime_range_is_an_error() {
        assert!(generate_layer_parameter_list(4, 4, &[1024], 1).is_err());
        assert!(generate_layer_parameter_list(1, 0, &[1024], 1).is_err());
    }

    #[test]
    fn test_tiny_budget_is_an_error() {
        assert!(generate_layer_parameter_list(1, 89, &[10], 3).is_err());
    }

    #[test]
    fn test_same_padding_matches_centered_mask() {
        for largest in 1..=24 {
            let (pad_left, _) = same_padding(largest);
            for k in 1..=largest {
                let (mask_left, _) = mask_window(largest, k);
                // The masked kernel sees the input shifted by the largest
                // kernel's left padding minus the mask offset
                let (left, right) = same_padding(k);
                assert_eq!(left, pad_left - mask_left, "largest {largest}, k {k}");
                assert_eq!(left + right, k - 1);
            }
        }
    }

    #[test]
    fn test_layer_keeps_length() {
        let device = Default::default();
        let params = vec![
            LayerParameter::new(2, 3, 1),
            LayerParameter::new(2, 3, 2),
            LayerParameter::new(2, 3, 7),
        ];
        let layer = OsCnnLayer::<TestBackend>::new(&params, &device);

        let x = Tensor::<TestBackend, 3>::ones([2, 2, 15], &device);
        assert_eq!(layer.forward(x).dims(), [2, 9, 15]);
    }

    #[test]
    fn test_os_cnn_forward_shapes() {
        let device = Default::default();
        let config = OsCnnConfig::new(2, 4, 24);
        assert_eq!(config.receptive_field(), 6);

        let model = config.init::<TestBackend>(&device).unwrap();
        // primes [1, 2, 3, 5], first layer 2048 / (2 * 11) = 93 per kernel
        assert_eq!(TimeSeriesClassifier::<TestBackend>::embedding_dim(&model), 2 * 4 * 93);

        let x = Tensor::<TestBackend, 3>::ones([3, 2, 24], &device);
        let output = model.forward(x);
        assert_eq!(output.logits.dims(), [3, 4]);
        assert_eq!(output.embeddings.dims(), [3, 744]);
    }

    #[test]
    fn test_short_series_has_no_kernels() {
        let device = Default::default();
        // length 3 gives a receptive field of 0
        assert!(OsCnnConfig::new(1, 2, 3).init::<TestBackend>(&device).is_err());
    }
}
