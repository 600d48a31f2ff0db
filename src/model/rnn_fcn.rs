//! Hybrid recurrent / fully convolutional classifiers
//!
//! A recurrent branch (Elman RNN, LSTM or GRU) reads the series and keeps the
//! output of its last step; a three-block FCN branch, optionally with
//! squeeze-excite recalibration after the first two blocks, is pooled over
//! time. Both are concatenated into the embedding fed to the classifier.

use burn::{
    config::Config,
    module::Module,
    nn::{
        gru::{Gru, GruConfig},
        Dropout, DropoutConfig, Linear, LinearConfig, Lstm, LstmConfig,
    },
    tensor::{activation::tanh, backend::Backend, Tensor},
};
use serde::{Deserialize, Serialize};

use super::layers::{global_average_pool, ConvBlock, SqueezeExcite, SqueezeExciteConfig};
use super::{ClassifierOutput, TimeSeriesClassifier};
use crate::utils::error::{Result as TscResult, TscError};

/// Recurrent cell used by the recurrent branch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecurrentCellKind {
    Rnn,
    Lstm,
    Gru,
}

/// Single-layer Elman RNN: `h_t = tanh(W_ih x_t + W_hh h_{t-1})`
#[derive(Module, Debug)]
pub struct ElmanRnn<B: Backend> {
    pub input: Linear<B>,
    pub hidden: Linear<B>,
    d_hidden: usize,
}

impl<B: Backend> ElmanRnn<B> {
    pub fn new(d_input: usize, d_hidden: usize, bias: bool, device: &B::Device) -> Self {
        Self {
            input: LinearConfig::new(d_input, d_hidden).with_bias(bias).init(device),
            hidden: LinearConfig::new(d_hidden, d_hidden).with_bias(bias).init(device),
            d_hidden,
        }
    }

    /// `[batch, steps, d_input] -> [batch, steps, d_hidden]`
    pub fn forward(&self, x: Tensor<B, 3>) -> Tensor<B, 3> {
        let [batch, steps, _] = x.dims();
        let projected = self.input.forward(x);

        let mut state = Tensor::<B, 2>::zeros([batch, self.d_hidden], &projected.device());
        let mut outputs = Vec::with_capacity(steps);
        for t in 0..steps {
            let x_t = projected
                .clone()
                .slice([0..batch, t..t + 1, 0..self.d_hidden])
                .reshape([batch, self.d_hidden]);
            state = tanh(x_t + self.hidden.forward(state));
            outputs.push(state.clone());
        }

        Tensor::stack(outputs, 1)
    }
}

/// One direction of one recurrent layer; exactly one cell is set
#[derive(Module, Debug)]
pub struct RecurrentLayer<B: Backend> {
    pub rnn: Option<ElmanRnn<B>>,
    pub lstm: Option<Lstm<B>>,
    pub gru: Option<Gru<B>>,
}

impl<B: Backend> RecurrentLayer<B> {
    pub fn new(
        cell: RecurrentCellKind,
        d_input: usize,
        d_hidden: usize,
        bias: bool,
        device: &B::Device,
    ) -> Self {
        let mut layer = Self {
            rnn: None,
            lstm: None,
            gru: None,
        };
        match cell {
            RecurrentCellKind::Rnn => layer.rnn = Some(ElmanRnn::new(d_input, d_hidden, bias, device)),
            RecurrentCellKind::Lstm => {
                layer.lstm = Some(LstmConfig::new(d_input, d_hidden, bias).init(device))
            }
            RecurrentCellKind::Gru => {
                layer.gru = Some(GruConfig::new(d_input, d_hidden, bias).init(device))
            }
        }
        layer
    }

    pub fn forward(&self, x: Tensor<B, 3>) -> Tensor<B, 3> {
        match (&self.rnn, &self.lstm, &self.gru) {
            (Some(rnn), _, _) => rnn.forward(x),
            (None, Some(lstm), _) => lstm.forward(x, None).0,
            (None, None, Some(gru)) => gru.forward(x, None),
            (None, None, None) => x,
        }
    }
}

/// Stacked, optionally bidirectional recurrent encoder
#[derive(Module, Debug)]
pub struct RecurrentEncoder<B: Backend> {
    pub forward_layers: Vec<RecurrentLayer<B>>,
    pub backward_layers: Vec<RecurrentLayer<B>>,
    pub dropout: Dropout,
}

impl<B: Backend> RecurrentEncoder<B> {
    pub fn forward(&self, x: Tensor<B, 3>) -> Tensor<B, 3> {
        let depth = self.forward_layers.len();
        let mut x = x;

        for (i, layer) in self.forward_layers.iter().enumerate() {
            let forward = layer.forward(x.clone());
            x = match self.backward_layers.get(i) {
                Some(backward) => {
                    let reversed = backward.forward(x.flip([1])).flip([1]);
                    Tensor::cat(vec![forward, reversed], 2)
                }
                None => forward,
            };

            if i + 1 < depth {
                x = self.dropout.forward(x);
            }
        }

        x
    }
}

/// Configuration for [`RnnFcn`]
#[derive(Config, Debug)]
pub struct RnnFcnConfig {
    /// Number of input channels
    pub in_channels: usize,

    /// Number of output classes
    pub num_classes: usize,

    /// Recurrent cell
    pub cell: RecurrentCellKind,

    /// Series length, needed when `shuffle` feeds channels as time steps
    #[config(default = "None")]
    pub seq_len: Option<usize>,

    #[config(default = "100")]
    pub hidden_size: usize,

    #[config(default = "1")]
    pub rnn_layers: usize,

    #[config(default = "true")]
    pub bias: bool,

    /// Dropout between stacked recurrent layers
    #[config(default = "0.0")]
    pub cell_dropout: f64,

    /// Dropout on the last recurrent output
    #[config(default = "0.8")]
    pub rnn_dropout: f64,

    #[config(default = "false")]
    pub bidirectional: bool,

    /// Feed the recurrent branch `[batch, channels, length]` as is, treating
    /// channels as time steps; otherwise permute to `[batch, length, channels]`
    #[config(default = "true")]
    pub shuffle: bool,

    #[config(default = "0.0")]
    pub fc_dropout: f64,

    #[config(default = "[128, 256, 128]")]
    pub conv_layers: [usize; 3],

    #[config(default = "[7, 5, 3]")]
    pub kernel_sizes: [usize; 3],

    /// Squeeze-excite reduction; 0 disables the blocks
    #[config(default = "0")]
    pub se: usize,
}

impl RnnFcnConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> TscResult<RnnFcn<B>> {
        let rnn_input = if self.shuffle {
            self.seq_len.ok_or_else(|| {
                TscError::Model("shuffled RNN-FCN input needs the series length".to_string())
            })?
        } else {
            self.in_channels
        };

        let directions = if self.bidirectional { 2 } else { 1 };
        let layer_input = |i: usize| {
            if i == 0 {
                rnn_input
            } else {
                self.hidden_size * directions
            }
        };
        let build_layers = || -> Vec<RecurrentLayer<B>> {
            (0..self.rnn_layers)
                .map(|i| RecurrentLayer::new(self.cell, layer_input(i), self.hidden_size, self.bias, device))
                .collect()
        };

        let rnn = RecurrentEncoder {
            forward_layers: build_layers(),
            backward_layers: if self.bidirectional {
                build_layers()
            } else {
                Vec::new()
            },
            dropout: DropoutConfig::new(self.cell_dropout).init(),
        };

        let [f1, f2, f3] = self.conv_layers;
        let [k1, k2, k3] = self.kernel_sizes;
        let se = |channels: usize| {
            (self.se != 0).then(|| {
                SqueezeExciteConfig::new(channels)
                    .with_reduction(self.se)
                    .init(device)
            })
        };

        let embedding_dim = self.hidden_size * directions + f3;

        Ok(RnnFcn {
            rnn,
            rnn_dropout: DropoutConfig::new(self.rnn_dropout).init(),
            conv1: ConvBlock::new(self.in_channels, f1, k1, device),
            se1: se(f1),
            conv2: ConvBlock::new(f1, f2, k2, device),
            se2: se(f2),
            conv3: ConvBlock::new(f2, f3, k3, device),
            fc_dropout: DropoutConfig::new(self.fc_dropout).init(),
            fc: LinearConfig::new(embedding_dim, self.num_classes).init(device),
            shuffle: self.shuffle,
            num_classes: self.num_classes,
            embedding_dim,
        })
    }
}

/// RNN-FCN classifier family
#[derive(Module, Debug)]
pub struct RnnFcn<B: Backend> {
    pub rnn: RecurrentEncoder<B>,
    pub rnn_dropout: Dropout,
    pub conv1: ConvBlock<B>,
    pub se1: Option<SqueezeExcite<B>>,
    pub conv2: ConvBlock<B>,
    pub se2: Option<SqueezeExcite<B>>,
    pub conv3: ConvBlock<B>,
    pub fc_dropout: Dropout,
    pub fc: Linear<B>,

    shuffle: bool,
    num_classes: usize,
    embedding_dim: usize,
}

impl<B: Backend> RnnFcn<B> {
    pub fn forward(&self, x: Tensor<B, 3>) -> ClassifierOutput<B> {
        // Recurrent branch, many-to-one
        let rnn_input = if self.shuffle {
            x.clone()
        } else {
            x.clone().swap_dims(1, 2)
        };
        let output = self.rnn.forward(rnn_input);
        let [batch, steps, width] = output.dims();
        let last = output
            .slice([0..batch, steps - 1..steps, 0..width])
            .reshape([batch, width]);
        let last = self.rnn_dropout.forward(last);

        // Convolutional branch
        let x = self.conv1.forward(x);
        let x = match &self.se1 {
            Some(se) => se.forward(x),
            None => x,
        };
        let x = self.conv2.forward(x);
        let x = match &self.se2 {
            Some(se) => se.forward(x),
            None => x,
        };
        let x = self.conv3.forward(x);
        let pooled = global_average_pool(x);

        let embeddings = self.fc_dropout.forward(Tensor::cat(vec![last, pooled], 1));
        let logits = self.fc.forward(embeddings.clone());

        ClassifierOutput { logits, embeddings }
    }
}

impl<B: Backend> TimeSeriesClassifier<B> for RnnFcn<B> {
    fn forward(&self, x: Tensor<B, 3>) -> ClassifierOutput<B> {
        RnnFcn::forward(self, x)
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
    fn test_elman_rnn_shapes_and_range() {
        let device = Default::default();
        let rnn = ElmanRnn::<TestBackend>::new(3, 5, true, &device);

        let x = Tensor::<TestBackend, 3>::ones([2, 7, 3], &device);
        let out = rnn.forward(x);
        assert_eq!(out.dims(), [2, 7, 5]);

        // tanh output
        assert!(out.clone().max().into_scalar() <= 1.0);
        assert!(out.min().into_scalar() >= -1.0);
    }

    #[test]
    fn test_recurrent_layer_cells() {
        let device = Default::default();
        for cell in [RecurrentCellKind::Rnn, RecurrentCellKind::Lstm, RecurrentCellKind::Gru] {
            let layer = RecurrentLayer::<TestBackend>::new(cell, 4, 6, true, &device);
            let x = Tensor::<TestBackend, 3>::ones([2, 9, 4], &device);
            assert_eq!(layer.forward(x).dims(), [2, 9, 6], "{cell:?}");
        }
    }

    #[test]
    fn test_bidirectional_stacked_encoder() {
        let device = Default::default();
        let model = RnnFcnConfig::new(3, 4, RecurrentCellKind::Gru)
            .with_shuffle(false)
            .with_bidirectional(true)
            .with_rnn_layers(2)
            .with_hidden_size(8)
            .init::<TestBackend>(&device)
            .unwrap();
        assert_eq!(model.rnn.backward_layers.len(), 2);

        let x = Tensor::<TestBackend, 3>::ones([2, 3, 11], &device);
        assert_eq!(model.rnn.forward(x.clone().swap_dims(1, 2)).dims(), [2, 11, 16]);

        let output = model.forward(x);
        assert_eq!(output.embeddings.dims(), [2, 16 + 128]);
        assert_eq!(output.logits.dims(), [2, 4]);
    }

    #[test]
    fn test_lstm_fcn_forward_shapes() {
        let device = Default::default();
        let model = RnnFcnConfig::new(2, 3, RecurrentCellKind::Lstm)
            .with_shuffle(false)
            .init::<TestBackend>(&device)
            .unwrap();
        assert!(model.se1.is_none());

        let x = Tensor::<TestBackend, 3>::ones([4, 2, 20], &device);
        let output = model.forward(x);
        assert_eq!(output.logits.dims(), [4, 3]);
        assert_eq!(output.embeddings.dims(), [4, 228]);
    }

    #[test]
    fn test_squeeze_excite_variant() {
        let device = Default::default();
        let model = RnnFcnConfig::new(2, 3, RecurrentCellKind::Rnn)
            .with_shuffle(false)
            .with_se(16)
            .init::<TestBackend>(&device)
            .unwrap();
        assert!(model.se1.is_some() && model.se2.is_some());

        let x = Tensor::<TestBackend, 3>::ones([1, 2, 10], &device);
        assert_eq!(model.forward(x).logits.dims(), [1, 3]);
    }

    #[test]
    fn test_shuffle_uses_channels_as_steps() {
        let device = Default::default();
        assert!(RnnFcnConfig::new(2, 3, RecurrentCellKind::Lstm)
            .init::<TestBackend>(&device)
            .is_err());

        let model = RnnFcnConfig::new(2, 3, RecurrentCellKind::Lstm)
            .with_seq_len(Some(10))
            .init::<TestBackend>(&device)
            .unwrap();
        let x = Tensor::<TestBackend, 3>::ones([1, 2, 10], &device);
        assert_eq!(model.forward(x).embeddings.dims(), [1, 228]);
    }
}
