//! Model module for time-series classifiers using the Burn framework
//!
//! This module provides:
//! - Convolutional architectures: FCN, ResNet, InceptionTime, OS-CNN
//! - Hybrid recurrent/convolutional architectures: the RNN-FCN family,
//!   optionally with squeeze-excite blocks
//! - A common output type carrying both the logits and the embedding that
//!   feeds the final classifier, used by the center loss
//!
//! ## Input layout
//!
//! Every model consumes `[batch, channels, length]` tensors.

pub mod config;
pub mod fcn;
pub mod inception;
pub mod layers;
pub mod os_cnn;
pub mod resnet;
pub mod rnn_fcn;

use std::fmt;

use burn::{
    module::AutodiffModule,
    tensor::{
        backend::{AutodiffBackend, Backend},
        Tensor,
    },
};
use serde::{Deserialize, Serialize};

pub use config::ExperimentConfig;
pub use fcn::{Fcn, FcnConfig};
pub use inception::{InceptionTime, InceptionTimeConfig};
pub use os_cnn::{generate_layer_parameter_list, LayerParameter, OsCnn, OsCnnConfig};
pub use resnet::{ResNet, ResNetConfig};
pub use rnn_fcn::{RecurrentCellKind, RnnFcn, RnnFcnConfig};

use crate::utils::error::{Result, TscError};

/// Output of a classifier forward pass
#[derive(Debug, Clone)]
pub struct ClassifierOutput<B: Backend> {
    /// Unnormalized class scores `[batch, num_classes]`
    pub logits: Tensor<B, 2>,
    /// Input of the final linear layer `[batch, embedding_dim]`
    pub embeddings: Tensor<B, 2>,
}

/// Common interface of all time-series classifiers
pub trait TimeSeriesClassifier<B: Backend> {
    /// Map `[batch, channels, length]` to logits and embeddings
    fn forward(&self, x: Tensor<B, 3>) -> ClassifierOutput<B>;

    /// Width of the embedding fed to the final classifier
    fn embedding_dim(&self) -> usize;

    /// Number of output classes
    fn num_classes(&self) -> usize;
}

/// Receives the concrete model built by [`ModelKind::build`]
///
/// Lets callers write one generic routine instead of matching on every
/// architecture.
pub trait ModelVisitor<B: AutodiffBackend> {
    type Output;

    fn visit<M>(self, model: M) -> Self::Output
    where
        M: AutodiffModule<B> + TimeSeriesClassifier<B> + 'static,
        M::InnerModule: TimeSeriesClassifier<B::InnerBackend>;
}

/// Shape information needed to size a model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputShape {
    pub num_channels: usize,
    pub series_length: usize,
    pub num_classes: usize,
}

/// Supported architectures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelKind {
    Fcn,
    #[serde(rename = "resnet")]
    ResNet,
    #[serde(rename = "inceptiontime")]
    InceptionTime,
    OsCnn,
    RnnFcn,
    LstmFcn,
    GruFcn,
    MrnnFcn,
    MlstmFcn,
    MgruFcn,
}

impl ModelKind {
    pub const ALL: [ModelKind; 10] = [
        ModelKind::Fcn,
        ModelKind::ResNet,
        ModelKind::InceptionTime,
        ModelKind::OsCnn,
        ModelKind::RnnFcn,
        ModelKind::LstmFcn,
        ModelKind::GruFcn,
        ModelKind::MrnnFcn,
        ModelKind::MlstmFcn,
        ModelKind::MgruFcn,
    ];

    /// Parse a model name, case-insensitively
    ///
    /// Unrecognized names select OS-CNN.
    pub fn parse(name: &str) -> Self {
        let normalized = name.trim().to_lowercase().replace('-', "_");
        Self::ALL
            .iter()
            .copied()
            .find(|kind| kind.name() == normalized)
            .unwrap_or(ModelKind::OsCnn)
    }

    /// Lower-case name used in file names and reports
    pub fn name(&self) -> &'static str {
        match self {
            ModelKind::Fcn => "fcn",
            ModelKind::ResNet => "resnet",
            ModelKind::InceptionTime => "inceptiontime",
            ModelKind::OsCnn => "os_cnn",
            ModelKind::RnnFcn => "rnn_fcn",
            ModelKind::LstmFcn => "lstm_fcn",
            ModelKind::GruFcn => "gru_fcn",
            ModelKind::MrnnFcn => "mrnn_fcn",
            ModelKind::MlstmFcn => "mlstm_fcn",
            ModelKind::MgruFcn => "mgru_fcn",
        }
    }

    /// Recurrent-branch configuration for the RNN-FCN family
    pub fn rnn_fcn_config(&self, shape: &InputShape) -> Option<RnnFcnConfig> {
        let (cell, se) = match self {
            ModelKind::RnnFcn => (RecurrentCellKind::Rnn, 0),
            ModelKind::LstmFcn => (RecurrentCellKind::Lstm, 0),
            ModelKind::GruFcn => (RecurrentCellKind::Gru, 0),
            ModelKind::MrnnFcn => (RecurrentCellKind::Rnn, 16),
            ModelKind::MlstmFcn => (RecurrentCellKind::Lstm, 16),
            ModelKind::MgruFcn => (RecurrentCellKind::Gru, 16),
            _ => return None,
        };

        Some(
            RnnFcnConfig::new(shape.num_channels, shape.num_classes, cell)
                .with_shuffle(false)
                .with_se(se),
        )
    }

    /// Build the model and hand it to `visitor`
    pub fn build<B, V>(&self, shape: &InputShape, device: &B::Device, visitor: V) -> Result<V::Output>
    where
        B: AutodiffBackend,
        V: ModelVisitor<B>,
    {
        let output = match self {
            ModelKind::Fcn => {
                visitor.visit(FcnConfig::new(shape.num_channels, shape.num_classes).init::<B>(device))
            }
            ModelKind::ResNet => {
                visitor.visit(ResNetConfig::new(shape.num_channels, shape.num_classes).init::<B>(device))
            }
            ModelKind::InceptionTime => visitor.visit(
                InceptionTimeConfig::new(shape.num_channels, shape.num_classes).init::<B>(device),
            ),
            ModelKind::OsCnn => visitor.visit(
                OsCnnConfig::new(shape.num_channels, shape.num_classes, shape.series_length)
                    .init::<B>(device)?,
            ),
            _ => {
                let config = self.rnn_fcn_config(shape).ok_or_else(|| {
                    TscError::Model(format!("{} has no recurrent configuration", self))
                })?;
                visitor.visit(config.init::<B>(device)?)
            }
        };

        Ok(output)
    }
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::Autodiff;
    use burn_ndarray::NdArray;

    type TestBackend = Autodiff<NdArray>;

    struct ShapeCheck {
        batch: usize,
        shape: InputShape,
    }

    impl ModelVisitor<TestBackend> for ShapeCheck {
        type Output = ([usize; 2], [usize; 2], usize);

        fn visit<M>(self, model: M) -> Self::Output
        where
            M: AutodiffModule<TestBackend> + TimeSeriesClassifier<TestBackend> + 'static,
            M::InnerModule: TimeSeriesClassifier<<TestBackend as AutodiffBackend>::InnerBackend>,
        {
            let device = Default::default();
            let x = Tensor::<TestBackend, 3>::ones(
                [self.batch, self.shape.num_channels, self.shape.series_length],
                &device,
            );
            let output = model.forward(x);
            (
                output.logits.dims(),
                output.embeddings.dims(),
                model.embedding_dim(),
            )
        }
    }

    #[test]
    fn test_parse_model_names() {
        assert_eq!(ModelKind::parse("FCN"), ModelKind::Fcn);
        assert_eq!(ModelKind::parse("MLSTM_FCN"), ModelKind::MlstmFcn);
        assert_eq!(ModelKind::parse("InceptionTime"), ModelKind::InceptionTime);
        assert_eq!(ModelKind::parse("gru-fcn"), ModelKind::GruFcn);
        // Anything else falls back to OS-CNN
        assert_eq!(ModelKind::parse("os_cnn"), ModelKind::OsCnn);
        assert_eq!(ModelKind::parse("whatever"), ModelKind::OsCnn);
    }

    #[test]
    fn test_names_round_trip() {
        for kind in ModelKind::ALL {
            assert_eq!(ModelKind::parse(kind.name()), kind);
        }
    }

    #[test]
    fn test_every_kind_builds_and_runs() {
        let device = Default::default();
        let shape = InputShape {
            num_channels: 3,
            series_length: 24,
            num_classes: 4,
        };

        for kind in ModelKind::ALL {
            let check = ShapeCheck { batch: 2, shape };
            let (logits, embeddings, dim) = kind.build::<TestBackend, _>(&shape, &device, check).unwrap();
            assert_eq!(logits, [2, 4], "{kind}");
            assert_eq!(embeddings, [2, dim], "{kind}");
        }
    }

    #[test]
    fn test_rnn_fcn_variants() {
        let shape = InputShape {
            num_channels: 2,
            series_length: 10,
            num_classes: 3,
        };
        let mlstm = ModelKind::MlstmFcn.rnn_fcn_config(&shape).unwrap();
        assert_eq!(mlstm.cell, RecurrentCellKind::Lstm);
        assert_eq!(mlstm.se, 16);
        assert!(!mlstm.shuffle);

        let gru = ModelKind::GruFcn.rnn_fcn_config(&shape).unwrap();
        assert_eq!(gru.se, 0);
        assert!(ModelKind::Fcn.rnn_fcn_config(&shape).is_none());
    }
}
