//! Burn Dataset Integration for time-series archives
//!
//! This module implements Burn's Dataset trait and Batcher for the in-memory
//! archive splits.

use burn::data::dataloader::batcher::Batcher;
use burn::data::dataset::Dataset;
use burn::prelude::*;
use serde::{Deserialize, Serialize};

use super::label_encoder::LabelEncoder;
use super::loader::RawSplit;
use crate::utils::error::{Result, TscError};

/// A single series ready for Burn
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TimeSeriesItem {
    /// Channel-major values `[channels * length]`
    pub values: Vec<f32>,
    /// Encoded class label
    pub label: usize,
}

/// In-memory dataset implementing Burn's Dataset trait
#[derive(Debug, Clone)]
pub struct TimeSeriesDataset {
    items: Vec<TimeSeriesItem>,
    num_channels: usize,
    series_length: usize,
}

impl TimeSeriesDataset {
    /// Build a dataset from a raw split, encoding its labels
    pub fn from_split(split: &RawSplit, encoder: &LabelEncoder) -> Result<Self> {
        let items = split
            .samples
            .iter()
            .map(|sample| {
                Ok(TimeSeriesItem {
                    values: sample.values.clone(),
                    label: encoder.encode(&sample.label)?,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            items,
            num_channels: split.num_channels,
            series_length: split.series_length,
        })
    }

    /// Build a dataset from already encoded items
    pub fn from_items(
        items: Vec<TimeSeriesItem>,
        num_channels: usize,
        series_length: usize,
    ) -> Result<Self> {
        if let Some(bad) = items
            .iter()
            .position(|item| item.values.len() != num_channels * series_length)
        {
            return Err(TscError::Dataset(format!(
                "item {} has {} values, expected {} x {}",
                bad,
                items[bad].values.len(),
                num_channels,
                series_length
            )));
        }

        Ok(Self {
            items,
            num_channels,
            series_length,
        })
    }

    /// Number of input channels
    pub fn num_channels(&self) -> usize {
        self.num_channels
    }

    /// Time steps per series
    pub fn series_length(&self) -> usize {
        self.series_length
    }

    /// Get samples per class count
    pub fn class_distribution(&self, num_classes: usize) -> Vec<usize> {
        let mut counts = vec![0usize; num_classes];
        for item in &self.items {
            if item.label < num_classes {
                counts[item.label] += 1;
            }
        }
        counts
    }
}

impl Dataset<TimeSeriesItem> for TimeSeriesDataset {
    fn get(&self, index: usize) -> Option<TimeSeriesItem> {
        self.items.get(index).cloned()
    }

    fn len(&self) -> usize {
        self.items.len()
    }
}

/// A batch of series for training
#[derive(Clone, Debug)]
pub struct TimeSeriesBatch<B: Backend> {
    /// Inputs with shape [batch_size, channels, length]
    pub inputs: Tensor<B, 3>,
    /// Labels with shape [batch_size]
    pub targets: Tensor<B, 1, Int>,
}

/// Batcher stacking items into `[batch, channels, length]` tensors
#[derive(Clone, Debug)]
pub struct TimeSeriesBatcher {
    num_channels: usize,
    series_length: usize,
}

impl TimeSeriesBatcher {
    /// Create a batcher for series of the given shape
    pub fn new(num_channels: usize, series_length: usize) -> Self {
        Self {
            num_channels,
            series_length,
        }
    }

    /// Batcher matching a dataset's shape
    pub fn for_dataset(dataset: &TimeSeriesDataset) -> Self {
        Self::new(dataset.num_channels(), dataset.series_length())
    }
}

impl<B: Backend> Batcher<B, TimeSeriesItem, TimeSeriesBatch<B>> for TimeSeriesBatcher {
    fn batch(&self, items: Vec<TimeSeriesItem>, device: &B::Device) -> TimeSeriesBatch<B> {
        let batch_size = items.len();

        let values: Vec<f32> = items
            .iter()
            .flat_map(|item| item.values.iter().copied())
            .collect();
        let inputs = Tensor::<B, 3>::from_floats(
            TensorData::new(values, [batch_size, self.num_channels, self.series_length]),
            device,
        );

        let targets_data: Vec<i64> = items.iter().map(|item| item.label as i64).collect();
        let targets =
            Tensor::<B, 1, Int>::from_data(TensorData::new(targets_data, [batch_size]), device);

        TimeSeriesBatch { inputs, targets }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::loader::TimeSeriesSample;
    use burn_ndarray::NdArray;

    type TestBackend = NdArray;

    fn split() -> RawSplit {
        RawSplit {
            samples: vec![
                TimeSeriesSample {
                    values: vec![1.0, 2.0, 3.0, 4.0],
                    label: "b".to_string(),
                },
                TimeSeriesSample {
                    values: vec![5.0, 6.0, 7.0, 8.0],
                    label: "a".to_string(),
                },
            ],
            num_channels: 2,
            series_length: 2,
        }
    }

    #[test]
    fn test_from_split_encodes_labels() {
        let split = split();
        let encoder = LabelEncoder::fit(&split.labels());
        let dataset = TimeSeriesDataset::from_split(&split, &encoder).unwrap();

        assert_eq!(dataset.len(), 2);
        assert_eq!(dataset.get(0).unwrap().label, 1);
        assert_eq!(dataset.get(1).unwrap().label, 0);
        assert!(dataset.get(2).is_none());
        assert_eq!(dataset.class_distribution(2), vec![1, 1]);
    }

    #[test]
    fn test_from_items_checks_shape() {
        let item = TimeSeriesItem {
            values: vec![0.0; 5],
            label: 0,
        };
        assert!(TimeSeriesDataset::from_items(vec![item], 2, 3).is_err());
    }

    #[test]
    fn test_batcher_shapes() {
        let split = split();
        let encoder = LabelEncoder::fit(&split.labels());
        let dataset = TimeSeriesDataset::from_split(&split, &encoder).unwrap();
        let batcher = TimeSeriesBatcher::for_dataset(&dataset);
        let device = Default::default();

        let items = vec![dataset.get(0).unwrap(), dataset.get(1).unwrap()];
        let batch: TimeSeriesBatch<TestBackend> = batcher.batch(items, &device);

        assert_eq!(batch.inputs.dims(), [2, 2, 2]);
        assert_eq!(batch.targets.dims(), [2]);

        let values: Vec<f32> = batch.inputs.into_data().to_vec().unwrap();
        assert_eq!(values, vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0]);
        let targets: Vec<i64> = batch.targets.into_data().convert::<i64>().to_vec().unwrap();
        assert_eq!(targets, vec![1, 0]);
    }
}
