//! Label Encoding
//!
//! Maps the string class labels found in archive files onto contiguous
//! indices `0..num_classes`. Classes are ordered by sorting the distinct
//! training labels, so the encoding only depends on the label set.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::utils::error::{Result, TscError};

/// Encoder fitted on the training labels
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct LabelEncoder {
    classes: Vec<String>,
}

impl LabelEncoder {
    /// Fit the encoder on a set of labels
    pub fn fit<S: AsRef<str>>(labels: &[S]) -> Self {
        let classes: BTreeSet<&str> = labels.iter().map(|l| l.as_ref()).collect();
        Self {
            classes: classes.into_iter().map(str::to_string).collect(),
        }
    }

    /// Number of distinct classes seen at fit time
    pub fn num_classes(&self) -> usize {
        self.classes.len()
    }

    /// The class names in index order
    pub fn classes(&self) -> &[String] {
        &self.classes
    }

    /// Encode a single label
    pub fn encode(&self, label: &str) -> Result<usize> {
        self.classes
            .binary_search_by(|c| c.as_str().cmp(label))
            .map_err(|_| TscError::Dataset(format!("label '{}' was not seen in the training split", label)))
    }

    /// Encode every label, failing on the first unknown one
    pub fn transform<S: AsRef<str>>(&self, labels: &[S]) -> Result<Vec<usize>> {
        labels.iter().map(|l| self.encode(l.as_ref())).collect()
    }

    /// Decode an index back into its class name
    pub fn decode(&self, index: usize) -> Option<&str> {
        self.classes.get(index).map(String::as_str)
    }
}
