//! Result reports
//!
//! Every run leaves a one-row CSV with the headline numbers and a JSON dump
//! of the configuration that produced them.

use std::fs::File;
use std::io::Write;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::model::config::ExperimentConfig;
use crate::utils::error::{Result, TscError};
use crate::utils::round_to;

/// Decimals kept in the results CSV
pub const REPORT_DECIMALS: i32 = 5;

/// Headline numbers of a finished run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultRow {
    pub model: String,
    pub train_loss: f64,
    pub test_loss: f64,
    pub test_acc: f64,
}

impl ResultRow {
    /// Copy with every metric rounded for the report
    pub fn rounded(&self) -> Self {
        Self {
            model: self.model.clone(),
            train_loss: round_to(self.train_loss, REPORT_DECIMALS),
            test_loss: round_to(self.test_loss, REPORT_DECIMALS),
            test_acc: round_to(self.test_acc, REPORT_DECIMALS),
        }
    }
}

/// Write the results CSV with a leading unnamed index column
pub fn write_results_csv(path: &Path, row: &ResultRow) -> Result<()> {
    let row = row.rounded();
    let mut writer = csv::Writer::from_path(path)?;

    writer.write_record(["", "model", "train_loss", "test_loss", "test_acc"])?;
    writer.write_record([
        "0".to_string(),
        row.model,
        format_float(row.train_loss),
        format_float(row.test_loss),
        format_float(row.test_acc),
    ])?;
    writer.flush()?;

    Ok(())
}

/// Shortest decimal form, keeping `.0` on whole numbers
fn format_float(value: f64) -> String {
    if value.is_finite() && value.fract() == 0.0 {
        format!("{:.1}", value)
    } else {
        value.to_string()
    }
}

/// Read back the single row of a results CSV
pub fn read_results_csv(path: &Path) -> Result<ResultRow> {
    let mut reader = csv::Reader::from_path(path)?;
    let record = reader
        .records()
        .next()
        .ok_or_else(|| TscError::Dataset(format!("{} has no rows", path.display())))??;

    let field = |i: usize| record.get(i).unwrap_or_default();
    let number = |i: usize| -> Result<f64> {
        field(i).parse().map_err(|_| {
            TscError::Serialization(format!(
                "column {} of {} is not a number",
                i,
                path.display()
            ))
        })
    };

    Ok(ResultRow {
        model: field(1).to_string(),
        train_loss: number(2)?,
        test_loss: number(3)?,
        test_acc: number(4)?,
    })
}

/// Dump the run configuration as JSON indented by four spaces
pub fn write_config_json(path: &Path, config: &ExperimentConfig) -> Result<()> {
    let mut buffer = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut serializer = serde_json::Serializer::with_formatter(&mut buffer, formatter);
    config.serialize(&mut serializer)?;

    let mut file = File::create(path)?;
    file.write_all(&buffer)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_csv_layout() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("fcn_2_BasicMotions_0.csv");

        let row = ResultRow {
            model: "fcn".to_string(),
            train_loss: 0.1234567,
            test_loss: 1.0,
            test_acc: 0.975,
        };
        write_results_csv(&path, &row).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines[0], ",model,train_loss,test_loss,test_acc");
        assert_eq!(lines[1], "0,fcn,0.12346,1.0,0.975");

        let read = read_results_csv(&path).unwrap();
        assert_eq!(read, row.rounded());
    }

    #[test]
    fn test_whole_numbers_keep_decimal_point() {
        assert_eq!(format_float(1.0), "1.0");
        assert_eq!(format_float(0.0), "0.0");
        assert_eq!(format_float(12.0), "12.0");
        assert_eq!(format_float(0.5), "0.5");
        assert_eq!(format_float(f64::INFINITY), "inf");
    }

    #[test]
    fn test_config_json() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");

        let config = ExperimentConfig {
            model_name: "MLSTM_FCN".to_string(),
            ..Default::default()
        };
        write_config_json(&path, &config).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("\n    \"model_name\": \"MLSTM_FCN\""));

        let parsed: ExperimentConfig = serde_json::from_str(&content).unwrap();
        assert_eq!(parsed, config);
    }
}
