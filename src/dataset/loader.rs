//! Archive Loader
//!
//! Reads UEA/UCR archive splits into memory. Two on-disk formats are supported:
//!
//! - sktime `.ts`: `@`-prefixed header lines followed by `@data`; each data row
//!   holds `:`-separated dimensions (comma-separated values) with the class
//!   label as the last field.
//! - UCR `.tsv`: one series per line, class label first, tab separated.
//!
//! Missing values (`?`, `NaN`) are read as `0.0` and series of unequal length
//! are right-padded with zeros to the longest series in the split.

use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::utils::error::{Result, TscError};

/// Archive split
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Split {
    Train,
    Test,
}

impl Split {
    /// Suffix used in archive file names
    pub fn suffix(&self) -> &'static str {
        match self {
            Split::Train => "TRAIN",
            Split::Test => "TEST",
        }
    }
}

impl fmt::Display for Split {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.suffix())
    }
}

/// A single labeled series
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeSeriesSample {
    /// Channel-major values `[channels * length]`
    pub values: Vec<f32>,
    /// Raw class label as written in the archive
    pub label: String,
}

/// One split held in memory
#[derive(Debug, Clone)]
pub struct RawSplit {
    pub samples: Vec<TimeSeriesSample>,
    pub num_channels: usize,
    pub series_length: usize,
}

/// Shape and class distribution of a split
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SplitStats {
    pub num_samples: usize,
    pub num_channels: usize,
    pub series_length: usize,
    pub class_counts: Vec<(String, usize)>,
}

impl RawSplit {
    /// Number of series in the split
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Whether the split holds no series
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Labels in sample order
    pub fn labels(&self) -> Vec<&str> {
        self.samples.iter().map(|s| s.label.as_str()).collect()
    }

    /// Shape triple `[samples, channels, length]`
    pub fn shape(&self) -> [usize; 3] {
        [self.samples.len(), self.num_channels, self.series_length]
    }

    /// Compute per-class counts, sorted by class label
    pub fn stats(&self) -> SplitStats {
        let mut counts: HashMap<&str, usize> = HashMap::new();
        for sample in &self.samples {
            *counts.entry(sample.label.as_str()).or_insert(0) += 1;
        }
        let mut class_counts: Vec<(String, usize)> = counts
            .into_iter()
            .map(|(label, count)| (label.to_string(), count))
            .collect();
        class_counts.sort();

        SplitStats {
            num_samples: self.samples.len(),
            num_channels: self.num_channels,
            series_length: self.series_length,
            class_counts,
        }
    }

    /// Pad every series to `length` time steps
    ///
    /// Used to align the TEST split with a longer TRAIN split.
    pub fn pad_to(&mut self, length: usize) {
        if length <= self.series_length {
            return;
        }
        for sample in &mut self.samples {
            sample.values = pad_channels(&sample.values, self.num_channels, self.series_length, length);
        }
        self.series_length = length;
    }
}

/// Read a split of an archive dataset
///
/// # Arguments
/// * `data_dir` - Root of the archive
/// * `name` - Dataset name, e.g. `BasicMotions`
/// * `split` - Which split to read
pub fn read_uea(data_dir: impl AsRef<Path>, name: &str, split: Split) -> Result<RawSplit> {
    let path = locate_split(data_dir.as_ref(), name, split)?;
    info!("Reading {} split of {} from {:?}", split, name, path);

    let is_tsv = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case("tsv"))
        .unwrap_or(false);

    if is_tsv {
        read_tsv_file(&path)
    } else {
        read_ts_file(&path)
    }
}

/// Find the file holding a split
fn locate_split(data_dir: &Path, name: &str, split: Split) -> Result<PathBuf> {
    let file_names = [
        format!("{}_{}.ts", name, split.suffix()),
        format!("{}_{}.tsv", name, split.suffix()),
    ];

    for file_name in &file_names {
        for candidate in [data_dir.join(name).join(file_name), data_dir.join(file_name)] {
            if candidate.is_file() {
                return Ok(candidate);
            }
        }
    }

    if !data_dir.exists() {
        return Err(TscError::PathNotFound(data_dir.to_path_buf()));
    }

    debug!("Searching {:?} recursively for {:?}", data_dir, file_names);
    WalkDir::new(data_dir)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .find(|e| {
            let file_name = e.file_name().to_string_lossy();
            file_names.iter().any(|f| f.as_str() == file_name)
        })
        .map(|e| e.into_path())
        .ok_or_else(|| TscError::PathNotFound(data_dir.join(name).join(&file_names[0])))
}

/// Header information collected from a `.ts` file
#[derive(Debug, Default)]
struct TsHeader {
    class_labels: Option<Vec<String>>,
    dimensions: Option<usize>,
}

/// Read a sktime `.ts` file
pub fn read_ts_file(path: &Path) -> Result<RawSplit> {
    let content = fs::read_to_string(path)?;
    parse_ts(&content, path)
}

/// Parse the content of a `.ts` file; `path` is only used in error messages
pub fn parse_ts(content: &str, path: &Path) -> Result<RawSplit> {
    let mut header = TsHeader::default();
    let mut data_lines: Vec<(usize, &str)> = Vec::new();
    let mut in_data = false;

    for (idx, raw_line) in content.lines().enumerate() {
        let line_no = idx + 1;
        let line = raw_line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        if in_data {
            data_lines.push((line_no, line));
            continue;
        }

        if !line.starts_with('@') {
            return Err(parse_error(path, line_no, "data row before @data"));
        }

        let mut tokens = line.split_whitespace();
        let tag = tokens.next().unwrap_or_default().to_lowercase();
        match tag.as_str() {
            "@data" => in_data = true,
            "@classlabel" => {
                let enabled = tokens.next().map(|t| t.eq_ignore_ascii_case("true"));
                match enabled {
                    Some(true) => {
                        header.class_labels = Some(tokens.map(str::to_string).collect());
                    }
                    Some(false) => {
                        return Err(parse_error(path, line_no, "file declares no class labels"));
                    }
                    None => return Err(parse_error(path, line_no, "@classLabel needs true/false")),
                }
            }
            "@timestamps" => {
                if tokens.next().map(|t| t.eq_ignore_ascii_case("true")).unwrap_or(false) {
                    return Err(parse_error(path, line_no, "timestamped series are not supported"));
                }
            }
            "@dimensions" => {
                let dims = tokens
                    .next()
                    .and_then(|t| t.parse::<usize>().ok())
                    .ok_or_else(|| parse_error(path, line_no, "@dimensions needs a number"))?;
                header.dimensions = Some(dims);
            }
            // @problemName, @univariate, @equalLength, @seriesLength, @missing, ...
            _ => {}
        }
    }

    if !in_data {
        return Err(parse_error(path, content.lines().count(), "missing @data section"));
    }

    let rows: Vec<(usize, Vec<Vec<f32>>, String)> = data_lines
        .par_iter()
        .map(|&(line_no, line)| {
            parse_ts_row(line)
                .map(|(dims, label)| (line_no, dims, label))
                .map_err(|message| parse_error(path, line_no, &message))
        })
        .collect::<Result<_>>()?;

    let num_channels = match (header.dimensions, rows.first()) {
        (Some(d), _) => d,
        (None, Some((_, dims, _))) => dims.len(),
        (None, None) => 0,
    };

    for (line_no, dims, label) in &rows {
        if dims.len() != num_channels {
            return Err(parse_error(
                path,
                *line_no,
                &format!("expected {} dimensions, found {}", num_channels, dims.len()),
            ));
        }
        if let Some(declared) = &header.class_labels {
            if !declared.is_empty() && !declared.iter().any(|c| c == label) {
                return Err(parse_error(
                    path,
                    *line_no,
                    &format!("class label '{}' is not declared in @classLabel", label),
                ));
            }
        }
    }

    Ok(assemble(
        rows.into_iter().map(|(_, dims, label)| (dims, label)).collect(),
        num_channels,
    ))
}

/// Split a `.ts` data row into per-dimension values and its label
fn parse_ts_row(line: &str) -> std::result::Result<(Vec<Vec<f32>>, String), String> {
    let mut fields: Vec<&str> = line.split(':').collect();
    if fields.len() < 2 {
        return Err("row has no class label".to_string());
    }
    let label = fields.pop().unwrap_or_default().trim().to_string();
    if label.is_empty() {
        return Err("empty class label".to_string());
    }

    let dims = fields
        .iter()
        .map(|field| parse_values(field.split(',')))
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok((dims, label))
}

/// Read a UCR `.tsv` file
pub fn read_tsv_file(path: &Path) -> Result<RawSplit> {
    let content = fs::read_to_string(path)?;
    parse_tsv(&content, path)
}

/// Parse the content of a UCR `.tsv` file
pub fn parse_tsv(content: &str, path: &Path) -> Result<RawSplit> {
    let lines: Vec<(usize, &str)> = content
        .lines()
        .enumerate()
        .map(|(idx, l)| (idx + 1, l.trim()))
        .filter(|(_, l)| !l.is_empty())
        .collect();

    let rows: Vec<(Vec<Vec<f32>>, String)> = lines
        .par_iter()
        .map(|&(line_no, line)| -> Result<(Vec<Vec<f32>>, String)> {
            let mut fields = line.split(|c| c == '\t' || c == ',');
            let label = fields
                .next()
                .map(|l| l.trim().to_string())
                .filter(|l| !l.is_empty())
                .ok_or_else(|| parse_error(path, line_no, "row has no class label"))?;
            let values = parse_values(fields).map_err(|m| parse_error(path, line_no, &m))?;
            Ok((vec![values], label))
        })
        .collect::<Result<_>>()?;

    Ok(assemble(rows, 1))
}

/// Parse comma/tab separated values, mapping missing markers to 0.0
fn parse_values<'a>(tokens: impl Iterator<Item = &'a str>) -> std::result::Result<Vec<f32>, String> {
    tokens
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .map(|token| {
            if token == "?" || token.eq_ignore_ascii_case("nan") {
                Ok(0.0)
            } else {
                token
                    .parse::<f32>()
                    .map_err(|_| format!("invalid value '{}'", token))
            }
        })
        .collect()
}

/// Pad series to a common length and flatten them channel-major
fn assemble(rows: Vec<(Vec<Vec<f32>>, String)>, num_channels: usize) -> RawSplit {
    let series_length = rows
        .iter()
        .flat_map(|(dims, _)| dims.iter().map(Vec::len))
        .max()
        .unwrap_or(0);

    let unequal = rows
        .iter()
        .any(|(dims, _)| dims.iter().any(|d| d.len() != series_length));
    if unequal {
        warn!("Series have unequal lengths; zero-padding to {}", series_length);
    }

    let samples = rows
        .into_iter()
        .map(|(dims, label)| {
            let mut values = Vec::with_capacity(num_channels * series_length);
            for dim in dims {
                let len = dim.len();
                values.extend(dim);
                values.extend(std::iter::repeat(0.0).take(series_length - len));
            }
            TimeSeriesSample { values, label }
        })
        .collect();

    RawSplit {
        samples,
        num_channels,
        series_length,
    }
}

/// Right-pad every channel of a channel-major series
fn pad_channels(values: &[f32], channels: usize, from: usize, to: usize) -> Vec<f32> {
    let mut padded = Vec::with_capacity(channels * to);
    for c in 0..channels {
        padded.extend_from_slice(&values[c * from..(c + 1) * from]);
        padded.extend(std::iter::repeat(0.0).take(to - from));
    }
    padded
}

fn parse_error(path: &Path, line: usize, message: &str) -> TscError {
    TscError::Parse {
        path: path.to_path_buf(),
        line,
        message: message.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASIC_TS: &str = "\
# Example problem
@problemName Toy
@timeStamps false
@missing false
@univariate false
@dimensions 2
@equalLength true
@seriesLength 3
@classLabel true standing walking
@data
1.0,2.0,3.0:4.0,5.0,6.0:standing
0.5,?,1.5:2.5,3.5,4.5:walking
";

    fn path() -> PathBuf {
        PathBuf::from("Toy_TRAIN.ts")
    }

    #[test]
    fn test_parse_ts_basic() {
        let split = parse_ts(BASIC_TS, &path()).unwrap();
        assert_eq!(split.shape(), [2, 2, 3]);
        assert_eq!(split.samples[0].values, vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        assert_eq!(split.samples[0].label, "standing");
        // Missing value becomes 0.0
        assert_eq!(split.samples[1].values[1], 0.0);
        assert_eq!(split.labels(), vec!["standing", "walking"]);
    }

    #[test]
    fn test_parse_ts_unequal_lengths_are_padded() {
        let content = "@classLabel true a b\n@data\n1,2,3,4:a\n1,2:b\n";
        let split = parse_ts(content, &path()).unwrap();
        assert_eq!(split.shape(), [2, 1, 4]);
        assert_eq!(split.samples[1].values, vec![1.0, 2.0, 0.0, 0.0]);
    }

    #[test]
    fn test_parse_ts_trailing_missing_keeps_length() {
        let content = "@classLabel true a b\n@data\n1,2,3,?:a\n4,5,6,NaN:b\n";
        let split = parse_ts(content, &path()).unwrap();
        assert_eq!(split.series_length, 4);
        assert_eq!(split.samples[0].values, vec![1.0, 2.0, 3.0, 0.0]);
        assert_eq!(split.samples[1].values, vec![4.0, 5.0, 6.0, 0.0]);
    }

    #[test]
    fn test_parse_ts_rejects_dimension_mismatch() {
        let content = "@dimensions 2\n@classLabel true a\n@data\n1,2:3,4:a\n1,2:a\n";
        let err = parse_ts(content, &path()).unwrap_err();
        match err {
            TscError::Parse { line, .. } => assert_eq!(line, 5),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_parse_ts_rejects_undeclared_label() {
        let content = "@classLabel true a b\n@data\n1,2:c\n";
        assert!(parse_ts(content, &path()).is_err());
    }

    #[test]
    fn test_parse_ts_rejects_bad_value_and_missing_data() {
        assert!(parse_ts("@classLabel true a\n@data\n1,x:a\n", &path()).is_err());
        assert!(parse_ts("@classLabel true a\n", &path()).is_err());
        assert!(parse_ts("@classLabel false\n@data\n1,2\n", &path()).is_err());
    }

    #[test]
    fn test_parse_tsv() {
        let content = "1\t0.1\t0.2\t0.3\n2\t0.4\t0.5\tNaN\n";
        let split = parse_tsv(content, Path::new("Toy_TRAIN.tsv")).unwrap();
        assert_eq!(split.shape(), [2, 1, 3]);
        assert_eq!(split.samples[1].label, "2");
        assert_eq!(split.samples[1].values, vec![0.4, 0.5, 0.0]);
    }

    #[test]
    fn test_stats_and_pad_to() {
        let mut split = parse_ts(BASIC_TS, &path()).unwrap();
        let stats = split.stats();
        assert_eq!(stats.num_samples, 2);
        assert_eq!(
            stats.class_counts,
            vec![("standing".to_string(), 1), ("walking".to_string(), 1)]
        );

        split.pad_to(5);
        assert_eq!(split.series_length, 5);
        assert_eq!(
            split.samples[0].values,
            vec![1.0, 2.0, 3.0, 0.0, 0.0, 4.0, 5.0, 6.0, 0.0, 0.0]
        );
    }

    #[test]
    fn test_read_uea_locates_nested_file() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("Multivariate_ts").join("Toy");
        fs::create_dir_all(&nested).unwrap();
        fs::write(nested.join("Toy_TEST.ts"), BASIC_TS).unwrap();

        let split = read_uea(dir.path(), "Toy", Split::Test).unwrap();
        assert_eq!(split.len(), 2);

        let missing = read_uea(dir.path(), "Toy", Split::Train);
        assert!(matches!(missing, Err(TscError::PathNotFound(_))));
    }
}
