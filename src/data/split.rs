use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, Result};

/// Time indices of the three partitions, each sorted ascending.
///
/// Every training index precedes every validation index, which precedes
/// every test index. Nothing is shuffled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SplitIndices {
    pub train: Vec<usize>,
    pub validation: Vec<usize>,
    pub test: Vec<usize>,
}

impl SplitIndices {
    pub fn total(&self) -> usize {
        self.train.len() + self.validation.len() + self.test.len()
    }
}

/// Split sorted indices into a leading and a trailing part.
///
/// The trailing part holds `ceil(fraction * n)` indices, the leading part the
/// rest. `name` identifies the fraction in errors.
pub fn ordered_split(indices: &[usize], fraction: f64, name: &'static str) -> Result<(Vec<usize>, Vec<usize>)> {
    if !(fraction > 0.0 && fraction < 1.0) {
        return Err(ConfigError::FractionOutOfRange { name, value: fraction }.into());
    }

    let total = indices.len();
    let held_out = (fraction * total as f64).ceil() as usize;
    if held_out == 0 || held_out >= total {
        return Err(ConfigError::EmptySplit { name, fraction, total }.into());
    }

    let boundary = total - held_out;
    Ok((indices[..boundary].to_vec(), indices[boundary..].to_vec()))
}

/// Partition unique time indices into train / validation / test.
///
/// `test_size` is taken from the whole range, `validation_size` from what
/// remains after the test part is removed.
pub fn split_time_indices(unique_times: &[usize], test_size: f64, validation_size: f64) -> Result<SplitIndices> {
    let (remainder, test) = ordered_split(unique_times, test_size, "test_size")?;
    let (train, validation) = ordered_split(&remainder, validation_size, "validation_size")?;

    Ok(SplitIndices { train, validation, test })
}
