//! Train/test split of a built dataset
//!
//! This is the hand-off to model training, and the place where an empty
//! dataset is finally rejected.

use crate::error::{DatasetError, Result};
use crate::frame::{require_columns, write_csv};
use polars::prelude::*;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const DEFAULT_TEST_SIZE: f64 = 0.2;
pub const DEFAULT_SEED: u64 = 42;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SplitOptions {
    /// Fraction of rows held out for testing, in (0, 1)
    pub test_size: f64,
    pub seed: u64,
}

impl Default for SplitOptions {
    fn default() -> Self {
        Self {
            test_size: DEFAULT_TEST_SIZE,
            seed: DEFAULT_SEED,
        }
    }
}

impl SplitOptions {
    pub fn validate(&self) -> Result<()> {
        if self.test_size > 0.0 && self.test_size < 1.0 {
            Ok(())
        } else {
            Err(DatasetError::InvalidSplit(self.test_size))
        }
    }

    /// Rows held out for testing out of `rows`
    pub fn test_rows(&self, rows: usize) -> usize {
        (self.test_size * rows as f64).ceil() as usize
    }
}

/// Feature and target partitions
#[derive(Debug, Clone, PartialEq)]
pub struct TrainTestSplit {
    pub x_train: DataFrame,
    pub x_test: DataFrame,
    pub y_train: DataFrame,
    pub y_test: DataFrame,
}

impl TrainTestSplit {
    pub fn train_rows(&self) -> usize {
        self.x_train.height()
    }

    pub fn test_rows(&self) -> usize {
        self.x_test.height()
    }

    /// Write `x_train.csv`, `x_test.csv`, `y_train.csv` and `y_test.csv`
    /// into `dir`
    pub fn write(&self, dir: &Path) -> Result<Vec<PathBuf>> {
        let outputs = [
            ("x_train.csv", &self.x_train),
            ("x_test.csv", &self.x_test),
            ("y_train.csv", &self.y_train),
            ("y_test.csv", &self.y_test),
        ];
        outputs
            .into_iter()
            .map(|(name, df)| -> Result<PathBuf> {
                let path = dir.join(name);
                write_csv(&path, df)?;
                Ok(path)
            })
            .collect()
    }
}

/// Shuffle rows with a seeded generator, hold out `ceil(test_size * n)` of
/// them for testing and split both partitions into features and target.
pub fn train_test_split(
    dataset: &DataFrame,
    features: &[String],
    target: &str,
    options: &SplitOptions,
) -> Result<TrainTestSplit> {
    options.validate()?;
    let rows = dataset.height();
    if rows == 0 {
        return Err(DatasetError::EmptyDataset);
    }
    let test_rows = options.test_rows(rows);
    if test_rows >= rows {
        return Err(DatasetError::NoTrainingRows {
            rows,
            test_size: options.test_size,
        });
    }

    let target = [target.to_string()];
    require_columns(dataset, features, "split features")?;
    require_columns(dataset, &target, "split target")?;
    let x = dataset.select(features)?;
    let y = dataset.select(target)?;

    let mut order: Vec<IdxSize> = (0..rows as IdxSize).collect();
    let mut rng = StdRng::seed_from_u64(options.seed);
    order.shuffle(&mut rng);
    let (test, train) = order.split_at(test_rows);
    let test = IdxCa::from_vec("test".into(), test.to_vec());
    let train = IdxCa::from_vec("train".into(), train.to_vec());

    Ok(TrainTestSplit {
        x_train: x.take(&train)?,
        x_test: x.take(&test)?,
        y_train: y.take(&train)?,
        y_test: y.take(&test)?,
    })
}
