#![forbid(unsafe_code)]
use crate::{
    error::{ConfigError, Result},
    multirow::{BatchOfMultiRowInOneStatement, MultiRowInOneStatement, MultiRowProcessor, SimpleBatch},
};
use serde::{Deserialize, Serialize};

////////////////////////////////////////////////////////////////////////////////

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum MultiRowStrategy {
    SimpleBatch,
    #[default]
    MultiRowInOneStatement,
    BatchOfMultiRowInOneStatement,
}

/// Bulk write settings. Missing fields take their defaults when
/// deserialized.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub batch_size: usize,
    pub multi_row_size: usize,
    pub batch_size_with_multi_row: usize,
    pub multi_row_strategy: MultiRowStrategy,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            batch_size: 32,
            multi_row_size: 32,
            batch_size_with_multi_row: 5,
            multi_row_strategy: MultiRowStrategy::default(),
        }
    }
}

impl Config {
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_multi_row_size(mut self, multi_row_size: usize) -> Self {
        self.multi_row_size = multi_row_size;
        self
    }

    pub fn with_batch_size_with_multi_row(mut self, size: usize) -> Self {
        self.batch_size_with_multi_row = size;
        self
    }

    pub fn with_strategy(mut self, strategy: MultiRowStrategy) -> Self {
        self.multi_row_strategy = strategy;
        self
    }

    pub fn validate(&self) -> Result<()> {
        let sizes = [
            ("batch_size", self.batch_size),
            ("multi_row_size", self.multi_row_size),
            ("batch_size_with_multi_row", self.batch_size_with_multi_row),
        ];
        for (name, value) in sizes {
            if value == 0 {
                return Err(ConfigError::InvalidSize { name, value }.into());
            }
        }
        Ok(())
    }

    pub fn processor<T>(&self) -> Box<dyn MultiRowProcessor<T>> {
        match self.multi_row_strategy {
            MultiRowStrategy::SimpleBatch => Box::new(SimpleBatch::new(self.batch_size)),
            MultiRowStrategy::MultiRowInOneStatement => {
                Box::new(MultiRowInOneStatement::new(self.batch_size, self.multi_row_size))
            }
            MultiRowStrategy::BatchOfMultiRowInOneStatement => Box::new(BatchOfMultiRowInOneStatement::new(
                self.batch_size,
                self.multi_row_size,
                self.batch_size_with_multi_row,
            )),
        }
    }
}

////////////////////////////////////////////////////////////////////////////////
