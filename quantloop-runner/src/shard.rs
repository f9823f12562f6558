//! Striped shard partitioning.
//!
//! Grid index `i` belongs to shard `i % shard_count`. The assignment is a pure
//! function of the grid and the shard coordinates, so independent processes
//! agree on it without coordination.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::config::RunConfig;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ShardError {
    #[error("shard count must be at least 1")]
    ZeroShards,

    #[error("shard index {index} out of range for {count} shards")]
    IndexOutOfRange { index: usize, count: usize },

    #[error("invalid shard spec '{0}' (expected INDEX/COUNT, e.g. 0/4)")]
    Parse(String),
}

/// Coordinates of one shard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ShardSpec {
    pub index: usize,
    pub count: usize,
}

impl ShardSpec {
    pub fn new(index: usize, count: usize) -> Result<Self, ShardError> {
        if count == 0 {
            return Err(ShardError::ZeroShards);
        }
        if index >= count {
            return Err(ShardError::IndexOutOfRange { index, count });
        }
        Ok(Self { index, count })
    }

    /// The single shard covering a whole grid.
    pub fn whole() -> Self {
        Self { index: 0, count: 1 }
    }

    pub fn owns(&self, grid_index: usize) -> bool {
        grid_index % self.count == self.index
    }
}

impl fmt::Display for ShardSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.index, self.count)
    }
}

impl FromStr for ShardSpec {
    type Err = ShardError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (index, count) = s
            .trim()
            .split_once('/')
            .ok_or_else(|| ShardError::Parse(s.to_string()))?;
        let index = index
            .trim()
            .parse()
            .map_err(|_| ShardError::Parse(s.to_string()))?;
        let count = count
            .trim()
            .parse()
            .map_err(|_| ShardError::Parse(s.to_string()))?;
        Self::new(index, count)
    }
}

/// Configs of `grid` owned by shard `shard_index`, paired with their grid
/// index, in grid order.
pub fn partition(
    grid: &[RunConfig],
    shard_count: usize,
    shard_index: usize,
) -> Result<Vec<(usize, RunConfig)>, ShardError> {
    let spec = ShardSpec::new(shard_index, shard_count)?;
    Ok(grid
        .iter()
        .enumerate()
        .filter(|(i, _)| spec.owns(*i))
        .map(|(i, cfg)| (i, cfg.clone()))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid(n: usize) -> Vec<RunConfig> {
        (0..n as u64)
            .map(|seed| RunConfig {
                seed,
                ..RunConfig::default()
            })
            .collect()
    }

    #[test]
    fn striped_assignment() {
        let g = grid(7);
        let idx: Vec<usize> = partition(&g, 3, 1).unwrap().into_iter().map(|(i, _)| i).collect();
        assert_eq!(idx, vec![1, 4]);
        let idx: Vec<usize> = partition(&g, 3, 0).unwrap().into_iter().map(|(i, _)| i).collect();
        assert_eq!(idx, vec![0, 3, 6]);
    }

    #[test]
    fn configs_travel_with_their_index() {
        for (i, cfg) in partition(&grid(10), 4, 2).unwrap() {
            assert_eq!(cfg.seed, i as u64);
        }
    }

    #[test]
    fn more_shards_than_cells_leaves_some_empty() {
        let g = grid(2);
        assert_eq!(partition(&g, 5, 1).unwrap().len(), 1);
        assert!(partition(&g, 5, 4).unwrap().is_empty());
    }

    #[test]
    fn rejects_bad_coordinates() {
        assert_eq!(partition(&grid(3), 0, 0), Err(ShardError::ZeroShards));
        assert_eq!(
            partition(&grid(3), 2, 2),
            Err(ShardError::IndexOutOfRange { index: 2, count: 2 })
        );
    }

    #[test]
    fn parse_spec() {
        assert_eq!("1/4".parse::<ShardSpec>().unwrap(), ShardSpec { index: 1, count: 4 });
        assert_eq!(" 0 / 1 ".parse::<ShardSpec>().unwrap(), ShardSpec::whole());
        assert!(matches!("4/4".parse::<ShardSpec>(), Err(ShardError::IndexOutOfRange { .. })));
        assert!(matches!("a/4".parse::<ShardSpec>(), Err(ShardError::Parse(_))));
        assert!(matches!("3".parse::<ShardSpec>(), Err(ShardError::Parse(_))));
        assert_eq!(ShardSpec::new(2, 5).unwrap().to_string(), "2/5");
    }
}
