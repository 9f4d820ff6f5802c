//! Synthetic History Records
//!
//! Every value is derived from `run_index + shard_offset + step + field_index`
//! so two sessions with the same coordinates log identical payloads.

use crate::backend::RunIndex;
use crate::config::BenchmarkConfig;
use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};

/// Column names of every logged table
pub const TABLE_COLUMNS: [&str; 4] = ["a", "b", "c", "d"];

/// Small tabular payload (one row of four integers)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Table {
    /// Rows, each matching [`TABLE_COLUMNS`]
    pub rows: Vec<[i64; 4]>,
}

/// Square RGB image, row-major, 3 bytes per pixel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Image {
    /// Side length in pixels
    pub dim: u32,
    /// `dim * dim * 3` bytes
    pub pixels: Vec<u8>,
}

impl Image {
    fn seeded(dim: u32, seed: u64) -> Self {
        let side = dim as usize;
        let mut pixels = vec![0u8; side * side * 3];
        StdRng::seed_from_u64(seed).fill_bytes(&mut pixels);
        Self { dim, pixels }
    }
}

/// One logged step: every payload kind keyed `f_i`, `n_i`, `s_i`, `t_i`, `i_i`
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryRecord {
    /// Step within the session (0-based)
    pub step: u32,
    /// Float metrics
    pub floats: Vec<(String, f64)>,
    /// Integer metrics
    pub ints: Vec<(String, i64)>,
    /// String values
    pub strings: Vec<(String, String)>,
    /// Tables
    pub tables: Vec<(String, Table)>,
    /// Images
    pub images: Vec<(String, Image)>,
}

impl HistoryRecord {
    /// Build the record logged at `step` of the session identified by `run`
    pub fn generate(config: &BenchmarkConfig, run: RunIndex, step: u32) -> Self {
        let base = run.base() + i64::from(step);

        let floats = (0..config.history_floats)
            .map(|i| (format!("f_{}", i), (base + i64::from(i)) as f64))
            .collect();
        let ints = (0..config.history_ints)
            .map(|i| (format!("n_{}", i), base + i64::from(i)))
            .collect();
        let strings = (0..config.history_strings)
            .map(|i| (format!("s_{}", i), (base + i64::from(i)).to_string()))
            .collect();
        let tables = (0..config.history_tables)
            .map(|i| {
                let i = i64::from(i);
                let row = [run.base(), i64::from(step), i, i + 1];
                (format!("t_{}", i), Table { rows: vec![row] })
            })
            .collect();
        let images = (0..config.history_images)
            .map(|i| {
                let seed = (base + i64::from(i)) as u64;
                (
                    format!("i_{}", i),
                    Image::seeded(config.history_images_dim, seed),
                )
            })
            .collect();

        Self {
            step,
            floats,
            ints,
            strings,
            tables,
            images,
        }
    }

    /// Number of logged values across all payload kinds
    pub fn value_count(&self) -> usize {
        self.floats.len()
            + self.ints.len()
            + self.strings.len()
            + self.tables.len()
            + self.images.len()
    }
}
