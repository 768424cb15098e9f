// contigs.rs

use crate::error::{Result, SimulationError};
use log::{info, warn};
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

const GRCH38_PRIMARY: [(&str, u64); 25] = [
    ("1", 248_956_422),
    ("2", 242_193_529),
    ("3", 198_295_559),
    ("4", 190_214_555),
    ("5", 181_538_259),
    ("6", 170_805_979),
    ("7", 159_345_973),
    ("8", 145_138_636),
    ("9", 138_394_717),
    ("10", 133_797_422),
    ("11", 135_086_622),
    ("12", 133_275_309),
    ("13", 114_364_328),
    ("14", 107_043_718),
    ("15", 101_991_189),
    ("16", 90_338_345),
    ("17", 83_257_441),
    ("18", 80_373_285),
    ("19", 58_617_616),
    ("20", 64_444_167),
    ("21", 46_709_983),
    ("22", 50_818_468),
    ("X", 156_040_895),
    ("Y", 57_227_415),
    ("M", 16_569),
];

/// Chromosome name to length lookup used by precomputed scheduling.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ContigLengths {
    lengths: HashMap<String, u64>,
}

impl ContigLengths {
    pub fn new() -> Self {
        Self::default()
    }

    /// GRCh38 primary assembly, reachable both as `chr1` and `1`. The
    /// mitochondrion is also reachable as `MT`.
    pub fn grch38() -> Self {
        let mut table = Self::new();
        for (name, length) in GRCH38_PRIMARY {
            table.insert(name, length);
            table.insert(format!("chr{name}"), length);
        }
        table.insert("MT", 16_569);
        table
    }

    pub fn insert(&mut self, name: impl Into<String>, length: u64) {
        self.lengths.insert(name.into(), length);
    }

    pub fn get(&self, name: &str) -> Option<u64> {
        self.lengths.get(name).copied()
    }

    /// Length of `name`, or a configuration error for contigs the table does
    /// not know.
    pub fn require(&self, name: &str) -> Result<u64> {
        self.get(name).ok_or_else(|| {
            SimulationError::configuration(format!(
                "chromosome '{}' not found in the contig length table",
                name
            ))
        })
    }

    pub fn len(&self) -> usize {
        self.lengths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lengths.is_empty()
    }

    /// Reads a table whose first two whitespace-separated columns are name
    /// and length, such as a FASTA `.fai` index.
    pub fn from_path(path: &Path) -> Result<Self> {
        info!("Reading contig lengths from {}", path.display());
        let file = File::open(path).map_err(|e| {
            SimulationError::configuration(format!(
                "failed to open contig length file '{}': {}",
                path.display(),
                e
            ))
        })?;
        Self::from_reader(BufReader::new(file))
    }

    pub fn from_reader<R: BufRead>(reader: R) -> Result<Self> {
        let mut table = Self::new();
        for (line_num, line_result) in reader.lines().enumerate() {
            let line = line_result?;
            let trimmed_line = line.trim();
            if trimmed_line.is_empty() || trimmed_line.starts_with('#') {
                continue;
            }
            let mut parts = trimmed_line.split_whitespace();
            let (Some(name), Some(length_str)) = (parts.next(), parts.next()) else {
                warn!(
                    "Skipping malformed contig length line {}: '{}' (expected name and length)",
                    line_num + 1,
                    line
                );
                continue;
            };
            let length = length_str.parse::<u64>().map_err(|e| {
                SimulationError::configuration(format!(
                    "contig length line {}: error parsing length '{}': {}",
                    line_num + 1,
                    length_str,
                    e
                ))
            })?;
            table.insert(name, length);
        }
        if table.is_empty() {
            return Err(SimulationError::configuration(
                "contig length table contains no entries",
            ));
        }
        Ok(table)
    }
}
