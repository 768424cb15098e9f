// diagnostics.rs

use crate::error::{Result, SimulationError};
use crate::transform::TransformSummary;
use log::info;
use statrs::statistics::Statistics;
use std::io::{self, Write};

/// Distribution of per-slot switch counts over the active slots.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SlotCountSummary {
    pub slots: usize,
    pub mean: f64,
    pub std_dev: f64,
    pub coefficient_of_variation: f64,
    pub min: u64,
    pub max: u64,
}

/// Per-sample view of the final switch counters.
#[derive(Debug)]
pub struct SwitchDiagnostics<'a> {
    sample_names: &'a [String],
    ploidy: usize,
    counts: &'a [u64],
    active_slots: &'a [usize],
}

impl<'a> SwitchDiagnostics<'a> {
    pub fn new(sample_names: &'a [String], summary: &'a TransformSummary) -> Result<Self> {
        let counts = summary.state.switch_counts();
        if sample_names.is_empty() {
            return Err(SimulationError::configuration(
                "cannot report switch counts without sample names",
            ));
        }
        if counts.len() % sample_names.len() != 0 {
            return Err(SimulationError::stream_consistency(format!(
                "{} haplotype slots cannot be split evenly across {} samples",
                counts.len(),
                sample_names.len()
            )));
        }
        Ok(Self {
            sample_names,
            ploidy: counts.len() / sample_names.len(),
            counts,
            active_slots: &summary.active_slots,
        })
    }

    pub fn ploidy(&self) -> usize {
        self.ploidy
    }

    /// Each sample with the counts of its haplotype slots, in slot order.
    pub fn per_sample(&self) -> impl Iterator<Item = (&'a str, &'a [u64])> + '_ {
        self.sample_names
            .iter()
            .map(String::as_str)
            .zip(self.counts.chunks(self.ploidy.max(1)))
    }

    /// One line per sample: name, then one tab-separated count per slot.
    pub fn write_tsv<W: Write>(&self, mut writer: W) -> io::Result<()> {
        for (name, counts) in self.per_sample() {
            write!(writer, "{}", name)?;
            for count in counts {
                write!(writer, "\t{}", count)?;
            }
            writeln!(writer)?;
        }
        writer.flush()
    }

    pub fn summary(&self) -> Option<SlotCountSummary> {
        if self.active_slots.is_empty() {
            return None;
        }
        let active_counts: Vec<u64> = self.active_slots.iter().map(|&slot| self.counts[slot]).collect();
        let values: Vec<f64> = active_counts.iter().map(|&count| count as f64).collect();
        let mean = values.iter().mean();
        let std_dev = values.iter().population_std_dev();
        let coefficient_of_variation = if mean > 0.0 { std_dev / mean } else { 0.0 };
        Some(SlotCountSummary {
            slots: values.len(),
            mean,
            std_dev,
            coefficient_of_variation,
            min: active_counts.iter().copied().min().unwrap_or(0),
            max: active_counts.iter().copied().max().unwrap_or(0),
        })
    }

    pub fn log_summary(&self) {
        if let Some(summary) = self.summary() {
            info!(
                "Switch counts over {} active slots: mean={:.3}, sd={:.3}, cv={:.4}, min={}, max={}",
                summary.slots,
                summary.mean,
                summary.std_dev,
                summary.coefficient_of_variation,
                summary.min,
                summary.max
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SimulationRng;
    use crate::permutation::PermutationState;
    use rand::SeedableRng;

    fn summary_with_switches(switches: &[(usize, usize)]) -> TransformSummary {
        let active: Vec<usize> = (0..6).collect();
        let mut state = PermutationState::initialize(6, &active, &mut SimulationRng::seed_from_u64(1));
        for &(a, b) in switches {
            state.apply_switch(a, b);
        }
        TransformSummary {
            records: 1,
            switches: switches.len() as u64,
            contigs: 1,
            slot_count: 6,
            active_slots: active,
            state,
        }
    }

    #[test]
    fn counts_are_reported_per_sample() {
        let summary = summary_with_switches(&[(0, 3), (3, 5), (1, 2)]);
        let names = vec!["NA1".to_string(), "NA2".to_string(), "NA3".to_string()];
        let diagnostics = SwitchDiagnostics::new(&names, &summary).expect("diagnostics build");
        assert_eq!(diagnostics.ploidy(), 2);

        let mut out = Vec::new();
        diagnostics.write_tsv(&mut out).expect("write succeeds");
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "NA1\t1\t1\nNA2\t1\t2\nNA3\t0\t1\n"
        );
    }

    #[test]
    fn summary_describes_active_slot_counts() {
        let summary = summary_with_switches(&[(0, 1), (2, 3), (4, 5)]);
        let names = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        let stats = SwitchDiagnostics::new(&names, &summary)
            .expect("diagnostics build")
            .summary()
            .expect("active slots exist");
        assert_eq!(stats.slots, 6);
        assert!((stats.mean - 1.0).abs() < 1e-12);
        assert!(stats.coefficient_of_variation.abs() < 1e-12);
        assert_eq!((stats.min, stats.max), (1, 1));
    }

    #[test]
    fn uneven_slot_split_is_rejected() {
        let summary = summary_with_switches(&[]);
        let names: Vec<String> = (0..4).map(|i| i.to_string()).collect();
        assert!(SwitchDiagnostics::new(&names, &summary).is_err());
    }
}
