// transform.rs

use crate::config::SimulationConfig;
use crate::contigs::ContigLengths;
use crate::error::{Result, SimulationError};
use crate::genotype::{AlleleCall, RecordSink, RecordSource};
use crate::permutation::PermutationState;
use crate::scheduler::{SwitchEventSource, SwitchScheduler};
use log::{debug, info, trace};
use std::collections::HashSet;

/// What a completed run leaves behind for diagnostics.
#[derive(Debug)]
pub struct TransformSummary {
    pub records: u64,
    pub switches: u64,
    pub contigs: usize,
    pub slot_count: usize,
    pub active_slots: Vec<usize>,
    pub state: PermutationState,
}

/// Tracks chromosome order so the scheduler learns about every new
/// chromosome exactly once.
#[derive(Debug, Default)]
struct ContigTracker {
    current: Option<String>,
    position: u64,
    seen: HashSet<String>,
}

impl ContigTracker {
    /// Returns the new chromosome's ordinal when `chromosome` starts one.
    fn enter(&mut self, chromosome: &str, position: u64) -> Result<Option<usize>> {
        match self.current.as_deref() {
            Some(current) if current == chromosome => {
                if position < self.position {
                    return Err(SimulationError::stream_consistency(format!(
                        "record at {}:{} follows position {}; input must be sorted",
                        chromosome, position, self.position
                    )));
                }
                self.position = position;
                Ok(None)
            }
            _ => {
                if self.seen.contains(chromosome) {
                    return Err(SimulationError::stream_consistency(format!(
                        "chromosome {} reappears after other chromosomes; input must be sorted",
                        chromosome
                    )));
                }
                let ordinal = self.seen.len();
                self.seen.insert(chromosome.to_string());
                self.current = Some(chromosome.to_string());
                self.position = position;
                Ok(Some(ordinal))
            }
        }
    }
}

/// Drives one pass over a record stream: applies due switches, permutes each
/// record's calls and forwards it to the sink.
#[derive(Clone, Debug)]
pub struct RecordTransformer {
    config: SimulationConfig,
    contig_lengths: Option<ContigLengths>,
}

impl RecordTransformer {
    pub fn new(config: SimulationConfig) -> Self {
        Self {
            config,
            contig_lengths: None,
        }
    }

    /// Table consulted by precomputed scheduling.
    pub fn with_contig_lengths(mut self, contig_lengths: ContigLengths) -> Self {
        self.contig_lengths = Some(contig_lengths);
        self
    }

    pub fn run<S, K>(&self, source: &mut S, sink: &mut K) -> Result<TransformSummary>
    where
        S: RecordSource,
        K: RecordSink<S::Metadata>,
    {
        self.config.validate()?;

        let first = source.next_record()?.ok_or(SimulationError::EmptyInput)?;
        let slot_count = first.slot_count();
        let active_slots = first.active_slots();
        info!(
            "Established {} haplotype slots ({} active) from first record at {}:{}",
            slot_count,
            active_slots.len(),
            first.chromosome,
            first.position
        );
        info!("Switch probability per slot unit: {}", self.config.switch_probability());

        // Permutation first, then the scheduler: both draw from the same
        // stream in this order.
        let mut rng = self.config.rng();
        let mut state = PermutationState::initialize(slot_count, &active_slots, &mut rng);
        let mut scheduler = SwitchScheduler::new(
            &self.config,
            active_slots.clone(),
            rng,
            self.contig_lengths.clone(),
        )?;

        let mut tracker = ContigTracker::default();
        let mut buffer: Vec<AlleleCall> = Vec::with_capacity(slot_count);
        let mut records = 0u64;
        let mut switches = 0u64;

        let mut next = Some(first);
        while let Some(mut record) = next {
            if record.slot_count() != slot_count {
                return Err(SimulationError::stream_consistency(format!(
                    "inconsistent ploidy at {}:{}: expected {} haplotype slots, found {}",
                    record.chromosome,
                    record.position,
                    slot_count,
                    record.slot_count()
                )));
            }

            if let Some(ordinal) = tracker.enter(&record.chromosome, record.position)? {
                debug!("Entering chromosome {} (#{})", record.chromosome, ordinal);
                scheduler.begin_contig(&record.chromosome, ordinal)?;
            }

            while let Some(event) = scheduler.next_due(record.position)? {
                trace!(
                    "Switching slots {} and {} at {}:{}",
                    event.slot_a,
                    event.slot_b,
                    record.chromosome,
                    event.trigger
                );
                state.apply_switch(event.slot_a, event.slot_b);
                switches += 1;
            }

            state.scatter(&record.alleles, &mut buffer);
            // `buffer` keeps the input calls; after the loop it holds the
            // final record's.
            std::mem::swap(&mut record.alleles, &mut buffer);
            sink.write_record(record)?;
            records += 1;

            next = source.next_record()?;
        }

        // Output health is reported ahead of the end-of-vector check.
        sink.finish()?;

        let counts = state.switch_counts();
        if let Some(slot) = buffer
            .iter()
            .enumerate()
            .find(|(slot, call)| call.is_end_of_vector() && counts[*slot] != 0)
            .map(|(slot, _)| slot)
        {
            return Err(SimulationError::stream_consistency(format!(
                "switch occurred at end-of-vector slot {} in the last variant (make sure all variants have consistent ploidy)",
                slot
            )));
        }

        info!(
            "Transformed {} records across {} chromosome(s) with {} switch events.",
            records,
            tracker.seen.len(),
            switches
        );
        Ok(TransformSummary {
            records,
            switches,
            contigs: tracker.seen.len(),
            slot_count,
            active_slots,
            state,
        })
    }
}
