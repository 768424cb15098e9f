// scheduler.rs
//
// Switch events come from a renewal process over a virtual coordinate that
// interleaves genomic distance with haplotype slots: with `A` active slots,
// virtual value `v` sits at base-pair offset `v / A` and slot ordinal
// `v % A`. Gaps between events are `1 + Geometric(p)` with
// `p = 0.5 / target_segment_length`, so every slot switches on average once
// per target length.

use crate::config::{CollisionStrategy, SchedulingMode, SelectionPolicy, SimulationConfig, SimulationRng};
use crate::contigs::ContigLengths;
use crate::error::{Result, SimulationError};
use log::{debug, info, warn};
use rand::seq::SliceRandom;
use rand_distr::{Distribution, Geometric};
use std::collections::VecDeque;

/// Exchange of two haplotype slots, due once a record reaches `trigger`
/// (1-based position).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SwitchEvent {
    pub trigger: u64,
    pub slot_a: usize,
    pub slot_b: usize,
}

/// Active slots in shuffled order, consumed front to back and reshuffled
/// when exhausted. Within one pass every slot is handed out once.
#[derive(Clone, Debug)]
pub struct SlotCycle {
    order: Vec<usize>,
    cursor: usize,
}

impl SlotCycle {
    pub fn new(slots: &[usize], rng: &mut SimulationRng) -> Self {
        let mut cycle = Self {
            order: slots.to_vec(),
            cursor: 0,
        };
        cycle.reshuffle(rng);
        cycle
    }

    pub fn reshuffle(&mut self, rng: &mut SimulationRng) {
        self.order.shuffle(rng);
        self.cursor = 0;
    }

    #[inline]
    pub fn current(&self) -> usize {
        self.order[self.cursor]
    }

    pub fn advance(&mut self, rng: &mut SimulationRng) {
        self.cursor += 1;
        if self.cursor == self.order.len() {
            self.reshuffle(rng);
        }
    }

    /// Moves the current entry one step later (to the front when it is the
    /// last entry) without consuming anything.
    pub fn defer(&mut self) {
        let next = if self.cursor + 1 == self.order.len() {
            0
        } else {
            self.cursor + 1
        };
        self.order.swap(self.cursor, next);
    }

    pub fn pop(&mut self, rng: &mut SimulationRng) -> usize {
        let slot = self.current();
        self.advance(rng);
        slot
    }
}

/// The renewal process shared by both scheduling modes. Owns the generator.
pub struct RenewalProcess {
    active_slots: Vec<usize>,
    cycle: SlotCycle,
    geometric: Geometric,
    policy: SelectionPolicy,
    collision: CollisionStrategy,
    rng: SimulationRng,
    cursor: u64,
}

impl RenewalProcess {
    pub fn new(config: &SimulationConfig, active_slots: Vec<usize>, mut rng: SimulationRng) -> Result<Self> {
        let probability = config.switch_probability();
        let geometric = Geometric::new(probability).map_err(|e| {
            SimulationError::configuration(format!(
                "invalid switch probability {}: {}",
                probability, e
            ))
        })?;
        let cycle = SlotCycle::new(&active_slots, &mut rng);
        Ok(Self {
            active_slots,
            cycle,
            geometric,
            policy: config.policy,
            collision: config.collision,
            rng,
            cursor: 0,
        })
    }

    /// A switch needs two distinct active slots.
    pub fn can_switch(&self) -> bool {
        self.active_slots.len() >= 2
    }

    pub fn active_slots(&self) -> &[usize] {
        &self.active_slots
    }

    #[inline]
    fn width(&self) -> u64 {
        self.active_slots.len() as u64
    }

    /// Starts the process over for a chromosome. Every chromosome after the
    /// first draws from its own generator stream and rebuilds its cycle from
    /// the sorted active slots, so its events do not depend on how far the
    /// previous chromosome was enumerated.
    pub fn restart(&mut self, contig_ordinal: usize) {
        if !self.can_switch() {
            return;
        }
        if contig_ordinal > 0 {
            self.rng.set_stream(contig_ordinal as u64);
            self.rng.set_word_pos(0);
            self.cycle = SlotCycle::new(&self.active_slots, &mut self.rng);
        }
        self.cursor = self.geometric.sample(&mut self.rng);
    }

    /// 1-based position at which the next event fires.
    pub fn next_trigger(&self) -> u64 {
        if !self.can_switch() {
            return u64::MAX;
        }
        self.cursor / self.width() + 1
    }

    pub fn next_event(&mut self) -> Result<SwitchEvent> {
        if !self.can_switch() {
            return Err(SimulationError::Internal(
                "switch requested with fewer than two active slots".to_string(),
            ));
        }
        let width = self.width();
        let trigger = self.cursor / width + 1;
        let ordinal = (self.cursor % width) as usize;
        let (slot_a, slot_b) = self.select_pair(ordinal);

        let gap = self
            .geometric
            .sample(&mut self.rng)
            .checked_add(1)
            .ok_or_else(|| SimulationError::Internal("geometric draw overflowed".to_string()))?;
        self.cursor = self.cursor.checked_add(gap).ok_or_else(|| {
            SimulationError::Internal(format!(
                "renewal cursor overflowed advancing {} by {}",
                self.cursor, gap
            ))
        })?;

        Ok(SwitchEvent {
            trigger,
            slot_a,
            slot_b,
        })
    }

    fn select_pair(&mut self, ordinal: usize) -> (usize, usize) {
        let first = match self.policy {
            SelectionPolicy::Uniform => self.cycle.pop(&mut self.rng),
            SelectionPolicy::Weighted => self.active_slots[ordinal],
        };
        while self.cycle.current() == first {
            match self.collision {
                CollisionStrategy::Advance => self.cycle.advance(&mut self.rng),
                CollisionStrategy::Defer => self.cycle.defer(),
            }
        }
        let second = self.cycle.pop(&mut self.rng);
        (first, second)
    }
}

/// Capability shared by the scheduling modes.
pub trait SwitchEventSource {
    /// Called when the record stream enters a chromosome. `ordinal` counts
    /// chromosomes from zero in stream order.
    fn begin_contig(&mut self, contig: &str, ordinal: usize) -> Result<()>;

    /// Next event with `trigger <= position`, if any. Repeated calls yield
    /// events in non-decreasing trigger order.
    fn next_due(&mut self, position: u64) -> Result<Option<SwitchEvent>>;
}

/// Generates events lazily as records arrive.
pub struct StreamingScheduler {
    process: RenewalProcess,
}

impl StreamingScheduler {
    pub fn new(process: RenewalProcess) -> Self {
        Self { process }
    }
}

impl SwitchEventSource for StreamingScheduler {
    fn begin_contig(&mut self, contig: &str, ordinal: usize) -> Result<()> {
        self.process.restart(ordinal);
        debug!(
            "Streaming scheduler entered {} (contig #{}); first switch due at {}",
            contig,
            ordinal,
            self.process.next_trigger()
        );
        Ok(())
    }

    fn next_due(&mut self, position: u64) -> Result<Option<SwitchEvent>> {
        if self.process.next_trigger() <= position {
            self.process.next_event().map(Some)
        } else {
            Ok(None)
        }
    }
}

/// Enumerates every event of a chromosome when the chromosome starts.
pub struct PrecomputedScheduler {
    process: RenewalProcess,
    contig_lengths: ContigLengths,
    queue: VecDeque<SwitchEvent>,
    contig: String,
    contig_length: u64,
}

impl PrecomputedScheduler {
    pub fn new(process: RenewalProcess, contig_lengths: ContigLengths) -> Self {
        Self {
            process,
            contig_lengths,
            queue: VecDeque::new(),
            contig: String::new(),
            contig_length: 0,
        }
    }

    /// Events of the current chromosome not yet handed out.
    pub fn pending(&self) -> &VecDeque<SwitchEvent> {
        &self.queue
    }
}

impl SwitchEventSource for PrecomputedScheduler {
    fn begin_contig(&mut self, contig: &str, ordinal: usize) -> Result<()> {
        let length = self.contig_lengths.require(contig)?;
        if !self.queue.is_empty() {
            debug!(
                "Discarding {} switch events past the last record of {}",
                self.queue.len(),
                self.contig
            );
        }
        self.queue.clear();
        self.contig = contig.to_string();
        self.contig_length = length;

        self.process.restart(ordinal);
        if self.process.can_switch() {
            while self.process.next_trigger() <= length {
                let event = self.process.next_event()?;
                self.queue.push_back(event);
            }
        }
        info!(
            "Precomputed {} switch events for {} ({} bp)",
            self.queue.len(),
            contig,
            length
        );
        Ok(())
    }

    fn next_due(&mut self, position: u64) -> Result<Option<SwitchEvent>> {
        if position > self.contig_length {
            return Err(SimulationError::configuration(format!(
                "record at {}:{} lies beyond the declared contig length {}",
                self.contig, position, self.contig_length
            )));
        }
        match self.queue.front() {
            Some(event) if event.trigger <= position => Ok(self.queue.pop_front()),
            _ => Ok(None),
        }
    }
}

/// The scheduler selected by configuration.
pub enum SwitchScheduler {
    Streaming(StreamingScheduler),
    Precomputed(PrecomputedScheduler),
}

impl SwitchScheduler {
    /// Builds the scheduler for `config.mode`. Takes ownership of the
    /// generator; precomputed mode needs `contig_lengths`.
    pub fn new(
        config: &SimulationConfig,
        active_slots: Vec<usize>,
        rng: SimulationRng,
        contig_lengths: Option<ContigLengths>,
    ) -> Result<Self> {
        let process = RenewalProcess::new(config, active_slots, rng)?;
        if !process.can_switch() {
            warn!(
                "Only {} active haplotype slot(s); no switches will occur.",
                process.active_slots().len()
            );
        }
        match config.mode {
            SchedulingMode::Streaming => Ok(Self::Streaming(StreamingScheduler::new(process))),
            SchedulingMode::Precomputed => {
                let lengths = contig_lengths.ok_or_else(|| {
                    SimulationError::configuration(
                        "precomputed scheduling requires a contig length table",
                    )
                })?;
                Ok(Self::Precomputed(PrecomputedScheduler::new(process, lengths)))
            }
        }
    }
}

impl SwitchEventSource for SwitchScheduler {
    fn begin_contig(&mut self, contig: &str, ordinal: usize) -> Result<()> {
        match self {
            Self::Streaming(scheduler) => scheduler.begin_contig(contig, ordinal),
            Self::Precomputed(scheduler) => scheduler.begin_contig(contig, ordinal),
        }
    }

    fn next_due(&mut self, position: u64) -> Result<Option<SwitchEvent>> {
        match self {
            Self::Streaming(scheduler) => scheduler.next_due(position),
            Self::Precomputed(scheduler) => scheduler.next_due(position),
        }
    }
}
