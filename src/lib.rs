//! Random recombination simulator for phased genotype streams.
//!
//! Records flow through a [`RecordTransformer`], which keeps a
//! [`PermutationState`] over haplotype slots and exchanges pairs of slots
//! whenever the [`SwitchScheduler`] says a switch is due.

pub mod config;
pub mod contigs;
pub mod diagnostics;
pub mod error;
pub mod genotype;
pub mod permutation;
pub mod scheduler;
pub mod transform;
pub mod vcf;

pub use config::{CollisionStrategy, SchedulingMode, SelectionPolicy, SimulationConfig, SimulationRng};
pub use contigs::ContigLengths;
pub use diagnostics::{SlotCountSummary, SwitchDiagnostics};
pub use error::{Result, SimulationError};
pub use genotype::{AlleleCall, GenotypeRecord, MemorySink, MemorySource, RecordSink, RecordSource};
pub use permutation::PermutationState;
pub use scheduler::{SwitchEvent, SwitchEventSource, SwitchScheduler};
pub use transform::{RecordTransformer, TransformSummary};
