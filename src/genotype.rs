// genotype.rs

use crate::error::Result;

/// One haplotype slot's call at a site.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AlleleCall {
    /// An allele index, or `None` for a missing (`.`) call.
    Called(Option<usize>),
    /// Padding for samples with fewer alleles than the record's ploidy.
    /// Such slots are never switched.
    EndOfVector,
}

impl AlleleCall {
    #[inline]
    pub fn is_end_of_vector(&self) -> bool {
        matches!(self, AlleleCall::EndOfVector)
    }
}

/// A site with its per-slot calls. `M` carries whatever the source needs to
/// hand back to the sink (the decoded VCF record, for instance).
#[derive(Clone, Debug, PartialEq)]
pub struct GenotypeRecord<M = ()> {
    pub chromosome: String,
    pub position: u64,
    pub alleles: Vec<AlleleCall>,
    pub metadata: M,
}

impl GenotypeRecord<()> {
    pub fn new(chromosome: impl Into<String>, position: u64, alleles: Vec<AlleleCall>) -> Self {
        Self {
            chromosome: chromosome.into(),
            position,
            alleles,
            metadata: (),
        }
    }
}

impl<M> GenotypeRecord<M> {
    pub fn slot_count(&self) -> usize {
        self.alleles.len()
    }

    /// Slots holding a call (not end-of-vector), in ascending order.
    pub fn active_slots(&self) -> Vec<usize> {
        self.alleles
            .iter()
            .enumerate()
            .filter(|(_, call)| !call.is_end_of_vector())
            .map(|(slot, _)| slot)
            .collect()
    }
}

/// Ordered supplier of records. Positions must be non-decreasing within a
/// chromosome.
pub trait RecordSource {
    type Metadata;

    fn sample_names(&self) -> &[String];

    fn next_record(&mut self) -> Result<Option<GenotypeRecord<Self::Metadata>>>;
}

pub trait RecordSink<M> {
    fn write_record(&mut self, record: GenotypeRecord<M>) -> Result<()>;

    /// Flushes buffered output and reports any deferred write failure.
    fn finish(&mut self) -> Result<()>;
}

/// Source over records already in memory.
#[derive(Debug, Default)]
pub struct MemorySource {
    sample_names: Vec<String>,
    records: std::vec::IntoIter<GenotypeRecord>,
}

impl MemorySource {
    pub fn new(sample_names: Vec<String>, records: Vec<GenotypeRecord>) -> Self {
        Self {
            sample_names,
            records: records.into_iter(),
        }
    }
}

impl RecordSource for MemorySource {
    type Metadata = ();

    fn sample_names(&self) -> &[String] {
        &self.sample_names
    }

    fn next_record(&mut self) -> Result<Option<GenotypeRecord>> {
        Ok(self.records.next())
    }
}

/// Sink that keeps every record it receives.
#[derive(Debug, Default)]
pub struct MemorySink<M = ()> {
    pub records: Vec<GenotypeRecord<M>>,
    pub finished: bool,
}

impl<M> RecordSink<M> for MemorySink<M> {
    fn write_record(&mut self, record: GenotypeRecord<M>) -> Result<()> {
        self.records.push(record);
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        self.finished = true;
        Ok(())
    }
}
