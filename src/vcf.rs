// vcf.rs

// --- External Crate Imports ---
use log::{debug, info, warn};
use noodles_bcf as bcf;
use noodles_bgzf as bgzf;
use noodles_vcf::{
    self as vcf,
    variant::io::Write as _,
    variant::record::samples::keys::key,
    variant::record::samples::series::value::genotype::Phasing,
    variant::record_buf::samples::sample::{
        value::genotype::{Allele, Genotype as SampleGenotype},
        Value,
    },
    variant::record_buf::Samples,
    variant::RecordBuf,
    Header as VcfHeader,
};
use std::{
    fs::File,
    io::{self, BufRead, BufReader, BufWriter, Write},
    path::{Path, PathBuf},
    str::FromStr,
};

use crate::error::{Result, SimulationError};
use crate::genotype::{AlleleCall, GenotypeRecord, RecordSink, RecordSource};

const DEFAULT_COMPRESSION_LEVEL: u8 = 6;
const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];
const BCF_MAGIC: &[u8] = b"BCF";

/// VCF text or BCF, read after any BGZF layer has been removed.
enum VariantReader {
    Vcf(vcf::io::Reader<Box<dyn BufRead>>),
    Bcf(bcf::io::Reader<Box<dyn BufRead>>),
}

impl VariantReader {
    /// Picks the decoder from the leading bytes, so files and pipes are
    /// handled alike whatever their name.
    fn detect(mut inner: Box<dyn BufRead>) -> io::Result<Self> {
        let compressed = inner.fill_buf()?.starts_with(&GZIP_MAGIC);
        let mut decoded: Box<dyn BufRead> = if compressed {
            Box::new(bgzf::io::Reader::new(inner))
        } else {
            inner
        };
        let binary = decoded.fill_buf()?.starts_with(BCF_MAGIC);
        let reader = if binary {
            VariantReader::Bcf(bcf::io::Reader::from(decoded))
        } else {
            VariantReader::Vcf(vcf::io::Reader::new(decoded))
        };
        debug!(
            "Detected {} input{}",
            reader.kind(),
            if compressed { " (BGZF)" } else { "" }
        );
        Ok(reader)
    }

    fn kind(&self) -> &'static str {
        match self {
            VariantReader::Vcf(_) => "VCF",
            VariantReader::Bcf(_) => "BCF",
        }
    }

    fn read_header(&mut self) -> io::Result<VcfHeader> {
        match self {
            VariantReader::Vcf(reader) => reader.read_header(),
            VariantReader::Bcf(reader) => reader.read_header(),
        }
    }

    fn read_record_buf(&mut self, header: &VcfHeader, record: &mut RecordBuf) -> io::Result<usize> {
        match self {
            VariantReader::Vcf(reader) => reader.read_record_buf(header, record),
            VariantReader::Bcf(reader) => reader.read_record_buf(header, record),
        }
    }
}

/// Reads VCF or BCF records and splits each sample's GT into haplotype
/// slots.
pub struct VcfRecordSource {
    reader: VariantReader,
    header: VcfHeader,
    sample_names: Vec<String>,
    records_read: u64,
}

impl VcfRecordSource {
    /// Opens `path`, or stdin for `-`. VCF, BCF and their BGZF-compressed
    /// forms are recognized from content.
    pub fn open(path: &Path) -> Result<Self> {
        let inner: Box<dyn BufRead> = if path.as_os_str() == "-" {
            info!("Reading variants from stdin");
            Box::new(BufReader::new(io::stdin()))
        } else {
            info!("Reading variants: {}", path.display());
            let file = File::open(path).map_err(|e| {
                SimulationError::Io(io::Error::new(
                    e.kind(),
                    format!("could not open input file {}: {}", path.display(), e),
                ))
            })?;
            Box::new(BufReader::new(file))
        };
        Self::from_reader(inner)
    }

    pub fn from_reader(inner: Box<dyn BufRead>) -> Result<Self> {
        Self::with_reader(VariantReader::detect(inner)?)
    }

    fn with_reader(mut reader: VariantReader) -> Result<Self> {
        let header = reader.read_header()?;
        let sample_names: Vec<String> = header.sample_names().iter().cloned().collect();
        if sample_names.is_empty() {
            return Err(SimulationError::configuration("no samples in input file"));
        }
        if !header.formats().contains_key(key::GENOTYPE) {
            warn!(
                "Header has no FORMAT={} definition; records without GT are treated as missing calls.",
                key::GENOTYPE
            );
        }
        debug!(
            "Input samples (first 5): {:?}",
            sample_names.iter().take(5).collect::<Vec<_>>()
        );
        Ok(Self {
            reader,
            header,
            sample_names,
            records_read: 0,
        })
    }

    pub fn header(&self) -> &VcfHeader {
        &self.header
    }
}

impl RecordSource for VcfRecordSource {
    type Metadata = RecordBuf;

    fn sample_names(&self) -> &[String] {
        &self.sample_names
    }

    fn next_record(&mut self) -> Result<Option<GenotypeRecord<RecordBuf>>> {
        let mut record = RecordBuf::default();
        if self.reader.read_record_buf(&self.header, &mut record)? == 0 {
            debug!("Reached end of input after {} records", self.records_read);
            return Ok(None);
        }
        self.records_read += 1;

        let chromosome = record.reference_sequence_name().to_string();
        let position = record.variant_start().map_or(0u64, |p| p.get() as u64);
        let alleles = decode_slots(&record, self.sample_names.len()).map_err(|e| {
            SimulationError::Decode(format!("{}:{}: {}", chromosome, position, e))
        })?;

        Ok(Some(GenotypeRecord {
            chromosome,
            position,
            alleles,
            metadata: record,
        }))
    }
}

/// Lays the GT calls of every sample out as `ploidy` consecutive slots, where
/// `ploidy` is the longest genotype in the record. Shorter genotypes are
/// padded with end-of-vector; samples without a GT value become missing
/// calls.
pub fn decode_slots(record: &RecordBuf, sample_count: usize) -> std::result::Result<Vec<AlleleCall>, String> {
    let samples = record.samples();
    let gt_series = samples.select(key::GENOTYPE);

    let mut per_sample: Vec<Option<Vec<Option<usize>>>> = Vec::with_capacity(sample_count);
    for sample_idx in 0..sample_count {
        let value = gt_series.as_ref().and_then(|series| series.get(sample_idx));
        let alleles = match value {
            Some(Some(Value::Genotype(genotype))) => {
                Some(genotype.as_ref().iter().map(Allele::position).collect())
            }
            Some(Some(Value::String(text))) => {
                let genotype = SampleGenotype::from_str(text).map_err(|err| {
                    format!("failed to parse genotype string '{}' for sample #{}: {}", text, sample_idx, err)
                })?;
                Some(genotype.as_ref().iter().map(Allele::position).collect())
            }
            Some(Some(other)) => {
                return Err(format!(
                    "GT field for sample #{} has unexpected value type {:?}",
                    sample_idx, other
                ));
            }
            Some(None) | None => None,
        };
        per_sample.push(alleles);
    }

    let ploidy = per_sample
        .iter()
        .flatten()
        .map(Vec::len)
        .max()
        .unwrap_or(0)
        .max(1);

    let mut slots = Vec::with_capacity(ploidy * sample_count);
    for alleles in per_sample {
        match alleles {
            Some(alleles) => {
                let called = alleles.len();
                slots.extend(alleles.into_iter().map(AlleleCall::Called));
                slots.extend(std::iter::repeat(AlleleCall::EndOfVector).take(ploidy - called));
            }
            None => slots.extend(std::iter::repeat(AlleleCall::Called(None)).take(ploidy)),
        }
    }
    Ok(slots)
}

/// Rebuilds a phased GT value from one sample's slots, dropping
/// end-of-vector padding.
fn encode_genotype(slots: &[AlleleCall]) -> Option<Value> {
    let genotype: SampleGenotype = slots
        .iter()
        .filter_map(|call| match call {
            AlleleCall::Called(position) => Some(Allele::new(*position, Phasing::Phased)),
            AlleleCall::EndOfVector => None,
        })
        .collect();
    if genotype.as_ref().is_empty() {
        None
    } else {
        Some(Value::Genotype(genotype))
    }
}

fn rewrite_genotypes(record: &mut RecordBuf, alleles: &[AlleleCall], sample_count: usize) -> Result<()> {
    if alleles.len() % sample_count != 0 {
        return Err(SimulationError::stream_consistency(format!(
            "{} haplotype slots cannot be split across {} samples",
            alleles.len(),
            sample_count
        )));
    }
    let ploidy = alleles.len() / sample_count;

    let samples = record.samples();
    let keys = samples.keys().clone();
    let Some(gt_index) = keys.as_ref().get_index_of(key::GENOTYPE) else {
        // Nothing was called, so there is nothing to move.
        return Ok(());
    };
    let mut values: Vec<Vec<Option<Value>>> = samples
        .values()
        .map(|sample| sample.values().to_vec())
        .collect();
    for (sample_values, slots) in values.iter_mut().zip(alleles.chunks(ploidy)) {
        if sample_values.len() <= gt_index {
            sample_values.resize(gt_index + 1, None);
        }
        sample_values[gt_index] = encode_genotype(slots);
    }
    *record.samples_mut() = Samples::new(keys, values);
    Ok(())
}

/// Output encodings.
#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Uncompressed VCF.
    Vcf,
    /// BGZF-compressed VCF.
    #[value(name = "vcf.gz")]
    VcfGz,
    /// BGZF-compressed BCF.
    Bcf,
    /// Uncompressed BCF.
    #[value(name = "ubcf")]
    UBcf,
}

impl OutputFormat {
    /// Guesses from the output file name; stdout defaults to plain VCF.
    pub fn from_path(path: Option<&Path>) -> Self {
        let extension = path.and_then(|p| p.extension()).and_then(|ext| ext.to_str());
        match extension {
            Some("bcf") => OutputFormat::Bcf,
            Some("gz" | "bgz") => OutputFormat::VcfGz,
            _ => OutputFormat::Vcf,
        }
    }

    pub fn is_bgzf(self) -> bool {
        matches!(self, OutputFormat::VcfGz | OutputFormat::Bcf)
    }

    pub fn is_binary(self) -> bool {
        matches!(self, OutputFormat::Bcf | OutputFormat::UBcf)
    }
}

enum OutputStream {
    Plain(BufWriter<Box<dyn Write>>),
    Bgzf(bgzf::io::Writer<Box<dyn Write>>),
}

impl OutputStream {
    fn open(path: Option<&Path>, bgzf_compressed: bool, compression_level: Option<u8>) -> Result<Self> {
        let inner: Box<dyn Write> = match path {
            Some(path) if path.as_os_str() != "-" => {
                let file = File::create(path).map_err(|e| {
                    SimulationError::Io(io::Error::new(
                        e.kind(),
                        format!("could not create output file {}: {}", path.display(), e),
                    ))
                })?;
                Box::new(file)
            }
            _ => Box::new(io::stdout()),
        };
        if !bgzf_compressed {
            if compression_level.map_or(false, |level| level != 0) {
                warn!("Compression level ignored for uncompressed output.");
            }
            return Ok(OutputStream::Plain(BufWriter::new(inner)));
        }
        let level = compression_level.unwrap_or(DEFAULT_COMPRESSION_LEVEL);
        let compression_level = bgzf::io::writer::CompressionLevel::new(level).ok_or_else(|| {
            SimulationError::configuration(format!(
                "invalid compression level {}: expected 0-9",
                level
            ))
        })?;
        let writer = bgzf::io::writer::Builder::default()
            .set_compression_level(compression_level)
            .build_from_writer(inner);
        Ok(OutputStream::Bgzf(writer))
    }

    fn finish(&mut self) -> io::Result<()> {
        match self {
            OutputStream::Plain(writer) => writer.flush(),
            OutputStream::Bgzf(writer) => writer.try_finish(),
        }
    }
}

impl Write for OutputStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            OutputStream::Plain(writer) => writer.write(buf),
            OutputStream::Bgzf(writer) => writer.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            OutputStream::Plain(writer) => writer.flush(),
            OutputStream::Bgzf(writer) => writer.flush(),
        }
    }
}

enum VariantWriter {
    Vcf(vcf::io::Writer<OutputStream>),
    Bcf(bcf::io::Writer<OutputStream>),
}

impl VariantWriter {
    fn new(stream: OutputStream, format: OutputFormat) -> Self {
        if format.is_binary() {
            VariantWriter::Bcf(bcf::io::Writer::from(stream))
        } else {
            VariantWriter::Vcf(vcf::io::Writer::new(stream))
        }
    }

    fn as_variant_writer(&mut self) -> &mut dyn vcf::variant::io::Write {
        match self {
            VariantWriter::Vcf(writer) => writer,
            VariantWriter::Bcf(writer) => writer,
        }
    }

    fn stream_mut(&mut self) -> &mut OutputStream {
        match self {
            VariantWriter::Vcf(writer) => writer.get_mut(),
            VariantWriter::Bcf(writer) => writer.get_mut(),
        }
    }
}

/// Output settings for [`VcfRecordSink`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VcfSinkOptions {
    pub path: Option<PathBuf>,
    pub format: OutputFormat,
    pub compression_level: Option<u8>,
    /// Keep the input sample names instead of numbering samples from 0.
    pub keep_sample_names: bool,
}

impl Default for VcfSinkOptions {
    fn default() -> Self {
        Self {
            path: None,
            format: OutputFormat::Vcf,
            compression_level: None,
            keep_sample_names: false,
        }
    }
}

/// Writes transformed records back as VCF or BCF. Sample names are replaced
/// by their index unless asked otherwise, since output haplotypes no longer
/// belong to the named individuals.
///
/// BCF output needs every chromosome declared as a `##contig` in the input
/// header.
pub struct VcfRecordSink {
    writer: VariantWriter,
    header: VcfHeader,
    sample_count: usize,
    records_written: u64,
}

impl VcfRecordSink {
    pub fn create(input_header: &VcfHeader, options: &VcfSinkOptions) -> Result<Self> {
        let mut header = input_header.clone();
        let sample_count = header.sample_names().len();
        if sample_count == 0 {
            return Err(SimulationError::configuration("no samples in output header"));
        }
        if !options.keep_sample_names {
            *header.sample_names_mut() = (0..sample_count).map(|i| i.to_string()).collect();
        }

        let stream = OutputStream::open(
            options.path.as_deref(),
            options.format.is_bgzf(),
            options.compression_level,
        )?;
        let mut writer = VariantWriter::new(stream, options.format);
        writer.as_variant_writer().write_variant_header(&header)?;
        info!(
            "Writing {:?} output to {}",
            options.format,
            options
                .path
                .as_ref()
                .map_or_else(|| "stdout".to_string(), |p| p.display().to_string())
        );
        Ok(Self {
            writer,
            header,
            sample_count,
            records_written: 0,
        })
    }

    pub fn records_written(&self) -> u64 {
        self.records_written
    }
}

impl RecordSink<RecordBuf> for VcfRecordSink {
    fn write_record(&mut self, record: GenotypeRecord<RecordBuf>) -> Result<()> {
        let GenotypeRecord {
            alleles,
            metadata: mut vcf_record,
            ..
        } = record;
        rewrite_genotypes(&mut vcf_record, &alleles, self.sample_count)?;
        self.writer
            .as_variant_writer()
            .write_variant_record(&self.header, &vcf_record)?;
        self.records_written += 1;
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        self.writer.stream_mut().finish().map_err(|e| {
            SimulationError::Io(io::Error::new(e.kind(), format!("I/O failure finishing output: {}", e)))
        })?;
        debug!("Output finished after {} records", self.records_written);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    const SAMPLE_VCF: &str = "##fileformat=VCFv4.3
##contig=<ID=1,length=10000>
##FORMAT=<ID=GT,Number=1,Type=String,Description=\"Genotype\">
#CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO\tFORMAT\tA\tB\tC
1\t100\t.\tA\tG\t.\tPASS\t.\tGT\t0|1\t1|1\t0
1\t200\t.\tC\tT\t.\tPASS\t.\tGT\t1|0\t0|.\t1
";

    fn sample_source() -> VcfRecordSource {
        let inner: Box<dyn BufRead> = Box::new(Cursor::new(SAMPLE_VCF.as_bytes().to_vec()));
        VcfRecordSource::from_reader(inner).expect("header parses")
    }

    #[test]
    fn genotypes_are_split_into_padded_slots() {
        let mut source = sample_source();
        assert_eq!(source.sample_names(), &["A", "B", "C"]);

        let first = source.next_record().expect("read succeeds").expect("record present");
        assert_eq!(first.chromosome, "1");
        assert_eq!(first.position, 100);
        assert_eq!(
            first.alleles,
            vec![
                AlleleCall::Called(Some(0)),
                AlleleCall::Called(Some(1)),
                AlleleCall::Called(Some(1)),
                AlleleCall::Called(Some(1)),
                AlleleCall::Called(Some(0)),
                AlleleCall::EndOfVector,
            ]
        );

        let second = source.next_record().expect("read succeeds").expect("record present");
        assert_eq!(second.alleles[3], AlleleCall::Called(None));
        assert!(second.alleles[5].is_end_of_vector());
        assert!(source.next_record().expect("read succeeds").is_none());
    }

    #[test]
    fn encoding_drops_end_of_vector_padding() {
        let value = encode_genotype(&[AlleleCall::Called(Some(2)), AlleleCall::EndOfVector])
            .expect("one allele called");
        match value {
            Value::Genotype(genotype) => {
                let positions: Vec<Option<usize>> = genotype.as_ref().iter().map(Allele::position).collect();
                assert_eq!(positions, vec![Some(2)]);
            }
            other => panic!("unexpected value {other:?}"),
        }
        assert!(encode_genotype(&[AlleleCall::EndOfVector, AlleleCall::EndOfVector]).is_none());
    }

    fn round_trip(file_name: &str, format: OutputFormat) {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join(file_name);
        let mut source = sample_source();
        let options = VcfSinkOptions {
            path: Some(path.clone()),
            format,
            compression_level: Some(1),
            keep_sample_names: false,
        };
        let mut sink = VcfRecordSink::create(source.header(), &options).expect("sink opens");

        let mut expected = Vec::new();
        while let Some(mut record) = source.next_record().expect("read succeeds") {
            record.alleles.swap(0, 3);
            expected.push(record.alleles.clone());
            sink.write_record(record).expect("write succeeds");
        }
        sink.finish().expect("finish succeeds");
        assert_eq!(sink.records_written(), 2);

        let mut reread = VcfRecordSource::open(&path).expect("output reopens");
        assert_eq!(reread.sample_names(), &["0", "1", "2"]);
        let mut observed = Vec::new();
        while let Some(record) = reread.next_record().expect("read succeeds") {
            observed.push(record.alleles);
        }
        assert_eq!(observed, expected);
    }

    #[test]
    fn written_records_read_back_with_the_same_slots() {
        round_trip("out.vcf.gz", OutputFormat::VcfGz);
    }

    #[test]
    fn bcf_records_read_back_with_the_same_slots() {
        round_trip("out.bcf", OutputFormat::Bcf);
        round_trip("out.ubcf", OutputFormat::UBcf);
    }

    #[test]
    fn compressed_input_is_recognized_without_a_file_name() {
        let mut compressed = bgzf::io::Writer::new(Vec::new());
        compressed.write_all(SAMPLE_VCF.as_bytes()).expect("compress");
        let bytes = compressed.finish().expect("finish compression");
        assert_eq!(&bytes[..2], &GZIP_MAGIC);

        let inner: Box<dyn BufRead> = Box::new(Cursor::new(bytes));
        let mut source = VcfRecordSource::from_reader(inner).expect("header parses");
        assert_eq!(source.sample_names(), &["A", "B", "C"]);
        let first = source.next_record().expect("read succeeds").expect("record present");
        assert_eq!(first.position, 100);
    }

    #[test]
    fn format_is_guessed_from_extension() {
        assert_eq!(OutputFormat::from_path(None), OutputFormat::Vcf);
        assert_eq!(OutputFormat::from_path(Some(Path::new("x.vcf"))), OutputFormat::Vcf);
        assert_eq!(OutputFormat::from_path(Some(Path::new("x.vcf.gz"))), OutputFormat::VcfGz);
        assert_eq!(OutputFormat::from_path(Some(Path::new("x.bcf"))), OutputFormat::Bcf);
        assert!(OutputFormat::UBcf.is_binary() && !OutputFormat::UBcf.is_bgzf());
    }
}
