use rand_recom::vcf::{OutputFormat, VcfRecordSink, VcfRecordSource, VcfSinkOptions};
use rand_recom::{
    AlleleCall, GenotypeRecord, MemorySink, MemorySource, RecordSource, RecordTransformer,
    SelectionPolicy, SimulationConfig, SwitchDiagnostics,
};
use std::fs;
use std::path::Path;
use tempfile::tempdir;

const INPUT_VCF: &str = "##fileformat=VCFv4.3
##contig=<ID=1,length=5000>
##FORMAT=<ID=GT,Number=1,Type=String,Description=\"Genotype\">
#CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO\tFORMAT\tNA1\tNA2
1\t1\t.\tA\tG\t.\tPASS\t.\tGT\t0|0\t1|1
1\t1250\t.\tC\tT\t.\tPASS\t.\tGT\t0|1\t1|0
1\t2500\t.\tG\tA\t.\tPASS\t.\tGT\t0|0\t0|1
1\t3750\t.\tT\tC\t.\tPASS\t.\tGT\t1|1\t0|0
1\t5000\t.\tA\tC\t.\tPASS\t.\tGT\t0|1\t0|1
";

fn run_vcf(input: &Path, output: &Path, config: SimulationConfig) -> u64 {
    let mut source = VcfRecordSource::open(input).expect("input opens");
    let options = VcfSinkOptions {
        path: Some(output.to_path_buf()),
        format: OutputFormat::Vcf,
        ..VcfSinkOptions::default()
    };
    let mut sink = VcfRecordSink::create(source.header(), &options).expect("output opens");
    let summary = RecordTransformer::new(config)
        .run(&mut source, &mut sink)
        .expect("run succeeds");
    assert!(summary.state.is_bijection());
    summary.switches
}

fn read_calls(path: &Path) -> Vec<Vec<AlleleCall>> {
    let mut source = VcfRecordSource::open(path).expect("file opens");
    let mut calls = Vec::new();
    while let Some(record) = source.next_record().expect("record decodes") {
        calls.push(record.alleles);
    }
    calls
}

fn sorted(mut calls: Vec<AlleleCall>) -> Vec<AlleleCall> {
    calls.sort_by_key(|call| match call {
        AlleleCall::Called(code) => code.map_or(0, |c| c + 1),
        AlleleCall::EndOfVector => usize::MAX,
    });
    calls
}

#[test]
fn uniform_runs_with_the_same_seed_write_identical_files() {
    let dir = tempdir().expect("tempdir");
    let input = dir.path().join("in.vcf");
    fs::write(&input, INPUT_VCF).expect("write input");

    let config = SimulationConfig::new(42, 1000.0).with_policy(SelectionPolicy::Uniform);
    let first = dir.path().join("first.vcf");
    let second = dir.path().join("second.vcf");
    run_vcf(&input, &first, config.clone());
    run_vcf(&input, &second, config);

    let first_bytes = fs::read(&first).expect("read first");
    assert_eq!(first_bytes, fs::read(&second).expect("read second"));

    let original = read_calls(&input);
    let shuffled = read_calls(&first);
    assert_eq!(shuffled.len(), 5);
    for (before, after) in original.into_iter().zip(shuffled) {
        assert_eq!(sorted(before), sorted(after));
    }
}

#[test]
fn output_samples_are_renamed_and_phased() {
    let dir = tempdir().expect("tempdir");
    let input = dir.path().join("in.vcf");
    let output = dir.path().join("out.vcf");
    fs::write(&input, INPUT_VCF).expect("write input");
    run_vcf(&input, &output, SimulationConfig::new(42, 1000.0));

    let text = fs::read_to_string(&output).expect("read output");
    let header_line = text
        .lines()
        .find(|line| line.starts_with("#CHROM"))
        .expect("column header present");
    assert!(header_line.ends_with("FORMAT\t0\t1"));
    for line in text.lines().filter(|line| !line.starts_with('#')) {
        for genotype in line.split('\t').skip(9) {
            assert!(!genotype.contains('/'), "unphased call in {}", line);
        }
    }
}

fn diploid_records(samples: usize, positions: &[u64]) -> Vec<GenotypeRecord> {
    positions
        .iter()
        .map(|&position| {
            let calls = (0..samples * 2).map(|slot| AlleleCall::Called(Some(slot))).collect();
            GenotypeRecord::new("1", position, calls)
        })
        .collect()
}

fn run_memory(config: SimulationConfig, records: Vec<GenotypeRecord>) -> (Vec<GenotypeRecord>, Vec<u64>) {
    let names = vec!["NA1".to_string(), "NA2".to_string()];
    let mut source = MemorySource::new(names.clone(), records);
    let mut sink = MemorySink::default();
    let summary = RecordTransformer::new(config)
        .run(&mut source, &mut sink)
        .expect("run succeeds");
    let diagnostics = SwitchDiagnostics::new(&names, &summary).expect("diagnostics build");
    assert_eq!(diagnostics.ploidy(), 2);
    (sink.records, summary.state.switch_counts().to_vec())
}

const FIVE_SITES: [u64; 5] = [1, 1250, 2500, 3750, 5000];

fn assert_permuted_rows(records: &[GenotypeRecord]) {
    let expected: Vec<AlleleCall> = (0..4).map(|slot| AlleleCall::Called(Some(slot))).collect();
    for record in records {
        assert_eq!(sorted(record.alleles.clone()), expected);
    }
}

#[test]
fn seed_42_uniform_replays_and_weighted_diverges() {
    let uniform = SimulationConfig::new(42, 1000.0).with_policy(SelectionPolicy::Uniform);
    let (first_rows, first_counts) = run_memory(uniform.clone(), diploid_records(2, &FIVE_SITES));
    let (second_rows, second_counts) = run_memory(uniform, diploid_records(2, &FIVE_SITES));
    assert_eq!(first_rows, second_rows);
    assert_eq!(first_counts, second_counts);
    assert!(first_counts.iter().sum::<u64>() > 0);

    let weighted = SimulationConfig::new(42, 1000.0).with_policy(SelectionPolicy::Weighted);
    let (weighted_rows, weighted_counts) = run_memory(weighted, diploid_records(2, &FIVE_SITES));
    assert_permuted_rows(&weighted_rows);
    assert_ne!(weighted_rows, first_rows);
    assert_ne!(weighted_counts, first_counts);
}

#[test]
fn weighted_policy_stays_valid_across_seeds() {
    for seed in 1..=40 {
        let config = SimulationConfig::new(seed, 1000.0).with_policy(SelectionPolicy::Weighted);
        let (rows, counts) = run_memory(config, diploid_records(2, &FIVE_SITES));
        assert_permuted_rows(&rows);
        assert_eq!(counts.iter().sum::<u64>() % 2, 0);
    }
}

#[test]
fn negative_seeds_are_accepted_and_distinct() {
    let positions: Vec<u64> = (1..=100).map(|i| i * 100).collect();
    let (positive, _) = run_memory(SimulationConfig::new(7, 500.0), diploid_records(2, &positions));
    let (negative, _) = run_memory(SimulationConfig::new(-7, 500.0), diploid_records(2, &positions));
    assert_ne!(positive, negative);
}
