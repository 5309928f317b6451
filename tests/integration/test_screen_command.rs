//! End-to-end CLI tests for the screen command.
//!
//! These tests run the actual `fgscreen screen` binary against a small bcl2fastq layout. The
//! aligner is replaced by `cp`, which copies a canned SAM file (given as the genome's index
//! path) to the output, so the expected counts can be worked out by hand.

use std::fs;
use std::path::{Path, PathBuf};

use fgscreen_lib::metrics::load_metrics;
use fgscreen_lib::report::GenomeReportRow;
use fgoxide::io::DelimFile;
use tempfile::TempDir;

use crate::helpers::{
    leftover_scratch, run_screen, sam_line, sam_text, sample_fastq, single_sample_run_data,
    undetermined_fastq, write_fastq_gz, write_run_data,
};

const PREFIX: &str = "fastqscreen.lane1.sample.s1.read1.s1";

struct Fixture {
    dir: TempDir,
}

impl Fixture {
    fn new() -> Self {
        let dir = TempDir::new().expect("Failed to create temp dir");
        fs::create_dir_all(dir.path().join("fastq")).unwrap();
        fs::create_dir_all(dir.path().join("tmp")).unwrap();
        Self { dir }
    }

    fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    fn fastq_root(&self) -> PathBuf {
        self.path("fastq")
    }

    fn tmp(&self) -> PathBuf {
        self.path("tmp")
    }

    fn write_sam(&self, name: &str, text: &str) -> PathBuf {
        let path = self.path(name);
        fs::write(&path, text).unwrap();
        path
    }
}

fn s(path: &Path) -> &str {
    path.to_str().unwrap()
}

/// Ten reads screened against phix and human:
///
/// | read     | phix    | human   |
/// |----------|---------|---------|
/// | r01..r04 | unique  | -       |
/// | r05, r06 | unique  | unique  |
/// | r07      | multi   | -       |
/// | r08, r10 | -       | -       |
/// | r09      | -       | multi   |
fn canned_outputs(fixture: &Fixture) -> (PathBuf, PathBuf) {
    let mut phix = Vec::new();
    let mut human = Vec::new();
    for i in 1..=10 {
        let name = format!("r{i:02}");
        match i {
            1..=6 => phix.push(sam_line(&name, 0, "phix")),
            7 => {
                phix.push(sam_line(&name, 0, "phix"));
                phix.push(sam_line(&name, 256, "phix"));
            }
            _ => phix.push(sam_line(&name, 4, "phix")),
        }
        match i {
            5 | 6 => human.push(sam_line(&name, 0, "chr1")),
            9 => {
                human.push(sam_line(&name, 16, "chr1"));
                human.push(sam_line(&name, 272, "chr1"));
            }
            _ => human.push(sam_line(&name, 4, "chr1")),
        }
    }
    (
        fixture.write_sam("phix.sam", &sam_text("phix", &phix)),
        fixture.write_sam("human.sam", &sam_text("chr1", &human)),
    )
}

fn read_names() -> Vec<String> {
    (1..=10).map(|i| format!("r{i:02}")).collect()
}

fn screen_args(fixture: &Fixture, input: &Path, output: &Path, phix: &str, human: &str) -> Vec<String> {
    let fastq_root = fixture.fastq_root();
    let tmp = fixture.tmp();
    vec![
        "-i".into(),
        s(input).into(),
        "-o".into(),
        s(output).into(),
        "-f".into(),
        s(&fastq_root).into(),
        "-g".into(),
        "phix,human".into(),
        "--tmp-dir".into(),
        s(&tmp).into(),
        "--mapper".into(),
        "cp".into(),
        "--mapper-args".into(),
        "{index}".into(),
        "{output}".into(),
        ";".into(),
        "--mapper-paired-args".into(),
        "{index}".into(),
        "{output}".into(),
        ";".into(),
        "--reference".into(),
        format!("phix={phix}"),
        "--reference".into(),
        format!("human={human}"),
        "-t".into(),
        "2".into(),
    ]
}

#[test]
fn test_screen_single_end_counts() {
    let fixture = Fixture::new();
    let input = fixture.path("run.data");
    let output = fixture.path("run.out.data");
    let report_dir = fixture.path("reports");
    single_sample_run_data(&input, &[false, true], Some("human"));
    let names = read_names();
    let names: Vec<&str> = names.iter().map(String::as_str).collect();
    write_fastq_gz(&sample_fastq(&fixture.fastq_root(), "P1", "s1", "ACGT", 1, 1), &names);
    let (phix, human) = canned_outputs(&fixture);

    let mut args = screen_args(&fixture, &input, &output, s(&phix), s(&human));
    args.extend(["--report-dir".to_string(), s(&report_dir).to_string()]);
    let args: Vec<&str> = args.iter().map(String::as_str).collect();
    let result = run_screen(&args);
    assert!(result.status.success(), "screen failed: {}", String::from_utf8_lossy(&result.stderr));

    let store = load_metrics(&output).unwrap();
    let get = |suffix: &str| store.get_f64(&format!("{PREFIX}.{suffix}")).unwrap();

    // Input run data is carried over.
    assert_eq!(store.get("design.lane1.s1.sample.project"), Some("P1"));

    assert_eq!(get("reads.processed"), 10.0);
    assert_eq!(get("phix.mapped"), 7.0);
    assert_eq!(get("phix.unmapped"), 3.0);
    assert_eq!(get("phix.unique"), 6.0);
    assert_eq!(get("phix.multi"), 1.0);
    assert_eq!(get("phix.one.hit.one.genome"), 4.0);
    assert_eq!(get("phix.one.hit.multiple.genomes"), 2.0);
    assert_eq!(get("phix.multiple.hits.one.genome"), 1.0);
    assert_eq!(get("phix.multiple.hits.multiple.genomes"), 0.0);
    assert_eq!(get("phix.excluded"), 2.0);
    assert_eq!(get("phix.mapped.percent"), 70.0);

    assert_eq!(get("human.mapped"), 3.0);
    assert_eq!(get("human.unique"), 2.0);
    assert_eq!(get("human.multi"), 1.0);
    assert_eq!(get("human.one.hit.multiple.genomes"), 2.0);
    assert_eq!(get("human.multiple.hits.one.genome"), 1.0);
    assert_eq!(get("human.excluded"), 0.0);
    assert_eq!(get("human.mapped.percent"), 30.0);

    assert_eq!(get("hit.no.genomes"), 2.0);
    assert_eq!(get("hit.no.genomes.percent"), 20.0);
    assert_eq!(get("mappedexceptgenomesample.count"), 5.0);
    assert_eq!(get("mappedexceptgenomesample"), 50.0);
    assert!(!store.get_bool(&format!("{PREFIX}.paired")).unwrap());
    // Single-end run: nothing mirrored to read 2.
    assert!(!store.contains_key("fastqscreen.lane1.sample.s1.read2.s1.reads.processed"));

    let report = report_dir.join("Project_P1").join("s1_ACGT_L001_R1-fastqscreen.tsv");
    let rows: Vec<GenomeReportRow> = DelimFile::default().read_tsv(&report).unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].genome, "phix");
    assert_eq!(rows[0].mapped, 7);
    assert_eq!(rows[1].genome, "human");
    assert_eq!(rows[1].multi, 1);

    assert!(leftover_scratch(&fixture.tmp()).is_empty());
}

#[test]
fn test_screen_paired_end_run_mirrors_read_two() {
    let fixture = Fixture::new();
    let input = fixture.path("run.data");
    let output = fixture.path("run.out.data");
    single_sample_run_data(&input, &[false, true, false], None);
    let names = read_names();
    let names: Vec<&str> = names.iter().map(String::as_str).collect();
    write_fastq_gz(&sample_fastq(&fixture.fastq_root(), "P1", "s1", "ACGT", 1, 1), &names);
    write_fastq_gz(&sample_fastq(&fixture.fastq_root(), "P1", "s1", "ACGT", 1, 2), &names[..4]);
    let (phix, human) = canned_outputs(&fixture);
    let report_dir = fixture.path("reports");

    let mut args = screen_args(&fixture, &input, &output, s(&phix), s(&human));
    args.extend(["--report-dir".to_string(), s(&report_dir).to_string(), "--read-stats".to_string()]);
    let args: Vec<&str> = args.iter().map(String::as_str).collect();
    let result = run_screen(&args);
    assert!(result.status.success(), "screen failed: {}", String::from_utf8_lossy(&result.stderr));

    let store = load_metrics(&output).unwrap();
    for read in [1, 2] {
        let prefix = format!("fastqscreen.lane1.sample.s1.read{read}.s1");
        assert_eq!(store.get(&format!("{prefix}.phix.mapped")), Some("7"));
        // No sample genome: every mapped read counts.
        assert_eq!(store.get(&format!("{prefix}.mappedexceptgenomesample.count")), Some("8"));
        let report = report_dir.join("Project_P1").join(format!("s1_ACGT_L001_R{read}-fastqscreen.tsv"));
        let rows: Vec<GenomeReportRow> = DelimFile::default().read_tsv(&report).unwrap();
        assert_eq!(rows[0].mapped, 7);
    }

    // Read statistics come from each read's own FASTQ.
    let stats = "fastqc.lane1.sample.s1";
    assert_eq!(store.get(&format!("{stats}.read1.s1.basic.statistics.total.sequences")), Some("10"));
    assert_eq!(store.get(&format!("{stats}.read2.s1.basic.statistics.total.sequences")), Some("4"));
    assert_eq!(store.get(&format!("{stats}.read1.s1.basic.statistics.gc.percent")), Some("50.00"));
    assert_eq!(store.get(&format!("{stats}.read1.s1.per.base.n.content.error")), Some("false"));
    assert!(leftover_scratch(&fixture.tmp()).is_empty());
}

#[test]
fn test_screen_paired_mode_skips_missing_mate_and_screens_undetermined() {
    let fixture = Fixture::new();
    let input = fixture.path("run.data");
    let output = fixture.path("run.out.data");
    single_sample_run_data(&input, &[false, true, false], None);
    // Sample has no read-2 FASTQ; undetermined has both reads.
    write_fastq_gz(&sample_fastq(&fixture.fastq_root(), "P1", "s1", "ACGT", 1, 1), &["a1"]);
    write_fastq_gz(&undetermined_fastq(&fixture.fastq_root(), 1, 1), &["p1", "p2"]);
    write_fastq_gz(&undetermined_fastq(&fixture.fastq_root(), 1, 2), &["p1", "p2"]);

    let pairs = |reference: &str| {
        sam_text(
            reference,
            &[
                sam_line("p1", 99, reference),
                sam_line("p1", 147, reference),
                sam_line("p2", 77, reference),
                sam_line("p2", 141, reference),
            ],
        )
    };
    let phix = fixture.write_sam("phix.sam", &pairs("phix"));
    let human = fixture.write_sam("human.sam", &sam_text("chr1", &[
        sam_line("p1", 77, "chr1"),
        sam_line("p1", 141, "chr1"),
        sam_line("p2", 77, "chr1"),
        sam_line("p2", 141, "chr1"),
    ]));

    let mut args = screen_args(&fixture, &input, &output, s(&phix), s(&human));
    args.extend(["--paired".to_string(), "--undetermined".to_string()]);
    let args: Vec<&str> = args.iter().map(String::as_str).collect();
    let result = run_screen(&args);
    assert!(result.status.success(), "screen failed: {}", String::from_utf8_lossy(&result.stderr));

    let store = load_metrics(&output).unwrap();
    assert!(store.iter_prefix("fastqscreen.lane1.sample.s1").next().is_none());

    let prefix = "fastqscreen.lane1.undetermined.read1";
    assert_eq!(store.get(&format!("{prefix}.reads.processed")), Some("2"));
    assert_eq!(store.get(&format!("{prefix}.phix.unique")), Some("1"));
    assert_eq!(store.get(&format!("{prefix}.phix.multi")), Some("0"));
    assert_eq!(store.get(&format!("{prefix}.human.mapped")), Some("0"));
    assert_eq!(store.get(&format!("{prefix}.hit.no.genomes")), Some("1"));
    assert_eq!(store.get(&format!("{prefix}.paired")), Some("true"));
    assert!(leftover_scratch(&fixture.tmp()).is_empty());
}

#[test]
fn test_screen_failure_writes_no_output() {
    let fixture = Fixture::new();
    let input = fixture.path("run.data");
    let output = fixture.path("run.out.data");
    single_sample_run_data(&input, &[false], None);
    write_fastq_gz(&sample_fastq(&fixture.fastq_root(), "P1", "s1", "ACGT", 1, 1), &["r1"]);
    let tmp = fixture.tmp();

    let result = run_screen(&[
        "-i", s(&input),
        "-o", s(&output),
        "-f", s(&fixture.fastq_root()),
        "-g", "phix",
        "--tmp-dir", s(&tmp),
        "--mapper", "false",
        "--grace-period", "5",
    ]);

    assert!(!result.status.success());
    assert!(!output.exists());
    let stderr = String::from_utf8_lossy(&result.stderr);
    assert!(stderr.contains("s1"), "error should name the unit: {stderr}");
    let leftovers: Vec<PathBuf> = leftover_scratch(&tmp)
        .into_iter()
        .filter(|p| p.extension().is_none_or(|e| e != "log"))
        .collect();
    assert!(leftovers.is_empty(), "scratch files left behind: {leftovers:?}");
}

#[test]
fn test_screen_missing_metadata_fails() {
    let fixture = Fixture::new();
    let input = fixture.path("run.data");
    let output = fixture.path("run.out.data");
    write_run_data(&input, &[("run.info.read.count", "1")]);

    let result = run_screen(&[
        "-i", s(&input),
        "-o", s(&output),
        "-f", s(&fixture.fastq_root()),
        "-g", "phix",
    ]);
    assert!(!result.status.success());
    assert!(!output.exists());
}

#[test]
fn test_screen_dry_run_lists_units() {
    let fixture = Fixture::new();
    let input = fixture.path("run.data");
    let output = fixture.path("run.out.data");
    single_sample_run_data(&input, &[false], None);
    write_fastq_gz(&sample_fastq(&fixture.fastq_root(), "P1", "s1", "ACGT", 1, 1), &["r1"]);

    let result = run_screen(&[
        "-i", s(&input),
        "-o", s(&output),
        "-f", s(&fixture.fastq_root()),
        "-g", "phix",
        "--mapper", "false",
        "--dry-run",
    ]);
    assert!(result.status.success());
    assert!(!output.exists());
    assert!(String::from_utf8_lossy(&result.stderr).contains("Would screen"));
}
