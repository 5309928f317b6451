//! Builders for on-disk sequencing runs: run data, bcl2fastq FASTQ layouts and canned SAM.

#![allow(dead_code)]

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use flate2::Compression;
use flate2::write::GzEncoder;

/// Writes a run-data file from `(key, value)` pairs.
pub fn write_run_data(path: &Path, entries: &[(&str, &str)]) {
    let text: String = entries.iter().map(|(k, v)| format!("{k}={v}\n")).collect();
    fs::write(path, text).expect("Failed to write run data");
}

/// Run data for one lane with a single indexed sample `s1` of project `P1`.
///
/// `reads` lists whether each sequencer read is an index read.
pub fn single_sample_run_data(path: &Path, reads: &[bool], sample_genome: Option<&str>) {
    let read_count = reads.len().to_string();
    let flags: Vec<(String, String)> = reads
        .iter()
        .enumerate()
        .map(|(i, indexed)| (format!("run.info.read{}.indexed", i + 1), indexed.to_string()))
        .collect();

    let mut entries: Vec<(&str, &str)> = vec![
        ("run.info.flow.cell.lane.count", "1"),
        ("run.info.read.count", read_count.as_str()),
        ("design.lane1.samples.names", "s1"),
        ("design.lane1.s1.sample.project", "P1"),
        ("design.lane1.s1.index", "ACGT"),
    ];
    entries.extend(flags.iter().map(|(k, v)| (k.as_str(), v.as_str())));
    if let Some(genome) = sample_genome {
        entries.push(("design.lane1.s1.sample.ref", genome));
    }
    write_run_data(path, &entries);
}

/// FASTQ text with one 4-base record per name.
pub fn fastq_text(names: &[&str]) -> String {
    names.iter().map(|name| format!("@{name}\nACGT\n+\nIIII\n")).collect()
}

/// Writes a gzip-compressed FASTQ, creating parent directories.
pub fn write_fastq_gz(path: &Path, names: &[&str]) {
    fs::create_dir_all(path.parent().expect("FASTQ path has a parent")).expect("Failed to create dir");
    let mut encoder = GzEncoder::new(File::create(path).expect("Failed to create FASTQ"), Compression::fast());
    encoder.write_all(fastq_text(names).as_bytes()).expect("Failed to write FASTQ");
    encoder.finish().expect("Failed to finish gzip stream");
}

/// Path of a sample FASTQ chunk in a bcl2fastq layout.
pub fn sample_fastq(root: &Path, project: &str, sample: &str, index: &str, lane: u32, read: u32) -> PathBuf {
    root.join(format!("Project_{project}"))
        .join(format!("Sample_{sample}"))
        .join(format!("{sample}_{index}_L{lane:03}_R{read}_001.fastq.gz"))
}

/// Path of an undetermined FASTQ chunk in a bcl2fastq layout.
pub fn undetermined_fastq(root: &Path, lane: u32, read: u32) -> PathBuf {
    root.join("Undetermined_indices")
        .join(format!("Sample_lane{lane}"))
        .join(format!("lane{lane}_Undetermined_L{lane:03}_R{read}_001.fastq.gz"))
}

/// A SAM body line. Unmapped records (flag 0x4) are written with `*` as reference.
pub fn sam_line(name: &str, flag: u16, reference: &str) -> String {
    let (rname, pos, mapq, cigar) =
        if flag & 0x4 == 0 { (reference, 1, 42, "4M") } else { ("*", 0, 0, "*") };
    format!("{name}\t{flag}\t{rname}\t{pos}\t{mapq}\t{cigar}\t*\t0\t0\tACGT\tIIII\n")
}

/// A SAM text declaring one reference, followed by `body`.
pub fn sam_text(reference: &str, body: &[String]) -> String {
    let mut text = format!("@HD\tVN:1.6\tSO:unsorted\n@SQ\tSN:{reference}\tLN:5386\n");
    for line in body {
        text.push_str(line);
    }
    text
}

/// Runs `fgscreen screen` with `args`.
pub fn run_screen(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_fgscreen"))
        .arg("screen")
        .args(args)
        .output()
        .expect("Failed to run screen command")
}

/// Scratch files left in `dir` by the screen command.
pub fn leftover_scratch(dir: &Path) -> Vec<PathBuf> {
    fs::read_dir(dir)
        .expect("Failed to list scratch dir")
        .map(|e| e.expect("Failed to read entry").path())
        .filter(|p| p.file_name().and_then(|n| n.to_str()).is_some_and(|n| n.starts_with("fgscreen_")))
        .collect()
}
