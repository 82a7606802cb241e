//! Integration tests driving the sabuild binary.
//!
//! The default `run` spawns this same binary's `make-part` and `merge`
//! subcommands, so these tests cover the worker protocol end to end.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::{tempdir, TempDir};

/// Path to the built binary
fn sabuild_binary() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_sabuild"))
}

/// Run sabuild with args and return (stdout, stderr, exit code)
fn run_sabuild(args: &[&str]) -> (String, String, Option<i32>) {
    let output = Command::new(sabuild_binary())
        .args(args)
        .arg("--no-color")
        .env("RUST_LOG", "warn")
        .output()
        .expect("Failed to execute sabuild");

    (
        String::from_utf8_lossy(&output.stdout).to_string(),
        String::from_utf8_lossy(&output.stderr).to_string(),
        output.status.code(),
    )
}

/// Text corpus of `len` bytes: words drawn pseudo-randomly, so repeats are
/// common but never longer than the partition overlap
fn write_corpus(len: usize) -> (TempDir, PathBuf, Vec<u8>) {
    let dir = tempdir().unwrap();
    let path = dir.path().join("corpus.txt");
    let words: &[&[u8]] = &[b"suffix ", b"array ", b"merge ", b"part ", b"a", b"\n"];
    let mut data = Vec::with_capacity(len);
    let mut state = 0x9E37_79B9_7F4A_7C15u64;
    while data.len() < len {
        state ^= state << 13;
        state ^= state >> 7;
        state ^= state << 17;
        data.extend_from_slice(words[(state % words.len() as u64) as usize]);
    }
    data.truncate(len);
    fs::write(&path, &data).unwrap();
    (dir, path, data)
}

fn p(path: &Path) -> &str {
    path.to_str().unwrap()
}

/// Decode a little-endian fixed-width table
fn read_table(path: &Path, width: usize) -> Vec<u64> {
    fs::read(path)
        .unwrap()
        .chunks(width)
        .map(|chunk| {
            let mut bytes = [0u8; 8];
            bytes[..width].copy_from_slice(chunk);
            u64::from_le_bytes(bytes)
        })
        .collect()
}

fn assert_suffix_order(table: &[u64], data: &[u8]) {
    assert_eq!(table.len(), data.len());
    for pair in table.windows(2) {
        assert!(data[pair[0] as usize..] <= data[pair[1] as usize..]);
    }
}

#[test]
fn run_with_worker_subprocesses() {
    let (dir, data_file, data) = write_corpus(5000);
    let output = dir.path().join("out.table.bin");

    let (stdout, stderr, code) = run_sabuild(&[
        "run",
        p(&data_file),
        p(&output),
        "--total-jobs",
        "4",
        "--jobs-at-once",
        "2",
        "--overlap",
        "256",
        "--retry-delay-ms",
        "0",
    ]);
    assert_eq!(code, Some(0), "stderr: {stderr}");
    assert!(stdout.contains("Suffix array built successfully"));

    assert_eq!(fs::metadata(&output).unwrap().len(), 5000 * 2);
    assert_suffix_order(&read_table(&output, 2), &data);

    let sidecar = fs::read_to_string(dir.path().join("out.table.bin.meta.json")).unwrap();
    let meta: serde_json::Value = serde_json::from_str(&sidecar).unwrap();
    assert_eq!(meta["index_width"], 2);
    assert_eq!(meta["data_size"], 5000);
    assert_eq!(meta["partitions"], 4);
}

#[test]
fn run_defaults_output_next_to_corpus() {
    let (dir, data_file, data) = write_corpus(1200);

    let (_, stderr, code) = run_sabuild(&[
        "run",
        p(&data_file),
        "--total-jobs",
        "3",
        "--overlap",
        "64",
        "--in-process",
        "-q",
    ]);
    assert_eq!(code, Some(0), "stderr: {stderr}");

    let output = dir.path().join("corpus.txt.table.bin");
    assert_suffix_order(&read_table(&output, 2), &data);
    assert!(dir.path().join("corpus.txt.part.0-464").exists());
}

#[test]
fn quiet_run_prints_nothing_to_stdout() {
    let (dir, data_file, _) = write_corpus(300);
    let output = dir.path().join("q.table.bin");

    let (stdout, _, code) = run_sabuild(&["run", p(&data_file), p(&output), "--in-process", "-q"]);
    assert_eq!(code, Some(0));
    assert!(stdout.is_empty());
    assert!(output.exists());
}

#[cfg(unix)]
#[test]
fn failing_merge_program_exits_with_merge_code() {
    let (dir, data_file, _) = write_corpus(2000);
    let output = dir.path().join("out.table.bin");

    let (_, stderr, code) = run_sabuild(&[
        "run",
        p(&data_file),
        p(&output),
        "--total-jobs",
        "2",
        "--merge-cmd",
        "false",
        "-q",
    ]);
    assert_eq!(code, Some(2));
    assert!(stderr.contains("Merge failed"), "stderr: {stderr}");
    assert!(stderr.contains("ulimit -Sn"));
    assert!(!output.exists());
}

#[test]
fn empty_corpus_fails() {
    let dir = tempdir().unwrap();
    let data_file = dir.path().join("empty.bin");
    fs::write(&data_file, b"").unwrap();

    let (_, stderr, code) = run_sabuild(&["run", p(&data_file), "--in-process", "-q"]);
    assert_eq!(code, Some(1));
    assert!(stderr.contains("empty"), "stderr: {stderr}");
}

#[test]
fn make_part_and_merge_workers() {
    let (dir, data_file, data) = write_corpus(900);

    for (start, end) in [(0, 500), (400, 900)] {
        let (_, stderr, code) = run_sabuild(&[
            "make-part",
            "--data-file",
            p(&data_file),
            "--start-byte",
            &start.to_string(),
            "--end-byte",
            &end.to_string(),
        ]);
        assert_eq!(code, Some(0), "stderr: {stderr}");
    }

    let first = dir.path().join("corpus.txt.part.0-500");
    let second = dir.path().join("corpus.txt.part.400-900");
    assert_eq!(fs::read(&first).unwrap(), &data[..500]);
    assert_eq!(
        fs::metadata(dir.path().join("corpus.txt.part.0-500.table.bin"))
            .unwrap()
            .len(),
        500 * 2
    );

    let output = dir.path().join("merged.table.bin");
    let (_, stderr, code) = run_sabuild(&[
        "merge",
        "--output-file",
        p(&output),
        "--suffix-path",
        p(&first),
        "--suffix-path",
        p(&second),
        "--num-threads",
        "2",
    ]);
    assert_eq!(code, Some(0), "stderr: {stderr}");
    assert_suffix_order(&read_table(&output, 2), &data);
}

#[test]
fn make_part_rejects_range_past_end() {
    let (_dir, data_file, _) = write_corpus(100);

    let (_, _, code) = run_sabuild(&[
        "make-part",
        "--data-file",
        p(&data_file),
        "--start-byte",
        "50",
        "--end-byte",
        "200",
    ]);
    assert_eq!(code, Some(1));
}

#[test]
fn show_config_fills_in_defaults() {
    let dir = tempdir().unwrap();
    let config = dir.path().join("config.json");
    fs::write(&config, r#"{ "total_jobs": 32 }"#).unwrap();

    let (stdout, _, code) = run_sabuild(&["show-config", "--config", p(&config)]);
    assert_eq!(code, Some(0));

    let value: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(value["total_jobs"], 32);
    assert_eq!(value["jobs_at_once"], 16);
    assert_eq!(value["overlap"], 100_000);
    assert_eq!(value["builder"], "self");
}

#[test]
fn missing_explicit_config_fails() {
    let dir = tempdir().unwrap();
    let config = dir.path().join("missing.json");

    let (_, stderr, code) = run_sabuild(&["show-config", "--config", p(&config)]);
    assert_eq!(code, Some(1));
    assert!(stderr.contains("Failed to read config file"), "stderr: {stderr}");
}
