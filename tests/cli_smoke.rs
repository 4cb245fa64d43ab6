use std::path::Path;
use std::process::{Command, Output};

use tempfile::tempdir;

#[derive(Debug, serde::Deserialize)]
struct Report {
    strategy: String,
    target: usize,
    values: Vec<f64>,
    exhausted: bool,
    mean: Option<f64>,
}

/// Complete ratings over four users, self pairs included.
fn write_inputs(dir: &Path) -> (std::path::PathBuf, std::path::PathBuf) {
    let users = ["ann", "bob", "cat", "dan"];
    let mut triples = Vec::new();
    for i in 0..users.len() {
        for j in i..users.len() {
            triples.push(serde_json::json!([users[i], users[j], 1 + (i * 3 + j) % 5]));
        }
    }
    let ratings_path = dir.join("ratings.json");
    let users_path = dir.join("users.json");
    std::fs::write(&ratings_path, serde_json::to_string(&triples).unwrap()).unwrap();
    std::fs::write(&users_path, serde_json::to_string(&users).unwrap()).unwrap();
    (ratings_path, users_path)
}

fn run_elicit(algorithm: &str, ratings: &Path, users: &Path, extra: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_elicit"))
        .arg(algorithm)
        .arg(ratings)
        .arg(users)
        .args(["--pause-ms", "0", "--rank", "2", "-d", "3", "--seed", "11"])
        .args(extra)
        .output()
        .unwrap()
}

fn value_lines(stdout: &[u8]) -> (Vec<f64>, String) {
    let text = String::from_utf8(stdout.to_vec()).unwrap();
    let mut lines: Vec<&str> = text.lines().collect();
    let average = lines.pop().unwrap().to_string();
    let values = lines.iter().map(|l| l.parse::<f64>().unwrap()).collect();
    (values, average)
}

#[test]
fn every_algorithm_prints_values_and_average() {
    let dir = tempdir().unwrap();
    let (ratings, users) = write_inputs(dir.path());

    for algorithm in ["rand", "clust", "est", "prob"] {
        let output = run_elicit(algorithm, &ratings, &users, &[]);
        assert!(
            output.status.success(),
            "{algorithm}: {}",
            String::from_utf8_lossy(&output.stderr)
        );
        let (values, average) = value_lines(&output.stdout);
        assert_eq!(values.len(), 3, "{algorithm}");
        assert!(values.iter().all(|v| (1.0..=5.0).contains(v)));
        let mean = values.iter().sum::<f64>() / values.len() as f64;
        assert_eq!(average, format!("Average: {mean:.6}"));
    }
}

#[test]
fn same_seed_gives_identical_output() {
    let dir = tempdir().unwrap();
    let (ratings, users) = write_inputs(dir.path());

    let first = run_elicit("est", &ratings, &users, &[]);
    let second = run_elicit("est", &ratings, &users, &[]);
    assert!(first.status.success());
    assert_eq!(first.stdout, second.stdout);
}

#[test]
fn unknown_algorithm_is_rejected() {
    let dir = tempdir().unwrap();
    let (ratings, users) = write_inputs(dir.path());
    let output = run_elicit("greedy", &ratings, &users, &[]);
    assert!(!output.status.success());
    assert!(output.stdout.is_empty());
}

#[test]
fn rating_for_unknown_user_fails() {
    let dir = tempdir().unwrap();
    let (ratings, _) = write_inputs(dir.path());
    let users = dir.path().join("short_users.json");
    std::fs::write(&users, r#"["ann", "bob", "cat"]"#).unwrap();

    let output = run_elicit("rand", &ratings, &users, &[]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("dan"));
}

#[test]
fn negative_rating_fails_before_any_output() {
    let dir = tempdir().unwrap();
    let (_, users) = write_inputs(dir.path());
    let ratings = dir.path().join("negative.json");
    std::fs::write(&ratings, r#"[["ann", "bob", 4], ["cat", "dan", -1]]"#).unwrap();

    let output = run_elicit("clust", &ratings, &users, &[]);
    assert!(!output.status.success());
    assert!(output.stdout.is_empty());
    assert!(String::from_utf8_lossy(&output.stderr).contains("NegativeRating"));
}

#[test]
fn report_is_written_as_json() {
    let dir = tempdir().unwrap();
    let (ratings, users) = write_inputs(dir.path());
    let report_path = dir.path().join("report.json");

    let output = run_elicit(
        "prob",
        &ratings,
        &users,
        &["--report", report_path.to_str().unwrap()],
    );
    assert!(output.status.success());

    let report: Report =
        serde_json::from_str(&std::fs::read_to_string(&report_path).unwrap()).unwrap();
    let (values, _) = value_lines(&output.stdout);
    assert_eq!(report.strategy, "probability");
    assert_eq!(report.target, 3);
    assert_eq!(report.values, values);
    assert!(!report.exhausted);
    assert!(report.mean.is_some());
}

#[test]
fn focus_user_scenario_reveals_only_hidden_partners() {
    let dir = tempdir().unwrap();
    let (ratings, users) = write_inputs(dir.path());

    let output = run_elicit(
        "rand",
        &ratings,
        &users,
        &["--focus-user", "ann", "--focus-drop", "2"],
    );
    assert!(output.status.success());
    let (values, _) = value_lines(&output.stdout);
    // Only two of ann's pairs are hidden, so the run exhausts before the target.
    assert_eq!(values.len(), 2);
}
