use std::path::PathBuf;
use std::process::{Command, Output};
use std::time::{SystemTime, UNIX_EPOCH};

fn bin_path() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_divscan"))
}

fn tmp_path(filename: &str) -> PathBuf {
    let nanos = SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_nanos();
    let mut p = std::env::temp_dir();
    p.push(format!("divscan_cli_{}_{}_{}", std::process::id(), nanos, filename));
    p
}

fn run(args: &[&str]) -> Output {
    Command::new(bin_path())
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("failed to run {:?} {:?}: {}", bin_path(), args, e))
}

/// 100-step series with an anomalous shift on `[30, 45)`.
fn planted_series_json() -> String {
    let rows: Vec<String> = (0..100)
        .map(|i| {
            let noise = (((i * 7919) % 101) as f64 / 101.0 - 0.5) * 1.0;
            let v = if (30..45).contains(&i) { noise + 4.0 } else { noise };
            format!("[{}]", v)
        })
        .collect();
    format!("[{}]", rows.join(","))
}

fn assert_detections_contract(v: &serde_json::Value) -> (usize, usize, f64) {
    let detections = v
        .get("detections")
        .and_then(|x| x.as_array())
        .expect("detections should be an array");
    assert!(!detections.is_empty(), "detections should be non-empty");

    let top = &detections[0];
    let start = top.get("start").and_then(|x| x.as_array()).expect("start should be an array");
    let end = top.get("end").and_then(|x| x.as_array()).expect("end should be an array");
    assert_eq!(start.len(), 4);
    assert_eq!(end.len(), 4);
    let score = top.get("score").and_then(|x| x.as_f64()).expect("score should be a number");
    assert!(score.is_finite(), "score must be finite");

    (start[0].as_u64().unwrap() as usize, end[0].as_u64().unwrap() as usize, score)
}

#[test]
fn test_detect_finds_planted_interval() {
    let input = tmp_path("planted.json");
    std::fs::write(&input, planted_series_json()).unwrap();

    let out = run(&[
        "detect",
        "--input",
        input.to_str().unwrap(),
        "--min-size",
        "5",
        "--max-size",
        "30",
        "--num-detections",
        "3",
        "--threads",
        "1",
    ]);
    assert!(out.status.success(), "stderr: {}", String::from_utf8_lossy(&out.stderr));

    let v: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
    let (t0, t1, score) = assert_detections_contract(&v);

    // The top detection must overlap the planted interval [30, 45).
    let inter = t1.min(45).saturating_sub(t0.max(30));
    let union = (t1.max(45) - t0.min(30)).max(1);
    assert!(
        inter as f64 / union as f64 > 0.5,
        "top detection [{}, {}) score {} should cover the planted interval",
        t0,
        t1,
        score
    );

    std::fs::remove_file(&input).ok();
}

#[test]
fn test_detect_writes_output_file() {
    let input = tmp_path("planted_out.json");
    let output = tmp_path("detections.json");
    std::fs::write(&input, planted_series_json()).unwrap();

    let out = run(&[
        "detect",
        "--input",
        input.to_str().unwrap(),
        "--output",
        output.to_str().unwrap(),
        "--divergence",
        "js",
        "--estimator",
        "kde",
        "--kernel-sigma-sq",
        "0.5",
        "--min-size",
        "5",
        "--max-size",
        "30",
        "--threads",
        "1",
    ]);
    assert!(out.status.success(), "stderr: {}", String::from_utf8_lossy(&out.stderr));

    let text = std::fs::read_to_string(&output).unwrap();
    let v: serde_json::Value = serde_json::from_str(&text).unwrap();
    assert_detections_contract(&v);

    std::fs::remove_file(&input).ok();
    std::fs::remove_file(&output).ok();
}

#[test]
fn test_detect_accepts_wrapped_rows() {
    let input = tmp_path("wrapped.json");
    std::fs::write(&input, format!("{{\"rows\": {}}}", planted_series_json())).unwrap();

    let out = run(&[
        "detect",
        "--input",
        input.to_str().unwrap(),
        "--proposals",
        "pointwise",
        "--sd-th",
        "1.0",
        "--min-size",
        "5",
        "--threads",
        "1",
    ]);
    assert!(out.status.success(), "stderr: {}", String::from_utf8_lossy(&out.stderr));

    let v: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
    assert_detections_contract(&v);

    std::fs::remove_file(&input).ok();
}

#[test]
fn test_detect_missing_input_fails() {
    let out = run(&["detect", "--input", "/nonexistent/input.json"]);
    assert!(!out.status.success());
}
