use std::path::PathBuf;
use std::process::{Command, Output};

fn scratch_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("lagrange-cli-{}-{}", name, std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

fn lagrange(dir: &PathBuf, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_lagrange"))
        .args(args)
        .current_dir(dir)
        .env_remove("RUST_LOG")
        .output()
        .unwrap()
}

#[test]
fn derive_prints_equation_of_motion() {
    let dir = scratch_dir("derive");
    let output = lagrange(&dir, &["derive", "--no-plot"]);
    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout).unwrap();
    assert!(stdout.contains("Eq(theta''(t) + g*sin(theta(t))/l, 0)"));
    assert!(stdout.contains("\\frac{d^{2}}{d t^{2}}"));
}

#[test]
fn json_report_contains_every_pipeline() {
    let dir = scratch_dir("json");
    let config = dir.join("small.toml");
    std::fs::write(&config, "[stability]\ngrid = [40, 40]\n").unwrap();
    let json = dir.join("report.json");
    let output = lagrange(
        &dir,
        &[
            "all",
            "--no-plot",
            "--config",
            config.to_str().unwrap(),
            "--json",
            json.to_str().unwrap(),
        ],
    );
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let report: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&json).unwrap()).unwrap();
    assert_eq!(report["stability"]["grid_shape"], serde_json::json!([40, 40]));
    assert_eq!(report["stability"]["equilibria"][0]["stability"], "center");
    assert_eq!(report["pendulum"]["series"]["t"].as_array().unwrap().len(), 400);
    assert!(report["coupled"]["energy_drift"].as_f64().unwrap() < 1e-3);
    assert!(report["derivation"]["lagrangian"]["latex"].is_string());
    assert!(!dir.join("pendulum.png").exists());
}

#[test]
fn config_subcommand_prints_effective_toml() {
    let dir = scratch_dir("config");
    let output = lagrange(&dir, &["config"]);
    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout).unwrap();
    assert!(stdout.contains("[pendulum]"));
    assert!(stdout.contains("theta0 = 0.26"));
}

#[test]
fn malformed_config_fails_with_context() {
    let dir = scratch_dir("malformed");
    let config = dir.join("broken.toml");
    std::fs::write(&config, "[coupled\nk1 = ").unwrap();
    let output = lagrange(&dir, &["coupled", "--config", config.to_str().unwrap()]);
    assert!(!output.status.success());
    let stderr = String::from_utf8(output.stderr).unwrap();
    assert!(stderr.contains("Failed to parse config file"));
}
