//! Runs the built binary against the null driver.

use std::io::Write as _;
use std::process::{Command, Output};

fn boson_info(args: &[&str], env: &[(&str, &str)]) -> Output {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_boson-info"));
    cmd.args(args)
        .env_remove("BOSON_LOADER_CONFIG")
        .env_remove("BOSON_DRIVERS_ORDER")
        .env_remove("BOSON_DRIVER_PATHS")
        .env_remove("BOSON_NULL_DRIVER_TYPE")
        .env_remove("BOSON_ENABLE_NULL_DRIVER");
    for (key, value) in env {
        cmd.env(key, value);
    }
    cmd.output().expect("failed to run boson-info")
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

#[test]
fn order_subcommand() {
    let out = boson_info(
        &[
            "order", "-p", "DISCRETE_GPU_ONLY:1,3,NPU:0", "disc0:DISCRETE_GPU", "disc1:DISCRETE_GPU",
            "int0:INTEGRATED_GPU", "gpu0:GPU", "npu0:NPU", "oth0:OTHER",
        ],
        &[],
    );
    assert!(out.status.success());
    let names: Vec<String> = stdout(&out)
        .lines()
        .filter_map(|l| l.split_whitespace().nth(1).map(str::to_string))
        .collect();
    assert_eq!(names, ["disc1", "gpu0", "npu0", "disc0", "int0", "oth0"]);
}

#[test]
fn drivers_json_with_null_driver() {
    let out = boson_info(
        &["drivers", "--json"],
        &[("BOSON_ENABLE_NULL_DRIVER", "1"), ("BOSON_NULL_DRIVER_TYPE", "NPU")],
    );
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));
    let rows: serde_json::Value = serde_json::from_str(&stdout(&out)).unwrap();
    let rows = rows.as_array().unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["name"], "null-npu");
    assert_eq!(rows[0]["category"], "NPU");
    assert_eq!(rows[0]["selected"], true);
}

#[test]
fn devices_from_config_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(
        file,
        "enable_null_driver = true\nnull_driver_type = \"GPU\"\nnull_driver_devices = 2"
    )
    .unwrap();
    let path = file.path().to_str().unwrap();
    let out = boson_info(&["--config", path, "devices", "--json"], &[]);
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));
    let rows: serde_json::Value = serde_json::from_str(&stdout(&out)).unwrap();
    let ids: Vec<u64> = rows
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["id"].as_u64().unwrap())
        .collect();
    assert_eq!(ids, [0, 1]);
}

#[test]
fn devices_without_drivers_fails() {
    let out = boson_info(&["devices"], &[]);
    assert!(!out.status.success());
}
