use std::process::Command;

fn combined_output(output: &std::process::Output) -> String {
    let mut combined = String::new();
    combined.push_str(&String::from_utf8_lossy(&output.stdout));
    combined.push_str(&String::from_utf8_lossy(&output.stderr));
    combined
}

fn voxgate_bin() -> &'static str {
    option_env!("CARGO_BIN_EXE_voxgate").expect("voxgate test binary not built")
}

#[test]
fn voxgate_help_mentions_name() {
    let output = Command::new(voxgate_bin())
        .arg("--help")
        .output()
        .expect("run voxgate --help");
    assert!(output.status.success());
    let combined = combined_output(&output);
    assert!(combined.contains("voxgate"));
}

#[test]
fn voxgate_list_input_devices_prints_message() {
    let output = Command::new(voxgate_bin())
        .arg("--list-input-devices")
        .env("VOXGATE_TEST_DEVICES", "Mic A,Mic B")
        .output()
        .expect("run voxgate --list-input-devices");
    assert!(output.status.success());
    let combined = combined_output(&output);
    assert!(combined.contains("Available audio input devices:"));
    assert!(combined.contains("Mic A"));
}

#[test]
fn voxgate_requires_a_model_to_run() {
    let output = Command::new(voxgate_bin())
        .env_remove("VOXGATE_MODEL")
        .output()
        .expect("run voxgate without a model");
    assert!(!output.status.success());
    let combined = combined_output(&output);
    assert!(combined.contains("--model-path") || combined.contains("VOXGATE_MODEL"));
}

#[test]
fn voxgate_rejects_out_of_range_flush_threshold() {
    let output = Command::new(voxgate_bin())
        .args(["--flush-threshold-ms", "50"])
        .output()
        .expect("run voxgate with a bad threshold");
    assert!(!output.status.success());
    let combined = combined_output(&output);
    assert!(combined.contains("--flush-threshold-ms"));
}
