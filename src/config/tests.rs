use super::{flush_threshold_bytes, AppConfig, VadEngineKind};
use clap::Parser;

fn base_config() -> AppConfig {
    AppConfig::parse_from(["voxgate"])
}

#[test]
fn defaults_are_valid() {
    let cfg = base_config();
    cfg.validate().expect("defaults should validate");
}

#[test]
fn default_flush_threshold_is_one_second_of_target_audio() {
    let cfg = base_config();
    let pipeline = cfg.pipeline_config();
    // 16 kHz, 16-bit mono: 32_000 bytes per second.
    assert_eq!(pipeline.flush_threshold_bytes, 32_000);
}

#[test]
fn flush_threshold_scales_with_milliseconds() {
    assert_eq!(flush_threshold_bytes(500), 16_000);
    assert_eq!(flush_threshold_bytes(2_000), 64_000);
}

#[test]
fn rejects_zero_seconds() {
    let cfg = AppConfig::parse_from(["voxgate", "--seconds", "0"]);
    assert!(cfg.validate().is_err());
}

#[test]
fn rejects_tiny_frame_width() {
    let cfg = AppConfig::parse_from(["voxgate", "--frame-samples", "8"]);
    assert!(cfg.validate().is_err());
}

#[test]
fn rejects_out_of_range_flush_threshold() {
    let cfg = AppConfig::parse_from(["voxgate", "--flush-threshold-ms", "50"]);
    assert!(cfg.validate().is_err());
    let cfg = AppConfig::parse_from(["voxgate", "--flush-threshold-ms", "20000"]);
    assert!(cfg.validate().is_err());
}

#[test]
fn rejects_positive_vad_threshold() {
    let cfg = AppConfig::parse_from(["voxgate", "--vad-threshold-db", "3.0"]);
    assert!(cfg.validate().is_err());
}

#[test]
fn rejects_bad_language_codes() {
    let cfg = AppConfig::parse_from(["voxgate", "--lang", "english"]);
    assert!(cfg.validate().is_err());
    let cfg = AppConfig::parse_from(["voxgate", "--lang", "auto"]);
    assert!(cfg.validate().is_ok());
}

#[test]
fn rejects_missing_model_file() {
    let cfg = AppConfig::parse_from(["voxgate", "--model-path", "/no/such/model.bin"]);
    assert!(cfg.validate().is_err());
}

#[test]
fn vad_engine_labels() {
    assert_eq!(VadEngineKind::Earshot.label(), "earshot");
    assert_eq!(VadEngineKind::Energy.label(), "energy");
}
