//! Integration tests for logging system

use core_runtime::logging::{
    filter_directives, init_logging, strip_path, LogFormat, LogLevel, LoggingConfig,
};

#[test]
fn test_logging_config_builder() {
    // We can only initialize once per process, so most checks target the builder
    let config = LoggingConfig::default()
        .with_format(LogFormat::Json)
        .with_level(LogLevel::Debug)
        .with_spans(true)
        .with_thread_info(true);

    assert_eq!(config.format, LogFormat::Json);
    assert_eq!(config.level, LogLevel::Debug);
    assert!(config.enable_spans);
    assert!(config.display_thread_info);
}

#[test]
fn test_second_initialization_fails() {
    let config = LoggingConfig::default()
        .with_format(LogFormat::Compact)
        .with_level(LogLevel::Warn);

    let _ = init_logging(config.clone());
    let second = init_logging(config);

    assert!(second.is_err(), "global subscriber can only be installed once");
}

#[test]
fn test_level_is_applied_to_all_workspace_crates() {
    let config = LoggingConfig::default().with_level(LogLevel::Trace);
    let directives = filter_directives(&config);

    for krate in [
        "core_runtime",
        "core_library",
        "core_metadata",
        "core_sync",
        "core_service",
    ] {
        assert!(
            directives.contains(&format!("{}=trace", krate)),
            "missing directive for {}",
            krate
        );
    }
}

#[test]
fn test_log_level_serde_names() {
    let json = serde_json::to_string(&LogLevel::Warn).unwrap();
    assert_eq!(json, "\"warn\"");

    let parsed: LogLevel = serde_json::from_str("\"error\"").unwrap();
    assert_eq!(parsed, LogLevel::Error);
}

#[test]
fn test_format_parsing() {
    assert_eq!("JSON".parse::<LogFormat>().unwrap(), LogFormat::Json);
    assert_eq!("compact".parse::<LogFormat>().unwrap(), LogFormat::Compact);
    assert!("xml".parse::<LogFormat>().is_err());
}

#[test]
fn test_path_stripping() {
    assert_eq!(strip_path("/srv/music/Artist - Song.mp3"), "Artist - Song.mp3");
    assert_eq!(strip_path("C:\\Music\\song.flac"), "song.flac");
    assert_eq!(strip_path("song.ogg"), "song.ogg");
}
