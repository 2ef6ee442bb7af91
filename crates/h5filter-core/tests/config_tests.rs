use std::collections::HashMap;
use std::path::PathBuf;

use h5filter_core::EngineConfig;
use h5filter_core::config::{DEFAULT_PLUGIN_DIR, PLUGIN_PATH_ENV, THREAD_COUNT_ENV, parse_thread_count};

fn config_from(vars: &[(&str, &str)]) -> EngineConfig {
    let vars: HashMap<String, String> = vars
        .iter()
        .map(|(name, value)| ((*name).to_string(), (*value).to_string()))
        .collect();
    EngineConfig::from_lookup(|name| vars.get(name).cloned())
}

#[test]
fn defaults_when_nothing_is_set() {
    let config = config_from(&[]);
    assert_eq!(config, EngineConfig::default());
    assert_eq!(config.thread_count, 1);
    assert_eq!(config.plugin_dir, PathBuf::from(DEFAULT_PLUGIN_DIR));
}

#[test]
fn thread_count_parsing() {
    let cases = [("8", 8), ("", 1), ("0", 1), ("007", 7), ("4x", 1), ("-2", 1), (" 4", 1)];
    for (raw, expected) in cases {
        let config = config_from(&[(THREAD_COUNT_ENV, raw)]);
        assert_eq!(config.thread_count, expected, "H5_NTHREADS={raw:?}");
    }

    let overflow = "9".repeat(40);
    assert_eq!(parse_thread_count(&overflow), None);
    assert_eq!(config_from(&[(THREAD_COUNT_ENV, overflow.as_str())]).thread_count, 1);
}

#[test]
fn parse_distinguishes_invalid_from_empty() {
    assert_eq!(parse_thread_count("12"), Some(12));
    assert_eq!(parse_thread_count(""), Some(1));
    assert_eq!(parse_thread_count("0"), Some(1));
    assert_eq!(parse_thread_count("1.5"), None);
}

#[test]
fn plugin_path_override() {
    let config = config_from(&[(PLUGIN_PATH_ENV, "/opt/filters")]);
    assert_eq!(config.plugin_dir, PathBuf::from("/opt/filters"));

    let config = config_from(&[(PLUGIN_PATH_ENV, "")]);
    assert_eq!(config.plugin_dir, PathBuf::from(DEFAULT_PLUGIN_DIR));
}

#[cfg(unix)]
#[test]
fn plugin_search_dirs_split_path_lists() {
    let config = EngineConfig::default().with_plugin_dir("/opt/a::/opt/b");
    assert_eq!(
        config.plugin_search_dirs(),
        vec![PathBuf::from("/opt/a"), PathBuf::from("/opt/b")]
    );
}

#[test]
fn builder_clamps_thread_count() {
    let config = EngineConfig::default().with_thread_count(0);
    assert_eq!(config.thread_count, 1);
    assert_eq!(EngineConfig::default().with_thread_count(6).thread_count, 6);
}
