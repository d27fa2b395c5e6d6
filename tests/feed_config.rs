// tests/feed_config.rs
//
// FeedConfig::load file lookup and environment overrides. Serial because the
// process environment is shared.

use std::io::Write;

use serial_test::serial;
use tech_event_feed::config::{ENV_CONFIG_PATH, MAX_PERIOD_DAYS};
use tech_event_feed::{FallbackPolicy, FeedConfig};

const VARS: [&str; 9] = [
    ENV_CONFIG_PATH,
    "CITY",
    "CATEGORIES",
    "PERIOD_DAYS",
    "FEED_SOURCES",
    "FEED_OFFLINE",
    "TEST_MODE",
    "TELEGRAM_BOT_TOKEN",
    "TELEGRAM_CHAT_ID",
];

fn clear_env() {
    for v in VARS {
        std::env::remove_var(v);
    }
}

#[test]
#[serial]
fn file_then_env_overrides() {
    clear_env();
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(
        file,
        r#"
city = "Brandon"
categories = ["tech", "business"]
period_days = 14
fallback = "fail"
aggregate_timeout_secs = 20

[telegram]
chat_id = "@from_file"
"#
    )
    .unwrap();

    std::env::set_var(ENV_CONFIG_PATH, file.path());
    std::env::set_var("PERIOD_DAYS", "7");
    std::env::set_var("TELEGRAM_BOT_TOKEN", "123:abc");
    std::env::set_var("FEED_OFFLINE", "1");

    let cfg = FeedConfig::load().expect("load");
    clear_env();

    assert_eq!(cfg.city, "Brandon");
    assert_eq!(cfg.categories, vec!["tech".to_string(), "business".to_string()]);
    assert_eq!(cfg.period_days, 7);
    assert_eq!(cfg.fallback, FallbackPolicy::Fail);
    assert!(cfg.offline);
    assert_eq!(cfg.aggregate_deadline(), Some(std::time::Duration::from_secs(20)));
    assert_eq!(cfg.telegram.chat_id.as_deref(), Some("@from_file"));
    assert_eq!(cfg.telegram.bot_token.as_deref(), Some("123:abc"));
}

#[test]
#[serial]
fn missing_explicit_path_is_an_error() {
    clear_env();
    std::env::set_var(ENV_CONFIG_PATH, "/definitely/not/here/feed.toml");
    let res = FeedConfig::load();
    clear_env();
    assert!(res.is_err());
}

#[test]
#[serial]
fn malformed_file_is_an_error() {
    clear_env();
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "period_days = \"thirty\"").unwrap();
    std::env::set_var(ENV_CONFIG_PATH, file.path());
    let res = FeedConfig::load();
    clear_env();
    assert!(res.is_err());
}

#[test]
#[serial]
fn oversized_period_from_env_is_clamped() {
    clear_env();
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "city = \"Winnipeg\"").unwrap();
    std::env::set_var(ENV_CONFIG_PATH, file.path());
    std::env::set_var("PERIOD_DAYS", "4000000000");

    let cfg = FeedConfig::load().expect("load");
    clear_env();

    assert_eq!(cfg.period_days, MAX_PERIOD_DAYS);
    let now = chrono::Utc::now();
    assert!(cfg.window(now).end > now);
}
