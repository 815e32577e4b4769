//! Environment configuration
//!
//! - `SCHEDULER_INTERVAL_SECONDS`: seconds between scheduler ticks
//!   (default 30)
//! - `DATABASE_URL`: connection string handed to the external persistence
//!   collaborator; the in-memory store ignores it
//! - `TESTING`: truthy values disable the scheduler worker autostart so
//!   tests drive ticks themselves

use std::time::Duration;

/// Default seconds between scheduler ticks
pub const DEFAULT_SCHEDULER_INTERVAL_SECONDS: u64 = 30;

/// Runtime configuration
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Interval between scheduler ticks
    pub scheduler_interval: Duration,

    /// Connection string for the external persistence layer, if set
    pub database_url: Option<String>,

    /// When true the supervisor must not start the scheduler worker
    pub testing: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            scheduler_interval: Duration::from_secs(DEFAULT_SCHEDULER_INTERVAL_SECONDS),
            database_url: None,
            testing: false,
        }
    }
}

impl Config {
    /// Read configuration from process environment variables
    pub fn from_env() -> Self {
        Self {
            scheduler_interval: Duration::from_secs(parse_interval(
                std::env::var("SCHEDULER_INTERVAL_SECONDS").ok().as_deref(),
            )),
            database_url: std::env::var("DATABASE_URL").ok().filter(|v| !v.is_empty()),
            testing: parse_truthy(std::env::var("TESTING").ok().as_deref()),
        }
    }
}

fn parse_interval(raw: Option<&str>) -> u64 {
    raw.and_then(|v| v.trim().parse::<u64>().ok())
        .filter(|&secs| secs > 0)
        .unwrap_or(DEFAULT_SCHEDULER_INTERVAL_SECONDS)
}

fn parse_truthy(raw: Option<&str>) -> bool {
    matches!(
        raw.map(|v| v.trim().to_ascii_lowercase()).as_deref(),
        Some("1") | Some("true") | Some("yes") | Some("on")
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interval_parsing() {
        assert_eq!(parse_interval(None), DEFAULT_SCHEDULER_INTERVAL_SECONDS);
        assert_eq!(parse_interval(Some("45")), 45);
        assert_eq!(parse_interval(Some("0")), DEFAULT_SCHEDULER_INTERVAL_SECONDS);
        assert_eq!(parse_interval(Some("not-a-number")), DEFAULT_SCHEDULER_INTERVAL_SECONDS);
    }

    #[test]
    fn test_truthy_parsing() {
        assert!(parse_truthy(Some("1")));
        assert!(parse_truthy(Some("TRUE")));
        assert!(parse_truthy(Some("yes")));
        assert!(!parse_truthy(Some("0")));
        assert!(!parse_truthy(Some("")));
        assert!(!parse_truthy(None));
    }
}
