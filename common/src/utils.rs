// common/src/utils.rs
use tracing::Level;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Setup tracing for consistent logging across the service.
/// `RUST_LOG` overrides the default INFO level.
pub fn setup_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(Level::INFO.as_str()));

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .expect("Failed to set tracing subscriber");
}

/// Shorten a secret-ish value for log output, e.g. `a1b2c3…`
pub fn redact(value: &str) -> String {
    let prefix: String = value.chars().take(6).collect();
    if prefix.len() < value.len() {
        format!("{}…", prefix)
    } else {
        prefix
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redact_long_value() {
        assert_eq!(redact("abcdef0123456789"), "abcdef…");
    }

    #[test]
    fn test_redact_short_value() {
        assert_eq!(redact("abc"), "abc");
    }
}
