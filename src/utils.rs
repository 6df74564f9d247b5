//! # Utility Functions
//!
//! Time, hashing, and logging helpers shared across the engine.

/// Time utilities.
pub mod time {
    use chrono::{DateTime, Utc};

    /// Current UTC timestamp.
    pub fn now() -> DateTime<Utc> {
        Utc::now()
    }
}

/// Content-addressed hashing utilities.
pub mod hashing {
    use sha2::{Digest, Sha256};

    /// SHA-256 digest of `data`, lowercase hex encoded.
    pub fn sha256_hex(data: &[u8]) -> String {
        let mut hasher = Sha256::new();
        hasher.update(data);
        hex::encode(hasher.finalize())
    }
}

/// Logging utilities.
pub mod logging {
    use log::info;

    /// Initialize logging with proper formatting.
    pub fn init_logging() {
        env_logger::Builder::from_default_env()
            .format_timestamp_micros()
            .init();
    }

    /// Log component startup.
    pub fn log_startup(component: &str) {
        info!("starting {}", component);
    }
}

pub use time::now;
