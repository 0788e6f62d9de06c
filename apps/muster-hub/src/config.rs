use std::env;
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    /// Unset runs the hub on the volatile in-memory store.
    pub redis_url: Option<String>,
    pub media_root: PathBuf,
    pub poll_interval_secs: u64,
    pub max_concurrent_uploads: usize,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            port: env::var("MUSTER_PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(8080),
            redis_url: env::var("MUSTER_REDIS_URL").ok().filter(|url| !url.is_empty()),
            media_root: env::var("MUSTER_MEDIA_ROOT")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("media")),
            poll_interval_secs: env::var("MUSTER_POLL_INTERVAL")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(30),
            max_concurrent_uploads: env::var("MUSTER_UPLOAD_CONCURRENCY")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(8),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 8080,
            redis_url: None,
            media_root: PathBuf::from("media"),
            poll_interval_secs: 30,
            max_concurrent_uploads: 8,
        }
    }
}
