use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use tracing::warn;

pub const DEFAULT_SOURCE_TAG: &str = "analytics.production.stg_nature_paper_time_series";

pub fn db_path() -> PathBuf {
    std::env::var("CELLSCOPE_DB")
        .ok()
        .filter(|s| !s.trim().is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("./cellscope.sqlite"))
}

pub fn bind_addr() -> anyhow::Result<SocketAddr> {
    let raw = std::env::var("CELLSCOPE_BIND").unwrap_or_else(|_| "127.0.0.1:8097".to_string());
    raw.parse()
        .map_err(|e| anyhow::anyhow!("invalid CELLSCOPE_BIND '{}': {}", raw, e))
}

pub fn source_tag() -> String {
    std::env::var("CELLSCOPE_SOURCE_TAG")
        .ok()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_SOURCE_TAG.to_string())
}

pub fn cache_ttl() -> Duration {
    let secs = std::env::var("CELLSCOPE_CACHE_TTL_SECS")
        .ok()
        .and_then(|s| match s.parse::<i64>() {
            Ok(n) => Some(n.max(0) as u64),
            Err(_) => {
                warn!("invalid CELLSCOPE_CACHE_TTL_SECS '{}'; using default 600", s);
                None
            }
        })
        .unwrap_or(600);
    Duration::from_secs(secs.max(1))
}

/// Capacity 0 disables caching entirely.
pub fn cache_capacity() -> u64 {
    std::env::var("CELLSCOPE_CACHE_CAP")
        .ok()
        .and_then(|s| s.parse::<i64>().ok())
        .map(|n| n.max(0) as u64)
        .unwrap_or(64)
}
