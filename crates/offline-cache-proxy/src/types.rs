//! Response types for the proxy's own endpoints

use offline_cache::{CacheStats, Phase};
use serde::Serialize;

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub uptime_secs: u64,
    pub version: String,
    pub phase: Phase,
    pub cache: CacheStats,
}

/// Acknowledgement for a queued control message
#[derive(Debug, Serialize)]
pub struct ControlAccepted {
    pub queued: bool,
}

/// Error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}
