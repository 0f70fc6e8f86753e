//! Login history - append-only, bounded per account.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Most-recent entries kept per account; oldest are evicted first.
pub const LOGIN_EVENT_LIMIT: usize = 20;

/// Connection metadata supplied by the HTTP-facing collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientMetadata {
    pub ip_address: String,
    pub user_agent: String,
}

impl ClientMetadata {
    /// Best-effort human label for the client ("Chrome on Windows").
    /// Falls back to "Unknown device" when nothing recognizable is found.
    pub fn device_summary(&self) -> String {
        let ua = self.user_agent.as_str();
        let browser = if ua.contains("Edg/") {
            Some("Edge")
        } else if ua.contains("OPR/") || ua.contains("Opera") {
            Some("Opera")
        } else if ua.contains("Firefox/") {
            Some("Firefox")
        } else if ua.contains("Chrome/") {
            Some("Chrome")
        } else if ua.contains("Safari/") {
            Some("Safari")
        } else {
            None
        };

        let os = if ua.contains("Windows") {
            Some("Windows")
        } else if ua.contains("Android") {
            Some("Android")
        } else if ua.contains("iPhone") || ua.contains("iPad") {
            Some("iOS")
        } else if ua.contains("Mac OS X") || ua.contains("Macintosh") {
            Some("macOS")
        } else if ua.contains("Linux") {
            Some("Linux")
        } else {
            None
        };

        match (browser, os) {
            (Some(b), Some(o)) => format!("{} on {}", b, o),
            (Some(b), None) => b.to_string(),
            (None, Some(o)) => o.to_string(),
            (None, None) => "Unknown device".to_string(),
        }
    }
}

/// A single login attempt, successful or not.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginEvent {
    pub at: DateTime<Utc>,
    pub success: bool,
    pub failure_reason: Option<String>,
    pub ip_address: String,
    pub user_agent: String,
    pub device_summary: String,
}

impl LoginEvent {
    pub fn success(client: &ClientMetadata) -> Self {
        Self {
            at: Utc::now(),
            success: true,
            failure_reason: None,
            ip_address: client.ip_address.clone(),
            user_agent: client.user_agent.clone(),
            device_summary: client.device_summary(),
        }
    }

    pub fn failure(client: &ClientMetadata, reason: &str) -> Self {
        Self {
            at: Utc::now(),
            success: false,
            failure_reason: Some(reason.to_string()),
            ip_address: client.ip_address.clone(),
            user_agent: client.user_agent.clone(),
            device_summary: client.device_summary(),
        }
    }
}
