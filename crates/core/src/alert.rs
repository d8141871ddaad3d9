//! Structured alert events and the sinks that consume them.
//!
//! Delivery to chat or paging channels lives outside this crate; anything that
//! implements [`AlertSink`] can be plugged in. Two sinks ship here: one that
//! writes through `tracing`, and an in-memory sink for tests and dry runs.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

/// Alert severity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AlertSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl AlertSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertSeverity::Low => "LOW",
            AlertSeverity::Medium => "MEDIUM",
            AlertSeverity::High => "HIGH",
            AlertSeverity::Critical => "CRITICAL",
        }
    }
}

impl std::fmt::Display for AlertSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Alert payload handed to an [`AlertSink`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertEvent {
    pub severity: AlertSeverity,
    pub category: String,
    pub event_type: String,
    pub message: String,
    pub details: serde_json::Value,
    pub source: String,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tx_signature: Option<String>,
}

impl AlertEvent {
    /// Create an alert with empty details.
    pub fn new(
        severity: AlertSeverity,
        category: &str,
        event_type: &str,
        source: &str,
        message: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            severity,
            category: category.to_string(),
            event_type: event_type.to_string(),
            message: message.into(),
            details: serde_json::Value::Null,
            source: source.to_string(),
            timestamp,
            user_id: None,
            tx_signature: None,
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = details;
        self
    }

    pub fn with_tx_signature(mut self, signature: impl Into<String>) -> Self {
        self.tx_signature = Some(signature.into());
        self
    }
}

/// Consumer of structured alerts. Delivery is best-effort.
#[async_trait]
pub trait AlertSink: Send + Sync {
    async fn log(&self, event: AlertEvent) -> Result<()>;
}

/// Writes alerts to the tracing pipeline, level chosen by severity.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAlertSink;

#[async_trait]
impl AlertSink for TracingAlertSink {
    async fn log(&self, event: AlertEvent) -> Result<()> {
        let details = event.details.to_string();
        match event.severity {
            AlertSeverity::Low => info!(
                category = %event.category,
                event_type = %event.event_type,
                source = %event.source,
                details = %details,
                "{}",
                event.message
            ),
            AlertSeverity::Medium | AlertSeverity::High => warn!(
                severity = %event.severity,
                category = %event.category,
                event_type = %event.event_type,
                source = %event.source,
                details = %details,
                "{}",
                event.message
            ),
            AlertSeverity::Critical => error!(
                category = %event.category,
                event_type = %event.event_type,
                source = %event.source,
                tx = event.tx_signature.as_deref().unwrap_or("-"),
                details = %details,
                "CRITICAL: {}",
                event.message
            ),
        }
        Ok(())
    }
}

/// Keeps every alert in memory.
#[derive(Debug, Default)]
pub struct MemoryAlertSink {
    events: Mutex<Vec<AlertEvent>>,
}

impl MemoryAlertSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all alerts, oldest first.
    pub fn events(&self) -> Vec<AlertEvent> {
        self.events.lock().clone()
    }

    /// Alerts with the given event type.
    pub fn events_of_type(&self, event_type: &str) -> Vec<AlertEvent> {
        self.events
            .lock()
            .iter()
            .filter(|e| e.event_type == event_type)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }
}

#[async_trait]
impl AlertSink for MemoryAlertSink {
    async fn log(&self, event: AlertEvent) -> Result<()> {
        self.events.lock().push(event);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_ordering() {
        assert!(AlertSeverity::Low < AlertSeverity::Medium);
        assert!(AlertSeverity::High < AlertSeverity::Critical);
    }

    #[test]
    fn test_event_serializes_camel_case() {
        let event = AlertEvent::new(
            AlertSeverity::Critical,
            "liquidation",
            "TOKEN_AUTO_BLACKLISTED",
            "liquidation-ledger",
            "blacklisted",
            Utc::now(),
        )
        .with_tx_signature("sig");

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["severity"], "CRITICAL");
        assert_eq!(json["eventType"], "TOKEN_AUTO_BLACKLISTED");
        assert_eq!(json["txSignature"], "sig");
        assert!(json.get("userId").is_none());
    }

    #[tokio::test]
    async fn test_memory_sink_collects() {
        let sink = MemoryAlertSink::new();
        let event = AlertEvent::new(
            AlertSeverity::Low,
            "fleet",
            "TEST",
            "test",
            "hello",
            Utc::now(),
        );
        sink.log(event.clone()).await.unwrap();
        sink.log(event).await.unwrap();
        assert_eq!(sink.len(), 2);
        assert_eq!(sink.events_of_type("TEST").len(), 2);
    }
}
