//! Inbound event routing
//!
//! Every event is sorted into one bucket before anything else sees it:
//! connection control (drives state), heartbeat (liveness only),
//! notification (goes to the normalizer), or ignored.

use super::event::StreamEvent;
use crate::notification::{is_control_kind, raw_kind, CONNECTION_LOST};
use serde_json::Value;
use tracing::{debug, warn};

/// Connection-control signal carried on the stream
#[derive(Debug, Clone, PartialEq)]
pub enum ControlSignal {
    /// Server acknowledged the subscription
    Established,
    /// Server is about to drop the connection
    Lost,
    /// Any other connection status; logged only
    Other(String),
}

/// Routing bucket for an inbound event
#[derive(Debug, Clone, PartialEq)]
pub enum Classified {
    Control(ControlSignal),
    Heartbeat,
    Notification(Value),
    Ignored(String),
}

/// Classify one stream event.
pub fn classify(event: &StreamEvent) -> Classified {
    match event.name.as_str() {
        "heartbeat" | "ping" => Classified::Heartbeat,
        "connection" => Classified::Control(control_signal(&event.data)),
        "notification" | "system-alert" => notification_payload(&event.data),
        // generic channel for transports that cannot label events
        "message" => notification_payload(&event.data),
        other => {
            debug!(event = %other, "Ignoring unknown stream event");
            Classified::Ignored(format!("unknown event `{}`", other))
        }
    }
}

/// Parse a payload that should be a notification, applying the
/// connection-kind filter so control traffic never reaches the normalizer.
fn notification_payload(data: &str) -> Classified {
    let value: Value = match serde_json::from_str(data) {
        Ok(v) => v,
        Err(e) => {
            warn!(error = %e, "Dropping non-JSON stream payload");
            return Classified::Ignored(format!("invalid JSON payload: {}", e));
        }
    };

    if !value.is_object() {
        return Classified::Ignored("payload is not an object".to_string());
    }

    match raw_kind(&value) {
        Some(kind) if is_control_kind(kind) => {
            debug!(kind = %kind, "Intercepted connection event on notification channel");
            Classified::Control(signal_from_kind(kind))
        }
        Some(kind) if kind.eq_ignore_ascii_case("HEARTBEAT") => Classified::Heartbeat,
        _ => Classified::Notification(value),
    }
}

fn control_signal(data: &str) -> ControlSignal {
    let value: Value = serde_json::from_str(data).unwrap_or(Value::Null);
    let status = raw_kind(&value)
        .or_else(|| value.get("status").and_then(|s| s.as_str()))
        .map(str::to_string)
        .unwrap_or_else(|| data.trim().to_string());
    signal_from_kind(&status)
}

fn signal_from_kind(kind: &str) -> ControlSignal {
    let upper = kind.to_ascii_uppercase();
    if upper == CONNECTION_LOST || upper.contains("LOST") || upper.contains("CLOSED") {
        ControlSignal::Lost
    } else if upper.contains("ESTABLISHED") || upper.contains("CONNECTED") || upper.contains("OPEN") {
        ControlSignal::Established
    } else {
        ControlSignal::Other(kind.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_labeled_notification() {
        let event = StreamEvent::new("notification", r#"{"id":"n1","kind":"INVENTORY_LOW_STOCK"}"#);
        assert_eq!(
            classify(&event),
            Classified::Notification(json!({"id": "n1", "kind": "INVENTORY_LOW_STOCK"}))
        );
    }

    #[test]
    fn test_system_alert_is_notification() {
        let event = StreamEvent::new("system-alert", r#"{"id":"s1","type":"SYSTEM_ALERT"}"#);
        assert!(matches!(classify(&event), Classified::Notification(_)));
    }

    #[test]
    fn test_connection_events_are_control() {
        let event = StreamEvent::new("connection", r#"{"type":"CONNECTION_ESTABLISHED"}"#);
        assert_eq!(classify(&event), Classified::Control(ControlSignal::Established));

        let event = StreamEvent::new("connection", r#"{"status":"CONNECTION_LOST"}"#);
        assert_eq!(classify(&event), Classified::Control(ControlSignal::Lost));

        let event = StreamEvent::new("connection", "connected");
        assert_eq!(classify(&event), Classified::Control(ControlSignal::Established));
    }

    #[test]
    fn test_generic_channel_filters_connection_kinds() {
        let event = StreamEvent::message(r#"{"type":"CONNECTION_ESTABLISHED","message":"hi"}"#);
        assert_eq!(classify(&event), Classified::Control(ControlSignal::Established));

        let event = StreamEvent::message(r#"{"kind":"CONNECTION_LOST"}"#);
        assert_eq!(classify(&event), Classified::Control(ControlSignal::Lost));

        let event = StreamEvent::message(r#"{"kind":"CONNECTION_RETRY"}"#);
        assert!(matches!(classify(&event), Classified::Control(ControlSignal::Other(_))));
    }

    #[test]
    fn test_labeled_channel_also_filters_connection_kinds() {
        let event = StreamEvent::new("notification", r#"{"id":"x","type":"CONNECTION_LOST"}"#);
        assert_eq!(classify(&event), Classified::Control(ControlSignal::Lost));
    }

    #[test]
    fn test_nested_connection_kind_is_filtered() {
        let event = StreamEvent::message(r#"{"id":"c9","data":{"type":"CONNECTION_LOST"}}"#);
        assert_eq!(classify(&event), Classified::Control(ControlSignal::Lost));

        let event = StreamEvent::new(
            "notification",
            r#"{"id":"c10","metadata":{"notificationType":"CONNECTION_ESTABLISHED"}}"#,
        );
        assert_eq!(classify(&event), Classified::Control(ControlSignal::Established));
    }

    #[test]
    fn test_generic_channel_notification() {
        let event = StreamEvent::message(r#"{"id":"n2","type":"ORDER_CREATED"}"#);
        assert!(matches!(classify(&event), Classified::Notification(_)));
    }

    #[test]
    fn test_heartbeat() {
        assert_eq!(classify(&StreamEvent::new("heartbeat", "ping")), Classified::Heartbeat);
        assert_eq!(
            classify(&StreamEvent::message(r#"{"type":"HEARTBEAT"}"#)),
            Classified::Heartbeat
        );
    }

    #[test]
    fn test_ignored_payloads() {
        assert!(matches!(classify(&StreamEvent::message("not json")), Classified::Ignored(_)));
        assert!(matches!(classify(&StreamEvent::message("[1,2]")), Classified::Ignored(_)));
        assert!(matches!(classify(&StreamEvent::new("stats", "{}")), Classified::Ignored(_)));
    }
}
