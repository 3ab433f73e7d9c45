use crate::messages::CallCenterEvent;
use crate::network::LinkEvent;
use serde_json::json;

/// How `listen` renders events
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    Json,
}

impl OutputFormat {
    pub fn from_json_flag(json: bool) -> Self {
        if json {
            OutputFormat::Json
        } else {
            OutputFormat::Text
        }
    }
}

pub fn print_event(event: &CallCenterEvent, format: OutputFormat) {
    println!("{}", format_event(event, format));
}

pub fn print_link_event(event: &LinkEvent, format: OutputFormat) {
    // Heartbeats are noise on an interactive terminal
    if matches!(event, LinkEvent::HeartbeatSent { .. }) {
        return;
    }
    println!("{}", format_link_event(event, format));
}

pub fn format_event(event: &CallCenterEvent, format: OutputFormat) -> String {
    match format {
        OutputFormat::Json => json!({
            "type": event.kind().as_tag(),
            "payload": event.payload(),
        })
        .to_string(),
        OutputFormat::Text => match event {
            CallCenterEvent::IncomingCall(call) => {
                format!("📞 incoming call {}", or_unknown(call.call_id()))
            }
            CallCenterEvent::CallStatus(status) => {
                let line = format!(
                    "☎️  call {} {}",
                    or_unknown(status.call_id()),
                    status.status().unwrap_or("(no status)")
                );
                match status.duration() {
                    Some(duration) => format!("{} ({}s)", line, duration),
                    None => line,
                }
            }
            CallCenterEvent::RecordingStarted(rec) => format!(
                "⏺  recording {} started for call {}",
                or_unknown(rec.recording_id()),
                or_unknown(rec.call_id())
            ),
            CallCenterEvent::RecordingStopped(rec) => {
                let line = format!(
                    "⏹  recording {} stopped for call {}",
                    or_unknown(rec.recording_id()),
                    or_unknown(rec.call_id())
                );
                match rec.duration() {
                    Some(duration) => format!("{} ({}s)", line, duration),
                    None => line,
                }
            }
            CallCenterEvent::TranscriptionUpdate(update) => format!(
                "📝 [{}{}] {}",
                or_unknown(update.call_id()),
                if update.is_final() { "" } else { " …" },
                update.transcript().unwrap_or("")
            ),
            CallCenterEvent::ExtensionStatus(ext) => format!(
                "🔌 extension {} {}",
                or_unknown(ext.extension_id()),
                ext.status().unwrap_or("(no status)")
            ),
        },
    }
}

fn or_unknown(id: Option<String>) -> String {
    id.unwrap_or_else(|| "(no id)".to_string())
}

pub fn format_link_event(event: &LinkEvent, format: OutputFormat) -> String {
    match format {
        OutputFormat::Json => {
            let value = match event {
                LinkEvent::StateChanged { from, to } => json!({
                    "link": "state",
                    "from": from.to_string(),
                    "to": to.to_string(),
                }),
                LinkEvent::ReconnectScheduled { attempt, delay } => json!({
                    "link": "reconnect_scheduled",
                    "attempt": attempt,
                    "delayMs": delay.as_millis() as u64,
                }),
                LinkEvent::HeartbeatSent { timestamp } => json!({
                    "link": "heartbeat",
                    "timestamp": timestamp,
                }),
                LinkEvent::HeartbeatTimedOut { unanswered_for } => json!({
                    "link": "heartbeat_timeout",
                    "unansweredMs": unanswered_for.as_millis() as u64,
                }),
                LinkEvent::ConnectionLost { attempts } => json!({
                    "link": "connection_lost",
                    "attempts": attempts,
                }),
            };
            value.to_string()
        }
        OutputFormat::Text => match event {
            LinkEvent::StateChanged { to, .. } => format!("-- link {}", to),
            LinkEvent::ReconnectScheduled { attempt, delay } => format!(
                "-- reconnecting in {:.1}s (attempt {})",
                delay.as_secs_f64(),
                attempt
            ),
            LinkEvent::HeartbeatSent { timestamp } => format!("-- heartbeat {}", timestamp),
            LinkEvent::HeartbeatTimedOut { unanswered_for } => format!(
                "-- no heartbeat response for {:.1}s, dropping channel",
                unanswered_for.as_secs_f64()
            ),
            LinkEvent::ConnectionLost { attempts } => format!(
                "❌ Connection lost after {} reconnect attempts",
                attempts
            ),
        },
    }
}
