use serde::Serialize;
use serde_json::Value;

/// Effective palette changed; payload is the new `ColorPalette`
pub const PALETTE_CHANGED_EVENT: &str = "palette_changed";
/// Engine transitioned; payload is an `EngineSnapshot`
pub const THEME_STATE_CHANGED_EVENT: &str = "theme_state_changed";
/// Custom theme list changed; payload is the full list
pub const CUSTOM_THEMES_UPDATED_EVENT: &str = "custom_themes_updated";

/// Receiver for engine notifications (websocket bus in the server, no-op in tests)
pub trait EventSink: Send + Sync {
    fn emit(&self, event: &str, payload: Value);
}

pub struct NoopEventSink;

impl EventSink for NoopEventSink {
    fn emit(&self, _event: &str, _payload: Value) {}
}

pub fn emit_event<T: Serialize>(sink: &dyn EventSink, event: &str, payload: &T) {
    match serde_json::to_value(payload) {
        Ok(value) => sink.emit(event, value),
        Err(e) => log::warn!("Failed to serialize '{event}' payload: {e}"),
    }
}
