//! Tuning knobs for the automation engine.

use std::time::Duration;

#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Public origin used for form links and to absolutise relative file URLs.
    pub base_url: String,
    /// Maximum number of `card_enters_stage` follow-ups one dispatch may chain.
    pub max_cascade_depth: u32,
    /// Bound on every email/SMS/notifier call.
    pub transport_timeout: Duration,
    /// Sender used when a template does not override it.
    pub default_from_email: String,
    pub default_from_name: Option<String>,
    /// `chrono` format for `{{current_date}}`.
    pub date_format: String,
    /// `chrono` format for `{{current_datetime}}`.
    pub datetime_format: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:3000".into(),
            max_cascade_depth: 10,
            transport_timeout: Duration::from_secs(5),
            default_from_email: "noreply@localhost".into(),
            default_from_name: None,
            date_format: "%d/%m/%Y".into(),
            datetime_format: "%d/%m/%Y %H:%M".into(),
        }
    }
}
