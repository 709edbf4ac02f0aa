use serde::Deserialize;
use std::env;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub ticket: TicketConfig,
    pub business_rules: BusinessRules,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct TicketConfig {
    /// HMAC secret for ticket payload signing.
    pub secret: String,
}

/// Operational knobs for the reservation and booking core.
///
/// `seat_hold_seconds` (the reservation TTL, minutes-scale) and
/// `payment_deadline_hours` (the booking payment window) are deliberately two
/// separate values; the hold TTL must never be conflated with the deadline.
#[derive(Debug, Deserialize, Clone)]
pub struct BusinessRules {
    pub seat_hold_seconds: u64,
    pub payment_deadline_hours: u64,
    pub sweep_interval_seconds: u64,
    /// Flat fee added to every booking, in minor currency units.
    pub booking_fee: i64,
    pub currency: String,
}

impl Default for BusinessRules {
    fn default() -> Self {
        Self {
            seat_hold_seconds: 300,
            payment_deadline_hours: 6,
            sweep_interval_seconds: 3600,
            booking_fee: 0,
            currency: "USD".to_string(),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = config::Config::builder()
            .add_source(config::File::with_name("config/default"))
            // Environment-specific overrides, optional
            .add_source(config::File::with_name(&format!("config/{}", run_mode)).required(false))
            // Local overrides, not checked in
            .add_source(config::File::with_name("config/local").required(false))
            // E.g. TRANSITA__SERVER__PORT=8084
            .add_source(config::Environment::with_prefix("TRANSITA").separator("__"))
            .build()?;

        s.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_keep_hold_shorter_than_deadline() {
        let rules = BusinessRules::default();
        assert!(rules.seat_hold_seconds < rules.payment_deadline_hours * 3600);
    }
}
