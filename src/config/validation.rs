//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (interval > 0, capacity ≥ 1, port valid)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: PreforkConfig → Result<(), Vec<ValidationError>>
//! - Addresses are checked for shape only; resolution happens at bind time

use std::fmt;

use crate::config::schema::PreforkConfig;

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// A single semantic problem in a config.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

pub fn validate_config(config: &PreforkConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if let Err(message) = check_address(&config.listener.bind_address) {
        errors.push(ValidationError::new("listener.bind_address", message));
    }

    if config.workers.heartbeat_interval_ms == 0 {
        errors.push(ValidationError::new(
            "workers.heartbeat_interval_ms",
            "must be greater than 0",
        ));
    }

    if config.admission.max_connections == 0 {
        errors.push(ValidationError::new(
            "admission.max_connections",
            "must be at least 1",
        ));
    }

    let level = config.observability.log_level.to_ascii_lowercase();
    if !LOG_LEVELS.contains(&level.as_str()) {
        errors.push(ValidationError::new(
            "observability.log_level",
            format!("unknown level {:?}", config.observability.log_level),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Shape check matching what `Listener::bind` accepts; an empty host means
/// every interface.
fn check_address(address: &str) -> Result<(), String> {
    let Some((host, port)) = address.rsplit_once(':') else {
        return Err(format!("{address:?} is missing a port"));
    };
    if port.parse::<u16>().is_err() {
        return Err(format!("{port:?} is not a valid port"));
    }
    if host.starts_with('[') != host.ends_with(']') {
        return Err(format!("{host:?} has unbalanced brackets"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(validate_config(&PreforkConfig::default()).is_ok());
    }

    #[test]
    fn accepts_common_address_forms() {
        for addr in ["0.0.0.0:8080", ":8080", "localhost:0", "[::1]:9000"] {
            assert!(check_address(addr).is_ok(), "{addr} should be accepted");
        }
    }

    #[tokio::test]
    async fn accepted_empty_host_binds() {
        let mut config = PreforkConfig::default();
        config.listener.bind_address = ":0".into();
        assert!(validate_config(&config).is_ok());

        let listener = crate::net::Listener::bind(&config.listener.bind_address)
            .await
            .unwrap();
        assert!(listener.local_addr().unwrap().ip().is_unspecified());
    }

    #[test]
    fn collects_every_error() {
        let mut config = PreforkConfig::default();
        config.listener.bind_address = "localhost".into();
        config.workers.heartbeat_interval_ms = 0;
        config.admission.max_connections = 0;
        config.observability.log_level = "loud".into();

        let errors = validate_config(&config).unwrap_err();
        let fields: Vec<_> = errors.iter().map(|e| e.field).collect();
        assert_eq!(
            fields,
            [
                "listener.bind_address",
                "workers.heartbeat_interval_ms",
                "admission.max_connections",
                "observability.log_level",
            ]
        );
    }

    #[test]
    fn rejects_bad_port() {
        assert!(check_address("127.0.0.1:http").is_err());
        assert!(check_address("127.0.0.1:70000").is_err());
    }
}
