use dotenvy::dotenv;
use serde::Deserialize;
use std::env;
use std::str::FromStr;
use thiserror::Error;

/// Broker endpoint for one `MqttClient`.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct MqttClientInfo {
    pub host: String,
    pub port: u16,
    pub connect_timeout_ms: u64,
    pub reconnect_period_ms: Option<u64>,
    pub connection_method: String,
    pub client_id: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl MqttClientInfo {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            connect_timeout_ms: 4000,
            reconnect_period_ms: Some(4000),
            connection_method: "mqtt".to_string(),
            client_id: None,
            username: None,
            password: None,
        }
    }

    /// `{method}://{host}:{port}/`
    pub fn connect_url(&self) -> String {
        format!("{}://{}:{}/", self.connection_method, self.host, self.port)
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Dev,
    Prod,
}

impl FromStr for Environment {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "dev" => Ok(Environment::Dev),
            "prod" => Ok(Environment::Prod),
            _ => Err(ConfigError::ParsingError(format!(
                "DASHBOARD_ENV must be 'dev' or 'prod', got '{}'",
                s
            ))),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub environment: Environment,
    pub pcc: MqttClientInfo,
    pub companion: MqttClientInfo,
    pub lpb: MqttClientInfo,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Environment variable {0} is missing or invalid.")]
    MissingOrInvalid(String),
    #[error("Parsing error: {0}")]
    ParsingError(String),
}

impl Config {
    /// Validate timeout values and other critical configurations.
    fn validate_timeouts(&self) -> Result<(), ConfigError> {
        const MIN_TIMEOUT: u64 = 100;
        const MAX_TIMEOUT: u64 = 1_000_000;

        for info in [&self.pcc, &self.companion, &self.lpb] {
            if !(MIN_TIMEOUT..=MAX_TIMEOUT).contains(&info.connect_timeout_ms) {
                return Err(ConfigError::ParsingError(format!(
                    "MQTT_CONNECT_TIMEOUT_MS must be between {} and {} ms",
                    MIN_TIMEOUT, MAX_TIMEOUT
                )));
            }
            if let Some(period) = info.reconnect_period_ms {
                if !(MIN_TIMEOUT..=MAX_TIMEOUT).contains(&period) {
                    return Err(ConfigError::ParsingError(format!(
                        "MQTT_RECONNECT_PERIOD_MS must be 0 or between {} and {} ms",
                        MIN_TIMEOUT, MAX_TIMEOUT
                    )));
                }
            }
        }

        Ok(())
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv().ok(); // Load environment variables from .env file
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let environment = match lookup("DASHBOARD_ENV") {
            Some(value) => value.parse::<Environment>()?,
            None => Environment::Prod,
        };

        let port = parse_or(&lookup, "MQTT_PORT", 9001u16)?;
        let connect_timeout_ms = parse_or(&lookup, "MQTT_CONNECT_TIMEOUT_MS", 4000u64)?;
        let reconnect_period_ms = match parse_or(&lookup, "MQTT_RECONNECT_PERIOD_MS", 4000u64)? {
            0 => None,
            period => Some(period),
        };
        let connection_method = lookup("MQTT_CONNECTION_METHOD")
            .filter(|method| !method.trim().is_empty())
            .unwrap_or_else(|| "mqtt".to_string());
        // Set to an empty value to connect without credentials.
        let username = lookup("MQTT_USERNAME")
            .unwrap_or_else(|| "user".to_string());
        let username = Some(username).filter(|v| !v.is_empty());
        let password = lookup("MQTT_PASSWORD")
            .unwrap_or_else(|| "password".to_string());
        let password = Some(password).filter(|v| !v.is_empty());

        let endpoint = |prefix: &str, prod_host: &str, default_client_id: &str| {
            let default_host = match environment {
                Environment::Prod => prod_host,
                Environment::Dev => "localhost",
            };
            let host_key = format!("{}_MQTT_HOST", prefix);
            let host = match lookup(&host_key) {
                Some(host) if host.trim().is_empty() => {
                    return Err(ConfigError::MissingOrInvalid(host_key))
                }
                Some(host) => host.trim().to_string(),
                None => default_host.to_string(),
            };
            Ok(MqttClientInfo {
                host,
                port,
                connect_timeout_ms,
                reconnect_period_ms,
                connection_method: connection_method.clone(),
                client_id: Some(
                    lookup(&format!("{}_MQTT_CLIENT_ID", prefix))
                        .unwrap_or_else(|| default_client_id.to_string()),
                ),
                username: username.clone(),
                password: password.clone(),
            })
        };

        let config = Self {
            environment,
            pcc: endpoint("PCC", "192.168.10.10", "pcc-fronted-mqtt-pcc")?,
            // Broker ACLs know this id with the transposed letters.
            companion: endpoint("COMPANION", "192.168.10.30", "pcc-fronted-mqtt-comapnion")?,
            lpb: endpoint("LPB", "192.168.10.20", "pcc-fronted-mqtt-lpb")?,
        };

        config.validate_timeouts()?;

        Ok(config)
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|_| ConfigError::ParsingError(format!("{} must be a valid number", key))),
        None => Ok(default),
    }
}
