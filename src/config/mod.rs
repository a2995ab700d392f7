use serde::Deserialize;

/// Complete server configuration
#[derive(Debug, Clone, Deserialize, Default)]
pub struct StallSenseConfig {
    #[serde(default)]
    pub mqtt: MqttConfig,
    #[serde(default)]
    pub directory: DirectoryConfig,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub classifier: ClassifierConfig,
}

/// MQTT broker connection configuration
#[derive(Debug, Clone, Deserialize)]
pub struct MqttConfig {
    #[serde(default = "default_broker_host")]
    pub broker_host: String,
    #[serde(default = "default_broker_port")]
    pub broker_port: u16,
    #[serde(default = "default_client_id")]
    pub client_id: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

fn default_broker_host() -> String {
    std::env::var("MQTT_BROKER").unwrap_or_else(|_| "127.0.0.1".to_string())
}

fn default_broker_port() -> u16 {
    1883
}

fn default_client_id() -> String {
    "stallsense-server".to_string()
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            broker_host: default_broker_host(),
            broker_port: default_broker_port(),
            client_id: default_client_id(),
            username: None,
            password: None,
        }
    }
}

/// Sensor directory storage configuration
#[derive(Debug, Clone, Deserialize)]
pub struct DirectoryConfig {
    /// Path to the SQLite database file
    #[serde(default = "default_db_path")]
    pub db_path: String,
}

fn default_db_path() -> String {
    "stallsense.db".to_string()
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
        }
    }
}

/// HTTP/WebSocket API configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
}

fn default_bind_addr() -> String {
    "0.0.0.0:3000".to_string()
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
        }
    }
}

/// Message classification configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ClassifierConfig {
    /// Firmware tag a sensor must announce in its identity broadcast to be
    /// auto-registered
    #[serde(default = "default_firmware_tag")]
    pub firmware_tag: String,
}

fn default_firmware_tag() -> String {
    "StallSense".to_string()
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            firmware_tag: default_firmware_tag(),
        }
    }
}

/// Load configuration from TOML file
pub fn load_config(path: &str) -> Result<StallSenseConfig, Box<dyn std::error::Error>> {
    let contents = std::fs::read_to_string(path)?;
    let config: StallSenseConfig = toml::from_str(&contents)?;
    Ok(config)
}
