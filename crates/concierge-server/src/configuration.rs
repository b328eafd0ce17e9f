use crate::error::{to_env_var, ConfigError};
use concierge::providers::configs::{
    OpenAiProviderConfig, OPENAI_HOST, OPENAI_MODEL, OPENAI_TEMPERATURE,
};
use concierge::systems::{McpToolSource, ORDER_MCP_URL};
use config::{Config, Environment, File};
use serde::Deserialize;
use std::net::{AddrParseError, SocketAddr};

/// Where the model API key is read from when no prefixed override is set
pub const API_KEY_ENV_VAR: &str = "OPENAI_API_KEY";

#[derive(Debug, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Fetch the tool list before accepting the first turn
    #[serde(default)]
    pub preload_tools: bool,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            preload_tools: false,
        }
    }
}

impl ServerSettings {
    pub fn socket_addr(&self) -> Result<SocketAddr, AddrParseError> {
        format!("{}:{}", self.host, self.port).parse()
    }
}

#[derive(Debug, Deserialize)]
pub struct ProviderSettings {
    #[serde(default = "default_openai_host")]
    pub host: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub max_tokens: Option<i32>,
}

impl ProviderSettings {
    pub fn into_config(self) -> OpenAiProviderConfig {
        OpenAiProviderConfig {
            host: self.host,
            api_key: self.api_key,
            model: self.model,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ToolSettings {
    #[serde(default = "default_tools_name")]
    pub name: String,
    #[serde(default = "default_tools_url")]
    pub url: String,
}

impl Default for ToolSettings {
    fn default() -> Self {
        Self {
            name: default_tools_name(),
            url: default_tools_url(),
        }
    }
}

impl ToolSettings {
    pub fn source(&self) -> McpToolSource {
        McpToolSource::new(&self.name, &self.url)
    }
}

#[derive(Debug, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub server: ServerSettings,
    pub provider: ProviderSettings,
    #[serde(default)]
    pub tools: ToolSettings,
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        Self::load_and_validate()
    }

    fn load_and_validate() -> Result<Self, ConfigError> {
        let mut builder = Config::builder()
            // Server defaults
            .set_default("server.host", default_host())?
            .set_default("server.port", default_port())?
            .set_default("server.preload_tools", false)?
            // Provider defaults
            .set_default("provider.host", default_openai_host())?
            .set_default("provider.model", default_model())?
            .set_default("provider.temperature", f64::from(OPENAI_TEMPERATURE))?
            // Tool server defaults
            .set_default("tools.name", default_tools_name())?
            .set_default("tools.url", default_tools_url())?;

        // The conventional key variable sits below everything else
        if let Ok(api_key) = std::env::var(API_KEY_ENV_VAR) {
            builder = builder.set_default("provider.api_key", api_key)?;
        }

        let config = builder
            .add_source(File::with_name("concierge").required(false))
            // Layer on the environment variables
            .add_source(
                Environment::with_prefix("CONCIERGE")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let settings: Self = match config.try_deserialize() {
            Ok(settings) => settings,
            Err(err) => {
                tracing::debug!("Configuration error: {:?}", &err);

                let error_str = err.to_string();
                if let Some(field) = missing_field(&error_str) {
                    return Err(ConfigError::MissingEnvVar {
                        env_var: to_env_var(field),
                    });
                } else if let config::ConfigError::NotFound(field) = &err {
                    return Err(ConfigError::MissingEnvVar {
                        env_var: to_env_var(field),
                    });
                }
                return Err(ConfigError::Other(err));
            }
        };

        if settings.provider.api_key.trim().is_empty() {
            return Err(ConfigError::MissingEnvVar {
                env_var: API_KEY_ENV_VAR.to_string(),
            });
        }

        Ok(settings)
    }
}

/// Pull the field name out of serde's "missing field `name`" message
fn missing_field(error: &str) -> Option<&str> {
    let rest = error.strip_prefix("missing field `")?;
    rest.split('`').next()
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    7860
}

fn default_model() -> String {
    OPENAI_MODEL.to_string()
}

fn default_openai_host() -> String {
    OPENAI_HOST.to_string()
}

fn default_tools_name() -> String {
    "order-mcp".to_string()
}

fn default_tools_url() -> String {
    ORDER_MCP_URL.to_string()
}
