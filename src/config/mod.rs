use crate::constants::{
    CREDENTIAL_PATHS, DEFAULT_AGENT_MODEL, DEFAULT_REALTIME_MODEL, DEFAULT_REALTIME_VOICE,
    DEFAULT_TOOL_ARGS, DEFAULT_TOOL_COMMAND, TOOL_SERVER_NAME,
};
use std::env;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

/// Spawn parameters for the external tool server process.
#[derive(Debug, Clone)]
pub struct ToolServerConfig {
    pub name: String,
    pub command: String,
    pub args: Vec<String>,
    pub env: Vec<(String, String)>,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub api_key: Option<String>,
    pub model: String,
    pub realtime_model: String,
    pub realtime_voice: String,
    pub tool_server: ToolServerConfig,
    pub credential_paths: Vec<PathBuf>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("OPENAI_API_KEY is not set")]
    MissingApiKey,
    #[error("OAuth credential file not found in any of {paths:?}")]
    MissingCredentials { paths: Vec<PathBuf> },
    #[error("tool server command '{command}' not found on PATH")]
    MissingCommand { command: String },
}

impl AppConfig {
    /// Build the configuration from process environment variables. Missing
    /// values fall back to the Gmail tool-server defaults; nothing is checked
    /// against the filesystem until [`AppConfig::validate`].
    pub fn from_env() -> Self {
        let command =
            env::var("MAILGATE_TOOL_COMMAND").unwrap_or_else(|_| DEFAULT_TOOL_COMMAND.to_string());
        // Whitespace-split; an argument containing spaces cannot be expressed
        // through this variable.
        let args = match env::var("MAILGATE_TOOL_ARGS") {
            Ok(raw) => raw.split_whitespace().map(String::from).collect(),
            Err(_) => DEFAULT_TOOL_ARGS.iter().map(|arg| arg.to_string()).collect(),
        };

        let credential_paths = CREDENTIAL_PATHS
            .iter()
            .map(|raw| PathBuf::from(shellexpand::tilde(raw).into_owned()))
            .collect();

        Self {
            api_key: env::var("OPENAI_API_KEY").ok().filter(|key| !key.is_empty()),
            model: env::var("MAILGATE_MODEL").unwrap_or_else(|_| DEFAULT_AGENT_MODEL.to_string()),
            realtime_model: env::var("MAILGATE_REALTIME_MODEL")
                .unwrap_or_else(|_| DEFAULT_REALTIME_MODEL.to_string()),
            realtime_voice: env::var("MAILGATE_REALTIME_VOICE")
                .unwrap_or_else(|_| DEFAULT_REALTIME_VOICE.to_string()),
            tool_server: ToolServerConfig {
                name: TOOL_SERVER_NAME.to_string(),
                command,
                args,
                env: Vec::new(),
            },
            credential_paths,
        }
    }

    pub fn require_api_key(&self) -> Result<&str, ConfigError> {
        self.api_key.as_deref().ok_or(ConfigError::MissingApiKey)
    }

    /// Startup checks from the deployment contract: the upstream credential,
    /// the OAuth credential file, and the spawn command must all be present
    /// before a session is allowed to launch a process.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.require_api_key()?;

        if !self.credential_paths.iter().any(|path| path.is_file()) {
            return Err(ConfigError::MissingCredentials {
                paths: self.credential_paths.clone(),
            });
        }

        if locate_command(&self.tool_server.command).is_none() {
            return Err(ConfigError::MissingCommand {
                command: self.tool_server.command.clone(),
            });
        }

        debug!(command = %self.tool_server.command, "configuration validated");
        Ok(())
    }
}

/// Resolve a command the way the shell would: explicit paths are taken as-is,
/// bare names are searched on PATH.
fn locate_command(command: &str) -> Option<PathBuf> {
    let candidate = Path::new(command);
    if candidate.components().count() > 1 {
        return candidate.is_file().then(|| candidate.to_path_buf());
    }

    let path = env::var_os("PATH")?;
    env::split_paths(&path)
        .map(|dir| dir.join(command))
        .find(|full| full.is_file())
}
