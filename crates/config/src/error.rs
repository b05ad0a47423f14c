use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    ReadError(std::io::Error),

    #[error("failed to write config file: {0}")]
    WriteError(std::io::Error),

    #[error("failed to parse config file: {0}")]
    ParseError(serde_json::Error),

    #[error("failed to create config directory: {0}")]
    CreateDirError(std::io::Error),
}

pub type Result<T> = std::result::Result<T, ConfigError>;
