use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("configuration file not found")]
    NotFound,

    #[error("failed to read configuration file {path}: {source}")]
    ReadError {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse configuration: {source}")]
    ParseError {
        #[from]
        source: toml::de::Error,
    },

    #[error("validation error in {field}: {message}")]
    ValidationError { field: String, message: String },

    #[error("missing required environment variable: {name}")]
    MissingEnvVar { name: String },

    #[error("vault key missing or invalid")]
    VaultKeyInvalid,
}

impl ConfigError {
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::NotFound => "config_not_found",
            Self::ReadError { .. } => "config_read_error",
            Self::ParseError { .. } => "config_parse_error",
            Self::ValidationError { .. } => "config_validation_error",
            Self::MissingEnvVar { .. } => "config_missing_env",
            Self::VaultKeyInvalid => "config_vault_key_invalid",
        }
    }
}
