use thiserror::Error;

/// Startup problems that keep the chat UI from being offered at all.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigurationError {
    #[error("missing required API keys: {}", .0.join(", "))]
    MissingCredentials(Vec<String>),
    #[error("failed to read env file {path}: {reason}")]
    EnvFile { path: String, reason: String },
    #[error("invalid value for {name}: {value}")]
    InvalidSetting { name: String, value: String },
}

/// Tool, model or agent construction failures. The chat is disabled but the
/// server keeps running.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum InitializationError {
    #[error("{0} not found in environment variables")]
    MissingCredential(&'static str),
    #[error("temperature must be within [0, 1], got {0}")]
    Temperature(String),
    #[error("error setting up {component}: {reason}")]
    Client { component: &'static str, reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_credentials_lists_names() {
        let e = ConfigurationError::MissingCredentials(vec!["GROQ_API_KEY".into(), "SERPER_API_KEY".into()]);
        assert_eq!(e.to_string(), "missing required API keys: GROQ_API_KEY, SERPER_API_KEY");
    }

    #[test]
    fn missing_credential_message_names_variable() {
        let e = InitializationError::MissingCredential("GROQ_API_KEY");
        assert_eq!(e.to_string(), "GROQ_API_KEY not found in environment variables");
    }
}
