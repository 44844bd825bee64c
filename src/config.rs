use std::collections::HashMap;
use std::fmt;
use std::path::Path;

use crate::error::ConfigurationError;

pub const LLM_KEY_NAME: &str = "GROQ_API_KEY";
pub const SEARCH_KEY_NAME: &str = "SERPER_API_KEY";

#[derive(Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    llm_key: Option<String>,
    search_key: Option<String>,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("llm_key", &self.llm_key.as_ref().map(|_| "<redacted>"))
            .field("search_key", &self.search_key.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl Credentials {
    pub fn new(llm_key: Option<String>, search_key: Option<String>) -> Self {
        Self { llm_key: non_empty(llm_key), search_key: non_empty(search_key) }
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        Self::new(lookup(LLM_KEY_NAME), lookup(SEARCH_KEY_NAME))
    }

    /// `env` wins over `file_vars`.
    pub fn from_sources<F>(env: F, file_vars: &HashMap<String, String>) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        Self::from_lookup(|k| non_empty(env(k)).or_else(|| file_vars.get(k).cloned()))
    }

    pub fn llm_key(&self) -> Option<&str> { self.llm_key.as_deref() }
    pub fn search_key(&self) -> Option<&str> { self.search_key.as_deref() }

    /// Missing names come back in fixed order: LLM key, then search key.
    pub fn validate(&self) -> (bool, Vec<&'static str>) {
        let mut missing = Vec::new();
        if self.llm_key.is_none() {
            missing.push(LLM_KEY_NAME);
        }
        if self.search_key.is_none() {
            missing.push(SEARCH_KEY_NAME);
        }
        (missing.is_empty(), missing)
    }

    pub fn check(&self) -> Result<(), ConfigurationError> {
        match self.validate() {
            (true, _) => Ok(()),
            (false, missing) => Err(ConfigurationError::MissingCredentials(
                missing.into_iter().map(String::from).collect(),
            )),
        }
    }
}

/// Variables from the dotenv file. With no explicit path a `.env` in the
/// working directory is read when present.
pub fn load_env_file(env_file: Option<&Path>) -> Result<HashMap<String, String>, ConfigurationError> {
    match env_file {
        Some(path) => read_env_file(path),
        None if Path::new(".env").is_file() => read_env_file(Path::new(".env")),
        None => Ok(HashMap::new()),
    }
}

/// Process environment first, then the dotenv variables.
pub fn layered_lookup<'a>(file_vars: &'a HashMap<String, String>) -> impl Fn(&str) -> Option<String> + 'a {
    move |k: &str| non_empty(std::env::var(k).ok()).or_else(|| file_vars.get(k).cloned())
}

pub fn read_env_file(path: &Path) -> Result<HashMap<String, String>, ConfigurationError> {
    let to_err = |e: dotenvy::Error| ConfigurationError::EnvFile {
        path: path.display().to_string(),
        reason: e.to_string(),
    };
    let mut vars = HashMap::new();
    for item in dotenvy::from_path_iter(path).map_err(to_err)? {
        let (k, v) = item.map_err(to_err)?;
        vars.insert(k, v);
    }
    Ok(vars)
}

fn non_empty(v: Option<String>) -> Option<String> {
    v.filter(|s| !s.trim().is_empty())
}
