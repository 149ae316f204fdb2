//! Configuração do relay carregada a partir de `relay.toml`.
//!
//! A struct [`RelayConfig`] contém todos os parâmetros configuráveis.
//! Valores não presentes no arquivo usam defaults sensíveis.
//! As variáveis de ambiente `OPENAI_API_KEY` e `ANTHROPIC_API_KEY` têm
//! precedência sobre o arquivo.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{RelayError, Result};
use crate::provider::ModelDefaults;

pub const DEFAULT_CONFIG_FILE: &str = "relay.toml";

/// Configuração de nível superior carregada de `relay.toml`.
#[derive(Debug, Clone, Deserialize)]
pub struct RelayConfig {
    /// Diretório raiz do armazenamento de jobs.
    #[serde(default = "default_root_dir")]
    pub root_dir: PathBuf,

    /// Chave da API OpenAI.
    #[serde(default)]
    pub openai_api_key: String,

    /// URL base da API OpenAI (sobrescrita em testes ou proxies).
    #[serde(default)]
    pub openai_base_url: Option<String>,

    /// Chave da API Anthropic.
    #[serde(default)]
    pub anthropic_api_key: String,

    /// URL base da API Anthropic.
    #[serde(default)]
    pub anthropic_base_url: Option<String>,

    /// Intervalo entre consultas de status no modo `--wait`.
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,

    /// Tempo máximo de espera no modo `--wait`.
    #[serde(default = "default_max_wait_secs")]
    pub max_wait_secs: u64,

    /// Parâmetros padrão aplicados a cada submissão.
    #[serde(default)]
    pub defaults: ModelDefaults,
}

// Valor padrão para o diretório raiz: "relay_manager".
fn default_root_dir() -> PathBuf {
    PathBuf::from("relay_manager")
}

// Valor padrão para o intervalo de consulta: 10s.
fn default_poll_interval_secs() -> u64 {
    10
}

// Valor padrão para a espera máxima: 300s.
fn default_max_wait_secs() -> u64 {
    300
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            root_dir: default_root_dir(),
            openai_api_key: String::new(),
            openai_base_url: None,
            anthropic_api_key: String::new(),
            anthropic_base_url: None,
            poll_interval_secs: default_poll_interval_secs(),
            max_wait_secs: default_max_wait_secs(),
            defaults: ModelDefaults::default(),
        }
    }
}

impl RelayConfig {
    /// Carrega a configuração de `path`, usando defaults se o arquivo não existir.
    pub fn load_from(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let contents = std::fs::read_to_string(path)?;
            Self::parse(&contents)?
        } else {
            Self::default()
        };

        // Variáveis de ambiente têm precedência sobre o arquivo para as chaves.
        if let Some(key) = env_key("OPENAI_API_KEY") {
            config.openai_api_key = key;
        }
        if let Some(key) = env_key("ANTHROPIC_API_KEY") {
            config.anthropic_api_key = key;
        }

        Ok(config)
    }

    pub fn parse(contents: &str) -> Result<Self> {
        toml::from_str(contents).map_err(|e| RelayError::Config(e.to_string()))
    }
}

fn env_key(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|key| !key.is_empty())
}
