//! Interface de linha de comando do relay baseada em clap.
//!
//! Define a struct [`Cli`] com subcomandos [`Command`] (submit, list, status,
//! results) e flags globais (--root, --config, --verbose).

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use relay::config::DEFAULT_CONFIG_FILE;

/// relay — gerenciador de jobs de inferência em lote.
#[derive(Debug, Parser)]
#[command(name = "relay", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Diretório raiz do armazenamento (sobrescreve `root_dir` do arquivo).
    #[arg(long, global = true)]
    pub root: Option<PathBuf>,

    /// Caminho do arquivo de configuração.
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_FILE)]
    pub config: PathBuf,

    /// Habilita saída detalhada (verbose).
    #[arg(long, short, global = true, default_value_t = false)]
    pub verbose: bool,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Submete um lote de requisições lido de um arquivo JSON ou TOML.
    Submit {
        /// Arquivo com as requisições (array JSON ou `[[requests]]` em TOML).
        file: PathBuf,

        /// Id do job; gerado automaticamente se omitido.
        #[arg(long)]
        job_id: Option<String>,

        /// Provedor a usar (openai, anthropic).
        #[arg(long, default_value = "openai")]
        provider: String,

        /// Descrição livre do job.
        #[arg(long)]
        description: Option<String>,
    },

    /// Lista os jobs conhecidos com o status armazenado.
    List,

    /// Atualiza o status de um job junto ao provedor.
    Status {
        job_id: String,

        /// Consulta repetidamente até um estado terminal ou o tempo máximo.
        #[arg(long)]
        wait: bool,
    },

    /// Baixa e reconcilia os resultados de um job concluído.
    Results {
        job_id: String,

        /// Grava os resultados em arquivo em vez da saída padrão.
        #[arg(long)]
        output: Option<PathBuf>,
    },
}
