//! Tipos de dados para a API Message Batches da Anthropic.
//!
//! Todas as structs derivam `Serialize`/`Deserialize` conforme o formato dos
//! endpoints `v1/messages/batches`.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Corpo da requisição para `POST /v1/messages/batches`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateBatchRequest {
    pub requests: Vec<BatchRequestItem>,
}

/// Uma requisição dentro do lote, correlacionada por `custom_id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchRequestItem {
    pub custom_id: String,
    /// Parâmetros de `v1/messages`: model, max_tokens, system, messages e extras.
    pub params: Map<String, Value>,
}

/// Uma única mensagem em uma conversa com a API Anthropic.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Papel do remetente: "user" ou "assistant".
    pub role: String,
    /// Conteúdo textual da mensagem.
    pub content: String,
}

/// Objeto de lote retornado por create e retrieve.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageBatch {
    pub id: String,
    /// "in_progress", "canceling" ou "ended".
    pub processing_status: String,
    /// URL do arquivo JSONL de resultados; presente somente após `ended`.
    #[serde(default)]
    pub results_url: Option<String>,
    #[serde(default)]
    pub request_counts: Option<RequestCounts>,
}

/// Contagem de requisições por desfecho.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RequestCounts {
    #[serde(default)]
    pub processing: u32,
    #[serde(default)]
    pub succeeded: u32,
    #[serde(default)]
    pub errored: u32,
    #[serde(default)]
    pub canceled: u32,
    #[serde(default)]
    pub expired: u32,
}

/// Uma linha do arquivo de resultados.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultLine {
    pub custom_id: String,
    pub result: ResultBody,
}

/// Desfecho de uma requisição. `result_type` é serializado como `"type"`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultBody {
    #[serde(rename = "type")]
    pub result_type: String,
    #[serde(default)]
    pub message: Option<Value>,
    #[serde(default)]
    pub error: Option<Value>,
}
