//! Convenience wrappers for the document pipeline's tool servers.
//!
//! Each function pins a server name and tool name and forwards to
//! [`ClientManager::call_tool`], returning its [`ToolCallResult`] unchanged.

use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::mcp_client::client::ClientManager;
use crate::mcp_client::types::{ServerConfig, ToolCallResult};

/// Server that extracts, chunks and stores uploaded documents.
pub const DOCUMENT_SERVICE: &str = "DocumentService";
pub const DOCUMENT_SERVICE_URL: &str = "http://localhost:8001/sse";

/// Server that answers vector searches over stored chunks.
pub const RAG_SERVICE: &str = "RAGService";
pub const RAG_SERVICE_URL: &str = "http://localhost:8002/sse";

pub const PROCESS_DOCUMENT_TOOL: &str = "process_document";
pub const SAVE_DOCUMENT_TEXT_TOOL: &str = "upload_and_save_to_mongo";
pub const SEARCH_DOCUMENTS_TOOL: &str = "search_documents";

pub const DEFAULT_SEARCH_LIMIT: u32 = 5;

/// The servers registered when no configuration overrides them.
pub fn default_servers() -> Vec<ServerConfig> {
    vec![
        ServerConfig::new(DOCUMENT_SERVICE, DOCUMENT_SERVICE_URL)
            .with_description("Document extraction, chunking and storage"),
        ServerConfig::new(RAG_SERVICE, RAG_SERVICE_URL)
            .with_description("Semantic search over stored document chunks"),
    ]
}

/// Register [`default_servers`] with `manager`.
pub async fn setup_default_servers(manager: &ClientManager) {
    manager.register_all(default_servers()).await;
}

pub async fn call_document_tool(
    manager: &ClientManager,
    tool: &str,
    arguments: Map<String, Value>,
) -> ToolCallResult {
    manager.call_tool(DOCUMENT_SERVICE, tool, arguments).await
}

pub async fn call_rag_tool(
    manager: &ClientManager,
    tool: &str,
    arguments: Map<String, Value>,
) -> ToolCallResult {
    manager.call_tool(RAG_SERVICE, tool, arguments).await
}

/// Extract, chunk and embed a stored document.
pub async fn process_document(
    manager: &ClientManager,
    file_path: &Path,
    filename: &str,
    document_id: &str,
) -> ToolCallResult {
    let arguments = document_arguments(file_path, filename, document_id);
    call_document_tool(manager, PROCESS_DOCUMENT_TOOL, arguments).await
}

/// Extract and store a document's text without vectorizing it.
pub async fn save_document_text(
    manager: &ClientManager,
    file_path: &Path,
    filename: &str,
    document_id: &str,
) -> ToolCallResult {
    let arguments = document_arguments(file_path, filename, document_id);
    call_document_tool(manager, SAVE_DOCUMENT_TEXT_TOOL, arguments).await
}

/// Search stored chunks.
pub async fn search_documents(manager: &ClientManager, request: &SearchRequest) -> ToolCallResult {
    call_rag_tool(manager, SEARCH_DOCUMENTS_TOOL, request.to_arguments()).await
}

fn document_arguments(file_path: &Path, filename: &str, document_id: &str) -> Map<String, Value> {
    let mut arguments = Map::new();
    arguments.insert("file_path".into(), json!(file_path.to_string_lossy()));
    arguments.insert("filename".into(), json!(filename));
    arguments.insert("document_id".into(), json!(document_id));
    arguments
}

// ─── Search ──────────────────────────────────────────────────────────────────

/// Scope of a search.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryMode {
    /// Chunks of one document; `target_id` is the document id.
    SingleDocument,
    /// Chunks of one collection; `target_id` is the collection id.
    Collection,
    #[default]
    Global,
}

impl QueryMode {
    pub fn as_str(self) -> &'static str {
        match self {
            QueryMode::SingleDocument => "single_document",
            QueryMode::Collection => "collection",
            QueryMode::Global => "global",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SearchRequest {
    pub query: String,
    #[serde(default)]
    pub mode: QueryMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_id: Option<String>,
    #[serde(default = "default_limit")]
    pub limit: u32,
    #[serde(default)]
    pub score_threshold: f64,
}

fn default_limit() -> u32 {
    DEFAULT_SEARCH_LIMIT
}

impl SearchRequest {
    /// Search across every stored document.
    pub fn global(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            mode: QueryMode::Global,
            target_id: None,
            limit: DEFAULT_SEARCH_LIMIT,
            score_threshold: 0.0,
        }
    }

    pub fn single_document(query: impl Into<String>, document_id: impl Into<String>) -> Self {
        Self {
            mode: QueryMode::SingleDocument,
            target_id: Some(document_id.into()),
            ..Self::global(query)
        }
    }

    pub fn collection(query: impl Into<String>, collection_id: impl Into<String>) -> Self {
        Self {
            mode: QueryMode::Collection,
            target_id: Some(collection_id.into()),
            ..Self::global(query)
        }
    }

    pub fn with_limit(mut self, limit: u32) -> Self {
        self.limit = limit;
        self
    }

    pub fn with_score_threshold(mut self, score_threshold: f64) -> Self {
        self.score_threshold = score_threshold;
        self
    }

    fn to_arguments(&self) -> Map<String, Value> {
        let mut arguments = Map::new();
        arguments.insert("query".into(), json!(self.query));
        arguments.insert("mode".into(), json!(self.mode.as_str()));
        if let Some(target_id) = &self.target_id {
            arguments.insert("target_id".into(), json!(target_id));
        }
        arguments.insert("limit".into(), json!(self.limit));
        arguments.insert("score_threshold".into(), json!(self.score_threshold));
        arguments
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
