//! HTTP message types exchanged with the answer service. Client ↔ server JSON.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One prior exchange sent as request context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryTurn {
    pub user: String,
    pub bot: String,
}

/// Client → server: `POST /query` body.
#[derive(Debug, Clone, Serialize)]
pub struct QueryRequest<'a> {
    pub question: &'a str,
    pub history: &'a [HistoryTurn],
}

impl<'a> QueryRequest<'a> {
    pub fn new(question: &'a str, history: &'a [HistoryTurn]) -> Self {
        Self { question, history }
    }
}

/// A supporting document snippet attached to an answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reference {
    pub title: String,
    pub snippet: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page: Option<String>,
}

impl Reference {
    /// Normalize one raw `sources[]` entry. Returns `None` for entries that
    /// carry nothing displayable (numbers, nulls, empty objects).
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::String(s) => Some(Reference {
                title: "Unknown".into(),
                snippet: s.clone(),
                page: None,
            }),
            Value::Object(map) => {
                let snippet = map
                    .get("content")
                    .and_then(Value::as_str)
                    .or_else(|| map.get("text").and_then(Value::as_str))
                    .unwrap_or_default()
                    .to_string();
                let title = map
                    .get("metadata")
                    .and_then(|m| m.get("source"))
                    .and_then(Value::as_str)
                    .or_else(|| map.get("source").and_then(Value::as_str))
                    .map(str::to_string);
                let page = map
                    .get("page")
                    .or_else(|| map.get("metadata").and_then(|m| m.get("page")))
                    .and_then(|p| match p {
                        Value::String(s) => Some(s.clone()),
                        Value::Number(n) => Some(n.to_string()),
                        _ => None,
                    });
                if snippet.is_empty() && title.is_none() {
                    return None;
                }
                Some(Reference {
                    title: title.unwrap_or_else(|| "Unknown".into()),
                    snippet,
                    page,
                })
            }
            _ => None,
        }
    }
}

/// Normalize the optional `sources` field. Anything that is not a list
/// yields no references; duplicates keep their first occurrence.
pub fn normalize_sources(value: Option<&Value>) -> Vec<Reference> {
    let Some(Value::Array(items)) = value else {
        return Vec::new();
    };
    let mut unique: Vec<Reference> = Vec::with_capacity(items.len());
    for reference in items.iter().filter_map(Reference::from_json) {
        let seen = unique
            .iter()
            .any(|r| r.title == reference.title && r.snippet == reference.snippet);
        if !seen {
            unique.push(reference);
        }
    }
    unique
}

/// Server → client: a successful `/query` response after normalization.
#[derive(Debug, Clone, PartialEq)]
pub struct Answer {
    pub answer: String,
    pub sources: Vec<Reference>,
    pub metadata: Option<Value>,
}

impl Answer {
    /// Parse a `/query` body. Only `answer` is required.
    pub fn from_json(value: &Value) -> Result<Self, String> {
        let answer = value
            .get("answer")
            .and_then(Value::as_str)
            .ok_or("missing answer")?
            .to_string();
        let metadata = value
            .get("metadata")
            .filter(|m| m.is_object())
            .cloned();
        Ok(Answer {
            answer,
            sources: normalize_sources(value.get("sources")),
            metadata,
        })
    }
}

/// Server → client: `GET /metrics` resource usage of the answer service.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ServerMetrics {
    pub cpu_percent: f64,
    pub memory_percent: f64,
}
