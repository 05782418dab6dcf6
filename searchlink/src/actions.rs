//! Bulk actions and their NDJSON encoding
//!
//! A document handed to the bulk helpers is split into an action header and an
//! optional source line:
//!
//! ```text
//! {"_op_type": "update", "_index": "i", "_id": 7, "_retry_on_conflict": 3, "doc": {...}}
//!   ──▶ {"update":{"_index":"i","_id":"7","retry_on_conflict":3}}
//!       {"doc":{...}}
//! ```

use crate::error::{Error, Result};
use futures::stream::{self, BoxStream, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

/// Header keys lifted out of a document with their leading underscore stripped
const UNDERSCORED_PARAMS: &[&str] = &[
    "_version",
    "_version_type",
    "_if_seq_no",
    "_if_primary_term",
    "_retry_on_conflict",
];

/// Header keys lifted out of a document as-is
const PLAIN_PARAMS: &[&str] = &[
    "version",
    "version_type",
    "if_seq_no",
    "if_primary_term",
    "retry_on_conflict",
    "pipeline",
];

/// Bulk operation type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OpType {
    #[default]
    Index,
    Create,
    Update,
    Delete,
}

impl OpType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OpType::Index => "index",
            OpType::Create => "create",
            OpType::Update => "update",
            OpType::Delete => "delete",
        }
    }

    /// Whether the operation carries a source line
    pub fn has_body(&self) -> bool {
        !matches!(self, OpType::Delete)
    }
}

impl fmt::Display for OpType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OpType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "index" => Ok(OpType::Index),
            "create" => Ok(OpType::Create),
            "update" => Ok(OpType::Update),
            "delete" => Ok(OpType::Delete),
            other => Err(Error::InvalidAction(format!("unknown op type '{}'", other))),
        }
    }
}

/// One bulk operation: the header fields plus an optional source
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BulkAction {
    pub op_type: OpType,
    pub index: Option<String>,
    pub id: Option<String>,
    pub routing: Option<String>,
    /// Additional header parameters (version, pipeline, ...)
    pub meta: Map<String, Value>,
    /// Source line; `None` for deletes
    pub source: Option<Value>,
}

impl BulkAction {
    /// Index `source` into `index`
    pub fn index(index: impl Into<String>, source: Value) -> Self {
        Self {
            op_type: OpType::Index,
            index: Some(index.into()),
            source: Some(source),
            ..Default::default()
        }
    }

    /// Create `source` in `index`, failing if the id already exists
    pub fn create(index: impl Into<String>, id: impl Into<String>, source: Value) -> Self {
        Self {
            op_type: OpType::Create,
            index: Some(index.into()),
            id: Some(id.into()),
            source: Some(source),
            ..Default::default()
        }
    }

    /// Partial update; `body` is the full update payload, e.g. `{"doc": {...}}`
    pub fn update(index: impl Into<String>, id: impl Into<String>, body: Value) -> Self {
        Self {
            op_type: OpType::Update,
            index: Some(index.into()),
            id: Some(id.into()),
            source: Some(body),
            ..Default::default()
        }
    }

    pub fn delete(index: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            op_type: OpType::Delete,
            index: Some(index.into()),
            id: Some(id.into()),
            ..Default::default()
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_routing(mut self, routing: impl Into<String>) -> Self {
        self.routing = Some(routing.into());
        self
    }

    /// Expand a loose document into an action.
    ///
    /// `_op_type` defaults to `index`. `_index` and `_id` go to the header,
    /// routing/version/concurrency keys are lifted with their underscore
    /// stripped, and the source is `_source` when present or the remaining
    /// keys otherwise. An update whose `_source` is not an object treats it as
    /// a source-filtering header parameter.
    pub fn from_document(doc: &Value) -> Result<Self> {
        let Value::Object(map) = doc else {
            return Err(Error::InvalidAction(format!(
                "expected a JSON object, got {}",
                json_kind(doc)
            )));
        };

        let mut rest = map.clone();
        let op_type = match rest.remove("_op_type") {
            Some(Value::String(s)) => s.parse()?,
            Some(other) => {
                return Err(Error::InvalidAction(format!(
                    "_op_type must be a string, got {}",
                    json_kind(&other)
                )))
            }
            None => OpType::Index,
        };

        let mut meta = Map::new();
        if op_type == OpType::Update && rest.get("_source").is_some_and(|s| !s.is_object()) {
            if let Some(filter) = rest.remove("_source") {
                meta.insert("_source".to_string(), filter);
            }
        }

        let index = rest.remove("_index").map(|v| scalar_to_string(&v));
        let id = rest.remove("_id").map(|v| scalar_to_string(&v));
        let routing = rest
            .remove("_routing")
            .or_else(|| rest.remove("routing"))
            .map(|v| scalar_to_string(&v));

        for key in UNDERSCORED_PARAMS {
            if let Some(value) = rest.remove(*key) {
                meta.insert(key[1..].to_string(), value);
            }
        }
        for key in PLAIN_PARAMS {
            if let Some(value) = rest.remove(*key) {
                meta.insert((*key).to_string(), value);
            }
        }

        let source = if op_type.has_body() {
            match rest.remove("_source") {
                Some(source) => Some(source),
                None => Some(Value::Object(rest)),
            }
        } else {
            None
        };

        Ok(Self {
            op_type,
            index,
            id,
            routing,
            meta,
            source,
        })
    }

    /// Header object, e.g. `{"index": {"_index": "i", "_id": "1"}}`
    pub fn header(&self) -> Value {
        let mut params = Map::new();
        if let Some(index) = &self.index {
            params.insert("_index".to_string(), Value::String(index.clone()));
        }
        if let Some(id) = &self.id {
            params.insert("_id".to_string(), Value::String(id.clone()));
        }
        if let Some(routing) = &self.routing {
            params.insert("routing".to_string(), Value::String(routing.clone()));
        }
        for (key, value) in &self.meta {
            params.insert(key.clone(), value.clone());
        }

        let mut header = Map::new();
        header.insert(self.op_type.as_str().to_string(), Value::Object(params));
        Value::Object(header)
    }

    /// Serialized header line and, for operations that carry one, source line
    pub fn encode(&self) -> Result<(String, Option<String>)> {
        let header = serde_json::to_string(&self.header())?;
        let body = match (&self.source, self.op_type.has_body()) {
            (Some(source), true) => Some(serde_json::to_string(source)?),
            _ => None,
        };
        Ok((header, body))
    }

    /// Size in bytes this action adds to a request, newlines included
    pub fn encoded_len(&self) -> Result<usize> {
        let (header, body) = self.encode()?;
        Ok(header.len() + 1 + body.map(|b| b.len() + 1).unwrap_or(0))
    }
}

/// Serialize a batch of actions into a newline-delimited request body
pub fn encode_ndjson(actions: &[BulkAction]) -> Result<String> {
    let mut out = String::new();
    for action in actions {
        let (header, body) = action.encode()?;
        out.push_str(&header);
        out.push('\n');
        if let Some(body) = body {
            out.push_str(&body);
            out.push('\n');
        }
    }
    Ok(out)
}

/// Wrap an in-memory collection as an action stream
pub fn action_stream<I>(actions: I) -> BoxStream<'static, Result<BulkAction>>
where
    I: IntoIterator<Item = BulkAction>,
    I::IntoIter: Send + 'static,
{
    stream::iter(actions.into_iter().map(Ok)).boxed()
}

/// Expand loose JSON documents into an action stream
pub fn document_stream<I>(documents: I) -> BoxStream<'static, Result<BulkAction>>
where
    I: IntoIterator<Item = Value>,
    I::IntoIter: Send + 'static,
{
    stream::iter(
        documents
            .into_iter()
            .map(|doc| BulkAction::from_document(&doc)),
    )
    .boxed()
}

/// Groups actions into chunks bounded by count and encoded size.
///
/// A chunk is closed before an action that would push it past either limit,
/// so a single oversized action still forms a chunk of its own.
#[derive(Debug)]
pub struct Chunker {
    chunk_size: usize,
    max_chunk_bytes: usize,
    pending: Vec<BulkAction>,
    pending_bytes: usize,
}

impl Chunker {
    pub fn new(chunk_size: usize, max_chunk_bytes: usize) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
            max_chunk_bytes,
            pending: Vec::new(),
            pending_bytes: 0,
        }
    }

    /// Add an action; returns the previous chunk if this action closed it
    pub fn push(&mut self, action: BulkAction) -> Result<Option<Vec<BulkAction>>> {
        let size = action.encoded_len()?;
        let full = self.pending.len() >= self.chunk_size
            || self.pending_bytes + size > self.max_chunk_bytes;

        let closed = if !self.pending.is_empty() && full {
            self.take()
        } else {
            None
        };

        self.pending.push(action);
        self.pending_bytes += size;
        Ok(closed)
    }

    /// Flush whatever is left
    pub fn finish(&mut self) -> Option<Vec<BulkAction>> {
        self.take()
    }

    fn take(&mut self) -> Option<Vec<BulkAction>> {
        if self.pending.is_empty() {
            return None;
        }
        self.pending_bytes = 0;
        Some(std::mem::take(&mut self.pending))
    }
}

fn scalar_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
