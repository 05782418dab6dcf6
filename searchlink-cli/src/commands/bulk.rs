use anyhow::{Context, Result};
use futures::stream::{self, Stream};
use searchlink::{bulk, BulkAction, BulkOptions, Config, HttpTransport};
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tokio::fs::File;
use tokio::io::{self, AsyncBufRead, AsyncBufReadExt, BufReader};

/// Source for documents to index
pub enum DocumentSource {
    FromFile(PathBuf),
    FromStdin,
}

impl DocumentSource {
    pub async fn reader(&self) -> std::io::Result<Box<dyn AsyncBufRead + Send + Unpin>> {
        match self {
            DocumentSource::FromFile(path) => {
                let file = File::open(path).await?;
                Ok(Box::new(BufReader::new(file)))
            }
            DocumentSource::FromStdin => Ok(Box::new(BufReader::new(io::stdin()))),
        }
    }
}

/// Parse one JSONL line into an action
fn parse_line(line: &str) -> searchlink::Result<BulkAction> {
    let doc: Value = serde_json::from_str(line)?;
    BulkAction::from_document(&doc)
}

/// Actions read lazily from JSONL, skipping blank lines
fn document_lines<R>(reader: R) -> impl Stream<Item = searchlink::Result<BulkAction>> + Send
where
    R: AsyncBufRead + Send + Unpin,
{
    stream::unfold(reader.lines(), |mut lines| async move {
        loop {
            match lines.next_line().await {
                Ok(Some(line)) if line.trim().is_empty() => continue,
                Ok(Some(line)) => return Some((parse_line(&line), lines)),
                Ok(None) => return None,
                Err(e) => return Some((Err(e.into()), lines)),
            }
        }
    })
}

/// Run bulk command
pub async fn run_bulk(
    config: &Config,
    source: DocumentSource,
    options: BulkOptions,
    stats_only: bool,
) -> Result<()> {
    let reader = source.reader().await.context("Failed to open input")?;
    let client = Arc::new(HttpTransport::new(&config.client)?);
    let start = Instant::now();

    tracing::info!(
        "Indexing into {:?} with chunks of {}",
        config.client.hosts,
        options.chunk_size
    );
    let summary = bulk(client, document_lines(reader), options, stats_only).await?;

    println!("Bulk completed:");
    println!("  Indexed: {}", summary.success);
    println!("  Failed:  {}", summary.failed);
    println!("  Time:    {:.2}s", start.elapsed().as_secs_f64());
    for item in &summary.errors {
        println!(
            "  {} {}: {}",
            item.op_type,
            item.id().unwrap_or("-"),
            item.error().map(|e| e.to_string()).unwrap_or_default()
        );
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use searchlink::OpType;

    #[test]
    fn test_parse_line() {
        let action = parse_line(r#"{"_op_type":"delete","_index":"i","_id":"1"}"#).unwrap();
        assert_eq!(action.op_type, OpType::Delete);
        assert!(parse_line("{broken").is_err());
    }

    #[tokio::test]
    async fn test_file_source_reads_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("docs.jsonl");
        std::fs::write(&path, "{\"a\":1}\n\n{\"a\":2}\n").unwrap();

        let reader = DocumentSource::FromFile(path).reader().await.unwrap();
        let docs: Vec<_> = document_lines(reader).collect().await;
        assert_eq!(docs.len(), 2);
        assert!(docs.iter().all(|d| d.is_ok()));
    }

    #[tokio::test]
    async fn test_bad_line_is_reported_in_place() {
        let input: &[u8] = b"{\"a\":1}\nnot json\n{\"a\":3}\n";
        let docs: Vec<_> = document_lines(input).collect().await;
        assert_eq!(docs.len(), 3);
        assert!(docs[1].is_err());
    }
}
