use anyhow::Result;
use searchlink::{
    reindex_to, BulkOptions, Config, HttpTransport, OpType, ReindexOptions, SearchClient,
};
use serde_json::Value;
use std::sync::Arc;

/// Run reindex command
pub async fn run_reindex(
    config: &Config,
    source_index: &str,
    target_index: &str,
    query: Option<Value>,
    target_hosts: Vec<String>,
    op_type: Option<OpType>,
    bulk: BulkOptions,
) -> Result<()> {
    let client: Arc<dyn SearchClient> = Arc::new(HttpTransport::new(&config.client)?);
    let target_client: Arc<dyn SearchClient> = if target_hosts.is_empty() {
        client.clone()
    } else {
        let mut target_config = config.client.clone();
        target_config.hosts = target_hosts;
        Arc::new(HttpTransport::new(&target_config)?)
    };

    let options = ReindexOptions {
        scan: config.scan.to_options(source_index),
        bulk,
        op_type,
        stats_only: false,
    };

    let summary = reindex_to(
        client,
        target_client,
        source_index,
        target_index,
        query,
        options,
    )
    .await?;

    println!("Reindex completed:");
    println!("  Copied: {}", summary.success);
    println!("  Failed: {}", summary.failed);
    Ok(())
}
