use anyhow::Result;
use futures::StreamExt;
use searchlink::{scan, Config, HttpTransport, ScanOptions};
use std::io::{self, Write};
use std::sync::Arc;

/// Run scan command, writing one hit per line to stdout
pub async fn run_scan(config: &Config, options: ScanOptions) -> Result<()> {
    let client = Arc::new(HttpTransport::new(&config.client)?);
    tracing::info!("Scanning '{}' (scroll {})", options.index, options.scroll);

    let stdout = io::stdout();
    let mut out = stdout.lock();
    let mut hits = scan(client, options);
    let mut count = 0usize;

    while let Some(hit) = hits.next().await {
        serde_json::to_writer(&mut out, &hit?)?;
        out.write_all(b"\n")?;
        count += 1;
    }
    out.flush()?;

    tracing::info!("Exported {} hits", count);
    Ok(())
}
