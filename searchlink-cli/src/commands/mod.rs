pub mod bulk;
pub mod reindex;
pub mod scan;

pub use bulk::{run_bulk, DocumentSource};
pub use reindex::run_reindex;
pub use scan::run_scan;

use anyhow::{bail, Context, Result};
use serde_json::Value;

/// Parse an optional JSON search body from the command line
pub fn parse_query(raw: Option<&str>) -> Result<Option<Value>> {
    let Some(raw) = raw else {
        return Ok(None);
    };
    let query: Value = serde_json::from_str(raw).context("Query is not valid JSON")?;
    if !query.is_object() {
        bail!("Query must be a JSON object, e.g. '{{\"query\": {{...}}}}'");
    }
    Ok(Some(query))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_query() {
        assert_eq!(parse_query(None).unwrap(), None);
        assert_eq!(
            parse_query(Some(r#"{"query":{"match_all":{}}}"#)).unwrap(),
            Some(json!({"query": {"match_all": {}}}))
        );
        assert!(parse_query(Some("{not json")).is_err());
        assert!(parse_query(Some(r#"["x"]"#)).is_err());
    }
}
