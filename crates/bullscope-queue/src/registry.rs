//! Queue discovery from metadata keys.

use std::collections::BTreeSet;

use redis::aio::MultiplexedConnection;
use tracing::debug;

use crate::error::QueueResult;
use crate::keys::KeyScheme;

/// COUNT hint passed to each SCAN call.
const SCAN_BATCH: usize = 500;

/// Collect every key matching `pattern` with a full SCAN iteration.
pub(crate) async fn scan_keys(
    conn: &mut MultiplexedConnection,
    pattern: &str,
) -> QueueResult<Vec<String>> {
    let mut cursor: u64 = 0;
    let mut keys = Vec::new();

    loop {
        let (next, batch): (u64, Vec<String>) = redis::cmd("SCAN")
            .arg(cursor)
            .arg("MATCH")
            .arg(pattern)
            .arg("COUNT")
            .arg(SCAN_BATCH)
            .query_async(conn)
            .await?;
        keys.extend(batch);
        if next == 0 {
            break;
        }
        cursor = next;
    }

    debug!(pattern = %pattern, found = keys.len(), "Scanned metadata keys");
    Ok(keys)
}

/// Turn metadata keys into a sorted, de-duplicated list of queue names.
pub fn queue_names_from_keys<I, S>(scheme: &KeyScheme, keys: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    keys.into_iter()
        .filter_map(|key| scheme.queue_name_from_meta_key(key.as_ref()))
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}
