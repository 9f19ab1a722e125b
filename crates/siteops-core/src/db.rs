use std::path::Path;
use std::sync::Arc;

use redb::Database;

use crate::error::{Result, SiteopsError};
use crate::orchestrator::ledger;
use crate::store::redb_store;

/// Open or create the redb database at `path` with every table in place.
///
/// The entity store and the run ledger share the returned handle.
pub fn open(path: &Path) -> Result<Arc<Database>> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let db = Database::create(path).map_err(SiteopsError::store)?;
    // Ensure tables exist before any reads
    let wt = db.begin_write().map_err(SiteopsError::store)?;
    redb_store::ensure_tables(&wt)?;
    ledger::ensure_table(&wt)?;
    wt.commit().map_err(SiteopsError::store)?;
    Ok(Arc::new(db))
}
