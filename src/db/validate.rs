//! Batch existence validation for referenced simulations.
//!
//! Tools that reference several simulations (comparisons, rankings) need all
//! of them to exist before doing any work. One `IN (...)` query answers for
//! the whole id set instead of a round trip per id.
//!
//! Existence results are intentionally not cached: the check is cheap and a
//! stale positive would let a tool run against a vanished simulation.

use std::collections::BTreeSet;

use rusqlite::types::ToSql;

use crate::db::SessionPool;
use crate::Result;

/// Return the subset of `ids` that does not exist in the `simulations` table.
///
/// An empty input returns an empty set without touching the database.
pub async fn missing_simulations(
    pool: &SessionPool,
    ids: &BTreeSet<String>,
) -> Result<BTreeSet<String>> {
    if ids.is_empty() {
        return Ok(BTreeSet::new());
    }

    let requested: Vec<String> = ids.iter().cloned().collect();
    let found = pool
        .with_session(move |conn| {
            let placeholders = vec!["?"; requested.len()].join(", ");
            let sql = format!(
                "SELECT simulation_id FROM simulations WHERE simulation_id IN ({placeholders})"
            );
            let mut stmt = conn.prepare(&sql)?;
            let params: Vec<&dyn ToSql> = requested.iter().map(|id| id as &dyn ToSql).collect();
            let mut rows = stmt.query(params.as_slice())?;
            let mut found = BTreeSet::new();
            while let Some(row) = rows.next()? {
                found.insert(row.get::<_, String>(0)?);
            }
            Ok(found)
        })
        .await?;

    Ok(ids.difference(&found).cloned().collect())
}

/// Single-id convenience used by the execution facade's pre-validation.
pub async fn simulation_exists(pool: &SessionPool, simulation_id: &str) -> Result<bool> {
    let id = simulation_id.to_owned();
    pool.with_session(move |conn| {
        let exists = conn
            .query_row(
                "SELECT 1 FROM simulations WHERE simulation_id = ?1 LIMIT 1",
                [&id],
                |_| Ok(()),
            )
            .map(|_| true)
            .or_else(|err| match err {
                rusqlite::Error::QueryReturnedNoRows => Ok(false),
                other => Err(other),
            })?;
        Ok(exists)
    })
    .await
}
