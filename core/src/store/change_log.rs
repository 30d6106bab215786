use super::{bad_column, parse_ts, ts, ScorecardStore};
use crate::{
    audit::{ChangeLogEntry, ChangeType},
    error::EngineResult,
};
use rusqlite::{params, Connection};

fn change_row_mapper(row: &rusqlite::Row<'_>) -> rusqlite::Result<ChangeLogEntry> {
    let change_type: String = row.get(3)?;
    let changed_at: String = row.get(9)?;
    Ok(ChangeLogEntry {
        id: Some(row.get(0)?),
        scorecard_id: row.get(1)?,
        version: row.get(2)?,
        change_type: ChangeType::parse(&change_type)
            .ok_or_else(|| bad_column(3, format!("unknown change type {change_type}")))?,
        field_path: row.get(4)?,
        old_value: row.get(5)?,
        new_value: row.get(6)?,
        justification: row.get(7)?,
        actor: row.get(8)?,
        changed_at: parse_ts(9, &changed_at)?,
    })
}

impl ScorecardStore {
    // ── Change log ─────────────────────────────────────────────

    /// Insert only. The table rejects UPDATE and DELETE at the schema level.
    pub(super) fn append_change(conn: &Connection, entry: &ChangeLogEntry) -> EngineResult<i64> {
        conn.execute(
            "INSERT INTO change_log (
                scorecard_id, version, change_type, field_path, old_value, new_value,
                justification, actor, changed_at
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                &entry.scorecard_id,
                entry.version,
                entry.change_type.as_str(),
                &entry.field_path,
                &entry.old_value,
                &entry.new_value,
                &entry.justification,
                &entry.actor,
                ts(&entry.changed_at),
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Chronological (insertion order).
    pub fn change_log(&self, scorecard_id: &str) -> EngineResult<Vec<ChangeLogEntry>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, scorecard_id, version, change_type, field_path, old_value, new_value,
                    justification, actor, changed_at
             FROM change_log WHERE scorecard_id = ?1
             ORDER BY id ASC",
        )?;
        let entries = stmt
            .query_map(params![scorecard_id], change_row_mapper)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::{ChangeAuditor, ChangeRequest};
    use crate::clock::SystemClock;
    use crate::model::{Bin, Characteristic, Scorecard};
    use chrono::Utc;

    #[test]
    fn change_log_rejects_update_and_delete() {
        let mut store = ScorecardStore::in_memory().unwrap();
        store.migrate().unwrap();
        let scorecard = Scorecard::new("Retail", 300.0, 200.0, 400.0)
            .unwrap()
            .with_characteristic(
                Characteristic::new("AGE", "Age", "age").with_bin(Bin::range("all", None, None, 1.0)),
            );
        store.insert_scorecard(&scorecard, Utc::now()).unwrap();

        let clock = SystemClock;
        let bin = scorecard.characteristics[0].bins[0].bin_id.clone();
        let change = ChangeAuditor::new(&clock)
            .edit_bin_points(&scorecard, &bin, 2.0, &ChangeRequest::new("ana", "tune"))
            .unwrap();
        store.commit_change(&change).unwrap();
        assert_eq!(store.change_log(&scorecard.scorecard_id).unwrap().len(), 1);

        assert!(store.conn.execute("UPDATE change_log SET actor = 'mallory'", []).is_err());
        assert!(store.conn.execute("DELETE FROM change_log", []).is_err());
        assert_eq!(store.change_log(&scorecard.scorecard_id).unwrap()[0].actor, "ana");
    }
}
