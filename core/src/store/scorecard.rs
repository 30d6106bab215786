use super::{bad_column, ts, ScorecardStore};
use crate::{
    audit::AuditedChange,
    error::{EngineError, EngineResult},
    model::{Scorecard, ScorecardStatus},
    types::Version,
};
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScorecardSummary {
    pub scorecard_id: String,
    pub name:         String,
    pub status:       ScorecardStatus,
    pub version:      Version,
}

impl ScorecardStore {
    // ── Scorecard ──────────────────────────────────────────────

    pub fn insert_scorecard(&self, scorecard: &Scorecard, at: DateTime<Utc>) -> EngineResult<()> {
        let body = serde_json::to_string(scorecard)?;
        let tx = self.conn.unchecked_transaction()?;
        tx.execute(
            "INSERT INTO scorecard (scorecard_id, name, status, version, body, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)",
            params![
                &scorecard.scorecard_id,
                &scorecard.name,
                scorecard.status.as_str(),
                scorecard.version,
                &body,
                ts(&at),
            ],
        )?;
        tx.execute(
            "INSERT INTO scorecard_version (scorecard_id, version, body, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![&scorecard.scorecard_id, scorecard.version, &body, ts(&at)],
        )?;
        tx.commit()?;
        Ok(())
    }

    pub fn load_scorecard(&self, scorecard_id: &str) -> EngineResult<Scorecard> {
        let body: Option<String> = self
            .conn
            .query_row(
                "SELECT body FROM scorecard WHERE scorecard_id = ?1",
                params![scorecard_id],
                |row| row.get(0),
            )
            .optional()?;
        let body = body.ok_or_else(|| EngineError::not_found("scorecard", scorecard_id))?;
        Ok(serde_json::from_str(&body)?)
    }

    pub fn load_scorecard_version(&self, scorecard_id: &str, version: Version) -> EngineResult<Scorecard> {
        let body: Option<String> = self
            .conn
            .query_row(
                "SELECT body FROM scorecard_version WHERE scorecard_id = ?1 AND version = ?2",
                params![scorecard_id, version],
                |row| row.get(0),
            )
            .optional()?;
        let body = body
            .ok_or_else(|| EngineError::not_found("scorecard version", format!("{scorecard_id}@v{version}")))?;
        Ok(serde_json::from_str(&body)?)
    }

    pub fn list_scorecards(&self) -> EngineResult<Vec<ScorecardSummary>> {
        let mut stmt = self.conn.prepare(
            "SELECT scorecard_id, name, status, version FROM scorecard ORDER BY name, scorecard_id",
        )?;
        let rows = stmt
            .query_map([], |row| {
                let raw: String = row.get(2)?;
                Ok(ScorecardSummary {
                    scorecard_id: row.get(0)?,
                    name: row.get(1)?,
                    status: ScorecardStatus::parse(&raw)
                        .ok_or_else(|| bad_column(2, format!("unknown status {raw}")))?,
                    version: row.get(3)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Persist an audited change atomically: new current state, the
    /// version row, and the change-log entry. The update only applies if
    /// the stored version is still the one the change was based on.
    pub fn commit_change(&mut self, change: &AuditedChange) -> EngineResult<i64> {
        let scorecard = &change.scorecard;
        let entry = &change.entry;
        let body = serde_json::to_string(scorecard)?;

        let tx = self.conn.transaction()?;
        let updated = tx.execute(
            "UPDATE scorecard SET name = ?1, status = ?2, version = ?3, body = ?4, updated_at = ?5
             WHERE scorecard_id = ?6 AND version = ?7",
            params![
                &scorecard.name,
                scorecard.status.as_str(),
                scorecard.version,
                &body,
                ts(&entry.changed_at),
                &scorecard.scorecard_id,
                change.previous_version,
            ],
        )?;
        if updated == 0 {
            let actual: Option<Version> = tx
                .query_row(
                    "SELECT version FROM scorecard WHERE scorecard_id = ?1",
                    params![&scorecard.scorecard_id],
                    |row| row.get(0),
                )
                .optional()?;
            return Err(match actual {
                Some(actual) => EngineError::StaleVersion {
                    expected: change.previous_version,
                    actual,
                },
                None => EngineError::not_found("scorecard", scorecard.scorecard_id.clone()),
            });
        }
        tx.execute(
            "INSERT INTO scorecard_version (scorecard_id, version, body, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![&scorecard.scorecard_id, scorecard.version, &body, ts(&entry.changed_at)],
        )?;
        let id = Self::append_change(&tx, entry)?;
        tx.commit()?;
        Ok(id)
    }
}
