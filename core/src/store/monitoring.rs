use super::{bad_column, parse_ts, ts, ScorecardStore};
use crate::{
    alerts::{AlertEvaluation, AlertItem, Metric, Severity},
    error::{EngineError, EngineResult},
    performance::{PerformanceSnapshot, PsiBaseline},
};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashSet;

const ALERT_COLUMNS: &str = "alert_id, scorecard_id, rule_id, metric, severity, message,
    observed_value, threshold, fired_at, episode_open, acknowledged_by, acknowledged_at";

fn alert_row_mapper(row: &rusqlite::Row<'_>) -> rusqlite::Result<AlertItem> {
    let metric: String = row.get(3)?;
    let severity: String = row.get(4)?;
    let fired_at: String = row.get(8)?;
    let acknowledged_at: Option<String> = row.get(11)?;
    Ok(AlertItem {
        alert_id: row.get(0)?,
        scorecard_id: row.get(1)?,
        rule_id: row.get(2)?,
        metric: Metric::parse(&metric).ok_or_else(|| bad_column(3, format!("unknown metric {metric}")))?,
        severity: Severity::parse(&severity)
            .ok_or_else(|| bad_column(4, format!("unknown severity {severity}")))?,
        message: row.get(5)?,
        observed_value: row.get(6)?,
        threshold: row.get(7)?,
        fired_at: parse_ts(8, &fired_at)?,
        episode_open: row.get::<_, i32>(9)? != 0,
        acknowledged_by: row.get(10)?,
        acknowledged_at: acknowledged_at.map(|raw| parse_ts(11, &raw)).transpose()?,
    })
}

impl ScorecardStore {
    // ── Performance snapshots ──────────────────────────────────

    /// Store a snapshot together with the alert changes it caused.
    pub fn record_performance(
        &mut self,
        snapshot: &PerformanceSnapshot,
        evaluation: &AlertEvaluation,
    ) -> EngineResult<()> {
        let tx = self.conn.transaction()?;
        tx.execute(
            "INSERT INTO performance_snapshot (scorecard_id, scorecard_version, computed_at, body)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                &snapshot.scorecard_id,
                snapshot.scorecard_version,
                ts(&snapshot.computed_at),
                serde_json::to_string(snapshot)?,
            ],
        )?;
        for alert in &evaluation.fired {
            Self::insert_alert(&tx, alert)?;
        }
        for rule_id in &evaluation.closed_rules {
            tx.execute(
                "UPDATE alert SET episode_open = 0
                 WHERE scorecard_id = ?1 AND rule_id = ?2 AND episode_open = 1",
                params![&snapshot.scorecard_id, rule_id],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    /// Oldest first.
    pub fn snapshots(&self, scorecard_id: &str) -> EngineResult<Vec<PerformanceSnapshot>> {
        let mut stmt = self.conn.prepare(
            "SELECT body FROM performance_snapshot WHERE scorecard_id = ?1 ORDER BY id ASC",
        )?;
        let bodies = stmt
            .query_map(params![scorecard_id], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        bodies
            .iter()
            .map(|body| serde_json::from_str(body).map_err(EngineError::from))
            .collect()
    }

    // ── PSI baseline ───────────────────────────────────────────

    pub fn save_psi_baseline(&self, baseline: &PsiBaseline) -> EngineResult<()> {
        self.conn.execute(
            "INSERT INTO psi_baseline (scorecard_id, captured_at, body) VALUES (?1, ?2, ?3)
             ON CONFLICT(scorecard_id) DO UPDATE SET captured_at = excluded.captured_at, body = excluded.body",
            params![
                &baseline.scorecard_id,
                ts(&baseline.captured_at),
                serde_json::to_string(baseline)?,
            ],
        )?;
        Ok(())
    }

    pub fn psi_baseline(&self, scorecard_id: &str) -> EngineResult<Option<PsiBaseline>> {
        let body: Option<String> = self
            .conn
            .query_row(
                "SELECT body FROM psi_baseline WHERE scorecard_id = ?1",
                params![scorecard_id],
                |row| row.get(0),
            )
            .optional()?;
        body.map(|b| serde_json::from_str(&b).map_err(EngineError::from))
            .transpose()
    }

    // ── Alerts ─────────────────────────────────────────────────

    fn insert_alert(conn: &Connection, alert: &AlertItem) -> EngineResult<()> {
        conn.execute(
            &format!("INSERT INTO alert ({ALERT_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)"),
            params![
                &alert.alert_id,
                &alert.scorecard_id,
                &alert.rule_id,
                alert.metric.as_str(),
                alert.severity.as_str(),
                &alert.message,
                alert.observed_value,
                alert.threshold,
                ts(&alert.fired_at),
                if alert.episode_open { 1i32 } else { 0i32 },
                alert.acknowledged_by.as_deref(),
                alert.acknowledged_at.as_ref().map(ts),
            ],
        )?;
        Ok(())
    }

    /// Newest first.
    pub fn alerts(&self, scorecard_id: &str) -> EngineResult<Vec<AlertItem>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {ALERT_COLUMNS} FROM alert WHERE scorecard_id = ?1 ORDER BY fired_at DESC, rowid DESC"
        ))?;
        let alerts = stmt
            .query_map(params![scorecard_id], alert_row_mapper)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(alerts)
    }

    pub fn alert(&self, alert_id: &str) -> EngineResult<AlertItem> {
        self.conn
            .query_row(
                &format!("SELECT {ALERT_COLUMNS} FROM alert WHERE alert_id = ?1"),
                params![alert_id],
                alert_row_mapper,
            )
            .optional()?
            .ok_or_else(|| EngineError::not_found("alert", alert_id))
    }

    pub fn open_alert_rules(&self, scorecard_id: &str) -> EngineResult<HashSet<String>> {
        let mut stmt = self.conn.prepare(
            "SELECT DISTINCT rule_id FROM alert WHERE scorecard_id = ?1 AND episode_open = 1",
        )?;
        let rules = stmt
            .query_map(params![scorecard_id], |row| row.get(0))?
            .collect::<Result<HashSet<String>, _>>()?;
        Ok(rules)
    }

    /// Acknowledging records who saw the alert. It does not close the episode.
    pub fn acknowledge_alert(&self, alert_id: &str, actor: &str, at: DateTime<Utc>) -> EngineResult<AlertItem> {
        let updated = self.conn.execute(
            "UPDATE alert SET acknowledged_by = ?1, acknowledged_at = ?2
             WHERE alert_id = ?3 AND acknowledged_at IS NULL",
            params![actor, ts(&at), alert_id],
        )?;
        let alert = self.alert(alert_id)?;
        if updated == 0 {
            return Err(EngineError::validation(format!(
                "alert {alert_id} was already acknowledged by {}",
                alert.acknowledged_by.as_deref().unwrap_or("unknown")
            )));
        }
        Ok(alert)
    }
}
