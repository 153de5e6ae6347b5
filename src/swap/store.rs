use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context as _, Result};
use rusqlite::{Connection, OptionalExtension as _, Row, params};

use super::{Preimage, SwapRecord, SwapStatus};

const SWAP_COLUMNS: &str = r#"
  swap_id,
  invoice_amount_msat,
  inbound_percentage,
  private,
  payment_hash,
  preimage_hex,
  invoice,
  invoice_label,
  expected_capacity_sat,
  remote_node_pubkey,
  channel_id,
  failure_reason,
  status,
  created_at,
  updated_at,
  expires_at
"#;

/// Optional fields written together with a status transition.
#[derive(Debug, Clone, Default)]
pub struct TransitionUpdate {
    pub channel_id: Option<String>,
    pub failure_reason: Option<String>,
}

impl TransitionUpdate {
    pub fn channel(channel_id: impl Into<String>) -> Self {
        Self {
            channel_id: Some(channel_id.into()),
            failure_reason: None,
        }
    }

    pub fn failure(reason: impl Into<String>) -> Self {
        Self {
            channel_id: None,
            failure_reason: Some(reason.into()),
        }
    }
}

#[derive(Debug)]
pub struct SqliteSwapStore {
    conn: Connection,
    path: PathBuf,
}

impl SqliteSwapStore {
    pub fn open(path: PathBuf) -> Result<Self> {
        if let Some(dir) = path.parent()
            && !dir.as_os_str().is_empty()
        {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("create swap store dir {}", dir.display()))?;
        }

        let conn =
            Connection::open(&path).with_context(|| format!("open sqlite {}", path.display()))?;
        conn.busy_timeout(Duration::from_secs(5))
            .context("set sqlite busy_timeout")?;
        conn.execute_batch("PRAGMA journal_mode = WAL; PRAGMA foreign_keys = ON;")
            .context("configure sqlite pragmas")?;

        migrate(&conn).context("migrate sqlite schema")?;

        Ok(Self { conn, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Inserts a new swap. Fails if another swap is still active.
    pub fn insert_swap(&mut self, record: &SwapRecord) -> Result<()> {
        let tx = self.conn.transaction().context("begin insert swap")?;

        let active: Option<String> = tx
            .query_row(
                &format!(
                    "SELECT swap_id FROM swaps WHERE status IN ({}) LIMIT 1",
                    active_status_list()
                ),
                [],
                |row| row.get(0),
            )
            .optional()
            .context("check for active swap")?;
        if let Some(active) = active {
            anyhow::bail!("active swap exists: {active}");
        }

        tx.execute(
            &format!(
                "INSERT INTO swaps ({SWAP_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)"
            ),
            params![
                &record.swap_id,
                to_sql_u64(record.invoice_amount_msat, "invoice_amount_msat")?,
                record.inbound_percentage,
                record.private,
                &record.payment_hash,
                record.preimage.to_hex(),
                &record.invoice,
                &record.invoice_label,
                to_sql_u64(record.expected_capacity_sat, "expected_capacity_sat")?,
                &record.remote_node_pubkey,
                &record.channel_id,
                &record.failure_reason,
                record.status.as_str(),
                to_sql_u64(record.created_at, "created_at")?,
                to_sql_u64(record.updated_at, "updated_at")?,
                to_sql_u64(record.expires_at, "expires_at")?,
            ],
        )
        .with_context(|| format!("insert swap {}", record.swap_id))?;

        tx.commit().context("commit insert swap")?;
        Ok(())
    }

    pub fn get_swap(&self, swap_id: &str) -> Result<Option<SwapRecord>> {
        self.conn
            .query_row(
                &format!("SELECT {SWAP_COLUMNS} FROM swaps WHERE swap_id = ?1"),
                params![swap_id],
                swap_from_row,
            )
            .optional()
            .with_context(|| format!("get swap {swap_id}"))
    }

    pub fn swap_by_payment_hash(&self, payment_hash: &str) -> Result<Option<SwapRecord>> {
        self.conn
            .query_row(
                &format!(
                    "SELECT {SWAP_COLUMNS} FROM swaps WHERE payment_hash = ?1 ORDER BY created_at DESC, rowid DESC LIMIT 1"
                ),
                params![payment_hash],
                swap_from_row,
            )
            .optional()
            .with_context(|| format!("get swap by payment hash {payment_hash}"))
    }

    /// The swap that is not yet terminal, if any.
    pub fn active_swap(&self) -> Result<Option<SwapRecord>> {
        self.conn
            .query_row(
                &format!(
                    "SELECT {SWAP_COLUMNS} FROM swaps WHERE status IN ({}) ORDER BY created_at DESC, rowid DESC LIMIT 1",
                    active_status_list()
                ),
                [],
                swap_from_row,
            )
            .optional()
            .context("get active swap")
    }

    /// Most recently created swap, terminal or not.
    pub fn latest_swap(&self) -> Result<Option<SwapRecord>> {
        self.conn
            .query_row(
                &format!(
                    "SELECT {SWAP_COLUMNS} FROM swaps ORDER BY created_at DESC, rowid DESC LIMIT 1"
                ),
                [],
                swap_from_row,
            )
            .optional()
            .context("get latest swap")
    }

    pub fn list_swaps(&self) -> Result<Vec<SwapRecord>> {
        let mut stmt = self
            .conn
            .prepare(&format!(
                "SELECT {SWAP_COLUMNS} FROM swaps ORDER BY created_at, rowid"
            ))
            .context("prepare list swaps")?;

        let rows = stmt
            .query_map([], swap_from_row)
            .context("query list swaps")?;

        let mut out = Vec::new();
        for row in rows {
            out.push(row.context("read swap row")?);
        }
        Ok(out)
    }

    /// Moves a swap from `from` to `to` if it is still in `from`.
    ///
    /// Returns `false` when the swap has already left `from`.
    pub fn transition(
        &mut self,
        swap_id: &str,
        from: SwapStatus,
        to: SwapStatus,
        update: &TransitionUpdate,
        now: u64,
    ) -> Result<bool> {
        anyhow::ensure!(
            from.can_transition_to(to),
            "invalid swap transition {from} -> {to}"
        );

        let rows = self
            .conn
            .execute(
                r#"
UPDATE swaps SET
  status = ?3,
  channel_id = COALESCE(?4, channel_id),
  failure_reason = COALESCE(?5, failure_reason),
  updated_at = ?6
WHERE swap_id = ?1 AND status = ?2
"#,
                params![
                    swap_id,
                    from.as_str(),
                    to.as_str(),
                    &update.channel_id,
                    &update.failure_reason,
                    to_sql_u64(now, "updated_at")?,
                ],
            )
            .with_context(|| format!("update swap status {swap_id}"))?;

        if rows == 1 {
            return Ok(true);
        }

        anyhow::ensure!(
            self.get_swap(swap_id)?.is_some(),
            "swap not found: {swap_id}"
        );
        Ok(false)
    }

    /// Walks a settling swap from `from` to `Completed` in one transaction.
    ///
    /// Returns `false`, writing nothing, when the swap has already left `from`.
    /// On error the swap stays in `from`.
    pub fn complete(&mut self, swap_id: &str, from: SwapStatus, now: u64) -> Result<bool> {
        anyhow::ensure!(
            matches!(from, SwapStatus::ChannelObserved | SwapStatus::HtlcAccepted),
            "cannot settle swap {swap_id} from {from}"
        );
        let now = to_sql_u64(now, "updated_at")?;

        let tx = self.conn.transaction().context("begin settle swap")?;
        let mut status = from;
        while status != SwapStatus::Completed {
            let next = status
                .successor()
                .with_context(|| format!("no successor for {status}"))?;
            let rows = tx
                .execute(
                    "UPDATE swaps SET status = ?3, updated_at = ?4 WHERE swap_id = ?1 AND status = ?2",
                    params![swap_id, status.as_str(), next.as_str(), now],
                )
                .with_context(|| format!("update swap status {swap_id} {status} -> {next}"))?;
            if rows != 1 {
                return Ok(false);
            }
            status = next;
        }
        tx.commit().context("commit settle swap")?;
        Ok(true)
    }
}

fn migrate(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
CREATE TABLE IF NOT EXISTS swaps (
  swap_id TEXT PRIMARY KEY,
  invoice_amount_msat INTEGER NOT NULL,
  inbound_percentage INTEGER NOT NULL,
  private INTEGER NOT NULL,
  payment_hash TEXT NOT NULL,
  preimage_hex TEXT NOT NULL,
  invoice TEXT NOT NULL,
  invoice_label TEXT NOT NULL,
  expected_capacity_sat INTEGER NOT NULL,
  remote_node_pubkey TEXT NOT NULL,
  channel_id TEXT,
  failure_reason TEXT,
  status TEXT NOT NULL,
  created_at INTEGER NOT NULL,
  updated_at INTEGER NOT NULL,
  expires_at INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS swaps_status_idx ON swaps(status);
CREATE INDEX IF NOT EXISTS swaps_payment_hash_idx ON swaps(payment_hash);
"#,
    )
    .context("create tables")?;
    Ok(())
}

fn active_status_list() -> String {
    SwapStatus::ACTIVE
        .iter()
        .map(|s| format!("'{}'", s.as_str()))
        .collect::<Vec<_>>()
        .join(", ")
}

fn to_sql_u64(value: u64, name: &str) -> Result<i64> {
    i64::try_from(value).with_context(|| format!("{name} out of range: {value}"))
}

fn column_u64(row: &Row<'_>, idx: usize, name: &str) -> rusqlite::Result<u64> {
    let value: i64 = row.get(idx)?;
    u64::try_from(value).map_err(|_| {
        rusqlite::Error::FromSqlConversionFailure(
            idx,
            rusqlite::types::Type::Integer,
            format!("invalid {name} {value}").into(),
        )
    })
}

fn swap_from_row(row: &Row<'_>) -> rusqlite::Result<SwapRecord> {
    let inbound_percentage: i64 = row.get(2)?;
    let inbound_percentage = u8::try_from(inbound_percentage).map_err(|_| {
        rusqlite::Error::FromSqlConversionFailure(
            2,
            rusqlite::types::Type::Integer,
            format!("invalid inbound_percentage {inbound_percentage}").into(),
        )
    })?;

    let preimage_hex: String = row.get(5)?;
    let preimage = Preimage::from_hex(&preimage_hex).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(
            5,
            rusqlite::types::Type::Text,
            format!("invalid preimage: {e}").into(),
        )
    })?;

    let status_str: String = row.get(12)?;
    let status = SwapStatus::parse(&status_str).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            12,
            rusqlite::types::Type::Text,
            format!("unknown swap status: {status_str}").into(),
        )
    })?;

    Ok(SwapRecord {
        swap_id: row.get(0)?,
        invoice_amount_msat: column_u64(row, 1, "invoice_amount_msat")?,
        inbound_percentage,
        private: row.get(3)?,
        payment_hash: row.get(4)?,
        preimage,
        invoice: row.get(6)?,
        invoice_label: row.get(7)?,
        expected_capacity_sat: column_u64(row, 8, "expected_capacity_sat")?,
        remote_node_pubkey: row.get(9)?,
        channel_id: row.get(10)?,
        failure_reason: row.get(11)?,
        status,
        created_at: column_u64(row, 13, "created_at")?,
        updated_at: column_u64(row, 14, "updated_at")?,
        expires_at: column_u64(row, 15, "expires_at")?,
    })
}
