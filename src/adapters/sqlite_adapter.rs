//! SQLite data adapter.
//!
//! Dates are stored as `YYYY-MM-DD` text so that string comparison is date
//! comparison. Point-in-time filtering happens in SQL: market values are
//! as-of joins bounded by the staleness limit, fundamental figures are the
//! latest report on or before the as-of date.

use crate::domain::config_validation::max_staleness_days;
use crate::domain::cross_section::{CrossSection, SecurityId};
use crate::domain::error::PitcalcError;
use crate::domain::point_in_time::{
    DEFAULT_MAX_STALENESS_DAYS, FundamentalReport, MarketObservation, Membership,
    staleness_floor,
};
use crate::ports::config_port::ConfigPort;
use crate::ports::data_port::DataPort;
use chrono::NaiveDate;
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::params;
use std::collections::BTreeSet;

const DATE_FORMAT: &str = "%Y-%m-%d";

pub struct SqliteAdapter {
    pool: Pool<SqliteConnectionManager>,
    max_staleness_days: u32,
}

fn pool_err(e: r2d2::Error) -> PitcalcError {
    PitcalcError::data_access(e.to_string())
}

fn query_err(e: rusqlite::Error) -> PitcalcError {
    PitcalcError::data_access(e.to_string())
}

fn fmt_date(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

impl SqliteAdapter {
    pub fn from_config(config: &dyn ConfigPort) -> Result<Self, PitcalcError> {
        let db_path =
            config
                .get_string("sqlite", "path")
                .ok_or_else(|| PitcalcError::ConfigMissing {
                    section: "sqlite".into(),
                    key: "path".into(),
                })?;

        let pool_size = config.get_int("sqlite", "pool_size", 4).max(1) as u32;
        let staleness = max_staleness_days(config)?;

        let manager = SqliteConnectionManager::file(&db_path);
        let pool = Pool::builder()
            .max_size(pool_size)
            .build(manager)
            .map_err(pool_err)?;

        tracing::debug!(path = %db_path, pool_size, "opened sqlite store");
        Ok(Self {
            pool,
            max_staleness_days: staleness,
        })
    }

    pub fn in_memory() -> Result<Self, PitcalcError> {
        let manager = SqliteConnectionManager::memory();
        let pool = Pool::builder().max_size(1).build(manager).map_err(pool_err)?;

        Ok(Self {
            pool,
            max_staleness_days: DEFAULT_MAX_STALENESS_DAYS,
        })
    }

    pub fn with_max_staleness_days(mut self, days: u32) -> Self {
        self.max_staleness_days = days;
        self
    }

    fn conn(&self) -> Result<PooledConnection<SqliteConnectionManager>, PitcalcError> {
        self.pool.get().map_err(pool_err)
    }

    pub fn initialize_schema(&self) -> Result<(), PitcalcError> {
        let conn = self.conn()?;

        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS market (
                security_id TEXT NOT NULL,
                item TEXT NOT NULL,
                date TEXT NOT NULL,
                value REAL,
                PRIMARY KEY (security_id, item, date)
            );
            CREATE INDEX IF NOT EXISTS idx_market_item_date ON market(item, date);

            CREATE TABLE IF NOT EXISTS fundamental (
                security_id TEXT NOT NULL,
                item TEXT NOT NULL,
                period_end TEXT NOT NULL,
                report_date TEXT NOT NULL,
                value REAL,
                PRIMARY KEY (security_id, item, period_end, report_date)
            );
            CREATE INDEX IF NOT EXISTS idx_fundamental_item_period
                ON fundamental(item, period_end);

            CREATE TABLE IF NOT EXISTS universe (
                name TEXT NOT NULL,
                security_id TEXT NOT NULL,
                start_date TEXT NOT NULL,
                end_date TEXT,
                PRIMARY KEY (name, security_id, start_date)
            );",
        )
        .map_err(query_err)?;

        Ok(())
    }

    pub fn insert_market(&self, rows: &[MarketObservation]) -> Result<(), PitcalcError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction().map_err(query_err)?;

        for row in rows {
            tx.execute(
                "INSERT OR REPLACE INTO market (security_id, item, date, value)
                 VALUES (?1, ?2, ?3, ?4)",
                params![row.security_id, row.item, fmt_date(row.date), row.value],
            )
            .map_err(query_err)?;
        }

        tx.commit().map_err(query_err)
    }

    pub fn insert_fundamentals(&self, rows: &[FundamentalReport]) -> Result<(), PitcalcError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction().map_err(query_err)?;

        for row in rows {
            tx.execute(
                "INSERT OR REPLACE INTO fundamental
                    (security_id, item, period_end, report_date, value)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    row.security_id,
                    row.item,
                    fmt_date(row.period_end),
                    fmt_date(row.report_date),
                    row.value
                ],
            )
            .map_err(query_err)?;
        }

        tx.commit().map_err(query_err)
    }

    pub fn insert_memberships(&self, rows: &[Membership]) -> Result<(), PitcalcError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction().map_err(query_err)?;

        for row in rows {
            tx.execute(
                "INSERT OR REPLACE INTO universe (name, security_id, start_date, end_date)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    row.universe,
                    row.security_id,
                    fmt_date(row.start_date),
                    row.end_date.map(fmt_date)
                ],
            )
            .map_err(query_err)?;
        }

        tx.commit().map_err(query_err)
    }

    fn ensure_item(
        conn: &rusqlite::Connection,
        table: &str,
        item: &str,
    ) -> Result<(), PitcalcError> {
        let query = format!("SELECT EXISTS(SELECT 1 FROM {table} WHERE item = ?1)");
        let known: bool = conn
            .query_row(&query, params![item], |row| row.get(0))
            .map_err(query_err)?;
        if known {
            Ok(())
        } else {
            Err(PitcalcError::data_access(format!(
                "unknown {table} item '{item}'"
            )))
        }
    }
}

impl DataPort for SqliteAdapter {
    fn universe_members(
        &self,
        universe: &str,
        as_of: NaiveDate,
    ) -> Result<Vec<SecurityId>, PitcalcError> {
        let conn = self.conn()?;

        let query = "SELECT DISTINCT security_id
                     FROM universe
                     WHERE name = ?1 AND start_date <= ?2
                       AND (end_date IS NULL OR end_date >= ?2)
                     ORDER BY security_id";

        let mut stmt = conn.prepare(query).map_err(query_err)?;
        let rows = stmt
            .query_map(params![universe, fmt_date(as_of)], |row| row.get(0))
            .map_err(query_err)?;

        let mut members = Vec::new();
        for row in rows {
            members.push(row.map_err(query_err)?);
        }

        tracing::debug!(universe, %as_of, count = members.len(), "sqlite universe lookup");
        Ok(members)
    }

    fn market_lookup(
        &self,
        item: &str,
        dates: &[NaiveDate],
        ids: &BTreeSet<SecurityId>,
    ) -> Result<Vec<CrossSection>, PitcalcError> {
        let conn = self.conn()?;
        Self::ensure_item(&conn, "market", item)?;

        let query = "SELECT m.security_id, m.value
                     FROM market m
                     WHERE m.item = ?1
                       AND m.date >= ?3
                       AND m.date = (
                           SELECT MAX(m2.date) FROM market m2
                           WHERE m2.security_id = m.security_id
                             AND m2.item = ?1
                             AND m2.date <= ?2
                       )";

        let mut stmt = conn.prepare(query).map_err(query_err)?;
        let mut series = Vec::with_capacity(dates.len());

        for &date in dates {
            let floor = staleness_floor(date, self.max_staleness_days);
            let rows = stmt
                .query_map(params![item, fmt_date(date), fmt_date(floor)], |row| {
                    Ok((row.get::<_, String>(0)?, row.get::<_, Option<f64>>(1)?))
                })
                .map_err(query_err)?;

            let mut slice = CrossSection::new();
            for row in rows {
                let (id, value) = row.map_err(query_err)?;
                if ids.contains(&id) {
                    slice.insert(id, value);
                }
            }
            series.push(slice);
        }

        tracing::debug!(item, periods = dates.len(), "sqlite market lookup");
        Ok(series)
    }

    fn fundamental_lookup(
        &self,
        item: &str,
        quarters: &[NaiveDate],
        as_of: NaiveDate,
        ids: &BTreeSet<SecurityId>,
    ) -> Result<Vec<CrossSection>, PitcalcError> {
        let conn = self.conn()?;
        Self::ensure_item(&conn, "fundamental", item)?;

        let query = "SELECT f.security_id, f.value
                     FROM fundamental f
                     WHERE f.item = ?1
                       AND f.period_end = ?2
                       AND f.report_date = (
                           SELECT MAX(f2.report_date) FROM fundamental f2
                           WHERE f2.security_id = f.security_id
                             AND f2.item = ?1
                             AND f2.period_end = ?2
                             AND f2.report_date <= ?3
                       )";

        let mut stmt = conn.prepare(query).map_err(query_err)?;
        let as_of_str = fmt_date(as_of);
        let mut series = Vec::with_capacity(quarters.len());

        for &quarter in quarters {
            let rows = stmt
                .query_map(params![item, fmt_date(quarter), as_of_str], |row| {
                    Ok((row.get::<_, String>(0)?, row.get::<_, Option<f64>>(1)?))
                })
                .map_err(query_err)?;

            let mut slice = CrossSection::new();
            for row in rows {
                let (id, value) = row.map_err(query_err)?;
                if ids.contains(&id) {
                    slice.insert(id, value);
                }
            }
            series.push(slice);
        }

        tracing::debug!(item, quarters = quarters.len(), %as_of, "sqlite fundamental lookup");
        Ok(series)
    }
}
