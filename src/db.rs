/// PostgreSQL-backed reading store.
///
/// Holds one synchronous `postgres::Client` behind a mutex. Every evaluated
/// sample becomes one row in `sensor_data`; the table is created on connect
/// if it does not exist yet.

use crate::logging::{self, Component};
use crate::model::{ReadingRecord, StoreError, StoredReading};
use crate::store::ReadingStore;
use chrono::{DateTime, NaiveDate, Utc};
use postgres::{Client, NoTls, Row};
use std::sync::Mutex;

const CREATE_TABLE_SQL: &str = "
    CREATE TABLE IF NOT EXISTS sensor_data (
        id                BIGSERIAL PRIMARY KEY,
        level_a           DOUBLE PRECISION NOT NULL,
        level_b           DOUBLE PRECISION NOT NULL,
        flow              DOUBLE PRECISION NOT NULL,
        sim_status        VARCHAR(255),
        sim_message       TEXT,
        created_at        TIMESTAMP WITH TIME ZONE NOT NULL DEFAULT NOW(),
        predicted_status  VARCHAR(255),
        countdown_text    VARCHAR(255),
        predicted_seconds DOUBLE PRECISION,
        is_raining        BOOLEAN NOT NULL
    )
";

const SELECT_COLUMNS: &str = "id, created_at, level_a, level_b, flow, is_raining, \
     sim_status, sim_message, predicted_status, countdown_text, predicted_seconds";

pub struct PgStore {
    client: Mutex<Client>,
}

/// Connects and makes sure `sensor_data` exists.
pub fn connect(database_url: &str) -> Result<PgStore, StoreError> {
    let mut client = Client::connect(database_url, NoTls)?;
    client.batch_execute(CREATE_TABLE_SQL)?;
    logging::info(Component::Database, None, "sensor_data table ready");
    Ok(PgStore {
        client: Mutex::new(client),
    })
}

impl PgStore {
    fn with_client<T>(
        &self,
        f: impl FnOnce(&mut Client) -> Result<T, postgres::Error>,
    ) -> Result<T, StoreError> {
        let mut client = self
            .client
            .lock()
            .map_err(|_| StoreError::Unavailable("database client lock poisoned".to_string()))?;
        Ok(f(&mut *client)?)
    }
}

fn row_to_reading(row: &Row) -> StoredReading {
    StoredReading {
        id: row.get(0),
        created_at: row.get::<_, DateTime<Utc>>(1),
        record: ReadingRecord {
            level_a_cm: row.get(2),
            level_b_cm: row.get(3),
            flow_m3s: row.get(4),
            is_raining: row.get(5),
            sim_status: row.get::<_, Option<String>>(6).unwrap_or_default(),
            sim_message: row.get::<_, Option<String>>(7).unwrap_or_default(),
            predicted_status: row.get::<_, Option<String>>(8).unwrap_or_default(),
            countdown_text: row.get(9),
            predicted_seconds: row.get::<_, Option<f64>>(10).unwrap_or(-1.0),
        },
    }
}

impl ReadingStore for PgStore {
    fn append(&self, record: &ReadingRecord) -> Result<StoredReading, StoreError> {
        let row = self.with_client(|client| {
            client.query_one(
                "INSERT INTO sensor_data
                    (level_a, level_b, flow, sim_status, sim_message, created_at,
                     predicted_status, countdown_text, predicted_seconds, is_raining)
                 VALUES ($1, $2, $3, $4, $5, NOW(), $6, $7, $8, $9)
                 RETURNING id, created_at",
                &[
                    &record.level_a_cm,
                    &record.level_b_cm,
                    &record.flow_m3s,
                    &record.sim_status,
                    &record.sim_message,
                    &record.predicted_status,
                    &record.countdown_text,
                    &record.predicted_seconds,
                    &record.is_raining,
                ],
            )
        })?;

        Ok(StoredReading {
            id: row.get(0),
            created_at: row.get(1),
            record: record.clone(),
        })
    }

    fn latest(&self) -> Result<Option<StoredReading>, StoreError> {
        let query = format!(
            "SELECT {} FROM sensor_data ORDER BY id DESC LIMIT 1",
            SELECT_COLUMNS
        );
        let rows = self.with_client(|client| client.query(query.as_str(), &[]))?;
        Ok(rows.first().map(row_to_reading))
    }

    fn recent(&self, limit: usize) -> Result<Vec<StoredReading>, StoreError> {
        let query = format!(
            "SELECT {} FROM sensor_data ORDER BY id DESC LIMIT $1",
            SELECT_COLUMNS
        );
        let limit = limit as i64;
        let rows = self.with_client(|client| client.query(query.as_str(), &[&limit]))?;
        Ok(rows.iter().rev().map(row_to_reading).collect())
    }

    fn on_date(&self, date: NaiveDate) -> Result<Vec<StoredReading>, StoreError> {
        let query = format!(
            "SELECT {} FROM sensor_data
             WHERE (created_at AT TIME ZONE 'UTC')::date = $1
             ORDER BY id DESC",
            SELECT_COLUMNS
        );
        let rows = self.with_client(|client| client.query(query.as_str(), &[&date]))?;
        Ok(rows.iter().map(row_to_reading).collect())
    }
}
