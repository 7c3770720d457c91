use std::collections::BTreeMap;

use chrono::NaiveDateTime;
use log::{info, warn};
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::db::{
    connection::Database,
    error::StorageResult,
    helpers::{format_timestamp, parse_timestamp, to_i64, to_u64},
    models::ProductivityRecord,
};
use crate::vision::TrackId;

// Rows adopted from an unversioned table may lack `last_updated`; those are
// skipped until a flush touches them again.
fn row_to_record(row: &Row) -> StorageResult<Option<ProductivityRecord>> {
    let person_id: i64 = row.get("person_id")?;
    let seconds: Option<i64> = row.get("time_spent_seconds")?;
    let Some(last_updated) = row.get::<_, Option<String>>("last_updated")? else {
        warn!("Skipping person_id {person_id}: last_updated is NULL");
        return Ok(None);
    };

    Ok(Some(ProductivityRecord {
        person_id: TrackId(to_u64(person_id, "person_id")?),
        time_spent_seconds: to_u64(seconds.unwrap_or(0), "time_spent_seconds")?,
        last_updated: parse_timestamp(&last_updated, "last_updated")?,
    }))
}

pub struct ProductivityRepository<'a> {
    conn: &'a Connection,
}

impl<'a> ProductivityRepository<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Add `seconds` to the stored total for `person_id`, creating the row on first sight.
    pub fn add_seconds(
        &self,
        person_id: TrackId,
        seconds: u64,
        at: &NaiveDateTime,
    ) -> StorageResult<()> {
        self.conn.execute(
            "INSERT INTO productivity (person_id, time_spent_seconds, last_updated)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(person_id) DO UPDATE SET
                 time_spent_seconds = COALESCE(productivity.time_spent_seconds, 0) + excluded.time_spent_seconds,
                 last_updated = excluded.last_updated",
            params![
                to_i64(person_id.0, "person_id")?,
                to_i64(seconds, "time_spent_seconds")?,
                format_timestamp(at),
            ],
        )?;
        Ok(())
    }

    pub fn get(&self, person_id: TrackId) -> StorageResult<Option<ProductivityRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT person_id, time_spent_seconds, last_updated
             FROM productivity WHERE person_id = ?1",
        )?;
        let mut rows = stmt.query(params![to_i64(person_id.0, "person_id")?])?;
        match rows.next()? {
            Some(row) => row_to_record(row),
            None => Ok(None),
        }
    }

    pub fn list_all(&self) -> StorageResult<Vec<ProductivityRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT person_id, time_spent_seconds, last_updated
             FROM productivity
             ORDER BY person_id ASC",
        )?;

        let mut rows = stmt.query([])?;
        let mut records = Vec::new();
        while let Some(row) = rows.next()? {
            records.extend(row_to_record(row)?);
        }
        Ok(records)
    }

    pub fn total_seconds(&self) -> StorageResult<u64> {
        let total: Option<i64> = self
            .conn
            .query_row(
                "SELECT SUM(time_spent_seconds) FROM productivity",
                [],
                |row| row.get(0),
            )
            .optional()?
            .flatten();
        to_u64(total.unwrap_or(0), "time_spent_seconds")
    }
}

impl Database {
    /// Merge session totals into the store.
    ///
    /// All rows are written in one transaction: either every identity is
    /// credited or none is. Returns the number of rows touched.
    pub async fn flush_dwell_totals(
        &self,
        totals: BTreeMap<TrackId, u64>,
        at: NaiveDateTime,
    ) -> StorageResult<usize> {
        self.execute(move |conn| {
            let tx = conn.transaction()?;
            {
                let repo = ProductivityRepository::new(&tx);
                for (person_id, seconds) in &totals {
                    repo.add_seconds(*person_id, *seconds, &at)?;
                    info!(
                        "Saved person_id {person_id}, seconds {seconds}, timestamp {}",
                        format_timestamp(&at)
                    );
                }
            }
            tx.commit()?;
            info!("DB commit done ({} rows)", totals.len());
            Ok(totals.len())
        })
        .await
    }

    pub async fn get_productivity_records(&self) -> StorageResult<Vec<ProductivityRecord>> {
        self.execute(|conn| ProductivityRepository::new(conn).list_all())
            .await
    }

    pub async fn get_productivity_record(
        &self,
        person_id: TrackId,
    ) -> StorageResult<Option<ProductivityRecord>> {
        self.execute(move |conn| ProductivityRepository::new(conn).get(person_id))
            .await
    }

    pub async fn get_total_tracked_seconds(&self) -> StorageResult<u64> {
        self.execute(|conn| ProductivityRepository::new(conn).total_seconds())
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(h: u32, m: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 5, 1)
            .unwrap()
            .and_hms_opt(h, m, s)
            .unwrap()
    }

    fn test_db() -> (tempfile::TempDir, Database) {
        let dir = tempfile::tempdir().expect("temp dir");
        let db = Database::new(dir.path().join("productivity.db")).expect("open db");
        (dir, db)
    }

    #[tokio::test]
    async fn first_flush_creates_row() {
        let (_dir, db) = test_db();

        let written = db
            .flush_dwell_totals(BTreeMap::from([(TrackId(4), 17)]), at(9, 0, 0))
            .await
            .unwrap();
        assert_eq!(written, 1);

        let record = db.get_productivity_record(TrackId(4)).await.unwrap().unwrap();
        assert_eq!(record.time_spent_seconds, 17);
        assert_eq!(record.last_updated, at(9, 0, 0));
    }

    #[tokio::test]
    async fn repeated_flushes_add_instead_of_overwrite() {
        let (_dir, db) = test_db();

        db.flush_dwell_totals(BTreeMap::from([(TrackId(5), 0)]), at(8, 0, 0))
            .await
            .unwrap();
        db.flush_dwell_totals(BTreeMap::from([(TrackId(5), 10)]), at(9, 0, 0))
            .await
            .unwrap();
        db.flush_dwell_totals(BTreeMap::from([(TrackId(5), 10)]), at(10, 30, 0))
            .await
            .unwrap();

        let record = db.get_productivity_record(TrackId(5)).await.unwrap().unwrap();
        assert_eq!(record.time_spent_seconds, 20);
        assert_eq!(record.last_updated, at(10, 30, 0));
    }

    #[tokio::test]
    async fn list_is_ordered_by_identity() {
        let (_dir, db) = test_db();

        db.flush_dwell_totals(
            BTreeMap::from([(TrackId(9), 3), (TrackId(2), 8), (TrackId(5), 1)]),
            at(12, 0, 0),
        )
        .await
        .unwrap();

        let ids: Vec<u64> = db
            .get_productivity_records()
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.person_id.0)
            .collect();
        assert_eq!(ids, vec![2, 5, 9]);
        assert_eq!(db.get_total_tracked_seconds().await.unwrap(), 12);
    }

    #[tokio::test]
    async fn empty_flush_writes_nothing() {
        let (_dir, db) = test_db();
        let written = db
            .flush_dwell_totals(BTreeMap::new(), at(12, 0, 0))
            .await
            .unwrap();
        assert_eq!(written, 0);
        assert!(db.get_productivity_records().await.unwrap().is_empty());
        assert_eq!(db.get_total_tracked_seconds().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn totals_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("productivity.db");

        {
            let db = Database::new(path.clone()).unwrap();
            db.flush_dwell_totals(BTreeMap::from([(TrackId(1), 30)]), at(7, 0, 0))
                .await
                .unwrap();
        }

        let db = Database::new(path).unwrap();
        db.flush_dwell_totals(BTreeMap::from([(TrackId(1), 15)]), at(8, 0, 0))
            .await
            .unwrap();
        let record = db.get_productivity_record(TrackId(1)).await.unwrap().unwrap();
        assert_eq!(record.time_spent_seconds, 45);
    }

    #[tokio::test]
    async fn legacy_rows_without_timestamp_are_skipped_until_flushed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("productivity.db");
        {
            let conn = Connection::open(&path).unwrap();
            conn.execute_batch(
                "CREATE TABLE productivity (
                    person_id INTEGER PRIMARY KEY,
                    time_spent_seconds INTEGER,
                    last_updated TEXT
                );
                INSERT INTO productivity VALUES (1, 40, '2024-01-01 10:00:00');
                INSERT INTO productivity VALUES (2, 25, NULL);
                INSERT INTO productivity VALUES (3, NULL, '2024-01-01 11:00:00');",
            )
            .unwrap();
        }

        let db = Database::new(path).unwrap();
        let records = db.get_productivity_records().await.unwrap();
        let ids: Vec<u64> = records.iter().map(|r| r.person_id.0).collect();
        assert_eq!(ids, vec![1, 3]);
        assert_eq!(records[1].time_spent_seconds, 0);
        assert!(db.get_productivity_record(TrackId(2)).await.unwrap().is_none());

        db.flush_dwell_totals(BTreeMap::from([(TrackId(2), 5)]), at(12, 0, 0))
            .await
            .unwrap();
        let healed = db.get_productivity_record(TrackId(2)).await.unwrap().unwrap();
        assert_eq!(healed.time_spent_seconds, 30);
        assert_eq!(healed.last_updated, at(12, 0, 0));
    }
}
