use anyhow::{Context, Result};
use rusqlite::{params, OptionalExtension, Row};

use crate::db::{connection::Database, models::Analysis};

fn row_to_analysis(row: &Row) -> rusqlite::Result<Analysis> {
    Ok(Analysis {
        serial_number: row.get("serial_number")?,
        detected_objects: row.get("detected_objects")?,
        image_reference: row.get("image_reference")?,
    })
}

impl Database {
    /// Inserts an analysis record and returns its serial number.
    ///
    /// Storage errors propagate; there is no sentinel value. Subscribers
    /// (see [`Database::subscribe`]) are notified on success.
    pub async fn insert_analysis(&self, analysis: &Analysis) -> Result<i64> {
        let record = analysis.clone();
        let serial = self
            .execute(move |conn| {
                conn.execute(
                    "INSERT INTO analysis (serial_number, detected_objects, image_reference)
                     VALUES (?1, ?2, ?3)",
                    params![
                        record.serial_number,
                        record.detected_objects,
                        record.image_reference,
                    ],
                )
                .with_context(|| "failed to insert analysis")?;
                Ok(conn.last_insert_rowid())
            })
            .await?;

        self.notify_changed();
        Ok(serial)
    }

    /// Point lookup by serial number. Absence is `None`, not an error.
    pub async fn get_analysis(&self, serial_number: i64) -> Result<Option<Analysis>> {
        self.execute(move |conn| {
            let analysis = conn
                .query_row(
                    "SELECT serial_number, detected_objects, image_reference
                     FROM analysis
                     WHERE serial_number = ?1",
                    params![serial_number],
                    row_to_analysis,
                )
                .optional()
                .with_context(|| "failed to query analysis")?;
            Ok(analysis)
        })
        .await
    }

    /// Deletes by serial number, returning the number of rows removed
    /// (0 or 1). A count of 0 means not-found and is not an error.
    pub async fn delete_analysis(&self, serial_number: i64) -> Result<usize> {
        let removed = self
            .execute(move |conn| {
                conn.execute(
                    "DELETE FROM analysis WHERE serial_number = ?1",
                    params![serial_number],
                )
                .with_context(|| "failed to delete analysis")
            })
            .await?;

        if removed > 0 {
            self.notify_changed();
        }
        Ok(removed)
    }

    /// Every stored record. No ordering is guaranteed.
    pub async fn list_analyses(&self) -> Result<Vec<Analysis>> {
        self.execute(|conn| {
            let mut stmt = conn.prepare(
                "SELECT serial_number, detected_objects, image_reference FROM analysis",
            )?;

            let mut rows = stmt.query([])?;
            let mut analyses = Vec::new();
            while let Some(row) = rows.next()? {
                analyses.push(row_to_analysis(row)?);
            }

            Ok(analyses)
        })
        .await
    }

    /// Largest serial currently in the table, used to re-seed the allocator
    /// above anything persisted by earlier runs.
    pub async fn max_serial_number(&self) -> Result<Option<i64>> {
        self.execute(|conn| {
            let max: Option<i64> = conn
                .query_row("SELECT MAX(serial_number) FROM analysis", [], |row| {
                    row.get(0)
                })
                .with_context(|| "failed to query max serial number")?;
            Ok(max)
        })
        .await
    }
}
