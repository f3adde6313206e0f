use anyhow::Result;
use sqlx::{types::Json, PgPool};
use time::OffsetDateTime;

use crate::domain::{MeterDirectoryEntry, MeterRecord, ParameterEntry};

#[derive(Debug, Clone, sqlx::FromRow)]
struct MeterRecordRow {
    unique_key: String,
    meter_name: String,
    location: String,
    parameters: Json<Vec<ParameterEntry>>,
    comment: String,
    created_at: OffsetDateTime,
    updated_at: OffsetDateTime,
}

impl From<MeterRecordRow> for MeterRecord {
    fn from(row: MeterRecordRow) -> Self {
        MeterRecord {
            unique_key: row.unique_key,
            meter_name: row.meter_name,
            location: row.location,
            parameters: row.parameters.0,
            comment: row.comment,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

/// All directory entries, ordered by key.
pub async fn list_directory(pool: &PgPool) -> Result<Vec<MeterDirectoryEntry>> {
    let rows = sqlx::query_as::<_, MeterDirectoryEntry>(
        r#"
        SELECT unique_key, meter_name, location
        FROM meter_directory
        ORDER BY unique_key
        "#,
    )
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

pub async fn directory_entry(pool: &PgPool, unique_key: &str) -> Result<Option<MeterDirectoryEntry>> {
    let row = sqlx::query_as::<_, MeterDirectoryEntry>(
        r#"
        SELECT unique_key, meter_name, location
        FROM meter_directory
        WHERE unique_key = $1
        "#,
    )
    .bind(unique_key)
    .fetch_optional(pool)
    .await?;

    Ok(row)
}

/// Insert or replace a directory entry. Only the seed step writes here.
pub async fn upsert_directory_entry(pool: &PgPool, entry: &MeterDirectoryEntry) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO meter_directory (unique_key, meter_name, location)
        VALUES ($1, $2, $3)
        ON CONFLICT (unique_key)
        DO UPDATE SET meter_name = EXCLUDED.meter_name, location = EXCLUDED.location
        "#,
    )
    .bind(&entry.unique_key)
    .bind(&entry.meter_name)
    .bind(&entry.location)
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn meter_record(pool: &PgPool, unique_key: &str) -> Result<Option<MeterRecord>> {
    let row = sqlx::query_as::<_, MeterRecordRow>(
        r#"
        SELECT
            unique_key,
            meter_name,
            location,
            parameters,
            comment,
            created_at,
            updated_at
        FROM meter_records
        WHERE unique_key = $1
        "#,
    )
    .bind(unique_key)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(MeterRecord::from))
}

/// Create a record. Returns `false` if one already exists for the key.
pub async fn insert_meter_record(pool: &PgPool, record: &MeterRecord) -> Result<bool> {
    let result = sqlx::query(
        r#"
        INSERT INTO meter_records
            (unique_key, meter_name, location, parameters, comment, created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        ON CONFLICT (unique_key) DO NOTHING
        "#,
    )
    .bind(&record.unique_key)
    .bind(&record.meter_name)
    .bind(&record.location)
    .bind(Json(&record.parameters))
    .bind(&record.comment)
    .bind(record.created_at)
    .bind(record.updated_at)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Replace the mutable part of a record. Last write wins; there is no
/// version check. Returns `false` if no record exists for the key.
pub async fn save_meter_record(pool: &PgPool, record: &MeterRecord) -> Result<bool> {
    let result = sqlx::query(
        r#"
        UPDATE meter_records
        SET parameters = $2,
            comment    = $3,
            updated_at = $4
        WHERE unique_key = $1
        "#,
    )
    .bind(&record.unique_key)
    .bind(Json(&record.parameters))
    .bind(&record.comment)
    .bind(record.updated_at)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() == 1)
}
