//! Image metadata database operations
//!
//! Status changes are conditional UPDATEs: the WHERE clause only matches rows
//! in a status the lifecycle allows leaving, so concurrent callers race on the
//! row and exactly one wins.

use chrono::{DateTime, Utc};
use snapvault_common::models::{ImageMetadata, ProcessingStatus};
use snapvault_common::{time, Error, Result};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use super::{encode_string_list, format_timestamp, parse_string_list, parse_timestamp};

fn metadata_from_row(row: &SqliteRow) -> Result<ImageMetadata> {
    let tags: String = row.try_get("tags")?;
    let colors: String = row.try_get("colors")?;
    let status: String = row.try_get("ai_processing_status")?;
    let started: Option<String> = row.try_get("analysis_started_at")?;
    let created_at: String = row.try_get("created_at")?;
    let updated_at: String = row.try_get("updated_at")?;

    Ok(ImageMetadata {
        id: row.try_get("id")?,
        image_id: row.try_get("image_id")?,
        user_id: row.try_get("user_id")?,
        description: row.try_get("description")?,
        tags: parse_string_list("tags", &tags)?,
        colors: parse_string_list("colors", &colors)?,
        ai_processing_status: status.parse()?,
        provider: row.try_get("provider")?,
        analysis_started_at: started
            .map(|s| parse_timestamp("analysis_started_at", &s))
            .transpose()?,
        created_at: parse_timestamp("created_at", &created_at)?,
        updated_at: parse_timestamp("updated_at", &updated_at)?,
    })
}

/// Metadata row for one of the user's images
pub async fn get_metadata(
    pool: &SqlitePool,
    user_id: &str,
    image_id: i64,
) -> Result<Option<ImageMetadata>> {
    let row = sqlx::query(
        r#"
        SELECT id, image_id, user_id, description, tags, colors, ai_processing_status,
               provider, analysis_started_at, created_at, updated_at
        FROM image_metadata
        WHERE image_id = ? AND user_id = ?
        "#,
    )
    .bind(image_id)
    .bind(user_id)
    .fetch_optional(pool)
    .await?;

    row.as_ref().map(metadata_from_row).transpose()
}

/// Number of analyses the user started at or after `since`
pub async fn count_started_since(
    pool: &SqlitePool,
    user_id: &str,
    since: DateTime<Utc>,
) -> Result<i64> {
    let count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM image_metadata WHERE user_id = ? AND analysis_started_at >= ?",
    )
    .bind(user_id)
    .bind(format_timestamp(since))
    .fetch_one(pool)
    .await?;

    Ok(count)
}

/// Analyses a user may start within a rolling window
#[derive(Debug, Clone, Copy)]
pub struct DailyCap {
    pub since: DateTime<Utc>,
    pub limit: i64,
}

/// Result of trying to move an image into `processing`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    Started,
    /// Another caller holds the row, or it is already completed
    Busy,
    CapReached,
}

/// Move the image's metadata into `processing`.
///
/// The cap is counted inside the same statement that claims the row, so
/// parallel starts cannot overshoot it. Creates the row when the image has
/// none yet.
pub async fn begin_processing(
    pool: &SqlitePool,
    user_id: &str,
    image_id: i64,
    at: DateTime<Utc>,
    cap: Option<DailyCap>,
) -> Result<StartOutcome> {
    let at = format_timestamp(at);
    let [first, second] = ProcessingStatus::startable();
    // A negative limit disables the cap check
    let (since, limit) = match cap {
        Some(cap) => (format_timestamp(cap.since), cap.limit),
        None => (at.clone(), -1),
    };

    let updated = sqlx::query(
        r#"
        UPDATE image_metadata
        SET ai_processing_status = ?, analysis_started_at = ?, updated_at = ?
        WHERE image_id = ? AND user_id = ? AND ai_processing_status IN (?, ?)
          AND (? < 0 OR (
              SELECT COUNT(*) FROM image_metadata
              WHERE user_id = ? AND analysis_started_at >= ?
          ) < ?)
        "#,
    )
    .bind(ProcessingStatus::Processing.as_str())
    .bind(&at)
    .bind(&at)
    .bind(image_id)
    .bind(user_id)
    .bind(first.as_str())
    .bind(second.as_str())
    .bind(limit)
    .bind(user_id)
    .bind(&since)
    .bind(limit)
    .execute(pool)
    .await?
    .rows_affected();

    if updated > 0 {
        return Ok(StartOutcome::Started);
    }

    let inserted = sqlx::query(
        r#"
        INSERT INTO image_metadata
            (image_id, user_id, ai_processing_status, analysis_started_at, created_at, updated_at)
        SELECT ?, ?, ?, ?, ?, ?
        WHERE (? < 0 OR (
            SELECT COUNT(*) FROM image_metadata
            WHERE user_id = ? AND analysis_started_at >= ?
        ) < ?)
        ON CONFLICT(image_id) DO NOTHING
        "#,
    )
    .bind(image_id)
    .bind(user_id)
    .bind(ProcessingStatus::Processing.as_str())
    .bind(&at)
    .bind(&at)
    .bind(&at)
    .bind(limit)
    .bind(user_id)
    .bind(&since)
    .bind(limit)
    .execute(pool)
    .await?
    .rows_affected();

    if inserted > 0 {
        return Ok(StartOutcome::Started);
    }

    let startable = get_metadata(pool, user_id, image_id)
        .await?
        .map_or(true, |m| ProcessingStatus::startable().contains(&m.ai_processing_status));

    if let (true, Some(cap)) = (startable, cap) {
        if count_started_since(pool, user_id, cap.since).await? >= cap.limit {
            return Ok(StartOutcome::CapReached);
        }
    }

    Ok(StartOutcome::Busy)
}

/// Store analysis results and move `processing → completed`
pub async fn complete_analysis(
    pool: &SqlitePool,
    user_id: &str,
    image_id: i64,
    description: &str,
    tags: &[String],
    colors: &[String],
    provider: &str,
) -> Result<ImageMetadata> {
    let now = format_timestamp(time::now());
    let updated = sqlx::query(
        r#"
        UPDATE image_metadata
        SET description = ?, tags = ?, colors = ?, provider = ?,
            ai_processing_status = ?, updated_at = ?
        WHERE image_id = ? AND user_id = ? AND ai_processing_status = ?
        "#,
    )
    .bind(description)
    .bind(encode_string_list("tags", tags)?)
    .bind(encode_string_list("colors", colors)?)
    .bind(provider)
    .bind(ProcessingStatus::Completed.as_str())
    .bind(&now)
    .bind(image_id)
    .bind(user_id)
    .bind(ProcessingStatus::Processing.as_str())
    .execute(pool)
    .await?
    .rows_affected();

    let current = get_metadata(pool, user_id, image_id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("Metadata for image {}", image_id)))?;

    if updated == 0 {
        return Err(Error::InvalidTransition {
            from: current.ai_processing_status.to_string(),
            to: ProcessingStatus::Completed.to_string(),
        });
    }

    Ok(current)
}

/// Move `processing → failed`; returns false when the row was not processing
pub async fn mark_failed(pool: &SqlitePool, user_id: &str, image_id: i64) -> Result<bool> {
    let now = format_timestamp(time::now());
    let updated = sqlx::query(
        r#"
        UPDATE image_metadata
        SET ai_processing_status = ?, updated_at = ?
        WHERE image_id = ? AND user_id = ? AND ai_processing_status = ?
        "#,
    )
    .bind(ProcessingStatus::Failed.as_str())
    .bind(&now)
    .bind(image_id)
    .bind(user_id)
    .bind(ProcessingStatus::Processing.as_str())
    .execute(pool)
    .await?
    .rows_affected();

    Ok(updated > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{images, init_tables};
    use snapvault_common::models::NewImage;
    use sqlx::sqlite::SqlitePoolOptions;

    const USER: &str = "user-1";

    async fn setup() -> SqlitePool {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        init_tables(&pool).await.unwrap();
        pool
    }

    async fn add_image(pool: &SqlitePool, name: &str) -> i64 {
        let new_image = NewImage {
            filename: name.to_string(),
            original_path: format!("https://cdn.example/{}", name),
            thumbnail_path: None,
        };
        images::insert_image(pool, USER, &new_image).await.unwrap().id
    }

    async fn status(pool: &SqlitePool, image_id: i64) -> ProcessingStatus {
        get_metadata(pool, USER, image_id)
            .await
            .unwrap()
            .unwrap()
            .ai_processing_status
    }

    #[tokio::test]
    async fn test_only_one_caller_starts_processing() {
        let pool = setup().await;
        let id = add_image(&pool, "a.jpg").await;

        let first = begin_processing(&pool, USER, id, time::now(), None).await.unwrap();
        let second = begin_processing(&pool, USER, id, time::now(), None).await.unwrap();

        assert_eq!(first, StartOutcome::Started);
        assert_eq!(second, StartOutcome::Busy);
        assert_eq!(status(&pool, id).await, ProcessingStatus::Processing);
    }

    #[tokio::test]
    async fn test_failed_analysis_can_restart() {
        let pool = setup().await;
        let id = add_image(&pool, "a.jpg").await;

        begin_processing(&pool, USER, id, time::now(), None).await.unwrap();
        assert!(mark_failed(&pool, USER, id).await.unwrap());
        assert_eq!(status(&pool, id).await, ProcessingStatus::Failed);

        let restarted = begin_processing(&pool, USER, id, time::now(), None).await.unwrap();
        assert_eq!(restarted, StartOutcome::Started);
    }

    #[tokio::test]
    async fn test_transitions_outside_lifecycle_are_rejected() {
        let pool = setup().await;
        let id = add_image(&pool, "a.jpg").await;
        let tags = vec!["Dog".to_string()];

        // pending → completed
        let err = complete_analysis(&pool, USER, id, "A dog.", &tags, &[], "fallback")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidTransition { ref from, .. } if from == "pending"));
        // pending → failed
        assert!(!mark_failed(&pool, USER, id).await.unwrap());
        assert_eq!(status(&pool, id).await, ProcessingStatus::Pending);

        begin_processing(&pool, USER, id, time::now(), None).await.unwrap();
        let saved = complete_analysis(&pool, USER, id, "A dog.", &tags, &[], "fallback")
            .await
            .unwrap();
        assert_eq!(saved.ai_processing_status, ProcessingStatus::Completed);

        // completed is terminal
        let err = complete_analysis(&pool, USER, id, "Again.", &tags, &[], "fallback")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidTransition { ref from, .. } if from == "completed"));
        assert!(!mark_failed(&pool, USER, id).await.unwrap());
        let again = begin_processing(&pool, USER, id, time::now(), None).await.unwrap();
        assert_eq!(again, StartOutcome::Busy);
        assert_eq!(status(&pool, id).await, ProcessingStatus::Completed);
    }

    #[tokio::test]
    async fn test_cap_is_checked_when_claiming_the_row() {
        let pool = setup().await;
        let first = add_image(&pool, "a.jpg").await;
        let second = add_image(&pool, "b.jpg").await;
        let now = time::now();
        let cap = DailyCap {
            since: time::day_window_start(now),
            limit: 1,
        };

        let started = begin_processing(&pool, USER, first, now, Some(cap)).await.unwrap();
        assert_eq!(started, StartOutcome::Started);

        let capped = begin_processing(&pool, USER, second, now, Some(cap)).await.unwrap();
        assert_eq!(capped, StartOutcome::CapReached);
        assert_eq!(status(&pool, second).await, ProcessingStatus::Pending);

        // Busy wins over the cap for a row that is already processing
        let busy = begin_processing(&pool, USER, first, now, Some(cap)).await.unwrap();
        assert_eq!(busy, StartOutcome::Busy);

        let uncapped = begin_processing(&pool, USER, second, now, None).await.unwrap();
        assert_eq!(uncapped, StartOutcome::Started);
        assert_eq!(count_started_since(&pool, USER, cap.since).await.unwrap(), 2);
    }
}
