//! Image database operations
//!
//! Images are always returned joined with their metadata row.

use snapvault_common::models::{Image, ImageMetadata, NewImage, ProcessingStatus};
use snapvault_common::{time, Result};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use super::{encode_string_list, format_timestamp, parse_string_list, parse_timestamp};

const SELECT_JOINED: &str = r#"
    SELECT i.id, i.user_id, i.filename, i.original_path, i.thumbnail_path, i.uploaded_at,
           m.id AS meta_id, m.description, m.tags, m.colors, m.ai_processing_status,
           m.provider, m.analysis_started_at,
           m.created_at AS meta_created_at, m.updated_at AS meta_updated_at
    FROM images i
    LEFT JOIN image_metadata m ON m.image_id = i.id
"#;

fn image_from_row(row: &SqliteRow) -> Result<Image> {
    let id: i64 = row.try_get("id")?;
    let user_id: String = row.try_get("user_id")?;
    let uploaded_at: String = row.try_get("uploaded_at")?;

    let meta_id: Option<i64> = row.try_get("meta_id")?;
    let metadata = match meta_id {
        Some(meta_id) => {
            let tags: String = row.try_get("tags")?;
            let colors: String = row.try_get("colors")?;
            let status: String = row.try_get("ai_processing_status")?;
            let started: Option<String> = row.try_get("analysis_started_at")?;
            let created_at: String = row.try_get("meta_created_at")?;
            let updated_at: String = row.try_get("meta_updated_at")?;

            Some(ImageMetadata {
                id: meta_id,
                image_id: id,
                user_id: user_id.clone(),
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
        None => None,
    };

    Ok(Image {
        id,
        user_id,
        filename: row.try_get("filename")?,
        original_path: row.try_get("original_path")?,
        thumbnail_path: row.try_get("thumbnail_path")?,
        uploaded_at: parse_timestamp("uploaded_at", &uploaded_at)?,
        metadata,
    })
}

/// All of a user's images, newest first
pub async fn list_images(pool: &SqlitePool, user_id: &str) -> Result<Vec<Image>> {
    let query = format!(
        "{} WHERE i.user_id = ? ORDER BY i.uploaded_at DESC, i.id DESC",
        SELECT_JOINED
    );
    let rows = sqlx::query(&query).bind(user_id).fetch_all(pool).await?;
    rows.iter().map(image_from_row).collect()
}

/// One image, if it exists and belongs to the user
pub async fn get_image(pool: &SqlitePool, user_id: &str, image_id: i64) -> Result<Option<Image>> {
    let query = format!("{} WHERE i.user_id = ? AND i.id = ?", SELECT_JOINED);
    let row = sqlx::query(&query)
        .bind(user_id)
        .bind(image_id)
        .fetch_optional(pool)
        .await?;
    row.as_ref().map(image_from_row).transpose()
}

/// Insert an image together with its pending metadata row
pub async fn insert_image(pool: &SqlitePool, user_id: &str, new_image: &NewImage) -> Result<Image> {
    let now = format_timestamp(time::now());
    let empty = encode_string_list("tags", &[])?;

    let mut tx = pool.begin().await?;

    let image_id = sqlx::query(
        r#"
        INSERT INTO images
            (user_id, filename, original_path, thumbnail_path, uploaded_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(user_id)
    .bind(&new_image.filename)
    .bind(&new_image.original_path)
    .bind(&new_image.thumbnail_path)
    .bind(&now)
    .bind(&now)
    .execute(&mut *tx)
    .await?
    .last_insert_rowid();

    sqlx::query(
        r#"
        INSERT INTO image_metadata
            (image_id, user_id, tags, colors, ai_processing_status, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(image_id)
    .bind(user_id)
    .bind(&empty)
    .bind(&empty)
    .bind(ProcessingStatus::Pending.as_str())
    .bind(&now)
    .bind(&now)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    tracing::debug!(image_id, user_id, "Image created");

    get_image(pool, user_id, image_id).await?.ok_or_else(|| {
        snapvault_common::Error::Internal(format!("Image {} vanished after insert", image_id))
    })
}

/// Rename an image and/or set its description.
///
/// Returns None when the image does not exist for this user.
pub async fn update_image(
    pool: &SqlitePool,
    user_id: &str,
    image_id: i64,
    filename: Option<&str>,
    description: Option<&str>,
) -> Result<Option<Image>> {
    if get_image(pool, user_id, image_id).await?.is_none() {
        return Ok(None);
    }

    let now = format_timestamp(time::now());
    let mut tx = pool.begin().await?;

    if let Some(filename) = filename {
        sqlx::query("UPDATE images SET filename = ?, updated_at = ? WHERE id = ? AND user_id = ?")
            .bind(filename)
            .bind(&now)
            .bind(image_id)
            .bind(user_id)
            .execute(&mut *tx)
            .await?;
    }

    if let Some(description) = description {
        sqlx::query(
            r#"
            INSERT INTO image_metadata (image_id, user_id, description, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(image_id) DO UPDATE SET
                description = excluded.description,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(image_id)
        .bind(user_id)
        .bind(description)
        .bind(&now)
        .bind(&now)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;

    get_image(pool, user_id, image_id).await
}

/// Delete an image (metadata cascades), returning the deleted row
pub async fn delete_image(
    pool: &SqlitePool,
    user_id: &str,
    image_id: i64,
) -> Result<Option<Image>> {
    let Some(image) = get_image(pool, user_id, image_id).await? else {
        return Ok(None);
    };

    sqlx::query("DELETE FROM images WHERE id = ? AND user_id = ?")
        .bind(image_id)
        .bind(user_id)
        .execute(pool)
        .await?;

    tracing::debug!(image_id, user_id, "Image deleted");

    Ok(Some(image))
}
