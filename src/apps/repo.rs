use serde::Serialize;
use sqlx::{FromRow, PgPool};
use time::OffsetDateTime;
use uuid::Uuid;

use super::dto::NewSubmission;

pub const STATUS_ACTIVE: &str = "Aktif";
pub const STATUS_PENDING: &str = "Menunggu Persetujuan";

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Application {
    pub id: Uuid,
    pub nama: String,
    pub kategori: Option<String>,
    pub penjelasan: Option<String>,
    pub link: String,
    pub narahubung: Option<String>,
    pub developer: String,
    pub tahun_buat: i32,
    pub status_aplikasi: String,
    pub flag_view: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// Active, visible applications ordered by name.
pub async fn list_active(db: &PgPool) -> sqlx::Result<Vec<Application>> {
    sqlx::query_as::<_, Application>(
        r#"
        SELECT id, nama, kategori, penjelasan, link, narahubung, developer,
               tahun_buat, status_aplikasi, flag_view, created_at
          FROM applications
         WHERE status_aplikasi = $1 AND flag_view = TRUE
         ORDER BY nama ASC
        "#,
    )
    .bind(STATUS_ACTIVE)
    .fetch_all(db)
    .await
}

pub async fn insert_submission(db: &PgPool, sub: &NewSubmission<'_>) -> sqlx::Result<Uuid> {
    let id = Uuid::new_v4();
    sqlx::query(
        r#"
        INSERT INTO add_apps
            (id, nama, kategori, penjelasan, link, narahubung, developer, tahun_buat, status_aplikasi)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        "#,
    )
    .bind(id)
    .bind(sub.nama)
    .bind(sub.kategori)
    .bind(sub.penjelasan)
    .bind(sub.link)
    .bind(sub.narahubung)
    .bind(sub.developer)
    .bind(sub.tahun_buat)
    .bind(STATUS_PENDING)
    .execute(db)
    .await?;
    Ok(id)
}
