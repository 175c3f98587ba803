use sqlx::PgPool;
use uuid::Uuid;

use super::dto::NewReport;

pub const STATUS_NEW: &str = "Baru";

pub async fn insert_report(db: &PgPool, report: &NewReport<'_>) -> sqlx::Result<Uuid> {
    let id = Uuid::new_v4();
    sqlx::query(
        r#"
        INSERT INTO report_apps
            (id, id_app, nama_aplikasi, jenis_laporan, keterangan, nama_pelapor, status_laporan)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        "#,
    )
    .bind(id)
    .bind(report.id_app)
    .bind(report.nama_aplikasi)
    .bind(report.jenis_laporan)
    .bind(report.keterangan)
    .bind(report.nama_pelapor)
    .bind(STATUS_NEW)
    .execute(db)
    .await?;
    Ok(id)
}

pub fn is_foreign_key_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.code().is_some_and(|code| code == "23503"),
        _ => false,
    }
}
