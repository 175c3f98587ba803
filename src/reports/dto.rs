use serde::Deserialize;
use uuid::Uuid;

use crate::{
    auth::dto::present,
    error::{AppError, AppResult},
};

/// Body of `POST /api/laporan`.
#[derive(Debug, Default, Deserialize)]
pub struct CreateReportRequest {
    pub id_app: Option<Uuid>,
    pub nama_aplikasi: Option<String>,
    pub jenis_laporan: Option<String>,
    pub keterangan: Option<String>,
    pub nama_pelapor: Option<String>,
}

#[derive(Debug)]
pub struct NewReport<'a> {
    pub id_app: Uuid,
    pub nama_aplikasi: Option<&'a str>,
    pub jenis_laporan: &'a str,
    pub keterangan: Option<&'a str>,
    pub nama_pelapor: &'a str,
}

impl CreateReportRequest {
    pub fn validate(&self) -> AppResult<NewReport<'_>> {
        let (Some(id_app), Some(jenis_laporan), Some(nama_pelapor)) = (
            self.id_app,
            present(&self.jenis_laporan),
            present(&self.nama_pelapor),
        ) else {
            return Err(AppError::validation(
                "Required data is incomplete (id_app, jenis_laporan, nama_pelapor).",
            ));
        };
        Ok(NewReport {
            id_app,
            nama_aplikasi: present(&self.nama_aplikasi),
            jenis_laporan,
            keterangan: present(&self.keterangan),
            nama_pelapor,
        })
    }
}
