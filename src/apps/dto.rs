use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    auth::dto::present,
    error::{AppError, AppResult},
};

/// Body of `POST /api/aplikasi/submit`.
#[derive(Debug, Default, Deserialize)]
pub struct SubmitApplicationRequest {
    pub nama: Option<String>,
    pub kategori: Option<String>,
    pub penjelasan: Option<String>,
    pub link: Option<String>,
    pub narahubung: Option<String>,
    pub developer: Option<String>,
    pub tahun_buat: Option<i32>,
}

/// Validated submission, ready to insert.
#[derive(Debug)]
pub struct NewSubmission<'a> {
    pub nama: &'a str,
    pub kategori: Option<&'a str>,
    pub penjelasan: Option<&'a str>,
    pub link: &'a str,
    pub narahubung: Option<&'a str>,
    pub developer: &'a str,
    pub tahun_buat: i32,
}

impl SubmitApplicationRequest {
    pub fn validate(&self) -> AppResult<NewSubmission<'_>> {
        let (Some(nama), Some(link), Some(developer), Some(tahun_buat)) = (
            present(&self.nama),
            present(&self.link),
            present(&self.developer),
            self.tahun_buat,
        ) else {
            return Err(AppError::validation(
                "Required data is incomplete (nama, link, developer, tahun_buat).",
            ));
        };
        Ok(NewSubmission {
            nama,
            kategori: present(&self.kategori),
            penjelasan: present(&self.penjelasan),
            link,
            narahubung: present(&self.narahubung),
            developer,
            tahun_buat,
        })
    }
}

#[derive(Debug, Serialize)]
pub struct SubmitApplicationResponse {
    pub message: String,
    pub id: Uuid,
}
