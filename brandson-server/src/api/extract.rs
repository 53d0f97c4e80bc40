//! Request extractors and query helpers with enveloped rejections

use axum::extract::{FromRequest, Request};
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::de::DeserializeOwned;
use shared::error::{AppError, AppResult};

/// `axum::Json` whose rejection is an [`AppError`] envelope
pub struct JsonBody<T>(pub T);

impl<T, S> FromRequest<S> for JsonBody<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        axum::Json::<T>::from_request(req, state)
            .await
            .map(|axum::Json(value)| JsonBody(value))
            .map_err(|rejection| AppError::invalid_request(rejection.body_text()))
    }
}

/// Parse an inclusive date bound: RFC 3339, or `YYYY-MM-DD` taken as the
/// start (`end_of_day == false`) or end of that UTC day
pub fn parse_date_bound(
    field: &str,
    raw: Option<&str>,
    end_of_day: bool,
) -> AppResult<Option<DateTime<Utc>>> {
    let Some(raw) = raw.map(str::trim).filter(|s| !s.is_empty()) else {
        return Ok(None);
    };
    if let Ok(at) = DateTime::parse_from_rfc3339(raw) {
        return Ok(Some(at.with_timezone(&Utc)));
    }
    let date = NaiveDate::parse_from_str(raw, "%Y-%m-%d").map_err(|_| {
        AppError::validation(format!("{field} must be a date (YYYY-MM-DD) or RFC 3339 timestamp"))
            .with_detail("field", field)
    })?;
    let time = if end_of_day {
        NaiveTime::from_hms_milli_opt(23, 59, 59, 999)
    } else {
        Some(NaiveTime::MIN)
    };
    Ok(time.map(|t| date.and_time(t).and_utc()))
}
