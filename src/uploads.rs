#![cfg(feature = "web")]
//! Upload metadata endpoints. Every route sits behind
//! [`crate::login::require_auth`].

use crate::app::SharedState;
use crate::error::ApiError;
use crate::login::CurrentUser;
use crate::store::{AnalysisDoc, Upload};
use axum::{
    Extension, Json,
    extract::{Path, State, rejection::JsonRejection},
};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::de::{self, DeserializeOwned, Deserializer, Unexpected};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Body of `POST /api/uploads`.
///
/// Fields are cast the way a loosely typed document schema would: counts may
/// arrive as numeric strings, dates in any common shape, columns as a single
/// value or null. A value that cannot be cast fails the request with a 500.
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewUpload {
    #[serde(default, deserialize_with = "cast_text")]
    pub file_name: Option<String>,
    #[serde(default, deserialize_with = "cast_date")]
    pub upload_date: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "cast_count")]
    pub row_count: Option<u64>,
    #[serde(default, deserialize_with = "cast_text_list")]
    pub columns: Vec<String>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewAnalysis {
    #[serde(default, deserialize_with = "cast_text")]
    pub x_axis: Option<String>,
    #[serde(default, deserialize_with = "cast_text")]
    pub y_axis: Option<String>,
    #[serde(default, deserialize_with = "cast_text")]
    pub chart_type: Option<String>,
    #[serde(default, deserialize_with = "cast_count")]
    pub data_points: Option<u64>,
    /// Defaults to the time the server received the analysis.
    #[serde(default, deserialize_with = "cast_date")]
    pub timestamp: Option<DateTime<Utc>>,
}

fn unexpected(value: &Value) -> Unexpected<'_> {
    match value {
        Value::Null => Unexpected::Unit,
        Value::Bool(b) => Unexpected::Bool(*b),
        Value::Number(_) => Unexpected::Other("number"),
        Value::String(s) => Unexpected::Str(s),
        Value::Array(_) => Unexpected::Seq,
        Value::Object(_) => Unexpected::Map,
    }
}

fn whole_number(n: f64) -> Option<u64> {
    (n.is_finite() && n >= 0.0 && n.fract() == 0.0 && n <= u64::MAX as f64).then_some(n as u64)
}

fn cast_count<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    let count = match &value {
        Value::Null => return Ok(None),
        Value::String(s) if s.trim().is_empty() => return Ok(None),
        Value::Bool(b) => Some(u64::from(*b)),
        Value::Number(n) => n.as_u64().or_else(|| n.as_f64().and_then(whole_number)),
        Value::String(s) => s.trim().parse::<f64>().ok().and_then(whole_number),
        _ => None,
    };
    count
        .map(Some)
        .ok_or_else(|| de::Error::invalid_value(unexpected(&value), &"a non-negative whole number"))
}

fn parse_date(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(date) = DateTime::parse_from_rfc3339(raw) {
        return Some(date.with_timezone(&Utc));
    }
    if let Ok(date) = DateTime::parse_from_rfc2822(raw) {
        return Some(date.with_timezone(&Utc));
    }
    // Dates without an offset are taken as UTC.
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|day| day.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

fn cast_date<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    let date = match &value {
        Value::Null => return Ok(None),
        Value::String(s) if s.trim().is_empty() => return Ok(None),
        Value::String(s) => parse_date(s),
        // Milliseconds since the epoch
        Value::Number(n) => n
            .as_f64()
            .filter(|ms| ms.is_finite())
            .and_then(|ms| DateTime::from_timestamp_millis(ms as i64)),
        _ => None,
    };
    date.map(Some)
        .ok_or_else(|| de::Error::invalid_value(unexpected(&value), &"a date"))
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn cast_text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    if value.is_null() {
        return Ok(None);
    }
    scalar_text(&value)
        .map(Some)
        .ok_or_else(|| de::Error::invalid_value(unexpected(&value), &"a text value"))
}

fn cast_text_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    let items: Vec<&Value> = match &value {
        Value::Null => return Ok(Vec::new()),
        Value::Array(items) => items.iter().filter(|item| !item.is_null()).collect(),
        single => vec![single],
    };
    items
        .into_iter()
        .map(|item| {
            scalar_text(item)
                .ok_or_else(|| de::Error::invalid_value(unexpected(item), &"a list of text values"))
        })
        .collect()
}

/// Casts a parsed JSON body. Failures are server errors, like a document
/// that fails to save.
fn cast_body<T: DeserializeOwned>(body: Value) -> Result<T, ApiError> {
    serde_json::from_value(body).map_err(|e| ApiError::Internal(format!("cast failed: {}", e)))
}

/// Owner reference of an upload: a bare id, or name and email resolved for
/// admin listings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OwnerRef {
    Resolved {
        #[serde(rename = "_id")]
        id: Uuid,
        name: String,
        email: String,
    },
    Id(Uuid),
}

impl OwnerRef {
    pub fn id(&self) -> Uuid {
        match self {
            OwnerRef::Resolved { id, .. } | OwnerRef::Id(id) => *id,
        }
    }
}

/// An upload document as sent to clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadView {
    #[serde(flatten)]
    pub upload: UploadFields,
    pub user: Option<OwnerRef>,
}

/// [`Upload`] without its owner, which [`UploadView`] renders separately.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadFields {
    #[serde(rename = "_id")]
    pub id: Uuid,
    pub file_name: Option<String>,
    pub upload_date: Option<DateTime<Utc>>,
    pub row_count: Option<u64>,
    pub columns: Vec<String>,
    pub analyses: Vec<AnalysisDoc>,
    pub created_at: DateTime<Utc>,
}

impl UploadView {
    fn new(upload: Upload, user: Option<OwnerRef>) -> Self {
        Self {
            upload: UploadFields {
                id: upload.id,
                file_name: upload.file_name,
                upload_date: upload.upload_date,
                row_count: upload.row_count,
                columns: upload.columns,
                analyses: upload.analyses,
                created_at: upload.created_at,
            },
            user,
        }
    }

    fn unresolved(upload: Upload) -> Self {
        let owner = upload.user;
        Self::new(upload, Some(OwnerRef::Id(owner)))
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UploadResponse {
    pub upload: UploadView,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UploadListResponse {
    pub uploads: Vec<UploadView>,
}

/// Path ids that do not parse are a server fault, not a missing document.
pub(crate) fn parse_id(raw: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(raw).map_err(|e| ApiError::Internal(format!("malformed id '{}': {}", raw, e)))
}

pub async fn create_upload(
    State(state): State<SharedState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<Json<UploadResponse>, ApiError> {
    let Json(body) = payload?;
    let body: NewUpload = cast_body(body)?;

    let upload = state.store.insert_upload(Upload {
        id: Uuid::new_v4(),
        user: user.id,
        file_name: body.file_name,
        upload_date: body.upload_date,
        row_count: body.row_count,
        columns: body.columns,
        analyses: Vec::new(),
        created_at: Utc::now(),
    })?;

    Ok(Json(UploadResponse {
        upload: UploadView::unresolved(upload),
    }))
}

/// Append an analysis to an upload
///
/// Only the owner or an admin may do this. The analysis records the acting
/// user, so an admin's addition to someone else's upload is attributed to the
/// admin.
///
/// # Returns
/// * 404 "Upload not found", checked before ownership
/// * 403 "Forbidden" for anyone else; the upload is left untouched
pub async fn add_analysis(
    State(state): State<SharedState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(id): Path<String>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<Json<UploadResponse>, ApiError> {
    let id = parse_id(&id)?;
    let Json(body) = payload?;
    let body: Result<NewAnalysis, ApiError> = cast_body(body);

    let updated = state.store.update_upload(id, |upload| {
        if upload.user != user.id && !user.is_admin() {
            return Err(ApiError::Forbidden("Forbidden"));
        }
        // Cast failures surface only once the caller may write.
        let body = body?;
        upload.analyses.push(AnalysisDoc {
            id: Uuid::new_v4(),
            user: user.id,
            x_axis: body.x_axis,
            y_axis: body.y_axis,
            chart_type: body.chart_type,
            data_points: body.data_points,
            timestamp: body.timestamp.unwrap_or_else(Utc::now),
        });
        Ok(())
    })?;

    let upload = updated.ok_or(ApiError::NotFound("Upload not found"))??;
    Ok(Json(UploadResponse {
        upload: UploadView::unresolved(upload),
    }))
}

/// Admins see every upload with the owner's name and email; everyone else
/// sees only their own.
pub async fn list_uploads(
    State(state): State<SharedState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
) -> Result<Json<UploadListResponse>, ApiError> {
    if !user.is_admin() {
        let uploads = state.store.list_uploads(Some(user.id))?;
        return Ok(Json(UploadListResponse {
            uploads: uploads.into_iter().map(UploadView::unresolved).collect(),
        }));
    }

    let mut uploads = Vec::new();
    for upload in state.store.list_uploads(None)? {
        // A deleted owner resolves to null.
        let owner = state.store.find_user(upload.user)?.map(|owner| OwnerRef::Resolved {
            id: owner.id,
            name: owner.name,
            email: owner.email,
        });
        uploads.push(UploadView::new(upload, owner));
    }
    Ok(Json(UploadListResponse { uploads }))
}
