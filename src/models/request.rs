use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const MAX_ROOM_NUMBER_LEN: usize = 32;
pub const MAX_DESCRIPTION_LEN: usize = 2000;
pub const MAX_LABEL_LEN: usize = 128;

/// Where a request is in its handling. New rows start as `pending`; the
/// watcher moves them to `notified`, staff move them on from there.
#[derive(Debug, Serialize, Deserialize, sqlx::Type, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "text", rename_all = "snake_case")]
pub enum RequestStatus {
    #[default]
    Pending,
    Notified,
    InProgress,
    Completed,
}

impl RequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestStatus::Pending => "pending",
            RequestStatus::Notified => "notified",
            RequestStatus::InProgress => "in_progress",
            RequestStatus::Completed => "completed",
        }
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RequestStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "pending" => Ok(RequestStatus::Pending),
            "notified" => Ok(RequestStatus::Notified),
            "in_progress" => Ok(RequestStatus::InProgress),
            "completed" => Ok(RequestStatus::Completed),
            other => Err(ValidationError::Invalid {
                field: "status",
                value: other.to_string(),
            }),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, sqlx::Type, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "text", rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
}

impl FromStr for Priority {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "low" => Ok(Priority::Low),
            "medium" => Ok(Priority::Medium),
            "high" => Ok(Priority::High),
            other => Err(ValidationError::Invalid {
                field: "priority",
                value: other.to_string(),
            }),
        }
    }
}

/// A maintenance request row as stored in `requests`.
#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone, PartialEq, Eq)]
pub struct Request {
    pub id: i64,
    pub room_number: String,
    pub description: String,
    pub name: Option<String>,
    pub building: Option<String>,
    pub priority: Priority,
    pub status: RequestStatus,
    /// Assigned by the database at insert time.
    pub created_at: DateTime<Utc>,
}

/// Intake payload, shared by the HTML form, the JSON API and the CLI.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct NewRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub building: Option<String>,
    #[serde(default)]
    pub room_number: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub priority: Priority,
}

/// Body of `PUT /api/v1/requests/{id}`.
#[derive(Debug, Deserialize)]
pub struct StatusUpdate {
    pub status: RequestStatus,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("{0} is required")]
    Missing(&'static str),

    #[error("{field} must be at most {max} characters")]
    TooLong { field: &'static str, max: usize },

    #[error("{value:?} is not a valid {field}")]
    Invalid { field: &'static str, value: String },
}

impl NewRequest {
    /// Trim every field, drop empty optionals and enforce length limits.
    pub fn validate(self) -> Result<NewRequest, ValidationError> {
        let room_number = required("room_number", &self.room_number, MAX_ROOM_NUMBER_LEN)?;
        let description = required("description", &self.description, MAX_DESCRIPTION_LEN)?;
        let name = optional("name", self.name.as_deref(), MAX_LABEL_LEN)?;
        let building = optional("building", self.building.as_deref(), MAX_LABEL_LEN)?;

        Ok(NewRequest {
            name,
            building,
            room_number,
            description,
            priority: self.priority,
        })
    }
}

fn required(field: &'static str, value: &str, max: usize) -> Result<String, ValidationError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(ValidationError::Missing(field));
    }
    if value.chars().count() > max {
        return Err(ValidationError::TooLong { field, max });
    }
    Ok(value.to_string())
}

fn optional(
    field: &'static str,
    value: Option<&str>,
    max: usize,
) -> Result<Option<String>, ValidationError> {
    match value.map(str::trim) {
        None | Some("") => Ok(None),
        Some(v) if v.chars().count() > max => Err(ValidationError::TooLong { field, max }),
        Some(v) => Ok(Some(v.to_string())),
    }
}
