use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;

#[derive(Clone, FromRow, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectRow {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub system_count: i64,
}

#[derive(Clone, FromRow, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemRow {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub subject_id: String,
    pub subject_name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub marks_count: i64,
}

#[derive(Clone, FromRow, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MarksRow {
    pub id: String,
    pub value: i64,
    pub description: Option<String>,
    pub system_id: String,
    pub subject_id: String,
    pub system_name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub question_count: i64,
}

/// Marks reference embedded in question payloads.
#[derive(Clone, FromRow, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MarksRef {
    pub id: String,
    pub value: i64,
    pub system_id: String,
}

#[derive(Clone, FromRow, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionRow {
    pub id: String,
    pub title: String,
    pub content: Option<String>,
    pub terminologies: Option<String>,
    pub repeat_count: i64,
    pub years_appeared: String,
    pub last_appeared_year: Option<i64>,
    pub global_importance: i64,
    pub calculated_score: f64,
    pub marks_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone, FromRow, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionListRow {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub question: QuestionRow,
    pub file_count: i64,
}

/// Question with its catalog context, used for featured listings.
#[derive(Clone, FromRow, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeaturedQuestionRow {
    pub id: String,
    pub title: String,
    pub repeat_count: i64,
    pub calculated_score: f64,
    pub global_importance: i64,
    pub years_appeared: String,
    pub marks_value: i64,
    pub system_name: String,
    pub subject_name: String,
    pub file_count: i64,
}

#[derive(Clone, FromRow, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecentSubjectRow {
    pub id: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, FromRow, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecentQuestionRow {
    pub id: String,
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub repeat_count: i64,
    pub calculated_score: f64,
    pub marks_value: i64,
    pub system_name: String,
    pub subject_name: String,
}

#[derive(Clone, FromRow, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FolderRow {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub color: String,
    pub icon: String,
    pub question_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub file_count: i64,
}

#[derive(Clone, FromRow, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileRow {
    pub id: String,
    pub name: String,
    pub original_name: String,
    pub mime_type: String,
    pub size: i64,
    pub path: String,
    pub question_id: String,
    pub folder_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
