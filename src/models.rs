use bytes::Bytes;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::catalog::DataFormat;
use crate::domain::{
    AnalysisResult, ChatTurn, ColumnSchema, Dataset, DatasetSummary, Row, TypedValue,
};
use crate::error::AnalysisError;
use crate::schema::{chat_turns, datasets, sessions};

#[derive(Queryable, Selectable, Identifiable, Debug, Clone)]
#[diesel(table_name = sessions)]
#[diesel(primary_key(id))]
pub struct SessionModel {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Insertable)]
#[diesel(table_name = sessions)]
pub struct NewSession<'a> {
    pub id: &'a str,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Queryable, Selectable, Identifiable, Associations, Debug, Clone)]
#[diesel(table_name = datasets)]
#[diesel(belongs_to(SessionModel, foreign_key = session_id))]
#[diesel(primary_key(id))]
pub struct DatasetModel {
    pub id: String,
    pub session_id: String,
    pub filename: String,
    pub format: String,
    pub column_schema: serde_json::Value,
    pub row_count: i64,
    pub preview: serde_json::Value,
    pub source: Vec<u8>,
    pub created_at: DateTime<Utc>,
}

/// Listing projection that leaves the source bytes in the database.
#[derive(Queryable, Selectable, Debug, Clone)]
#[diesel(table_name = datasets)]
pub struct DatasetSummaryModel {
    pub id: String,
    pub filename: String,
    pub format: String,
    pub column_schema: serde_json::Value,
    pub row_count: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Insertable)]
#[diesel(table_name = datasets)]
pub struct NewDataset<'a> {
    pub id: &'a str,
    pub session_id: &'a str,
    pub filename: &'a str,
    pub format: &'a str,
    pub column_schema: serde_json::Value,
    pub row_count: i64,
    pub preview: serde_json::Value,
    pub source: &'a [u8],
    pub created_at: DateTime<Utc>,
}

#[derive(Queryable, Selectable, Identifiable, Associations, Debug, Clone)]
#[diesel(table_name = chat_turns)]
#[diesel(belongs_to(SessionModel, foreign_key = session_id))]
#[diesel(primary_key(id))]
pub struct ChatTurnModel {
    pub id: Uuid,
    pub session_id: String,
    pub dataset_id: String,
    pub filename: String,
    pub question: String,
    pub result: serde_json::Value,
    pub report: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Insertable)]
#[diesel(table_name = chat_turns)]
pub struct NewChatTurn<'a> {
    pub id: Uuid,
    pub session_id: &'a str,
    pub dataset_id: &'a str,
    pub filename: &'a str,
    pub question: &'a str,
    pub result: serde_json::Value,
    pub report: &'a str,
    pub created_at: DateTime<Utc>,
}

/// JSONB reorders object keys, so rows are stored as `[[column, typed value], ...]`.
#[derive(Debug, Serialize, Deserialize)]
struct StoredRow(Vec<(String, TypedValue)>);

impl From<&Row> for StoredRow {
    fn from(row: &Row) -> Self {
        StoredRow(
            row.iter()
                .map(|(column, value)| (column.to_string(), TypedValue::from(value)))
                .collect(),
        )
    }
}

impl From<StoredRow> for Row {
    fn from(stored: StoredRow) -> Self {
        stored
            .0
            .into_iter()
            .map(|(column, value)| (column, value.into()))
            .collect()
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct StoredResult {
    sql_query: String,
    columns: Vec<String>,
    data: Vec<StoredRow>,
    row_count: usize,
    error: Option<String>,
}

fn rows_to_json(rows: &[Row]) -> Result<serde_json::Value, AnalysisError> {
    let stored: Vec<StoredRow> = rows.iter().map(StoredRow::from).collect();
    Ok(serde_json::to_value(stored)?)
}

fn rows_from_json(value: serde_json::Value) -> Result<Vec<Row>, AnalysisError> {
    let stored: Vec<StoredRow> = serde_json::from_value(value)?;
    Ok(stored.into_iter().map(Row::from).collect())
}

fn result_to_json(result: &AnalysisResult) -> Result<serde_json::Value, AnalysisError> {
    Ok(serde_json::to_value(StoredResult {
        sql_query: result.sql_query.clone(),
        columns: result.columns.clone(),
        data: result.data.iter().map(StoredRow::from).collect(),
        row_count: result.row_count,
        error: result.error.clone(),
    })?)
}

fn result_from_json(value: serde_json::Value) -> Result<AnalysisResult, AnalysisError> {
    let stored: StoredResult = serde_json::from_value(value)?;
    Ok(AnalysisResult {
        sql_query: stored.sql_query,
        columns: stored.columns,
        data: stored.data.into_iter().map(Row::from).collect(),
        row_count: stored.row_count,
        error: stored.error,
    })
}

fn parse_format(tag: &str) -> Result<DataFormat, AnalysisError> {
    DataFormat::parse(tag).ok_or_else(|| AnalysisError::StorageError {
        message: format!("Unknown stored dataset format '{}'", tag),
    })
}

impl<'a> NewDataset<'a> {
    pub fn from_dataset(dataset: &'a Dataset) -> Result<Self, AnalysisError> {
        Ok(Self {
            id: &dataset.id,
            session_id: &dataset.session_id,
            filename: &dataset.filename,
            format: dataset.format.as_str(),
            column_schema: serde_json::to_value(&dataset.columns)?,
            row_count: dataset.row_count as i64,
            preview: rows_to_json(&dataset.preview)?,
            source: &dataset.source,
            created_at: dataset.created_at,
        })
    }
}

impl TryFrom<DatasetModel> for Dataset {
    type Error = AnalysisError;

    fn try_from(model: DatasetModel) -> Result<Self, Self::Error> {
        Ok(Dataset {
            format: parse_format(&model.format)?,
            columns: serde_json::from_value(model.column_schema)?,
            preview: rows_from_json(model.preview)?,
            row_count: model.row_count.max(0) as usize,
            source: Bytes::from(model.source),
            id: model.id,
            session_id: model.session_id,
            filename: model.filename,
            created_at: model.created_at,
        })
    }
}

impl TryFrom<DatasetSummaryModel> for DatasetSummary {
    type Error = AnalysisError;

    fn try_from(model: DatasetSummaryModel) -> Result<Self, Self::Error> {
        let columns: Vec<ColumnSchema> = serde_json::from_value(model.column_schema)?;
        Ok(DatasetSummary {
            format: parse_format(&model.format)?,
            column_count: columns.len(),
            row_count: model.row_count.max(0) as usize,
            id: model.id,
            filename: model.filename,
            created_at: model.created_at,
        })
    }
}

impl<'a> NewChatTurn<'a> {
    pub fn from_turn(turn: &'a ChatTurn) -> Result<Self, AnalysisError> {
        Ok(Self {
            id: turn.id,
            session_id: &turn.session_id,
            dataset_id: &turn.dataset_id,
            filename: &turn.filename,
            question: &turn.question,
            result: result_to_json(&turn.result)?,
            report: &turn.report,
            created_at: turn.timestamp,
        })
    }
}

impl TryFrom<ChatTurnModel> for ChatTurn {
    type Error = AnalysisError;

    fn try_from(model: ChatTurnModel) -> Result<Self, Self::Error> {
        Ok(ChatTurn {
            result: result_from_json(model.result)?,
            id: model.id,
            timestamp: model.created_at,
            session_id: model.session_id,
            dataset_id: model.dataset_id,
            filename: model.filename,
            question: model.question,
            report: model.report,
        })
    }
}
