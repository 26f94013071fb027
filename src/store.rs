use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::debug;

use crate::domain::{ChatTurn, Dataset, DatasetSummary, SessionSummary};
use crate::error::AnalysisError;

/// Persistence collaborator for sessions, their datasets and chat history.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Creates the session if it does not exist yet.
    async fn create_session(&self, session_id: &str) -> Result<(), AnalysisError>;

    async fn session_exists(&self, session_id: &str) -> Result<bool, AnalysisError>;

    async fn register_dataset(&self, dataset: &Dataset) -> Result<(), AnalysisError>;

    async fn get_dataset(&self, dataset_id: &str) -> Result<Option<Dataset>, AnalysisError>;

    /// Oldest first.
    async fn list_datasets(&self, session_id: &str) -> Result<Vec<DatasetSummary>, AnalysisError>;

    async fn append_chat_turn(&self, turn: &ChatTurn) -> Result<(), AnalysisError>;

    /// Oldest first.
    async fn list_chat_turns(&self, session_id: &str) -> Result<Vec<ChatTurn>, AnalysisError>;

    /// Most recently updated first.
    async fn list_sessions(&self) -> Result<Vec<SessionSummary>, AnalysisError>;

    /// Removes the session with its datasets and turns, returning the removed dataset ids.
    async fn delete_session(&self, session_id: &str) -> Result<Vec<String>, AnalysisError>;

    /// Returns false when the dataset does not belong to the session.
    async fn delete_dataset(&self, session_id: &str, dataset_id: &str)
        -> Result<bool, AnalysisError>;
}

struct SessionRecord {
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    dataset_ids: Vec<String>,
    turns: Vec<ChatTurn>,
}

#[derive(Default)]
struct MemoryState {
    sessions: HashMap<String, SessionRecord>,
    datasets: HashMap<String, Dataset>,
}

/// Process-local store used when no database is configured.
#[derive(Default)]
pub struct MemorySessionStore {
    state: RwLock<MemoryState>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn session_not_found(session_id: &str) -> AnalysisError {
    AnalysisError::SessionNotFound {
        session_id: session_id.to_string(),
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn create_session(&self, session_id: &str) -> Result<(), AnalysisError> {
        let mut state = self.state.write().await;
        state.sessions.entry(session_id.to_string()).or_insert_with(|| {
            let now = Utc::now();
            debug!("Created session {}", session_id);
            SessionRecord {
                created_at: now,
                updated_at: now,
                dataset_ids: Vec::new(),
                turns: Vec::new(),
            }
        });
        Ok(())
    }

    async fn session_exists(&self, session_id: &str) -> Result<bool, AnalysisError> {
        Ok(self.state.read().await.sessions.contains_key(session_id))
    }

    async fn register_dataset(&self, dataset: &Dataset) -> Result<(), AnalysisError> {
        let mut state = self.state.write().await;
        let session = state
            .sessions
            .get_mut(&dataset.session_id)
            .ok_or_else(|| session_not_found(&dataset.session_id))?;
        session.dataset_ids.push(dataset.id.clone());
        session.updated_at = Utc::now();
        state.datasets.insert(dataset.id.clone(), dataset.clone());
        Ok(())
    }

    async fn get_dataset(&self, dataset_id: &str) -> Result<Option<Dataset>, AnalysisError> {
        Ok(self.state.read().await.datasets.get(dataset_id).cloned())
    }

    async fn list_datasets(&self, session_id: &str) -> Result<Vec<DatasetSummary>, AnalysisError> {
        let state = self.state.read().await;
        let session = state
            .sessions
            .get(session_id)
            .ok_or_else(|| session_not_found(session_id))?;
        Ok(session
            .dataset_ids
            .iter()
            .filter_map(|id| state.datasets.get(id))
            .map(Dataset::summary)
            .collect())
    }

    async fn append_chat_turn(&self, turn: &ChatTurn) -> Result<(), AnalysisError> {
        let mut state = self.state.write().await;
        let session = state
            .sessions
            .get_mut(&turn.session_id)
            .ok_or_else(|| session_not_found(&turn.session_id))?;
        session.turns.push(turn.clone());
        session.updated_at = turn.timestamp;
        Ok(())
    }

    async fn list_chat_turns(&self, session_id: &str) -> Result<Vec<ChatTurn>, AnalysisError> {
        let state = self.state.read().await;
        state
            .sessions
            .get(session_id)
            .map(|session| session.turns.clone())
            .ok_or_else(|| session_not_found(session_id))
    }

    async fn list_sessions(&self) -> Result<Vec<SessionSummary>, AnalysisError> {
        let state = self.state.read().await;
        let mut summaries: Vec<SessionSummary> = state
            .sessions
            .iter()
            .map(|(id, session)| SessionSummary {
                id: id.clone(),
                created_at: session.created_at,
                updated_at: session.updated_at,
                chat_count: session.turns.len(),
                latest_question: session.turns.last().map(|t| t.question.clone()),
            })
            .collect();
        summaries.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(summaries)
    }

    async fn delete_session(&self, session_id: &str) -> Result<Vec<String>, AnalysisError> {
        let mut state = self.state.write().await;
        let session = state
            .sessions
            .remove(session_id)
            .ok_or_else(|| session_not_found(session_id))?;
        for dataset_id in &session.dataset_ids {
            state.datasets.remove(dataset_id);
        }
        Ok(session.dataset_ids)
    }

    async fn delete_dataset(
        &self,
        session_id: &str,
        dataset_id: &str,
    ) -> Result<bool, AnalysisError> {
        let mut state = self.state.write().await;
        let owned = state
            .datasets
            .get(dataset_id)
            .is_some_and(|d| d.session_id == session_id);
        if !owned {
            return Ok(false);
        }
        state.datasets.remove(dataset_id);
        if let Some(session) = state.sessions.get_mut(session_id) {
            session.dataset_ids.retain(|id| id != dataset_id);
            session.updated_at = Utc::now();
        }
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use uuid::Uuid;

    use super::*;
    use crate::catalog::DataFormat;
    use crate::domain::AnalysisResult;

    fn dataset(session_id: &str, filename: &str) -> Dataset {
        Dataset {
            id: Dataset::new_id(),
            session_id: session_id.to_string(),
            filename: filename.to_string(),
            format: DataFormat::Csv,
            columns: Vec::new(),
            row_count: 0,
            preview: Vec::new(),
            source: Bytes::from_static(b"a\n1\n"),
            created_at: Utc::now(),
        }
    }

    fn turn(dataset: &Dataset, question: &str) -> ChatTurn {
        ChatTurn {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            session_id: dataset.session_id.clone(),
            dataset_id: dataset.id.clone(),
            filename: dataset.filename.clone(),
            question: question.to_string(),
            result: AnalysisResult::default(),
            report: String::new(),
        }
    }

    #[tokio::test]
    async fn keeps_turns_in_order_and_summarises_sessions() {
        let store = MemorySessionStore::new();
        store.create_session("s1").await.unwrap();
        store.create_session("s2").await.unwrap();
        store.create_session("s1").await.unwrap();

        let ds = dataset("s1", "a.csv");
        store.register_dataset(&ds).await.unwrap();
        store.append_chat_turn(&turn(&ds, "first")).await.unwrap();
        store.append_chat_turn(&turn(&ds, "second")).await.unwrap();

        let turns = store.list_chat_turns("s1").await.unwrap();
        let questions: Vec<&str> = turns.iter().map(|t| t.question.as_str()).collect();
        assert_eq!(questions, vec!["first", "second"]);

        let sessions = store.list_sessions().await.unwrap();
        assert_eq!(sessions.len(), 2);
        assert_eq!(sessions[0].id, "s1");
        assert_eq!(sessions[0].chat_count, 2);
        assert_eq!(sessions[0].latest_question.as_deref(), Some("second"));
    }

    #[tokio::test]
    async fn datasets_require_an_existing_session() {
        let store = MemorySessionStore::new();
        let err = store
            .register_dataset(&dataset("missing", "a.csv"))
            .await
            .unwrap_err();
        assert!(matches!(err, AnalysisError::SessionNotFound { .. }));
    }

    #[tokio::test]
    async fn deletes_cascade_to_datasets() {
        let store = MemorySessionStore::new();
        store.create_session("s1").await.unwrap();
        let first = dataset("s1", "a.csv");
        let second = dataset("s1", "b.csv");
        store.register_dataset(&first).await.unwrap();
        store.register_dataset(&second).await.unwrap();

        assert!(!store.delete_dataset("other", &first.id).await.unwrap());
        assert!(store.delete_dataset("s1", &first.id).await.unwrap());
        let remaining = store.list_datasets("s1").await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].filename, "b.csv");

        let removed = store.delete_session("s1").await.unwrap();
        assert_eq!(removed, vec![second.id.clone()]);
        assert!(store.get_dataset(&second.id).await.unwrap().is_none());
        assert!(!store.session_exists("s1").await.unwrap());
    }
}
