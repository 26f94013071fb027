use std::sync::Arc;

use bytes::Bytes;
use chrono::Utc;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::catalog::DataFormat;
use crate::config::{Config, EngineConfig};
use crate::database::PgSessionStore;
use crate::datafusion_engine::QueryExecutor;
use crate::domain::{
    AnalysisResponse, AnalysisResult, ChatTurn, Dataset, DatasetSummary, QueryOutput,
    SessionSummary,
};
use crate::error::AnalysisError;
use crate::generation::{GeminiClient, SqlGenerationAdapter};
use crate::loader::{FormatLoaders, LoadedTable};
use crate::profiler::profile;
use crate::prompt::build_prompt;
use crate::report;
use crate::sanitizer::sanitize;
use crate::store::{MemorySessionStore, SessionStore};

pub struct AnalysisEngine {
    loaders: FormatLoaders,
    generator: SqlGenerationAdapter,
    executor: QueryExecutor,
    store: Arc<dyn SessionStore>,
    max_upload_bytes: usize,
}

impl AnalysisEngine {
    pub async fn new(config: Config) -> Result<Self, AnalysisError> {
        info!("Initializing Analysis Engine");

        let timeout = config.generation.timeout;
        let client = GeminiClient::new(config.generation)?;

        let store: Arc<dyn SessionStore> = match &config.database_url {
            Some(database_url) => {
                info!("Using PostgreSQL session store");
                Arc::new(PgSessionStore::new(database_url).await?)
            }
            None => {
                info!("Using in-memory session store");
                Arc::new(MemorySessionStore::new())
            }
        };

        let engine = Self::with_components(
            FormatLoaders::default(),
            SqlGenerationAdapter::new(Arc::new(client), timeout),
            store,
            &config.engine,
        )?;

        info!("Analysis Engine initialized successfully");
        Ok(engine)
    }

    pub fn with_components(
        loaders: FormatLoaders,
        generator: SqlGenerationAdapter,
        store: Arc<dyn SessionStore>,
        engine_config: &EngineConfig,
    ) -> Result<Self, AnalysisError> {
        Ok(Self {
            loaders,
            generator,
            executor: QueryExecutor::new(engine_config)?,
            store,
            max_upload_bytes: engine_config.max_upload_bytes,
        })
    }

    pub fn executor(&self) -> &QueryExecutor {
        &self.executor
    }

    /// Registers an uploaded file as a new dataset in the session and answers the question.
    pub async fn analyze(
        &self,
        file_bytes: Bytes,
        filename: &str,
        question: &str,
        session_id: &str,
    ) -> Result<AnalysisResponse, AnalysisError> {
        require("file name", filename)?;
        require("question", question)?;
        require("session id", session_id)?;
        if file_bytes.len() > self.max_upload_bytes {
            return Err(AnalysisError::InvalidInput {
                message: format!(
                    "File '{}' is {} bytes, larger than the {} byte upload limit",
                    filename,
                    file_bytes.len(),
                    self.max_upload_bytes
                ),
            });
        }

        let format = DataFormat::from_filename(filename)?;
        let table = self.loaders.load(&file_bytes, format)?;
        let table_profile = profile(&table);

        let dataset = Dataset {
            id: Dataset::new_id(),
            session_id: session_id.to_string(),
            filename: filename.to_string(),
            format,
            columns: table_profile.columns,
            row_count: table_profile.row_count,
            preview: table_profile.preview,
            source: file_bytes,
            created_at: Utc::now(),
        };

        self.store.create_session(session_id).await?;
        self.store.register_dataset(&dataset).await?;
        info!(
            "Registered dataset {} ({}, {} rows) in session {}",
            dataset.id, dataset.filename, dataset.row_count, session_id
        );

        self.answer(&dataset, question, move || Ok(table)).await
    }

    /// Answers a question against a dataset already registered in the session.
    pub async fn ask(
        &self,
        session_id: &str,
        dataset_id: &str,
        question: &str,
    ) -> Result<AnalysisResponse, AnalysisError> {
        require("question", question)?;

        let dataset = self
            .store
            .get_dataset(dataset_id)
            .await?
            .filter(|dataset| dataset.session_id == session_id)
            .ok_or_else(|| AnalysisError::DatasetNotFound {
                dataset_id: dataset_id.to_string(),
            })?;

        let loaders = &self.loaders;
        let source = dataset.source.clone();
        let format = dataset.format;
        self.answer(&dataset, question, move || {
            loaders.load(&source, format).map_err(AnalysisError::from)
        })
        .await
    }

    pub async fn list_history(&self, session_id: &str) -> Result<Vec<ChatTurn>, AnalysisError> {
        self.store.list_chat_turns(session_id).await
    }

    pub async fn list_datasets(
        &self,
        session_id: &str,
    ) -> Result<Vec<DatasetSummary>, AnalysisError> {
        self.store.list_datasets(session_id).await
    }

    pub async fn create_session(&self) -> Result<String, AnalysisError> {
        let session_id = Uuid::new_v4().to_string();
        self.store.create_session(&session_id).await?;
        info!("Created session {}", session_id);
        Ok(session_id)
    }

    pub async fn list_sessions(&self) -> Result<Vec<SessionSummary>, AnalysisError> {
        self.store.list_sessions().await
    }

    pub async fn session_exists(&self, session_id: &str) -> Result<bool, AnalysisError> {
        self.store.session_exists(session_id).await
    }

    pub async fn delete_session(&self, session_id: &str) -> Result<(), AnalysisError> {
        let dataset_ids = self.store.delete_session(session_id).await?;
        self.executor.evict(&dataset_ids).await;
        info!(
            "Deleted session {} with {} datasets",
            session_id,
            dataset_ids.len()
        );
        Ok(())
    }

    pub async fn delete_dataset(
        &self,
        session_id: &str,
        dataset_id: &str,
    ) -> Result<(), AnalysisError> {
        if !self.store.delete_dataset(session_id, dataset_id).await? {
            return Err(AnalysisError::DatasetNotFound {
                dataset_id: dataset_id.to_string(),
            });
        }
        self.executor.evict(&[dataset_id.to_string()]).await;
        Ok(())
    }

    /// Runs generation and execution, recording the turn whether or not it succeeds.
    async fn answer<F>(
        &self,
        dataset: &Dataset,
        question: &str,
        load: F,
    ) -> Result<AnalysisResponse, AnalysisError>
    where
        F: FnOnce() -> Result<LoadedTable, AnalysisError>,
    {
        let mut sql_query = None;
        let outcome = self.run_query(dataset, question, load, &mut sql_query).await;

        let (result, report, outcome) = match outcome {
            Ok(output) => {
                let result = AnalysisResult::success(sql_query.unwrap_or_default(), output);
                let report = report::render(question, dataset, &result);
                (result, report, Ok(()))
            }
            Err(err) => {
                warn!("Analysis on dataset {} failed: {}", dataset.id, err);
                let message = err.to_string();
                let report = report::render_error(&message);
                (AnalysisResult::failure(sql_query, message), report, Err(err))
            }
        };

        let turn = ChatTurn {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            session_id: dataset.session_id.clone(),
            dataset_id: dataset.id.clone(),
            filename: dataset.filename.clone(),
            question: question.to_string(),
            result,
            report,
        };

        if let Err(store_err) = self.store.append_chat_turn(&turn).await {
            error!("Failed to record chat turn {}: {}", turn.id, store_err);
            // the analysis error takes precedence over the storage error
            outcome?;
            return Err(store_err);
        }
        outcome?;

        Ok(AnalysisResponse {
            turn_id: turn.id,
            dataset_id: turn.dataset_id,
            result: turn.result,
            report: turn.report,
        })
    }

    async fn run_query<F>(
        &self,
        dataset: &Dataset,
        question: &str,
        load: F,
        sql_query: &mut Option<String>,
    ) -> Result<QueryOutput, AnalysisError>
    where
        F: FnOnce() -> Result<LoadedTable, AnalysisError>,
    {
        let store = self.executor.store_for(&dataset.id, load).await?;

        let prompt = build_prompt(dataset, question);
        let generated = self.generator.generate(&prompt.render()).await?;
        *sql_query = Some(generated.trim().to_string());

        let statement = sanitize(&generated)?;
        info!("Sanitized statement for dataset {}: {}", dataset.id, statement);
        *sql_query = Some(statement.clone());

        Ok(self.executor.execute(&store, &statement).await?)
    }
}

fn require(field: &str, value: &str) -> Result<(), AnalysisError> {
    if value.trim().is_empty() {
        return Err(AnalysisError::InvalidInput {
            message: format!("{} must not be empty", field),
        });
    }
    Ok(())
}
