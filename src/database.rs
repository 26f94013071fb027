use async_trait::async_trait;
use chrono::Utc;
use diesel::prelude::*;
use diesel_async::{
    pooled_connection::{
        deadpool::{Object, Pool},
        AsyncDieselConnectionManager,
    },
    AsyncConnection, AsyncPgConnection, RunQueryDsl,
};
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};
use tracing::{debug, info};

use crate::domain::{ChatTurn, Dataset, DatasetSummary, SessionSummary};
use crate::error::AnalysisError;
use crate::models::*;
use crate::schema::*;
use crate::store::SessionStore;

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

/// PostgreSQL-backed `SessionStore`.
#[derive(Clone)]
pub struct PgSessionStore {
    pool: Pool<AsyncPgConnection>,
}

impl PgSessionStore {
    pub async fn new(database_url: &str) -> Result<Self, AnalysisError> {
        let config = AsyncDieselConnectionManager::<AsyncPgConnection>::new(database_url);
        let pool = Pool::builder(config)
            .build()
            .map_err(|e| AnalysisError::ConfigError {
                message: format!("Failed to create database pool: {}", e),
            })?;

        let store = Self { pool };
        store.run_migrations(database_url).await?;

        Ok(store)
    }

    /// diesel_migrations only drives synchronous connections.
    pub async fn run_migrations(&self, database_url: &str) -> Result<(), AnalysisError> {
        let database_url = database_url.to_string();
        tokio::task::spawn_blocking(move || {
            use diesel::Connection;
            use diesel::PgConnection;

            let mut connection = PgConnection::establish(&database_url).map_err(|e| {
                AnalysisError::ConfigError {
                    message: format!("Failed to establish connection for migrations: {}", e),
                }
            })?;

            let applied = connection
                .run_pending_migrations(MIGRATIONS)
                .map_err(|e| AnalysisError::ConfigError {
                    message: format!("Failed to run migrations: {}", e),
                })?;
            info!("Applied {} pending migrations", applied.len());
            Ok(())
        })
        .await
        .map_err(|e| AnalysisError::InternalError {
            message: format!("Migration task panicked: {}", e),
        })?
    }

    async fn conn(&self) -> Result<Object<AsyncPgConnection>, AnalysisError> {
        self.pool.get().await.map_err(|e| AnalysisError::StorageError {
            message: format!("Failed to get database connection: {}", e),
        })
    }
}

#[async_trait]
impl SessionStore for PgSessionStore {
    async fn create_session(&self, session_id: &str) -> Result<(), AnalysisError> {
        let mut conn = self.conn().await?;
        let now = Utc::now();

        let inserted = diesel::insert_into(sessions::table)
            .values(&NewSession {
                id: session_id,
                created_at: now,
                updated_at: now,
            })
            .on_conflict_do_nothing()
            .execute(&mut conn)
            .await?;

        if inserted > 0 {
            debug!("Created session {}", session_id);
        }
        Ok(())
    }

    async fn session_exists(&self, session_id: &str) -> Result<bool, AnalysisError> {
        let mut conn = self.conn().await?;
        let found = diesel::select(diesel::dsl::exists(
            sessions::table.filter(sessions::id.eq(session_id)),
        ))
        .get_result::<bool>(&mut conn)
        .await?;
        Ok(found)
    }

    async fn register_dataset(&self, dataset: &Dataset) -> Result<(), AnalysisError> {
        info!(
            "Registering dataset {} ({}) in session {}",
            dataset.id, dataset.filename, dataset.session_id
        );
        let new_dataset = NewDataset::from_dataset(dataset)?;
        let mut conn = self.conn().await?;

        conn.transaction::<_, AnalysisError, _>(|conn| {
            Box::pin(async move {
                let touched = diesel::update(sessions::table.find(new_dataset.session_id))
                    .set(sessions::updated_at.eq(Utc::now()))
                    .execute(conn)
                    .await?;
                if touched == 0 {
                    return Err(AnalysisError::SessionNotFound {
                        session_id: new_dataset.session_id.to_string(),
                    });
                }

                diesel::insert_into(datasets::table)
                    .values(&new_dataset)
                    .execute(conn)
                    .await?;
                Ok(())
            })
        })
        .await
    }

    async fn get_dataset(&self, dataset_id: &str) -> Result<Option<Dataset>, AnalysisError> {
        let mut conn = self.conn().await?;
        let model = datasets::table
            .find(dataset_id)
            .select(DatasetModel::as_select())
            .get_result(&mut conn)
            .await
            .optional()?;

        model.map(Dataset::try_from).transpose()
    }

    async fn list_datasets(&self, session_id: &str) -> Result<Vec<DatasetSummary>, AnalysisError> {
        if !self.session_exists(session_id).await? {
            return Err(AnalysisError::SessionNotFound {
                session_id: session_id.to_string(),
            });
        }

        let mut conn = self.conn().await?;
        let models = datasets::table
            .filter(datasets::session_id.eq(session_id))
            .order(datasets::created_at.asc())
            .select(DatasetSummaryModel::as_select())
            .get_results(&mut conn)
            .await?;

        models.into_iter().map(DatasetSummary::try_from).collect()
    }

    async fn append_chat_turn(&self, turn: &ChatTurn) -> Result<(), AnalysisError> {
        let new_turn = NewChatTurn::from_turn(turn)?;
        let mut conn = self.conn().await?;

        conn.transaction::<_, AnalysisError, _>(|conn| {
            Box::pin(async move {
                let touched = diesel::update(sessions::table.find(new_turn.session_id))
                    .set(sessions::updated_at.eq(new_turn.created_at))
                    .execute(conn)
                    .await?;
                if touched == 0 {
                    return Err(AnalysisError::SessionNotFound {
                        session_id: new_turn.session_id.to_string(),
                    });
                }

                diesel::insert_into(chat_turns::table)
                    .values(&new_turn)
                    .execute(conn)
                    .await?;
                Ok(())
            })
        })
        .await?;

        debug!("Stored chat turn {} for session {}", turn.id, turn.session_id);
        Ok(())
    }

    async fn list_chat_turns(&self, session_id: &str) -> Result<Vec<ChatTurn>, AnalysisError> {
        if !self.session_exists(session_id).await? {
            return Err(AnalysisError::SessionNotFound {
                session_id: session_id.to_string(),
            });
        }

        let mut conn = self.conn().await?;
        let models = chat_turns::table
            .filter(chat_turns::session_id.eq(session_id))
            .order(chat_turns::created_at.asc())
            .select(ChatTurnModel::as_select())
            .get_results(&mut conn)
            .await?;

        models.into_iter().map(ChatTurn::try_from).collect()
    }

    async fn list_sessions(&self) -> Result<Vec<SessionSummary>, AnalysisError> {
        let mut conn = self.conn().await?;
        let session_models = sessions::table
            .order(sessions::updated_at.desc())
            .select(SessionModel::as_select())
            .get_results(&mut conn)
            .await?;

        let mut summaries = Vec::with_capacity(session_models.len());
        for session in session_models {
            let chat_count = chat_turns::table
                .filter(chat_turns::session_id.eq(&session.id))
                .count()
                .get_result::<i64>(&mut conn)
                .await?;
            let latest_question = chat_turns::table
                .filter(chat_turns::session_id.eq(&session.id))
                .order(chat_turns::created_at.desc())
                .select(chat_turns::question)
                .first::<String>(&mut conn)
                .await
                .optional()?;

            summaries.push(SessionSummary {
                id: session.id,
                created_at: session.created_at,
                updated_at: session.updated_at,
                chat_count: chat_count.max(0) as usize,
                latest_question,
            });
        }

        Ok(summaries)
    }

    async fn delete_session(&self, session_id: &str) -> Result<Vec<String>, AnalysisError> {
        info!("Deleting session {}", session_id);
        let mut conn = self.conn().await?;
        let session_id = session_id.to_string();

        conn.transaction::<_, AnalysisError, _>(|conn| {
            Box::pin(async move {
                let dataset_ids = datasets::table
                    .filter(datasets::session_id.eq(&session_id))
                    .select(datasets::id)
                    .get_results::<String>(conn)
                    .await?;

                // datasets and chat_turns cascade
                let deleted = diesel::delete(sessions::table.find(&session_id))
                    .execute(conn)
                    .await?;
                if deleted == 0 {
                    return Err(AnalysisError::SessionNotFound { session_id });
                }

                Ok(dataset_ids)
            })
        })
        .await
    }

    async fn delete_dataset(
        &self,
        session_id: &str,
        dataset_id: &str,
    ) -> Result<bool, AnalysisError> {
        let mut conn = self.conn().await?;
        let deleted = diesel::delete(
            datasets::table
                .filter(datasets::id.eq(dataset_id))
                .filter(datasets::session_id.eq(session_id)),
        )
        .execute(&mut conn)
        .await?;

        if deleted > 0 {
            info!("Deleted dataset {} from session {}", dataset_id, session_id);
        }
        Ok(deleted > 0)
    }
}
