use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use datafusion::datasource::MemTable;
use datafusion::execution::config::SessionConfig;
use datafusion::execution::context::{SQLOptions, SessionContext};
use datafusion::execution::runtime_env::{RuntimeEnv, RuntimeEnvBuilder};
use tokio::sync::{OnceCell, RwLock};
use tracing::{debug, info, warn};

use crate::catalog::RELATION_NAME;
use crate::config::{EngineConfig, MaterializationMode};
use crate::domain::QueryOutput;
use crate::error::{AnalysisError, ExecutionError};
use crate::loader::LoadedTable;
use crate::rows::{batches_to_rows, unique_names};

/// One embedded engine instance with a dataset bound to `data_table`.
pub struct MaterializedStore {
    ctx: SessionContext,
    row_count: usize,
}

impl MaterializedStore {
    pub fn materialize(
        runtime: Arc<RuntimeEnv>,
        table: LoadedTable,
    ) -> Result<Self, ExecutionError> {
        let session_config = SessionConfig::new()
            .set_bool("datafusion.sql_parser.enable_ident_normalization", false);
        let ctx = SessionContext::new_with_config_rt(session_config, runtime);

        let row_count = table.num_rows();
        let mem_table = MemTable::try_new(table.schema, vec![table.batches])?;
        ctx.register_table(RELATION_NAME, Arc::new(mem_table))?;

        debug!("Materialized {} rows into {}", row_count, RELATION_NAME);
        Ok(Self { ctx, row_count })
    }

    pub fn row_count(&self) -> usize {
        self.row_count
    }

    /// Runs one read-only statement. DDL, DML and session statements are refused.
    pub async fn execute(&self, statement: &str) -> Result<QueryOutput, ExecutionError> {
        let start_time = Instant::now();

        let options = SQLOptions::new()
            .with_allow_ddl(false)
            .with_allow_dml(false)
            .with_allow_statements(false);

        let df = self.ctx.sql_with_options(statement, options).await?;
        let columns = unique_names(
            df.schema()
                .fields()
                .iter()
                .map(|field| field.name().as_str()),
        );

        let batches = df.collect().await?;
        let data = batches_to_rows(&batches, None);
        let row_count = data.len();

        info!(
            "Query completed. Returned {} rows in {}ms",
            row_count,
            start_time.elapsed().as_millis()
        );

        Ok(QueryOutput {
            columns,
            data,
            row_count,
        })
    }
}

/// Persistent stores keyed by dataset id. Each id materializes at most once;
/// later callers wait on the same cell and then read concurrently.
pub struct StoreRegistry {
    runtime: Arc<RuntimeEnv>,
    stores: RwLock<HashMap<String, Arc<OnceCell<Arc<MaterializedStore>>>>>,
}

impl StoreRegistry {
    pub fn new(runtime: Arc<RuntimeEnv>) -> Self {
        Self {
            runtime,
            stores: RwLock::new(HashMap::new()),
        }
    }

    pub async fn get_or_materialize<F>(
        &self,
        dataset_id: &str,
        load: F,
    ) -> Result<Arc<MaterializedStore>, AnalysisError>
    where
        F: FnOnce() -> Result<LoadedTable, AnalysisError>,
    {
        let cell = {
            let mut stores = self.stores.write().await;
            stores.entry(dataset_id.to_string()).or_default().clone()
        };

        let store = cell
            .get_or_try_init(|| async move {
                info!("Materializing store for dataset '{}'", dataset_id);
                let table = load()?;
                let store = MaterializedStore::materialize(self.runtime.clone(), table)?;
                Ok::<_, AnalysisError>(Arc::new(store))
            })
            .await?;

        Ok(store.clone())
    }

    pub async fn contains(&self, dataset_id: &str) -> bool {
        self.stores
            .read()
            .await
            .get(dataset_id)
            .is_some_and(|cell| cell.initialized())
    }

    pub async fn evict(&self, dataset_ids: &[String]) {
        let mut stores = self.stores.write().await;
        for dataset_id in dataset_ids {
            if stores.remove(dataset_id).is_some() {
                debug!("Evicted store for dataset '{}'", dataset_id);
            }
        }
    }
}

/// Chooses between a fresh engine per request and the per-dataset registry.
pub struct QueryExecutor {
    runtime: Arc<RuntimeEnv>,
    mode: MaterializationMode,
    registry: StoreRegistry,
}

impl QueryExecutor {
    pub fn new(config: &EngineConfig) -> Result<Self, AnalysisError> {
        info!(
            "Initializing DataFusion runtime ({:?} stores, {} MB memory limit)",
            config.materialization,
            config.memory_limit_bytes / (1024 * 1024)
        );

        let runtime = RuntimeEnvBuilder::new()
            .with_memory_limit(config.memory_limit_bytes, config.memory_fraction)
            .build_arc()
            .map_err(|e| AnalysisError::ConfigError {
                message: format!("Failed to build DataFusion runtime environment: {}", e),
            })?;

        Ok(Self {
            registry: StoreRegistry::new(runtime.clone()),
            runtime,
            mode: config.materialization,
        })
    }

    pub fn mode(&self) -> MaterializationMode {
        self.mode
    }

    pub fn registry(&self) -> &StoreRegistry {
        &self.registry
    }

    /// Returns a store for the dataset, invoking `load` only when no reusable store exists.
    pub async fn store_for<F>(
        &self,
        dataset_id: &str,
        load: F,
    ) -> Result<Arc<MaterializedStore>, AnalysisError>
    where
        F: FnOnce() -> Result<LoadedTable, AnalysisError>,
    {
        match self.mode {
            MaterializationMode::Persistent => {
                self.registry.get_or_materialize(dataset_id, load).await
            }
            MaterializationMode::Ephemeral => {
                let store = MaterializedStore::materialize(self.runtime.clone(), load()?)?;
                Ok(Arc::new(store))
            }
        }
    }

    pub async fn execute(
        &self,
        store: &MaterializedStore,
        statement: &str,
    ) -> Result<QueryOutput, ExecutionError> {
        debug!("Executing statement: {}", statement);
        store.execute(statement).await.inspect_err(|e| {
            warn!("Statement failed: {}", e);
        })
    }

    pub async fn evict(&self, dataset_ids: &[String]) {
        self.registry.evict(dataset_ids).await;
    }
}
