//! Shared Postgres-backed harness for the integration suites.
//!
//! One container and one migrated database serve the whole test binary.
//! The first test to run pays the startup cost; everyone after connects
//! to what is already there.

use anyhow::{Context, Result};
use sqlx::PgPool;
use test_context::AsyncTestContext;
use testcontainers::runners::AsyncRunner;
use testcontainers::{ContainerAsync, ImageExt};
use testcontainers_modules::postgres::Postgres;
use tokio::sync::OnceCell;
use uuid::Uuid;

static SHARED_INFRA: OnceCell<SharedTestInfra> = OnceCell::const_new();

/// Container plus connection details, held for the whole test run.
struct SharedTestInfra {
    /// Connection URL without a database name.
    base_url: String,
    // Dropping this stops the container.
    _postgres: ContainerAsync<Postgres>,
}

impl SharedTestInfra {
    async fn get() -> &'static Self {
        SHARED_INFRA
            .get_or_init(|| async {
                Self::start()
                    .await
                    .expect("shared test infrastructure failed to start")
            })
            .await
    }

    async fn start() -> Result<Self> {
        init_test_tracing();

        let postgres = Postgres::default()
            .with_tag("16")
            .with_cmd(["-c", "max_connections=200"])
            .start()
            .await
            .context("starting Postgres container")?;

        let host = postgres.get_host().await?;
        let port = postgres.get_host_port_ipv4(5432).await?;
        let base_url = format!("postgresql://postgres:postgres@{host}:{port}");

        let infra = Self {
            base_url,
            _postgres: postgres,
        };

        // The container's default database doubles as the shared one.
        let pool = infra.connect("postgres").await?;
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .context("migrating shared database")?;

        Ok(infra)
    }

    async fn connect(&self, database: &str) -> Result<PgPool> {
        PgPool::connect(&format!("{}/{database}", self.base_url))
            .await
            .with_context(|| format!("connecting to {database}"))
    }
}

/// Respect RUST_LOG when the suite runs with --nocapture.
fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Per-test entry point into the shared database.
///
/// The summarization domain keys everything by fingerprint, so suites stay
/// isolated on the shared database by minting unique fingerprints. Queue
/// tests claim without a key and take [`TestHarness::isolated_pool`]
/// instead.
pub struct TestHarness {
    /// Pool on the shared, migrated database.
    pub db_pool: PgPool,
}

impl AsyncTestContext for TestHarness {
    async fn setup() -> Self {
        Self::new().await.expect("test harness setup failed")
    }

    async fn teardown(self) {}
}

impl TestHarness {
    pub async fn new() -> Result<Self> {
        let infra = SharedTestInfra::get().await;
        let db_pool = infra.connect("postgres").await?;

        Ok(Self { db_pool })
    }

    /// Create an empty migrated database private to one test.
    ///
    /// Claiming from the job queue scans the whole `jobs` table, so tests
    /// that exercise claiming need a database other tests cannot write to.
    pub async fn isolated_pool(&self) -> Result<PgPool> {
        let infra = SharedTestInfra::get().await;
        let name = format!("test_{}", Uuid::new_v4().simple());

        sqlx::query(&format!(r#"CREATE DATABASE "{name}""#))
            .execute(&self.db_pool)
            .await
            .context("creating isolated database")?;

        let pool = infra.connect(&name).await?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .context("migrating isolated database")?;

        Ok(pool)
    }
}
