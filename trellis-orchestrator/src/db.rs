use sqlx::{PgPool, postgres::PgPoolOptions};
use std::time::Duration;

pub async fn create_pool(database_url: &str) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .acquire_timeout(Duration::from_secs(5))
        .connect(database_url)
        .await
}

pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::Error> {
    // Create pipelines table
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS pipelines (
            id UUID PRIMARY KEY,
            project_id UUID NOT NULL,
            ref_name VARCHAR(255) NOT NULL,
            sha VARCHAR(64) NOT NULL,
            tag BOOLEAN NOT NULL DEFAULT FALSE,
            source VARCHAR(50) NOT NULL,
            status VARCHAR(50) NOT NULL,
            locked VARCHAR(50) NOT NULL DEFAULT 'unlocked',
            size INTEGER NOT NULL DEFAULT 0,
            failure_reason VARCHAR(50),
            created_at TIMESTAMPTZ NOT NULL,
            finished_at TIMESTAMPTZ
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Create jobs table
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS jobs (
            id UUID PRIMARY KEY,
            pipeline_id UUID NOT NULL REFERENCES pipelines(id) ON DELETE CASCADE,
            project_id UUID NOT NULL,
            name VARCHAR(255) NOT NULL,
            stage VARCHAR(255) NOT NULL,
            status VARCHAR(50) NOT NULL,
            ref_name VARCHAR(255) NOT NULL,
            tag BOOLEAN NOT NULL DEFAULT FALSE,
            tags TEXT[] NOT NULL DEFAULT '{}',
            needs TEXT[] NOT NULL DEFAULT '{}',
            allow_failure BOOLEAN NOT NULL DEFAULT FALSE,
            owner_id UUID,
            outdated_deployment BOOLEAN NOT NULL DEFAULT FALSE,
            debug_mode BOOLEAN NOT NULL DEFAULT FALSE,
            has_artifacts BOOLEAN NOT NULL DEFAULT FALSE,
            artifacts_public BOOLEAN NOT NULL DEFAULT TRUE,
            erased_at TIMESTAMPTZ
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Create artifacts table
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS artifacts (
            id UUID PRIMARY KEY,
            job_id UUID NOT NULL REFERENCES jobs(id) ON DELETE CASCADE,
            project_id UUID NOT NULL,
            file_path TEXT NOT NULL,
            size_bytes BIGINT NOT NULL DEFAULT 0,
            expire_at TIMESTAMPTZ,
            locked VARCHAR(50) NOT NULL DEFAULT 'unknown',
            created_at TIMESTAMPTZ NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Create indexes for better query performance
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_jobs_project_status ON jobs(project_id, status)")
        .execute(pool)
        .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_jobs_pipeline_id ON jobs(pipeline_id)")
        .execute(pool)
        .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_artifacts_expire_at ON artifacts(expire_at DESC, id DESC)",
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_artifacts_locked ON artifacts(locked)")
        .execute(pool)
        .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_artifacts_job_id ON artifacts(job_id)")
        .execute(pool)
        .await?;

    tracing::info!("Database migrations completed successfully");
    Ok(())
}
