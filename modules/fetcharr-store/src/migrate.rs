//! Schema migrations, run idempotently at startup.

use sqlx::PgPool;
use tracing::info;

use crate::error::WorkflowError;

/// Create all tables and indexes if they do not exist.
pub async fn migrate(pool: &PgPool) -> Result<(), WorkflowError> {
    info!("Running schema migrations...");

    let statements = [
        "CREATE TABLE IF NOT EXISTS media_requests (
             id                 UUID        PRIMARY KEY,
             title              TEXT        NOT NULL,
             year               INT,
             media_type         TEXT        NOT NULL,
             quality_preference TEXT        NOT NULL DEFAULT '1080p',
             requested_by       TEXT,
             status             TEXT        NOT NULL DEFAULT 'pending',
             status_message     TEXT,
             created_at         TIMESTAMPTZ NOT NULL DEFAULT now(),
             completed_at       TIMESTAMPTZ
         )",
        "CREATE TABLE IF NOT EXISTS request_workflow_steps (
             id                 UUID        PRIMARY KEY,
             request_id         UUID        NOT NULL REFERENCES media_requests(id) ON DELETE CASCADE,
             step_key           TEXT        NOT NULL,
             step_order         INT         NOT NULL DEFAULT 0,
             status             TEXT        NOT NULL DEFAULT 'pending',
             attempts           INT         NOT NULL DEFAULT 0,
             max_attempts       INT         NOT NULL DEFAULT 3,
             started_at         TIMESTAMPTZ,
             ended_at           TIMESTAMPTZ,
             last_error_code    TEXT,
             last_error_message TEXT,
             artifacts          JSONB       NOT NULL DEFAULT '{}',
             created_at         TIMESTAMPTZ NOT NULL DEFAULT now(),
             updated_at         TIMESTAMPTZ NOT NULL DEFAULT now(),
             UNIQUE (request_id, step_key)
         )",
        "CREATE INDEX IF NOT EXISTS ix_workflow_steps_request_status
             ON request_workflow_steps (request_id, status)",
        "CREATE TABLE IF NOT EXISTS request_actions (
             id          UUID        PRIMARY KEY,
             request_id  UUID        NOT NULL REFERENCES media_requests(id) ON DELETE CASCADE,
             step_id     UUID        REFERENCES request_workflow_steps(id) ON DELETE SET NULL,
             action_type TEXT        NOT NULL,
             status      TEXT        NOT NULL DEFAULT 'open',
             priority    INT         NOT NULL DEFAULT 50,
             payload     JSONB       NOT NULL DEFAULT '{}',
             resolution  JSONB,
             message     TEXT,
             created_at  TIMESTAMPTZ NOT NULL DEFAULT now(),
             resolved_at TIMESTAMPTZ,
             resolved_by TEXT
         )",
        // One OPEN action per (request, type); resolved history is unbounded.
        "CREATE UNIQUE INDEX IF NOT EXISTS ux_request_actions_open
             ON request_actions (request_id, action_type) WHERE status = 'open'",
        "CREATE INDEX IF NOT EXISTS ix_request_actions_type_status
             ON request_actions (action_type, status)",
        "CREATE TABLE IF NOT EXISTS transfers (
             request_id UUID             PRIMARY KEY REFERENCES media_requests(id) ON DELETE CASCADE,
             handle     TEXT             NOT NULL,
             name       TEXT             NOT NULL,
             size_bytes BIGINT           NOT NULL DEFAULT 0,
             progress   DOUBLE PRECISION NOT NULL DEFAULT 0,
             speed_bps  BIGINT           NOT NULL DEFAULT 0,
             state      TEXT             NOT NULL,
             save_path  TEXT,
             updated_at TIMESTAMPTZ      NOT NULL DEFAULT now()
         )",
    ];

    for statement in &statements {
        sqlx::query(statement).execute(pool).await?;
    }

    info!("Schema migrations complete");
    Ok(())
}
