use anyhow::Context;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::models::{Alert, MomentumIndex, MomentumSnapshot};

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

/// Stores one momentum run and the alerts that fed it. Returns the new run id.
pub async fn publish_run(
    pool: &PgPool,
    index: &MomentumIndex,
    alerts: &[Alert],
) -> anyhow::Result<Uuid> {
    let run_id = Uuid::new_v4();
    let payload = serde_json::to_value(index).context("failed to encode momentum index")?;
    let mut tx = pool.begin().await?;

    sqlx::query(
        r#"
        INSERT INTO job_momentum.momentum_runs
        (id, overall_score, band, recommendation, calculated_at, payload)
        VALUES ($1, $2, $3, $4, $5, $6)
        "#,
    )
    .bind(run_id)
    .bind(index.overall_score)
    .bind(&index.interpretation.label)
    .bind(&index.recommendation)
    .bind(index.calculated_at)
    .bind(payload)
    .execute(&mut *tx)
    .await?;

    // Alert ids can repeat within a run, so rows are keyed by position.
    for (seq, alert) in alerts.iter().enumerate() {
        let alert_payload = serde_json::to_value(alert).context("failed to encode alert")?;
        sqlx::query(
            r#"
            INSERT INTO job_momentum.alerts
            (run_id, seq, alert_id, alert_type, severity, subject, message, generated_at, payload)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(run_id)
        .bind(seq as i32)
        .bind(&alert.id)
        .bind(alert.kind.type_name())
        .bind(alert.severity.as_str())
        .bind(alert.kind.subject())
        .bind(&alert.message)
        .bind(alert.generated_at)
        .bind(alert_payload)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;
    Ok(run_id)
}

pub async fn fetch_history(pool: &PgPool, limit: i64) -> anyhow::Result<Vec<MomentumSnapshot>> {
    let records = sqlx::query(
        r#"
        SELECT r.id, r.overall_score, r.band, r.calculated_at,
               (SELECT COUNT(*) FROM job_momentum.alerts a WHERE a.run_id = r.id) AS alert_count
        FROM job_momentum.momentum_runs r
        ORDER BY r.calculated_at DESC
        LIMIT $1
        "#,
    )
    .bind(limit.max(1))
    .fetch_all(pool)
    .await?;

    let mut snapshots = Vec::new();

    for row in records {
        snapshots.push(MomentumSnapshot {
            run_id: row.get("id"),
            overall_score: row.get("overall_score"),
            band: row.get("band"),
            alert_count: row.get("alert_count"),
            calculated_at: row.get("calculated_at"),
        });
    }

    Ok(snapshots)
}
