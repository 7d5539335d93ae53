use sqlx::MySqlPool;
use tracing::warn;

use crate::auth::auth::AuthUser;

/// Append an audit entry. Failures are logged and swallowed.
pub async fn record(
    pool: &MySqlPool,
    actor: &AuthUser,
    action: &str,
    entity: &str,
    entity_id: impl ToString,
    details: Option<String>,
) {
    let entity_id = entity_id.to_string();

    if let Err(e) = sqlx::query(
        r#"
        INSERT INTO activity_logs (user_id, username, action, entity, entity_id, details)
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(actor.user_id)
    .bind(&actor.username)
    .bind(action)
    .bind(entity)
    .bind(&entity_id)
    .bind(details)
    .execute(pool)
    .await
    {
        warn!(error = %e, action, entity, entity_id = %entity_id, "Failed to record activity");
    }
}
