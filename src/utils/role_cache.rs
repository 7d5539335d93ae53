use anyhow::Result;
use futures_util::StreamExt;
use moka::future::Cache;
use sqlx::MySqlPool;
use std::time::Duration;

use crate::model::role::Role;

/// What the middleware needs to know about an account on every request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccountState {
    pub role: Role,
    pub is_active: bool,
    pub employee_id: Option<u64>,
}

type AccountRow = (u64, u8, bool, Option<u64>);

impl AccountState {
    fn from_row((_, role_id, is_active, employee_id): AccountRow) -> Option<Self> {
        Some(AccountState {
            role: Role::from_id(role_id)?,
            is_active,
            employee_id,
        })
    }
}

/// Read-through cache of account role/active state keyed by user id.
/// Entries expire after the configured TTL, so admin changes propagate even without explicit invalidation.
#[derive(Clone)]
pub struct RoleCache {
    inner: Cache<u64, AccountState>,
}

impl RoleCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            inner: Cache::builder()
                .max_capacity(100_000)
                .time_to_live(ttl)
                .build(),
        }
    }

    pub async fn get(&self, user_id: u64) -> Option<AccountState> {
        self.inner.get(&user_id).await
    }

    pub async fn insert(&self, user_id: u64, state: AccountState) {
        self.inner.insert(user_id, state).await;
    }

    pub async fn invalidate(&self, user_id: u64) {
        self.inner.invalidate(&user_id).await;
    }

    /// Cache first, then the `users` table. `Ok(None)` means the account is gone.
    pub async fn resolve(&self, pool: &MySqlPool, user_id: u64) -> Result<Option<AccountState>, sqlx::Error> {
        if let Some(state) = self.get(user_id).await {
            return Ok(Some(state));
        }

        let row = sqlx::query_as::<_, AccountRow>(
            "SELECT id, role_id, is_active, employee_id FROM users WHERE id = ?",
        )
        .bind(user_id)
        .fetch_optional(pool)
        .await?;

        let state = row.and_then(AccountState::from_row);
        if let Some(state) = state {
            self.insert(user_id, state).await;
        }
        Ok(state)
    }

    async fn batch_insert(&self, rows: &[AccountRow]) {
        let futures: Vec<_> = rows
            .iter()
            .filter_map(|row| AccountState::from_row(*row).map(|state| (row.0, state)))
            .map(|(id, state)| self.inner.insert(id, state))
            .collect();

        futures::future::join_all(futures).await;
    }
}

/// Preload accounts that logged in recently, in batches.
pub async fn warmup_role_cache(
    cache: &RoleCache,
    pool: &MySqlPool,
    days: u32,
    batch_size: usize,
) -> Result<()> {
    let mut stream = sqlx::query_as::<_, AccountRow>(
        r#"
        SELECT id, role_id, is_active, employee_id
        FROM users
        WHERE last_login_at >= NOW() - INTERVAL ? DAY
        ORDER BY last_login_at DESC
        "#,
    )
    .bind(days)
    .fetch(pool);

    let mut batch = Vec::with_capacity(batch_size);
    let mut total_count = 0usize;

    while let Some(row) = stream.next().await {
        batch.push(row?);
        total_count += 1;

        if batch.len() >= batch_size {
            cache.batch_insert(&batch).await;
            batch.clear();
        }
    }

    if !batch.is_empty() {
        cache.batch_insert(&batch).await;
    }

    log::info!(
        "Role cache warmup complete: {} recent accounts (last {} days)",
        total_count,
        days
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state(role: Role) -> AccountState {
        AccountState {
            role,
            is_active: true,
            employee_id: None,
        }
    }

    #[actix_web::test]
    async fn insert_get_invalidate() {
        let cache = RoleCache::new(Duration::from_secs(60));
        assert_eq!(cache.get(1).await, None);

        cache.insert(1, state(Role::Viewer)).await;
        assert_eq!(cache.get(1).await, Some(state(Role::Viewer)));

        cache.invalidate(1).await;
        assert_eq!(cache.get(1).await, None);
    }

    #[test]
    fn unknown_role_ids_are_not_cached() {
        assert_eq!(AccountState::from_row((1, 99, true, None)), None);
        assert_eq!(
            AccountState::from_row((1, 2, false, Some(5))),
            Some(AccountState {
                role: Role::Viewer,
                is_active: false,
                employee_id: Some(5),
            })
        );
    }
}
