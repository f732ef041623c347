use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;

use crate::database::DatabaseManager;
use crate::error::SettleError;
use crate::trust::{clamped, TrustApply, TrustStore, DEFAULT_SCORE};

// region:    --- SQL

const ENSURE_ROW: &str = "INSERT INTO member_trust (member_id, score, updated_at) VALUES ($1, $2, $3) ON CONFLICT (member_id) DO NOTHING";

const LOCK_SCORE: &str = "SELECT score FROM member_trust WHERE member_id = $1 FOR UPDATE";

const UPDATE_SCORE: &str = "UPDATE member_trust SET score = $2, updated_at = $3 WHERE member_id = $1";

const READ_SCORE: &str = "SELECT score FROM member_trust WHERE member_id = $1";

const INSERT_EVENT: &str = "INSERT INTO trust_events (member_id, delta, dedup_key, created_at) VALUES ($1, $2, $3, $4)";

const INSERT_KEYED_EVENT: &str = "INSERT INTO trust_events (member_id, delta, dedup_key, created_at) VALUES ($1, $2, $3, $4) ON CONFLICT (dedup_key) WHERE dedup_key IS NOT NULL DO NOTHING RETURNING id";

// endregion: --- SQL

/// PostgreSQL 기반 신뢰 점수 스토어
///
/// SELECT FOR UPDATE 행 잠금이 회원 단위 직렬화를 보장한다.
pub struct PostgresTrustStore {
    db: Arc<DatabaseManager>,
}

impl PostgresTrustStore {
    pub fn new(db: Arc<DatabaseManager>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl TrustStore for PostgresTrustStore {
    async fn apply(
        &self,
        member_id: i64,
        delta: i32,
        dedup_key: Option<&str>,
    ) -> Result<TrustApply, SettleError> {
        let dedup_key = dedup_key.map(str::to_owned);
        self.db
            .transaction::<_, _, SettleError>(move |tx| {
                Box::pin(async move {
                    let now = Utc::now();
                    sqlx::query(ENSURE_ROW)
                        .bind(member_id)
                        .bind(DEFAULT_SCORE)
                        .bind(now)
                        .execute(&mut **tx)
                        .await?;

                    if let Some(key) = dedup_key.as_deref() {
                        let inserted = sqlx::query_scalar::<_, i64>(INSERT_KEYED_EVENT)
                            .bind(member_id)
                            .bind(delta)
                            .bind(key)
                            .bind(now)
                            .fetch_optional(&mut **tx)
                            .await?;
                        if inserted.is_none() {
                            let score = sqlx::query_scalar::<_, i32>(READ_SCORE)
                                .bind(member_id)
                                .fetch_one(&mut **tx)
                                .await?;
                            return Ok(TrustApply {
                                score,
                                applied: false,
                            });
                        }
                    } else {
                        sqlx::query(INSERT_EVENT)
                            .bind(member_id)
                            .bind(delta)
                            .bind(Option::<String>::None)
                            .bind(now)
                            .execute(&mut **tx)
                            .await?;
                    }

                    let score = sqlx::query_scalar::<_, i32>(LOCK_SCORE)
                        .bind(member_id)
                        .fetch_one(&mut **tx)
                        .await?;
                    let next = clamped(score, delta);
                    sqlx::query(UPDATE_SCORE)
                        .bind(member_id)
                        .bind(next)
                        .bind(now)
                        .execute(&mut **tx)
                        .await?;
                    Ok(TrustApply {
                        score: next,
                        applied: true,
                    })
                })
            })
            .await
    }

    async fn score(&self, member_id: i64) -> Result<i32, SettleError> {
        let row = sqlx::query_scalar::<_, i32>(READ_SCORE)
            .bind(member_id)
            .fetch_optional(self.db.pool())
            .await?;
        Ok(row.unwrap_or(DEFAULT_SCORE))
    }
}
