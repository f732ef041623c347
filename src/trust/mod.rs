use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::timeout;
use tracing::info;

use crate::error::SettleError;

pub mod memory;
pub mod postgres;

/// 신규 회원 기본 신뢰 점수
pub const DEFAULT_SCORE: i32 = 365;

/// 하한 0 적용 점수 계산
pub fn clamped(score: i32, delta: i32) -> i32 {
    let next = score as i64 + delta as i64;
    next.clamp(0, i32::MAX as i64) as i32
}

/// 점수 반영 결과
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrustApply {
    pub score: i32,
    /// false면 동일 dedup 키가 이미 반영됨
    pub applied: bool,
}

/// 신뢰 점수 스토어 경계
///
/// apply는 회원 행 단위로 직렬화되어야 한다. 두 델타가 동시에 들어와도
/// 한쪽이 끝난 뒤의 점수 위에서 다른 쪽이 계산된다.
#[async_trait]
pub trait TrustStore: Send + Sync {
    /// 점수 반영 (행이 없으면 기본 점수로 생성 후 반영)
    async fn apply(
        &self,
        member_id: i64,
        delta: i32,
        dedup_key: Option<&str>,
    ) -> Result<TrustApply, SettleError>;

    /// 점수 조회 (잠금 없음, 행이 없으면 기본 점수)
    async fn score(&self, member_id: i64) -> Result<i32, SettleError>;
}

/// 신뢰 점수 원장
pub struct TrustLedger<T> {
    store: Arc<T>,
    lock_timeout: Duration,
}

impl<T: TrustStore> TrustLedger<T> {
    pub fn new(store: Arc<T>, lock_timeout: Duration) -> Self {
        Self {
            store,
            lock_timeout,
        }
    }

    /// 점수 델타 반영
    pub async fn apply_delta(&self, member_id: i64, delta: i32) -> Result<i32, SettleError> {
        let applied = self.locked_apply(member_id, delta, None).await?;
        Ok(applied.score)
    }

    /// dedup 키 기반 멱등 반영 (마감 재실행 경로에서 사용)
    pub async fn apply_delta_once(
        &self,
        member_id: i64,
        delta: i32,
        dedup_key: &str,
    ) -> Result<TrustApply, SettleError> {
        self.locked_apply(member_id, delta, Some(dedup_key)).await
    }

    /// 점수 조회
    pub async fn score(&self, member_id: i64) -> Result<i32, SettleError> {
        self.store.score(member_id).await
    }

    async fn locked_apply(
        &self,
        member_id: i64,
        delta: i32,
        dedup_key: Option<&str>,
    ) -> Result<TrustApply, SettleError> {
        match timeout(self.lock_timeout, self.store.apply(member_id, delta, dedup_key)).await {
            Ok(result) => {
                let applied = result?;
                info!(
                    "{:<12} --> 점수 반영: member_id={} delta={} score={} applied={}",
                    "Trust", member_id, delta, applied.score, applied.applied
                );
                Ok(applied)
            }
            Err(_) => Err(SettleError::TrustLockTimeout(member_id)),
        }
    }
}
