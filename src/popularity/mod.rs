use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::warn;

use crate::error::SettleError;

pub mod keys;
pub mod memory;
pub mod redis;

/// 랭킹 결과 한 줄
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RankEntry {
    pub card_id: i64,
    pub score: f64,
}

/// 분 버킷 스토어 경계
#[async_trait]
pub trait RankingStore: Send + Sync {
    /// 버킷 점수 증가 + TTL 갱신
    async fn incr(
        &self,
        bucket: &str,
        card_id: i64,
        weight: f64,
        ttl: Duration,
    ) -> Result<(), SettleError>;

    /// 원본 버킷들을 임시 키로 합산 (없는 버킷은 빈 집합)
    async fn merge(&self, dest: &str, sources: &[String], ttl: Duration)
        -> Result<(), SettleError>;

    /// 키의 전체 멤버와 점수 조회
    async fn read_all(&self, key: &str) -> Result<Vec<(i64, f64)>, SettleError>;

    /// 키 제거
    async fn remove(&self, key: &str) -> Result<(), SettleError>;
}

/// 인기도 집계기
///
/// 이벤트는 카테고리별 분 버킷에 가중치로 쌓이고, 조회 시점에
/// 최근 윈도우만큼의 버킷을 합산해 상위 N을 뽑는다.
pub struct PopularityAggregator<R> {
    store: Arc<R>,
    weight_view: f64,
    weight_bid: f64,
    weight_wish: f64,
    bucket_ttl: Duration,
    scratch_ttl: Duration,
}

impl<R: RankingStore> PopularityAggregator<R> {
    pub fn new(
        store: Arc<R>,
        weight_view: f64,
        weight_bid: f64,
        weight_wish: f64,
        bucket_ttl: Duration,
        scratch_ttl: Duration,
    ) -> Self {
        Self {
            store,
            weight_view,
            weight_bid,
            weight_wish,
            bucket_ttl,
            scratch_ttl,
        }
    }

    /// 조회 이벤트 기록
    pub async fn record_view(&self, category_id: i64, card_id: i64) -> Result<(), SettleError> {
        self.record_at(category_id, card_id, self.weight_view, Utc::now())
            .await
    }

    /// 입찰 이벤트 기록
    pub async fn record_bid(&self, category_id: i64, card_id: i64) -> Result<(), SettleError> {
        self.record_at(category_id, card_id, self.weight_bid, Utc::now())
            .await
    }

    /// 위시리스트 이벤트 기록
    pub async fn record_wish(&self, category_id: i64, card_id: i64) -> Result<(), SettleError> {
        self.record_at(category_id, card_id, self.weight_wish, Utc::now())
            .await
    }

    /// 기준 시각 지정 기록
    pub async fn record_at(
        &self,
        category_id: i64,
        card_id: i64,
        weight: f64,
        at: DateTime<Utc>,
    ) -> Result<(), SettleError> {
        let bucket = keys::minute_key(category_id, at);
        self.store
            .incr(&bucket, card_id, weight, self.bucket_ttl)
            .await
    }

    /// 최근 window_minutes 합산 상위 n
    pub async fn top_n(
        &self,
        category_id: i64,
        window_minutes: u32,
        n: usize,
    ) -> Result<Vec<RankEntry>, SettleError> {
        self.top_n_at(category_id, window_minutes, n, Utc::now())
            .await
    }

    /// 기준 시각 지정 상위 n (현재 분 포함 과거 window_minutes개 버킷)
    pub async fn top_n_at(
        &self,
        category_id: i64,
        window_minutes: u32,
        n: usize,
        at: DateTime<Utc>,
    ) -> Result<Vec<RankEntry>, SettleError> {
        if window_minutes == 0 || n == 0 {
            return Ok(Vec::new());
        }
        let sources: Vec<String> = (0..window_minutes)
            .map(|i| keys::minute_key(category_id, at - chrono::Duration::minutes(i as i64)))
            .collect();
        let scratch = keys::scratch_key(category_id);

        // 임시 키 제거는 실패 경로를 포함한 모든 경로에서 시도한다
        let rows = match self.store.merge(&scratch, &sources, self.scratch_ttl).await {
            Ok(()) => self.store.read_all(&scratch).await,
            Err(e) => Err(e),
        };
        if let Err(e) = self.store.remove(&scratch).await {
            warn!(
                "{:<12} --> 임시 키 제거 실패(TTL 만료 예정): key={} err={:?}",
                "Ranking", scratch, e
            );
        }
        let mut rows = rows?;

        rows.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.cmp(&b.0))
        });
        rows.truncate(n);
        Ok(rows
            .into_iter()
            .map(|(card_id, score)| RankEntry { card_id, score })
            .collect())
    }
}
