use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, TimeZone, Utc};
use settlement_service::error::SettleError;
use settlement_service::popularity::keys::{minute_key, scratch_key};
use settlement_service::popularity::memory::MemoryRankingStore;
use settlement_service::popularity::{PopularityAggregator, RankEntry, RankingStore};

/// 기본 가중치(조회 1, 입찰 5, 위시 3) 집계기
fn aggregator(store: Arc<MemoryRankingStore>) -> PopularityAggregator<MemoryRankingStore> {
    PopularityAggregator::new(
        store,
        1.0,
        5.0,
        3.0,
        Duration::from_secs(70 * 60),
        Duration::from_secs(120),
    )
}

/// 버킷 합산 테스트
#[tokio::test]
async fn test_view_counts_aggregate() {
    let store = Arc::new(MemoryRankingStore::new());
    let agg = aggregator(Arc::clone(&store));
    let at = Utc.with_ymd_and_hms(2026, 3, 14, 10, 30, 15).unwrap();

    agg.record_at(7, 100, 1.0, at).await.unwrap();
    agg.record_at(7, 100, 1.0, at).await.unwrap();
    agg.record_at(7, 100, 1.0, at).await.unwrap();
    agg.record_at(7, 200, 1.0, at).await.unwrap();

    let top = agg.top_n_at(7, 10, 10, at).await.unwrap();
    assert_eq!(
        top,
        vec![
            RankEntry {
                card_id: 100,
                score: 3.0
            },
            RankEntry {
                card_id: 200,
                score: 1.0
            },
        ]
    );

    // 윈도우를 벗어난 시점에서는 집계에서 빠진다
    let later = agg
        .top_n_at(7, 10, 10, at + ChronoDuration::minutes(10))
        .await
        .unwrap();
    assert!(later.is_empty());
}

/// 가중치 반영 순위 테스트
#[tokio::test]
async fn test_weights_order_ranking() {
    let store = Arc::new(MemoryRankingStore::new());
    let agg = aggregator(Arc::clone(&store));

    // 카드 100: 조회 3회(3.0), 카드 200: 입찰 1회(5.0), 카드 300: 위시 1회(3.0)
    for _ in 0..3 {
        agg.record_view(7, 100).await.unwrap();
    }
    agg.record_bid(7, 200).await.unwrap();
    agg.record_wish(7, 300).await.unwrap();

    let top = agg.top_n(7, 5, 10).await.unwrap();
    assert_eq!(top.len(), 3);
    assert_eq!(
        top[0],
        RankEntry {
            card_id: 200,
            score: 5.0
        }
    );

    // 동점은 card_id 오름차순
    assert_eq!(
        top[1],
        RankEntry {
            card_id: 100,
            score: 3.0
        }
    );
    assert_eq!(
        top[2],
        RankEntry {
            card_id: 300,
            score: 3.0
        }
    );
}

/// 윈도우 경계 테스트
#[tokio::test]
async fn test_window_boundary() {
    let store = Arc::new(MemoryRankingStore::new());
    let agg = aggregator(Arc::clone(&store));
    let at = Utc.with_ymd_and_hms(2026, 3, 14, 10, 30, 15).unwrap();

    // 윈도우 5분: 4분 전 버킷은 포함, 5분 전 버킷은 제외
    agg.record_at(7, 100, 1.0, at - ChronoDuration::minutes(4))
        .await
        .unwrap();
    agg.record_at(7, 200, 1.0, at - ChronoDuration::minutes(5))
        .await
        .unwrap();

    let top = agg.top_n_at(7, 5, 10, at).await.unwrap();
    assert_eq!(
        top,
        vec![RankEntry {
            card_id: 100,
            score: 1.0
        }]
    );
}

/// 상위 N 절단 테스트
#[tokio::test]
async fn test_limit_truncates() {
    let store = Arc::new(MemoryRankingStore::new());
    let agg = aggregator(Arc::clone(&store));
    let at = Utc.with_ymd_and_hms(2026, 3, 14, 10, 30, 15).unwrap();

    for card_id in 1i64..=10 {
        agg.record_at(7, card_id, card_id as f64, at).await.unwrap();
    }

    let top = agg.top_n_at(7, 5, 3, at).await.unwrap();
    assert_eq!(top.len(), 3);
    assert_eq!(top[0].card_id, 10);
    assert_eq!(top[1].card_id, 9);
    assert_eq!(top[2].card_id, 8);
}

/// 임시 합산 키 정리 테스트
#[tokio::test]
async fn test_scratch_key_removed_after_query() {
    let store = Arc::new(MemoryRankingStore::new());
    let agg = aggregator(Arc::clone(&store));
    let at = Utc.with_ymd_and_hms(2026, 3, 14, 10, 30, 15).unwrap();

    agg.record_at(7, 100, 1.0, at).await.unwrap();
    agg.top_n_at(7, 5, 10, at).await.unwrap();

    // 임시 합산 키는 조회 후 남지 않는다
    assert!(store.keys().iter().all(|k| !k.contains(":tmp:")));
}

/// 읽기에서 실패하는 스토어 (임시 키 정리 검증용)
struct FailingReadStore {
    inner: MemoryRankingStore,
}

#[async_trait]
impl RankingStore for FailingReadStore {
    async fn incr(
        &self,
        bucket: &str,
        card_id: i64,
        weight: f64,
        ttl: Duration,
    ) -> Result<(), SettleError> {
        self.inner.incr(bucket, card_id, weight, ttl).await
    }

    async fn merge(
        &self,
        dest: &str,
        sources: &[String],
        ttl: Duration,
    ) -> Result<(), SettleError> {
        self.inner.merge(dest, sources, ttl).await
    }

    async fn read_all(&self, _key: &str) -> Result<Vec<(i64, f64)>, SettleError> {
        Err(SettleError::Inconsistent("읽기 실패 주입".to_string()))
    }

    async fn remove(&self, key: &str) -> Result<(), SettleError> {
        self.inner.remove(key).await
    }
}

/// 실패 경로 임시 키 정리 테스트
#[tokio::test]
async fn test_scratch_removed_even_when_read_fails() {
    let store = Arc::new(FailingReadStore {
        inner: MemoryRankingStore::new(),
    });
    let agg = PopularityAggregator::new(
        Arc::clone(&store),
        1.0,
        5.0,
        3.0,
        Duration::from_secs(70 * 60),
        Duration::from_secs(120),
    );
    let at = Utc.with_ymd_and_hms(2026, 3, 14, 10, 30, 15).unwrap();

    agg.record_at(7, 100, 1.0, at).await.unwrap();
    assert!(agg.top_n_at(7, 5, 10, at).await.is_err());

    // 실패 경로에서도 임시 키는 제거된다
    assert!(store.inner.keys().iter().all(|k| !k.contains(":tmp:")));
}

/// 빈 윈도우 테스트
#[tokio::test]
async fn test_zero_window_returns_empty() {
    let store = Arc::new(MemoryRankingStore::new());
    let agg = aggregator(Arc::clone(&store));
    let at = Utc.with_ymd_and_hms(2026, 3, 14, 10, 30, 15).unwrap();

    agg.record_at(7, 100, 1.0, at).await.unwrap();

    assert!(agg.top_n_at(7, 0, 10, at).await.unwrap().is_empty());
    assert!(agg.top_n_at(7, 5, 0, at).await.unwrap().is_empty());

    // 빈 윈도우 조회는 임시 키를 만들지 않는다
    assert_eq!(store.keys().len(), 1);
}

/// 분 버킷 키 포맷 테스트 (UTC 기준)
#[test]
fn test_minute_key_format() {
    let at = Utc.with_ymd_and_hms(2026, 8, 25, 10, 5, 42).unwrap();
    assert_eq!(minute_key(7, at), "pop:cat:7:min:202608251005");

    let a = scratch_key(7);
    let b = scratch_key(7);
    assert!(a.starts_with("pop:cat:7:tmp:"));
    assert_ne!(a, b);
}
