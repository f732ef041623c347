use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use settlement_service::error::SettleError;
use settlement_service::trust::memory::MemoryTrustStore;
use settlement_service::trust::{clamped, TrustApply, TrustLedger, TrustStore, DEFAULT_SCORE};

/// 미등록 회원 기본 점수 테스트
#[tokio::test]
async fn test_default_score_for_unknown_member() {
    let store = Arc::new(MemoryTrustStore::new());
    let ledger = TrustLedger::new(Arc::clone(&store), Duration::from_millis(500));

    assert_eq!(ledger.score(42).await.unwrap(), DEFAULT_SCORE);

    // 조회만으로는 행을 만들지 않는다
    assert!(!store.has_row(42));
}

/// 점수 하한 테스트
#[tokio::test]
async fn test_score_floor_at_zero() {
    let store = Arc::new(MemoryTrustStore::new());
    let ledger = TrustLedger::new(store, Duration::from_millis(500));

    assert_eq!(ledger.apply_delta(7, -165).await.unwrap(), 200);
    assert_eq!(ledger.apply_delta(7, -500).await.unwrap(), 0);

    // 0에서 다시 올라갈 수 있다
    assert_eq!(ledger.apply_delta(7, 10).await.unwrap(), 10);
}

/// 첫 반영 시 기본 점수에서 시작하는지 테스트
#[tokio::test]
async fn test_first_delta_creates_row_from_default() {
    let store = Arc::new(MemoryTrustStore::new());
    let ledger = TrustLedger::new(Arc::clone(&store), Duration::from_millis(500));

    assert_eq!(ledger.apply_delta(7, 50).await.unwrap(), 415);
    assert!(store.has_row(7));
}

/// 동시 반영 유실 없음 테스트
#[tokio::test]
async fn test_concurrent_deltas_all_counted() {
    let store = Arc::new(MemoryTrustStore::new());
    let ledger = Arc::new(TrustLedger::new(
        Arc::clone(&store),
        Duration::from_millis(500),
    ));

    let mut handles = vec![];
    for _ in 0..50 {
        let ledger = Arc::clone(&ledger);
        handles.push(tokio::spawn(
            async move { ledger.apply_delta(7, 1).await.unwrap() },
        ));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    // 유실 없이 전부 반영: 365 + 50
    assert_eq!(ledger.score(7).await.unwrap(), 415);
    assert_eq!(store.event_count(), 50);
}

/// dedup 키 멱등 반영 테스트
#[tokio::test]
async fn test_apply_delta_once_dedup() {
    let store = Arc::new(MemoryTrustStore::new());
    let ledger = TrustLedger::new(Arc::clone(&store), Duration::from_millis(500));

    let first = ledger
        .apply_delta_once(7, 50, "auction:1:winner")
        .await
        .unwrap();
    assert!(first.applied);
    assert_eq!(first.score, 415);

    // 동일 키 재반영은 점수를 바꾸지 않는다
    let again = ledger
        .apply_delta_once(7, 50, "auction:1:winner")
        .await
        .unwrap();
    assert!(!again.applied);
    assert_eq!(again.score, 415);

    // 다른 키는 새로 반영된다
    let other = ledger
        .apply_delta_once(7, 50, "auction:2:winner")
        .await
        .unwrap();
    assert!(other.applied);
    assert_eq!(other.score, 465);

    assert_eq!(store.event_count(), 2);
}

/// 하한 0, i32 상한 포화 테스트
#[test]
fn test_clamped_floor() {
    assert_eq!(clamped(200, -500), 0);
    assert_eq!(clamped(0, -1), 0);
    assert_eq!(clamped(365, 50), 415);
    assert_eq!(clamped(i32::MAX, 1), i32::MAX);
}

/// 잠금 획득이 지연되는 신뢰 스토어
struct SlowTrustStore;

#[async_trait]
impl TrustStore for SlowTrustStore {
    async fn apply(
        &self,
        _member_id: i64,
        _delta: i32,
        _dedup_key: Option<&str>,
    ) -> Result<TrustApply, SettleError> {
        tokio::time::sleep(Duration::from_millis(200)).await;
        Ok(TrustApply {
            score: DEFAULT_SCORE,
            applied: true,
        })
    }

    async fn score(&self, _member_id: i64) -> Result<i32, SettleError> {
        Ok(DEFAULT_SCORE)
    }
}

/// 잠금 대기 시간 초과 테스트
#[tokio::test]
async fn test_lock_timeout_maps_to_retryable_error() {
    let ledger = TrustLedger::new(Arc::new(SlowTrustStore), Duration::from_millis(10));

    let err = ledger.apply_delta(7, 50).await.unwrap_err();
    assert!(matches!(err, SettleError::TrustLockTimeout(7)));
    assert!(err.is_retryable());
}
