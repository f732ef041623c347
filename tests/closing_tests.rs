use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use settlement_service::auction::events::SettlementEvent;
use settlement_service::auction::model::{Auction, AuctionStatus};
use settlement_service::bidding::apply::BidApplier;
use settlement_service::bidding::commands::BidProcessor;
use settlement_service::bidding::model::SubmitBidCommand;
use settlement_service::closer::{AuctionCloser, CloserConfig};
use settlement_service::counter::memory::MemoryCounterStore;
use settlement_service::counter::CounterStore;
use settlement_service::database::memory::MemorySettlementStore;
use settlement_service::database::store::{ExtensionPolicy, SettlementStore};
use settlement_service::error::SettleError;
use settlement_service::trust::memory::MemoryTrustStore;
use settlement_service::trust::{TrustApply, TrustLedger, TrustStore};
use tokio::sync::broadcast;

struct Fixture {
    counter: Arc<MemoryCounterStore>,
    store: Arc<MemorySettlementStore>,
    trust_store: Arc<MemoryTrustStore>,
    trust: Arc<TrustLedger<MemoryTrustStore>>,
    processor: Arc<BidProcessor<MemoryCounterStore, MemorySettlementStore>>,
    applier: Arc<BidApplier<MemoryCounterStore, MemorySettlementStore>>,
    closer: Arc<AuctionCloser<MemoryCounterStore, MemorySettlementStore, MemoryTrustStore>>,
    event_tx: broadcast::Sender<SettlementEvent>,
}

/// 인메모리 스토어로 구성한 마감 파이프라인 (유예 60초, 낙찰 +50, 판매 +30)
fn setup() -> Fixture {
    let counter = Arc::new(MemoryCounterStore::new());
    let store = Arc::new(MemorySettlementStore::new());
    let trust_store = Arc::new(MemoryTrustStore::new());
    let (event_tx, _) = broadcast::channel(64);
    let processor = Arc::new(BidProcessor::new(
        Arc::clone(&counter),
        Arc::clone(&store),
        Duration::from_millis(800),
    ));
    let applier = Arc::new(BidApplier::new(
        Arc::clone(&counter),
        Arc::clone(&store),
        ExtensionPolicy::disabled(),
        event_tx.clone(),
    ));
    let trust = Arc::new(TrustLedger::new(
        Arc::clone(&trust_store),
        Duration::from_millis(500),
    ));
    let closer = Arc::new(AuctionCloser::new(
        Arc::clone(&store),
        Arc::clone(&counter),
        Arc::clone(&applier),
        Arc::clone(&trust),
        event_tx.clone(),
        CloserConfig {
            closing_grace_secs: 60,
            batch_limit: 200,
            winner_trust_delta: 50,
            seller_trust_delta: 30,
        },
    ));
    Fixture {
        counter,
        store,
        trust_store,
        trust,
        processor,
        applier,
        closer,
        event_tx,
    }
}

/// 진행 중 경매 픽스처 (1시간 전 시작, 1시간 후 종료)
fn test_auction(id: i64, current_price: i64, bid_unit: i64) -> Auction {
    let now = Utc::now();
    Auction {
        id,
        seller_id: 900 + id,
        category_id: 7,
        card_id: 70 + id,
        starting_price: current_price,
        current_price,
        bid_unit,
        buy_now_price: None,
        start_at: now - ChronoDuration::hours(1),
        end_at: now + ChronoDuration::hours(1),
        status: "OPEN".to_string(),
        closing_at: None,
        created_at: now,
    }
}

fn bid(auction_id: i64, bidder_id: i64, amount: i64, request_id: &str) -> SubmitBidCommand {
    SubmitBidCommand {
        auction_id,
        bidder_id,
        amount,
        request_id: request_id.to_string(),
    }
}

/// 낙찰 마감 테스트
#[tokio::test]
async fn test_close_with_winner() {
    let f = setup();
    f.store.insert_auction(test_auction(1, 10000, 1000));

    f.processor.submit(bid(1, 11, 11000, "req-1")).await.unwrap();
    f.processor.submit(bid(1, 12, 12000, "req-2")).await.unwrap();

    // 마감 전에 이벤트 구독
    let mut rx = f.event_tx.subscribe();

    // 종료 시각 이후 시점으로 스위프
    let later = Utc::now() + ChronoDuration::hours(2);
    assert_eq!(f.closer.sweep(later).await.unwrap(), 1);

    // 최고가 입찰이 낙찰
    let snapshot = f.store.snapshot_of(1).unwrap();
    assert_eq!(snapshot.member_id, Some(12));
    assert_eq!(snapshot.amount, Some(12000));
    assert_eq!(snapshot.reason, "SOLD");

    // 거래 기록
    let trade = f.store.trade_of(1).unwrap();
    assert_eq!(trade.buyer_id, 12);
    assert_eq!(trade.seller_id, 901);
    assert_eq!(trade.amount, 12000);

    // 신뢰 점수: 낙찰자 +50, 판매자 +30
    assert_eq!(f.trust_store.score(12).await.unwrap(), 415);
    assert_eq!(f.trust_store.score(901).await.unwrap(), 395);

    // 상태와 카운터 종료 플래그
    assert_eq!(f.store.auction(1).unwrap().status, "CLOSED");
    assert!(f.counter.is_ended(1));

    // 마감 이벤트가 낙찰자 정보를 담는다
    let mut closed_event = None;
    while let Ok(event) = rx.try_recv() {
        if let SettlementEvent::AuctionClosed {
            auction_id,
            winner_id,
            amount,
            ..
        } = event
        {
            closed_event = Some((auction_id, winner_id, amount));
        }
    }
    assert_eq!(closed_event, Some((1, Some(12), Some(12000))));
}

/// 유찰 마감 테스트
#[tokio::test]
async fn test_close_without_bids() {
    let f = setup();
    f.store.insert_auction(test_auction(1, 10000, 1000));

    let later = Utc::now() + ChronoDuration::hours(2);
    assert_eq!(f.closer.sweep(later).await.unwrap(), 1);

    let snapshot = f.store.snapshot_of(1).unwrap();
    assert_eq!(snapshot.reason, "NO_BIDS");
    assert_eq!(snapshot.member_id, None);
    assert!(f.store.trade_of(1).is_none());
    assert_eq!(f.store.auction(1).unwrap().status, "CLOSED");

    // 유찰은 점수 변동이 없다
    assert_eq!(f.trust_store.event_count(), 0);
}

/// 스위프 재실행 멱등성 테스트
#[tokio::test]
async fn test_sweep_rerun_is_idempotent() {
    let f = setup();
    f.store.insert_auction(test_auction(1, 10000, 1000));
    f.processor.submit(bid(1, 11, 11000, "req-1")).await.unwrap();

    let later = Utc::now() + ChronoDuration::hours(2);
    assert_eq!(f.closer.sweep(later).await.unwrap(), 1);
    assert_eq!(f.closer.sweep(later).await.unwrap(), 0);

    // 점수도 1회만 반영
    assert_eq!(f.trust_store.score(11).await.unwrap(), 415);
    assert_eq!(f.trust_store.score(901).await.unwrap(), 395);
    assert_eq!(f.trust_store.event_count(), 2);
}

/// 고착 CLOSING 회수 테스트
#[tokio::test]
async fn test_stale_closing_reclaimed_after_grace() {
    let f = setup();
    f.store.insert_auction(test_auction(1, 10000, 1000));
    f.processor.submit(bid(1, 11, 11000, "req-1")).await.unwrap();

    // 다른 인스턴스가 선점 직후 중단된 상황 재현
    let stalled_at = Utc::now() + ChronoDuration::hours(2);
    f.store.set_status(1, AuctionStatus::Closing, Some(stalled_at));

    // 유예 이내에는 회수하지 않는다
    assert_eq!(
        f.closer
            .sweep(stalled_at + ChronoDuration::seconds(30))
            .await
            .unwrap(),
        0
    );

    // 유예 경과 후 회수해 마감을 완료한다
    assert_eq!(
        f.closer
            .sweep(stalled_at + ChronoDuration::seconds(61))
            .await
            .unwrap(),
        1
    );
    let snapshot = f.store.snapshot_of(1).unwrap();
    assert_eq!(snapshot.amount, Some(11000));
    assert_eq!(f.store.auction(1).unwrap().status, "CLOSED");
}

/// 부분 마감 재개 테스트 (스냅샷 생성 후 중단)
#[tokio::test]
async fn test_resume_after_partial_close() {
    let f = setup();
    f.store.insert_auction(test_auction(1, 10000, 1000));
    f.processor.submit(bid(1, 11, 11000, "req-1")).await.unwrap();
    f.applier.drain_once().await.unwrap();

    // 선점과 낙찰 확정까지 끝낸 뒤 인스턴스가 중단된 상황 재현
    let crashed_at = Utc::now() + ChronoDuration::hours(2);
    f.store.set_status(1, AuctionStatus::Closing, Some(crashed_at));
    f.store.settle_close(1, crashed_at).await.unwrap();
    assert_eq!(f.trust_store.event_count(), 0);

    // 유예 경과 후 재개: 기존 스냅샷을 재사용하고 점수는 이번에 반영된다
    assert_eq!(
        f.closer
            .sweep(crashed_at + ChronoDuration::seconds(61))
            .await
            .unwrap(),
        1
    );
    assert_eq!(f.trust_store.score(11).await.unwrap(), 415);
    assert_eq!(f.trust_store.score(901).await.unwrap(), 395);
    assert_eq!(f.store.auction(1).unwrap().status, "CLOSED");

    // 동일 dedup 키 재반영은 무시된다
    let again = f
        .trust
        .apply_delta_once(11, 50, "auction:1:winner")
        .await
        .unwrap();
    assert!(!again.applied);
    assert_eq!(again.score, 415);
}

/// 마감 확정 이후 도착한 페이로드 테스트
#[tokio::test]
async fn test_late_payload_goes_to_dead_letter_after_close() {
    let f = setup();
    f.store.insert_auction(test_auction(1, 10000, 1000));
    f.processor.submit(bid(1, 11, 11000, "req-1")).await.unwrap();

    let later = Utc::now() + ChronoDuration::hours(2);
    assert_eq!(f.closer.sweep(later).await.unwrap(), 1);

    // 마감 확정 이후 도착한 수락 페이로드 재현
    let late = serde_json::json!({
        "auction_id": 1,
        "member_id": 99,
        "amount": 99000,
        "event_id": "late-req",
        "ts": Utc::now().timestamp_millis(),
        "buy_now": false,
    })
    .to_string();
    f.counter.push_retry(1, &late).await.unwrap();
    assert_eq!(f.applier.drain_once().await.unwrap(), 0);

    // 행은 늘지 않고 데드레터로 이동한다
    assert_eq!(f.store.bids_of(1).len(), 1);
    assert_eq!(f.counter.dead_letters(1).len(), 1);

    // 낙찰 결과는 그대로
    assert_eq!(f.store.snapshot_of(1).unwrap().amount, Some(11000));
}

/// 마감 임박 입찰 연장 테스트
#[tokio::test]
async fn test_extension_on_late_bid() {
    // 연장 정책이 켜진 별도 파이프라인 (임박 60초, 연장 60초)
    let counter = Arc::new(MemoryCounterStore::new());
    let store = Arc::new(MemorySettlementStore::new());
    let (event_tx, _) = broadcast::channel(64);
    let policy = ExtensionPolicy {
        enabled: true,
        threshold_secs: 60,
        extend_secs: 60,
    };
    let applier = BidApplier::new(
        Arc::clone(&counter),
        Arc::clone(&store),
        policy,
        event_tx,
    );
    let processor = BidProcessor::new(
        Arc::clone(&counter),
        Arc::clone(&store),
        Duration::from_millis(800),
    );

    // 종료 30초 전 경매와 종료까지 여유가 있는 경매
    let mut imminent = test_auction(1, 10000, 1000);
    imminent.end_at = Utc::now() + ChronoDuration::seconds(30);
    store.insert_auction(imminent);
    store.insert_auction(test_auction(2, 10000, 1000));
    let end_before_1 = store.auction(1).unwrap().end_at;
    let end_before_2 = store.auction(2).unwrap().end_at;

    processor.submit(bid(1, 11, 11000, "req-1")).await.unwrap();
    processor.submit(bid(2, 21, 11000, "req-2")).await.unwrap();
    applier.drain_once().await.unwrap();

    // 임박 입찰은 종료 시각이 연장되고 카운터에도 반영된다
    let end_after_1 = store.auction(1).unwrap().end_at;
    assert_eq!(end_after_1, end_before_1 + ChronoDuration::seconds(60));
    assert_eq!(counter.end_ms_of(1), Some(end_after_1.timestamp_millis()));

    // 임박하지 않은 입찰은 연장하지 않는다
    assert_eq!(store.auction(2).unwrap().end_at, end_before_2);
}

/// 지정 횟수만큼 실패 후 정상 동작하는 신뢰 스토어
struct FlakyTrustStore {
    inner: Arc<MemoryTrustStore>,
    failures_left: AtomicUsize,
}

#[async_trait]
impl TrustStore for FlakyTrustStore {
    async fn apply(
        &self,
        member_id: i64,
        delta: i32,
        dedup_key: Option<&str>,
    ) -> Result<TrustApply, SettleError> {
        if self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(SettleError::TrustLockTimeout(member_id));
        }
        self.inner.apply(member_id, delta, dedup_key).await
    }

    async fn score(&self, member_id: i64) -> Result<i32, SettleError> {
        self.inner.score(member_id).await
    }
}

/// 실패 경매가 스위프를 막지 않는다
#[tokio::test]
async fn test_failed_auction_does_not_block_sweep() {
    let counter = Arc::new(MemoryCounterStore::new());
    let store = Arc::new(MemorySettlementStore::new());
    let inner_trust = Arc::new(MemoryTrustStore::new());
    let flaky = Arc::new(FlakyTrustStore {
        inner: Arc::clone(&inner_trust),
        failures_left: AtomicUsize::new(1),
    });
    let (event_tx, _) = broadcast::channel(64);
    let processor = BidProcessor::new(
        Arc::clone(&counter),
        Arc::clone(&store),
        Duration::from_millis(800),
    );
    let applier = Arc::new(BidApplier::new(
        Arc::clone(&counter),
        Arc::clone(&store),
        ExtensionPolicy::disabled(),
        event_tx.clone(),
    ));
    let trust = Arc::new(TrustLedger::new(flaky, Duration::from_millis(500)));
    let closer = AuctionCloser::new(
        Arc::clone(&store),
        Arc::clone(&counter),
        applier,
        trust,
        event_tx,
        CloserConfig {
            closing_grace_secs: 60,
            batch_limit: 200,
            winner_trust_delta: 50,
            seller_trust_delta: 30,
        },
    );

    // 경매 1이 먼저 종료되어 먼저 처리된다
    let mut first = test_auction(1, 10000, 1000);
    first.end_at = Utc::now() + ChronoDuration::minutes(30);
    store.insert_auction(first);
    store.insert_auction(test_auction(2, 10000, 1000));

    processor.submit(bid(1, 11, 11000, "req-1")).await.unwrap();
    processor.submit(bid(2, 21, 11000, "req-2")).await.unwrap();

    // 첫 스위프: 경매 1은 점수 반영에서 실패, 경매 2는 정상 마감
    let now = Utc::now() + ChronoDuration::hours(2);
    assert_eq!(closer.sweep(now).await.unwrap(), 1);
    assert_eq!(store.auction(1).unwrap().status, "CLOSING");
    assert!(store.snapshot_of(1).is_some());
    assert_eq!(store.auction(2).unwrap().status, "CLOSED");

    // 유예 경과 후 재스위프에서 경매 1이 완료된다
    assert_eq!(
        closer.sweep(now + ChronoDuration::seconds(61)).await.unwrap(),
        1
    );
    assert_eq!(store.auction(1).unwrap().status, "CLOSED");
    assert_eq!(inner_trust.score(11).await.unwrap(), 415);
    assert_eq!(inner_trust.score(901).await.unwrap(), 395);
    assert_eq!(inner_trust.score(21).await.unwrap(), 415);
    assert_eq!(inner_trust.score(902).await.unwrap(), 395);
}
