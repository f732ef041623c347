/// 경매 마감 처리
/// 1. 마감 대상 스캔 (종료 지난 OPEN + 유예 경과 CLOSING)
/// 2. CLOSING 선점
/// 3. 잔여 큐 드레인 → 낙찰 확정 → 신뢰 점수 → CLOSED 확정
// region:    --- Imports
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tokio::sync::broadcast;
use tracing::{error, info, warn};

use crate::auction::events::SettlementEvent;
use crate::bidding::apply::BidApplier;
use crate::counter::CounterStore;
use crate::database::store::{CloseSettlement, SettlementStore};
use crate::error::SettleError;
use crate::trust::{TrustLedger, TrustStore};
// endregion: --- Imports

// region:    --- Auction Closer

/// 마감 처리 설정
#[derive(Debug, Clone, Copy)]
pub struct CloserConfig {
    /// CLOSING 고착 회수 유예 (초)
    pub closing_grace_secs: i64,
    /// 스위프 1회당 처리 상한
    pub batch_limit: i64,
    pub winner_trust_delta: i32,
    pub seller_trust_delta: i32,
}

/// 경매 마감 처리기
pub struct AuctionCloser<C, S, T> {
    store: Arc<S>,
    counter: Arc<C>,
    applier: Arc<BidApplier<C, S>>,
    trust: Arc<TrustLedger<T>>,
    events: broadcast::Sender<SettlementEvent>,
    config: CloserConfig,
}

impl<C, S, T> AuctionCloser<C, S, T>
where
    C: CounterStore,
    S: SettlementStore,
    T: TrustStore,
{
    pub fn new(
        store: Arc<S>,
        counter: Arc<C>,
        applier: Arc<BidApplier<C, S>>,
        trust: Arc<TrustLedger<T>>,
        events: broadcast::Sender<SettlementEvent>,
        config: CloserConfig,
    ) -> Self {
        Self {
            store,
            counter,
            applier,
            trust,
            events,
            config,
        }
    }

    /// 마감 스위프 1회 실행. 반환값은 이번 스위프에서 CLOSED까지 간 경매 수
    pub async fn sweep(&self, now: DateTime<Utc>) -> Result<usize, SettleError> {
        let reclaim_before = now - Duration::seconds(self.config.closing_grace_secs);
        let due = self
            .store
            .due_auctions(now, reclaim_before, self.config.batch_limit)
            .await?;
        if due.is_empty() {
            return Ok(0);
        }
        info!("{:<12} --> 마감 대상 {}건 스캔", "Closer", due.len());

        let mut closed = 0;
        for auction_id in due {
            match self.close_one(auction_id, now, reclaim_before).await {
                Ok(true) => closed += 1,
                Ok(false) => {}
                // 실패한 경매는 CLOSING으로 남아 유예 경과 후 회수된다
                Err(e) => error!(
                    "{:<12} --> 마감 처리 실패: auction_id={} err={:?}",
                    "Closer", auction_id, e
                ),
            }
        }
        Ok(closed)
    }

    /// 단일 경매 마감. 모든 단계가 멱등이라 중단 지점부터 재개해도 결과가 같다
    async fn close_one(
        &self,
        auction_id: i64,
        now: DateTime<Utc>,
        reclaim_before: DateTime<Utc>,
    ) -> Result<bool, SettleError> {
        if !self.store.begin_close(auction_id, now, reclaim_before).await? {
            return Ok(false);
        }

        // 승자 선정 전에 잔여 수락 페이로드를 모두 내구 반영한다
        self.applier.drain_auction(auction_id).await?;

        let settlement = self.store.settle_close(auction_id, now).await?;
        self.reward(&settlement).await?;

        if let Err(e) = self.counter.mark_ended(auction_id).await {
            // 스크립트의 종료 시각 검사가 수락을 이미 막고 있다
            warn!(
                "{:<12} --> 카운터 종료 플래그 기록 실패: auction_id={} err={:?}",
                "Closer", auction_id, e
            );
        }
        self.store.finish_close(auction_id).await?;

        match &settlement.winner {
            Some(w) => info!(
                "{:<12} --> 낙찰 확정: auction_id={} member_id={} amount={}",
                "Closer", auction_id, w.member_id, w.amount
            ),
            None => info!("{:<12} --> 유찰 처리: auction_id={}", "Closer", auction_id),
        }
        let _ = self.events.send(SettlementEvent::AuctionClosed {
            auction_id,
            reason: settlement.reason,
            winner_id: settlement.winner.map(|w| w.member_id),
            amount: settlement.winner.map(|w| w.amount),
            timestamp: now,
        });
        Ok(true)
    }

    /// 낙찰자/판매자 신뢰 점수 반영 (경매 단위 dedup 키로 멱등)
    async fn reward(&self, settlement: &CloseSettlement) -> Result<(), SettleError> {
        let winner = match &settlement.winner {
            Some(w) => w,
            None => return Ok(()),
        };
        let winner_key = format!("auction:{}:winner", settlement.auction_id);
        self.trust
            .apply_delta_once(winner.member_id, self.config.winner_trust_delta, &winner_key)
            .await?;
        let seller_key = format!("auction:{}:seller", settlement.auction_id);
        self.trust
            .apply_delta_once(
                settlement.seller_id,
                self.config.seller_trust_delta,
                &seller_key,
            )
            .await?;
        Ok(())
    }
}

// endregion: --- Auction Closer
