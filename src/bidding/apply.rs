/// 수락 큐 소비
/// 1. 드레인 대상 경매 회수
/// 2. 재시도 큐 우선 드레인
/// 3. 내구 반영 (경매 행 잠금 + event_id 멱등)
/// 4. 영구 실패는 데드레터 이동 후 카운터 가격 재수렴
// region:    --- Imports
use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::{debug, error, warn};

use crate::auction::events::SettlementEvent;
use crate::bidding::model::AcceptedBid;
use crate::counter::CounterStore;
use crate::database::store::{ApplyOutcome, ExtensionPolicy, SettlementStore};
use crate::error::SettleError;
// endregion: --- Imports

// region:    --- Bid Applier

/// 수락 페이로드 내구 반영기
pub struct BidApplier<C, S> {
    counter: Arc<C>,
    store: Arc<S>,
    policy: ExtensionPolicy,
    events: broadcast::Sender<SettlementEvent>,
}

impl<C: CounterStore, S: SettlementStore> BidApplier<C, S> {
    pub fn new(
        counter: Arc<C>,
        store: Arc<S>,
        policy: ExtensionPolicy,
        events: broadcast::Sender<SettlementEvent>,
    ) -> Self {
        Self {
            counter,
            store,
            policy,
            events,
        }
    }

    /// 대기 중인 모든 경매 큐 드레인 (경매 단위 격리)
    pub async fn drain_once(&self) -> Result<usize, SettleError> {
        let ids = self.counter.take_pending().await?;
        let mut applied = 0;
        for auction_id in ids {
            match self.drain_auction(auction_id).await {
                Ok(n) => applied += n,
                Err(e) => error!(
                    "{:<12} --> 큐 드레인 실패: auction_id={} err={:?}",
                    "Applier", auction_id, e
                ),
            }
        }
        Ok(applied)
    }

    /// 단일 경매 큐 드레인 (마감 직전 경로에서도 호출)
    pub async fn drain_auction(&self, auction_id: i64) -> Result<usize, SettleError> {
        let mut applied = 0;
        loop {
            let raw = match self.counter.pop_accepted(auction_id).await? {
                Some(raw) => raw,
                None => break,
            };
            let bid: AcceptedBid = match serde_json::from_str(&raw) {
                Ok(b) => b,
                Err(e) => {
                    warn!(
                        "{:<12} --> 페이로드 해석 실패, 데드레터 이동: auction_id={} err={}",
                        "Applier", auction_id, e
                    );
                    self.counter.push_dead(auction_id, &raw).await?;
                    self.resync_price(auction_id).await;
                    continue;
                }
            };
            match self.store.apply_accepted_bid(&bid, &self.policy).await {
                Ok(ApplyOutcome::Applied { bid_id, extended_to }) => {
                    applied += 1;
                    debug!(
                        "{:<12} --> 입찰 내구 반영: auction_id={} bid_id={} amount={}",
                        "Applier", auction_id, bid_id, bid.amount
                    );
                    if let Some(new_end) = extended_to {
                        if let Err(e) = self
                            .counter
                            .extend_end(auction_id, new_end.timestamp_millis())
                            .await
                        {
                            warn!(
                                "{:<12} --> 카운터 종료 시각 연장 실패: auction_id={} err={:?}",
                                "Applier", auction_id, e
                            );
                        }
                    }
                    let _ = self.events.send(SettlementEvent::BidSettled {
                        auction_id,
                        bidder_id: bid.member_id,
                        amount: bid.amount,
                        timestamp: bid.occurred_at(),
                    });
                }
                Ok(ApplyOutcome::Duplicate) => {
                    debug!(
                        "{:<12} --> 중복 event_id 스킵: auction_id={} event_id={}",
                        "Applier", auction_id, bid.event_id
                    );
                }
                Ok(ApplyOutcome::TooLate) => {
                    warn!(
                        "{:<12} --> 마감 확정 이후 도착, 데드레터 이동: auction_id={} event_id={}",
                        "Applier", auction_id, bid.event_id
                    );
                    self.counter.push_dead(auction_id, &raw).await?;
                }
                Err(e) if e.is_retryable() => {
                    // 일시 오류는 재시도 큐로 보존하고 이 경매는 다음 틱에 재개
                    warn!(
                        "{:<12} --> 일시 오류, 재시도 큐 적재: auction_id={} err={:?}",
                        "Applier", auction_id, e
                    );
                    self.counter.push_retry(auction_id, &raw).await?;
                    return Ok(applied);
                }
                Err(e) => {
                    error!(
                        "{:<12} --> 영구 오류, 데드레터 이동: auction_id={} err={:?}",
                        "Applier", auction_id, e
                    );
                    self.counter.push_dead(auction_id, &raw).await?;
                    self.resync_price(auction_id).await;
                }
            }
        }
        Ok(applied)
    }

    /// 데드레터 보상: 카운터 가격을 내구 가격으로 재수렴
    ///
    /// 반영되지 못한 수락이 올린 카운터 가격은 어떤 내구 행도 뒷받침하지
    /// 않는다. 재수렴 실패는 경고만 남긴다.
    async fn resync_price(&self, auction_id: i64) {
        let price = match self.store.auction_meta(auction_id).await {
            Ok(Some(meta)) => meta.current_price,
            Ok(None) => return,
            Err(e) => {
                warn!(
                    "{:<12} --> 카운터 가격 재수렴 조회 실패: auction_id={} err={:?}",
                    "Applier", auction_id, e
                );
                return;
            }
        };
        if let Err(e) = self.counter.sync_price(auction_id, price).await {
            warn!(
                "{:<12} --> 카운터 가격 재수렴 실패: auction_id={} err={:?}",
                "Applier", auction_id, e
            );
        }
    }
}

// endregion: --- Bid Applier
