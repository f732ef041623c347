use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::auction::model::{Auction, AuctionBid, AuctionStatus, CloseReason, TradeRecord, WinnerSnapshot};
use crate::bidding::model::AcceptedBid;
use crate::counter::AuctionMeta;
use crate::database::store::{
    ApplyOutcome, CloseSettlement, ExtensionPolicy, ListingRef, SettledWinner, SettlementStore,
};
use crate::error::SettleError;

/// 테스트/로컬 구동용 인메모리 정산 스토어
///
/// 단일 뮤텍스가 행 잠금을 대신하므로 Postgres 구현과 같은 직렬화 순서를 가진다.
#[derive(Default)]
pub struct MemorySettlementStore {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    auctions: HashMap<i64, Auction>,
    bids: Vec<AuctionBid>,
    next_bid_id: i64,
    snapshots: HashMap<i64, WinnerSnapshot>,
    trades: HashMap<i64, TradeRecord>,
    next_trade_id: i64,
}

impl MemorySettlementStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 경매 등록 (테스트 픽스처)
    pub fn insert_auction(&self, auction: Auction) {
        let mut g = self.inner.lock().unwrap();
        g.auctions.insert(auction.id, auction);
    }

    /// 경매 조회 (검증용)
    pub fn auction(&self, auction_id: i64) -> Option<Auction> {
        let g = self.inner.lock().unwrap();
        g.auctions.get(&auction_id).cloned()
    }

    /// 입찰 행 목록 (검증용, 반영 순서)
    pub fn bids_of(&self, auction_id: i64) -> Vec<AuctionBid> {
        let g = self.inner.lock().unwrap();
        g.bids
            .iter()
            .filter(|b| b.auction_id == auction_id)
            .cloned()
            .collect()
    }

    /// 낙찰 스냅샷 (검증용)
    pub fn snapshot_of(&self, auction_id: i64) -> Option<WinnerSnapshot> {
        let g = self.inner.lock().unwrap();
        g.snapshots.get(&auction_id).cloned()
    }

    /// 거래 기록 (검증용)
    pub fn trade_of(&self, auction_id: i64) -> Option<TradeRecord> {
        let g = self.inner.lock().unwrap();
        g.trades.get(&auction_id).cloned()
    }

    /// 상태 강제 변경 (중단 시나리오 재현용)
    pub fn set_status(
        &self,
        auction_id: i64,
        status: AuctionStatus,
        closing_at: Option<DateTime<Utc>>,
    ) {
        let mut g = self.inner.lock().unwrap();
        if let Some(a) = g.auctions.get_mut(&auction_id) {
            a.status = status.as_str().to_string();
            a.closing_at = closing_at;
        }
    }
}

#[async_trait]
impl SettlementStore for MemorySettlementStore {
    async fn auction_meta(&self, auction_id: i64) -> Result<Option<AuctionMeta>, SettleError> {
        let g = self.inner.lock().unwrap();
        Ok(g.auctions.get(&auction_id).map(|a| AuctionMeta {
            auction_id,
            ended: a.status != AuctionStatus::Open.as_str(),
            start_ms: a.start_at.timestamp_millis(),
            end_ms: a.end_at.timestamp_millis(),
            current_price: a.current_price,
            bid_unit: a.bid_unit,
            buy_now_price: a.buy_now_price.unwrap_or(0),
        }))
    }

    async fn listing_ref(&self, auction_id: i64) -> Result<Option<ListingRef>, SettleError> {
        let g = self.inner.lock().unwrap();
        Ok(g.auctions.get(&auction_id).map(|a| ListingRef {
            category_id: a.category_id,
            card_id: a.card_id,
        }))
    }

    async fn apply_accepted_bid(
        &self,
        bid: &AcceptedBid,
        policy: &ExtensionPolicy,
    ) -> Result<ApplyOutcome, SettleError> {
        let mut g = self.inner.lock().unwrap();
        let auction = match g.auctions.get(&bid.auction_id) {
            Some(a) => a.clone(),
            None => return Err(SettleError::AuctionNotFound(bid.auction_id)),
        };
        if auction.status == AuctionStatus::Closed.as_str()
            || g.snapshots.contains_key(&bid.auction_id)
        {
            return Ok(ApplyOutcome::TooLate);
        }
        if g.bids
            .iter()
            .any(|b| b.auction_id == bid.auction_id && b.event_id == bid.event_id)
        {
            return Ok(ApplyOutcome::Duplicate);
        }

        let occurred = bid.occurred_at();
        g.next_bid_id += 1;
        let bid_id = g.next_bid_id;
        g.bids.push(AuctionBid {
            id: bid_id,
            auction_id: bid.auction_id,
            bidder_id: bid.member_id,
            amount: bid.amount,
            event_id: bid.event_id.clone(),
            created_at: occurred,
        });

        let mut extended_to = None;
        if let Some(a) = g.auctions.get_mut(&bid.auction_id) {
            a.current_price = a.current_price.max(bid.amount);
            if bid.buy_now {
                if occurred < a.end_at {
                    a.end_at = occurred;
                }
            } else if policy.enabled
                && a.status == AuctionStatus::Open.as_str()
                && occurred < a.end_at
                && a.end_at - occurred <= policy.threshold()
            {
                a.end_at = a.end_at + policy.extend_by();
                extended_to = Some(a.end_at);
            }
        }
        Ok(ApplyOutcome::Applied { bid_id, extended_to })
    }

    async fn due_auctions(
        &self,
        now: DateTime<Utc>,
        reclaim_before: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<i64>, SettleError> {
        let g = self.inner.lock().unwrap();
        let mut due: Vec<(DateTime<Utc>, i64)> = g
            .auctions
            .values()
            .filter(|a| {
                (a.status == AuctionStatus::Open.as_str() && a.end_at <= now)
                    || (a.status == AuctionStatus::Closing.as_str()
                        && a.closing_at.map(|c| c <= reclaim_before).unwrap_or(false))
            })
            .map(|a| (a.end_at, a.id))
            .collect();
        due.sort();
        due.truncate(limit.max(0) as usize);
        Ok(due.into_iter().map(|(_, id)| id).collect())
    }

    async fn begin_close(
        &self,
        auction_id: i64,
        now: DateTime<Utc>,
        reclaim_before: DateTime<Utc>,
    ) -> Result<bool, SettleError> {
        let mut g = self.inner.lock().unwrap();
        let auction = match g.auctions.get_mut(&auction_id) {
            Some(a) => a,
            None => return Ok(false),
        };
        let claimable = (auction.status == AuctionStatus::Open.as_str() && auction.end_at <= now)
            || (auction.status == AuctionStatus::Closing.as_str()
                && auction
                    .closing_at
                    .map(|c| c <= reclaim_before)
                    .unwrap_or(false));
        if !claimable {
            return Ok(false);
        }
        auction.status = AuctionStatus::Closing.as_str().to_string();
        auction.closing_at = Some(now);
        Ok(true)
    }

    async fn settle_close(
        &self,
        auction_id: i64,
        now: DateTime<Utc>,
    ) -> Result<CloseSettlement, SettleError> {
        let mut g = self.inner.lock().unwrap();
        let seller_id = match g.auctions.get(&auction_id) {
            Some(a) => a.seller_id,
            None => return Err(SettleError::AuctionNotFound(auction_id)),
        };

        if let Some(snap) = g.snapshots.get(&auction_id).cloned() {
            let reason = match CloseReason::parse(&snap.reason) {
                Some(r) => r,
                None => {
                    return Err(SettleError::Inconsistent(format!(
                        "알 수 없는 마감 사유: {}",
                        snap.reason
                    )))
                }
            };
            let winner = match (snap.bid_id, snap.member_id, snap.amount) {
                (Some(bid_id), Some(member_id), Some(amount)) => Some(SettledWinner {
                    bid_id,
                    member_id,
                    amount,
                }),
                _ => None,
            };
            if let Some(w) = winner {
                ensure_trade(&mut g, auction_id, seller_id, w, now);
            }
            return Ok(CloseSettlement {
                auction_id,
                seller_id,
                reason,
                winner,
            });
        }

        let mut candidates: Vec<&AuctionBid> = g
            .bids
            .iter()
            .filter(|b| b.auction_id == auction_id)
            .collect();
        candidates.sort_by(|a, b| {
            b.amount
                .cmp(&a.amount)
                .then(a.created_at.cmp(&b.created_at))
                .then(a.id.cmp(&b.id))
        });

        match candidates.first().map(|b| (*b).clone()) {
            Some(best) => {
                let winner = SettledWinner {
                    bid_id: best.id,
                    member_id: best.bidder_id,
                    amount: best.amount,
                };
                g.snapshots.insert(
                    auction_id,
                    WinnerSnapshot {
                        auction_id,
                        bid_id: Some(best.id),
                        member_id: Some(best.bidder_id),
                        amount: Some(best.amount),
                        reason: CloseReason::Sold.as_str().to_string(),
                        created_at: now,
                    },
                );
                ensure_trade(&mut g, auction_id, seller_id, winner, now);
                Ok(CloseSettlement {
                    auction_id,
                    seller_id,
                    reason: CloseReason::Sold,
                    winner: Some(winner),
                })
            }
            None => {
                g.snapshots.insert(
                    auction_id,
                    WinnerSnapshot {
                        auction_id,
                        bid_id: None,
                        member_id: None,
                        amount: None,
                        reason: CloseReason::NoBids.as_str().to_string(),
                        created_at: now,
                    },
                );
                Ok(CloseSettlement {
                    auction_id,
                    seller_id,
                    reason: CloseReason::NoBids,
                    winner: None,
                })
            }
        }
    }

    async fn finish_close(&self, auction_id: i64) -> Result<bool, SettleError> {
        let mut g = self.inner.lock().unwrap();
        match g.auctions.get_mut(&auction_id) {
            Some(a) if a.status == AuctionStatus::Closing.as_str() => {
                a.status = AuctionStatus::Closed.as_str().to_string();
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

fn ensure_trade(
    g: &mut Inner,
    auction_id: i64,
    seller_id: i64,
    winner: SettledWinner,
    now: DateTime<Utc>,
) {
    if g.trades.contains_key(&auction_id) {
        return;
    }
    g.next_trade_id += 1;
    let trade = TradeRecord {
        id: g.next_trade_id,
        auction_id,
        bid_id: winner.bid_id,
        seller_id,
        buyer_id: winner.member_id,
        amount: winner.amount,
        created_at: now,
    };
    g.trades.insert(auction_id, trade);
}
