use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::Row;

use crate::auction::model::{Auction, AuctionBid, AuctionStatus, CloseReason, WinnerSnapshot};
use crate::bidding::model::AcceptedBid;
use crate::counter::AuctionMeta;
use crate::database::store::{
    ApplyOutcome, CloseSettlement, ExtensionPolicy, ListingRef, SettledWinner, SettlementStore,
};
use crate::database::DatabaseManager;
use crate::error::SettleError;

// region:    --- SQL

const SELECT_META: &str = "SELECT current_price, bid_unit, buy_now_price, start_at, end_at, status FROM auctions WHERE id = $1";

const SELECT_LISTING_REF: &str = "SELECT category_id, card_id FROM auctions WHERE id = $1";

const LOCK_AUCTION: &str = "SELECT id, seller_id, category_id, card_id, starting_price, current_price, bid_unit, buy_now_price, start_at, end_at, status, closing_at, created_at FROM auctions WHERE id = $1 FOR UPDATE";

const FIND_BID_BY_EVENT: &str =
    "SELECT id FROM auction_bids WHERE auction_id = $1 AND event_id = $2";

const INSERT_BID: &str = "INSERT INTO auction_bids (auction_id, bidder_id, amount, event_id, created_at) VALUES ($1, $2, $3, $4, $5) RETURNING id";

const RAISE_PRICE: &str =
    "UPDATE auctions SET current_price = GREATEST(current_price, $2) WHERE id = $1";

const BUY_NOW_SETTLE: &str = "UPDATE auctions SET current_price = GREATEST(current_price, $2), end_at = LEAST(end_at, $3) WHERE id = $1";

const EXTEND_END: &str = "UPDATE auctions SET end_at = $2 WHERE id = $1";

const DUE_AUCTIONS: &str = "SELECT id FROM auctions WHERE (status = 'OPEN' AND end_at <= $1) OR (status = 'CLOSING' AND closing_at <= $2) ORDER BY end_at ASC LIMIT $3";

const BEGIN_CLOSE: &str = "UPDATE auctions SET status = 'CLOSING', closing_at = $2 WHERE id = $1 AND ((status = 'OPEN' AND end_at <= $2) OR (status = 'CLOSING' AND closing_at <= $3))";

const SELECT_SNAPSHOT: &str = "SELECT auction_id, bid_id, member_id, amount, reason, created_at FROM winner_snapshots WHERE auction_id = $1";

const TOP_BID: &str = "SELECT id, auction_id, bidder_id, amount, event_id, created_at FROM auction_bids WHERE auction_id = $1 ORDER BY amount DESC, created_at ASC, id ASC LIMIT 1";

const INSERT_SNAPSHOT: &str = "INSERT INTO winner_snapshots (auction_id, bid_id, member_id, amount, reason, created_at) VALUES ($1, $2, $3, $4, $5, $6) ON CONFLICT (auction_id) DO NOTHING";

const INSERT_TRADE: &str = "INSERT INTO trades (auction_id, bid_id, seller_id, buyer_id, amount, created_at) VALUES ($1, $2, $3, $4, $5, $6) ON CONFLICT (auction_id) DO NOTHING";

const FINISH_CLOSE: &str =
    "UPDATE auctions SET status = 'CLOSED' WHERE id = $1 AND status = 'CLOSING'";

// endregion: --- SQL

// region:    --- Postgres Settlement Store

/// PostgreSQL 기반 정산 스토어
pub struct PostgresSettlementStore {
    db: Arc<DatabaseManager>,
}

impl PostgresSettlementStore {
    pub fn new(db: Arc<DatabaseManager>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl SettlementStore for PostgresSettlementStore {
    async fn auction_meta(&self, auction_id: i64) -> Result<Option<AuctionMeta>, SettleError> {
        let row = sqlx::query(SELECT_META)
            .bind(auction_id)
            .fetch_optional(self.db.pool())
            .await?;
        let row = match row {
            Some(r) => r,
            None => return Ok(None),
        };
        let status: String = row.get("status");
        let buy_now: Option<i64> = row.get("buy_now_price");
        let start_at: DateTime<Utc> = row.get("start_at");
        let end_at: DateTime<Utc> = row.get("end_at");
        Ok(Some(AuctionMeta {
            auction_id,
            ended: status != AuctionStatus::Open.as_str(),
            start_ms: start_at.timestamp_millis(),
            end_ms: end_at.timestamp_millis(),
            current_price: row.get("current_price"),
            bid_unit: row.get("bid_unit"),
            buy_now_price: buy_now.unwrap_or(0),
        }))
    }

    async fn listing_ref(&self, auction_id: i64) -> Result<Option<ListingRef>, SettleError> {
        let row = sqlx::query(SELECT_LISTING_REF)
            .bind(auction_id)
            .fetch_optional(self.db.pool())
            .await?;
        Ok(row.map(|r| ListingRef {
            category_id: r.get("category_id"),
            card_id: r.get("card_id"),
        }))
    }

    async fn apply_accepted_bid(
        &self,
        bid: &AcceptedBid,
        policy: &ExtensionPolicy,
    ) -> Result<ApplyOutcome, SettleError> {
        let bid = bid.clone();
        let policy = *policy;
        self.db
            .transaction::<_, _, SettleError>(move |tx| {
                Box::pin(async move {
                    let auction = sqlx::query_as::<_, Auction>(LOCK_AUCTION)
                        .bind(bid.auction_id)
                        .fetch_optional(&mut **tx)
                        .await?;
                    let auction = match auction {
                        Some(a) => a,
                        None => return Err(SettleError::AuctionNotFound(bid.auction_id)),
                    };

                    // 스냅샷 존재 여부가 마감 확정의 기준점
                    if auction.status == AuctionStatus::Closed.as_str() {
                        return Ok(ApplyOutcome::TooLate);
                    }
                    let settled = sqlx::query(SELECT_SNAPSHOT)
                        .bind(bid.auction_id)
                        .fetch_optional(&mut **tx)
                        .await?;
                    if settled.is_some() {
                        return Ok(ApplyOutcome::TooLate);
                    }

                    let dup = sqlx::query(FIND_BID_BY_EVENT)
                        .bind(bid.auction_id)
                        .bind(&bid.event_id)
                        .fetch_optional(&mut **tx)
                        .await?;
                    if dup.is_some() {
                        return Ok(ApplyOutcome::Duplicate);
                    }

                    let occurred = bid.occurred_at();
                    let bid_id = sqlx::query_scalar::<_, i64>(INSERT_BID)
                        .bind(bid.auction_id)
                        .bind(bid.member_id)
                        .bind(bid.amount)
                        .bind(&bid.event_id)
                        .bind(occurred)
                        .fetch_one(&mut **tx)
                        .await?;

                    if bid.buy_now {
                        // 즉시 구매: 종료 시각을 수락 시점으로 당겨 다음 스위프에서 마감
                        sqlx::query(BUY_NOW_SETTLE)
                            .bind(bid.auction_id)
                            .bind(bid.amount)
                            .bind(occurred)
                            .execute(&mut **tx)
                            .await?;
                        return Ok(ApplyOutcome::Applied {
                            bid_id,
                            extended_to: None,
                        });
                    }

                    // 재시도 큐에서 순서가 뒤섞여도 가격은 단조 증가
                    sqlx::query(RAISE_PRICE)
                        .bind(bid.auction_id)
                        .bind(bid.amount)
                        .execute(&mut **tx)
                        .await?;

                    let mut extended_to = None;
                    if policy.enabled
                        && auction.status == AuctionStatus::Open.as_str()
                        && occurred < auction.end_at
                        && auction.end_at - occurred <= policy.threshold()
                    {
                        let new_end = auction.end_at + policy.extend_by();
                        sqlx::query(EXTEND_END)
                            .bind(bid.auction_id)
                            .bind(new_end)
                            .execute(&mut **tx)
                            .await?;
                        extended_to = Some(new_end);
                    }

                    Ok(ApplyOutcome::Applied { bid_id, extended_to })
                })
            })
            .await
    }

    async fn due_auctions(
        &self,
        now: DateTime<Utc>,
        reclaim_before: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<i64>, SettleError> {
        let rows = sqlx::query(DUE_AUCTIONS)
            .bind(now)
            .bind(reclaim_before)
            .bind(limit)
            .fetch_all(self.db.pool())
            .await?;
        Ok(rows.iter().map(|r| r.get::<i64, _>("id")).collect())
    }

    async fn begin_close(
        &self,
        auction_id: i64,
        now: DateTime<Utc>,
        reclaim_before: DateTime<Utc>,
    ) -> Result<bool, SettleError> {
        let done = sqlx::query(BEGIN_CLOSE)
            .bind(auction_id)
            .bind(now)
            .bind(reclaim_before)
            .execute(self.db.pool())
            .await?;
        Ok(done.rows_affected() == 1)
    }

    async fn settle_close(
        &self,
        auction_id: i64,
        now: DateTime<Utc>,
    ) -> Result<CloseSettlement, SettleError> {
        self.db
            .transaction::<_, _, SettleError>(move |tx| {
                Box::pin(async move {
                    let auction = sqlx::query_as::<_, Auction>(LOCK_AUCTION)
                        .bind(auction_id)
                        .fetch_optional(&mut **tx)
                        .await?;
                    let auction = match auction {
                        Some(a) => a,
                        None => return Err(SettleError::AuctionNotFound(auction_id)),
                    };

                    // 이전 시도가 남긴 스냅샷은 그대로 재사용한다
                    let existing = sqlx::query_as::<_, WinnerSnapshot>(SELECT_SNAPSHOT)
                        .bind(auction_id)
                        .fetch_optional(&mut **tx)
                        .await?;
                    if let Some(snap) = existing {
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
                            sqlx::query(INSERT_TRADE)
                                .bind(auction_id)
                                .bind(w.bid_id)
                                .bind(auction.seller_id)
                                .bind(w.member_id)
                                .bind(w.amount)
                                .bind(now)
                                .execute(&mut **tx)
                                .await?;
                        }
                        return Ok(CloseSettlement {
                            auction_id,
                            seller_id: auction.seller_id,
                            reason,
                            winner,
                        });
                    }

                    let top = sqlx::query_as::<_, AuctionBid>(TOP_BID)
                        .bind(auction_id)
                        .fetch_optional(&mut **tx)
                        .await?;
                    match top {
                        Some(best) => {
                            sqlx::query(INSERT_SNAPSHOT)
                                .bind(auction_id)
                                .bind(best.id)
                                .bind(best.bidder_id)
                                .bind(best.amount)
                                .bind(CloseReason::Sold.as_str())
                                .bind(now)
                                .execute(&mut **tx)
                                .await?;
                            sqlx::query(INSERT_TRADE)
                                .bind(auction_id)
                                .bind(best.id)
                                .bind(auction.seller_id)
                                .bind(best.bidder_id)
                                .bind(best.amount)
                                .bind(now)
                                .execute(&mut **tx)
                                .await?;
                            Ok(CloseSettlement {
                                auction_id,
                                seller_id: auction.seller_id,
                                reason: CloseReason::Sold,
                                winner: Some(SettledWinner {
                                    bid_id: best.id,
                                    member_id: best.bidder_id,
                                    amount: best.amount,
                                }),
                            })
                        }
                        None => {
                            sqlx::query(INSERT_SNAPSHOT)
                                .bind(auction_id)
                                .bind(Option::<i64>::None)
                                .bind(Option::<i64>::None)
                                .bind(Option::<i64>::None)
                                .bind(CloseReason::NoBids.as_str())
                                .bind(now)
                                .execute(&mut **tx)
                                .await?;
                            Ok(CloseSettlement {
                                auction_id,
                                seller_id: auction.seller_id,
                                reason: CloseReason::NoBids,
                                winner: None,
                            })
                        }
                    }
                })
            })
            .await
    }

    async fn finish_close(&self, auction_id: i64) -> Result<bool, SettleError> {
        let done = sqlx::query(FINISH_CLOSE)
            .bind(auction_id)
            .execute(self.db.pool())
            .await?;
        Ok(done.rows_affected() == 1)
    }
}

// endregion: --- Postgres Settlement Store
