use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 경매 상태 머신: OPEN → CLOSING → CLOSED
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuctionStatus {
    Open,
    Closing,
    Closed,
}

impl AuctionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuctionStatus::Open => "OPEN",
            AuctionStatus::Closing => "CLOSING",
            AuctionStatus::Closed => "CLOSED",
        }
    }

    pub fn parse(s: &str) -> Option<AuctionStatus> {
        match s {
            "OPEN" => Some(AuctionStatus::Open),
            "CLOSING" => Some(AuctionStatus::Closing),
            "CLOSED" => Some(AuctionStatus::Closed),
            _ => None,
        }
    }
}

/// 경매 마감 사유
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CloseReason {
    /// 낙찰
    Sold,
    /// 유찰 (입찰 없음)
    NoBids,
}

impl CloseReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            CloseReason::Sold => "SOLD",
            CloseReason::NoBids => "NO_BIDS",
        }
    }

    pub fn parse(s: &str) -> Option<CloseReason> {
        match s {
            "SOLD" => Some(CloseReason::Sold),
            "NO_BIDS" => Some(CloseReason::NoBids),
            _ => None,
        }
    }
}

/// 경매 모델
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Auction {
    pub id: i64,
    pub seller_id: i64,
    pub category_id: i64,
    pub card_id: i64,
    pub starting_price: i64,
    pub current_price: i64,
    /// 최소 증가 단위
    pub bid_unit: i64,
    /// 즉시 구매가 (없으면 일반 입찰만 허용)
    pub buy_now_price: Option<i64>,
    pub start_at: DateTime<Utc>,
    pub end_at: DateTime<Utc>,
    pub status: String,
    /// CLOSING 선점 시각 (유예 경과 후 회수 기준)
    pub closing_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// 수락된 입찰 행 (거절된 시도는 행을 남기지 않는다)
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct AuctionBid {
    pub id: i64,
    pub auction_id: i64,
    pub bidder_id: i64,
    pub amount: i64,
    /// 수락 시 발급된 멱등 식별자
    pub event_id: String,
    pub created_at: DateTime<Utc>,
}

/// 낙찰 스냅샷 (유찰이면 승자 필드는 NULL)
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct WinnerSnapshot {
    pub auction_id: i64,
    pub bid_id: Option<i64>,
    pub member_id: Option<i64>,
    pub amount: Option<i64>,
    pub reason: String,
    pub created_at: DateTime<Utc>,
}

/// 낙찰 거래 기록
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct TradeRecord {
    pub id: i64,
    pub auction_id: i64,
    pub bid_id: i64,
    pub seller_id: i64,
    pub buyer_id: i64,
    pub amount: i64,
    pub created_at: DateTime<Utc>,
}
