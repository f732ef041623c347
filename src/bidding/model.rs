use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// 입찰 제출 명령
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SubmitBidCommand {
    pub auction_id: i64,
    pub bidder_id: i64,
    pub amount: i64,
    /// 호출자가 발급하는 멱등 키
    pub request_id: String,
}

/// 입찰 거절 사유
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RejectReason {
    /// 입찰 가능 시간이 아니거나 이미 종료됨
    AuctionClosed,
    /// 현재가 이하
    PriceTooLow,
    /// 현재가 초과지만 최소 증가 단위 미달
    BelowMinIncrement,
}

impl RejectReason {
    pub fn code(&self) -> &'static str {
        match self {
            RejectReason::AuctionClosed => "AUCTION_CLOSED",
            RejectReason::PriceTooLow => "PRICE_TOO_LOW",
            RejectReason::BelowMinIncrement => "BELOW_MIN_INCREMENT",
        }
    }
}

/// 입찰 처리 결과
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BidOutcome {
    /// 수락 (price는 수락 후 현재가, 즉시 구매면 즉시 구매가)
    Accepted { price: i64 },
    /// 동일 request_id 재시도 (price는 최초 수락 가격)
    Duplicate { price: i64 },
    /// 거절 (가격과 큐에 아무 흔적도 남지 않음)
    Rejected {
        reason: RejectReason,
        current_price: i64,
    },
}

/// 카운터 스크립트가 수락 큐에 적재하는 페이로드
///
/// 필드 이름은 스크립트의 cjson 인코딩과 일치해야 한다.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AcceptedBid {
    pub auction_id: i64,
    pub member_id: i64,
    pub amount: i64,
    pub event_id: String,
    /// 수락 시각 (epoch millis)
    pub ts: i64,
    pub buy_now: bool,
}

impl AcceptedBid {
    pub fn occurred_at(&self) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(self.ts)
            .single()
            .unwrap_or_else(Utc::now)
    }
}
