use async_trait::async_trait;

use crate::error::SettleError;

pub mod memory;
pub mod redis;
pub mod script;

// region:    --- Counter Types

/// 카운터 해시에 적재하는 경매 메타
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuctionMeta {
    pub auction_id: i64,
    pub ended: bool,
    pub start_ms: i64,
    pub end_ms: i64,
    pub current_price: i64,
    pub bid_unit: i64,
    /// 0이면 즉시 구매 불가
    pub buy_now_price: i64,
}

/// 원자 판정 입력
#[derive(Debug, Clone)]
pub struct BidAttempt {
    pub auction_id: i64,
    pub bidder_id: i64,
    pub amount: i64,
    pub request_id: String,
    pub now_ms: i64,
}

/// 원자 판정 결과
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BidVerdict {
    /// 수락 (가격 갱신 및 큐 적재 완료)
    Accepted { price: i64, buy_now: bool },
    /// 동일 request_id 재시도 (price는 최초 수락 가격)
    Duplicate { price: i64 },
    /// 해시 미존재 (관계형 스토어에서 워밍 필요)
    Missing,
    /// 입찰 가능 시간이 아님
    NotRunning { price: i64 },
    /// 현재가 이하
    TooLow { price: i64 },
    /// 현재가 초과지만 최소 증가 단위 미달
    BelowIncrement { price: i64 },
}

// endregion: --- Counter Types

// region:    --- Counter Store

/// 원자 카운터 스토어 경계
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// 해시가 없을 때만 경매 메타 적재
    async fn seed(&self, meta: &AuctionMeta) -> Result<bool, SettleError>;

    /// 멱등 검사 → 판정 → 가격 갱신 → 큐 적재를 단일 원자 단위로 실행
    async fn execute_bid(&self, attempt: &BidAttempt) -> Result<BidVerdict, SettleError>;

    /// 종료 플래그 기록 (이후 입찰은 NotRunning)
    async fn mark_ended(&self, auction_id: i64) -> Result<(), SettleError>;

    /// 종료 시각 연장 반영
    async fn extend_end(&self, auction_id: i64, end_ms: i64) -> Result<(), SettleError>;

    /// 카운터 가격을 내구 가격으로 강제 덮어쓰기 (해시가 있을 때만)
    async fn sync_price(&self, auction_id: i64, price: i64) -> Result<(), SettleError>;

    /// 수락 페이로드 팝 (재시도 큐 우선)
    async fn pop_accepted(&self, auction_id: i64) -> Result<Option<String>, SettleError>;

    /// 재시도 큐 적재 (대기 셋 복원 포함)
    async fn push_retry(&self, auction_id: i64, raw: &str) -> Result<(), SettleError>;

    /// 데드레터 큐 적재
    async fn push_dead(&self, auction_id: i64, raw: &str) -> Result<(), SettleError>;

    /// 드레인 대상 경매 목록 회수 (회수 즉시 대기 셋에서 제거)
    async fn take_pending(&self) -> Result<Vec<i64>, SettleError>;
}

// endregion: --- Counter Store

/// 판정 순서: 시간 → 즉시 구매 → 현재가 → 증가 단위
pub fn decide(meta: &AuctionMeta, amount: i64, now_ms: i64) -> BidVerdict {
    if meta.ended || now_ms < meta.start_ms || now_ms >= meta.end_ms {
        return BidVerdict::NotRunning {
            price: meta.current_price,
        };
    }
    if meta.buy_now_price > 0
        && amount >= meta.buy_now_price
        && meta.buy_now_price > meta.current_price
    {
        return BidVerdict::Accepted {
            price: meta.buy_now_price,
            buy_now: true,
        };
    }
    if amount <= meta.current_price {
        return BidVerdict::TooLow {
            price: meta.current_price,
        };
    }
    if amount < meta.current_price + meta.bid_unit {
        return BidVerdict::BelowIncrement {
            price: meta.current_price,
        };
    }
    BidVerdict::Accepted {
        price: amount,
        buy_now: false,
    }
}
