use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

use crate::auction::model::CloseReason;
use crate::bidding::model::AcceptedBid;
use crate::counter::AuctionMeta;
use crate::error::SettleError;

// region:    --- Store Types

/// 인기도 기록용 리스팅 참조
#[derive(Debug, Clone, Copy)]
pub struct ListingRef {
    pub category_id: i64,
    pub card_id: i64,
}

/// 마감 임박 연장 정책
#[derive(Debug, Clone, Copy)]
pub struct ExtensionPolicy {
    pub enabled: bool,
    /// 종료까지 남은 시간이 이 값 이하일 때 연장
    pub threshold_secs: i64,
    pub extend_secs: i64,
}

impl ExtensionPolicy {
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            threshold_secs: 0,
            extend_secs: 0,
        }
    }

    pub fn threshold(&self) -> Duration {
        Duration::seconds(self.threshold_secs)
    }

    pub fn extend_by(&self) -> Duration {
        Duration::seconds(self.extend_secs)
    }
}

/// 수락 페이로드 내구 반영 결과
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// 입찰 행 생성 완료 (연장 발생 시 새 종료 시각 포함)
    Applied {
        bid_id: i64,
        extended_to: Option<DateTime<Utc>>,
    },
    /// 동일 event_id 행이 이미 존재
    Duplicate,
    /// 낙찰 확정 이후 도착 (데드레터 대상)
    TooLate,
}

/// 낙찰 확정 결과
#[derive(Debug, Clone)]
pub struct CloseSettlement {
    pub auction_id: i64,
    pub seller_id: i64,
    pub reason: CloseReason,
    pub winner: Option<SettledWinner>,
}

#[derive(Debug, Clone, Copy)]
pub struct SettledWinner {
    pub bid_id: i64,
    pub member_id: i64,
    pub amount: i64,
}

// endregion: --- Store Types

// region:    --- Settlement Store

/// 관계형 정산 스토어 경계
#[async_trait]
pub trait SettlementStore: Send + Sync {
    /// 카운터 워밍용 경매 메타 조회
    async fn auction_meta(&self, auction_id: i64) -> Result<Option<AuctionMeta>, SettleError>;

    /// 인기도 기록용 리스팅 참조 조회
    async fn listing_ref(&self, auction_id: i64) -> Result<Option<ListingRef>, SettleError>;

    /// 수락 페이로드 내구 반영 (경매 행 잠금 + event_id 멱등)
    async fn apply_accepted_bid(
        &self,
        bid: &AcceptedBid,
        policy: &ExtensionPolicy,
    ) -> Result<ApplyOutcome, SettleError>;

    /// 마감 대상 스캔: 종료 시각이 지난 OPEN, 유예가 경과한 CLOSING
    async fn due_auctions(
        &self,
        now: DateTime<Utc>,
        reclaim_before: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<i64>, SettleError>;

    /// OPEN → CLOSING 선점. 이미 다른 인스턴스가 선점했으면 false
    async fn begin_close(
        &self,
        auction_id: i64,
        now: DateTime<Utc>,
        reclaim_before: DateTime<Utc>,
    ) -> Result<bool, SettleError>;

    /// 낙찰 확정: 스냅샷과 거래 기록을 멱등 생성
    async fn settle_close(
        &self,
        auction_id: i64,
        now: DateTime<Utc>,
    ) -> Result<CloseSettlement, SettleError>;

    /// CLOSING → CLOSED 확정
    async fn finish_close(&self, auction_id: i64) -> Result<bool, SettleError>;
}

// endregion: --- Settlement Store
