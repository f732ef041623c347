/// 입찰 커맨드 처리
/// 1. 카운터 워밍 (해시 미존재 시)
/// 2. 원자 판정 스크립트 실행
/// 3. 판정 → 처리 결과 매핑
// region:    --- Imports
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::time::timeout;
use tracing::{info, warn};

use crate::bidding::model::{BidOutcome, RejectReason, SubmitBidCommand};
use crate::counter::{BidAttempt, BidVerdict, CounterStore};
use crate::database::store::SettlementStore;
use crate::error::SettleError;
// endregion: --- Imports

// region:    --- Bid Processor

/// 입찰 처리기
pub struct BidProcessor<C, S> {
    counter: Arc<C>,
    store: Arc<S>,
    counter_timeout: Duration,
}

impl<C: CounterStore, S: SettlementStore> BidProcessor<C, S> {
    pub fn new(counter: Arc<C>, store: Arc<S>, counter_timeout: Duration) -> Self {
        Self {
            counter,
            store,
            counter_timeout,
        }
    }

    /// 입찰 제출
    ///
    /// 수락이면 이미 가격 갱신과 큐 적재까지 끝난 상태로 반환된다.
    /// 오류 반환 시 호출자는 동일 request_id로 재시도해야 한다.
    pub async fn submit(&self, cmd: SubmitBidCommand) -> Result<BidOutcome, SettleError> {
        info!("{:<12} --> 입찰 요청 처리 시작: {:?}", "Command", cmd);
        let attempt = BidAttempt {
            auction_id: cmd.auction_id,
            bidder_id: cmd.bidder_id,
            amount: cmd.amount,
            request_id: cmd.request_id.clone(),
            now_ms: Utc::now().timestamp_millis(),
        };

        let mut verdict = self.execute(&attempt).await?;
        if let BidVerdict::Missing = verdict {
            // 카운터 해시 미존재: 관계형 스토어에서 메타를 적재하고 1회 재시도
            let meta = match self.store.auction_meta(cmd.auction_id).await? {
                Some(m) => m,
                None => return Err(SettleError::AuctionNotFound(cmd.auction_id)),
            };
            self.counter.seed(&meta).await?;
            verdict = self.execute(&attempt).await?;
        }

        self.outcome_of(&cmd, verdict)
    }

    async fn execute(&self, attempt: &BidAttempt) -> Result<BidVerdict, SettleError> {
        match timeout(self.counter_timeout, self.counter.execute_bid(attempt)).await {
            Ok(result) => result,
            Err(_) => {
                warn!(
                    "{:<12} --> 카운터 응답 제한 시간 초과: auction_id={}",
                    "Command", attempt.auction_id
                );
                Err(SettleError::CounterTimeout)
            }
        }
    }

    fn outcome_of(
        &self,
        cmd: &SubmitBidCommand,
        verdict: BidVerdict,
    ) -> Result<BidOutcome, SettleError> {
        match verdict {
            BidVerdict::Accepted { price, buy_now } => {
                if buy_now {
                    info!(
                        "{:<12} --> 즉시 구매 수락: auction_id={} price={}",
                        "Command", cmd.auction_id, price
                    );
                } else {
                    info!(
                        "{:<12} --> 입찰 수락: auction_id={} price={}",
                        "Command", cmd.auction_id, price
                    );
                }
                Ok(BidOutcome::Accepted { price })
            }
            BidVerdict::Duplicate { price } => {
                info!(
                    "{:<12} --> 중복 요청 멱등 처리: request_id={}",
                    "Command", cmd.request_id
                );
                Ok(BidOutcome::Duplicate { price })
            }
            BidVerdict::NotRunning { price } => Ok(BidOutcome::Rejected {
                reason: RejectReason::AuctionClosed,
                current_price: price,
            }),
            BidVerdict::TooLow { price } => Ok(BidOutcome::Rejected {
                reason: RejectReason::PriceTooLow,
                current_price: price,
            }),
            BidVerdict::BelowIncrement { price } => Ok(BidOutcome::Rejected {
                reason: RejectReason::BelowMinIncrement,
                current_price: price,
            }),
            BidVerdict::Missing => Err(SettleError::Inconsistent(format!(
                "적재 직후 카운터 해시 소실: auction_id={}",
                cmd.auction_id
            ))),
        }
    }
}

// endregion: --- Bid Processor
