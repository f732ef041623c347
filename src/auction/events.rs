use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{info, warn};

use crate::auction::model::CloseReason;

/// 정산 이벤트 (내구 반영이 끝난 시점에 발행)
#[derive(Debug, Serialize, Deserialize, Clone)]
pub enum SettlementEvent {
    // 입찰 확정 이벤트
    BidSettled {
        auction_id: i64,
        bidder_id: i64,
        amount: i64,
        timestamp: DateTime<Utc>,
    },
    // 경매 마감 이벤트
    AuctionClosed {
        auction_id: i64,
        reason: CloseReason,
        winner_id: Option<i64>,
        amount: Option<i64>,
        timestamp: DateTime<Utc>,
    },
}

/// 정산 이벤트 구독 로거 기동
pub fn spawn_event_logger(mut rx: broadcast::Receiver<SettlementEvent>) {
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(event) => info!("{:<12} --> 정산 이벤트 수신: {:?}", "Event", event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("{:<12} --> 정산 이벤트 {}건 유실(지연)", "Event", skipped)
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });
}
