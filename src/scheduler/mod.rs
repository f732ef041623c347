/// 정산 주기 실행기
/// 마감 스위프와 큐 드레인을 별도 워커 없이 본 서비스 태스크로 구동한다.
/// 루프 오류는 로그만 남기고 다음 틱에 그대로 재시도한다.
// region:    --- Imports
use std::sync::Arc;

use chrono::Utc;
use tokio::time::{interval, Duration};
use tracing::{debug, error};

use crate::bidding::apply::BidApplier;
use crate::closer::AuctionCloser;
use crate::counter::CounterStore;
use crate::database::store::SettlementStore;
use crate::trust::TrustStore;
// endregion: --- Imports

// region:    --- Settlement Scheduler

/// 마감/드레인 스케줄러
pub struct SettlementScheduler<C, S, T> {
    closer: Arc<AuctionCloser<C, S, T>>,
    applier: Arc<BidApplier<C, S>>,
    sweep_interval: Duration,
    drain_interval: Duration,
}

impl<C, S, T> SettlementScheduler<C, S, T>
where
    C: CounterStore + 'static,
    S: SettlementStore + 'static,
    T: TrustStore + 'static,
{
    pub fn new(
        closer: Arc<AuctionCloser<C, S, T>>,
        applier: Arc<BidApplier<C, S>>,
        sweep_interval: Duration,
        drain_interval: Duration,
    ) -> Self {
        Self {
            closer,
            applier,
            sweep_interval,
            drain_interval,
        }
    }

    /// 스케줄러 시작
    pub async fn start(&self) {
        let closer = Arc::clone(&self.closer);
        let sweep_every = self.sweep_interval;
        tokio::spawn(async move {
            let mut ticker = interval(sweep_every);
            loop {
                ticker.tick().await;
                match closer.sweep(Utc::now()).await {
                    Ok(0) => {}
                    Ok(n) => debug!("{:<12} --> 마감 {}건 처리 완료", "Scheduler", n),
                    Err(e) => error!("{:<12} --> 마감 스위프 중 오류 발생: {:?}", "Scheduler", e),
                }
            }
        });

        let applier = Arc::clone(&self.applier);
        let drain_every = self.drain_interval;
        tokio::spawn(async move {
            let mut ticker = interval(drain_every);
            loop {
                ticker.tick().await;
                match applier.drain_once().await {
                    Ok(0) => {}
                    Ok(n) => debug!("{:<12} --> 입찰 {}건 내구 반영 완료", "Scheduler", n),
                    Err(e) => error!("{:<12} --> 큐 드레인 중 오류 발생: {:?}", "Scheduler", e),
                }
            }
        });
    }
}

// endregion: --- Settlement Scheduler
