use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::json;

use crate::counter::{decide, AuctionMeta, BidAttempt, BidVerdict, CounterStore};
use crate::error::SettleError;

/// 테스트/로컬 구동용 인메모리 카운터 스토어
///
/// 단일 뮤텍스로 전체 상태를 보호하므로 스크립트와 같은 원자성을 가진다.
#[derive(Default)]
pub struct MemoryCounterStore {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    metas: HashMap<i64, AuctionMeta>,
    idem: HashMap<(i64, String), i64>,
    main: HashMap<i64, VecDeque<String>>,
    retry: HashMap<i64, VecDeque<String>>,
    dead: HashMap<i64, Vec<String>>,
    pending: HashSet<i64>,
}

impl MemoryCounterStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 현재 카운터 가격 (검증용)
    pub fn price_of(&self, auction_id: i64) -> Option<i64> {
        let g = self.inner.lock().unwrap();
        g.metas.get(&auction_id).map(|m| m.current_price)
    }

    /// 종료 플래그 (검증용)
    pub fn is_ended(&self, auction_id: i64) -> bool {
        let g = self.inner.lock().unwrap();
        g.metas.get(&auction_id).map(|m| m.ended).unwrap_or(false)
    }

    /// 종료 시각 epoch millis (검증용)
    pub fn end_ms_of(&self, auction_id: i64) -> Option<i64> {
        let g = self.inner.lock().unwrap();
        g.metas.get(&auction_id).map(|m| m.end_ms)
    }

    /// 데드레터 큐 내용 (검증용)
    pub fn dead_letters(&self, auction_id: i64) -> Vec<String> {
        let g = self.inner.lock().unwrap();
        g.dead.get(&auction_id).cloned().unwrap_or_default()
    }

    /// 큐에 남은 페이로드 수 (검증용)
    pub fn queued(&self, auction_id: i64) -> usize {
        let g = self.inner.lock().unwrap();
        g.main.get(&auction_id).map(VecDeque::len).unwrap_or(0)
            + g.retry.get(&auction_id).map(VecDeque::len).unwrap_or(0)
    }
}

#[async_trait]
impl CounterStore for MemoryCounterStore {
    async fn seed(&self, meta: &AuctionMeta) -> Result<bool, SettleError> {
        let mut g = self.inner.lock().unwrap();
        if g.metas.contains_key(&meta.auction_id) {
            return Ok(false);
        }
        g.metas.insert(meta.auction_id, *meta);
        Ok(true)
    }

    async fn execute_bid(&self, attempt: &BidAttempt) -> Result<BidVerdict, SettleError> {
        let mut g = self.inner.lock().unwrap();
        let idem = (attempt.auction_id, attempt.request_id.clone());
        if let Some(price) = g.idem.get(&idem) {
            return Ok(BidVerdict::Duplicate { price: *price });
        }
        let meta = match g.metas.get(&attempt.auction_id) {
            Some(m) => *m,
            None => return Ok(BidVerdict::Missing),
        };
        let verdict = decide(&meta, attempt.amount, attempt.now_ms);
        if let BidVerdict::Accepted { price, buy_now } = verdict {
            let payload = json!({
                "auction_id": attempt.auction_id,
                "member_id": attempt.bidder_id,
                "amount": price,
                "event_id": attempt.request_id,
                "ts": attempt.now_ms,
                "buy_now": buy_now,
            })
            .to_string();
            if let Some(m) = g.metas.get_mut(&attempt.auction_id) {
                m.current_price = price;
                if buy_now {
                    m.ended = true;
                }
            }
            g.main
                .entry(attempt.auction_id)
                .or_default()
                .push_back(payload);
            g.pending.insert(attempt.auction_id);
            g.idem.insert(idem, price);
        }
        Ok(verdict)
    }

    async fn mark_ended(&self, auction_id: i64) -> Result<(), SettleError> {
        let mut g = self.inner.lock().unwrap();
        if let Some(m) = g.metas.get_mut(&auction_id) {
            m.ended = true;
        }
        Ok(())
    }

    async fn extend_end(&self, auction_id: i64, end_ms: i64) -> Result<(), SettleError> {
        let mut g = self.inner.lock().unwrap();
        if let Some(m) = g.metas.get_mut(&auction_id) {
            m.end_ms = end_ms;
        }
        Ok(())
    }

    async fn sync_price(&self, auction_id: i64, price: i64) -> Result<(), SettleError> {
        let mut g = self.inner.lock().unwrap();
        if let Some(m) = g.metas.get_mut(&auction_id) {
            m.current_price = price;
        }
        Ok(())
    }

    async fn pop_accepted(&self, auction_id: i64) -> Result<Option<String>, SettleError> {
        let mut g = self.inner.lock().unwrap();
        if let Some(q) = g.retry.get_mut(&auction_id) {
            if let Some(raw) = q.pop_front() {
                return Ok(Some(raw));
            }
        }
        if let Some(q) = g.main.get_mut(&auction_id) {
            return Ok(q.pop_front());
        }
        Ok(None)
    }

    async fn push_retry(&self, auction_id: i64, raw: &str) -> Result<(), SettleError> {
        let mut g = self.inner.lock().unwrap();
        g.retry
            .entry(auction_id)
            .or_default()
            .push_back(raw.to_string());
        g.pending.insert(auction_id);
        Ok(())
    }

    async fn push_dead(&self, auction_id: i64, raw: &str) -> Result<(), SettleError> {
        let mut g = self.inner.lock().unwrap();
        g.dead.entry(auction_id).or_default().push(raw.to_string());
        Ok(())
    }

    async fn take_pending(&self) -> Result<Vec<i64>, SettleError> {
        let mut g = self.inner.lock().unwrap();
        let mut ids: Vec<i64> = g.pending.drain().collect();
        ids.sort_unstable();
        Ok(ids)
    }
}
