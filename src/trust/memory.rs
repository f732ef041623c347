use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::SettleError;
use crate::trust::{clamped, TrustApply, TrustStore, DEFAULT_SCORE};

/// 테스트/로컬 구동용 인메모리 신뢰 점수 스토어
#[derive(Default)]
pub struct MemoryTrustStore {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    scores: HashMap<i64, i32>,
    seen_keys: HashSet<String>,
    events: Vec<(i64, i32, Option<String>)>,
}

impl MemoryTrustStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 기록된 변경 이력 수 (검증용)
    pub fn event_count(&self) -> usize {
        self.inner.lock().unwrap().events.len()
    }

    /// 점수 행 존재 여부 (검증용)
    pub fn has_row(&self, member_id: i64) -> bool {
        self.inner.lock().unwrap().scores.contains_key(&member_id)
    }
}

#[async_trait]
impl TrustStore for MemoryTrustStore {
    async fn apply(
        &self,
        member_id: i64,
        delta: i32,
        dedup_key: Option<&str>,
    ) -> Result<TrustApply, SettleError> {
        let mut g = self.inner.lock().unwrap();
        if let Some(key) = dedup_key {
            if g.seen_keys.contains(key) {
                let score = g.scores.get(&member_id).copied().unwrap_or(DEFAULT_SCORE);
                return Ok(TrustApply {
                    score,
                    applied: false,
                });
            }
            g.seen_keys.insert(key.to_string());
        }
        let entry = g.scores.entry(member_id).or_insert(DEFAULT_SCORE);
        *entry = clamped(*entry, delta);
        let score = *entry;
        g.events
            .push((member_id, delta, dedup_key.map(str::to_owned)));
        Ok(TrustApply {
            score,
            applied: true,
        })
    }

    async fn score(&self, member_id: i64) -> Result<i32, SettleError> {
        let g = self.inner.lock().unwrap();
        Ok(g.scores.get(&member_id).copied().unwrap_or(DEFAULT_SCORE))
    }
}
