use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::SettleError;
use crate::popularity::RankingStore;

/// 테스트/로컬 구동용 인메모리 버킷 스토어
///
/// TTL은 Redis 측 만료 관리 항목이라 여기서는 무시한다.
#[derive(Default)]
pub struct MemoryRankingStore {
    inner: Mutex<HashMap<String, HashMap<i64, f64>>>,
}

impl MemoryRankingStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 현재 존재하는 키 목록 (임시 키 정리 검증용)
    pub fn keys(&self) -> Vec<String> {
        let g = self.inner.lock().unwrap();
        g.keys().cloned().collect()
    }
}

#[async_trait]
impl RankingStore for MemoryRankingStore {
    async fn incr(
        &self,
        bucket: &str,
        card_id: i64,
        weight: f64,
        _ttl: Duration,
    ) -> Result<(), SettleError> {
        let mut g = self.inner.lock().unwrap();
        *g.entry(bucket.to_string())
            .or_default()
            .entry(card_id)
            .or_insert(0.0) += weight;
        Ok(())
    }

    async fn merge(
        &self,
        dest: &str,
        sources: &[String],
        _ttl: Duration,
    ) -> Result<(), SettleError> {
        let mut g = self.inner.lock().unwrap();
        let mut merged: HashMap<i64, f64> = HashMap::new();
        for source in sources {
            if let Some(bucket) = g.get(source) {
                for (card_id, score) in bucket {
                    *merged.entry(*card_id).or_insert(0.0) += *score;
                }
            }
        }
        // ZUNIONSTORE와 동일하게 빈 합산은 키를 만들지 않는다
        if merged.is_empty() {
            g.remove(dest);
        } else {
            g.insert(dest.to_string(), merged);
        }
        Ok(())
    }

    async fn read_all(&self, key: &str) -> Result<Vec<(i64, f64)>, SettleError> {
        let g = self.inner.lock().unwrap();
        Ok(g.get(key)
            .map(|bucket| bucket.iter().map(|(id, score)| (*id, *score)).collect())
            .unwrap_or_default())
    }

    async fn remove(&self, key: &str) -> Result<(), SettleError> {
        let mut g = self.inner.lock().unwrap();
        g.remove(key);
        Ok(())
    }
}
