use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};

use crate::error::SettleError;
use crate::popularity::RankingStore;

/// Redis ZSET 기반 분 버킷 스토어
pub struct RedisRankingStore {
    manager: ConnectionManager,
}

impl RedisRankingStore {
    pub async fn connect(redis_url: &str) -> Result<Self, SettleError> {
        let client = Client::open(redis_url)?;
        Ok(Self {
            manager: ConnectionManager::new(client).await?,
        })
    }
}

#[async_trait]
impl RankingStore for RedisRankingStore {
    async fn incr(
        &self,
        bucket: &str,
        card_id: i64,
        weight: f64,
        ttl: Duration,
    ) -> Result<(), SettleError> {
        let mut con = self.manager.clone();
        let _: f64 = con.zincr(bucket, card_id, weight).await?;
        let _: bool = con.expire(bucket, ttl.as_secs() as i64).await?;
        Ok(())
    }

    async fn merge(
        &self,
        dest: &str,
        sources: &[String],
        ttl: Duration,
    ) -> Result<(), SettleError> {
        let mut con = self.manager.clone();
        let mut union = redis::cmd("ZUNIONSTORE");
        union.arg(dest).arg(sources.len()).arg(sources);
        let _: i64 = union.query_async(&mut con).await?;
        // 원본이 모두 비어 있으면 dest는 생성되지 않는다
        let _: bool = con.expire(dest, ttl.as_secs() as i64).await?;
        Ok(())
    }

    async fn read_all(&self, key: &str) -> Result<Vec<(i64, f64)>, SettleError> {
        let mut con = self.manager.clone();
        let rows: Vec<(i64, f64)> = con.zrange_withscores(key, 0, -1).await?;
        Ok(rows)
    }

    async fn remove(&self, key: &str) -> Result<(), SettleError> {
        let mut con = self.manager.clone();
        let _: i64 = con.del(key).await?;
        Ok(())
    }
}
