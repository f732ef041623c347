use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client, Script};

use crate::counter::script::{BID_ATOMIC, SEED_META, SYNC_PRICE};
use crate::counter::{AuctionMeta, BidAttempt, BidVerdict, CounterStore};
use crate::error::SettleError;

// region:    --- Key Naming

pub fn hash_key(auction_id: i64) -> String {
    format!("auction:{}", auction_id)
}

pub fn idem_key(auction_id: i64, request_id: &str) -> String {
    format!("auction:{}:idem:{}", auction_id, request_id)
}

pub fn queue_key(auction_id: i64) -> String {
    format!("auction:{}:bidq", auction_id)
}

pub fn retry_key(auction_id: i64) -> String {
    format!("auction:{}:bidq:retry", auction_id)
}

pub fn dead_key(auction_id: i64) -> String {
    format!("auction:{}:bidq:dead", auction_id)
}

/// 드레인 대기 경매 셋
pub const PENDING_SET: &str = "auction:pendingq";

// endregion: --- Key Naming

// region:    --- Redis Counter Store

/// Redis 기반 카운터 스토어
pub struct RedisCounterStore {
    manager: ConnectionManager,
    bid_script: Script,
    seed_script: Script,
    sync_script: Script,
    idem_ttl_secs: u64,
}

impl RedisCounterStore {
    /// 연결 및 스크립트 준비
    pub async fn connect(redis_url: &str, idem_ttl_secs: u64) -> Result<Self, SettleError> {
        let client = Client::open(redis_url)?;
        let manager = ConnectionManager::new(client).await?;
        Ok(Self {
            manager,
            bid_script: Script::new(BID_ATOMIC),
            seed_script: Script::new(SEED_META),
            sync_script: Script::new(SYNC_PRICE),
            idem_ttl_secs,
        })
    }
}

#[async_trait]
impl CounterStore for RedisCounterStore {
    async fn seed(&self, meta: &AuctionMeta) -> Result<bool, SettleError> {
        let mut con = self.manager.clone();
        let seeded: i64 = self
            .seed_script
            .key(hash_key(meta.auction_id))
            .arg(if meta.ended { 1 } else { 0 })
            .arg(meta.start_ms)
            .arg(meta.end_ms)
            .arg(meta.current_price)
            .arg(meta.bid_unit)
            .arg(meta.buy_now_price)
            .invoke_async(&mut con)
            .await?;
        Ok(seeded == 1)
    }

    async fn execute_bid(&self, attempt: &BidAttempt) -> Result<BidVerdict, SettleError> {
        let mut con = self.manager.clone();
        let reply: Vec<String> = self
            .bid_script
            .key(hash_key(attempt.auction_id))
            .key(idem_key(attempt.auction_id, &attempt.request_id))
            .key(queue_key(attempt.auction_id))
            .key(PENDING_SET)
            .arg(attempt.amount)
            .arg(attempt.now_ms)
            .arg(self.idem_ttl_secs)
            .arg(attempt.auction_id)
            .arg(attempt.bidder_id)
            .arg(&attempt.request_id)
            .invoke_async(&mut con)
            .await?;
        parse_reply(&reply)
    }

    async fn mark_ended(&self, auction_id: i64) -> Result<(), SettleError> {
        let mut con = self.manager.clone();
        let _: i64 = con.hset(hash_key(auction_id), "is_end", 1).await?;
        Ok(())
    }

    async fn extend_end(&self, auction_id: i64, end_ms: i64) -> Result<(), SettleError> {
        let mut con = self.manager.clone();
        let _: i64 = con.hset(hash_key(auction_id), "end_ts", end_ms).await?;
        Ok(())
    }

    async fn sync_price(&self, auction_id: i64, price: i64) -> Result<(), SettleError> {
        let mut con = self.manager.clone();
        let _: i64 = self
            .sync_script
            .key(hash_key(auction_id))
            .arg(price)
            .invoke_async(&mut con)
            .await?;
        Ok(())
    }

    async fn pop_accepted(&self, auction_id: i64) -> Result<Option<String>, SettleError> {
        let mut con = self.manager.clone();
        let from_retry: Option<String> = con.lpop(retry_key(auction_id), None).await?;
        if from_retry.is_some() {
            return Ok(from_retry);
        }
        let raw: Option<String> = con.lpop(queue_key(auction_id), None).await?;
        Ok(raw)
    }

    async fn push_retry(&self, auction_id: i64, raw: &str) -> Result<(), SettleError> {
        let mut con = self.manager.clone();
        let _: i64 = con.rpush(retry_key(auction_id), raw).await?;
        let _: i64 = con.sadd(PENDING_SET, auction_id).await?;
        Ok(())
    }

    async fn push_dead(&self, auction_id: i64, raw: &str) -> Result<(), SettleError> {
        let mut con = self.manager.clone();
        let _: i64 = con.rpush(dead_key(auction_id), raw).await?;
        Ok(())
    }

    async fn take_pending(&self) -> Result<Vec<i64>, SettleError> {
        let mut con = self.manager.clone();
        let ids: Vec<i64> = con.smembers(PENDING_SET).await?;
        if !ids.is_empty() {
            let _: i64 = con.srem(PENDING_SET, &ids).await?;
        }
        Ok(ids)
    }
}

/// {code, price} 응답 해석
fn parse_reply(reply: &[String]) -> Result<BidVerdict, SettleError> {
    let code = reply.first().map(String::as_str).unwrap_or("");
    let price = reply
        .get(1)
        .and_then(|v| v.parse::<i64>().ok())
        .unwrap_or(0);
    match code {
        "OK" => Ok(BidVerdict::Accepted {
            price,
            buy_now: false,
        }),
        "OK_BUY_NOW" => Ok(BidVerdict::Accepted {
            price,
            buy_now: true,
        }),
        "DUPLICATE" => Ok(BidVerdict::Duplicate { price }),
        "MISSING" => Ok(BidVerdict::Missing),
        "NOT_RUNNING" => Ok(BidVerdict::NotRunning { price }),
        "LOW_PRICE" => Ok(BidVerdict::TooLow { price }),
        "LOW_INCREMENT" => Ok(BidVerdict::BelowIncrement { price }),
        other => Err(SettleError::Inconsistent(format!(
            "알 수 없는 판정 코드: {}",
            other
        ))),
    }
}

// endregion: --- Redis Counter Store
