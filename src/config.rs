use std::str::FromStr;
use std::time::Duration;

/// 환경 변수 기반 서비스 설정
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_addr: String,
    pub database_url: String,
    pub redis_url: String,
    pub sweep_interval_secs: u64,
    pub drain_interval_ms: u64,
    pub closing_grace_secs: i64,
    pub close_batch_limit: i64,
    pub idem_ttl_secs: u64,
    pub counter_timeout_ms: u64,
    pub trust_lock_timeout_ms: u64,
    pub winner_trust_delta: i32,
    pub seller_trust_delta: i32,
    pub extension_enabled: bool,
    pub extension_threshold_secs: i64,
    pub extension_extend_secs: i64,
    pub bucket_ttl_minutes: u64,
    pub scratch_ttl_secs: u64,
    pub weight_view: f64,
    pub weight_bid: f64,
    pub weight_wish: f64,
    pub popular_window_minutes: u32,
    pub popular_limit: usize,
}

impl AppConfig {
    /// 환경 변수에서 설정 로드 (미설정 항목은 기본값)
    pub fn from_env() -> Self {
        let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
        let redis_url =
            std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string());
        let bind_addr = std::env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".to_string());

        Self {
            bind_addr,
            database_url,
            redis_url,
            sweep_interval_secs: env_var("SWEEP_INTERVAL_SECS", 10),
            drain_interval_ms: env_var("DRAIN_INTERVAL_MS", 200),
            closing_grace_secs: env_var("CLOSING_GRACE_SECS", 60),
            close_batch_limit: env_var("CLOSE_BATCH_LIMIT", 200),
            idem_ttl_secs: env_var("IDEM_TTL_SECS", 1800),
            counter_timeout_ms: env_var("COUNTER_TIMEOUT_MS", 800),
            trust_lock_timeout_ms: env_var("TRUST_LOCK_TIMEOUT_MS", 2000),
            winner_trust_delta: env_var("WINNER_TRUST_DELTA", 50),
            seller_trust_delta: env_var("SELLER_TRUST_DELTA", 30),
            extension_enabled: env_var("EXTENSION_ENABLED", true),
            extension_threshold_secs: env_var("EXTENSION_THRESHOLD_SECS", 60),
            extension_extend_secs: env_var("EXTENSION_EXTEND_SECS", 60),
            bucket_ttl_minutes: env_var("BUCKET_TTL_MINUTES", 70),
            scratch_ttl_secs: env_var("SCRATCH_TTL_SECS", 120),
            weight_view: env_var("WEIGHT_VIEW", 1.0),
            weight_bid: env_var("WEIGHT_BID", 5.0),
            weight_wish: env_var("WEIGHT_WISH", 3.0),
            popular_window_minutes: env_var("POPULAR_WINDOW_MINUTES", 60),
            popular_limit: env_var("POPULAR_LIMIT", 10),
        }
    }

    /// 마감 스위프 주기
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    /// 큐 드레인 주기
    pub fn drain_interval(&self) -> Duration {
        Duration::from_millis(self.drain_interval_ms)
    }

    /// 카운터 스크립트 호출 제한 시간
    pub fn counter_timeout(&self) -> Duration {
        Duration::from_millis(self.counter_timeout_ms)
    }

    /// 신뢰 점수 잠금 대기 제한 시간
    pub fn trust_lock_timeout(&self) -> Duration {
        Duration::from_millis(self.trust_lock_timeout_ms)
    }

    /// 분 버킷 TTL
    pub fn bucket_ttl(&self) -> Duration {
        Duration::from_secs(self.bucket_ttl_minutes * 60)
    }

    /// 랭킹 임시 키 TTL (프로세스 중단 대비 백스톱)
    pub fn scratch_ttl(&self) -> Duration {
        Duration::from_secs(self.scratch_ttl_secs)
    }
}

/// 환경 변수 파싱 (실패 시 기본값)
fn env_var<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
