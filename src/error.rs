use thiserror::Error;

/// 정산 엔진 공통 오류
#[derive(Debug, Error)]
pub enum SettleError {
    #[error("경매를 찾을 수 없습니다: {0}")]
    AuctionNotFound(i64),

    #[error("데이터베이스 오류: {0}")]
    Database(#[from] sqlx::Error),

    #[error("카운터 스토어 오류: {0}")]
    Counter(#[from] redis::RedisError),

    #[error("카운터 스토어 응답 시간 초과")]
    CounterTimeout,

    #[error("신뢰 점수 잠금 대기 시간 초과: member_id={0}")]
    TrustLockTimeout(i64),

    #[error("큐 페이로드 해석 실패: {0}")]
    BadPayload(String),

    #[error("정산 상태 불일치: {0}")]
    Inconsistent(String),
}

impl SettleError {
    /// 동일 request_id 재시도로 복구 가능한 오류 여부
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SettleError::Database(_)
                | SettleError::Counter(_)
                | SettleError::CounterTimeout
                | SettleError::TrustLockTimeout(_)
        )
    }
}

impl From<serde_json::Error> for SettleError {
    fn from(e: serde_json::Error) -> Self {
        SettleError::BadPayload(e.to_string())
    }
}
