use chrono::{DateTime, Utc};
use uuid::Uuid;

/// 분 버킷 키: pop:cat:{categoryId}:min:{yyyyMMddHHmm} (UTC)
pub fn minute_key(category_id: i64, at: DateTime<Utc>) -> String {
    format!("pop:cat:{}:min:{}", category_id, at.format("%Y%m%d%H%M"))
}

/// 합산용 임시 키 (호출마다 고유)
pub fn scratch_key(category_id: i64) -> String {
    format!("pop:cat:{}:tmp:{}", category_id, Uuid::new_v4())
}
