//! 카운터 원자 판정 Lua 스크립트
//!
//! 판정, 가격 갱신, 멱등 키 기록, 큐 적재가 한 스크립트 안에서 끝난다.
//! 중간 상태(가격만 갱신되고 큐 미적재 등)는 외부에서 관측될 수 없다.

/// 입찰 판정 스크립트
///
/// KEYS[1] 경매 해시, KEYS[2] 멱등 키, KEYS[3] 수락 큐, KEYS[4] 대기 셋
/// ARGV[1] amount, ARGV[2] now_ms, ARGV[3] idem_ttl_secs,
/// ARGV[4] auction_id, ARGV[5] bidder_id, ARGV[6] request_id
///
/// 반환: {code, price} (모두 문자열)
pub const BID_ATOMIC: &str = r#"
if redis.call('EXISTS', KEYS[2]) == 1 then
  return {'DUPLICATE', redis.call('GET', KEYS[2])}
end
local vals = redis.call('HMGET', KEYS[1], 'is_end', 'start_ts', 'end_ts', 'current_price', 'bid_unit', 'buy_now_price')
if (not vals[1]) or (not vals[4]) then
  return {'MISSING', '0'}
end
local is_end = vals[1]
local start_ts = tonumber(vals[2] or '0')
local end_ts = tonumber(vals[3] or '0')
local cur = tonumber(vals[4] or '0')
local unit = tonumber(vals[5] or '0')
local buy_now = tonumber(vals[6] or '0')
local amount = tonumber(ARGV[1])
local now = tonumber(ARGV[2])
if (is_end == '1') or (now < start_ts) or (now >= end_ts) then
  return {'NOT_RUNNING', tostring(cur)}
end
if (buy_now > 0) and (amount >= buy_now) and (buy_now > cur) then
  local payload = cjson.encode({auction_id=tonumber(ARGV[4]), member_id=tonumber(ARGV[5]), amount=buy_now, event_id=ARGV[6], ts=now, buy_now=true})
  redis.call('HSET', KEYS[1], 'current_price', buy_now)
  redis.call('HSET', KEYS[1], 'is_end', '1')
  redis.call('RPUSH', KEYS[3], payload)
  redis.call('SADD', KEYS[4], ARGV[4])
  redis.call('SET', KEYS[2], tostring(buy_now), 'EX', tonumber(ARGV[3]))
  return {'OK_BUY_NOW', tostring(buy_now)}
end
if amount <= cur then
  return {'LOW_PRICE', tostring(cur)}
end
if amount < (cur + unit) then
  return {'LOW_INCREMENT', tostring(cur)}
end
local payload = cjson.encode({auction_id=tonumber(ARGV[4]), member_id=tonumber(ARGV[5]), amount=amount, event_id=ARGV[6], ts=now, buy_now=false})
redis.call('HSET', KEYS[1], 'current_price', amount)
redis.call('RPUSH', KEYS[3], payload)
redis.call('SADD', KEYS[4], ARGV[4])
redis.call('SET', KEYS[2], tostring(amount), 'EX', tonumber(ARGV[3]))
return {'OK', tostring(amount)}
"#;

/// 경매 메타 적재 스크립트
///
/// current_price 필드까지 갖춘 해시가 이미 있으면 덮어쓰지 않는다.
/// 불완전한 해시(다른 경로가 남긴 부분 필드)는 지우고 다시 적재한다.
///
/// KEYS[1] 경매 해시
/// ARGV[1] is_end, ARGV[2] start_ts, ARGV[3] end_ts,
/// ARGV[4] current_price, ARGV[5] bid_unit, ARGV[6] buy_now_price
pub const SEED_META: &str = r#"
if (redis.call('EXISTS', KEYS[1]) == 1) and (redis.call('HEXISTS', KEYS[1], 'current_price') == 1) then
  return 0
end
redis.call('DEL', KEYS[1])
redis.call('HSET', KEYS[1], 'is_end', ARGV[1], 'start_ts', ARGV[2], 'end_ts', ARGV[3], 'current_price', ARGV[4], 'bid_unit', ARGV[5], 'buy_now_price', ARGV[6])
return 1
"#;

/// 카운터 가격 재수렴 스크립트
///
/// 해시가 있을 때만 current_price를 내구 가격으로 덮어쓴다.
/// 없는 해시는 만들지 않는다 (부분 해시는 적재 스크립트가 완전한 것으로 오인한다).
///
/// KEYS[1] 경매 해시
/// ARGV[1] current_price
pub const SYNC_PRICE: &str = r#"
if redis.call('EXISTS', KEYS[1]) == 0 then
  return 0
end
redis.call('HSET', KEYS[1], 'current_price', ARGV[1])
return 1
"#;
