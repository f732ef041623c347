/// 경매 상세 조회
pub const GET_AUCTION_DETAIL: &str =
    "SELECT id, seller_id, category_id, card_id, starting_price, current_price, bid_unit, buy_now_price, start_at, end_at, status, closing_at, created_at FROM auctions WHERE id = $1";

/// 입찰 이력 조회 (수락된 입찰만 존재)
pub const GET_BID_HISTORY: &str = r#"
    SELECT id, auction_id, bidder_id, amount, event_id, created_at
    FROM auction_bids
    WHERE auction_id = $1
    ORDER BY created_at DESC, id DESC
"#;

/// 낙찰 스냅샷 조회
pub const GET_WINNER_SNAPSHOT: &str =
    "SELECT auction_id, bid_id, member_id, amount, reason, created_at FROM winner_snapshots WHERE auction_id = $1";
