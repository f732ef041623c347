// region:    --- Imports
use super::queries;
use crate::auction::model::{Auction, AuctionBid, WinnerSnapshot};
use crate::database::DatabaseManager;
use sqlx::Error as SqlxError;
use tracing::info;

// endregion: --- Imports

// region:    --- Query Handlers

/// 경매 상세 조회
pub async fn get_auction_detail(
    db_manager: &DatabaseManager,
    auction_id: i64,
) -> Result<Option<Auction>, SqlxError> {
    info!("{:<12} --> 경매 상세 조회 id: {}", "Query", auction_id);
    db_manager
        .transaction(|tx| {
            Box::pin(async move {
                sqlx::query_as::<_, Auction>(queries::GET_AUCTION_DETAIL)
                    .bind(auction_id)
                    .fetch_optional(&mut **tx)
                    .await
            })
        })
        .await
}

/// 입찰 이력 조회
pub async fn get_bid_history(
    db_manager: &DatabaseManager,
    auction_id: i64,
) -> Result<Vec<AuctionBid>, SqlxError> {
    info!("{:<12} --> 입찰 이력 조회 id: {}", "Query", auction_id);
    db_manager
        .transaction(|tx| {
            Box::pin(async move {
                sqlx::query_as::<_, AuctionBid>(queries::GET_BID_HISTORY)
                    .bind(auction_id)
                    .fetch_all(&mut **tx)
                    .await
            })
        })
        .await
}

/// 낙찰 스냅샷 조회
pub async fn get_winner_snapshot(
    db_manager: &DatabaseManager,
    auction_id: i64,
) -> Result<Option<WinnerSnapshot>, SqlxError> {
    info!("{:<12} --> 낙찰 결과 조회 id: {}", "Query", auction_id);
    db_manager
        .transaction(|tx| {
            Box::pin(async move {
                sqlx::query_as::<_, WinnerSnapshot>(queries::GET_WINNER_SNAPSHOT)
                    .bind(auction_id)
                    .fetch_optional(&mut **tx)
                    .await
            })
        })
        .await
}

// endregion: --- Query Handlers
