// region:    --- Imports
use crate::bidding::commands::BidProcessor;
use crate::bidding::model::{BidOutcome, SubmitBidCommand};
use crate::counter::redis::RedisCounterStore;
use crate::database::postgres::PostgresSettlementStore;
use crate::database::store::SettlementStore;
use crate::database::DatabaseManager;
use crate::error::SettleError;
use crate::popularity::redis::RedisRankingStore;
use crate::popularity::PopularityAggregator;
use crate::query;
use crate::trust::postgres::PostgresTrustStore;
use crate::trust::TrustLedger;
use axum::extract::{Path, Query, State};
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{info, warn};

// endregion: --- Imports

// region:    --- App State

/// 웹 레이어 공유 상태
#[derive(Clone)]
pub struct AppState {
    pub db_manager: Arc<DatabaseManager>,
    pub store: Arc<PostgresSettlementStore>,
    pub processor: Arc<BidProcessor<RedisCounterStore, PostgresSettlementStore>>,
    pub trust: Arc<TrustLedger<PostgresTrustStore>>,
    pub popularity: Arc<PopularityAggregator<RedisRankingStore>>,
    pub popular_window_minutes: u32,
    pub popular_limit: usize,
}

// endregion: --- App State

// region:    --- Command Handlers

/// 입찰 요청 바디
#[derive(Debug, Deserialize)]
pub struct SubmitBidRequest {
    pub bidder_id: i64,
    pub amount: i64,
    pub request_id: String,
}

/// 입찰 요청 처리
pub async fn handle_submit_bid(
    State(state): State<AppState>,
    Path(auction_id): Path<i64>,
    Json(req): Json<SubmitBidRequest>,
) -> impl IntoResponse {
    let cmd = SubmitBidCommand {
        auction_id,
        bidder_id: req.bidder_id,
        amount: req.amount,
        request_id: req.request_id,
    };
    match state.processor.submit(cmd).await {
        Ok(BidOutcome::Accepted { price }) => {
            record_bid_popularity(&state, auction_id).await;
            (
                axum::http::StatusCode::OK,
                Json(serde_json::json!({
                    "outcome": "ACCEPTED",
                    "message": "입찰이 성공적으로 처리되었습니다.",
                    "price": price
                })),
            )
                .into_response()
        }
        Ok(BidOutcome::Duplicate { price }) => (
            axum::http::StatusCode::OK,
            Json(serde_json::json!({
                "outcome": "DUPLICATE",
                "message": "이미 처리된 요청입니다.",
                "price": price
            })),
        )
            .into_response(),
        Ok(BidOutcome::Rejected {
            reason,
            current_price,
        }) => (
            axum::http::StatusCode::BAD_REQUEST,
            Json(serde_json::json!({
                "outcome": "REJECTED",
                "code": reason.code(),
                "current_price": current_price
            })),
        )
            .into_response(),
        Err(e) => error_response(e),
    }
}

/// 수락 입찰의 인기도 기록 (실패해도 입찰 응답에는 영향 없음)
async fn record_bid_popularity(state: &AppState, auction_id: i64) {
    let listing = match state.store.listing_ref(auction_id).await {
        Ok(Some(l)) => l,
        Ok(None) => return,
        Err(e) => {
            warn!(
                "{:<12} --> 리스팅 참조 조회 실패: auction_id={} err={:?}",
                "Handler", auction_id, e
            );
            return;
        }
    };
    if let Err(e) = state
        .popularity
        .record_bid(listing.category_id, listing.card_id)
        .await
    {
        warn!(
            "{:<12} --> 입찰 인기도 기록 실패: auction_id={} err={:?}",
            "Handler", auction_id, e
        );
    }
}

/// 조회 이벤트 기록
pub async fn handle_record_view(
    State(state): State<AppState>,
    Path(auction_id): Path<i64>,
) -> impl IntoResponse {
    info!("{:<12} --> 조회 이벤트 기록 id: {}", "Handler", auction_id);
    record_interaction(&state, auction_id, Interaction::View).await
}

/// 위시리스트 이벤트 기록
pub async fn handle_record_wish(
    State(state): State<AppState>,
    Path(auction_id): Path<i64>,
) -> impl IntoResponse {
    info!(
        "{:<12} --> 위시리스트 이벤트 기록 id: {}",
        "Handler", auction_id
    );
    record_interaction(&state, auction_id, Interaction::Wish).await
}

enum Interaction {
    View,
    Wish,
}

async fn record_interaction(
    state: &AppState,
    auction_id: i64,
    kind: Interaction,
) -> axum::response::Response {
    let listing = match state.store.listing_ref(auction_id).await {
        Ok(Some(l)) => l,
        Ok(None) => {
            return (
                axum::http::StatusCode::NOT_FOUND,
                Json(serde_json::json!({"code": "NOT_FOUND"})),
            )
                .into_response()
        }
        Err(e) => return error_response(e),
    };
    let result = match kind {
        Interaction::View => {
            state
                .popularity
                .record_view(listing.category_id, listing.card_id)
                .await
        }
        Interaction::Wish => {
            state
                .popularity
                .record_wish(listing.category_id, listing.card_id)
                .await
        }
    };
    match result {
        Ok(()) => (
            axum::http::StatusCode::OK,
            Json(serde_json::json!({"message": "기록되었습니다."})),
        )
            .into_response(),
        Err(e) => error_response(e),
    }
}

// endregion: --- Command Handlers

// region:    --- Query Handlers

/// 경매 상세 조회
pub async fn handle_get_auction(
    State(state): State<AppState>,
    Path(auction_id): Path<i64>,
) -> impl IntoResponse {
    info!("{:<12} --> 경매 상세 조회 id: {}", "HandlerQuery", auction_id);
    match query::handlers::get_auction_detail(&state.db_manager, auction_id).await {
        Ok(Some(auction)) => Json(auction).into_response(),
        Ok(None) => (
            axum::http::StatusCode::NOT_FOUND,
            Json(serde_json::json!({"code": "NOT_FOUND"})),
        )
            .into_response(),
        Err(e) => (axum::http::StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

/// 입찰 이력 조회
pub async fn handle_get_bid_history(
    State(state): State<AppState>,
    Path(auction_id): Path<i64>,
) -> impl IntoResponse {
    info!("{:<12} --> 입찰 이력 조회 id: {}", "HandlerQuery", auction_id);
    match query::handlers::get_bid_history(&state.db_manager, auction_id).await {
        Ok(history) => Json(history).into_response(),
        Err(e) => (axum::http::StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

/// 낙찰 결과 조회
pub async fn handle_get_result(
    State(state): State<AppState>,
    Path(auction_id): Path<i64>,
) -> impl IntoResponse {
    info!("{:<12} --> 낙찰 결과 조회 id: {}", "HandlerQuery", auction_id);
    match query::handlers::get_winner_snapshot(&state.db_manager, auction_id).await {
        Ok(Some(snapshot)) => Json(snapshot).into_response(),
        Ok(None) => (
            axum::http::StatusCode::NOT_FOUND,
            Json(serde_json::json!({"code": "NOT_SETTLED"})),
        )
            .into_response(),
        Err(e) => (axum::http::StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

/// 신뢰 점수 조회
pub async fn handle_get_trust(
    State(state): State<AppState>,
    Path(member_id): Path<i64>,
) -> impl IntoResponse {
    info!("{:<12} --> 신뢰 점수 조회 id: {}", "HandlerQuery", member_id);
    match state.trust.score(member_id).await {
        Ok(score) => Json(serde_json::json!({
            "member_id": member_id,
            "score": score
        }))
        .into_response(),
        Err(e) => error_response(e),
    }
}

/// 인기 랭킹 조회 파라미터
#[derive(Debug, Deserialize)]
pub struct PopularParams {
    pub minutes: Option<u32>,
    pub limit: Option<usize>,
}

/// 인기 랭킹 조회
pub async fn handle_get_popular(
    State(state): State<AppState>,
    Path(category_id): Path<i64>,
    Query(params): Query<PopularParams>,
) -> impl IntoResponse {
    let minutes = params.minutes.unwrap_or(state.popular_window_minutes);
    let limit = params.limit.unwrap_or(state.popular_limit);
    info!(
        "{:<12} --> 인기 랭킹 조회 category_id={} minutes={} limit={}",
        "HandlerQuery", category_id, minutes, limit
    );
    match state.popularity.top_n(category_id, minutes, limit).await {
        Ok(entries) => Json(entries).into_response(),
        Err(e) => error_response(e),
    }
}

// endregion: --- Query Handlers

/// 오류 → HTTP 응답 매핑
fn error_response(e: SettleError) -> axum::response::Response {
    match &e {
        SettleError::AuctionNotFound(id) => (
            axum::http::StatusCode::NOT_FOUND,
            Json(serde_json::json!({
                "code": "NOT_FOUND",
                "error": format!("경매를 찾을 수 없습니다: {}", id)
            })),
        )
            .into_response(),
        _ if e.is_retryable() => (
            axum::http::StatusCode::SERVICE_UNAVAILABLE,
            Json(serde_json::json!({
                "code": "RETRY_LATER",
                "error": "일시적인 저장소 오류입니다. 동일한 request_id로 재시도하세요."
            })),
        )
            .into_response(),
        _ => (
            axum::http::StatusCode::INTERNAL_SERVER_ERROR,
            Json(serde_json::json!({
                "code": "INTERNAL",
                "error": e.to_string()
            })),
        )
            .into_response(),
    }
}
