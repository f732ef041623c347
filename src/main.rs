// region:    --- Imports
use crate::auction::events::{spawn_event_logger, SettlementEvent};
use crate::bidding::apply::BidApplier;
use crate::bidding::commands::BidProcessor;
use crate::closer::{AuctionCloser, CloserConfig};
use crate::config::AppConfig;
use crate::counter::redis::RedisCounterStore;
use crate::database::postgres::PostgresSettlementStore;
use crate::database::store::ExtensionPolicy;
use crate::database::DatabaseManager;
use crate::handlers::AppState;
use crate::popularity::redis::RedisRankingStore;
use crate::popularity::PopularityAggregator;
use crate::scheduler::SettlementScheduler;
use crate::trust::postgres::PostgresTrustStore;
use crate::trust::TrustLedger;
use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};
// endregion: --- Imports

// region:    --- Modules
mod auction;
mod bidding;
mod closer;
mod config;
mod counter;
mod database;
mod error;
mod handlers;
mod popularity;
mod query;
mod scheduler;
mod trust;

// endregion: --- Modules

// region:    --- Main
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // logging 초기화
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .without_time()
        .with_target(false)
        .init();

    // 환경 변수 설정 로드
    let config = AppConfig::from_env();

    // DatabaseManager 생성
    let db_manager = Arc::new(DatabaseManager::new(&config.database_url).await);

    // 데이터베이스 초기화
    if let Err(e) = db_manager.initialize_database().await {
        error!("{:<12} --> 데이터베이스 초기화 실패: {:?}", "Main", e);
        return Err(e.into());
    }
    info!("{:<12} --> 데이터베이스 초기화 성공", "Main");

    // Redis 카운터 스토어 연결
    let counter = match RedisCounterStore::connect(&config.redis_url, config.idem_ttl_secs).await {
        Ok(store) => Arc::new(store),
        Err(e) => {
            error!("{:<12} --> Redis 카운터 연결 실패: {:?}", "Main", e);
            return Err(e.into());
        }
    };
    info!("{:<12} --> Redis 카운터 연결 성공", "Main");

    // Redis 랭킹 스토어 연결
    let ranking = match RedisRankingStore::connect(&config.redis_url).await {
        Ok(store) => Arc::new(store),
        Err(e) => {
            error!("{:<12} --> Redis 랭킹 연결 실패: {:?}", "Main", e);
            return Err(e.into());
        }
    };

    // 정산 이벤트 채널과 로거
    let (event_tx, event_rx) = broadcast::channel::<SettlementEvent>(256);
    spawn_event_logger(event_rx);

    // 저장소와 도메인 서비스 구성
    let store = Arc::new(PostgresSettlementStore::new(Arc::clone(&db_manager)));
    let trust = Arc::new(TrustLedger::new(
        Arc::new(PostgresTrustStore::new(Arc::clone(&db_manager))),
        config.trust_lock_timeout(),
    ));
    let popularity = Arc::new(PopularityAggregator::new(
        Arc::clone(&ranking),
        config.weight_view,
        config.weight_bid,
        config.weight_wish,
        config.bucket_ttl(),
        config.scratch_ttl(),
    ));
    let policy = ExtensionPolicy {
        enabled: config.extension_enabled,
        threshold_secs: config.extension_threshold_secs,
        extend_secs: config.extension_extend_secs,
    };
    let applier = Arc::new(BidApplier::new(
        Arc::clone(&counter),
        Arc::clone(&store),
        policy,
        event_tx.clone(),
    ));
    let processor = Arc::new(BidProcessor::new(
        Arc::clone(&counter),
        Arc::clone(&store),
        config.counter_timeout(),
    ));
    let closer = Arc::new(AuctionCloser::new(
        Arc::clone(&store),
        Arc::clone(&counter),
        Arc::clone(&applier),
        Arc::clone(&trust),
        event_tx.clone(),
        CloserConfig {
            closing_grace_secs: config.closing_grace_secs,
            batch_limit: config.close_batch_limit,
            winner_trust_delta: config.winner_trust_delta,
            seller_trust_delta: config.seller_trust_delta,
        },
    ));

    // 마감 스위프와 큐 드레인 스케줄러 시작
    let scheduler = SettlementScheduler::new(
        Arc::clone(&closer),
        Arc::clone(&applier),
        config.sweep_interval(),
        config.drain_interval(),
    );
    scheduler.start().await;

    // 테스트 페이지를 위한 cors 설정
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let state = AppState {
        db_manager: Arc::clone(&db_manager),
        store,
        processor,
        trust,
        popularity,
        popular_window_minutes: config.popular_window_minutes,
        popular_limit: config.popular_limit,
    };

    // 라우터 설정
    let routes_all = Router::new()
        .route(
            "/auctions/:id/bids",
            post(handlers::handle_submit_bid).get(handlers::handle_get_bid_history),
        )
        .route("/auctions/:id", get(handlers::handle_get_auction))
        .route("/auctions/:id/result", get(handlers::handle_get_result))
        .route("/auctions/:id/view", post(handlers::handle_record_view))
        .route("/auctions/:id/wish", post(handlers::handle_record_wish))
        .route("/members/:id/trust", get(handlers::handle_get_trust))
        .route("/categories/:id/popular", get(handlers::handle_get_popular))
        .layer(cors)
        .layer(DefaultBodyLimit::max(1024 * 1024 * 20)) // 동시성을 위한 바디 사이즈 10배 증가(20MB)
        .with_state(state);

    // 리스너 생성
    let listener = TcpListener::bind(&config.bind_addr).await.unwrap();
    info!(
        "{:<12} --> Web Server: Listening on {}",
        "Main",
        listener.local_addr().unwrap()
    );

    // 서버 실행
    if let Err(err) = axum::serve(listener, routes_all.into_make_service()).await {
        error!("{:<12} --> Server error: {}", "Main", err);
    }
    Ok(())
}
// endregion: --- Main
