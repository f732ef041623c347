pub mod auction;
pub mod bidding;
pub mod closer;
pub mod config;
pub mod counter;
pub mod database;
pub mod error;
pub mod handlers;
pub mod popularity;
pub mod query;
pub mod scheduler;
pub mod trust;
