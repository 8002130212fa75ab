//! ethdash-sync - data synchronization layer of an Ethereum wallet dashboard
//! Built with Domain-Driven Design principles

pub mod application;
pub mod config;
pub mod domain;
pub mod infrastructure;
pub mod shared;

// Re-export main types for convenience
pub use application::{DashboardSession, RefreshScheduler};
pub use domain::chain::ChainRouter;
pub use domain::history::TransactionAggregator;
pub use domain::price::RateCache;
pub use domain::transfer::TransferValidator;
