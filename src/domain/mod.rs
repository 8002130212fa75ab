//! Domain layer - caching, routing, aggregation and validation logic

pub mod chain;
pub mod history;
pub mod price;
pub mod transfer;
