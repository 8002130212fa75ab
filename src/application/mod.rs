//! Application layer - scheduling, the dashboard session and the CLI

pub mod commands;
pub mod refresh_scheduler;
pub mod services;

pub use commands::{Cli, CommandExecutor, Commands};
pub use refresh_scheduler::{RefreshScheduler, RefreshTask};
pub use services::{DashboardSession, Portfolio};
