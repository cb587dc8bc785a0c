pub mod config;
pub mod dispatch;
pub mod error;
pub mod failover;
pub mod fill;
pub mod lifecycle;
pub mod monitor;
pub mod platforms;
pub mod provider;
pub mod services;
pub mod session;
pub mod tasks;
pub mod terminal;
