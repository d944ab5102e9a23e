pub mod api;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod gateway;
pub mod models;
pub mod providers;
pub mod registry;
pub mod store;
