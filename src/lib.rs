// Library crate exposing modules for the binary and integration tests

pub mod api;
pub mod app;
pub mod archive;
pub mod cache;
pub mod cli;
pub mod config;
pub mod model;
pub mod query;
pub mod repository;
pub mod resolve;
pub mod server;
pub mod util;
