pub mod assets;
pub mod cache;
pub mod config;
pub mod errors;
pub mod limiter;
pub mod pipeline;
pub mod services;
pub mod storage;
pub mod web;
