pub mod api;
pub mod clients;
pub mod config;
pub mod error;
pub mod models;
pub mod queue;
pub mod service;
pub mod smart_send;
pub mod supervisor;
pub mod utils;
pub mod worker;
