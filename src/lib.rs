// src/lib.rs

pub mod analytics;
pub mod bootstrap;
pub mod config;
pub mod error;
pub mod gate;
pub mod handlers;
pub mod leaderboard;
pub mod models;
pub mod routes;
pub mod runner;
pub mod runs;
pub mod session;
pub mod state;
pub mod store;
pub mod utils;

pub use routes::create_router;
