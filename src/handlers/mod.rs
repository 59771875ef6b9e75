// src/handlers/mod.rs

pub mod admin;
pub mod auth;
pub mod gate;
pub mod leaderboard;
pub mod runner;
