// src/utils/mod.rs

pub mod code;
pub mod html;
pub mod jwt;
pub mod password;
