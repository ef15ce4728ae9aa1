// src/infra/mod.rs

pub mod config;
pub mod errors;
pub mod fs;
pub mod logger;
pub mod paths;
