// src/lib.rs - Library root for noveler

pub mod chat;
pub mod cli;
pub mod core;
pub mod infra;
pub mod stream;
pub mod surface;
pub mod util;
