pub mod chat;
pub mod common;
pub mod config;
pub mod preferences;
pub mod profile;
pub mod settings;
pub mod storage;
pub mod theme;
