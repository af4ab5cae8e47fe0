pub mod app;
pub mod bot;
pub mod cli;
pub mod config;
pub mod file_id;
pub mod global;
pub mod messenger;
pub mod transcode;
pub mod workspace;
