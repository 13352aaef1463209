pub mod api;
pub mod app;
pub mod audio;
pub mod config;
pub mod error;
pub mod global;
pub mod object_store;
pub mod pipeline;
pub mod summarize;
pub mod task;
pub mod transcribe;
