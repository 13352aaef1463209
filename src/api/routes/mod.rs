pub mod audio;
pub mod config;
pub mod pipeline;
pub mod tasks;
