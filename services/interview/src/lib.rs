pub mod config;
pub mod console;
pub mod preflight;
pub mod relay_adapter;
