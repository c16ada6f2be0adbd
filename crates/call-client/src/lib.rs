mod client;
pub mod types;

pub use client::{Client, ClientTx, Config, ConfigBuilder, ServerRx, Stats, connect, connect_with_config};
