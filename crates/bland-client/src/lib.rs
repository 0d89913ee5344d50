pub mod config;
pub mod link;
pub mod memory;
pub mod net_client;
pub mod runner;
pub mod scheduler;
pub mod transport;

#[cfg(feature = "native")]
pub mod ws_transport;
