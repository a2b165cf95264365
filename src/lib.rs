pub mod cli;
pub mod codec;
pub mod config;
pub mod error_sink;
pub mod fix_reader;
pub mod logging;
pub mod outbound_queue;
pub mod peer_table;
pub mod receiver;
pub mod sender;
pub mod service;
pub mod subscribers;
pub mod thread_manager;
pub mod types;
