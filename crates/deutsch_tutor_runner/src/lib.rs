pub mod chat;
pub mod config;
pub mod llm_client;
pub mod server;
pub mod session;
