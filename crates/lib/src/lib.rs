//! Deputy core library: owner status, reply engine, LLM clients, channels and the gateway
//! used by the CLI.

pub mod channels;
pub mod commands;
pub mod config;
pub mod console;
pub mod conversation;
pub mod engine;
pub mod gateway;
pub mod history;
pub mod init;
pub mod llm;
pub mod prompt;
pub mod status;
