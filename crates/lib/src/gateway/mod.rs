//! Gateway: HTTP control plane plus the inbound processor that connects channels to the reply engine.
//!
//! Single port serves health, the status control surface, a generic inbound endpoint and the
//! Telegram webhook. Channel events arrive on a bounded mpsc queue and each is handled in its own task.

mod inbound;
mod protocol;
mod server;

pub use inbound::process_inbound_event;
pub use protocol::{ErrorPayload, InboundReply, SetStatusParams, StatusPayload};
pub use server::{build_state, router, run_gateway, GatewayState, INBOUND_QUEUE_CAPACITY};
