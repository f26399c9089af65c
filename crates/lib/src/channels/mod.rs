//! Chat transports (e.g. Telegram) and the envelope they hand to the gateway.
//!
//! A channel turns network updates into [`InboundEvent`]s on an mpsc sender and delivers
//! replies through [`ChannelHandle::send_message`]. Which messages get answered is decided
//! by the gateway and the reply engine, not by the channel.

mod inbound;
mod registry;
mod telegram;

pub use inbound::InboundEvent;
pub use registry::{ChannelError, ChannelHandle, ChannelRegistry};
pub use telegram::{TelegramChannel, TelegramUpdate};
