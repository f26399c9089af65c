//! Inbound event from a channel: one chat message plus what the gateway needs to route a reply.

/// A message observed on a channel. `from_self` marks the owner's own messages (commands, manual replies).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundEvent {
    pub channel_id: String,
    pub conversation_id: String,
    /// Display name or identifier of the sender.
    pub sender_label: String,
    pub text: String,
    pub from_self: bool,
    pub is_group: bool,
}
