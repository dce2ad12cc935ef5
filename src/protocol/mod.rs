// ABOUTME: Protocol module root
// ABOUTME: Text envelope codec (messages) and binary frame codec (client)

pub mod client;
pub mod messages;
