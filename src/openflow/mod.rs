//! OpenFlow 1.0 channel.
//!
//! # Data Flow
//! ```text
//! Switch TCP stream
//!     → codec.rs (8-byte header framing, length limits)
//!     → message.rs (typed messages)
//!         → flow_match.rs (ofp_match + wildcards)
//!         → action.rs (output / set-field actions)
//!
//! Controller commands
//!     → Message::PacketOut / Message::FlowMod
//!     → codec.rs → switch
//! ```
//!
//! # Design Decisions
//! - Only the subset of OpenFlow 1.0 the controller uses is modelled
//! - Unknown message types decode to `Message::Unsupported` instead of failing
//! - Encoding is infallible; decoding reports truncation with context

pub mod action;
pub mod codec;
pub mod flow_match;
pub mod message;
pub mod wire;

pub use action::Action;
pub use codec::{read_message, write_message};
pub use flow_match::Match;
pub use message::{
    ErrorMsg, FlowMod, FlowModCommand, FlowRemoved, FlowRemovedReason, Message, PacketIn,
    PacketOut, PhyPort, SwitchFeatures,
};
pub use wire::WireError;
