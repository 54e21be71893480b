//! Outbound commands to a connected switch.

use crate::openflow::{FlowMod, PacketOut};

/// Error returned when a command cannot be queued for a switch.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SwitchError {
    #[error("switch {0:016x} is disconnected")]
    Disconnected(u64),
}

/// The two capabilities the controller needs from the dataplane.
///
/// Both are fire-and-forget: success means the command was queued, not that
/// the switch applied it.
pub trait Switch: Send + Sync {
    /// Datapath id announced in FEATURES_REPLY.
    fn datapath_id(&self) -> u64;

    /// Inject a single frame, bypassing the flow table.
    fn send_packet_out(&self, packet_out: PacketOut) -> Result<(), SwitchError>;

    /// Add, modify or delete a flow table entry.
    fn install_flow(&self, flow_mod: FlowMod) -> Result<(), SwitchError>;
}
