//! Load balancer control logic.
//!
//! # Data Flow
//! ```text
//! PACKET_IN (from net::connection)
//!     → flow_controller.rs (classify frame)
//!         ARP request for VIP      → admit: select server, forge reply, install pair
//!         ARP request from backend → answer with the bound client's MAC
//!         IPv4 to VIP              → install pair, push first packet through
//!         anything else            → drop with a reason
//!     → bindings.rs (client pinning, installed-pair suppression)
//!     → rules.rs (FLOW_MOD derivation)
//!     → switch.rs (PACKET_OUT / FLOW_MOD queued to the switch)
//!
//! sweeper.rs (periodic)
//!     → expire idle bindings and timed-out installed pairs
//! ```
//!
//! # Design Decisions
//! - Every branch returns a typed `Outcome` or `HandleError`; nothing is fatal
//! - The switch is a trait so tests record commands instead of opening sockets
//! - Rules are stateless on the switch; all state lives in the two tables

pub mod bindings;
pub mod flow_controller;
pub mod outcome;
pub mod rules;
pub mod sweeper;
pub mod switch;

pub use bindings::{BindingSnapshot, BindingTable, ClientBinding, InstalledFlowKey, InstalledFlowSnapshot, InstalledFlows};
pub use flow_controller::{ControllerError, FlowController, SharedController, SweepReport};
pub use outcome::{DropReason, HandleError, Outcome};
pub use rules::{ClientEndpoint, FlowCookie, RuleSettings};
pub use sweeper::Sweeper;
pub use switch::{Switch, SwitchError};
