//! OpenFlow 1.0 controller for a transparent VIP load balancer.

pub mod admin;
pub mod config;
pub mod controller;
pub mod lifecycle;
pub mod load_balancer;
pub mod net;
pub mod observability;
pub mod openflow;
pub mod packet;

pub use config::ControllerConfig;
pub use controller::FlowController;
pub use lifecycle::Shutdown;
pub use net::ControllerServer;
