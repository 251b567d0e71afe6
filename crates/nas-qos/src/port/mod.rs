//! Port ingress/egress QoS profile object types and their transaction
//! handler.

mod orch;
mod types;

pub use orch::{PortEgressSnapshot, PortIngressSnapshot, PortQosOrch};
pub use types::{PortEgress, PortEgressReq, PortIngress, PortIngressReq};
