//! Bus layout of the node.
//!
//! Two topics, one per message kind, and a single egress subscription
//! attached to both:
//!
//! ```text
//!   "telemetry"   (Telemetry)  ──┐
//!                                ├──▶ egress subscription (depth from BusConfig)
//!   "node_status" (NodeStatus) ──┘
//! ```

use crate::bus::{Bus, BusBuilder, BusError, Subscription, TopicId};
use crate::config::BusConfig;
use crate::messages::MessageKind;

pub const TOPIC_TELEMETRY: &str = "telemetry";
pub const TOPIC_NODE_STATUS: &str = "node_status";

/// Topics the egress subscription observes.
pub const NODE_TOPICS: usize = 2;

/// Topic handles, one per [`MessageKind`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Topics {
    pub telemetry: TopicId,
    pub node_status: TopicId,
}

impl Topics {
    pub fn for_kind(&self, kind: MessageKind) -> TopicId {
        match kind {
            MessageKind::Telemetry => self.telemetry,
            MessageKind::NodeStatus => self.node_status,
        }
    }
}

/// Register the node's topics and the egress subscription.
pub fn build_bus(config: &BusConfig) -> Result<(Bus, Topics, Subscription), BusError> {
    let mut builder = BusBuilder::new();
    let telemetry = builder.topic(TOPIC_TELEMETRY, MessageKind::Telemetry)?;
    let node_status = builder.topic(TOPIC_NODE_STATUS, MessageKind::NodeStatus)?;

    let egress = builder.subscribe(telemetry, config.subscriber_depth as usize)?;
    builder.attach(&egress, node_status)?;

    Ok((builder.build(), Topics { telemetry, node_status }, egress))
}
