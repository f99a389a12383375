//! Entity domains
//!
//! Each domain defines the trait its entities implement and registers the
//! services that operate on them. Integrations add entities through the
//! domain's platforms.

pub mod fan;

pub use fan::{fan_state, fan_state_attributes, FanComponent, FanEntity, FanError};
