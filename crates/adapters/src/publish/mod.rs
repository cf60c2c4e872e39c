//! Platform publisher adapters
//!
//! Delivery backends implementing the `PlatformPublisher` port:
//! - `sim`: logs deliveries without side effects, with failure injection
//! - `outbox`: appends deliveries to a JSONL file for review
//! - `webhook`: POSTs deliveries to per-platform HTTP endpoints
//! - `router`: composes per-platform publishers behind one port

mod outbox;
mod router;
mod sim;
mod webhook;

pub use outbox::{OutboxPublisher, OutboxWriter};
pub use router::RoutingPublisher;
pub use sim::SimulatedPublisher;
pub use webhook::WebhookPublisher;
