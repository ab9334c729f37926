//! In-process publish/subscribe bus with path-pattern routing
//!
//! Topics are hierarchical path strings (`/order/created/book`). Patterns
//! compiled by [`PathPattern`] match against them with named parameters,
//! character-class constraints, and wildcards of varying arities; [`Bus`]
//! dispatches every publication to the handlers of every matching
//! subscription concurrently, tracking in-flight publications.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use armature_pathbus::Bus;
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() {
//!     let bus = Bus::new();
//!
//!     bus.subscribe("/order/:status/:item", |args| async move {
//!         println!("order {} -> {}", args["item"], args["status"]);
//!         Ok(())
//!     }).unwrap();
//!
//!     bus.publish("/order/created/book", json!({})).await;
//! }
//! ```
//!
//! ## Pattern Grammar
//!
//! ```text
//! pattern   := "/" | ("/" segment)+ ("/")?
//! segment   := static | param | wildcard
//! static    := literal (no ':', '*', '+', '?', '[' at position 0)
//! param     := ":" name ("[" class "]")? suffix?
//! wildcard  := ("*" | "**" | "+" | "?") ("[" class "]")? suffix?
//!            | ("[" class "]") suffix?
//! suffix    := "*" | "**" | "+" | "?"
//! ```
//!
//! `**` consumes every remaining segment as a list, `+` joins every
//! remaining segment with `/` into one string, `?` consumes at most one
//! segment, and a bare (no-suffix) name or wildcard consumes exactly one.
//!
//! ## Once Subscriptions and Tokens
//!
//! ```rust,ignore
//! let token = bus.once("/startup/ready")?;
//! bus.publish("/startup/ready", json!({})).await;
//! let args = token.wait().await;
//! ```
//!
//! ## Configuration
//!
//! ```rust,ignore
//! let bus = BusBuilder::new().enable_logging(false).build();
//! ```

pub mod bus;
pub mod error;
pub mod handler;
pub mod merge;
pub mod pattern;
pub mod segment;
pub mod subscription;

pub use bus::{global, Bus, BusBuilder, BusConfig, OnceToken, UnsubscribeTarget};
pub use error::BusError;
pub use handler::Handler;
pub use merge::deep_merge;
pub use pattern::{MatchOutcome, ParamValue, PathPattern};
pub use segment::{Arity, PatternSegment, SegmentKind};
pub use subscription::SubscriptionId;
