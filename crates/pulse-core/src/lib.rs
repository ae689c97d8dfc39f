//! # pulse-core
//!
//! Foundation types shared by the Pulse hub and its clients:
//!
//! - [`topic`]: the closed set of data categories a viewer can subscribe to
//! - [`subscription`]: per-connection subscription state (`Unset` vs an explicit set)
//! - [`message`]: topic-tagged messages and their JSON wire rendering
//! - [`wire`]: client → server frames and the decoded server → client envelope
//! - [`upstream`]: collaborator traits for pulling values and detecting changes
//! - [`retry`]: reconnect backoff math
//! - [`errors`]: shared error types
//! - [`logging`]: `tracing` subscriber setup

#![deny(unsafe_code)]

pub mod errors;
pub mod logging;
pub mod message;
pub mod retry;
pub mod subscription;
pub mod topic;
pub mod upstream;
pub mod wire;

pub use errors::{PulseError, UpstreamError};
pub use message::{BundlePolicy, Message, MessageKind, Payload};
pub use subscription::Subscription;
pub use topic::{Topic, TopicKind};
pub use upstream::{Change, ChangeFeed, PullSource};
