//! Collaboration Module
//! ====================
//! The inter-AS defense protocol: wire messages, the message-bus seams,
//! peer reputation and request correlation, and the REQ/RES client that
//! ties them together.
//!
//! Copyright © 2025 Stephen Bilodeau. All rights reserved.

pub mod bus;
pub mod client;
pub mod message;
pub mod reputation;

pub use bus::{BusConsumer, BusProducer, BusRecord, InMemoryBus};
pub use client::{CollabClient, RequestOrigin};
pub use message::{CollabRequest, CollabResponse, Decision, Detection};
pub use reputation::{PendingRequests, ReputationBook, ResponseLedger};
