//! Upstream forwarding.
//!
//! # Data Flow
//! ```text
//! ForwardRequestDescriptor
//!     → client.rs (build request, spawn exchange)
//!     → Idle → Dispatched → {Success | ContentMismatch | ParseError | TransportFailure}
//!     → negotiation.rs (primary-type check, JSON decode)
//!     → continuation.rs (exactly one Completion to the waiting stage)
//! ```

pub mod client;
pub mod continuation;
pub mod negotiation;

pub use client::{build_request, Completion, ForwardState, UpstreamClient};
pub use continuation::{Continuation, Resolution};
