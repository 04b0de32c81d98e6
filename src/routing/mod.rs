//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming Request (host, path)
//!     → router.rs (route lookup)
//!     → matcher.rs (evaluate match conditions)
//!     → Return: ResolvedRoute (name + upstream URL) or None
//!
//! Route Compilation (at startup and on reload):
//!     RouteConfig[]
//!     → Sort by priority, then prefix length
//!     → Compile matchers
//!     → Freeze as immutable RouteTable, swapped atomically
//! ```

pub mod matcher;
pub mod router;

pub use router::{ResolvedRoute, RouteTable};
