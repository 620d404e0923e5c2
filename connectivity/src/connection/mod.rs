//! Connection establishment
//!
//! [`ConnectionCoordinator`] turns a cluster id into a live
//! [`NetworkConnection`](crate::transport::NetworkConnection): it resolves the
//! cluster's endpoints, tries registered transports by priority, and shares
//! the outcome with every concurrent caller through the
//! [`ConnectionRepository`].
//!
//! ```text
//!            get_or_create_connection
//!                      │
//!      ┌── entry? ─────┴──── none ──► Pending ──ok──► Connected
//!      │                               │   │              │
//!   await shared               fail ◄──┘   └──► cancel    disconnect
//!                                │               │           │
//!                                └──► removed ◄──┴───────────┘
//! ```

mod coordinator;
pub mod events;
pub mod repository;

pub use coordinator::ConnectionCoordinator;
pub use events::{ConnectionEvent, ConnectionEventKind, ConnectionEvents};
pub use repository::{ConnectionRepository, ConnectionState};
