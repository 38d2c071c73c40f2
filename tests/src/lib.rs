//! # Hostcast Test Suite
//!
//! Cross-crate tests where several participants share one rendezvous
//! address.
//!
//! ## Structure
//!
//! ```text
//! tests/src/
//! └── integration/
//!     ├── mod.rs        # Harness: simulated processes, waits, collectors
//!     ├── fan_out.rs    # Delivery, echo suppression, channel isolation
//!     ├── election.rs   # Single hub, wire format, decode failures
//!     └── failover.rs   # Hub loss and re-election
//! ```
//!
//! Each `ChannelManager` owns its own coordinators and competes for the
//! port exactly as a separate OS process would, so one test process can
//! host a whole cluster.
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test -p hostcast-tests
//! cargo test -p hostcast-tests integration::failover::
//! ```

#![allow(dead_code)]

pub mod integration;
