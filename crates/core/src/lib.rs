//! Ripple Core - Foundational types for the Ripple reactive state container.
//!
//! This crate provides the pieces shared by live state and its snapshots:
//!
//! - `Key` / `Path`: addressing object fields and sequence positions
//! - `Primitive`: scalar values copied verbatim
//! - `Container` / `OrderedMap` / `Sequence`: insertion-ordered objects and sparse sequences
//! - `Revision` / `Clock`: the monotonic counter stamped on every mutation
//! - `Error`: error types for container operations
//!
//! # Example
//!
//! ```rust
//! use ripple_core::{Clock, Container, ContainerKind, Key, ManualClock, Primitive};
//!
//! let mut obj: Container<Primitive> = Container::empty(ContainerKind::Object);
//! obj.insert(Key::from("count"), Primitive::from(1)).unwrap();
//! assert_eq!(obj.get(&Key::from("count")), Some(&Primitive::Int(1)));
//!
//! let clock = ManualClock::new();
//! let first = clock.advance();
//! assert!(clock.advance() > first);
//! ```

#![no_std]

extern crate alloc;

mod container;
mod error;
mod key;
mod primitive;
mod revision;

pub use container::{Container, ContainerKind, Iter, OrderedMap, Sequence, MAX_SEQUENCE_LEN};
pub use error::{Error, Result};
pub use key::{Key, Path};
pub use primitive::Primitive;
pub use revision::{Clock, ClockRef, GlobalClock, ManualClock, Revision};
