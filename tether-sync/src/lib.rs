//! # tether-sync
//!
//! Sync units and their action queues.
//!
//! [`SyncUnit`] is the capability set the scheduler drives; [`Mirror`] is the
//! concrete unit that coalesces filesystem events in a [`DelayQueue`] and
//! turns due actions into worker processes through a [`Spawner`].

pub mod delay;
pub mod event;
pub mod mirror;
pub mod unit;

pub use delay::{Delay, DelayQueue, DelayStatus};
pub use event::FsEvent;
pub use mirror::Mirror;
pub use unit::{DelayReport, Spawner, SyncReport, SyncUnit};
