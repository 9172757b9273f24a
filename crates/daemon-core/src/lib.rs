//! Primitives for writing correct Unix daemons.
//!
//! This crate bundles the pieces a daemon needs that are tedious to get
//! right by hand: detaching from the controlling terminal and enforcing a
//! pidfile singleton ([`daemonizer`]), a named FIFO that guarantees a live
//! reader ([`fifo`]), ANSI-safe deferred signal delivery ([`signal`]), the
//! two POSIX limit queries the rest of the crate needs ([`limits`]), a
//! minimal output-sink contract ([`sink`]), and a thread-safe ordered
//! sequence with an internal iterator used as the basic container
//! throughout ([`sequence`]).
//!
//! Process management, restart policy, log rotation, network I/O and
//! cross-host coordination are out of scope; this crate is the building
//! blocks, not a process supervisor framework.

pub mod daemonizer;
pub mod fifo;
pub mod limits;
pub mod sequence;
pub mod signal;
pub mod sink;

pub(crate) const DAEMONIZER_TARGET: &str = "daemon_core::daemonizer";
pub(crate) const FIFO_TARGET: &str = "daemon_core::fifo";
pub(crate) const SIGNAL_TARGET: &str = "daemon_core::signal";
