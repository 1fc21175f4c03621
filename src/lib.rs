//! Device-side USB driver for the LEGO NXT brick.
//!
//! The AT91SAM7S256 carries a USB Device Port (UDP) peripheral wired to the
//! brick's USB socket. This crate drives it as a full-speed, vendor-specific
//! device with one configuration, one interface and two bulk endpoints, and
//! exposes a byte-oriented send/receive surface to the foreground firmware.
//!
//! Enumeration (descriptor service, address assignment, configuration) and
//! the per-packet FIFO work all happen in the interrupt handler; foreground
//! code only polls the shared driver state. See the [`udp`] module for the
//! entry points, and [`platform::Platform`] for the board integration the
//! driver expects (clocks, the D+ pull-up, the interrupt controller and a
//! millisecond tick).
//!
//! Nothing here assumes a Cortex-M core; the critical-section implementation
//! is supplied by the board crate.

#![no_std]

#[cfg(test)]
extern crate std;

// This must come first so the other modules see its macros.
mod fmt;

pub mod platform;
pub mod udp;
