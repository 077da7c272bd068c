//! # Reserved Extent Discovery
//!
//! Finds the physical extents set aside for contiguous allocations at boot.
//! They are requested on the kernel command line with the `memmap=` option:
//!
//! ```text
//! memmap=256M$0x100000000
//!        │   │└─ start
//!        │   └── `$` marks the range reserved
//!        └────── size
//! ```
//!
//! The kernel keeps such ranges out of its own use. Before handing them to
//! the allocator they are cross-checked against the firmware (e820) map, see
//! [`discover`].

#![cfg_attr(not(any(test, doctest)), no_std)]

extern crate alloc;

mod discover;
mod error;
mod firmware;
mod parse;

pub use discover::discover;
pub use error::MemmapError;
pub use firmware::{E820Entry, E820Kind, E820Map, FirmwareMemoryMap, SystemMemoryMap};
pub use parse::{
    MemmapEntry, MemmapKind, Parameter, Parameters, memparse, parameters, parse_command_line,
    parse_memmap_entry, parse_memmap_option,
};
