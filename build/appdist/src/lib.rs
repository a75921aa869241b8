// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Builds a set of position-dependent user programs, each linked at its own
//! fixed address, and writes the manifest the kernel build embeds them from.

pub mod alloc;
pub mod board;
pub mod config;
pub mod discover;
pub mod dist;
pub mod driver;
pub mod error;
pub mod linker;
pub mod manifest;

pub use error::Error;
