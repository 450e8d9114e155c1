//! Silicon model of the many-core spiking neural network machine.
//!
//! This crate has **no dependencies** and **no hardware access**. It is a
//! pure model of what the device-side programs expect: per-chip core and
//! cycle budgets, memory ceilings, the fixed-point formats used in every
//! parameter block, the packed synaptic row layout and the numbering of
//! the memory regions that make up a vertex image.
//!
//! # Crate organisation
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`machine`] | Core budget (16 per chip), 200 MHz clock, 16 MiB matrix ceiling |
//! | [`fixed`] | s1615 / u032 / arbitrary-scale fixed-point encode and decode |
//! | [`layout`] | Synaptic row header, control words, delay slots, row offset/length words |
//! | [`regions`] | Region slot numbering for neuron and synapse processor images |

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod fixed;
pub mod layout;
pub mod machine;
pub mod regions;
