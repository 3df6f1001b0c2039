//! squawk-rs library crate
//!
//! Speaks text as it changes. A change detector polls a file and a named
//! text source, a dispatcher hands ready content to a speech engine off the
//! polling task, and an audio bridge carries the synthesized chunks to a
//! fixed-rate real-time consumer.

#[macro_use]
extern crate log;

pub mod adapter;
pub mod bridge;
pub mod config;
pub mod constants;
pub mod detector;
pub mod dispatcher;
pub mod event;
pub mod host;
pub mod net;
pub mod phonetic;
pub mod pipeline;
pub mod stdin;
pub mod synth;
pub mod text_source;

#[cfg(test)]
mod bridge_tests;
