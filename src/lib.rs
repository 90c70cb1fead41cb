//! Day-trade lesson generator: a script and three illustrations per run,
//! with fixed fallbacks whenever a remote service misbehaves.

#![allow(clippy::multiple_crate_versions)]
#![deny(clippy::all)]
#![deny(clippy::await_holding_lock)]
#![deny(clippy::complexity)]
#![deny(clippy::correctness)]
#![deny(clippy::disallowed_methods)]
#![deny(clippy::expect_used)]
#![deny(clippy::needless_pass_by_value)]
#![deny(clippy::panic)]
#![deny(clippy::perf)]
#![deny(clippy::trivially_copy_pass_by_ref)]
#![deny(clippy::unreachable)]
#![deny(clippy::unwrap_used)]
#![deny(warnings)]
#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod cli;
pub mod config;
pub mod constants;
pub mod error;
pub mod images;
pub mod persist;
pub mod pipeline;
pub mod prompts;
pub mod sanitize;
pub mod scheduler;
pub mod script;
pub mod textgen;
pub mod topics;
pub mod web;
