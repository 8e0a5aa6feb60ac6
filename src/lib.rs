//! # Weatherboard Library
//!
//! Internal library for the `weatherboard` sampling daemon.
//!
//! This library exists to enable testing of the daemon internals and to keep
//! CLI dispatch (main.rs) separate from application logic.
//!
//! ## Architecture
//!
//! - **Entry Point**: [`daemon`] takes a parsed invocation through startup,
//!   the singleton check and detaching, then runs the live instance
//! - **Core Logic**: [`core`] holds the signal-driven controller and the sampling loop
//! - **Sensors**: [`sensors`] with BME280 and SI1132 drivers over `embedded-hal`
//! - **Output**: [`output`] renders snapshots and owns the rotating output file
//! - **Publishing**: [`publish`] pushes metrics to an MQTT broker
//! - **Configuration**: [`config`] layers defaults, an optional TOML file and flags
//! - **Commands**: [`commands`] implements the `-k` control verbs
//! - **Infrastructure**: PID file, signals and detaching in [`io`], plus logging

// Import macros from logger module for use in all submodules
#[macro_use]
pub mod logger;

pub mod args;
pub mod commands;
pub mod common;
pub mod config;
pub mod core;
pub mod daemon;
pub mod io;
pub mod output;
pub mod publish;
pub mod sensors;

pub use daemon::Daemon;
