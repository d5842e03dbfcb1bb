//! Core library for daq-settings.
//!
//! Unit-aware, validated instrument settings and the update / read-back
//! feedback protocol used to drive laboratory hardware.
//!
//! - [`units`] - unit algebra, quantities and the injectable registry
//! - [`parameter`] - the validated settings tree, its metadata, caches and
//!   JSON contract
//! - [`device`] - the `Device` trait, feedback classification, pre-flight
//!   validation and mock instruments
//! - [`config`] / [`logging`] - layered configuration and tracing setup
//!
//! ```rust
//! use daq_settings::parameter::Parameter;
//!
//! let mut settings = Parameter::builder("gain", 1.0).range(0.0, 10.0).build().unwrap();
//! settings.set("gain", 2.5).unwrap();
//! assert!(settings.set("gain", 20.0).is_err());
//! ```

pub mod config;
pub mod device;
pub mod error;
pub mod logging;
pub mod parameter;
pub mod units;

pub use error::{AppResult, DaqError};
