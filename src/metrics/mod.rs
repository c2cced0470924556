//! Metrics collection and export module.
//!
//! This module exports probe outcomes to external monitoring systems.
//! Currently supports Prometheus Push Gateway.
//!
//! # Submodules
//!
//! - `prom` - Prometheus metrics integration

pub mod prom;
