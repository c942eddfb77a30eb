//! Unit tests for configuration loading and precedence.
//!
//! Tests are organised into modules by functional area:
//! - `helpers`: Shared test utilities
//! - `precedence`: Layer precedence and environment loading tests
//! - `operation_mode`: Operation mode determination tests
//! - `validation`: Tracker and store settings validation tests

mod helpers;
mod validation;
