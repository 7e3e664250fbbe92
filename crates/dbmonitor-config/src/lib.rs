// crates/dbmonitor-config/src/lib.rs
// ============================================================================
// Module: DB Monitor Config Library
// Description: Canonical config model and validation.
// Purpose: Single source of truth for dbmonitor.toml semantics.
// Dependencies: dbmonitor-core, serde, toml
// ============================================================================

//! ## Overview
//! `dbmonitor-config` defines the configuration model for the monitor client:
//! client deadlines and endpoint layout, event logging, named connections,
//! and the bootstrap command list. Loading is strict and fails closed.
//!
//! Security posture: config inputs are untrusted.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod config;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use config::*;
