//! # Spatial DQN
//!
//! Value-estimation network for a real-time strategy agent. The observation is a
//! single player-relative feature screen (an H x W grid of allegiance categories);
//! the network assigns one Q-value to every screen cell, interpreted as the
//! expected return of targeting that cell with the next movement action.
//!
//! The crate owns the network definition, the temporal-difference training step,
//! and the checkpoint/telemetry lifecycle. The environment, replay buffer,
//! exploration policy, and outer training loop are external: they feed batches of
//! (state, action, target) into [`network::MovementValueEstimator`] and decide
//! when to log, checkpoint, or restore.
//!
//! ## Modules
//!
//! - [`network`] — Q-network, observation encoding, TD loss, and the estimator
//! - [`observation`] — Player-relative feature screen grid type
//! - [`checkpoint`] — Atomic checkpoint store and metadata
//! - [`telemetry`] — Scalar summary writer capability
//! - [`config`] — TOML configuration loading and validation
//! - [`error`] — Structured error types

#![recursion_limit = "256"]

pub mod checkpoint;
pub mod config;
pub mod error;
pub mod network;
pub mod observation;
pub mod telemetry;
