//! Syncast Server Library
//!
//! Core functionality for the Syncast broadcast server:
//! - Connection registry with lifecycle-driven pruning
//! - Per-connection transport tasks over TCP
//! - Broadcast coordinator for play/stop/disconnect fan-out
//! - Media lookup and the operator command path

pub mod broadcast;
pub mod commands;
pub mod listener;
pub mod media;
pub mod operator;
pub mod registry;
pub mod transport;
