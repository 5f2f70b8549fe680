//! Medley - a multi-source music player core.
//!
//! Songs come from the local music folder and from a streaming catalog.
//! Each source is a [`service::MusicBackend`] wrapped in a
//! [`service::MusicService`] that owns its lifecycle and error recovery;
//! the [`registry::ServiceRegistry`] fans requests out to every enabled
//! service and the [`player::Player`] follows the play queue.

pub mod artwork;
pub mod catalog;
pub mod cli;
pub mod config;
pub mod error;
pub mod local;
pub mod metadata;
pub mod model;
pub mod platform;
pub mod player;
pub mod registry;
pub mod service;
pub mod store;
#[cfg(test)]
pub mod test_utils;
