//! # Reconcile Sample Library
//!
//! A small mirror controller built on `reconcile_framework`, exposed as a library for
//! integration testing.

pub mod config;
pub mod lifecycle;
pub mod model;
pub mod reconciler;
pub mod watcher;
