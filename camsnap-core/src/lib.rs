#![doc = "camsnap-core: core logic library for camsnap."]

//! This crate contains the camera inventory model, the bounded snapshot scheduler and the
//! bucket synchroniser. Concrete network clients (cloud storage, configuration loading)
//! live in the `camsnap` CLI crate and plug in through the traits in [`contract`].
//!
//! # Usage
//! Add this as a dependency for all shared capture, manifest and sync code.

pub mod capture;
pub mod config;
pub mod contract;
pub mod credentials;
pub mod error;
pub mod inventory;
pub mod manifest;
pub mod scheduler;
pub mod synchronise;
pub mod walker;
