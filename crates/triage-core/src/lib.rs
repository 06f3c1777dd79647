//! Core domain + application logic for creator inbox triage.
//!
//! This crate is intentionally framework-agnostic. Storage and transport live
//! behind ports (traits); the classifier and composer are plain functions over
//! their inputs plus an injected randomness source.

pub mod audit;
pub mod classifier;
pub mod composer;
pub mod config;
pub mod domain;
pub mod errors;
pub mod logging;
pub mod retention;
pub mod rng;
pub mod service;
pub mod store;
pub mod templates;

pub use errors::{Error, Result};
