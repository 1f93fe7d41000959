//! Trellis Core
//!
//! Core types and abstractions for the Trellis CI engine.
//!
//! This crate contains:
//! - Domain types: Core business entities (Project, Pipeline, Job, Artifact, etc.)
//! - DTOs: Data transfer objects for the host-facing surface
//! - Variables: the CI variable collection and secret masking

pub mod domain;
pub mod dto;
pub mod variables;
