//! Pitboss Core
//!
//! Core types and abstractions for the pitboss miner supervision daemon.
//!
//! This crate contains:
//! - Domain types: Core business entities (WorkerSpec, WorkerState, etc.)
//! - DTOs: Data transfer objects for the admin API

pub mod domain;
pub mod dto;
