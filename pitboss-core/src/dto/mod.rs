//! DTOs
//!
//! Data transfer objects exchanged over the admin API.

pub mod worker;
