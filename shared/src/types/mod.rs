//! Core data model

pub mod agent;
pub mod counter;
pub mod trace;
