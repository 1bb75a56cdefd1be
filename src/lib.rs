// src/lib.rs

//! flatwatch: polls Berlin housing providers for new flat listings.

pub mod error;
pub mod extractors;
pub mod models;
pub mod pipeline;
pub mod services;
pub mod storage;
pub mod utils;
