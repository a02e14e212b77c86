// src/services/mod.rs
pub mod pricing;
