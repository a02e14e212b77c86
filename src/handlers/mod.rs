// src/handlers/mod.rs
pub mod pipelines;
pub mod status;
