//! Command implementations for stresslab

pub mod bench;
pub mod config;
pub mod cpu;
pub mod info;
pub mod run;
