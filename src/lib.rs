pub mod access;
pub mod anchor;
pub mod certificate;
pub mod config;
pub mod crypto;
pub mod error;
pub mod lifecycle;
pub mod merkle;
pub mod server;
pub mod service;
pub mod state;
pub mod telemetry;
pub mod worker;
