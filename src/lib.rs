pub mod aws;
pub mod config;
pub mod remediation;
pub mod server;
