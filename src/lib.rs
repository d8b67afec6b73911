pub mod aws;
pub mod config;
pub mod logging;
pub mod remote;
pub mod table;
