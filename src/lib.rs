pub mod config;
pub mod context;
pub mod error;
pub mod evaluation;
pub mod guard;
pub mod logging;
pub mod remote;
pub mod router;
pub mod session;
pub mod settings;
pub mod storage;
pub mod views;
