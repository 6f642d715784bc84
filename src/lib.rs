pub mod audit;
pub mod batch;
pub mod config;
pub mod eproc;
pub mod logging;
pub mod models;
pub mod portal;
pub mod processo;
pub mod projudi;
pub mod router;
