pub mod config;
pub mod dicomweb;
pub mod error;
pub mod handlers;
pub mod observability;
pub mod server;

pub use config::{AppConfig, ImagingConfig, LookupMode, ServerConfig};
pub use error::GatewayError;
pub use observability::init_tracing;
pub use server::{AppState, ImgateServer, ServerBuilder, build_app};
