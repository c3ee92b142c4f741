//! Configuration loading: pipeline documents, FSM declarations, and the
//! server settings `clusterd` reads from the environment.

mod document;
mod error;
mod server;

pub use document::{load_fsm_declaration, load_pipeline_config};
pub use error::{Error, Result};
pub use server::ServerConfig;
