//! Terraform Provider for VMware Tanzu Mission Control
//!
//! Speaks the JSON-RPC plugin protocol over stdin/stdout and manages
//! clusters, management clusters, provisioners, policies and repository
//! credentials through the TMC REST API.

pub mod client;
pub mod manifest;
pub mod provider;
pub mod resources;
pub mod schema;

pub use provider::TmcProvider;
