//! Embed free text with a remote embedding API and project the vectors to 3D.
//!
//! A request is a delimiter-separated string of texts plus the name of a
//! provider. Each text is embedded by that provider, the resulting matrix is
//! checked for shape, and PCA reduces it to three coordinates per text for
//! plotting.
//!
//! | Provider | Default model | Strategy |
//! |----------|---------------|----------|
//! | `openai` | `text-embedding-ada-002` | one batched request |
//! | `gemini` | `embedding-001` | one request per text, concurrent |
//! | `cloudflare` | `@cf/baai/bge-large-en-v1.5` | one request per text, concurrent |
//!
//! # Modules
//!
//! - [`config`]: TOML config file plus environment variable overrides
//! - [`embedding`]: provider trait, the three providers and the dispatching service
//! - [`reduce`]: PCA down to three components
//! - [`pipeline`]: split, embed, reduce; all or nothing
//! - [`server`]: axum HTTP front end
//! - [`error`]: typed errors shared by all of the above

pub mod config;
pub mod embedding;
pub mod error;
pub mod pipeline;
pub mod reduce;
pub mod server;
