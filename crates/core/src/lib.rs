//! Domain types shared by the comfybot crates.
//!
//! Holds the job template graph and its per-request parameterization,
//! the deployment variant profiles, and the on-disk template store.

pub mod error;
pub mod seed;
pub mod store;
pub mod template;
pub mod variant;
