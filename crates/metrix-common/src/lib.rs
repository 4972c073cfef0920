//! Shared building blocks for the metrix agent and server.
//!
//! [`types`] holds the metric value model and the JSON wire item,
//! [`envelope`] the compression/signing/encryption layers applied to batch
//! updates, and [`proto`] the generated gRPC types.

pub mod convert;
pub mod envelope;
pub mod types;

pub mod proto {
    #![allow(clippy::pedantic)]
    #![allow(clippy::missing_errors_doc)]
    #![allow(clippy::doc_markdown)]
    #![allow(clippy::default_trait_access)]
    tonic::include_proto!("metrix");
}
