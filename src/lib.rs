//! This crate provides a datacube assembly and delivery server. It exposes a single
//! orchestration endpoint that turns a geographic/temporal query into one or more persisted,
//! cloud-hosted analytical datacubes: per-collection observations are retrieved from an
//! S3-hosted catalog, optionally merged into a single spatio-temporally aligned metacube,
//! serialised to chunked Zarr artifacts and uploaded to the caller's cloud storage backend.
//!
//! The server is built on top of a number of open source components.
//!
//! * [Tokio](tokio), the most popular asynchronous Rust runtime.
//! * [Axum](axum) web framework, built by the Tokio team on top of various popular components,
//!   including the [hyper] HTTP library.
//! * [Serde](serde) performs (de)serialisation of JSON request and response data.
//! * [AWS SDK for S3](aws-sdk-s3) is used to interact with S3-compatible object stores.
//! * [ndarray] provides [NumPy](https://numpy.org)-like n-dimensional arrays used to hold
//!   datacube contents in memory.
//! * [zarrs] serialises datacubes to the Zarr storage format.

pub mod app;
pub mod app_state;
pub mod cli;
pub mod datacube;
pub mod earthdata;
pub mod error;
pub mod metrics;
pub mod models;
pub mod pipeline;
pub mod s3_client;
pub mod server;
pub mod source;
pub mod telemetry;
#[cfg(test)]
pub mod test_utils;
pub mod tracing;
pub mod upload;
pub mod validated_json;
pub mod validated_query;
pub mod zarr;
