//! sc-s3: S3 SDK adapter for the s3-client CLI
//!
//! This crate provides the implementation of the ObjectStore trait
//! using the aws-sdk-s3 crate. It is the only crate that directly
//! depends on the AWS SDK.

pub mod cache;
pub mod client;

pub use cache::ClientCache;
pub use client::S3Client;
