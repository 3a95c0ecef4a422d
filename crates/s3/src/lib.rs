//! bcp-s3: S3 transfer backend for bucketcp
//!
//! This crate implements the `TransferBackend` trait from bcp-core using
//! aws-sdk-s3, with concurrent multipart uploads and ranged downloads.

mod client;

pub use client::{
    DEFAULT_CONCURRENCY, DEFAULT_PART_SIZE, MAX_UPLOAD_PARTS, MIN_UPLOAD_PART_SIZE, S3Client,
    upload_part_size,
};
