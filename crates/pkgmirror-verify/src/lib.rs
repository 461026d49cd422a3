//! Content verification for mirrored metadata files.
//!
//! Files in the mirror are content-addressed by SHA-256. This crate provides the
//! digest type used in documents and cache paths, incremental hashing, and the
//! freshness check run during the per-pass consistency sweep.
//!
//! # Example
//!
//! ```
//! use pkgmirror_verify::{Sha256Hasher, VerifiedReader};
//! use std::io::Read;
//!
//! let data = b"hello world";
//! let expected = Sha256Hasher::digest(data);
//!
//! let mut reader = VerifiedReader::new(&data[..], Sha256Hasher::new());
//! let mut buffer = Vec::new();
//! reader.read_to_end(&mut buffer).unwrap();
//!
//! reader.finish(&expected).unwrap();
//! ```

pub use self::error::{Result, VerifyError};
pub use self::hash::ContentHash;
pub use self::hasher::{Hasher, Sha256Hasher};
pub use self::reader::VerifiedReader;
pub use self::verifier::ContentVerifier;

mod error;
mod hash;
mod hasher;
mod reader;
mod verifier;
