//! On-disk codecs for the hdfcore container format.
//!
//! This crate holds the byte-level encoders and decoders the container core
//! builds on: file addresses, datatype descriptors, the superblock root
//! record and the metadata checksum. It supports `no_std` environments with
//! the `alloc` crate.

#![cfg_attr(not(feature = "std"), no_std)]

#[cfg(not(feature = "std"))]
extern crate alloc;

pub mod address;
pub mod checksum;
pub mod datatype;
pub mod error;
pub mod signature;
pub mod superblock;

pub use address::UNDEFINED_ADDR;
pub use datatype::{Datatype, DecodeOptions, EncodeOptions, TypeKind};
pub use error::FormatError;
pub use superblock::Superblock;
