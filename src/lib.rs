//! A KDBX (KeePass 2) password database engine.
//!
//! This crate reads and writes the encrypted, authenticated KDBX container
//! format, versions 3.1 and 4.x: composite key construction, key derivation,
//! the outer header with its MAC envelope, the block-framed cipher streams,
//! the inner random stream that masks protected values, and the XML payload
//! that materializes the group/entry tree.
#![recursion_limit = "1024"]

pub(crate) mod compression;
pub mod config;
pub(crate) mod crypt;
mod db;
pub mod error;
pub(crate) mod format;
pub(crate) mod hashed_block_stream;
pub(crate) mod hmac_block_stream;
mod io;
pub mod key;
pub mod keystore;
pub mod variant_dictionary;
pub(crate) mod xml_db;

pub use self::db::*;
pub use self::key::DatabaseKey;

// see https://gist.github.com/msmuenchen/9318327 for file format details
