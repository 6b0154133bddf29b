#![forbid(unsafe_code)]

//! riptube: mirrors every upload of a video-hosting account to local disk,
//! picking the best available encoding for each item and recording what was
//! fetched in a JSON sidecar.

pub mod account;
pub mod acquire;
pub mod catalog;
pub mod config;
pub mod error;
pub mod extract;
pub mod feed;
pub mod http;
pub mod ledger;
pub mod metadata;
pub mod security;
pub mod select;

pub use error::{RipError, RipResult};
