//! Types shared between the scanner and whatever presents its output.
//!
//! This crate provides:
//! - the closed set of scan categories with their frequency tables
//! - the status snapshot exported on every coordination tick
//! - detected-message records as stored and exported

extern crate alloc;
extern crate core;

mod category;
mod message;
mod status;

pub use category::*;
pub use message::*;
pub use status::*;
