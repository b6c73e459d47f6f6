//! # drop-core
//!
//! Pure logic for codedrop (no I/O, instant tests).
//!
//! This crate holds the parts of an ephemeral transfer that do not touch a
//! network or a disk:
//! - [`CodeGenerator`] draws short uppercase codes and gives up after a
//!   fixed retry budget
//! - [`TransferPolicy`] fixes the TTL, code lengths and size limits
//! - [`validate`] rejects bad input before any store is touched
//! - [`Clock`] lets expiry be tested without sleeping
//!
//! The relay crate performs the actual persistence and blob I/O and calls
//! into these pieces.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod clock;
pub mod codegen;
pub mod policy;
pub mod validate;

pub use clock::{Clock, ManualClock, SystemClock};
pub use codegen::{
    CodeDraws, CodeGenerator, ExhaustedError, CODE_ALPHABET, MAX_GENERATION_ATTEMPTS,
};
pub use policy::{
    TransferPolicy, MAX_PHOTO_BYTES, MAX_TEXT_CHARS, PHOTO_CODE_LENGTH, TEXT_CODE_LENGTH,
    TRANSFER_TTL,
};
pub use validate::{validate_code, validate_photo, validate_text, ValidationError};
