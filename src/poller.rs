//! Polling primitives covering session orchestration, adaptive pacing, page
//! decoding, and the in-memory HTML list sink.

pub mod decode;
pub mod html;
pub mod lifecycle;
pub mod pacing;
pub mod session;
