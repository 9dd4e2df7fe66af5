// Wire module — framed line protocol spoken between gateway and server

pub mod frame;

pub use frame::{
    decode_frame, encode_frame, read_frame, write_frame, write_line, FrameError,
    FIELD_SEPARATOR, TERMINATOR,
};

/// The only request command the ingestion side recognizes.
pub const CMD_DATA: &str = "data";

/// Positive reply line.
pub const REPLY_CONFIRMED: &str = "confirmed";

/// Negative reply line.
pub const REPLY_FAILED: &str = "failed";
