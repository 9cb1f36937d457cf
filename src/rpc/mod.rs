//! Length-prefixed protobuf RPC between the gateway and the backend services.

use tokio_util::codec::LengthDelimitedCodec;

pub mod ads;
pub mod auth;
pub mod city;
pub mod client;
pub mod proto;
pub mod server;

pub use client::RpcClient;
pub use server::{serve, RpcService};

pub const MAX_FRAME_BYTES: usize = 16 * 1024 * 1024;
pub const DEFAULT_TIMEOUT_MS: u64 = 10_000;

/// 4-byte big-endian length prefix, frames capped at [`MAX_FRAME_BYTES`].
pub fn frame_codec() -> LengthDelimitedCodec {
    LengthDelimitedCodec::builder()
        .length_field_length(4)
        .big_endian()
        .max_frame_length(MAX_FRAME_BYTES)
        .new_codec()
}
