//! Codec seam: the pipeline treats codec bit-level internals as opaque.
//!
//! Concrete decoders plug in behind [`VideoCodec`] and [`AudioCodec`],
//! selected at clip construction. The contract follows the Xiph convention
//! the container layer is built around: three header packets per logical
//! stream (identification, comment, codec setup), then body packets whose
//! page granule positions convert to presentation seconds through a
//! codec-specific function.

use crate::ogg::Packet;

/// Outcome of offering a header packet to a codec.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeaderResult {
    /// The packet is one of this codec's three header packets and was
    /// consumed.
    Accepted,
    /// The packet does not belong to this codec (first-packet
    /// classification only).
    NotMine,
    /// The packet was recognized but is malformed.
    Invalid(String),
}

/// Codec-level failure.
#[derive(Debug, Clone)]
pub enum CodecError {
    /// Recognized stream, unsupported parameters (bit depth, channel
    /// layout, pixel format).
    Unsupported(String),
    /// A packet could not be decoded.
    Decode(String),
}

impl std::fmt::Display for CodecError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CodecError::Unsupported(msg) => write!(f, "unsupported format: {msg}"),
            CodecError::Decode(msg) => write!(f, "decode failed: {msg}"),
        }
    }
}

impl std::error::Error for CodecError {}

/// Stream parameters produced by a completed video header sequence.
#[derive(Debug, Clone, Copy)]
pub struct VideoParams {
    pub width: u32,
    pub height: u32,
    pub fps: f64,
}

/// Stream parameters produced by a completed audio header sequence.
#[derive(Debug, Clone, Copy)]
pub struct AudioParams {
    pub channels: u32,
    pub sample_rate: u32,
}

/// One plane of a decoded picture.
#[derive(Debug, Clone)]
pub struct PicturePlane {
    pub data: Vec<u8>,
    /// Bytes per row (may exceed the visible width).
    pub stride: usize,
}

/// A decoded picture in 4:2:0 planar layout.
#[derive(Debug, Clone)]
pub struct YuvPicture {
    pub y: PicturePlane,
    /// Chroma planes at half resolution in both dimensions.
    pub u: PicturePlane,
    pub v: PicturePlane,
}

/// Result of feeding one body packet to the video codec.
#[derive(Debug)]
pub enum DecodeOutput {
    /// A displayable picture plus the decoder's running granule position.
    Picture { picture: YuvPicture, granule: i64 },
    /// The packet was valid but produced no new picture (duplicate frame,
    /// stray header). The caller fetches the next packet.
    NotAFrame,
}

/// Video decoder context.
pub trait VideoCodec: Send {
    /// Offers a header packet. The first call classifies the stream
    /// (`NotMine` rejects it); subsequent calls consume the remaining
    /// header packets.
    fn read_header(&mut self, packet: &[u8]) -> HeaderResult;

    /// Finalizes the header sequence and allocates the decode context.
    fn finish_headers(&mut self) -> Result<VideoParams, CodecError>;

    /// Decodes one body packet. `Err` marks the packet non-decodable; the
    /// caller skips it and continues.
    fn decode(&mut self, packet: &Packet) -> Result<DecodeOutput, CodecError>;

    /// Converts a granule position to presentation seconds.
    fn granule_time(&self, granule: i64) -> f64;

    /// True if the packet holds a frame decodable without prior state.
    fn is_keyframe(&self, packet: &[u8]) -> bool;

    /// Forces the running position counter after an arbitrary jump.
    fn set_granule_position(&mut self, granule: i64);

    /// Discards decoder state; required before decoding resumes at an
    /// arbitrary stream position.
    fn reset(&mut self);
}

/// A block of decoded PCM, interleaved f32.
#[derive(Debug, Clone)]
pub struct PcmBlock {
    pub data: Vec<f32>,
    /// Sample count per channel.
    pub samples: usize,
}

/// Audio decoder context.
///
/// Decoded PCM accumulates in an internal buffer;
/// [`pending_pcm`](AudioCodec::pending_pcm) drains it, which also marks the
/// samples consumed.
pub trait AudioCodec: Send {
    fn read_header(&mut self, packet: &[u8]) -> HeaderResult;

    fn finish_headers(&mut self) -> Result<AudioParams, CodecError>;

    /// Feeds one body packet into the synthesis state.
    fn decode(&mut self, packet: &Packet) -> Result<(), CodecError>;

    /// Drains the next block of decoded PCM, if any.
    fn pending_pcm(&mut self) -> Option<PcmBlock>;

    /// Discards synthesis state after an arbitrary jump.
    fn reset(&mut self);
}
