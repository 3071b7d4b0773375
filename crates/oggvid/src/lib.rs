//! Streaming playback of Ogg-contained video with optional audio.
//!
//! The pipeline reads a container in fixed-size chunks, reassembles codec
//! packets per logical stream, decodes ahead of the presentation clock into
//! a bounded frame queue, and presents frames as the clock reaches them.
//! Codecs are pluggable behind the [`codec::VideoCodec`] and
//! [`codec::AudioCodec`] traits; the container and timing layers never look
//! inside a compressed packet.
//!
//! Typical use: build a [`Clip`] with its codecs, [`load`](Clip::load) a
//! [`ByteSource`], hand the clip to a [`DecodeWorker`], and call
//! [`update`](Clip::update) from the render loop.

pub mod clip;
pub mod codec;
pub mod error;
pub mod frame_queue;
pub mod headers;
pub mod ogg;
pub mod sink;
pub mod source;
pub mod timer;
pub mod worker;
pub mod yuv;

pub use clip::{Clip, ClipOptions, OutputMode, DEFAULT_QUEUE_CAPACITY};
pub use error::ClipError;
pub use frame_queue::FrameQueue;
pub use sink::{AudioSink, TextureSink};
pub use source::{ByteSource, FileSource, MemorySource, CHUNK_SIZE};
pub use timer::Timer;
pub use worker::DecodeWorker;
