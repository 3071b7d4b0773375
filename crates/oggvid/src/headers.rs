//! Stream classification and header negotiation.
//!
//! A well-formed stream opens with one beginning-of-stream page per logical
//! stream, each carrying that stream's identification header as its sole
//! packet. Classification offers the identification packet to the video
//! codec, then the audio codec; streams neither claims are discarded. After
//! the BOS section, each claimed codec must consume two more header packets
//! (comment and setup) before its parameters can be finalized.
//!
//! Negotiation owns the byte source only for its duration; the page
//! synchronizer and per-stream assemblers it returns carry any body packets
//! that arrived on the same pages as the trailing headers.

use crate::codec::{AudioCodec, AudioParams, HeaderResult, VideoCodec, VideoParams};
use crate::error::ClipError;
use crate::ogg::{PacketAssembler, Page, PageSync};
use crate::source::{ByteSource, CHUNK_SIZE};

/// Per-stream header packet count under the Xiph convention.
const HEADER_PACKETS: usize = 3;

/// Result of a successful negotiation.
pub struct Negotiated {
    pub video_params: VideoParams,
    pub video_assembler: PacketAssembler,
    pub audio: Option<NegotiatedAudio>,
}

pub struct NegotiatedAudio {
    pub params: AudioParams,
    pub assembler: PacketAssembler,
}

fn fill(source: &mut dyn ByteSource, sync: &mut PageSync) -> Result<usize, ClipError> {
    let mut chunk = [0u8; CHUNK_SIZE];
    let n = source.read(&mut chunk)?;
    sync.write(&chunk[..n]);
    Ok(n)
}

fn next_page(source: &mut dyn ByteSource, sync: &mut PageSync) -> Result<Option<Page>, ClipError> {
    loop {
        if let Some(page) = sync.pull_page() {
            return Ok(Some(page));
        }
        if fill(source, sync)? == 0 {
            return Ok(None);
        }
    }
}

/// Reads pages from `source` until both codecs (audio being optional) have
/// consumed their full header sequences, then finalizes stream parameters.
pub fn negotiate(
    source: &mut dyn ByteSource,
    sync: &mut PageSync,
    video: &mut dyn VideoCodec,
    mut audio: Option<&mut (dyn AudioCodec + 'static)>,
) -> Result<Negotiated, ClipError> {
    let mut video_stream: Option<(PacketAssembler, usize)> = None;
    let mut audio_stream: Option<(PacketAssembler, usize)> = None;

    // BOS section: classify each logical stream by its identification
    // packet. The first non-BOS page ends the section and is handed to the
    // secondary-header phase below.
    let mut pending = Some(loop {
        let page = next_page(source, sync)?
            .ok_or_else(|| ClipError::MalformedStream("end of data before headers".into()))?;
        if !page.is_bos() {
            break page;
        }

        let mut assembler = PacketAssembler::new(page.serial);
        assembler.submit_page(&page);
        let packet = match assembler.packet_out() {
            Some(p) => p,
            None => {
                tracing::debug!(serial = page.serial, "BOS page without a complete packet");
                continue;
            }
        };

        if video_stream.is_none() {
            match video.read_header(&packet.data) {
                HeaderResult::Accepted => {
                    video_stream = Some((assembler, 1));
                    continue;
                }
                HeaderResult::Invalid(msg) => return Err(ClipError::MalformedStream(msg)),
                HeaderResult::NotMine => {}
            }
        }
        if let Some(codec) = audio.as_deref_mut() {
            if audio_stream.is_none() {
                match codec.read_header(&packet.data) {
                    HeaderResult::Accepted => {
                        audio_stream = Some((assembler, 1));
                        continue;
                    }
                    HeaderResult::Invalid(msg) => return Err(ClipError::MalformedStream(msg)),
                    HeaderResult::NotMine => {}
                }
            }
        }
        tracing::debug!(serial = page.serial, "discarding unclaimed logical stream");
    });

    let (mut video_assembler, mut video_seen) = video_stream
        .ok_or_else(|| ClipError::MalformedStream("no recognized video stream".into()))?;

    // Secondary headers: route pages by serial until every claimed codec
    // has its three packets.
    loop {
        let audio_done = match &audio_stream {
            Some((_, seen)) => *seen == HEADER_PACKETS,
            None => true,
        };
        if video_seen == HEADER_PACKETS && audio_done {
            break;
        }

        let page = match pending.take() {
            Some(page) => page,
            None => next_page(source, sync)?.ok_or_else(|| {
                ClipError::MalformedStream("end of data inside header sequence".into())
            })?,
        };

        if page.serial == video_assembler.serial() {
            video_assembler.submit_page(&page);
            while video_seen < HEADER_PACKETS {
                let packet = match video_assembler.packet_out() {
                    Some(p) => p,
                    None => break,
                };
                match video.read_header(&packet.data) {
                    HeaderResult::Accepted => video_seen += 1,
                    HeaderResult::Invalid(msg) => return Err(ClipError::MalformedStream(msg)),
                    HeaderResult::NotMine => {
                        return Err(ClipError::MalformedStream(
                            "unexpected packet inside video header sequence".into(),
                        ))
                    }
                }
            }
        } else if let (Some((assembler, seen)), Some(codec)) =
            (audio_stream.as_mut(), audio.as_deref_mut())
        {
            if page.serial == assembler.serial() {
                assembler.submit_page(&page);
                while *seen < HEADER_PACKETS {
                    let packet = match assembler.packet_out() {
                        Some(p) => p,
                        None => break,
                    };
                    match codec.read_header(&packet.data) {
                        HeaderResult::Accepted => *seen += 1,
                        HeaderResult::Invalid(msg) => return Err(ClipError::MalformedStream(msg)),
                        HeaderResult::NotMine => {
                            return Err(ClipError::MalformedStream(
                                "unexpected packet inside audio header sequence".into(),
                            ))
                        }
                    }
                }
            }
        }
    }

    let video_params = video
        .finish_headers()
        .map_err(|e| ClipError::UnsupportedFormat(e.to_string()))?;
    tracing::info!(
        width = video_params.width,
        height = video_params.height,
        fps = video_params.fps,
        "video stream negotiated"
    );

    let negotiated_audio = match (audio_stream, audio.as_deref_mut()) {
        (Some((assembler, _)), Some(codec)) => {
            let params = codec
                .finish_headers()
                .map_err(|e| ClipError::UnsupportedFormat(e.to_string()))?;
            tracing::info!(
                channels = params.channels,
                sample_rate = params.sample_rate,
                "audio stream negotiated"
            );
            Some(NegotiatedAudio { params, assembler })
        }
        _ => None,
    };

    Ok(Negotiated {
        video_params,
        video_assembler,
        audio: negotiated_audio,
    })
}
