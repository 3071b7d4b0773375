//! Shared fixtures: a hand-muxed container and a pair of toy codecs.
//!
//! The toy video codec follows the three-header convention with a `b"SVH"`
//! magic; body packets are `[b'F', keyflag, index u32le]` and decode to a
//! solid picture whose granule position is the frame index. The toy audio
//! codec mirrors it with `b"SAH"` headers and `[b'A', samples u16le]`
//! bodies.

use std::sync::Arc;

use parking_lot::Mutex;

use oggvid::codec::{
    AudioCodec, AudioParams, CodecError, DecodeOutput, HeaderResult, PcmBlock, PicturePlane,
    VideoCodec, VideoParams, YuvPicture,
};
use oggvid::ogg::Packet;
use oggvid::sink::{AudioSink, TextureSink};

pub const VIDEO_SERIAL: u32 = 0x1111_1111;
pub const AUDIO_SERIAL: u32 = 0x2222_2222;

pub const FPS: f64 = 25.0;
pub const WIDTH: u32 = 16;
pub const HEIGHT: u32 = 12;

const FLAG_BOS: u8 = 0x02;
const FLAG_EOS: u8 = 0x04;

/// Serializes one page with a zeroed CRC field.
pub fn ogg_page(serial: u32, seq: u32, granule: i64, flags: u8, packets: &[&[u8]]) -> Vec<u8> {
    let mut table = Vec::new();
    let mut body = Vec::new();
    for p in packets {
        let mut remaining = p.len();
        loop {
            let lace = remaining.min(255);
            table.push(lace as u8);
            if lace < 255 {
                break;
            }
            remaining -= 255;
        }
        body.extend_from_slice(p);
    }
    let mut page = Vec::new();
    page.extend_from_slice(b"OggS");
    page.push(0);
    page.push(flags);
    page.extend_from_slice(&granule.to_le_bytes());
    page.extend_from_slice(&serial.to_le_bytes());
    page.extend_from_slice(&seq.to_le_bytes());
    page.extend_from_slice(&0u32.to_le_bytes());
    page.push(table.len() as u8);
    page.extend_from_slice(&table);
    page.extend_from_slice(&body);
    page
}

fn video_ident() -> Vec<u8> {
    let mut p = b"SVH\x01".to_vec();
    p.extend_from_slice(&WIDTH.to_le_bytes());
    p.extend_from_slice(&HEIGHT.to_le_bytes());
    p.extend_from_slice(&(FPS as u32).to_le_bytes());
    p
}

fn audio_ident(channels: u32, sample_rate: u32) -> Vec<u8> {
    let mut p = b"SAH\x01".to_vec();
    p.extend_from_slice(&channels.to_le_bytes());
    p.extend_from_slice(&sample_rate.to_le_bytes());
    p
}

pub fn frame_packet(index: u32, keyframe: bool) -> Vec<u8> {
    let mut p = vec![b'F', keyframe as u8];
    p.extend_from_slice(&index.to_le_bytes());
    p
}

fn audio_packet(samples: u16) -> Vec<u8> {
    let mut p = vec![b'A'];
    p.extend_from_slice(&samples.to_le_bytes());
    p
}

pub struct FixtureLayout {
    pub frames: u32,
    pub keyframe_interval: u32,
    pub with_audio: bool,
}

/// Muxes a complete stream, one body packet per page.
pub fn build_fixture(layout: &FixtureLayout) -> Vec<u8> {
    let mut out = Vec::new();

    out.extend(ogg_page(VIDEO_SERIAL, 0, 0, FLAG_BOS, &[&video_ident()]));
    if layout.with_audio {
        out.extend(ogg_page(AUDIO_SERIAL, 0, 0, FLAG_BOS, &[&audio_ident(2, 44100)]));
    }
    out.extend(ogg_page(VIDEO_SERIAL, 1, 0, 0, &[b"SVH\x02", b"SVH\x03"]));
    if layout.with_audio {
        out.extend(ogg_page(AUDIO_SERIAL, 1, 0, 0, &[b"SAH\x02", b"SAH\x03"]));
    }

    let mut vseq = 2;
    let mut aseq = 2;
    for i in 0..layout.frames {
        let keyframe = i % layout.keyframe_interval == 0;
        let flags = if i == layout.frames - 1 { FLAG_EOS } else { 0 };
        out.extend(ogg_page(
            VIDEO_SERIAL,
            vseq,
            i as i64,
            flags,
            &[&frame_packet(i, keyframe)],
        ));
        vseq += 1;

        if layout.with_audio && i % 5 == 0 {
            out.extend(ogg_page(
                AUDIO_SERIAL,
                aseq,
                i as i64 * 1764,
                0,
                &[&audio_packet(64)],
            ));
            aseq += 1;
        }
    }
    if layout.with_audio {
        out.extend(ogg_page(
            AUDIO_SERIAL,
            aseq,
            layout.frames as i64 * 1764,
            FLAG_EOS,
            &[&audio_packet(0)],
        ));
    }
    out
}

/// Number of audio samples (per channel) the fixture carries before its
/// end-of-stream packet.
pub fn fixture_audio_samples(layout: &FixtureLayout) -> usize {
    (0..layout.frames).filter(|i| i % 5 == 0).count() * 64
}

#[derive(Default)]
pub struct TestVideoCodec {
    headers: usize,
    params: Option<VideoParams>,
    synced: bool,
    granule: i64,
}

impl TestVideoCodec {
    pub fn new() -> Self {
        Self::default()
    }
}

impl VideoCodec for TestVideoCodec {
    fn read_header(&mut self, packet: &[u8]) -> HeaderResult {
        if packet.len() < 4 || &packet[..3] != b"SVH" {
            return if self.headers == 0 {
                HeaderResult::NotMine
            } else {
                HeaderResult::Invalid("not a video header".into())
            };
        }
        match (packet[3], self.headers) {
            (1, 0) => {
                if packet.len() < 16 {
                    return HeaderResult::Invalid("short identification header".into());
                }
                self.params = Some(VideoParams {
                    width: u32::from_le_bytes(packet[4..8].try_into().unwrap()),
                    height: u32::from_le_bytes(packet[8..12].try_into().unwrap()),
                    fps: u32::from_le_bytes(packet[12..16].try_into().unwrap()) as f64,
                });
                self.headers = 1;
                HeaderResult::Accepted
            }
            (2, 1) | (3, 2) => {
                self.headers += 1;
                HeaderResult::Accepted
            }
            _ => HeaderResult::Invalid("header out of order".into()),
        }
    }

    fn finish_headers(&mut self) -> Result<VideoParams, CodecError> {
        self.params
            .ok_or_else(|| CodecError::Unsupported("incomplete header sequence".into()))
    }

    fn decode(&mut self, packet: &Packet) -> Result<DecodeOutput, CodecError> {
        let data = &packet.data;
        if data.len() < 6 || data[0] != b'F' {
            return Ok(DecodeOutput::NotAFrame);
        }
        if data[1] == 1 {
            self.synced = true;
        }
        if !self.synced {
            return Err(CodecError::Decode("no reference frame".into()));
        }
        let index = u32::from_le_bytes(data[2..6].try_into().unwrap()) as i64;
        self.granule = index;

        let params = self
            .params
            .ok_or_else(|| CodecError::Decode("headers not finished".into()))?;
        let (w, h) = (params.width as usize, params.height as usize);
        let luma = 16 + (index % 200) as u8;
        Ok(DecodeOutput::Picture {
            picture: YuvPicture {
                y: PicturePlane {
                    data: vec![luma; w * h],
                    stride: w,
                },
                u: PicturePlane {
                    data: vec![128; (w / 2) * (h / 2)],
                    stride: w / 2,
                },
                v: PicturePlane {
                    data: vec![128; (w / 2) * (h / 2)],
                    stride: w / 2,
                },
            },
            granule: index,
        })
    }

    fn granule_time(&self, granule: i64) -> f64 {
        granule as f64 / self.params.map_or(FPS, |p| p.fps)
    }

    fn is_keyframe(&self, packet: &[u8]) -> bool {
        packet.len() >= 2 && packet[0] == b'F' && packet[1] == 1
    }

    fn set_granule_position(&mut self, granule: i64) {
        self.granule = granule;
    }

    fn reset(&mut self) {
        self.synced = false;
    }
}

#[derive(Default)]
pub struct TestAudioCodec {
    headers: usize,
    params: Option<AudioParams>,
    pending: Vec<f32>,
}

impl TestAudioCodec {
    pub fn new() -> Self {
        Self::default()
    }
}

impl AudioCodec for TestAudioCodec {
    fn read_header(&mut self, packet: &[u8]) -> HeaderResult {
        if packet.len() < 4 || &packet[..3] != b"SAH" {
            return if self.headers == 0 {
                HeaderResult::NotMine
            } else {
                HeaderResult::Invalid("not an audio header".into())
            };
        }
        match (packet[3], self.headers) {
            (1, 0) => {
                if packet.len() < 12 {
                    return HeaderResult::Invalid("short identification header".into());
                }
                self.params = Some(AudioParams {
                    channels: u32::from_le_bytes(packet[4..8].try_into().unwrap()),
                    sample_rate: u32::from_le_bytes(packet[8..12].try_into().unwrap()),
                });
                self.headers = 1;
                HeaderResult::Accepted
            }
            (2, 1) | (3, 2) => {
                self.headers += 1;
                HeaderResult::Accepted
            }
            _ => HeaderResult::Invalid("header out of order".into()),
        }
    }

    fn finish_headers(&mut self) -> Result<AudioParams, CodecError> {
        self.params
            .ok_or_else(|| CodecError::Unsupported("incomplete header sequence".into()))
    }

    fn decode(&mut self, packet: &Packet) -> Result<(), CodecError> {
        let data = &packet.data;
        if data.len() < 3 || data[0] != b'A' {
            return Err(CodecError::Decode("not an audio packet".into()));
        }
        let samples = u16::from_le_bytes(data[1..3].try_into().unwrap()) as usize;
        let channels = self.params.map_or(1, |p| p.channels as usize);
        self.pending
            .extend(std::iter::repeat(0.25f32).take(samples * channels));
        Ok(())
    }

    fn pending_pcm(&mut self) -> Option<PcmBlock> {
        if self.pending.is_empty() {
            return None;
        }
        let channels = self.params.map_or(1, |p| p.channels as usize);
        let data = std::mem::take(&mut self.pending);
        let samples = data.len() / channels;
        Some(PcmBlock { data, samples })
    }

    fn reset(&mut self) {
        self.pending.clear();
    }
}

/// Records every uploaded frame's size.
#[derive(Clone, Default)]
pub struct CollectTextureSink {
    pub uploads: Arc<Mutex<Vec<(u32, u32, usize)>>>,
}

impl TextureSink for CollectTextureSink {
    fn upload(&mut self, rgba: &[u8], width: u32, height: u32) {
        self.uploads.lock().push((width, height, rgba.len()));
    }
}

/// Accumulates every inserted sample.
#[derive(Clone, Default)]
pub struct CollectAudioSink {
    pub samples: Arc<Mutex<Vec<f32>>>,
}

impl AudioSink for CollectAudioSink {
    fn insert_samples(&mut self, data: &[f32], _samples: usize) {
        self.samples.lock().extend_from_slice(data);
    }
}
