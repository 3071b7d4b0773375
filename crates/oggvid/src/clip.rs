//! A playable clip: demux, decode, present.
//!
//! A [`Clip`] ties the container layer to a pair of codecs and a frame
//! queue. Three roles touch it concurrently:
//!
//! * the decode role calls [`decode_next_frame`](Clip::decode_next_frame)
//!   and [`decoded_audio_check`](Clip::decoded_audio_check), typically from
//!   a [`DecodeWorker`](crate::worker::DecodeWorker) thread;
//! * the consume role calls [`update`](Clip::update) from the host's render
//!   loop, advancing the clock and presenting due frames;
//! * control calls ([`seek`](Clip::seek), [`pause`](Clip::pause), sinks)
//!   arrive from anywhere.
//!
//! `update` never takes the decode lock, so a slow read or a seek in flight
//! cannot stall the render loop. Seeks are asynchronous: `seek` records the
//! target and the next decode tick carries it out.

use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::codec::{AudioCodec, AudioParams, DecodeOutput, VideoCodec, VideoParams};
use crate::error::ClipError;
use crate::frame_queue::FrameQueue;
use crate::headers::negotiate;
use crate::ogg::{PacketAssembler, PageSync};
use crate::sink::{AudioSink, TextureSink};
use crate::source::{ByteSource, CHUNK_SIZE};
use crate::timer::Timer;
use crate::yuv;

/// Default number of pre-decoded frames a clip buffers ahead.
pub const DEFAULT_QUEUE_CAPACITY: usize = 16;

/// Frames this far behind the clock are evicted unshown.
const FRAME_LAG_EVICT: f64 = 0.1;

/// A seek is accepted once the landing time is within this many seconds of
/// the target.
const SEEK_TOLERANCE: f64 = 0.5;

const SEEK_MAX_ITERATIONS: u32 = 10;

/// Pixel-format flavour of the padded output texture. Both modes emit RGBA;
/// the mode picks the colour the pad region is filled with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputMode {
    #[default]
    Rgb,
    Yuv,
}

impl OutputMode {
    /// Packed 0xAARRGGBB pad colour: opaque black for RGB output, the
    /// neutral-chroma equivalent for YUV-flavoured output.
    fn back_colour(self) -> u32 {
        match self {
            OutputMode::Rgb => 0xFF00_0000,
            OutputMode::Yuv => 0xFF00_8080,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ClipOptions {
    pub queue_capacity: usize,
    pub output: OutputMode,
}

impl Default for ClipOptions {
    fn default() -> Self {
        Self {
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            output: OutputMode::default(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum SeekPhase {
    Idle,
    /// A seek to this presentation time is waiting for the next decode
    /// tick.
    Requested(f64),
    /// Bisection landed; decode is discarding packets until a keyframe.
    AwaitKeyframe,
}

#[derive(Debug, Clone, Copy)]
struct ClipInfo {
    width: u32,
    height: u32,
    padded_width: u32,
    padded_height: u32,
    fps: f64,
    duration: f64,
}

struct PendingCodecs {
    video: Box<dyn VideoCodec>,
    audio: Option<Box<dyn AudioCodec>>,
}

struct DecodeState {
    source: Box<dyn ByteSource>,
    sync: PageSync,
    codec: Box<dyn VideoCodec>,
    assembler: PacketAssembler,
    params: VideoParams,
    end_of_stream: bool,
}

struct AudioState {
    codec: Box<dyn AudioCodec>,
    assembler: PacketAssembler,
    params: AudioParams,
}

/// One playable video clip with optional audio.
pub struct Clip {
    name: String,
    options: ClipOptions,
    pending: Mutex<Option<PendingCodecs>>,
    decode: Mutex<Option<DecodeState>>,
    audio: Mutex<Option<AudioState>>,
    frames: Mutex<Option<Arc<FrameQueue>>>,
    texture: Mutex<Option<Box<dyn TextureSink>>>,
    audio_sink: Mutex<Option<Box<dyn AudioSink>>>,
    info: Mutex<Option<ClipInfo>>,
    default_timer: Arc<Timer>,
    timer: Mutex<Arc<Timer>>,
    seek: Mutex<SeekPhase>,
    output: Mutex<OutputMode>,
    /// Consumer-defined scheduling hint; not interpreted here.
    priority: AtomicI32,
}

impl Clip {
    /// Creates an unloaded clip around a video codec and an optional audio
    /// codec. [`load`](Clip::load) attaches the byte source.
    pub fn new(
        name: impl Into<String>,
        video: Box<dyn VideoCodec>,
        audio: Option<Box<dyn AudioCodec>>,
        options: ClipOptions,
    ) -> Self {
        let default_timer = Arc::new(Timer::new());
        Self {
            name: name.into(),
            options,
            pending: Mutex::new(Some(PendingCodecs { video, audio })),
            decode: Mutex::new(None),
            audio: Mutex::new(None),
            frames: Mutex::new(None),
            texture: Mutex::new(None),
            audio_sink: Mutex::new(None),
            info: Mutex::new(None),
            timer: Mutex::new(default_timer.clone()),
            default_timer,
            seek: Mutex::new(SeekPhase::Idle),
            output: Mutex::new(options.output),
            priority: AtomicI32::new(0),
        }
    }

    /// Negotiates headers on `source`, sizes the frame queue, and probes the
    /// stream duration. A clip loads exactly once.
    pub fn load(&self, mut source: Box<dyn ByteSource>) -> Result<(), ClipError> {
        let mut decode = self.decode.lock();
        if decode.is_some() {
            return Err(ClipError::AlreadyLoaded(self.name.clone()));
        }
        let PendingCodecs { mut video, mut audio } = self
            .pending
            .lock()
            .take()
            .ok_or_else(|| ClipError::AlreadyLoaded(self.name.clone()))?;

        let mut sync = PageSync::new();
        let negotiated = negotiate(
            source.as_mut(),
            &mut sync,
            video.as_mut(),
            audio.as_deref_mut(),
        )?;

        let params = negotiated.video_params;
        let padded_width = params.width.max(1).next_power_of_two();
        let padded_height = params.height.max(1).next_power_of_two();

        // Duration probe repositions the source; restore it afterwards so
        // body decoding resumes where negotiation stopped.
        let resume = source.tell();
        let serial = negotiated.video_assembler.serial();
        let duration = probe_duration(source.as_mut(), video.as_ref(), serial)?;
        source.seek(resume)?;

        let frame_bytes = padded_width as usize * padded_height as usize * 4;
        let queue = Arc::new(FrameQueue::new(self.options.queue_capacity, frame_bytes));
        queue.fill_back_colour(self.output.lock().back_colour());

        tracing::info!(
            clip = %self.name,
            width = params.width,
            height = params.height,
            fps = params.fps,
            duration,
            has_audio = negotiated.audio.is_some(),
            "clip loaded"
        );

        *self.info.lock() = Some(ClipInfo {
            width: params.width,
            height: params.height,
            padded_width,
            padded_height,
            fps: params.fps,
            duration,
        });
        *self.frames.lock() = Some(queue);
        if let (Some(codec), Some(neg)) = (audio, negotiated.audio) {
            *self.audio.lock() = Some(AudioState {
                codec,
                assembler: neg.assembler,
                params: neg.params,
            });
        }
        *decode = Some(DecodeState {
            source,
            sync,
            codec: video,
            assembler: negotiated.video_assembler,
            params,
            end_of_stream: false,
        });
        Ok(())
    }

    /// Decode-role tick. Demuxes and decodes until one frame has been
    /// queued, then returns `true`. Returns `false` when the queue is full,
    /// no fresh data arrived this tick, or the clip is unloaded.
    pub fn decode_next_frame(&self) -> bool {
        let mut decode = self.decode.lock();
        let state = match decode.as_mut() {
            Some(s) => s,
            None => return false,
        };
        let queue = match self.frames.lock().clone() {
            Some(q) => q,
            None => return false,
        };

        let requested = match *self.seek.lock() {
            SeekPhase::Requested(target) => Some(target),
            _ => None,
        };
        if let Some(target) = requested {
            if let Err(err) = self.run_seek(state, &queue, target) {
                tracing::warn!(clip = %self.name, %err, "seek failed");
                *self.seek.lock() = SeekPhase::Idle;
            }
        }

        let timer = self.timer.lock().clone();
        let mut slot = match queue.request_empty() {
            Some(s) => s,
            None => return false,
        };

        loop {
            let packet = match state.assembler.packet_out() {
                Some(p) => p,
                None => {
                    let mut chunk = [0u8; CHUNK_SIZE];
                    let n = match state.source.read(&mut chunk) {
                        Ok(n) => n,
                        Err(err) => {
                            tracing::warn!(clip = %self.name, %err, "read failed");
                            return false;
                        }
                    };
                    state.sync.write(&chunk[..n]);
                    // Page out everything buffered, including pages left
                    // over from header negotiation and the tail of a short
                    // final read. Audio pages are demuxed only while a sink
                    // is attached to consume them.
                    let mut routed = false;
                    while let Some(page) = state.sync.pull_page() {
                        routed = true;
                        if page.serial == state.assembler.serial() {
                            if page.is_eos() {
                                state.end_of_stream = true;
                            }
                            state.assembler.submit_page(&page);
                        } else if let Some(audio) = self.audio.lock().as_mut() {
                            if page.serial == audio.assembler.serial()
                                && self.audio_sink.lock().is_some()
                            {
                                audio.assembler.submit_page(&page);
                            }
                        }
                    }
                    if n < CHUNK_SIZE && !routed {
                        // Out of data for this tick and nothing new to
                        // demux.
                        return false;
                    }
                    continue;
                }
            };

            // Keyframe gate after a seek: nothing decodes until a frame
            // that needs no prior state. Playback resumes at the keyframe,
            // so the position counter and the clock both snap to it.
            if matches!(*self.seek.lock(), SeekPhase::AwaitKeyframe) {
                if !state.codec.is_keyframe(&packet.data) {
                    continue;
                }
                if packet.granule_position >= 0 {
                    state.codec.set_granule_position(packet.granule_position);
                    self.timer
                        .lock()
                        .seek(state.codec.granule_time(packet.granule_position));
                }
                *self.seek.lock() = SeekPhase::Idle;
            }

            let output = match state.codec.decode(&packet) {
                Ok(o) => o,
                Err(err) => {
                    tracing::debug!(clip = %self.name, %err, "skipping undecodable packet");
                    continue;
                }
            };
            let (picture, granule) = match output {
                DecodeOutput::Picture { picture, granule } => (picture, granule),
                DecodeOutput::NotAFrame => continue,
            };

            let time = state.codec.granule_time(granule);
            // A frame already behind the clock is not worth converting.
            if time < timer.time() {
                tracing::trace!(clip = %self.name, time, "dropping late frame");
                continue;
            }

            let width = state.params.width as usize;
            let height = state.params.height as usize;
            let padded_width = state.params.width.max(1).next_power_of_two() as usize;
            let padded_height = state.params.height.max(1).next_power_of_two() as usize;
            let dest = slot.data();
            yuv::yuv420_to_rgba(&picture, dest, padded_width * 4, width, height);
            yuv::fill_pad_region(
                dest,
                padded_width,
                padded_height,
                width,
                height,
                queue.back_colour(),
            );
            slot.submit(time);
            return true;
        }
    }

    /// Audio-role tick. Drains demuxed audio packets into the codec and
    /// pushes the resulting PCM to the audio sink. A no-op without a sink or
    /// while the clock is paused.
    pub fn decoded_audio_check(&self) {
        let timer = self.timer.lock().clone();
        let mut audio = self.audio.lock();
        let state = match audio.as_mut() {
            Some(s) => s,
            None => return,
        };
        let mut sink = self.audio_sink.lock();
        let sink = match sink.as_mut() {
            Some(s) => s,
            None => return,
        };
        if timer.is_paused() {
            return;
        }

        while let Some(packet) = state.assembler.packet_out() {
            if let Err(err) = state.codec.decode(&packet) {
                tracing::debug!(clip = %self.name, %err, "skipping undecodable audio packet");
            }
        }
        while let Some(block) = state.codec.pending_pcm() {
            sink.insert_samples(&block.data, block.samples);
        }
    }

    /// Consume-role tick. Advances the clock by `dt` seconds, evicts frames
    /// that fell more than the lag window behind, and presents the first due
    /// frame. Returns the presentation time of the frame shown, if any.
    pub fn update(&self, dt: f64) -> Option<f64> {
        let timer = self.timer.lock().clone();
        timer.update(dt);
        if timer.is_paused() {
            return None;
        }
        let queue = self.frames.lock().clone()?;
        let info = (*self.info.lock())?;
        let time = timer.time();

        loop {
            let stale = match queue.first_available() {
                Some(frame) => frame.time() + FRAME_LAG_EVICT < time,
                None => false,
            };
            if !stale {
                break;
            }
            queue.pop();
        }

        let shown = {
            let frame = queue.first_available()?;
            if frame.time() > time {
                return None;
            }
            if let Some(sink) = self.texture.lock().as_mut() {
                sink.upload(frame.data(), info.padded_width, info.padded_height);
            }
            frame.time()
        };
        queue.pop();
        Some(shown)
    }

    /// Requests an asynchronous seek to `time` seconds. The next decode
    /// tick performs it.
    pub fn seek(&self, time: f64) {
        *self.seek.lock() = SeekPhase::Requested(time.max(0.0));
    }

    fn run_seek(
        &self,
        state: &mut DecodeState,
        queue: &FrameQueue,
        target: f64,
    ) -> Result<(), ClipError> {
        // Audio stays locked for the whole seek so the audio tick never sees
        // half-reset synthesis state.
        let mut audio = self.audio.lock();

        queue.clear();
        state.codec.reset();
        state.assembler.reset();
        state.end_of_stream = false;
        if let Some(a) = audio.as_mut() {
            a.codec.reset();
            a.assembler.reset();
        }

        let serial = state.assembler.serial();
        let mut lo = 0u64;
        let mut hi = state.source.size();
        let mut best = 0u64;
        let mut found: Option<i64> = None;
        for iteration in 0..SEEK_MAX_ITERATIONS {
            let mid = lo + (hi - lo) / 2;
            match first_granule_at(state.source.as_mut(), serial, mid)? {
                Some(granule) => {
                    let time = state.codec.granule_time(granule);
                    best = mid;
                    found = Some(granule);
                    if (time - target).abs() < SEEK_TOLERANCE {
                        tracing::debug!(
                            clip = %self.name,
                            target,
                            landed = time,
                            iteration,
                            "seek bisection converged"
                        );
                        break;
                    }
                    if time < target {
                        lo = mid;
                    } else {
                        hi = mid;
                    }
                }
                // No page with a position past this offset; search earlier.
                None => hi = mid,
            }
        }

        state.source.seek(best)?;
        state.sync.reset();
        // The decoder and the clock take the landing page's position; the
        // keyframe gate refines both once decode reaches the frame playback
        // actually resumes at.
        let landed = match found {
            Some(granule) => {
                state.codec.set_granule_position(granule);
                state.codec.granule_time(granule)
            }
            None => 0.0,
        };
        self.timer.lock().seek(landed);
        *self.seek.lock() = SeekPhase::AwaitKeyframe;
        Ok(())
    }

    /// Pauses the presentation clock.
    pub fn pause(&self) {
        self.timer.lock().pause();
    }

    /// Resumes the presentation clock.
    pub fn play(&self) {
        self.timer.lock().play();
    }

    pub fn is_paused(&self) -> bool {
        self.timer.lock().is_paused()
    }

    pub fn is_playing(&self) -> bool {
        !self.is_paused()
    }

    /// Current presentation time in seconds.
    pub fn time_position(&self) -> f64 {
        self.timer.lock().time()
    }

    /// Pauses and rewinds to the beginning.
    pub fn stop(&self) {
        self.pause();
        self.seek(0.0);
    }

    /// True once the end-of-stream page was consumed and every buffered
    /// packet and frame has drained.
    pub fn is_done(&self) -> bool {
        let decode = self.decode.lock();
        let state = match decode.as_ref() {
            Some(s) => s,
            None => return false,
        };
        if !state.end_of_stream || !state.assembler.is_empty() {
            return false;
        }
        self.frames
            .lock()
            .as_ref()
            .map_or(true, |q| q.used_count() == 0)
    }

    /// Replaces the presentation clock, e.g. to slave several clips to one
    /// externally driven timeline. `None` restores the clip's own clock.
    pub fn set_timer(&self, timer: Option<Arc<Timer>>) {
        *self.timer.lock() = timer.unwrap_or_else(|| self.default_timer.clone());
    }

    pub fn timer(&self) -> Arc<Timer> {
        self.timer.lock().clone()
    }

    pub fn set_texture_sink(&self, sink: Box<dyn TextureSink>) {
        *self.texture.lock() = Some(sink);
    }

    pub fn set_audio_sink(&self, sink: Box<dyn AudioSink>) {
        *self.audio_sink.lock() = Some(sink);
    }

    pub fn output_mode(&self) -> OutputMode {
        *self.output.lock()
    }

    /// Switches the pad-fill colour convention. Takes effect for frames
    /// populated after the call.
    pub fn set_output_mode(&self, mode: OutputMode) {
        *self.output.lock() = mode;
        if let Some(queue) = self.frames.lock().as_ref() {
            queue.fill_back_colour(mode.back_colour());
        }
    }

    /// Consumer-defined eviction/scheduling hint; stored, never interpreted.
    pub fn priority(&self) -> i32 {
        self.priority.load(Ordering::Relaxed)
    }

    pub fn set_priority(&self, priority: i32) {
        self.priority.store(priority, Ordering::Relaxed);
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn width(&self) -> u32 {
        self.info.lock().map_or(0, |i| i.width)
    }

    pub fn height(&self) -> u32 {
        self.info.lock().map_or(0, |i| i.height)
    }

    /// Output texture width (next power of two above the image width).
    pub fn padded_width(&self) -> u32 {
        self.info.lock().map_or(0, |i| i.padded_width)
    }

    pub fn padded_height(&self) -> u32 {
        self.info.lock().map_or(0, |i| i.padded_height)
    }

    pub fn fps(&self) -> f64 {
        self.info.lock().map_or(0.0, |i| i.fps)
    }

    /// Stream duration in seconds, 0 when the probe found no timed page.
    pub fn duration(&self) -> f64 {
        self.info.lock().map_or(0.0, |i| i.duration)
    }

    pub fn audio_params(&self) -> Option<AudioParams> {
        self.audio.lock().as_ref().map(|a| a.params)
    }

    /// The clip's frame queue, for hosts that read frames directly instead
    /// of attaching a texture sink.
    pub fn frame_queue(&self) -> Option<Arc<FrameQueue>> {
        self.frames.lock().clone()
    }

    /// Number of decoded frames waiting to be shown.
    pub fn ready_frames(&self) -> usize {
        self.frames.lock().as_ref().map_or(0, |q| q.used_count())
    }
}

/// Seeks to `offset` and scans forward for the first page of `serial` that
/// carries a granule position.
fn first_granule_at(
    source: &mut dyn ByteSource,
    serial: u32,
    offset: u64,
) -> Result<Option<i64>, ClipError> {
    source.seek(offset)?;
    let mut sync = PageSync::new();
    let mut chunk = [0u8; CHUNK_SIZE];
    loop {
        let n = source.read(&mut chunk)?;
        if n == 0 {
            return Ok(None);
        }
        sync.write(&chunk[..n]);
        while let Some(page) = sync.pull_page() {
            if page.serial == serial && page.granule_position >= 0 {
                return Ok(Some(page.granule_position));
            }
        }
    }
}

/// Scans a growing tail window of the stream for the last timed page of
/// `serial` and converts its granule to seconds.
fn probe_duration(
    source: &mut dyn ByteSource,
    codec: &dyn VideoCodec,
    serial: u32,
) -> Result<f64, ClipError> {
    let size = source.size();
    let mut window = 1u64;
    loop {
        let start = size.saturating_sub(CHUNK_SIZE as u64 * window);
        let mut last = None;
        source.seek(start)?;
        let mut sync = PageSync::new();
        let mut chunk = [0u8; CHUNK_SIZE];
        loop {
            let n = source.read(&mut chunk)?;
            if n == 0 {
                break;
            }
            sync.write(&chunk[..n]);
            while let Some(page) = sync.pull_page() {
                if page.serial == serial && page.granule_position >= 0 {
                    last = Some(page.granule_position);
                }
            }
        }
        if let Some(granule) = last {
            return Ok(codec.granule_time(granule));
        }
        if start == 0 {
            tracing::warn!("no timed page found, duration unknown");
            return Ok(0.0);
        }
        window += 1;
    }
}
