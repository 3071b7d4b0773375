//! Output seams for decoded media.
//!
//! A clip pushes finished frames and PCM into whatever the host application
//! provides behind these traits. Neither sink is required: without a texture
//! sink frames are still decoded and timed (the host can read them off the
//! queue itself), and without an audio sink the audio stream is demuxed but
//! not synthesized.

/// Receives displayable frames from the consume tick.
pub trait TextureSink: Send {
    /// Uploads one padded RGBA frame. `rgba` holds `width * height * 4`
    /// bytes at the clip's padded texture dimensions.
    fn upload(&mut self, rgba: &[u8], width: u32, height: u32);
}

/// Receives decoded PCM from the audio tick.
pub trait AudioSink: Send {
    /// Hands over one block of interleaved f32 samples; `samples` is the
    /// count per channel.
    fn insert_samples(&mut self, data: &[f32], samples: usize);
}
