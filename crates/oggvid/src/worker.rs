//! Background decode thread.
//!
//! One worker drives the decode and audio ticks for any number of clips so
//! the host render loop only ever touches the consume side. Clips are added
//! and removed through a command channel; the thread exits when the worker
//! is dropped.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{unbounded, Receiver, Sender};

use crate::clip::Clip;

enum Command {
    Add(Arc<Clip>),
    Remove(String),
}

/// Owns the decode thread; dropping it stops and joins the thread.
pub struct DecodeWorker {
    tx: Sender<Command>,
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl DecodeWorker {
    pub fn new() -> Self {
        let (tx, rx) = unbounded();
        let stop = Arc::new(AtomicBool::new(false));
        let thread_stop = stop.clone();
        let handle = thread::Builder::new()
            .name("oggvid-decode".into())
            .spawn(move || run(rx, thread_stop))
            .ok();
        if handle.is_none() {
            tracing::error!("failed to spawn decode thread");
        }
        Self { tx, stop, handle }
    }

    /// Hands a clip to the decode thread.
    pub fn add(&self, clip: Arc<Clip>) {
        let _ = self.tx.send(Command::Add(clip));
    }

    /// Removes the clip with the given name, if present.
    pub fn remove(&self, name: &str) {
        let _ = self.tx.send(Command::Remove(name.to_owned()));
    }
}

impl Default for DecodeWorker {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for DecodeWorker {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

fn run(rx: Receiver<Command>, stop: Arc<AtomicBool>) {
    let mut clips: Vec<Arc<Clip>> = Vec::new();
    while !stop.load(Ordering::Relaxed) {
        while let Ok(cmd) = rx.try_recv() {
            match cmd {
                Command::Add(clip) => {
                    tracing::debug!(clip = clip.name(), "added to decode thread");
                    clips.push(clip);
                }
                Command::Remove(name) => clips.retain(|c| c.name() != name),
            }
        }

        let mut worked = false;
        for clip in &clips {
            if clip.decode_next_frame() {
                worked = true;
            }
            clip.decoded_audio_check();
        }
        if !worked {
            // Queues are full or starved; yield instead of spinning.
            thread::sleep(Duration::from_millis(1));
        }
    }
    tracing::debug!("decode thread stopped");
}
