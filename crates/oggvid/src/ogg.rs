//! Incremental Ogg page synchronization and packet reassembly.
//!
//! The physical layer of an Ogg stream is a sequence of pages, each carrying
//! fragments of one or more packets for a single logical stream:
//!
//! ```text
//! Capture pattern: "OggS" (4 bytes)
//! Version:         1 byte (always 0)
//! Header type:     1 byte (flags: continued=0x01, BOS=0x02, EOS=0x04)
//! Granule pos:     8 bytes (little-endian, codec-specific)
//! Serial number:   4 bytes (identifies the logical stream)
//! Page seq no:     4 bytes
//! CRC checksum:    4 bytes
//! Num segments:    1 byte
//! Segment table:   N bytes (lacing values)
//! Page body:       sum(segment table) bytes
//! ```
//!
//! A run of 255-valued lacing values followed by one below 255 forms a
//! complete packet; a page ending on a 255 continues its packet on the next
//! page. [`PageSync`] turns raw bytes into [`Page`]s; [`PacketAssembler`]
//! turns pages of one logical stream back into [`Packet`]s.

use std::collections::VecDeque;

use bytes::Bytes;

/// Page capture pattern.
const CAPTURE_PATTERN: &[u8; 4] = b"OggS";

/// Fixed page header length before the segment table.
const HEADER_LEN: usize = 27;

const FLAG_CONTINUED: u8 = 0x01;
const FLAG_BOS: u8 = 0x02;
const FLAG_EOS: u8 = 0x04;

/// A parsed physical page.
#[derive(Debug, Clone)]
pub struct Page {
    /// Header-type flag byte.
    pub header_type: u8,
    /// Codec-defined position counter; -1 when no packet ends on this page.
    pub granule_position: i64,
    /// Logical stream serial number.
    pub serial: u32,
    /// Page sequence number within the logical stream.
    pub sequence: u32,
    /// Lacing values describing packet fragmentation.
    pub segment_table: Vec<u8>,
    /// Concatenated packet fragments.
    pub body: Bytes,
}

impl Page {
    /// True if this page continues a packet begun on the previous page.
    pub fn is_continued(&self) -> bool {
        self.header_type & FLAG_CONTINUED != 0
    }

    /// True if this is the first page of a logical stream.
    pub fn is_bos(&self) -> bool {
        self.header_type & FLAG_BOS != 0
    }

    /// True if this is the last page of a logical stream.
    pub fn is_eos(&self) -> bool {
        self.header_type & FLAG_EOS != 0
    }
}

/// A reassembled compressed unit, consumed exactly once by a codec.
#[derive(Debug, Clone)]
pub struct Packet {
    /// Opaque compressed payload.
    pub data: Bytes,
    /// Granule position of the page this packet ended on, or -1 when the
    /// page carried no position for it.
    pub granule_position: i64,
}

/// Incremental page synchronizer.
///
/// Callers append raw bytes with [`write`](PageSync::write) and pull
/// complete pages with [`pull_page`](PageSync::pull_page); `None` means more
/// bytes are needed. Garbage between pages (including a mid-page join after
/// a byte-level seek) is skipped by scanning for the capture pattern.
///
/// The CRC field is parsed but not verified.
#[derive(Debug, Default)]
pub struct PageSync {
    buf: Vec<u8>,
}

impl PageSync {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends raw bytes from the byte source.
    pub fn write(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Discards all buffered bytes. Used when the source is repositioned.
    pub fn reset(&mut self) {
        self.buf.clear();
    }

    /// Extracts the next complete page, or returns `None` until more bytes
    /// arrive.
    pub fn pull_page(&mut self) -> Option<Page> {
        loop {
            // Synchronize on the capture pattern, discarding garbage before
            // it but keeping a possible partial pattern at the tail.
            let start = match find_capture(&self.buf) {
                Some(at) => at,
                None => {
                    let keep = self.buf.len().min(CAPTURE_PATTERN.len() - 1);
                    self.buf.drain(..self.buf.len() - keep);
                    return None;
                }
            };
            if start > 0 {
                tracing::trace!("page sync skipped {} garbage bytes", start);
                self.buf.drain(..start);
            }

            if self.buf.len() < HEADER_LEN {
                return None;
            }
            // A non-zero version byte means we matched the pattern inside
            // arbitrary data. Checked before the segment count is trusted,
            // so a false match cannot demand a body that never arrives;
            // drop one byte and resynchronize.
            if self.buf[4] != 0 {
                self.buf.drain(..1);
                continue;
            }

            let n_segments = self.buf[26] as usize;
            let table_end = HEADER_LEN + n_segments;
            if self.buf.len() < table_end {
                return None;
            }
            let body_len: usize = self.buf[HEADER_LEN..table_end]
                .iter()
                .map(|&s| s as usize)
                .sum();
            if self.buf.len() < table_end + body_len {
                return None;
            }

            let header_type = self.buf[5];
            let granule_position = i64::from_le_bytes(self.buf[6..14].try_into().unwrap());
            let serial = u32::from_le_bytes(self.buf[14..18].try_into().unwrap());
            let sequence = u32::from_le_bytes(self.buf[18..22].try_into().unwrap());
            let segment_table = self.buf[HEADER_LEN..table_end].to_vec();
            let body = Bytes::copy_from_slice(&self.buf[table_end..table_end + body_len]);
            self.buf.drain(..table_end + body_len);

            return Some(Page {
                header_type,
                granule_position,
                serial,
                sequence,
                segment_table,
                body,
            });
        }
    }
}

fn find_capture(buf: &[u8]) -> Option<usize> {
    buf.windows(CAPTURE_PATTERN.len())
        .position(|w| w == CAPTURE_PATTERN)
}

/// Per-logical-stream packet reassembly.
///
/// After header negotiation, pages are submitted blindly: the assembler does
/// not re-check the serial number, mirroring the container handling this
/// pipeline was modeled on (a single video + single audio serial pair is the
/// targeted case).
#[derive(Debug)]
pub struct PacketAssembler {
    serial: u32,
    partial: Vec<u8>,
    ready: VecDeque<Packet>,
    /// Set after a reset; the next page's leading continued data belongs to
    /// a packet whose head was never seen and must be dropped.
    resync: bool,
}

impl PacketAssembler {
    pub fn new(serial: u32) -> Self {
        Self {
            serial,
            partial: Vec::new(),
            ready: VecDeque::new(),
            resync: false,
        }
    }

    /// Serial number this assembler was opened for.
    pub fn serial(&self) -> u32 {
        self.serial
    }

    /// Ingests a page, completing zero or more packets.
    pub fn submit_page(&mut self, page: &Page) {
        let mut skipping = self.resync && page.is_continued();
        self.resync = false;

        let mut offset = 0usize;
        let mut completed_at: Option<usize> = None;
        for &lacing in &page.segment_table {
            let len = lacing as usize;
            let fragment = &page.body[offset..offset + len];
            offset += len;
            if skipping {
                if lacing < 255 {
                    // Tail of the unseen packet ends here; resume normally.
                    skipping = false;
                }
                continue;
            }
            self.partial.extend_from_slice(fragment);
            if lacing < 255 {
                self.ready.push_back(Packet {
                    data: Bytes::from(std::mem::take(&mut self.partial)),
                    granule_position: -1,
                });
                completed_at = Some(self.ready.len() - 1);
            }
        }

        // The page granule belongs to the last packet completed on it.
        if let Some(at) = completed_at {
            self.ready[at].granule_position = page.granule_position;
        }
    }

    /// Yields the next complete packet in order.
    pub fn packet_out(&mut self) -> Option<Packet> {
        self.ready.pop_front()
    }

    /// True when no complete or partial packet data is buffered.
    pub fn is_empty(&self) -> bool {
        self.ready.is_empty() && self.partial.is_empty()
    }

    /// Drops partial and queued state. Used when the source is repositioned.
    pub fn reset(&mut self) {
        self.partial.clear();
        self.ready.clear();
        self.resync = true;
    }
}
