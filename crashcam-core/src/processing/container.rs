//! Fragment container format.
//!
//! A track-structured file built from size-prefixed boxes, big-endian, in
//! the style of ISO-BMFF. The capture subsystem writes one such file per
//! fragment; concatenation produces one for the whole recording.
//!
//! Layout:
//! ```text
//! box   := size:u32 (header included) | type:[u8; 4] | payload
//! file  := "ftyp" { brand "ccf1", version:u32 }  "trak"*
//! trak  := "hdlr" { handler:[u8; 4] }  "mdhd" { timescale:u32 }  "smpl"*
//! smpl  := duration:u32 | data
//! ```
//! Unknown boxes are skipped on read.
use std::fs;
use std::path::Path;

use crate::models::error::CrashCamError;

/// Size of a box header (size + type).
pub const BOX_HEADER_SIZE: usize = 8;

pub const BRAND: [u8; 4] = *b"ccf1";
pub const FORMAT_VERSION: u32 = 1;

const FTYP: [u8; 4] = *b"ftyp";
const TRAK: [u8; 4] = *b"trak";
const HDLR: [u8; 4] = *b"hdlr";
const MDHD: [u8; 4] = *b"mdhd";
const SMPL: [u8; 4] = *b"smpl";

/// Track media type, taken from the `hdlr` box.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrackKind {
    Video,
    Sound,
    Other([u8; 4]),
}

impl TrackKind {
    pub fn from_handler(handler: [u8; 4]) -> Self {
        match &handler {
            b"vide" => Self::Video,
            b"soun" => Self::Sound,
            _ => Self::Other(handler),
        }
    }

    pub fn handler(&self) -> [u8; 4] {
        match self {
            Self::Video => *b"vide",
            Self::Sound => *b"soun",
            Self::Other(h) => *h,
        }
    }
}

/// One encoded media sample. `duration` is in track timescale ticks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sample {
    pub duration: u32,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Track {
    pub kind: TrackKind,
    /// Ticks per second.
    pub timescale: u32,
    pub samples: Vec<Sample>,
}

impl Track {
    pub fn new(kind: TrackKind, timescale: u32) -> Self {
        Self {
            kind,
            timescale,
            samples: Vec::new(),
        }
    }

    /// Total duration in timescale ticks.
    pub fn duration(&self) -> u64 {
        self.samples.iter().map(|s| s.duration as u64).sum()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Movie {
    pub tracks: Vec<Track>,
}

impl Movie {
    pub fn video_tracks(&self) -> impl Iterator<Item = &Track> {
        self.tracks.iter().filter(|t| t.kind == TrackKind::Video)
    }

    pub fn read_from(path: &Path) -> Result<Self, CrashCamError> {
        let bytes = fs::read(path).map_err(|e| {
            CrashCamError::StorageError(format!("failed to read {}: {}", path.display(), e))
        })?;
        Self::parse(&bytes)
            .map_err(|e| CrashCamError::ContainerError(format!("{}: {}", path.display(), e)))
    }

    pub fn write_to(&self, path: &Path) -> Result<(), CrashCamError> {
        let bytes = self.to_bytes()?;
        fs::write(path, bytes).map_err(|e| {
            CrashCamError::StorageError(format!("failed to write {}: {}", path.display(), e))
        })
    }

    pub fn parse(bytes: &[u8]) -> Result<Self, String> {
        let mut boxes = BoxIter::new(bytes);

        let (kind, payload) = boxes.next().ok_or("missing ftyp box")??;
        if kind != FTYP {
            return Err(format!("expected ftyp box, found {}", fourcc(&kind)));
        }
        if payload.len() < 8 || payload[0..4] != BRAND {
            return Err("unsupported brand".into());
        }
        let version = read_u32(&payload[4..8]);
        if version != FORMAT_VERSION {
            return Err(format!("unsupported format version {}", version));
        }

        let mut movie = Movie::default();
        for entry in boxes {
            let (kind, payload) = entry?;
            if kind == TRAK {
                movie.tracks.push(parse_track(payload)?);
            }
        }
        Ok(movie)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, CrashCamError> {
        let mut ftyp = Vec::with_capacity(8);
        ftyp.extend_from_slice(&BRAND);
        ftyp.extend_from_slice(&FORMAT_VERSION.to_be_bytes());

        let mut out = Vec::new();
        write_box(&mut out, FTYP, &ftyp)?;
        for track in &self.tracks {
            write_box(&mut out, TRAK, &encode_track(track)?)?;
        }
        Ok(out)
    }
}

fn parse_track(payload: &[u8]) -> Result<Track, String> {
    let mut kind = None;
    let mut timescale = None;
    let mut samples = Vec::new();

    for entry in BoxIter::new(payload) {
        let (box_type, body) = entry?;
        match box_type {
            HDLR => {
                let handler: [u8; 4] = body
                    .get(0..4)
                    .and_then(|b| b.try_into().ok())
                    .ok_or("truncated hdlr box")?;
                kind = Some(TrackKind::from_handler(handler));
            }
            MDHD => {
                let ts = body.get(0..4).ok_or("truncated mdhd box")?;
                timescale = Some(read_u32(ts));
            }
            SMPL => {
                let duration = body.get(0..4).ok_or("truncated smpl box")?;
                samples.push(Sample {
                    duration: read_u32(duration),
                    data: body[4..].to_vec(),
                });
            }
            _ => {}
        }
    }

    Ok(Track {
        kind: kind.ok_or("track without hdlr box")?,
        timescale: timescale.ok_or("track without mdhd box")?,
        samples,
    })
}

fn encode_track(track: &Track) -> Result<Vec<u8>, CrashCamError> {
    let mut out = Vec::new();
    write_box(&mut out, HDLR, &track.kind.handler())?;
    write_box(&mut out, MDHD, &track.timescale.to_be_bytes())?;
    for sample in &track.samples {
        let mut body = Vec::with_capacity(4 + sample.data.len());
        body.extend_from_slice(&sample.duration.to_be_bytes());
        body.extend_from_slice(&sample.data);
        write_box(&mut out, SMPL, &body)?;
    }
    Ok(out)
}

fn write_box(out: &mut Vec<u8>, box_type: [u8; 4], payload: &[u8]) -> Result<(), CrashCamError> {
    let size = u32::try_from(BOX_HEADER_SIZE + payload.len()).map_err(|_| {
        CrashCamError::ContainerError(format!("{} box exceeds 4 GiB", fourcc(&box_type)))
    })?;
    out.extend_from_slice(&size.to_be_bytes());
    out.extend_from_slice(&box_type);
    out.extend_from_slice(payload);
    Ok(())
}

/// Iterates `(type, payload)` pairs of consecutive boxes.
struct BoxIter<'a> {
    bytes: &'a [u8],
    offset: usize,
}

impl<'a> BoxIter<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, offset: 0 }
    }
}

impl<'a> Iterator for BoxIter<'a> {
    type Item = Result<([u8; 4], &'a [u8]), String>;

    fn next(&mut self) -> Option<Self::Item> {
        let remaining = &self.bytes[self.offset..];
        if remaining.is_empty() {
            return None;
        }
        if remaining.len() < BOX_HEADER_SIZE {
            let at = self.offset;
            self.offset = self.bytes.len();
            return Some(Err(format!("truncated box header at offset {}", at)));
        }

        let size = read_u32(&remaining[0..4]) as usize;
        if size < BOX_HEADER_SIZE || size > remaining.len() {
            let at = self.offset;
            self.offset = self.bytes.len();
            return Some(Err(format!("invalid box size {} at offset {}", size, at)));
        }

        let mut box_type = [0u8; 4];
        box_type.copy_from_slice(&remaining[4..8]);
        self.offset += size;
        Some(Ok((box_type, &remaining[BOX_HEADER_SIZE..size])))
    }
}

fn read_u32(bytes: &[u8]) -> u32 {
    u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}

fn fourcc(code: &[u8; 4]) -> String {
    String::from_utf8_lossy(code).into_owned()
}
