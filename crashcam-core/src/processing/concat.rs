use std::fs::File;
use std::io::Write;
use std::path::Path;

use crate::models::error::CrashCamError;
use crate::processing::container::{Movie, Track, TrackKind};

/// Outcome of a fragment concatenation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConcatSummary {
    pub fragment_count: usize,
    pub sample_count: usize,
    /// Total duration in the output track's timescale.
    pub duration: u64,
    pub timescale: u32,
}

/// Join video tracks end to end into a single video track.
///
/// All tracks must share one timescale. Non-video tracks are rejected.
pub fn append_tracks(tracks: &[&Track]) -> Result<Track, CrashCamError> {
    let first = tracks.first().ok_or(CrashCamError::NoVideoTracks)?;

    let mut joined = Track::new(TrackKind::Video, first.timescale);
    for track in tracks {
        if track.kind != TrackKind::Video {
            return Err(CrashCamError::ContainerError(format!(
                "cannot append {:?} track to a video track",
                track.kind
            )));
        }
        if track.timescale != joined.timescale {
            return Err(CrashCamError::ContainerError(format!(
                "timescale mismatch: {} vs {}",
                track.timescale, joined.timescale
            )));
        }
        joined.samples.extend(track.samples.iter().cloned());
    }
    Ok(joined)
}

/// Concatenate the video tracks of `fragments` (in order) into `output`.
///
/// Audio and other tracks are dropped. Fails if any fragment is unreadable or
/// no fragment carries a video track.
pub fn concat_video_fragments<P: AsRef<Path>>(
    fragments: &[P],
    output: &Path,
) -> Result<ConcatSummary, CrashCamError> {
    let movies = fragments
        .iter()
        .map(|f| Movie::read_from(f.as_ref()))
        .collect::<Result<Vec<_>, _>>()?;

    let video_tracks: Vec<&Track> = movies.iter().flat_map(|m| m.video_tracks()).collect();
    let dropped = movies.iter().map(|m| m.tracks.len()).sum::<usize>() - video_tracks.len();
    if dropped > 0 {
        log::debug!("dropping {} non-video tracks", dropped);
    }

    let joined = append_tracks(&video_tracks)?;
    let summary = ConcatSummary {
        fragment_count: fragments.len(),
        sample_count: joined.samples.len(),
        duration: joined.duration(),
        timescale: joined.timescale,
    };

    let bytes = Movie {
        tracks: vec![joined],
    }
    .to_bytes()?;

    let mut file = File::create(output)
        .map_err(|e| CrashCamError::io("failed to create concatenated video", e))?;
    file.write_all(&bytes)
        .map_err(|e| CrashCamError::io("failed to write concatenated video", e))?;
    file.sync_all()
        .map_err(|e| CrashCamError::io("failed to sync concatenated video", e))?;

    Ok(summary)
}
