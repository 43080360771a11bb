//! Interface to the external replay-file codec.
//!
//! The binary `.osr` container and the compressed frame stream inside it are
//! decoded by a caller-supplied [`ReplayDecoder`]. Once decompressed, the
//! frame stream is plain text that [`parse_frame_text`] understands, so a
//! decoder only has to undo the container and the compression.

use chrono::{DateTime, Utc};

use crate::api::HitCounts;
use crate::error::{Error, Result};
use crate::events::{Keys, RawFrame};
use crate::mods::ModCombination;

/// Time delta marking the frame that carries the RNG seed instead of input
const RNG_SEED_FRAME: i64 = -12345;

/// Metadata embedded in a replay file header. Every field is optional since
/// not every source fills them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReplayHeader {
    pub beatmap_hash: Option<String>,
    pub username: Option<String>,
    pub mods: Option<ModCombination>,
    pub timestamp: Option<DateTime<Utc>>,
    pub replay_id: Option<u64>,
    pub game_version: Option<u32>,
    pub counts: Option<HitCounts>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DecodedReplay {
    pub header: ReplayHeader,
    pub frames: Vec<RawFrame>,
}

/// External codec for replay files and bare frame streams.
pub trait ReplayDecoder: Send + Sync {
    /// Decode a complete replay file
    fn decode(&self, bytes: &[u8]) -> Result<DecodedReplay>;

    /// Decode a bare compressed frame stream, as served by the replay endpoint
    fn decode_frames(&self, bytes: &[u8]) -> Result<Vec<RawFrame>>;
}

/// Parse decompressed frame text (`"w|x|y|z,w|x|y|z,..."`).
///
/// The RNG seed frame and empty trailing entries are skipped.
pub fn parse_frame_text(text: &str) -> Result<Vec<RawFrame>> {
    let mut frames = Vec::new();

    for entry in text.split(',') {
        let entry = entry.trim();
        if entry.is_empty() {
            continue;
        }

        let fields: Vec<&str> = entry.split('|').collect();
        if fields.len() != 4 {
            return Err(Error::Decode(format!("expected 4 fields in frame '{}'", entry)));
        }

        let time_delta: i64 = fields[0]
            .parse()
            .map_err(|_| Error::Decode(format!("invalid time delta in frame '{}'", entry)))?;
        if time_delta == RNG_SEED_FRAME {
            continue;
        }
        let x: f32 = fields[1]
            .parse()
            .map_err(|_| Error::Decode(format!("invalid x in frame '{}'", entry)))?;
        let y: f32 = fields[2]
            .parse()
            .map_err(|_| Error::Decode(format!("invalid y in frame '{}'", entry)))?;
        let keys: u32 = fields[3]
            .parse()
            .map_err(|_| Error::Decode(format!("invalid keys in frame '{}'", entry)))?;

        frames.push(RawFrame::new(time_delta, x, y, Keys::from_bits(keys)));
    }

    Ok(frames)
}
