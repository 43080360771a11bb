//! Lossy compression of replay events for the cache.
//!
//! Layout: one format byte followed by a deflate stream of LEB128 varints.
//! The varints hold the frame count and then four columns (time, x, y,
//! keys) delta-encoded against the previous frame. Coordinates are rounded
//! to [`QUANTUM`] osu!pixels; times and keys are exact.

use std::io::{Read, Write};

use flate2::Compression;
use flate2::read::DeflateDecoder;
use flate2::write::DeflateEncoder;

use crate::error::{Error, Result};
use crate::events::{Frame, Keys, ReplayEvents};

const FORMAT_VERSION: u8 = 1;

/// Coordinate resolution in osu!pixels
pub const QUANTUM: f32 = 1.0 / 16.0;

/// Largest coordinate error introduced by a round trip
pub const MAX_COORDINATE_ERROR: f32 = QUANTUM / 2.0;

fn quantize(value: f32) -> i64 {
    (value / QUANTUM).round() as i64
}

fn zigzag(value: i64) -> u64 {
    ((value << 1) ^ (value >> 63)) as u64
}

fn unzigzag(value: u64) -> i64 {
    ((value >> 1) as i64) ^ -((value & 1) as i64)
}

fn write_varint(out: &mut Vec<u8>, mut value: u64) {
    loop {
        let byte = (value & 0x7f) as u8;
        value >>= 7;
        if value == 0 {
            out.push(byte);
            return;
        }
        out.push(byte | 0x80);
    }
}

struct VarintReader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl VarintReader<'_> {
    fn next(&mut self) -> Result<u64> {
        let mut value = 0u64;
        let mut shift = 0u32;
        loop {
            let byte = *self
                .bytes
                .get(self.pos)
                .ok_or_else(|| Error::Decode("truncated cache record".to_string()))?;
            self.pos += 1;
            if shift >= 64 {
                return Err(Error::Decode("varint overflow in cache record".to_string()));
            }
            value |= ((byte & 0x7f) as u64) << shift;
            if byte & 0x80 == 0 {
                return Ok(value);
            }
            shift += 7;
        }
    }

    fn next_signed(&mut self) -> Result<i64> {
        self.next().map(unzigzag)
    }
}

fn write_deltas(out: &mut Vec<u8>, values: impl Iterator<Item = i64>) {
    let mut previous = 0i64;
    for value in values {
        write_varint(out, zigzag(value.wrapping_sub(previous)));
        previous = value;
    }
}

fn read_deltas(reader: &mut VarintReader<'_>, count: usize) -> Result<Vec<i64>> {
    let mut values = Vec::with_capacity(count);
    let mut previous = 0i64;
    for _ in 0..count {
        previous = previous.wrapping_add(reader.next_signed()?);
        values.push(previous);
    }
    Ok(values)
}

pub fn encode(events: &ReplayEvents) -> Result<Vec<u8>> {
    let frames = events.frames();
    let mut raw = Vec::with_capacity(frames.len() * 6);

    write_varint(&mut raw, frames.len() as u64);
    write_deltas(&mut raw, frames.iter().map(|f| f.t));
    write_deltas(&mut raw, frames.iter().map(|f| quantize(f.x)));
    write_deltas(&mut raw, frames.iter().map(|f| quantize(f.y)));
    write_deltas(&mut raw, frames.iter().map(|f| f.keys.bits() as i64));

    let mut encoder = DeflateEncoder::new(vec![FORMAT_VERSION], Compression::best());
    encoder.write_all(&raw)?;
    Ok(encoder.finish()?)
}

pub fn decode(bytes: &[u8]) -> Result<ReplayEvents> {
    let (&version, compressed) = bytes
        .split_first()
        .ok_or_else(|| Error::Decode("empty cache record".to_string()))?;
    if version != FORMAT_VERSION {
        return Err(Error::Decode(format!(
            "unknown cache record format {}",
            version
        )));
    }

    let mut raw = Vec::new();
    DeflateDecoder::new(compressed)
        .read_to_end(&mut raw)
        .map_err(|e| Error::Decode(format!("corrupt cache record: {}", e)))?;

    let mut reader = VarintReader { bytes: &raw, pos: 0 };
    let count = reader.next()? as usize;
    if count > raw.len() {
        return Err(Error::Decode(format!("implausible frame count {}", count)));
    }

    let times = read_deltas(&mut reader, count)?;
    let xs = read_deltas(&mut reader, count)?;
    let ys = read_deltas(&mut reader, count)?;
    let keys = read_deltas(&mut reader, count)?;

    let frames = (0..count)
        .map(|i| Frame {
            t: times[i],
            x: xs[i] as f32 * QUANTUM,
            y: ys[i] as f32 * QUANTUM,
            keys: Keys::from_bits(keys[i] as u32),
        })
        .collect();

    ReplayEvents::from_frames(frames)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_events() -> ReplayEvents {
        let frames = (0..500)
            .map(|i| {
                let t = i as f32;
                Frame::new(
                    i * 16 + (i % 3),
                    256.0 + 120.0 * (t / 20.0).sin() + 0.013 * t,
                    192.0 + 90.0 * (t / 33.0).cos() - 0.007 * t,
                    Keys::from_bits(if i % 40 < 5 { 5 } else { 0 }),
                )
            })
            .collect();
        ReplayEvents::from_frames(frames).unwrap()
    }

    #[test]
    fn test_round_trip_within_tolerance() {
        let events = sample_events();
        let decoded = decode(&encode(&events).unwrap()).unwrap();

        assert_eq!(decoded.len(), events.len());
        for (a, b) in events.frames().iter().zip(decoded.frames()) {
            assert_eq!(a.t, b.t);
            assert_eq!(a.keys, b.keys);
            assert!((a.x - b.x).abs() <= MAX_COORDINATE_ERROR + 1e-4);
            assert!((a.y - b.y).abs() <= MAX_COORDINATE_ERROR + 1e-4);
        }
    }

    #[test]
    fn test_negative_coordinates_and_times() {
        let frames = vec![
            Frame::new(-300, -512.3, -20.0, Keys::NONE),
            Frame::new(-1, 1024.0, 800.7, Keys::M2),
        ];
        let events = ReplayEvents::from_frames(frames).unwrap();
        let decoded = decode(&encode(&events).unwrap()).unwrap();
        assert_eq!(decoded.frames()[0].t, -300);
        assert!((decoded.frames()[0].x + 512.3).abs() <= MAX_COORDINATE_ERROR + 1e-3);
        assert_eq!(decoded.frames()[1].keys, Keys::M2);
    }

    #[test]
    fn test_compresses() {
        let events = sample_events();
        let encoded = encode(&events).unwrap();
        // 500 frames of four f32/i32 columns would take 8000 bytes uncompressed
        assert!(encoded.len() < 4000, "encoded to {} bytes", encoded.len());
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(decode(&[]).is_err());
        assert!(decode(&[9, 1, 2, 3]).is_err());
        assert!(decode(&[FORMAT_VERSION, 0xff, 0xff]).is_err());
    }

    #[test]
    fn test_zigzag() {
        for v in [0i64, 1, -1, 63, -64, i64::MAX, i64::MIN] {
            assert_eq!(unzigzag(zigzag(v)), v);
        }
    }
}
