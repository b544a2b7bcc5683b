use crate::boxes::{FULL_BOX_HEADER_SIZE, MIN_HEADER_SIZE, MOOF, MOOV, PSSH};
use crate::parser::{Flow, Result};
use crate::registry::Registry;
use byteorder::{BigEndian, ByteOrder};
use serde::Serialize;
use std::borrow::Cow;

/// Byte range `[start, end)` of one box inside the scanned buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PsshBoundary {
    pub start: usize,
    pub end: usize,
}

impl PsshBoundary {
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    pub fn slice<'a>(&self, data: &'a [u8]) -> &'a [u8] {
        &data[self.start..self.end]
    }
}

/// Split a buffer of back-to-back full boxes into per-box byte ranges.
///
/// Box types are not checked. Scanning stops quietly at the first header that
/// is cut short, declares a size too small for a full box, or ends past the
/// buffer; the ranges found up to that point are returned.
pub fn scan_boundaries(data: &[u8]) -> Vec<PsshBoundary> {
    let mut out = Vec::new();
    let mut pos = 0usize;

    while data.len() - pos >= MIN_HEADER_SIZE {
        let rest = &data[pos..];
        let size32 = BigEndian::read_u32(&rest[0..4]);
        let (size, header_size) = match size32 {
            0 => (rest.len() as u64, MIN_HEADER_SIZE),
            1 => {
                if rest.len() < 16 {
                    break;
                }
                (BigEndian::read_u64(&rest[8..16]), 16)
            }
            n => (n as u64, MIN_HEADER_SIZE),
        };

        if size < (header_size + FULL_BOX_HEADER_SIZE) as u64 || size > rest.len() as u64 {
            log::debug!(
                "stopping pssh scan at offset {}: size {} with {} bytes left",
                pos,
                size,
                rest.len()
            );
            break;
        }

        let end = pos + size as usize;
        out.push(PsshBoundary { start: pos, end });
        pos = end;
    }

    out
}

/// Drop repeated boxes from a buffer of concatenated `pssh` boxes.
///
/// With fewer than two boxes found the input comes back untouched. Otherwise
/// the first copy of each distinct box is kept, in order, and anything outside
/// the scanned boxes is left out.
pub fn dedupe(data: &[u8]) -> Cow<'_, [u8]> {
    let boundaries = scan_boundaries(data);
    dedupe_with(data, &boundaries)
}

/// [`dedupe`] over boundaries the caller already has.
pub fn dedupe_with<'a>(data: &'a [u8], boundaries: &[PsshBoundary]) -> Cow<'a, [u8]> {
    if boundaries.len() < 2 {
        return Cow::Borrowed(data);
    }

    let mut kept: Vec<&[u8]> = Vec::with_capacity(boundaries.len());
    for b in boundaries {
        let region = b.slice(data);
        if !kept.contains(&region) {
            kept.push(region);
        }
    }

    log::debug!(
        "pssh dedupe kept {} of {} boxes",
        kept.len(),
        boundaries.len()
    );
    Cow::Owned(kept.concat())
}

/// Summary of one `pssh` box.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PsshInfo {
    pub start: u64,
    pub end: u64,
    pub version: u8,
    /// Hex encoded.
    pub system_id: String,
    /// Hex encoded; only version 1 boxes list key ids.
    pub key_ids: Vec<String>,
    pub data_size: u32,
}

/// Find the `pssh` boxes in `data`, top level or under `moov` / `moof`.
///
/// Boxes with a version above 1 are skipped.
pub fn parse_pssh(data: &[u8]) -> Result<Vec<PsshInfo>> {
    let reg = Registry::<Vec<PsshInfo>>::new()
        .with_children(MOOV)
        .with_children(MOOF)
        .with_full_box(PSSH, |b, found| {
            let version = b.version.unwrap_or(0);
            if version > 1 {
                log::warn!(
                    "unsupported pssh version {} at offset {}",
                    version,
                    b.header.start
                );
                return Ok(Flow::Continue);
            }

            let r = &mut b.reader;
            let system_id = hex::encode(r.read_bytes(16)?);
            let mut key_ids = Vec::new();
            if version > 0 {
                let count = r.read_u32()?;
                for _ in 0..count {
                    key_ids.push(hex::encode(r.read_array::<16>()?));
                }
            }
            let data_size = r.read_u32()?;

            found.push(PsshInfo {
                start: b.header.start,
                end: b.header.end(),
                version,
                system_id,
                key_ids,
                data_size,
            });
            Ok(Flow::Continue)
        });

    let mut found = Vec::new();
    reg.parse(data, false, &mut found)?;
    Ok(found)
}
