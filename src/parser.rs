use crate::boxes::{BoxHeader, FourCC, FullBoxHeader, UUID};
use crate::cursor::BoxCursor;
use crate::registry::{BoxHandler, Registry};
use crate::stsd;

#[derive(thiserror::Error, Debug)]
pub enum ParseError {
    #[error("truncated input: needed {needed} bytes, {available} available")]
    TruncatedInput { needed: usize, available: usize },
    #[error("malformed {typ} box at offset {offset}: {reason}")]
    MalformedBox {
        typ: FourCC,
        offset: u64,
        reason: String,
    },
    #[error("invalid container: {0}")]
    InvalidContainer(&'static str),
    #[error("payload decoder failed: {0}")]
    Decode(#[source] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, ParseError>;

/// Deepest box nesting the walk descends into.
pub const MAX_DEPTH: usize = 64;

/// Whether a walk goes on after a handler returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    /// Unwind at once; no later sibling or ancestor box is visited.
    Stop,
}

impl Flow {
    pub fn is_stop(self) -> bool {
        self == Flow::Stop
    }
}

/// A box handed to a registered callback.
#[derive(Debug)]
pub struct ParsedBox<'a> {
    pub header: BoxHeader,
    /// Set for full boxes only.
    pub version: Option<u8>,
    /// Set for full boxes only.
    pub flags: Option<u32>,
    /// Types of the enclosing boxes, outermost first, not including this one.
    pub path: &'a [FourCC],
    /// Reader over the payload, past version and flags for full boxes.
    pub reader: BoxCursor<'a>,
    pub partial: bool,
}

impl ParsedBox<'_> {
    pub fn parent(&self) -> Option<FourCC> {
        self.path.last().copied()
    }
}

/// Read a box header at the cursor.
///
/// A declared size of 0 is resolved to the rest of the cursor's scope, and a
/// declared size of 1 is replaced by the 64-bit size that follows the type.
/// The returned `size` always counts the header.
pub fn read_box_header(r: &mut BoxCursor<'_>) -> Result<BoxHeader> {
    let start = r.offset();
    let scope_left = r.remaining() as u64;
    let size32 = r.read_u32()?;
    let typ = r.read_fourcc()?;
    let mut size = size32 as u64;

    if size32 == 1 {
        size = r.read_u64()?;
    }

    let mut uuid = None;
    if typ == UUID {
        uuid = Some(r.read_array::<16>()?);
    }

    let header_size = match (size32 == 1, uuid.is_some()) {
        (true, true) => 8 + 8 + 16,
        (true, false) => 8 + 8,
        (false, true) => 8 + 16,
        (false, false) => 8,
    } as u64;

    if size32 == 0 {
        size = scope_left;
    }

    if size < header_size {
        return Err(ParseError::MalformedBox {
            typ,
            offset: start,
            reason: format!("size {} is smaller than its {}-byte header", size, header_size),
        });
    }

    Ok(BoxHeader {
        size,
        typ,
        uuid,
        header_size,
        start,
    })
}

pub fn read_full_box_header(r: &mut BoxCursor<'_>) -> Result<FullBoxHeader> {
    let version = r.read_u8()?;
    let flags = r.read_u24()?;
    Ok(FullBoxHeader { version, flags })
}

/// Read the next box in the cursor's scope and return its header and payload.
///
/// `None` marks the end of the scope. In partial mode a header cut short by
/// the end of the scope also ends it, and a payload running past the scope
/// is clamped to what is there.
pub(crate) fn next_box<'a>(
    r: &mut BoxCursor<'a>,
    partial: bool,
) -> Result<Option<(BoxHeader, &'a [u8])>> {
    if r.is_empty() {
        return Ok(None);
    }

    let mut probe = r.clone();
    let header = match read_box_header(&mut probe) {
        Ok(h) => h,
        Err(ParseError::TruncatedInput { .. }) if partial => {
            log::debug!(
                "partial header ({} bytes) at offset {} ends the scope",
                r.remaining(),
                r.offset()
            );
            r.remainder();
            return Ok(None);
        }
        Err(e) => return Err(e),
    };
    *r = probe;

    let declared = header.payload_size();
    let available = r.remaining() as u64;
    let payload = if declared > available {
        if !partial {
            return Err(ParseError::MalformedBox {
                typ: header.typ,
                offset: header.start,
                reason: format!(
                    "declares {} bytes but only {} remain in scope",
                    header.size,
                    available + header.header_size
                ),
            });
        }
        log::debug!(
            "clamping {} at offset {} to {} of {} payload bytes",
            header.typ,
            header.start,
            available,
            declared
        );
        r.remainder()
    } else {
        r.read_bytes(declared as usize)?
    };

    Ok(Some((header, payload)))
}

pub(crate) fn parse_buffer<S>(
    reg: &Registry<S>,
    data: &[u8],
    partial: bool,
    state: &mut S,
) -> Result<Flow> {
    let mut r = BoxCursor::scoped(data, 0, partial);
    let mut path = Vec::new();
    parse_scope(reg, &mut r, &mut path, state)
}

fn parse_scope<S>(
    reg: &Registry<S>,
    r: &mut BoxCursor<'_>,
    path: &mut Vec<FourCC>,
    state: &mut S,
) -> Result<Flow> {
    let partial = r.is_partial();
    while let Some((header, payload)) = next_box(r, partial)? {
        if dispatch(reg, header, payload, path, partial, state)?.is_stop() {
            return Ok(Flow::Stop);
        }
    }
    Ok(Flow::Continue)
}

/// Run the handler registered for `header.typ` over `payload`.
///
/// The caller has already moved past the whole box, so however much of the
/// payload a handler reads, the next sibling starts at the declared end.
pub(crate) fn dispatch<S>(
    reg: &Registry<S>,
    header: BoxHeader,
    payload: &[u8],
    path: &mut Vec<FourCC>,
    partial: bool,
    state: &mut S,
) -> Result<Flow> {
    let Some(handler) = reg.get(&header.typ) else {
        log::trace!(
            "skipping {} ({} bytes) at offset {}",
            header.typ,
            header.size,
            header.start
        );
        return Ok(Flow::Continue);
    };

    let typ = header.typ;
    let start = header.start;
    log::trace!("{} {} at offset {}", handler.name(), typ, start);

    // only set in partial mode, where next_box cut the payload short
    let clamped = (payload.len() as u64) < header.payload_size();
    let mut reader = BoxCursor::scoped(payload, start + header.header_size, partial);
    let flow = match handler {
        BoxHandler::Children => {
            check_depth(&header, path)?;
            path.push(typ);
            let flow = parse_scope(reg, &mut reader, path, state);
            path.pop();
            flow?
        }
        BoxHandler::Box(cb) => {
            let mut b = ParsedBox {
                header,
                version: None,
                flags: None,
                path: path.as_slice(),
                reader,
                partial,
            };
            cb(&mut b, state)?
        }
        BoxHandler::FullBox(cb) => {
            let Some(full) = read_clamped_full_box_header(&mut reader, &header, clamped)? else {
                return Ok(Flow::Continue);
            };
            let mut b = ParsedBox {
                header,
                version: Some(full.version),
                flags: Some(full.flags),
                path: path.as_slice(),
                reader,
                partial,
            };
            cb(&mut b, state)?
        }
        BoxHandler::SampleDescription => {
            check_depth(&header, path)?;
            if read_clamped_full_box_header(&mut reader, &header, clamped)?.is_none() {
                return Ok(Flow::Continue);
            }
            path.push(typ);
            let flow = stsd::dispatch_entries(reg, &header, clamped, &mut reader, path, state);
            path.pop();
            flow?
        }
        BoxHandler::AllData(cb) => cb(payload, state)?,
    };

    if flow.is_stop() {
        log::debug!("walk stopped in {} at offset {}", typ, start);
    }
    Ok(flow)
}

fn check_depth(header: &BoxHeader, path: &[FourCC]) -> Result<()> {
    if path.len() >= MAX_DEPTH {
        return Err(ParseError::MalformedBox {
            typ: header.typ,
            offset: header.start,
            reason: format!("nesting too deep (more than {} levels)", MAX_DEPTH),
        });
    }
    Ok(())
}

/// Version and flags of a full box, or `None` when a clamped box ends
/// before them.
fn read_clamped_full_box_header(
    r: &mut BoxCursor<'_>,
    header: &BoxHeader,
    clamped: bool,
) -> Result<Option<FullBoxHeader>> {
    match read_full_box_header(r) {
        Ok(full) => Ok(Some(full)),
        Err(ParseError::TruncatedInput { .. }) if clamped => {
            log::debug!(
                "partial {} at offset {} ends inside version/flags",
                header.typ,
                header.start
            );
            Ok(None)
        }
        Err(e) => Err(e),
    }
}
