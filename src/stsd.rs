use crate::boxes::{BoxHeader, FourCC, MIN_HEADER_SIZE};
use crate::cursor::BoxCursor;
use crate::parser::{self, Flow, ParseError, Result};
use crate::registry::Registry;

/// Walk the sample entries of a sample description box.
///
/// `r` sits just past version and flags. `clamped` marks a box cut short in
/// partial mode. Each entry is dispatched through `reg` by its own type,
/// scoped to its own bytes, with the sample description box last on `path`.
pub(crate) fn dispatch_entries<S>(
    reg: &Registry<S>,
    stsd: &BoxHeader,
    clamped: bool,
    r: &mut BoxCursor<'_>,
    path: &mut Vec<FourCC>,
    state: &mut S,
) -> Result<Flow> {
    let partial = r.is_partial();
    let entry_count = match r.read_u32() {
        Ok(n) => n,
        Err(ParseError::TruncatedInput { .. }) if clamped => {
            log::debug!("partial {} at offset {} ends inside entry_count", stsd.typ, stsd.start);
            return Ok(Flow::Continue);
        }
        Err(e) => return Err(e),
    };

    // every entry needs at least a bare header
    let room = r.remaining() / MIN_HEADER_SIZE;
    if !partial && entry_count as usize > room {
        return Err(ParseError::MalformedBox {
            typ: stsd.typ,
            offset: stsd.start,
            reason: format!(
                "entry_count={} cannot fit in {} bytes",
                entry_count,
                r.remaining()
            ),
        });
    }

    for i in 0..entry_count {
        let Some((header, payload)) = parser::next_box(r, partial)? else {
            if partial {
                log::debug!("partial {} ends after {} of {} entries", stsd.typ, i, entry_count);
                return Ok(Flow::Continue);
            }
            return Err(ParseError::MalformedBox {
                typ: stsd.typ,
                offset: stsd.start,
                reason: format!("ran out of bytes after {} of {} entries", i, entry_count),
            });
        };
        log::trace!("sample entry {} is {}", i, header.typ);
        if parser::dispatch(reg, header, payload, path, partial, state)?.is_stop() {
            return Ok(Flow::Stop);
        }
    }

    Ok(Flow::Continue)
}
