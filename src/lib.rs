pub mod boxes;
pub mod cursor;
pub mod parser;
pub mod pssh;
pub mod registry;
mod stsd;
pub mod text;

pub use boxes::{BoxHeader, FourCC, FullBoxHeader};
pub use cursor::BoxCursor;
pub use parser::{Flow, ParseError, ParsedBox, read_box_header, read_full_box_header};
pub use pssh::{PsshBoundary, PsshInfo, dedupe, parse_pssh, scan_boundaries};
pub use registry::{BoxHandler, Registry};
pub use text::{
    Cue, DocumentDecoder, ExtractMode, Mp4TextExtractor, TextPayloadDecoder, TimeContext,
};
