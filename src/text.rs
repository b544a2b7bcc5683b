use crate::boxes::{FourCC, MDAT, MDIA, MINF, MOOV, STBL, STPP, STSD, TRAK};
use crate::parser::{Flow, ParseError, ParsedBox, Result};
use crate::registry::Registry;
use serde::Serialize;
use std::collections::HashMap;

/// MIME types served by [`Mp4TextExtractor`].
pub const MP4_TTML_MIME_TYPES: [&str; 2] = [
    r#"application/mp4; codecs="stpp""#,
    r#"application/mp4; codecs="stpp.ttml.im1t""#,
];

/// Sample entry tags accepted as a TTML track. Both MIME types above
/// describe an `stpp` (XMLSubtitleSampleEntry) track.
pub const SUBTITLE_SAMPLE_ENTRIES: &[FourCC] = &[STPP];

/// A decoded text cue. Times are in seconds on the presentation timeline.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Cue {
    pub start_time: f64,
    pub end_time: f64,
    pub payload: String,
}

/// Timing the payload decoder needs to place cues. Not read by the box walk.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct TimeContext {
    pub period_start: f64,
    pub segment_start: f64,
    pub segment_end: f64,
}

/// Turns the bytes of an `mdat` into cues.
pub trait TextPayloadDecoder {
    fn decode_first_cue(&self, payload: &[u8], time: &TimeContext) -> anyhow::Result<Cue>;

    fn decode_all(&self, payload: &[u8], time: &TimeContext) -> anyhow::Result<Vec<Cue>>;
}

impl<D: TextPayloadDecoder + ?Sized> TextPayloadDecoder for &D {
    fn decode_first_cue(&self, payload: &[u8], time: &TimeContext) -> anyhow::Result<Cue> {
        (**self).decode_first_cue(payload, time)
    }

    fn decode_all(&self, payload: &[u8], time: &TimeContext) -> anyhow::Result<Vec<Cue>> {
        (**self).decode_all(payload, time)
    }
}

/// Decoder that keeps each payload as a single UTF-8 document spanning the
/// segment. Useful when the document is rendered elsewhere.
#[derive(Debug, Clone, Copy, Default)]
pub struct DocumentDecoder;

impl TextPayloadDecoder for DocumentDecoder {
    fn decode_first_cue(&self, payload: &[u8], time: &TimeContext) -> anyhow::Result<Cue> {
        let doc = std::str::from_utf8(payload)
            .map_err(|e| anyhow::anyhow!("mdat payload is not valid utf-8: {}", e))?;
        Ok(Cue {
            start_time: time.period_start + time.segment_start,
            end_time: time.period_start + time.segment_end,
            payload: doc.trim_end_matches('\0').to_string(),
        })
    }

    fn decode_all(&self, payload: &[u8], time: &TimeContext) -> anyhow::Result<Vec<Cue>> {
        Ok(vec![self.decode_first_cue(payload, time)?])
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExtractMode {
    /// Decode only the first cue of the first `mdat`, then stop.
    FirstCue,
    /// Decode every `mdat` in the buffer.
    #[default]
    Full,
}

/// Extracts TTML cues carried in MP4 (`stpp`) segments.
pub struct Mp4TextExtractor<D> {
    decoder: D,
    init: Registry<bool>,
}

struct MediaScan<'d> {
    decoder: &'d dyn TextPayloadDecoder,
    time: &'d TimeContext,
    mode: ExtractMode,
    saw_mdat: bool,
    cues: Vec<Cue>,
}

impl<D: TextPayloadDecoder> Mp4TextExtractor<D> {
    pub fn new(decoder: D) -> Self {
        let mut init = Registry::<bool>::new()
            .with_children(MOOV)
            .with_children(TRAK)
            .with_children(MDIA)
            .with_children(MINF)
            .with_children(STBL)
            .with_sample_description(STSD);
        for &entry in SUBTITLE_SAMPLE_ENTRIES {
            init = init.with_box(entry, mark_entry);
        }
        Self { decoder, init }
    }

    /// Check that an initialization segment declares a TTML sample entry.
    pub fn parse_init(&self, data: &[u8], partial: bool) -> Result<()> {
        let mut saw_entry = false;
        self.init.parse(data, partial, &mut saw_entry)?;
        if !saw_entry {
            return Err(ParseError::InvalidContainer(
                "no stpp sample entry under moov/trak/mdia/minf/stbl/stsd",
            ));
        }
        Ok(())
    }

    /// Decode the cues carried in the `mdat` boxes of a media segment.
    ///
    /// In [`ExtractMode::FirstCue`] only the first `mdat` is decoded and the
    /// result holds at most one cue. In [`ExtractMode::Full`] every `mdat` is
    /// decoded and the cues are returned in file order.
    pub fn parse_media(
        &self,
        data: &[u8],
        time: &TimeContext,
        mode: ExtractMode,
    ) -> Result<Vec<Cue>> {
        let reg = Registry::<MediaScan<'_>>::new().with_all_data(MDAT, decode_mdat);

        let mut scan = MediaScan {
            decoder: &self.decoder,
            time,
            mode,
            saw_mdat: false,
            cues: Vec::new(),
        };
        reg.parse(data, false, &mut scan)?;

        if !scan.saw_mdat {
            return Err(ParseError::InvalidContainer("no mdat box in media segment"));
        }
        log::debug!("decoded {} cues", scan.cues.len());
        Ok(scan.cues)
    }
}

fn mark_entry(_: &mut ParsedBox<'_>, saw_entry: &mut bool) -> Result<Flow> {
    *saw_entry = true;
    Ok(Flow::Stop)
}

fn decode_mdat(payload: &[u8], scan: &mut MediaScan<'_>) -> Result<Flow> {
    scan.saw_mdat = true;
    match scan.mode {
        ExtractMode::FirstCue => {
            let cue = scan
                .decoder
                .decode_first_cue(payload, scan.time)
                .map_err(ParseError::Decode)?;
            scan.cues.push(cue);
            Ok(Flow::Stop)
        }
        ExtractMode::Full => {
            let mut cues = scan
                .decoder
                .decode_all(payload, scan.time)
                .map_err(ParseError::Decode)?;
            scan.cues.append(&mut cues);
            Ok(Flow::Continue)
        }
    }
}

/// A text format parser that can be looked up by MIME type.
pub trait TextParser {
    fn parse_init(&self, data: &[u8]) -> Result<()>;

    fn parse_media(&self, data: &[u8], time: &TimeContext) -> Result<Vec<Cue>>;
}

impl<D: TextPayloadDecoder> TextParser for Mp4TextExtractor<D> {
    fn parse_init(&self, data: &[u8]) -> Result<()> {
        Mp4TextExtractor::parse_init(self, data, false)
    }

    fn parse_media(&self, data: &[u8], time: &TimeContext) -> Result<Vec<Cue>> {
        Mp4TextExtractor::parse_media(self, data, time, ExtractMode::Full)
    }
}

pub type TextParserFactory = Box<dyn Fn() -> Box<dyn TextParser> + Send + Sync>;

/// Text parsers keyed by MIME type, compared case-insensitively.
#[derive(Default)]
pub struct TextParserRegistry {
    map: HashMap<String, TextParserFactory>,
}

impl TextParserRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(&mut self, mime_type: &str, factory: F)
    where
        F: Fn() -> Box<dyn TextParser> + Send + Sync + 'static,
    {
        self.map.insert(mime_type.to_ascii_lowercase(), Box::new(factory));
    }

    pub fn unregister(&mut self, mime_type: &str) -> bool {
        self.map.remove(&mime_type.to_ascii_lowercase()).is_some()
    }

    pub fn is_supported(&self, mime_type: &str) -> bool {
        self.map.contains_key(&mime_type.to_ascii_lowercase())
    }

    pub fn create(&self, mime_type: &str) -> Option<Box<dyn TextParser>> {
        self.map.get(&mime_type.to_ascii_lowercase()).map(|f| f())
    }
}

/// Register the MP4 TTML extractor under both `stpp` MIME types.
pub fn register_mp4_ttml<D, F>(registry: &mut TextParserRegistry, make_decoder: F)
where
    D: TextPayloadDecoder + 'static,
    F: Fn() -> D + Clone + Send + Sync + 'static,
{
    for mime in MP4_TTML_MIME_TYPES {
        let make = make_decoder.clone();
        registry.register(mime, move || {
            Box::new(Mp4TextExtractor::new(make())) as Box<dyn TextParser>
        });
    }
}
