use bmffcues::text::{
    MP4_TTML_MIME_TYPES, TextParser, TextParserRegistry, register_mp4_ttml,
};
use bmffcues::{
    Cue, DocumentDecoder, ExtractMode, Mp4TextExtractor, ParseError, TextPayloadDecoder,
    TimeContext,
};
use std::cell::{Cell, RefCell};

fn boxed(typ: &[u8; 4], payload: &[u8]) -> Vec<u8> {
    let mut v = Vec::new();
    v.extend_from_slice(&((8 + payload.len()) as u32).to_be_bytes());
    v.extend_from_slice(typ);
    v.extend_from_slice(payload);
    v
}

fn full_boxed(typ: &[u8; 4], payload: &[u8]) -> Vec<u8> {
    let mut body = vec![0, 0, 0, 0];
    body.extend_from_slice(payload);
    boxed(typ, &body)
}

/// moov > trak > mdia > minf > stbl > stsd(v0, 1 entry of type `entry`)
fn init_segment(entry: &[u8; 4]) -> Vec<u8> {
    let mut sample_entry = vec![0, 0, 0, 0, 0, 0, 0, 1];
    sample_entry.extend_from_slice(b"http://www.w3.org/ns/ttml\0\0\0");
    let mut stsd_body = 1u32.to_be_bytes().to_vec();
    stsd_body.extend_from_slice(&boxed(entry, &sample_entry));

    let mut stbl = full_boxed(b"stsd", &stsd_body);
    stbl.extend_from_slice(&full_boxed(b"stts", &0u32.to_be_bytes()));

    let mut minf = full_boxed(b"nmhd", &[]);
    minf.extend_from_slice(&boxed(b"stbl", &stbl));

    let mut mdia = full_boxed(b"mdhd", &[0; 20]);
    mdia.extend_from_slice(&full_boxed(b"hdlr", b"\0\0\0\0subt\0\0\0\0\0\0\0\0\0\0\0\0\0"));
    mdia.extend_from_slice(&boxed(b"minf", &minf));

    let mut trak = full_boxed(b"tkhd", &[0; 80]);
    trak.extend_from_slice(&boxed(b"mdia", &mdia));

    let mut moov = full_boxed(b"mvhd", &[0; 96]);
    moov.extend_from_slice(&boxed(b"trak", &trak));

    let mut data = boxed(b"ftyp", b"iso6\0\0\0\0iso6dash");
    data.extend_from_slice(&boxed(b"moov", &moov));
    data
}

fn media_segment(docs: &[&str]) -> Vec<u8> {
    let mut data = boxed(b"styp", b"msdh\0\0\0\0msdh");
    data.extend_from_slice(&boxed(b"moof", &full_boxed(b"mfhd", &1u32.to_be_bytes())));
    for doc in docs {
        data.extend_from_slice(&boxed(b"mdat", doc.as_bytes()));
    }
    data
}

/// Records every payload it is handed.
#[derive(Default)]
struct RecordingDecoder {
    first_calls: Cell<usize>,
    all_calls: Cell<usize>,
    payloads: RefCell<Vec<Vec<u8>>>,
}

impl TextPayloadDecoder for RecordingDecoder {
    fn decode_first_cue(&self, payload: &[u8], time: &TimeContext) -> anyhow::Result<Cue> {
        self.first_calls.set(self.first_calls.get() + 1);
        self.payloads.borrow_mut().push(payload.to_vec());
        Ok(Cue {
            start_time: time.segment_start,
            end_time: time.segment_end,
            payload: String::from_utf8_lossy(payload).into_owned(),
        })
    }

    fn decode_all(&self, payload: &[u8], time: &TimeContext) -> anyhow::Result<Vec<Cue>> {
        self.all_calls.set(self.all_calls.get() + 1);
        self.payloads.borrow_mut().push(payload.to_vec());
        let text = String::from_utf8_lossy(payload);
        Ok(text
            .split('|')
            .map(|p| Cue {
                start_time: time.segment_start,
                end_time: time.segment_end,
                payload: p.to_string(),
            })
            .collect())
    }
}

struct FailingDecoder;

impl TextPayloadDecoder for FailingDecoder {
    fn decode_first_cue(&self, _: &[u8], _: &TimeContext) -> anyhow::Result<Cue> {
        anyhow::bail!("not ttml")
    }

    fn decode_all(&self, _: &[u8], _: &TimeContext) -> anyhow::Result<Vec<Cue>> {
        anyhow::bail!("not ttml")
    }
}

#[test]
fn init_with_stpp_entry_is_accepted() {
    let extractor = Mp4TextExtractor::new(DocumentDecoder);
    extractor
        .parse_init(&init_segment(b"stpp"), false)
        .expect("stpp init rejected");
}

#[test]
fn init_without_stpp_entry_is_invalid() {
    let extractor = Mp4TextExtractor::new(DocumentDecoder);
    let err = extractor
        .parse_init(&init_segment(b"wvtt"), false)
        .unwrap_err();
    assert!(matches!(err, ParseError::InvalidContainer(_)), "{:?}", err);

    let err = extractor.parse_init(&media_segment(&["x"]), false).unwrap_err();
    assert!(matches!(err, ParseError::InvalidContainer(_)));
}

#[test]
fn init_stops_at_stpp_before_trailing_garbage() {
    let mut data = init_segment(b"stpp");
    // would be malformed if it were ever read
    data.extend_from_slice(&1000u32.to_be_bytes());
    data.extend_from_slice(b"free");
    Mp4TextExtractor::new(DocumentDecoder)
        .parse_init(&data, false)
        .unwrap();
}

#[test]
fn partial_init_segment() {
    let full = init_segment(b"stpp");
    // cut inside the stts box that follows stsd
    let data = &full[..full.len() - 10];

    let extractor = Mp4TextExtractor::new(DocumentDecoder);
    assert!(extractor.parse_init(data, true).is_ok());
    let err = extractor.parse_init(data, false).unwrap_err();
    assert!(matches!(err, ParseError::MalformedBox { .. }), "{:?}", err);

    // cut before the sample entry: clean walk, but no entry seen
    let cut = &full[..full.len() - 60];
    let err = extractor.parse_init(cut, true).unwrap_err();
    assert!(matches!(err, ParseError::InvalidContainer(_)), "{:?}", err);

    let err = extractor.parse_init(cut, false).unwrap_err();
    assert!(matches!(err, ParseError::MalformedBox { .. }), "{:?}", err);
}

#[test]
fn partial_init_segment_cut_inside_stsd_header() {
    let full = init_segment(b"stpp");
    let stsd = full.windows(4).position(|w| w == b"stsd").unwrap();
    let payload = stsd + 4;
    let extractor = Mp4TextExtractor::new(DocumentDecoder);

    // inside version/flags, then inside entry_count
    for cut in [payload + 2, payload + 4 + 2] {
        let err = extractor.parse_init(&full[..cut], true).unwrap_err();
        assert!(matches!(err, ParseError::InvalidContainer(_)), "cut {}: {:?}", cut, err);

        let err = extractor.parse_init(&full[..cut], false).unwrap_err();
        assert!(matches!(err, ParseError::MalformedBox { .. }), "cut {}: {:?}", cut, err);
    }
}

#[test]
fn deeply_nested_init_segment_is_rejected() {
    let depth = 5000;
    let mut data = Vec::with_capacity(depth * 8);
    for k in 0..depth {
        data.extend_from_slice(&((8 * (depth - k)) as u32).to_be_bytes());
        data.extend_from_slice(b"moov");
    }
    let err = Mp4TextExtractor::new(DocumentDecoder)
        .parse_init(&data, false)
        .unwrap_err();
    assert!(matches!(err, ParseError::MalformedBox { .. }), "{:?}", err);
}

#[test]
fn first_cue_mode_decodes_only_first_mdat() {
    let decoder = RecordingDecoder::default();
    let extractor = Mp4TextExtractor::new(&decoder);
    let time = TimeContext {
        period_start: 0.0,
        segment_start: 10.0,
        segment_end: 12.0,
    };

    let data = media_segment(&["<tt>one</tt>", "<tt>two</tt>"]);
    let cues = extractor
        .parse_media(&data, &time, ExtractMode::FirstCue)
        .unwrap();

    assert_eq!(decoder.first_calls.get(), 1);
    assert_eq!(decoder.all_calls.get(), 0);
    assert_eq!(*decoder.payloads.borrow(), vec![b"<tt>one</tt>".to_vec()]);
    assert_eq!(cues.len(), 1);
    assert_eq!(cues[0].payload, "<tt>one</tt>");
    assert_eq!(cues[0].start_time, 10.0);
}

#[test]
fn first_cue_mode_never_reads_past_first_mdat() {
    let mut data = media_segment(&["<tt/>"]);
    data.extend_from_slice(&500u32.to_be_bytes());
    data.extend_from_slice(b"mdat");

    let decoder = RecordingDecoder::default();
    let extractor = Mp4TextExtractor::new(&decoder);
    let cues = extractor
        .parse_media(&data, &TimeContext::default(), ExtractMode::FirstCue)
        .unwrap();
    assert_eq!(cues.len(), 1);

    let err = extractor
        .parse_media(&data, &TimeContext::default(), ExtractMode::Full)
        .unwrap_err();
    assert!(matches!(err, ParseError::MalformedBox { .. }));
}

#[test]
fn full_mode_decodes_every_mdat_in_order() {
    let decoder = RecordingDecoder::default();
    let extractor = Mp4TextExtractor::new(&decoder);

    let cues = extractor
        .parse_media(
            &media_segment(&["a|b", "c"]),
            &TimeContext::default(),
            ExtractMode::Full,
        )
        .unwrap();

    assert_eq!(decoder.all_calls.get(), 2);
    assert_eq!(decoder.first_calls.get(), 0);
    let texts: Vec<&str> = cues.iter().map(|c| c.payload.as_str()).collect();
    assert_eq!(texts, vec!["a", "b", "c"]);
}

#[test]
fn media_without_mdat_is_invalid() {
    let extractor = Mp4TextExtractor::new(DocumentDecoder);
    for mode in [ExtractMode::FirstCue, ExtractMode::Full] {
        let err = extractor
            .parse_media(&media_segment(&[]), &TimeContext::default(), mode)
            .unwrap_err();
        assert!(matches!(err, ParseError::InvalidContainer(_)), "{:?}", err);
    }
}

#[test]
fn decoder_failure_is_surfaced() {
    let extractor = Mp4TextExtractor::new(FailingDecoder);
    let err = extractor
        .parse_media(&media_segment(&["x"]), &TimeContext::default(), ExtractMode::Full)
        .unwrap_err();
    match err {
        ParseError::Decode(e) => assert_eq!(e.to_string(), "not ttml"),
        other => panic!("expected Decode, got {:?}", other),
    }
}

#[test]
fn document_decoder_spans_the_segment() {
    let time = TimeContext {
        period_start: 100.0,
        segment_start: 4.0,
        segment_end: 6.0,
    };
    let extractor = Mp4TextExtractor::new(DocumentDecoder);
    let cues = extractor
        .parse_media(&media_segment(&["<tt>hi</tt>\0"]), &time, ExtractMode::Full)
        .unwrap();
    assert_eq!(
        cues,
        vec![Cue {
            start_time: 104.0,
            end_time: 106.0,
            payload: "<tt>hi</tt>".to_string(),
        }]
    );

    let err = extractor
        .parse_media(&boxed(b"mdat", &[0xff, 0xfe]), &time, ExtractMode::Full)
        .unwrap_err();
    assert!(matches!(err, ParseError::Decode(_)));
}

#[test]
fn both_codec_strings_resolve_to_the_extractor() {
    let mut registry = TextParserRegistry::new();
    register_mp4_ttml(&mut registry, || DocumentDecoder);

    for mime in MP4_TTML_MIME_TYPES {
        assert!(registry.is_supported(mime));
        let parser: Box<dyn TextParser> = registry.create(mime).expect("not registered");
        parser.parse_init(&init_segment(b"stpp")).unwrap();
        let cues = parser
            .parse_media(&media_segment(&["<tt/>", "<tt/>"]), &TimeContext::default())
            .unwrap();
        assert_eq!(cues.len(), 2);
    }

    assert!(registry.is_supported(r#"APPLICATION/MP4; CODECS="STPP""#));
    assert!(!registry.is_supported(r#"application/mp4; codecs="wvtt""#));
    assert!(registry.unregister(MP4_TTML_MIME_TYPES[0]));
    assert!(registry.create(MP4_TTML_MIME_TYPES[0]).is_none());
}
