use crate::boxes::FourCC;
use crate::parser::{self, Flow, ParsedBox, Result};
use std::collections::HashMap;

/// Callback for boxes handed over with a scoped reader.
pub type BoxFn<S> = Box<dyn Fn(&mut ParsedBox<'_>, &mut S) -> Result<Flow> + Send + Sync>;

/// Callback receiving the whole payload of a box as one slice.
pub type DataFn<S> = Box<dyn Fn(&[u8], &mut S) -> Result<Flow> + Send + Sync>;

/// What the traversal does when it meets a registered box type.
pub enum BoxHandler<S> {
    /// Parse the payload as a sequence of child boxes.
    Children,
    /// Read version and flags, then call back with the rest of the payload.
    FullBox(BoxFn<S>),
    /// Call back with a reader over the payload.
    Box(BoxFn<S>),
    /// Sample description box: entry count followed by sample entries, each
    /// re-dispatched by type.
    SampleDescription,
    /// Call back with the payload bytes in one piece.
    AllData(DataFn<S>),
}

impl<S> BoxHandler<S> {
    pub fn name(&self) -> &'static str {
        match self {
            BoxHandler::Children => "children",
            BoxHandler::FullBox(_) => "full_box",
            BoxHandler::Box(_) => "box",
            BoxHandler::SampleDescription => "sample_description",
            BoxHandler::AllData(_) => "all_data",
        }
    }
}

/// Dispatch table from box type to [`BoxHandler`].
///
/// The table is built once and only read while parsing, so one registry can
/// walk any number of buffers. Per-walk state lives in the `S` value passed to
/// [`Registry::parse`] and is handed to every callback.
///
/// ```
/// use bmffcues::{Flow, FourCC, Registry};
///
/// let reg = Registry::<Vec<FourCC>>::new()
///     .with_children(FourCC(*b"moov"))
///     .with_box(FourCC(*b"mvhd"), |b, seen| {
///         seen.push(b.header.typ);
///         Ok(Flow::Continue)
///     });
///
/// let mut seen = Vec::new();
/// reg.parse(&[], false, &mut seen)?;
/// assert!(seen.is_empty());
/// # Ok::<(), bmffcues::ParseError>(())
/// ```
pub struct Registry<S> {
    map: HashMap<FourCC, BoxHandler<S>>,
}

impl<S> Registry<S> {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            map: HashMap::new(),
        }
    }

    /// Add a rule for `typ`, replacing any earlier one.
    pub fn register(&mut self, typ: FourCC, handler: BoxHandler<S>) {
        if let Some(old) = self.map.insert(typ, handler) {
            log::debug!("replacing {} handler for {}", old.name(), typ);
        }
    }

    pub fn with(mut self, typ: FourCC, handler: BoxHandler<S>) -> Self {
        self.register(typ, handler);
        self
    }

    pub fn with_children(self, typ: FourCC) -> Self {
        self.with(typ, BoxHandler::Children)
    }

    pub fn with_sample_description(self, typ: FourCC) -> Self {
        self.with(typ, BoxHandler::SampleDescription)
    }

    pub fn with_box<F>(self, typ: FourCC, f: F) -> Self
    where
        F: Fn(&mut ParsedBox<'_>, &mut S) -> Result<Flow> + Send + Sync + 'static,
    {
        self.with(typ, BoxHandler::Box(Box::new(f)))
    }

    pub fn with_full_box<F>(self, typ: FourCC, f: F) -> Self
    where
        F: Fn(&mut ParsedBox<'_>, &mut S) -> Result<Flow> + Send + Sync + 'static,
    {
        self.with(typ, BoxHandler::FullBox(Box::new(f)))
    }

    pub fn with_all_data<F>(self, typ: FourCC, f: F) -> Self
    where
        F: Fn(&[u8], &mut S) -> Result<Flow> + Send + Sync + 'static,
    {
        self.with(typ, BoxHandler::AllData(Box::new(f)))
    }

    pub fn get(&self, typ: &FourCC) -> Option<&BoxHandler<S>> {
        self.map.get(typ)
    }

    pub fn contains(&self, typ: &FourCC) -> bool {
        self.map.contains_key(typ)
    }

    /// Walk every box in `data`, dispatching registered types.
    ///
    /// With `partial` set, a header cut short at the end of a scope ends that
    /// scope quietly and a box reaching past its scope is clamped to the bytes
    /// present. Returns [`Flow::Stop`] if a handler stopped the walk.
    pub fn parse(&self, data: &[u8], partial: bool, state: &mut S) -> Result<Flow> {
        parser::parse_buffer(self, data, partial, state)
    }
}

impl<S> Default for Registry<S> {
    fn default() -> Self {
        Self::new()
    }
}
