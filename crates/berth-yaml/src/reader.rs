//! Cursor over the events of a YAML stream.

use std::collections::VecDeque;

use yaml_rust2::parser::{Event as YamlEvent, MarkedEventReceiver, Parser, Tag as YamlTag};
use yaml_rust2::scanner::{Marker, ScanError, TScalarStyle};

use crate::{Event, Pos, ScalarStyle, SourceEvent, Tag};

/// A malformed-input error from the underlying YAML scanner or parser.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message} at {pos}")]
pub struct YamlError {
    /// Human-readable description of the failure.
    pub message: String,
    /// Where the failure was detected.
    pub pos: Pos,
}

impl From<&ScanError> for YamlError {
    fn from(err: &ScanError) -> Self {
        YamlError {
            message: err.info().to_string(),
            pos: pos_from(*err.marker()),
        }
    }
}

/// Cursor over the typed events of a YAML stream.
///
/// Events are yielded in source order; [`EventReader::next`] returns `None`
/// after the terminal [`Event::StreamEnd`], and an error once the underlying
/// YAML turns out to be malformed. Events preceding the malformed region are
/// still yielded. The reader is single-consumer.
pub struct EventReader {
    events: VecDeque<SourceEvent>,
    error: Option<YamlError>,
}

impl EventReader {
    /// Scan `source` and position the cursor before the first event.
    pub fn new(source: &str) -> Self {
        let mut collector = Collector::default();
        let mut parser = Parser::new(source.chars());
        let error = parser
            .load(&mut collector, true)
            .err()
            .map(|err| YamlError::from(&err));
        Self {
            events: collector.events,
            error,
        }
    }

    /// Scan a raw byte buffer, converting it to UTF-8 lossily first.
    ///
    /// The scanner consumes characters, so invalid UTF-8 cannot pass through
    /// verbatim; each invalid sequence becomes U+FFFD.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self::new(&String::from_utf8_lossy(bytes))
    }

    /// Advance and return the next event.
    ///
    /// # Errors
    ///
    /// Returns [`YamlError`] once the cursor reaches the point where the
    /// input stopped being well-formed YAML.
    pub fn next(&mut self) -> Result<Option<SourceEvent>, YamlError> {
        if let Some(event) = self.events.pop_front() {
            return Ok(Some(event));
        }
        match &self.error {
            Some(err) => Err(err.clone()),
            None => Ok(None),
        }
    }

    /// Collect every remaining event, stopping at the first error.
    pub fn collect_to_vec(mut self) -> Result<Vec<SourceEvent>, YamlError> {
        let mut events = Vec::new();
        while let Some(event) = self.next()? {
            events.push(event);
        }
        Ok(events)
    }
}

impl Iterator for EventReader {
    type Item = Result<SourceEvent, YamlError>;

    fn next(&mut self) -> Option<Self::Item> {
        EventReader::next(self).transpose()
    }
}

#[derive(Default)]
struct Collector {
    events: VecDeque<SourceEvent>,
}

impl MarkedEventReceiver for Collector {
    fn on_event(&mut self, ev: YamlEvent, mark: Marker) {
        let event = match ev {
            YamlEvent::Nothing => return,
            YamlEvent::StreamStart => Event::StreamStart,
            YamlEvent::StreamEnd => Event::StreamEnd,
            YamlEvent::DocumentStart => Event::DocumentStart,
            YamlEvent::DocumentEnd => Event::DocumentEnd,
            YamlEvent::Alias(id) => Event::Alias { anchor: id },
            YamlEvent::Scalar(value, style, aid, tag) => Event::Scalar {
                value,
                style: scalar_style(style),
                anchor: anchor_id(aid),
                tag: tag.map(tag_from),
            },
            YamlEvent::SequenceStart(aid, tag) => Event::SequenceStart {
                anchor: anchor_id(aid),
                tag: tag.map(tag_from),
            },
            YamlEvent::SequenceEnd => Event::SequenceEnd,
            YamlEvent::MappingStart(aid, tag) => Event::MappingStart {
                anchor: anchor_id(aid),
                tag: tag.map(tag_from),
            },
            YamlEvent::MappingEnd => Event::MappingEnd,
        };
        self.events.push_back(SourceEvent {
            event,
            pos: pos_from(mark),
        });
    }
}

/// The scanner reports anchor id 0 for unanchored nodes.
fn anchor_id(aid: usize) -> Option<usize> {
    (aid != 0).then_some(aid)
}

fn scalar_style(style: TScalarStyle) -> ScalarStyle {
    match style {
        TScalarStyle::Plain => ScalarStyle::Plain,
        TScalarStyle::SingleQuoted => ScalarStyle::SingleQuoted,
        TScalarStyle::DoubleQuoted => ScalarStyle::DoubleQuoted,
        TScalarStyle::Literal => ScalarStyle::Literal,
        TScalarStyle::Folded => ScalarStyle::Folded,
        _ => ScalarStyle::Any,
    }
}

fn tag_from(tag: YamlTag) -> Tag {
    Tag {
        handle: tag.handle,
        suffix: tag.suffix,
    }
}

/// Scanner markers report one-indexed lines and zero-indexed columns.
fn pos_from(mark: Marker) -> Pos {
    Pos {
        line: (mark.line() as u32).saturating_sub(1),
        col: mark.col() as u32,
        index: mark.index(),
    }
}
