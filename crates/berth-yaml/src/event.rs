//! Event types for the YAML event cursor.

use crate::Pos;

/// Events yielded by the reader, in source order.
///
/// Anchors are the scanner's numeric ids; an [`Event::Alias`] references the
/// id carried by its defining event. Collection starts and scalars may carry
/// an explicit tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// Start of the event stream.
    StreamStart,
    /// End of the event stream. No further events follow.
    StreamEnd,
    /// Start of a document.
    DocumentStart,
    /// End of a document.
    DocumentEnd,
    /// Start of a mapping `{ ... }` or block mapping.
    MappingStart {
        /// Anchor id if the mapping is anchored.
        anchor: Option<usize>,
        /// Explicit tag, if any.
        tag: Option<Tag>,
    },
    /// End of a mapping.
    MappingEnd,
    /// Start of a sequence `[ ... ]` or block sequence.
    SequenceStart {
        /// Anchor id if the sequence is anchored.
        anchor: Option<usize>,
        /// Explicit tag, if any.
        tag: Option<Tag>,
    },
    /// End of a sequence.
    SequenceEnd,
    /// A scalar value.
    Scalar {
        /// Scalar text after YAML escape processing.
        value: String,
        /// How the scalar was written in the source.
        style: ScalarStyle,
        /// Anchor id if the scalar is anchored.
        anchor: Option<usize>,
        /// Explicit tag, if any.
        tag: Option<Tag>,
    },
    /// A `*name` reference to an anchored node.
    Alias {
        /// Anchor id of the referenced node.
        anchor: usize,
    },
}

impl Event {
    /// Anchor id carried by this event's defining position, if any.
    pub fn anchor(&self) -> Option<usize> {
        match self {
            Event::MappingStart { anchor, .. }
            | Event::SequenceStart { anchor, .. }
            | Event::Scalar { anchor, .. } => *anchor,
            _ => None,
        }
    }

    /// Whether this event opens a nested node (mapping or sequence).
    pub fn opens_collection(&self) -> bool {
        matches!(self, Event::MappingStart { .. } | Event::SequenceStart { .. })
    }

    /// Whether this event closes a nested node.
    pub fn closes_collection(&self) -> bool {
        matches!(self, Event::MappingEnd | Event::SequenceEnd)
    }
}

/// An event paired with the position where it begins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceEvent {
    /// The event.
    pub event: Event,
    /// Where the event begins in the source.
    pub pos: Pos,
}

/// How a scalar was written in the source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalarStyle {
    /// Unquoted.
    Plain,
    /// Single-quoted `'...'`.
    SingleQuoted,
    /// Double-quoted `"..."`.
    DoubleQuoted,
    /// Block literal `|`.
    Literal,
    /// Block folded `>`.
    Folded,
    /// Style not reported by the scanner.
    Any,
}

/// An explicit YAML tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tag {
    /// Tag handle (e.g. `tag:yaml.org,2002:`).
    pub handle: String,
    /// Tag suffix (e.g. `str`).
    pub suffix: String,
}
