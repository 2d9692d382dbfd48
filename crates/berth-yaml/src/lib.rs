//! Positioned event cursor over YAML streams.
//!
//! This crate wraps the `yaml-rust2` streaming parser and exposes a pull
//! cursor of typed events carrying source positions. It is the front end for
//! `berth-compose` (the typed compose model) and deliberately knows nothing
//! about compose semantics: scalar styles, anchors/aliases, and
//! multi-document streams all pass through untouched.

mod event;
mod pos;
mod reader;

pub use event::{Event, ScalarStyle, SourceEvent, Tag};
pub use pos::Pos;
pub use reader::{EventReader, YamlError};
