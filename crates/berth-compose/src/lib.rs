//! Typed model and structural parser for compose documents.
//!
//! The pipeline: `berth-yaml` turns bytes into positioned events, the
//! structural parser walks them with the interpolation engine and the domain
//! value parsers, and the result is a [`ComposeFile`] plus a list of
//! positioned diagnostics — or diagnostics alone when the document has
//! errors.
//!
//! ```
//! use berth_compose::{parse, EnvMap};
//!
//! let source = "services:\n  web:\n    image: nginx\n";
//! let result = parse(source, &EnvMap::new()).unwrap();
//! let file = result.file.unwrap();
//! assert_eq!(file.service("web").unwrap().image.as_deref(), Some("nginx"));
//! ```

use std::collections::HashMap;

pub mod diagnostics;
pub mod interpolate;
pub mod model;
pub mod parser;
pub mod render;
pub mod values;

/// Read-only environment mapping used for interpolation.
pub type EnvMap = HashMap<String, String>;

pub use diagnostics::{Diagnostic, Diagnostics, Severity};
pub use interpolate::{interpolate, InterpolateError};
pub use model::{
    ComposeFile, Condition, Dependency, Healthcheck, Logging, Network, Port, Protocol,
    RestartKind, RestartPolicy, Service, Volume, VolumeMount,
};
pub use parser::{parse, parse_bytes, ParseError, ParseResult};
