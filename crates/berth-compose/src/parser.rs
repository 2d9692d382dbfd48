//! Event-driven structural parser for compose documents.
//!
//! Recursive descent over the YAML event stream: root keys dispatch to
//! section handlers, service keys dispatch to field handlers, and everything
//! unrecognized is warned about and skipped. Field-level malformations are
//! recorded as error diagnostics and suppress the model at the end of the
//! parse; only malformed YAML and a non-mapping root abort it.

use std::collections::HashMap;

use berth_yaml::{Event, EventReader, Pos, ScalarStyle, SourceEvent, YamlError};
use tracing::{debug, trace};

use crate::diagnostics::Diagnostics;
use crate::interpolate::interpolate;
use crate::model::{
    ComposeFile, Condition, Dependency, Healthcheck, Logging, Port, RestartPolicy, Service,
    VolumeMount,
};
use crate::EnvMap;

/// Aliases may nest through replayed subtrees; anything deeper than this is
/// treated as unresolvable.
const MAX_ALIAS_DEPTH: usize = 16;

/// Outcome of a structural parse.
///
/// `file` is `Some` iff the diagnostics contain no error.
#[derive(Debug, Clone)]
pub struct ParseResult {
    /// The typed model, absent when any error diagnostic was recorded.
    pub file: Option<ComposeFile>,
    /// Diagnostics in encounter order.
    pub diagnostics: Diagnostics,
}

/// Fatal parse failures. Everything else surfaces as diagnostics.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ParseError {
    /// The input is not well-formed YAML.
    #[error(transparent)]
    Yaml(#[from] YamlError),
    /// The document root is not a mapping.
    #[error("document root must be a mapping")]
    InvalidStructure {
        /// Position of the offending root node, when one exists.
        pos: Option<Pos>,
    },
    /// The event stream ended before the document was complete.
    #[error("unexpected end of YAML event stream")]
    UnexpectedEnd,
}

/// Parse a compose document against a read-only environment map.
///
/// # Errors
///
/// Returns [`ParseError`] only for malformed YAML or a non-mapping root;
/// all other malformations are reported through [`ParseResult::diagnostics`].
pub fn parse(source: &str, env: &EnvMap) -> Result<ParseResult, ParseError> {
    Parser::new(source, env).run()
}

/// Parse a raw byte buffer, converting it to UTF-8 lossily first.
///
/// # Errors
///
/// Same contract as [`parse`].
pub fn parse_bytes(bytes: &[u8], env: &EnvMap) -> Result<ParseResult, ParseError> {
    parse(&String::from_utf8_lossy(bytes), env)
}

/// Whether a scalar read by a helper is expanded against the environment.
#[derive(Clone, Copy, PartialEq, Eq)]
enum Expansion {
    Interpolate,
    Verbatim,
}

/// A YAML null: the scanner emits `~` for missing values, and plain `null`
/// spellings resolve the same way. Quoted nulls stay strings.
fn is_null(event: &Event) -> bool {
    match event {
        Event::Scalar {
            value,
            style: ScalarStyle::Plain,
            ..
        } => matches!(value.as_str(), "" | "~" | "null" | "Null" | "NULL"),
        _ => false,
    }
}

struct Parser<'env> {
    cursor: Cursor,
    env: &'env EnvMap,
    diagnostics: Diagnostics,
}

impl<'env> Parser<'env> {
    fn new(source: &str, env: &'env EnvMap) -> Self {
        Self {
            cursor: Cursor::new(EventReader::new(source)),
            env,
            diagnostics: Diagnostics::new(),
        }
    }

    fn run(mut self) -> Result<ParseResult, ParseError> {
        debug!("parsing compose document");

        // StreamStart, then the first DocumentStart. An input with no
        // document at all has no mapping root either.
        loop {
            match self.cursor.next()?.event {
                Event::StreamStart => continue,
                Event::DocumentStart => break,
                Event::StreamEnd => return Err(ParseError::InvalidStructure { pos: None }),
                _ => return Err(ParseError::UnexpectedEnd),
            }
        }

        let root = self.cursor.next()?;
        if !matches!(root.event, Event::MappingStart { .. }) {
            return Err(ParseError::InvalidStructure {
                pos: Some(root.pos),
            });
        }

        let file = self.parse_root()?;
        self.finish_stream()?;

        let file = if self.diagnostics.has_errors() {
            None
        } else {
            Some(file)
        };
        Ok(ParseResult {
            file,
            diagnostics: self.diagnostics,
        })
    }

    /// Consume the rest of the stream, warning once if further documents
    /// follow the one we parsed.
    fn finish_stream(&mut self) -> Result<(), ParseError> {
        let mut warned = false;
        loop {
            let ev = self.cursor.next()?;
            match ev.event {
                Event::StreamEnd => return Ok(()),
                Event::DocumentStart if !warned => {
                    warned = true;
                    self.diagnostics.warning(
                        Some(ev.pos),
                        "input contains multiple YAML documents; only the first is used",
                    );
                }
                _ => continue,
            }
        }
    }

    fn parse_root(&mut self) -> Result<ComposeFile, ParseError> {
        let mut file = ComposeFile::new();
        loop {
            let ev = self.cursor.next()?;
            let (key, key_pos) = match ev.event {
                Event::MappingEnd => break,
                Event::Scalar { value, .. } => (value, ev.pos),
                other => {
                    self.diagnostics
                        .error(Some(ev.pos), "expected a scalar key at the document root");
                    self.skip_rest_of(&other)?;
                    self.skip_value()?;
                    continue;
                }
            };
            match key.as_str() {
                "services" => self.parse_services(&mut file)?,
                "volumes" => self.parse_named_section(key_pos, "volumes", &mut file.volumes)?,
                "networks" => self.parse_named_section(key_pos, "networks", &mut file.networks)?,
                "name" => file.name = self.string_value("name")?,
                // Obsolete; consumed without comment.
                "version" => self.skip_value()?,
                _ => {
                    self.diagnostics
                        .warning(Some(key_pos), format!("unknown key: {key}"));
                    self.skip_value()?;
                }
            }
        }
        Ok(file)
    }

    /// Parse `volumes:` / `networks:` name maps. Entry bodies are skipped.
    fn parse_named_section<T: Default>(
        &mut self,
        section_pos: Pos,
        section: &str,
        out: &mut indexmap::IndexMap<String, T>,
    ) -> Result<(), ParseError> {
        let ev = self.cursor.next()?;
        match ev.event {
            Event::MappingStart { .. } => {}
            // An empty section is fine.
            ref null if is_null(null) => return Ok(()),
            other => {
                self.diagnostics
                    .error(Some(section_pos), format!("{section} must be a mapping"));
                self.skip_rest_of(&other)?;
                return Ok(());
            }
        }
        loop {
            let ev = self.cursor.next()?;
            match ev.event {
                Event::MappingEnd => break,
                Event::Scalar { value, .. } => {
                    self.skip_value()?;
                    out.insert(value, T::default());
                }
                other => {
                    self.diagnostics
                        .error(Some(ev.pos), format!("expected a name under {section}"));
                    self.skip_rest_of(&other)?;
                    self.skip_value()?;
                }
            }
        }
        Ok(())
    }

    fn parse_services(&mut self, file: &mut ComposeFile) -> Result<(), ParseError> {
        let ev = self.cursor.next()?;
        match ev.event {
            Event::MappingStart { .. } => {}
            ref null if is_null(null) => return Ok(()),
            other => {
                self.diagnostics
                    .error(Some(ev.pos), "services must be a mapping");
                self.skip_rest_of(&other)?;
                return Ok(());
            }
        }
        loop {
            let ev = self.cursor.next()?;
            match ev.event {
                Event::MappingEnd => break,
                Event::Scalar { value, .. } => {
                    let service = self.parse_service(&value, ev.pos)?;
                    file.services.insert(value, service);
                }
                other => {
                    self.diagnostics
                        .error(Some(ev.pos), "expected a service name");
                    self.skip_rest_of(&other)?;
                    self.skip_value()?;
                }
            }
        }
        Ok(())
    }

    fn parse_service(&mut self, name: &str, name_pos: Pos) -> Result<Service, ParseError> {
        trace!(service = name, "parsing service");
        let mut svc = Service::new(name);
        let ev = self.cursor.next()?;
        match ev.event {
            Event::MappingStart { .. } => {}
            // `web:` with no body is an empty service.
            ref null if is_null(null) => return Ok(svc),
            other => {
                self.diagnostics.error(
                    Some(name_pos),
                    format!("service \"{name}\" must be a mapping"),
                );
                self.skip_rest_of(&other)?;
                return Ok(svc);
            }
        }
        loop {
            let ev = self.cursor.next()?;
            let (key, key_pos) = match ev.event {
                Event::MappingEnd => break,
                Event::Scalar { value, .. } => (value, ev.pos),
                other => {
                    self.diagnostics
                        .error(Some(ev.pos), format!("expected a key in service \"{name}\""));
                    self.skip_rest_of(&other)?;
                    self.skip_value()?;
                    continue;
                }
            };
            self.parse_service_field(&mut svc, &key, key_pos)?;
        }
        Ok(svc)
    }

    fn parse_service_field(
        &mut self,
        svc: &mut Service,
        key: &str,
        key_pos: Pos,
    ) -> Result<(), ParseError> {
        match key {
            "image" => svc.image = self.string_value("image")?,
            "ports" => {
                for (item, pos) in self.string_items("ports", Expansion::Interpolate)? {
                    match Port::parse(&item) {
                        Ok(port) => svc.ports.push(port),
                        Err(err) => self
                            .diagnostics
                            .error(Some(pos), format!("invalid port \"{item}\": {err}")),
                    }
                }
            }
            "environment" => self.parse_environment(svc)?,
            "depends_on" => self.parse_depends_on(svc)?,
            "healthcheck" => self.parse_healthcheck(svc)?,
            "volumes" => {
                for (item, pos) in self.string_items("volumes", Expansion::Interpolate)? {
                    match VolumeMount::parse(&item) {
                        Ok(mount) => svc.volumes.push(mount),
                        Err(err) => self
                            .diagnostics
                            .error(Some(pos), format!("invalid volume \"{item}\": {err}")),
                    }
                }
            }
            "command" => svc.command = self.string_list(key)?,
            "entrypoint" => svc.entrypoint = self.string_list(key)?,
            "working_dir" => svc.working_dir = self.string_value(key)?,
            "user" => svc.user = self.string_value(key)?,
            "container_name" => svc.container_name = self.string_value(key)?,
            "hostname" => svc.hostname = self.string_value(key)?,
            "domainname" => svc.domainname = self.string_value(key)?,
            "restart" => {
                if let Some((value, _)) = self.literal_scalar(key)? {
                    svc.restart = RestartPolicy::parse(&value);
                }
            }
            "init" => {
                if let Some(value) = self.bool_value(key)? {
                    svc.run_init = value;
                }
            }
            "read_only" => {
                if let Some(value) = self.bool_value(key)? {
                    svc.read_only = value;
                }
            }
            "privileged" => {
                if let Some(value) = self.bool_value(key)? {
                    svc.privileged = value;
                }
            }
            "stop_signal" => svc.stop_signal = self.string_value(key)?,
            "stop_grace_period" => {
                if let Some(ns) = self.duration_value(key)? {
                    svc.stop_grace_period_ns = ns;
                }
            }
            "expose" => svc.expose = self.string_list(key)?,
            "dns" => svc.dns = self.string_list(key)?,
            "dns_search" => svc.dns_search = self.string_list(key)?,
            "extra_hosts" => svc.extra_hosts = self.string_list(key)?,
            "cap_add" => svc.cap_add = self.string_list(key)?,
            "cap_drop" => svc.cap_drop = self.string_list(key)?,
            "networks" => svc.networks = self.string_list(key)?,
            "labels" => self.parse_labels(svc)?,
            "env_file" => svc.env_file = self.string_list(key)?,
            "mem_limit" => {
                if let Some(bytes) = self.byte_size_value(key)? {
                    svc.mem_limit = Some(bytes);
                }
            }
            "mem_reservation" => {
                if let Some(bytes) = self.byte_size_value(key)? {
                    svc.mem_reservation = Some(bytes);
                }
            }
            "cpus" => {
                if let Some((value, pos)) = self.literal_scalar(key)? {
                    match value.parse::<f64>() {
                        Ok(cpus) => svc.cpus = Some(cpus),
                        Err(_) => self
                            .diagnostics
                            .error(Some(pos), format!("invalid value for cpus: \"{value}\"")),
                    }
                }
            }
            "pids_limit" => {
                if let Some((value, pos)) = self.literal_scalar(key)? {
                    match value.parse::<i64>() {
                        Ok(limit) => svc.pids_limit = Some(limit),
                        Err(_) => self.diagnostics.error(
                            Some(pos),
                            format!("invalid value for pids_limit: \"{value}\""),
                        ),
                    }
                }
            }
            "logging" => self.parse_logging(svc)?,
            _ => {
                self.diagnostics
                    .warning(Some(key_pos), format!("unknown key: {key}"));
                self.skip_value()?;
            }
        }
        Ok(())
    }

    /// Environment accepts a mapping of `KEY: value` or a sequence of
    /// `KEY=VALUE` strings. Values are interpolated in both forms; a missing
    /// mapping value becomes the empty string, and a list entry without `=`
    /// is warned about and dropped.
    fn parse_environment(&mut self, svc: &mut Service) -> Result<(), ParseError> {
        let ev = self.cursor.next()?;
        match ev.event {
            ref null if is_null(null) => {}
            Event::MappingStart { .. } => loop {
                let ev = self.cursor.next()?;
                match ev.event {
                    Event::MappingEnd => break,
                    Event::Scalar { value: key, .. } => {
                        if let Some(value) = self.map_value("environment")? {
                            svc.environment.insert(key, value);
                        }
                    }
                    other => {
                        self.diagnostics
                            .error(Some(ev.pos), "expected an environment variable name");
                        self.skip_rest_of(&other)?;
                        self.skip_value()?;
                    }
                }
            },
            Event::SequenceStart { .. } => loop {
                let ev = self.cursor.next()?;
                match ev.event {
                    Event::SequenceEnd => break,
                    Event::Scalar { value, .. } => match value.split_once('=') {
                        Some((key, raw)) => {
                            let expanded = self.interpolated(raw, ev.pos);
                            svc.environment.insert(key.to_string(), expanded);
                        }
                        None => self.diagnostics.warning(
                            Some(ev.pos),
                            format!("environment entry without '=': {value}"),
                        ),
                    },
                    other => {
                        self.diagnostics
                            .error(Some(ev.pos), "environment entries must be strings");
                        self.skip_rest_of(&other)?;
                    }
                }
            },
            other => {
                self.diagnostics
                    .error(Some(ev.pos), "environment must be a mapping or a list");
                self.skip_rest_of(&other)?;
            }
        }
        Ok(())
    }

    /// Labels accept the same dual form as environment, but list-form values
    /// stay literal and an entry without `=` stores an empty value.
    fn parse_labels(&mut self, svc: &mut Service) -> Result<(), ParseError> {
        let ev = self.cursor.next()?;
        match ev.event {
            ref null if is_null(null) => {}
            Event::MappingStart { .. } => loop {
                let ev = self.cursor.next()?;
                match ev.event {
                    Event::MappingEnd => break,
                    Event::Scalar { value: key, .. } => {
                        if let Some(value) = self.map_value("labels")? {
                            svc.labels.insert(key, value);
                        }
                    }
                    other => {
                        self.diagnostics
                            .error(Some(ev.pos), "expected a label name");
                        self.skip_rest_of(&other)?;
                        self.skip_value()?;
                    }
                }
            },
            Event::SequenceStart { .. } => loop {
                let ev = self.cursor.next()?;
                match ev.event {
                    Event::SequenceEnd => break,
                    Event::Scalar { value, .. } => match value.split_once('=') {
                        Some((key, label)) => {
                            svc.labels.insert(key.to_string(), label.to_string());
                        }
                        None => {
                            svc.labels.insert(value, String::new());
                        }
                    },
                    other => {
                        self.diagnostics
                            .error(Some(ev.pos), "label entries must be strings");
                        self.skip_rest_of(&other)?;
                    }
                }
            },
            other => {
                self.diagnostics
                    .error(Some(ev.pos), "labels must be a mapping or a list");
                self.skip_rest_of(&other)?;
            }
        }
        Ok(())
    }

    /// `depends_on` accepts a sequence of service names (condition defaults
    /// to started) or a mapping of name to a body carrying `condition`.
    fn parse_depends_on(&mut self, svc: &mut Service) -> Result<(), ParseError> {
        let ev = self.cursor.next()?;
        match ev.event {
            ref null if is_null(null) => {}
            Event::SequenceStart { .. } => loop {
                let ev = self.cursor.next()?;
                match ev.event {
                    Event::SequenceEnd => break,
                    Event::Scalar { value, .. } => {
                        let service = self.interpolated(&value, ev.pos);
                        svc.depends_on.push(Dependency {
                            service,
                            condition: Condition::default(),
                        });
                    }
                    other => {
                        self.diagnostics
                            .error(Some(ev.pos), "depends_on entries must be service names");
                        self.skip_rest_of(&other)?;
                    }
                }
            },
            Event::MappingStart { .. } => loop {
                let ev = self.cursor.next()?;
                match ev.event {
                    Event::MappingEnd => break,
                    Event::Scalar { value: name, .. } => {
                        let condition = self.parse_dependency_body(&name)?;
                        svc.depends_on.push(Dependency {
                            service: name,
                            condition,
                        });
                    }
                    other => {
                        self.diagnostics
                            .error(Some(ev.pos), "expected a service name under depends_on");
                        self.skip_rest_of(&other)?;
                        self.skip_value()?;
                    }
                }
            },
            other => {
                self.diagnostics
                    .error(Some(ev.pos), "depends_on must be a list or a mapping");
                self.skip_rest_of(&other)?;
            }
        }
        Ok(())
    }

    fn parse_dependency_body(&mut self, dependency: &str) -> Result<Condition, ParseError> {
        let mut condition = Condition::default();
        let ev = self.cursor.next()?;
        match ev.event {
            // `db:` with no body keeps the default condition.
            ref null if is_null(null) => {}
            Event::Alias { .. } => self.warn_unknown_alias(ev.pos),
            Event::MappingStart { .. } => loop {
                let ev = self.cursor.next()?;
                match ev.event {
                    Event::MappingEnd => break,
                    Event::Scalar { value: key, .. } if key == "condition" => {
                        if let Some((value, pos)) = self.literal_scalar("condition")? {
                            match Condition::parse(&value) {
                                Some(parsed) => condition = parsed,
                                None => self.diagnostics.warning(
                                    Some(pos),
                                    format!("unknown condition: {value}"),
                                ),
                            }
                        }
                    }
                    Event::Scalar { value: key, .. } => {
                        self.diagnostics
                            .warning(Some(ev.pos), format!("unknown key: {key}"));
                        self.skip_value()?;
                    }
                    other => {
                        self.diagnostics.error(
                            Some(ev.pos),
                            format!("expected a key under depends_on.{dependency}"),
                        );
                        self.skip_rest_of(&other)?;
                        self.skip_value()?;
                    }
                }
            },
            other => {
                self.diagnostics.error(
                    Some(ev.pos),
                    format!("depends_on.{dependency} must be a mapping"),
                );
                self.skip_rest_of(&other)?;
            }
        }
        Ok(condition)
    }

    fn parse_healthcheck(&mut self, svc: &mut Service) -> Result<(), ParseError> {
        let mut hc = Healthcheck::default();
        let ev = self.cursor.next()?;
        match ev.event {
            Event::MappingStart { .. } => {}
            ref null if is_null(null) => return Ok(()),
            other => {
                self.diagnostics
                    .error(Some(ev.pos), "healthcheck must be a mapping");
                self.skip_rest_of(&other)?;
                return Ok(());
            }
        }
        loop {
            let ev = self.cursor.next()?;
            let (key, key_pos) = match ev.event {
                Event::MappingEnd => break,
                Event::Scalar { value, .. } => (value, ev.pos),
                other => {
                    self.diagnostics
                        .error(Some(ev.pos), "expected a key in healthcheck");
                    self.skip_rest_of(&other)?;
                    self.skip_value()?;
                    continue;
                }
            };
            match key.as_str() {
                // Probe words are stored verbatim; no interpolation, no
                // shell tokenization.
                "test" => {
                    hc.test_cmd = self
                        .string_items("test", Expansion::Verbatim)?
                        .into_iter()
                        .map(|(item, _)| item)
                        .collect();
                }
                "interval" => {
                    if let Some(ns) = self.duration_value("interval")? {
                        hc.interval_ns = ns;
                    }
                }
                "timeout" => {
                    if let Some(ns) = self.duration_value("timeout")? {
                        hc.timeout_ns = ns;
                    }
                }
                "start_period" => {
                    if let Some(ns) = self.duration_value("start_period")? {
                        hc.start_period_ns = ns;
                    }
                }
                "retries" => {
                    if let Some((value, pos)) = self.literal_scalar("retries")? {
                        match value.parse::<u32>() {
                            Ok(retries) => hc.retries = retries,
                            Err(_) => self.diagnostics.error(
                                Some(pos),
                                format!("invalid value for retries: \"{value}\""),
                            ),
                        }
                    }
                }
                _ => {
                    self.diagnostics
                        .warning(Some(key_pos), format!("unknown key: {key}"));
                    self.skip_value()?;
                }
            }
        }
        svc.healthcheck = Some(hc);
        Ok(())
    }

    fn parse_logging(&mut self, svc: &mut Service) -> Result<(), ParseError> {
        let mut logging = Logging::default();
        let ev = self.cursor.next()?;
        match ev.event {
            Event::MappingStart { .. } => {}
            ref null if is_null(null) => return Ok(()),
            other => {
                self.diagnostics
                    .error(Some(ev.pos), "logging must be a mapping");
                self.skip_rest_of(&other)?;
                return Ok(());
            }
        }
        loop {
            let ev = self.cursor.next()?;
            let (key, key_pos) = match ev.event {
                Event::MappingEnd => break,
                Event::Scalar { value, .. } => (value, ev.pos),
                other => {
                    self.diagnostics
                        .error(Some(ev.pos), "expected a key in logging");
                    self.skip_rest_of(&other)?;
                    self.skip_value()?;
                    continue;
                }
            };
            match key.as_str() {
                "driver" => logging.driver = self.string_value("driver")?,
                "options" => {
                    let ev = self.cursor.next()?;
                    match ev.event {
                        ref null if is_null(null) => {}
                        Event::MappingStart { .. } => loop {
                            let ev = self.cursor.next()?;
                            match ev.event {
                                Event::MappingEnd => break,
                                Event::Scalar { value: option, .. } => {
                                    if let Some(value) = self.map_value("logging options")? {
                                        logging.options.insert(option, value);
                                    }
                                }
                                other => {
                                    self.diagnostics
                                        .error(Some(ev.pos), "expected a logging option name");
                                    self.skip_rest_of(&other)?;
                                    self.skip_value()?;
                                }
                            }
                        },
                        other => {
                            self.diagnostics
                                .error(Some(ev.pos), "logging options must be a mapping");
                            self.skip_rest_of(&other)?;
                        }
                    }
                }
                _ => {
                    self.diagnostics
                        .warning(Some(key_pos), format!("unknown key: {key}"));
                    self.skip_value()?;
                }
            }
        }
        svc.logging = Some(logging);
        Ok(())
    }

    /// Interpolate `raw`, downgrading interpolation failures to error
    /// diagnostics and keeping the raw text.
    fn interpolated(&mut self, raw: &str, pos: Pos) -> String {
        match interpolate(raw, self.env) {
            Ok(expanded) => expanded,
            Err(err) => {
                self.diagnostics
                    .error(Some(pos), format!("{err} in \"{raw}\""));
                raw.to_string()
            }
        }
    }

    /// Read one node that must be a string scalar. Returns `None` when the
    /// node is null (the field stays unset) or has the wrong shape (with a
    /// diagnostic already recorded).
    fn string_value(&mut self, field: &str) -> Result<Option<String>, ParseError> {
        let ev = self.cursor.next()?;
        match ev.event {
            ref null if is_null(null) => Ok(None),
            Event::Scalar { value, .. } => Ok(Some(self.interpolated(&value, ev.pos))),
            Event::Alias { .. } => {
                self.warn_unknown_alias(ev.pos);
                Ok(None)
            }
            other => {
                self.diagnostics
                    .error(Some(ev.pos), format!("{field} must be a string"));
                self.skip_rest_of(&other)?;
                Ok(None)
            }
        }
    }

    /// Like [`Parser::string_value`], but a null value becomes the empty
    /// string. Used for mapping-form environment, labels, and logging
    /// options, where `KEY:` with no value is an empty entry.
    fn map_value(&mut self, field: &str) -> Result<Option<String>, ParseError> {
        let ev = self.cursor.next()?;
        match ev.event {
            ref null if is_null(null) => Ok(Some(String::new())),
            Event::Scalar { value, .. } => Ok(Some(self.interpolated(&value, ev.pos))),
            Event::Alias { .. } => {
                self.warn_unknown_alias(ev.pos);
                Ok(None)
            }
            other => {
                self.diagnostics
                    .error(Some(ev.pos), format!("{field} values must be strings"));
                self.skip_rest_of(&other)?;
                Ok(None)
            }
        }
    }

    /// Read one node that must be a scalar, without interpolation. A null
    /// value reads as absent.
    fn literal_scalar(&mut self, field: &str) -> Result<Option<(String, Pos)>, ParseError> {
        let ev = self.cursor.next()?;
        match ev.event {
            ref null if is_null(null) => Ok(None),
            Event::Scalar { value, .. } => Ok(Some((value, ev.pos))),
            Event::Alias { .. } => {
                self.warn_unknown_alias(ev.pos);
                Ok(None)
            }
            other => {
                self.diagnostics
                    .error(Some(ev.pos), format!("{field} must be a scalar"));
                self.skip_rest_of(&other)?;
                Ok(None)
            }
        }
    }

    fn bool_value(&mut self, field: &str) -> Result<Option<bool>, ParseError> {
        let Some((value, pos)) = self.literal_scalar(field)? else {
            return Ok(None);
        };
        match value.as_str() {
            "true" | "True" => Ok(Some(true)),
            "false" | "False" => Ok(Some(false)),
            _ => {
                self.diagnostics.error(
                    Some(pos),
                    format!("invalid boolean for {field}: \"{value}\""),
                );
                Ok(None)
            }
        }
    }

    fn duration_value(&mut self, field: &str) -> Result<Option<u64>, ParseError> {
        let Some((value, pos)) = self.literal_scalar(field)? else {
            return Ok(None);
        };
        match crate::values::parse_duration(&value) {
            Ok(ns) => Ok(Some(ns)),
            Err(err) => {
                self.diagnostics
                    .error(Some(pos), format!("invalid {field} \"{value}\": {err}"));
                Ok(None)
            }
        }
    }

    fn byte_size_value(&mut self, field: &str) -> Result<Option<u64>, ParseError> {
        let Some((value, pos)) = self.literal_scalar(field)? else {
            return Ok(None);
        };
        match crate::values::parse_byte_size(&value) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(err) => {
                self.diagnostics
                    .error(Some(pos), format!("invalid {field} \"{value}\": {err}"));
                Ok(None)
            }
        }
    }

    /// Scalar-or-list helper: a single scalar becomes a one-element list
    /// (never split on whitespace); a sequence contributes its scalars.
    fn string_items(
        &mut self,
        field: &str,
        expansion: Expansion,
    ) -> Result<Vec<(String, Pos)>, ParseError> {
        let mut items = Vec::new();
        let ev = self.cursor.next()?;
        match ev.event {
            ref null if is_null(null) => {}
            Event::Scalar { value, .. } => {
                items.push((self.expand_item(&value, ev.pos, expansion), ev.pos));
            }
            Event::SequenceStart { .. } => loop {
                let ev = self.cursor.next()?;
                match ev.event {
                    Event::SequenceEnd => break,
                    Event::Scalar { value, .. } => {
                        items.push((self.expand_item(&value, ev.pos, expansion), ev.pos));
                    }
                    Event::Alias { .. } => self.warn_unknown_alias(ev.pos),
                    other => {
                        self.diagnostics
                            .error(Some(ev.pos), format!("{field} entries must be strings"));
                        self.skip_rest_of(&other)?;
                    }
                }
            },
            Event::Alias { .. } => self.warn_unknown_alias(ev.pos),
            other => {
                self.diagnostics.error(
                    Some(ev.pos),
                    format!("{field} must be a string or a list of strings"),
                );
                self.skip_rest_of(&other)?;
            }
        }
        Ok(items)
    }

    /// [`Parser::string_items`] without positions, for plain string lists.
    fn string_list(&mut self, field: &str) -> Result<Vec<String>, ParseError> {
        Ok(self
            .string_items(field, Expansion::Interpolate)?
            .into_iter()
            .map(|(item, _)| item)
            .collect())
    }

    fn expand_item(&mut self, raw: &str, pos: Pos, expansion: Expansion) -> String {
        match expansion {
            Expansion::Interpolate => self.interpolated(raw, pos),
            Expansion::Verbatim => raw.to_string(),
        }
    }

    fn warn_unknown_alias(&mut self, pos: Pos) {
        self.diagnostics
            .warning(Some(pos), "alias does not reference a known anchor");
    }

    /// Skip one whole value: the next node, including any nested subtree.
    fn skip_value(&mut self) -> Result<(), ParseError> {
        let ev = self.cursor.next()?;
        self.skip_rest_of(&ev.event)
    }

    /// Skip the remainder of a node whose first event was already consumed.
    /// Scalars and aliases are complete; collections are consumed to their
    /// matching close.
    fn skip_rest_of(&mut self, event: &Event) -> Result<(), ParseError> {
        if !event.opens_collection() {
            return Ok(());
        }
        let mut depth = 1usize;
        while depth > 0 {
            let ev = self.cursor.next()?;
            if ev.event.opens_collection() {
                depth += 1;
            } else if ev.event.closes_collection() {
                depth -= 1;
            }
        }
        Ok(())
    }
}

/// Pull cursor over the reader's events, with anchored-subtree replay.
///
/// Every event consumed from the reader lands in `history`; defining events
/// register their anchor id against their history index. When an alias shows
/// up, the recorded subtree replays in place of the alias. Unresolvable
/// aliases (unknown id, active id, excessive depth) fall through to the
/// caller as plain [`Event::Alias`] events.
struct Cursor {
    reader: EventReader,
    history: Vec<SourceEvent>,
    anchors: HashMap<usize, usize>,
    replays: Vec<Replay>,
}

struct Replay {
    next: usize,
    end: usize,
    anchor: usize,
}

impl Cursor {
    fn new(reader: EventReader) -> Self {
        Self {
            reader,
            history: Vec::new(),
            anchors: HashMap::new(),
            replays: Vec::new(),
        }
    }

    fn next(&mut self) -> Result<SourceEvent, ParseError> {
        loop {
            if let Some(frame) = self.replays.last_mut() {
                let ev = self.history[frame.next].clone();
                frame.next += 1;
                if frame.next >= frame.end {
                    self.replays.pop();
                }
                if let Event::Alias { anchor } = ev.event {
                    if self.push_replay(anchor) {
                        continue;
                    }
                }
                return Ok(ev);
            }

            let ev = match self.reader.next()? {
                Some(ev) => ev,
                None => return Err(ParseError::UnexpectedEnd),
            };
            if let Some(id) = ev.event.anchor() {
                self.anchors.entry(id).or_insert(self.history.len());
            }
            self.history.push(ev.clone());
            if let Event::Alias { anchor } = ev.event {
                if self.push_replay(anchor) {
                    continue;
                }
            }
            return Ok(ev);
        }
    }

    /// Begin replaying the subtree recorded for `anchor`. Returns false when
    /// the alias cannot be resolved.
    fn push_replay(&mut self, anchor: usize) -> bool {
        if self.replays.len() >= MAX_ALIAS_DEPTH {
            return false;
        }
        if self.replays.iter().any(|r| r.anchor == anchor) {
            return false;
        }
        let Some(&start) = self.anchors.get(&anchor) else {
            return false;
        };
        let end = self.subtree_end(start);
        self.replays.push(Replay {
            next: start,
            end,
            anchor,
        });
        true
    }

    /// End index (exclusive) of the node recorded at `start`. The node is
    /// always complete: aliases only ever reference fully-consumed subtrees.
    fn subtree_end(&self, start: usize) -> usize {
        if !self.history[start].event.opens_collection() {
            return start + 1;
        }
        let mut depth = 0usize;
        for (i, ev) in self.history.iter().enumerate().skip(start) {
            if ev.event.opens_collection() {
                depth += 1;
            } else if ev.event.closes_collection() {
                depth -= 1;
                if depth == 0 {
                    return i + 1;
                }
            }
        }
        debug_assert!(false, "anchored subtree not fully recorded");
        start + 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::Severity;

    fn parse_ok(source: &str) -> ComposeFile {
        let result = parse(source, &EnvMap::new()).expect("parse should not abort");
        assert!(
            !result.diagnostics.has_errors(),
            "unexpected errors: {:?}",
            result.diagnostics
        );
        result.file.expect("model should be present")
    }

    #[test]
    fn test_root_must_be_mapping() {
        let err = parse("- a\n- b\n", &EnvMap::new()).unwrap_err();
        assert!(matches!(err, ParseError::InvalidStructure { pos: Some(_) }));
        let err = parse("just a scalar\n", &EnvMap::new()).unwrap_err();
        assert!(matches!(err, ParseError::InvalidStructure { .. }));
        let err = parse("", &EnvMap::new()).unwrap_err();
        assert!(matches!(err, ParseError::InvalidStructure { pos: None }));
    }

    #[test]
    fn test_malformed_yaml_propagates() {
        let err = parse("key: \"unclosed\n", &EnvMap::new()).unwrap_err();
        assert!(matches!(err, ParseError::Yaml(_)));
    }

    #[test]
    fn test_version_is_consumed_silently() {
        let file = parse_ok("version: \"3.9\"\nservices: {}\n");
        assert!(file.services.is_empty());
    }

    #[test]
    fn test_unknown_root_key_warns() {
        let result = parse("banana: 1\nservices: {}\n", &EnvMap::new()).unwrap();
        assert!(result.file.is_some());
        let diags: Vec<_> = result.diagnostics.iter().collect();
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].severity, Severity::Warning);
        assert!(diags[0].message.contains("unknown key: banana"));
    }

    #[test]
    fn test_extension_keys_warn_like_unknown_keys() {
        // `x-` prefixed keys get no special treatment: warned and skipped.
        let result = parse(
            "x-defaults:\n  logging:\n    driver: json-file\nservices: {}\n",
            &EnvMap::new(),
        )
        .unwrap();
        assert!(result.file.is_some());
        let diags: Vec<_> = result.diagnostics.iter().collect();
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].severity, Severity::Warning);
        assert!(diags[0].message.contains("unknown key: x-defaults"));
    }

    #[test]
    fn test_top_level_names_are_collected() {
        let file = parse_ok(
            "services: {}\nvolumes:\n  data:\n  cache:\n    driver: local\nnetworks:\n  backend:\n",
        );
        let volumes: Vec<&String> = file.volumes.keys().collect();
        assert_eq!(volumes, vec!["data", "cache"]);
        assert!(file.networks.contains_key("backend"));
    }

    #[test]
    fn test_name_is_interpolated() {
        let mut env = EnvMap::new();
        env.insert("PROJECT".into(), "shop".into());
        let result = parse("name: ${PROJECT}-stack\nservices: {}\n", &env).unwrap();
        assert_eq!(result.file.unwrap().name.as_deref(), Some("shop-stack"));
    }

    #[test]
    fn test_service_scalar_fields() {
        let file = parse_ok(
            "services:\n  web:\n    image: nginx\n    working_dir: /srv\n    user: www\n    container_name: front\n    hostname: web\n    domainname: example.com\n    stop_signal: SIGQUIT\n",
        );
        let svc = file.service("web").unwrap();
        assert_eq!(svc.image.as_deref(), Some("nginx"));
        assert_eq!(svc.working_dir.as_deref(), Some("/srv"));
        assert_eq!(svc.user.as_deref(), Some("www"));
        assert_eq!(svc.container_name.as_deref(), Some("front"));
        assert_eq!(svc.hostname.as_deref(), Some("web"));
        assert_eq!(svc.domainname.as_deref(), Some("example.com"));
        assert_eq!(svc.stop_signal.as_deref(), Some("SIGQUIT"));
    }

    #[test]
    fn test_command_scalar_is_not_split() {
        let file = parse_ok("services:\n  web:\n    command: nginx -g 'daemon off;'\n");
        assert_eq!(
            file.service("web").unwrap().command,
            vec!["nginx -g 'daemon off;'"]
        );
    }

    #[test]
    fn test_command_list() {
        let file = parse_ok("services:\n  web:\n    entrypoint: [sh, -c, run]\n");
        assert_eq!(file.service("web").unwrap().entrypoint, vec!["sh", "-c", "run"]);
    }

    #[test]
    fn test_flags_and_limits() {
        let file = parse_ok(
            "services:\n  app:\n    init: true\n    read_only: true\n    privileged: false\n    stop_grace_period: 1m30s\n    mem_limit: 512m\n    mem_reservation: 256m\n    cpus: 1.5\n    pids_limit: 100\n",
        );
        let svc = file.service("app").unwrap();
        assert!(svc.run_init);
        assert!(svc.read_only);
        assert!(!svc.privileged);
        assert_eq!(svc.stop_grace_period_ns, 90 * crate::model::NS_PER_SEC);
        assert_eq!(svc.mem_limit, Some(512 * 1024 * 1024));
        assert_eq!(svc.mem_reservation, Some(256 * 1024 * 1024));
        assert_eq!(svc.cpus, Some(1.5));
        assert_eq!(svc.pids_limit, Some(100));
    }

    #[test]
    fn test_invalid_boolean_is_an_error() {
        let result = parse(
            "services:\n  app:\n    image: a\n    init: maybe\n",
            &EnvMap::new(),
        )
        .unwrap();
        assert!(result.diagnostics.has_errors());
        assert!(result.file.is_none());
    }

    #[test]
    fn test_string_lists() {
        let file = parse_ok(
            "services:\n  app:\n    dns: 8.8.8.8\n    dns_search: [a.example, b.example]\n    cap_add: [NET_ADMIN]\n    cap_drop: [ALL]\n    expose:\n      - \"8080\"\n    extra_hosts:\n      - host.docker.internal:host-gateway\n    networks: [backend]\n    env_file:\n      - .env\n      - .env.local\n",
        );
        let svc = file.service("app").unwrap();
        assert_eq!(svc.dns, vec!["8.8.8.8"]);
        assert_eq!(svc.dns_search, vec!["a.example", "b.example"]);
        assert_eq!(svc.cap_add, vec!["NET_ADMIN"]);
        assert_eq!(svc.cap_drop, vec!["ALL"]);
        assert_eq!(svc.expose, vec!["8080"]);
        assert_eq!(svc.extra_hosts, vec!["host.docker.internal:host-gateway"]);
        assert_eq!(svc.networks, vec!["backend"]);
        assert_eq!(svc.env_file, vec![".env", ".env.local"]);
    }

    #[test]
    fn test_environment_mapping_with_missing_value() {
        let file = parse_ok("services:\n  app:\n    environment:\n      EMPTY:\n      SET: x\n");
        let svc = file.service("app").unwrap();
        assert_eq!(svc.environment.get("EMPTY").map(String::as_str), Some(""));
        assert_eq!(svc.environment.get("SET").map(String::as_str), Some("x"));
    }

    #[test]
    fn test_environment_list_form() {
        let mut env = EnvMap::new();
        env.insert("TOKEN".into(), "t0ps3cret".into());
        let result = parse(
            "services:\n  app:\n    environment:\n      - API_TOKEN=${TOKEN}\n      - PLAIN=1\n      - MALFORMED\n",
            &env,
        )
        .unwrap();
        let file = result.file.expect("warnings only");
        let svc = file.service("app").unwrap();
        assert_eq!(
            svc.environment.get("API_TOKEN").map(String::as_str),
            Some("t0ps3cret")
        );
        assert_eq!(svc.environment.get("PLAIN").map(String::as_str), Some("1"));
        assert!(!svc.environment.contains_key("MALFORMED"));
        assert!(result
            .diagnostics
            .iter()
            .any(|d| d.severity == Severity::Warning && d.message.contains("MALFORMED")));
    }

    #[test]
    fn test_labels_list_form_is_literal() {
        let mut env = EnvMap::new();
        env.insert("V".into(), "expanded".into());
        let result = parse(
            "services:\n  app:\n    labels:\n      - com.example.raw=${V}\n      - com.example.flag\n",
            &env,
        )
        .unwrap();
        let file = result.file.unwrap();
        let svc = file.service("app").unwrap();
        assert_eq!(
            svc.labels.get("com.example.raw").map(String::as_str),
            Some("${V}")
        );
        assert_eq!(
            svc.labels.get("com.example.flag").map(String::as_str),
            Some("")
        );
    }

    #[test]
    fn test_labels_mapping_form_interpolates() {
        let mut env = EnvMap::new();
        env.insert("V".into(), "expanded".into());
        let result = parse(
            "services:\n  app:\n    labels:\n      com.example.v: ${V}\n",
            &env,
        )
        .unwrap();
        let file = result.file.unwrap();
        assert_eq!(
            file.service("app").unwrap().labels.get("com.example.v").map(String::as_str),
            Some("expanded")
        );
    }

    #[test]
    fn test_logging() {
        let file = parse_ok(
            "services:\n  app:\n    logging:\n      driver: json-file\n      options:\n        max-size: 10m\n        max-file: \"3\"\n",
        );
        let logging = file.service("app").unwrap().logging.as_ref().unwrap();
        assert_eq!(logging.driver.as_deref(), Some("json-file"));
        let options: Vec<(&String, &String)> = logging.options.iter().collect();
        assert_eq!(options[0].0, "max-size");
        assert_eq!(options[0].1, "10m");
        assert_eq!(options[1].0, "max-file");
        assert_eq!(options[1].1, "3");
    }

    #[test]
    fn test_restart_policies() {
        let file = parse_ok(
            "services:\n  a:\n    restart: always\n  b:\n    restart: on-failure:3\n  c:\n    restart: whenever\n",
        );
        use crate::model::RestartKind;
        assert_eq!(file.service("a").unwrap().restart.kind, RestartKind::Always);
        let b = file.service("b").unwrap();
        assert_eq!(b.restart.kind, RestartKind::OnFailure);
        assert_eq!(b.restart.max_retries, Some(3));
        // Unrecognized input degrades silently to the default.
        assert_eq!(file.service("c").unwrap().restart.kind, RestartKind::No);
    }

    #[test]
    fn test_depends_on_list_form() {
        let file = parse_ok("services:\n  web:\n    depends_on:\n      - db\n      - cache\n");
        let deps = &file.service("web").unwrap().depends_on;
        assert_eq!(deps.len(), 2);
        assert_eq!(deps[0].service, "db");
        assert_eq!(deps[0].condition, Condition::ServiceStarted);
        assert_eq!(deps[1].service, "cache");
    }

    #[test]
    fn test_depends_on_unknown_condition_warns() {
        let result = parse(
            "services:\n  web:\n    depends_on:\n      db:\n        condition: service_reachable\n",
            &EnvMap::new(),
        )
        .unwrap();
        let file = result.file.expect("warnings only");
        let deps = &file.service("web").unwrap().depends_on;
        assert_eq!(deps[0].condition, Condition::ServiceStarted);
        assert!(result
            .diagnostics
            .iter()
            .any(|d| d.message.contains("unknown condition: service_reachable")));
    }

    #[test]
    fn test_unknown_service_key_warns_and_subtree_is_skipped() {
        let result = parse(
            "services:\n  web:\n    image: nginx\n    deploy:\n      replicas: 3\n      resources:\n        limits:\n          cpus: \"0.5\"\n    ports:\n      - \"80:80\"\n",
            &EnvMap::new(),
        )
        .unwrap();
        let file = result.file.expect("warnings only");
        let svc = file.service("web").unwrap();
        assert_eq!(svc.image.as_deref(), Some("nginx"));
        assert_eq!(svc.ports.len(), 1);
        assert_eq!(result.diagnostics.len(), 1);
        assert!(result.diagnostics.iter().next().unwrap().message.contains("deploy"));
    }

    #[test]
    fn test_alias_replays_anchored_subtree() {
        let file = parse_ok(
            "services:\n  a:\n    environment: &common\n      SHARED: \"1\"\n  b:\n    environment: *common\n",
        );
        assert_eq!(
            file.service("b").unwrap().environment.get("SHARED").map(String::as_str),
            Some("1")
        );
    }

    #[test]
    fn test_alias_of_scalar() {
        let file = parse_ok("services:\n  a:\n    image: &img nginx\n  b:\n    image: *img\n");
        assert_eq!(file.service("b").unwrap().image.as_deref(), Some("nginx"));
    }

    #[test]
    fn test_multiple_documents_warn() {
        let result = parse("services: {}\n---\nservices: {}\n", &EnvMap::new()).unwrap();
        assert!(result.file.is_some());
        assert!(result
            .diagnostics
            .iter()
            .any(|d| d.message.contains("multiple YAML documents")));
    }

    #[test]
    fn test_diagnostic_positions_are_non_decreasing() {
        let result = parse(
            "mystery: 1\nservices:\n  web:\n    bogus: x\n    ports:\n      - \"nope\"\n",
            &EnvMap::new(),
        )
        .unwrap();
        let lines: Vec<u32> = result
            .diagnostics
            .iter()
            .filter_map(|d| d.pos.map(|p| p.line))
            .collect();
        let mut sorted = lines.clone();
        sorted.sort_unstable();
        assert_eq!(lines, sorted);
    }

    #[test]
    fn test_service_order_is_preserved() {
        let file = parse_ok(
            "services:\n  zeta:\n    image: a\n  alpha:\n    image: b\n  mid:\n    image: c\n",
        );
        let names: Vec<&String> = file.services.keys().collect();
        assert_eq!(names, vec!["zeta", "alpha", "mid"]);
    }

    #[test]
    fn test_parse_bytes_lossy() {
        let mut bytes = b"services:\n  web:\n    image: nginx\n".to_vec();
        bytes.push(0xFF);
        bytes.extend_from_slice(b"\n");
        // The trailing invalid byte becomes U+FFFD inside an unknown key or
        // trailing garbage; the parse itself must not panic.
        let _ = parse_bytes(&bytes, &EnvMap::new());
    }
}
