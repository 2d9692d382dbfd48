//! Parsers for compose domain values: ports, mounts, durations, byte sizes,
//! restart policies.
//!
//! All of these are small total functions over a scalar's text. The
//! structural parser turns their errors into positioned diagnostics.

use crate::model::{Port, Protocol, RestartKind, RestartPolicy, VolumeMount, NS_PER_SEC};

/// Port mapping parse failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum PortError {
    /// Not of the form `HOST:CONTAINER[/PROTOCOL]`.
    #[error("expected HOST:CONTAINER or HOST:CONTAINER/PROTOCOL")]
    InvalidFormat,
    /// A port was not a number in `0..=65535`.
    #[error("port is not a number in 0..=65535")]
    InvalidNumber,
    /// Protocol other than `tcp` or `udp`.
    #[error("protocol must be tcp or udp")]
    InvalidProtocol,
}

impl Port {
    /// Parse `"H:C"` or `"H:C/PROTO"`. The protocol defaults to `tcp`.
    ///
    /// # Errors
    ///
    /// Returns [`PortError`] describing the malformed part.
    pub fn parse(s: &str) -> Result<Self, PortError> {
        let (mapping, protocol) = match s.split_once('/') {
            Some((mapping, proto)) => {
                let protocol = match proto {
                    "tcp" => Protocol::Tcp,
                    "udp" => Protocol::Udp,
                    _ => return Err(PortError::InvalidProtocol),
                };
                (mapping, protocol)
            }
            None => (s, Protocol::Tcp),
        };
        let (host, container) = mapping.split_once(':').ok_or(PortError::InvalidFormat)?;
        if host.is_empty() || container.is_empty() || container.contains(':') {
            return Err(PortError::InvalidFormat);
        }
        let host = host.parse::<u16>().map_err(|_| PortError::InvalidNumber)?;
        let container = container
            .parse::<u16>()
            .map_err(|_| PortError::InvalidNumber)?;
        Ok(Port {
            host,
            container,
            protocol,
        })
    }
}

/// Volume mount parse failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum VolumeMountError {
    /// Not of the form `SRC:TGT[:ro|:rw]`.
    #[error("expected SOURCE:TARGET with an optional :ro or :rw suffix")]
    InvalidFormat,
}

impl VolumeMount {
    /// Parse `"SRC:TGT"` with an optional trailing `:ro` or `:rw`.
    ///
    /// The access suffix is stripped before the remaining text splits on its
    /// first `:`.
    ///
    /// # Errors
    ///
    /// Returns [`VolumeMountError::InvalidFormat`] when either side of the
    /// mapping is missing.
    pub fn parse(s: &str) -> Result<Self, VolumeMountError> {
        let (body, read_only) = if let Some(stripped) = s.strip_suffix(":ro") {
            (stripped, true)
        } else if let Some(stripped) = s.strip_suffix(":rw") {
            (stripped, false)
        } else {
            (s, false)
        };
        let (source, target) = body
            .split_once(':')
            .ok_or(VolumeMountError::InvalidFormat)?;
        if source.is_empty() || target.is_empty() {
            return Err(VolumeMountError::InvalidFormat);
        }
        Ok(VolumeMount {
            source: source.to_string(),
            target: target.to_string(),
            read_only,
        })
    }
}

/// Duration parse failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum DurationError {
    /// Not a sequence of `<digits><h|m|s>` terms with an optional bare tail.
    #[error("expected a duration like 30s, 1h30m, or a bare number of seconds")]
    InvalidDuration,
}

/// Parse a compose duration into nanoseconds.
///
/// Accepts a left-to-right sequence of `<digits><unit>` terms with units
/// `h`, `m`, `s`; a trailing bare number counts as seconds. `"60"` is 60
/// seconds, `"1h30m"` is 5400 seconds.
///
/// # Errors
///
/// Returns [`DurationError::InvalidDuration`] on empty input, unknown units,
/// units without digits, or overflow.
pub fn parse_duration(s: &str) -> Result<u64, DurationError> {
    if s.is_empty() {
        return Err(DurationError::InvalidDuration);
    }
    let mut total_ns: u64 = 0;
    let mut digits = String::new();
    for c in s.chars() {
        if c.is_ascii_digit() {
            digits.push(c);
            continue;
        }
        let seconds_per_unit: u64 = match c {
            'h' => 3600,
            'm' => 60,
            's' => 1,
            _ => return Err(DurationError::InvalidDuration),
        };
        if digits.is_empty() {
            return Err(DurationError::InvalidDuration);
        }
        let n: u64 = digits
            .parse()
            .map_err(|_| DurationError::InvalidDuration)?;
        digits.clear();
        total_ns = n
            .checked_mul(seconds_per_unit)
            .and_then(|secs| secs.checked_mul(NS_PER_SEC))
            .and_then(|ns| total_ns.checked_add(ns))
            .ok_or(DurationError::InvalidDuration)?;
    }
    if !digits.is_empty() {
        // Trailing bare number: seconds.
        let n: u64 = digits
            .parse()
            .map_err(|_| DurationError::InvalidDuration)?;
        total_ns = n
            .checked_mul(NS_PER_SEC)
            .and_then(|ns| total_ns.checked_add(ns))
            .ok_or(DurationError::InvalidDuration)?;
    }
    Ok(total_ns)
}

/// Byte size parse failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ByteSizeError {
    /// Not digits followed by an optional unit letter.
    #[error("expected a byte size like 512, 64k, 2g")]
    InvalidByteSize,
}

/// Parse a byte size: digits followed by an optional unit letter.
///
/// Units are powers of 1024: `b`, `k`, `m`, `g`, `t` (case-insensitive). No
/// unit means bytes.
///
/// # Errors
///
/// Returns [`ByteSizeError::InvalidByteSize`] on missing digits, unknown
/// units, trailing text, or overflow.
pub fn parse_byte_size(s: &str) -> Result<u64, ByteSizeError> {
    let split = s
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(s.len());
    let (digits, unit) = s.split_at(split);
    if digits.is_empty() {
        return Err(ByteSizeError::InvalidByteSize);
    }
    let factor: u64 = match unit {
        "" => 1,
        "b" | "B" => 1,
        "k" | "K" => 1 << 10,
        "m" | "M" => 1 << 20,
        "g" | "G" => 1 << 30,
        "t" | "T" => 1 << 40,
        _ => return Err(ByteSizeError::InvalidByteSize),
    };
    let n: u64 = digits
        .parse()
        .map_err(|_| ByteSizeError::InvalidByteSize)?;
    n.checked_mul(factor)
        .ok_or(ByteSizeError::InvalidByteSize)
}

impl RestartPolicy {
    /// Parse a restart policy. Total: unrecognized input degrades to the
    /// default policy, and an unparsable retry count in `on-failure:N`
    /// degrades to no cap.
    pub fn parse(s: &str) -> Self {
        match s {
            "no" => RestartPolicy {
                kind: RestartKind::No,
                max_retries: None,
            },
            "always" => RestartPolicy {
                kind: RestartKind::Always,
                max_retries: None,
            },
            "unless-stopped" => RestartPolicy {
                kind: RestartKind::UnlessStopped,
                max_retries: None,
            },
            "on-failure" => RestartPolicy {
                kind: RestartKind::OnFailure,
                max_retries: None,
            },
            _ => match s.strip_prefix("on-failure:") {
                Some(count) => RestartPolicy {
                    kind: RestartKind::OnFailure,
                    max_retries: count.parse().ok(),
                },
                None => RestartPolicy::default(),
            },
        }
    }
}
