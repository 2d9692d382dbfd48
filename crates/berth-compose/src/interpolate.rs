//! Environment-variable interpolation for compose scalars.
//!
//! Expands the compose variable grammar against a read-only environment map:
//!
//! | Form | Meaning |
//! |---|---|
//! | `$$` | literal `$` |
//! | `${VAR}` | value of VAR, empty if unset |
//! | `${VAR:-D}` | D if VAR is unset or empty |
//! | `${VAR-D}` | D if VAR is unset (empty is a value) |
//! | `${VAR:+A}` | A if VAR is set and non-empty, else empty |
//! | `${VAR+A}` | A if VAR is set, else empty |
//!
//! A `$` not followed by `{` or `$` (including a trailing `$`) is literal.
//! Nested `${}` is not supported.

use crate::EnvMap;

/// Interpolation failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum InterpolateError {
    /// A `${` with no closing `}`.
    #[error("unterminated variable expression")]
    UnterminatedVariable,
    /// An empty variable name, as in `${}` or `${:-x}`.
    #[error("invalid variable syntax")]
    InvalidVariableSyntax,
}

/// Expand every variable expression in `raw` against `env`.
///
/// Always returns a freshly-allocated string, even when nothing expands.
///
/// # Errors
///
/// Returns [`InterpolateError`] when a variable expression is unterminated or
/// names no variable.
pub fn interpolate(raw: &str, env: &EnvMap) -> Result<String, InterpolateError> {
    let bytes = raw.as_bytes();
    let mut out = String::with_capacity(raw.len());
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] != b'$' {
            // Copy the span up to the next `$` in one shot. `$` is ASCII, so
            // the slice boundaries are always char boundaries.
            let start = i;
            while i < bytes.len() && bytes[i] != b'$' {
                i += 1;
            }
            out.push_str(&raw[start..i]);
            continue;
        }

        match bytes.get(i + 1) {
            Some(b'$') => {
                out.push('$');
                i += 2;
            }
            Some(b'{') => {
                let body_start = i + 2;
                let close = raw[body_start..]
                    .find('}')
                    .ok_or(InterpolateError::UnterminatedVariable)?;
                out.push_str(&expand(&raw[body_start..body_start + close], env)?);
                i = body_start + close + 1;
            }
            // Lone `$`, including a trailing one.
            _ => {
                out.push('$');
                i += 1;
            }
        }
    }

    Ok(out)
}

/// How an expression reacts to unset / empty variables.
enum Modifier<'a> {
    None,
    /// `:-` — substitute when unset or empty.
    DefaultIfUnsetOrEmpty(&'a str),
    /// `-` — substitute when unset.
    DefaultIfUnset(&'a str),
    /// `:+` — substitute when set and non-empty.
    AltIfSetNonEmpty(&'a str),
    /// `+` — substitute when set.
    AltIfSet(&'a str),
}

/// Expand the body of one `${...}` expression.
fn expand(body: &str, env: &EnvMap) -> Result<String, InterpolateError> {
    // Two-character modifiers take precedence over one-character ones.
    let (name, modifier) = if let Some(p) = body.find(":-") {
        (&body[..p], Modifier::DefaultIfUnsetOrEmpty(&body[p + 2..]))
    } else if let Some(p) = body.find(":+") {
        (&body[..p], Modifier::AltIfSetNonEmpty(&body[p + 2..]))
    } else if let Some(p) = body.find('-') {
        (&body[..p], Modifier::DefaultIfUnset(&body[p + 1..]))
    } else if let Some(p) = body.find('+') {
        (&body[..p], Modifier::AltIfSet(&body[p + 1..]))
    } else {
        (body, Modifier::None)
    };

    if name.is_empty() {
        return Err(InterpolateError::InvalidVariableSyntax);
    }

    let value = env.get(name);
    let expanded = match modifier {
        Modifier::None => value.cloned().unwrap_or_default(),
        Modifier::DefaultIfUnsetOrEmpty(default) => match value {
            Some(v) if !v.is_empty() => v.clone(),
            _ => default.to_string(),
        },
        Modifier::DefaultIfUnset(default) => match value {
            Some(v) => v.clone(),
            None => default.to_string(),
        },
        Modifier::AltIfSetNonEmpty(alt) => match value {
            Some(v) if !v.is_empty() => alt.to_string(),
            _ => String::new(),
        },
        Modifier::AltIfSet(alt) => match value {
            Some(_) => alt.to_string(),
            None => String::new(),
        },
    };
    Ok(expanded)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(pairs: &[(&str, &str)]) -> EnvMap {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_literal_passthrough() {
        let env = EnvMap::new();
        for s in ["", "plain", "no variables here", "a:b/c{d}"] {
            assert_eq!(interpolate(s, &env).unwrap(), s);
        }
    }

    #[test]
    fn test_escape() {
        let env = env(&[("HOME", "/root")]);
        assert_eq!(interpolate("$$", &env).unwrap(), "$");
        assert_eq!(interpolate("$$HOME", &env).unwrap(), "$HOME");
        assert_eq!(interpolate("a$$b$$c", &env).unwrap(), "a$b$c");
    }

    #[test]
    fn test_basic_expansion() {
        let env = env(&[("USER", "alice")]);
        assert_eq!(interpolate("${USER}", &env).unwrap(), "alice");
        assert_eq!(interpolate("hi ${USER}!", &env).unwrap(), "hi alice!");
        assert_eq!(interpolate("${MISSING}", &env).unwrap(), "");
    }

    #[test]
    fn test_default_if_unset_or_empty() {
        let env = env(&[("SET", "v"), ("EMPTY", "")]);
        assert_eq!(interpolate("${SET:-d}", &env).unwrap(), "v");
        assert_eq!(interpolate("${EMPTY:-d}", &env).unwrap(), "d");
        assert_eq!(interpolate("${UNSET:-d}", &env).unwrap(), "d");
        assert_eq!(interpolate("${UNSET:-}", &env).unwrap(), "");
    }

    #[test]
    fn test_default_if_unset() {
        let env = env(&[("SET", "v"), ("EMPTY", "")]);
        assert_eq!(interpolate("${SET-d}", &env).unwrap(), "v");
        assert_eq!(interpolate("${EMPTY-d}", &env).unwrap(), "");
        assert_eq!(interpolate("${UNSET-d}", &env).unwrap(), "d");
    }

    #[test]
    fn test_alt_if_set_non_empty() {
        let env = env(&[("SET", "v"), ("EMPTY", "")]);
        assert_eq!(interpolate("${SET:+a}", &env).unwrap(), "a");
        assert_eq!(interpolate("${EMPTY:+a}", &env).unwrap(), "");
        assert_eq!(interpolate("${UNSET:+a}", &env).unwrap(), "");
    }

    #[test]
    fn test_alt_if_set() {
        let env = env(&[("SET", "v"), ("EMPTY", "")]);
        assert_eq!(interpolate("${SET+a}", &env).unwrap(), "a");
        assert_eq!(interpolate("${EMPTY+a}", &env).unwrap(), "a");
        assert_eq!(interpolate("${UNSET+a}", &env).unwrap(), "");
    }

    #[test]
    fn test_two_char_modifier_wins() {
        // `:-` must be matched before `-`.
        let env = env(&[("EMPTY", "")]);
        assert_eq!(interpolate("${EMPTY:-fallback}", &env).unwrap(), "fallback");
        // `:+` must be matched before `+`.
        assert_eq!(interpolate("${EMPTY:+alt}", &env).unwrap(), "");
    }

    #[test]
    fn test_lone_dollar_is_literal() {
        let env = EnvMap::new();
        assert_eq!(interpolate("$", &env).unwrap(), "$");
        assert_eq!(interpolate("cost: 5$", &env).unwrap(), "cost: 5$");
        assert_eq!(interpolate("$HOME", &env).unwrap(), "$HOME");
        assert_eq!(interpolate("$(pwd)", &env).unwrap(), "$(pwd)");
    }

    #[test]
    fn test_unterminated() {
        let env = EnvMap::new();
        assert_eq!(
            interpolate("${VAR", &env),
            Err(InterpolateError::UnterminatedVariable)
        );
        assert_eq!(
            interpolate("ok ${VAR:-x", &env),
            Err(InterpolateError::UnterminatedVariable)
        );
    }

    #[test]
    fn test_empty_name_is_invalid() {
        let env = EnvMap::new();
        assert_eq!(
            interpolate("${}", &env),
            Err(InterpolateError::InvalidVariableSyntax)
        );
        assert_eq!(
            interpolate("${:-x}", &env),
            Err(InterpolateError::InvalidVariableSyntax)
        );
        assert_eq!(
            interpolate("${+x}", &env),
            Err(InterpolateError::InvalidVariableSyntax)
        );
    }

    #[test]
    fn test_default_is_not_reinterpolated() {
        // Nested `${}` is unsupported; the default is inserted as written.
        let env = env(&[("INNER", "x")]);
        assert_eq!(interpolate("${UNSET:-$INNER}", &env).unwrap(), "$INNER");
    }

    #[test]
    fn test_multiple_expansions() {
        let env = env(&[("A", "1"), ("B", "2")]);
        assert_eq!(interpolate("${A}-${B}-${C:-3}", &env).unwrap(), "1-2-3");
    }

    #[test]
    fn test_multibyte_text_around_variables() {
        let env = env(&[("NAME", "wörld")]);
        assert_eq!(interpolate("héllo ${NAME}…", &env).unwrap(), "héllo wörld…");
    }
}
