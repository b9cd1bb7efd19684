use crate::errors::HeaderError;
use regex::bytes::Regex;
use std::{
    ffi::{OsStr, OsString},
    fmt,
    os::unix::ffi::{OsStrExt, OsStringExt},
    str,
};

/// Mode used when a header line's mode field does not parse
pub const DEFAULT_MODE: u32 = 0o644;

/// Highest value accepted as permission bits, including setuid/setgid/sticky
pub const MAX_MODE: u32 = 0o7777;

/// Longest file name accepted after flattening
pub const MAX_NAME_LEN: usize = 255;

/// Path separators inside names are rewritten to this byte
pub const FLATTEN_BYTE: u8 = b'_';

/// One embedded file: permission bits, byte count, and flattened name
///
/// Names never contain a path separator, so every marker lands as a single
/// file directly inside the content directory.
#[derive(Clone, Eq, PartialEq)]
pub struct Marker {
    mode: u32,
    size: u64,
    name: OsString,
}

impl Marker {
    /// Build a marker from already-decoded fields
    ///
    /// The name is flattened and checked the same way as a parsed header
    /// line; modes outside the permission range fall back to `0644`.
    pub fn new<S: AsRef<OsStr>>(mode: u32, size: u64, name: S) -> Result<Self, HeaderError> {
        Ok(Marker {
            mode: if mode <= MAX_MODE {
                mode
            } else {
                fallback_mode(format_args!("{:o}", mode))
            },
            size,
            name: flatten_name(name.as_ref().as_bytes())?,
        })
    }

    /// Decode one header line, without its trailing newline
    ///
    /// The line is `<octal-mode>@<decimal-size>@<name>`. The name is the
    /// rest of the line and may itself contain `@`.
    pub fn parse(line: &[u8]) -> Result<Self, HeaderError> {
        lazy_static! {
            static ref RE: Regex =
                Regex::new(r"(?s-u)^(?P<mode>[^@]*)@(?P<size>[^@]*)@(?P<name>.*)$").unwrap();
        }
        let captures = RE
            .captures(line)
            .ok_or_else(|| HeaderError::Malformed(String::from_utf8_lossy(line).into_owned()))?;
        let field = |name| captures.name(name).map(|m| m.as_bytes()).unwrap_or(&[]);

        Ok(Marker {
            mode: parse_mode(field("mode")),
            size: parse_size(field("size"))?,
            name: flatten_name(field("name"))?,
        })
    }

    /// Permission bits to apply to the extracted file
    pub fn mode(&self) -> u32 {
        self.mode
    }

    /// Number of payload bytes belonging to this marker
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Flattened file name, a single path component
    pub fn name(&self) -> &OsStr {
        &self.name
    }

    /// Encode as a header line, including the trailing newline
    pub fn to_line(&self) -> Vec<u8> {
        let mut line = format!("{:o}@{}@", self.mode, self.size).into_bytes();
        line.extend_from_slice(self.name.as_bytes());
        line.push(b'\n');
        line
    }
}

impl fmt::Debug for Marker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Marker({:o}, {}, {:?})", self.mode, self.size, self.name)
    }
}

/// Parse octal permission bits, falling back to `0644`
///
/// Anything that isn't octal text within `0o7777` is accepted with a
/// warning. Images built by older tooling depend on this.
pub fn parse_mode(text: &[u8]) -> u32 {
    let parsed = str::from_utf8(text)
        .ok()
        .and_then(|s| u32::from_str_radix(s, 8).ok())
        .filter(|mode| *mode <= MAX_MODE);
    match parsed {
        Some(mode) => mode,
        None => fallback_mode(format_args!("{:?}", String::from_utf8_lossy(text))),
    }
}

fn fallback_mode(found: fmt::Arguments<'_>) -> u32 {
    log::warn!("invalid mode {} in header, using {:o}", found, DEFAULT_MODE);
    DEFAULT_MODE
}

fn parse_size(text: &[u8]) -> Result<u64, HeaderError> {
    let invalid = || HeaderError::InvalidSize(String::from_utf8_lossy(text).into_owned());
    // from_str accepts a leading '+', the format doesn't
    if text.is_empty() || !text.iter().all(u8::is_ascii_digit) {
        return Err(invalid());
    }
    str::from_utf8(text)
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or_else(invalid)
}

/// Rewrite every path separator, then reject names that still aren't safe
///
/// Flattening happens first, so `a/b` becomes `a_b` and `../x` becomes
/// `.._x`. What's left must not be empty, `.`, `..`, contain NUL, or be
/// longer than [MAX_NAME_LEN].
pub fn flatten_name(name: &[u8]) -> Result<OsString, HeaderError> {
    let flat: Vec<u8> = name
        .iter()
        .map(|&b| if b == b'/' { FLATTEN_BYTE } else { b })
        .collect();
    if flat.is_empty() || flat == b"." || flat == b".." || flat.contains(&0) {
        return Err(HeaderError::UnsafeName(OsString::from_vec(flat)));
    }
    if flat.len() > MAX_NAME_LEN {
        return Err(HeaderError::NameTooLong(MAX_NAME_LEN));
    }
    Ok(OsString::from_vec(flat))
}
