//! Log redaction for patient identifiers and secrets.
//!
//! Requests may carry free-form identifiers next to the lab values
//! (`patientId`, `patientName`, record numbers, contact details), and the
//! signing tools handle key material. Formatted log lines pass through
//! [`SanitizingMakeWriter`], which rewrites each line before it reaches the
//! sink.
//!
//! Lab values, parameter names and status labels are left intact; they are
//! what makes the logs useful.
//!
//! Input per call is capped (`BLOODXAI_SANITIZE_MAX_BYTES`, default 16 KiB).

use std::sync::OnceLock;

use regex::{Regex, RegexSet};
use tracing_subscriber::fmt::MakeWriter;

const DEFAULT_SANITIZE_MAX_BYTES: usize = 16 * 1024;
const MAX_BYTES_ENV: &str = "BLOODXAI_SANITIZE_MAX_BYTES";

/// Pattern and the marker that replaces it, in application order.
const RULES: &[(&str, &str)] = &[
    // Identifying request fields, JSON or key=value form
    (
        r#"(?i)"?\b(patient_?id|patient_?name|name|mrn|email|phone|dob|date_?of_?birth)\b"?\s*[:=]\s*"[^"]{0,256}""#,
        r#""$1":"[REDACTED]""#,
    ),
    (
        r"(?i)\b(patient_?id|patient_?name|mrn|dob)\b\s*=\s*[^\s,}]{1,128}",
        "$1=[REDACTED]",
    ),
    // UUIDs (request and patient identifiers)
    (
        r"\b[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}\b",
        "[REDACTED-UUID]",
    ),
    (r"\bMRN[:\s#]?\d{6,10}\b", "[REDACTED-MRN]"),
    (
        r"(?i)\b[a-z0-9](?:[a-z0-9._%+-]{0,62}[a-z0-9])?@(?:[a-z0-9](?:[a-z0-9-]{0,61}[a-z0-9])?\.)+[a-z]{2,}\b",
        "[REDACTED-EMAIL]",
    ),
    (
        r"\b(?:\+?\d{1,3}[-.\s])?\(?\d{3}\)?[-.\s]\d{3}[-.\s]\d{4}\b",
        "[REDACTED-PHONE]",
    ),
    (r"(?i)\bbearer\s+[A-Za-z0-9._~+/-]{16,}=*", "Bearer [REDACTED-TOKEN]"),
    // Signing seeds and verifying keys in base64
    (
        r"(?i)\b(seed|signing[_-]?key|private[_-]?key|pubkey|secret|token)\b\s*[:=]\s*[A-Za-z0-9+/]{32,}={0,2}",
        "$1=[REDACTED-SECRET]",
    ),
    // Long hex runs other than 64-char cache digests
    (r"\b[0-9a-fA-F]{96,}\b", "[REDACTED-KEY]"),
];

struct Redactions {
    any: RegexSet,
    rules: Vec<(Regex, &'static str)>,
}

fn redactions() -> &'static Redactions {
    static REDACTIONS: OnceLock<Redactions> = OnceLock::new();
    REDACTIONS.get_or_init(|| Redactions {
        any: RegexSet::new(RULES.iter().map(|(p, _)| *p)).expect("Valid regex set"),
        rules: RULES
            .iter()
            .map(|(p, r)| (Regex::new(p).expect("Valid regex"), *r))
            .collect(),
    })
}

fn max_sanitize_bytes() -> usize {
    std::env::var(MAX_BYTES_ENV)
        .ok()
        .and_then(|v| v.parse::<usize>().ok())
        .filter(|&v| v > 0)
        .unwrap_or(DEFAULT_SANITIZE_MAX_BYTES)
}

fn char_prefix(input: &str, max_bytes: usize) -> (&str, bool) {
    if input.len() <= max_bytes {
        return (input, false);
    }
    let mut end = max_bytes;
    while end > 0 && !input.is_char_boundary(end) {
        end -= 1;
    }
    (&input[..end], true)
}

/// Redact identifiers and secrets from one piece of text.
#[must_use]
pub fn sanitize(input: &str) -> String {
    sanitize_with_limit(input, max_sanitize_bytes())
}

fn sanitize_with_limit(input: &str, max_bytes: usize) -> String {
    let redactions = redactions();
    let (prefix, truncated) = char_prefix(input, max_bytes);

    let mut out = if redactions.any.is_match(prefix) {
        let hits: Vec<usize> = redactions.any.matches(prefix).into_iter().collect();
        hits.into_iter().fold(prefix.to_string(), |text, idx| {
            let (regex, replacement) = &redactions.rules[idx];
            regex.replace_all(&text, *replacement).into_owned()
        })
    } else {
        prefix.to_string()
    };

    if truncated {
        out.push_str(" [TRUNCATED]");
    }
    out
}

/// Whether the text would be altered by [`sanitize`].
#[must_use]
pub fn contains_pii(input: &str) -> bool {
    let (prefix, _) = char_prefix(input, max_sanitize_bytes());
    redactions().any.is_match(prefix)
}

/// `tracing_subscriber` writer factory that redacts each formatted line.
#[derive(Debug, Clone)]
pub struct SanitizingMakeWriter<M> {
    inner: M,
}

impl<M> SanitizingMakeWriter<M> {
    #[must_use]
    pub fn new(inner: M) -> Self {
        Self { inner }
    }
}

/// Line-buffering writer produced by [`SanitizingMakeWriter`].
pub struct SanitizingWriter<W: std::io::Write> {
    inner: W,
    pending: Vec<u8>,
}

impl<W: std::io::Write> SanitizingWriter<W> {
    fn emit(&mut self, bytes: &[u8]) -> std::io::Result<()> {
        let text = String::from_utf8_lossy(bytes);
        self.inner.write_all(sanitize(&text).as_bytes())
    }

    fn drain_lines(&mut self) -> std::io::Result<()> {
        while let Some(pos) = self.pending.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=pos).collect();
            self.emit(&line)?;
        }
        Ok(())
    }
}

impl<W: std::io::Write> std::io::Write for SanitizingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.pending.extend_from_slice(buf);

        // A line with no newline in sight is emitted early rather than buffered forever.
        if self.pending.len() > max_sanitize_bytes().saturating_mul(2) {
            let pending = std::mem::take(&mut self.pending);
            self.emit(&pending)?;
            self.inner.write_all(b"\n")?;
            return Ok(buf.len());
        }

        self.drain_lines()?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.drain_lines()?;
        if !self.pending.is_empty() {
            let pending = std::mem::take(&mut self.pending);
            self.emit(&pending)?;
        }
        self.inner.flush()
    }
}

impl<W: std::io::Write> Drop for SanitizingWriter<W> {
    fn drop(&mut self) {
        let _ = std::io::Write::flush(self);
    }
}

impl<'a, M> MakeWriter<'a> for SanitizingMakeWriter<M>
where
    M: MakeWriter<'a>,
{
    type Writer = SanitizingWriter<M::Writer>;

    fn make_writer(&'a self) -> Self::Writer {
        SanitizingWriter {
            inner: self.inner.make_writer(),
            pending: Vec::new(),
        }
    }
}
