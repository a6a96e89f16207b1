//! Kernel dispatch trace events and their CSV line format
//!
//! A trace batch is a text payload of newline-separated rows:
//!
//! ```text
//! <agent node id>,"<kernel name>",<start timestamp>,<end timestamp>
//! ```
//!
//! Kernel names are quoted because demangled C++ signatures routinely contain
//! commas; an embedded `"` is written as `""`.

use crate::types::agent::{AgentId, NodeId};
use serde::{Deserialize, Serialize};
use std::fmt::{self, Write};
use thiserror::Error;

/// Timestamp in provider monotonic clock units (nanoseconds)
pub type Timestamp = u64;

/// Provider id of a kernel symbol
pub type KernelId = u64;

/// Dispatch record as delivered by the provider, before name resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchRecord {
    pub agent: AgentId,
    pub kernel_id: KernelId,
    pub start_timestamp: Timestamp,
    pub end_timestamp: Timestamp,
}

/// Resolved kernel dispatch timing record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceEvent {
    pub node_id: NodeId,
    pub kernel_name: String,
    pub start_timestamp: Timestamp,
    pub end_timestamp: Timestamp,
}

/// Error parsing a trace line
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TraceLineError {
    #[error("expected 4 fields, found {0}")]
    FieldCount(usize),

    #[error("invalid {field}: {value:?}")]
    InvalidNumber { field: &'static str, value: String },

    #[error("unterminated kernel name quote")]
    UnterminatedQuote,
}

impl TraceEvent {
    /// Kernel execution time, zero if the clock went backwards
    pub fn duration_ns(&self) -> u64 {
        self.end_timestamp.saturating_sub(self.start_timestamp)
    }

    /// Append this event as one CSV row (with trailing newline) to `out`
    pub fn write_line(&self, out: &mut String) {
        write_line(
            out,
            self.node_id,
            &self.kernel_name,
            self.start_timestamp,
            self.end_timestamp,
        );
    }

    /// Parse one CSV row (without the trailing newline)
    pub fn parse_line(line: &str) -> Result<Self, TraceLineError> {
        let line = line.trim_end_matches('\r');
        let (node, rest) = line
            .split_once(',')
            .ok_or_else(|| TraceLineError::FieldCount(1))?;

        let mut tail = rest.rsplitn(3, ',');
        let end = tail.next();
        let start = tail.next();
        let name = tail.next();
        let (name, start, end) = match (name, start, end) {
            (Some(name), Some(start), Some(end)) => (name, start, end),
            (None, Some(_), Some(_)) => return Err(TraceLineError::FieldCount(3)),
            _ => return Err(TraceLineError::FieldCount(2)),
        };

        Ok(Self {
            node_id: parse_number(node, "node id")?,
            kernel_name: unquote(name)?,
            start_timestamp: parse_number(start, "start timestamp")?,
            end_timestamp: parse_number(end, "end timestamp")?,
        })
    }
}

impl fmt::Display for TraceEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut line = String::new();
        self.write_line(&mut line);
        f.write_str(line.trim_end())
    }
}

/// Append one CSV row without building an intermediate `TraceEvent`.
///
/// The buffer-full path uses this to serialize straight from the symbol table
/// without cloning kernel names.
pub fn write_line(out: &mut String, node_id: NodeId, kernel_name: &str, start: Timestamp, end: Timestamp) {
    // Writing into a String cannot fail.
    let _ = write!(out, "{},\"", node_id);
    if kernel_name.contains('"') {
        out.push_str(&kernel_name.replace('"', "\"\""));
    } else {
        out.push_str(kernel_name);
    }
    let _ = writeln!(out, "\",{},{}", start, end);
}

/// Parse a whole batch payload, skipping blank lines
pub fn parse_batch(payload: &str) -> Result<Vec<TraceEvent>, (usize, TraceLineError)> {
    payload
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(idx, line)| TraceEvent::parse_line(line).map_err(|e| (idx + 1, e)))
        .collect()
}

fn parse_number<T: std::str::FromStr>(raw: &str, field: &'static str) -> Result<T, TraceLineError> {
    raw.trim().parse().map_err(|_| TraceLineError::InvalidNumber {
        field,
        value: raw.to_string(),
    })
}

fn unquote(raw: &str) -> Result<String, TraceLineError> {
    match raw.strip_prefix('"') {
        Some(inner) => inner
            .strip_suffix('"')
            .map(|inner| inner.replace("\"\"", "\""))
            .ok_or(TraceLineError::UnterminatedQuote),
        None => Ok(raw.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(name: &str) -> TraceEvent {
        TraceEvent {
            node_id: 4,
            kernel_name: name.to_string(),
            start_timestamp: 1_000,
            end_timestamp: 1_750,
        }
    }

    #[test]
    fn test_write_line_quotes_kernel_name() {
        let mut out = String::new();
        event("vector_add(float*, float const*, int)").write_line(&mut out);
        assert_eq!(out, "4,\"vector_add(float*, float const*, int)\",1000,1750\n");
    }

    #[test]
    fn test_parse_name_with_commas_and_quotes() {
        let original = event("k<\"x\", 3>(int, int)");
        let mut out = String::new();
        original.write_line(&mut out);

        let parsed = TraceEvent::parse_line(out.trim_end()).unwrap();
        assert_eq!(parsed, original);
        assert_eq!(parsed.duration_ns(), 750);
    }

    #[test]
    fn test_parse_unquoted_name() {
        let parsed = TraceEvent::parse_line("0,my_kernel,10,30").unwrap();
        assert_eq!(parsed.kernel_name, "my_kernel");
        assert_eq!(parsed.node_id, 0);
    }

    #[test]
    fn test_parse_rejects_bad_rows() {
        assert_eq!(
            TraceEvent::parse_line("garbage"),
            Err(TraceLineError::FieldCount(1))
        );
        assert_eq!(
            TraceEvent::parse_line("1,\"k\",5"),
            Err(TraceLineError::FieldCount(3))
        );
        assert!(matches!(
            TraceEvent::parse_line("x,\"k\",5,6"),
            Err(TraceLineError::InvalidNumber { field: "node id", .. })
        ));
        assert_eq!(
            TraceEvent::parse_line("1,\"k,5,6"),
            Err(TraceLineError::UnterminatedQuote)
        );
    }

    #[test]
    fn test_parse_batch_reports_line_number() {
        let payload = "1,\"a\",1,2\n\n1,\"b\",oops,2\n";
        let err = parse_batch(payload).unwrap_err();
        assert_eq!(err.0, 3);

        let ok = parse_batch("1,\"a\",1,2\n2,\"b\",3,9\n").unwrap();
        assert_eq!(ok.len(), 2);
        assert_eq!(ok[1].duration_ns(), 6);
    }

    #[test]
    fn test_duration_saturates() {
        let mut e = event("k");
        e.end_timestamp = 10;
        assert_eq!(e.duration_ns(), 0);
    }
}
