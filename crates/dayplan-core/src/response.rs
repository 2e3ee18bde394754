//! Parsing of raw generation engine replies into candidate blocks.
//!
//! Two layouts are understood:
//! - the JSON object requested by the prompt, optionally inside a fenced
//!   code block or surrounded by prose;
//! - a markdown layout of `HH:MM - HH:MM - Title` lines (or `HH:MM - Title`
//!   carrying a `Duration:` marker) with indented `Description:` /
//!   `Rationale:` bullets and a `## Schedule Rationale` section.
//!
//! Nothing here is trusted. Times stay as strings and task references stay
//! unresolved; [`crate::validate`] decides what survives.

use serde::Deserialize;
use tracing::debug;

use crate::clock::{self, hhmm};

/// Which layout a reply was read as.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyFormat {
    Json,
    Text,
}

/// A block exactly as the engine proposed it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawBlock {
    pub task_id: Option<u32>,
    pub title: String,
    pub start: String,
    pub end: String,
    pub description: Option<String>,
    pub rationale: Option<String>,
}

/// All candidate blocks of one reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawSchedule {
    pub format: ReplyFormat,
    pub blocks: Vec<RawBlock>,
    pub overall_rationale: Option<String>,
}

/// Parse a reply. Never fails: an unreadable reply yields zero blocks.
pub fn parse_response(raw: &str) -> RawSchedule {
    if let Some(schedule) = parse_json(raw) {
        debug!(blocks = schedule.blocks.len(), "parsed JSON reply");
        return schedule;
    }
    let schedule = parse_text(raw);
    debug!(blocks = schedule.blocks.len(), "parsed text reply");
    schedule
}

// ---------------------------------------------------------------------------
// JSON
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum JsonReply {
    Object {
        blocks: Vec<JsonBlock>,
        #[serde(default)]
        overall_rationale: Option<String>,
    },
    Blocks(Vec<JsonBlock>),
}

#[derive(Debug, Deserialize)]
struct JsonBlock {
    #[serde(default)]
    task_id: Option<serde_json::Value>,
    #[serde(default, alias = "task", alias = "name")]
    title: Option<String>,
    #[serde(default, alias = "start_time")]
    start: Option<String>,
    #[serde(default, alias = "end_time")]
    end: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    rationale: Option<String>,
}

impl From<JsonBlock> for RawBlock {
    fn from(b: JsonBlock) -> Self {
        Self {
            task_id: b.task_id.as_ref().and_then(json_task_id),
            title: b.title.unwrap_or_default().trim().to_string(),
            start: b.start.unwrap_or_default(),
            end: b.end.unwrap_or_default(),
            description: non_empty(b.description),
            rationale: non_empty(b.rationale),
        }
    }
}

fn json_task_id(value: &serde_json::Value) -> Option<u32> {
    match value {
        serde_json::Value::Number(n) => n.as_u64().and_then(|n| u32::try_from(n).ok()),
        serde_json::Value::String(s) => s.trim().trim_start_matches('#').parse().ok(),
        _ => None,
    }
}

fn parse_json(raw: &str) -> Option<RawSchedule> {
    json_candidates(raw)
        .into_iter()
        .find_map(|candidate| serde_json::from_str::<JsonReply>(candidate).ok())
        .map(|reply| {
            let (blocks, overall_rationale) = match reply {
                JsonReply::Object {
                    blocks,
                    overall_rationale,
                } => (blocks, overall_rationale),
                JsonReply::Blocks(blocks) => (blocks, None),
            };
            RawSchedule {
                format: ReplyFormat::Json,
                blocks: blocks.into_iter().map(RawBlock::from).collect(),
                overall_rationale: non_empty(overall_rationale),
            }
        })
}

/// Substrings of `raw` that may hold the JSON reply, most specific first.
fn json_candidates(raw: &str) -> Vec<&str> {
    let mut candidates = Vec::new();

    if let Some(fenced) = fenced_body(raw) {
        candidates.push(fenced.trim());
    }
    for (open, close) in [('{', '}'), ('[', ']')] {
        if let (Some(start), Some(end)) = (raw.find(open), raw.rfind(close)) {
            if start < end {
                candidates.push(&raw[start..=end]);
            }
        }
    }
    candidates
}

/// Body of the first fenced code block, without its info string.
fn fenced_body(raw: &str) -> Option<&str> {
    let open = raw.find("```")?;
    let after_fence = &raw[open + 3..];
    let body_start = after_fence.find('\n')? + 1;
    let body = &after_fence[body_start..];
    let close = body.find("```")?;
    Some(&body[..close])
}

// ---------------------------------------------------------------------------
// Text
// ---------------------------------------------------------------------------

const RATIONALE_HEADING: &str = "## schedule rationale";

fn parse_text(raw: &str) -> RawSchedule {
    let lower = raw.to_ascii_lowercase();
    let (schedule_part, overall_rationale) = match lower.find(RATIONALE_HEADING) {
        Some(idx) => {
            let rationale = raw[idx + RATIONALE_HEADING.len()..].trim().to_string();
            (&raw[..idx], non_empty(Some(rationale)))
        }
        None => (raw, None),
    };

    let mut blocks: Vec<RawBlock> = Vec::new();
    for line in schedule_part.lines() {
        let content = strip_bullet(line);
        if content.is_empty() {
            continue;
        }

        if let Some(block) = parse_block_line(content) {
            blocks.push(block);
            continue;
        }

        let Some(last) = blocks.last_mut() else {
            continue;
        };
        if let Some(text) = strip_label(content, "description:") {
            last.description = non_empty(Some(text.to_string()));
        } else if let Some(text) = strip_label(content, "rationale:") {
            last.rationale = non_empty(Some(text.to_string()));
        }
    }

    RawSchedule {
        format: ReplyFormat::Text,
        blocks,
        overall_rationale,
    }
}

/// `HH:MM - HH:MM - Title (Priority: High, Duration: 60 min)`, or the
/// single-time `HH:MM - Title (..., Duration: 60 min)` with the end taken
/// from the duration.
fn parse_block_line(line: &str) -> Option<RawBlock> {
    let (start, rest) = take_time(line)?;
    let rest = rest.trim_start();
    let rest = rest
        .strip_prefix("to ")
        .or_else(|| rest.strip_prefix(['-', '\u{2013}', '\u{2014}']))?
        .trim_start();
    let (end, rest) = match take_time(rest) {
        Some((end, rest)) => (end.to_string(), rest),
        None => (end_from_duration(start, rest)?, rest),
    };

    let mut title = rest
        .trim_start_matches(|c: char| c.is_whitespace() || "-\u{2013}\u{2014}:|".contains(c))
        .trim();
    for marker in ["(Priority", "(priority", "(Duration", "(duration"] {
        if let Some(idx) = title.find(marker) {
            title = title[..idx].trim_end();
        }
    }
    let title = title.trim_matches('*').trim();

    Some(RawBlock {
        title: title.to_string(),
        start: start.to_string(),
        end,
        ..Default::default()
    })
}

fn end_from_duration(start: &str, rest: &str) -> Option<String> {
    const MARKER: &str = "duration:";
    let idx = rest.to_ascii_lowercase().find(MARKER)?;
    let digits: String = rest[idx + MARKER.len()..]
        .trim_start()
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .collect();
    let minutes: i64 = digits.parse().ok()?;
    let end = clock::add_minutes(clock::parse_time(start)?, minutes)?;
    Some(hhmm(end))
}

/// Split a leading time token (`9:00`, `09:00:00`, `1:30 PM`) off `s`.
fn take_time(s: &str) -> Option<(&str, &str)> {
    if !s.starts_with(|c: char| c.is_ascii_digit()) {
        return None;
    }
    let mut end = s
        .find(|c: char| !(c.is_ascii_digit() || c == ':'))
        .unwrap_or(s.len());
    while s[..end].ends_with(':') {
        end -= 1;
    }
    if !s[..end].contains(':') {
        return None;
    }

    let after = &s[end..];
    let trimmed = after.trim_start();
    let meridiem = trimmed.get(..2).map(|m| m.to_ascii_uppercase());
    if matches!(meridiem.as_deref(), Some("AM" | "PM"))
        && !trimmed[2..].starts_with(|c: char| c.is_ascii_alphabetic())
    {
        end += after.len() - trimmed.len() + 2;
    }

    Some((&s[..end], &s[end..]))
}

fn strip_bullet(line: &str) -> &str {
    line.trim()
        .trim_start_matches(|c: char| c.is_whitespace() || "-*#>\u{2022}".contains(c))
        .trim()
}

fn strip_label<'a>(line: &'a str, label: &str) -> Option<&'a str> {
    let head = line.get(..label.len())?;
    head.eq_ignore_ascii_case(label)
        .then(|| line[label.len()..].trim())
}

fn non_empty(s: Option<String>) -> Option<String> {
    s.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}
