//! Subtitle payload parsing
//!
//! The backend serves subtitle payloads as opaque text; the format is
//! sniffed rather than negotiated. ASS event scripts are what the catalog
//! actually stores, with WebVTT and SRT accepted for externally sourced
//! tracks.

use crate::error::{Error, Result};
use crate::types::SubtitleCue;

/// Recognized subtitle payload formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubtitleFormat {
    Ass,
    WebVtt,
    Srt,
}

/// Detect the payload format from its content.
pub fn sniff_format(payload: &str) -> Option<SubtitleFormat> {
    let trimmed = payload.trim_start_matches('\u{feff}').trim_start();

    if trimmed.starts_with("WEBVTT") {
        Some(SubtitleFormat::WebVtt)
    } else if trimmed.starts_with("[Script Info]") || trimmed.contains("\nDialogue:") {
        Some(SubtitleFormat::Ass)
    } else if trimmed.contains("-->") {
        Some(SubtitleFormat::Srt)
    } else {
        None
    }
}

/// Parse a subtitle payload into cue intervals, sorted by start time.
pub fn parse(payload: &str) -> Result<Vec<SubtitleCue>> {
    let format = sniff_format(payload)
        .ok_or_else(|| Error::OverlayLoad("unrecognized subtitle format".to_string()))?;

    let normalized = payload.replace("\r\n", "\n");
    let mut cues = match format {
        SubtitleFormat::Ass => parse_ass(&normalized)?,
        SubtitleFormat::WebVtt => parse_vtt(&normalized)?,
        SubtitleFormat::Srt => parse_srt(&normalized)?,
    };

    cues.sort_by(|a, b| a.start.total_cmp(&b.start));
    Ok(cues)
}

/// Cues that a continuous playthrough would display at `time`.
pub fn active_cues(cues: &[SubtitleCue], time: f64) -> Vec<&SubtitleCue> {
    cues.iter().filter(|c| c.is_active_at(time)).collect()
}

/// Parse an ASS script's `[Events]` section into cues.
fn parse_ass(payload: &str) -> Result<Vec<SubtitleCue>> {
    let mut cues = Vec::new();
    let mut in_events = false;
    let mut fields: Option<AssFields> = None;

    for line in payload.lines() {
        let line = line.trim_end();

        if line.starts_with('[') {
            in_events = line.eq_ignore_ascii_case("[Events]");
            continue;
        }
        if !in_events {
            continue;
        }

        if let Some(rest) = line.strip_prefix("Format:") {
            fields = Some(AssFields::from_format(rest)?);
        } else if let Some(rest) = line.strip_prefix("Dialogue:") {
            let fields = fields
                .as_ref()
                .ok_or_else(|| Error::OverlayLoad("Dialogue before Format line".to_string()))?;
            if let Some(cue) = fields.parse_dialogue(rest)? {
                cues.push(cue);
            }
        }
    }

    Ok(cues)
}

/// Column positions of an ASS `Format:` line
struct AssFields {
    start: usize,
    end: usize,
    text: usize,
    count: usize,
}

impl AssFields {
    fn from_format(rest: &str) -> Result<Self> {
        let names: Vec<&str> = rest.split(',').map(str::trim).collect();
        let index = |name: &str| {
            names
                .iter()
                .position(|n| n.eq_ignore_ascii_case(name))
                .ok_or_else(|| Error::OverlayLoad(format!("ASS format missing {name} field")))
        };

        Ok(Self {
            start: index("Start")?,
            end: index("End")?,
            text: index("Text")?,
            count: names.len(),
        })
    }

    fn parse_dialogue(&self, rest: &str) -> Result<Option<SubtitleCue>> {
        // The Text field is last and may itself contain commas
        let parts: Vec<&str> = rest.splitn(self.count, ',').collect();
        if parts.len() < self.count {
            return Ok(None);
        }

        let start = parse_timestamp(parts[self.start].trim())?;
        let end = parse_timestamp(parts[self.end].trim())?;
        let text = clean_ass_text(parts[self.text]);
        if text.is_empty() {
            return Ok(None);
        }

        Ok(Some(SubtitleCue::new(start, end, text)))
    }
}

/// Strip `{...}` override blocks and normalize ASS escapes.
fn clean_ass_text(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut depth = 0usize;
    let mut chars = raw.trim().chars().peekable();

    while let Some(ch) = chars.next() {
        match ch {
            '{' => depth += 1,
            '}' => depth = depth.saturating_sub(1),
            '\\' if depth == 0 => match chars.peek() {
                Some('N') | Some('n') => {
                    chars.next();
                    out.push('\n');
                }
                Some('h') => {
                    chars.next();
                    out.push(' ');
                }
                _ => out.push(ch),
            },
            _ if depth == 0 => out.push(ch),
            _ => {}
        }
    }

    out
}

/// Parse a WebVTT payload.
fn parse_vtt(payload: &str) -> Result<Vec<SubtitleCue>> {
    let mut blocks = payload.split("\n\n").map(str::trim);

    let header = blocks.next().unwrap_or("");
    if !header.trim_start_matches('\u{feff}').starts_with("WEBVTT") {
        return Err(Error::OverlayLoad("missing WEBVTT header".to_string()));
    }

    let mut cues = Vec::new();
    for block in blocks {
        if block.is_empty()
            || block.starts_with("NOTE")
            || block.starts_with("STYLE")
            || block.starts_with("REGION")
        {
            continue;
        }

        let mut lines = block.lines();
        let mut first = lines.next().unwrap_or("");

        // Optional cue identifier line
        if !first.contains("-->") {
            first = lines.next().unwrap_or("");
        }
        let Some((start_raw, end_raw)) = first.split_once("-->") else {
            continue;
        };

        let start = parse_timestamp(start_raw.trim())?;
        // Cue settings after the end timestamp are dropped
        let end_token = end_raw.trim().split_whitespace().next().unwrap_or("");
        let end = parse_timestamp(end_token)?;

        let text = strip_markup(&lines.collect::<Vec<_>>().join("\n"));
        if !text.is_empty() {
            cues.push(SubtitleCue::new(start, end, text));
        }
    }

    Ok(cues)
}

/// Parse an SRT payload.
fn parse_srt(payload: &str) -> Result<Vec<SubtitleCue>> {
    let mut cues = Vec::new();

    for block in payload.split("\n\n").map(str::trim) {
        if block.is_empty() {
            continue;
        }

        let mut lines = block.lines();
        let mut timing = lines.next().unwrap_or("");

        // The sequence-number line precedes the timing line
        if !timing.contains("-->") {
            timing = lines.next().unwrap_or("");
        }
        let Some((start_raw, end_raw)) = timing.split_once("-->") else {
            continue;
        };

        let start = parse_timestamp(start_raw.trim())?;
        let end = parse_timestamp(end_raw.trim())?;

        let text = strip_markup(&lines.collect::<Vec<_>>().join("\n"));
        if !text.is_empty() {
            cues.push(SubtitleCue::new(start, end, text));
        }
    }

    Ok(cues)
}

/// Parse `H:MM:SS.cs`, `HH:MM:SS,mmm` or `MM:SS.mmm` into seconds.
fn parse_timestamp(raw: &str) -> Result<f64> {
    let normalized = raw.replace(',', ".");
    let parts: Vec<&str> = normalized.split(':').collect();

    let parse_part = |p: &str| -> Result<f64> {
        p.trim()
            .parse()
            .map_err(|_| Error::OverlayLoad(format!("invalid timestamp: {raw}")))
    };

    match parts.as_slice() {
        [m, s] => Ok(parse_part(m)? * 60.0 + parse_part(s)?),
        [h, m, s] => Ok(parse_part(h)? * 3600.0 + parse_part(m)? * 60.0 + parse_part(s)?),
        _ => Err(Error::OverlayLoad(format!("invalid timestamp: {raw}"))),
    }
}

/// Strip `<...>` markup from cue text.
fn strip_markup(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_tag = false;

    for ch in text.chars() {
        match ch {
            '<' => in_tag = true,
            '>' => in_tag = false,
            _ if !in_tag => out.push(ch),
            _ => {}
        }
    }

    out.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    const ASS: &str = "[Script Info]\n\
Title: Test\n\
\n\
[Events]\n\
Format: Layer, Start, End, Style, Name, MarginL, MarginR, MarginV, Effect, Text\n\
Dialogue: 0,0:00:01.50,0:00:04.00,Default,,0,0,0,,{\\pos(640,360)}Hello there\n\
Dialogue: 0,0:00:05.00,0:00:08.25,Default,,0,0,0,,Line one\\NLine two, with comma\n";

    #[test]
    fn test_sniff_formats() {
        assert_eq!(sniff_format("WEBVTT\n\n"), Some(SubtitleFormat::WebVtt));
        assert_eq!(sniff_format(ASS), Some(SubtitleFormat::Ass));
        assert_eq!(
            sniff_format("1\n00:00:01,000 --> 00:00:02,000\nhi"),
            Some(SubtitleFormat::Srt)
        );
        assert_eq!(sniff_format("just some text"), None);
    }

    #[test]
    fn test_parse_ass_events() {
        let cues = parse(ASS).unwrap();
        assert_eq!(cues.len(), 2);
        assert_eq!(cues[0].start, 1.5);
        assert_eq!(cues[0].end, 4.0);
        assert_eq!(cues[0].text, "Hello there");
        assert_eq!(cues[1].text, "Line one\nLine two, with comma");
    }

    #[test]
    fn test_parse_vtt() {
        let vtt = "WEBVTT\n\n\
00:00:00.000 --> 00:00:04.000\n\
First cue\n\n\
id-2\n\
00:00:05.000 --> 00:00:10.000 align:center\n\
<i>Second</i> cue\n";

        let cues = parse(vtt).unwrap();
        assert_eq!(cues.len(), 2);
        assert_eq!(cues[0].text, "First cue");
        assert_eq!(cues[1].start, 5.0);
        assert_eq!(cues[1].text, "Second cue");
    }

    #[test]
    fn test_parse_vtt_skips_notes() {
        let vtt = "WEBVTT\n\n\
NOTE a comment block\n\n\
00:00:01.000 --> 00:00:02.000\n\
Visible\n";

        let cues = parse(vtt).unwrap();
        assert_eq!(cues.len(), 1);
        assert_eq!(cues[0].text, "Visible");
    }

    #[test]
    fn test_parse_srt() {
        let srt = "1\n\
00:00:00,500 --> 00:00:04,000\n\
First subtitle\n\n\
2\n\
00:01:00,000 --> 00:01:02,000\n\
Second\nsubtitle\n";

        let cues = parse(srt).unwrap();
        assert_eq!(cues.len(), 2);
        assert_eq!(cues[0].start, 0.5);
        assert_eq!(cues[1].start, 60.0);
        assert_eq!(cues[1].text, "Second\nsubtitle");
    }

    #[test]
    fn test_timestamp_variants() {
        assert_eq!(parse_timestamp("00:00:05.500").unwrap(), 5.5);
        assert_eq!(parse_timestamp("01:30:00.000").unwrap(), 5400.0);
        assert_eq!(parse_timestamp("05:30.000").unwrap(), 330.0);
        assert_eq!(parse_timestamp("00:00:01,250").unwrap(), 1.25);
        assert!(parse_timestamp("garbage").is_err());
    }

    #[test]
    fn test_cues_sorted_by_start() {
        let ass = "[Events]\n\
Format: Layer, Start, End, Style, Name, MarginL, MarginR, MarginV, Effect, Text\n\
Dialogue: 0,0:00:10.00,0:00:12.00,Default,,0,0,0,,Later\n\
Dialogue: 0,0:00:02.00,0:00:04.00,Default,,0,0,0,,Earlier\n";

        let cues = parse(ass).unwrap();
        assert_eq!(cues[0].text, "Earlier");
        assert_eq!(cues[1].text, "Later");
    }

    #[test]
    fn test_active_cues() {
        let cues = vec![
            SubtitleCue::new(0.0, 5.0, "first"),
            SubtitleCue::new(5.0, 10.0, "second"),
        ];

        let active = active_cues(&cues, 2.5);
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].text, "first");

        assert!(active_cues(&cues, 12.0).is_empty());
    }
}
