use crate::extract::Segment;

/// Seconds of silence after which a finished sentence may close a paragraph
pub const PARAGRAPH_GAP_SECONDS: f64 = 2.0;

/// Sentence marks after which a finished sentence closes a paragraph regardless of gaps
pub const PARAGRAPH_SENTENCE_LIMIT: usize = 4;

const SENTENCE_TERMINALS: [char; 3] = ['.', '!', '?'];

/// Closing characters that may follow the terminal punctuation of a sentence
const SENTENCE_CLOSERS: [char; 4] = ['"', '\'', ')', '\u{201d}'];

/// Segment texts joined by a single space
pub fn to_plain_text(segments: &[Segment]) -> String {
    segments
        .iter()
        .map(|s| s.text.as_str())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Reflow segments into paragraphs.
///
/// A paragraph only ends after sentence-terminal punctuation, and then only when the next
/// segment starts more than two seconds later or the paragraph already holds four sentences.
pub fn paragraphs(segments: &[Segment]) -> Vec<String> {
    let mut paragraphs = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    let mut sentences = 0;

    for (i, segment) in segments.iter().enumerate() {
        let text = segment.text.trim();
        if !text.is_empty() {
            current.push(text);
            sentences += count_sentence_marks(text);
        }

        let Some(next) = segments.get(i + 1) else {
            break;
        };

        let ends_sentence = current
            .last()
            .map(|t| ends_with_terminal(t))
            .unwrap_or(false);
        if !ends_sentence {
            continue;
        }

        let gap = next.start_seconds - segment.end();
        if gap > PARAGRAPH_GAP_SECONDS || sentences >= PARAGRAPH_SENTENCE_LIMIT {
            paragraphs.push(current.join(" "));
            current.clear();
            sentences = 0;
        }
    }

    if !current.is_empty() {
        paragraphs.push(current.join(" "));
    }

    paragraphs
}

pub fn to_paragraphs(segments: &[Segment]) -> String {
    paragraphs(segments).join("\n\n")
}

pub fn to_srt(segments: &[Segment]) -> String {
    cues(segments, ',')
}

pub fn to_vtt(segments: &[Segment]) -> String {
    format!("WEBVTT\n\n{}", cues(segments, '.'))
}

fn cues(segments: &[Segment], separator: char) -> String {
    segments
        .iter()
        .enumerate()
        .map(|(i, segment)| {
            format!(
                "{}\n{} --> {}\n{}\n",
                i + 1,
                format_timestamp(segment.start_seconds, separator),
                format_timestamp(segment.end(), separator),
                segment.text.trim()
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// `HH:MM:SS<sep>mmm`, rounded to the millisecond
pub fn format_timestamp(seconds: f64, separator: char) -> String {
    let total_ms = (seconds.max(0.0) * 1000.0).round() as u64;
    let hours = total_ms / 3_600_000;
    let minutes = (total_ms % 3_600_000) / 60_000;
    let secs = (total_ms % 60_000) / 1000;
    let millis = total_ms % 1000;

    format!(
        "{:02}:{:02}:{:02}{}{:03}",
        hours, minutes, secs, separator, millis
    )
}

/// Parse `HH:MM:SS,mmm`, `HH:MM:SS.mmm` or `MM:SS.mmm` into seconds
pub fn parse_timestamp(value: &str) -> Option<f64> {
    let value = value.trim().replace(',', ".");
    let parts: Vec<&str> = value.split(':').collect();

    let (hours, minutes, seconds) = match parts.as_slice() {
        [h, m, s] => (h.parse::<u64>().ok()?, m.parse::<u64>().ok()?, *s),
        [m, s] => (0, m.parse::<u64>().ok()?, *s),
        _ => return None,
    };

    let seconds: f64 = seconds.parse().ok()?;
    if !seconds.is_finite() || seconds < 0.0 {
        return None;
    }

    let whole = hours
        .checked_mul(3600)
        .and_then(|h| minutes.checked_mul(60).and_then(|m| h.checked_add(m)))?;

    Some(whole as f64 + seconds)
}

fn ends_with_terminal(text: &str) -> bool {
    text.trim_end_matches(SENTENCE_CLOSERS)
        .ends_with(SENTENCE_TERMINALS)
}

/// Terminal punctuation followed by whitespace or the end of the text, closing quotes
/// and brackets in between allowed.
///
/// Runs such as "..." or "?!" count once; decimals like "3.5" do not count.
fn count_sentence_marks(text: &str) -> usize {
    let chars: Vec<char> = text.chars().collect();
    chars
        .iter()
        .enumerate()
        .filter(|&(i, c)| {
            SENTENCE_TERMINALS.contains(c)
                && chars[i + 1..]
                    .iter()
                    .find(|&&next| !SENTENCE_CLOSERS.contains(&next))
                    .map(|next| next.is_whitespace())
                    .unwrap_or(true)
        })
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seg(text: &str, start: f64, duration: f64) -> Segment {
        Segment::new(text, start, duration)
    }

    #[test]
    fn test_empty_input() {
        assert_eq!(to_plain_text(&[]), "");
        assert_eq!(to_paragraphs(&[]), "");
        assert!(paragraphs(&[]).is_empty());
        assert_eq!(to_srt(&[]), "");
        assert_eq!(to_vtt(&[]), "WEBVTT\n\n");
    }

    #[test]
    fn test_plain_text_keeps_order() {
        let segments = vec![seg("never gonna", 0.0, 1.0), seg("give you up", 1.0, 1.0)];
        let text = to_plain_text(&segments);

        assert_eq!(text, "never gonna give you up");
        let first = text.find("never gonna").unwrap();
        let second = text.find("give you up").unwrap();
        assert!(first < second);
    }

    #[test]
    fn test_paragraph_per_sentence_with_long_gaps() {
        let segments = vec![
            seg("First point.", 0.0, 2.0),
            seg("Second point!", 5.0, 2.0),
            seg("Third point?", 10.0, 2.0),
        ];

        assert_eq!(
            paragraphs(&segments),
            vec!["First point.", "Second point!", "Third point?"]
        );
    }

    #[test]
    fn test_single_paragraph_without_gaps() {
        let segments = vec![
            seg("One sentence.", 0.0, 1.0),
            seg("Another one.", 1.0, 1.0),
            seg("And a third", 2.0, 1.0),
            seg("that ends here.", 3.0, 1.0),
        ];

        assert_eq!(
            paragraphs(&segments),
            vec!["One sentence. Another one. And a third that ends here."]
        );
    }

    #[test]
    fn test_never_breaks_mid_sentence() {
        let segments = vec![
            seg("a long pause follows", 0.0, 1.0),
            seg("but the sentence continues.", 10.0, 1.0),
        ];

        assert_eq!(paragraphs(&segments).len(), 1);
    }

    #[test]
    fn test_sentence_limit_breaks_paragraph() {
        let segments = vec![
            seg("One. Two.", 0.0, 1.0),
            seg("Three. Four.", 1.0, 1.0),
            seg("Five.", 2.0, 1.0),
        ];

        assert_eq!(
            paragraphs(&segments),
            vec!["One. Two. Three. Four.", "Five."]
        );
    }

    #[test]
    fn test_quoted_sentences_reach_sentence_limit() {
        let segments = vec![
            seg("He said \"stop.\"", 0.0, 1.0),
            seg("She said \"go.\"", 1.0, 1.0),
            seg("They asked \"why?\"", 2.0, 1.0),
            seg("We answered \"because.\"", 3.0, 1.0),
            seg("Then silence.", 4.0, 1.0),
        ];

        assert_eq!(
            paragraphs(&segments),
            vec![
                "He said \"stop.\" She said \"go.\" They asked \"why?\" We answered \"because.\"",
                "Then silence."
            ]
        );
    }

    #[test]
    fn test_gap_measured_from_segment_end() {
        // Starts are 3s apart but the silence in between is only 1s
        let segments = vec![seg("Done.", 0.0, 2.0), seg("Next.", 3.0, 1.0)];
        assert_eq!(paragraphs(&segments).len(), 1);
    }

    #[test]
    fn test_sentence_marks() {
        assert_eq!(count_sentence_marks("Wait... what?!"), 2);
        assert_eq!(count_sentence_marks("Version 3.5 is out."), 1);
        assert_eq!(count_sentence_marks("no marks"), 0);
        assert_eq!(count_sentence_marks("He said \"stop.\" Then (he left.)"), 2);
        assert!(ends_with_terminal("He said \"stop.\""));
        assert!(!ends_with_terminal("trailing comma,"));
    }

    #[test]
    fn test_srt_cues() {
        let mut second = seg("second", 3.5, 1.0);
        second.end_seconds = Some(5.25);
        let segments = vec![seg(" first ", 0.0, 2.0), second];

        assert_eq!(
            to_srt(&segments),
            "1\n00:00:00,000 --> 00:00:02,000\nfirst\n\n2\n00:00:03,500 --> 00:00:05,250\nsecond\n"
        );
    }

    #[test]
    fn test_vtt_cues() {
        let segments = vec![seg("hello", 61.0, 1.5)];

        assert_eq!(
            to_vtt(&segments),
            "WEBVTT\n\n1\n00:01:01.000 --> 00:01:02.500\nhello\n"
        );
    }

    #[test]
    fn test_format_timestamp() {
        assert_eq!(format_timestamp(0.0, ','), "00:00:00,000");
        assert_eq!(format_timestamp(3723.456, ','), "01:02:03,456");
        assert_eq!(format_timestamp(1.0006, '.'), "00:00:01.001");
        assert_eq!(format_timestamp(-4.0, ','), "00:00:00,000");
        assert_eq!(format_timestamp(360_000.0, '.'), "100:00:00.000");
    }

    #[test]
    fn test_parse_timestamp() {
        assert!((parse_timestamp("01:02:03,456").unwrap() - 3723.456).abs() < 1e-9);
        assert_eq!(parse_timestamp("00:00:01.500"), Some(1.5));
        assert_eq!(parse_timestamp("02:05.250"), Some(125.25));
        assert_eq!(parse_timestamp("garbage"), None);
        assert_eq!(parse_timestamp("aa:00:01.000"), None);
        assert_eq!(parse_timestamp("9999999999999999999:00:00,000"), None);
        assert_eq!(parse_timestamp("00:99999999999999999999:00.000"), None);
    }
}
