use serde::de::{Deserializer, MapAccess, Visitor};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::marker::PhantomData;

use crate::client::ClientError;
use crate::output::formatters::parse_timestamp;

/// Language code used when the service does not report one
pub const UNDETERMINED_LANGUAGE: &str = "und";

/// One timed unit of transcript text
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub text: String,

    /// Start time in seconds
    pub start_seconds: f64,

    /// Duration in seconds
    pub duration_seconds: f64,

    /// Explicit end time, when the source provides one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_seconds: Option<f64>,
}

impl Segment {
    pub fn new(text: impl Into<String>, start_seconds: f64, duration_seconds: f64) -> Self {
        Self {
            text: text.into(),
            start_seconds,
            duration_seconds,
            end_seconds: None,
        }
    }

    pub fn end(&self) -> f64 {
        self.end_seconds
            .unwrap_or(self.start_seconds + self.duration_seconds)
    }
}

/// One language's transcript
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptVariant {
    pub language_code: String,
    pub display_name: String,
    pub is_auto_generated: bool,
    pub segments: Vec<Segment>,
}

impl TranscriptVariant {
    pub fn has_content(&self) -> bool {
        self.segments.iter().any(|s| !s.text.trim().is_empty())
    }

    /// End of the last segment in seconds
    pub fn duration(&self) -> f64 {
        self.segments
            .iter()
            .map(Segment::end)
            .fold(0.0, f64::max)
    }
}

/// Every language variant returned by one successful extraction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionResult {
    pub source_id: String,

    /// Variants in response order, language codes unique
    pub variants: Vec<TranscriptVariant>,

    /// Default declared by the server, if any
    pub default_language_code: Option<String>,

    /// Remaining response fields (title, duration, channel...)
    pub metadata: Map<String, Value>,
}

impl ExtractionResult {
    pub fn has_content(&self) -> bool {
        self.variants.iter().any(TranscriptVariant::has_content)
    }

    pub fn language_codes(&self) -> Vec<&str> {
        self.variants
            .iter()
            .map(|v| v.language_code.as_str())
            .collect()
    }

    /// Exact language match, else the first code starting with `code`
    pub fn find_variant_index(&self, code: &str) -> Option<usize> {
        self.variants
            .iter()
            .position(|v| v.language_code == code)
            .or_else(|| {
                self.variants
                    .iter()
                    .position(|v| v.language_code.starts_with(code))
            })
    }

    pub fn find_variant(&self, code: &str) -> Option<&TranscriptVariant> {
        self.find_variant_index(code).map(|i| &self.variants[i])
    }

    /// Language shown first: exact `en`, any `en*`, server default, then first variant
    pub fn preferred_language(&self) -> Option<&str> {
        let by_code = |code: &str| {
            self.variants
                .iter()
                .find(|v| v.language_code == code)
                .map(|v| v.language_code.as_str())
        };

        by_code("en")
            .or_else(|| {
                self.variants
                    .iter()
                    .find(|v| v.language_code.starts_with("en"))
                    .map(|v| v.language_code.as_str())
            })
            .or_else(|| self.default_language_code.as_deref().and_then(by_code))
            .or_else(|| self.variants.first().map(|v| v.language_code.as_str()))
    }

    /// Title from metadata, if the service sent one
    pub fn title(&self) -> Option<&str> {
        self.metadata.get("title").and_then(Value::as_str)
    }
}

/// The two response shapes of the extraction endpoint
#[derive(Debug)]
enum ExtractionPayload {
    Segmented(SegmentedWire),
    Legacy(LegacyWire),
}

#[derive(Debug, Deserialize)]
struct SegmentedWire {
    #[serde(default)]
    video_id: Option<String>,

    #[serde(deserialize_with = "ordered_entries")]
    transcripts: Vec<(String, WireVariant)>,

    #[serde(default)]
    default_language: Option<String>,

    #[serde(flatten)]
    metadata: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
struct WireVariant {
    #[serde(default)]
    segments: Vec<WireSegment>,

    #[serde(default)]
    name: Option<String>,

    #[serde(default)]
    is_generated: bool,
}

#[derive(Debug, Deserialize)]
struct WireSegment {
    #[serde(default)]
    text: String,

    #[serde(default)]
    start: f64,

    #[serde(default)]
    duration: f64,

    #[serde(default)]
    end: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct LegacyWire {
    #[serde(default)]
    video_id: Option<String>,

    #[serde(default)]
    transcript: Option<String>,

    #[serde(default)]
    full_text: Option<String>,

    #[serde(default)]
    srt_content: Option<String>,

    #[serde(default)]
    vtt_content: Option<String>,

    #[serde(default)]
    language: Option<String>,

    #[serde(flatten)]
    metadata: Map<String, Value>,
}

const LEGACY_FIELDS: [&str; 4] = ["transcript", "full_text", "srt_content", "vtt_content"];

/// Decode an extraction response body into the canonical model
pub fn decode_extraction(body: &str) -> Result<ExtractionResult, ClientError> {
    let payload = classify_payload(body)?;
    Ok(match payload {
        ExtractionPayload::Segmented(wire) => from_segmented(wire),
        ExtractionPayload::Legacy(wire) => from_legacy(wire),
    })
}

fn classify_payload(body: &str) -> Result<ExtractionPayload, ClientError> {
    let value: Value =
        serde_json::from_str(body).map_err(|e| ClientError::InvalidResponse(e.to_string()))?;

    if value.get("transcripts").is_some_and(Value::is_object) {
        // Decode from the raw text again so language order survives
        return serde_json::from_str(body)
            .map(ExtractionPayload::Segmented)
            .map_err(|e| ClientError::InvalidResponse(e.to_string()));
    }

    if LEGACY_FIELDS.iter().any(|field| value.get(*field).is_some()) {
        return serde_json::from_value(value)
            .map(ExtractionPayload::Legacy)
            .map_err(|e| ClientError::InvalidResponse(e.to_string()));
    }

    Err(ClientError::InvalidResponse(
        "response has neither transcripts nor transcript text".to_string(),
    ))
}

fn from_segmented(wire: SegmentedWire) -> ExtractionResult {
    let mut variants: Vec<TranscriptVariant> = Vec::with_capacity(wire.transcripts.len());

    for (code, variant) in wire.transcripts {
        if variants.iter().any(|v| v.language_code == code) {
            tracing::warn!(language = %code, "Ignoring duplicate transcript language");
            continue;
        }

        let mut segments: Vec<Segment> = variant
            .segments
            .into_iter()
            .map(|s| Segment {
                text: s.text,
                start_seconds: s.start,
                duration_seconds: s.duration,
                end_seconds: s.end,
            })
            .collect();
        segments.sort_by(|a, b| a.start_seconds.total_cmp(&b.start_seconds));

        variants.push(TranscriptVariant {
            display_name: variant.name.unwrap_or_else(|| code.clone()),
            language_code: code,
            is_auto_generated: variant.is_generated,
            segments,
        });
    }

    ExtractionResult {
        source_id: wire.video_id.unwrap_or_default(),
        variants,
        default_language_code: wire.default_language.filter(|c| !c.is_empty()),
        metadata: wire.metadata,
    }
}

fn from_legacy(wire: LegacyWire) -> ExtractionResult {
    let cues = wire
        .srt_content
        .as_deref()
        .map(parse_cues)
        .filter(|cues| !cues.is_empty())
        .or_else(|| {
            wire.vtt_content
                .as_deref()
                .map(parse_cues)
                .filter(|cues| !cues.is_empty())
        });

    let segments = match cues {
        Some(cues) => cues,
        None => non_blank(wire.full_text)
            .or_else(|| non_blank(wire.transcript))
            .map(|text| vec![Segment::new(text, 0.0, 0.0)])
            .unwrap_or_default(),
    };

    let code = wire
        .language
        .filter(|c| !c.is_empty())
        .unwrap_or_else(|| UNDETERMINED_LANGUAGE.to_string());

    let variants = if segments.is_empty() {
        Vec::new()
    } else {
        vec![TranscriptVariant {
            display_name: code.clone(),
            language_code: code.clone(),
            is_auto_generated: false,
            segments,
        }]
    };

    ExtractionResult {
        source_id: wire.video_id.unwrap_or_default(),
        variants,
        default_language_code: Some(code),
        metadata: wire.metadata,
    }
}

fn non_blank(text: Option<String>) -> Option<String> {
    text.map(|t| t.trim().to_string()).filter(|t| !t.is_empty())
}

/// Parse SRT or WebVTT cues into segments
pub fn parse_cues(content: &str) -> Vec<Segment> {
    let normalized = content.replace("\r\n", "\n");
    let mut segments = Vec::new();

    for block in normalized.split("\n\n") {
        let mut lines = block.lines().map(str::trim).filter(|l| !l.is_empty());
        let timing = match lines.by_ref().find(|line| line.contains("-->")) {
            Some(line) => line,
            None => continue,
        };

        let (start, end) = match timing.split_once("-->") {
            Some((start, rest)) => {
                // WebVTT cue settings may follow the end timestamp
                let end = rest.split_whitespace().next().unwrap_or("");
                match (parse_timestamp(start.trim()), parse_timestamp(end)) {
                    (Some(start), Some(end)) => (start, end),
                    _ => continue,
                }
            }
            None => continue,
        };

        let text = lines.collect::<Vec<_>>().join(" ");
        if text.is_empty() {
            continue;
        }

        segments.push(Segment {
            text,
            start_seconds: start,
            duration_seconds: (end - start).max(0.0),
            end_seconds: Some(end),
        });
    }

    segments
}

fn ordered_entries<'de, D, V>(deserializer: D) -> Result<Vec<(String, V)>, D::Error>
where
    D: Deserializer<'de>,
    V: Deserialize<'de>,
{
    struct EntriesVisitor<V>(PhantomData<V>);

    impl<'de, V: Deserialize<'de>> Visitor<'de> for EntriesVisitor<V> {
        type Value = Vec<(String, V)>;

        fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
            f.write_str("a map of language codes to transcripts")
        }

        fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
            let mut entries = Vec::with_capacity(map.size_hint().unwrap_or(0));
            while let Some((key, value)) = map.next_entry::<String, V>()? {
                entries.push((key, value));
            }
            Ok(entries)
        }
    }

    deserializer.deserialize_map(EntriesVisitor(PhantomData))
}
