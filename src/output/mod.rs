use anyhow::Result;
use std::path::Path;

use crate::cli::OutputFormat;
use crate::extract::TranscriptVariant;

pub mod formatters;

pub use formatters::*;

/// Render one transcript variant in the requested format
pub fn render(variant: &TranscriptVariant, format: &OutputFormat) -> Result<String> {
    let content = match format {
        OutputFormat::Text => to_plain_text(&variant.segments),
        OutputFormat::Paragraphs => to_paragraphs(&variant.segments),
        OutputFormat::Srt => to_srt(&variant.segments),
        OutputFormat::Vtt => to_vtt(&variant.segments),
        OutputFormat::Json => serde_json::to_string_pretty(variant)?,
    };

    Ok(content)
}

/// Save a transcript variant to file
pub async fn save_to_file(
    variant: &TranscriptVariant,
    path: &Path,
    format: &OutputFormat,
) -> Result<()> {
    let content = render(variant, format)?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs_err::create_dir_all(parent)?;
    }
    fs_err::write(path, content)?;
    Ok(())
}

/// Print a transcript variant to console
pub fn print_to_console(variant: &TranscriptVariant, format: &OutputFormat) -> Result<()> {
    let content = render(variant, format)?;

    // Subtitle formats already end with a newline
    if content.ends_with('\n') {
        print!("{}", content);
    } else {
        println!("{}", content);
    }
    Ok(())
}

/// File extension matching an output format
pub fn extension_for(format: &OutputFormat) -> &'static str {
    match format {
        OutputFormat::Text | OutputFormat::Paragraphs => "txt",
        OutputFormat::Srt => "srt",
        OutputFormat::Vtt => "vtt",
        OutputFormat::Json => "json",
    }
}
