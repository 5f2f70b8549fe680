use std::path::Path;

/// Audio mime type for a path, by extension (case-insensitive).
pub fn audio_mime_type(path: &str) -> Option<&'static str> {
    let ext = Path::new(path).extension()?.to_str()?.to_lowercase();
    let mime = match ext.as_str() {
        "mp3" => "audio/mpeg",
        "flac" => "audio/flac",
        "ogg" | "oga" => "audio/ogg",
        "opus" => "audio/opus",
        "wav" => "audio/wav",
        "m4a" | "alac" => "audio/mp4",
        "aac" => "audio/aac",
        "aiff" | "aif" => "audio/aiff",
        "webm" => "audio/webm",
        "wma" => "audio/x-ms-wma",
        _ => return None,
    };
    Some(mime)
}
