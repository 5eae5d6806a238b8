use crate::core::error::SubmitError;

const SUPPORTED_HOSTS: &[&str] = &["youtube.com", "youtu.be", "youtube-nocookie.com"];

pub fn is_supported_url(url_str: &str) -> bool {
    let Ok(parsed) = url::Url::parse(url_str.trim()) else {
        return false;
    };
    if !matches!(parsed.scheme(), "http" | "https") {
        return false;
    }
    let Some(host) = parsed.host_str() else {
        return false;
    };
    let host = host.to_lowercase();
    SUPPORTED_HOSTS
        .iter()
        .any(|h| host == *h || host.ends_with(&format!(".{}", h)))
}

/// Trims the URL and rejects anything the extraction tool is not meant for.
pub fn validate_source_url(url_str: &str) -> Result<String, SubmitError> {
    let url = url_str.trim();
    if url.is_empty() {
        return Err(SubmitError::EmptyUrl);
    }
    if !is_supported_url(url) {
        return Err(SubmitError::UnsupportedUrl(url.to_string()));
    }
    Ok(url.to_string())
}

/// Video id for display purposes, when the URL carries one.
pub fn extract_video_id(url_str: &str) -> Option<String> {
    let parsed = url::Url::parse(url_str).ok()?;
    let host = parsed.host_str()?.to_lowercase();
    let segments: Vec<&str> = parsed.path().split('/').filter(|s| !s.is_empty()).collect();

    if host.ends_with("youtu.be") {
        return segments.first().map(|s| s.to_string());
    }

    if host.contains("youtube") {
        if let Some(v) = parsed.query_pairs().find(|(k, _)| k == "v").map(|(_, v)| v.to_string()) {
            return Some(v);
        }
        if matches!(segments.first(), Some(&"shorts") | Some(&"embed") | Some(&"v") | Some(&"live")) {
            return segments.get(1).map(|s| s.to_string());
        }
    }

    None
}
