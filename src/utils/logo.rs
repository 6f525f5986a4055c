//! Published artwork URLs
//!
//! The synthesizer never embeds upstream icons for channels. It points at the
//! logo-serving application instead, with a time based cache buster so guide
//! clients pick up replaced artwork.

use uuid::Uuid;

use super::sanitize_base_url;

/// File extension for a logo MIME type, `.png` when unknown
pub fn extension_for_mime(mime: Option<&str>) -> &'static str {
    let mime = mime
        .and_then(|m| m.split(';').next())
        .map(|m| m.trim().to_ascii_lowercase());
    match mime.as_deref() {
        Some("image/jpeg") | Some("image/jpg") => ".jpg",
        Some("image/gif") => ".gif",
        Some("image/svg+xml") => ".svg",
        Some("image/webp") => ".webp",
        Some("image/x-icon") | Some("image/vnd.microsoft.icon") => ".ico",
        _ => ".png",
    }
}

/// URL of an output channel's logo as served by the application
pub fn channel_logo_url(
    app_url: &str,
    channel_id: Uuid,
    cache_buster: &str,
    logo_mime: Option<&str>,
) -> String {
    format!(
        "{}/tic-api/channels/{}/logo/{}{}",
        sanitize_base_url(app_url),
        channel_id,
        cache_buster,
        extension_for_mime(logo_mime)
    )
}
