use async_process::{Command, Stdio};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::{MediaResolver, ResolveError};
use crate::audio::{song::Song, MemberId};
use crate::config::Config;

/// Resolver basado en el ejecutable `yt-dlp`.
///
/// Resuelve en dos pasos: una extracción plana (búsqueda `ytsearch1:` o la
/// URL tal cual) para elegir la primera entrada válida, y luego una
/// extracción completa de esa página para obtener la URL de stream.
#[derive(Debug, Clone)]
pub struct YtDlpResolver {
    binary: String,
    timeout: Duration,
}

/// Información extraída de yt-dlp (`--dump-single-json`)
#[derive(Debug, Default, Deserialize)]
struct YtDlpInfo {
    title: Option<String>,
    duration: Option<f64>,
    uploader: Option<String>,
    uploader_url: Option<String>,
    thumbnail: Option<String>,
    webpage_url: Option<String>,
    /// En resultados planos es la página; en los procesados, el stream.
    url: Option<String>,
    is_live: Option<bool>,
    #[serde(default)]
    entries: Option<Vec<Option<YtDlpInfo>>>,
}

impl YtDlpInfo {
    /// Primera entrada no nula, o la propia info si no es una lista
    fn first_entry(self) -> Option<YtDlpInfo> {
        match self.entries {
            None => Some(self),
            Some(entries) => entries.into_iter().flatten().next(),
        }
    }
}

impl YtDlpResolver {
    pub fn new(binary: impl Into<String>, timeout: Duration) -> Self {
        Self {
            binary: binary.into(),
            timeout,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.ytdlp_path.clone(), config.resolve_timeout)
    }

    /// Ejecuta yt-dlp y devuelve su JSON ya parseado
    async fn dump_json(&self, args: &[&str]) -> Result<YtDlpInfo, ResolveError> {
        debug!("🔧 {} {}", self.binary, args.join(" "));

        let mut command = Command::new(&self.binary);
        command.args(args).stdin(Stdio::null()).kill_on_drop(true);

        let output = tokio::time::timeout(self.timeout, command.output())
            .await
            .map_err(|_| {
                ResolveError::Failed(format!(
                    "yt-dlp no respondió en {}",
                    humantime::format_duration(self.timeout)
                ))
            })?
            .map_err(|e| ResolveError::Failed(format!("Error al ejecutar yt-dlp: {e}")))?;

        if !output.status.success() {
            let error = String::from_utf8_lossy(&output.stderr);
            return Err(ResolveError::Failed(format!("yt-dlp error: {}", error.trim())));
        }

        parse_info(&output.stdout)
    }

    async fn resolve_song(&self, query: &str, requester: MemberId) -> Result<Song, ResolveError> {
        let target = search_target(query);

        let flat = self
            .dump_json(&["--dump-single-json", "--flat-playlist", "--no-warnings", &target])
            .await?;
        let entry = flat
            .first_entry()
            .ok_or_else(|| ResolveError::NotFound(query.to_string()))?;
        let webpage_url = entry
            .webpage_url
            .or(entry.url)
            .ok_or_else(|| ResolveError::NotFound(query.to_string()))?;

        let processed = self
            .dump_json(&[
                "--dump-single-json",
                "--no-playlist",
                "-f",
                "bestaudio/best",
                "--no-warnings",
                &webpage_url,
            ])
            .await?;
        let info = processed.first_entry().ok_or_else(|| {
            ResolveError::Failed(format!("No hubo resultados para la URL `{webpage_url}`"))
        })?;

        info_to_song(info, &webpage_url, requester)
    }
}

#[async_trait]
impl MediaResolver for YtDlpResolver {
    async fn resolve(&self, query: &str, requester: MemberId) -> Result<Song, ResolveError> {
        let query = query.trim();
        if query.is_empty() {
            return Err(ResolveError::NotFound(String::new()));
        }

        info!("🔍 Resolviendo: {}", query);
        match self.resolve_song(query, requester).await {
            Ok(song) => {
                info!("✅ Resuelto: {}", song.title);
                Ok(song)
            }
            Err(e) => {
                warn!("❌ No se pudo resolver {}: {}", query, e);
                Err(e)
            }
        }
    }
}

/// URL tal cual; cualquier otro texto se busca en YouTube
fn search_target(query: &str) -> String {
    if is_url(query) {
        query.to_string()
    } else {
        format!("ytsearch1:{query}")
    }
}

fn is_url(query: &str) -> bool {
    url::Url::parse(query)
        .map(|url| matches!(url.scheme(), "http" | "https"))
        .unwrap_or(false)
}

fn parse_info(stdout: &[u8]) -> Result<YtDlpInfo, ResolveError> {
    let text = String::from_utf8_lossy(stdout);
    let text = text.trim();
    if text.is_empty() || text == "null" {
        return Err(ResolveError::NotFound("respuesta vacía de yt-dlp".to_string()));
    }
    serde_json::from_str(text)
        .map_err(|e| ResolveError::Failed(format!("Error al parsear respuesta de yt-dlp: {e}")))
}

fn info_to_song(info: YtDlpInfo, webpage_url: &str, requester: MemberId) -> Result<Song, ResolveError> {
    let stream = info
        .url
        .ok_or_else(|| ResolveError::Failed(format!("Sin URL de stream para `{webpage_url}`")))?;
    let title = info.title.unwrap_or_else(|| "Sin título".to_string());
    let source_url = info.webpage_url.unwrap_or_else(|| webpage_url.to_string());

    let mut song = Song::new(title, stream, source_url, requester);
    if !info.is_live.unwrap_or(false) {
        if let Some(secs) = info.duration.filter(|d| d.is_finite() && *d >= 0.0) {
            song = song.with_duration_secs(secs.round() as u64);
        }
    }
    if let Some(uploader) = info.uploader {
        song = song.with_uploader(uploader, info.uploader_url);
    }
    if let Some(thumbnail) = info.thumbnail {
        song = song.with_thumbnail(thumbnail);
    }
    Ok(song)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const SEARCH_JSON: &str = r#"{
        "_type": "playlist",
        "title": "lofi",
        "entries": [
            null,
            {"_type": "url", "url": "https://www.youtube.com/watch?v=abc", "title": "Lofi Beats"}
        ]
    }"#;

    const VIDEO_JSON: &str = r#"{
        "title": "Lofi Beats",
        "duration": 3725.4,
        "uploader": "Chill Channel",
        "uploader_url": "https://www.youtube.com/@chill",
        "thumbnail": "https://i.ytimg.com/vi/abc/hq.jpg",
        "webpage_url": "https://www.youtube.com/watch?v=abc",
        "url": "https://rr1.googlevideo.com/videoplayback?id=abc",
        "is_live": false
    }"#;

    #[test]
    fn test_search_target_detects_urls() {
        assert_eq!(
            search_target("https://youtu.be/abc"),
            "https://youtu.be/abc".to_string()
        );
        assert_eq!(search_target("never gonna give"), "ytsearch1:never gonna give");
        assert_eq!(search_target("ftp://host/file"), "ytsearch1:ftp://host/file");
    }

    #[test]
    fn test_first_entry_skips_null_results() {
        let info = parse_info(SEARCH_JSON.as_bytes()).unwrap();
        let entry = info.first_entry().unwrap();
        assert_eq!(entry.url.as_deref(), Some("https://www.youtube.com/watch?v=abc"));
    }

    #[test]
    fn test_empty_search_has_no_entry() {
        let info = parse_info(br#"{"entries": [null, null]}"#).unwrap();
        assert!(info.first_entry().is_none());
        assert!(matches!(parse_info(b"null"), Err(ResolveError::NotFound(_))));
        assert!(matches!(parse_info(b"{oops"), Err(ResolveError::Failed(_))));
    }

    #[test]
    fn test_processed_info_becomes_song() {
        let info = parse_info(VIDEO_JSON.as_bytes()).unwrap();
        let song = info_to_song(info, "https://www.youtube.com/watch?v=abc", MemberId(7)).unwrap();

        assert_eq!(song.title, "Lofi Beats");
        assert_eq!(song.duration_secs, Some(3725));
        assert_eq!(song.uploader(), "Chill Channel");
        assert_eq!(song.stream_ref, "https://rr1.googlevideo.com/videoplayback?id=abc");
        assert_eq!(song.source_url, "https://www.youtube.com/watch?v=abc");
        assert_eq!(song.requester, MemberId(7));
    }

    #[test]
    fn test_live_stream_has_no_duration() {
        let info = parse_info(
            br#"{"title": "Radio", "url": "https://stream/live", "is_live": true, "duration": 0}"#,
        )
        .unwrap();
        let song = info_to_song(info, "https://page", MemberId(1)).unwrap();
        assert_eq!(song.duration_secs, None);
        assert_eq!(song.source_url, "https://page");
    }

    #[test]
    fn test_missing_stream_url_fails() {
        let info = parse_info(br#"{"title": "x"}"#).unwrap();
        assert!(matches!(
            info_to_song(info, "https://page", MemberId(1)),
            Err(ResolveError::Failed(_))
        ));
    }

    #[tokio::test]
    async fn test_missing_binary_reports_failure() {
        let resolver = YtDlpResolver::new("/nonexistent/yt-dlp-binary", Duration::from_secs(5));
        let result = resolver.resolve("anything", MemberId(1)).await;
        assert!(matches!(result, Err(ResolveError::Failed(_))));
    }

    #[tokio::test]
    async fn test_blank_query_is_not_found() {
        let resolver = YtDlpResolver::new("yt-dlp", Duration::from_secs(5));
        assert_eq!(
            resolver.resolve("   ", MemberId(1)).await,
            Err(ResolveError::NotFound(String::new()))
        );
    }
}
