// HLS Playlist Engine: fetches a media playlist and interprets it into an ordered segment list.
//
// Segment references are classified by a best-effort heuristic: a relative
// reference whose last path component carries a file extension is a
// "resource" resolved against the playlist directory, anything else is a
// "bare path" resolved against the playlist origin. Origins that serve real
// segments from extensionless URLs defeat this heuristic.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use reqwest::header::HeaderMap;
use tracing::{debug, info, warn};
use url::Url;

use crate::hls::HlsError;
use crate::hls::config::SEGMENT_EXTENSION;
use crate::hls::decryption::{EncryptionDescriptor, EncryptionMethod, KeyFetcher};
use crate::retry::RetryPolicy;
use crate::transport::Transport;

const TAG_PREFIX: char = '#';
const KEY_TAG: &str = "#EXT-X-KEY:";
const MEDIA_SEQUENCE_TAG: &str = "#EXT-X-MEDIA-SEQUENCE:";

/// One fetchable media segment. Immutable once parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    /// Local file name, always ending in `.ts`
    pub name: String,
    /// Absolute URL of the segment bytes
    pub url: Url,
    /// Media sequence number, used to derive the IV when the playlist has none
    pub sequence: u64,
}

/// A parsed media playlist.
#[derive(Debug, Clone)]
pub struct Manifest {
    pub base_url: Url,
    /// Playlist URL without its last path component, no trailing `/`
    pub base_url_prefix: String,
    /// `scheme://authority` of the playlist URL
    pub host: String,
    pub media_sequence: u64,
    pub encryption: EncryptionDescriptor,
    /// Playback order. Downstream stages must preserve it.
    pub segments: Vec<Segment>,
}

impl Manifest {
    /// Interprets playlist text fetched from `base_url`.
    ///
    /// Fails when no segment lines are present, when a reference cannot be
    /// reduced to a file name, or when the encryption directive is unusable.
    /// The key itself is not fetched here, see [`Manifest::resolve_key`].
    pub fn parse(body: &str, base_url: &str) -> Result<Self, HlsError> {
        let base_url = Url::parse(base_url).map_err(|e| {
            HlsError::Parse(format!("Invalid playlist URL {base_url}: {e}"))
        })?;
        let (base_url_prefix, host) = split_base(&base_url)?;

        let body = body.strip_prefix('\u{feff}').unwrap_or(body);
        if m3u8_rs::is_master_playlist(body.as_bytes()) {
            return Err(HlsError::Parse(format!(
                "{base_url} is a master playlist, pass the URL of one of its variants instead"
            )));
        }

        let mut media_sequence: u64 = 0;
        let mut encryption = EncryptionDescriptor::default();
        let mut references = Vec::new();

        for (line_no, raw) in body.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() {
                continue;
            }
            if line.starts_with(TAG_PREFIX) {
                if let Some(value) = line.strip_prefix(MEDIA_SEQUENCE_TAG) {
                    media_sequence = value.trim().parse().map_err(|e| {
                        HlsError::Parse(format!(
                            "Invalid media sequence '{value}' on line {}: {e}",
                            line_no + 1
                        ))
                    })?;
                } else if let Some(attributes) = line.strip_prefix(KEY_TAG) {
                    let attributes = parse_attribute_list(attributes);
                    debug!(?attributes, "Encryption directive");
                    let descriptor = EncryptionDescriptor::from_attributes(&attributes)?;
                    // One cipher covers the whole playlist. Segments listed before
                    // the first directive are clear, so only NONE may follow them.
                    match encryption.method {
                        EncryptionMethod::Unset
                            if references.is_empty()
                                || descriptor.method == EncryptionMethod::None =>
                        {
                            encryption = descriptor;
                        }
                        _ if descriptor == encryption => {}
                        _ => {
                            return Err(HlsError::Parse(format!(
                                "Line {}: encryption changes mid-playlist ({:?} after {:?}), key rotation is not supported",
                                line_no + 1,
                                descriptor.method,
                                encryption.method
                            )));
                        }
                    }
                }
                continue;
            }
            references.push((line_no + 1, line));
        }

        if references.is_empty() {
            return Err(HlsError::Parse(format!(
                "No segment references found in playlist {base_url}"
            )));
        }

        let mut segments = Vec::with_capacity(references.len());
        let mut taken_names = HashSet::with_capacity(references.len());
        for (idx, (line_no, reference)) in references.into_iter().enumerate() {
            let url = resolve_reference(reference, &base_url_prefix, &host).map_err(|e| {
                HlsError::Parse(format!("Line {line_no}: {e}"))
            })?;
            let name = segment_file_name(reference, &url).map_err(|e| {
                HlsError::Parse(format!("Line {line_no}: {e}"))
            })?;
            let name = disambiguate(name, &mut taken_names);
            let sequence = media_sequence.checked_add(idx as u64).ok_or_else(|| {
                HlsError::Parse(format!(
                    "Line {line_no}: media sequence {media_sequence} + {idx} does not fit in 64 bits"
                ))
            })?;
            segments.push(Segment {
                name,
                url,
                sequence,
            });
        }

        Ok(Self {
            base_url,
            base_url_prefix,
            host,
            media_sequence,
            encryption,
            segments,
        })
    }

    /// Fetches the key of an AES-128 playlist. A no-op for clear playlists.
    pub async fn resolve_key(
        &mut self,
        key_fetcher: &KeyFetcher,
        headers: &HeaderMap,
    ) -> Result<(), HlsError> {
        if self.encryption.method != EncryptionMethod::Aes128 || self.encryption.key.is_some() {
            return Ok(());
        }
        let key_uri = self.encryption.key_uri.as_deref().ok_or_else(|| {
            HlsError::Parse("AES-128 encryption directive without URI".to_string())
        })?;
        let key_url = resolve_key_uri(key_uri, &self.base_url_prefix, &self.host)?;
        let key = key_fetcher.fetch_key(&key_url, headers).await?;
        self.encryption.key = Some(key);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn is_encrypted(&self) -> bool {
        self.encryption.method == EncryptionMethod::Aes128
    }
}

/// Fetches and interprets a media playlist, including its key.
pub struct PlaylistEngine {
    transport: Arc<dyn Transport>,
    key_fetcher: KeyFetcher,
}

impl PlaylistEngine {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        let key_fetcher = KeyFetcher::new(Arc::clone(&transport));
        Self {
            transport,
            key_fetcher,
        }
    }

    pub fn with_key_retry_policy(mut self, retry_policy: RetryPolicy) -> Self {
        self.key_fetcher = self.key_fetcher.with_retry_policy(retry_policy);
        self
    }

    pub async fn load(&self, url_str: &str, headers: &HeaderMap) -> Result<Manifest, HlsError> {
        let playlist_url = Url::parse(url_str)
            .map_err(|e| HlsError::Parse(format!("Invalid playlist URL {url_str}: {e}")))?;

        let body = self.transport.fetch(&playlist_url, headers).await?;
        let body = String::from_utf8_lossy(&body);

        let mut manifest = Manifest::parse(&body, url_str)?;
        manifest.resolve_key(&self.key_fetcher, headers).await?;

        info!(
            url = %playlist_url,
            segments = manifest.len(),
            encrypted = manifest.is_encrypted(),
            "Playlist loaded"
        );
        Ok(manifest)
    }
}

/// Returns (`base_url_prefix`, `host`) for a playlist URL. Query and fragment
/// are dropped from the prefix, they belong to the playlist resource only.
fn split_base(base_url: &Url) -> Result<(String, String), HlsError> {
    if !base_url.has_host() {
        return Err(HlsError::Parse(format!(
            "Playlist URL {base_url} has no host"
        )));
    }
    let host = base_url.origin().ascii_serialization();

    let path = base_url.path();
    let dir = match path.rfind('/') {
        Some(pos) => &path[..pos],
        None => "",
    };
    Ok((format!("{host}{dir}"), host))
}

fn is_absolute(reference: &str) -> bool {
    Url::parse(reference).is_ok_and(|u| u.has_host())
}

/// Path portion of a relative reference, without query or fragment.
fn path_part(reference: &str) -> &str {
    match reference.find(['?', '#']) {
        Some(pos) => &reference[..pos],
        None => reference,
    }
}

fn last_component(path: &str) -> &str {
    let trimmed = path.trim_end_matches('/');
    match trimmed.rfind('/') {
        Some(pos) => &trimmed[pos + 1..],
        None => trimmed,
    }
}

fn has_extension(component: &str) -> bool {
    component
        .rfind('.')
        .is_some_and(|pos| pos > 0 && pos + 1 < component.len())
}

/// Whether a relative reference names a resource (has an extension, no
/// trailing separator) rather than a bare path.
pub fn is_resource_reference(reference: &str) -> bool {
    let path = path_part(reference);
    !path.ends_with('/') && has_extension(last_component(path))
}

/// Resolves a segment reference into the URL that is actually fetched.
pub fn resolve_reference(reference: &str, base_url_prefix: &str, host: &str) -> Result<Url, String> {
    let joined = if is_absolute(reference) {
        reference.to_string()
    } else if is_resource_reference(reference) {
        format!("{base_url_prefix}/{}", reference.trim_start_matches('/'))
    } else {
        format!("{host}/{}", reference.trim_start_matches('/'))
    };
    Url::parse(&joined).map_err(|e| format!("Cannot resolve '{reference}' into a URL: {e}"))
}

/// Resolves a key URI: absolute as-is, `/`-rooted against the origin, anything
/// else against the playlist directory.
pub fn resolve_key_uri(uri: &str, base_url_prefix: &str, host: &str) -> Result<Url, HlsError> {
    let joined = if is_absolute(uri) {
        uri.to_string()
    } else if let Some(rooted) = uri.strip_prefix('/') {
        format!("{host}/{rooted}")
    } else {
        format!("{base_url_prefix}/{uri}")
    };
    Url::parse(&joined).map_err(|e| HlsError::KeyFetch(format!("Invalid key URI '{uri}': {e}")))
}

/// Canonical local name: the last path component with its extension replaced by `.ts`.
pub fn segment_file_name(reference: &str, resolved: &Url) -> Result<String, String> {
    let path = if is_absolute(reference) {
        resolved.path()
    } else {
        path_part(reference)
    };
    let component = last_component(path);
    if component.is_empty() || component == "." || component == ".." {
        return Err(format!("No file name can be derived from '{reference}'"));
    }

    let canonical_suffix = format!(".{SEGMENT_EXTENSION}");
    if component.ends_with(&canonical_suffix) {
        return Ok(component.to_string());
    }
    let stem = match component.rfind('.') {
        Some(pos) if has_extension(component) => &component[..pos],
        _ => component,
    };
    Ok(format!("{stem}{canonical_suffix}"))
}

// Two references may share a last component (e.g. `a/index.ts`, `b/index.ts`).
// Later occurrences get the first free `-N` suffix, checked against every
// name already handed out, so each segment owns one file.
fn disambiguate(name: String, taken: &mut HashSet<String>) -> String {
    if taken.insert(name.clone()) {
        return name;
    }
    let stem = name
        .strip_suffix(&format!(".{SEGMENT_EXTENSION}"))
        .unwrap_or(&name);
    let mut n = 1;
    let renamed = loop {
        let candidate = format!("{stem}-{n}.{SEGMENT_EXTENSION}");
        if !taken.contains(&candidate) {
            break candidate;
        }
        n += 1;
    };
    taken.insert(renamed.clone());
    warn!(original = %name, renamed = %renamed, "Duplicate segment file name");
    renamed
}

/// Parses an HLS attribute list (`KEY=VALUE,KEY="quoted, value"`).
pub fn parse_attribute_list(input: &str) -> HashMap<String, String> {
    let mut attributes = HashMap::new();
    let mut rest = input.trim();

    while !rest.is_empty() {
        let Some(eq) = rest.find('=') else {
            break;
        };
        let key = rest[..eq].trim().to_ascii_uppercase();
        let after = &rest[eq + 1..];

        let (value, remaining) = if let Some(quoted) = after.strip_prefix('"') {
            match quoted.find('"') {
                Some(end) => (&quoted[..end], &quoted[end + 1..]),
                None => (quoted, ""),
            }
        } else {
            match after.find(',') {
                Some(end) => (&after[..end], &after[end..]),
                None => (after, ""),
            }
        };

        if !key.is_empty() {
            attributes.insert(key, value.trim().to_string());
        }
        rest = remaining.trim_start_matches(|c: char| c == ',' || c.is_whitespace());
    }

    attributes
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: &str = "https://cdn.example.com/vod/movie/index.m3u8";

    fn names(manifest: &Manifest) -> Vec<&str> {
        manifest.segments.iter().map(|s| s.name.as_str()).collect()
    }

    #[test]
    fn test_base_prefix_and_host() {
        let manifest = Manifest::parse("#EXTM3U\nseg0.ts\n", BASE).unwrap();
        assert_eq!(manifest.base_url_prefix, "https://cdn.example.com/vod/movie");
        assert_eq!(manifest.host, "https://cdn.example.com");

        let with_query =
            Manifest::parse("seg0.ts\n", "http://h.example:8080/a/index.m3u8?token=1").unwrap();
        assert_eq!(with_query.base_url_prefix, "http://h.example:8080/a");
        assert_eq!(with_query.host, "http://h.example:8080");
        assert_eq!(
            with_query.segments[0].url.as_str(),
            "http://h.example:8080/a/seg0.ts"
        );
    }

    #[test]
    fn test_segments_keep_line_order() {
        let body = "#EXTM3U\n#EXT-X-TARGETDURATION:10\n#EXTINF:10,\nc.ts\n#EXTINF:10,\na.ts\n\n#EXTINF:10,\nb.ts\n#EXT-X-ENDLIST\n";
        let manifest = Manifest::parse(body, BASE).unwrap();
        assert_eq!(names(&manifest), vec!["c.ts", "a.ts", "b.ts"]);
        let urls: Vec<&str> = manifest.segments.iter().map(|s| s.url.as_str()).collect();
        assert_eq!(
            urls,
            vec![
                "https://cdn.example.com/vod/movie/c.ts",
                "https://cdn.example.com/vod/movie/a.ts",
                "https://cdn.example.com/vod/movie/b.ts",
            ]
        );
    }

    #[test]
    fn test_crlf_and_bom_are_tolerated() {
        let body = "\u{feff}#EXTM3U\r\n#EXTINF:4,\r\nseg1.ts\r\n#EXTINF:4,\r\nseg2.ts\r\n";
        let manifest = Manifest::parse(body, BASE).unwrap();
        assert_eq!(names(&manifest), vec!["seg1.ts", "seg2.ts"]);
    }

    #[test]
    fn test_disguised_extensions_are_renamed() {
        let body = "#EXTM3U\nimg001.jpg\nframe.png?sig=abc\nplain.ts\nnoext\n";
        let manifest = Manifest::parse(body, BASE).unwrap();
        assert_eq!(
            names(&manifest),
            vec!["img001.ts", "frame.ts", "plain.ts", "noext.ts"]
        );
    }

    #[test]
    fn test_bare_path_resolves_against_host() {
        let body = "#EXTM3U\n/abc123/\n/abc123/seg1.ts\n";
        let manifest = Manifest::parse(body, BASE).unwrap();
        assert_eq!(
            manifest.segments[0].url.as_str(),
            "https://cdn.example.com/abc123/"
        );
        assert_eq!(manifest.segments[0].name, "abc123.ts");
        assert_eq!(
            manifest.segments[1].url.as_str(),
            "https://cdn.example.com/vod/movie/abc123/seg1.ts"
        );
        assert_eq!(manifest.segments[1].name, "seg1.ts");
    }

    #[test]
    fn test_absolute_references_are_used_verbatim() {
        let body = "#EXTM3U\nhttps://other.example.net/x/part7.jpeg?exp=1\n";
        let manifest = Manifest::parse(body, BASE).unwrap();
        assert_eq!(
            manifest.segments[0].url.as_str(),
            "https://other.example.net/x/part7.jpeg?exp=1"
        );
        assert_eq!(manifest.segments[0].name, "part7.ts");
    }

    #[test]
    fn test_directive_only_playlist_fails() {
        let body = "#EXTM3U\n#EXT-X-VERSION:3\n#EXT-X-TARGETDURATION:10\n#EXT-X-ENDLIST\n";
        let err = Manifest::parse(body, BASE).unwrap_err();
        assert!(matches!(err, HlsError::Parse(_)));
    }

    #[test]
    fn test_reference_without_file_name_fails() {
        let body = "#EXTM3U\nok.ts\n/\n";
        let err = Manifest::parse(body, BASE).unwrap_err();
        assert!(matches!(err, HlsError::Parse(msg) if msg.contains("Line 3")));
    }

    #[test]
    fn test_master_playlist_is_rejected() {
        let body = "#EXTM3U\n#EXT-X-STREAM-INF:BANDWIDTH=1280000\nlow/index.m3u8\n";
        assert!(matches!(
            Manifest::parse(body, BASE),
            Err(HlsError::Parse(_))
        ));
    }

    #[test]
    fn test_duplicate_names_are_disambiguated() {
        let body = "#EXTM3U\na/index.ts\nb/index.ts\nc/index.jpg\n";
        let manifest = Manifest::parse(body, BASE).unwrap();
        assert_eq!(names(&manifest), vec!["index.ts", "index-1.ts", "index-2.ts"]);
    }

    #[test]
    fn test_generated_names_never_collide_with_listed_ones() {
        let body = "#EXTM3U\nx/index.ts\ny/index.ts\nindex-1.ts\n";
        let manifest = Manifest::parse(body, BASE).unwrap();
        assert_eq!(names(&manifest), vec!["index.ts", "index-1.ts", "index-1-1.ts"]);

        let body = "#EXTM3U\nindex-1.ts\nx/index.ts\ny/index.ts\n";
        let manifest = Manifest::parse(body, BASE).unwrap();
        assert_eq!(names(&manifest), vec!["index-1.ts", "index.ts", "index-2.ts"]);

        let unique: HashSet<&str> = names(&manifest).into_iter().collect();
        assert_eq!(unique.len(), manifest.len());
    }

    #[test]
    fn test_media_sequence_overflow_is_rejected() {
        let body = "#EXTM3U\n#EXT-X-MEDIA-SEQUENCE:18446744073709551615\ns0.ts\ns1.ts\n";
        let err = Manifest::parse(body, BASE).unwrap_err();
        assert!(matches!(err, HlsError::Parse(msg) if msg.contains("Line 4")));

        let body = "#EXTM3U\n#EXT-X-MEDIA-SEQUENCE:18446744073709551615\ns0.ts\n";
        let manifest = Manifest::parse(body, BASE).unwrap();
        assert_eq!(manifest.segments[0].sequence, u64::MAX);
    }

    #[test]
    fn test_media_sequence_numbers_segments() {
        let body = "#EXTM3U\n#EXT-X-MEDIA-SEQUENCE:7\ns0.ts\ns1.ts\n";
        let manifest = Manifest::parse(body, BASE).unwrap();
        assert_eq!(manifest.media_sequence, 7);
        assert_eq!(manifest.segments[0].sequence, 7);
        assert_eq!(manifest.segments[1].sequence, 8);
    }

    #[test]
    fn test_encryption_directive_is_extracted() {
        let body = "#EXTM3U\n#EXT-X-KEY:METHOD=AES-128,URI=\"key.bin\",IV=0x000102030405060708090a0b0c0d0e0f\ns0.ts\n";
        let manifest = Manifest::parse(body, BASE).unwrap();
        assert!(manifest.is_encrypted());
        assert_eq!(manifest.encryption.key_uri.as_deref(), Some("key.bin"));
        let expected: [u8; 16] = core::array::from_fn(|i| i as u8);
        assert_eq!(manifest.encryption.iv, Some(expected));
        assert!(manifest.encryption.key.is_none());
    }

    #[test]
    fn test_method_none_carries_no_cipher() {
        let body = "#EXTM3U\n#EXT-X-KEY:METHOD=NONE\ns0.ts\n";
        let manifest = Manifest::parse(body, BASE).unwrap();
        assert_eq!(manifest.encryption.method, EncryptionMethod::None);
        assert!(!manifest.is_encrypted());
    }

    #[test]
    fn test_encryption_change_mid_playlist_is_rejected() {
        let body = "#EXTM3U\n#EXT-X-KEY:METHOD=NONE\na.ts\n#EXT-X-KEY:METHOD=AES-128,URI=\"k.bin\"\nb.ts\n";
        let err = Manifest::parse(body, BASE).unwrap_err();
        assert!(matches!(err, HlsError::Parse(msg) if msg.contains("Line 4")));

        let rotation = "#EXTM3U\n#EXT-X-KEY:METHOD=AES-128,URI=\"k1.bin\"\na.ts\n#EXT-X-KEY:METHOD=AES-128,URI=\"k2.bin\"\nb.ts\n";
        assert!(matches!(
            Manifest::parse(rotation, BASE),
            Err(HlsError::Parse(_))
        ));

        let late_key = "#EXTM3U\na.ts\n#EXT-X-KEY:METHOD=AES-128,URI=\"k.bin\"\nb.ts\n";
        assert!(matches!(
            Manifest::parse(late_key, BASE),
            Err(HlsError::Parse(_))
        ));
    }

    #[test]
    fn test_repeated_identical_directive_is_accepted() {
        let body = "#EXTM3U\n#EXT-X-KEY:METHOD=AES-128,URI=\"k.bin\"\na.ts\n#EXT-X-KEY:METHOD=AES-128,URI=\"k.bin\"\nb.ts\n";
        let manifest = Manifest::parse(body, BASE).unwrap();
        assert!(manifest.is_encrypted());
        assert_eq!(manifest.len(), 2);

        let clear = "#EXTM3U\na.ts\n#EXT-X-KEY:METHOD=NONE\nb.ts\n";
        let manifest = Manifest::parse(clear, BASE).unwrap();
        assert!(!manifest.is_encrypted());
    }

    #[test]
    fn test_bad_iv_is_fatal() {
        let body = "#EXTM3U\n#EXT-X-KEY:METHOD=AES-128,URI=\"k\",IV=0xZZ\ns0.ts\n";
        assert!(matches!(
            Manifest::parse(body, BASE),
            Err(HlsError::IvDecode(_))
        ));
    }

    #[test]
    fn test_attribute_list_with_quoted_commas() {
        let attrs = parse_attribute_list(
            r#"METHOD=AES-128,URI="https://k.example/key?a=1,b=2",IV=0x01, KEYFORMAT="identity""#,
        );
        assert_eq!(attrs["METHOD"], "AES-128");
        assert_eq!(attrs["URI"], "https://k.example/key?a=1,b=2");
        assert_eq!(attrs["IV"], "0x01");
        assert_eq!(attrs["KEYFORMAT"], "identity");
    }

    #[test]
    fn test_key_uri_resolution() {
        let prefix = "https://cdn.example.com/vod/movie";
        let host = "https://cdn.example.com";
        assert_eq!(
            resolve_key_uri("key.bin", prefix, host).unwrap().as_str(),
            "https://cdn.example.com/vod/movie/key.bin"
        );
        assert_eq!(
            resolve_key_uri("/keys/1", prefix, host).unwrap().as_str(),
            "https://cdn.example.com/keys/1"
        );
        assert_eq!(
            resolve_key_uri("https://keys.example.org/k", prefix, host)
                .unwrap()
                .as_str(),
            "https://keys.example.org/k"
        );
    }

    #[test]
    fn test_resource_classification() {
        assert!(is_resource_reference("seg1.ts"));
        assert!(is_resource_reference("/abc123/seg1.ts?x=1"));
        assert!(!is_resource_reference("/abc123/"));
        assert!(!is_resource_reference("abc123"));
        assert!(!is_resource_reference("dir.v2/"));
    }
}
