//! Viewer markup for course materials.
//!
//! [`select_viewer`] decides which viewer a material gets and
//! [`Viewer::to_html`] turns that decision into markup. Every value that
//! reaches the output is escaped; raw embed markup never does.

use once_cell::sync::Lazy;
use regex::Regex;
use url::Url;

use crate::models::{Material, MaterialKind};

const NATIVE_VIDEO_EXTENSIONS: [&str; 4] = ["mp4", "webm", "mov", "avi"];
const AUDIO_IN_VIDEO_EXTENSIONS: [&str; 3] = ["mp4", "webm", "mov"];
const SLIDE_EXTENSIONS: [&str; 2] = ["ppt", "pptx"];
const OFFICE_VIEWER: &str = "https://view.officeapps.live.com/op/embed.aspx?src=";

static IFRAME_TAG: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)^\s*<iframe\b([^>]*)>\s*</iframe>\s*$").expect("iframe pattern is valid")
});

static SRC_ATTR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)\bsrc\s*=\s*(?:"([^"]*)"|'([^']*)')"#).expect("src pattern is valid")
});

/// Base for resolving site-relative material urls like `/uploads/a.pdf`.
static SITE_BASE: Lazy<Url> =
    Lazy::new(|| Url::parse("http://localhost/").expect("site base url is valid"));

static VIDEO_ID: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9_-]{6,20}$").expect("video id pattern is valid"));

/// The only thing kept from admin-supplied embed markup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmbedFrame {
    pub src: String,
}

/// Accepts a single `<iframe>` element with an http(s) `src` and nothing else.
pub fn sanitize_embed(markup: &str) -> Option<EmbedFrame> {
    let attributes = IFRAME_TAG.captures(markup)?.get(1)?.as_str();

    let lowered = attributes.to_ascii_lowercase();
    if lowered.contains("srcdoc") || lowered.contains("javascript:") {
        return None;
    }

    let mut sources = SRC_ATTR.captures_iter(attributes);
    let capture = sources.next()?;
    if sources.next().is_some() {
        return None;
    }

    let src = capture
        .get(1)
        .or_else(|| capture.get(2))?
        .as_str()
        .trim()
        .replace("&amp;", "&");
    if src.chars().any(char::is_whitespace) || parse_web_url(&src).is_none() {
        return None;
    }

    Some(EmbedFrame { src })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Viewer<'a> {
    NothingSelected,
    PlatformVideo {
        embed_url: String,
        title: &'a str,
    },
    NativeVideo {
        src: &'a str,
        mime: &'static str,
    },
    UnsupportedVideo {
        src: Option<&'a str>,
    },
    NativeAudio {
        src: &'a str,
        mime: &'static str,
        title: &'a str,
    },
    Pdf {
        src: &'a str,
        title: &'a str,
    },
    Slides {
        embed_url: String,
        src: &'a str,
        title: &'a str,
    },
    SlidesDownloadOnly {
        src: Option<&'a str>,
    },
    Embed {
        frame: EmbedFrame,
        title: &'a str,
    },
    EmbedBlocked,
    Frame {
        src: &'a str,
        title: &'a str,
    },
    Webpage {
        src: &'a str,
        title: &'a str,
    },
    Placeholder,
    UnsupportedType {
        kind: &'a str,
    },
}

pub fn select_viewer(material: Option<&Material>) -> Viewer<'_> {
    let Some(material) = material else {
        return Viewer::NothingSelected;
    };
    let url = material.url();
    let title = material.name.as_str();

    match &material.kind {
        MaterialKind::Video => match url {
            Some(src) => {
                if let Some(embed_url) = platform_embed_url(src) {
                    Viewer::PlatformVideo { embed_url, title }
                } else if let Some(mime) = extension(src)
                    .filter(|ext| NATIVE_VIDEO_EXTENSIONS.contains(&ext.as_str()))
                    .map(|ext| video_mime(&ext))
                {
                    Viewer::NativeVideo { src, mime }
                } else {
                    Viewer::UnsupportedVideo { src: Some(src) }
                }
            }
            None => Viewer::UnsupportedVideo { src: None },
        },
        MaterialKind::Audio => match url {
            Some(src) => match extension(src) {
                Some(ext) if AUDIO_IN_VIDEO_EXTENSIONS.contains(&ext.as_str()) => {
                    Viewer::NativeVideo {
                        src,
                        mime: video_mime(&ext),
                    }
                }
                ext => Viewer::NativeAudio {
                    src,
                    mime: audio_mime(ext.as_deref()),
                    title,
                },
            },
            None => Viewer::Placeholder,
        },
        MaterialKind::Pdf => match url {
            Some(src) => Viewer::Pdf { src, title },
            None => Viewer::Placeholder,
        },
        MaterialKind::Powerpoint => match url {
            Some(src)
                if extension(src).is_some_and(|ext| SLIDE_EXTENSIONS.contains(&ext.as_str())) =>
            {
                Viewer::Slides {
                    embed_url: format!("{}{}", OFFICE_VIEWER, urlencoding::encode(src)),
                    src,
                    title,
                }
            }
            src => Viewer::SlidesDownloadOnly { src },
        },
        MaterialKind::Iframe => match (material.embed_code(), url) {
            (Some(code), _) => match sanitize_embed(code) {
                Some(frame) => Viewer::Embed { frame, title },
                None => Viewer::EmbedBlocked,
            },
            (None, Some(src)) => Viewer::Frame { src, title },
            (None, None) => Viewer::Placeholder,
        },
        MaterialKind::Webpage => match url {
            Some(src) => Viewer::Webpage { src, title },
            None => Viewer::Placeholder,
        },
        MaterialKind::Unsupported(kind) => Viewer::UnsupportedType { kind },
    }
}

pub fn render_material(material: Option<&Material>) -> String {
    select_viewer(material).to_html()
}

impl Viewer<'_> {
    pub fn to_html(&self) -> String {
        let body = match self {
            Viewer::NothingSelected => panel("Select a material to view it"),
            Viewer::PlatformVideo { embed_url, title } => format!(
                r#"<iframe class="viewer-frame" width="100%" height="400" src="{}" title="{}" frameborder="0" allow="accelerometer; autoplay; clipboard-write; encrypted-media; gyroscope; picture-in-picture" allowfullscreen></iframe>"#,
                escape_html(embed_url),
                escape_html(title)
            ),
            Viewer::NativeVideo { src, mime } => format!(
                r#"<video class="viewer-video" width="100%" height="400" controls><source src="{}" type="{}">Your browser does not support the video element.</video>"#,
                escape_html(src),
                mime
            ),
            Viewer::UnsupportedVideo { src } => {
                let mut html = panel("This video format is not supported");
                if let Some(src) = src {
                    html.push_str(&download_link(src, "Download video"));
                }
                html
            }
            Viewer::NativeAudio { src, mime, title } => format!(
                r#"<div class="viewer-audio"><h3>{}</h3><audio controls><source src="{}" type="{}">Your browser does not support the audio element.</audio></div>"#,
                escape_html(title),
                escape_html(src),
                mime
            ),
            Viewer::Pdf { src, title } => format!(
                "{}{}",
                frame(&format!("{}#toolbar=1&navpanes=0&scrollbar=1", src), title),
                download_link(src, "Download PDF")
            ),
            Viewer::Slides {
                embed_url,
                src,
                title,
            } => format!(
                "{}{}",
                frame(embed_url, title),
                download_link(src, "Download slides")
            ),
            Viewer::SlidesDownloadOnly { src } => {
                let mut html = panel("This presentation cannot be previewed, download it instead");
                if let Some(src) = src {
                    html.push_str(&download_link(src, "Download slides"));
                }
                html
            }
            Viewer::Embed { frame: embed, title } => frame(&embed.src, title),
            Viewer::EmbedBlocked => panel("This embedded content was blocked"),
            Viewer::Frame { src, title } => frame(src, title),
            Viewer::Webpage { src, title } => format!(
                r#"{}<a class="viewer-action" href="{}" target="_blank" rel="noopener noreferrer">Open in a new tab</a>"#,
                frame(src, title),
                escape_html(src)
            ),
            Viewer::Placeholder => panel("Content not available"),
            Viewer::UnsupportedType { kind } => {
                panel(&format!("Unsupported content type: {}", kind))
            }
        };

        format!(r#"<div class="material-viewer">{}</div>"#, body)
    }
}

fn frame(src: &str, title: &str) -> String {
    format!(
        r#"<iframe class="viewer-frame" width="100%" height="400" src="{}" title="{}"></iframe>"#,
        escape_html(src),
        escape_html(title)
    )
}

fn panel(message: &str) -> String {
    format!(r#"<div class="viewer-panel"><p>{}</p></div>"#, escape_html(message))
}

fn download_link(src: &str, label: &str) -> String {
    format!(
        r#"<a class="viewer-action" href="{}" download>{}</a>"#,
        escape_html(src),
        escape_html(label)
    )
}

/// Absolute http(s) url. Scheme-less input such as `youtube.com/watch?v=..`
/// is read as https.
pub fn parse_web_url(raw: &str) -> Option<Url> {
    let raw = raw.trim();
    let parsed = match Url::parse(raw) {
        Ok(parsed) => parsed,
        Err(url::ParseError::RelativeUrlWithoutBase) if !raw.starts_with('/') => {
            Url::parse(&format!("https://{}", raw)).ok()?
        }
        Err(_) => return None,
    };

    (matches!(parsed.scheme(), "http" | "https") && parsed.host_str().is_some()).then_some(parsed)
}

/// Site-relative path like `/uploads/a.pdf`, resolved against the portal itself.
pub fn parse_site_path(raw: &str) -> Option<Url> {
    if !raw.starts_with('/') || raw.starts_with("//") || raw.starts_with("/\\") {
        return None;
    }
    SITE_BASE.join(raw).ok()
}

/// Lowercased extension of the last path segment, ignoring query and fragment.
fn extension(url: &str) -> Option<String> {
    let parsed = parse_web_url(url).or_else(|| parse_site_path(url))?;
    let last_segment = parsed.path_segments()?.next_back()?;
    let (_, ext) = last_segment.rsplit_once('.')?;
    if ext.is_empty() {
        None
    } else {
        Some(ext.to_ascii_lowercase())
    }
}

fn video_mime(ext: &str) -> &'static str {
    match ext {
        "mp4" => "video/mp4",
        "webm" => "video/webm",
        "mov" => "video/quicktime",
        _ => "video/x-msvideo",
    }
}

fn audio_mime(ext: Option<&str>) -> &'static str {
    match ext {
        Some("wav") => "audio/wav",
        Some("m4a") => "audio/mp4",
        _ => "audio/mpeg",
    }
}

/// YouTube and Vimeo links become their player urls.
fn platform_embed_url(url: &str) -> Option<String> {
    let parsed = parse_web_url(url)?;
    let host = parsed.host_str()?;
    let host = host
        .strip_prefix("www.")
        .or_else(|| host.strip_prefix("m."))
        .unwrap_or(host);
    let segments: Vec<&str> = parsed
        .path_segments()
        .map(|segments| segments.filter(|s| !s.is_empty()).collect())
        .unwrap_or_default();

    match host {
        "youtu.be" => youtube_embed(segments.first()?),
        "youtube.com" | "youtube-nocookie.com" => match segments.as_slice() {
            ["embed" | "shorts" | "live" | "v", id, ..] => youtube_embed(id),
            _ => {
                let (_, id) = parsed.query_pairs().find(|(key, _)| key == "v")?;
                youtube_embed(&id)
            }
        },
        "vimeo.com" => {
            let id = segments.first()?;
            if id.chars().all(|c| c.is_ascii_digit()) {
                Some(format!("https://player.vimeo.com/video/{}", id))
            } else {
                None
            }
        }
        _ => None,
    }
}

fn youtube_embed(id: &str) -> Option<String> {
    if VIDEO_ID.is_match(id) {
        Some(format!("https://www.youtube.com/embed/{}", id))
    } else {
        None
    }
}

pub fn escape_html(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#x27;"),
            _ => escaped.push(c),
        }
    }
    escaped
}
