//! Rewrites chapter resource links to point into the extraction directory.

use crate::EpubError;
use lol_html::html_content::Element;
use lol_html::{element, rewrite_str, RewriteStrSettings};
use std::path::Path;

/// Joins an href onto an archive directory, decoding percent escapes and
/// collapsing `.`/`..` segments. Paths never climb above the archive root.
pub fn join_archive_path(base_dir: &str, href: &str) -> String {
    let href = href.split(['#', '?']).next().unwrap_or_default();
    let decoded =
        urlencoding::decode(href).map(|cow| cow.into_owned()).unwrap_or_else(|_| href.to_owned());

    let joined = if decoded.starts_with('/') {
        decoded
    } else {
        format!("{base_dir}/{decoded}")
    };

    let mut segments: Vec<&str> = Vec::new();

    for segment in joined.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            other => segments.push(other),
        }
    }

    segments.join("/")
}

fn is_external(link: &str) -> bool {
    let lower = link.trim().to_ascii_lowercase();
    lower.is_empty()
        || lower.starts_with('#')
        || lower.starts_with("data:")
        || lower.starts_with("mailto:")
        || lower.starts_with("file:")
        || lower.contains("://")
}

pub fn file_url(path: &Path) -> String {
    let raw = path.to_string_lossy().replace('\\', "/");
    let encoded = raw
        .split('/')
        .map(|segment| {
            // Keep Windows drive prefixes such as `C:` readable.
            if segment.len() == 2 && segment.ends_with(':') {
                segment.to_owned()
            } else {
                urlencoding::encode(segment).into_owned()
            }
        })
        .collect::<Vec<_>>()
        .join("/");

    if encoded.starts_with('/') {
        format!("file://{encoded}")
    } else {
        format!("file:///{encoded}")
    }
}

fn localize(link: &str, chapter_dir: &str, resource_root: &Path) -> Option<String> {
    if is_external(link) {
        return None;
    }

    let relative = join_archive_path(chapter_dir, link);
    let local = relative.split('/').fold(resource_root.to_path_buf(), |acc, part| acc.join(part));
    Some(file_url(&local))
}

fn rewrite_attribute(
    el: &mut Element<'_, '_>,
    name: &str,
    chapter_dir: &str,
    resource_root: &Path,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    if let Some(value) = el.get_attribute(name) {
        if let Some(url) = localize(&value, chapter_dir, resource_root) {
            el.set_attribute(name, &url)?;
        }
    }
    Ok(())
}

/// Rewrites `img`/`image` sources and `link` hrefs of a chapter to `file://`
/// URLs under `resource_root`. External and fragment links are left alone.
pub fn rewrite_links(
    html: &str,
    chapter_path: &str,
    resource_root: &Path,
) -> Result<String, EpubError> {
    let chapter_dir = chapter_path.rsplit_once('/').map(|(dir, _)| dir).unwrap_or_default();

    rewrite_str(
        html,
        RewriteStrSettings {
            element_content_handlers: vec![
                element!("img[src]", |el| {
                    rewrite_attribute(el, "src", chapter_dir, resource_root)
                }),
                element!("image", |el| {
                    rewrite_attribute(el, "href", chapter_dir, resource_root)?;
                    rewrite_attribute(el, "xlink:href", chapter_dir, resource_root)
                }),
                element!("link[href]", |el| {
                    rewrite_attribute(el, "href", chapter_dir, resource_root)
                }),
            ],
            ..RewriteStrSettings::default()
        },
    )
    .map_err(|err| EpubError::Rewrite(err.to_string()))
}
