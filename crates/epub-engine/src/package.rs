//! Container and OPF package parsing.

use crate::EpubError;
use std::collections::HashMap;

const CONTAINER_PATH: &str = "META-INF/container.xml";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestItem {
    pub href: String,
    pub media_type: String,
}

impl ManifestItem {
    pub fn is_document(&self) -> bool {
        matches!(self.media_type.as_str(), "application/xhtml+xml" | "text/html")
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Package {
    pub title: Option<String>,
    /// Directory of the OPF inside the archive, `""` at the root.
    pub base_dir: String,
    pub manifest: HashMap<String, ManifestItem>,
    /// Manifest ids in reading order.
    pub spine: Vec<String>,
}

impl Package {
    /// Archive paths of the spine documents, in reading order.
    pub fn spine_documents(&self) -> Vec<String> {
        self.spine
            .iter()
            .filter_map(|id| self.manifest.get(id))
            .filter(|item| item.is_document())
            .map(|item| crate::links::join_archive_path(&self.base_dir, &item.href))
            .collect()
    }
}

pub fn container_path() -> &'static str {
    CONTAINER_PATH
}

/// Returns the archive path of the first rootfile listed in `container.xml`.
pub fn parse_container(xml: &str) -> Result<String, EpubError> {
    let doc = roxmltree::Document::parse(xml)?;

    doc.descendants()
        .filter(|node| node.tag_name().name() == "rootfile")
        .find_map(|node| node.attribute("full-path"))
        .map(|path| path.trim_start_matches('/').to_owned())
        .ok_or(EpubError::MissingRootfile)
}

pub fn parse_opf(xml: &str, opf_path: &str) -> Result<Package, EpubError> {
    let doc = roxmltree::Document::parse(xml)?;
    let base_dir = opf_path.rsplit_once('/').map(|(dir, _)| dir.to_owned()).unwrap_or_default();

    let title = doc
        .descendants()
        .find(|node| node.tag_name().name() == "title")
        .and_then(|node| node.text())
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .map(ToOwned::to_owned);

    let manifest = doc
        .descendants()
        .filter(|node| node.tag_name().name() == "item")
        .filter_map(|node| {
            let id = node.attribute("id")?;
            let href = node.attribute("href")?;
            let media_type = node.attribute("media-type").unwrap_or_default();
            Some((
                id.to_owned(),
                ManifestItem { href: href.to_owned(), media_type: media_type.to_owned() },
            ))
        })
        .collect();

    let spine = doc
        .descendants()
        .filter(|node| node.tag_name().name() == "itemref")
        .filter_map(|node| node.attribute("idref"))
        .map(ToOwned::to_owned)
        .collect();

    Ok(Package { title, base_dir, manifest, spine })
}

#[cfg(test)]
mod tests {
    use super::*;

    const OPF: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<package xmlns="http://www.idpf.org/2007/opf" version="3.0" unique-identifier="id">
  <metadata xmlns:dc="http://purl.org/dc/elements/1.1/">
    <dc:identifier id="id">urn:test</dc:identifier>
    <dc:title> A Small Book </dc:title>
  </metadata>
  <manifest>
    <item id="c2" href="text/two.xhtml" media-type="application/xhtml+xml"/>
    <item id="c1" href="text/one.xhtml" media-type="application/xhtml+xml"/>
    <item id="css" href="style.css" media-type="text/css"/>
    <item id="cover" href="images/cover.png" media-type="image/png"/>
  </manifest>
  <spine>
    <itemref idref="c1"/>
    <itemref idref="css"/>
    <itemref idref="c2"/>
    <itemref idref="missing"/>
  </spine>
</package>"#;

    #[test]
    fn container_points_at_rootfile() {
        let xml = r#"<?xml version="1.0"?>
<container version="1.0" xmlns="urn:oasis:names:tc:opendocument:xmlns:container">
  <rootfiles>
    <rootfile full-path="OEBPS/content.opf" media-type="application/oebps-package+xml"/>
  </rootfiles>
</container>"#;

        assert_eq!(parse_container(xml).expect("container should parse"), "OEBPS/content.opf");
    }

    #[test]
    fn container_without_rootfile_is_rejected() {
        let err = parse_container("<container/>").expect_err("no rootfile");
        assert!(matches!(err, EpubError::MissingRootfile));
    }

    #[test]
    fn spine_order_wins_over_manifest_order() {
        let package = parse_opf(OPF, "OEBPS/content.opf").expect("opf should parse");

        assert_eq!(package.title.as_deref(), Some("A Small Book"));
        assert_eq!(package.base_dir, "OEBPS");
        assert_eq!(
            package.spine_documents(),
            vec!["OEBPS/text/one.xhtml".to_owned(), "OEBPS/text/two.xhtml".to_owned()]
        );
    }

    #[test]
    fn root_level_opf_has_empty_base_dir() {
        let package = parse_opf(OPF, "content.opf").expect("opf should parse");
        assert_eq!(package.base_dir, "");
        assert_eq!(package.spine_documents()[0], "text/one.xhtml");
    }
}
