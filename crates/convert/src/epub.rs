use crate::text::read_text;
use crate::{check_output, ConvertError};
use std::fs::File;
use std::io::Write;
use std::path::Path;
use tracing::info;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

const IDENTIFIER: &str = "fereader-convert";
const CHAPTER_FILE: &str = "chap_1.xhtml";

const CONTAINER_XML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<container version="1.0" xmlns="urn:oasis:names:tc:opendocument:xmlns:container">
  <rootfiles>
    <rootfile full-path="EPUB/content.opf" media-type="application/oebps-package+xml"/>
  </rootfiles>
</container>
"#;

fn package_document(title: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<package xmlns="http://www.idpf.org/2007/opf" version="3.0" unique-identifier="id">
  <metadata xmlns:dc="http://purl.org/dc/elements/1.1/">
    <dc:identifier id="id">{IDENTIFIER}</dc:identifier>
    <dc:title>{title}</dc:title>
    <dc:language>en</dc:language>
  </metadata>
  <manifest>
    <item id="nav" href="nav.xhtml" media-type="application/xhtml+xml" properties="nav"/>
    <item id="ncx" href="toc.ncx" media-type="application/x-dtbncx+xml"/>
    <item id="chapter_0" href="{CHAPTER_FILE}" media-type="application/xhtml+xml"/>
  </manifest>
  <spine toc="ncx">
    <itemref idref="nav"/>
    <itemref idref="chapter_0"/>
  </spine>
</package>
"#
    )
}

fn nav_document(title: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<html xmlns="http://www.w3.org/1999/xhtml" xmlns:epub="http://www.idpf.org/2007/ops" lang="en">
<head><title>{title}</title></head>
<body>
  <nav epub:type="toc" id="toc">
    <h2>{title}</h2>
    <ol><li><a href="{CHAPTER_FILE}">Chapter 1</a></li></ol>
  </nav>
</body>
</html>
"#
    )
}

fn ncx_document(title: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<ncx xmlns="http://www.daisy.org/z3986/2005/ncx/" version="2005-1">
  <head><meta name="dtb:uid" content="{IDENTIFIER}"/></head>
  <docTitle><text>{title}</text></docTitle>
  <navMap>
    <navPoint id="chapter_0" playOrder="1">
      <navLabel><text>Chapter 1</text></navLabel>
      <content src="{CHAPTER_FILE}"/>
    </navPoint>
  </navMap>
</ncx>
"#
    )
}

fn chapter_document(text: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<html xmlns="http://www.w3.org/1999/xhtml" lang="en">
<head><title>Chapter 1</title></head>
<body><pre>{}</pre></body>
</html>
"#,
        html_escape::encode_text(text)
    )
}

/// Packs a text file into a one-chapter EPUB 3 book titled after the file.
pub fn text_to_epub(input: &Path, output: &Path) -> Result<(), ConvertError> {
    check_output(output)?;
    let text = read_text(input)?;
    let file_name =
        input.file_name().map(|name| name.to_string_lossy().into_owned()).unwrap_or_default();
    let title = html_escape::encode_text(&file_name);

    let mut writer = ZipWriter::new(File::create(output)?);
    let stored = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);
    let deflated = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    writer.start_file("mimetype", stored)?;
    writer.write_all(b"application/epub+zip")?;

    let entries = [
        ("META-INF/container.xml", CONTAINER_XML.to_owned()),
        ("EPUB/content.opf", package_document(&title)),
        ("EPUB/nav.xhtml", nav_document(&title)),
        ("EPUB/toc.ncx", ncx_document(&title)),
        ("EPUB/chap_1.xhtml", chapter_document(&text)),
    ];
    for (name, body) in entries {
        writer.start_file(name, deflated)?;
        writer.write_all(body.as_bytes())?;
    }
    writer.finish()?;

    info!(input = %input.display(), output = %output.display(), "converted text to EPUB");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use epub_engine::EpubEngine;
    use std::fs;
    use zip::ZipArchive;

    #[test]
    fn mimetype_is_first_and_uncompressed() {
        let temp = tempfile::tempdir().expect("temp dir should be created");
        let input = temp.path().join("story.txt");
        let output = temp.path().join("story.epub");
        fs::write(&input, "Once upon a time").expect("write input");

        text_to_epub(&input, &output).expect("conversion should succeed");

        let mut archive =
            ZipArchive::new(File::open(&output).expect("open output")).expect("valid zip");
        let first = archive.by_index(0).expect("first entry");
        assert_eq!(first.name(), "mimetype");
        assert_eq!(first.compression(), CompressionMethod::Stored);
    }

    #[test]
    fn book_reads_back_with_escaped_text() {
        let temp = tempfile::tempdir().expect("temp dir should be created");
        let input = temp.path().join("a&b.txt");
        let output = temp.path().join("book.epub");
        fs::write(&input, "x < y && y > z").expect("write input");

        text_to_epub(&input, &output).expect("conversion should succeed");

        let book = epub_engine::default_engine().open(&output).expect("book should open");
        assert_eq!(book.title.as_deref(), Some("a&b.txt"));
        assert_eq!(book.chapters.len(), 2);
        assert!(book.chapters[0].html.contains("Chapter 1"));
        assert!(book.chapters[1].html.contains("<pre>x &lt; y &amp;&amp; y &gt; z</pre>"));
    }
}
