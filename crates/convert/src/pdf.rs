use crate::text::{latin1, read_text, wrap};
use crate::{check_output, ConvertError};
use lopdf::content::{Content, Operation};
use lopdf::encryption::crypt_filters::{Aes128CryptFilter, CryptFilter};
use lopdf::{
    dictionary, Dictionary, Document, EncryptionState, EncryptionVersion, Object, ObjectId,
    Permissions, Stream, StringFormat,
};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, info};

/// A4 in points.
const PAGE_WIDTH: i64 = 595;
const PAGE_HEIGHT: i64 = 842;

const FONT_SIZE: i64 = 11;
const LEADING: i64 = 13;
const MARGIN_LEFT: i64 = 50;
/// Top edge of the text box, 50pt below the top of the page.
const TEXT_TOP: i64 = PAGE_HEIGHT - 50;
/// Bottom edge of the text box, 800pt below the top of the page.
const TEXT_BOTTOM: i64 = PAGE_HEIGHT - 800;
/// Courier advances 0.6em per glyph; 75 glyphs fill the 500pt box.
const COLUMNS: usize = 75;
const LINES_PER_PAGE: usize = ((TEXT_TOP - FONT_SIZE - TEXT_BOTTOM) / LEADING + 1) as usize;

/// Collects pages and writes the page tree once all of them are added.
struct PdfBuilder {
    doc: Document,
    pages_id: ObjectId,
    kids: Vec<Object>,
}

impl PdfBuilder {
    fn new() -> Self {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        Self { doc, pages_id, kids: Vec::new() }
    }

    fn add_page(
        &mut self,
        width: i64,
        height: i64,
        resources: Dictionary,
        content: Content,
    ) -> Result<(), ConvertError> {
        let content_id = self.doc.add_object(Stream::new(Dictionary::new(), content.encode()?));
        let page_id = self.doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => self.pages_id,
            "MediaBox" => vec![0.into(), 0.into(), width.into(), height.into()],
            "Resources" => resources,
            "Contents" => content_id,
        });
        self.kids.push(page_id.into());
        Ok(())
    }

    /// Locks the document with AES-128, `password` serving as both the user
    /// and the owner password.
    fn encrypt(&mut self, password: &str) -> Result<(), ConvertError> {
        let seed = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_nanos();
        let id = Object::String(seed.to_le_bytes().to_vec(), StringFormat::Hexadecimal);
        self.doc.trailer.set("ID", vec![id.clone(), id]);

        let filter: Arc<dyn CryptFilter> = Arc::new(Aes128CryptFilter);
        let state = EncryptionState::try_from(EncryptionVersion::V4 {
            document: &self.doc,
            encrypt_metadata: true,
            crypt_filters: BTreeMap::from([(b"StdCF".to_vec(), filter)]),
            stream_filter: b"StdCF".to_vec(),
            string_filter: b"StdCF".to_vec(),
            owner_password: password,
            user_password: password,
            permissions: Permissions::all(),
        })?;
        self.doc.encrypt(&state)?;
        debug!("encrypted output with AES-128");
        Ok(())
    }

    /// Writes the page tree and saves. An empty password means no encryption.
    fn save(mut self, output: &Path, password: Option<&str>) -> Result<usize, ConvertError> {
        let page_count = self.kids.len();
        let pages = dictionary! {
            "Type" => "Pages",
            "Kids" => std::mem::take(&mut self.kids),
            "Count" => page_count as i64,
        };
        self.doc.objects.insert(self.pages_id, Object::Dictionary(pages));

        let catalog_id = self.doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => self.pages_id,
        });
        self.doc.trailer.set("Root", catalog_id);
        self.doc.compress();
        if let Some(password) = password.filter(|password| !password.is_empty()) {
            self.encrypt(password)?;
        }
        self.doc.save(output)?;

        Ok(page_count)
    }
}

/// Typesets a text file onto A4 pages in 11pt Courier, optionally locked
/// with `password`.
pub fn text_to_pdf(
    input: &Path,
    output: &Path,
    password: Option<&str>,
) -> Result<(), ConvertError> {
    check_output(output)?;
    let text = read_text(input)?;
    let lines = wrap(&text, COLUMNS);

    let mut builder = PdfBuilder::new();
    let font_id = builder.doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Courier",
        "Encoding" => "WinAnsiEncoding",
    });

    let mut chunks: Vec<&[String]> = lines.chunks(LINES_PER_PAGE).collect();
    if chunks.is_empty() {
        chunks.push(&[]);
    }

    for chunk in chunks {
        let mut operations = vec![
            Operation::new("BT", vec![]),
            Operation::new("Tf", vec!["F1".into(), FONT_SIZE.into()]),
            Operation::new("TL", vec![LEADING.into()]),
            Operation::new("Td", vec![MARGIN_LEFT.into(), (TEXT_TOP - FONT_SIZE).into()]),
        ];
        for line in chunk {
            operations.push(Operation::new(
                "Tj",
                vec![Object::String(latin1(line), StringFormat::Literal)],
            ));
            operations.push(Operation::new("T*", vec![]));
        }
        operations.push(Operation::new("ET", vec![]));

        let resources = dictionary! {
            "Font" => dictionary! { "F1" => font_id },
        };
        builder.add_page(PAGE_WIDTH, PAGE_HEIGHT, resources, Content { operations })?;
    }

    let pages = builder.save(output, password)?;
    info!(input = %input.display(), output = %output.display(), pages, "converted text to PDF");
    Ok(())
}

/// Writes one page per image, each page sized to the image in pixels.
pub fn images_to_pdf<P: AsRef<Path>>(
    inputs: &[P],
    output: &Path,
    password: Option<&str>,
) -> Result<(), ConvertError> {
    if inputs.is_empty() {
        return Err(ConvertError::NoInput);
    }
    check_output(output)?;

    let mut builder = PdfBuilder::new();

    for input in inputs {
        let input = input.as_ref();
        let image = image::open(input)
            .map_err(|source| ConvertError::Image { path: input.to_path_buf(), source })?
            .to_rgb8();
        let (width, height) = (i64::from(image.width()), i64::from(image.height()));

        let image_id = builder.doc.add_object(Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => width,
                "Height" => height,
                "ColorSpace" => "DeviceRGB",
                "BitsPerComponent" => 8,
            },
            image.into_raw(),
        ));

        let content = Content {
            operations: vec![
                Operation::new("q", vec![]),
                Operation::new(
                    "cm",
                    vec![width.into(), 0.into(), 0.into(), height.into(), 0.into(), 0.into()],
                ),
                Operation::new("Do", vec!["Im0".into()]),
                Operation::new("Q", vec![]),
            ],
        };
        let resources = dictionary! {
            "XObject" => dictionary! { "Im0" => image_id },
        };
        builder.add_page(width, height, resources, content)?;
    }

    let pages = builder.save(output, password)?;
    info!(output = %output.display(), pages, "converted images to PDF");
    Ok(())
}
