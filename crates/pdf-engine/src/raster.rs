//! Paints the image XObjects a page draws onto a white canvas. Text and vector
//! paths are left blank; the pdfium backend draws those.

use crate::{PageSize, RgbaImage};
use image::{DynamicImage, GrayImage, ImageFormat, Rgba, RgbImage};
use lopdf::{Dictionary, Document, Object, ObjectId, Stream};
use tracing::debug;

const PAPER: Rgba<u8> = Rgba([255, 255, 255, 255]);

/// Affine transform `[a b c d e f]` in PDF row-vector convention.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Matrix {
    a: f32,
    b: f32,
    c: f32,
    d: f32,
    e: f32,
    f: f32,
}

impl Matrix {
    fn from_operands(operands: &[Object]) -> Option<Self> {
        let [a, b, c, d, e, f] = operands else {
            return None;
        };

        Some(Self {
            a: a.as_float().ok()?,
            b: b.as_float().ok()?,
            c: c.as_float().ok()?,
            d: d.as_float().ok()?,
            e: e.as_float().ok()?,
            f: f.as_float().ok()?,
        })
    }

    /// `self` applied first, then `next`.
    fn then(self, next: Matrix) -> Matrix {
        Matrix {
            a: self.a * next.a + self.b * next.c,
            b: self.a * next.b + self.b * next.d,
            c: self.c * next.a + self.d * next.c,
            d: self.c * next.b + self.d * next.d,
            e: self.e * next.a + self.f * next.c + next.e,
            f: self.e * next.b + self.f * next.d + next.f,
        }
    }

    fn apply(self, x: f32, y: f32) -> (f32, f32) {
        (x * self.a + y * self.c + self.e, x * self.b + y * self.d + self.f)
    }

    fn invert(self) -> Option<Matrix> {
        let det = self.a * self.d - self.b * self.c;
        if det.abs() < f32::EPSILON || !det.is_finite() {
            return None;
        }

        Some(Matrix {
            a: self.d / det,
            b: -self.b / det,
            c: -self.c / det,
            d: self.a / det,
            e: (self.c * self.f - self.d * self.e) / det,
            f: (self.b * self.e - self.a * self.f) / det,
        })
    }
}

pub(crate) fn canvas_size(size: PageSize, scale: f32) -> (u32, u32) {
    let width = (size.width_pt * scale).round().max(1.0) as u32;
    let height = (size.height_pt * scale).round().max(1.0) as u32;
    (width, height)
}

pub(crate) fn render_page(doc: &Document, page_id: ObjectId, size: PageSize, scale: f32) -> RgbaImage {
    let (width, height) = canvas_size(size, scale);
    let mut canvas = RgbaImage::from_pixel(width, height, PAPER);

    let content = match doc.get_and_decode_page_content(page_id) {
        Ok(content) => content,
        Err(err) => {
            debug!(?page_id, %err, "page has no drawable content");
            return canvas;
        }
    };
    let resources = page_resources(doc, page_id);

    // User space has its origin bottom-left; the canvas top-left.
    let device =
        Matrix { a: scale, b: 0.0, c: 0.0, d: -scale, e: 0.0, f: size.height_pt * scale };
    let mut ctm = device;
    let mut saved = Vec::new();

    for operation in &content.operations {
        match operation.operator.as_str() {
            "q" => saved.push(ctm),
            "Q" => ctm = saved.pop().unwrap_or(device),
            "cm" => {
                if let Some(matrix) = Matrix::from_operands(&operation.operands) {
                    ctm = matrix.then(ctm);
                }
            }
            "Do" => {
                let image = operation
                    .operands
                    .first()
                    .and_then(|name| name.as_name().ok())
                    .and_then(|name| xobject_image(doc, resources, name));
                if let Some(image) = image {
                    paint(&mut canvas, &image, ctm);
                }
            }
            _ => {}
        }
    }

    canvas
}

fn resolve<'a>(doc: &'a Document, object: &'a Object) -> Option<&'a Object> {
    match object {
        Object::Reference(id) => doc.get_object(*id).ok(),
        other => Some(other),
    }
}

/// Resources of a page, inherited from the page tree when the page has none.
fn page_resources(doc: &Document, page_id: ObjectId) -> Option<&Dictionary> {
    let mut current = doc.get_dictionary(page_id).ok()?;

    for _ in 0..32 {
        if let Ok(resources) = current.get(b"Resources") {
            return resolve(doc, resources)?.as_dict().ok();
        }

        let parent = current.get(b"Parent").ok()?.as_reference().ok()?;
        current = doc.get_dictionary(parent).ok()?;
    }

    None
}

fn xobject_image(doc: &Document, resources: Option<&Dictionary>, name: &[u8]) -> Option<RgbaImage> {
    let xobjects = resolve(doc, resources?.get(b"XObject").ok()?)?.as_dict().ok()?;
    let stream = resolve(doc, xobjects.get(name).ok()?)?.as_stream().ok()?;

    match stream.dict.get(b"Subtype").and_then(Object::as_name) {
        Ok(b"Image") => decode_image(stream),
        _ => None,
    }
}

fn decode_image(stream: &Stream) -> Option<RgbaImage> {
    let filters = stream.filters().unwrap_or_default();
    if filters.iter().any(|filter| *filter == b"DCTDecode") {
        return image::load_from_memory_with_format(&stream.content, ImageFormat::Jpeg)
            .map(|image| image.to_rgba8())
            .ok();
    }

    let width = u32::try_from(stream.dict.get(b"Width").ok()?.as_i64().ok()?).ok()?;
    let height = u32::try_from(stream.dict.get(b"Height").ok()?.as_i64().ok()?).ok()?;
    let bits = stream.dict.get(b"BitsPerComponent").and_then(Object::as_i64).unwrap_or(8);
    if bits != 8 || width == 0 || height == 0 {
        return None;
    }

    let channels = match stream.dict.get(b"ColorSpace").and_then(Object::as_name) {
        Ok(b"DeviceRGB") => 3,
        Ok(b"DeviceGray") => 1,
        _ => return None,
    };

    let mut samples =
        if filters.is_empty() { stream.content.clone() } else { stream.decompressed_content().ok()? };
    samples.truncate(width as usize * height as usize * channels);

    let image = if channels == 3 {
        DynamicImage::ImageRgb8(RgbImage::from_raw(width, height, samples)?)
    } else {
        DynamicImage::ImageLuma8(GrayImage::from_raw(width, height, samples)?)
    };
    Some(image.to_rgba8())
}

/// Draws `image` into the unit square mapped through `ctm`, nearest neighbour.
fn paint(canvas: &mut RgbaImage, image: &RgbaImage, ctm: Matrix) {
    let Some(inverse) = ctm.invert() else {
        return;
    };

    let corners = [(0.0, 0.0), (1.0, 0.0), (0.0, 1.0), (1.0, 1.0)].map(|(u, v)| ctm.apply(u, v));
    let min = |pick: fn(&(f32, f32)) -> f32| corners.iter().map(pick).fold(f32::INFINITY, f32::min);
    let max =
        |pick: fn(&(f32, f32)) -> f32| corners.iter().map(pick).fold(f32::NEG_INFINITY, f32::max);

    let x0 = min(|p| p.0).floor().max(0.0) as u32;
    let y0 = min(|p| p.1).floor().max(0.0) as u32;
    let x1 = (max(|p| p.0).ceil().max(0.0) as u32).min(canvas.width());
    let y1 = (max(|p| p.1).ceil().max(0.0) as u32).min(canvas.height());

    let (image_width, image_height) = image.dimensions();

    for y in y0..y1 {
        for x in x0..x1 {
            let (u, v) = inverse.apply(x as f32 + 0.5, y as f32 + 0.5);
            if !(0.0..1.0).contains(&u) || !(0.0..1.0).contains(&v) {
                continue;
            }

            // Image row 0 is the top edge of the unit square.
            let ix = ((u * image_width as f32) as u32).min(image_width - 1);
            let iy = (((1.0 - v) * image_height as f32) as u32).min(image_height - 1);
            canvas.put_pixel(x, y, *image.get_pixel(ix, iy));
        }
    }
}
