use doc_model::{Palette, Rgb};
use image::{imageops, Rgba, RgbaImage};
use viewer_core::PageLayout;

/// Space around and between pages in the continuous layout.
pub const PAGE_GAP_PX: u32 = 16;

/// Stacks pages top to bottom, centred, on the theme background.
pub fn stack_pages(pages: &[PageLayout], background: Rgb) -> RgbaImage {
    let rendered: Vec<RgbaImage> = pages.iter().map(PageLayout::rasterize).collect();

    let widest = rendered.iter().map(RgbaImage::width).max().unwrap_or(0);
    let total: u32 = rendered.iter().map(RgbaImage::height).sum();
    let count = rendered.len() as u32;

    let width = widest + 2 * PAGE_GAP_PX;
    let height = total + PAGE_GAP_PX * (count + 1);
    let mut canvas = RgbaImage::from_pixel(width, height, Rgba(background.to_rgba()));

    let mut y = PAGE_GAP_PX;
    for page in &rendered {
        let x = (width - page.width()) / 2;
        imageops::overlay(&mut canvas, page, i64::from(x), i64::from(y));
        y += page.height() + PAGE_GAP_PX;
    }

    canvas
}

/// Wraps chapter markup with the reading font and theme colours.
pub fn styled_html(html: &str, font_family: &str, font_size: u8, palette: &Palette) -> String {
    let font_family = css_string(font_family);
    format!(
        "<style>body {{ font-family: \"{font_family}\"; font-size: {font_size}pt; \
         background-color: {}; color: {}; }}</style>\n{html}",
        palette.background, palette.text
    )
}

/// Escapes text for a double-quoted CSS string inside `<style>`.
fn css_string(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '\\' => escaped.push_str("\\\\"),
            '"' => escaped.push_str("\\\""),
            '<' => escaped.push_str("\\3c "),
            '\n' | '\r' => escaped.push(' '),
            other => escaped.push(other),
        }
    }
    escaped
}
