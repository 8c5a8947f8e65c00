use doc_model::LayoutMode;

pub const ZOOM_MIN: f32 = 0.5;
pub const ZOOM_MAX: f32 = 3.0;
pub const ZOOM_DEFAULT: f32 = 1.0;
pub const ZOOM_STEP: f32 = 0.15;

pub const FONT_SIZE_MIN: u8 = 8;
pub const FONT_SIZE_MAX: u8 = 40;

pub const ZOOM_PERCENT_MIN: u32 = 50;
pub const ZOOM_PERCENT_MAX: u32 = 300;

/// Clamps a raster zoom factor. `NaN` has no meaningful clamp and yields `None`.
pub fn clamp_zoom(value: f32) -> Option<f32> {
    if value.is_nan() {
        return None;
    }

    Some(value.clamp(ZOOM_MIN, ZOOM_MAX))
}

pub fn clamp_font_size(value: i64) -> u8 {
    value.clamp(i64::from(FONT_SIZE_MIN), i64::from(FONT_SIZE_MAX)) as u8
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewState {
    pub(crate) page_index: usize,
    pub(crate) zoom: f32,
    pub(crate) font_size: u8,
    pub(crate) layout: LayoutMode,
    pub(crate) dirty: bool,
}

impl ViewState {
    /// Fresh state for a newly loaded (or absent) document.
    pub fn reset(base_font_size: u8) -> Self {
        Self {
            page_index: 0,
            zoom: ZOOM_DEFAULT,
            font_size: clamp_font_size(i64::from(base_font_size)),
            layout: LayoutMode::Single,
            dirty: true,
        }
    }

    pub fn page_index(&self) -> usize {
        self.page_index
    }

    pub fn zoom(&self) -> f32 {
        self.zoom
    }

    pub fn font_size(&self) -> u8 {
        self.font_size
    }

    pub fn layout(&self) -> LayoutMode {
        self.layout
    }

    /// Whether the continuous layout must be rebuilt before it is shown again.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }
}
