use super::ComposeError;
use kurbo::{Point, Rect};
use rand::Rng;

/// Fixed page geometry for the composed lookbook.
///
/// The canvas is roughly A4 portrait at print resolution; the grid below the
/// title band holds one "pasted photo" card per panel.
#[derive(Clone, Copy, Debug)]
pub struct PageGeometry {
    pub width: u32,
    pub height: u32,
    pub title_band: f64,
    pub columns: usize,
    pub rows: usize,
    pub cell_padding: f64,
    /// Card width as a fraction of the cell width.
    pub card_width_frac: f64,
    /// Card height as a multiple of card width (taller than wide).
    pub card_aspect: f64,
    /// Maximum absolute tilt applied to a card, in degrees.
    pub max_tilt_deg: f64,
}

impl Default for PageGeometry {
    fn default() -> Self {
        Self {
            width: 2480,
            height: 3508,
            title_band: 420.0,
            columns: 2,
            rows: 3,
            cell_padding: 56.0,
            card_width_frac: 0.9,
            card_aspect: 1.25,
            max_tilt_deg: 4.3,
        }
    }
}

impl PageGeometry {
    pub fn capacity(&self) -> usize {
        self.columns * self.rows
    }
}

/// A decorative "adhesive tape" strip, described in page coordinates before
/// the panel rotation is applied.
#[derive(Clone, Copy, Debug)]
pub struct TapeStrip {
    pub center: Point,
    pub width: f64,
    pub height: f64,
    pub angle: f64,
}

/// Explicit draw parameters for one panel. Everything the renderer needs is
/// precomputed here, so drawing never depends on implicit transform state
/// carried over from a previous panel.
#[derive(Clone, Debug)]
pub struct PanelPlacement {
    pub caption: String,
    /// Card rect in page coordinates, axis-aligned; `rotation` is applied
    /// about its center at draw time.
    pub card: Rect,
    /// Tilt in radians, uniform within the configured maximum.
    pub rotation: f64,
    /// Inset region the image is aspect-fitted into.
    pub image_area: Rect,
    /// Reserved band at the bottom of the card for the caption.
    pub caption_area: Rect,
    pub tape: [TapeStrip; 2],
}

#[derive(Clone, Debug)]
pub struct PageLayout {
    pub width: u32,
    pub height: u32,
    pub title_area: Rect,
    pub panels: Vec<PanelPlacement>,
}

impl PanelPlacement {
    /// Corners of the card after rotation, for overlap checks.
    pub fn rotated_corners(&self) -> [Point; 4] {
        let c = self.card.center();
        let rot = kurbo::Affine::rotate_about(self.rotation, c);
        [
            rot * Point::new(self.card.x0, self.card.y0),
            rot * Point::new(self.card.x1, self.card.y0),
            rot * Point::new(self.card.x1, self.card.y1),
            rot * Point::new(self.card.x0, self.card.y1),
        ]
    }
}

/// Plan the whole page for the given captions.
///
/// Pure aside from the rng: a seeded rng reproduces the layout exactly.
pub fn plan_page(
    geometry: &PageGeometry,
    captions: &[String],
    rng: &mut impl Rng,
) -> Result<PageLayout, ComposeError> {
    if captions.is_empty() {
        return Err(ComposeError::EmptyPage);
    }
    if captions.len() > geometry.capacity() {
        return Err(ComposeError::TooManyPanels {
            count: captions.len(),
            capacity: geometry.capacity(),
        });
    }

    let width = geometry.width as f64;
    let height = geometry.height as f64;
    let cell_w = width / geometry.columns as f64;
    let cell_h = (height - geometry.title_band) / geometry.rows as f64;

    let max_tilt = geometry.max_tilt_deg.to_radians();

    // The reference card is card_width_frac of the cell, 1.25x taller than
    // wide; shrink it when the cell is too short for that aspect so tilted
    // neighbours cannot collide.
    let card_w = (cell_w * geometry.card_width_frac)
        .min((cell_h - 2.0 * geometry.cell_padding) / geometry.card_aspect);
    let card_h = card_w * geometry.card_aspect;

    let mut panels = Vec::with_capacity(captions.len());
    for (i, caption) in captions.iter().enumerate() {
        let col = (i % geometry.columns) as f64;
        let row = (i / geometry.columns) as f64;
        let cell_cx = col * cell_w + cell_w / 2.0;
        let cell_cy = geometry.title_band + row * cell_h + cell_h / 2.0;

        let card = Rect::new(
            cell_cx - card_w / 2.0,
            cell_cy - card_h / 2.0,
            cell_cx + card_w / 2.0,
            cell_cy + card_h / 2.0,
        );
        let rotation = rng.random_range(-max_tilt..=max_tilt);

        let margin = card_w * 0.055;
        let caption_band = card_h * 0.18;
        let image_area = Rect::new(
            card.x0 + margin,
            card.y0 + margin,
            card.x1 - margin,
            card.y1 - caption_band - margin * 0.5,
        );
        let caption_area = Rect::new(
            card.x0 + margin,
            card.y1 - caption_band,
            card.x1 - margin,
            card.y1 - margin * 0.6,
        );

        let tape_w = card_w * 0.26;
        let tape_h = card_w * 0.085;
        let tape = [
            TapeStrip {
                center: Point::new(card.x0, card.y0),
                width: tape_w,
                height: tape_h,
                angle: -std::f64::consts::FRAC_PI_4 + rng.random_range(-0.12..=0.12),
            },
            TapeStrip {
                center: Point::new(card.x1, card.y1),
                width: tape_w,
                height: tape_h,
                angle: -std::f64::consts::FRAC_PI_4 + rng.random_range(-0.12..=0.12),
            },
        ];

        panels.push(PanelPlacement {
            caption: caption.clone(),
            card,
            rotation,
            image_area,
            caption_area,
            tape,
        });
    }

    Ok(PageLayout {
        width: geometry.width,
        height: geometry.height,
        title_area: Rect::new(0.0, 0.0, width, geometry.title_band),
        panels,
    })
}

/// Largest rect with the source aspect ratio that fits inside `bounds`,
/// centered on the unfilled axis.
pub fn fit_rect(src_w: u32, src_h: u32, bounds: Rect) -> Rect {
    if src_w == 0 || src_h == 0 {
        return Rect::new(bounds.center().x, bounds.center().y, bounds.center().x, bounds.center().y);
    }
    let scale = (bounds.width() / src_w as f64).min(bounds.height() / src_h as f64);
    let w = src_w as f64 * scale;
    let h = src_h as f64 * scale;
    let c = bounds.center();
    Rect::new(c.x - w / 2.0, c.y - h / 2.0, c.x + w / 2.0, c.y + h / 2.0)
}
