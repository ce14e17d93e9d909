use super::{
    layout::{fit_rect, plan_page, PageGeometry, PanelPlacement},
    text::{CaptionBrush, TextEngine},
    ComposeError,
};
use crate::generation::ImageData;
use image::ImageEncoder;
use rand::Rng;
use std::sync::Arc;

const BASE_TONE: [u8; 4] = [24, 22, 26, 255];
const CARD_TONE: [u8; 4] = [250, 247, 240, 255];
const INK_TONE: [u8; 4] = [52, 44, 66, 255];
const TAPE_TONE: [u8; 4] = [236, 229, 201, 110];
const TITLE_MAIN: &str = "THE LOOKBOOK";
const TITLE_SUB: &str = "a study in archetypes";
const TITLE_MAIN_GLOW: [u8; 4] = [255, 105, 180, 70];
const TITLE_SUB_GLOW: [u8; 4] = [80, 220, 255, 70];

/// Assembles named panel images into one decorated page.
///
/// The compositor is a pure function of its inputs plus the provided rng;
/// two calls only produce identical bytes when the rng is seeded the same
/// way, but canvas size, panel count and captions never vary.
pub struct Compositor {
    geometry: PageGeometry,
    font_bytes: Vec<u8>,
    stipple_count: u32,
    jpeg_quality: u8,
}

impl Compositor {
    pub fn new(font_bytes: Vec<u8>) -> Self {
        Self {
            geometry: PageGeometry::default(),
            font_bytes,
            stipple_count: 1400,
            jpeg_quality: 90,
        }
    }

    pub fn with_geometry(mut self, geometry: PageGeometry) -> Self {
        self.geometry = geometry;
        self
    }

    pub fn with_stipple_count(mut self, count: u32) -> Self {
        self.stipple_count = count;
        self
    }

    pub fn geometry(&self) -> &PageGeometry {
        &self.geometry
    }

    /// Compose the named images into one JPEG page, one panel per entry in
    /// input order. The caller is responsible for only passing successfully
    /// generated images.
    pub fn compose(
        &self,
        panels: &[(String, ImageData)],
        rng: &mut impl Rng,
    ) -> Result<ImageData, ComposeError> {
        let captions: Vec<String> = panels.iter().map(|(name, _)| name.clone()).collect();
        let layout = plan_page(&self.geometry, &captions, rng)?;

        let width: u16 = self
            .geometry
            .width
            .try_into()
            .map_err(|_| ComposeError::CanvasTooLarge(self.geometry.width, self.geometry.height))?;
        let height: u16 = self
            .geometry
            .height
            .try_into()
            .map_err(|_| ComposeError::CanvasTooLarge(self.geometry.width, self.geometry.height))?;

        let mut decoded = Vec::with_capacity(panels.len());
        for (name, image) in panels {
            decoded.push(decode_panel(name, image)?);
        }

        let font = vello_cpu::peniko::FontData::new(
            vello_cpu::peniko::Blob::from(self.font_bytes.clone()),
            0,
        );
        let mut text = TextEngine::new();

        let mut ctx = vello_cpu::RenderContext::new(width, height);

        self.draw_background(&mut ctx, rng);
        self.draw_title(&mut ctx, &mut text, &font)?;
        for (panel, image) in layout.panels.iter().zip(&decoded) {
            self.draw_panel(&mut ctx, &mut text, &font, panel, image)?;
        }

        ctx.flush();
        let mut pixmap = vello_cpu::Pixmap::new(width, height);
        ctx.render_to_pixmap(&mut pixmap);

        encode_jpeg(&pixmap, self.geometry.width, self.geometry.height, self.jpeg_quality)
    }

    fn draw_background(&self, ctx: &mut vello_cpu::RenderContext, rng: &mut impl Rng) {
        let w = self.geometry.width as f64;
        let h = self.geometry.height as f64;
        ctx.set_transform(vello_cpu::kurbo::Affine::IDENTITY);
        ctx.set_paint(color(BASE_TONE));
        ctx.fill_rect(&vello_cpu::kurbo::Rect::new(0.0, 0.0, w, h));

        // Low-alpha speckle over the base tone, purely decorative.
        for _ in 0..self.stipple_count {
            let x = rng.random_range(0.0..w);
            let y = rng.random_range(0.0..h);
            let size = rng.random_range(1.0..3.0);
            let value: u8 = rng.random_range(90..=255);
            let alpha: u8 = rng.random_range(8..=26);
            ctx.set_paint(color([value, value, value.saturating_sub(12), alpha]));
            ctx.fill_rect(&vello_cpu::kurbo::Rect::new(x, y, x + size, y + size));
        }
    }

    fn draw_title(
        &self,
        ctx: &mut vello_cpu::RenderContext,
        text: &mut TextEngine,
        font: &vello_cpu::peniko::FontData,
    ) -> Result<(), ComposeError> {
        let band = self.geometry.title_band;
        let main_size = (band * 0.34) as f32;
        let sub_size = (band * 0.15) as f32;

        let main = text.layout_line(TITLE_MAIN, &self.font_bytes, main_size, brush(INK_TONE))?;
        let sub = text.layout_line(TITLE_SUB, &self.font_bytes, sub_size, brush(INK_TONE))?;

        let center_x = self.geometry.width as f64 / 2.0;
        let main_origin = kurbo::Point::new(
            center_x - f64::from(main.width()) / 2.0,
            band * 0.16,
        );
        let sub_origin = kurbo::Point::new(
            center_x - f64::from(sub.width()) / 2.0,
            band * 0.62,
        );

        draw_glowing_text(ctx, &main, font, main_origin, TITLE_MAIN_GLOW, [245, 240, 250, 255]);
        draw_glowing_text(ctx, &sub, font, sub_origin, TITLE_SUB_GLOW, [214, 224, 235, 255]);
        Ok(())
    }

    fn draw_panel(
        &self,
        ctx: &mut vello_cpu::RenderContext,
        text: &mut TextEngine,
        font: &vello_cpu::peniko::FontData,
        panel: &PanelPlacement,
        image: &DecodedPanel,
    ) -> Result<(), ComposeError> {
        let tilt = kurbo::Affine::rotate_about(panel.rotation, panel.card.center());

        // Drop shadow: stacked translucent rects, widest first.
        for (grow, alpha) in [(10.0, 22u8), (5.0, 30), (0.0, 42)] {
            let shadow = kurbo::Rect::new(
                panel.card.x0 - grow + 16.0,
                panel.card.y0 - grow + 20.0,
                panel.card.x1 + grow + 16.0,
                panel.card.y1 + grow + 20.0,
            );
            ctx.set_transform(affine_to_cpu(tilt));
            ctx.set_paint(color([0, 0, 0, alpha]));
            ctx.fill_rect(&rect_to_cpu(shadow));
        }

        // Card border / photo backing.
        ctx.set_transform(affine_to_cpu(tilt));
        ctx.set_paint(color(CARD_TONE));
        ctx.fill_rect(&rect_to_cpu(panel.card));

        // Aspect-fit the panel image into its inset region.
        let target = fit_rect(image.width, image.height, panel.image_area);
        let scale = target.width() / image.width as f64;
        let place = tilt
            * kurbo::Affine::translate((target.x0, target.y0))
            * kurbo::Affine::scale(scale);
        ctx.set_transform(affine_to_cpu(place));
        ctx.set_paint_transform(vello_cpu::kurbo::Affine::IDENTITY);
        ctx.set_paint(image.paint.clone());
        ctx.fill_rect(&vello_cpu::kurbo::Rect::new(
            0.0,
            0.0,
            image.width as f64,
            image.height as f64,
        ));

        // Handwritten-style caption centered in the reserved band.
        let size = (panel.caption_area.height() * 0.66) as f32;
        let caption = text.layout_line(&panel.caption, &self.font_bytes, size, brush(INK_TONE))?;
        let origin = kurbo::Point::new(
            panel.caption_area.center().x - f64::from(caption.width()) / 2.0,
            panel.caption_area.center().y - f64::from(caption.height()) / 2.0,
        );
        draw_text(ctx, &caption, font, tilt * kurbo::Affine::translate((origin.x, origin.y)), None);

        // Tape strips over opposite corners.
        for strip in &panel.tape {
            let transform = tilt
                * kurbo::Affine::translate((strip.center.x, strip.center.y))
                * kurbo::Affine::rotate(strip.angle);
            ctx.set_transform(affine_to_cpu(transform));
            ctx.set_paint(color(TAPE_TONE));
            ctx.fill_rect(&vello_cpu::kurbo::Rect::new(
                -strip.width / 2.0,
                -strip.height / 2.0,
                strip.width / 2.0,
                strip.height / 2.0,
            ));
        }

        Ok(())
    }
}

struct DecodedPanel {
    width: u32,
    height: u32,
    paint: vello_cpu::Image,
}

fn decode_panel(name: &str, image: &ImageData) -> Result<DecodedPanel, ComposeError> {
    let dyn_img = image::load_from_memory(&image.data).map_err(|e| ComposeError::Decode {
        name: name.to_string(),
        reason: e.to_string(),
    })?;
    let rgba = dyn_img.to_rgba8();
    let (width, height) = rgba.dimensions();

    let mut premul = rgba.into_raw();
    premultiply_rgba8_in_place(&mut premul);

    let pixmap = pixmap_from_premul_bytes(&premul, width, height).map_err(|reason| {
        ComposeError::Decode {
            name: name.to_string(),
            reason,
        }
    })?;
    Ok(DecodedPanel {
        width,
        height,
        paint: vello_cpu::Image {
            image: vello_cpu::ImageSource::Pixmap(Arc::new(pixmap)),
            sampler: vello_cpu::peniko::ImageSampler::default(),
        },
    })
}

fn premultiply_rgba8_in_place(rgba: &mut [u8]) {
    for px in rgba.chunks_exact_mut(4) {
        let a = px[3] as u16;
        if a == 0 {
            px[0] = 0;
            px[1] = 0;
            px[2] = 0;
            continue;
        }
        px[0] = ((px[0] as u16 * a + 127) / 255) as u8;
        px[1] = ((px[1] as u16 * a + 127) / 255) as u8;
        px[2] = ((px[2] as u16 * a + 127) / 255) as u8;
    }
}

fn pixmap_from_premul_bytes(
    bytes: &[u8],
    width: u32,
    height: u32,
) -> Result<vello_cpu::Pixmap, String> {
    let w: u16 = width.try_into().map_err(|_| "image width exceeds u16".to_string())?;
    let h: u16 = height.try_into().map_err(|_| "image height exceeds u16".to_string())?;
    if bytes.len() != (width as usize) * (height as usize) * 4 {
        return Err("pixel buffer length mismatch".to_string());
    }
    let mut pixels = Vec::<vello_cpu::peniko::color::PremulRgba8>::with_capacity(
        (width as usize) * (height as usize),
    );
    for px in bytes.chunks_exact(4) {
        pixels.push(vello_cpu::peniko::color::PremulRgba8::from_u8_array([
            px[0], px[1], px[2], px[3],
        ]));
    }
    Ok(vello_cpu::Pixmap::from_parts_with_opacity(pixels, w, h, true))
}

fn color(rgba: [u8; 4]) -> vello_cpu::peniko::Color {
    vello_cpu::peniko::Color::from_rgba8(rgba[0], rgba[1], rgba[2], rgba[3])
}

fn brush(rgba: [u8; 4]) -> CaptionBrush {
    CaptionBrush {
        r: rgba[0],
        g: rgba[1],
        b: rgba[2],
        a: rgba[3],
    }
}

fn affine_to_cpu(a: kurbo::Affine) -> vello_cpu::kurbo::Affine {
    vello_cpu::kurbo::Affine::new(a.as_coeffs())
}

fn rect_to_cpu(r: kurbo::Rect) -> vello_cpu::kurbo::Rect {
    vello_cpu::kurbo::Rect::new(r.x0, r.y0, r.x1, r.y1)
}

fn draw_glowing_text(
    ctx: &mut vello_cpu::RenderContext,
    layout: &parley::Layout<CaptionBrush>,
    font: &vello_cpu::peniko::FontData,
    origin: kurbo::Point,
    glow: [u8; 4],
    fill: [u8; 4],
) {
    for (dx, dy) in [(-3.0, 0.0), (3.0, 0.0), (0.0, -3.0), (0.0, 3.0)] {
        let transform = kurbo::Affine::translate((origin.x + dx, origin.y + dy));
        draw_text(ctx, layout, font, transform, Some(glow));
    }
    draw_text(
        ctx,
        layout,
        font,
        kurbo::Affine::translate((origin.x, origin.y)),
        Some(fill),
    );
}

fn draw_text(
    ctx: &mut vello_cpu::RenderContext,
    layout: &parley::Layout<CaptionBrush>,
    font: &vello_cpu::peniko::FontData,
    transform: kurbo::Affine,
    override_color: Option<[u8; 4]>,
) {
    ctx.set_transform(affine_to_cpu(transform));
    for line in layout.lines() {
        for item in line.items() {
            let parley::layout::PositionedLayoutItem::GlyphRun(run) = item else {
                continue;
            };
            let rgba = match override_color {
                Some(c) => c,
                None => {
                    let b = run.style().brush;
                    [b.r, b.g, b.b, b.a]
                }
            };
            ctx.set_paint(color(rgba));
            let glyphs = run.glyphs().map(|g| vello_cpu::Glyph {
                id: g.id,
                x: g.x,
                y: g.y,
            });
            ctx.glyph_run(font)
                .font_size(run.run().font_size())
                .fill_glyphs(glyphs);
        }
    }
}

fn encode_jpeg(
    pixmap: &vello_cpu::Pixmap,
    width: u32,
    height: u32,
    quality: u8,
) -> Result<ImageData, ComposeError> {
    // The canvas is fully opaque, so premultiplied RGBA equals straight RGB.
    let rgba = pixmap.data_as_u8_slice();
    let mut rgb = Vec::with_capacity((width as usize) * (height as usize) * 3);
    for px in rgba.chunks_exact(4) {
        rgb.extend_from_slice(&px[..3]);
    }

    let mut jpeg = Vec::new();
    let encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(&mut jpeg, quality);
    encoder
        .write_image(&rgb, width, height, image::ExtendedColorType::Rgb8)
        .map_err(|e| ComposeError::Encode(e.to_string()))?;
    Ok(ImageData::new("image/jpeg", jpeg))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, SeedableRng};
    use std::{io::Cursor, path::PathBuf};

    fn small_geometry() -> PageGeometry {
        PageGeometry {
            width: 620,
            height: 877,
            title_band: 105.0,
            cell_padding: 14.0,
            ..PageGeometry::default()
        }
    }

    fn sample_panel(name: &str, w: u32, h: u32) -> (String, ImageData) {
        let img = image::RgbaImage::from_pixel(w, h, image::Rgba([180, 40, 70, 255]));
        let mut bytes = Vec::new();
        image::DynamicImage::ImageRgba8(img)
            .write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)
            .unwrap();
        (name.to_string(), ImageData::new("image/png", bytes))
    }

    fn find_system_font() -> Option<Vec<u8>> {
        let roots = [
            "/usr/share/fonts",
            "/usr/local/share/fonts",
            "/System/Library/Fonts",
        ];
        fn scan(dir: PathBuf, depth: usize) -> Option<PathBuf> {
            if depth == 0 {
                return None;
            }
            let entries = std::fs::read_dir(&dir).ok()?;
            for entry in entries.flatten() {
                let path = entry.path();
                if path.is_dir() {
                    if let Some(found) = scan(path, depth - 1) {
                        return Some(found);
                    }
                } else if matches!(
                    path.extension().and_then(|e| e.to_str()),
                    Some("ttf") | Some("otf")
                ) {
                    return Some(path);
                }
            }
            None
        }
        roots
            .iter()
            .find_map(|root| scan(PathBuf::from(root), 6))
            .and_then(|path| std::fs::read(path).ok())
    }

    #[test]
    fn empty_input_is_rejected_before_any_drawing() {
        let compositor = Compositor::new(vec![]);
        let err = compositor
            .compose(&[], &mut StdRng::seed_from_u64(1))
            .unwrap_err();
        assert!(matches!(err, ComposeError::EmptyPage));
    }

    #[test]
    fn overfull_input_is_rejected() {
        let compositor = Compositor::new(vec![]).with_geometry(small_geometry());
        let panels: Vec<_> = (0..7).map(|i| sample_panel(&format!("p{i}"), 8, 8)).collect();
        let err = compositor
            .compose(&panels, &mut StdRng::seed_from_u64(1))
            .unwrap_err();
        assert!(matches!(err, ComposeError::TooManyPanels { count: 7, capacity: 6 }));
    }

    #[test]
    fn undecodable_panel_bytes_fail_with_the_panel_name() {
        let Some(font) = find_system_font() else {
            eprintln!("no system font found, skipping");
            return;
        };
        let compositor = Compositor::new(font).with_geometry(small_geometry());
        let panels = vec![("broken".to_string(), ImageData::new("image/png", vec![0; 8]))];
        match compositor.compose(&panels, &mut StdRng::seed_from_u64(1)) {
            Err(ComposeError::Decode { name, .. }) => assert_eq!(name, "broken"),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn composes_five_panels_into_one_jpeg_page() {
        let Some(font) = find_system_font() else {
            eprintln!("no system font found, skipping");
            return;
        };
        let geometry = small_geometry();
        let compositor = Compositor::new(font)
            .with_geometry(geometry)
            .with_stipple_count(200);

        let panels: Vec<_> = ["dreamer", "maverick", "scholar", "wanderer", "icon"]
            .iter()
            .enumerate()
            .map(|(i, name)| sample_panel(name, 30 + i as u32 * 7, 40))
            .collect();

        let page = compositor
            .compose(&panels, &mut StdRng::seed_from_u64(42))
            .unwrap();
        assert_eq!(page.media_type, "image/jpeg");

        let decoded = image::load_from_memory(&page.data).unwrap();
        assert_eq!(decoded.width(), geometry.width);
        assert_eq!(decoded.height(), geometry.height);
    }

    #[test]
    fn identical_seeds_reproduce_the_page_exactly() {
        let Some(font) = find_system_font() else {
            eprintln!("no system font found, skipping");
            return;
        };
        let compositor = Compositor::new(font)
            .with_geometry(small_geometry())
            .with_stipple_count(100);
        let panels = vec![sample_panel("dreamer", 24, 30), sample_panel("icon", 30, 24)];

        let a = compositor
            .compose(&panels, &mut StdRng::seed_from_u64(9))
            .unwrap();
        let b = compositor
            .compose(&panels, &mut StdRng::seed_from_u64(9))
            .unwrap();
        assert_eq!(a, b);

        // Independent randomness may change bytes but never the envelope.
        let c = compositor
            .compose(&panels, &mut StdRng::seed_from_u64(10))
            .unwrap();
        assert_eq!(c.media_type, a.media_type);
        let ia = image::load_from_memory(&a.data).unwrap();
        let ic = image::load_from_memory(&c.data).unwrap();
        assert_eq!((ia.width(), ia.height()), (ic.width(), ic.height()));
    }
}
