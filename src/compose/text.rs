use super::ComposeError;

/// RGBA8 brush color carried through Parley glyph runs.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub(crate) struct CaptionBrush {
    pub(crate) r: u8,
    pub(crate) g: u8,
    pub(crate) b: u8,
    pub(crate) a: u8,
}

/// Builds Parley layouts from raw font bytes.
pub(crate) struct TextEngine {
    font_ctx: parley::FontContext,
    layout_ctx: parley::LayoutContext<CaptionBrush>,
}

impl TextEngine {
    pub(crate) fn new() -> Self {
        Self {
            font_ctx: parley::FontContext::default(),
            layout_ctx: parley::LayoutContext::new(),
        }
    }

    /// Shape a single line of text with the given font bytes and size.
    pub(crate) fn layout_line(
        &mut self,
        text: &str,
        font_bytes: &[u8],
        size_px: f32,
        brush: CaptionBrush,
    ) -> Result<parley::Layout<CaptionBrush>, ComposeError> {
        if !size_px.is_finite() || size_px <= 0.0 {
            return Err(ComposeError::Font(
                "text size must be finite and > 0".to_string(),
            ));
        }

        let families = self
            .font_ctx
            .collection
            .register_fonts(parley::fontique::Blob::from(font_bytes.to_vec()), None);
        let family_id = families.first().map(|(id, _)| *id).ok_or_else(|| {
            ComposeError::Font("no font families registered from font bytes".to_string())
        })?;
        let family_name = self
            .font_ctx
            .collection
            .family_name(family_id)
            .ok_or_else(|| ComposeError::Font("registered font family has no name".to_string()))?
            .to_string();

        let mut builder = self
            .layout_ctx
            .ranged_builder(&mut self.font_ctx, text, 1.0, true);
        builder.push_default(parley::style::StyleProperty::FontStack(
            parley::style::FontStack::Source(std::borrow::Cow::Owned(family_name)),
        ));
        builder.push_default(parley::style::StyleProperty::FontSize(size_px));
        builder.push_default(parley::style::StyleProperty::Brush(brush));

        let mut layout: parley::Layout<CaptionBrush> = builder.build(text);
        layout.break_all_lines(None);
        Ok(layout)
    }
}
