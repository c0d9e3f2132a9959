//! Greedy badge placement with overlap suppression.
//!
//! Badges are tried in input order. Each candidate box, grown by a margin,
//! is checked against every box accepted so far in the pass; the first box
//! to claim an area keeps it and later overlapping badges are dropped.

/// Axis-aligned pixel rectangle, edges inclusive
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlacedBox {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

impl PlacedBox {
    pub fn new(left: i32, top: i32, right: i32, bottom: i32) -> Self {
        Self { left, top, right, bottom }
    }

    pub fn width(&self) -> i32 {
        self.right - self.left
    }

    pub fn height(&self) -> i32 {
        self.bottom - self.top
    }

    /// Grow the box by `margin` pixels on every side, saturating at the i32 range
    pub fn expand(&self, margin: i32) -> Self {
        Self {
            left: self.left.saturating_sub(margin),
            top: self.top.saturating_sub(margin),
            right: self.right.saturating_add(margin),
            bottom: self.bottom.saturating_add(margin),
        }
    }

    /// Whether the boxes share any pixel; touching edges count as overlap
    pub fn intersects(&self, other: &PlacedBox) -> bool {
        !(self.right < other.left
            || self.left > other.right
            || self.bottom < other.top
            || self.top > other.bottom)
    }

    pub fn contains(&self, other: &PlacedBox) -> bool {
        self.left <= other.left
            && self.top <= other.top
            && self.right >= other.right
            && self.bottom >= other.bottom
    }
}

/// Text width in pixels, as a font would render it
pub trait TextMeasure {
    fn text_width(&self, text: &str) -> i32;
}

/// Fixed advance per character, for when no font is loaded
#[derive(Debug, Clone, Copy)]
pub struct CharWidthEstimate(pub i32);

impl Default for CharWidthEstimate {
    fn default() -> Self {
        CharWidthEstimate(9)
    }
}

impl TextMeasure for CharWidthEstimate {
    fn text_width(&self, text: &str) -> i32 {
        text.chars().count() as i32 * self.0
    }
}

/// Badge and marker geometry
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BadgeStyle {
    /// Narrowest badge, so short or empty texts still get a readable badge
    pub min_width: i32,
    /// Horizontal padding added to the text width
    pub text_padding: i32,
    pub line_height: i32,
    /// Padding above and below the text
    pub vertical_padding: i32,
    /// Distance between the anchor and the near edge of the badge
    pub gap: i32,
    /// Breathing room around each badge when testing for overlap
    pub margin: i32,
    /// Badges are kept this far from the right canvas edge
    pub edge_clearance: i32,
    pub marker_radius: i32,
    /// Text offset from the left edge of the badge
    pub text_inset: i32,
    pub shadow_offset: i32,
    pub border_width: i32,
    pub font_size: f32,
}

impl BadgeStyle {
    /// Badge for the current-conditions map
    pub fn standard() -> Self {
        Self {
            min_width: 52,
            text_padding: 14,
            line_height: 18,
            vertical_padding: 6,
            gap: 12,
            margin: 4,
            edge_clearance: 10,
            marker_radius: 5,
            text_inset: 8,
            shadow_offset: 2,
            border_width: 2,
            font_size: 16.0,
        }
    }

    /// Smaller badge for the daily minimum/maximum maps
    pub fn compact() -> Self {
        Self {
            min_width: 46,
            text_padding: 12,
            line_height: 16,
            vertical_padding: 5,
            gap: 10,
            margin: 3,
            edge_clearance: 10,
            marker_radius: 4,
            text_inset: 6,
            shadow_offset: 2,
            border_width: 2,
            font_size: 16.0,
        }
    }

    pub fn box_height(&self) -> i32 {
        self.line_height + self.vertical_padding * 2
    }

    pub fn box_width(&self, text_width: i32) -> i32 {
        self.min_width.max(text_width + self.text_padding)
    }
}

impl Default for BadgeStyle {
    fn default() -> Self {
        Self::standard()
    }
}

/// Where an accepted badge goes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Placement {
    pub anchor: (i32, i32),
    /// The badge itself
    pub badge: PlacedBox,
    /// The badge grown by the style margin; this is what blocks later badges
    pub reserved: PlacedBox,
}

/// Accepted boxes of one render pass
#[derive(Debug, Clone)]
pub struct LabelPlacer {
    canvas_width: i32,
    style: BadgeStyle,
    placed: Vec<PlacedBox>,
}

impl LabelPlacer {
    pub fn new(canvas_width: u32, style: BadgeStyle) -> Self {
        Self {
            canvas_width: canvas_width as i32,
            style,
            placed: Vec::new(),
        }
    }

    pub fn style(&self) -> &BadgeStyle {
        &self.style
    }

    /// Boxes accepted so far, in acceptance order
    pub fn placed(&self) -> &[PlacedBox] {
        &self.placed
    }

    /// Candidate placement for a badge of the given text width, without
    /// checking it against accepted boxes
    pub fn candidate(&self, anchor_x: i32, anchor_y: i32, text_width: i32) -> Placement {
        let style = &self.style;
        let width = style.box_width(text_width);
        let height = style.box_height();

        // Right of the anchor when it fits, otherwise mirrored to the left.
        // Anchors far off the canvas saturate instead of wrapping.
        let right_left = anchor_x.saturating_add(style.gap);
        let left = if right_left.saturating_add(width) < self.canvas_width - style.edge_clearance {
            right_left
        } else {
            anchor_x.saturating_sub(style.gap).saturating_sub(width)
        };
        let top = anchor_y.saturating_sub(height.div_euclid(2));

        let badge = PlacedBox::new(left, top, left.saturating_add(width), top.saturating_add(height));
        Placement {
            anchor: (anchor_x, anchor_y),
            badge,
            reserved: badge.expand(style.margin),
        }
    }

    /// Accept the badge if its reserved area overlaps no accepted box.
    /// Accepted boxes are recorded; rejected ones leave no trace.
    pub fn try_place(
        &mut self,
        anchor_x: i32,
        anchor_y: i32,
        text: &str,
        measure: &dyn TextMeasure,
    ) -> Option<Placement> {
        let placement = self.candidate(anchor_x, anchor_y, measure.text_width(text));
        if self.placed.iter().any(|existing| placement.reserved.intersects(existing)) {
            return None;
        }

        self.placed.push(placement.reserved);
        Some(placement)
    }
}
