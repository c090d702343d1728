//! Block positioning model.
//!
//! The target environment lays blocks out itself; these numbers only matter
//! for comment anchoring and the side-by-side tiling of stacks, so they are
//! heuristics tuned against what the environment actually renders. Label
//! widths come from a Helvetica Neue advance-width table.

use core_catalog::Shape;

/// Tunable layout constants.
#[derive(Debug, Clone, Copy)]
pub struct LayoutSettings {
    /// Horizontal tiling distance between stack origins.
    pub stack_spacing: f64,
    /// Gap between a block's right edge and its comment.
    pub comment_offset: f64,
}

impl Default for LayoutSettings {
    fn default() -> Self {
        Self {
            stack_spacing: 600.0,
            comment_offset: 25.0,
        }
    }
}

/// Vertical offset between a block's midpoint and its comment anchor.
pub const COMMENT_ANCHOR_BIAS: f64 = 15.0;

/// Extra vertical midpoint nudge for c-shapes.
pub const C_COMMENT_NUDGE: f64 = 5.0;

/// Full height of a block by shape.
pub fn block_height(shape: Shape) -> f64 {
    match shape {
        Shape::Hat => 48.0,
        Shape::Stack => 48.0,
        Shape::ExtensionStack => 56.0,
        Shape::C => 48.0,
        Shape::Cap => 48.0,
        Shape::Reporter | Shape::MenuReporter => 0.0,
    }
}

/// Height of the closing lip of a c-shape (also the gap between the two
/// substacks of an if/else).
pub const C_END_HEIGHT: f64 = 32.0;

/// Height added per extra level of nested reporter arguments.
pub const ARG_DEPTH_HEIGHT: f64 = 8.0;

/// Per-statement cursor for width growth and argument-depth expansion.
#[derive(Debug)]
pub struct StatementLayout {
    /// Deepest argument level that already expanded the block.
    pub seen_depth: usize,
    /// Extension stacks absorb one nesting level before growing.
    pub depth_allowance: usize,
}

impl StatementLayout {
    pub fn new(shape: Shape) -> Self {
        let depth_allowance = usize::from(shape == Shape::ExtensionStack);
        Self {
            seen_depth: depth_allowance,
            depth_allowance,
        }
    }

    /// Report a value at `depth` nesting levels; returns the height to add to
    /// the stack when this depth is new.
    pub fn visit_depth(&mut self, depth: usize) -> f64 {
        if depth > self.seen_depth {
            self.seen_depth += 1;
            ARG_DEPTH_HEIGHT
        } else {
            0.0
        }
    }

    /// Half the extra argument height, applied to the comment midpoint.
    pub fn comment_height_adjust(&self) -> f64 {
        let levels = self.seen_depth.saturating_sub(self.depth_allowance);
        (levels as f64 * ARG_DEPTH_HEIGHT) / 2.0
    }
}

/// Width growth caused by a label: long labels widen the block past the slot
/// minimum of 14 units.
pub fn label_growth(text: &str, padding: f64) -> f64 {
    let width = text_width(text) + padding;
    if width > 14.0 { width * 1.4 - 14.0 } else { 0.0 }
}

/// Advance width of a label in the target's block font.
pub fn text_width(text: &str) -> f64 {
    text.chars().map(glyph_width).sum()
}

fn glyph_width(c: char) -> f64 {
    let width = match c {
        'i' | 'l' | 'I' | '!' | '\'' | ',' | '.' | ':' | ';' | '|' | ']' => 3,
        'f' | 'j' | 'r' | 't' | '(' | ')' | '*' | '[' | '`' | '{' | '}' => 4,
        '-' | '"' => 5,
        's' | 'v' | 'y' | 'z' | 'J' | '/' | '\\' | '_' => 6,
        'm' | 'M' | '@' => 10,
        'w' => 9,
        'W' => 11,
        '%' => 12,
        'b' | 'c' | 'd' | 'e' | 'g' | 'h' | 'k' | 'n' | 'o' | 'p' | 'q' | 'u' | 'x' => 7,
        'a' => 7,
        'E' | 'F' | 'L' | 'T' => 7,
        'B' | 'D' | 'P' | 'R' | 'S' | 'V' | 'X' | 'Y' | 'Z' => 8,
        'A' | 'C' | 'G' | 'H' | 'K' | 'N' | 'O' | 'Q' | 'U' => 9,
        '0'..='9' => 7,
        '#' | '$' | '+' | '<' | '=' | '>' | '?' | '^' | '~' => 7,
        '&' => 8,
        ' ' => 3,
        _ => 0,
    };
    f64::from(width)
}
