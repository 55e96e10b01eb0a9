//! FreeText block layout
//!
//! Widths are estimated from an average glyph advance rather than measured,
//! which is enough to wrap a note inside its rect.

/// Average glyph advance as a fraction of the font size
pub const CHAR_WIDTH_RATIO: f32 = 0.6;

/// Wrapped lines plus the metrics used to place them
#[derive(Debug, Clone, PartialEq)]
pub struct TextBlock {
    pub lines: Vec<String>,
    pub font_size: f32,
    /// Baseline-to-baseline distance
    pub line_advance: f32,
}

impl TextBlock {
    pub fn char_width(&self) -> f32 {
        self.font_size * CHAR_WIDTH_RATIO
    }

    pub fn height(&self) -> f32 {
        self.line_advance * self.lines.len() as f32
    }
}

/// Wrap `text` to `max_width`
///
/// A non-positive or too narrow `max_width` still yields one glyph per line
/// so the text is never dropped. Explicit newlines start a new line.
pub fn layout_text(text: &str, max_width: f32, font_size: f32, line_height: f32) -> TextBlock {
    let char_width = font_size * CHAR_WIDTH_RATIO;
    let chars_per_line = if char_width > 0.0 {
        ((max_width / char_width).floor() as usize).max(1)
    } else {
        usize::MAX
    };

    let lines = text
        .lines()
        .flat_map(|paragraph| wrap_text(paragraph, chars_per_line))
        .collect::<Vec<_>>();

    TextBlock {
        lines: if lines.is_empty() { vec![String::new()] } else { lines },
        font_size,
        line_advance: font_size * line_height,
    }
}

/// Greedy word wrap on character counts
pub fn wrap_text(text: &str, chars_per_line: usize) -> Vec<String> {
    let chars_per_line = chars_per_line.max(1);
    let mut lines = Vec::new();
    let mut current = String::new();
    let mut current_len = 0usize;

    for word in text.split_whitespace() {
        let word_len = word.chars().count();

        if current_len > 0 && current_len + 1 + word_len <= chars_per_line {
            current.push(' ');
            current.push_str(word);
            current_len += 1 + word_len;
            continue;
        }

        if current_len > 0 {
            lines.push(std::mem::take(&mut current));
            current_len = 0;
        }

        // Split words longer than a line
        let mut chars = word.chars().peekable();
        while chars.peek().is_some() {
            let chunk: String = chars.by_ref().take(chars_per_line).collect();
            let chunk_len = chunk.chars().count();
            if chars.peek().is_some() {
                lines.push(chunk);
            } else {
                current = chunk;
                current_len = chunk_len;
            }
        }
    }

    if current_len > 0 {
        lines.push(current);
    }
    if lines.is_empty() {
        lines.push(String::new());
    }
    lines
}
