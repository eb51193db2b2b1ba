//! Line breaking and alignment inside a point-space box

use crate::annotation::Alignment;

/// One line ready to be drawn, positioned in point space
#[derive(Debug, Clone, PartialEq)]
pub struct PlacedLine {
    pub text: String,
    /// Left edge of the line
    pub x: f64,
    pub baseline: f64,
    pub width: f64,
}

/// Box a block of text is laid out into
#[derive(Debug, Clone, Copy)]
pub struct TextBox {
    pub x: f64,
    /// Top edge (bottom-left origin, so the first baseline is below it)
    pub top: f64,
    pub width: f64,
    pub font_size: f64,
    /// Multiple of `font_size` between baselines
    pub line_height: f64,
}

/// Break `text` into lines no wider than `max_width`.
///
/// Explicit newlines always break; a blank paragraph becomes an empty line so
/// spacing survives. Words wider than the box are split between characters.
pub fn wrap_text<F>(text: &str, max_width: f64, measure: F) -> Vec<String>
where
    F: Fn(&str) -> f64,
{
    if text.is_empty() {
        return Vec::new();
    }

    let space_width = measure(" ");
    let mut lines = Vec::new();

    for paragraph in text.split('\n') {
        let paragraph = paragraph.trim_end_matches('\r');
        let mut current = String::new();
        let mut current_width = 0.0;

        for word in paragraph.split_whitespace() {
            let word_width = measure(word);

            if word_width > max_width {
                if !current.is_empty() {
                    lines.push(std::mem::take(&mut current));
                }
                let mut chunk = String::new();
                let mut chunk_width = 0.0;
                for c in word.chars() {
                    let char_width = measure(c.encode_utf8(&mut [0; 4]));
                    if chunk_width + char_width > max_width && !chunk.is_empty() {
                        lines.push(std::mem::take(&mut chunk));
                        chunk_width = 0.0;
                    }
                    chunk.push(c);
                    chunk_width += char_width;
                }
                current = chunk;
                current_width = chunk_width;
                continue;
            }

            if current.is_empty() {
                current.push_str(word);
                current_width = word_width;
            } else if current_width + space_width + word_width <= max_width {
                current.push(' ');
                current.push_str(word);
                current_width += space_width + word_width;
            } else {
                lines.push(std::mem::replace(&mut current, word.to_string()));
                current_width = word_width;
            }
        }

        lines.push(current);
    }

    lines
}

/// Horizontal offset of a line inside its box
pub fn align_offset(alignment: Alignment, box_width: f64, line_width: f64) -> f64 {
    match alignment {
        Alignment::Left => 0.0,
        Alignment::Center => (box_width - line_width) / 2.0,
        Alignment::Right => box_width - line_width,
    }
}

/// Wrap and position every line of `text` inside `text_box`
pub fn layout_text<F>(text: &str, text_box: &TextBox, alignment: Alignment, measure: F) -> Vec<PlacedLine>
where
    F: Fn(&str) -> f64,
{
    let advance = text_box.font_size * text_box.line_height;
    let first_baseline = text_box.top - text_box.font_size;

    wrap_text(text, text_box.width, &measure)
        .into_iter()
        .enumerate()
        .map(|(i, line)| {
            let width = measure(&line);
            PlacedLine {
                x: text_box.x + align_offset(alignment, text_box.width, width),
                baseline: first_baseline - advance * i as f64,
                width,
                text: line,
            }
        })
        .collect()
}
