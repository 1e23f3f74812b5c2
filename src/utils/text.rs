//! Text processing utilities.

/// Characters that extraction leaves behind but carry no content.
const INVISIBLE_CHARS: [char; 3] = ['\u{200b}', '\u{feff}', '\u{00ad}'];

/// Remove invisible characters and surrounding whitespace.
pub fn clean_text(text: &str) -> String {
    text.chars()
        .filter(|c| !INVISIBLE_CHARS.contains(c))
        .collect::<String>()
        .trim()
        .to_string()
}

/// Shorten text to at most `max_chars` characters, appending an ellipsis when cut.
pub fn preview(text: &str, max_chars: usize) -> String {
    let mut out: String = text.chars().take(max_chars).collect();
    if text.chars().count() > max_chars {
        out.push_str("...");
    }
    out
}
