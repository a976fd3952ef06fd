//! CSS selector block location and upsert
//!
//! Locates the first top-level rule whose selector text matches exactly and
//! replaces the whole block; unknown selectors append. Identical blocks are
//! a no-op.

/// Whether a top-level rule with exactly this selector exists
pub fn selector_exists(src: &str, selector: &str) -> bool {
    find_selector_block(src, selector).is_some()
}

/// Replace-or-append a selector block. `content` may be either the full rule
/// (starting with the selector) or just the declarations; either way the
/// result is a complete rule. Returns the new source and whether it changed.
pub fn upsert_selector(src: &str, selector: &str, content: &str) -> (String, bool) {
    let block = normalize_block(selector, content);

    match find_selector_block(src, selector) {
        Some((start, end)) => {
            let existing = &src[start..end];
            if existing == block {
                return (src.to_string(), false);
            }
            let mut out = String::with_capacity(src.len());
            out.push_str(&src[..start]);
            out.push_str(&block);
            out.push_str(&src[end..]);
            (out, true)
        }
        None => {
            let mut out = src.to_string();
            if !out.is_empty() && !out.ends_with('\n') {
                out.push('\n');
            }
            if !out.is_empty() {
                out.push('\n');
            }
            out.push_str(&block);
            out.push('\n');
            (out, true)
        }
    }
}

/// Byte span `[start, end)` of the full rule (selector through closing brace)
/// for the first top-level rule with exactly `selector`.
pub fn find_selector_block(src: &str, selector: &str) -> Option<(usize, usize)> {
    let bytes = src.as_bytes();
    let mut depth = 0usize;
    let mut chunk_start = 0usize;
    let mut idx = 0usize;

    while idx < bytes.len() {
        match bytes[idx] {
            b'/' if bytes.get(idx + 1) == Some(&b'*') => {
                idx = skip_comment(bytes, idx);
                continue;
            }
            b'{' => {
                if depth == 0 {
                    let raw = &src[chunk_start..idx];
                    let lead = raw.len() - raw.trim_start().len();
                    if raw.trim() == selector.trim() {
                        let start = chunk_start + lead;
                        let end = matching_close(bytes, idx)?;
                        return Some((start, end + 1));
                    }
                }
                depth += 1;
            }
            b'}' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    chunk_start = idx + 1;
                }
            }
            // Top-level statements like @import end with `;`
            b';' if depth == 0 => chunk_start = idx + 1,
            _ => {}
        }
        idx += 1;
    }
    None
}

fn matching_close(bytes: &[u8], open: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut idx = open;
    while idx < bytes.len() {
        match bytes[idx] {
            b'/' if bytes.get(idx + 1) == Some(&b'*') => {
                idx = skip_comment(bytes, idx);
                continue;
            }
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(idx);
                }
            }
            _ => {}
        }
        idx += 1;
    }
    None
}

fn skip_comment(bytes: &[u8], start: usize) -> usize {
    let mut idx = start + 2;
    while idx + 1 < bytes.len() {
        if bytes[idx] == b'*' && bytes[idx + 1] == b'/' {
            return idx + 2;
        }
        idx += 1;
    }
    bytes.len()
}

/// Ensure the replacement is a full rule starting with the selector
fn normalize_block(selector: &str, content: &str) -> String {
    let trimmed = content.trim();
    if trimmed.starts_with(selector.trim()) && trimmed.contains('{') {
        return trimmed.to_string();
    }
    let body = trimmed.trim_start_matches('{').trim_end_matches('}').trim();
    let mut block = format!("{} {{\n", selector.trim());
    for line in body.lines() {
        block.push_str("  ");
        block.push_str(line.trim());
        block.push('\n');
    }
    block.push('}');
    block
}
