//! Architect plan parsing
//!
//! Pulls the verifiable obligations out of the Architect's free-form plan:
//! function names, CSS selectors, test file paths, and files to change.
//! Selectors are only taken from backticks, fenced CSS blocks, or lines that
//! look like rule headers, never from plain sentences.

use std::sync::OnceLock;

use regex::Regex;

/// Obligations extracted from the Architect's plan text
#[derive(Debug, Clone, Default)]
pub struct ArchitectPlan {
    pub functions: Vec<String>,
    pub selectors: Vec<String>,
    pub test_files: Vec<String>,
    pub files: Vec<String>,
    pub raw: String,
}

fn backtick_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"`([^`\n]+)`").expect("static regex"))
}

fn function_name_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^([A-Za-z_$][A-Za-z0-9_$]*)\s*\(").expect("static regex"))
}

fn selector_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[.#\[][A-Za-z0-9_\-\[\]='\x22.#: ]*$").expect("static regex"))
}

fn test_path_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\btests?/[\w./\-]+").expect("static regex"))
}

fn bullet_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\s*(?:[-*]|\d+[.)])\s+(.+)$").expect("static regex"))
}

/// Parse a plan text into its obligations
pub fn parse(text: &str) -> ArchitectPlan {
    let mut plan = ArchitectPlan {
        raw: text.to_string(),
        ..Default::default()
    };

    collect_backticked(text, &mut plan);
    collect_fenced_css(text, &mut plan);
    collect_rule_headers(text, &mut plan);
    collect_section_items(text, "new functions", &mut plan.functions, clean_function_name);
    collect_section_items(text, "files to change", &mut plan.files, clean_file_path);
    collect_test_paths(text, &mut plan);

    dedupe(&mut plan.functions);
    dedupe(&mut plan.selectors);
    dedupe(&mut plan.test_files);
    dedupe(&mut plan.files);
    plan
}

/// Backticked tokens: `name(` is a function, `.class` / `#id` / `[attr]` is
/// a selector.
fn collect_backticked(text: &str, plan: &mut ArchitectPlan) {
    for capture in backtick_re().captures_iter(text) {
        let token = capture[1].trim();
        if let Some(function) = function_name_re().captures(token) {
            plan.functions.push(function[1].to_string());
        } else if selector_re().is_match(token) {
            plan.selectors.push(token.to_string());
        }
    }
}

/// Selectors from fenced ```css blocks: rule-header lines only
fn collect_fenced_css(text: &str, plan: &mut ArchitectPlan) {
    let mut in_css = false;
    for line in text.lines() {
        let trimmed = line.trim();
        if trimmed.starts_with("```") {
            in_css = trimmed.trim_start_matches('`').trim().eq_ignore_ascii_case("css");
            continue;
        }
        if in_css {
            if let Some(selector) = rule_header(trimmed) {
                plan.selectors.push(selector);
            }
        }
    }
}

/// Selectors from prose lines that look like CSS rule headers (`.x {`)
fn collect_rule_headers(text: &str, plan: &mut ArchitectPlan) {
    for line in text.lines() {
        if let Some(selector) = rule_header(line.trim()) {
            plan.selectors.push(selector);
        }
    }
}

fn rule_header(line: &str) -> Option<String> {
    let header = line.strip_suffix('{')?.trim();
    selector_re().is_match(header).then(|| header.to_string())
}

/// Bullets under a named section heading, until the next heading
fn collect_section_items(
    text: &str,
    section: &str,
    into: &mut Vec<String>,
    clean: fn(&str) -> Option<String>,
) {
    let mut in_section = false;
    for line in text.lines() {
        let trimmed = line.trim();
        let is_heading = trimmed.starts_with('#')
            || (trimmed.starts_with("**") && trimmed.ends_with("**"))
            || trimmed.ends_with(':');
        if is_heading {
            in_section = trimmed.to_lowercase().contains(section);
            continue;
        }
        if in_section {
            if let Some(capture) = bullet_re().captures(line) {
                if let Some(item) = clean(capture[1].trim()) {
                    into.push(item);
                }
            }
        }
    }
}

/// Test paths from a "Test Approach" section or fenced shell blocks
fn collect_test_paths(text: &str, plan: &mut ArchitectPlan) {
    let mut in_scope = false;
    let mut fence_lang: Option<String> = None;
    for line in text.lines() {
        let trimmed = line.trim();
        if trimmed.starts_with("```") {
            fence_lang = match fence_lang {
                Some(_) => None,
                None => Some(trimmed.trim_start_matches('`').trim().to_lowercase()),
            };
            continue;
        }
        let in_shell_fence = fence_lang
            .as_deref()
            .is_some_and(|lang| matches!(lang, "sh" | "bash" | "shell" | ""));

        if fence_lang.is_none() {
            let is_heading = trimmed.starts_with('#')
                || (trimmed.starts_with("**") && trimmed.ends_with("**"))
                || trimmed.ends_with(':');
            if is_heading {
                in_scope = trimmed.to_lowercase().contains("test approach");
                continue;
            }
        }
        if (in_scope && fence_lang.is_none()) || in_shell_fence {
            for found in test_path_re().find_iter(line) {
                plan.test_files
                    .push(found.as_str().trim_end_matches(['.', ',']).to_string());
            }
        }
    }
}

fn clean_function_name(item: &str) -> Option<String> {
    let token = item.trim_matches('`').trim();
    function_name_re()
        .captures(token)
        .map(|c| c[1].to_string())
        .or_else(|| {
            // A bare identifier bullet also counts
            let re = Regex::new(r"^[A-Za-z_$][A-Za-z0-9_$]*$").expect("static regex");
            re.is_match(token).then(|| token.to_string())
        })
}

fn clean_file_path(item: &str) -> Option<String> {
    let token = item.trim_matches('`').trim().trim_end_matches(['.', ',']);
    (token.contains('.') || token.contains('/'))
        .then(|| token.to_string())
        .filter(|t| !t.contains(' '))
}

fn dedupe(items: &mut Vec<String>) {
    let mut seen = std::collections::HashSet::new();
    items.retain(|item| seen.insert(item.clone()));
}

#[cfg(test)]
mod tests {
    use super::*;

    const PLAN: &str = "\
## Plan

Add a clear button wired to `handleClear()` and style it with `.clear-btn`.

### New Functions
- `handleClear()` resets the list
- showToast

### Files to Change
- index.html
- `app.js`
- this bullet is prose and skipped

### Test Approach
Run the suite in test/clear_button.test.js after wiring.

```css
.clear-btn {
  background: none;
}
#list .empty-state {
  display: block;
}
```
";

    #[test]
    fn functions_come_from_backticks_and_sections() {
        let plan = parse(PLAN);
        assert!(plan.functions.contains(&"handleClear".to_string()));
        assert!(plan.functions.contains(&"showToast".to_string()));
    }

    #[test]
    fn selectors_come_from_backticks_and_css_fences_only() {
        let plan = parse(PLAN);
        assert!(plan.selectors.contains(&".clear-btn".to_string()));
        assert!(plan.selectors.contains(&"#list .empty-state".to_string()));
        // Nothing harvested from plain prose
        assert!(!plan.selectors.iter().any(|s| s.contains("Add a clear")));
    }

    #[test]
    fn files_to_change_keep_paths_only() {
        let plan = parse(PLAN);
        assert!(plan.files.contains(&"index.html".to_string()));
        assert!(plan.files.contains(&"app.js".to_string()));
        assert_eq!(plan.files.len(), 2);
    }

    #[test]
    fn test_paths_come_from_test_approach_section() {
        let plan = parse(PLAN);
        assert_eq!(plan.test_files, vec!["test/clear_button.test.js".to_string()]);
    }

    #[test]
    fn test_paths_come_from_shell_fences() {
        let text = "Run:\n```sh\nnode test/runner.js tests/unit/clear.test.js\n```\n";
        let plan = parse(text);
        assert!(plan.test_files.contains(&"test/runner.js".to_string()));
        assert!(plan.test_files.contains(&"tests/unit/clear.test.js".to_string()));
    }

    #[test]
    fn rule_header_lines_count_as_selectors() {
        let plan = parse("Add this rule:\n\n.toast-success {\n  color: green;\n}\n");
        assert!(plan.selectors.contains(&".toast-success".to_string()));
    }

    #[test]
    fn duplicates_are_removed() {
        let plan = parse("`handleClear()` then `handleClear()` again");
        assert_eq!(plan.functions, vec!["handleClear".to_string()]);
    }

    #[test]
    fn empty_plan_extracts_nothing() {
        let plan = parse("We will make tasteful improvements.");
        assert!(plan.functions.is_empty());
        assert!(plan.selectors.is_empty());
        assert!(plan.test_files.is_empty());
        assert!(plan.files.is_empty());
    }
}
