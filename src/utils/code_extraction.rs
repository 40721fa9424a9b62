//! Code extraction from model responses.
//!
//! Chat models wrap code in prose and markdown fences. The extraction
//! strategies are tried in order:
//! 1. First ```` ```python ```` fenced block
//! 2. First fenced block with any (or no) language tag
//! 3. Everything from the first line starting with `def`, `class`,
//!    `import` or `from`
//! 4. The raw text, trimmed
//!
//! # Example
//!
//! ```
//! use reason_forge::utils::code_extraction::extract_code;
//!
//! let reply = "Here is the fix:\n```python\ndef add(a, b):\n    return a + b\n```\nDone.";
//! assert_eq!(extract_code(reply), "def add(a, b):\n    return a + b");
//! ```

use regex::Regex;

const CODE_START_PREFIXES: [&str; 4] = ["def ", "class ", "import ", "from "];

/// Extracts the most likely code payload from a model response.
pub fn extract_code(text: &str) -> String {
    extract_from_python_block(text)
        .or_else(|| extract_from_any_block(text))
        .or_else(|| extract_from_code_start(text))
        .unwrap_or_else(|| text.trim().to_string())
}

/// Returns the body of the first ```` ```python ```` block.
pub fn extract_from_python_block(text: &str) -> Option<String> {
    let re = Regex::new(r"(?s)```python[ \t]*\r?\n?(.*?)```").ok()?;
    let caps = re.captures(text)?;
    Some(caps.get(1)?.as_str().trim().to_string())
}

/// Returns the body of the first fenced block, skipping a language tag.
pub fn extract_from_any_block(text: &str) -> Option<String> {
    let re = Regex::new(r"(?s)```[\w+-]*[ \t]*\r?\n?(.*?)```").ok()?;
    let caps = re.captures(text)?;
    Some(caps.get(1)?.as_str().trim().to_string())
}

/// Returns the text from the first line that looks like the start of code.
pub fn extract_from_code_start(text: &str) -> Option<String> {
    let mut offset = 0;
    for line in text.split_inclusive('\n') {
        let trimmed = line.trim_start();
        if CODE_START_PREFIXES.iter().any(|p| trimmed.starts_with(p)) {
            let code = text[offset..].trim();
            return (!code.is_empty()).then(|| code.to_string());
        }
        offset += line.len();
    }
    None
}

/// Removes duplicates while keeping first occurrences in order.
pub fn dedup_preserving_order(candidates: Vec<String>) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    candidates
        .into_iter()
        .filter(|candidate| seen.insert(candidate.clone()))
        .collect()
}
