//! Fix prompt for the repair oracle.

/// Builds the single-shot fix prompt for a candidate that failed at runtime.
///
/// The full error text is embedded; the harness is not, so the model
/// repairs behaviour rather than special-casing the assertions.
pub fn build_fix_prompt(code: &str, error: &str) -> String {
    let error = error.trim();
    let error = if error.is_empty() { "Unknown Error" } else { error };

    format!(
        r#"You are an expert at repairing Python code.
The code below fails when run against its tests.

[Buggy code]
```python
{code}
```

[Error]
{error}

[Requirements]
1. Output the complete corrected function code.
2. Follow Python indentation rules strictly.
3. Wrap the code in a ```python block.
4. Do not explain, only give code.

[Corrected code]
"#
    )
}

/// Returns the last non-empty line of an error message, which for a
/// Python traceback is the exception itself.
pub fn last_error_line(error: &str) -> &str {
    error
        .lines()
        .rev()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .unwrap_or("Unknown Error")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fix_prompt_embeds_code_and_error() {
        let prompt = build_fix_prompt(
            "def add(a, b):\n    return a - b",
            "Traceback (most recent call last):\nAssertionError\n",
        );
        assert!(prompt.contains("```python\ndef add(a, b):\n    return a - b\n```"));
        assert!(prompt.contains("[Error]\nTraceback (most recent call last):\nAssertionError\n"));
        assert!(prompt.trim_end().ends_with("[Corrected code]"));
    }

    #[test]
    fn test_empty_error() {
        assert!(build_fix_prompt("def f(): pass", "  ").contains("[Error]\nUnknown Error"));
    }

    #[test]
    fn test_last_error_line() {
        assert_eq!(
            last_error_line("Traceback:\n  File \"x\"\nZeroDivisionError: division by zero\n\n"),
            "ZeroDivisionError: division by zero"
        );
        assert_eq!(last_error_line(""), "Unknown Error");
    }
}
