//! Static crash message extraction from stdlib sources.
//!
//! Crashable error types carry a `crash_message` routine. When its body is
//! a single `return "..."`, the message is a compile-time constant and
//! throw sites can emit a static pointer pair. Bodies that interpolate or
//! read fields are dynamic and must go through a runtime thunk.
//!
//! The scan is a line-based probe, not a parser: it only needs type
//! headers and single-return bodies. I/O and parse failures are swallowed
//! per file; the resolver then simply knows no static message for the
//! types involved and throw sites fall back to dynamic handling.

use std::fs;
use std::path::Path;

use rustc_hash::FxHashMap;

/// How a crashable type produces its message.
#[derive(Clone, Eq, PartialEq, Debug)]
pub enum CrashMessage {
    /// `crash_message` returns a fixed string.
    Static(String),
    /// The message reads fields or interpolates at runtime.
    Dynamic,
}

/// Crashable type name → message kind, as discovered in the stdlib.
#[derive(Default, Debug)]
pub struct CrashMessages {
    map: FxHashMap<String, CrashMessage>,
}

impl CrashMessages {
    pub fn new() -> Self {
        Self::default()
    }

    /// Scan every `.fr` file under `root`, recursively. Unreadable files
    /// and directories are skipped.
    pub fn scan(root: &Path) -> Self {
        let mut out = Self::new();
        out.scan_dir(root);
        out
    }

    fn scan_dir(&mut self, dir: &Path) {
        let Ok(entries) = fs::read_dir(dir) else {
            return;
        };
        let mut paths: Vec<_> = entries.filter_map(Result::ok).map(|e| e.path()).collect();
        paths.sort();
        for path in paths {
            if path.is_dir() {
                self.scan_dir(&path);
            } else if path.extension().is_some_and(|e| e == "fr") {
                if let Ok(text) = fs::read_to_string(&path) {
                    self.scan_source(&text);
                }
            }
        }
    }

    /// Scan one source text for crashable definitions.
    pub fn scan_source(&mut self, text: &str) {
        let mut current_type: Option<String> = None;
        let mut type_depth = 0i32;
        let mut depth = 0i32;
        let mut in_crash_message = false;
        let mut message_depth = 0i32;
        let mut body_lines: Vec<String> = Vec::new();

        for raw in text.lines() {
            let line = raw.trim();

            if current_type.is_none() {
                if let Some(name) = crashable_header(line) {
                    current_type = Some(name);
                    type_depth = depth;
                }
            } else if !in_crash_message && line.contains("crash_message") {
                in_crash_message = true;
                message_depth = depth;
                body_lines.clear();
            } else if in_crash_message {
                if line != "}" || depth > message_depth + 1 {
                    if !line.is_empty() {
                        body_lines.push(line.to_string());
                    }
                }
            }

            for c in raw.chars() {
                match c {
                    '{' => depth += 1,
                    '}' => depth -= 1,
                    _ => {}
                }
            }

            if in_crash_message && depth <= message_depth {
                let name = current_type.clone().unwrap_or_default();
                let kind = classify_body(&body_lines);
                self.map.entry(name).or_insert(kind);
                in_crash_message = false;
            }
            if current_type.is_some() && depth <= type_depth && line.contains('}') {
                current_type = None;
                in_crash_message = false;
            }
        }
    }

    pub fn get(&self, ty: &str) -> Option<&CrashMessage> {
        self.map.get(ty)
    }

    pub fn is_dynamic(&self, ty: &str) -> bool {
        matches!(self.map.get(ty), Some(CrashMessage::Dynamic))
    }

    pub fn static_message(&self, ty: &str) -> Option<&str> {
        match self.map.get(ty) {
            Some(CrashMessage::Static(s)) => Some(s),
            _ => None,
        }
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

/// Recognize `record Foo: Crashable {` / `entity BarError {` headers.
fn crashable_header(line: &str) -> Option<String> {
    let rest = line
        .strip_prefix("record ")
        .or_else(|| line.strip_prefix("entity "))?;
    let name: String = rest
        .chars()
        .take_while(|c| c.is_alphanumeric() || *c == '_')
        .collect();
    if name.is_empty() {
        return None;
    }
    if name.ends_with("Error") || line.contains("Crashable") {
        Some(name)
    } else {
        None
    }
}

/// A body is static when it is exactly one `return "..."` of a plain
/// string (no interpolation braces).
fn classify_body(lines: &[String]) -> CrashMessage {
    if lines.len() != 1 {
        return CrashMessage::Dynamic;
    }
    let line = &lines[0];
    let Some(rest) = line.strip_prefix("return ") else {
        return CrashMessage::Dynamic;
    };
    let rest = rest.trim();
    if rest.len() < 2 || !rest.starts_with('"') || !rest.ends_with('"') {
        return CrashMessage::Dynamic;
    }
    let content = &rest[1..rest.len() - 1];
    if content.contains('{') || content.contains('"') {
        return CrashMessage::Dynamic;
    }
    CrashMessage::Static(content.to_string())
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    const STDLIB: &str = r#"
record DivideByZeroError: Crashable {
    routine crash_message() -> text {
        return "division by zero"
    }
}

record IndexOutOfBoundsError: Crashable {
    index: s64
    count: s64

    routine crash_message() -> text {
        return "index {index} out of bounds for {count} items"
    }
}

entity ParseError {
    detail: text

    routine crash_message() -> text {
        let prefix: text = "parse failure: "
        return prefix
    }
}
"#;

    #[test]
    fn single_string_return_is_static() {
        let mut msgs = CrashMessages::new();
        msgs.scan_source(STDLIB);
        assert_eq!(
            msgs.static_message("DivideByZeroError"),
            Some("division by zero")
        );
    }

    #[test]
    fn interpolation_and_multi_statement_bodies_are_dynamic() {
        let mut msgs = CrashMessages::new();
        msgs.scan_source(STDLIB);
        assert!(msgs.is_dynamic("IndexOutOfBoundsError"));
        assert!(msgs.is_dynamic("ParseError"));
    }

    #[test]
    fn non_crashable_records_are_ignored() {
        let mut msgs = CrashMessages::new();
        msgs.scan_source("record Point {\n    x: s32\n}\n");
        assert!(msgs.is_empty());
    }

    #[test]
    fn scan_walks_directories_and_swallows_noise() {
        let dir = tempfile::tempdir().unwrap();
        let sub = dir.path().join("errors");
        std::fs::create_dir(&sub).unwrap();
        std::fs::write(
            sub.join("bounds.fr"),
            "record RangeError: Crashable {\n  routine crash_message() -> text {\n    return \"range exhausted\"\n  }\n}\n",
        )
        .unwrap();
        std::fs::write(sub.join("garbage.fr"), "}}}{{{ not forge at all").unwrap();
        std::fs::write(sub.join("notes.txt"), "ignored").unwrap();

        let msgs = CrashMessages::scan(dir.path());
        assert_eq!(msgs.static_message("RangeError"), Some("range exhausted"));
        assert_eq!(msgs.len(), 1);
    }
}
