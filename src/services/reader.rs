use camino::Utf8Path;
use std::io;

/// A mission file held as raw lines.
///
/// Each line keeps its terminator (`\n`, `\r\n` or nothing for an
/// unterminated final line), so [`SqmDocument::to_text`] reproduces the
/// input byte for byte.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SqmDocument {
    lines: Vec<String>,
}

impl SqmDocument {
    pub fn from_text(text: &str) -> Self {
        Self {
            lines: text.split_inclusive('\n').map(str::to_string).collect(),
        }
    }

    pub fn from_lines(lines: Vec<String>) -> Self {
        Self { lines }
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Raw line including its terminator.
    pub fn raw_line(&self, index: usize) -> &str {
        &self.lines[index]
    }

    /// Line content with terminator and byte order mark removed.
    pub fn content(&self, index: usize) -> &str {
        split_terminator(&self.lines[index]).0.trim_start_matches('\u{feff}')
    }

    pub fn lines(&self) -> impl Iterator<Item = &str> {
        self.lines.iter().map(String::as_str)
    }

    pub fn to_text(&self) -> String {
        self.lines.concat()
    }
}

/// Split a raw line into content and terminator.
pub(crate) fn split_terminator(raw: &str) -> (&str, &str) {
    if let Some(content) = raw.strip_suffix("\r\n") {
        (content, "\r\n")
    } else if let Some(content) = raw.strip_suffix('\n') {
        (content, "\n")
    } else {
        (raw, "")
    }
}

/// Loads mission files.
pub struct SqmTextReader;

impl SqmTextReader {
    /// Read a mission file as UTF-8.
    pub async fn read(path: &Utf8Path) -> io::Result<SqmDocument> {
        let text = tokio::fs::read_to_string(path).await?;
        let document = SqmDocument::from_text(&text);
        tracing::debug!("Read {} lines from {}", document.len(), path);
        Ok(document)
    }
}
