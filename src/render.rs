use std::sync::LazyLock;
use std::time::Duration;

use colored::Colorize;
use regex::Regex;
use tokio::io::{AsyncWrite, AsyncWriteExt};

pub const TYPE_INTERVAL: Duration = Duration::from_millis(20);

static BOLD: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\*\*(.*?)\*\*").expect("valid bold pattern"));
static CODE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"`(.*?)`").expect("valid code pattern"));

/// Renders `**bold**` and `` `code` `` spans for the terminal.
pub fn format_content(content: &str) -> String {
    let bolded = BOLD.replace_all(content, |c: &regex::Captures| c[1].blue().bold().to_string());
    CODE.replace_all(&bolded, |c: &regex::Captures| c[1].on_bright_black().to_string())
        .into_owned()
}

/// Character-by-character reveal of an already complete message.
///
/// Yields each prefix ending on a char boundary; the last frame is the full text.
/// ANSI escape sequences are never split: each one is emitted together with the
/// visible character that follows it.
pub struct Typewriter<'a> {
    text: &'a str,
    chars: std::str::CharIndices<'a>,
}

impl<'a> Typewriter<'a> {
    pub fn new(text: &'a str) -> Self {
        Self { text, chars: text.char_indices() }
    }

    /// Consumes the rest of an escape sequence whose ESC was just read.
    fn skip_escape(&mut self) -> Option<usize> {
        let (i, c) = self.chars.next()?;
        let mut end = i + c.len_utf8();
        if c == '[' {
            for (i, c) in self.chars.by_ref() {
                end = i + c.len_utf8();
                if ('\x40'..='\x7e').contains(&c) {
                    break;
                }
            }
        }
        Some(end)
    }
}

impl<'a> Iterator for Typewriter<'a> {
    type Item = &'a str;

    fn next(&mut self) -> Option<Self::Item> {
        let mut end = None;
        while let Some((i, c)) = self.chars.next() {
            end = Some(i + c.len_utf8());
            if c != '\x1b' {
                break;
            }
            if let Some(e) = self.skip_escape() {
                end = Some(e);
            }
        }
        end.map(|e| &self.text[..e])
    }
}

/// Writes `text` one character at a time at `interval`.
pub async fn type_out<W: AsyncWrite + Unpin>(out: &mut W, text: &str, interval: Duration) -> std::io::Result<()> {
    let mut ticker = tokio::time::interval(interval);
    let mut shown = 0;
    for frame in Typewriter::new(text) {
        ticker.tick().await;
        out.write_all(frame[shown..].as_bytes()).await?;
        out.flush().await?;
        shown = frame.len();
    }
    out.write_all(b"\n").await?;
    out.flush().await
}
