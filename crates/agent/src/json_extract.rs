//! Pulling a JSON object out of free-form model output.
//!
//! Models wrap their JSON in prose or code fences, and often put literal
//! newlines inside string values. [`SpanScanner`] walks the text once with a
//! stack of open braces, tracking string literals and escapes inside objects
//! so braces in strings do not unbalance it. Raw control characters inside
//! strings are escaped as it goes. Balanced spans come out lazily, so
//! [`first_object`] stops scanning at the first span that parses.

use std::collections::VecDeque;
use std::ops::Range;
use std::str::Chars;

type Object = serde_json::Map<String, serde_json::Value>;

/// Single-pass scanner yielding balanced `{...}` spans of [`Self::normalized`].
///
/// Spans nested in the same top-level object are yielded outermost first,
/// once that object closes. Spans inside braces that never close are yielded
/// at the end of input.
pub struct SpanScanner<'a> {
    chars: Chars<'a>,
    normalized: String,
    open: Vec<usize>,
    closed: Vec<Range<usize>>,
    ready: VecDeque<Range<usize>>,
    in_string: bool,
    escaped: bool,
}

impl<'a> SpanScanner<'a> {
    pub fn new(text: &'a str) -> Self {
        Self {
            chars: text.chars(),
            normalized: String::with_capacity(text.len()),
            open: Vec::new(),
            closed: Vec::new(),
            ready: VecDeque::new(),
            in_string: false,
            escaped: false,
        }
    }

    /// The text consumed so far, with control characters in strings escaped.
    pub fn normalized(&self) -> &str {
        &self.normalized
    }

    /// Byte range in [`Self::normalized`] of the next balanced span.
    pub fn next_span(&mut self) -> Option<Range<usize>> {
        loop {
            if let Some(span) = self.ready.pop_front() {
                return Some(span);
            }
            match self.chars.next() {
                Some(c) => self.push(c),
                None if self.closed.is_empty() => return None,
                None => self.flush(),
            }
        }
    }

    fn push(&mut self, c: char) {
        // Quotes in surrounding prose are not string delimiters.
        if self.open.is_empty() {
            if c == '{' {
                self.open.push(self.normalized.len());
            }
            self.normalized.push(c);
            return;
        }

        if self.in_string {
            self.push_string_char(c);
            return;
        }

        match c {
            '"' => self.in_string = true,
            '{' => self.open.push(self.normalized.len()),
            '}' => {
                if let Some(start) = self.open.pop() {
                    self.closed.push(start..self.normalized.len() + 1);
                }
            }
            _ => {}
        }
        self.normalized.push(c);

        if c == '}' && self.open.is_empty() {
            self.flush();
        }
    }

    fn push_string_char(&mut self, c: char) {
        if self.escaped {
            self.escaped = false;
            self.normalized.push(c);
            return;
        }
        match c {
            '\\' => {
                self.escaped = true;
                self.normalized.push(c);
            }
            '"' => {
                self.in_string = false;
                self.normalized.push(c);
            }
            '\n' => self.normalized.push_str("\\n"),
            '\r' => self.normalized.push_str("\\r"),
            '\t' => self.normalized.push_str("\\t"),
            c if (c as u32) < 0x20 => self.normalized.push_str(&format!("\\u{:04x}", c as u32)),
            c => self.normalized.push(c),
        }
    }

    fn flush(&mut self) {
        self.closed.sort_by_key(|span| span.start);
        self.ready.extend(self.closed.drain(..));
    }
}

/// The first balanced span that parses as a JSON object.
pub fn first_object(text: &str) -> Option<Object> {
    let mut scanner = SpanScanner::new(text);
    while let Some(span) = scanner.next_span() {
        if let Ok(serde_json::Value::Object(map)) =
            serde_json::from_str::<serde_json::Value>(&scanner.normalized()[span])
        {
            return Some(map);
        }
    }
    None
}
