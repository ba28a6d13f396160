//! Streaming fixup for self-closed inline tags.
//!
//! HTML parsers ignore the trailing slash on non-void elements, so
//! `<span class="x"/>text` swallows `text` into the span. [`InlineTagCloser`]
//! rewrites every self-closed occurrence of one marker tag into an explicit
//! open+close pair before the markup reaches the parser:
//!
//! ```text
//! pre<span attr1="value" attr2/>post  =>  pre<span attr1="value" attr2></span>post
//! ```
//!
//! Quoted attribute values are left alone, so `<a title="<span/>">` passes
//! through untouched.

use std::collections::VecDeque;
use std::io::{self, BufReader, Bytes, Read};

pub const DEFAULT_INLINE_MARKER: &str = "span";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum State {
    /// Looking for `<` + marker outside of quoted attribute values.
    Scanning,
    /// `<` + marker has been read; waiting for a byte proving it is the whole tag name.
    OpenMarkerMatched,
    /// Inside the marker's open tag.
    InMarkerTag,
    /// The open tag's `>` has been emitted.
    CloseAngleSeen,
}

pub struct InlineTagCloser<R> {
    inner: Bytes<BufReader<R>>,
    open_sequence: Vec<u8>,
    close_sequence: Vec<u8>,
    state: State,
    matched: usize,
    in_tag: bool,
    quote: Option<u8>,
    escaped: bool,
    pending_slash: bool,
    self_closed: bool,
    output: VecDeque<u8>,
    eof: bool,
}

impl<R: Read> InlineTagCloser<R> {
    pub fn new(inner: R, marker: &str) -> Self {
        let marker = marker.to_ascii_lowercase();
        Self {
            inner: BufReader::new(inner).bytes(),
            open_sequence: format!("<{marker}").into_bytes(),
            close_sequence: format!("</{marker}>").into_bytes(),
            state: State::Scanning,
            matched: 0,
            in_tag: false,
            quote: None,
            escaped: false,
            pending_slash: false,
            self_closed: false,
            output: VecDeque::with_capacity(marker.len() + 4),
            eof: false,
        }
    }

    fn reset_detector(&mut self) {
        self.state = State::Scanning;
        self.matched = 0;
        self.pending_slash = false;
        self.self_closed = false;
    }

    /// Tracks quoting; returns `true` if `byte` is part of a quoted value.
    fn track_quotes(&mut self, byte: u8) -> bool {
        let escaped = std::mem::replace(&mut self.escaped, byte == b'\\');
        match self.quote {
            Some(q) => {
                if byte == q && !escaped {
                    self.quote = None;
                }
                true
            }
            None if self.in_tag && (byte == b'"' || byte == b'\'') && !escaped => {
                self.quote = Some(byte);
                true
            }
            None => false,
        }
    }

    fn feed(&mut self, byte: u8) {
        match self.state {
            State::Scanning | State::CloseAngleSeen => self.scan(byte),
            State::OpenMarkerMatched => {
                if byte.is_ascii_whitespace() || byte == b'/' || byte == b'>' {
                    self.state = State::InMarkerTag;
                    self.in_marker_tag(byte);
                } else {
                    // a longer tag name such as `<spanner`
                    self.reset_detector();
                    self.scan(byte);
                }
            }
            State::InMarkerTag => self.in_marker_tag(byte),
        }
    }

    fn scan(&mut self, byte: u8) {
        self.state = State::Scanning;
        self.output.push_back(byte);
        if self.track_quotes(byte) {
            self.matched = 0;
            return;
        }

        match byte {
            b'<' => self.in_tag = true,
            b'>' => self.in_tag = false,
            _ => {}
        }

        if byte.to_ascii_lowercase() == self.open_sequence[self.matched] {
            self.matched += 1;
            if self.matched == self.open_sequence.len() {
                self.matched = 0;
                self.state = State::OpenMarkerMatched;
            }
        } else {
            self.matched = usize::from(byte == b'<');
        }
    }

    fn in_marker_tag(&mut self, byte: u8) {
        if self.pending_slash {
            self.pending_slash = false;
            if byte == b'>' {
                self.self_closed = true;
            } else {
                self.output.push_back(b'/');
            }
        }

        if self.track_quotes(byte) {
            self.output.push_back(byte);
            return;
        }

        match byte {
            b'/' => self.pending_slash = true,
            b'>' => {
                self.output.push_back(byte);
                self.in_tag = false;
                self.state = State::CloseAngleSeen;
            }
            _ => self.output.push_back(byte),
        }
    }
}

impl<R: Read> Read for InlineTagCloser<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut written = 0;
        while written < buf.len() {
            if let Some(byte) = self.output.pop_front() {
                buf[written] = byte;
                written += 1;
                continue;
            }

            if self.state == State::CloseAngleSeen {
                if self.self_closed {
                    self.output.extend(self.close_sequence.iter());
                }
                self.reset_detector();
                continue;
            }

            if self.eof {
                break;
            }

            match self.inner.next() {
                Some(byte) => self.feed(byte?),
                None => {
                    self.eof = true;
                    if std::mem::take(&mut self.pending_slash) {
                        self.output.push_back(b'/');
                    }
                }
            }
        }

        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn close(input: &str) -> String {
        let mut out = String::new();
        InlineTagCloser::new(input.as_bytes(), DEFAULT_INLINE_MARKER)
            .read_to_string(&mut out)
            .unwrap();
        out
    }

    #[rstest]
    #[case("<p><span/></p>", "<p><span></span></p>")]
    #[case(
        r#"pre<span attr1="value" attr2/>post"#,
        r#"pre<span attr1="value" attr2></span>post"#
    )]
    #[case(
        "<span/><span/><span a=\"v\"/><span/>",
        "<span></span><span></span><span a=\"v\"></span><span></span>"
    )]
    #[case(
        r#"<span name="outer"><span name="inner"/></span>"#,
        r#"<span name="outer"><span name="inner"></span></span>"#
    )]
    #[case(
        "<span rel=\"foaf:homepage\" resource=\"http://richard.cyganiak.de/\" />",
        "<span rel=\"foaf:homepage\" resource=\"http://richard.cyganiak.de/\" ></span>"
    )]
    #[case("<SPAN/>", "<SPAN></span>")]
    #[case(r#"<span title="a/>b"/>"#, r#"<span title="a/>b"></span>"#)]
    #[case("He said \"<span/>\" loudly", "He said \"<span></span>\" loudly")]
    fn rewrites_self_closed_marker(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(close(input), expected);
    }

    #[rstest]
    #[case(r#"<a title="<span/>">x</a>"#)]
    #[case(r#"<a title='<span/>'>x</a>"#)]
    #[case(r#"pre<span attr1="value" attr2>mid</span>post"#)]
    #[case("<spanner/>")]
    #[case("<br/><img src=\"a.png\"/>")]
    #[case("<span class=a/b>x</span>")]
    #[case("dangling <span/")]
    fn leaves_other_markup_alone(#[case] input: &str) {
        assert_eq!(close(input), input);
    }

    #[test]
    fn custom_marker() {
        let mut out = String::new();
        InlineTagCloser::new("<abbr title=\"x\"/><span/>".as_bytes(), "abbr")
            .read_to_string(&mut out)
            .unwrap();
        assert_eq!(out, "<abbr title=\"x\"></abbr><span/>");
    }

    #[test]
    fn small_reads_see_the_same_stream() {
        let input = "<div><span class=\"value\"/>tail</div>";
        let mut closer = InlineTagCloser::new(input.as_bytes(), DEFAULT_INLINE_MARKER);
        let mut out = Vec::new();
        let mut buf = [0u8; 3];
        loop {
            let n = closer.read(&mut buf).unwrap();
            if n == 0 {
                break;
            }
            out.extend_from_slice(&buf[..n]);
        }
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "<div><span class=\"value\"></span>tail</div>"
        );
    }
}
