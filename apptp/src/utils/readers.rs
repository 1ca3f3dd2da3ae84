use std::io::{self, BufRead, BufReader, Lines, Read};

/// Iterates over the meaningful lines of a list file: each line is trimmed,
/// and blank lines and comment lines are skipped.
pub struct NewlineReader<R: Read> {
    comment_marker: Option<char>,
    lines: Lines<BufReader<R>>,
}

impl<R: Read> NewlineReader<R> {
    pub fn new(wrapped: R) -> Self {
        let lines = BufReader::new(wrapped).lines();
        Self {
            lines,
            comment_marker: Some('#'),
        }
    }

    pub fn set_comment_marker(mut self, marker: Option<char>) -> Self {
        self.comment_marker = marker;
        self
    }

    fn line_is_comment(&self, line: &str) -> bool {
        self.comment_marker.map_or(false, |c| line.starts_with(c))
    }
}

impl<R: Read> Iterator for NewlineReader<R> {
    type Item = io::Result<String>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            match self.lines.next() {
                None => return None,
                Some(Err(e)) => return Some(Err(e)),
                Some(Ok(l)) => {
                    let trimmed = l.trim();
                    if trimmed.is_empty() || self.line_is_comment(trimmed) {
                        continue;
                    }
                    return Some(Ok(trimmed.into()));
                }
            }
        }
    }
}
