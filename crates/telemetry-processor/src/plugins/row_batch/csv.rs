// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Delimiter-separated row parsing.
//!
//! Fields may be wrapped in double quotes, in which case they can contain the
//! delimiter, line breaks and `""` for a literal quote. Blank lines are
//! skipped and `\r\n` line endings are accepted.
//!
//! Rows may arrive split across batches; [`split_complete`] separates the rows
//! that are known to be whole from the unfinished tail.

use std::iter::Peekable;
use std::str::Chars;

use crate::errors::ParseError;

pub fn parse_rows(input: &str, delimiter: char) -> Result<Vec<Vec<String>>, ParseError> {
    RowReader::new(input, delimiter).collect()
}

/// Splits `input` after the last line break that is outside quotes.
///
/// The first half holds complete rows only; the second is an unfinished row,
/// possibly inside an open quoted field, to be prefixed to the next input.
#[must_use]
pub fn split_complete(input: &str, delimiter: char) -> (&str, &str) {
    let mut chars = input.char_indices().peekable();
    let mut cut = 0;
    let mut field_start = true;
    let mut in_quotes = false;

    while let Some((index, c)) = chars.next() {
        if in_quotes {
            if c == '"' {
                if chars.peek().map(|(_, next)| *next) == Some('"') {
                    chars.next();
                } else {
                    in_quotes = false;
                }
            }
            continue;
        }
        match c {
            '"' if field_start => {
                in_quotes = true;
                field_start = false;
            }
            '\n' => {
                cut = index + 1;
                field_start = true;
            }
            c if c == delimiter => field_start = true,
            _ => field_start = false,
        }
    }
    input.split_at(cut)
}

struct RowReader<'a> {
    chars: Peekable<Chars<'a>>,
    delimiter: char,
    row: usize,
}

impl<'a> RowReader<'a> {
    fn new(input: &'a str, delimiter: char) -> Self {
        Self {
            chars: input.chars().peekable(),
            delimiter,
            row: 0,
        }
    }

    fn read_row(&mut self) -> Option<Result<Vec<String>, ParseError>> {
        loop {
            self.chars.peek()?;
            self.row += 1;

            let mut fields = Vec::new();
            let mut field = String::new();
            let mut quoted = false;
            let mut in_quotes = false;

            loop {
                let Some(c) = self.chars.next() else {
                    if in_quotes {
                        return Some(Err(ParseError::UnterminatedQuote { row: self.row }));
                    }
                    break;
                };

                if in_quotes {
                    if c == '"' {
                        if self.chars.peek() == Some(&'"') {
                            self.chars.next();
                            field.push('"');
                        } else {
                            in_quotes = false;
                        }
                    } else {
                        field.push(c);
                    }
                    continue;
                }

                match c {
                    '"' if field.is_empty() && !quoted => {
                        quoted = true;
                        in_quotes = true;
                    }
                    '\r' if self.chars.peek() == Some(&'\n') => {}
                    '\n' => break,
                    c if c == self.delimiter => {
                        fields.push(std::mem::take(&mut field));
                        quoted = false;
                    }
                    c => field.push(c),
                }
            }

            let blank = fields.is_empty() && field.is_empty() && !quoted;
            if blank {
                self.row -= 1;
                continue;
            }
            fields.push(field);
            return Some(Ok(fields));
        }
    }
}

impl Iterator for RowReader<'_> {
    type Item = Result<Vec<String>, ParseError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.read_row()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_rows() {
        let rows = parse_rows("a,b,c\n1,2,3\n", ',').unwrap();
        assert_eq!(rows, vec![vec!["a", "b", "c"], vec!["1", "2", "3"]]);
    }

    #[test]
    fn test_quoted_fields() {
        let rows = parse_rows("\"x,y\",\"say \"\"hi\"\"\",\"two\nlines\"\r\n", ',').unwrap();
        assert_eq!(rows, vec![vec!["x,y", "say \"hi\"", "two\nlines"]]);
    }

    #[test]
    fn test_blank_lines_and_empty_fields() {
        let rows = parse_rows("\n\na,,c\n\n", ',').unwrap();
        assert_eq!(rows, vec![vec!["a", "", "c"]]);
        let rows = parse_rows("\"\"\n", ',').unwrap();
        assert_eq!(rows, vec![vec![""]]);
        assert!(parse_rows("", ',').unwrap().is_empty());
    }

    #[test]
    fn test_custom_delimiter() {
        let rows = parse_rows("a|b\tc", '|').unwrap();
        assert_eq!(rows, vec![vec!["a", "b\tc"]]);
    }

    #[test]
    fn test_split_complete() {
        assert_eq!(split_complete("a,1\nb,2\nc,", ','), ("a,1\nb,2\n", "c,"));
        assert_eq!(split_complete("a,1\r\n", ','), ("a,1\r\n", ""));
        assert_eq!(split_complete("partial", ','), ("", "partial"));
        assert_eq!(split_complete("", ','), ("", ""));
    }

    #[test]
    fn test_split_complete_respects_quotes() {
        let input = "ok,1\n\"two\nlines\",2\n\"open\nfield";
        assert_eq!(
            split_complete(input, ','),
            ("ok,1\n\"two\nlines\",2\n", "\"open\nfield")
        );
        assert_eq!(
            split_complete("\"say \"\"hi\"\"\nstill quoted", ','),
            ("", "\"say \"\"hi\"\"\nstill quoted")
        );
        // a quote inside an unquoted field is literal
        assert_eq!(split_complete("a\"b\nc", ','), ("a\"b\n", "c"));
        assert_eq!(split_complete("x|\"y\nz", '|'), ("", "x|\"y\nz"));
    }

    #[test]
    fn test_unterminated_quote() {
        let err = parse_rows("ok\n\"open,field\n", ',').unwrap_err();
        assert_eq!(err, ParseError::UnterminatedQuote { row: 2 });
    }
}
