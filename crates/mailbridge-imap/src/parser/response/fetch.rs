//! FETCH response parsing.

use crate::Result;
use crate::parser::lexer::{Lexer, Token};

use super::helpers::{parse_flag_list, skip_value};
use super::types::FetchItem;

/// Parses the parenthesized item list of a FETCH response.
pub fn parse_fetch_response(lexer: &mut Lexer<'_>) -> Result<Vec<FetchItem>> {
    lexer.expect(Token::LParen)?;

    let mut items = Vec::new();

    loop {
        match lexer.next_token()? {
            Token::RParen => break,
            Token::Space => {}
            Token::Atom(name) => {
                let upper = name.to_ascii_uppercase();
                match upper.as_str() {
                    "FLAGS" => {
                        lexer.expect_space()?;
                        items.push(FetchItem::Flags(parse_flag_list(lexer)?));
                    }
                    "UID" => {
                        lexer.expect_space()?;
                        items.push(FetchItem::Uid(lexer.read_number()?));
                    }
                    "RFC822.SIZE" => {
                        lexer.expect_space()?;
                        items.push(FetchItem::Rfc822Size(lexer.read_number()?));
                    }
                    // Servers answer BODY.PEEK[] with BODY[].
                    // Bare BODY is the non-extensible BODYSTRUCTURE form.
                    "BODY" | "BODY.PEEK" if lexer.peek() != Some(b'[') => {
                        lexer.expect_space()?;
                        skip_value(lexer)?;
                        items.push(FetchItem::Other(upper));
                    }
                    "BODY" | "BODY.PEEK" | "RFC822" => {
                        let section = if upper == "RFC822" {
                            None
                        } else {
                            parse_body_section(lexer)?
                        };

                        lexer.expect_space()?;
                        let data = match lexer.next_token()? {
                            Token::Literal(bytes) => Some(bytes.to_vec()),
                            Token::QuotedString(s) => Some(s.into_bytes()),
                            Token::Nil => None,
                            token => {
                                return Err(
                                    lexer.error(&format!("Expected body data, got {token:?}"))
                                );
                            }
                        };

                        items.push(FetchItem::Body { section, data });
                    }
                    _ => {
                        lexer.expect_space()?;
                        skip_value(lexer)?;
                        items.push(FetchItem::Other(upper));
                    }
                }
            }
            token => {
                return Err(lexer.error(&format!("Unexpected token in FETCH: {token:?}")));
            }
        }
    }

    Ok(items)
}

/// Parses `[section]` and an optional `<origin>` after BODY.
///
/// Returns `None` for the empty section, i.e. the whole message. The origin
/// is consumed but not kept, since only complete bodies are requested.
fn parse_body_section(lexer: &mut Lexer<'_>) -> Result<Option<String>> {
    lexer.expect(Token::LBracket)?;

    let mut section = Vec::new();
    loop {
        match lexer.advance() {
            Some(b']') => break,
            Some(b) => section.push(b),
            None => return Err(lexer.error("Unterminated body section")),
        }
    }

    if lexer.peek() == Some(b'<') {
        while let Some(b) = lexer.advance() {
            if b == b'>' {
                break;
            }
        }
    }

    if section.is_empty() {
        Ok(None)
    } else {
        Ok(Some(String::from_utf8_lossy(&section).into_owned()))
    }
}
