//! Parser helper functions.

use crate::parser::lexer::{Lexer, Token};
use crate::types::{Capability, ResponseCode, SeqNum};
use crate::{Error, Result};

/// Parses a bracketed response code. Unknown codes keep their atom and any
/// arguments are skipped.
pub fn parse_response_code(lexer: &mut Lexer<'_>) -> Result<ResponseCode> {
    lexer.expect(Token::LBracket)?;

    let atom = lexer.read_atom_string()?;
    let code = match atom.to_ascii_uppercase().as_str() {
        "ALERT" => ResponseCode::Alert,
        "READ-ONLY" => ResponseCode::ReadOnly,
        "READ-WRITE" => ResponseCode::ReadWrite,
        "AUTHENTICATIONFAILED" => ResponseCode::AuthenticationFailed,
        "NONEXISTENT" => ResponseCode::Nonexistent,
        "UIDVALIDITY" => {
            lexer.expect_space()?;
            ResponseCode::UidValidity(lexer.read_number()?)
        }
        "UNSEEN" => {
            lexer.expect_space()?;
            ResponseCode::Unseen(lexer.read_number()?)
        }
        "CAPABILITY" => ResponseCode::Capability(parse_capability_data(lexer)?),
        _ => ResponseCode::Other(atom.to_string()),
    };

    while lexer.peek() != Some(b']') && !lexer.is_eof() {
        lexer.advance();
    }
    lexer.expect(Token::RBracket)?;

    Ok(code)
}

/// Parses space-separated capability atoms up to the end of the line or a
/// closing bracket.
pub fn parse_capability_data(lexer: &mut Lexer<'_>) -> Result<Vec<Capability>> {
    let mut caps = Vec::new();

    while lexer.peek() == Some(b' ') {
        lexer.advance();
        if let Token::Atom(s) = lexer.next_token()? {
            caps.push(Capability::parse(s));
        }
    }

    Ok(caps)
}

/// Parses a SEARCH response. An empty result is just `* SEARCH`.
pub fn parse_search_response(lexer: &mut Lexer<'_>) -> Result<Vec<SeqNum>> {
    let mut nums = Vec::new();

    while lexer.peek() == Some(b' ') {
        lexer.advance();
        match lexer.next_token()? {
            Token::Number(n) => {
                let seq = SeqNum::new(n).ok_or_else(|| lexer.error("Invalid sequence number 0"))?;
                nums.push(seq);
            }
            // Trailing space before CRLF, or a MODSEQ suffix.
            Token::Crlf | Token::Eof => break,
            _ => skip_to_crlf(lexer),
        }
    }

    Ok(nums)
}

/// Parses a parenthesized flag list into raw atoms.
pub fn parse_flag_list(lexer: &mut Lexer<'_>) -> Result<Vec<String>> {
    lexer.expect(Token::LParen)?;

    let mut flags = Vec::new();
    loop {
        match lexer.next_token()? {
            Token::RParen => break,
            Token::Space => {}
            Token::Atom(s) => flags.push(s.to_string()),
            token => {
                return Err(lexer.error(&format!("Unexpected token in flag list: {token:?}")));
            }
        }
    }

    Ok(flags)
}

/// Reads text until CRLF and consumes the CRLF.
pub fn read_text_until_crlf(lexer: &mut Lexer<'_>) -> String {
    let remaining = lexer.remaining();
    let end = remaining
        .windows(2)
        .position(|w| w == b"\r\n")
        .unwrap_or(remaining.len());

    lexer.skip(end + 2);

    String::from_utf8_lossy(&remaining[..end]).into_owned()
}

/// Skips the rest of the line. Literals are stepped over as tokens, so a
/// CRLF inside literal data never ends the skip early.
pub fn skip_to_crlf(lexer: &mut Lexer<'_>) {
    loop {
        match lexer.next_token() {
            Ok(Token::Crlf | Token::Eof) => break,
            Ok(_) => {}
            // Unlexable bytes: fall back to a raw scan.
            Err(_) => {
                read_text_until_crlf(lexer);
                break;
            }
        }
    }
}

/// Skips one FETCH item value: a single token or a balanced parenthesized
/// list.
pub fn skip_value(lexer: &mut Lexer<'_>) -> Result<()> {
    let mut depth = 0usize;
    loop {
        match lexer.next_token()? {
            Token::LParen => depth += 1,
            Token::RParen => {
                depth = depth
                    .checked_sub(1)
                    .ok_or_else(|| lexer.error("Unbalanced parenthesis"))?;
            }
            Token::Crlf | Token::Eof => {
                return Err(Error::Parse {
                    position: lexer.position(),
                    message: "Unexpected end of FETCH item".to_string(),
                });
            }
            _ => {}
        }
        if depth == 0 {
            return Ok(());
        }
    }
}
