use crate::cursor::Cursor;
use crate::token::{SpaceMode, Token, TokenKind as K};

fn is_ident_start(c: u8) -> bool {
    c == b'_' || c == b'$' || (c as char).is_ascii_alphabetic()
}
fn is_ident_continue(c: u8) -> bool {
    c == b'_' || c == b'$' || (c as char).is_ascii_alphanumeric()
}

/// Pull the next token from `cur`, first consuming whitespace, comments and
/// line splices. Skipped whitespace is reflected into `out` according to
/// `mode`; comments are blanked to spaces of the same width so columns stay
/// roughly aligned and their newlines are kept so line counts stay exact.
///
/// With `cross_newlines` false a bare newline ends the call: the newline is
/// left in the cursor and `Eof` is returned, so a directive parser can
/// observe its end of line.
pub fn next_token(
    cur: &mut Cursor,
    out: &mut String,
    cross_newlines: bool,
    mode: SpaceMode,
) -> Token {
    loop {
        let c = match cur.peek() {
            Some(c) => c,
            None => return Token::eof(),
        };
        match c {
            b'/' if cur.peek_at(1) == Some(b'*') => {
                cur.skip(2);
                if mode.spaces {
                    out.push_str("  ");
                }
                let mut closed = false;
                while let Some(c2) = cur.advance() {
                    match c2 {
                        b'\n' => {
                            cur.bump_line();
                            if mode.newlines {
                                out.push('\n');
                            }
                        }
                        b'*' if cur.peek() == Some(b'/') => {
                            cur.skip(1);
                            if mode.spaces {
                                out.push_str("  ");
                            }
                            closed = true;
                            break;
                        }
                        _ => {
                            if mode.spaces {
                                out.push(' ');
                            }
                        }
                    }
                }
                if !closed {
                    return Token::new(K::Unknown, "/*", false);
                }
            }
            b'/' if cur.peek_at(1) == Some(b'/') => {
                cur.skip(2);
                while let Some(c2) = cur.peek() {
                    if c2 == b'\n' {
                        break;
                    }
                    cur.skip(1);
                    if mode.spaces {
                        out.push(' ');
                    }
                }
            }
            b'\\' => {
                // line splice; a backslash not followed by a newline starts a token
                if cur.peek_at(1) == Some(b'\n') {
                    cur.skip(2);
                } else if cur.peek_at(1) == Some(b'\r') && cur.peek_at(2) == Some(b'\n') {
                    cur.skip(3);
                } else {
                    break;
                }
                cur.bump_line();
                if mode.splices {
                    out.push_str("\\\n");
                } else if mode.newlines {
                    out.push('\n');
                }
            }
            b'\n' => {
                if !cross_newlines {
                    return Token::eof();
                }
                cur.skip(1);
                cur.bump_line();
                cur.set_line_start(true);
                if mode.newlines {
                    out.push('\n');
                }
            }
            b' ' | b'\t' | b'\r' | 0x0B | 0x0C => {
                cur.skip(1);
                if mode.spaces {
                    out.push(' ');
                }
            }
            _ => break,
        }
    }
    scan_token(cur)
}

fn scan_token(cur: &mut Cursor) -> Token {
    let line_start = cur.at_line_start();
    cur.set_line_start(false);
    let start = cur.pos();
    let c = match cur.advance() {
        Some(c) => c,
        None => return Token::eof(),
    };

    let kind = match c {
        b'"' | b'\'' => return scan_quoted(cur, start, c, line_start),
        b'#' => {
            if cur.peek() == Some(b'#') {
                cur.skip(1);
                K::DoubleSharp
            } else {
                K::Sharp
            }
        }
        c if is_ident_start(c) => {
            while let Some(c2) = cur.peek() {
                if is_ident_continue(c2) {
                    cur.skip(1);
                } else {
                    break;
                }
            }
            K::Identifier
        }
        c if c.is_ascii_digit() => return scan_number(cur, start, c, line_start),
        b'.' => {
            if cur.peek() == Some(b'.') && cur.peek_at(1) == Some(b'.') {
                cur.skip(2);
                K::TripleDots
            } else if cur.peek().is_some_and(|c2| c2.is_ascii_digit()) {
                return scan_number(cur, start, b'.', line_start);
            } else {
                K::Dot
            }
        }
        b'(' => K::LParen,
        b')' => K::RParen,
        b'[' => K::LBracket,
        b']' => K::RBracket,
        b'{' => K::LBrace,
        b'}' => K::RBrace,
        b'+' => match cur.peek() {
            Some(b'+') => {
                cur.skip(1);
                K::Inc
            }
            Some(b'=') => {
                cur.skip(1);
                K::PlusAssign
            }
            _ => K::Plus,
        },
        b'-' => match cur.peek() {
            Some(b'-') => {
                cur.skip(1);
                K::Dec
            }
            Some(b'=') => {
                cur.skip(1);
                K::MinusAssign
            }
            Some(b'>') => {
                cur.skip(1);
                K::Arrow
            }
            _ => K::Minus,
        },
        b'*' => {
            if eat(cur, b'=') {
                K::StarAssign
            } else {
                K::Star
            }
        }
        b'/' => {
            if eat(cur, b'=') {
                K::SlashAssign
            } else {
                K::Slash
            }
        }
        b'%' => {
            if eat(cur, b'=') {
                K::PercentAssign
            } else {
                K::Percent
            }
        }
        b'&' => match cur.peek() {
            Some(b'&') => {
                cur.skip(1);
                K::AndAnd
            }
            Some(b'=') => {
                cur.skip(1);
                K::AndAssign
            }
            _ => K::Amp,
        },
        b'|' => match cur.peek() {
            Some(b'|') => {
                cur.skip(1);
                K::OrOr
            }
            Some(b'=') => {
                cur.skip(1);
                K::OrAssign
            }
            _ => K::Pipe,
        },
        b'^' => {
            if eat(cur, b'=') {
                K::XorAssign
            } else {
                K::Caret
            }
        }
        b'~' => K::Tilde,
        b'!' => {
            if eat(cur, b'=') {
                K::Ne
            } else {
                K::Bang
            }
        }
        b'=' => {
            if eat(cur, b'=') {
                K::Eq
            } else {
                K::Assign
            }
        }
        b'<' => match cur.peek() {
            Some(b'=') => {
                cur.skip(1);
                if cur.peek() == Some(b'>') {
                    cur.skip(1);
                    K::Spaceship
                } else {
                    K::Le
                }
            }
            Some(b'<') => {
                cur.skip(1);
                if cur.peek() == Some(b'=') {
                    cur.skip(1);
                    K::ShlAssign
                } else {
                    K::Shl
                }
            }
            _ => K::Lt,
        },
        b'>' => match cur.peek() {
            Some(b'=') => {
                cur.skip(1);
                K::Ge
            }
            Some(b'>') => {
                cur.skip(1);
                if cur.peek() == Some(b'=') {
                    cur.skip(1);
                    K::ShrAssign
                } else {
                    K::Shr
                }
            }
            _ => K::Gt,
        },
        b'?' => K::Question,
        b':' => {
            if eat(cur, b':') {
                K::Scope
            } else {
                K::Colon
            }
        }
        b';' => K::Semicolon,
        b',' => K::Comma,
        _ => return unknown_run(cur, start, line_start),
    };
    let text = cur.substring(start, cur.pos()).to_string();
    Token::new(kind, text, line_start)
}

fn eat(cur: &mut Cursor, c: u8) -> bool {
    if cur.peek() == Some(c) {
        cur.skip(1);
        true
    } else {
        false
    }
}

fn scan_quoted(cur: &mut Cursor, start: usize, quote: u8, line_start: bool) -> Token {
    let kind = if quote == b'"' { K::Str } else { K::Char };
    loop {
        match cur.peek() {
            // unterminated at end of line or input
            None | Some(b'\n') => {
                let text = cur.substring(start, cur.pos()).to_string();
                return Token::new(K::Unknown, text, line_start);
            }
            Some(b'\\') => {
                cur.skip(1);
                if let Some(e) = cur.advance() {
                    if e == b'\n' {
                        cur.bump_line();
                    }
                }
            }
            Some(c) if c == quote => {
                cur.skip(1);
                break;
            }
            Some(_) => cur.skip(1),
        }
    }
    let text = cur.substring(start, cur.pos()).to_string();
    Token::new(kind, text, line_start)
}

const INT_SUFFIXES: [&str; 22] = [
    "ull", "uLL", "ul", "uL", "u", "Ull", "ULL", "Ul", "UL", "U", "llu", "llU", "ll", "lu", "lU",
    "l", "LLu", "LLU", "LL", "Lu", "LU", "L",
];
const FLOAT_SUFFIXES: [&str; 4] = ["f", "l", "F", "L"];

fn matches_at(cur: &Cursor, s: &str) -> bool {
    s.bytes().enumerate().all(|(i, b)| cur.peek_at(i) == Some(b))
}

fn suffix_len(cur: &Cursor, is_float: bool) -> usize {
    let table: &[&str] = if is_float { &FLOAT_SUFFIXES } else { &INT_SUFFIXES };
    for s in table {
        if matches_at(cur, s) {
            return s.len();
        }
    }
    0
}

fn scan_number(cur: &mut Cursor, start: usize, first: u8, line_start: bool) -> Token {
    let mut has_dot = first == b'.';
    let mut has_exp = false;
    let mut exp_start = false;
    let mut last_exp_start = false;
    let mut can_be_sep = !has_dot;
    let mut base = 10u32;

    if first == b'0' {
        match cur.peek() {
            Some(b'x') | Some(b'X') => {
                cur.skip(1);
                base = 16;
                can_be_sep = false;
            }
            Some(b'b') | Some(b'B') => {
                cur.skip(1);
                base = 2;
                can_be_sep = false;
            }
            Some(b'e') | Some(b'E') => {
                cur.skip(1);
                has_exp = true;
                last_exp_start = true;
                can_be_sep = false;
            }
            Some(c) if c.is_ascii_digit() => base = 8,
            Some(b'\'') => {
                if cur.peek_at(1).is_some_and(|c| c.is_ascii_digit()) {
                    base = 8;
                } else {
                    return unknown_run(cur, start, line_start);
                }
            }
            _ => {}
        }
    }

    loop {
        let mut c = match cur.peek() {
            Some(c) => c,
            None => break,
        };
        let mut last_is_sep = false;
        if c == b'\'' {
            if !can_be_sep {
                return unknown_run(cur, start, line_start);
            }
            // separators sit between digits of the same phase
            match cur.peek_at(1) {
                Some(c2) if c2.is_ascii_alphanumeric() => {
                    cur.skip(1);
                    c = c2;
                    last_is_sep = true;
                }
                _ => break,
            }
        }
        match c {
            b'.' => {
                if has_dot || has_exp || last_is_sep || base == 2 {
                    return unknown_run(cur, start, line_start);
                }
                has_dot = true;
                can_be_sep = false;
                if base == 8 {
                    base = 10;
                }
                cur.skip(1);
            }
            b'e' | b'E' if base != 16 => {
                if has_exp || last_is_sep || base == 2 {
                    return unknown_run(cur, start, line_start);
                }
                exp_start = true;
                has_exp = true;
                can_be_sep = false;
                if base == 8 {
                    base = 10;
                }
                cur.skip(1);
            }
            b'p' | b'P' if base == 16 => {
                if has_exp || last_is_sep {
                    return unknown_run(cur, start, line_start);
                }
                exp_start = true;
                has_exp = true;
                can_be_sep = false;
                cur.skip(1);
            }
            // exponent sign, valid only right after e/E/p/P
            b'+' | b'-' => {
                if !last_exp_start {
                    break;
                }
                cur.skip(1);
            }
            b'f' | b'F' if has_exp || has_dot => break,
            c2 if (b'a'..=b'f').contains(&c2) || (b'A'..=b'F').contains(&c2) => {
                if base != 16 || has_exp {
                    return unknown_run(cur, start, line_start);
                }
                can_be_sep = true;
                cur.skip(1);
            }
            c2 if c2.is_ascii_digit() => {
                can_be_sep = true;
                cur.skip(1);
            }
            _ => break,
        }
        last_exp_start = exp_start;
        exp_start = false;
    }

    if base == 8 {
        let body = cur.substring(start, cur.pos());
        if body.bytes().any(|b| b == b'8' || b == b'9') {
            return unknown_run(cur, start, line_start);
        }
    }

    // the suffix is kept in the lexeme so the token can be emitted verbatim
    let n = suffix_len(cur, has_dot || has_exp);
    cur.skip(n);
    let text = cur.substring(start, cur.pos()).to_string();
    Token::new(K::Number, text, line_start)
}

fn unknown_run(cur: &mut Cursor, start: usize, line_start: bool) -> Token {
    // cover the offending run, but stop where a new token could begin so a
    // stray literal like `2d` does not swallow a closing bracket
    while let Some(c) = cur.peek() {
        if is_ident_continue(c) || c == b'.' || c == b'\'' {
            cur.skip(1);
        } else {
            break;
        }
    }
    let text = cur.substring(start, cur.pos()).to_string();
    Token::new(K::Unknown, text, line_start)
}
