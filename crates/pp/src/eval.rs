use anyhow::{bail, Result};
use lex::{Cursor, SpaceMode, Token, TokenKind as K};

use crate::engine::Engine;

impl Engine<'_> {
    /// Evaluate the tail of an `#if`/`#elif` line: resolve `defined` and
    /// `__has_include`, macro-expand what remains, then run the constant
    /// expression. Nonzero is true.
    pub(crate) fn eval_condition(&mut self, tail: &str) -> Result<bool> {
        let prepared = self.replace_defined(tail)?;
        let expanded = self.expand_text(&prepared)?;
        let mut ev = Eval::new(&expanded);
        let v = ev.parse_expr()?;
        let trailing = ev.next()?;
        if trailing.kind != K::Eof {
            bail!("unexpected '{}' in preprocessor expression", trailing.text);
        }
        Ok(v != 0)
    }

    // `defined X`, `defined(X)` and `__has_include(...)` are resolved before
    // any macro expansion so their operands are not expanded out from under
    // them.
    fn replace_defined(&mut self, text: &str) -> Result<String> {
        let mut cur = Cursor::new(text);
        let mut prep = String::new();
        loop {
            let mut ws = String::new();
            let tok = lex::next_token(&mut cur, &mut ws, true, SpaceMode::SPACES);
            prep.push_str(&ws);
            match tok.kind {
                K::Eof => break,
                K::Identifier if tok.text == "defined" => {
                    let mut scratch = String::new();
                    let mut t = lex::next_token(&mut cur, &mut scratch, true, SpaceMode::NONE);
                    let parens = t.kind == K::LParen;
                    if parens {
                        t = lex::next_token(&mut cur, &mut scratch, true, SpaceMode::NONE);
                    }
                    if t.kind != K::Identifier {
                        bail!("expected identifier after 'defined'");
                    }
                    if parens {
                        let close = lex::next_token(&mut cur, &mut scratch, true, SpaceMode::NONE);
                        if close.kind != K::RParen {
                            bail!("expected ')' after 'defined({}'", t.text);
                        }
                    }
                    prep.push(if self.macros.contains(&t.text) { '1' } else { '0' });
                }
                K::Identifier if tok.text == "__has_include" => {
                    let mut scratch = String::new();
                    let open = lex::next_token(&mut cur, &mut scratch, true, SpaceMode::NONE);
                    if open.kind != K::LParen {
                        bail!("expected '(' after '__has_include'");
                    }
                    while matches!(cur.peek(), Some(b' ') | Some(b'\t')) {
                        cur.skip(1);
                    }
                    // a quoted name is one token; an angled name is read at
                    // character level, it is no token of the C grammar
                    let name = match cur.peek() {
                        Some(b'"') => {
                            let t = lex::next_token(&mut cur, &mut scratch, true, SpaceMode::NONE);
                            if t.kind != K::Str {
                                bail!("malformed '__has_include'");
                            }
                            t.text.trim_matches('"').to_string()
                        }
                        Some(b'<') => {
                            cur.skip(1);
                            let start = cur.pos();
                            while cur.peek().is_some() && cur.peek() != Some(b'>') {
                                cur.skip(1);
                            }
                            if cur.peek() != Some(b'>') {
                                bail!("malformed '__has_include'");
                            }
                            let name = cur.substring(start, cur.pos()).to_string();
                            cur.skip(1);
                            name
                        }
                        _ => bail!("malformed '__has_include'"),
                    };
                    let close = lex::next_token(&mut cur, &mut scratch, true, SpaceMode::NONE);
                    if close.kind != K::RParen {
                        bail!("expected ')' after '__has_include'");
                    }
                    let including = self.current_path().to_string();
                    let hit = self.includer.has_header(&name, &including);
                    prep.push(if hit { '1' } else { '0' });
                }
                _ => prep.push_str(&tok.text),
            }
        }
        Ok(prep)
    }
}

/// Recursive-descent evaluator over the expanded expression text. All
/// arithmetic is 64-bit signed and wrapping; surviving identifiers are 0
/// except `true`. Both arms of `?:` and both operands of `&&`/`||` are
/// evaluated, the preprocessor has no side effects to guard.
struct Eval {
    cur: Cursor,
    pending: Option<Token>,
}

impl Eval {
    fn new(text: &str) -> Self {
        Self {
            cur: Cursor::new(text),
            pending: None,
        }
    }

    fn next(&mut self) -> Result<Token> {
        if let Some(t) = self.pending.take() {
            return Ok(t);
        }
        let mut ws = String::new();
        let t = lex::next_token(&mut self.cur, &mut ws, true, SpaceMode::NONE);
        if t.kind == K::Unknown {
            bail!("bad token '{}' in preprocessor expression", t.text);
        }
        Ok(t)
    }

    fn peek(&mut self) -> Result<&Token> {
        if self.pending.is_none() {
            self.pending = Some(self.next()?);
        }
        Ok(self.pending.as_ref().unwrap())
    }

    fn eat(&mut self, k: K) -> Result<bool> {
        if self.peek()?.kind == k {
            self.next()?;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    // lowest priority: the comma operator yields its right operand
    fn parse_expr(&mut self) -> Result<i64> {
        let mut v = self.parse_ternary()?;
        while self.eat(K::Comma)? {
            v = self.parse_ternary()?;
        }
        Ok(v)
    }

    fn parse_ternary(&mut self) -> Result<i64> {
        let c = self.parse_lor()?;
        if !self.eat(K::Question)? {
            return Ok(c);
        }
        let t = self.parse_expr()?;
        if !self.eat(K::Colon)? {
            bail!("'?' without a ':'");
        }
        let f = self.parse_ternary()?;
        Ok(if c != 0 { t } else { f })
    }

    fn parse_lor(&mut self) -> Result<i64> {
        let mut v = self.parse_land()?;
        while self.eat(K::OrOr)? {
            let r = self.parse_land()?;
            v = (v != 0 || r != 0) as i64;
        }
        Ok(v)
    }

    fn parse_land(&mut self) -> Result<i64> {
        let mut v = self.parse_bor()?;
        while self.eat(K::AndAnd)? {
            let r = self.parse_bor()?;
            v = (v != 0 && r != 0) as i64;
        }
        Ok(v)
    }

    fn parse_bor(&mut self) -> Result<i64> {
        let mut v = self.parse_bxor()?;
        while self.eat(K::Pipe)? {
            v |= self.parse_bxor()?;
        }
        Ok(v)
    }

    fn parse_bxor(&mut self) -> Result<i64> {
        let mut v = self.parse_band()?;
        while self.eat(K::Caret)? {
            v ^= self.parse_band()?;
        }
        Ok(v)
    }

    fn parse_band(&mut self) -> Result<i64> {
        let mut v = self.parse_eq()?;
        while self.eat(K::Amp)? {
            v &= self.parse_eq()?;
        }
        Ok(v)
    }

    fn parse_eq(&mut self) -> Result<i64> {
        let mut v = self.parse_rel()?;
        loop {
            if self.eat(K::Eq)? {
                v = (v == self.parse_rel()?) as i64;
            } else if self.eat(K::Ne)? {
                v = (v != self.parse_rel()?) as i64;
            } else {
                return Ok(v);
            }
        }
    }

    fn parse_rel(&mut self) -> Result<i64> {
        let mut v = self.parse_shift()?;
        loop {
            if self.eat(K::Le)? {
                v = (v <= self.parse_shift()?) as i64;
            } else if self.eat(K::Ge)? {
                v = (v >= self.parse_shift()?) as i64;
            } else if self.eat(K::Lt)? {
                v = (v < self.parse_shift()?) as i64;
            } else if self.eat(K::Gt)? {
                v = (v > self.parse_shift()?) as i64;
            } else {
                return Ok(v);
            }
        }
    }

    fn parse_shift(&mut self) -> Result<i64> {
        let mut v = self.parse_add()?;
        loop {
            if self.eat(K::Shl)? {
                v = v.wrapping_shl(self.parse_add()? as u32);
            } else if self.eat(K::Shr)? {
                v = v.wrapping_shr(self.parse_add()? as u32);
            } else {
                return Ok(v);
            }
        }
    }

    fn parse_add(&mut self) -> Result<i64> {
        let mut v = self.parse_mul()?;
        loop {
            if self.eat(K::Plus)? {
                v = v.wrapping_add(self.parse_mul()?);
            } else if self.eat(K::Minus)? {
                v = v.wrapping_sub(self.parse_mul()?);
            } else {
                return Ok(v);
            }
        }
    }

    fn parse_mul(&mut self) -> Result<i64> {
        let mut v = self.parse_unary()?;
        loop {
            if self.eat(K::Star)? {
                v = v.wrapping_mul(self.parse_unary()?);
            } else if self.eat(K::Slash)? {
                let r = self.parse_unary()?;
                if r == 0 {
                    bail!("division by zero in preprocessor expression");
                }
                v = v.wrapping_div(r);
            } else if self.eat(K::Percent)? {
                let r = self.parse_unary()?;
                if r == 0 {
                    bail!("division by zero in preprocessor expression");
                }
                v = v.wrapping_rem(r);
            } else {
                return Ok(v);
            }
        }
    }

    fn parse_unary(&mut self) -> Result<i64> {
        if self.eat(K::Plus)? {
            self.parse_unary()
        } else if self.eat(K::Minus)? {
            Ok(self.parse_unary()?.wrapping_neg())
        } else if self.eat(K::Bang)? {
            Ok((self.parse_unary()? == 0) as i64)
        } else if self.eat(K::Tilde)? {
            Ok(!self.parse_unary()?)
        } else {
            self.parse_primary()
        }
    }

    fn parse_primary(&mut self) -> Result<i64> {
        let t = self.next()?;
        match t.kind {
            K::LParen => {
                let v = self.parse_expr()?;
                let close = self.next()?;
                if close.kind != K::RParen {
                    bail!("unmatched '(' in preprocessor expression");
                }
                Ok(v)
            }
            K::Number => parse_int(&t.text),
            K::Identifier => Ok(match t.text.as_str() {
                "true" => 1,
                _ => 0,
            }),
            K::Eof => bail!("expected an operand in preprocessor expression"),
            _ => bail!("'{}' not allowed in preprocessor expression", t.text),
        }
    }
}

fn parse_int(text: &str) -> Result<i64> {
    let s: String = text.chars().filter(|c| *c != '\'').collect();
    let is_hex = s.starts_with("0x") || s.starts_with("0X");
    let floating = s.contains('.')
        || (!is_hex && (s.contains('e') || s.contains('E')))
        || (is_hex && (s.contains('p') || s.contains('P')));
    if floating {
        bail!("floating point literal in preprocessor expression");
    }
    let (digits, base) = if is_hex {
        (&s[2..], 16i64)
    } else if s.starts_with("0b") || s.starts_with("0B") {
        (&s[2..], 2)
    } else if s.len() > 1 && s.starts_with('0') {
        (&s[1..], 8)
    } else {
        (&s[..], 10)
    };
    let end = digits
        .bytes()
        .position(|b| matches!(b, b'u' | b'U' | b'l' | b'L'))
        .unwrap_or(digits.len());
    let digits = &digits[..end];
    if digits.is_empty() {
        bail!("malformed number '{}'", text);
    }
    let mut v: i64 = 0;
    for b in digits.bytes() {
        let d = match b {
            b'0'..=b'9' => (b - b'0') as i64,
            b'a'..=b'f' => (b - b'a' + 10) as i64,
            b'A'..=b'F' => (b - b'A' + 10) as i64,
            _ => bail!("malformed number '{}'", text),
        };
        if d >= base {
            bail!("malformed number '{}'", text);
        }
        v = v.wrapping_mul(base).wrapping_add(d);
    }
    Ok(v)
}
