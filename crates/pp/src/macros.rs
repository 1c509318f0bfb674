use std::collections::HashMap;

use anyhow::{bail, Result};
use lex::{Cursor, SpaceMode, Token, TokenKind};

use crate::engine::{Engine, Purpose};

#[derive(Debug, Clone)]
pub(crate) struct MacroDef {
    /// None for object-like macros; function-like macros keep their
    /// parameter names in declaration order.
    pub params: Option<Vec<String>>,
    pub variadic: bool,
    /// Replacement text, trimmed, with splices flattened to spaces.
    pub body: String,
    /// Where the definition came from; `usize::MAX` marks a `-D` option.
    pub file: usize,
    pub line: u32,
}

impl MacroDef {
    pub fn is_function_like(&self) -> bool {
        self.params.is_some()
    }
}

#[derive(Default)]
pub(crate) struct MacroTable {
    defs: HashMap<String, MacroDef>,
}

impl MacroTable {
    pub fn get(&self, name: &str) -> Option<&MacroDef> {
        self.defs.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.defs.contains_key(name)
    }

    /// Redefinition replaces the previous definition.
    pub fn insert(&mut self, name: &str, def: MacroDef) {
        self.defs.insert(name.to_string(), def);
    }

    pub fn define_object(&mut self, name: &str, body: &str) {
        self.insert(
            name,
            MacroDef {
                params: None,
                variadic: false,
                body: body.to_string(),
                file: usize::MAX,
                line: 0,
            },
        );
    }

    pub fn remove(&mut self, name: &str) {
        self.defs.remove(name);
    }
}

fn param_index(params: &[String], name: &str) -> Option<usize> {
    params.iter().position(|p| p == name)
}

/// Stringification escapes just quotes and backslashes; the argument text is
/// otherwise taken as spelled.
fn stringify_escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        if ch == '"' || ch == '\\' {
            out.push('\\');
        }
        out.push(ch);
    }
    out
}

/// The raw spelling a `#` or `##` operand contributes: parameters stand for
/// their unexpanded argument text, `__VA_ARGS__` for the extras joined with
/// a comma, anything else for its own lexeme.
fn raw_spelling(
    tok: &Token,
    params: &[String],
    named: &[String],
    extras: &[String],
    variadic: bool,
) -> Result<String> {
    if tok.kind == TokenKind::Identifier {
        if let Some(i) = param_index(params, &tok.text) {
            return Ok(named[i].clone());
        }
        if tok.text == "__VA_ARGS__" {
            if !variadic {
                bail!("'__VA_ARGS__' used outside a variadic macro");
            }
            return Ok(extras.join(", "));
        }
    }
    Ok(tok.text.clone())
}

/// Scans a macro body one token at a time with its leading whitespace, with
/// one item of pushback for the `#`/`##` lookahead.
struct BodyScan {
    cur: Cursor,
    pending: Option<(String, Token)>,
}

impl BodyScan {
    fn new(text: &str) -> Self {
        Self {
            cur: Cursor::new(text),
            pending: None,
        }
    }

    fn next(&mut self) -> (String, Token) {
        if let Some(p) = self.pending.take() {
            return p;
        }
        let mut ws = String::new();
        let tok = lex::next_token(
            &mut self.cur,
            &mut ws,
            true,
            SpaceMode {
                spaces: true,
                newlines: true,
                splices: false,
            },
        );
        (ws.replace('\n', " "), tok)
    }

    fn peek(&mut self) -> &(String, Token) {
        if self.pending.is_none() {
            let p = self.next();
            self.pending = Some(p);
        }
        self.pending.as_ref().unwrap()
    }

    fn push_back(&mut self, item: (String, Token)) {
        self.pending = Some(item);
    }

    /// Rebuild the token text up to the `)` matching an already-consumed `(`.
    fn balanced_text(&mut self) -> Result<String> {
        let mut depth = 0u32;
        let mut text = String::new();
        loop {
            let (ws, tok) = self.next();
            match tok.kind {
                TokenKind::Eof => bail!("unterminated '__VA_OPT__'"),
                TokenKind::LParen => {
                    depth += 1;
                    text.push_str(&ws);
                    text.push('(');
                }
                TokenKind::RParen => {
                    if depth == 0 {
                        return Ok(text);
                    }
                    depth -= 1;
                    text.push_str(&ws);
                    text.push(')');
                }
                _ => {
                    text.push_str(&ws);
                    text.push_str(&tok.text);
                }
            }
        }
    }
}

impl Engine<'_> {
    /// Parse the remainder of a `#define` line and store the macro.
    pub(crate) fn parse_define(&mut self, floor: usize) -> Result<()> {
        let name = self.next_token(floor, false, Purpose::Drop, None);
        if name.kind != TokenKind::Identifier {
            bail!("expected identifier after #define");
        }
        let line = self.current_line();
        // a parameter list only counts when the '(' hugs the name
        let immediate_paren = self
            .inputs
            .last()
            .is_some_and(|i| i.cursor.peek() == Some(b'('));
        let (params, variadic) = if immediate_paren {
            let _open = self.next_token(floor, false, Purpose::Drop, None);
            let mut params = Vec::new();
            let mut variadic = false;
            loop {
                let tok = self.next_token(floor, false, Purpose::Drop, None);
                match tok.kind {
                    TokenKind::RParen => break,
                    TokenKind::TripleDots => {
                        variadic = true;
                        let close = self.next_token(floor, false, Purpose::Drop, None);
                        if close.kind != TokenKind::RParen {
                            bail!("'...' must be the last macro parameter");
                        }
                        break;
                    }
                    TokenKind::Identifier => {
                        params.push(tok.text);
                        let sep = self.next_token(floor, false, Purpose::Drop, None);
                        match sep.kind {
                            TokenKind::Comma => {}
                            TokenKind::RParen => break,
                            _ => bail!("malformed parameter list in #define"),
                        }
                    }
                    _ => bail!("malformed parameter list in #define"),
                }
            }
            (Some(params), variadic)
        } else {
            (None, false)
        };
        let body = self.directive_tail(floor)?;
        let file = self.files.last().map(|f| f.path).unwrap_or(0);
        self.macros.insert(
            &name.text,
            MacroDef {
                params,
                variadic,
                body,
                file,
                line,
            },
        );
        Ok(())
    }

    /// Collect the arguments of a function-like invocation, starting just
    /// after the `(`. Splitting happens at top-level commas only; each
    /// argument is trimmed, and whitespace runs inside one collapse to
    /// single spaces. Line breaks inside the invocation are forwarded to
    /// the output so line counts hold across multi-line calls.
    pub(crate) fn collect_args(&mut self, floor: usize) -> Result<Vec<String>> {
        let mut args = Vec::new();
        let mut arg = String::new();
        let mut depth = 0u32;
        loop {
            let mut ws = String::new();
            let tok = self.next_token(floor, true, Purpose::Collect, Some(&mut ws));
            for _ in ws.matches('\n') {
                self.out.push('\n');
            }
            if !ws.is_empty() {
                arg.push(' ');
            }
            match tok.kind {
                TokenKind::Eof => bail!("unterminated macro argument list"),
                TokenKind::LParen => {
                    depth += 1;
                    arg.push('(');
                }
                TokenKind::RParen => {
                    if depth == 0 {
                        args.push(arg.trim().to_string());
                        return Ok(args);
                    }
                    depth -= 1;
                    arg.push(')');
                }
                TokenKind::Comma if depth == 0 => {
                    args.push(arg.trim().to_string());
                    arg = String::new();
                }
                _ => arg.push_str(&tok.text),
            }
        }
    }

    /// Phase-1 substitution: build the replacement text for one invocation.
    /// The caller pushes the result as a scratch layer, which is the rescan.
    pub(crate) fn substitute(
        &mut self,
        def: &MacroDef,
        name: &str,
        args: Option<&[String]>,
    ) -> Result<String> {
        let params: &[String] = def.params.as_deref().unwrap_or(&[]);
        let (named, extras): (Vec<String>, Vec<String>) = match args {
            Some(all) => {
                let mut all = all.to_vec();
                // `F()` on a zero-parameter macro parses as one empty argument
                if !def.variadic && params.is_empty() && all.len() == 1 && all[0].is_empty() {
                    all.clear();
                }
                let ok = if def.variadic {
                    all.len() >= params.len()
                } else {
                    all.len() == params.len()
                };
                if !ok {
                    let loc = match self.paths.get(def.file) {
                        Some(p) => format!("{}:{}", p, def.line),
                        None => "command line".to_string(),
                    };
                    bail!(
                        "macro '{}' (defined at {}) expects {}{} argument(s), got {}",
                        name,
                        loc,
                        if def.variadic { "at least " } else { "" },
                        params.len(),
                        all.len()
                    );
                }
                let extras = all.split_off(params.len());
                (all, extras)
            }
            None => (Vec::new(), Vec::new()),
        };
        self.substitute_body(&def.body, def, &named, &extras)
    }

    fn substitute_body(
        &mut self,
        body: &str,
        def: &MacroDef,
        named: &[String],
        extras: &[String],
    ) -> Result<String> {
        let params: &[String] = def.params.as_deref().unwrap_or(&[]);
        let mut scan = BodyScan::new(body);
        let mut out = String::new();
        loop {
            let (ws, tok) = scan.next();
            if tok.kind == TokenKind::Eof {
                break;
            }
            // `##` chains fold left to right over raw spellings; the body's
            // own spacing around the chain is what separates the result from
            // its neighbors
            if scan.peek().1.kind == TokenKind::DoubleSharp {
                let mut glued = raw_spelling(&tok, params, named, extras, def.variadic)?;
                while scan.peek().1.kind == TokenKind::DoubleSharp {
                    let _ = scan.next();
                    let (_, right) = scan.next();
                    if right.kind == TokenKind::Eof {
                        bail!("'##' cannot appear at the end of a macro body");
                    }
                    glued.push_str(&raw_spelling(&right, params, named, extras, def.variadic)?);
                }
                out.push_str(&ws);
                out.push_str(&glued);
                continue;
            }
            match tok.kind {
                TokenKind::Sharp => {
                    let (ws2, next) = scan.next();
                    if next.kind == TokenKind::Identifier {
                        let raw = if let Some(i) = param_index(params, &next.text) {
                            named[i].clone()
                        } else if next.text == "__VA_ARGS__" {
                            if !def.variadic {
                                bail!("'__VA_ARGS__' used outside a variadic macro");
                            }
                            extras.join(", ")
                        } else {
                            bail!("'#' is not followed by a macro parameter");
                        };
                        out.push_str(&ws);
                        out.push('"');
                        out.push_str(&stringify_escape(&raw));
                        out.push('"');
                    } else {
                        // a '#' that stringifies nothing is copied through
                        out.push_str(&ws);
                        out.push('#');
                        scan.push_back((ws2, next));
                    }
                }
                TokenKind::Identifier if param_index(params, &tok.text).is_some() => {
                    let i = param_index(params, &tok.text).unwrap();
                    let expanded = self.expand_text(&named[i])?;
                    out.push_str(&ws);
                    out.push_str(&expanded);
                }
                TokenKind::Identifier if tok.text == "__VA_ARGS__" => {
                    if !def.variadic {
                        bail!("'__VA_ARGS__' used outside a variadic macro");
                    }
                    let mut pieces = Vec::with_capacity(extras.len());
                    for e in extras {
                        pieces.push(self.expand_text(e)?);
                    }
                    out.push_str(&ws);
                    out.push_str(&pieces.join(", "));
                }
                TokenKind::Identifier if tok.text == "__VA_OPT__" => {
                    if !def.variadic {
                        bail!("'__VA_OPT__' used outside a variadic macro");
                    }
                    let (_, open) = scan.next();
                    if open.kind != TokenKind::LParen {
                        bail!("expected '(' after '__VA_OPT__'");
                    }
                    let inner = scan.balanced_text()?;
                    out.push_str(&ws);
                    if !extras.join(", ").trim().is_empty() {
                        let sub = self.substitute_body(&inner, def, named, extras)?;
                        out.push_str(&sub);
                    }
                }
                _ => {
                    out.push_str(&ws);
                    out.push_str(&tok.text);
                }
            }
        }
        Ok(out)
    }
}
