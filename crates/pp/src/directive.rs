use anyhow::{anyhow, bail, Result};
use lex::TokenKind;

use crate::engine::{Cond, Engine, FileCtx, Input, Purpose};

impl Engine<'_> {
    /// Dispatch one directive. The leading `#` has been consumed; on return
    /// the cursor sits at the directive line's terminating newline (or
    /// consumed it, when a marker line stands in for it).
    pub(crate) fn handle_directive(&mut self, floor: usize) -> Result<()> {
        let name = self.next_token(floor, false, Purpose::Drop, None);
        if name.kind == TokenKind::Eof {
            // an empty '#' line is a no-op
            return Ok(());
        }
        if name.kind != TokenKind::Identifier {
            if self.all_active() {
                self.warning(&format!("malformed directive '#{}'", name.text));
            }
            return self.skip_line(floor);
        }
        let active = self.all_active();
        match name.text.as_str() {
            "define" => {
                if active {
                    self.parse_define(floor)?;
                }
                self.skip_line(floor)
            }
            "undef" => {
                if active {
                    let tok = self.next_token(floor, false, Purpose::Drop, None);
                    if tok.kind != TokenKind::Identifier {
                        bail!("expected identifier after #undef");
                    }
                    self.macros.remove(&tok.text);
                }
                self.skip_line(floor)
            }
            "ifdef" | "ifndef" => {
                let want = name.text == "ifdef";
                let state = if !active {
                    // the whole region is dead, no branch can be taken
                    Cond::InactiveAfterTrue
                } else {
                    let tok = self.next_token(floor, false, Purpose::Drop, None);
                    if tok.kind != TokenKind::Identifier {
                        bail!("expected identifier after #{}", name.text);
                    }
                    if self.macros.contains(&tok.text) == want {
                        Cond::Active
                    } else {
                        Cond::InactiveNoTrueYet
                    }
                };
                self.cond.push(state);
                self.skip_line(floor)
            }
            "if" => {
                let state = if !active {
                    Cond::InactiveAfterTrue
                } else {
                    let tail = self.directive_tail(floor)?;
                    if self.eval_condition(&tail)? {
                        Cond::Active
                    } else {
                        Cond::InactiveNoTrueYet
                    }
                };
                self.cond.push(state);
                self.skip_line(floor)
            }
            "elif" | "elifdef" | "elifndef" => self.handle_elif(name.text.as_str(), floor),
            "else" => {
                if self.cond.len() == 1 {
                    bail!("#else without #if");
                }
                let top = self.cond.last_mut().unwrap();
                *top = match *top {
                    Cond::Active => Cond::InactiveAfterTrue,
                    Cond::InactiveNoTrueYet => Cond::Active,
                    Cond::InactiveAfterTrue => Cond::InactiveAfterTrue,
                };
                self.skip_line(floor)
            }
            "endif" => {
                if self.cond.len() == 1 {
                    bail!("#endif without #if");
                }
                self.cond.pop();
                self.skip_line(floor)
            }
            "include" => {
                if active {
                    self.parse_include(floor)
                } else {
                    self.skip_line(floor)
                }
            }
            "pragma" => {
                if active {
                    let tok = self.next_token(floor, false, Purpose::Drop, None);
                    if tok.kind == TokenKind::Identifier && tok.text == "once" {
                        if let Some(f) = self.files.last() {
                            let id = f.path;
                            self.pragma_once.insert(id);
                        }
                    } else {
                        self.warning(&format!("unknown pragma '{}'", tok.text));
                    }
                }
                self.skip_line(floor)
            }
            "error" | "warning" => {
                let is_err = name.text == "error";
                if active {
                    let text = self.directive_tail(floor)?;
                    if is_err {
                        self.err.push_str(&format!("error: {}\n", text));
                    } else {
                        self.warn.push_str(&format!("warning: {}\n", text));
                    }
                }
                self.skip_line(floor)
            }
            "line" => {
                if active {
                    self.parse_line_directive(floor)
                } else {
                    self.skip_line(floor)
                }
            }
            _ => {
                if active {
                    self.warning(&format!("unknown directive '#{}'", name.text));
                }
                self.skip_line(floor)
            }
        }
    }

    fn handle_elif(&mut self, which: &str, floor: usize) -> Result<()> {
        if self.cond.len() == 1 {
            bail!("#{} without #if", which);
        }
        let enclosing_active = self.cond[..self.cond.len() - 1]
            .iter()
            .all(|c| *c == Cond::Active);
        let top = *self.cond.last().unwrap();
        let new = match top {
            Cond::Active => Cond::InactiveAfterTrue,
            Cond::InactiveAfterTrue => Cond::InactiveAfterTrue,
            Cond::InactiveNoTrueYet if !enclosing_active => Cond::InactiveNoTrueYet,
            Cond::InactiveNoTrueYet => {
                let taken = match which {
                    "elif" => {
                        let tail = self.directive_tail(floor)?;
                        self.eval_condition(&tail)?
                    }
                    _ => {
                        let tok = self.next_token(floor, false, Purpose::Drop, None);
                        if tok.kind != TokenKind::Identifier {
                            bail!("expected identifier after #{}", which);
                        }
                        self.macros.contains(&tok.text) == (which == "elifdef")
                    }
                };
                if taken {
                    Cond::Active
                } else {
                    Cond::InactiveNoTrueYet
                }
            }
        };
        *self.cond.last_mut().unwrap() = new;
        self.skip_line(floor)
    }

    /// Consume tokens to the end of the directive line. Newlines hidden in
    /// splices or comments still reach the output via the fetch mask.
    pub(crate) fn skip_line(&mut self, floor: usize) -> Result<()> {
        loop {
            let tok = self.next_token(floor, false, Purpose::Drop, None);
            if tok.kind == TokenKind::Eof {
                return Ok(());
            }
        }
    }

    /// Rebuild the rest of the directive line as text, spacing preserved.
    /// Newlines swallowed by splices are forwarded to the output so line
    /// counts survive multi-line directives.
    pub(crate) fn directive_tail(&mut self, floor: usize) -> Result<String> {
        let mut text = String::new();
        loop {
            let mut ws = String::new();
            let tok = self.next_token(floor, false, Purpose::Collect, Some(&mut ws));
            for _ in ws.matches('\n') {
                self.out.push('\n');
            }
            let ws = ws.replace("\\\n", " ").replace('\n', " ");
            if tok.kind == TokenKind::Eof {
                break;
            }
            text.push_str(&ws);
            text.push_str(&tok.text);
        }
        Ok(text.trim().to_string())
    }

    fn parse_include(&mut self, floor: usize) -> Result<()> {
        let tail = self.directive_tail(floor)?;
        let expanded = self.expand_text(&tail)?;
        let target = expanded.trim();
        let name = if let Some(rest) = target.strip_prefix('"') {
            match rest.find('"') {
                Some(i) => &rest[..i],
                None => bail!("malformed #include"),
            }
        } else if let Some(rest) = target.strip_prefix('<') {
            match rest.find('>') {
                Some(i) => &rest[..i],
                None => bail!("malformed #include"),
            }
        } else {
            bail!("malformed #include")
        };
        let including = self.current_path().to_string();
        match self.includer.require_header(name, &including) {
            Some(hdr) => {
                let id = self.intern(&hdr.path);
                if self.pragma_once.contains(&id) {
                    // skipped: the line's newline still reaches the output
                    return Ok(());
                }
                if self.files.iter().any(|f| f.path == id) {
                    bail!("include cycle detected involving {}", hdr.path);
                }
                // the marker line stands in for the include line itself
                self.consume_newline();
                self.out.push_str(&format!("#line 1 \"{}\"\n", hdr.path));
                self.files.push(FileCtx {
                    path: id,
                    input_idx: self.inputs.len(),
                });
                self.inputs.push(Input::file(&hdr.content));
                Ok(())
            }
            None => {
                self.warning(&format!("cannot find header \"{}\"", name));
                Ok(())
            }
        }
    }

    fn parse_line_directive(&mut self, floor: usize) -> Result<()> {
        let tok = self.next_token(floor, false, Purpose::Drop, None);
        if tok.kind != TokenKind::Number {
            bail!("expected line number after #line");
        }
        let n: u32 = tok
            .text
            .parse()
            .map_err(|_| anyhow!("malformed line number '{}'", tok.text))?;
        let path_tok = self.next_token(floor, false, Purpose::Drop, None);
        let path = match path_tok.kind {
            TokenKind::Str => Some(path_tok.text.trim_matches('"').to_string()),
            TokenKind::Eof => None,
            _ => bail!("malformed #line directive"),
        };
        self.skip_line(floor)?;
        let display = match &path {
            Some(p) => p.clone(),
            None => self.current_path().to_string(),
        };
        if let Some(p) = &path {
            let id = self.intern(p);
            if let Some(f) = self.files.last_mut() {
                f.path = id;
            }
        }
        // re-emit the override so downstream mapping matches; the main loop
        // supplies the trailing newline, which bumps the cursor onto line n
        self.out.push_str(&format!("#line {} \"{}\"", n, display));
        if let Some(f) = self.files.last() {
            let idx = f.input_idx;
            self.inputs[idx].cursor.set_line(n.saturating_sub(1));
        }
        Ok(())
    }
}
