use std::collections::HashSet;

use anyhow::Result;
use lex::{Cursor, SpaceMode, Token, TokenKind};

use crate::macros::MacroTable;
use crate::Includer;

pub(crate) const MAX_EXPANSION_DEPTH: u32 = 512;

/// One frame of the `#if` stack. Emission happens only while every frame is
/// `Active`; the bottom frame is a sentinel that is never popped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Cond {
    Active,
    InactiveNoTrueYet,
    InactiveAfterTrue,
}

pub(crate) enum InputKind {
    File,
    /// A macro-expansion scratch buffer. `hide` is the name being expanded
    /// (None for rescans that belong to no one macro, like `#if` lines);
    /// `depth` guards against runaway recursion.
    Scratch { hide: Option<String>, depth: u32 },
}

pub(crate) struct Input {
    pub cursor: Cursor,
    pub kind: InputKind,
}

impl Input {
    pub fn file(text: &str) -> Self {
        Input {
            cursor: Cursor::new(text),
            kind: InputKind::File,
        }
    }

    pub fn scratch(text: &str, hide: Option<String>, depth: u32) -> Self {
        let mut cursor = Cursor::new(text);
        // a '#' inside replacement text is never a directive
        cursor.set_line_start(false);
        Input {
            cursor,
            kind: InputKind::Scratch { hide, depth },
        }
    }
}

pub(crate) struct FileCtx {
    /// Index into the interned path table.
    pub path: usize,
    /// Position of this file's layer in the input stack.
    pub input_idx: usize,
}

/// What a fetch does with the whitespace it skips.
#[derive(Clone, Copy, PartialEq, Eq)]
pub(crate) enum Purpose {
    /// Emitting active text: spaces, newlines and splices all reach the output.
    Emit,
    /// Dropped text and directive scanning: newlines only, to keep line counts.
    Drop,
    /// Rescanning scratch text during expansion: spaces only (its newlines
    /// were already accounted for when the text was first read).
    Expand,
    /// Collecting macro arguments: capture everything into the caller's
    /// buffer, the caller flattens it into argument spacing.
    Collect,
}

pub(crate) struct Engine<'i> {
    pub includer: &'i mut dyn Includer,
    pub macros: MacroTable,
    pub paths: Vec<String>,
    pub pragma_once: HashSet<usize>,
    pub files: Vec<FileCtx>,
    pub inputs: Vec<Input>,
    pub cond: Vec<Cond>,
    pub out: String,
    pub err: String,
    pub warn: String,
}

impl<'i> Engine<'i> {
    pub fn new(includer: &'i mut dyn Includer) -> Self {
        Self {
            includer,
            macros: MacroTable::default(),
            paths: Vec::new(),
            pragma_once: HashSet::new(),
            files: Vec::new(),
            inputs: Vec::new(),
            cond: vec![Cond::Active],
            out: String::new(),
            err: String::new(),
            warn: String::new(),
        }
    }

    pub fn push_main(&mut self, path: &str, text: &str) {
        self.out.reserve(text.len());
        let id = self.intern(path);
        self.files.push(FileCtx {
            path: id,
            input_idx: self.inputs.len(),
        });
        self.inputs.push(Input::file(text));
    }

    pub fn intern(&mut self, path: &str) -> usize {
        match self.paths.iter().position(|p| p == path) {
            Some(i) => i,
            None => {
                self.paths.push(path.to_string());
                self.paths.len() - 1
            }
        }
    }

    pub fn current_path(&self) -> &str {
        match self.files.last() {
            Some(f) => &self.paths[f.path],
            None => "",
        }
    }

    pub fn current_line(&self) -> u32 {
        match self.files.last() {
            Some(f) => self.inputs[f.input_idx].cursor.line(),
            None => 0,
        }
    }

    pub fn all_active(&self) -> bool {
        self.cond.iter().all(|c| *c == Cond::Active)
    }

    pub fn warning(&mut self, msg: &str) {
        let line = self.current_line();
        let path = self.current_path().to_string();
        self.warn
            .push_str(&format!("warning: {}:{}: {}\n", path, line, msg));
    }

    /// True while `name` is anywhere on the stack of macros being expanded.
    pub fn hidden(&self, name: &str) -> bool {
        self.inputs.iter().any(
            |i| matches!(&i.kind, InputKind::Scratch { hide: Some(h), .. } if h == name),
        )
    }

    pub fn depth(&self) -> u32 {
        match self.inputs.last().map(|i| &i.kind) {
            Some(InputKind::Scratch { depth, .. }) => *depth,
            _ => 0,
        }
    }

    fn mask_for(&self, purpose: Purpose) -> SpaceMode {
        let file = matches!(self.inputs.last().map(|i| &i.kind), Some(InputKind::File));
        match (purpose, file) {
            (Purpose::Emit, true) => SpaceMode::ALL,
            (Purpose::Emit, false) => SpaceMode::SPACES,
            (Purpose::Drop, true) => SpaceMode::NEWLINES,
            (Purpose::Drop, false) => SpaceMode::NONE,
            (Purpose::Collect, true) => SpaceMode::ALL,
            (Purpose::Collect, false) => SpaceMode {
                spaces: true,
                newlines: false,
                splices: true,
            },
            (Purpose::Expand, _) => SpaceMode::SPACES,
        }
    }

    /// Fetch the next token from the top of the input stack. Exhausted
    /// scratch layers above `floor` are popped transparently, so replacement
    /// text flows seamlessly back into whatever pushed it; an exhausted layer
    /// at `floor` is reported as `Eof` and left for the caller.
    ///
    /// Skipped whitespace goes to `ext` when given, to the engine output
    /// otherwise, filtered per `purpose`.
    pub fn next_token(
        &mut self,
        floor: usize,
        cross: bool,
        purpose: Purpose,
        mut ext: Option<&mut String>,
    ) -> Token {
        loop {
            let mask = self.mask_for(purpose);
            let top = self.inputs.last_mut().expect("input stack underflow");
            let dest: &mut String = match &mut ext {
                Some(b) => &mut **b,
                None => &mut self.out,
            };
            let tok = lex::next_token(&mut top.cursor, dest, cross, mask);
            if tok.kind == TokenKind::Eof && cross && self.inputs.len() > floor {
                self.inputs.pop();
                continue;
            }
            return tok;
        }
    }

    /// Append to `ext` when given, to the engine output otherwise.
    pub fn put(&mut self, ext: &mut Option<&mut String>, s: &str) {
        match ext {
            Some(b) => b.push_str(s),
            None => self.out.push_str(s),
        }
    }

    /// Emit or expand one identifier. `__FILE__` and `__LINE__` resolve to
    /// the current file context; a macro name pushes its substituted body as
    /// a scratch layer so the main fetch loop rescans it.
    pub fn emit_identifier(
        &mut self,
        tok: &Token,
        mut ext: Option<&mut String>,
        floor: usize,
        purpose: Purpose,
    ) -> Result<()> {
        let name = tok.text.as_str();
        if name == "__FILE__" {
            let path = format!("\"{}\"", self.current_path());
            self.put(&mut ext, &path);
            return Ok(());
        }
        if name == "__LINE__" {
            let line = self.current_line().to_string();
            self.put(&mut ext, &line);
            return Ok(());
        }
        let usable = match self.macros.get(name) {
            Some(d) if !self.hidden(name) && self.depth() < MAX_EXPANSION_DEPTH => Some(d.clone()),
            _ => None,
        };
        let def = match usable {
            Some(d) => d,
            None => {
                self.put(&mut ext, name);
                return Ok(());
            }
        };
        let args = if def.is_function_like() {
            let next = self.next_token(floor, true, purpose, ext.as_deref_mut());
            if next.kind != TokenKind::LParen {
                // not an invocation: the name and what follows go out verbatim
                self.put(&mut ext, name);
                self.put(&mut ext, &next.text);
                return Ok(());
            }
            Some(self.collect_args(floor)?)
        } else {
            None
        };
        let depth = self.depth() + 1;
        let body = self.substitute(&def, name, args.as_deref())?;
        self.inputs
            .push(Input::scratch(&body, Some(name.to_string()), depth));
        Ok(())
    }

    /// Run `text` through tokenize-and-expand and return the result. Used
    /// for macro arguments, `#if` lines and computed includes; the scratch
    /// layer it pushes is its own fetch floor, so expansion never leaks into
    /// the surrounding input.
    pub fn expand_text(&mut self, text: &str) -> Result<String> {
        let floor = self.inputs.len() + 1;
        self.inputs.push(Input::scratch(text, None, self.depth()));
        let mut res = String::new();
        loop {
            let tok = self.next_token(floor, true, Purpose::Expand, Some(&mut res));
            match tok.kind {
                TokenKind::Eof => break,
                TokenKind::Identifier => {
                    self.emit_identifier(&tok, Some(&mut res), floor, Purpose::Expand)?
                }
                _ => res.push_str(&tok.text),
            }
        }
        self.inputs.pop();
        Ok(res)
    }

    /// Silently consume the newline terminating the current directive line.
    /// Used when a marker line stands in for the directive's own newline.
    pub fn consume_newline(&mut self) {
        if let Some(top) = self.inputs.last_mut() {
            if top.cursor.peek() == Some(b'\r') && top.cursor.peek_at(1) == Some(b'\n') {
                top.cursor.skip(1);
            }
            if top.cursor.peek() == Some(b'\n') {
                top.cursor.skip(1);
                top.cursor.bump_line();
                top.cursor.set_line_start(true);
            }
        }
    }

    pub fn parse_options(&mut self, options: &[&str]) {
        let mut undefs: Vec<String> = Vec::new();
        let mut i = 0;
        while i < options.len() {
            let opt = options[i].trim();
            i += 1;
            let Some(rest) = opt.strip_prefix('-') else {
                continue;
            };
            if let Some(mut def) = rest.strip_prefix('D') {
                if def.is_empty() {
                    if i == options.len() {
                        continue;
                    }
                    def = options[i].trim();
                    i += 1;
                }
                let (name, value) = match def.split_once('=') {
                    Some((n, v)) => (n, v),
                    None => (def, ""),
                };
                if !name.is_empty() {
                    self.macros.define_object(name, value);
                }
            } else if let Some(mut name) = rest.strip_prefix('U') {
                if name.is_empty() {
                    if i == options.len() {
                        continue;
                    }
                    name = options[i].trim();
                    i += 1;
                }
                undefs.push(name.to_string());
            }
            // unrecognized options are ignored
        }
        for name in undefs {
            self.macros.remove(&name);
        }
    }

    /// The top-level scan loop: tokens stream from the input stack into the
    /// output, directives and macro expansion rerouting them along the way.
    pub fn run(&mut self) -> Result<()> {
        loop {
            let floor = match self.files.last() {
                Some(f) => f.input_idx + 1,
                None => break,
            };
            let active = self.all_active();
            let purpose = if active { Purpose::Emit } else { Purpose::Drop };
            let tok = self.next_token(floor, true, purpose, None);
            match tok.kind {
                TokenKind::Eof => {
                    self.inputs.pop();
                    self.files.pop();
                    if self.files.is_empty() {
                        break;
                    }
                    // back in the including file: restore the line mapping
                    let line = self.current_line();
                    let path = self.current_path().to_string();
                    self.out.push('\n');
                    self.out.push_str(&format!("#line {} \"{}\"\n", line, path));
                }
                TokenKind::Sharp if tok.line_start => self.handle_directive(floor)?,
                TokenKind::Identifier if active => {
                    self.emit_identifier(&tok, None, floor, Purpose::Emit)?
                }
                TokenKind::Unknown => {
                    if active {
                        let line = self.current_line();
                        let path = self.current_path().to_string();
                        self.err.push_str(&format!(
                            "error: {}:{}: unknown token '{}'\n",
                            path, line, tok.text
                        ));
                    }
                }
                _ if active => self.out.push_str(&tok.text),
                _ => {}
            }
        }
        if self.cond.len() > 1 {
            self.err
                .push_str("error: unterminated conditional directive\n");
        }
        Ok(())
    }
}
