//! C-family preprocessor for shader source.
//!
//! Feed it a named source text plus a callback resolving `#include` names and
//! it returns the flattened, macro-expanded text along with `error` and
//! `warning` diagnostic streams. Line counts of the input are preserved in
//! the output so downstream compiler diagnostics keep pointing at the right
//! lines; entering and leaving an include is bridged with `#line` markers.

mod directive;
mod engine;
mod eval;
mod macros;

use engine::{Cond, Engine};

/// One resolved header: its text and the path the resolution chose. The path
/// identifies the file for `#pragma once` and appears in `#line` markers, so
/// it should be stable across repeated requests for the same header.
pub struct Header {
    pub content: String,
    pub path: String,
}

/// Resolves `#include` references on behalf of the engine.
pub trait Includer {
    /// Resolve `name` as requested from `including_path`. `None` makes the
    /// engine emit a warning and carry on.
    fn require_header(&mut self, name: &str, including_path: &str) -> Option<Header>;

    /// Probe for `__has_include` without entering the file. The default
    /// resolves and discards; implementors with expensive resolution should
    /// override it.
    fn has_header(&mut self, name: &str, including_path: &str) -> bool {
        self.require_header(name, including_path).is_some()
    }

    /// Called once at the end of every `do_preprocess`, after the engine has
    /// stopped referencing header contents.
    fn clear(&mut self) {}
}

/// An includer that resolves nothing.
pub struct EmptyIncluder;

impl Includer for EmptyIncluder {
    fn require_header(&mut self, _name: &str, _including_path: &str) -> Option<Header> {
        None
    }

    fn has_header(&mut self, _name: &str, _including_path: &str) -> bool {
        false
    }
}

pub struct PreprocessResult {
    pub text: String,
    /// `error: ` lines, one per diagnostic, each newline-terminated.
    pub error: String,
    /// `warning: ` lines, same shape.
    pub warning: String,
}

impl PreprocessResult {
    pub fn success(&self) -> bool {
        self.error.is_empty()
    }
}

pub struct Preprocessor {
    _private: (),
}

impl Preprocessor {
    pub fn new() -> Self {
        Self { _private: () }
    }

    /// Run one full preprocessing pass. Options are a flat sequence of
    /// strings; `-D NAME[=value]` / `-DNAME[=value]` and `-U NAME` / `-UNAME`
    /// are recognized, anything else is ignored. All `-U` apply after all
    /// `-D` regardless of order.
    ///
    /// A fatal parse error stops the pass: the text accumulated so far is
    /// returned and the failure becomes the last `error:` line.
    pub fn do_preprocess(
        &mut self,
        input_path: &str,
        input_text: &str,
        includer: &mut dyn Includer,
        options: &[&str],
    ) -> PreprocessResult {
        let mut eng = Engine::new(includer);
        eng.push_main(input_path, input_text);
        eng.parse_options(options);
        if let Err(e) = eng.run() {
            let msg = if eng.files.is_empty() {
                format!("error: {}\n", e)
            } else {
                format!("error: {}:{}: {}\n", eng.current_path(), eng.current_line(), e)
            };
            eng.err.push_str(&msg);
            eng.inputs.clear();
            eng.files.clear();
            eng.cond.clear();
            eng.cond.push(Cond::Active);
        }
        eng.includer.clear();
        PreprocessResult {
            text: std::mem::take(&mut eng.out),
            error: std::mem::take(&mut eng.err),
            warning: std::mem::take(&mut eng.warn),
        }
    }
}

impl Default for Preprocessor {
    fn default() -> Self {
        Self::new()
    }
}
