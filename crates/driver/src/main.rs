use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;

use pp::{Header, Includer, Preprocessor};

#[derive(Parser, Debug)]
#[command(
    name = "sprep",
    about = "Standalone C-family preprocessor for shader source",
    version
)]
struct Cli {
    /// Input source file
    input: PathBuf,
    /// Defines in the form NAME or NAME=VALUE
    #[arg(short = 'D', value_name = "NAME[=VALUE]")]
    define: Vec<String>,
    /// Undefine macro NAME
    #[arg(short = 'U', value_name = "NAME")]
    undef: Vec<String>,
    /// Add an include search directory (repeatable)
    #[arg(short = 'I', value_name = "DIR")]
    include: Vec<PathBuf>,
    /// Write the preprocessed text here instead of stdout
    #[arg(short = 'o', long = "output")]
    output: Option<PathBuf>,
}

/// Resolves includes against the filesystem: the including file's directory
/// first, then each -I directory in order. Paths are canonicalized so that
/// `#pragma once` recognizes one file reached through different spellings.
struct FileIncluder {
    search: Vec<PathBuf>,
}

impl FileIncluder {
    fn candidates(&self, name: &str, including_path: &str) -> Vec<PathBuf> {
        let mut v = Vec::with_capacity(self.search.len() + 1);
        if let Some(dir) = Path::new(including_path).parent() {
            v.push(dir.join(name));
        }
        for d in &self.search {
            v.push(d.join(name));
        }
        v
    }
}

impl Includer for FileIncluder {
    fn require_header(&mut self, name: &str, including_path: &str) -> Option<Header> {
        for c in self.candidates(name, including_path) {
            if let Ok(content) = fs::read_to_string(&c) {
                let path = fs::canonicalize(&c).unwrap_or(c);
                return Some(Header {
                    content,
                    path: path.to_string_lossy().into_owned(),
                });
            }
        }
        None
    }

    fn has_header(&mut self, name: &str, including_path: &str) -> bool {
        self.candidates(name, including_path)
            .iter()
            .any(|c| c.is_file())
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let text = fs::read_to_string(&cli.input)
        .with_context(|| format!("failed to read {}", cli.input.display()))?;

    let mut options: Vec<String> = Vec::new();
    for d in &cli.define {
        options.push(format!("-D{}", d));
    }
    for u in &cli.undef {
        options.push(format!("-U{}", u));
    }
    let opt_refs: Vec<&str> = options.iter().map(|s| s.as_str()).collect();

    let mut includer = FileIncluder {
        search: cli.include.clone(),
    };
    let mut pp = Preprocessor::new();
    let input_path = cli.input.to_string_lossy();
    let res = pp.do_preprocess(&input_path, &text, &mut includer, &opt_refs);

    match &cli.output {
        Some(p) => fs::write(p, &res.text)
            .with_context(|| format!("failed to write {}", p.display()))?,
        None => print!("{}", res.text),
    }
    eprint!("{}", res.warning);
    eprint!("{}", res.error);
    if !res.success() {
        std::process::exit(1);
    }
    Ok(())
}
