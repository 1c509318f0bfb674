mod cursor;
mod lexer;
pub mod token;

pub use cursor::Cursor;
pub use lexer::next_token;
pub use token::{SpaceMode, Token, TokenKind};

#[cfg(test)]
mod tests {
    use super::*;

    fn toks(src: &str) -> Vec<Token> {
        let mut cur = Cursor::new(src);
        let mut out = String::new();
        let mut v = Vec::new();
        loop {
            let t = next_token(&mut cur, &mut out, true, SpaceMode::NONE);
            if t.kind == TokenKind::Eof {
                break;
            }
            v.push(t);
        }
        v
    }

    #[test]
    fn lex_ident_number_punct() {
        let v = toks("int x = 42;");
        use TokenKind as K;
        assert_eq!(v[0].kind, K::Identifier);
        assert_eq!(v[0].text, "int");
        assert_eq!(v[1].kind, K::Identifier);
        assert_eq!(v[2].kind, K::Assign);
        assert_eq!(v[3].kind, K::Number);
        assert_eq!(v[3].text, "42");
        assert_eq!(v[4].kind, K::Semicolon);
    }

    #[test]
    fn lex_sharp_at_line_start() {
        let v = toks("#define A\nx # y");
        use TokenKind as K;
        assert_eq!(v[0].kind, K::Sharp);
        assert!(v[0].line_start);
        assert_eq!(v[1].text, "define");
        assert!(!v[1].line_start);
        let sharp = v.iter().rposition(|t| t.kind == K::Sharp).unwrap();
        assert!(!v[sharp].line_start);
    }
}
