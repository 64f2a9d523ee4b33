//! Splits a statement line into whitespace- and punctuation-delimited
//! tokens. No keyword lookahead happens here -- the parser decides what a
//! word means from its position in the grammar.

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref IDENT_RE: Regex = Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").unwrap();
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    Word(String),
    StringLiteral(String),
    Number(String),
    Punct(char),
}

pub fn is_valid_identifier(s: &str) -> bool {
    IDENT_RE.is_match(s)
}

/// Tokenizes a single SQL statement (meta-commands starting with `.` are
/// handled separately by the caller and never reach this function).
pub fn tokenize(input: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let chars: Vec<char> = input.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() {
            i += 1;
            continue;
        }
        if c == '\'' || c == '"' {
            let quote = c;
            let mut j = i + 1;
            let mut s = String::new();
            while j < chars.len() && chars[j] != quote {
                s.push(chars[j]);
                j += 1;
            }
            tokens.push(Token::StringLiteral(s));
            i = j + 1;
            continue;
        }
        if c == '(' || c == ')' || c == ',' || c == '*' || c == ';' || c == '=' {
            tokens.push(Token::Punct(c));
            i += 1;
            continue;
        }
        if c.is_ascii_digit() || (c == '-' && i + 1 < chars.len() && chars[i + 1].is_ascii_digit()) {
            let mut j = i + 1;
            while j < chars.len() && (chars[j].is_ascii_digit() || chars[j] == '.') {
                j += 1;
            }
            tokens.push(Token::Number(chars[i..j].iter().collect()));
            i = j;
            continue;
        }
        if c.is_alphanumeric() || c == '_' || c == '.' {
            let mut j = i + 1;
            while j < chars.len() && (chars[j].is_alphanumeric() || chars[j] == '_' || chars[j] == '.') {
                j += 1;
            }
            tokens.push(Token::Word(chars[i..j].iter().collect()));
            i = j;
            continue;
        }
        // Unrecognized punctuation is passed through so the parser can
        // report a precise syntax error instead of silently dropping it.
        tokens.push(Token::Punct(c));
        i += 1;
    }
    tokens
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokenizes_insert() {
        let tokens = tokenize("insert 7 'alice' 'alice@example.com'");
        assert_eq!(
            tokens,
            vec![
                Token::Word("insert".to_string()),
                Token::Number("7".to_string()),
                Token::StringLiteral("alice".to_string()),
                Token::StringLiteral("alice@example.com".to_string()),
            ]
        );
    }

    #[test]
    fn tokenizes_select_with_punctuation() {
        let tokens = tokenize("select count(*) from users where id = 3;");
        assert!(tokens.contains(&Token::Punct('(')));
        assert!(tokens.contains(&Token::Punct('*')));
        assert!(tokens.contains(&Token::Punct('=')));
    }

    #[test]
    fn identifier_validation() {
        assert!(is_valid_identifier("username"));
        assert!(!is_valid_identifier("3bad"));
    }
}
