use super::error::FormulaError;

/// サンドボックスを脱出しうる識別子（大文字小文字を区別しない）
pub const DENYLIST: &[&str] = &[
    "eval",
    "function",
    "settimeout",
    "setinterval",
    "document",
    "window",
    "global",
    "globalthis",
    "process",
    "require",
    "import",
];

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Number(f64),
    Ident(String),
    Let,
    Return,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    LParen,
    RParen,
    LBracket,
    RBracket,
    Comma,
    Dot,
    Semicolon,
    Assign,
    Question,
    Colon,
    Lt,
    Le,
    Gt,
    Ge,
    EqEq,
    NotEq,
    AndAnd,
    OrOr,
    Bang,
    Eof,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    /// ソース中のバイト位置
    pub offset: usize,
}

/// ソースをトークン列に分解します
///
/// 禁止識別子はこの段階で検出し、`FormulaError::Forbidden` を返します。
pub fn tokenize(source: &str) -> Result<Vec<Token>, FormulaError> {
    let bytes = source.as_bytes();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        let c = bytes[i];
        let start = i;

        if c.is_ascii_whitespace() {
            i += 1;
            continue;
        }

        // 行コメント
        if c == b'/' && bytes.get(i + 1) == Some(&b'/') {
            while i < bytes.len() && bytes[i] != b'\n' {
                i += 1;
            }
            continue;
        }

        if c.is_ascii_digit() || (c == b'.' && bytes.get(i + 1).is_some_and(u8::is_ascii_digit)) {
            i = scan_number(bytes, i);
            let text = &source[start..i];
            let value = text.parse::<f64>().map_err(|_| FormulaError::Syntax {
                offset: start,
                message: format!("数値リテラル '{}' を解釈できません", text),
            })?;
            tokens.push(Token { kind: TokenKind::Number(value), offset: start });
            continue;
        }

        if c.is_ascii_alphabetic() || c == b'_' || c == b'$' {
            while i < bytes.len()
                && (bytes[i].is_ascii_alphanumeric() || bytes[i] == b'_' || bytes[i] == b'$')
            {
                i += 1;
            }
            let word = &source[start..i];
            let lower = word.to_ascii_lowercase();
            if DENYLIST.contains(&lower.as_str()) {
                return Err(FormulaError::Forbidden { name: word.to_string(), offset: start });
            }
            let kind = match word {
                "let" | "const" | "var" => TokenKind::Let,
                "return" => TokenKind::Return,
                _ => TokenKind::Ident(word.to_string()),
            };
            tokens.push(Token { kind, offset: start });
            continue;
        }

        let next = bytes.get(i + 1).copied();
        let (kind, len) = match (c, next) {
            (b'<', Some(b'=')) => (TokenKind::Le, 2),
            (b'>', Some(b'=')) => (TokenKind::Ge, 2),
            (b'=', Some(b'=')) => (TokenKind::EqEq, if bytes.get(i + 2) == Some(&b'=') { 3 } else { 2 }),
            (b'!', Some(b'=')) => (TokenKind::NotEq, if bytes.get(i + 2) == Some(&b'=') { 3 } else { 2 }),
            (b'&', Some(b'&')) => (TokenKind::AndAnd, 2),
            (b'|', Some(b'|')) => (TokenKind::OrOr, 2),
            (b'+', _) => (TokenKind::Plus, 1),
            (b'-', _) => (TokenKind::Minus, 1),
            (b'*', _) => (TokenKind::Star, 1),
            (b'/', _) => (TokenKind::Slash, 1),
            (b'%', _) => (TokenKind::Percent, 1),
            (b'(', _) => (TokenKind::LParen, 1),
            (b')', _) => (TokenKind::RParen, 1),
            (b'[', _) => (TokenKind::LBracket, 1),
            (b']', _) => (TokenKind::RBracket, 1),
            (b',', _) => (TokenKind::Comma, 1),
            (b'.', _) => (TokenKind::Dot, 1),
            (b';', _) => (TokenKind::Semicolon, 1),
            (b'=', _) => (TokenKind::Assign, 1),
            (b'?', _) => (TokenKind::Question, 1),
            (b':', _) => (TokenKind::Colon, 1),
            (b'<', _) => (TokenKind::Lt, 1),
            (b'>', _) => (TokenKind::Gt, 1),
            (b'!', _) => (TokenKind::Bang, 1),
            _ => {
                let ch = source[start..].chars().next().unwrap_or('?');
                return Err(FormulaError::Syntax {
                    offset: start,
                    message: format!("使用できない文字 '{}'", ch),
                });
            }
        };
        tokens.push(Token { kind, offset: start });
        i += len;
    }

    tokens.push(Token { kind: TokenKind::Eof, offset: source.len() });
    Ok(tokens)
}

fn scan_number(bytes: &[u8], mut i: usize) -> usize {
    while i < bytes.len() && bytes[i].is_ascii_digit() {
        i += 1;
    }
    if i < bytes.len() && bytes[i] == b'.' {
        i += 1;
        while i < bytes.len() && bytes[i].is_ascii_digit() {
            i += 1;
        }
    }
    if i < bytes.len() && (bytes[i] == b'e' || bytes[i] == b'E') {
        let mut j = i + 1;
        if j < bytes.len() && (bytes[j] == b'+' || bytes[j] == b'-') {
            j += 1;
        }
        if j < bytes.len() && bytes[j].is_ascii_digit() {
            i = j;
            while i < bytes.len() && bytes[i].is_ascii_digit() {
                i += 1;
            }
        }
    }
    i
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        tokenize(source).unwrap().into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn test_numbers_and_operators() {
        assert_eq!(
            kinds("1.5e3 * .25 <= x"),
            vec![
                TokenKind::Number(1500.0),
                TokenKind::Star,
                TokenKind::Number(0.25),
                TokenKind::Le,
                TokenKind::Ident("x".to_string()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_member_access_is_not_a_number() {
        assert_eq!(
            kinds("missile.speed"),
            vec![
                TokenKind::Ident("missile".to_string()),
                TokenKind::Dot,
                TokenKind::Ident("speed".to_string()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_comments_and_keywords() {
        assert_eq!(
            kinds("// gain\nconst k = 2; return k;"),
            vec![
                TokenKind::Let,
                TokenKind::Ident("k".to_string()),
                TokenKind::Assign,
                TokenKind::Number(2.0),
                TokenKind::Semicolon,
                TokenKind::Return,
                TokenKind::Ident("k".to_string()),
                TokenKind::Semicolon,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_denylisted_identifiers() {
        for source in ["eval('1')", "new Function('x')", "Window.alert", "setTimeout(f, 1)", "PROCESS.exit()"] {
            assert!(
                matches!(tokenize(source), Err(FormulaError::Forbidden { .. })),
                "{} should be rejected",
                source
            );
        }
        // 部分一致は禁止しない
        assert!(tokenize("evaluation + 1").is_ok());
    }

    #[test]
    fn test_unexpected_character() {
        assert!(matches!(tokenize("a # b"), Err(FormulaError::Syntax { offset: 2, .. })));
        assert!(matches!(tokenize("x => { 1 }"), Err(FormulaError::Syntax { .. })));
    }
}
