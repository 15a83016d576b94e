use super::{CompareOp, Expr, PathRoot, PathSegment};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Number(f64),
    Str(String),
    Dot,
    LBracket,
    RBracket,
    LParen,
    RParen,
    And,
    Or,
    Not,
    Compare(CompareOp),
}

fn tokenize(input: &str) -> Result<Vec<Token>, String> {
    let chars: Vec<char> = input.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            c if c.is_whitespace() => i += 1,
            '.' => {
                tokens.push(Token::Dot);
                i += 1;
            }
            '[' => {
                tokens.push(Token::LBracket);
                i += 1;
            }
            ']' => {
                tokens.push(Token::RBracket);
                i += 1;
            }
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            '&' | '|' => {
                if chars.get(i + 1) != Some(&c) {
                    return Err(format!("expected '{}{}' at position {}", c, c, i));
                }
                tokens.push(if c == '&' { Token::And } else { Token::Or });
                i += 2;
            }
            '=' | '!' | '<' | '>' => {
                let next_is_eq = chars.get(i + 1) == Some(&'=');
                let (token, width) = match (c, next_is_eq) {
                    ('=', true) => (Token::Compare(CompareOp::Eq), 2),
                    ('!', true) => (Token::Compare(CompareOp::Ne), 2),
                    ('<', true) => (Token::Compare(CompareOp::Le), 2),
                    ('>', true) => (Token::Compare(CompareOp::Ge), 2),
                    ('<', false) => (Token::Compare(CompareOp::Lt), 1),
                    ('>', false) => (Token::Compare(CompareOp::Gt), 1),
                    ('!', false) => (Token::Not, 1),
                    _ => return Err(format!("unexpected '=' at position {}", i)),
                };
                i += width;
                // `===` and `!==` read the same as `==` and `!=`
                if width == 2 && matches!(c, '=' | '!') && chars.get(i) == Some(&'=') {
                    i += 1;
                }
                tokens.push(token);
            }
            '\'' | '"' => {
                let quote = c;
                let mut text = String::new();
                i += 1;
                loop {
                    match chars.get(i) {
                        None => return Err("unterminated string literal".to_string()),
                        Some('\\') => {
                            if let Some(escaped) = chars.get(i + 1) {
                                text.push(*escaped);
                            }
                            i += 2;
                        }
                        Some(ch) if *ch == quote => {
                            i += 1;
                            break;
                        }
                        Some(ch) => {
                            text.push(*ch);
                            i += 1;
                        }
                    }
                }
                tokens.push(Token::Str(text));
            }
            c if c.is_ascii_digit() || (c == '-' && starts_number(&chars, i, &tokens)) => {
                let start = i;
                i += 1;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                let literal: String = chars[start..i].iter().collect();
                let number = literal
                    .parse::<f64>()
                    .map_err(|_| format!("invalid number '{}'", literal))?;
                tokens.push(Token::Number(number));
            }
            c if c.is_alphabetic() || c == '_' || c == '$' => {
                let start = i;
                while i < chars.len()
                    && (chars[i].is_alphanumeric() || chars[i] == '_' || chars[i] == '$')
                {
                    i += 1;
                }
                tokens.push(Token::Ident(chars[start..i].iter().collect()));
            }
            other => return Err(format!("unexpected character '{}' at position {}", other, i)),
        }
    }

    Ok(tokens)
}

// A leading '-' is a sign only where an operand is expected
fn starts_number(chars: &[char], i: usize, tokens: &[Token]) -> bool {
    let digit_follows = chars.get(i + 1).map(|c| c.is_ascii_digit()).unwrap_or(false);
    let operand_expected = matches!(
        tokens.last(),
        None | Some(Token::LParen)
            | Some(Token::And)
            | Some(Token::Or)
            | Some(Token::Not)
            | Some(Token::Compare(_))
            | Some(Token::LBracket)
    );
    digit_follows && operand_expected
}

/// Deepest nesting of `!` and parentheses accepted
pub const MAX_NESTING: usize = 64;

/// Longest expression accepted, in tokens; bounds the depth of `&&`/`||` chains
pub const MAX_TOKENS: usize = 1024;

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
}

impl Parser {
    fn enter(&mut self) -> Result<(), String> {
        if self.depth >= MAX_NESTING {
            return Err(format!(
                "expression nested too deeply (more than {} levels)",
                MAX_NESTING
            ));
        }
        self.depth += 1;
        Ok(())
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn expect(&mut self, expected: Token) -> Result<(), String> {
        match self.next() {
            Some(ref token) if *token == expected => Ok(()),
            Some(token) => Err(format!("expected {:?}, found {:?}", expected, token)),
            None => Err(format!("expected {:?}, found end of expression", expected)),
        }
    }

    fn parse_or(&mut self) -> Result<Expr, String> {
        let mut left = self.parse_and()?;
        while self.peek() == Some(&Token::Or) {
            self.pos += 1;
            let right = self.parse_and()?;
            left = Expr::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expr, String> {
        let mut left = self.parse_not()?;
        while self.peek() == Some(&Token::And) {
            self.pos += 1;
            let right = self.parse_not()?;
            left = Expr::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_not(&mut self) -> Result<Expr, String> {
        if self.peek() == Some(&Token::Not) {
            self.pos += 1;
            self.enter()?;
            let inner = self.parse_not();
            self.depth -= 1;
            return Ok(Expr::Not(Box::new(inner?)));
        }
        self.parse_comparison()
    }

    fn parse_comparison(&mut self) -> Result<Expr, String> {
        let left = self.parse_primary()?;
        if let Some(Token::Compare(op)) = self.peek().cloned() {
            self.pos += 1;
            let right = self.parse_primary()?;
            return Ok(Expr::Compare(op, Box::new(left), Box::new(right)));
        }
        Ok(left)
    }

    fn parse_primary(&mut self) -> Result<Expr, String> {
        match self.next() {
            Some(Token::LParen) => {
                self.enter()?;
                let inner = self.parse_or();
                self.depth -= 1;
                let inner = inner?;
                self.expect(Token::RParen)?;
                Ok(inner)
            }
            Some(Token::Number(n)) => Ok(Expr::Literal(
                serde_json::Number::from_f64(n)
                    .map(Value::Number)
                    .unwrap_or(Value::Null),
            )),
            Some(Token::Str(s)) => Ok(Expr::Literal(Value::String(s))),
            Some(Token::Ident(name)) => match name.as_str() {
                "true" => Ok(Expr::Literal(Value::Bool(true))),
                "false" => Ok(Expr::Literal(Value::Bool(false))),
                "null" | "undefined" => Ok(Expr::Literal(Value::Null)),
                "data" => self.parse_path(PathRoot::Data),
                "context" => self.parse_path(PathRoot::Context),
                other => Err(format!(
                    "unknown identifier '{}' (paths must start with 'data' or 'context')",
                    other
                )),
            },
            Some(token) => Err(format!("unexpected token {:?}", token)),
            None => Err("unexpected end of expression".to_string()),
        }
    }

    fn parse_path(&mut self, root: PathRoot) -> Result<Expr, String> {
        let mut segments = Vec::new();
        loop {
            match self.peek() {
                Some(Token::Dot) => {
                    self.pos += 1;
                    match self.next() {
                        Some(Token::Ident(field)) => segments.push(PathSegment::Field(field)),
                        other => return Err(format!("expected field name, found {:?}", other)),
                    }
                }
                Some(Token::LBracket) => {
                    self.pos += 1;
                    let segment = match self.next() {
                        Some(Token::Number(n)) if n >= 0.0 && n.fract() == 0.0 => {
                            PathSegment::Index(n as usize)
                        }
                        Some(Token::Str(field)) => PathSegment::Field(field),
                        other => return Err(format!("invalid index {:?}", other)),
                    };
                    self.expect(Token::RBracket)?;
                    segments.push(segment);
                }
                _ => break,
            }
        }
        Ok(Expr::Path(root, segments))
    }
}

/// Parse an expression string into its AST
pub fn parse(input: &str) -> Result<Expr, String> {
    let tokens = tokenize(input)?;
    if tokens.is_empty() {
        return Err("empty expression".to_string());
    }
    if tokens.len() > MAX_TOKENS {
        return Err(format!(
            "expression too long ({} tokens, limit {})",
            tokens.len(),
            MAX_TOKENS
        ));
    }
    let mut parser = Parser {
        tokens,
        pos: 0,
        depth: 0,
    };
    let expr = parser.parse_or()?;
    if let Some(token) = parser.peek() {
        return Err(format!("unexpected trailing token {:?}", token));
    }
    Ok(expr)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_comparison_path() {
        let expr = parse("data.sensor.value >= 10").unwrap();
        match expr {
            Expr::Compare(CompareOp::Ge, left, right) => {
                assert_eq!(
                    *left,
                    Expr::Path(
                        PathRoot::Data,
                        vec![
                            PathSegment::Field("sensor".into()),
                            PathSegment::Field("value".into())
                        ]
                    )
                );
                assert_eq!(*right, Expr::Literal(serde_json::json!(10.0)));
            }
            other => panic!("unexpected expr {:?}", other),
        }
    }

    #[test]
    fn test_precedence_and_binds_tighter_than_or() {
        let expr = parse("data.a || data.b && data.c").unwrap();
        assert!(matches!(expr, Expr::Or(_, ref right) if matches!(**right, Expr::And(_, _))));
    }

    #[test]
    fn test_strict_equality_alias() {
        assert_eq!(parse("data.x === 'on'").unwrap(), parse("data.x == 'on'").unwrap());
        assert_eq!(parse("data.x !== 1").unwrap(), parse("data.x != 1").unwrap());
    }

    #[test]
    fn test_negative_numbers_and_indexes() {
        assert!(parse("data.readings[0] > -5").is_ok());
        assert!(parse("data['odd key'] == 1").is_ok());
    }

    #[test]
    fn test_rejects_unknown_roots_and_garbage() {
        assert!(parse("process.exit(1)").is_err());
        assert!(parse("data.value >").is_err());
        assert!(parse("data.value = 3").is_err());
        assert!(parse("(data.a").is_err());
        assert!(parse("").is_err());
        assert!(parse("data.a & data.b").is_err());
    }

    #[test]
    fn test_nesting_limit() {
        let at_limit = format!("{}data.x", "!".repeat(MAX_NESTING));
        assert!(parse(&at_limit).is_ok());

        let bangs = format!("{}data.x", "!".repeat(200_000));
        let err = parse(&bangs).unwrap_err();
        assert!(err.contains("too long") || err.contains("nested too deeply"));

        let parens = format!("{}data.x{}", "(".repeat(MAX_NESTING + 1), ")".repeat(MAX_NESTING + 1));
        assert!(parse(&parens).unwrap_err().contains("nested too deeply"));

        let nots = format!("{}data.x", "!".repeat(MAX_NESTING + 1));
        assert!(parse(&nots).unwrap_err().contains("nested too deeply"));
    }

    #[test]
    fn test_long_chains_are_rejected() {
        let chain = vec!["data.x"; MAX_TOKENS].join(" && ");
        assert!(parse(&chain).unwrap_err().contains("too long"));
    }
}
