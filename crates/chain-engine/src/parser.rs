//! Model-language parser.
//!
//! ```text
//! data {
//!     y[] ~ dnorm(mu0, 1)
//! }
//! model {
//!     mu ~ dnorm(0, 0.0001)
//!     tau ~ dgamma(1, 1)
//!     y[] ~ dnorm(mu, tau)   # dimensions taken from the data
//! }
//! ```

use indexmap::IndexSet;
use thiserror::Error;

/// Dimensions declared for a relation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DimSpec {
    /// No brackets: a scalar.
    Scalar,
    /// `[]`: taken from the supplied data.
    Infer,
    /// Explicit extents.
    Fixed(Vec<usize>),
}

/// A distribution argument.
#[derive(Debug, Clone, PartialEq)]
pub enum Arg {
    /// Numeric literal.
    Value(f64),
    /// Reference to another variable.
    Var(String),
}

/// `name[dims] ~ family(args)`.
#[derive(Debug, Clone, PartialEq)]
pub struct Relation {
    /// Defined variable.
    pub name: String,
    /// Declared dimensions.
    pub dims: DimSpec,
    /// Distribution family name.
    pub family: String,
    /// Distribution arguments.
    pub args: Vec<Arg>,
    /// Source line of the relation.
    pub line: usize,
}

/// A parsed model description.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Program {
    /// Relations of the optional `data` block.
    pub data: Vec<Relation>,
    /// Relations of the `model` block.
    pub model: Vec<Relation>,
}

impl Program {
    /// Variables of the model block: defined names first, then referenced
    /// names, each in order of first appearance.
    pub fn variable_names(&self) -> Vec<String> {
        let mut names: IndexSet<&str> = self.model.iter().map(|rel| rel.name.as_str()).collect();
        for relation in &self.model {
            for arg in &relation.args {
                if let Arg::Var(name) = arg {
                    names.insert(name.as_str());
                }
            }
        }
        names.into_iter().map(str::to_string).collect()
    }
}

/// Parse failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    /// Unexpected token.
    #[error("syntax error on line {line} near \"{token}\"")]
    Syntax {
        /// One-based line number.
        line: usize,
        /// Offending token text.
        token: String,
    },
    /// A block defines the same variable twice.
    #[error("line {line}: attempt to redefine node {name}")]
    Duplicate {
        /// One-based line number.
        line: usize,
        /// Redefined variable.
        name: String,
    },
    /// No `model` block present.
    #[error("model block missing")]
    MissingModel,
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Number(f64, String),
    Symbol(char),
    Eof,
}

impl Token {
    fn text(&self) -> String {
        match self {
            Token::Ident(name) => name.clone(),
            Token::Number(_, raw) => raw.clone(),
            Token::Symbol(symbol) => symbol.to_string(),
            Token::Eof => "end of input".to_string(),
        }
    }
}

fn tokenize(source: &str) -> Result<Vec<(Token, usize)>, ParseError> {
    let mut tokens = Vec::new();
    let chars: Vec<char> = source.chars().collect();
    let mut pos = 0;
    let mut line = 1;
    while pos < chars.len() {
        let ch = chars[pos];
        match ch {
            '\n' => {
                line += 1;
                pos += 1;
            }
            c if c.is_whitespace() || c == ';' => pos += 1,
            '#' => {
                while pos < chars.len() && chars[pos] != '\n' {
                    pos += 1;
                }
            }
            '{' | '}' | '[' | ']' | '(' | ')' | ',' | '~' | '-' => {
                tokens.push((Token::Symbol(ch), line));
                pos += 1;
            }
            c if c.is_ascii_digit() || c == '.' && next_is_digit(&chars, pos) => {
                let start = pos;
                while pos < chars.len() && (chars[pos].is_ascii_digit() || chars[pos] == '.') {
                    pos += 1;
                }
                if pos < chars.len() && matches!(chars[pos], 'e' | 'E') {
                    pos += 1;
                    if pos < chars.len() && matches!(chars[pos], '+' | '-') {
                        pos += 1;
                    }
                    while pos < chars.len() && chars[pos].is_ascii_digit() {
                        pos += 1;
                    }
                }
                let raw: String = chars[start..pos].iter().collect();
                let value = raw.parse::<f64>().map_err(|_| ParseError::Syntax {
                    line,
                    token: raw.clone(),
                })?;
                tokens.push((Token::Number(value, raw), line));
            }
            c if c.is_alphabetic() => {
                let start = pos;
                while pos < chars.len()
                    && (chars[pos].is_alphanumeric() || chars[pos] == '_' || chars[pos] == '.')
                {
                    pos += 1;
                }
                tokens.push((Token::Ident(chars[start..pos].iter().collect()), line));
            }
            other => {
                return Err(ParseError::Syntax {
                    line,
                    token: other.to_string(),
                })
            }
        }
    }
    tokens.push((Token::Eof, line));
    Ok(tokens)
}

fn next_is_digit(chars: &[char], pos: usize) -> bool {
    chars.get(pos + 1).map_or(false, char::is_ascii_digit)
}

struct Parser {
    tokens: Vec<(Token, usize)>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)].0
    }

    fn line(&self) -> usize {
        self.tokens[self.pos.min(self.tokens.len() - 1)].1
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        token
    }

    fn error(&self) -> ParseError {
        ParseError::Syntax {
            line: self.line(),
            token: self.peek().text(),
        }
    }

    fn expect(&mut self, symbol: char) -> Result<(), ParseError> {
        if self.peek() == &Token::Symbol(symbol) {
            self.advance();
            Ok(())
        } else {
            Err(self.error())
        }
    }

    fn ident(&mut self) -> Result<String, ParseError> {
        match self.peek() {
            Token::Ident(name) => {
                let name = name.clone();
                self.advance();
                Ok(name)
            }
            _ => Err(self.error()),
        }
    }

    fn program(&mut self) -> Result<Program, ParseError> {
        let mut program = Program::default();
        let mut seen_data = false;
        let mut seen_model = false;
        while self.peek() != &Token::Eof {
            let keyword = self.peek().clone();
            let target = match &keyword {
                Token::Ident(word) if word == "data" && !seen_data => {
                    seen_data = true;
                    &mut program.data
                }
                Token::Ident(word) if word == "model" && !seen_model => {
                    seen_model = true;
                    &mut program.model
                }
                _ => return Err(self.error()),
            };
            self.advance();
            *target = self.block()?;
        }
        if !seen_model {
            return Err(ParseError::MissingModel);
        }
        Ok(program)
    }

    fn block(&mut self) -> Result<Vec<Relation>, ParseError> {
        self.expect('{')?;
        let mut relations: Vec<Relation> = Vec::new();
        while self.peek() != &Token::Symbol('}') {
            let relation = self.relation()?;
            if relations.iter().any(|other| other.name == relation.name) {
                return Err(ParseError::Duplicate {
                    line: relation.line,
                    name: relation.name,
                });
            }
            relations.push(relation);
        }
        self.expect('}')?;
        Ok(relations)
    }

    fn relation(&mut self) -> Result<Relation, ParseError> {
        let line = self.line();
        let name = self.ident()?;
        let dims = if self.peek() == &Token::Symbol('[') {
            self.dims()?
        } else {
            DimSpec::Scalar
        };
        self.expect('~')?;
        let family = self.ident()?;
        self.expect('(')?;
        let mut args = Vec::new();
        if self.peek() != &Token::Symbol(')') {
            loop {
                args.push(self.arg()?);
                if self.peek() == &Token::Symbol(',') {
                    self.advance();
                } else {
                    break;
                }
            }
        }
        self.expect(')')?;
        Ok(Relation {
            name,
            dims,
            family,
            args,
            line,
        })
    }

    fn dims(&mut self) -> Result<DimSpec, ParseError> {
        self.expect('[')?;
        if self.peek() == &Token::Symbol(']') {
            self.advance();
            return Ok(DimSpec::Infer);
        }
        let mut extents = Vec::new();
        loop {
            match self.peek() {
                Token::Number(value, _) if *value >= 1.0 && value.fract() == 0.0 => {
                    extents.push(*value as usize);
                    self.advance();
                }
                _ => return Err(self.error()),
            }
            if self.peek() == &Token::Symbol(',') {
                self.advance();
            } else {
                break;
            }
        }
        self.expect(']')?;
        Ok(DimSpec::Fixed(extents))
    }

    fn arg(&mut self) -> Result<Arg, ParseError> {
        let negative = self.peek() == &Token::Symbol('-');
        if negative {
            self.advance();
        }
        match self.peek().clone() {
            Token::Number(value, _) => {
                self.advance();
                Ok(Arg::Value(if negative { -value } else { value }))
            }
            Token::Ident(name) if !negative => {
                self.advance();
                Ok(Arg::Var(name))
            }
            _ => Err(self.error()),
        }
    }
}

/// Parses model text.
pub fn parse(source: &str) -> Result<Program, ParseError> {
    let tokens = tokenize(source)?;
    Parser { tokens, pos: 0 }.program()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relations_and_comments() {
        let program = parse(
            "model {\n  # prior\n  mu ~ dnorm(0, 1e-4)\n  y[] ~ dnorm(mu, 1);\n  z[2,3] ~ dunif(-1, 1)\n}",
        )
        .unwrap();
        assert!(program.data.is_empty());
        assert_eq!(program.model.len(), 3);
        assert_eq!(program.model[1].dims, DimSpec::Infer);
        assert_eq!(program.model[2].dims, DimSpec::Fixed(vec![2, 3]));
        assert_eq!(program.model[2].args[0], Arg::Value(-1.0));
        assert_eq!(program.model[2].line, 5);
        assert_eq!(program.variable_names(), vec!["mu", "y", "z"]);
    }

    #[test]
    fn errors_name_line_and_token() {
        let err = parse("model {\n  mu ~ dnorm(0 1)\n}").unwrap_err();
        assert_eq!(err.to_string(), "syntax error on line 2 near \"1\"");
        assert_eq!(parse("data { }").unwrap_err(), ParseError::MissingModel);
        assert!(matches!(
            parse("model { a ~ dbern(0.5) a ~ dbern(0.1) }").unwrap_err(),
            ParseError::Duplicate { .. }
        ));
        assert!(matches!(
            parse("model { a ~ dnorm(0, 1) } model { }").unwrap_err(),
            ParseError::Syntax { .. }
        ));
    }
}
