//! Minimal template language used by service command definitions.
//!
//! Literal text may contain `{{ expr }}` blocks. An expression is a variable,
//! a quoted string, a number or a function call, optionally followed by
//! `| filter` applications:
//!
//! ```text
//! {{ path(NAGIOS_PATH, 'check_snmp') }} -H {{ address }}
//! {{ community | default('public') }}
//! {{ default(port, 161) }}
//! ```
//!
//! Variables are looked up in an immutable context map. Nothing else can be
//! evaluated.

use std::collections::BTreeMap;
use std::path::PathBuf;

use thiserror::Error;

/// Variables visible to a template
pub type Context = BTreeMap<String, String>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TemplateError {
    #[error("'{0}' is undefined")]
    Undefined(String),

    #[error("unknown function or filter '{0}'")]
    UnknownFunction(String),

    #[error("syntax error at offset {offset}: {message}")]
    Syntax { offset: usize, message: String },

    #[error("unterminated expression block starting at offset {0}")]
    Unterminated(usize),
}

/// Render a template against the given context
pub fn render(template: &str, context: &Context) -> Result<String, TemplateError> {
    let mut output = String::with_capacity(template.len());
    let mut rest = template;
    let mut offset = 0;

    while let Some(start) = rest.find("{{") {
        output.push_str(&rest[..start]);
        let body_start = start + 2;
        let end = find_block_end(&rest[body_start..])
            .ok_or(TemplateError::Unterminated(offset + start))?;
        let body = &rest[body_start..body_start + end];

        let value = evaluate(body, context, offset + body_start)?;
        output.push_str(&value);

        let consumed = body_start + end + 2;
        rest = &rest[consumed..];
        offset += consumed;
    }
    output.push_str(rest);

    Ok(output)
}

/// Offset of the `}}` closing a block, quoted `}}` does not count
fn find_block_end(body: &str) -> Option<usize> {
    let mut quote = None;

    for (i, c) in body.char_indices() {
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => {}
            None if c == '\'' || c == '"' => quote = Some(c),
            None if body[i..].starts_with("}}") => return Some(i),
            None => {}
        }
    }

    None
}

/// Evaluate a single expression (the inside of a `{{ }}` block)
pub fn evaluate(expression: &str, context: &Context, offset: usize) -> Result<String, TemplateError> {
    let tokens = tokenize(expression, offset)?;
    let mut parser = Parser { tokens, position: 0, context, end_offset: offset + expression.len() };

    let value = parser.expression()?;
    if let Some((token, at)) = parser.tokens.get(parser.position) {
        return Err(TemplateError::Syntax {
            offset: *at,
            message: format!("unexpected {token:?}"),
        });
    }

    value.into_defined()
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Str(String),
    Number(String),
    LParen,
    RParen,
    Comma,
    Pipe,
}

fn tokenize(input: &str, offset: usize) -> Result<Vec<(Token, usize)>, TemplateError> {
    let mut tokens = Vec::new();
    let chars: Vec<(usize, char)> = input.char_indices().collect();
    let mut i = 0;

    while i < chars.len() {
        let (at, c) = chars[i];
        let at = offset + at;

        match c {
            c if c.is_whitespace() => i += 1,
            '(' => {
                tokens.push((Token::LParen, at));
                i += 1;
            }
            ')' => {
                tokens.push((Token::RParen, at));
                i += 1;
            }
            ',' => {
                tokens.push((Token::Comma, at));
                i += 1;
            }
            '|' => {
                tokens.push((Token::Pipe, at));
                i += 1;
            }
            '\'' | '"' => {
                let quote = c;
                let mut value = String::new();
                i += 1;
                loop {
                    match chars.get(i) {
                        Some((_, ch)) if *ch == quote => break,
                        Some((_, ch)) => value.push(*ch),
                        None => {
                            return Err(TemplateError::Syntax {
                                offset: at,
                                message: "unterminated string".to_string(),
                            });
                        }
                    }
                    i += 1;
                }
                i += 1;
                tokens.push((Token::Str(value), at));
            }
            c if c.is_ascii_digit() || c == '-' => {
                let mut value = String::from(c);
                i += 1;
                while let Some((_, ch)) = chars.get(i) {
                    if ch.is_ascii_digit() || *ch == '.' {
                        value.push(*ch);
                        i += 1;
                    } else {
                        break;
                    }
                }
                tokens.push((Token::Number(value), at));
            }
            c if c.is_alphabetic() || c == '_' => {
                let mut value = String::new();
                while let Some((_, ch)) = chars.get(i) {
                    if ch.is_alphanumeric() || *ch == '_' || *ch == '.' {
                        value.push(*ch);
                        i += 1;
                    } else {
                        break;
                    }
                }
                tokens.push((Token::Ident(value), at));
            }
            other => {
                return Err(TemplateError::Syntax {
                    offset: at,
                    message: format!("unexpected character '{other}'"),
                });
            }
        }
    }

    Ok(tokens)
}

/// A value during evaluation, undefined variables are carried until something
/// either absorbs them (`default`) or needs their value.
#[derive(Debug, Clone)]
enum Value {
    Defined(String),
    Undefined(String),
}

impl Value {
    fn into_defined(self) -> Result<String, TemplateError> {
        match self {
            Value::Defined(value) => Ok(value),
            Value::Undefined(name) => Err(TemplateError::Undefined(name)),
        }
    }
}

struct Parser<'a> {
    tokens: Vec<(Token, usize)>,
    position: usize,
    context: &'a Context,
    end_offset: usize,
}

impl Parser<'_> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.position).map(|(token, _)| token)
    }

    fn next(&mut self) -> Result<(Token, usize), TemplateError> {
        let token = self.tokens.get(self.position).cloned().ok_or(TemplateError::Syntax {
            offset: self.end_offset,
            message: "unexpected end of expression".to_string(),
        })?;
        self.position += 1;
        Ok(token)
    }

    fn expression(&mut self) -> Result<Value, TemplateError> {
        let mut value = self.primary()?;

        while self.peek() == Some(&Token::Pipe) {
            self.position += 1;
            let name = match self.next()? {
                (Token::Ident(name), _) => name,
                (token, at) => {
                    return Err(TemplateError::Syntax {
                        offset: at,
                        message: format!("expected filter name, found {token:?}"),
                    });
                }
            };
            let mut args = vec![value];
            if self.peek() == Some(&Token::LParen) {
                args.extend(self.arguments()?);
            }
            value = call(&name, args)?;
        }

        Ok(value)
    }

    fn primary(&mut self) -> Result<Value, TemplateError> {
        match self.next()? {
            (Token::Str(value), _) | (Token::Number(value), _) => Ok(Value::Defined(value)),
            (Token::Ident(name), _) => {
                if self.peek() == Some(&Token::LParen) {
                    let args = self.arguments()?;
                    call(&name, args)
                } else {
                    Ok(self
                        .context
                        .get(&name)
                        .map(|v| Value::Defined(v.clone()))
                        .unwrap_or(Value::Undefined(name)))
                }
            }
            (token, at) => Err(TemplateError::Syntax {
                offset: at,
                message: format!("unexpected {token:?}"),
            }),
        }
    }

    fn arguments(&mut self) -> Result<Vec<Value>, TemplateError> {
        // opening paren
        self.next()?;
        let mut args = Vec::new();

        if self.peek() == Some(&Token::RParen) {
            self.position += 1;
            return Ok(args);
        }

        loop {
            args.push(self.expression()?);
            match self.next()? {
                (Token::Comma, _) => continue,
                (Token::RParen, _) => break,
                (token, at) => {
                    return Err(TemplateError::Syntax {
                        offset: at,
                        message: format!("expected ',' or ')', found {token:?}"),
                    });
                }
            }
        }

        Ok(args)
    }
}

fn call(name: &str, args: Vec<Value>) -> Result<Value, TemplateError> {
    match name {
        "default" | "load_default" => {
            let mut args = args.into_iter();
            let value = args.next();
            let fallback = args.next().unwrap_or(Value::Defined(String::new()));
            match value {
                Some(Value::Defined(v)) => Ok(Value::Defined(v)),
                _ => Ok(fallback),
            }
        }
        "path" => {
            let mut path = PathBuf::new();
            for arg in args {
                path.push(arg.into_defined()?);
            }
            Ok(Value::Defined(path.to_string_lossy().into_owned()))
        }
        "lower" | "upper" | "trim" => {
            let value = args
                .into_iter()
                .next()
                .ok_or(TemplateError::UnknownFunction(name.to_string()))?
                .into_defined()?;
            Ok(Value::Defined(match name {
                "lower" => value.to_lowercase(),
                "upper" => value.to_uppercase(),
                _ => value.trim().to_string(),
            }))
        }
        other => Err(TemplateError::UnknownFunction(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context() -> Context {
        let mut context = Context::new();
        context.insert("address".into(), "10.0.0.5".into());
        context.insert("NAGIOS_PATH".into(), "/usr/lib/nagios/plugins".into());
        context.insert("community".into(), "public".into());
        context
    }

    #[test]
    fn test_plain_text_passes_through() {
        assert_eq!(render("check_ping -w 100", &context()).unwrap(), "check_ping -w 100");
    }

    #[test]
    fn test_variable_substitution() {
        assert_eq!(render("-H {{ address }}", &context()).unwrap(), "-H 10.0.0.5");
        assert_eq!(render("{{address}}:{{ community }}", &context()).unwrap(), "10.0.0.5:public");
    }

    #[test]
    fn test_path_join() {
        assert_eq!(
            render("{{ path(NAGIOS_PATH, 'check_snmp') }} -v", &context()).unwrap(),
            "/usr/lib/nagios/plugins/check_snmp -v"
        );
    }

    #[test]
    fn test_default_function_and_filter() {
        assert_eq!(render("{{ default(port, 161) }}", &context()).unwrap(), "161");
        assert_eq!(render("{{ port | default('162') }}", &context()).unwrap(), "162");
        assert_eq!(render("{{ community | default('private') }}", &context()).unwrap(), "public");
        assert_eq!(render("{{ load_default(missing, \"x\") }}", &context()).unwrap(), "x");
    }

    #[test]
    fn test_string_filters() {
        assert_eq!(render("{{ 'ABC' | lower }}", &context()).unwrap(), "abc");
        assert_eq!(render("{{ community | upper }}", &context()).unwrap(), "PUBLIC");
        assert_eq!(render("{{ ' x ' | trim }}", &context()).unwrap(), "x");
    }

    #[test]
    fn test_quoted_braces_stay_in_the_block() {
        assert_eq!(render("{{ '}}' }}", &context()).unwrap(), "}}");
        assert_eq!(
            render("-m {{ missing | default(\"{{x}}\") }} -H {{ address }}", &context()).unwrap(),
            "-m {{x}} -H 10.0.0.5"
        );
    }

    #[test]
    fn test_undefined_variable_is_an_error() {
        assert_eq!(
            render("-H {{ hostname }}", &context()),
            Err(TemplateError::Undefined("hostname".into()))
        );
        assert!(matches!(
            render("{{ path(NAGIOS_PATH, missing) }}", &context()),
            Err(TemplateError::Undefined(_))
        ));
    }

    #[test]
    fn test_unknown_function_is_rejected() {
        assert_eq!(
            render("{{ exec('rm') }}", &context()),
            Err(TemplateError::UnknownFunction("exec".into()))
        );
    }

    #[test]
    fn test_syntax_errors() {
        assert!(matches!(render("{{ address", &context()), Err(TemplateError::Unterminated(0))));
        // the quote swallows the closing braces
        assert!(matches!(render("{{ 'open }}", &context()), Err(TemplateError::Unterminated(0))));
        assert!(matches!(render("{{ address address }}", &context()), Err(TemplateError::Syntax { .. })));
        assert!(matches!(render("{{ }}", &context()), Err(TemplateError::Syntax { .. })));
    }
}
