//! Structured literals typed into plain-text field editors.
//!
//! [`parse_literal`] accepts the JSON spelling produced by [`render_value`]
//! as well as a looser one (`True`, `None`, single-quoted strings, tuples).

use serde_json::{Map, Number, Value};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid literal at byte {pos}: {msg}")]
pub struct LiteralError {
    pub pos: usize,
    pub msg: &'static str,
}

/// Text shown in a field editor and matched by search.
pub fn field_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => render_value(other),
    }
}

/// Renders a value with `", "` and `": "` separators, keeping non-ASCII text
/// as is.
pub fn render_value(value: &Value) -> String {
    let mut out = String::new();
    write_value(&mut out, value);
    out
}

fn write_value(out: &mut String, value: &Value) {
    match value {
        Value::Null => out.push_str("null"),
        Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        Value::Number(n) => out.push_str(&n.to_string()),
        Value::String(s) => write_quoted(out, s),
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                write_value(out, item);
            }
            out.push(']');
        }
        Value::Object(map) => {
            out.push('{');
            for (i, (k, v)) in map.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                write_quoted(out, k);
                out.push_str(": ");
                write_value(out, v);
            }
            out.push('}');
        }
    }
}

fn write_quoted(out: &mut String, s: &str) {
    // serde_json only escapes what JSON requires, so non-ASCII stays literal.
    match serde_json::to_string(s) {
        Ok(quoted) => out.push_str(&quoted),
        Err(_) => {
            out.push('"');
            out.push_str(s);
            out.push('"');
        }
    }
}

/// Parses `text` as a single literal: number, string, list, tuple, mapping,
/// boolean or null. Surrounding whitespace is ignored. A bare comma separated
/// sequence (`1, 2`) is a tuple without its parentheses.
pub fn parse_literal(text: &str) -> Result<Value, LiteralError> {
    let mut parser = Parser { src: text, pos: 0 };
    parser.skip_ws();
    let first = parser.value()?;
    parser.skip_ws();
    if !parser.eat(',') {
        if parser.pos != parser.src.len() {
            return Err(parser.error("trailing characters"));
        }
        return Ok(first);
    }

    let mut items = vec![first];
    loop {
        parser.skip_ws();
        if parser.pos == parser.src.len() {
            return Ok(Value::Array(items));
        }
        items.push(parser.value()?);
        parser.skip_ws();
        if !parser.eat(',') {
            if parser.pos != parser.src.len() {
                return Err(parser.error("expected ',' or end of input"));
            }
            return Ok(Value::Array(items));
        }
    }
}

struct Parser<'a> {
    src: &'a str,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn error(&self, msg: &'static str) -> LiteralError {
        LiteralError { pos: self.pos, msg }
    }

    fn peek(&self) -> Option<char> {
        self.src[self.pos..].chars().next()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn eat(&mut self, expected: char) -> bool {
        if self.peek() == Some(expected) {
            self.pos += expected.len_utf8();
            true
        } else {
            false
        }
    }

    fn skip_ws(&mut self) {
        while matches!(self.peek(), Some(c) if c.is_whitespace()) {
            self.bump();
        }
    }

    fn value(&mut self) -> Result<Value, LiteralError> {
        match self.peek() {
            None => Err(self.error("unexpected end of input")),
            Some('[') => {
                self.bump();
                self.sequence(']').map(|(items, _)| Value::Array(items))
            }
            Some('(') => {
                self.bump();
                let (mut items, trailing_comma) = self.sequence(')')?;
                // `(x)` is just a parenthesized value, `(x,)` is a tuple.
                if items.len() == 1 && !trailing_comma {
                    Ok(items.remove(0))
                } else {
                    Ok(Value::Array(items))
                }
            }
            Some('{') => {
                self.bump();
                self.mapping()
            }
            Some(q @ ('"' | '\'')) => {
                self.bump();
                self.string(q).map(Value::String)
            }
            Some(c) if c == '-' || c == '+' || c == '.' || c.is_ascii_digit() => self.number(),
            Some(c) if c.is_ascii_alphabetic() => self.keyword(),
            Some(_) => Err(self.error("unexpected character")),
        }
    }

    /// Comma separated values up to `close`. Also reports whether the last
    /// element was followed by a comma.
    fn sequence(&mut self, close: char) -> Result<(Vec<Value>, bool), LiteralError> {
        let mut items = Vec::new();
        let mut trailing_comma = false;
        loop {
            self.skip_ws();
            if self.eat(close) {
                return Ok((items, trailing_comma));
            }
            items.push(self.value()?);
            self.skip_ws();
            if self.eat(',') {
                trailing_comma = true;
            } else if self.eat(close) {
                return Ok((items, false));
            } else {
                return Err(self.error("expected ',' or closing bracket"));
            }
        }
    }

    fn mapping(&mut self) -> Result<Value, LiteralError> {
        let mut map = Map::new();
        loop {
            self.skip_ws();
            if self.eat('}') {
                return Ok(Value::Object(map));
            }
            let key = match self.value()? {
                Value::String(s) => s,
                Value::Number(n) => n.to_string(),
                Value::Bool(b) => b.to_string(),
                Value::Null => "null".to_string(),
                Value::Array(_) | Value::Object(_) => {
                    return Err(self.error("mapping keys must be scalars"))
                }
            };
            self.skip_ws();
            if !self.eat(':') {
                return Err(self.error("expected ':' after mapping key"));
            }
            self.skip_ws();
            let value = self.value()?;
            map.insert(key, value);
            self.skip_ws();
            if !self.eat(',') {
                self.skip_ws();
                if self.eat('}') {
                    return Ok(Value::Object(map));
                }
                return Err(self.error("expected ',' or '}'"));
            }
        }
    }

    fn string(&mut self, quote: char) -> Result<String, LiteralError> {
        let mut out = String::new();
        loop {
            let c = self.bump().ok_or_else(|| self.error("unterminated string"))?;
            if c == quote {
                return Ok(out);
            }
            if c != '\\' {
                out.push(c);
                continue;
            }
            let escaped = self.bump().ok_or_else(|| self.error("unterminated escape"))?;
            match escaped {
                'n' => out.push('\n'),
                't' => out.push('\t'),
                'r' => out.push('\r'),
                'b' => out.push('\u{8}'),
                'f' => out.push('\u{c}'),
                '0' => out.push('\0'),
                '/' => out.push('/'),
                '\\' | '\'' | '"' => out.push(escaped),
                'x' => out.push(self.hex_escape(2)?),
                'u' => out.push(self.unicode_escape()?),
                _ => return Err(self.error("unknown escape sequence")),
            }
        }
    }

    fn hex_digits(&mut self, count: usize) -> Result<u32, LiteralError> {
        let end = self.pos + count;
        let digits = self
            .src
            .get(self.pos..end)
            .ok_or_else(|| self.error("truncated escape"))?;
        let code = u32::from_str_radix(digits, 16).map_err(|_| self.error("bad hex escape"))?;
        self.pos = end;
        Ok(code)
    }

    fn hex_escape(&mut self, count: usize) -> Result<char, LiteralError> {
        let code = self.hex_digits(count)?;
        char::from_u32(code).ok_or_else(|| self.error("invalid code point"))
    }

    fn unicode_escape(&mut self) -> Result<char, LiteralError> {
        let high = self.hex_digits(4)?;
        if (0xD800..0xDC00).contains(&high) {
            // JSON encodes astral characters as surrogate pairs.
            if !(self.eat('\\') && self.eat('u')) {
                return Err(self.error("unpaired surrogate"));
            }
            let low = self.hex_digits(4)?;
            if !(0xDC00..0xE000).contains(&low) {
                return Err(self.error("unpaired surrogate"));
            }
            let code = 0x10000 + ((high - 0xD800) << 10) + (low - 0xDC00);
            return char::from_u32(code).ok_or_else(|| self.error("invalid code point"));
        }
        char::from_u32(high).ok_or_else(|| self.error("invalid code point"))
    }

    fn number(&mut self) -> Result<Value, LiteralError> {
        let start = self.pos;
        if matches!(self.peek(), Some('-' | '+')) {
            self.bump();
        }
        let mut digits = 0;
        let mut is_float = false;
        while matches!(self.peek(), Some(c) if c.is_ascii_digit() || c == '_') {
            self.bump();
            digits += 1;
        }
        if self.eat('.') {
            is_float = true;
            while matches!(self.peek(), Some(c) if c.is_ascii_digit() || c == '_') {
                self.bump();
                digits += 1;
            }
        }
        if digits == 0 {
            return Err(self.error("expected digits"));
        }
        if matches!(self.peek(), Some('e' | 'E')) {
            is_float = true;
            self.bump();
            if matches!(self.peek(), Some('-' | '+')) {
                self.bump();
            }
            let exp_start = self.pos;
            while matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
                self.bump();
            }
            if self.pos == exp_start {
                return Err(self.error("expected exponent digits"));
            }
        }

        let literal: String = self.src[start..self.pos]
            .chars()
            .filter(|&c| c != '_' && c != '+')
            .collect();
        if !is_float {
            if let Ok(n) = literal.parse::<i64>() {
                return Ok(Value::Number(n.into()));
            }
            if let Ok(n) = literal.parse::<u64>() {
                return Ok(Value::Number(n.into()));
            }
        }
        literal
            .parse::<f64>()
            .ok()
            .and_then(Number::from_f64)
            .map(Value::Number)
            .ok_or_else(|| self.error("number out of range"))
    }

    fn keyword(&mut self) -> Result<Value, LiteralError> {
        let start = self.pos;
        while matches!(self.peek(), Some(c) if c.is_ascii_alphanumeric() || c == '_') {
            self.bump();
        }
        match &self.src[start..self.pos] {
            "true" | "True" => Ok(Value::Bool(true)),
            "false" | "False" => Ok(Value::Bool(false)),
            "null" | "None" => Ok(Value::Null),
            _ => {
                self.pos = start;
                Err(self.error("unknown identifier"))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;
    use serde_json::json;

    use super::*;

    #[rstest]
    #[case("42", json!(42))]
    #[case("-7", json!(-7))]
    #[case("+3", json!(3))]
    #[case("2.5", json!(2.5))]
    #[case("1e3", json!(1000.0))]
    #[case(".5", json!(0.5))]
    #[case("  [1, 2, 3]  ", json!([1, 2, 3]))]
    #[case("[[0.1, 0.2, 0.3, 0.4], [1, 2, 3, 4]]", json!([[0.1, 0.2, 0.3, 0.4], [1, 2, 3, 4]]))]
    #[case("(1, 2)", json!([1, 2]))]
    #[case("(1,)", json!([1]))]
    #[case("(5)", json!(5))]
    #[case("[]", json!([]))]
    #[case("{}", json!({}))]
    #[case("{'a': 1, \"b\": [True, None]}", json!({"a": 1, "b": [true, null]}))]
    #[case("{1: 'x'}", json!({"1": "x"}))]
    #[case("true", json!(true))]
    #[case("False", json!(false))]
    #[case("null", json!(null))]
    #[case("'it\\'s'", json!("it's"))]
    #[case("\"caf\\u00e9 \\ud83d\\ude00\"", json!("café 😀"))]
    #[case("\"标注\"", json!("标注"))]
    #[case("[1, 2,]", json!([1, 2]))]
    #[case("1, 2", json!([1, 2]))]
    #[case(" 'a', [3], None ", json!(["a", [3], null]))]
    #[case("7,", json!([7]))]
    fn parses_literals(#[case] text: &str, #[case] expected: Value) {
        assert_eq!(parse_literal(text), Ok(expected));
    }

    #[rstest]
    #[case("")]
    #[case("   ")]
    #[case("hello")]
    #[case("[1, 2")]
    #[case("{'a' 1}")]
    #[case("'open")]
    #[case("1 2")]
    #[case("1, 2 3")]
    #[case(", 1")]
    #[case("1,, 2")]
    #[case("-")]
    #[case("1e")]
    #[case("{[1]: 2}")]
    #[case("nan")]
    fn rejects_malformed_input(#[case] text: &str) {
        assert!(parse_literal(text).is_err(), "{text:?} should not parse");
    }

    #[test]
    fn rendering_uses_spaced_separators() {
        let value = json!({"box": [1, 2.5, -3], "tag": "猫", "ok": true, "none": null});
        assert_eq!(
            render_value(&value),
            r#"{"box": [1, 2.5, -3], "tag": "猫", "ok": true, "none": null}"#
        );
    }

    #[test]
    fn field_text_keeps_strings_verbatim() {
        assert_eq!(field_text(&json!("a \"quoted\" word")), "a \"quoted\" word");
        assert_eq!(field_text(&json!([1, 2])), "[1, 2]");
    }

    #[test]
    fn rendered_text_parses_back() {
        let value = json!([[10, 20, 30, 40], {"label": "dog \"big\"", "score": 0.75}]);
        assert_eq!(parse_literal(&render_value(&value)), Ok(value));
    }
}
