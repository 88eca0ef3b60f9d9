/// Sandboxed arithmetic evaluator.
///
/// Replaces the original dynamic-eval calculator with a small
/// recursive-descent parser over numeric literals, `+ - * /`, parentheses
/// and unary minus. Nothing else is accepted.
use serde_json::json;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CalcError {
    #[error("表达式为空")]
    Empty,
    #[error("意外的字符 '{0}'")]
    UnexpectedChar(char),
    #[error("表达式不完整")]
    UnexpectedEnd,
    #[error("缺少右括号")]
    UnbalancedParen,
    #[error("除数为零")]
    DivisionByZero,
    #[error("数字无效 '{0}'")]
    InvalidNumber(String),
}

/// Evaluate an expression and wrap the outcome the way the original tool
/// reported it: `{"result": n}` on success, `{"error": msg}` on failure.
#[must_use]
pub fn run(code: &str) -> serde_json::Value {
    match evaluate(code) {
        Ok(value) => json!({ "result": number_value(value) }),
        Err(err) => json!({ "error": err.to_string() }),
    }
}

/// Evaluate an arithmetic expression.
///
/// # Errors
///
/// Returns [`CalcError`] for empty input, unexpected characters, unbalanced
/// parentheses, malformed numbers, and division by zero.
pub fn evaluate(input: &str) -> Result<f64, CalcError> {
    let mut parser = Parser {
        bytes: input.as_bytes(),
        pos: 0,
    };
    parser.skip_ws();
    if parser.peek().is_none() {
        return Err(CalcError::Empty);
    }
    let value = parser.expr()?;
    parser.skip_ws();
    match parser.peek() {
        None => Ok(value),
        Some(b')') => Err(CalcError::UnbalancedParen),
        Some(other) => Err(CalcError::UnexpectedChar(char::from(other))),
    }
}

/// Integers serialize without a trailing `.0` so `2+2` reports `{"result":4}`.
fn number_value(value: f64) -> serde_json::Value {
    const INT_EXACT_BOUND: f64 = 9_007_199_254_740_992.0; // 2^53
    if value.fract() == 0.0 && value.abs() < INT_EXACT_BOUND {
        json!(value as i64)
    } else {
        json!(value)
    }
}

struct Parser<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl Parser<'_> {
    fn skip_ws(&mut self) {
        while self
            .bytes
            .get(self.pos)
            .is_some_and(|byte| byte.is_ascii_whitespace())
        {
            self.pos += 1;
        }
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn bump(&mut self) {
        self.pos += 1;
    }

    // expr := term (('+' | '-') term)*
    fn expr(&mut self) -> Result<f64, CalcError> {
        let mut value = self.term()?;
        loop {
            self.skip_ws();
            match self.peek() {
                Some(b'+') => {
                    self.bump();
                    value += self.term()?;
                }
                Some(b'-') => {
                    self.bump();
                    value -= self.term()?;
                }
                _ => return Ok(value),
            }
        }
    }

    // term := factor (('*' | '/') factor)*
    fn term(&mut self) -> Result<f64, CalcError> {
        let mut value = self.factor()?;
        loop {
            self.skip_ws();
            match self.peek() {
                Some(b'*') => {
                    self.bump();
                    value *= self.factor()?;
                }
                Some(b'/') => {
                    self.bump();
                    let divisor = self.factor()?;
                    if divisor == 0.0 {
                        return Err(CalcError::DivisionByZero);
                    }
                    value /= divisor;
                }
                _ => return Ok(value),
            }
        }
    }

    // factor := '-' factor | '(' expr ')' | number
    fn factor(&mut self) -> Result<f64, CalcError> {
        self.skip_ws();
        match self.peek() {
            None => Err(CalcError::UnexpectedEnd),
            Some(b'-') => {
                self.bump();
                Ok(-self.factor()?)
            }
            Some(b'(') => {
                self.bump();
                let value = self.expr()?;
                self.skip_ws();
                if self.peek() == Some(b')') {
                    self.bump();
                    Ok(value)
                } else {
                    Err(CalcError::UnbalancedParen)
                }
            }
            Some(byte) if byte.is_ascii_digit() || byte == b'.' => self.number(),
            Some(other) => Err(CalcError::UnexpectedChar(char::from(other))),
        }
    }

    fn number(&mut self) -> Result<f64, CalcError> {
        let start = self.pos;
        let mut seen_dot = false;
        while let Some(byte) = self.peek() {
            if byte.is_ascii_digit() {
                self.bump();
            } else if byte == b'.' && !seen_dot {
                seen_dot = true;
                self.bump();
            } else {
                break;
            }
        }
        let text = std::str::from_utf8(&self.bytes[start..self.pos]).unwrap_or("");
        text.parse::<f64>()
            .map_err(|_| CalcError::InvalidNumber(text.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_arithmetic() {
        assert_eq!(evaluate("2+2").unwrap(), 4.0);
        assert_eq!(evaluate("10-3").unwrap(), 7.0);
        assert_eq!(evaluate("6*7").unwrap(), 42.0);
        assert_eq!(evaluate("15/4").unwrap(), 3.75);
    }

    #[test]
    fn test_precedence_and_parentheses() {
        assert_eq!(evaluate("2+3*4").unwrap(), 14.0);
        assert_eq!(evaluate("(2+3)*4").unwrap(), 20.0);
        assert_eq!(evaluate("2*(3+(4-1))").unwrap(), 12.0);
        assert_eq!(evaluate(" 1 + 2 * 3 ").unwrap(), 7.0);
    }

    #[test]
    fn test_unary_minus() {
        assert_eq!(evaluate("-5").unwrap(), -5.0);
        assert_eq!(evaluate("-(2+3)").unwrap(), -5.0);
        assert_eq!(evaluate("3*-2").unwrap(), -6.0);
        assert_eq!(evaluate("--4").unwrap(), 4.0);
    }

    #[test]
    fn test_decimals() {
        assert_eq!(evaluate("0.5+0.25").unwrap(), 0.75);
        assert_eq!(evaluate(".5*2").unwrap(), 1.0);
    }

    #[test]
    fn test_division_by_zero() {
        assert_eq!(evaluate("1/0"), Err(CalcError::DivisionByZero));
        assert_eq!(evaluate("1/(2-2)"), Err(CalcError::DivisionByZero));
    }

    #[test]
    fn test_rejects_anything_but_arithmetic() {
        assert!(matches!(
            evaluate("process.exit(1)"),
            Err(CalcError::UnexpectedChar('p'))
        ));
        assert!(matches!(evaluate("2^3"), Err(CalcError::UnexpectedChar('^'))));
        assert_eq!(evaluate(""), Err(CalcError::Empty));
        assert_eq!(evaluate("   "), Err(CalcError::Empty));
        assert_eq!(evaluate("2+"), Err(CalcError::UnexpectedEnd));
        assert_eq!(evaluate("(1+2"), Err(CalcError::UnbalancedParen));
        assert_eq!(evaluate("1+2)"), Err(CalcError::UnbalancedParen));
    }

    #[test]
    fn test_run_wraps_success_as_integer() {
        assert_eq!(run("2+2"), json!({"result": 4}));
        assert_eq!(run("15/4"), json!({"result": 3.75}));
    }

    #[test]
    fn test_run_wraps_failure() {
        let value = run("1/0");
        assert_eq!(value["error"], "除数为零");
    }
}
