//! Integer constant-expression evaluation for `#if` and `#elif`.
//!
//! Operates on tokens that have already had `defined` resolved and macros
//! expanded. Remaining identifiers evaluate to 0, except `true`/`false`.

use super::token::{PpKind, PpToken};

/// Deepest parenthesis, operator or `?:` nesting accepted.
const MAX_NESTING_DEPTH: usize = 256;

struct Evaluator<'a> {
    tokens: &'a [PpToken],
    pos: usize,
    depth: usize,
}

/// Evaluate a conditional expression. Division by zero is only an error
/// in branches that are actually evaluated.
pub(crate) fn evaluate(tokens: &[PpToken]) -> Result<i64, String> {
    if tokens.is_empty() {
        return Err("#if with no expression".to_string());
    }
    let mut evaluator = Evaluator {
        tokens,
        pos: 0,
        depth: 0,
    };
    let value = evaluator.expression(0, true)?;
    if let Some(extra) = evaluator.tokens.get(evaluator.pos) {
        return Err(format!("unexpected '{}' in #if expression", extra.text));
    }
    Ok(value)
}

fn binding_power(op: &str) -> Option<u8> {
    let bp = match op {
        "||" => 1,
        "&&" => 2,
        "|" => 3,
        "^" => 4,
        "&" => 5,
        "==" | "!=" => 6,
        "<" | ">" | "<=" | ">=" => 7,
        "<<" | ">>" => 8,
        "+" | "-" => 9,
        "*" | "/" | "%" => 10,
        _ => return None,
    };
    Some(bp)
}

fn parse_number(text: &str) -> Result<i64, String> {
    let digits = text.trim_end_matches(['u', 'U']);
    let parsed = if let Some(hex) = digits.strip_prefix("0x").or_else(|| digits.strip_prefix("0X")) {
        i64::from_str_radix(hex, 16)
    } else if digits.len() > 1 && digits.starts_with('0') {
        i64::from_str_radix(&digits[1..], 8)
    } else {
        digits.parse::<i64>()
    };
    parsed.map_err(|_| format!("invalid integer '{}' in #if expression", text))
}

impl<'a> Evaluator<'a> {
    fn peek(&self) -> Option<&'a PpToken> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Result<&'a PpToken, String> {
        let token = self
            .tokens
            .get(self.pos)
            .ok_or_else(|| "unexpected end of #if expression".to_string())?;
        self.pos += 1;
        Ok(token)
    }

    fn expect(&mut self, text: &str) -> Result<(), String> {
        let token = self.next()?;
        if token.is_punct(text) {
            Ok(())
        } else {
            Err(format!("expected '{}' in #if expression, got '{}'", text, token.text))
        }
    }

    fn enter(&mut self) -> Result<(), String> {
        if self.depth >= MAX_NESTING_DEPTH {
            return Err(format!("#if expression nests deeper than {} levels", MAX_NESTING_DEPTH));
        }
        self.depth += 1;
        Ok(())
    }

    fn expression(&mut self, min_bp: u8, live: bool) -> Result<i64, String> {
        self.enter()?;
        let value = self.binary(min_bp, live);
        self.depth -= 1;
        value
    }

    /// Operand of a prefix operator.
    fn operand(&mut self, live: bool) -> Result<i64, String> {
        self.enter()?;
        let value = self.unary(live);
        self.depth -= 1;
        value
    }

    fn binary(&mut self, min_bp: u8, live: bool) -> Result<i64, String> {
        let mut lhs = self.unary(live)?;
        loop {
            let Some(op) = self.peek().filter(|t| t.kind == PpKind::Punct) else {
                break;
            };
            if op.text == "?" {
                if min_bp > 0 {
                    break;
                }
                self.pos += 1;
                let then_value = self.expression(0, live && lhs != 0)?;
                self.expect(":")?;
                let else_value = self.expression(0, live && lhs == 0)?;
                lhs = if lhs != 0 { then_value } else { else_value };
                continue;
            }
            let Some(bp) = binding_power(&op.text) else {
                break;
            };
            if bp <= min_bp {
                break;
            }
            self.pos += 1;
            let rhs_live = match op.text.as_str() {
                "&&" => live && lhs != 0,
                "||" => live && lhs == 0,
                _ => live,
            };
            let rhs = self.expression(bp, rhs_live)?;
            lhs = apply(&op.text, lhs, rhs, live)?;
        }
        Ok(lhs)
    }

    fn unary(&mut self, live: bool) -> Result<i64, String> {
        let token = self.next()?;
        match token.kind {
            PpKind::Number => parse_number(&token.text),
            PpKind::Ident => Ok(match token.text.as_str() {
                "true" => 1,
                _ => 0,
            }),
            PpKind::Punct => match token.text.as_str() {
                "(" => {
                    let value = self.expression(0, live)?;
                    self.expect(")")?;
                    Ok(value)
                }
                "-" => Ok(self.operand(live)?.wrapping_neg()),
                "+" => self.operand(live),
                "!" => Ok((self.operand(live)? == 0) as i64),
                "~" => Ok(!self.operand(live)?),
                other => Err(format!("unexpected '{}' in #if expression", other)),
            },
            PpKind::Str => Err(format!("string {} in #if expression", token.text)),
        }
    }
}

fn apply(op: &str, lhs: i64, rhs: i64, live: bool) -> Result<i64, String> {
    let value = match op {
        "||" => (lhs != 0 || rhs != 0) as i64,
        "&&" => (lhs != 0 && rhs != 0) as i64,
        "|" => lhs | rhs,
        "^" => lhs ^ rhs,
        "&" => lhs & rhs,
        "==" => (lhs == rhs) as i64,
        "!=" => (lhs != rhs) as i64,
        "<" => (lhs < rhs) as i64,
        ">" => (lhs > rhs) as i64,
        "<=" => (lhs <= rhs) as i64,
        ">=" => (lhs >= rhs) as i64,
        "<<" => lhs.wrapping_shl(rhs as u32),
        ">>" => lhs.wrapping_shr(rhs as u32),
        "+" => lhs.wrapping_add(rhs),
        "-" => lhs.wrapping_sub(rhs),
        "*" => lhs.wrapping_mul(rhs),
        "/" | "%" if rhs == 0 => {
            if live {
                return Err("division by zero in #if expression".to_string());
            }
            0
        }
        "/" => lhs.wrapping_div(rhs),
        "%" => lhs.wrapping_rem(rhs),
        _ => return Err(format!("unsupported operator '{}' in #if expression", op)),
    };
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::preprocessor::token::tokenize_line;

    fn eval(src: &str) -> Result<i64, String> {
        evaluate(&tokenize_line(src, 0, 1))
    }

    #[test]
    fn test_precedence() {
        assert_eq!(eval("1 + 2 * 3"), Ok(7));
        assert_eq!(eval("(1 + 2) * 3"), Ok(9));
        assert_eq!(eval("1 << 2 + 1"), Ok(8));
        assert_eq!(eval("10 - 4 - 3"), Ok(3));
    }

    #[test]
    fn test_logic_and_comparison() {
        assert_eq!(eval("3 > 2 && 2 >= 2"), Ok(1));
        assert_eq!(eval("!0 || 0"), Ok(1));
        assert_eq!(eval("UNDEFINED_NAME == 0"), Ok(1));
        assert_eq!(eval("true"), Ok(1));
    }

    #[test]
    fn test_ternary_and_literals() {
        assert_eq!(eval("0 ? 1 : 2"), Ok(2));
        assert_eq!(eval("1 ? 0x10 : 2"), Ok(16));
        assert_eq!(eval("010"), Ok(8));
        assert_eq!(eval("330u >= 150"), Ok(1));
    }

    #[test]
    fn test_deep_nesting_is_an_error() {
        let deep = format!("{}1{}", "(".repeat(10_000), ")".repeat(10_000));
        assert!(eval(&deep).unwrap_err().contains("nests deeper"));
        let negations = format!("{}1", "- ".repeat(10_000));
        assert!(eval(&negations).is_err());
        let shallow = format!("{}1{}", "(".repeat(100), ")".repeat(100));
        assert_eq!(eval(&shallow), Ok(1));
    }

    #[test]
    fn test_division_by_zero() {
        assert!(eval("1 / 0").is_err());
        assert_eq!(eval("0 && 1 / 0"), Ok(0));
    }

    #[test]
    fn test_malformed() {
        assert!(eval("").is_err());
        assert!(eval("(1 + 2").is_err());
        assert!(eval("1 2").is_err());
    }
}
