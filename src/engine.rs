use std::fmt;

use thiserror::Error;

/// Something that runs the code cells sent in `execute_request`s.
pub trait ExecutionEngine {
    type Value: fmt::Display;

    /// Language name reported in `kernel_info_reply`.
    fn language(&self) -> &str;

    fn banner(&self) -> &str {
        ""
    }

    /// Runs one cell. `Ok(None)` means it ran but produced nothing to display.
    fn execute(&mut self, code: &str) -> Result<Option<Self::Value>, ExecutionError>;
}

/// A failed cell, reported to the frontend as an error reply.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{ename}: {evalue}")]
pub struct ExecutionError {
    pub ename: String,
    pub evalue: String,
}

impl ExecutionError {
    pub fn new(ename: &str, evalue: impl Into<String>) -> ExecutionError {
        ExecutionError {
            ename: ename.to_owned(),
            evalue: evalue.into(),
        }
    }
}

/// Reverse polish notation calculator. The stack persists between cells and
/// the top of it is the cell's value.
#[derive(Debug, Default)]
pub struct Calculator {
    stack: Vec<i64>,
}

impl Calculator {
    pub fn new() -> Calculator {
        Calculator::default()
    }

    fn pop2(stack: &mut Vec<i64>, op: &str) -> Result<(i64, i64), ExecutionError> {
        match (stack.pop(), stack.pop()) {
            (Some(n1), Some(n2)) => Ok((n1, n2)),
            _ => Err(ExecutionError::new(
                "StackUnderflow",
                format!("{op} needs two operands"),
            )),
        }
    }

    fn apply(stack: &mut Vec<i64>, token: &str) -> Result<(), ExecutionError> {
        let overflow = || ExecutionError::new("Overflow", format!("{token} overflowed"));
        let result = match token {
            "+" => {
                let (n1, n2) = Self::pop2(stack, token)?;
                n2.checked_add(n1).ok_or_else(overflow)?
            }
            "-" => {
                let (n1, n2) = Self::pop2(stack, token)?;
                n2.checked_sub(n1).ok_or_else(overflow)?
            }
            "*" => {
                let (n1, n2) = Self::pop2(stack, token)?;
                n2.checked_mul(n1).ok_or_else(overflow)?
            }
            "/" => {
                let (n1, n2) = Self::pop2(stack, token)?;
                if n1 == 0 {
                    return Err(ExecutionError::new("ZeroDivision", "division by zero"));
                }
                n2.checked_div(n1).ok_or_else(overflow)?
            }
            _ => token.parse::<i64>().map_err(|_| {
                ExecutionError::new("InvalidToken", format!("invalid integer: {token}"))
            })?,
        };
        stack.push(result);
        Ok(())
    }
}

impl ExecutionEngine for Calculator {
    type Value = i64;

    fn language(&self) -> &str {
        "rpn"
    }

    fn banner(&self) -> &str {
        "Reverse polish notation calculator"
    }

    fn execute(&mut self, code: &str) -> Result<Option<i64>, ExecutionError> {
        // work on a copy so a failing cell leaves the stack untouched
        let mut stack = self.stack.clone();
        for token in code.split_whitespace() {
            Self::apply(&mut stack, token)?;
        }
        self.stack = stack;
        Ok(self.stack.last().copied())
    }
}
