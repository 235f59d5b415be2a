use std::fmt;

use strum::{Display, EnumIter};
use thiserror::Error;

use crate::tag::{PayloadKind, Tag};

/// User-visible APL error codes.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Display, EnumIter)]
pub enum ErrorCode {
    #[strum(serialize = "SYNTAX ERROR")]
    Syntax,
    /// Syntax error on the assignment-target side of `←`
    #[strum(serialize = "LEFT SYNTAX ERROR")]
    LeftSyntax,
    #[strum(serialize = "VALUE ERROR")]
    Value,
    #[strum(serialize = "VALENCE ERROR")]
    Valence,
    #[strum(serialize = "DOMAIN ERROR")]
    Domain,
    #[strum(serialize = "RANK ERROR")]
    Rank,
    #[strum(serialize = "LENGTH ERROR")]
    Length,
    #[strum(serialize = "AXIS ERROR")]
    Axis,
    #[strum(serialize = "INDEX ERROR")]
    Index,
    #[strum(serialize = "DEFN ERROR")]
    Defn,
    #[strum(serialize = "SYSTEM LIMIT")]
    SystemLimit,
    /// An internal invariant was violated; fatal to the statement only
    #[strum(serialize = "ASSERTION FAILED")]
    Assertion,
    #[strum(serialize = "INTERRUPT")]
    Interrupt,
}

/// The failing statement and the caret positions of the failed phrase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    /// `NAME[line]  ` for function lines, six blanks for immediate execution
    pub prefix: String,
    pub statement: String,
    pub left_caret: usize,
    pub right_caret: usize,
}

impl Diagnostic {
    pub fn caret_line(&self) -> String {
        let indent = self.prefix.chars().count();
        let mut line = " ".repeat(indent + self.left_caret);
        line.push('^');
        if self.right_caret > self.left_caret {
            line.push_str(&" ".repeat(self.right_caret - self.left_caret - 1));
            line.push('^');
        }
        line
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}{}", self.prefix, self.statement)?;
        write!(f, "{}", self.caret_line())
    }
}

/// A statement-level error. Never fatal to the process.
#[derive(Debug, Clone, Error)]
pub struct ApplError {
    pub code: ErrorCode,
    pub detail: Option<String>,
    pub diagnostic: Option<Diagnostic>,
}

impl ApplError {
    pub fn new(code: ErrorCode) -> Self {
        Self {
            code,
            detail: None,
            diagnostic: None,
        }
    }

    pub fn with_detail(code: ErrorCode, detail: impl Into<String>) -> Self {
        Self {
            code,
            detail: Some(detail.into()),
            diagnostic: None,
        }
    }

    pub fn syntax(detail: impl Into<String>) -> Self {
        Self::with_detail(ErrorCode::Syntax, detail)
    }

    pub fn assertion(detail: impl Into<String>) -> Self {
        Self::with_detail(ErrorCode::Assertion, detail)
    }

    #[inline]
    pub fn code(&self) -> ErrorCode {
        self.code
    }

    /// Attaches a diagnostic unless an inner context already did.
    pub fn attach(mut self, diagnostic: Diagnostic) -> Self {
        if self.diagnostic.is_none() {
            self.diagnostic = Some(diagnostic);
        }
        self
    }
}

impl fmt::Display for ApplError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code)?;
        if let Some(detail) = &self.detail {
            write!(f, "+\n{detail}")?;
        }
        if let Some(diagnostic) = &self.diagnostic {
            write!(f, "\n{diagnostic}")?;
        }
        Ok(())
    }
}

impl From<ErrorCode> for ApplError {
    fn from(code: ErrorCode) -> Self {
        Self::new(code)
    }
}

/// Faults raised by the checked token accessors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TokenError {
    #[error("invalid payload access: expected {expected}, found {found}")]
    InvalidPayloadAccess { expected: PayloadKind, found: Tag },
    #[error("cannot change tag {from} to {to}")]
    IllegalRetag { from: Tag, to: Tag },
}

impl From<TokenError> for ApplError {
    fn from(e: TokenError) -> Self {
        let code = match &e {
            TokenError::InvalidPayloadAccess {
                expected: PayloadKind::Value,
                ..
            } => ErrorCode::Value,
            TokenError::InvalidPayloadAccess { .. } => ErrorCode::Syntax,
            TokenError::IllegalRetag { .. } => ErrorCode::Assertion,
        };
        Self::with_detail(code, e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use expect_test::expect;

    #[test]
    fn error_names() {
        assert_eq!(ErrorCode::LeftSyntax.to_string(), "LEFT SYNTAX ERROR");
        assert_eq!(ErrorCode::SystemLimit.to_string(), "SYSTEM LIMIT");
        assert_eq!(ErrorCode::Assertion.to_string(), "ASSERTION FAILED");
    }

    #[test]
    fn diagnostic_rendering() {
        let err = ApplError::new(ErrorCode::Domain).attach(Diagnostic {
            prefix: "      ".into(),
            statement: "1÷0".into(),
            left_caret: 0,
            right_caret: 2,
        });
        expect![[r#"
            DOMAIN ERROR
                  1÷0
                  ^ ^"#]]
        .assert_eq(&err.to_string());
    }

    #[test]
    fn first_diagnostic_wins() {
        let inner = Diagnostic {
            prefix: "F[1]  ".into(),
            statement: "÷0".into(),
            left_caret: 0,
            right_caret: 1,
        };
        let outer = Diagnostic {
            prefix: "      ".into(),
            statement: "F 0".into(),
            left_caret: 0,
            right_caret: 2,
        };
        let err = ApplError::new(ErrorCode::Domain)
            .attach(inner.clone())
            .attach(outer);
        assert_eq!(err.diagnostic, Some(inner));
    }

    #[test]
    fn token_faults_map_to_codes() {
        let e: ApplError = TokenError::InvalidPayloadAccess {
            expected: PayloadKind::Value,
            found: Tag::Void,
        }
        .into();
        assert_eq!(e.code(), ErrorCode::Value);
        let e: ApplError = TokenError::InvalidPayloadAccess {
            expected: PayloadKind::Function,
            found: Tag::Value,
        }
        .into();
        assert_eq!(e.code(), ErrorCode::Syntax);
    }
}
