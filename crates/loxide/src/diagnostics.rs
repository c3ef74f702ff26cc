//! Buffered error and warning collection.
//!
//! Every stage of the pipeline reports into a [`Diagnostics`] buffer instead
//! of printing as it goes. The driver renders the buffer at the pipeline
//! boundary and maps [`Diagnostics::has_errors`] to its exit status. This
//! keeps rendering concerns (and the output stream) out of the scanner,
//! parser, resolver, and the two execution backends.

use std::fmt;
use std::io;

use strum::{Display, IntoStaticStr};

use crate::token::SrcLoc;

/// Every way the pipeline can fail, across all stages.
///
/// One flat enum rather than per-stage enums so diagnostics, tests, and the
/// driver can match on a single type. The stage grouping is documentation;
/// the variants carry no payload (messages live on [`Diagnostic`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, IntoStaticStr)]
pub enum ErrorKind {
    // Lexing.
    UnexpectedCharacter,
    UnterminatedString,

    // Parsing.
    ExpectedToken,
    ExpectedExpression,
    ExpectedSemiColon,
    ExpectedClosingParen,
    ExpectedClosingBrace,
    ExpectedOpeningParen,
    ExpectedIdentifier,
    ExpectedBlockStatement,
    ExpectedLVal,
    TooManyArguments,
    UnexpectedToken,
    UnmatchedClosingParen,
    UnclosedGrouping,

    // Static analysis.
    VariableRedeclaration,
    SelfreferenceInitializer,
    ReturnFromTopLevel,
    InitializerReturnedValue,
    InheritanceCycle,
    ThisOutsideClass,
    SuperOutsideSubclass,

    // Runtime.
    UndefinedVariable,
    UndefinedProperty,
    TypeMismatch,
    InvalidOperands,
    InvalidBinaryOperand,
    DivisionByZero,
    NotCallable,
    WrongNumberOfArguments,
    MethodNotDefined,

    // System.
    OutOfMemory,
    WriteFailed,
}

impl ErrorKind {
    /// Parse errors the parser recovers from via panic-mode synchronization.
    ///
    /// Everything else aborts the parse with the first error surfaced.
    #[must_use]
    pub fn is_recoverable_parse(self) -> bool {
        matches!(
            self,
            Self::ExpectedSemiColon | Self::ExpectedExpression | Self::ExpectedClosingParen
        )
    }
}

/// One reported error or warning: kind, human message, and where.
#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    pub kind: ErrorKind,
    pub message: String,
    pub loc: SrcLoc,
    /// The offending token's text, when there is one. `Eof` and end-of-input
    /// conditions report without a lexeme.
    pub lexeme: Option<String>,
}

impl Diagnostic {
    pub fn new(kind: ErrorKind, message: impl Into<String>, loc: SrcLoc) -> Self {
        Self {
            kind,
            message: message.into(),
            loc,
            lexeme: None,
        }
    }

    /// Attaches the offending lexeme for `near '<lexeme>'` rendering.
    #[must_use]
    pub fn with_lexeme(mut self, lexeme: impl Into<String>) -> Self {
        self.lexeme = Some(lexeme.into());
        self
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}): {} at {}", self.kind, self.message, self.loc)?;
        if let Some(lexeme) = &self.lexeme {
            write!(f, " near '{lexeme}'")?;
        }
        Ok(())
    }
}

/// Buffered collector shared across the pipeline stages.
#[derive(Debug, Default)]
pub struct Diagnostics {
    errors: Vec<Diagnostic>,
    warnings: Vec<Diagnostic>,
}

impl Diagnostics {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn report_error(&mut self, diagnostic: Diagnostic) {
        self.errors.push(diagnostic);
    }

    pub fn report_warning(&mut self, diagnostic: Diagnostic) {
        self.warnings.push(diagnostic);
    }

    /// The terminal predicate: did anything fail?
    #[must_use]
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    #[must_use]
    pub fn errors(&self) -> &[Diagnostic] {
        &self.errors
    }

    #[must_use]
    pub fn warnings(&self) -> &[Diagnostic] {
        &self.warnings
    }

    /// The first buffered error, if any. Fatal parse errors surface this one.
    #[must_use]
    pub fn first_error(&self) -> Option<&Diagnostic> {
        self.errors.first()
    }

    /// Drops all buffered entries. The REPL clears between fed lines so one
    /// bad line does not taint the next.
    pub fn clear(&mut self) {
        self.errors.clear();
        self.warnings.clear();
    }

    /// Renders every buffered warning then every buffered error to `out`.
    ///
    /// # Errors
    ///
    /// Returns the underlying I/O error if the writer fails; the driver
    /// treats that as `WriteFailed` and exits.
    pub fn print_diagnostics(&self, out: &mut impl io::Write) -> io::Result<()> {
        for warning in &self.warnings {
            writeln!(out, "Warning{warning}")?;
        }
        for error in &self.errors {
            writeln!(out, "Error{error}")?;
        }
        Ok(())
    }
}
