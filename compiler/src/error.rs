// error.rs — Crate-level error type
//
// Union of the fatal errors of each conversion stage, so the pipeline and the
// CLI can propagate with `?` and report a single message.

use std::path::PathBuf;

use thiserror::Error;

use crate::bus::RoutingError;
use crate::catalog::CatalogError;
use crate::parser::ParseError;
use crate::template::TemplateError;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Catalog(#[from] CatalogError),
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error("routing failed: {0}")]
    Routing(#[from] RoutingError),
    #[error(transparent)]
    Template(#[from] TemplateError),
    #[error("{}: cannot write output: {source}", path.display())]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
}

impl Error {
    /// Errors caused by the environment rather than by the patch or its
    /// templates.
    pub fn is_io(&self) -> bool {
        matches!(
            self,
            Error::Catalog(CatalogError::Io { .. })
                | Error::Parse(ParseError::Io { .. })
                | Error::Template(TemplateError::Io { .. })
                | Error::Write { .. }
        )
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::FormatError;

    #[test]
    fn stage_errors_convert() {
        let e: Error = ParseError::from(FormatError::BadPreamble).into();
        assert!(matches!(e, Error::Parse(_)));
        assert!(!e.is_io());
        assert_eq!(
            e.to_string(),
            "not a G2 patch: missing 'Version=Nord Modular G2 File Format' preamble"
        );
    }

    #[test]
    fn write_failures_are_io() {
        let e = Error::Write {
            path: PathBuf::from("out.csd"),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        };
        assert!(e.is_io());
        assert_eq!(e.to_string(), "out.csd: cannot write output: denied");
    }
}
