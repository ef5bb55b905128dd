//! Error types for dependency list construction.
//!
//! [`DepListError`] is the family of recoverable resolution failures: the
//! OR-group handler and the `pre-or-post` / `try-post` dependency options
//! catch these and move on. [`Error::Internal`] is never caught.

use thiserror::Error;

/// A recoverable resolution failure.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DepListError {
    /// Every candidate for the atom is masked and nothing can be used instead.
    #[error("All versions of '{query}' are masked")]
    AllMasked { query: String },

    /// Something would have matched if the atom's USE requirements were dropped.
    #[error("Error searching for '{query}': use requirements are not met")]
    UseRequirementsNotMet { query: String },

    /// The atom resolves to an entry whose dependencies are still being added.
    #[error("Atom '{spec}' matched node '{package}' in state 'no deps'")]
    CircularDependency { spec: String, package: String },

    /// The selected candidate is older than the installed version in its slot.
    #[error("Downgrade to '{to}' from '{from}' not allowed")]
    DowngradeNotAllowed { to: String, from: String },

    /// A blocker matched something installed or scheduled.
    #[error("Block: '{spec}'")]
    Block { spec: String },

    /// None of the supplied destinations accepts the package.
    #[error("No suitable destination for '{package}' in ( {destinations} )")]
    NoDestination {
        package: String,
        destinations: String,
    },
}

/// Errors returned by [`DepList`](crate::DepList).
#[derive(Error, Debug)]
pub enum Error {
    /// A resolution failure together with the context chain active when it
    /// was raised, outermost frame first.
    #[error("{error}")]
    DepList {
        error: DepListError,
        context: Vec<String>,
    },

    /// An inconsistency between the environment and the engine.
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Whether OR-group trials and lenient dependency options may swallow this.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Error::DepList { .. })
    }

    /// The underlying resolution failure, if any.
    pub fn dep_list_error(&self) -> Option<&DepListError> {
        match self {
            Error::DepList { error, .. } => Some(error),
            Error::Internal(_) => None,
        }
    }

    /// The context chain, outermost first. Empty for internal errors.
    pub fn context(&self) -> &[String] {
        match self {
            Error::DepList { context, .. } => context,
            Error::Internal(_) => &[],
        }
    }

    pub(crate) fn is_circular(&self) -> bool {
        matches!(
            self,
            Error::DepList {
                error: DepListError::CircularDependency { .. },
                ..
            }
        )
    }
}

impl From<DepListError> for Error {
    fn from(error: DepListError) -> Self {
        Error::DepList {
            error,
            context: Vec::new(),
        }
    }
}

/// Result alias used throughout the engine.
pub type Result<T> = std::result::Result<T, Error>;

/// Attach a context frame to resolution failures on their way out.
pub(crate) trait ResultExt<T> {
    fn context<F: FnOnce() -> String>(self, frame: F) -> Result<T>;
}

impl<T> ResultExt<T> for Result<T> {
    fn context<F: FnOnce() -> String>(self, frame: F) -> Result<T> {
        self.map_err(|err| match err {
            Error::DepList { error, mut context } => {
                context.insert(0, frame());
                Error::DepList { error, context }
            }
            internal => internal,
        })
    }
}

/// Failure to load [`Options`](crate::Options) from TOML.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("invalid dep list options: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("cannot serialize dep list options: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// Failure to parse a dependency string into a [`DepSpec`](crate::DepSpec).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("unbalanced parentheses in dependency string")]
    Unbalanced,
    #[error("'{0}' must be followed by '('")]
    ExpectedGroup(String),
    #[error("invalid atom '{token}': {message}")]
    Atom { token: String, message: String },
}
