//! Communicating with the tag using APDU frames

pub mod command;

pub use apdu::{Command, Response};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Error occurred while communicating with the reader: {0}")]
    Transport(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("The tag refused the command: {0}")]
    Status(#[from] apdu::Error),
}

impl Error {
    /// Wraps any reader-level failure as a transport error.
    pub fn transport<E>(e: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Transport(Box::new(e))
    }

    /// Determines whether the error only reflects an unexpected status word.
    pub fn is_status(&self) -> bool {
        matches!(self, Self::Status(_))
    }
}

/// An handler to handle an APDU command and receive a response
pub trait Handler {
    /// Handles the APDU command.
    /// Only failures to talk to the reader are errors; any status word is a response.
    fn handle(&self, command: Command) -> Result<Response, Error>;
}

impl<T: Handler + ?Sized> Handler for &T {
    fn handle(&self, command: Command) -> Result<Response, Error> {
        (**self).handle(command)
    }
}
