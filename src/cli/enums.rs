//! CLI enum types for deck kind and recording backend options.

use clap::ValueEnum;

use crate::recording::Backend;

/// Which images a deck is built from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum DeckKind {
    /// One full photo per slide.
    #[default]
    Photos,
    /// A grid of cropped headshots per slide.
    Headshots,
}

/// Recording backend for the capture session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum BackendArg {
    /// Encode session frames (video only).
    Pipeline,
    /// Let ffmpeg capture camera and microphone.
    Direct,
}

impl From<BackendArg> for Backend {
    fn from(b: BackendArg) -> Self {
        match b {
            BackendArg::Pipeline => Backend::Pipeline,
            BackendArg::Direct => Backend::Direct,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_conversion() {
        assert_eq!(Backend::from(BackendArg::Pipeline), Backend::Pipeline);
        assert_eq!(Backend::from(BackendArg::Direct), Backend::Direct);
    }

    #[test]
    fn test_value_names() {
        assert_eq!(DeckKind::from_str("headshots", true), Ok(DeckKind::Headshots));
        assert_eq!(BackendArg::from_str("direct", true), Ok(BackendArg::Direct));
    }
}
