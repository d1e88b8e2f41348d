//! Image references, as given on the command line

use crate::errors::RegistryError;
use std::{fmt, str::FromStr};

/// A reference to an image in a registry, like `busybox:latest`
///
/// Everything before the first `:` is the repository, everything after it is
/// the tag. The tag is optional here, since requesting a token only needs the
/// repository, but fetching a manifest needs both.
#[derive(Clone, Eq, PartialEq, Hash)]
pub struct ImageReference {
    serialized: String,
    split: Option<usize>,
}

impl ImageReference {
    /// Parse a [prim@str] as an [ImageReference]
    ///
    /// ```
    /// # use minibox::ImageReference;
    /// let image = ImageReference::parse("ubuntu:20.04").unwrap();
    /// assert_eq!(image.repository(), "ubuntu");
    /// assert_eq!(image.tag(), Some("20.04"));
    /// ```
    pub fn parse(s: &str) -> Result<Self, RegistryError> {
        let split = s.find(':');
        let repository = &s[..split.unwrap_or_else(|| s.len())];
        if repository.is_empty() {
            return Err(RegistryError::InvalidReference(s.to_owned()));
        }
        Ok(ImageReference {
            serialized: s.to_owned(),
            split,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.serialized
    }

    /// The text before the first `:`, or the whole reference if there is none
    pub fn repository(&self) -> &str {
        match self.split {
            Some(pos) => &self.serialized[..pos],
            None => &self.serialized,
        }
    }

    /// The text after the first `:`, if there was one
    pub fn tag(&self) -> Option<&str> {
        self.split.map(|pos| &self.serialized[pos + 1..])
    }

    /// Like [ImageReference::tag()] but a missing or empty tag is an error
    pub fn require_tag(&self) -> Result<&str, RegistryError> {
        match self.tag() {
            Some(tag) if !tag.is_empty() => Ok(tag),
            _ => Err(RegistryError::InvalidReference(self.serialized.clone())),
        }
    }
}

impl FromStr for ImageReference {
    type Err = RegistryError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ImageReference::parse(s)
    }
}

impl fmt::Display for ImageReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl fmt::Debug for ImageReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self)
    }
}
