use serde::{
    Deserialize,
    Serialize,
};
use std::fmt::{
    Display,
    Formatter,
};

use crate::error::PathError;

/// A relative directory used to scope history to one subtree.
///
/// The inner value is either empty (the whole tree) or a normalized
/// relative path ending with exactly one `/`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(try_from = "String", into = "String")]
pub struct SubdirFilter(String);

impl SubdirFilter {
    pub fn new(value: impl AsRef<str>) -> Result<Self, PathError> {
        let raw = value.as_ref();
        if raw.contains('\\') {
            return Err(PathError::Invalid {
                path: raw.to_string(),
                msg: "backslash is not a path separator".to_string(),
            });
        }
        let mut parts = Vec::new();
        for part in raw.split('/') {
            match part {
                "" | "." => continue,
                ".." => return Err(PathError::Invalid {
                    path: raw.to_string(),
                    msg: "parent directory components are not permitted".to_string(),
                }),
                part => parts.push(part),
            }
        }
        if parts.is_empty() {
            Ok(Self::root())
        } else {
            Ok(Self(format!("{}/", parts.join("/"))))
        }
    }

    /// The empty filter, matching the whole tree.
    pub fn root() -> Self {
        Self(String::new())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The filter without its trailing separator, as a path within a
    /// tree.
    pub fn pathspec(&self) -> &str {
        self.0.strip_suffix('/').unwrap_or(&self.0)
    }

    /// Returns the remainder of `path` if it lies strictly under this
    /// filter.
    pub fn strip<'a>(&self, path: &'a str) -> Option<&'a str> {
        path.strip_prefix(self.0.as_str())
            .filter(|rest| !rest.is_empty())
    }

    pub fn contains(&self, path: &str) -> bool {
        self.strip(path).is_some()
    }
}

impl TryFrom<String> for SubdirFilter {
    type Error = PathError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl TryFrom<&str> for SubdirFilter {
    type Error = PathError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<SubdirFilter> for String {
    fn from(value: SubdirFilter) -> Self {
        value.0
    }
}

impl Display for SubdirFilter {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

fn validate(path: &str) -> Result<(), PathError> {
    let msg = if path.is_empty() {
        "empty path"
    } else if path.starts_with('/') {
        "absolute path"
    } else if path.split('/').any(|part| part.is_empty() || part == "." || part == "..") {
        "path is not normalized"
    } else {
        return Ok(())
    };
    Err(PathError::Invalid {
        path: path.to_string(),
        msg: msg.to_string(),
    })
}

/// Rewrite `path` by removing the `strip` prefix and prepending `add`.
///
/// Both the extraction side (`strip` is the source filter, `add` is the
/// root) and the application side (`strip` is the root, `add` is the
/// destination filter) go through here.
pub fn rebase(
    path: &str,
    strip: &SubdirFilter,
    add: &SubdirFilter,
) -> Result<String, PathError> {
    validate(path)?;
    let rest = strip.strip(path)
        .ok_or_else(|| PathError::NotUnderPrefix {
            path: path.to_string(),
            prefix: strip.to_string(),
        })?;
    Ok(format!("{}{}", add.as_str(), rest))
}
