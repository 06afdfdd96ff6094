use serde::{
    Deserialize,
    Serialize,
};
use thiserror::Error;

#[derive(Debug, PartialEq, Error, Deserialize, Serialize)]
pub enum PathError {
    #[error("invalid path `{path}`: {msg}")]
    Invalid {
        path: String,
        msg: String,
    },
    #[error("path `{path}` is not under `{prefix}`")]
    NotUnderPrefix {
        path: String,
        prefix: String,
    },
}

#[derive(Debug, PartialEq, Error, Deserialize, Serialize)]
pub enum PatchError {
    #[error("patch for commit `{digest}` contains no diffs")]
    Empty {
        digest: String,
    },
}
