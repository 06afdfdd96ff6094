use std::fmt::{
    Display,
    Formatter,
    Result,
};
use super::{
    ChangeKind,
    Diff,
    NULL_ID,
    Patch,
};

impl Display for ChangeKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        f.write_str(self.as_str())
    }
}

impl Diff {
    fn header(&self) -> String {
        let old = if self.old_path.is_empty() { &self.new_path } else { &self.old_path };
        let new = if self.new_path.is_empty() { &self.old_path } else { &self.new_path };
        let mut header = format!("diff --git a/{old} b/{new}\n");
        match self.kind {
            ChangeKind::Add => {
                header.push_str(&format!("new file mode {:o}\n", self.new_mode));
                header.push_str(&format!("index {NULL_ID}..{}\n", self.new_id));
            }
            ChangeKind::Delete => {
                header.push_str(&format!("deleted file mode {:o}\n", self.old_mode));
                header.push_str(&format!("index {}..{NULL_ID}\n", self.old_id));
            }
            ChangeKind::Modify | ChangeKind::Rename => {
                if self.old_mode != self.new_mode {
                    header.push_str(&format!("old mode {:o}\n", self.old_mode));
                    header.push_str(&format!("new mode {:o}\n", self.new_mode));
                }
                if self.kind == ChangeKind::Rename {
                    if let Some(similarity) = self.similarity {
                        header.push_str(&format!("similarity index {similarity}%\n"));
                    }
                    header.push_str(&format!("rename from {old}\n"));
                    header.push_str(&format!("rename to {new}\n"));
                }
                if self.old_id != self.new_id {
                    if self.old_mode == self.new_mode {
                        header.push_str(&format!(
                            "index {}..{} {:o}\n", self.old_id, self.new_id, self.new_mode,
                        ));
                    } else {
                        header.push_str(&format!("index {}..{}\n", self.old_id, self.new_id));
                    }
                }
            }
        }
        if self.has_hunks() {
            let from = match self.kind {
                ChangeKind::Add => "/dev/null".to_string(),
                _ => format!("a/{old}"),
            };
            let to = match self.kind {
                ChangeKind::Delete => "/dev/null".to_string(),
                _ => format!("b/{new}"),
            };
            header.push_str(&format!("--- {from}\n+++ {to}\n"));
        }
        header
    }

    /// Render this diff as a git style single file patch.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = self.header().into_bytes();
        out.extend_from_slice(&self.content);
        if !self.content.is_empty() && !self.content.ends_with(b"\n") {
            out.push(b'\n');
        }
        out
    }
}

impl Patch {
    /// All diffs rendered as one multi file patch, suitable for the apply
    /// machinery of the underlying engine.
    pub fn diff_bytes(&self) -> Vec<u8> {
        self.diffs.iter()
            .flat_map(Diff::to_bytes)
            .collect()
    }

    /// The patch in mailbox form, for inspection.
    pub fn render(&self) -> String {
        let mut out = format!(
            "From {} Mon Sep 17 00:00:00 2001\n\
             From: {} <{}>\n\
             Date: {}\n\
             Subject: [PATCH] {}\n\
             \n",
            &self.commit_digest,
            &self.author_name,
            &self.author_email,
            self.timestamp.to_rfc2822(),
            self.summary(),
        );
        let body = self.message
            .split_once('\n')
            .map(|(_, rest)| rest.trim_matches('\n'))
            .unwrap_or("");
        if !body.is_empty() {
            out.push_str(body);
            out.push('\n');
        }
        out.push_str("---\n");
        out.push_str(&String::from_utf8_lossy(&self.diff_bytes()));
        out
    }
}

impl Display for Patch {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        f.write_str(&self.render())
    }
}
