use git2::{
    Cred,
    CredentialType,
    ErrorCode,
    PushOptions,
    RemoteCallbacks,
};
use std::cell::RefCell;

use crate::error::{
    GraftRepoError,
    NotFoundError,
    RemoteError,
};
use super::{
    RepositoryHandle,
    util::display,
};

const MAX_CREDENTIAL_ATTEMPTS: usize = 3;

impl RepositoryHandle {
    /// Publish `branch` to the branch of the same name on `remote`.
    ///
    /// Only fast-forward updates are attempted; a rejection by the remote
    /// is reported as is and never retried.
    pub fn push(
        &mut self,
        remote: &str,
        branch: &str,
    ) -> Result<(), GraftRepoError> {
        let mut target = match self.repo.find_remote(remote) {
            Ok(target) => target,
            Err(e) if matches!(e.code(), ErrorCode::NotFound | ErrorCode::InvalidSpec) => {
                return Err(NotFoundError::Remote {
                    path: display(&self.root_path),
                    remote: remote.to_string(),
                }.into())
            }
            Err(e) => return Err(e.into()),
        };
        let refspec = format!("refs/heads/{branch}:refs/heads/{branch}");
        let config = self.repo.config()?;
        let rejections = RefCell::new(Vec::new());

        let mut attempts = 0;
        let mut callbacks = RemoteCallbacks::new();
        callbacks.credentials(|url, username, allowed| {
            attempts += 1;
            if attempts > MAX_CREDENTIAL_ATTEMPTS {
                return Err(git2::Error::from_str("no usable credentials"));
            }
            if allowed.contains(CredentialType::SSH_KEY) {
                Cred::ssh_key_from_agent(username.unwrap_or("git"))
            } else if allowed.contains(CredentialType::USER_PASS_PLAINTEXT) {
                Cred::credential_helper(&config, url, username)
            } else {
                Cred::default()
            }
        });
        callbacks.push_update_reference(|refname, status| {
            if let Some(msg) = status {
                rejections.borrow_mut().push((refname.to_string(), msg.to_string()));
            }
            Ok(())
        });
        let mut opts = PushOptions::new();
        opts.remote_callbacks(callbacks);

        info!("pushing {refspec} to {remote} from {:?}", self.root_path);
        target.push(&[refspec.as_str()], Some(&mut opts))
            .map_err(|e| RemoteError::Push {
                remote: remote.to_string(),
                branch: branch.to_string(),
                msg: e.message().to_string(),
            })?;
        drop(opts);

        match rejections.into_inner().into_iter().next() {
            Some((refname, msg)) => {
                warn!("{remote} rejected {refname}: {msg}");
                Err(RemoteError::Rejected {
                    remote: remote.to_string(),
                    refname,
                    msg,
                }.into())
            }
            None => Ok(()),
        }
    }
}
