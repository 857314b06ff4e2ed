use std::path::Path;

use codesync_diff::{expand_dir_delete, expand_dir_rename, DiffBuffer, DiffKind, DiffRecord};
use codesync_logger::Connector;
use codesync_store::{Paths, RepoConfig, UserTable};
use codesync_upload::{FileApi, NewFile, Reconciler};

/// Works through the buffer once, oldest record first.
///
/// A record that fails is logged and left in place for the next run. Plain
/// edits are delivered by the uploader itself and are not touched here.
pub(crate) async fn run<A, C>(
    reconciler: &Reconciler<A, C>,
    buffer: &DiffBuffer,
    paths: &Paths,
) -> anyhow::Result<()>
where
    A: FileApi,
    C: Connector,
{
    let users = UserTable::load(paths.user_file())?;

    for (path, record) in buffer.pending()? {
        log::trace!("reconciling {}", path.display());
        if let Err(e) = reconcile(reconciler, buffer, paths, &users, &path, &record).await {
            log::warn!("error reconciling {}: {:?}", path.display(), e);
            continue;
        }
    }

    Ok(())
}

async fn reconcile<A, C>(
    reconciler: &Reconciler<A, C>,
    buffer: &DiffBuffer,
    paths: &Paths,
    users: &UserTable,
    path: &Path,
    record: &DiffRecord,
) -> anyhow::Result<()>
where
    A: FileApi,
    C: Connector,
{
    let repo_path = record.repo_path.as_str();
    let branch = record.branch.as_str();

    match record.kind() {
        DiffKind::Edit => {}
        DiffKind::NewFile => {
            let config: RepoConfig = codesync_store::record::read_or_default(paths.config_file())?;
            let repo = match config.repo(repo_path) {
                Some(repo) => repo,
                None => anyhow::bail!("{} is not a synced repository", repo_path),
            };
            let repo_id = match repo.id {
                Some(id) => id,
                None => anyhow::bail!("{} has no repository ID yet", repo_path),
            };
            let token = match users
                .resolve(repo.email.as_deref())
                .and_then(|(_, user)| user.access_token.as_deref())
            {
                Some(token) => token,
                None => anyhow::bail!("no access token to upload {} with", repo_path),
            };

            match reconciler
                .handle_new_file(token, record, repo_id, path)
                .await?
            {
                NewFile::Deferred => log::info!("upload of {} deferred", record.file_relative_path),
                // Nothing is left to upload, so the record is done with.
                NewFile::Skipped => buffer.remove(path)?,
                NewFile::Uploaded(_) => {}
            }
        }
        DiffKind::Rename => {
            let payload = record.rename_payload()?;
            reconciler
                .handle_rename(repo_path, branch, &payload.old_rel_path, &payload.new_rel_path)
                .await?;
            buffer.remove(path)?;
        }
        DiffKind::DirRename => {
            expand_dir_rename(buffer, repo_path, branch, &record.dir_rename_payload()?)?;
            buffer.remove(path)?;
        }
        DiffKind::Deleted => {
            let rel_path = record.file_relative_path.as_str();
            if paths.is_dir_in_shadow(repo_path, branch, rel_path) {
                expand_dir_delete(buffer, paths, repo_path, branch, rel_path)?;
            } else {
                let diff = reconciler.handle_delete(repo_path, branch, rel_path).await?;
                // The patch is what the server needs to restore the file.
                println!("{}\t{}", path.display(), rel_path);
                print!("{}", diff);
            }
            buffer.remove(path)?;
        }
    }

    Ok(())
}
