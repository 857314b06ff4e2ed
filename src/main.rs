use std::{
    io::{self, Read},
    sync::Arc,
};

use codesync_diff::{expand_dir_delete, expand_dir_rename, DiffBuffer, DiffKind, DirRenamePayload};
use codesync_logger::{HttpConnector, Shipper};
use codesync_store::{ConfigHandle, Paths, TokenHandle};
use codesync_upload::{HttpApi, Reconciler};
use structopt::StructOpt;

mod reconcile;

#[derive(Debug, StructOpt)]
#[structopt(
    about = "Buffers local file changes as diff records and reconciles them with the CodeSync servers."
)]
struct Opt {
    #[structopt(flatten)]
    store: codesync_store::Opt,

    #[structopt(flatten)]
    diff: codesync_diff::Opt,

    #[structopt(flatten)]
    logger: codesync_logger::Opt,

    #[structopt(flatten)]
    upload: codesync_upload::Opt,

    #[structopt(subcommand)]
    command: Command,
}

#[derive(Debug, StructOpt)]
enum Command {
    /// Buffers one change. The diff text is read from stdin.
    Record {
        #[structopt(long, help = "absolute path of the repository")]
        repo: String,

        #[structopt(long, help = "branch the change was made on")]
        branch: String,

        #[structopt(long, help = "path of the changed file, relative to the repository")]
        path: String,

        #[structopt(
            long,
            default_value = "edit",
            parse(try_from_str = parse_kind),
            help = "kind of change: edit, new-file, rename, dir-rename, or deleted"
        )]
        kind: DiffKind,
    },

    /// Buffers a rename record for every file of a renamed directory.
    RenameDir {
        #[structopt(long)]
        repo: String,

        #[structopt(long)]
        branch: String,

        #[structopt(long, help = "absolute path the directory had before")]
        old_path: String,

        #[structopt(long, help = "absolute path the directory has now")]
        new_path: String,
    },

    /// Archives a deleted directory and buffers a delete record for each of its
    /// files.
    DeleteDir {
        #[structopt(long)]
        repo: String,

        #[structopt(long)]
        branch: String,

        #[structopt(long, help = "path of the directory, relative to the repository")]
        path: String,
    },

    /// Lists the buffered records, dropping invalid ones.
    Pending,

    /// Applies buffered new file, rename, and delete records.
    Reconcile,

    /// Exits non-zero if the CodeSync servers are unavailable.
    Health,

    /// Ships a message to the remote log.
    Log {
        message: String,

        #[structopt(long, help = "email of the user to ship as")]
        email: Option<String>,
    },
}

fn parse_kind(kind: &str) -> Result<DiffKind, String> {
    match kind {
        "edit" => Ok(DiffKind::Edit),
        "new-file" => Ok(DiffKind::NewFile),
        "rename" => Ok(DiffKind::Rename),
        "dir-rename" => Ok(DiffKind::DirRename),
        "deleted" => Ok(DiffKind::Deleted),
        _ => Err(format!("unknown kind of change: {}", kind)),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse command line arguments.
    let opt = Opt::from_args();

    // Set up logging.
    let _logger = flexi_logger::Logger::try_with_env_or_str("info")?.start()?;

    let paths = opt.store.paths()?;
    paths.ensure_dirs()?;
    log::debug!("using store at {}", paths.root().display());

    let buffer = DiffBuffer::new(paths.diffs_dir(), &opt.diff.source);
    let shipper = Arc::new(Shipper::new(
        opt.logger.connector(),
        paths.user_file(),
        TokenHandle::new(paths.sequence_token_file()),
        opt.logger.settings(&opt.diff.source),
    ));

    match opt.command {
        Command::Record {
            repo,
            branch,
            path,
            kind,
        } => {
            let mut diff = String::new();
            io::stdin().read_to_string(&mut diff)?;

            match buffer.manage_diff(&repo, &branch, &path, &diff, kind)? {
                Some(record) => println!("{}", record.display()),
                None => log::info!("nothing changed in {}", path),
            }
        }
        Command::RenameDir {
            repo,
            branch,
            old_path,
            new_path,
        } => {
            let payload = DirRenamePayload { old_path, new_path };
            for record in expand_dir_rename(&buffer, &repo, &branch, &payload)? {
                println!("{}", record.display());
            }
        }
        Command::DeleteDir { repo, branch, path } => {
            for record in expand_dir_delete(&buffer, &paths, &repo, &branch, &path)? {
                println!("{}", record.display());
            }
        }
        Command::Pending => {
            for (path, record) in buffer.pending()? {
                println!(
                    "{}\t{:?}\t{}\t{}\t{}",
                    path.display(),
                    record.kind(),
                    record.repo_path,
                    record.branch,
                    record.file_relative_path
                );
            }
        }
        Command::Reconcile => {
            let reconciler = reconciler(&opt.upload, &paths, shipper.clone())?;
            if reconciler.is_server_down().await {
                anyhow::bail!("the CodeSync servers are unavailable");
            }
            reconcile::run(&reconciler, &buffer, &paths).await?;
        }
        Command::Health => {
            let reconciler = reconciler(&opt.upload, &paths, shipper.clone())?;
            if reconciler.is_server_down().await {
                anyhow::bail!("the CodeSync servers are unavailable");
            }
            println!("ok");
        }
        Command::Log { message, email } => {
            shipper.put_log_event(&message, email.as_deref()).await;
        }
    }

    Ok(())
}

fn reconciler(
    opt: &codesync_upload::Opt,
    paths: &Paths,
    shipper: Arc<Shipper<HttpConnector>>,
) -> anyhow::Result<Reconciler<HttpApi, HttpConnector>> {
    Ok(Reconciler::new(
        opt.api()?,
        paths.clone(),
        ConfigHandle::new(paths.config_file()),
        shipper,
    ))
}
